//! CSV export of sample tables

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::error::Result;
use crate::table::SampleTable;

/// Write a table as CSV to a file
pub fn write_table_csv<P: AsRef<Path>>(table: &SampleTable, path: P) -> Result<()> {
    write_csv(table, File::create(path.as_ref())?)
}

/// Write a table as CSV: `feature_id`, band columns, then property columns.
///
/// NaN band values are written as empty fields.
pub fn write_csv<W: Write>(table: &SampleTable, writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(std::iter::once("feature_id").chain(table.columns()))?;

    for row in table.rows() {
        let record: Vec<String> = std::iter::once(row.feature_id.clone().unwrap_or_default())
            .chain(row.values.iter().map(|v| if v.is_nan() { String::new() } else { v.to_string() }))
            .chain(row.properties.iter().map(|p| p.to_string()))
            .collect();
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::SampleRow;
    use crate::vector::AttributeValue;

    fn table() -> SampleTable {
        let mut t = SampleTable::new(vec!["B4".into()], vec!["class".into(), "note".into()]);
        t.push(SampleRow {
            feature_id: Some("f1".into()),
            values: vec![0.5],
            properties: vec![AttributeValue::Int(2), AttributeValue::String("a,\"b\"".into())],
        })
        .unwrap();
        t.push(SampleRow {
            feature_id: None,
            values: vec![f64::NAN],
            properties: vec![AttributeValue::Int(0), AttributeValue::String("two\nlines".into())],
        })
        .unwrap();
        t
    }

    #[test]
    fn test_csv_layout_and_quoting() {
        let mut buf = Vec::new();
        write_csv(&table(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(
            text,
            "feature_id,B4,class,note\nf1,0.5,2,\"a,\"\"b\"\"\"\n,,0,\"two\nlines\"\n"
        );
    }

    #[test]
    fn test_csv_file_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("training.csv");
        write_table_csv(&table(), &path).unwrap();

        let mut rdr = csv::Reader::from_path(&path).unwrap();
        let headers = rdr.headers().unwrap().clone();
        assert_eq!(headers.iter().collect::<Vec<_>>(), vec!["feature_id", "B4", "class", "note"]);
        let records: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(&records[0][3], "a,\"b\"");
        assert_eq!(&records[1][3], "two\nlines");
    }
}
