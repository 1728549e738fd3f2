//! Native GeoTIFF reading/writing
//!
//! Uses the `tiff` crate. Georeferencing is carried by the pixel-scale and
//! tiepoint tags, the CRS by a minimal GeoKey directory, and nodata by the
//! GDAL_NODATA ASCII tag.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use std::fs::File;
use std::io::{BufWriter, Cursor};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::{Gray32Float, RGBA8};
use tiff::encoder::{DirectoryEncoder, TiffEncoder, TiffKind};
use tiff::tags::Tag;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

const GEOGRAPHIC_TYPE_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_KEY: u16 = 3072;

/// Options for writing GeoTIFF files
#[derive(Debug, Clone, Default)]
pub struct GeoTiffOptions {
    /// Value written for nodata cells; NaN when unset
    pub nodata: Option<f64>,
}

/// Read a single-band GeoTIFF file into a Raster
pub fn read_geotiff<T, P>(path: P) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())?;
    decode_geotiff(file)
}

/// Read a GeoTIFF from an in-memory buffer into a Raster
pub fn read_geotiff_from_buffer<T>(data: &[u8]) -> Result<Raster<T>>
where
    T: RasterElement,
{
    decode_geotiff(Cursor::new(data))
}

fn cast_all<S, T>(buf: Vec<S>) -> Vec<T>
where
    S: num_traits::NumCast + Copy,
    T: RasterElement,
{
    buf.into_iter()
        .map(|v| num_traits::cast(v).unwrap_or(T::default_nodata()))
        .collect()
}

/// Internal: decode a GeoTIFF from any `Read + Seek` source
fn decode_geotiff<T, R>(reader: R) -> Result<Raster<T>>
where
    T: RasterElement,
    R: std::io::Read + std::io::Seek,
{
    let mut decoder = Decoder::new(reader)?;
    let (width, height) = decoder.dimensions()?;
    let rows = height as usize;
    let cols = width as usize;

    let data: Vec<T> = match decoder.read_image()? {
        DecodingResult::F32(buf) => cast_all(buf),
        DecodingResult::F64(buf) => cast_all(buf),
        DecodingResult::U8(buf) => cast_all(buf),
        DecodingResult::U16(buf) => cast_all(buf),
        DecodingResult::U32(buf) => cast_all(buf),
        DecodingResult::I16(buf) => cast_all(buf),
        DecodingResult::I32(buf) => cast_all(buf),
        _ => {
            return Err(Error::UnsupportedDataType(
                "Unsupported TIFF pixel format".to_string(),
            ))
        }
    };

    if data.len() != rows * cols {
        return Err(Error::InvalidDimensions {
            width: cols,
            height: rows,
        });
    }

    let mut raster = Raster::from_vec(data, rows, cols)?;

    if let Some(transform) = read_geotransform(&mut decoder) {
        raster.set_transform(transform);
    }
    raster.set_crs(read_crs(&mut decoder));

    match decoder
        .get_tag_ascii_string(Tag::from_u16_exhaustive(GDAL_NODATA))
        .ok()
        .and_then(|s| s.trim_matches(char::from(0)).trim().parse::<f64>().ok())
    {
        Some(nd) if nd.is_nan() => raster.set_nodata(Some(T::default_nodata())),
        Some(nd) => raster.set_nodata(T::from_f64(nd).or(Some(T::default_nodata()))),
        None if T::is_float() => raster.set_nodata(Some(T::default_nodata())),
        None => {}
    }

    Ok(raster)
}

/// GeoTransform from ModelPixelScaleTag + ModelTiepointTag
fn read_geotransform<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> Option<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_PIXEL_SCALE)).ok()?;
    let tiepoint = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_TIEPOINT)).ok()?;

    if scale.len() >= 2 && tiepoint.len() >= 6 {
        // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
        let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
        let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
        return Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]));
    }
    None
}

/// EPSG code from the GeoKey directory, if present
fn read_crs<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Option<CRS> {
    let keys = decoder.get_tag_u16_vec(Tag::from_u16_exhaustive(GEO_KEY_DIRECTORY)).ok()?;
    // Header is 4 shorts; each entry is [key, location, count, value]
    keys.get(4..)?
        .chunks_exact(4)
        .find(|e| {
            (e[0] == PROJECTED_CS_TYPE_KEY || e[0] == GEOGRAPHIC_TYPE_KEY) && e[1] == 0
        })
        .map(|e| CRS::from_epsg(e[3] as u32))
}

/// Write a Raster to a single-band Float32 GeoTIFF file
pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P, options: Option<GeoTiffOptions>) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = BufWriter::new(File::create(path.as_ref())?);
    let mut encoder = TiffEncoder::new(file)?;
    encode_geotiff(raster, &mut encoder, options.unwrap_or_default())
}

/// Write a Raster to an in-memory GeoTIFF buffer
pub fn write_geotiff_to_buffer<T>(raster: &Raster<T>, options: Option<GeoTiffOptions>) -> Result<Vec<u8>>
where
    T: RasterElement,
{
    let mut buf = Vec::new();
    {
        let mut encoder = TiffEncoder::new(Cursor::new(&mut buf))?;
        encode_geotiff(raster, &mut encoder, options.unwrap_or_default())?;
    }
    Ok(buf)
}

fn encode_geotiff<T, W>(
    raster: &Raster<T>,
    encoder: &mut TiffEncoder<W>,
    options: GeoTiffOptions,
) -> Result<()>
where
    T: RasterElement,
    W: std::io::Write + std::io::Seek,
{
    let (rows, cols) = raster.shape();
    let fill = options.nodata.unwrap_or(f64::NAN);

    let data: Vec<f32> = raster
        .data()
        .iter()
        .map(|&v| {
            if raster.is_nodata(v) {
                fill as f32
            } else {
                num_traits::cast(v).unwrap_or(fill as f32)
            }
        })
        .collect();

    let mut image = encoder.new_image::<Gray32Float>(cols as u32, rows as u32)?;
    write_geo_tags(image.encoder(), raster.transform(), raster.crs())?;
    let nodata = if fill.is_nan() { "nan".to_string() } else { fill.to_string() };
    image
        .encoder()
        .write_tag(Tag::from_u16_exhaustive(GDAL_NODATA), nodata.as_str())?;
    image.write_data(&data)?;
    Ok(())
}

/// Write an RGBA pixel buffer (row-major, 4 bytes per pixel) as a
/// georeferenced RGBA GeoTIFF
pub fn write_rgba_geotiff<P: AsRef<Path>>(
    rgba: &[u8],
    rows: usize,
    cols: usize,
    transform: &GeoTransform,
    crs: Option<&CRS>,
    path: P,
) -> Result<()> {
    if rgba.len() != rows * cols * 4 {
        return Err(Error::InvalidDimensions {
            width: cols,
            height: rows,
        });
    }
    let file = BufWriter::new(File::create(path.as_ref())?);
    let mut encoder = TiffEncoder::new(file)?;
    let mut image = encoder.new_image::<RGBA8>(cols as u32, rows as u32)?;
    write_geo_tags(image.encoder(), transform, crs)?;
    image.write_data(rgba)?;
    Ok(())
}

fn write_geo_tags<W, K>(
    dir: &mut DirectoryEncoder<'_, W, K>,
    gt: &GeoTransform,
    crs: Option<&CRS>,
) -> Result<()>
where
    W: std::io::Write + std::io::Seek,
    K: TiffKind,
{
    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    dir.write_tag(Tag::from_u16_exhaustive(MODEL_PIXEL_SCALE), &scale[..])?;

    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    dir.write_tag(Tag::from_u16_exhaustive(MODEL_TIEPOINT), &tiepoint[..])?;

    // GTModelTypeGeoKey, GTRasterTypeGeoKey (PixelIsArea) and the CRS key
    let (model_type, crs_key, epsg) = match crs {
        Some(c) if c.is_geographic() => (2u16, GEOGRAPHIC_TYPE_KEY, c.epsg() as u16),
        Some(c) => (1u16, PROJECTED_CS_TYPE_KEY, c.epsg() as u16),
        None => (1u16, PROJECTED_CS_TYPE_KEY, 32767u16),
    };
    let geokeys: [u16; 16] = [
        1, 1, 0, 3, //
        1024, 0, 1, model_type, //
        1025, 0, 1, 1, //
        crs_key, 0, 1, epsg,
    ];
    dir.write_tag(Tag::from_u16_exhaustive(GEO_KEY_DIRECTORY), &geokeys[..])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_buffer_roundtrip_keeps_georeference() {
        let mut r: Raster<f64> = Raster::new(4, 5).georeferenced(
            GeoTransform::new(500_000.0, 9_000_000.0, 10.0, -10.0),
            Some(CRS::utm(36, false)),
        );
        r.set(1, 2, 0.25).unwrap();
        r.set(3, 4, f64::NAN).unwrap();

        let buf = write_geotiff_to_buffer(&r, None).unwrap();
        let back: Raster<f64> = read_geotiff_from_buffer(&buf).unwrap();

        assert_eq!(back.shape(), (4, 5));
        assert_relative_eq!(back.get(1, 2).unwrap(), 0.25, epsilon = 1e-6);
        assert!(back.get(3, 4).unwrap().is_nan());
        assert_relative_eq!(back.transform().origin_x, 500_000.0);
        assert_relative_eq!(back.transform().pixel_height, -10.0);
        assert_eq!(back.crs().map(CRS::epsg), Some(32736));
    }

    #[test]
    fn test_class_raster_nodata_survives() {
        let mut r: Raster<i32> = Raster::filled(2, 2, 3);
        r.set_nodata(Some(i32::MIN));
        r.set(0, 0, i32::MIN).unwrap();

        let buf = write_geotiff_to_buffer(&r, None).unwrap();
        let back: Raster<i32> = read_geotiff_from_buffer(&buf).unwrap();
        assert_eq!(back.get(1, 1).unwrap(), 3);
        assert!(back.is_nodata(back.get(0, 0).unwrap()));
    }

    #[test]
    fn test_rgba_size_checked() {
        let dir = tempfile::tempdir().unwrap();
        let gt = GeoTransform::default();
        let err = write_rgba_geotiff(&[0u8; 7], 1, 2, &gt, None, dir.path().join("x.tif"));
        assert!(err.is_err());
        write_rgba_geotiff(&[255u8; 8], 1, 2, &gt, None, dir.path().join("ok.tif")).unwrap();
    }
}
