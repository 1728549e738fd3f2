//! End-to-end runs of the two-period workflow on an in-memory catalog.
//!
//! The synthetic scene is a 10 x 10 grid of 100 m cells (one hectare each)
//! in UTM zone 36S. Pixels `0..25` are built-up, `25..50` vegetation,
//! `50..75` bareland and `75..100` water. In the later period pixels `25..35`
//! turn from vegetation into bareland.

use std::sync::atomic::{AtomicUsize, Ordering};

use approx::assert_relative_eq;
use chrono::NaiveDate;
use geo_types::{Point, Rect};

use lulc_core::io::read_geotiff;
use lulc_core::{AttributeValue, Band, Feature, FeatureCollection, GeoTransform, Image, Raster, CRS};
use lulc_engine::{
    AssetStore, Catalog, EngineError, ExportStatus, LocalEngine, MemoryAssetStore, MemoryCatalog, Scene,
    Workflow, WorkflowConfig,
};

const ORIGIN_X: f64 = 500_000.0;
const ORIGIN_Y: f64 = 9_901_000.0;
const CELL: f64 = 100.0;

/// B2, B3, B4, B8 per class
const SPECTRA: [[f64; 4]; 4] = [
    [1500.0, 1500.0, 1500.0, 1800.0],
    [400.0, 700.0, 300.0, 3500.0],
    [1200.0, 1400.0, 1800.0, 2200.0],
    [800.0, 600.0, 300.0, 100.0],
];

fn date(s: &str) -> NaiveDate {
    lulc_engine::parse_date(s).unwrap()
}

fn class_of(index: usize, later: bool) -> usize {
    if later && (25..35).contains(&index) {
        2
    } else {
        index / 25
    }
}

fn scene(later: bool, fill: Option<f64>) -> Image {
    let gt = GeoTransform::new(ORIGIN_X, ORIGIN_Y, CELL, -CELL);
    let bands = ["B2", "B3", "B4", "B8"]
        .iter()
        .enumerate()
        .map(|(b, name)| {
            let data = (0..100)
                .map(|i| fill.unwrap_or(SPECTRA[class_of(i, later)][b]))
                .collect();
            let mut raster = Raster::from_vec(data, 10, 10)
                .unwrap()
                .georeferenced(gt, Some(CRS::utm(36, false)));
            raster.set_nodata(Some(f64::NAN));
            Band::new(*name, raster)
        })
        .collect();
    Image::new(bands).unwrap()
}

fn catalog() -> MemoryCatalog {
    let collection = WorkflowConfig::default().collection;
    let cloud = "CLOUDY_PIXEL_PERCENTAGE";
    let mut cat = MemoryCatalog::new();
    cat.insert(&collection, "2020a", date("2020-04-02"), &[(cloud, 3.0)], scene(false, None));
    // Excluded: cloud threshold is strict, end date is exclusive
    cat.insert(&collection, "2020b", date("2020-05-02"), &[(cloud, 20.0)], scene(false, Some(9999.0)));
    cat.insert(&collection, "2020c", date("2020-12-30"), &[(cloud, 1.0)], scene(false, Some(9999.0)));
    cat.insert(&collection, "2024a", date("2024-02-11"), &[(cloud, 8.5)], scene(true, None));
    cat.insert(&collection, "2024b", date("2024-10-20"), &[(cloud, 0.0)], scene(true, Some(9999.0)));
    cat.insert(&collection, "2019a", date("2019-06-01"), &[(cloud, 0.0)], scene(false, Some(9999.0)));
    cat
}

fn pixel_point(index: usize) -> Point<f64> {
    let (row, col) = (index / 10, index % 10);
    Point::new(
        ORIGIN_X + (col as f64 + 0.5) * CELL,
        ORIGIN_Y - (row as f64 + 0.5) * CELL,
    )
}

fn labels(indices: &[usize], class: i64) -> FeatureCollection {
    FeatureCollection::from_features(
        indices
            .iter()
            .map(|&i| {
                Feature::new(pixel_point(i))
                    .with_id(format!("p{i}"))
                    .with_property("class", AttributeValue::Int(class))
            })
            .collect(),
    )
}

/// AOI plus four labelled collections under the default asset paths.
/// Vegetation labels avoid the pixels that change.
fn assets() -> MemoryAssetStore {
    let config = WorkflowConfig::default();
    let mut store = MemoryAssetStore::new();
    let aoi = Rect::new((ORIGIN_X, ORIGIN_Y - 10.0 * CELL), (ORIGIN_X + 10.0 * CELL, ORIGIN_Y));
    store.insert(
        &config.aoi_asset,
        FeatureCollection::from_features(vec![Feature::new(aoi.to_polygon())]),
    );
    let sets: [&[usize]; 4] = [
        &[0, 3, 7, 12, 20],
        &[35, 38, 41, 44, 48],
        &[50, 55, 60, 65, 70],
        &[75, 80, 85, 90, 99],
    ];
    for (class, (path, indices)) in config.training_assets.iter().zip(sets).enumerate() {
        store.insert(path, labels(indices, class as i64));
    }
    store
}

fn test_config(dir: &std::path::Path) -> WorkflowConfig {
    let mut config = WorkflowConfig::default();
    config.render.output = Some(dir.join("render"));
    config.export.root = dir.join("exports");
    config
}

#[test]
fn end_to_end_areas_change_and_accuracy() {
    let dir = tempfile::tempdir().unwrap();
    let engine = LocalEngine::new(catalog(), assets());
    let workflow = Workflow::new(test_config(dir.path())).unwrap();

    let report = workflow.evaluate(&engine).unwrap();

    let before = &report.before_areas.table;
    let after = &report.after_areas.table;
    assert_eq!(before.keys(), vec!["0", "1", "2", "3"]);
    assert_eq!(after.keys(), vec!["0", "1", "2", "3"]);
    for (key, expected) in [("0", 25.0), ("1", 25.0), ("2", 25.0), ("3", 25.0)] {
        assert_relative_eq!(before.get(key).unwrap(), expected, epsilon = 1e-9);
    }
    for (key, expected) in [("0", 25.0), ("1", 15.0), ("2", 35.0), ("3", 25.0)] {
        assert_relative_eq!(after.get(key).unwrap(), expected, epsilon = 1e-9);
    }
    assert!(report.before_areas.warnings.is_empty());

    assert_eq!(report.changed_pixels, 10);
    assert_eq!(report.transitions.count(1, 2), 10);
    assert_eq!(report.transitions.changed(), 10);

    assert_eq!(report.matrix.total(), 20);
    assert_relative_eq!(report.accuracy(), 1.0);
    assert_relative_eq!(report.matrix.kappa(), 1.0);
    assert!(report.validation_reuses_training);
    assert!(report.label_warnings.is_empty());

    assert_eq!(report.chart.categories, vec!["Built-up", "Vegetation", "Bareland", "Water Body"]);
    assert_eq!(report.chart.series.len(), 2);
    assert_eq!(report.chart.series[1].name, "2024");
    assert_relative_eq!(report.chart.series[1].values[2], 35.0, epsilon = 1e-9);

    let text = report.to_string();
    assert!(text.contains("Overall accuracy: 1.0000"));
    assert!(text.contains("Changed pixels: 10 of 100"));
}

#[test]
fn render_and_export_write_files() {
    let dir = tempfile::tempdir().unwrap();
    let engine = LocalEngine::new(catalog(), assets());
    let workflow = Workflow::new(test_config(dir.path())).unwrap();
    let report = workflow.evaluate(&engine).unwrap();

    let ctx = workflow.render(&engine, &report).unwrap();
    assert_eq!(ctx.layers().len(), 8);
    assert_eq!(ctx.layers()[0].name, "AOI");
    // The AOI covers the whole grid, so its outline is the border ring
    let outline = &ctx.layer("AOI").unwrap().rgba;
    assert_eq!(&outline[0..4], &[255, 0, 0, 255]);
    assert_eq!(outline[55 * 4 + 3], 0);
    assert_eq!(outline.chunks_exact(4).filter(|px| px[3] == 255).count(), 36);
    assert_eq!(ctx.legends().len(), 3);
    assert_eq!(ctx.legends()[0].entries.len(), 4);
    let center = ctx.center().unwrap();
    assert_relative_eq!(center.x, ORIGIN_X + 500.0);
    assert_eq!(center.zoom, 10);

    let written = workflow.write_render(&engine, &report).unwrap();
    assert!(written.iter().all(|p| p.exists()));
    assert!(dir.path().join("render/legends.json").exists());

    let exports = workflow.export(&engine);
    assert_eq!(exports.len(), 2);
    for (description, status) in &exports {
        assert!(matches!(status, ExportStatus::Completed(_)), "{description}: {status:?}");
    }

    let tif = dir.path().join("exports/earthengine/classified2024.tif");
    let classified: Raster<i32> = read_geotiff(&tif).unwrap();
    assert_eq!(classified.shape(), (10, 10));
    assert_eq!(classified.get(3, 0).unwrap(), 2);
    assert_eq!(classified.get(9, 9).unwrap(), 3);

    let csv = std::fs::read_to_string(dir.path().join("exports/earthengine/training_data.csv")).unwrap();
    let mut lines = csv.lines();
    assert!(lines.next().unwrap().contains("B8"));
    assert_eq!(lines.count(), 20);
}

#[test]
fn missing_scenes_report_empty_composite() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.after.start = date("2030-01-01");
    config.after.end = date("2030-06-01");
    let engine = LocalEngine::new(catalog(), assets());
    let workflow = Workflow::new(config).unwrap();

    let err = workflow.evaluate(&engine).unwrap_err();
    assert!(matches!(err, EngineError::EmptyComposite { .. }), "{err}");
}

#[test]
fn out_of_scheme_labels_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.training_assets.push("labels/extra".into());
    let mut store = assets();
    store.insert("labels/extra", labels(&[95], 7));

    let engine = LocalEngine::new(catalog(), store);
    let report = Workflow::new(config).unwrap().evaluate(&engine).unwrap();
    assert_eq!(report.label_warnings.len(), 1);
    assert_eq!(report.label_warnings[0].value, 7);
    assert_eq!(report.label_warnings[0].feature_count, 1);
}

struct CountingCatalog {
    inner: MemoryCatalog,
    calls: AtomicUsize,
}

impl Catalog for CountingCatalog {
    fn scenes(&self, collection: &str) -> lulc_engine::Result<Vec<Scene>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.scenes(collection)
    }

    fn load(&self, collection: &str, scene: &Scene, bands: &[String]) -> lulc_engine::Result<Image> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.load(collection, scene, bands)
    }
}

struct CountingAssets {
    inner: MemoryAssetStore,
    calls: AtomicUsize,
}

impl AssetStore for CountingAssets {
    fn load(&self, path: &str) -> lulc_engine::Result<FeatureCollection> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.load(path)
    }
}

#[test]
fn graph_construction_touches_no_data() {
    let dir = tempfile::tempdir().unwrap();
    let engine = LocalEngine::new(
        CountingCatalog {
            inner: catalog(),
            calls: AtomicUsize::new(0),
        },
        CountingAssets {
            inner: assets(),
            calls: AtomicUsize::new(0),
        },
    );

    let workflow = Workflow::new(test_config(dir.path())).unwrap();
    let _queue = workflow.export_queue();
    assert_eq!(engine.catalog().calls.load(Ordering::SeqCst), 0);
    assert_eq!(engine.assets().calls.load(Ordering::SeqCst), 0);
    assert_eq!(engine.evaluations(), 0);

    workflow.evaluate(&engine).unwrap();
    let catalog_calls = engine.catalog().calls.load(Ordering::SeqCst);
    let asset_calls = engine.assets().calls.load(Ordering::SeqCst);
    assert!(catalog_calls > 0);
    // AOI plus four labelled collections, each loaded once
    assert_eq!(asset_calls, 5);

    // A second pass is served from the cache
    let evaluations = engine.evaluations();
    workflow.evaluate(&engine).unwrap();
    assert_eq!(engine.evaluations(), evaluations);
    assert_eq!(engine.catalog().calls.load(Ordering::SeqCst), catalog_calls);
}
