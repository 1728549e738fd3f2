//! Local evaluation of the lazy graph against a catalog and an asset store

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::assets::AssetStore;
use crate::catalog::Catalog;
use crate::error::{EngineError, Result};
use crate::expr::{Engine, Node, Op, Value};
use lulc_algorithms::classification::{classify_image, classify_table, ConfusionMatrix, RandomForest};
use lulc_algorithms::imagery::{class_change, median_composite, normalized_difference_image, transition_matrix};
use lulc_algorithms::sampling::sample_regions;
use lulc_algorithms::statistics::class_areas;
use lulc_core::Aoi;

/// Evaluates graphs in-process, memoizing every node it materializes
pub struct LocalEngine<C: Catalog, A: AssetStore> {
    catalog: C,
    assets: A,
    cache: Mutex<HashMap<u64, Value>>,
    evaluations: AtomicUsize,
}

impl<C: Catalog, A: AssetStore> LocalEngine<C, A> {
    pub fn new(catalog: C, assets: A) -> Self {
        Self {
            catalog,
            assets,
            cache: Mutex::new(HashMap::new()),
            evaluations: AtomicUsize::new(0),
        }
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn assets(&self) -> &A {
        &self.assets
    }

    /// Number of nodes computed so far (cache hits excluded)
    pub fn evaluations(&self) -> usize {
        self.evaluations.load(Ordering::Relaxed)
    }

    /// Drop every memoized value
    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    fn cached(&self, id: u64) -> Option<Value> {
        self.cache.lock().ok().and_then(|c| c.get(&id).cloned())
    }

    fn compute(&self, node: &Node) -> Result<Value> {
        let value = match &node.op {
            Op::Asset(path) => Value::Features(Arc::new(self.assets.load(path)?)),
            Op::FeaturesConst(fc) => Value::Features(fc.clone()),
            Op::Merge(parts) => {
                let mut merged = lulc_core::FeatureCollection::new();
                for part in parts {
                    merged = merged.merge(part.evaluate(self)?.as_ref().clone());
                }
                Value::Features(Arc::new(merged))
            }
            Op::Limit(features, n) => {
                let fc = features.evaluate(self)?;
                Value::Features(Arc::new(fc.as_ref().clone().limit(*n)))
            }
            Op::AoiConst(aoi) => Value::Aoi(aoi.clone()),
            Op::AoiFromFeatures(features) => {
                Value::Aoi(Arc::new(Aoi::from_features(features.evaluate(self)?.as_ref())?))
            }
            Op::Composite {
                collection,
                filter,
                region,
                bands,
            } => {
                let aoi = region.evaluate(self)?;
                let scenes = self.catalog.query(collection, filter, Some(&aoi))?;
                if scenes.is_empty() {
                    return Err(EngineError::EmptyComposite {
                        collection: collection.clone(),
                        filter: filter.to_string(),
                    });
                }
                let images = scenes
                    .iter()
                    .map(|s| self.catalog.load(collection, s, bands))
                    .collect::<Result<Vec<_>>>()?;
                let composite = median_composite(&images)?;
                let clipped = composite.clip(&aoi.mask(composite.grid()))?;
                if clipped.valid_pixel_count() == 0 {
                    return Err(EngineError::EmptyComposite {
                        collection: collection.clone(),
                        filter: format!("{filter}; no valid pixels inside the region"),
                    });
                }
                info!("Composited {} scenes from {}", scenes.len(), collection);
                Value::Image(Arc::new(clipped))
            }
            Op::ImageConst(image) => Value::Image(image.clone()),
            Op::Select(image, bands) => Value::Image(Arc::new(image.evaluate(self)?.select(bands.as_slice())?)),
            Op::NormalizedDifference {
                image,
                band_a,
                band_b,
                name,
            } => {
                let image = image.evaluate(self)?;
                Value::Image(Arc::new(normalized_difference_image(&image, band_a, band_b, name)?))
            }
            Op::TableConst(table) => Value::Table(table.clone()),
            Op::Sample {
                image,
                features,
                params,
            } => {
                let image = image.evaluate(self)?;
                let features = features.evaluate(self)?;
                Value::Table(Arc::new(sample_regions(&image, &features, params)?))
            }
            Op::Train {
                table,
                class_property,
                inputs,
                params,
            } => {
                let table = table.evaluate(self)?;
                let model = RandomForest::train(&table, class_property, inputs.as_slice(), params)?;
                info!(
                    "Trained random forest: {} trees on {} samples",
                    model.n_trees(),
                    table.len()
                );
                Value::Classifier(Arc::new(model))
            }
            Op::ClassifyImage(image, model) => {
                let image = image.evaluate(self)?;
                let model = model.evaluate(self)?;
                Value::Classes(Arc::new(classify_image(&model, &image)?))
            }
            Op::ClassifyTable { table, model, output } => {
                let table = table.evaluate(self)?;
                let model = model.evaluate(self)?;
                Value::Table(Arc::new(classify_table(&model, &table, output)?))
            }
            Op::ErrorMatrix {
                table,
                actual,
                predicted,
            } => {
                let table = table.evaluate(self)?;
                Value::Matrix(Arc::new(ConfusionMatrix::from_table(&table, actual, predicted)?))
            }
            Op::ClassesConst(raster) => Value::Classes(raster.clone()),
            Op::Change(before, after) => {
                let (b, a) = (before.evaluate(self)?, after.evaluate(self)?);
                Value::Mask(Arc::new(class_change(&b, &a)?))
            }
            Op::Transitions(before, after) => {
                let (b, a) = (before.evaluate(self)?, after.evaluate(self)?);
                Value::Transitions(Arc::new(transition_matrix(&b, &a)?))
            }
            Op::Areas {
                classified,
                classes,
                region,
                params,
            } => {
                let raster = classified.evaluate(self)?;
                let aoi = region.as_ref().map(|r| r.evaluate(self)).transpose()?;
                Value::Areas(Arc::new(class_areas(&raster, classes, aoi.as_deref(), params)?))
            }
        };
        Ok(value)
    }
}

impl<C: Catalog, A: AssetStore> Engine for LocalEngine<C, A> {
    fn evaluate(&self, node: &Arc<Node>) -> Result<Value> {
        if let Some(v) = self.cached(node.id()) {
            return Ok(v);
        }
        let value = self.compute(node)?;
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        debug!("Evaluated node #{} ({})", node.id(), node.name());
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(node.id(), value.clone());
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemoryAssetStore;
    use crate::catalog::MemoryCatalog;
    use crate::expr::{LazyClassRaster, LazyFeatures};
    use lulc_algorithms::statistics::AreaParams;
    use lulc_core::{AttributeValue, Feature, FeatureCollection, Raster};
    use geo_types::Point;

    fn engine() -> LocalEngine<MemoryCatalog, MemoryAssetStore> {
        let mut assets = MemoryAssetStore::new();
        let fc = |class: i64, n: usize| {
            FeatureCollection::from_features(
                (0..n)
                    .map(|i| Feature::new(Point::new(i as f64, 0.0)).with_property("class", AttributeValue::Int(class)))
                    .collect(),
            )
        };
        assets.insert("a", fc(0, 3));
        assets.insert("b", fc(1, 4));
        LocalEngine::new(MemoryCatalog::new(), assets)
    }

    #[test]
    fn merge_and_limit() {
        let engine = engine();
        let merged = LazyFeatures::asset("a").merge(&LazyFeatures::asset("b"));
        assert_eq!(merged.evaluate(&engine).unwrap().len(), 7);
        let limited = merged.limit(5);
        let fc = limited.evaluate(&engine).unwrap();
        assert_eq!(fc.len(), 5);
        assert_eq!(fc.distinct_classes("class").unwrap(), vec![0, 1]);
    }

    #[test]
    fn shared_nodes_evaluate_once() {
        let engine = engine();
        let a = LazyFeatures::asset("a");
        let m1 = a.limit(1);
        let m2 = a.limit(2);
        m1.evaluate(&engine).unwrap();
        m2.evaluate(&engine).unwrap();
        // a, m1, m2
        assert_eq!(engine.evaluations(), 3);
        m2.evaluate(&engine).unwrap();
        assert_eq!(engine.evaluations(), 3);
    }

    #[test]
    fn cleared_cache_recomputes() {
        let engine = engine();
        let limited = LazyFeatures::asset("b").limit(2);
        limited.evaluate(&engine).unwrap();
        assert_eq!(engine.evaluations(), 2);

        engine.clear_cache();
        assert_eq!(limited.evaluate(&engine).unwrap().len(), 2);
        assert_eq!(engine.evaluations(), 4);
    }

    #[test]
    fn missing_asset_surfaces_at_evaluation() {
        let engine = engine();
        let graph = LazyFeatures::asset("nope").limit(10);
        assert_eq!(engine.evaluations(), 0);
        assert!(matches!(graph.evaluate(&engine), Err(EngineError::AssetNotFound(_))));
    }

    #[test]
    fn class_areas_through_graph() {
        let engine = engine();
        let classes = LazyClassRaster::constant(Raster::from_vec(vec![0, 1, 1, 3], 2, 2).unwrap());
        let areas = classes.class_areas(&[0, 1, 2, 3], None, AreaParams::default());
        let report = areas.evaluate(&engine).unwrap();
        assert_eq!(report.table.keys(), vec!["0", "1", "2", "3"]);
        assert!(engine.evaluate(areas.node()).is_ok());
    }
}
