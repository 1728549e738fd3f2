//! The two-period land-cover workflow.
//!
//! [`Workflow::new`] validates the configuration and builds the whole lazy
//! graph without touching any data. [`Workflow::evaluate`] pulls the report
//! values through an [`Engine`]; rendering and exports are separate steps so
//! the caller can print the report first.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{PeriodConfig, WorkflowConfig};
use crate::error::Result;
use crate::export::{ExportQueue, ExportStatus, ImageExport, TableExport};
use crate::expr::{
    Engine, LazyAoi, LazyAreas, LazyChangeMask, LazyClassRaster, LazyClassifier, LazyFeatures, LazyImage,
    LazyMatrix, LazyTable, LazyTransitions,
};
use lulc_algorithms::classification::ConfusionMatrix;
use lulc_algorithms::imagery::{changed_pixel_count, TransitionMatrix};
use lulc_algorithms::sampling::SampleParams;
use lulc_algorithms::statistics::AreaReport;
use lulc_colormap::{ColumnChart, Legend, RenderContext, Rgb, VisParams};
use lulc_core::FeatureCollection;

/// Band name of the NDVI images
pub const NDVI_BAND: &str = "NDVI";
/// Table property holding predicted classes
pub const PREDICTED_PROPERTY: &str = "classification";

/// Graph nodes for one compositing period
#[derive(Debug, Clone)]
pub struct PeriodGraph {
    pub label: String,
    pub composite: LazyImage,
    pub ndvi: LazyImage,
    pub classified: LazyClassRaster,
    pub areas: LazyAreas,
}

/// Every node of the workflow
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    pub aoi: LazyAoi,
    pub training_features: LazyFeatures,
    pub validation_features: LazyFeatures,
    pub before: PeriodGraph,
    pub after: PeriodGraph,
    pub training: LazyTable,
    pub classifier: LazyClassifier,
    pub validation: LazyTable,
    pub matrix: LazyMatrix,
    pub change: LazyChangeMask,
    pub transitions: LazyTransitions,
}

fn merged_assets(paths: &[String]) -> LazyFeatures {
    LazyFeatures::merge_all(paths.iter().map(|p| LazyFeatures::asset(p)).collect())
}

impl WorkflowGraph {
    /// Build the graph; no catalog or asset access happens here
    pub fn build(config: &WorkflowConfig) -> Self {
        let aoi = LazyFeatures::asset(&config.aoi_asset).to_aoi();
        let training_features = merged_assets(&config.training_assets);
        let validation_features = match &config.validation_assets {
            Some(paths) => merged_assets(paths),
            None => training_features.clone(),
        };

        let composite_bands = config.composite_bands();
        let composite = |period: &PeriodConfig| {
            LazyImage::median_composite(&config.collection, config.filter(period), &aoi, &composite_bands)
        };
        let before_composite = composite(&config.before);
        let after_composite = composite(&config.after);

        let inputs = config.bands.as_slice();
        let training = before_composite.select(inputs).sample_regions(
            &training_features,
            SampleParams {
                properties: vec![config.class_property.clone()],
                scale: config.training.scale,
                limit: config.training.limit,
            },
        );
        let classifier = training.train(&config.class_property, inputs, config.classifier.clone());

        let validation = after_composite.select(inputs).sample_regions(
            &validation_features,
            SampleParams {
                properties: vec![config.class_property.clone()],
                scale: config.training.validation_scale,
                limit: None,
            },
        );
        let matrix = validation
            .classify(&classifier, PREDICTED_PROPERTY)
            .error_matrix(&config.class_property, PREDICTED_PROPERTY);

        let class_values = config.classes.values();
        let period = |p: &PeriodConfig, composite: LazyImage| {
            let classified = composite.select(inputs).classify(&classifier);
            let areas = classified.class_areas(&class_values, Some(&aoi), config.area.clone());
            PeriodGraph {
                label: p.label.clone(),
                ndvi: composite.normalized_difference(&config.nir_band, &config.red_band, NDVI_BAND),
                composite,
                classified,
                areas,
            }
        };
        let before = period(&config.before, before_composite);
        let after = period(&config.after, after_composite);

        let change = before.classified.change(&after.classified);
        let transitions = before.classified.transitions(&after.classified);

        Self {
            aoi,
            training_features,
            validation_features,
            before,
            after,
            training,
            classifier,
            validation,
            matrix,
            change,
            transitions,
        }
    }
}

/// Labelled features whose class is outside the class scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelDomainWarning {
    pub value: i64,
    pub feature_count: usize,
}

impl fmt::Display for LabelDomainWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "label {} is not a class of the scheme ({} features)",
            self.value, self.feature_count
        )
    }
}

/// Count labels outside `allowed`, by value
fn label_domain(features: &FeatureCollection, property: &str, allowed: &[i32]) -> Result<Vec<LabelDomainWarning>> {
    let mut out: Vec<LabelDomainWarning> = Vec::new();
    for feature in features.iter() {
        let value = feature.class_value(property)?;
        if allowed.iter().any(|&a| i64::from(a) == value) {
            continue;
        }
        match out.iter_mut().find(|w| w.value == value) {
            Some(w) => w.feature_count += 1,
            None => out.push(LabelDomainWarning { value, feature_count: 1 }),
        }
    }
    out.sort_by_key(|w| w.value);
    Ok(out)
}

/// Everything the console report shows
#[derive(Debug, Clone)]
pub struct WorkflowReport {
    pub before_label: String,
    pub after_label: String,
    pub matrix: Arc<ConfusionMatrix>,
    pub before_areas: Arc<AreaReport>,
    pub after_areas: Arc<AreaReport>,
    pub changed_pixels: usize,
    pub transitions: Arc<TransitionMatrix>,
    pub feature_importance: Vec<(String, f64)>,
    pub chart: ColumnChart,
    pub label_warnings: Vec<LabelDomainWarning>,
    pub validation_reuses_training: bool,
}

impl WorkflowReport {
    pub fn accuracy(&self) -> f64 {
        self.matrix.accuracy()
    }
}

impl fmt::Display for WorkflowReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Confusion matrix:")?;
        writeln!(f, "{}", self.matrix)?;
        writeln!(f, "Overall accuracy: {:.4}", self.matrix.accuracy())?;
        writeln!(f, "Kappa: {:.4}", self.matrix.kappa())?;

        let classes = self.matrix.classes();
        let producers = self.matrix.producers_accuracy();
        let consumers = self.matrix.consumers_accuracy();
        writeln!(f, "{:>8} {:>10} {:>10}", "class", "producers", "consumers")?;
        for ((c, p), u) in classes.iter().zip(&producers).zip(&consumers) {
            writeln!(f, "{c:>8} {p:>10.4} {u:>10.4}")?;
        }

        if !self.feature_importance.is_empty() {
            let inputs: Vec<String> = self
                .feature_importance
                .iter()
                .map(|(name, v)| format!("{name}={v:.3}"))
                .collect();
            writeln!(f, "Input importance: {}", inputs.join(", "))?;
        }

        writeln!(f)?;
        writeln!(f, "Area {} (ha): {}", self.before_label, self.before_areas.table)?;
        writeln!(f, "Area {} (ha): {}", self.after_label, self.after_areas.table)?;
        writeln!(
            f,
            "Changed pixels: {} of {}",
            self.changed_pixels,
            self.transitions.total()
        )?;
        for (from, to, n) in self.transitions.iter().filter(|(a, b, _)| a != b) {
            writeln!(f, "  {from} -> {to}: {n}")?;
        }

        writeln!(f)?;
        write!(f, "{}", self.chart.render_text(50))?;

        let area_warnings = self.before_areas.warnings.iter().chain(&self.after_areas.warnings);
        for w in area_warnings {
            writeln!(f, "warning: {w}")?;
        }
        for w in &self.label_warnings {
            writeln!(f, "warning: {w}")?;
        }
        if self.validation_reuses_training {
            writeln!(
                f,
                "warning: validation samples the training geometries on the {} composite",
                self.after_label
            )?;
        }
        Ok(())
    }
}

/// A configured, built workflow
#[derive(Debug, Clone)]
pub struct Workflow {
    config: WorkflowConfig,
    graph: WorkflowGraph,
}

impl Workflow {
    pub fn new(config: WorkflowConfig) -> Result<Self> {
        config.validate()?;
        let graph = WorkflowGraph::build(&config);
        Ok(Self { config, graph })
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    /// Evaluate accuracy, change and area outputs
    pub fn evaluate(&self, engine: &dyn Engine) -> Result<WorkflowReport> {
        let cfg = &self.config;
        let g = &self.graph;

        let features = g.training_features.evaluate(engine)?;
        info!("Loaded {} labelled features", features.len());
        let label_warnings = label_domain(&features, &cfg.class_property, &cfg.classes.values())?;
        for w in &label_warnings {
            warn!("{}", w);
        }
        let validation_reuses_training = cfg.validation_reuses_training();
        if validation_reuses_training {
            warn!(
                "Validation reuses the training geometries on the {} composite; \
                 accuracy includes change between periods",
                cfg.after.label
            );
        }

        let model = g.classifier.evaluate(engine)?;
        let matrix = g.matrix.evaluate(engine)?;
        info!("Overall accuracy {:.4} over {} samples", matrix.accuracy(), matrix.total());

        let change = g.change.evaluate(engine)?;
        let changed_pixels = changed_pixel_count(&change);
        let transitions = g.transitions.evaluate(engine)?;
        info!("{} pixels changed class", changed_pixels);

        let before_areas = g.before.areas.evaluate(engine)?;
        let after_areas = g.after.areas.evaluate(engine)?;
        let chart = self.area_chart(&before_areas, &after_areas)?;

        Ok(WorkflowReport {
            before_label: cfg.before.label.clone(),
            after_label: cfg.after.label.clone(),
            matrix,
            before_areas,
            after_areas,
            changed_pixels,
            transitions,
            feature_importance: model
                .feature_importance()
                .into_iter()
                .map(|(n, v)| (n.to_string(), v))
                .collect(),
            chart,
            label_warnings,
            validation_reuses_training,
        })
    }

    /// Grouped column chart of class areas, one series per period
    fn area_chart(&self, before: &AreaReport, after: &AreaReport) -> Result<ColumnChart> {
        let cfg = &self.config;
        let categories = cfg.classes.labels().into_iter().map(String::from).collect();
        let mut chart = ColumnChart::new(
            &format!(
                "Land Cover Area Comparison ({} vs {})",
                cfg.before.label, cfg.after.label
            ),
            "Land Cover Type",
            "Area (hectares)",
            categories,
        );
        chart.push_series(&cfg.before.label, before.table.values(), Rgb::parse("gray").ok())?;
        chart.push_series(&cfg.after.label, after.table.values(), Rgb::parse("teal").ok())?;
        Ok(chart)
    }

    /// Visualization parameters for classified rasters, from the scheme
    pub fn class_vis(&self) -> VisParams {
        let (min, max) = self.config.classes.value_range();
        let colors: Vec<&str> = self.config.classes.classes().iter().map(|c| c.color.as_str()).collect();
        VisParams::palette(PREDICTED_PROPERTY, f64::from(min), f64::from(max.max(min + 1)), colors.as_slice())
    }

    /// Outline of the AOI in a single color
    pub fn aoi_vis(&self) -> VisParams {
        let color = self.config.render.aoi_color.as_str();
        VisParams::palette("AOI", 0.0, 1.0, &[color, color])
    }

    pub fn change_vis(&self) -> VisParams {
        VisParams::palette("change", 0.0, 1.0, self.config.render.change_palette.as_slice())
    }

    /// Fill a render context with the AOI outline, both periods' layers, the
    /// change mask, legends and the area chart
    pub fn render(&self, engine: &dyn Engine, report: &WorkflowReport) -> Result<RenderContext> {
        let cfg = &self.config;
        let g = &self.graph;
        let mut ctx = RenderContext::new();

        let aoi = g.aoi.evaluate(engine)?;
        let (min_x, min_y, max_x, max_y) = aoi.bounds();
        ctx.set_center((min_x + max_x) / 2.0, (min_y + max_y) / 2.0, cfg.render.zoom);

        let grid = g.before.classified.evaluate(engine)?;
        ctx.add_raster_layer("AOI", &aoi.outline(&grid), &self.aoi_vis())?;

        let class_vis = self.class_vis();
        for period in [&g.before, &g.after] {
            let composite = period.composite.evaluate(engine)?;
            ctx.add_layer(
                &format!("Sentinel-2 Image {}", period.label),
                &composite,
                &cfg.render.true_color,
            )?;
            let ndvi = period.ndvi.evaluate(engine)?;
            ctx.add_layer(&format!("NDVI {}", period.label), &ndvi, &cfg.render.ndvi)?;
            let classified = period.classified.evaluate(engine)?;
            ctx.add_raster_layer(&format!("Classified Image {}", period.label), &classified, &class_vis)?;
        }
        let change = g.change.evaluate(engine)?;
        ctx.add_raster_layer("Change Detection", &change, &self.change_vis())?;

        ctx.add_legend(Legend::from_scheme("Land Cover Classes", &cfg.classes)?);
        ctx.add_legend(ndvi_legend(&cfg.render.ndvi)?);
        let palette = &cfg.render.change_palette;
        ctx.add_legend(Legend::new(
            "Change Detection",
            &[("No Change", palette[0].as_str()), ("Change", palette[1].as_str())],
        )?);
        ctx.add_chart(report.chart.clone());

        info!("Rendered {} layers", ctx.layers().len());
        Ok(ctx)
    }

    /// Render and write to the configured directory, if any
    pub fn write_render(&self, engine: &dyn Engine, report: &WorkflowReport) -> Result<Vec<PathBuf>> {
        match &self.config.render.output {
            Some(dir) => Ok(self.render(engine, report)?.write_to_dir(dir)?),
            None => Ok(Vec::new()),
        }
    }

    /// Queue the classified raster of the later period and the training table
    pub fn export_queue(&self) -> ExportQueue {
        let cfg = &self.config.export;
        let mut queue = ExportQueue::new(&cfg.root);
        queue.export_classes(
            &self.graph.after.classified,
            Some(&self.graph.aoi),
            ImageExport {
                description: cfg.image_description.clone(),
                folder: cfg.folder.clone(),
                file_prefix: cfg.image_prefix.clone(),
                scale: Some(cfg.scale),
                max_pixels: cfg.max_pixels,
            },
        );
        queue.export_table(
            &self.graph.training,
            TableExport {
                description: cfg.table_description.clone(),
                folder: cfg.folder.clone(),
                file_prefix: cfg.table_prefix.clone(),
            },
        );
        queue
    }

    /// Run the export queue, returning `(description, status)` per task
    pub fn export(&self, engine: &dyn Engine) -> Vec<(String, ExportStatus)> {
        let mut queue = self.export_queue();
        queue
            .run(engine)
            .iter()
            .map(|t| (t.description().to_string(), t.status().clone()))
            .collect()
    }
}

/// NDVI legend: low and high at the ends of the palette, neutral between
fn ndvi_legend(vis: &VisParams) -> Result<Legend> {
    let colors = vis.palette.clone().unwrap_or_else(|| vec!["black".into(), "white".into()]);
    let last = colors.len().saturating_sub(1);
    let entries: Vec<(String, String)> = colors
        .into_iter()
        .enumerate()
        .map(|(i, c)| {
            let label = match i {
                0 => "Low NDVI",
                i if i == last => "High NDVI",
                _ => "Neutral",
            };
            (label.to_string(), c)
        })
        .collect();
    Ok(Legend::new("NDVI", &entries)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::Point;
    use lulc_core::{AttributeValue, Feature};

    fn labelled(class: i64) -> Feature {
        Feature::new(Point::new(0.0, 0.0)).with_property("class", AttributeValue::Int(class))
    }

    #[test]
    fn label_domain_counts_out_of_scheme_values() {
        let fc = FeatureCollection::from_features(vec![labelled(0), labelled(7), labelled(3), labelled(7), labelled(-1)]);
        let warnings = label_domain(&fc, "class", &[0, 1, 2, 3]).unwrap();
        assert_eq!(
            warnings,
            vec![
                LabelDomainWarning { value: -1, feature_count: 1 },
                LabelDomainWarning { value: 7, feature_count: 2 },
            ]
        );
    }

    #[test]
    fn label_domain_requires_the_property() {
        let fc = FeatureCollection::from_features(vec![Feature::new(Point::new(0.0, 0.0))]);
        assert!(label_domain(&fc, "class", &[0]).is_err());
    }

    #[test]
    fn graph_reuses_training_features_for_validation() {
        let wf = Workflow::new(WorkflowConfig::default()).unwrap();
        assert_eq!(wf.graph().training_features.id(), wf.graph().validation_features.id());
        assert!(wf.config().validation_reuses_training());

        let mut cfg = WorkflowConfig::default();
        cfg.validation_assets = Some(vec!["labels/validation".into()]);
        let wf = Workflow::new(cfg).unwrap();
        assert_ne!(wf.graph().training_features.id(), wf.graph().validation_features.id());
        assert!(!wf.config().validation_reuses_training());
    }

    #[test]
    fn invalid_config_rejected_before_building() {
        let mut cfg = WorkflowConfig::default();
        cfg.bands.clear();
        assert!(Workflow::new(cfg).is_err());
    }

    #[test]
    fn class_vis_follows_scheme() {
        let wf = Workflow::new(WorkflowConfig::default()).unwrap();
        let vis = wf.class_vis();
        assert_eq!(vis.min, 0.0);
        assert_eq!(vis.max, 3.0);
        assert_eq!(
            vis.palette,
            Some(vec!["black".into(), "green".into(), "brown".into(), "blue".into()])
        );
    }

    #[test]
    fn ndvi_legend_labels_ends() {
        let legend = ndvi_legend(&VisParams::palette(NDVI_BAND, -1.0, 1.0, &["blue", "yellow", "green"])).unwrap();
        let labels: Vec<&str> = legend.entries.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["Low NDVI", "Neutral", "High NDVI"]);
    }
}
