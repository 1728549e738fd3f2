//! Lazy computation graph.
//!
//! Building a graph only allocates nodes; nothing touches the catalog or the
//! asset store until a handle is evaluated against an [`Engine`]. Each typed
//! handle (`LazyImage`, `LazyTable`, ...) wraps a shared node, so the same
//! sub-graph can feed several consumers and is evaluated once per engine.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::catalog::SceneFilter;
use crate::error::{EngineError, Result};
use lulc_algorithms::classification::{ConfusionMatrix, RandomForest, RandomForestParams};
use lulc_algorithms::imagery::TransitionMatrix;
use lulc_algorithms::sampling::SampleParams;
use lulc_algorithms::statistics::{AreaParams, AreaReport};
use lulc_core::{Aoi, FeatureCollection, Image, Raster, SampleTable};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Evaluates graph nodes
pub trait Engine: Send + Sync {
    fn evaluate(&self, node: &Arc<Node>) -> Result<Value>;
}

/// One immutable graph node
#[derive(Debug)]
pub struct Node {
    id: u64,
    pub(crate) op: Op,
}

impl Node {
    fn new(op: Op) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            op,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Short operation name for logs
    pub fn name(&self) -> &'static str {
        self.op.name()
    }
}

#[derive(Debug)]
pub(crate) enum Op {
    Asset(String),
    FeaturesConst(Arc<FeatureCollection>),
    Merge(Vec<LazyFeatures>),
    Limit(LazyFeatures, usize),
    AoiConst(Arc<Aoi>),
    AoiFromFeatures(LazyFeatures),
    Composite {
        collection: String,
        filter: SceneFilter,
        region: LazyAoi,
        bands: Vec<String>,
    },
    ImageConst(Arc<Image>),
    Select(LazyImage, Vec<String>),
    NormalizedDifference {
        image: LazyImage,
        band_a: String,
        band_b: String,
        name: String,
    },
    TableConst(Arc<SampleTable>),
    Sample {
        image: LazyImage,
        features: LazyFeatures,
        params: SampleParams,
    },
    Train {
        table: LazyTable,
        class_property: String,
        inputs: Vec<String>,
        params: RandomForestParams,
    },
    ClassifyImage(LazyImage, LazyClassifier),
    ClassifyTable {
        table: LazyTable,
        model: LazyClassifier,
        output: String,
    },
    ErrorMatrix {
        table: LazyTable,
        actual: String,
        predicted: String,
    },
    ClassesConst(Arc<Raster<i32>>),
    Change(LazyClassRaster, LazyClassRaster),
    Transitions(LazyClassRaster, LazyClassRaster),
    Areas {
        classified: LazyClassRaster,
        classes: Vec<i32>,
        region: Option<LazyAoi>,
        params: AreaParams,
    },
}

impl Op {
    fn name(&self) -> &'static str {
        match self {
            Op::Asset(_) => "asset",
            Op::FeaturesConst(_) => "features",
            Op::Merge(_) => "merge",
            Op::Limit(..) => "limit",
            Op::AoiConst(_) => "aoi",
            Op::AoiFromFeatures(_) => "aoi_from_features",
            Op::Composite { .. } => "median_composite",
            Op::ImageConst(_) => "image",
            Op::Select(..) => "select",
            Op::NormalizedDifference { .. } => "normalized_difference",
            Op::TableConst(_) => "table",
            Op::Sample { .. } => "sample_regions",
            Op::Train { .. } => "train",
            Op::ClassifyImage(..) => "classify_image",
            Op::ClassifyTable { .. } => "classify_table",
            Op::ErrorMatrix { .. } => "error_matrix",
            Op::ClassesConst(_) => "classes",
            Op::Change(..) => "change",
            Op::Transitions(..) => "transitions",
            Op::Areas { .. } => "class_areas",
        }
    }
}

/// A materialized node value
#[derive(Debug, Clone)]
pub enum Value {
    Features(Arc<FeatureCollection>),
    Aoi(Arc<Aoi>),
    Image(Arc<Image>),
    Classes(Arc<Raster<i32>>),
    Mask(Arc<Raster<u8>>),
    Table(Arc<SampleTable>),
    Classifier(Arc<RandomForest>),
    Matrix(Arc<ConfusionMatrix>),
    Transitions(Arc<TransitionMatrix>),
    Areas(Arc<AreaReport>),
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Features(_) => "features",
            Value::Aoi(_) => "aoi",
            Value::Image(_) => "image",
            Value::Classes(_) => "class raster",
            Value::Mask(_) => "change mask",
            Value::Table(_) => "table",
            Value::Classifier(_) => "classifier",
            Value::Matrix(_) => "confusion matrix",
            Value::Transitions(_) => "transition matrix",
            Value::Areas(_) => "area report",
        }
    }
}

macro_rules! lazy_handle {
    ($(#[$doc:meta])* $name:ident, $variant:ident, $ty:ty) => {
        $(#[$doc])*
        #[derive(Clone)]
        pub struct $name(Arc<Node>);

        impl $name {
            fn from_op(op: Op) -> Self {
                Self(Node::new(op))
            }

            pub fn id(&self) -> u64 {
                self.0.id
            }

            pub fn node(&self) -> &Arc<Node> {
                &self.0
            }

            /// Materialize this node (and whatever it depends on)
            pub fn evaluate(&self, engine: &dyn Engine) -> Result<Arc<$ty>> {
                match engine.evaluate(&self.0)? {
                    Value::$variant(v) => Ok(v),
                    other => Err(EngineError::TypeMismatch {
                        id: self.0.id,
                        expected: stringify!($variant),
                        actual: other.kind(),
                    }),
                }
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}(#{} {})", stringify!($name), self.0.id, self.0.name())
            }
        }
    };
}

lazy_handle!(
    /// Deferred feature collection
    LazyFeatures, Features, FeatureCollection
);
lazy_handle!(
    /// Deferred area of interest
    LazyAoi, Aoi, Aoi
);
lazy_handle!(
    /// Deferred multi-band image
    LazyImage, Image, Image
);
lazy_handle!(
    /// Deferred classified raster
    LazyClassRaster, Classes, Raster<i32>
);
lazy_handle!(
    /// Deferred change mask
    LazyChangeMask, Mask, Raster<u8>
);
lazy_handle!(
    /// Deferred sample table
    LazyTable, Table, SampleTable
);
lazy_handle!(
    /// Deferred trained classifier
    LazyClassifier, Classifier, RandomForest
);
lazy_handle!(
    /// Deferred confusion matrix
    LazyMatrix, Matrix, ConfusionMatrix
);
lazy_handle!(
    /// Deferred from/to class transition counts
    LazyTransitions, Transitions, TransitionMatrix
);
lazy_handle!(
    /// Deferred per-class area report
    LazyAreas, Areas, AreaReport
);

impl LazyFeatures {
    /// Feature collection stored under an asset path
    pub fn asset(path: &str) -> Self {
        Self::from_op(Op::Asset(path.to_string()))
    }

    pub fn constant(fc: FeatureCollection) -> Self {
        Self::from_op(Op::FeaturesConst(Arc::new(fc)))
    }

    /// Concatenation of several collections, in order
    pub fn merge_all(parts: Vec<LazyFeatures>) -> Self {
        Self::from_op(Op::Merge(parts))
    }

    pub fn merge(&self, other: &LazyFeatures) -> Self {
        Self::merge_all(vec![self.clone(), other.clone()])
    }

    /// First `n` features
    pub fn limit(&self, n: usize) -> Self {
        Self::from_op(Op::Limit(self.clone(), n))
    }

    /// Union of the collection's polygons
    pub fn to_aoi(&self) -> LazyAoi {
        LazyAoi::from_op(Op::AoiFromFeatures(self.clone()))
    }
}

impl LazyAoi {
    pub fn constant(aoi: Aoi) -> Self {
        Self::from_op(Op::AoiConst(Arc::new(aoi)))
    }
}

impl LazyImage {
    /// Median of the catalog scenes passing `filter` and touching `region`,
    /// clipped to `region`. An empty `bands` list keeps every band.
    pub fn median_composite(collection: &str, filter: SceneFilter, region: &LazyAoi, bands: &[String]) -> Self {
        Self::from_op(Op::Composite {
            collection: collection.to_string(),
            filter,
            region: region.clone(),
            bands: bands.to_vec(),
        })
    }

    pub fn constant(image: Image) -> Self {
        Self::from_op(Op::ImageConst(Arc::new(image)))
    }

    pub fn select<S: AsRef<str>>(&self, bands: &[S]) -> Self {
        Self::from_op(Op::Select(
            self.clone(),
            bands.iter().map(|b| b.as_ref().to_string()).collect(),
        ))
    }

    /// `(a - b) / (a + b)` as a one-band image called `name`
    pub fn normalized_difference(&self, band_a: &str, band_b: &str, name: &str) -> Self {
        Self::from_op(Op::NormalizedDifference {
            image: self.clone(),
            band_a: band_a.to_string(),
            band_b: band_b.to_string(),
            name: name.to_string(),
        })
    }

    pub fn sample_regions(&self, features: &LazyFeatures, params: SampleParams) -> LazyTable {
        LazyTable::from_op(Op::Sample {
            image: self.clone(),
            features: features.clone(),
            params,
        })
    }

    pub fn classify(&self, model: &LazyClassifier) -> LazyClassRaster {
        LazyClassRaster::from_op(Op::ClassifyImage(self.clone(), model.clone()))
    }
}

impl LazyTable {
    pub fn constant(table: SampleTable) -> Self {
        Self::from_op(Op::TableConst(Arc::new(table)))
    }

    /// Train a random forest predicting `class_property` from `inputs`
    pub fn train<S: AsRef<str>>(&self, class_property: &str, inputs: &[S], params: RandomForestParams) -> LazyClassifier {
        LazyClassifier::from_op(Op::Train {
            table: self.clone(),
            class_property: class_property.to_string(),
            inputs: inputs.iter().map(|s| s.as_ref().to_string()).collect(),
            params,
        })
    }

    /// Add the model's prediction as property `output`
    pub fn classify(&self, model: &LazyClassifier, output: &str) -> LazyTable {
        LazyTable::from_op(Op::ClassifyTable {
            table: self.clone(),
            model: model.clone(),
            output: output.to_string(),
        })
    }

    pub fn error_matrix(&self, actual: &str, predicted: &str) -> LazyMatrix {
        LazyMatrix::from_op(Op::ErrorMatrix {
            table: self.clone(),
            actual: actual.to_string(),
            predicted: predicted.to_string(),
        })
    }
}

impl LazyClassRaster {
    pub fn constant(raster: Raster<i32>) -> Self {
        Self::from_op(Op::ClassesConst(Arc::new(raster)))
    }

    /// Pixels whose class differs from `other`
    pub fn change(&self, other: &LazyClassRaster) -> LazyChangeMask {
        LazyChangeMask::from_op(Op::Change(self.clone(), other.clone()))
    }

    /// From (`self`) / to (`other`) class transition counts
    pub fn transitions(&self, other: &LazyClassRaster) -> LazyTransitions {
        LazyTransitions::from_op(Op::Transitions(self.clone(), other.clone()))
    }

    pub fn class_areas(&self, classes: &[i32], region: Option<&LazyAoi>, params: AreaParams) -> LazyAreas {
        LazyAreas::from_op(Op::Areas {
            classified: self.clone(),
            classes: classes.to_vec(),
            region: region.cloned(),
            params,
        })
    }
}
