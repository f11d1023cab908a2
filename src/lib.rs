pub mod augmentation;
pub mod callbacks;
pub mod dataset;
pub mod error;
pub mod inference;
pub mod metric;
pub mod model;
pub mod persist;
pub mod pipeline;
pub mod report;
pub mod settings;
pub mod training;

/// Number of class directories a dataset must contain.
pub const NUM_CLASSES: usize = 3;

pub use augmentation::AugmentationConfig;
pub use error::{Error, Result};
pub use inference::{Prediction, Predictor};
pub use metric::TrainingHistory;
pub use model::{Model, ModelConfig};
pub use settings::Settings;
pub use training::{fit, train, TrainingConfig};
