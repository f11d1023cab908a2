use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("dataset directory does not exist: {0:?}")]
    DatasetNotFound(PathBuf),

    /// The dataset root must hold exactly [`crate::NUM_CLASSES`] class directories.
    #[error("there should be exactly {expected} classes in the dataset, found {}: {found:?}", found.len())]
    ClassCount { expected: usize, found: Vec<String> },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to load image {path:?}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("model record error: {0}")]
    Record(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("model predicts {outputs} classes but {labels} labels were given")]
    LabelMismatch { outputs: usize, labels: usize },

    #[error("tensor data error: {0}")]
    Tensor(String),

    #[error("sample index {index} out of range for a dataset of {len}")]
    SampleOutOfRange { index: usize, len: usize },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn image(path: impl Into<PathBuf>, source: image::ImageError) -> Self {
        Self::Image {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_count_message_lists_found_classes() {
        let err = Error::ClassCount {
            expected: 3,
            found: vec!["paper".into(), "plastic".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("exactly 3 classes"));
        assert!(msg.contains("found 2"));
        assert!(msg.contains("plastic"));
    }
}
