use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading data, running classifiers or
/// writing results.
#[derive(Debug, Error)]
pub enum DeepnogError {
    /// The sequence or label source could not be parsed.
    #[error("cannot read {path:?} as {format}: {reason}")]
    Format {
        /// The offending source.
        path: PathBuf,
        /// The requested format name.
        format: String,
        /// What went wrong.
        reason: String,
    },

    /// The source parsed but contained no usable record.
    #[error("no valid sequence records in {path:?}")]
    EmptyInput {
        /// The offending source.
        path: PathBuf,
    },

    /// A record has no entry in the label source.
    #[error("no label found for sequence {identifier:?}")]
    MissingLabel {
        /// Identifier of the unlabeled record.
        identifier: String,
    },

    /// A batch size below one was requested.
    #[error("batch size must be at least one, got {0}")]
    InvalidBatchSize(i64),

    /// An epoch count below one was requested.
    #[error("number of epochs must be at least one, got {0}")]
    InvalidEpochCount(i64),

    /// A confidence threshold outside `[0.0, 1.0]` was requested.
    #[error("confidence threshold {0} is not in [0, 1]")]
    InvalidThreshold(f32),

    /// No classifier is registered under this architecture name.
    #[error("unknown architecture {name:?} (available: {available})")]
    UnknownArchitecture {
        /// The requested name.
        name: String,
        /// Comma-separated list of registered names.
        available: String,
    },

    /// The requested compute device cannot be used.
    #[error("device {requested} is unavailable: {reason}")]
    DeviceUnavailable {
        /// The requested device.
        requested: String,
        /// Backend message.
        reason: String,
    },

    /// No weights file was given and none is installed for the database.
    #[error("no weights for {architecture} on {database} level {level} (looked in {root:?})")]
    WeightsNotFound {
        /// Database name.
        database: String,
        /// Taxonomic level.
        level: String,
        /// Architecture name.
        architecture: String,
        /// Root directory that was searched.
        root: PathBuf,
    },

    /// A parameter file does not fit the architecture.
    #[error("weights in {path:?} do not match {architecture}: {reason}")]
    IncompatibleWeights {
        /// The parameter file.
        path: PathBuf,
        /// Architecture the weights were loaded into.
        architecture: String,
        /// First mismatch found.
        reason: String,
    },

    /// The model file could not be read.
    #[error("failed to load model from {path:?}: {reason}")]
    ModelLoad {
        /// The model file.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// A batch failed during inference.
    #[error("inference failed on batch {batch}: {source}")]
    Inference {
        /// Zero-based batch counter.
        batch: usize,
        /// The underlying failure.
        #[source]
        source: Box<DeepnogError>,
    },

    /// A phase failed during training.
    #[error("training failed in epoch {epoch} ({phase}): {source}")]
    Training {
        /// Zero-based epoch.
        epoch: usize,
        /// `train` or `val`.
        phase: String,
        /// The underlying failure.
        #[source]
        source: Box<DeepnogError>,
    },

    /// The output format name is not one of `csv`, `tsv`, `legacy`.
    #[error("unsupported output format {0:?} (expected csv, tsv or legacy)")]
    UnsupportedOutputFormat(String),

    /// A predicted class index has no name in the vocabulary.
    #[error("class index {index} is outside the vocabulary of {num_classes} classes")]
    UnknownClass {
        /// The predicted index.
        index: usize,
        /// Vocabulary size.
        num_classes: usize,
    },

    /// Training output would overwrite existing files.
    #[error("output directory {0:?} is not empty")]
    OutputDirectoryNotEmpty(PathBuf),

    /// One or more training artifacts could not be written.
    #[error("failed to write artifacts: {}", .0.join("; "))]
    ArtifactWrite(Vec<String>),

    /// I/O failure on a named path.
    #[error("I/O error on {path:?}: {source}")]
    Io {
        /// The path being accessed.
        path: PathBuf,
        /// The underlying failure.
        #[source]
        source: std::io::Error,
    },

    /// Table serialization failure.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Candle ML framework error.
    #[error("tensor error: {0}")]
    Candle(#[from] candle_core::Error),
}

impl DeepnogError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for deepnog operations.
pub type Result<T> = std::result::Result<T, DeepnogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = DeepnogError::MissingLabel {
            identifier: "P12345".into(),
        };
        assert!(err.to_string().contains("P12345"));

        let err = DeepnogError::InvalidThreshold(1.5);
        assert_eq!(err.to_string(), "confidence threshold 1.5 is not in [0, 1]");

        let err = DeepnogError::ArtifactWrite(vec!["model: disk full".into(), "labels: denied".into()]);
        assert_eq!(
            err.to_string(),
            "failed to write artifacts: model: disk full; labels: denied"
        );
    }

    #[test]
    fn wrapped_errors_keep_their_cause() {
        let err = DeepnogError::Inference {
            batch: 3,
            source: Box::new(DeepnogError::MissingLabel {
                identifier: "seq7".into(),
            }),
        };
        let text = err.to_string();
        assert!(text.contains("batch 3"));
        assert!(text.contains("seq7"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<DeepnogError>();
    }
}
