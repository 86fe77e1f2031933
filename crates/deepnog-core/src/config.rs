//! Run configuration shared by inference and training.

use std::path::PathBuf;

use crate::device::DeviceRequest;
use crate::error::{DeepnogError, Result};
use crate::inference::gate::validate_threshold;
use crate::model::DeepEncoding;
use crate::output::OutputFormat;

pub const DEFAULT_DATABASE: &str = "eggNOG5";
pub const DEFAULT_LEVEL: &str = "2";
pub const DEFAULT_FORMAT: &str = "fasta";

/// Check a user-supplied batch size.
pub fn validate_batch_size(batch_size: i64) -> Result<usize> {
    usize::try_from(batch_size)
        .ok()
        .filter(|&b| b >= 1)
        .ok_or(DeepnogError::InvalidBatchSize(batch_size))
}

/// Check a user-supplied number of epochs.
pub fn validate_epoch_count(n_epochs: i64) -> Result<usize> {
    usize::try_from(n_epochs)
        .ok()
        .filter(|&n| n >= 1)
        .ok_or(DeepnogError::InvalidEpochCount(n_epochs))
}

/// Everything needed for one inference run.
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub sequences: PathBuf,
    pub format: String,
    pub architecture: String,
    /// Explicit model file; when absent the installed weights of
    /// `database`/`level` are used.
    pub weights: Option<PathBuf>,
    pub database: String,
    pub level: String,
    pub device: DeviceRequest,
    pub batch_size: usize,
    pub num_workers: usize,
    pub confidence_threshold: Option<f32>,
    pub output_format: OutputFormat,
}

impl InferenceConfig {
    pub fn new(sequences: impl Into<PathBuf>) -> Self {
        Self {
            sequences: sequences.into(),
            format: DEFAULT_FORMAT.to_string(),
            architecture: DeepEncoding::NAME.to_string(),
            weights: None,
            database: DEFAULT_DATABASE.to_string(),
            level: DEFAULT_LEVEL.to_string(),
            device: DeviceRequest::Auto,
            batch_size: 1,
            num_workers: 0,
            confidence_threshold: None,
            output_format: OutputFormat::Csv,
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    pub fn with_architecture(mut self, architecture: impl Into<String>) -> Self {
        self.architecture = architecture.into();
        self
    }

    pub fn with_weights(mut self, weights: impl Into<PathBuf>) -> Self {
        self.weights = Some(weights.into());
        self
    }

    pub fn with_database(mut self, database: impl Into<String>, level: impl Into<String>) -> Self {
        self.database = database.into();
        self.level = level.into();
        self
    }

    pub fn with_device(mut self, device: DeviceRequest) -> Self {
        self.device = device;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_num_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers;
        self
    }

    pub fn with_confidence_threshold(mut self, threshold: Option<f32>) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    /// Reject invalid settings before any file is read.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(DeepnogError::InvalidBatchSize(0));
        }
        if let Some(threshold) = self.confidence_threshold {
            validate_threshold(threshold)?;
        }
        Ok(())
    }
}
