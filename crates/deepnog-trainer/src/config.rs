//! Hyperparameters and run settings for training.

use deepnog_core::config::DEFAULT_FORMAT;
use deepnog_core::data::dataset::DEFAULT_SEED;
use deepnog_core::model::DeepEncoding;
use deepnog_core::{DeepnogError, DeviceRequest, Result};

pub const DEFAULT_LEARNING_RATE: f64 = 1e-2;
/// Multiplicative learning-rate decay applied once per epoch.
pub const DEFAULT_GAMMA: f64 = 0.75;
pub const DEFAULT_BATCH_SIZE: usize = 64;
pub const DEFAULT_EPOCHS: usize = 15;

#[derive(Debug, Clone)]
pub struct TrainingConfig {
    pub architecture: String,
    pub format: String,
    pub device: DeviceRequest,
    pub batch_size: usize,
    pub n_epochs: usize,
    pub learning_rate: f64,
    pub gamma: f64,
    pub weight_decay: f64,
    pub shuffle: bool,
    pub num_workers: usize,
    pub seed: u64,
}

impl TrainingConfig {
    pub fn new() -> Self {
        Self {
            architecture: DeepEncoding::NAME.to_string(),
            format: DEFAULT_FORMAT.to_string(),
            device: DeviceRequest::Auto,
            batch_size: DEFAULT_BATCH_SIZE,
            n_epochs: DEFAULT_EPOCHS,
            learning_rate: DEFAULT_LEARNING_RATE,
            gamma: DEFAULT_GAMMA,
            weight_decay: 0.0,
            shuffle: true,
            num_workers: 0,
            seed: DEFAULT_SEED,
        }
    }

    #[must_use]
    pub fn with_architecture(mut self, architecture: impl Into<String>) -> Self {
        self.architecture = architecture.into();
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    #[must_use]
    pub fn with_device(mut self, device: DeviceRequest) -> Self {
        self.device = device;
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_epochs(mut self, n_epochs: usize) -> Self {
        self.n_epochs = n_epochs;
        self
    }

    #[must_use]
    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    #[must_use]
    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    #[must_use]
    pub fn with_weight_decay(mut self, weight_decay: f64) -> Self {
        self.weight_decay = weight_decay;
        self
    }

    #[must_use]
    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    #[must_use]
    pub fn with_num_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers;
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Learning rate in effect during `epoch` (zero-based).
    pub fn learning_rate_at(&self, epoch: usize) -> f64 {
        self.learning_rate * self.gamma.powi(epoch as i32)
    }

    /// Reject settings that would make training meaningless. Runs before any
    /// file is read or written.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(DeepnogError::InvalidBatchSize(0));
        }
        if self.n_epochs == 0 {
            return Err(DeepnogError::InvalidEpochCount(0));
        }
        Ok(())
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TrainingConfig::new();
        assert_eq!(config.architecture, "deepencoding");
        assert_eq!(config.seed, 123);
        assert!(config.shuffle);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_learning_rate_decay() {
        let config = TrainingConfig::new().with_learning_rate(0.01).with_gamma(0.5);
        assert!((config.learning_rate_at(0) - 0.01).abs() < 1e-12);
        assert!((config.learning_rate_at(2) - 0.0025).abs() < 1e-12);
    }

    #[test]
    fn test_zero_epochs_rejected() {
        let err = TrainingConfig::new().with_epochs(0).validate().unwrap_err();
        assert!(matches!(err, DeepnogError::InvalidEpochCount(0)));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let err = TrainingConfig::new().with_batch_size(0).validate().unwrap_err();
        assert!(matches!(err, DeepnogError::InvalidBatchSize(0)));
    }
}
