//! # deepnog-core
//!
//! Assigns protein sequences to orthologous groups with a convolutional
//! classifier. Provides sequence datasets and batch encoding, the classifier
//! capability with its architecture registry, batched inference with
//! confidence masking, and rendering of prediction tables.
//!
//! ## Quick Start
//!
//! ```no_run
//! use deepnog_core::{ArchitectureRegistry, InferenceConfig, RunContext, WeightsResolver};
//!
//! let config = InferenceConfig::new("proteins.faa").with_weights("model.safetensors");
//! let csv = deepnog_core::run_inference(
//!     &config,
//!     &ArchitectureRegistry::new(),
//!     &WeightsResolver::from_env(),
//!     &RunContext::current(),
//! )
//! .unwrap();
//! print!("{}", String::from_utf8_lossy(&csv));
//! ```
pub mod config;
pub mod context;
pub mod data;
pub mod device;
pub mod error;
pub mod inference;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod types;

// Re-export primary API
pub use config::{validate_batch_size, validate_epoch_count, InferenceConfig};
pub use context::RunContext;
pub use data::{Batch, BatchEncoder, SequenceDataset};
pub use device::DeviceRequest;
pub use error::{DeepnogError, Result};
pub use inference::{ConfidenceGate, InferenceRunner};
pub use model::{ArchitectureRegistry, Classifier, DeepEncoding, LoadedModel, WeightsResolver};
pub use output::{OutputFormat, OutputSink, ResultTable};
pub use pipeline::{predict_table, run_inference};
pub use types::{EpochMetric, LabelVocabulary, Phase, PredictionRecord, SequenceRecord};
