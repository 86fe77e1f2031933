//! # deepnog-trainer
//!
//! Trains orthologous-group classifiers from labeled protein sequences and
//! persists the resulting model together with its evaluation history.

pub mod artifacts;
pub mod config;
pub mod trainer;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use deepnog_core::data::read_labels;
use deepnog_core::{ArchitectureRegistry, LabelVocabulary, Result, RunContext, SequenceDataset};

pub use artifacts::{
    prepare_output_dir, ArtifactPaths, ArtifactWriter, FixedSuffix, RandomSuffix, RunIdentity,
    SuffixGenerator,
};
pub use config::TrainingConfig;
pub use trainer::{LabelHistory, TrainingLoop, TrainingResult};

/// Input files of a training run.
#[derive(Debug, Clone)]
pub struct TrainingInputs {
    pub training: PathBuf,
    /// Validated against the training set itself when absent.
    pub validation: Option<PathBuf>,
    /// CSV mapping sequence identifiers to orthologous group names.
    pub labels: PathBuf,
}

impl TrainingInputs {
    pub fn new(training: impl Into<PathBuf>, labels: impl Into<PathBuf>) -> Self {
        Self {
            training: training.into(),
            validation: None,
            labels: labels.into(),
        }
    }

    #[must_use]
    pub fn with_validation(mut self, validation: impl Into<PathBuf>) -> Self {
        self.validation = Some(validation.into());
        self
    }
}

/// Where and under which name a training run stores its artifacts.
pub struct OutputSpec<'a> {
    pub dir: &'a Path,
    pub database: &'a str,
    pub level: &'a str,
    pub suffixes: &'a mut dyn SuffixGenerator,
}

/// Train a new classifier from `inputs`.
///
/// The class vocabulary is the sorted set of labels in the label file.
pub fn run_training(
    inputs: &TrainingInputs,
    config: &TrainingConfig,
    registry: &ArchitectureRegistry,
    ctx: &RunContext,
) -> Result<TrainingResult> {
    ctx.scope(|| fit(inputs, config, registry))
}

/// Train, then write model, evaluation table and label arrays to
/// `output.dir`. Configuration and the output directory are checked before
/// any training starts.
pub fn train_and_save(
    inputs: &TrainingInputs,
    config: &TrainingConfig,
    registry: &ArchitectureRegistry,
    output: OutputSpec<'_>,
    ctx: &RunContext,
) -> Result<(TrainingResult, ArtifactPaths)> {
    ctx.scope(|| {
        config.validate()?;
        prepare_output_dir(output.dir)?;
        let identity = RunIdentity::new(output.database, output.level, output.suffixes);

        let result = fit(inputs, config, registry)?;
        let paths = ArtifactWriter::new(output.dir, identity).write(&result)?;
        Ok((result, paths))
    })
}

fn fit(
    inputs: &TrainingInputs,
    config: &TrainingConfig,
    registry: &ArchitectureRegistry,
) -> Result<TrainingResult> {
    config.validate()?;
    let device = config.device.resolve()?;
    info!(device = ?device, "device selected");

    let labels = read_labels(&inputs.labels)?;
    let vocabulary = LabelVocabulary::from_labels(labels.values());
    info!(classes = vocabulary.len(), "label vocabulary built");
    let shared = Arc::new(vocabulary.clone());

    let train = SequenceDataset::open(&inputs.training, &config.format)?
        .with_seed(config.seed)
        .with_labels(&labels, Arc::clone(&shared));
    let val_path = inputs.validation.as_ref().unwrap_or(&inputs.training);
    let val = SequenceDataset::open(val_path, &config.format)?
        .with_seed(config.seed)
        .with_labels(&labels, shared);
    info!(train = train.len(), val = val.len(), "datasets loaded");

    let classifier = registry.build(&config.architecture, vocabulary.len(), &device)?;
    info!(architecture = classifier.architecture(), epochs = config.n_epochs, "training");
    TrainingLoop::new(config).fit(classifier, vocabulary, &train, &val)
}
