//! End-to-end inference: sequence file in, rendered prediction table out.

use tracing::info;

use crate::config::InferenceConfig;
use crate::context::RunContext;
use crate::data::SequenceDataset;
use crate::error::{DeepnogError, Result};
use crate::inference::{ConfidenceGate, InferenceRunner};
use crate::model::{ArchitectureRegistry, WeightsResolver};
use crate::output::ResultTable;

/// Predict orthologous groups for every sequence of `config.sequences` and
/// return the table rendered in `config.output_format`.
pub fn run_inference(
    config: &InferenceConfig,
    registry: &ArchitectureRegistry,
    resolver: &WeightsResolver,
    ctx: &RunContext,
) -> Result<Vec<u8>> {
    ctx.scope(|| {
        let table = predict_table(config, registry, resolver)?;
        table.render(config.output_format)
    })
}

/// Same as [`run_inference`] without rendering.
pub fn predict_table(
    config: &InferenceConfig,
    registry: &ArchitectureRegistry,
    resolver: &WeightsResolver,
) -> Result<ResultTable> {
    config.validate()?;
    let device = config.device.resolve()?;
    info!(device = ?device, "device selected");

    let weights = match &config.weights {
        Some(path) => path.clone(),
        None => resolver
            .lookup(&config.database, &config.level, &config.architecture)
            .ok_or_else(|| DeepnogError::WeightsNotFound {
                database: config.database.clone(),
                level: config.level.clone(),
                architecture: config.architecture.clone(),
                root: resolver.root().to_path_buf(),
            })?,
    };

    info!(path = %weights.display(), "loading classifier");
    let model = registry.load(&config.architecture, &weights, &device)?;

    info!(path = %config.sequences.display(), "reading sequences");
    let dataset = SequenceDataset::open(&config.sequences, &config.format)?;

    let predictions = InferenceRunner::new(config.batch_size, config.num_workers)
        .run(model.classifier.as_ref(), &dataset)?;

    let gate = ConfidenceGate::resolve(config.confidence_threshold, model.classifier.threshold())?;
    ResultTable::assemble(&model.vocabulary, gate.apply(predictions))
}
