//! Batched inference over a whole dataset.

use candle_core::{D, Tensor};
use tracing::{debug, info};

use crate::data::dataset::{Batch, SequenceDataset};
use crate::error::{DeepnogError, Result};
use crate::model::Classifier;
use crate::types::PredictionRecord;

/// Drives one pass of a classifier over a dataset.
#[derive(Debug, Clone, Copy)]
pub struct InferenceRunner {
    batch_size: usize,
    num_workers: usize,
}

impl InferenceRunner {
    pub fn new(batch_size: usize, num_workers: usize) -> Self {
        Self {
            batch_size,
            num_workers,
        }
    }

    /// Predict every record of `dataset`.
    ///
    /// Returns one record per input, sorted by `source_index`. The first
    /// failing batch aborts the run with [`DeepnogError::Inference`].
    pub fn run(
        &self,
        classifier: &dyn Classifier,
        dataset: &SequenceDataset,
    ) -> Result<Vec<PredictionRecord>> {
        info!(
            records = dataset.len(),
            batch_size = self.batch_size,
            num_workers = self.num_workers,
            "starting inference"
        );

        let batches = dataset.iterate(self.batch_size, false, self.num_workers)?;
        let total = batches.total();
        let mut predictions = Vec::with_capacity(dataset.len());

        // Batches are yielded in plan order, so the position is the batch number.
        for (number, batch) in batches.enumerate() {
            let wrap = |source: DeepnogError| DeepnogError::Inference {
                batch: number,
                source: Box::new(source),
            };
            let records = predict_batch(classifier, batch.map_err(wrap)?).map_err(wrap)?;
            debug!(batch = number, total, size = records.len(), "predicted batch");
            predictions.extend(records);
        }

        predictions.sort_unstable_by_key(|p| p.source_index);
        debug_assert!(predictions.iter().enumerate().all(|(i, p)| p.source_index == i));

        info!(predictions = predictions.len(), "finished inference");
        Ok(predictions)
    }
}

fn predict_batch(classifier: &dyn Classifier, batch: Batch) -> Result<Vec<PredictionRecord>> {
    let scores = classifier.predict(&batch.inputs)?;
    let (classes, confidences) = top_class(&scores)?;

    Ok(batch
        .source_indices
        .into_iter()
        .zip(batch.identifiers)
        .zip(classes.into_iter().zip(confidences))
        .map(|((source_index, identifier), (class, confidence))| PredictionRecord {
            source_index,
            identifier,
            predicted_class: Some(class as usize),
            confidence: confidence.clamp(0.0, 1.0),
        })
        .collect())
}

/// Arg-max class and its softmax probability for every row of `scores`.
pub fn top_class(scores: &Tensor) -> Result<(Vec<u32>, Vec<f32>)> {
    let probabilities = candle_nn::ops::softmax_last_dim(scores)?;
    let classes = probabilities.argmax(D::Minus1)?.to_vec1::<u32>()?;
    let confidences = probabilities.max(D::Minus1)?.to_vec1::<f32>()?;
    Ok((classes, confidences))
}
