//! Epoch loop: optimize on the training set, then measure on the validation set.

use candle_core::{D, Tensor};
use candle_nn::{AdamW, Optimizer, ParamsAdamW};
use tracing::{debug, info};

use deepnog_core::{
    Classifier, DeepnogError, EpochMetric, LabelVocabulary, Phase, Result, SequenceDataset,
};

use crate::config::TrainingConfig;

/// True and predicted class indices for every epoch of one phase.
///
/// Row `e` holds epoch `e`; column `i` is the record at source index `i`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelHistory {
    pub y_true: Vec<Vec<u32>>,
    pub y_pred: Vec<Vec<u32>>,
}

impl LabelHistory {
    fn push(&mut self, outcome: PhaseOutcome) {
        self.y_true.push(outcome.y_true);
        self.y_pred.push(outcome.y_pred);
    }

    pub fn epochs(&self) -> usize {
        self.y_true.len()
    }
}

/// Everything a finished training run produced.
pub struct TrainingResult {
    pub classifier: Box<dyn Classifier>,
    pub vocabulary: LabelVocabulary,
    /// One row per phase per epoch, train before val.
    pub metrics: Vec<EpochMetric>,
    pub train_labels: LabelHistory,
    pub val_labels: LabelHistory,
}

impl TrainingResult {
    /// Metrics of the last validation phase.
    pub fn final_validation(&self) -> Option<&EpochMetric> {
        self.metrics.iter().rev().find(|m| m.phase == Phase::Val)
    }
}

struct PhaseOutcome {
    metric: EpochMetric,
    y_true: Vec<u32>,
    y_pred: Vec<u32>,
}

pub struct TrainingLoop<'a> {
    config: &'a TrainingConfig,
}

impl<'a> TrainingLoop<'a> {
    pub fn new(config: &'a TrainingConfig) -> Self {
        Self { config }
    }

    /// Train `classifier` for `config.n_epochs` epochs.
    ///
    /// Both datasets must carry labels encoded with `vocabulary`. The number of
    /// epochs is checked before any batch is drawn. Parameters are
    /// re-initialized from `config.seed`, so equal seeds give equal runs.
    pub fn fit(
        &self,
        mut classifier: Box<dyn Classifier>,
        vocabulary: LabelVocabulary,
        train: &SequenceDataset,
        val: &SequenceDataset,
    ) -> Result<TrainingResult> {
        self.config.validate()?;
        classifier.reseed(self.config.seed)?;

        let params = ParamsAdamW {
            lr: self.config.learning_rate,
            weight_decay: self.config.weight_decay,
            ..Default::default()
        };
        let mut optimizer = AdamW::new(classifier.parameters().all_vars(), params)?;

        let mut metrics = Vec::with_capacity(2 * self.config.n_epochs);
        let mut train_labels = LabelHistory::default();
        let mut val_labels = LabelHistory::default();

        for epoch in 0..self.config.n_epochs {
            let lr = self.config.learning_rate_at(epoch);
            optimizer.set_learning_rate(lr);
            debug!(epoch, lr, "learning rate");

            let outcome = self
                .run_phase(Phase::Train, epoch, classifier.as_ref(), train, Some(&mut optimizer))
                .map_err(|e| wrap(epoch, Phase::Train, e))?;
            log_metric(&outcome.metric, self.config.n_epochs);
            metrics.push(outcome.metric);
            train_labels.push(outcome);

            let outcome = self
                .run_phase(Phase::Val, epoch, classifier.as_ref(), val, None)
                .map_err(|e| wrap(epoch, Phase::Val, e))?;
            log_metric(&outcome.metric, self.config.n_epochs);
            metrics.push(outcome.metric);
            val_labels.push(outcome);
        }

        Ok(TrainingResult {
            classifier,
            vocabulary,
            metrics,
            train_labels,
            val_labels,
        })
    }

    fn run_phase(
        &self,
        phase: Phase,
        epoch: usize,
        classifier: &dyn Classifier,
        dataset: &SequenceDataset,
        mut optimizer: Option<&mut AdamW>,
    ) -> Result<PhaseOutcome> {
        let shuffle = phase == Phase::Train && self.config.shuffle;
        let batches = dataset.iterate(self.config.batch_size, shuffle, self.config.num_workers)?;

        let n = dataset.len();
        let mut y_true = vec![0u32; n];
        let mut y_pred = vec![0u32; n];
        let mut loss_sum = 0.0f64;
        let mut correct = 0usize;
        let mut seen = 0usize;

        for batch in batches {
            let batch = batch?;
            let targets = batch.labels.as_deref().ok_or_else(|| DeepnogError::MissingLabel {
                identifier: batch.identifiers.first().cloned().unwrap_or_default(),
            })?;

            let device = classifier.device();
            let inputs = batch.inputs.to_device(device)?;
            let target_tensor = Tensor::new(targets, device)?;

            let logits = match phase {
                Phase::Train => classifier.forward_train(&inputs)?,
                Phase::Val => classifier.predict(&inputs)?,
            };
            let loss = candle_nn::loss::cross_entropy(&logits, &target_tensor)?;
            if let Some(opt) = optimizer.as_deref_mut() {
                opt.backward_step(&loss)?;
            }

            let predicted = logits.argmax(D::Minus1)?.to_vec1::<u32>()?;
            loss_sum += f64::from(loss.to_scalar::<f32>()?) * batch.len() as f64;

            for ((&index, &truth), &guess) in
                batch.source_indices.iter().zip(targets).zip(&predicted)
            {
                y_true[index] = truth;
                y_pred[index] = guess;
                if truth == guess {
                    correct += 1;
                }
            }
            seen += batch.len();
            debug!(%phase, epoch, batch = batch.number, seen, "batch done");
        }

        let denominator = seen.max(1) as f64;
        Ok(PhaseOutcome {
            metric: EpochMetric {
                phase,
                epoch,
                accuracy: (correct as f64 / denominator) as f32,
                loss: (loss_sum / denominator) as f32,
            },
            y_true,
            y_pred,
        })
    }
}

fn wrap(epoch: usize, phase: Phase, source: DeepnogError) -> DeepnogError {
    DeepnogError::Training {
        epoch,
        phase: phase.to_string(),
        source: Box::new(source),
    }
}

fn log_metric(metric: &EpochMetric, n_epochs: usize) {
    info!(
        phase = %metric.phase,
        epoch = metric.epoch + 1,
        n_epochs,
        loss = metric.loss,
        accuracy = metric.accuracy,
        "epoch complete"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;
    use deepnog_core::{DeepEncoding, SequenceRecord};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn labeled(n: usize) -> (SequenceDataset, LabelVocabulary) {
        let mut labels = HashMap::new();
        let records = (0..n)
            .map(|i| {
                let (residues, label) = if i % 2 == 0 {
                    ("MKVLAAGIMKVLAAGI", "COG1")
                } else {
                    ("WWPPHHYYWWPPHHYY", "COG2")
                };
                labels.insert(format!("p{i}"), label.to_string());
                SequenceRecord::new(format!("p{i}"), residues)
            })
            .collect();
        let vocabulary = LabelVocabulary::from_labels(["COG1", "COG2"]);
        let dataset = SequenceDataset::from_records("mem", records)
            .unwrap()
            .with_labels(&labels, Arc::new(vocabulary.clone()));
        (dataset, vocabulary)
    }

    #[test]
    fn test_metrics_alternate_phases() {
        let (dataset, vocabulary) = labeled(6);
        let config = TrainingConfig::new().with_batch_size(4).with_epochs(2);
        let classifier = DeepEncoding::boxed(2, &Device::Cpu).unwrap();

        let result = TrainingLoop::new(&config)
            .fit(classifier, vocabulary, &dataset, &dataset)
            .unwrap();

        let phases: Vec<(Phase, usize)> = result.metrics.iter().map(|m| (m.phase, m.epoch)).collect();
        assert_eq!(
            phases,
            vec![(Phase::Train, 0), (Phase::Val, 0), (Phase::Train, 1), (Phase::Val, 1)]
        );
        assert!(result.metrics.iter().all(|m| (0.0..=1.0).contains(&m.accuracy)));
        assert!(result.metrics.iter().all(|m| m.loss >= 0.0));
        assert_eq!(result.train_labels.epochs(), 2);
        assert_eq!(result.val_labels.y_true[1], vec![0, 1, 0, 1, 0, 1]);
    }

    #[test]
    fn test_same_seed_same_run() {
        let config = TrainingConfig::new().with_batch_size(2).with_epochs(2).with_seed(5);
        let run = || {
            let (dataset, vocabulary) = labeled(8);
            TrainingLoop::new(&config)
                .fit(DeepEncoding::boxed(2, &Device::Cpu).unwrap(), vocabulary, &dataset, &dataset)
                .unwrap()
        };

        let first = run();
        let second = run();
        assert_eq!(first.metrics, second.metrics);
        assert_eq!(first.train_labels, second.train_labels);
        assert_eq!(first.val_labels, second.val_labels);
    }

    #[test]
    fn test_zero_epochs_rejected_before_training() {
        let (dataset, vocabulary) = labeled(2);
        let config = TrainingConfig::new().with_epochs(0);
        let classifier = DeepEncoding::boxed(2, &Device::Cpu).unwrap();

        let err = TrainingLoop::new(&config)
            .fit(classifier, vocabulary, &dataset, &dataset)
            .err()
            .unwrap();
        assert!(matches!(err, DeepnogError::InvalidEpochCount(0)));
    }

    #[test]
    fn test_missing_label_wrapped_with_phase() {
        let records = vec![SequenceRecord::new("lonely", "MKVLAAG")];
        let vocabulary = LabelVocabulary::from_labels(["COG1"]);
        let dataset = SequenceDataset::from_records("mem", records)
            .unwrap()
            .with_labels(&HashMap::new(), Arc::new(vocabulary.clone()));
        let config = TrainingConfig::new().with_epochs(1);
        let classifier = DeepEncoding::boxed(1, &Device::Cpu).unwrap();

        let err = TrainingLoop::new(&config)
            .fit(classifier, vocabulary, &dataset, &dataset)
            .err()
            .unwrap();
        match err {
            DeepnogError::Training { epoch, phase, source } => {
                assert_eq!(epoch, 0);
                assert_eq!(phase, "train");
                assert!(matches!(*source, DeepnogError::MissingLabel { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
