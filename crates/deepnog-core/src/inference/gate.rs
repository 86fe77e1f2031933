//! Confidence-based masking of predictions.

use tracing::info;

use crate::error::{DeepnogError, Result};
use crate::types::PredictionRecord;

/// Check that a threshold lies in `[0.0, 1.0]`.
pub fn validate_threshold(threshold: f32) -> Result<f32> {
    if (0.0..=1.0).contains(&threshold) {
        Ok(threshold)
    } else {
        Err(DeepnogError::InvalidThreshold(threshold))
    }
}

/// Masks predictions whose confidence is below a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ConfidenceGate {
    threshold: Option<f32>,
}

impl ConfidenceGate {
    pub fn new(threshold: Option<f32>) -> Result<Self> {
        let threshold = threshold.map(validate_threshold).transpose()?;
        Ok(Self { threshold })
    }

    /// A gate that passes every record through.
    pub fn disabled() -> Self {
        Self { threshold: None }
    }

    /// Pick the threshold: user override first, then the model default,
    /// otherwise no masking.
    pub fn resolve(user: Option<f32>, model: Option<f32>) -> Result<Self> {
        match (user, model) {
            (Some(threshold), _) => {
                info!(threshold, "applying user confidence threshold");
                Self::new(Some(threshold))
            }
            (None, Some(threshold)) => {
                info!(threshold, "applying confidence threshold from model");
                Self::new(Some(threshold))
            }
            (None, None) => {
                info!("no confidence threshold, predictions are not masked");
                Ok(Self::disabled())
            }
        }
    }

    pub fn threshold(&self) -> Option<f32> {
        self.threshold
    }

    /// Replace the class of every record with confidence strictly below the
    /// threshold by the unassigned marker. Confidences and row count are
    /// never changed.
    pub fn apply(&self, mut records: Vec<PredictionRecord>) -> Vec<PredictionRecord> {
        let Some(threshold) = self.threshold else {
            return records;
        };

        let mut masked = 0usize;
        for record in records.iter_mut().filter(|r| r.confidence < threshold) {
            record.predicted_class = None;
            masked += 1;
        }
        info!(masked, total = records.len(), threshold, "masked low-confidence predictions");
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records() -> Vec<PredictionRecord> {
        [0.2f32, 0.5, 0.5001, 0.99]
            .iter()
            .enumerate()
            .map(|(i, &confidence)| PredictionRecord {
                source_index: i,
                identifier: format!("p{i}"),
                predicted_class: Some(i),
                confidence,
            })
            .collect()
    }

    #[test]
    fn test_none_is_identity() {
        let gate = ConfidenceGate::new(None).unwrap();
        assert_eq!(gate.apply(records()), records());
    }

    #[test]
    fn test_masks_strictly_below() {
        let gated = ConfidenceGate::new(Some(0.5)).unwrap().apply(records());
        assert_eq!(gated.len(), 4);
        assert_eq!(gated[0].predicted_class, None);
        assert_eq!(gated[1].predicted_class, Some(1));
        assert_eq!(gated[3].predicted_class, Some(3));

        for (before, after) in records().iter().zip(&gated) {
            assert_eq!(before.confidence, after.confidence);
            assert_eq!(before.identifier, after.identifier);
        }
    }

    #[test]
    fn test_threshold_bounds() {
        assert!(ConfidenceGate::new(Some(0.0)).is_ok());
        assert!(ConfidenceGate::new(Some(1.0)).is_ok());
        assert!(matches!(
            ConfidenceGate::new(Some(-0.01)),
            Err(DeepnogError::InvalidThreshold(_))
        ));
        assert!(matches!(
            ConfidenceGate::new(Some(1.000001)),
            Err(DeepnogError::InvalidThreshold(_))
        ));
        assert!(ConfidenceGate::new(Some(f32::NAN)).is_err());
    }

    #[test]
    fn test_resolve_precedence() {
        assert_eq!(
            ConfidenceGate::resolve(Some(0.3), Some(0.8)).unwrap().threshold(),
            Some(0.3)
        );
        assert_eq!(ConfidenceGate::resolve(None, Some(0.8)).unwrap().threshold(), Some(0.8));
        assert_eq!(ConfidenceGate::resolve(None, None).unwrap().threshold(), None);
        assert!(ConfidenceGate::resolve(Some(2.0), Some(0.8)).is_err());
    }

    #[test]
    fn test_threshold_one_masks_all_but_certain() {
        let gated = ConfidenceGate::new(Some(1.0)).unwrap().apply(records());
        assert!(gated.iter().all(PredictionRecord::is_unassigned));
    }
}
