use serde::{Deserialize, Serialize};

/// One protein sequence as read from the input source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceRecord {
    /// Non-empty identifier from the FASTA header.
    pub identifier: String,
    /// Raw residue letters.
    pub residues: String,
    /// Orthologous group label, present only for training data.
    pub label: Option<String>,
}

impl SequenceRecord {
    pub fn new(identifier: impl Into<String>, residues: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            residues: residues.into(),
            label: None,
        }
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Classifier output for a single input record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    /// Position of the record in the dataset.
    pub source_index: usize,
    /// Identifier of the record.
    pub identifier: String,
    /// Predicted class index; `None` once masked as unassigned.
    pub predicted_class: Option<usize>,
    /// Softmax probability of the arg-max class, in `[0.0, 1.0]`.
    pub confidence: f32,
}

impl PredictionRecord {
    /// Whether the prediction was masked by a confidence threshold.
    pub fn is_unassigned(&self) -> bool {
        self.predicted_class.is_none()
    }
}
