use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

/// Frozen mapping between orthologous group names and class indices.
///
/// Class indices are contiguous in `[0, num_classes)` and follow the sorted
/// order of the label strings, so the same label set always yields the same
/// encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct LabelVocabulary {
    classes: Vec<String>,
    index: HashMap<String, usize>,
}

impl LabelVocabulary {
    /// Build a vocabulary from every label seen in a label source.
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let unique: BTreeSet<String> = labels.into_iter().map(Into::into).collect();
        Self::from_classes(unique.into_iter().collect())
    }

    /// Rebuild a vocabulary from an ordered class list, e.g. one stored in a
    /// model file. Duplicates keep their first position.
    pub fn from_classes(classes: Vec<String>) -> Self {
        let mut ordered = Vec::with_capacity(classes.len());
        let mut index = HashMap::with_capacity(classes.len());
        for class in classes {
            if !index.contains_key(&class) {
                index.insert(class.clone(), ordered.len());
                ordered.push(class);
            }
        }
        Self {
            classes: ordered,
            index,
        }
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Class index of a label.
    pub fn encode(&self, label: &str) -> Option<usize> {
        self.index.get(label).copied()
    }

    /// Label of a class index.
    pub fn decode(&self, index: usize) -> Option<&str> {
        self.classes.get(index).map(String::as_str)
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }
}

impl From<Vec<String>> for LabelVocabulary {
    fn from(classes: Vec<String>) -> Self {
        Self::from_classes(classes)
    }
}

impl From<LabelVocabulary> for Vec<String> {
    fn from(vocabulary: LabelVocabulary) -> Self {
        vocabulary.classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorted_contiguous_indices() {
        let vocab = LabelVocabulary::from_labels(["ZYX12", "28H52", "99A99", "28H52"]);
        assert_eq!(vocab.len(), 3);
        assert_eq!(vocab.classes(), ["28H52", "99A99", "ZYX12"]);
        assert_eq!(vocab.encode("28H52"), Some(0));
        assert_eq!(vocab.encode("ZYX12"), Some(2));
        assert_eq!(vocab.decode(1), Some("99A99"));
        assert_eq!(vocab.decode(3), None);
        assert_eq!(vocab.encode("COG0001"), None);
    }

    #[test]
    fn test_json_roundtrip_keeps_order() {
        let vocab = LabelVocabulary::from_classes(vec!["b".into(), "a".into()]);
        let json = serde_json::to_string(&vocab).unwrap();
        assert_eq!(json, r#"["b","a"]"#);

        let back: LabelVocabulary = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vocab);
        assert_eq!(back.encode("b"), Some(0));
    }
}
