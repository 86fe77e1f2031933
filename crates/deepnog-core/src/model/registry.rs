use std::collections::BTreeMap;
use std::path::Path;

use candle_core::Device;
use tracing::info;

use crate::error::{DeepnogError, Result};
use crate::model::classifier::Classifier;
use crate::model::deepencoding::DeepEncoding;
use crate::model::weights::{assign_parameters, ModelFile};
use crate::types::LabelVocabulary;

/// Builds an untrained classifier with `num_classes` outputs on a device.
pub type Constructor = fn(num_classes: usize, device: &Device) -> Result<Box<dyn Classifier>>;

/// A classifier restored from a model file together with its class names.
pub struct LoadedModel {
    pub classifier: Box<dyn Classifier>,
    pub vocabulary: LabelVocabulary,
}

/// Maps architecture names to constructors.
#[derive(Clone)]
pub struct ArchitectureRegistry {
    constructors: BTreeMap<String, Constructor>,
}

impl ArchitectureRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// A registry with every built-in architecture.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(DeepEncoding::NAME, DeepEncoding::boxed);
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, constructor: Constructor) {
        self.constructors.insert(name.into(), constructor);
    }

    pub fn names(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    fn constructor(&self, name: &str) -> Result<Constructor> {
        self.constructors
            .get(name)
            .copied()
            .ok_or_else(|| DeepnogError::UnknownArchitecture {
                name: name.to_string(),
                available: self.names().join(", "),
            })
    }

    /// Build a freshly initialized classifier.
    pub fn build(&self, name: &str, num_classes: usize, device: &Device) -> Result<Box<dyn Classifier>> {
        let constructor = self.constructor(name)?;
        constructor(num_classes, device)
    }

    /// Load a classifier and its vocabulary from a model file.
    pub fn load(&self, name: &str, path: &Path, device: &Device) -> Result<LoadedModel> {
        let constructor = self.constructor(name)?;
        let file = ModelFile::read(path, device)?;

        if file.architecture != name {
            return Err(DeepnogError::IncompatibleWeights {
                path: path.to_path_buf(),
                architecture: name.to_string(),
                reason: format!("file was saved from architecture {:?}", file.architecture),
            });
        }
        if file.vocabulary.is_empty() {
            return Err(DeepnogError::IncompatibleWeights {
                path: path.to_path_buf(),
                architecture: name.to_string(),
                reason: "file lists no classes".into(),
            });
        }

        let mut classifier = constructor(file.vocabulary.len(), device)?;
        assign_parameters(classifier.parameters(), &file.tensors, path, name)?;
        classifier.set_threshold(file.threshold);

        info!(
            path = %path.display(),
            architecture = name,
            classes = file.vocabulary.len(),
            "loaded classifier"
        );
        Ok(LoadedModel {
            classifier,
            vocabulary: file.vocabulary,
        })
    }
}

impl Default for ArchitectureRegistry {
    fn default() -> Self {
        Self::new()
    }
}
