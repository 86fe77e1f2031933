//! Model files: parameters plus class vocabulary in a single safetensors
//! file, and lookup of installed weights for built-in databases.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use candle_core::{Device, Tensor};
use candle_nn::VarMap;
use tracing::debug;

use crate::error::{DeepnogError, Result};
use crate::model::classifier::Classifier;
use crate::types::LabelVocabulary;

pub const META_ARCHITECTURE: &str = "architecture";
pub const META_CLASSES: &str = "classes";
pub const META_THRESHOLD: &str = "threshold";

/// File extension of model files.
pub const MODEL_EXTENSION: &str = "safetensors";

/// Contents of a model file before it is bound to an architecture.
#[derive(Debug)]
pub struct ModelFile {
    pub architecture: String,
    pub vocabulary: LabelVocabulary,
    pub threshold: Option<f32>,
    pub tensors: HashMap<String, Tensor>,
}

impl ModelFile {
    /// Read a model file, placing tensors on `device`.
    pub fn read(path: &Path, device: &Device) -> Result<Self> {
        let buffer = std::fs::read(path).map_err(|e| DeepnogError::io(path, e))?;
        let load_error = |reason: String| DeepnogError::ModelLoad {
            path: path.to_path_buf(),
            reason,
        };

        let (_, header) = safetensors::SafeTensors::read_metadata(&buffer)
            .map_err(|e| load_error(e.to_string()))?;
        let metadata = header.metadata().clone().unwrap_or_default();

        let architecture = metadata
            .get(META_ARCHITECTURE)
            .cloned()
            .ok_or_else(|| load_error(format!("missing {META_ARCHITECTURE:?} metadata")))?;
        let classes = metadata
            .get(META_CLASSES)
            .ok_or_else(|| load_error(format!("missing {META_CLASSES:?} metadata")))?;
        let vocabulary: LabelVocabulary = serde_json::from_str(classes)
            .map_err(|e| load_error(format!("invalid class list: {e}")))?;
        let threshold = metadata
            .get(META_THRESHOLD)
            .map(|t| t.parse::<f32>())
            .transpose()
            .map_err(|e| load_error(format!("invalid threshold: {e}")))?;

        let tensors = candle_core::safetensors::load_buffer(&buffer, device)?;
        debug!(
            path = %path.display(),
            architecture,
            classes = vocabulary.len(),
            tensors = tensors.len(),
            "read model file"
        );

        Ok(Self {
            architecture,
            vocabulary,
            threshold,
            tensors,
        })
    }
}

/// Write a classifier's parameters and class vocabulary to `path`.
pub fn save_classifier(
    classifier: &dyn Classifier,
    vocabulary: &LabelVocabulary,
    path: &Path,
) -> Result<()> {
    let tensors: BTreeMap<String, Tensor> = {
        let data = classifier.parameters().data().lock().map_err(|_| DeepnogError::ModelLoad {
            path: path.to_path_buf(),
            reason: "parameter store lock poisoned".into(),
        })?;
        data.iter()
            .map(|(name, var)| (name.clone(), var.as_tensor().clone()))
            .collect()
    };

    let mut metadata = HashMap::new();
    metadata.insert(META_ARCHITECTURE.to_string(), classifier.architecture().to_string());
    metadata.insert(
        META_CLASSES.to_string(),
        serde_json::to_string(vocabulary).map_err(|e| {
            DeepnogError::io(path, std::io::Error::other(e))
        })?,
    );
    if let Some(threshold) = classifier.threshold() {
        metadata.insert(META_THRESHOLD.to_string(), threshold.to_string());
    }

    safetensors::serialize_to_file(
        tensors.iter().map(|(name, tensor)| (name.as_str(), tensor)),
        &Some(metadata),
        path,
    )
    .map_err(|e| DeepnogError::io(path, std::io::Error::other(e.to_string())))
}

/// Copy loaded tensors into a classifier's parameter store.
///
/// Every parameter must be present with the expected shape and the file
/// must not carry tensors the architecture does not know.
pub fn assign_parameters(
    varmap: &VarMap,
    tensors: &HashMap<String, Tensor>,
    path: &Path,
    architecture: &str,
) -> Result<()> {
    let incompatible = |reason: String| DeepnogError::IncompatibleWeights {
        path: path.to_path_buf(),
        architecture: architecture.to_string(),
        reason,
    };

    let data = varmap.data().lock().map_err(|_| DeepnogError::ModelLoad {
        path: path.to_path_buf(),
        reason: "parameter store lock poisoned".into(),
    })?;

    let mut unexpected: Vec<&String> = tensors.keys().filter(|k| !data.contains_key(*k)).collect();
    unexpected.sort();
    if let Some(name) = unexpected.first() {
        return Err(incompatible(format!("unexpected tensor {name:?}")));
    }

    let mut names: Vec<&String> = data.keys().collect();
    names.sort();
    for name in names {
        let var = &data[name];
        let loaded = tensors
            .get(name)
            .ok_or_else(|| incompatible(format!("missing tensor {name:?}")))?;
        if loaded.dims() != var.dims() {
            return Err(incompatible(format!(
                "tensor {name:?} has shape {:?}, expected {:?}",
                loaded.dims(),
                var.dims()
            )));
        }
        var.set(&loaded.to_dtype(var.dtype())?)?;
    }
    Ok(())
}

/// Locates installed weights for built-in databases.
///
/// Files live at `{root}/{database}/{level}/{architecture}.safetensors`.
#[derive(Debug, Clone)]
pub struct WeightsResolver {
    root: PathBuf,
}

impl WeightsResolver {
    /// Environment variable overriding the weights root.
    pub const ENV_VAR: &'static str = "DEEPNOG_DATA";

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root from `$DEEPNOG_DATA`, else `<platform data dir>/deepnog`.
    pub fn from_env() -> Self {
        match std::env::var_os(Self::ENV_VAR) {
            Some(root) => Self::new(root),
            None => Self::new(
                dirs::data_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("deepnog"),
            ),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, database: &str, level: &str, architecture: &str) -> PathBuf {
        self.root
            .join(database)
            .join(level)
            .join(format!("{architecture}.{MODEL_EXTENSION}"))
    }

    /// Path of the installed weights, if the file exists.
    pub fn lookup(&self, database: &str, level: &str, architecture: &str) -> Option<PathBuf> {
        let path = self.path_for(database, level, architecture);
        path.is_file().then_some(path)
    }
}
