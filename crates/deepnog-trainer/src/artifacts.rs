//! Naming and writing of training outputs: model file, evaluation table and
//! per-epoch label arrays.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use candle_core::{Device, Tensor};
use tracing::{error, info};

use deepnog_core::model::{save_classifier, MODEL_EXTENSION};
use deepnog_core::{DeepnogError, EpochMetric, Result};

use crate::trainer::{LabelHistory, TrainingResult};

const SUFFIX_LEN: usize = 4;

/// Source of the random part of an artifact name.
pub trait SuffixGenerator {
    fn suffix(&mut self) -> String;
}

/// Four lowercase ASCII letters from a time-seeded generator.
pub struct RandomSuffix {
    rng: oorandom::Rand32,
}

impl RandomSuffix {
    pub fn new() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        Self::with_seed(nanos ^ u64::from(std::process::id()))
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: oorandom::Rand32::new(seed),
        }
    }
}

impl Default for RandomSuffix {
    fn default() -> Self {
        Self::new()
    }
}

impl SuffixGenerator for RandomSuffix {
    fn suffix(&mut self) -> String {
        (0..SUFFIX_LEN)
            .map(|_| char::from(b'a' + self.rng.rand_range(0..26) as u8))
            .collect()
    }
}

/// Always returns the same suffix. Useful for reproducible file names.
#[derive(Debug, Clone)]
pub struct FixedSuffix(pub String);

impl SuffixGenerator for FixedSuffix {
    fn suffix(&mut self) -> String {
        self.0.clone()
    }
}

/// Common file-name prefix of one training run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunIdentity {
    prefix: String,
}

impl RunIdentity {
    pub fn new(database: &str, level: &str, suffixes: &mut dyn SuffixGenerator) -> Self {
        Self {
            prefix: format!("deepnog_custom_model_{database}_{level}_{}", suffixes.suffix()),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

/// Locations of the three artifacts of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub model: PathBuf,
    pub metrics: PathBuf,
    pub labels: PathBuf,
}

/// Make sure `dir` can receive artifacts: create it when missing, refuse it
/// when it is a file or already has entries.
pub fn prepare_output_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        info!(path = %dir.display(), "creating output directory");
        return fs::create_dir_all(dir).map_err(|e| DeepnogError::io(dir, e));
    }
    if !dir.is_dir() {
        return Err(DeepnogError::io(
            dir,
            std::io::Error::new(std::io::ErrorKind::NotADirectory, "not a directory"),
        ));
    }
    let mut entries = fs::read_dir(dir).map_err(|e| DeepnogError::io(dir, e))?;
    if entries.next().is_some() {
        return Err(DeepnogError::OutputDirectoryNotEmpty(dir.to_path_buf()));
    }
    Ok(())
}

pub struct ArtifactWriter {
    dir: PathBuf,
    identity: RunIdentity,
}

impl ArtifactWriter {
    pub fn new(dir: impl Into<PathBuf>, identity: RunIdentity) -> Self {
        Self {
            dir: dir.into(),
            identity,
        }
    }

    pub fn paths(&self) -> ArtifactPaths {
        let prefix = self.identity.prefix();
        ArtifactPaths {
            model: self.dir.join(format!("{prefix}_model.{MODEL_EXTENSION}")),
            metrics: self.dir.join(format!("{prefix}_eval.csv")),
            labels: self.dir.join(format!("{prefix}_labels.npz")),
        }
    }

    /// Write all artifacts. Each one is attempted even if an earlier one
    /// failed; failures are reported together.
    pub fn write(&self, result: &TrainingResult) -> Result<ArtifactPaths> {
        let paths = self.paths();
        let outcomes = [
            ("model", &paths.model, self.write_model(&paths.model, result)),
            ("metrics", &paths.metrics, self.write_metrics(&paths.metrics, &result.metrics)),
            ("labels", &paths.labels, self.write_labels(&paths.labels, result)),
        ];

        let mut failures = Vec::new();
        for (kind, path, outcome) in outcomes {
            match outcome {
                Ok(()) => info!(artifact = kind, path = %path.display(), "artifact written"),
                Err(e) => {
                    error!(artifact = kind, path = %path.display(), error = %e, "artifact not written");
                    failures.push(format!("{kind} ({}): {e}", path.display()));
                }
            }
        }

        if failures.is_empty() {
            Ok(paths)
        } else {
            Err(DeepnogError::ArtifactWrite(failures))
        }
    }

    fn write_model(&self, target: &Path, result: &TrainingResult) -> Result<()> {
        self.persist_via_temp(target, |tmp| {
            save_classifier(result.classifier.as_ref(), &result.vocabulary, tmp)
        })
    }

    fn write_metrics(&self, target: &Path, metrics: &[EpochMetric]) -> Result<()> {
        self.persist_via_temp(target, |tmp| {
            let mut writer = csv::Writer::from_path(tmp)?;
            for metric in metrics {
                writer.serialize(metric)?;
            }
            writer.flush().map_err(|e| DeepnogError::io(tmp, e))
        })
    }

    fn write_labels(&self, target: &Path, result: &TrainingResult) -> Result<()> {
        let (train_true, train_pred) = history_tensors(&result.train_labels)?;
        let (val_true, val_pred) = history_tensors(&result.val_labels)?;
        self.persist_via_temp(target, |tmp| {
            Tensor::write_npz(
                &[
                    ("y_train_true", &train_true),
                    ("y_train_pred", &train_pred),
                    ("y_val_true", &val_true),
                    ("y_val_pred", &val_pred),
                ],
                tmp,
            )?;
            Ok(())
        })
    }

    /// Write into a temporary file inside the output directory, then move it
    /// into place so that no partial artifact is left under the final name.
    fn persist_via_temp(
        &self,
        target: &Path,
        write: impl FnOnce(&Path) -> Result<()>,
    ) -> Result<()> {
        let tmp = tempfile::Builder::new()
            .prefix(".deepnog-")
            .tempfile_in(&self.dir)
            .map_err(|e| DeepnogError::io(&self.dir, e))?
            .into_temp_path();
        write(&tmp)?;
        tmp.persist(target).map_err(|e| DeepnogError::io(target, e.error))
    }
}

/// `[n_epochs, n_records]` int64 arrays of true and predicted labels.
fn history_tensors(history: &LabelHistory) -> Result<(Tensor, Tensor)> {
    Ok((to_matrix(&history.y_true)?, to_matrix(&history.y_pred)?))
}

fn to_matrix(rows: &[Vec<u32>]) -> Result<Tensor> {
    let n_rows = rows.len();
    let n_cols = rows.first().map_or(0, Vec::len);
    let flat: Vec<i64> = rows.iter().flatten().map(|&v| i64::from(v)).collect();
    Ok(Tensor::from_vec(flat, (n_rows, n_cols), &Device::Cpu)?)
}
