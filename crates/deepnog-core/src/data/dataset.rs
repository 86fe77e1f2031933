//! Indexed protein datasets and batched iteration.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::JoinHandle;

use candle_core::Tensor;
use tracing::{debug, warn};

use crate::data::encoder::BatchEncoder;
use crate::data::fasta::read_sequences;
use crate::error::{DeepnogError, Result};
use crate::types::{LabelVocabulary, SequenceRecord};

/// Default seed for shuffled iteration.
pub const DEFAULT_SEED: u64 = 123;

/// A padded minibatch with its provenance.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Position of this batch in the iteration plan.
    pub number: usize,
    /// Residue codes, `[batch_size, max_len_in_batch]`, on the CPU.
    pub inputs: Tensor,
    pub identifiers: Vec<String>,
    pub source_indices: Vec<usize>,
    /// Class indices, present when the dataset carries labels.
    pub labels: Option<Vec<u32>>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.source_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source_indices.is_empty()
    }
}

/// Protein sequences loaded from one source, addressable by index.
#[derive(Debug)]
pub struct SequenceDataset {
    source: PathBuf,
    records: Arc<Vec<SequenceRecord>>,
    vocabulary: Option<Arc<LabelVocabulary>>,
    seed: u64,
    rounds: AtomicU64,
}

impl SequenceDataset {
    /// Read a sequence file.
    ///
    /// Fails with [`DeepnogError::Format`] when the file cannot be parsed and
    /// with [`DeepnogError::EmptyInput`] when it holds no valid record.
    pub fn open(path: impl AsRef<Path>, format: &str) -> Result<Self> {
        let path = path.as_ref();
        let records = read_sequences(path, format)?;
        Self::from_records(path, records)
    }

    /// Wrap records that were produced elsewhere.
    pub fn from_records(source: impl Into<PathBuf>, records: Vec<SequenceRecord>) -> Result<Self> {
        let source = source.into();
        if records.is_empty() {
            return Err(DeepnogError::EmptyInput { path: source });
        }

        let mut seen = HashSet::with_capacity(records.len());
        let duplicates = records
            .iter()
            .filter(|r| !seen.insert(r.identifier.as_str()))
            .count();
        if duplicates > 0 {
            warn!(duplicates, source = %source.display(), "duplicate sequence identifiers");
        }

        Ok(Self {
            source,
            records: Arc::new(records),
            vocabulary: None,
            seed: DEFAULT_SEED,
            rounds: AtomicU64::new(0),
        })
    }

    /// Seed for shuffled iteration. Each shuffled pass draws a new order
    /// from this seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Attach training labels. Records without an entry keep no label and
    /// fail batch construction later with [`DeepnogError::MissingLabel`].
    #[must_use]
    pub fn with_labels(
        mut self,
        labels: &HashMap<String, String>,
        vocabulary: Arc<LabelVocabulary>,
    ) -> Self {
        for record in Arc::make_mut(&mut self.records).iter_mut() {
            record.label = labels.get(&record.identifier).cloned();
        }
        self.vocabulary = Some(vocabulary);
        self
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn records(&self) -> &[SequenceRecord] {
        &self.records
    }

    pub fn vocabulary(&self) -> Option<&LabelVocabulary> {
        self.vocabulary.as_deref()
    }

    /// Iterate over the dataset in minibatches.
    ///
    /// `batch_size` must be at least one. With `num_workers == 0` batches are
    /// built lazily on the calling thread; otherwise a pool of loader threads
    /// prefetches them. Either way batches are yielded in plan order.
    pub fn iterate(&self, batch_size: usize, shuffle: bool, num_workers: usize) -> Result<Batches> {
        if batch_size == 0 {
            return Err(DeepnogError::InvalidBatchSize(0));
        }

        let mut order: Vec<usize> = (0..self.records.len()).collect();
        if shuffle {
            let round = self.rounds.fetch_add(1, Ordering::Relaxed);
            let mut rng = oorandom::Rand64::new(u128::from(self.seed) << 64 | u128::from(round));
            for i in (1..order.len()).rev() {
                let j = rng.rand_range(0..(i as u64 + 1)) as usize;
                order.swap(i, j);
            }
        }
        let plan: Vec<Vec<usize>> = order.chunks(batch_size).map(<[usize]>::to_vec).collect();

        let builder = Arc::new(BatchBuilder {
            records: Arc::clone(&self.records),
            vocabulary: self.vocabulary.clone(),
            encoder: BatchEncoder::new(),
        });

        debug!(
            batches = plan.len(),
            batch_size,
            shuffle,
            num_workers,
            source = %self.source.display(),
            "iterating dataset"
        );

        if num_workers == 0 {
            return Ok(Batches {
                total: plan.len(),
                source: BatchSource::Inline {
                    builder,
                    plan: plan.into_iter().enumerate(),
                },
            });
        }
        Batches::prefetch(builder, plan, num_workers)
    }
}

struct BatchBuilder {
    records: Arc<Vec<SequenceRecord>>,
    vocabulary: Option<Arc<LabelVocabulary>>,
    encoder: BatchEncoder,
}

impl BatchBuilder {
    fn build(&self, number: usize, indices: &[usize]) -> Result<Batch> {
        let records: Vec<&SequenceRecord> = indices.iter().map(|&i| &self.records[i]).collect();

        let labels = match &self.vocabulary {
            Some(vocabulary) => {
                let mut encoded = Vec::with_capacity(records.len());
                for record in &records {
                    let class = record
                        .label
                        .as_deref()
                        .and_then(|label| vocabulary.encode(label))
                        .ok_or_else(|| DeepnogError::MissingLabel {
                            identifier: record.identifier.clone(),
                        })?;
                    encoded.push(class as u32);
                }
                Some(encoded)
            }
            None => None,
        };

        let residues: Vec<&str> = records.iter().map(|r| r.residues.as_str()).collect();
        Ok(Batch {
            number,
            inputs: self.encoder.encode_batch(&residues)?,
            identifiers: records.iter().map(|r| r.identifier.clone()).collect(),
            source_indices: indices.to_vec(),
            labels,
        })
    }
}

enum BatchSource {
    Inline {
        builder: Arc<BatchBuilder>,
        plan: std::iter::Enumerate<std::vec::IntoIter<Vec<usize>>>,
    },
    Prefetch {
        rx: Option<Receiver<(usize, Result<Batch>)>>,
        workers: Vec<JoinHandle<()>>,
        /// Batches that completed ahead of `next`.
        pending: BTreeMap<usize, Result<Batch>>,
        next: usize,
    },
}

/// Single-use stream of batches produced by [`SequenceDataset::iterate`].
pub struct Batches {
    total: usize,
    source: BatchSource,
}

impl Batches {
    fn prefetch(builder: Arc<BatchBuilder>, plan: Vec<Vec<usize>>, num_workers: usize) -> Result<Self> {
        let total = plan.len();
        let num_workers = num_workers.min(total.max(1));
        let (tx, rx) = mpsc::sync_channel(2 * num_workers);
        let plan = Arc::new(plan);

        let mut workers = Vec::with_capacity(num_workers);
        for worker in 0..num_workers {
            let tx = tx.clone();
            let plan = Arc::clone(&plan);
            let builder = Arc::clone(&builder);
            let handle = std::thread::Builder::new()
                .name(format!("deepnog-loader-{worker}"))
                .spawn(move || {
                    for number in (worker..plan.len()).step_by(num_workers) {
                        // A closed channel means the consumer stopped early.
                        if tx.send((number, builder.build(number, &plan[number]))).is_err() {
                            return;
                        }
                    }
                })
                .map_err(|e| DeepnogError::io("deepnog-loader", e))?;
            workers.push(handle);
        }

        Ok(Self {
            total,
            source: BatchSource::Prefetch {
                rx: Some(rx),
                workers,
                pending: BTreeMap::new(),
                next: 0,
            },
        })
    }

    /// Number of batches in the plan.
    pub fn total(&self) -> usize {
        self.total
    }
}

impl Iterator for Batches {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        let total = self.total;
        match &mut self.source {
            BatchSource::Inline { builder, plan } => {
                plan.next().map(|(number, indices)| builder.build(number, &indices))
            }
            BatchSource::Prefetch {
                rx, pending, next, ..
            } => {
                if *next >= total {
                    return None;
                }
                loop {
                    if let Some(batch) = pending.remove(next) {
                        *next += 1;
                        return Some(batch);
                    }
                    let (number, batch) = rx.as_ref()?.recv().ok()?;
                    pending.insert(number, batch);
                }
            }
        }
    }
}

impl Drop for Batches {
    fn drop(&mut self) {
        if let BatchSource::Prefetch { rx, workers, .. } = &mut self.source {
            drop(rx.take());
            for handle in workers.drain(..) {
                if handle.join().is_err() {
                    warn!("data loader thread panicked");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(n: usize) -> SequenceDataset {
        let records = (0..n)
            .map(|i| SequenceRecord::new(format!("seq{i}"), "MKV".repeat(i % 4 + 1)))
            .collect();
        SequenceDataset::from_records("mem", records).unwrap()
    }

    fn collect(batches: Batches) -> Vec<Batch> {
        batches.collect::<Result<Vec<_>>>().unwrap()
    }

    #[test]
    fn test_empty_dataset_rejected() {
        let err = SequenceDataset::from_records("empty.faa", Vec::new()).unwrap_err();
        assert!(matches!(err, DeepnogError::EmptyInput { .. }));
    }

    #[test]
    fn test_sequential_batches_cover_dataset_in_order() {
        let data = dataset(7);
        let batches = collect(data.iterate(3, false, 0).unwrap());
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[2].len(), 1);

        let indices: Vec<usize> = batches.iter().flat_map(|b| b.source_indices.clone()).collect();
        assert_eq!(indices, (0..7).collect::<Vec<_>>());
        for batch in &batches {
            assert_eq!(batch.identifiers.len(), batch.inputs.dims()[0]);
            assert!(batch.labels.is_none());
        }
        assert_eq!(batches[0].identifiers[1], "seq1");
    }

    #[test]
    fn test_padding_is_per_batch() {
        let data = dataset(8);
        let batches = collect(data.iterate(1, false, 0).unwrap());
        assert_eq!(batches[0].inputs.dims(), &[1, 3]);
        assert_eq!(batches[3].inputs.dims(), &[1, 12]);
    }

    #[test]
    fn test_shuffle_is_a_permutation_and_changes_per_pass() {
        let data = dataset(50).with_seed(7);
        let first: Vec<usize> = collect(data.iterate(4, true, 0).unwrap())
            .iter()
            .flat_map(|b| b.source_indices.clone())
            .collect();
        let second: Vec<usize> = collect(data.iterate(4, true, 0).unwrap())
            .iter()
            .flat_map(|b| b.source_indices.clone())
            .collect();

        let mut sorted = first.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..50).collect::<Vec<_>>());
        assert_ne!(first, second);
    }

    #[test]
    fn test_workers_deliver_every_batch_once() {
        let data = dataset(23);
        let batches = collect(data.iterate(2, false, 3).unwrap());
        assert_eq!(batches.len(), 12);

        let numbers: Vec<usize> = batches.iter().map(|b| b.number).collect();
        assert_eq!(numbers, (0..12).collect::<Vec<_>>());
        let indices: Vec<usize> = batches.iter().flat_map(|b| b.source_indices.clone()).collect();
        assert_eq!(indices, (0..23).collect::<Vec<_>>());
    }

    #[test]
    fn test_workers_follow_the_shuffled_plan() {
        let inline: Vec<usize> = collect(dataset(40).with_seed(9).iterate(3, true, 0).unwrap())
            .iter()
            .flat_map(|b| b.source_indices.clone())
            .collect();
        let pooled: Vec<usize> = collect(dataset(40).with_seed(9).iterate(3, true, 4).unwrap())
            .iter()
            .flat_map(|b| b.source_indices.clone())
            .collect();
        assert_eq!(inline, pooled);
    }

    #[test]
    fn test_dropping_prefetch_early_joins_workers() {
        let data = dataset(64);
        let mut batches = data.iterate(1, false, 4).unwrap();
        let first = batches.next().unwrap().unwrap();
        assert_eq!(first.number, 0);
        drop(batches);
    }

    #[test]
    fn test_labels_are_encoded() {
        let labels: HashMap<String, String> = [("seq0", "B"), ("seq1", "A"), ("seq2", "B")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let vocab = Arc::new(LabelVocabulary::from_labels(labels.values().cloned()));
        let data = dataset(3).with_labels(&labels, vocab);

        let batches = collect(data.iterate(3, false, 0).unwrap());
        assert_eq!(batches[0].labels.as_deref(), Some(&[1, 0, 1][..]));
    }

    #[test]
    fn test_missing_label_names_identifier() {
        let labels: HashMap<String, String> =
            [("seq0".to_string(), "A".to_string())].into_iter().collect();
        let vocab = Arc::new(LabelVocabulary::from_labels(["A"]));
        let data = dataset(2).with_labels(&labels, vocab);

        let err = data
            .iterate(2, false, 0)
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap_err();
        match err {
            DeepnogError::MissingLabel { identifier } => assert_eq!(identifier, "seq1"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        assert!(matches!(
            dataset(2).iterate(0, false, 0),
            Err(DeepnogError::InvalidBatchSize(0))
        ));
    }
}
