pub mod dataset;
pub mod encoder;
pub mod fasta;
pub mod labels;

pub use dataset::{Batch, Batches, SequenceDataset, DEFAULT_SEED};
pub use encoder::{BatchEncoder, ALPHABET, PAD_CODE, UNKNOWN_CODE, VOCAB_SIZE};
pub use fasta::{read_sequences, SequenceFormat};
pub use labels::read_labels;
