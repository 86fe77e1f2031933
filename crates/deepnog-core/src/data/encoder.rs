//! Residue encoding and per-batch padding.

use candle_core::{Device, Tensor};

use crate::error::Result;

/// Residue letters with a dedicated code, in code order starting at 1.
pub const ALPHABET: &str = "ACDEFGHIKLMNPQRSTVWYBZJUO";

/// Code reserved for padding.
pub const PAD_CODE: u32 = 0;

/// Code for `X` and every symbol outside [`ALPHABET`].
pub const UNKNOWN_CODE: u32 = ALPHABET.len() as u32 + 1;

/// Number of distinct codes, padding and unknown included.
pub const VOCAB_SIZE: usize = ALPHABET.len() + 2;

/// Amino-acid encoder producing right-padded `[batch, max_len]` tensors.
#[derive(Debug, Clone)]
pub struct BatchEncoder {
    table: [u32; 128],
}

impl BatchEncoder {
    pub fn new() -> Self {
        let mut table = [UNKNOWN_CODE; 128];
        for (i, c) in ALPHABET.bytes().enumerate() {
            let code = i as u32 + 1;
            table[c as usize] = code;
            table[c.to_ascii_lowercase() as usize] = code;
        }
        Self { table }
    }

    /// Code of a single residue. Never fails.
    pub fn encode_residue(&self, residue: char) -> u32 {
        if residue.is_ascii() {
            self.table[residue as usize]
        } else {
            UNKNOWN_CODE
        }
    }

    pub fn encode(&self, residues: &str) -> Vec<u32> {
        residues.chars().map(|c| self.encode_residue(c)).collect()
    }

    /// Encode a batch and right-pad every row to the longest sequence of
    /// this batch.
    pub fn encode_batch<S: AsRef<str>>(&self, sequences: &[S]) -> Result<Tensor> {
        let encoded: Vec<Vec<u32>> = sequences.iter().map(|s| self.encode(s.as_ref())).collect();
        let max_len = encoded.iter().map(Vec::len).max().unwrap_or(0).max(1);

        let mut flat = Vec::with_capacity(encoded.len() * max_len);
        for row in &encoded {
            flat.extend_from_slice(row);
            flat.resize(flat.len() + (max_len - row.len()), PAD_CODE);
        }

        Ok(Tensor::from_vec(flat, (encoded.len(), max_len), &Device::Cpu)?)
    }
}

impl Default for BatchEncoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alphabet_codes() {
        let encoder = BatchEncoder::new();
        assert_eq!(encoder.encode("ACD"), vec![1, 2, 3]);
        assert_eq!(encoder.encode("acd"), vec![1, 2, 3]);
        assert_eq!(encoder.encode_residue('O'), ALPHABET.len() as u32);
        assert_eq!(VOCAB_SIZE, 27);
    }

    #[test]
    fn test_unknown_residues_degrade() {
        let encoder = BatchEncoder::new();
        assert_eq!(encoder.encode("X*1é"), vec![UNKNOWN_CODE; 4]);
        assert_ne!(UNKNOWN_CODE, PAD_CODE);
    }

    #[test]
    fn test_pads_to_batch_maximum() {
        let encoder = BatchEncoder::new();
        let tensor = encoder.encode_batch(&["MK", "MKVL", "A"]).unwrap();
        assert_eq!(tensor.dims(), &[3, 4]);

        let rows = tensor.to_vec2::<u32>().unwrap();
        assert_eq!(rows[0], vec![11, 9, 0, 0]);
        assert_eq!(rows[2], vec![1, 0, 0, 0]);

        let short = encoder.encode_batch(&["MK"]).unwrap();
        assert_eq!(short.dims(), &[1, 2]);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let encoder = BatchEncoder::new();
        let batch = ["MKVLAAGIW", "PPQ"];
        let a = encoder.encode_batch(&batch).unwrap().to_vec2::<u32>().unwrap();
        let b = encoder.encode_batch(&batch).unwrap().to_vec2::<u32>().unwrap();
        assert_eq!(a, b);
    }
}
