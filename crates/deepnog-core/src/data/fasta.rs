//! Sequence-source reader for FASTA files.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{DeepnogError, Result};
use crate::types::SequenceRecord;

/// Sequence file formats understood by [`read_sequences`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceFormat {
    Fasta,
}

impl SequenceFormat {
    /// Resolve a user-supplied format name.
    pub fn from_name(path: &Path, name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "fasta" | "fa" | "faa" => Ok(Self::Fasta),
            _ => Err(DeepnogError::Format {
                path: path.to_path_buf(),
                format: name.to_string(),
                reason: "unsupported sequence format".into(),
            }),
        }
    }
}

/// Read all records of a sequence file.
///
/// Records with an empty identifier are skipped with a warning. The result
/// may be empty; deciding whether that is an error is up to the caller.
pub fn read_sequences(path: &Path, format: &str) -> Result<Vec<SequenceRecord>> {
    match SequenceFormat::from_name(path, format)? {
        SequenceFormat::Fasta => {
            let file = File::open(path).map_err(|e| DeepnogError::io(path, e))?;
            parse_fasta(BufReader::new(file), path, format)
        }
    }
}

pub(crate) fn parse_fasta<R: BufRead>(
    reader: R,
    path: &Path,
    format: &str,
) -> Result<Vec<SequenceRecord>> {
    let mut records = Vec::new();
    let mut skipped = 0usize;
    let mut current: Option<(String, String)> = None;

    let mut finish = |entry: Option<(String, String)>, records: &mut Vec<SequenceRecord>| {
        if let Some((identifier, residues)) = entry {
            if identifier.is_empty() {
                skipped += 1;
            } else {
                records.push(SequenceRecord::new(identifier, residues));
            }
        }
    };

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| DeepnogError::Format {
            path: path.to_path_buf(),
            format: format.to_string(),
            reason: format!("line {}: {}", line_no + 1, e),
        })?;
        let line = line.trim();

        if line.is_empty() || line.starts_with(';') {
            continue;
        }

        if let Some(header) = line.strip_prefix('>') {
            finish(current.take(), &mut records);
            let identifier = header.split_whitespace().next().unwrap_or("").to_string();
            current = Some((identifier, String::new()));
            continue;
        }

        match current.as_mut() {
            Some((_, residues)) => residues.extend(line.chars().filter(|c| !c.is_whitespace())),
            None => {
                return Err(DeepnogError::Format {
                    path: path.to_path_buf(),
                    format: format.to_string(),
                    reason: format!("line {}: sequence data before first '>' header", line_no + 1),
                });
            }
        }
    }
    finish(current.take(), &mut records);

    if skipped > 0 {
        warn!(skipped, path = %path.display(), "skipped sequences without identifier");
    }
    debug!(count = records.len(), path = %path.display(), "read sequence records");
    Ok(records)
}
