//! Label-source reader for training data.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{DeepnogError, Result};

const ID_COLUMNS: &[&str] = &["protein_id", "sequence_id"];
const LABEL_COLUMNS: &[&str] = &["eggnog_id", "label"];

/// Read a CSV label file into an identifier → label mapping.
///
/// The identifier column is `protein_id` (or `sequence_id`) and the label
/// column `eggnog_id` (or `label`). Files without those headers use their
/// last two columns.
pub fn read_labels(path: &Path) -> Result<HashMap<String, String>> {
    let reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| label_error(path, e))?;
    parse_labels(reader, path)
}

pub(crate) fn parse_labels<R: Read>(
    mut reader: csv::Reader<R>,
    path: &Path,
) -> Result<HashMap<String, String>> {
    let headers = reader.headers().map_err(|e| label_error(path, e))?.clone();
    let find = |names: &[&str]| {
        headers
            .iter()
            .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
    };

    let (id_col, label_col) = match (find(ID_COLUMNS), find(LABEL_COLUMNS)) {
        (Some(id), Some(label)) => (id, label),
        _ if headers.len() >= 2 => (headers.len() - 2, headers.len() - 1),
        _ => {
            return Err(DeepnogError::Format {
                path: path.to_path_buf(),
                format: "csv".into(),
                reason: "expected an identifier and a label column".into(),
            });
        }
    };

    let mut labels = HashMap::new();
    let mut conflicts = 0usize;
    for row in reader.records() {
        let row = row.map_err(|e| label_error(path, e))?;
        let (Some(id), Some(label)) = (row.get(id_col), row.get(label_col)) else {
            continue;
        };
        let (id, label) = (id.trim(), label.trim());
        if id.is_empty() || label.is_empty() {
            continue;
        }
        if let Some(previous) = labels.insert(id.to_string(), label.to_string()) {
            if previous != label {
                conflicts += 1;
            }
        }
    }

    if conflicts > 0 {
        warn!(conflicts, path = %path.display(), "identifiers with conflicting labels, keeping the last one");
    }
    debug!(count = labels.len(), path = %path.display(), "read labels");
    Ok(labels)
}

fn label_error(path: &Path, err: csv::Error) -> DeepnogError {
    DeepnogError::Format {
        path: path.to_path_buf(),
        format: "csv".into(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<HashMap<String, String>> {
        let reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(text.as_bytes());
        parse_labels(reader, Path::new("labels.csv"))
    }

    #[test]
    fn test_named_columns_with_index() {
        let labels = parse(",protein_id,eggnog_id\n0,P1,COG0001\n1,P2,COG0002\n").unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels["P1"], "COG0001");
        assert_eq!(labels["P2"], "COG0002");
    }

    #[test]
    fn test_fallback_to_last_two_columns() {
        let labels = parse("id,name,group\n1,P1,A\n2,P2,B\n").unwrap();
        assert_eq!(labels["P1"], "A");
        assert_eq!(labels["P2"], "B");
    }

    #[test]
    fn test_single_column_is_error() {
        let err = parse("protein_id\nP1\n").unwrap_err();
        assert!(matches!(err, DeepnogError::Format { .. }));
    }

    #[test]
    fn test_missing_file_is_format_error() {
        let err = read_labels(Path::new("/nonexistent/labels.csv")).unwrap_err();
        assert!(err.to_string().contains("labels.csv"));
    }
}
