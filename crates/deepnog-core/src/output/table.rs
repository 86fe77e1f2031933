//! Prediction tables and their rendering.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::{DeepnogError, Result};
use crate::types::{LabelVocabulary, PredictionRecord};

/// File name used when the output destination is a directory.
pub const DEFAULT_OUTPUT_NAME: &str = "out.csv";

/// Column layout shared by every output format.
pub const COLUMNS: [&str; 3] = ["sequence_id", "prediction", "confidence"];

/// Separator variants of the result table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Csv,
    Tsv,
    Legacy,
}

impl OutputFormat {
    pub fn delimiter(&self) -> u8 {
        match self {
            OutputFormat::Csv => b',',
            OutputFormat::Tsv => b'\t',
            OutputFormat::Legacy => b';',
        }
    }
}

impl FromStr for OutputFormat {
    type Err = DeepnogError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "csv" => Ok(OutputFormat::Csv),
            "tsv" => Ok(OutputFormat::Tsv),
            "legacy" => Ok(OutputFormat::Legacy),
            other => Err(DeepnogError::UnsupportedOutputFormat(other.to_string())),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Tsv => "tsv",
            OutputFormat::Legacy => "legacy",
        })
    }
}

/// One output row. An unassigned prediction is an empty string.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRow {
    pub sequence_id: String,
    pub prediction: String,
    pub confidence: f32,
}

/// Predictions joined with class names, ordered by source index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTable {
    rows: Vec<ResultRow>,
}

impl ResultTable {
    /// Join predictions with the class names of `vocabulary`.
    pub fn assemble(
        vocabulary: &LabelVocabulary,
        mut predictions: Vec<PredictionRecord>,
    ) -> Result<Self> {
        predictions.sort_by_key(|p| p.source_index);

        let rows = predictions
            .into_iter()
            .map(|p| {
                let prediction = match p.predicted_class {
                    Some(index) => vocabulary
                        .decode(index)
                        .ok_or(DeepnogError::UnknownClass {
                            index,
                            num_classes: vocabulary.len(),
                        })?
                        .to_string(),
                    None => String::new(),
                };
                Ok(ResultRow {
                    sequence_id: p.identifier,
                    prediction,
                    confidence: p.confidence,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Write the table with a header line to `writer`.
    pub fn write<W: Write>(&self, writer: W, format: OutputFormat) -> Result<()> {
        let mut csv = csv::WriterBuilder::new()
            .delimiter(format.delimiter())
            .has_headers(true)
            .from_writer(writer);
        for row in &self.rows {
            csv.serialize(row)?;
        }
        if self.rows.is_empty() {
            csv.write_record(COLUMNS)?;
        }
        csv.flush().map_err(|e| DeepnogError::io("<table>", e))?;
        Ok(())
    }

    /// Render the table to bytes.
    pub fn render(&self, format: OutputFormat) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.write(&mut buffer, format)?;
        Ok(buffer)
    }
}

/// Where rendered predictions go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSink {
    Stdout,
    File(PathBuf),
}

impl OutputSink {
    /// Standard output when no path is given; a directory gets
    /// [`DEFAULT_OUTPUT_NAME`] inside it.
    pub fn resolve(destination: Option<&Path>) -> Self {
        match destination {
            None => OutputSink::Stdout,
            Some(path) if path.is_dir() => OutputSink::File(path.join(DEFAULT_OUTPUT_NAME)),
            Some(path) => OutputSink::File(path.to_path_buf()),
        }
    }

    pub fn write_all(&self, bytes: &[u8]) -> Result<()> {
        match self {
            OutputSink::Stdout => {
                let mut stdout = std::io::stdout().lock();
                stdout
                    .write_all(bytes)
                    .and_then(|()| stdout.flush())
                    .map_err(|e| DeepnogError::io("<stdout>", e))
            }
            OutputSink::File(path) => {
                if path.exists() {
                    warn!(path = %path.display(), "overwriting existing output file");
                }
                info!(path = %path.display(), "writing predictions");
                std::fs::write(path, bytes).map_err(|e| DeepnogError::io(path, e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn predictions() -> Vec<PredictionRecord> {
        vec![
            PredictionRecord {
                source_index: 2,
                identifier: "p2".into(),
                predicted_class: None,
                confidence: 0.25,
            },
            PredictionRecord {
                source_index: 0,
                identifier: "p0".into(),
                predicted_class: Some(1),
                confidence: 0.5,
            },
            PredictionRecord {
                source_index: 1,
                identifier: "p1".into(),
                predicted_class: Some(0),
                confidence: 1.0,
            },
        ]
    }

    fn table() -> ResultTable {
        let vocab = LabelVocabulary::from_labels(["COG0001", "COG0443"]);
        ResultTable::assemble(&vocab, predictions()).unwrap()
    }

    #[test]
    fn test_rows_sorted_by_source_index() {
        let table = table();
        let ids: Vec<&str> = table.rows().iter().map(|r| r.sequence_id.as_str()).collect();
        assert_eq!(ids, ["p0", "p1", "p2"]);
        assert_eq!(table.rows()[0].prediction, "COG0443");
        assert_eq!(table.rows()[2].prediction, "");
    }

    #[test]
    fn test_render_csv() {
        let text = String::from_utf8(table().render(OutputFormat::Csv).unwrap()).unwrap();
        assert_eq!(
            text,
            "sequence_id,prediction,confidence\np0,COG0443,0.5\np1,COG0001,1.0\np2,,0.25\n"
        );
    }

    #[test]
    fn test_formats_differ_only_in_separator() {
        let table = table();
        let csv = String::from_utf8(table.render(OutputFormat::Csv).unwrap()).unwrap();
        for format in [OutputFormat::Tsv, OutputFormat::Legacy] {
            let other = String::from_utf8(table.render(format).unwrap()).unwrap();
            let separator = format.delimiter() as char;
            assert_eq!(other.lines().count(), csv.lines().count());
            assert_eq!(other.replace(separator, ","), csv);
        }
    }

    #[test]
    fn test_unknown_format() {
        let err = "xlsx".parse::<OutputFormat>().unwrap_err();
        assert!(matches!(err, DeepnogError::UnsupportedOutputFormat(ref f) if f == "xlsx"));
        assert_eq!("legacy".parse::<OutputFormat>().unwrap(), OutputFormat::Legacy);
    }

    #[test]
    fn test_class_outside_vocabulary() {
        let vocab = LabelVocabulary::from_labels(["only"]);
        let err = ResultTable::assemble(&vocab, predictions()).unwrap_err();
        assert!(matches!(err, DeepnogError::UnknownClass { index: 1, num_classes: 1 }));
    }

    #[test]
    fn test_empty_table_still_has_header() {
        let table = ResultTable::assemble(&LabelVocabulary::from_labels(["a"]), Vec::new()).unwrap();
        let text = String::from_utf8(table.render(OutputFormat::Tsv).unwrap()).unwrap();
        assert_eq!(text, "sequence_id\tprediction\tconfidence\n");
    }

    #[test]
    fn test_sink_resolution() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(OutputSink::resolve(None), OutputSink::Stdout);
        assert_eq!(
            OutputSink::resolve(Some(dir.path())),
            OutputSink::File(dir.path().join(DEFAULT_OUTPUT_NAME))
        );

        let file = dir.path().join("preds.tsv");
        let sink = OutputSink::resolve(Some(&file));
        sink.write_all(b"x\n").unwrap();
        assert_eq!(std::fs::read(&file).unwrap(), b"x\n");
    }
}
