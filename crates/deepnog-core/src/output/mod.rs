pub mod table;

pub use table::{OutputFormat, OutputSink, ResultRow, ResultTable, COLUMNS, DEFAULT_OUTPUT_NAME};
