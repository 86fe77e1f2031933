pub mod metric;
pub mod record;
pub mod vocabulary;

pub use metric::{EpochMetric, Phase};
pub use record::{PredictionRecord, SequenceRecord};
pub use vocabulary::LabelVocabulary;
