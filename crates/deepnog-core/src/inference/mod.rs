pub mod gate;
pub mod runner;

pub use gate::{validate_threshold, ConfidenceGate};
pub use runner::{top_class, InferenceRunner};
