//! # deepnog
//!
//! Protein orthologous group assignment with deep convolutional classifiers.
//! Inference lives in [`deepnog_core`], training in [`trainer`]; both are
//! re-exported here for convenience.

pub use deepnog_core::*;
pub use deepnog_trainer as trainer;
