pub mod classifier;
pub mod deepencoding;
pub mod init;
pub mod registry;
pub mod weights;

pub use classifier::Classifier;
pub use deepencoding::DeepEncoding;
pub use registry::{ArchitectureRegistry, Constructor, LoadedModel};
pub use weights::{save_classifier, ModelFile, WeightsResolver, MODEL_EXTENSION};
