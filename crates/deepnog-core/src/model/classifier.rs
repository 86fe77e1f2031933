use candle_core::{Device, Tensor};
use candle_nn::VarMap;

use crate::error::Result;

/// A trainable sequence classifier.
///
/// Implementations own their parameters in a [`VarMap`] so that the same
/// object can be optimized, saved and reloaded.
pub trait Classifier: Send + Sync {
    /// Registry name of the architecture.
    fn architecture(&self) -> &'static str;

    /// Size of the output layer.
    fn num_classes(&self) -> usize;

    /// Device holding the parameters.
    fn device(&self) -> &Device;

    /// Unnormalized class scores `[batch_size, num_classes]` for residue codes
    /// `[batch_size, len]`, in evaluation mode. Has no side effects.
    fn predict(&self, inputs: &Tensor) -> Result<Tensor>;

    /// Same as [`Classifier::predict`] with training-only layers (dropout)
    /// active.
    fn forward_train(&self, inputs: &Tensor) -> Result<Tensor>;

    /// Trainable parameters.
    fn parameters(&self) -> &VarMap;

    /// Confidence threshold shipped with the model, if any.
    fn threshold(&self) -> Option<f32>;

    fn set_threshold(&mut self, threshold: Option<f32>);

    /// Re-initialize every parameter and the training-time randomness from
    /// `seed`. Equal seeds give identical networks and identical dropout.
    fn reseed(&mut self, seed: u64) -> Result<()>;
}
