//! # DeepEncoding
//!
//! Convolutional protein classifier: a learned residue embedding, a bank of
//! parallel 1-D convolutions with increasing kernel sizes, global max-pooling
//! over the sequence and a single linear classification layer.

use std::sync::{Mutex, PoisonError};

use candle_core::{DType, Device, Tensor};
use candle_nn::{Conv1d, Conv1dConfig, Embedding, Linear, Module, VarBuilder, VarMap};

use crate::data::dataset::DEFAULT_SEED;
use crate::data::encoder::VOCAB_SIZE;
use crate::error::{DeepnogError, Result};
use crate::model::classifier::Classifier;
use crate::model::init::{fan_in_bound, fill_normal, fill_uniform};

pub const EMBEDDING_DIM: usize = 10;
pub const KERNEL_SIZES: [usize; 8] = [8, 12, 16, 20, 24, 28, 32, 36];
pub const N_FILTERS: usize = 150;
pub const DROPOUT: f32 = 0.3;

/// Width of the pooled feature vector fed to the classification layer.
pub const N_FEATURES: usize = N_FILTERS * KERNEL_SIZES.len();

pub struct DeepEncoding {
    varmap: VarMap,
    encoding: Embedding,
    convs: Vec<Conv1d>,
    classification: Linear,
    num_classes: usize,
    device: Device,
    threshold: Option<f32>,
    /// Source of dropout masks.
    dropout_rng: Mutex<oorandom::Rand32>,
}

impl DeepEncoding {
    pub const NAME: &'static str = "deepencoding";

    /// Create a freshly initialized network. The initial parameters are drawn
    /// from [`DEFAULT_SEED`]; see [`Classifier::reseed`].
    pub fn new(num_classes: usize, device: &Device) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);

        let encoding = candle_nn::embedding(VOCAB_SIZE, EMBEDDING_DIM, vb.pp("encoding"))?;
        let convs = KERNEL_SIZES
            .iter()
            .enumerate()
            .map(|(i, &kernel)| {
                candle_nn::conv1d(
                    EMBEDDING_DIM,
                    N_FILTERS,
                    kernel,
                    Conv1dConfig::default(),
                    vb.pp(format!("conv{}", i + 1)),
                )
            })
            .collect::<candle_core::Result<Vec<_>>>()?;
        let classification = candle_nn::linear(N_FEATURES, num_classes, vb.pp("classification1"))?;

        let mut model = Self {
            varmap,
            encoding,
            convs,
            classification,
            num_classes,
            device: device.clone(),
            threshold: None,
            dropout_rng: Mutex::new(oorandom::Rand32::new(DEFAULT_SEED)),
        };
        model.reseed(DEFAULT_SEED)?;
        Ok(model)
    }

    /// Boxed constructor for the architecture registry.
    pub fn boxed(num_classes: usize, device: &Device) -> Result<Box<dyn Classifier>> {
        Ok(Box::new(Self::new(num_classes, device)?))
    }

    fn forward(&self, inputs: &Tensor, train: bool) -> Result<Tensor> {
        let inputs = inputs.to_device(&self.device)?;

        // [batch, len] -> [batch, embedding, len]
        let xs = self.encoding.forward(&inputs)?.transpose(1, 2)?.contiguous()?;

        // Every kernel needs at least its own width of input.
        let len = xs.dim(2)?;
        let widest = KERNEL_SIZES[KERNEL_SIZES.len() - 1];
        let xs = if len < widest {
            xs.pad_with_zeros(2, 0, widest - len)?
        } else {
            xs
        };

        let pooled = self
            .convs
            .iter()
            .map(|conv| conv.forward(&xs)?.relu()?.max(2))
            .collect::<candle_core::Result<Vec<_>>>()?;
        let features = Tensor::cat(&pooled, 1)?;
        let features = if train { self.dropout(&features)? } else { features };

        Ok(self.classification.forward(&features)?)
    }

    /// Zero each feature with probability [`DROPOUT`] and rescale the rest.
    fn dropout(&self, features: &Tensor) -> Result<Tensor> {
        let scale = 1.0 / (1.0 - DROPOUT);
        let mask: Vec<f32> = {
            let mut rng = self.dropout_rng.lock().unwrap_or_else(PoisonError::into_inner);
            (0..features.elem_count())
                .map(|_| if rng.rand_float() < DROPOUT { 0.0 } else { scale })
                .collect()
        };
        let mask = Tensor::from_vec(mask, features.dims(), features.device())?;
        Ok(features.mul(&mask)?)
    }
}

impl Classifier for DeepEncoding {
    fn architecture(&self) -> &'static str {
        Self::NAME
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn device(&self) -> &Device {
        &self.device
    }

    fn predict(&self, inputs: &Tensor) -> Result<Tensor> {
        self.forward(inputs, false)
    }

    fn forward_train(&self, inputs: &Tensor) -> Result<Tensor> {
        self.forward(inputs, true)
    }

    fn parameters(&self) -> &VarMap {
        &self.varmap
    }

    fn threshold(&self) -> Option<f32> {
        self.threshold
    }

    fn set_threshold(&mut self, threshold: Option<f32>) {
        self.threshold = threshold;
    }

    fn reseed(&mut self, seed: u64) -> Result<()> {
        let mut rng = oorandom::Rand32::new(seed);
        let data = self.varmap.data().lock().map_err(|_| DeepnogError::ModelLoad {
            path: Self::NAME.into(),
            reason: "parameter store lock poisoned".into(),
        })?;

        let mut names: Vec<&String> = data.keys().collect();
        names.sort();
        for name in names {
            let var = &data[name];
            if name.starts_with("encoding.") {
                fill_normal(var, &mut rng)?;
                continue;
            }
            // Biases share the bound of their layer's weight.
            let layer = name.rsplit_once('.').map_or(name.as_str(), |(layer, _)| layer);
            let fan_in = data
                .get(&format!("{layer}.weight"))
                .map_or(1, |w| w.dims().iter().skip(1).product::<usize>());
            fill_uniform(var, fan_in_bound(fan_in), &mut rng)?;
        }
        drop(data);

        *self.dropout_rng.get_mut().unwrap_or_else(PoisonError::into_inner) =
            oorandom::Rand32::new(seed ^ 0x9e37_79b9_7f4a_7c15);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::encoder::BatchEncoder;

    #[test]
    fn test_output_shape() {
        let model = DeepEncoding::new(3, &Device::Cpu).unwrap();
        let inputs = BatchEncoder::new().encode_batch(&["MKVLA", "MKVLAAGGWWPPQQ"]).unwrap();
        let scores = model.predict(&inputs).unwrap();
        assert_eq!(scores.dims(), &[2, 3]);
    }

    #[test]
    fn test_long_sequences() {
        let model = DeepEncoding::new(2, &Device::Cpu).unwrap();
        let long = "MKV".repeat(40);
        let inputs = BatchEncoder::new().encode_batch(&[long.as_str()]).unwrap();
        assert_eq!(model.predict(&inputs).unwrap().dims(), &[1, 2]);
    }

    #[test]
    fn test_parameter_names_and_shapes() {
        let model = DeepEncoding::new(3, &Device::Cpu).unwrap();
        let data = model.parameters().data().lock().unwrap();
        assert_eq!(data["classification1.weight"].dims(), &[3, N_FEATURES]);
        assert_eq!(data["encoding.weight"].dims(), &[VOCAB_SIZE, EMBEDDING_DIM]);
        assert_eq!(data["conv8.weight"].dims(), &[N_FILTERS, EMBEDDING_DIM, 36]);
        assert_eq!(data.len(), 2 + 2 * KERNEL_SIZES.len() + 1);
    }

    #[test]
    fn test_same_seed_same_network() {
        let mut a = DeepEncoding::new(3, &Device::Cpu).unwrap();
        let mut b = DeepEncoding::new(3, &Device::Cpu).unwrap();
        a.reseed(42).unwrap();
        b.reseed(42).unwrap();

        let inputs = BatchEncoder::new().encode_batch(&["MKVLAAGWWPP", "HHYY"]).unwrap();
        assert_eq!(
            a.predict(&inputs).unwrap().to_vec2::<f32>().unwrap(),
            b.predict(&inputs).unwrap().to_vec2::<f32>().unwrap()
        );
        assert_eq!(
            a.forward_train(&inputs).unwrap().to_vec2::<f32>().unwrap(),
            b.forward_train(&inputs).unwrap().to_vec2::<f32>().unwrap()
        );
    }

    #[test]
    fn test_different_seeds_differ() {
        let mut a = DeepEncoding::new(3, &Device::Cpu).unwrap();
        a.reseed(1).unwrap();
        let b = DeepEncoding::new(3, &Device::Cpu).unwrap();

        let inputs = BatchEncoder::new().encode_batch(&["MKVLAAGW"]).unwrap();
        assert_ne!(
            a.predict(&inputs).unwrap().to_vec2::<f32>().unwrap(),
            b.predict(&inputs).unwrap().to_vec2::<f32>().unwrap()
        );
    }

    #[test]
    fn test_predict_is_deterministic() {
        let model = DeepEncoding::new(4, &Device::Cpu).unwrap();
        let inputs = BatchEncoder::new().encode_batch(&["MKVLAAGW"]).unwrap();
        let a = model.predict(&inputs).unwrap().to_vec2::<f32>().unwrap();
        let b = model.predict(&inputs).unwrap().to_vec2::<f32>().unwrap();
        assert_eq!(a, b);
    }
}
