//! Two-output score regressor: stacked LSTM encoder and a dense head.

use std::collections::HashMap;
use std::path::Path;

use candle_core::{DType, Device, Tensor, Var};
use candle_nn::ops::dropout;
use candle_nn::{Linear, Module, VarBuilder, VarMap, LSTM, RNN};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScoringError};
use crate::features::AudioFeatureVector;
use crate::types::SubScores;

const ENCODER_DROPOUT: f32 = 0.3;
const HEAD_WIDTHS: [usize; 2] = [64, 32];
const HEAD_DROPOUT: [f32; 2] = [0.3, 0.2];
const OUTPUTS: usize = 2;

/// Architecture parameters, recorded in the bundle metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegressorShape {
    pub input_dim: usize,
    pub hidden_dim: usize,
    pub num_layers: usize,
}

impl RegressorShape {
    pub fn validate(&self) -> Result<()> {
        if self.input_dim == 0 || self.hidden_dim == 0 || self.num_layers == 0 {
            return Err(ScoringError::configuration(format!(
                "regressor dimensions must be positive: {self:?}"
            )));
        }
        Ok(())
    }

    /// Tensor names and shapes a weights file must contain.
    pub fn expected_tensors(&self) -> Vec<(String, Vec<usize>)> {
        let gates = 4 * self.hidden_dim;
        let mut tensors = Vec::new();
        for layer in 0..self.num_layers {
            let input = if layer == 0 {
                self.input_dim
            } else {
                self.hidden_dim
            };
            tensors.push((format!("encoder.weight_ih_l{layer}"), vec![gates, input]));
            tensors.push((format!("encoder.weight_hh_l{layer}"), vec![gates, self.hidden_dim]));
            tensors.push((format!("encoder.bias_ih_l{layer}"), vec![gates]));
            tensors.push((format!("encoder.bias_hh_l{layer}"), vec![gates]));
        }
        let widths = [self.hidden_dim, HEAD_WIDTHS[0], HEAD_WIDTHS[1], OUTPUTS];
        for (index, pair) in widths.windows(2).enumerate() {
            tensors.push((format!("head.{index}.weight"), vec![pair[1], pair[0]]));
            tensors.push((format!("head.{index}.bias"), vec![pair[1]]));
        }
        tensors
    }
}

/// Maps a normalized feature vector to pronunciation and fluency scores.
///
/// Every call runs the encoder for a single step from a zero state, so
/// predictions carry no memory between calls.
pub struct ScoreRegressor {
    shape: RegressorShape,
    varmap: VarMap,
    encoder: Vec<LSTM>,
    head: Vec<Linear>,
    device: Device,
}

impl std::fmt::Debug for ScoreRegressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoreRegressor")
            .field("shape", &self.shape)
            .finish_non_exhaustive()
    }
}

impl ScoreRegressor {
    /// Freshly initialised weights.
    pub fn new(shape: RegressorShape) -> Result<Self> {
        shape.validate()?;
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let encoder = (0..shape.num_layers)
            .map(|layer| {
                let input = if layer == 0 {
                    shape.input_dim
                } else {
                    shape.hidden_dim
                };
                let config = candle_nn::LSTMConfig {
                    layer_idx: layer,
                    ..Default::default()
                };
                candle_nn::lstm(input, shape.hidden_dim, config, vb.pp("encoder"))
            })
            .collect::<candle_core::Result<Vec<_>>>()?;

        let widths = [shape.hidden_dim, HEAD_WIDTHS[0], HEAD_WIDTHS[1], OUTPUTS];
        let head = widths
            .windows(2)
            .enumerate()
            .map(|(index, pair)| candle_nn::linear(pair[0], pair[1], vb.pp(format!("head.{index}"))))
            .collect::<candle_core::Result<Vec<_>>>()?;

        Ok(Self {
            shape,
            varmap,
            encoder,
            head,
            device,
        })
    }

    /// Rebuild a regressor from a weights file, checking every tensor shape
    /// before any value is copied in.
    pub fn load<P: AsRef<Path>>(shape: RegressorShape, path: P) -> Result<Self> {
        let path = path.as_ref();
        shape.validate()?;
        let tensors = candle_core::safetensors::load(path, &Device::Cpu).map_err(|err| {
            ScoringError::configuration(format!("unreadable weights {}: {err}", path.display()))
        })?;
        check_tensor_shapes(&shape, &tensors)?;

        let mut regressor = Self::new(shape)?;
        regressor.varmap.load(path)?;
        Ok(regressor)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.varmap.save(path.as_ref())?;
        Ok(())
    }

    pub fn shape(&self) -> RegressorShape {
        self.shape
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn trainable_vars(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }

    /// Forward a `(batch, input_dim)` tensor to `(batch, 2)` scores.
    ///
    /// Dropout is active only when `train` is set.
    pub fn forward_batch(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let (batch, dim) = xs.dims2()?;
        if dim != self.shape.input_dim {
            return Err(ScoringError::DimensionMismatch {
                context: "regressor input",
                expected: self.shape.input_dim,
                actual: dim,
            });
        }

        let mut hidden = xs.clone();
        let last_layer = self.encoder.len() - 1;
        for (layer, lstm) in self.encoder.iter().enumerate() {
            let state = lstm.zero_state(batch)?;
            hidden = lstm.step(&hidden, &state)?.h().clone();
            if train && layer < last_layer {
                hidden = dropout(&hidden, ENCODER_DROPOUT)?;
            }
        }

        for (index, linear) in self.head.iter().enumerate() {
            hidden = linear.forward(&hidden)?;
            if let Some(&rate) = HEAD_DROPOUT.get(index) {
                hidden = hidden.relu()?;
                if train {
                    hidden = dropout(&hidden, rate)?;
                }
            }
        }
        Ok(hidden)
    }

    /// Score a batch of already-normalized vectors.
    pub fn predict_batch(&self, vectors: &[AudioFeatureVector]) -> Result<Vec<SubScores>> {
        if vectors.is_empty() {
            return Ok(Vec::new());
        }
        let xs = batch_tensor(vectors, self.shape.input_dim, &self.device)?;
        let rows = self.forward_batch(&xs, false)?.to_vec2::<f32>()?;
        Ok(rows.iter().map(|row| SubScores::new(row[0], row[1])).collect())
    }

    /// Score one already-normalized vector.
    pub fn forward(&self, vector: &AudioFeatureVector) -> Result<SubScores> {
        let mut scores = self.predict_batch(std::slice::from_ref(vector))?;
        scores
            .pop()
            .ok_or_else(|| ScoringError::data("regressor produced no output row"))
    }
}

/// Stack vectors into a `(batch, dim)` tensor.
pub fn batch_tensor(vectors: &[AudioFeatureVector], dim: usize, device: &Device) -> Result<Tensor> {
    let mut data = Vec::with_capacity(vectors.len() * dim);
    for vector in vectors {
        vector.ensure_dimension(dim, "regressor input")?;
        data.extend_from_slice(vector.as_slice());
    }
    Ok(Tensor::from_vec(data, (vectors.len(), dim), device)?)
}

/// Stack score pairs into a `(batch, 2)` target tensor.
pub fn target_tensor(scores: &[SubScores], device: &Device) -> Result<Tensor> {
    let data: Vec<f32> = scores.iter().flat_map(|s| s.to_array()).collect();
    Ok(Tensor::from_vec(data, (scores.len(), OUTPUTS), device)?)
}

fn check_tensor_shapes(shape: &RegressorShape, tensors: &HashMap<String, Tensor>) -> Result<()> {
    for (name, dims) in shape.expected_tensors() {
        let tensor = tensors.get(&name).ok_or_else(|| {
            ScoringError::configuration(format!("weights file is missing tensor {name}"))
        })?;
        if tensor.dims() != dims.as_slice() {
            // Input width drives the first encoder layer; report it as such.
            if name == "encoder.weight_ih_l0" && tensor.dims().len() == 2 {
                return Err(ScoringError::DimensionMismatch {
                    context: "regressor weights",
                    expected: shape.input_dim,
                    actual: tensor.dims()[1],
                });
            }
            return Err(ScoringError::configuration(format!(
                "tensor {name} has shape {:?}, expected {dims:?}",
                tensor.dims()
            )));
        }
    }
    Ok(())
}
