use ndarray::{Array2, Array3, ArrayD, ArrayView3, ArrayViewD, Axis, Ix2, Ix3};
use ndarray_rand::rand::{Rng, SeedableRng, rngs::StdRng, thread_rng};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::{
    Float,
    error::{Result, ShapeError},
    f,
    nn::{Dim, Layer, PadMask},
    optim::param::{Param, ToParams},
};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AttentionPoolingConfig {
    pub name: String,
    /// Initial weights are drawn from `Uniform(-init_bound, init_bound)`.
    /// Must be finite, `build` fails with `ShapeError::InitBound` otherwise.
    pub init_bound: Float,
    pub seed: Option<u64>,
}

impl Default for AttentionPoolingConfig {
    fn default() -> Self {
        Self {
            name: "attention_pooling".to_string(),
            init_bound: 0.05,
            seed: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
struct Binding {
    time_length: Option<usize>,
    feature_dim: usize,
}

/// Additive attention pooling over the time axis.
///
/// Scores every timestep of a (B, S, F) sequence against a learned (F, 1)
/// vector, softmaxes the scores over S (padded steps are removed by adding
/// `ln(mask)`), and returns the weighted sum of the timesteps as (B, F).
///
/// The parameter is sized from the first input the layer sees and stays bound
/// to that feature dimension for the lifetime of the layer.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AttentionPooling {
    config: AttentionPoolingConfig,
    binding: Option<Binding>,

    pub attention_param: Array2<Float>,
    pub d_attention_param: Array2<Float>,

    #[serde(skip)]
    cache: Option<Cache>,
}

/// Input and attention weights of the last `forward(.., grad = true)`.
#[derive(Debug, Clone)]
struct Cache {
    x: Array3<Float>,
    weights: Array2<Float>,
}

impl AttentionPooling {
    pub fn new() -> Self {
        Self::with_config(AttentionPoolingConfig::default())
    }

    pub fn with_config(config: AttentionPoolingConfig) -> Self {
        Self {
            config,
            binding: None,

            attention_param: Array2::zeros((0, 0)),
            d_attention_param: Array2::zeros((0, 0)),

            cache: None,
        }
    }

    pub fn config(&self) -> &AttentionPoolingConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn is_built(&self) -> bool {
        self.binding.is_some()
    }

    pub fn feature_dim(&self) -> Option<usize> {
        self.binding.map(|b| b.feature_dim)
    }

    /// Time length observed at build time, if it was known then.
    pub fn time_length(&self) -> Option<usize> {
        self.binding.and_then(|b| b.time_length)
    }

    pub fn build(&mut self, input_shape: &[Dim]) -> Result<()> {
        match self.config.seed {
            Some(seed) => self.build_with_rng(input_shape, &mut StdRng::seed_from_u64(seed)),
            None => self.build_with_rng(input_shape, &mut thread_rng()),
        }
    }

    pub fn build_with_rng<R: Rng + ?Sized>(&mut self, input_shape: &[Dim], rng: &mut R) -> Result<()> {
        let (time_length, feature_dim) = match input_shape {
            [_, time_length, feature_dim] => (
                *time_length,
                feature_dim.ok_or(ShapeError::UndefinedFeatureDim)?,
            ),
            _ => {
                return Err(ShapeError::InputRank {
                    rank: input_shape.len(),
                });
            }
        };

        if !self.config.init_bound.is_finite() {
            return Err(ShapeError::InitBound {
                bound: self.config.init_bound,
            });
        }

        if let Some(binding) = self.binding {
            if binding.feature_dim != feature_dim {
                return Err(ShapeError::FeatureMismatch {
                    expected: binding.feature_dim,
                    actual: feature_dim,
                });
            }

            return Ok(());
        }

        self.attention_param = f::uniform((feature_dim, 1), self.config.init_bound, rng);
        self.d_attention_param = Array2::zeros((feature_dim, 1));
        self.binding = Some(Binding {
            time_length,
            feature_dim,
        });

        debug!(
            layer = %self.config.name,
            ?time_length,
            feature_dim,
            "attention pooling bound"
        );

        Ok(())
    }

    /// (B, S, F) -> (B, F). Works on an unbuilt layer.
    pub fn compute_output_shape(&self, input_shape: &[Dim]) -> Result<[Dim; 2]> {
        match input_shape {
            [batch, _, features] => Ok([*batch, *features]),
            _ => Err(ShapeError::InputRank {
                rank: input_shape.len(),
            }),
        }
    }

    /// The pooled output has no time axis left, so no mask goes downstream.
    pub fn compute_mask(
        &self,
        _x: ArrayViewD<'_, Float>,
        _mask: Option<ArrayViewD<'_, Float>>,
    ) -> Option<Array2<Float>> {
        None
    }

    /// Pools `x` (B, S, F) into (B, F), binding the layer on first use.
    ///
    /// `mask` is (B, S) or (B, S, 1) with 1 for valid steps and 0 for padding.
    /// A sequence whose steps are all masked pools to a zero vector (the
    /// Keras layer this mirrors produces NaN there) and logs a warning.
    ///
    /// With `grad` the input and attention weights are kept for `backward`.
    /// Every call drops the previous cache first, so a failed call leaves
    /// nothing for `backward` to use.
    pub fn forward(
        &mut self,
        x: ArrayViewD<'_, Float>,
        mask: Option<ArrayViewD<'_, Float>>,
        grad: bool,
    ) -> Result<Array2<Float>> {
        self.cache = None;

        let (x, mask) = inputs(x, mask)?;
        let (batch_size, seq_len, features) = x.dim();

        if !self.is_built() {
            self.build(&[Some(batch_size), Some(seq_len), Some(features)])?;
        }

        let (output, weights) = self.pool(x, mask.as_ref())?;

        if grad {
            self.cache = Some(Cache {
                x: x.to_owned(),
                weights,
            });
        }

        Ok(output)
    }

    /// Same as `forward` without caching, for callers sharing a built layer.
    pub fn predict(
        &self,
        x: ArrayViewD<'_, Float>,
        mask: Option<ArrayViewD<'_, Float>>,
    ) -> Result<Array2<Float>> {
        let (x, mask) = inputs(x, mask)?;
        self.pool(x, mask.as_ref()).map(|(output, _)| output)
    }

    /// Normalized attention weights (B, S) for `x`.
    pub fn attention_weights(
        &self,
        x: ArrayViewD<'_, Float>,
        mask: Option<ArrayViewD<'_, Float>>,
    ) -> Result<Array2<Float>> {
        let (x, mask) = inputs(x, mask)?;
        self.pool(x, mask.as_ref()).map(|(_, weights)| weights)
    }

    /// Accumulates the parameter gradient and returns d_loss/d_x (B, S, F).
    ///
    /// Needs the cache of the last `forward(.., grad = true)`.
    pub fn backward(&mut self, d_loss: Array2<Float>) -> Array3<Float> {
        let Some(Cache { x, weights }) = self.cache.as_ref() else {
            panic!("attention pooling backward called without a forward pass in grad mode");
        };
        let (batch_size, seq_len, features) = x.dim();

        assert!(
            d_loss.dim() == (batch_size, features),
            "d_loss dim != (batch_size, features) d_loss={:?} desired={:?}",
            d_loss.dim(),
            (batch_size, features)
        );

        trace!(layer = %self.config.name, batch_size, seq_len, features, "attention pooling backward");

        let p = self.attention_param.column(0);

        // d_weights[b, s] = <d_loss[b], x[b, s]>
        let mut d_weights = Array2::<Float>::zeros((batch_size, seq_len));
        for ((mut d_w_i, x_i), d_loss_i) in d_weights
            .axis_iter_mut(Axis(0))
            .zip(x.axis_iter(Axis(0)))
            .zip(d_loss.axis_iter(Axis(0)))
        {
            d_w_i.assign(&x_i.dot(&d_loss_i));
        }

        // masked steps carry zero weight, so their logit gradient is zero too
        let d_logits = f::softmax_vector_jacobian_product(&d_weights, weights);

        // (F,) <- sum over B, S of d_logits * x
        let d_p = (x * &d_logits.view().insert_axis(Axis(2)))
            .sum_axis(Axis(0))
            .sum_axis(Axis(0))
            .insert_axis(Axis(1));
        self.d_attention_param += &d_p;

        // (B, S, 1) * (B, 1, F) + (B, S, 1) * (1, 1, F) -> (B, S, F)
        &weights.view().insert_axis(Axis(2)) * &d_loss.view().insert_axis(Axis(1))
            + &d_logits.view().insert_axis(Axis(2)) * &p.insert_axis(Axis(0)).insert_axis(Axis(0))
    }

    /// Shared forward math: returns the pooled output and the weights.
    fn pool(
        &self,
        x: ArrayView3<'_, Float>,
        mask: Option<&Array2<Float>>,
    ) -> Result<(Array2<Float>, Array2<Float>)> {
        let binding = self.binding.ok_or(ShapeError::Unbuilt)?;
        let (batch_size, seq_len, features) = x.dim();

        if features != binding.feature_dim {
            return Err(ShapeError::FeatureMismatch {
                expected: binding.feature_dim,
                actual: features,
            });
        }

        trace!(layer = %self.config.name, batch_size, seq_len, features, "attention pooling forward");

        let p = self.attention_param.column(0);

        // logits = x . p, (B, S, F) . (F, 1) -> (B, S)
        let mut logits = Array2::<Float>::zeros((batch_size, seq_len));
        for (mut logits_i, x_i) in logits.axis_iter_mut(Axis(0)).zip(x.axis_iter(Axis(0))) {
            logits_i.assign(&x_i.dot(&p));
        }

        if let Some(mask) = mask {
            logits += &f::log_mask(mask);
        }

        let weights = f::softmax(&logits);

        let fully_masked = weights
            .sum_axis(Axis(1))
            .iter()
            .filter(|&&total| total == 0.)
            .count();
        if seq_len > 0 && fully_masked > 0 {
            warn!(
                layer = %self.config.name,
                fully_masked,
                "sequences with every timestep masked pool to zero"
            );
        }

        // (B, S, F) * (B, S, 1) summed over S -> (B, F)
        let output = (&x * &weights.view().insert_axis(Axis(2))).sum_axis(Axis(1));

        Ok((output, weights))
    }
}

impl Default for AttentionPooling {
    fn default() -> Self {
        Self::new()
    }
}

/// Checks the input rank and brings the mask to (B, S).
fn inputs<'a>(
    x: ArrayViewD<'a, Float>,
    mask: Option<ArrayViewD<'_, Float>>,
) -> Result<(ArrayView3<'a, Float>, Option<Array2<Float>>)> {
    let rank = x.ndim();
    let x = x
        .into_dimensionality::<Ix3>()
        .map_err(|_| ShapeError::InputRank { rank })?;

    let (batch_size, seq_len, _) = x.dim();
    let mask = mask
        .map(|mask| PadMask::time_mask(mask, batch_size, seq_len))
        .transpose()?;

    Ok((x, mask))
}

impl ToParams for AttentionPooling {
    fn params(&mut self) -> Vec<Param<'_>> {
        if !self.is_built() {
            return vec![];
        }

        vec![Param::matrix(
            format!("{}/attention_param", self.config.name),
            &mut self.attention_param,
            &mut self.d_attention_param,
        )]
    }
}

impl Layer for AttentionPooling {
    fn build(&mut self, input_shape: &[Dim]) -> Result<()> {
        AttentionPooling::build(self, input_shape)
    }

    fn is_built(&self) -> bool {
        AttentionPooling::is_built(self)
    }

    fn compute_output_shape(&self, input_shape: &[Dim]) -> Result<Vec<Dim>> {
        AttentionPooling::compute_output_shape(self, input_shape).map(|shape| shape.to_vec())
    }

    fn compute_mask(
        &self,
        x: ArrayViewD<'_, Float>,
        mask: Option<ArrayViewD<'_, Float>>,
    ) -> Option<ArrayD<Float>> {
        AttentionPooling::compute_mask(self, x, mask).map(|mask| mask.into_dyn())
    }

    fn forward(
        &mut self,
        x: ArrayViewD<'_, Float>,
        mask: Option<ArrayViewD<'_, Float>>,
        grad: bool,
    ) -> Result<ArrayD<Float>> {
        AttentionPooling::forward(self, x, mask, grad).map(|y| y.into_dyn())
    }

    fn backward(&mut self, d_loss: ArrayD<Float>) -> ArrayD<Float> {
        let d_loss = match d_loss.into_dimensionality::<Ix2>() {
            Ok(d_loss) => d_loss,
            Err(e) => panic!("attention pooling backward expects a (batch_size, features) gradient: {e}"),
        };

        AttentionPooling::backward(self, d_loss).into_dyn()
    }
}
