use ndarray::{ArrayD, ArrayViewD};

use crate::{Float, error::Result, optim::ToParams};

/// Extent of one axis in a static shape; `None` when unknown (usually batch).
pub type Dim = Option<usize>;

/// What a host needs from a trainable layer: parameters to enumerate, a
/// forward/backward pair, and shape inference that runs without data.
pub trait Layer: ToParams {
    /// Binds parameter shapes to `input_shape`. Only the first call allocates.
    fn build(&mut self, input_shape: &[Dim]) -> Result<()>;

    fn is_built(&self) -> bool;

    fn compute_output_shape(&self, input_shape: &[Dim]) -> Result<Vec<Dim>>;

    /// Mask to hand to the next layer, if any.
    fn compute_mask(
        &self,
        x: ArrayViewD<'_, Float>,
        mask: Option<ArrayViewD<'_, Float>>,
    ) -> Option<ArrayD<Float>>;

    fn forward(
        &mut self,
        x: ArrayViewD<'_, Float>,
        mask: Option<ArrayViewD<'_, Float>>,
        grad: bool,
    ) -> Result<ArrayD<Float>>;

    fn backward(&mut self, d_loss: ArrayD<Float>) -> ArrayD<Float>;
}
