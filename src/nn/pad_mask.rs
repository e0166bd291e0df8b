use ndarray::{Array2, Array3, ArrayViewD, Axis};

use crate::{
    Float,
    error::{Result, ShapeError},
};

pub struct PadMask {}

impl PadMask {
    /// 1 where a timestep has any non-zero feature, 0 where it is all padding.
    pub fn zero_mask_batch(x: &Array3<Float>) -> Array2<Float> {
        x.mapv(Float::abs)
            .sum_axis(Axis(2))
            .mapv(|x| if x == 0. { 0. } else { 1. }) // (B, S)
    }

    /// Accepts a (B, S) or (B, S, 1) mask and returns it as (B, S).
    pub fn time_mask(mask: ArrayViewD<'_, Float>, batch: usize, seq_len: usize) -> Result<Array2<Float>> {
        let malformed = || ShapeError::MaskShape {
            shape: mask.shape().to_vec(),
            batch,
            seq_len,
        };

        let well_formed = match mask.shape() {
            [b, s] | [b, s, 1] => *b == batch && *s == seq_len,
            _ => false,
        };

        if !well_formed {
            return Err(malformed());
        }

        let mask = mask
            .to_shape((batch, seq_len))
            .map_err(|_| malformed())?
            .into_owned();

        Ok(mask)
    }
}
