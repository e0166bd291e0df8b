//! Shape errors raised by layers before any computation runs.

/// Errors from shape binding and forward validation.
///
/// Every variant is returned before the layer touches its parameters or
/// binding, so a failed call never leaves a half-built layer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ShapeError {
    #[error("input should be of shape (batch, input_length, input_dim), got rank {rank}")]
    InputRank { rank: usize },

    #[error(
        "mask should be of shape (batch, input_length) or (batch, input_length, 1), \
         got {shape:?} for batch={batch} input_length={seq_len}"
    )]
    MaskShape {
        shape: Vec<usize>,
        batch: usize,
        seq_len: usize,
    },

    #[error("feature dimension mismatch: layer is bound to {expected}, got {actual}")]
    FeatureMismatch { expected: usize, actual: usize },

    #[error("cannot bind a layer to an input with an undefined feature dimension")]
    UndefinedFeatureDim,

    #[error("init_bound must be finite, got {bound}")]
    InitBound { bound: crate::Float },

    #[error("layer has not been built yet")]
    Unbuilt,
}

pub type Result<T> = std::result::Result<T, ShapeError>;
