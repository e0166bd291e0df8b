pub mod error;
pub mod f;
pub mod nn;
pub mod optim;

pub use error::ShapeError;
pub use nn::{AttentionPooling, AttentionPoolingConfig, Layer};

pub use ndarray;
pub use ndarray_rand;
pub use ndarray_stats;

pub type Float = f32;
