pub mod attention_pooling;
pub mod layer;
pub mod pad_mask;

pub use attention_pooling::*;
pub use layer::*;
pub use pad_mask::*;
