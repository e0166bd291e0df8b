use ndarray::Array2;

use crate::Float;

/// Mutable view of a trainable tensor and the gradient accumulated for it.
pub enum ParamValue<'a> {
    Matrix {
        target: &'a mut Array2<Float>,
        grad: &'a mut Array2<Float>,
    },
}

/// A named trainable parameter, as handed to whatever drives training.
pub struct Param<'a> {
    name: String,
    pub value: ParamValue<'a>,
}

impl<'a> Param<'a> {
    pub fn matrix(
        name: impl Into<String>,
        target: &'a mut Array2<Float>,
        grad: &'a mut Array2<Float>,
    ) -> Param<'a> {
        Param {
            name: name.into(),
            value: ParamValue::Matrix { target, grad },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> &[usize] {
        match &self.value {
            ParamValue::Matrix { target, .. } => target.shape(),
        }
    }

    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> &'static str {
        std::any::type_name::<Float>()
    }

    pub fn zero_grad(&mut self) {
        match &mut self.value {
            ParamValue::Matrix { grad, .. } => grad.fill(0.),
        }
    }
}

pub trait ToParams {
    fn params(&mut self) -> Vec<Param<'_>>;

    fn zero_grads(&mut self) {
        for mut param in self.params() {
            param.zero_grad();
        }
    }

    /// Total number of trainable scalars.
    fn param_count(&mut self) -> usize {
        self.params().iter().map(|p| p.len()).sum()
    }
}
