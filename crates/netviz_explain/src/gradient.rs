//! Input-gradient plumbing shared by the explanation routines.

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

/// Gradient-tracking view of an input tensor.
pub(crate) fn tracked<B: AutodiffBackend, const D: usize>(
    input: Tensor<B::InnerBackend, D>,
) -> Tensor<B, D> {
    Tensor::from_inner(input).require_grad()
}

/// Backpropagate a scalar objective and read the gradient that reached `input`.
///
/// An objective that never touched `input` has no gradient entry; that is a
/// gradient of zero, not an error.
pub(crate) fn input_gradient<B: AutodiffBackend, const D: usize>(
    input: &Tensor<B, D>,
    objective: Tensor<B, 1>,
) -> Tensor<B::InnerBackend, D> {
    let grads = objective.backward();
    input
        .grad(&grads)
        .unwrap_or_else(|| input.clone().inner().zeros_like())
}

/// Raw score of one class, summed over the batch.
pub(crate) fn class_score<B: Backend>(scores: Tensor<B, 2>, class: usize) -> Tensor<B, 1> {
    scores.narrow(1, class, 1).sum()
}

/// Euclidean norm over every element.
pub(crate) fn l2_norm<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> f32 {
    (tensor.clone() * tensor).sum().sqrt().into_scalar().elem()
}
