//! Scalar-type abstraction the whole crate is generic over: a blanket trait
//! bundling the numeric bounds every algorithm needs, so `f32` and `f64`
//! both work without the crate choosing one concretely.

use ndarray::{LinalgScalar, ScalarOperand};
use num_traits::Float as NumFloat;

/// Bound satisfied by `f32` and `f64`: real, orderable, usable as an
/// `ndarray` scalar (including `Array2::dot`).
pub trait Float:
    NumFloat + LinalgScalar + ScalarOperand + Send + Sync + std::fmt::Debug + 'static
{
}

impl<T> Float for T where
    T: NumFloat + LinalgScalar + ScalarOperand + Send + Sync + std::fmt::Debug + 'static
{
}
