//! Distance and travel cost matrices.
//!
//! Provides a dense matrix addressed by 1-indexed node ids.

mod matrix;

pub use matrix::DistanceMatrix;
