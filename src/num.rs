//! Utilities related to numbers.

use num;
use std::fmt;

/// Floating-point precision to use for particle and grid data.
#[allow(non_camel_case_types)]
pub type fpa = f64;

/// Floating point marker trait for easier control over trait bounds.
pub trait PFloat:
    Sync + Send + num::Float + num::cast::FromPrimitive + fmt::Debug + fmt::Display
{
}

impl PFloat for f32 {}
impl PFloat for f64 {}
