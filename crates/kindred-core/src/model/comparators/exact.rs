use super::Comparator;
use crate::error::KindredResult;

/// 1.0 for identical values, 0.0 otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct Exact;

impl Comparator for Exact {
    fn similarity(&self, v1: &str, v2: &str) -> KindredResult<f64> {
        Ok(if v1 == v2 { 1.0 } else { 0.0 })
    }
}

/// The inverse of [`Exact`]: evidence of a match when values differ.
#[derive(Debug, Clone, Copy, Default)]
pub struct Different;

impl Comparator for Different {
    fn similarity(&self, v1: &str, v2: &str) -> KindredResult<f64> {
        Ok(if v1 == v2 { 0.0 } else { 1.0 })
    }
}
