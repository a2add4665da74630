use super::Comparator;
use crate::error::KindredResult;

/// Ratio of the smaller to the larger magnitude.
///
/// Values that do not parse as numbers are uninformative (0.5). Ratios below
/// `min_ratio` score 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct Numeric {
    min_ratio: f64,
}

impl Numeric {
    pub fn new(min_ratio: f64) -> Self {
        Self { min_ratio }
    }
}

impl Comparator for Numeric {
    fn similarity(&self, v1: &str, v2: &str) -> KindredResult<f64> {
        if v1 == v2 {
            return Ok(1.0);
        }
        let (Ok(mut d1), Ok(mut d2)) = (v1.trim().parse::<f64>(), v2.trim().parse::<f64>()) else {
            return Ok(0.5);
        };
        if !d1.is_finite() || !d2.is_finite() {
            return Ok(0.5);
        }
        if d1 == 0.0 && d2 == 0.0 {
            return Ok(1.0);
        }
        if d1 < 0.0 && d2 < 0.0 {
            d1 = -d1;
            d2 = -d2;
        }
        if d2 < d1 {
            std::mem::swap(&mut d1, &mut d2);
        }
        // opposite signs give a negative ratio
        let ratio = (d1 / d2).max(0.0);
        Ok(if ratio < self.min_ratio { 0.0 } else { ratio })
    }
}
