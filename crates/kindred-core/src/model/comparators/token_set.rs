//! Token-set comparators. Each token of the shorter value is paired with its
//! best match in the longer value, scored by a sub-comparator.

use std::sync::Arc;

use super::{tokenize, Comparator, Exact};
use crate::error::KindredResult;

fn best_match_sum(
    sub: &dyn Comparator,
    t1: &[&str],
    t2: &[&str],
) -> KindredResult<f64> {
    let mut sum = 0.0;
    for a in t1 {
        let mut highest: f64 = 0.0;
        for b in t2 {
            highest = highest.max(sub.similarity(a, b)?);
        }
        sum += highest;
    }
    Ok(sum)
}

fn ordered_tokens<'a>(v1: &'a str, v2: &'a str) -> (Vec<&'a str>, Vec<&'a str>) {
    let t1: Vec<&str> = tokenize(v1).collect();
    let t2: Vec<&str> = tokenize(v2).collect();
    if t1.len() > t2.len() {
        (t2, t1)
    } else {
        (t1, t2)
    }
}

/// Dice coefficient: `2 * matched / (n1 + n2)`.
#[derive(Clone)]
pub struct DiceCoefficient {
    sub: Arc<dyn Comparator>,
}

impl Default for DiceCoefficient {
    fn default() -> Self {
        Self { sub: Arc::new(Exact) }
    }
}

impl DiceCoefficient {
    /// Use a different comparator for token pairs.
    pub fn with_comparator(sub: Arc<dyn Comparator>) -> Self {
        Self { sub }
    }
}

impl Comparator for DiceCoefficient {
    fn similarity(&self, v1: &str, v2: &str) -> KindredResult<f64> {
        if v1 == v2 {
            return Ok(1.0);
        }
        let (t1, t2) = ordered_tokens(v1, v2);
        if t1.is_empty() {
            return Ok(0.0);
        }
        let sum = best_match_sum(self.sub.as_ref(), &t1, &t2)?;
        Ok(sum * 2.0 / (t1.len() + t2.len()) as f64)
    }
}

/// Jaccard index: matched tokens over the union, where every matched pair
/// shrinks the union by its similarity.
#[derive(Clone)]
pub struct JaccardIndex {
    sub: Arc<dyn Comparator>,
}

impl Default for JaccardIndex {
    fn default() -> Self {
        Self { sub: Arc::new(Exact) }
    }
}

impl JaccardIndex {
    /// Use a different comparator for token pairs.
    pub fn with_comparator(sub: Arc<dyn Comparator>) -> Self {
        Self { sub }
    }
}

impl Comparator for JaccardIndex {
    fn similarity(&self, v1: &str, v2: &str) -> KindredResult<f64> {
        if v1 == v2 {
            return Ok(1.0);
        }
        let (t1, t2) = ordered_tokens(v1, v2);
        if t1.is_empty() {
            return Ok(0.0);
        }
        let intersection = best_match_sum(self.sub.as_ref(), &t1, &t2)?;
        let union = (t1.len() + t2.len()) as f64 - intersection;
        Ok(intersection / union)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::comparators::Levenshtein;

    #[test]
    fn test_dice() {
        let dice = DiceCoefficient::default();
        // one of two tokens shared with a two token value
        assert_eq!(dice.similarity("john smith", "john doe").unwrap(), 0.5);
        assert_eq!(dice.similarity("a b", "c d").unwrap(), 0.0);
        assert_eq!(dice.similarity("", "c d").unwrap(), 0.0);
    }

    #[test]
    fn test_jaccard() {
        let jaccard = JaccardIndex::default();
        // 1 shared token, union of 3
        let s = jaccard.similarity("john smith", "john doe").unwrap();
        assert!((s - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(jaccard.similarity("smith john", "john smith").unwrap(), 1.0);
    }

    #[test]
    fn test_sub_comparator() {
        let dice = DiceCoefficient::with_comparator(Arc::new(Levenshtein));
        let s = dice.similarity("jon smith", "john smith").unwrap();
        assert!(s > 0.8 && s < 1.0);
    }
}
