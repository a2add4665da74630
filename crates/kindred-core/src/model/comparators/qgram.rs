use std::collections::HashSet;

use super::Comparator;
use crate::error::KindredResult;

/// Overlap of character q-grams, relative to the smaller gram set.
#[derive(Debug, Clone, Copy)]
pub struct QGram {
    q: usize,
}

impl Default for QGram {
    fn default() -> Self {
        Self { q: 2 }
    }
}

impl QGram {
    pub fn new(q: usize) -> Self {
        Self { q: q.max(1) }
    }

    fn grams(&self, value: &str) -> HashSet<String> {
        let chars: Vec<char> = value.chars().collect();
        chars.windows(self.q).map(|w| w.iter().collect()).collect()
    }
}

impl Comparator for QGram {
    fn similarity(&self, v1: &str, v2: &str) -> KindredResult<f64> {
        if v1 == v2 {
            return Ok(1.0);
        }
        let g1 = self.grams(v1);
        let g2 = self.grams(v2);
        if g1.is_empty() || g2.is_empty() {
            return Ok(0.0);
        }
        let common = g1.intersection(&g2).count();
        Ok(common as f64 / g1.len().min(g2.len()) as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bigram_overlap() {
        let q = QGram::default();
        // "abcd" -> ab bc cd ; "abce" -> ab bc ce
        let s = q.similarity("abcd", "abce").unwrap();
        assert!((s - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(q.similarity("a", "b").unwrap(), 0.0);
        assert_eq!(q.similarity("abc", "xyz").unwrap(), 0.0);
    }

    #[test]
    fn test_trigrams() {
        let q = QGram::new(3);
        assert_eq!(q.similarity("abcd", "xbcd").unwrap(), 0.5);
    }
}
