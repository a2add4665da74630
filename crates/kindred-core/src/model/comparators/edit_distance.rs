use super::Comparator;
use crate::error::KindredResult;

/// Levenshtein edit distance over chars, two-row dynamic programming.
pub fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let a: Vec<char> = s1.chars().collect();
    let b: Vec<char> = s2.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Edit distance normalized by the shorter value's length.
///
/// `1 - min(distance, shorter) / shorter`, so a distance at least as long as
/// the shorter value scores 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct Levenshtein;

impl Comparator for Levenshtein {
    fn similarity(&self, v1: &str, v2: &str) -> KindredResult<f64> {
        if v1 == v2 {
            return Ok(1.0);
        }
        let shorter = v1.chars().count().min(v2.chars().count());
        if shorter == 0 {
            return Ok(0.0);
        }
        let dist = levenshtein_distance(v1, v2).min(shorter);
        Ok(1.0 - dist as f64 / shorter as f64)
    }
}
