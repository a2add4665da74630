use super::{tokenize, Comparator};
use crate::error::KindredResult;

const PREFIX_SCALE: f64 = 0.1;
const MAX_PREFIX: usize = 4;

/// Jaro similarity with the Winkler common-prefix boost.
pub fn jaro_winkler(s1: &str, s2: &str) -> f64 {
    if s1 == s2 {
        return 1.0;
    }
    let a: Vec<char> = s1.chars().collect();
    let b: Vec<char> = s2.chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let window = (a.len().max(b.len()) / 2).saturating_sub(1);
    let mut a_matched = vec![false; a.len()];
    let mut b_matched = vec![false; b.len()];
    let mut matches = 0usize;

    for (i, ca) in a.iter().enumerate() {
        let start = i.saturating_sub(window);
        let end = (i + window + 1).min(b.len());
        for j in start..end {
            if !b_matched[j] && b[j] == *ca {
                a_matched[i] = true;
                b_matched[j] = true;
                matches += 1;
                break;
            }
        }
    }
    if matches == 0 {
        return 0.0;
    }

    let mut transpositions = 0usize;
    let mut k = 0usize;
    for (i, ca) in a.iter().enumerate() {
        if !a_matched[i] {
            continue;
        }
        while !b_matched[k] {
            k += 1;
        }
        if *ca != b[k] {
            transpositions += 1;
        }
        k += 1;
    }

    let m = matches as f64;
    let half_transpositions = (transpositions / 2) as f64;
    let jaro = (m / a.len() as f64 + m / b.len() as f64 + (m - half_transpositions) / m) / 3.0;

    let prefix = a
        .iter()
        .zip(b.iter())
        .take(MAX_PREFIX)
        .take_while(|(x, y)| x == y)
        .count();
    jaro + prefix as f64 * PREFIX_SCALE * (1.0 - jaro)
}

/// Jaro-Winkler over whole values.
#[derive(Debug, Clone, Copy, Default)]
pub struct JaroWinkler;

impl Comparator for JaroWinkler {
    fn similarity(&self, v1: &str, v2: &str) -> KindredResult<f64> {
        Ok(jaro_winkler(v1, v2))
    }
}

/// Jaro-Winkler over tokens, pairing each token at most once.
///
/// Token pairs are taken greedily from best score down; the sum of the chosen
/// scores is divided by the token count of the shorter value.
#[derive(Debug, Clone, Copy, Default)]
pub struct JaroWinklerTokenized;

impl Comparator for JaroWinklerTokenized {
    fn similarity(&self, v1: &str, v2: &str) -> KindredResult<f64> {
        if v1 == v2 {
            return Ok(1.0);
        }
        let mut t1: Vec<&str> = tokenize(v1).collect();
        let mut t2: Vec<&str> = tokenize(v2).collect();
        if t1.is_empty() || t2.is_empty() {
            return Ok(0.0);
        }
        if t1.len() > t2.len() {
            std::mem::swap(&mut t1, &mut t2);
        }

        let mut pairs = Vec::with_capacity(t1.len() * t2.len());
        for (i, a) in t1.iter().enumerate() {
            for (j, b) in t2.iter().enumerate() {
                pairs.push((jaro_winkler(a, b), i, j));
            }
        }
        pairs.sort_by(|x, y| y.0.total_cmp(&x.0));

        let mut used1 = vec![false; t1.len()];
        let mut used2 = vec![false; t2.len()];
        let mut sum = 0.0;
        for (score, i, j) in pairs {
            if !used1[i] && !used2[j] {
                used1[i] = true;
                used2[j] = true;
                sum += score;
            }
        }
        Ok(sum / t1.len() as f64)
    }
}
