use super::Comparator;
use crate::error::KindredResult;

fn code(ch: char) -> char {
    match ch.to_ascii_uppercase() {
        'B' | 'F' | 'P' | 'V' => '1',
        'C' | 'G' | 'J' | 'K' | 'Q' | 'S' | 'X' | 'Z' => '2',
        'D' | 'T' => '3',
        'L' => '4',
        'M' | 'N' => '5',
        'R' => '6',
        _ => '0',
    }
}

/// Four-character Soundex key. Empty input has no key.
pub fn soundex(value: &str) -> String {
    let mut chars = value.chars();
    let Some(first) = chars.next() else {
        return String::new();
    };

    let mut key = String::with_capacity(4);
    key.push(first.to_ascii_uppercase());
    let mut prev = code(first);
    for ch in chars {
        if key.len() == 4 {
            break;
        }
        if !ch.is_ascii_alphabetic() {
            continue;
        }
        let c = code(ch);
        if c != '0' && c != prev {
            key.push(c);
        }
        prev = c;
    }
    while key.len() < 4 {
        key.push('0');
    }
    key
}

/// 1.0 for equal values, 0.9 for equal Soundex keys, 0.0 otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct Soundex;

impl Comparator for Soundex {
    fn similarity(&self, v1: &str, v2: &str) -> KindredResult<f64> {
        if v1 == v2 {
            return Ok(1.0);
        }
        let k1 = soundex(v1);
        if !k1.is_empty() && k1 == soundex(v2) {
            return Ok(0.9);
        }
        Ok(0.0)
    }
}
