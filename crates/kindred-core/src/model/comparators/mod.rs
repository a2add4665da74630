//! String comparators.
//!
//! A comparator maps a pair of values to a raw similarity in [0, 1]. The
//! built-in set is closed and selected by [`ComparatorKind`]; callers with
//! special needs implement [`Comparator`] directly.

mod edit_distance;
mod exact;
mod jaro_winkler;
mod numeric;
mod qgram;
mod soundex;
mod token_set;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::KindredResult;

pub use edit_distance::{levenshtein_distance, Levenshtein};
pub use exact::{Different, Exact};
pub use jaro_winkler::{jaro_winkler, JaroWinkler, JaroWinklerTokenized};
pub use numeric::Numeric;
pub use qgram::QGram;
pub use soundex::{soundex, Soundex};
pub use token_set::{DiceCoefficient, JaccardIndex};

/// Raw similarity between two values.
pub trait Comparator: Send + Sync {
    /// Similarity in [0, 1]; 1.0 means identical.
    fn similarity(&self, v1: &str, v2: &str) -> KindredResult<f64>;
}

/// Built-in comparator selection, as it appears in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ComparatorKind {
    Exact,
    Different,
    Levenshtein,
    JaroWinkler,
    JaroWinklerTokenized,
    #[serde(rename = "qgram")]
    QGram,
    Dice,
    Jaccard,
    Numeric {
        #[serde(default)]
        min_ratio: f64,
    },
    Soundex,
}

impl ComparatorKind {
    /// Build the comparator this kind names.
    pub fn build(&self) -> Arc<dyn Comparator> {
        match self {
            ComparatorKind::Exact => Arc::new(Exact),
            ComparatorKind::Different => Arc::new(Different),
            ComparatorKind::Levenshtein => Arc::new(Levenshtein),
            ComparatorKind::JaroWinkler => Arc::new(JaroWinkler),
            ComparatorKind::JaroWinklerTokenized => Arc::new(JaroWinklerTokenized),
            ComparatorKind::QGram => Arc::new(QGram::default()),
            ComparatorKind::Dice => Arc::new(DiceCoefficient::default()),
            ComparatorKind::Jaccard => Arc::new(JaccardIndex::default()),
            ComparatorKind::Numeric { min_ratio } => Arc::new(Numeric::new(*min_ratio)),
            ComparatorKind::Soundex => Arc::new(Soundex),
        }
    }
}

/// Split a value into whitespace-separated tokens.
pub fn tokenize(value: &str) -> impl Iterator<Item = &str> {
    value.split_whitespace()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_toml() {
        #[derive(Deserialize)]
        struct Holder {
            comparator: ComparatorKind,
        }

        let h: Holder =
            toml::from_str("comparator = { type = \"numeric\", min_ratio = 0.7 }").unwrap();
        assert_eq!(h.comparator, ComparatorKind::Numeric { min_ratio: 0.7 });

        let h: Holder = toml::from_str("comparator = { type = \"qgram\" }").unwrap();
        assert_eq!(h.comparator, ComparatorKind::QGram);
    }

    #[test]
    fn test_build_every_kind() {
        let kinds = [
            ComparatorKind::Exact,
            ComparatorKind::Different,
            ComparatorKind::Levenshtein,
            ComparatorKind::JaroWinkler,
            ComparatorKind::JaroWinklerTokenized,
            ComparatorKind::QGram,
            ComparatorKind::Dice,
            ComparatorKind::Jaccard,
            ComparatorKind::Numeric { min_ratio: 0.0 },
            ComparatorKind::Soundex,
        ];
        for kind in kinds {
            let comparator = kind.build();
            let s = comparator.similarity("anna", "anna").unwrap();
            if kind == ComparatorKind::Different {
                assert_eq!(s, 0.0);
            } else {
                assert_eq!(s, 1.0, "{:?}", kind);
            }
        }
    }

    #[test]
    fn test_tokenize() {
        let tokens: Vec<&str> = tokenize("  john   smith ").collect();
        assert_eq!(tokens, vec!["john", "smith"]);
    }
}
