//! Gold-standard link files.
//!
//! One judgment per line. `+` marks a SAME pair and `-` a DIFFERENT pair;
//! the marker may stand alone or prefix the first id, and an optional last
//! column carries the confidence:
//!
//! ```text
//! +1,2
//! -3,4,0.9
//! +,5,6,1.0
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

use std::io::BufRead;
use tracing::info;

use super::LinkStore;
use crate::error::{KindredError, KindredResult};
use crate::types::{Link, LinkKind, LinkStatus};

/// Assert every judgment in `reader` into `store` as an ASSERTED link.
///
/// Returns the number of lines read.
pub fn load_gold_standard<R: BufRead>(reader: R, store: &dyn LinkStore) -> KindredResult<usize> {
    let mut count = 0;
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        store.assert_link(parse_line(line, lineno + 1)?)?;
        count += 1;
    }
    info!(links = count, "Loaded gold standard");
    Ok(count)
}

fn parse_line(line: &str, lineno: usize) -> KindredResult<Link> {
    let invalid = |why: &str| KindredError::parse(format!("line {}: {}: {:?}", lineno, why, line));

    let kind = match line.chars().next() {
        Some('+') => LinkKind::Same,
        Some('-') => LinkKind::Different,
        _ => return Err(invalid("expected '+' or '-'")),
    };
    let mut fields: Vec<&str> = line[1..].split(',').map(str::trim).collect();
    if fields.first() == Some(&"") {
        fields.remove(0);
    }

    let (id1, id2, confidence) = match fields.as_slice() {
        [id1, id2] => (*id1, *id2, 1.0),
        [id1, id2, conf] => {
            let conf: f64 = conf.parse().map_err(|_| invalid("bad confidence"))?;
            if !(0.0..=1.0).contains(&conf) {
                return Err(invalid("confidence outside [0, 1]"));
            }
            (*id1, *id2, conf)
        }
        _ => return Err(invalid("expected two ids and an optional confidence")),
    };
    if id1.is_empty() || id2.is_empty() {
        return Err(invalid("empty id"));
    }
    if id1 == id2 {
        return Err(invalid("a record cannot be linked to itself"));
    }
    Ok(Link::new(id1, id2, kind, LinkStatus::Asserted, confidence))
}
