//! Bayesian evidence combination.

/// Neutral prior: no evidence either way.
pub const PRIOR: f64 = 0.5;

/// Combine two independent probabilities that a pair matches.
///
/// `combine(p, 0.5) == p`, and the operator is commutative and associative,
/// so the order in which evidence arrives does not change the result.
pub fn combine(p1: f64, p2: f64) -> f64 {
    let agree = p1 * p2;
    let disagree = (1.0 - p1) * (1.0 - p2);
    let total = agree + disagree;
    if total == 0.0 {
        // Only reachable with contradictory certainties (0 and 1).
        return PRIOR;
    }
    agree / total
}

/// Fold a sequence of probabilities into one, starting from the prior.
pub fn combine_all<I: IntoIterator<Item = f64>>(probabilities: I) -> f64 {
    probabilities.into_iter().fold(PRIOR, combine)
}
