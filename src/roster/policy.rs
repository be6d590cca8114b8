//! Proportional staffing policy
//!
//! Maps a severity level to a fraction of the reserve pool and selects the
//! first `round(len * fraction)` members. Selection is a prefix of the pool in
//! platform order, so the same pool snapshot always yields the same members.

use std::collections::BTreeMap;

use crate::types::{Importance, RosterMember};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("no staffing fraction configured for severity {0}")]
    MissingFraction(Importance),
}

/// Severity → fraction table, loaded once from configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeverityPolicy {
    fractions: BTreeMap<Importance, f64>,
}

impl SeverityPolicy {
    pub fn new(fractions: BTreeMap<Importance, f64>) -> Self {
        Self { fractions }
    }

    /// Fraction of the pool to activate for `severity`.
    pub fn fraction(&self, severity: Importance) -> Result<f64, PolicyError> {
        self.fractions
            .get(&severity)
            .copied()
            .ok_or(PolicyError::MissingFraction(severity))
    }

    /// Severity levels with no configured fraction.
    pub fn missing_levels(&self) -> Vec<Importance> {
        Importance::ALL
            .into_iter()
            .filter(|level| !self.fractions.contains_key(level))
            .collect()
    }

    /// Number of members to activate from a pool of `pool_len`.
    pub fn member_count(&self, pool_len: usize, severity: Importance) -> Result<usize, PolicyError> {
        let fraction = self.fraction(severity)?;
        Ok(proportional_count(pool_len, fraction))
    }

    /// Select the members to add to the target queue.
    pub fn select_members(
        &self,
        pool: &[RosterMember],
        severity: Importance,
    ) -> Result<Vec<RosterMember>, PolicyError> {
        let count = self.member_count(pool.len(), severity)?;
        Ok(pool[..count].to_vec())
    }
}

/// `round(len * fraction)` clamped to `[0, len]`.
///
/// Rounds half away from zero; NaN and negative fractions select nobody.
pub fn proportional_count(len: usize, fraction: f64) -> usize {
    let raw = (len as f64 * fraction).round();
    if raw.is_nan() || raw <= 0.0 {
        0
    } else if raw >= len as f64 {
        len
    } else {
        raw as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(n: usize) -> Vec<RosterMember> {
        (0..n)
            .map(|i| RosterMember::new(format!("u{i}"), format!("User {i}")))
            .collect()
    }

    fn policy() -> SeverityPolicy {
        SeverityPolicy::new(BTreeMap::from([
            (Importance::Critical, 0.5),
            (Importance::High, 0.25),
            (Importance::Medium, 0.1),
            (Importance::Low, 0.0),
        ]))
    }

    #[test]
    fn test_count_matches_rounded_fraction() {
        let fractions = [0.0, 0.1, 0.25, 0.333, 0.5, 0.75, 1.0];
        for n in 0..60 {
            for f in fractions {
                let expected = ((n as f64) * f).round().clamp(0.0, n as f64) as usize;
                assert_eq!(proportional_count(n, f), expected, "n={n} f={f}");
            }
        }
    }

    #[test]
    fn test_count_clamps_out_of_range_fractions() {
        assert_eq!(proportional_count(10, 1.7), 10);
        assert_eq!(proportional_count(10, -0.3), 0);
        assert_eq!(proportional_count(10, f64::NAN), 0);
    }

    #[test]
    fn test_half_rounds_up() {
        // 5 * 0.5 = 2.5 → 3
        assert_eq!(proportional_count(5, 0.5), 3);
    }

    #[test]
    fn test_selects_prefix_of_pool() {
        let pool = pool(20);
        let selected = policy().select_members(&pool, Importance::Critical).unwrap();
        assert_eq!(selected.len(), 10);
        assert_eq!(selected, pool[..10].to_vec());
    }

    #[test]
    fn test_selection_is_idempotent() {
        let pool = pool(37);
        let p = policy();
        let first = p.select_members(&pool, Importance::High).unwrap();
        let second = p.select_members(&pool, Importance::High).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_zero_fraction_selects_nobody() {
        let selected = policy().select_members(&pool(12), Importance::Low).unwrap();
        assert!(selected.is_empty());
    }

    #[test]
    fn test_missing_fraction_is_an_error_not_zero() {
        let partial = SeverityPolicy::new(BTreeMap::from([(Importance::Critical, 0.5)]));
        assert_eq!(
            partial.select_members(&pool(4), Importance::High),
            Err(PolicyError::MissingFraction(Importance::High))
        );
        assert_eq!(
            partial.missing_levels(),
            vec![Importance::Low, Importance::Medium, Importance::High]
        );
    }

    #[test]
    fn test_empty_pool() {
        let selected = policy().select_members(&[], Importance::Critical).unwrap();
        assert!(selected.is_empty());
    }
}
