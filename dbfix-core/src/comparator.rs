//! Ranking of repair candidates.
//!
//! A candidate is better than the original when the first of these rules
//! fires: consistency restored, more countable tables, more rows in total,
//! fewer validation errors. Ties keep the incumbent.

use crate::models::ValidationReport;
use serde::{Deserialize, Serialize};

/// The rule under which a candidate beat the original.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Improvement {
    ConsistencyRestored,
    MoreTablesAccessible,
    MoreRows,
    FewerErrors,
}

impl std::fmt::Display for Improvement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConsistencyRestored => write!(f, "integrity check now passes"),
            Self::MoreTablesAccessible => write!(f, "more tables are accessible"),
            Self::MoreRows => write!(f, "more rows are readable"),
            Self::FewerErrors => write!(f, "fewer validation errors"),
        }
    }
}

/// Returns the first rule under which `candidate` beats `original`.
pub fn compare(original: &ValidationReport, candidate: &ValidationReport) -> Option<Improvement> {
    if !original.passes_consistency() && candidate.passes_consistency() {
        return Some(Improvement::ConsistencyRestored);
    }

    if candidate.countable_tables() > original.countable_tables() {
        return Some(Improvement::MoreTablesAccessible);
    }

    if candidate.total_rows() > original.total_rows() {
        return Some(Improvement::MoreRows);
    }

    if candidate.errors.len() < original.errors.len() {
        return Some(Improvement::FewerErrors);
    }

    None
}

/// True if `candidate` is strictly better than `original`.
pub fn is_better(original: &ValidationReport, candidate: &ValidationReport) -> bool {
    compare(original, candidate).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(verdict: Option<&str>, counts: &[(&str, u64)], errors: usize) -> ValidationReport {
        ValidationReport {
            is_valid_container: true,
            consistency_verdict: verdict.map(str::to_string),
            tables: counts.iter().map(|(t, _)| t.to_string()).collect(),
            table_counts: counts.iter().map(|(t, c)| (t.to_string(), *c)).collect(),
            errors: (0..errors).map(|i| format!("error {}", i)).collect(),
        }
    }

    #[test]
    fn test_irreflexive() {
        let reports = [
            report(Some("ok"), &[("a", 3)], 0),
            report(None, &[], 2),
            report(Some("row 3 missing from index"), &[("a", 1), ("b", 0)], 1),
            ValidationReport::default(),
        ];
        for r in &reports {
            assert!(!is_better(r, &r.clone()));
        }
    }

    #[test]
    fn test_consistency_restored_wins_first() {
        let original = report(None, &[("a", 10), ("b", 10)], 0);
        let candidate = report(Some("ok"), &[("a", 1)], 3);
        assert_eq!(
            compare(&original, &candidate),
            Some(Improvement::ConsistencyRestored)
        );
    }

    #[test]
    fn test_passing_original_is_not_beaten_by_verdict_alone() {
        let original = report(Some("ok"), &[("a", 3)], 0);
        let candidate = report(Some("ok"), &[("a", 3)], 0);
        assert_eq!(compare(&original, &candidate), None);
    }

    #[test]
    fn test_more_tables() {
        let original = report(None, &[("a", 100)], 1);
        let candidate = report(None, &[("a", 1), ("b", 1)], 1);
        assert_eq!(
            compare(&original, &candidate),
            Some(Improvement::MoreTablesAccessible)
        );
    }

    #[test]
    fn test_more_rows() {
        let original = report(None, &[("a", 2)], 1);
        let candidate = report(None, &[("a", 3)], 1);
        assert_eq!(compare(&original, &candidate), Some(Improvement::MoreRows));
    }

    #[test]
    fn test_fewer_errors() {
        let original = report(None, &[("a", 2)], 2);
        let candidate = report(None, &[("a", 2)], 1);
        assert_eq!(compare(&original, &candidate), Some(Improvement::FewerErrors));
    }

    #[test]
    fn test_worse_candidate_is_not_better() {
        let original = report(None, &[("a", 5), ("b", 5)], 0);
        let candidate = report(None, &[("a", 4)], 4);
        assert!(!is_better(&original, &candidate));
    }

    #[test]
    fn test_fewer_tables_can_still_win_on_rows() {
        // Rule 2 only fires on strictly more tables; fewer tables fall through to rule 3.
        let original = report(None, &[("a", 1), ("b", 1)], 0);
        let candidate = report(None, &[("a", 50)], 0);
        assert_eq!(compare(&original, &candidate), Some(Improvement::MoreRows));
    }
}
