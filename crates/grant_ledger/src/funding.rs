//! Funding-state projection.
//!
//! The only place the minimum/fully funded flags are derived. A threshold that
//! is not configured is treated as unreachable, so its flag stays `false`.

use serde::{Deserialize, Serialize};

use crate::types::FundingSnapshot;

/// The two derived funding flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FundingFlags {
    pub minimum_funded: bool,
    pub fully_funded: bool,
}

/// Derive the funding flags from a total and the campaign thresholds.
pub fn project(
    funding_total: i64,
    minimum_threshold: Option<i64>,
    maximum_threshold: Option<i64>,
) -> FundingFlags {
    FundingFlags {
        minimum_funded: minimum_threshold.is_some_and(|min| funding_total >= min),
        fully_funded: maximum_threshold.is_some_and(|max| funding_total >= max),
    }
}

/// Build a full snapshot for `funding_total` under the given thresholds.
pub fn snapshot(
    funding_total: i64,
    minimum_threshold: Option<i64>,
    maximum_threshold: Option<i64>,
) -> FundingSnapshot {
    let flags = project(funding_total, minimum_threshold, maximum_threshold);
    FundingSnapshot {
        funding_total,
        minimum_funded: flags.minimum_funded,
        fully_funded: flags.fully_funded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_both_thresholds() {
        assert_eq!(project(50, Some(100), Some(500)), FundingFlags::default());
    }

    #[test]
    fn minimum_reached_exactly() {
        let flags = project(100, Some(100), Some(500));
        assert!(flags.minimum_funded);
        assert!(!flags.fully_funded);
    }

    #[test]
    fn cap_reached_sets_both() {
        let flags = project(500, Some(100), Some(500));
        assert!(flags.minimum_funded);
        assert!(flags.fully_funded);
    }

    #[test]
    fn missing_thresholds_are_unreachable() {
        assert_eq!(project(10_000, None, None), FundingFlags::default());
        assert!(!project(10_000, None, Some(20_000)).minimum_funded);
        assert!(!project(0, Some(0), None).fully_funded);
    }

    #[test]
    fn zero_minimum_is_met_by_empty_campaign() {
        assert!(project(0, Some(0), Some(10)).minimum_funded);
    }

    #[test]
    fn snapshot_carries_total() {
        let snap = snapshot(450, Some(100), Some(500));
        assert_eq!(snap.funding_total, 450);
        assert!(snap.minimum_funded);
        assert!(!snap.fully_funded);
    }
}
