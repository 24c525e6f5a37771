//! # Sort Compiler
//!
//! Collects `sort::*` operators into an ordered multi-key [`SortPlan`]. The
//! first operator is the primary key, later ones break ties. Whether the plan
//! needs the `media_file_stats` join is decided here, before execution.

use crate::operator::QueryOperator;
use serde::Serialize;
use std::fmt;

/// Column a mix can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    TrackNumber,
    LastModified,
    Duration,
    PlayedThrough,
    Skipped,
}

impl SortKey {
    /// Keys stored in `media_file_stats` rather than `media_files`.
    #[must_use]
    pub const fn requires_stats_join(self) -> bool {
        matches!(self, Self::PlayedThrough | Self::Skipped)
    }

    /// SQL expression for this key. Stats columns default to zero for files
    /// without a stats row.
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::TrackNumber => "m.track_number",
            Self::LastModified => "m.last_modified",
            Self::Duration => "m.duration",
            Self::PlayedThrough => "COALESCE(s.played_through, 0)",
            Self::Skipped => "COALESCE(s.skipped, 0)",
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::TrackNumber => "track_number",
            Self::LastModified => "last_modified",
            Self::Duration => "duration",
            Self::PlayedThrough => "playedthrough",
            Self::Skipped => "skipped",
        };
        f.write_str(name)
    }
}

/// Ordered `(key, ascending)` list plus the join requirement.
///
/// An empty plan means primary-key order. Storage always appends the primary
/// key as the last tie-breaker, so the order is total either way.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SortPlan {
    pub keys: Vec<(SortKey, bool)>,
    pub requires_stats_join: bool,
}

impl SortPlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn push(&mut self, key: SortKey, ascending: bool) {
        // A repeated key can never break a tie the first occurrence left open.
        if self.keys.iter().any(|(existing, _)| *existing == key) {
            return;
        }
        self.requires_stats_join |= key.requires_stats_join();
        self.keys.push((key, ascending));
    }
}

/// Build the sort plan from the sort operators in `operators`, in input order.
#[must_use]
pub fn compile_sort(operators: &[QueryOperator]) -> SortPlan {
    let mut plan = SortPlan::default();

    for operator in operators {
        let (key, ascending) = match operator {
            QueryOperator::SortTrackNumber(asc) => (SortKey::TrackNumber, *asc),
            QueryOperator::SortLastModified(asc) => (SortKey::LastModified, *asc),
            QueryOperator::SortDuration(asc) => (SortKey::Duration, *asc),
            QueryOperator::SortPlayedThrough(asc) => (SortKey::PlayedThrough, *asc),
            QueryOperator::SortSkipped(asc) => (SortKey::Skipped, *asc),
            _ => continue,
        };
        plan.push(key, ascending);
    }

    plan
}
