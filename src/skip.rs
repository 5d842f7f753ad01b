use std::collections::BTreeMap;
use std::fmt;

/// Why a single feature, pixel, event or cell was left out of an aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SkipReason {
    InvalidCoordinate,
    InvalidGeometry,
    InvalidTimestamp,
    InvalidCellId,
    OutsideYearRange,
    OutsideRegion,
    NoData,
    ReprojectionFailed,
    MalformedRecord,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::InvalidCoordinate => "invalid_coordinate",
            SkipReason::InvalidGeometry => "invalid_geometry",
            SkipReason::InvalidTimestamp => "invalid_timestamp",
            SkipReason::InvalidCellId => "invalid_cell_id",
            SkipReason::OutsideYearRange => "outside_year_range",
            SkipReason::OutsideRegion => "outside_region",
            SkipReason::NoData => "nodata",
            SkipReason::ReprojectionFailed => "reprojection_failed",
            SkipReason::MalformedRecord => "malformed_record",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-reason counts of skipped items for one aggregation pass.
///
/// Merging two tallies adds their counts, so partial tallies from parallel
/// workers can be combined in any order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkipTally {
    counts: BTreeMap<SkipReason, usize>,
}

impl SkipTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, reason: SkipReason) {
        *self.counts.entry(reason).or_insert(0) += 1;
    }

    pub fn count(&self, reason: SkipReason) -> usize {
        self.counts.get(&reason).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn merge(mut self, other: SkipTally) -> Self {
        for (reason, n) in other.counts {
            *self.counts.entry(reason).or_insert(0) += n;
        }
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (SkipReason, usize)> + '_ {
        self.counts.iter().map(|(r, n)| (*r, *n))
    }

    /// Logs a one-line summary: `info` when nothing was skipped, `warn` otherwise.
    pub fn log_summary(&self, stage: &str, kept: usize) {
        if self.is_empty() {
            log::info!("{}: {} kept, 0 skipped", stage, kept);
            return;
        }
        let detail: Vec<String> = self
            .iter()
            .map(|(reason, n)| format!("{}={}", reason, n))
            .collect();
        log::warn!(
            "{}: {} kept, {} skipped ({})",
            stage,
            kept,
            self.total(),
            detail.join(", ")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_merge() {
        let mut a = SkipTally::new();
        a.record(SkipReason::NoData);
        a.record(SkipReason::NoData);
        let mut b = SkipTally::new();
        b.record(SkipReason::InvalidCoordinate);
        b.record(SkipReason::NoData);

        let merged = a.merge(b);
        assert_eq!(merged.count(SkipReason::NoData), 3);
        assert_eq!(merged.count(SkipReason::InvalidCoordinate), 1);
        assert_eq!(merged.count(SkipReason::InvalidGeometry), 0);
        assert_eq!(merged.total(), 4);
    }

    #[test]
    fn test_empty_tally() {
        let tally = SkipTally::default();
        assert!(tally.is_empty());
        assert_eq!(tally.iter().count(), 0);
    }
}
