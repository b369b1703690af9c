use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::models::DailyTargetRecord;

/// Goal overrides indexed by the day they take effect.
///
/// Built from the append-only log in log order, so a later record for the
/// same day replaces an earlier one. Lookups never depend on the order in
/// which days were logged.
#[derive(Debug, Clone, Default)]
pub struct TargetTimeline {
    overrides: BTreeMap<NaiveDate, Option<f64>>,
}

impl TargetTimeline {
    #[must_use]
    pub fn new(records: &[DailyTargetRecord]) -> Self {
        let mut overrides = BTreeMap::new();
        for record in records {
            overrides.insert(record.day, record.target);
        }
        Self { overrides }
    }

    /// The override in effect on `day`: the record with the greatest day at or before it.
    #[must_use]
    pub fn override_for(&self, day: NaiveDate) -> Option<(NaiveDate, Option<f64>)> {
        self.overrides
            .range(..=day)
            .next_back()
            .map(|(d, t)| (*d, *t))
    }

    #[must_use]
    pub fn resolve(&self, day: NaiveDate, recommended: f64) -> f64 {
        match self.override_for(day) {
            Some((_, Some(target))) => target,
            Some((_, None)) | None => recommended,
        }
    }

    /// Effective overrides in calendar order.
    pub fn changes(&self) -> impl Iterator<Item = DailyTargetRecord> + '_ {
        self.overrides
            .iter()
            .map(|(day, target)| DailyTargetRecord {
                day: *day,
                target: *target,
            })
    }
}

/// Effective goal for `day`: the most recent override at or before it,
/// falling back to `recommended` when there is none or it was unset.
#[must_use]
pub fn resolve_target(day: NaiveDate, records: &[DailyTargetRecord], recommended: f64) -> f64 {
    TargetTimeline::new(records).resolve(day, recommended)
}
