use chrono::NaiveDate;
use tracing::debug;
use uuid::Uuid;

use crate::clock::Clock;
use crate::models::{DailyTargetRecord, DayBucket, NewProteinEntry, ProteinEntry, ProteinState};

impl ProteinState {
    #[must_use]
    pub fn bucket(&self, day: NaiveDate) -> Option<&DayBucket> {
        self.entries.iter().find(|b| b.day == day)
    }

    /// Entries logged on `day`, empty when the day was never touched.
    #[must_use]
    pub fn entries_for(&self, day: NaiveDate) -> &[ProteinEntry] {
        self.bucket(day)
            .map(|b| b.entries.as_slice())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn find_entry(&self, day: NaiveDate, id: &str) -> Option<&ProteinEntry> {
        self.entries_for(day).iter().find(|e| e.id == id)
    }

    /// Locate an entry by id across all days.
    #[must_use]
    pub fn locate_entry(&self, id: &str) -> Option<(NaiveDate, &ProteinEntry)> {
        self.entries.iter().find_map(|b| {
            b.entries
                .iter()
                .find(|e| e.id == id)
                .map(|e| (b.day, e))
        })
    }

    fn bucket_mut(&mut self, day: NaiveDate) -> &mut DayBucket {
        let idx = match self.entries.iter().position(|b| b.day == day) {
            Some(idx) => idx,
            None => {
                self.entries.push(DayBucket {
                    day,
                    entries: Vec::new(),
                });
                self.entries.len() - 1
            }
        };
        &mut self.entries[idx]
    }

    /// Append `entry` to `day`'s bucket. A supplied id is taken as-is; keeping
    /// ids unique within the day is up to the caller.
    pub fn add_entry(&mut self, day: NaiveDate, entry: NewProteinEntry) -> ProteinEntry {
        let entry = ProteinEntry {
            id: entry.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            grams: entry.grams,
            time: entry.time,
            food: entry.food,
            description: entry.description,
        };
        debug!(day = %day, id = %entry.id, grams = entry.grams, "adding protein entry");
        self.bucket_mut(day).entries.push(entry.clone());
        entry
    }

    /// Log `grams` for today at the current time.
    pub fn add_protein_entry(&mut self, clock: &dyn Clock, grams: f64) -> ProteinEntry {
        self.add_entry(clock.today(), NewProteinEntry::new(grams, clock.now()))
    }

    /// Replace the entry with the same id on `day`. Returns `false` and leaves
    /// the state untouched when there is no such entry.
    pub fn update_entry(&mut self, day: NaiveDate, entry: ProteinEntry) -> bool {
        let Some(bucket) = self.entries.iter_mut().find(|b| b.day == day) else {
            return false;
        };
        match bucket.entries.iter_mut().find(|e| e.id == entry.id) {
            Some(existing) => {
                debug!(day = %day, id = %entry.id, grams = entry.grams, "updating protein entry");
                *existing = entry;
                true
            }
            None => false,
        }
    }

    /// Remove the entry with `id` from `day`. Removing a missing entry is a no-op.
    pub fn remove_entry(&mut self, day: NaiveDate, id: &str) -> bool {
        let Some(bucket) = self.entries.iter_mut().find(|b| b.day == day) else {
            return false;
        };
        let before = bucket.entries.len();
        bucket.entries.retain(|e| e.id != id);
        let removed = bucket.entries.len() < before;
        if removed {
            debug!(day = %day, id, "removed protein entry");
        }
        removed
    }

    /// Record a goal change effective from `day`. `None` returns to the recommended goal.
    pub fn set_daily_target(&mut self, day: NaiveDate, target: Option<f64>) {
        debug!(day = %day, ?target, "recording daily target");
        self.daily_targets.push(DailyTargetRecord { day, target });
    }

    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.entries.iter().map(|b| b.entries.len()).sum()
    }
}
