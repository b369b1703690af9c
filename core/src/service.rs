use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, NaiveTime};
use tracing::info;

use crate::clock::Clock;
use crate::csv_log::{self, CsvImportSummary};
use crate::db::Database;
use crate::models::{
    DailyTargetRecord, DailyTargetResult, DaySummary, EXPORT_VERSION, ExportData, ImportSummary,
    MonthlyAverage, NewProteinEntry, ProteinEntry, ProteinState, UserProfile, export_timestamp,
    validate_export, validate_grams, validate_target, validate_weight,
};
use crate::recommend;
use crate::resolver::TargetTimeline;
use crate::selectors;

/// The protein log, its profile and the clock that decides what "today" is.
///
/// Every mutation is applied to a copy of the state, the copy is written to
/// the database, and only then does it replace the in-memory state.
pub struct ProteinService<C: Clock> {
    db: Database,
    state: ProteinState,
    profile: Option<UserProfile>,
    clock: C,
}

impl<C: Clock> ProteinService<C> {
    pub fn open(path: &Path, clock: C) -> Result<Self> {
        Self::with_database(Database::open(path)?, clock)
    }

    pub fn open_in_memory(clock: C) -> Result<Self> {
        Self::with_database(Database::open_in_memory()?, clock)
    }

    fn with_database(db: Database, clock: C) -> Result<Self> {
        let state = db.load_state()?;
        let profile = db.get_profile()?;
        Ok(Self {
            db,
            state,
            profile,
            clock,
        })
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub fn now(&self) -> NaiveTime {
        self.clock.now()
    }

    pub fn state(&self) -> &ProteinState {
        &self.state
    }

    /// Run `mutate` against a copy of the state and keep the copy only once it
    /// has been saved. Nothing is saved when `mutate` reports no change.
    fn commit<T>(
        &mut self,
        mutate: impl FnOnce(&mut ProteinState) -> T,
        changed: impl FnOnce(&T) -> bool,
    ) -> Result<T> {
        let mut next = self.state.clone();
        let out = mutate(&mut next);
        if changed(&out) {
            self.db.save_state(&next)?;
            self.state = next;
        }
        Ok(out)
    }

    // --- Entries ---

    /// Log `entry` on `day`. A caller-supplied id must not already be in use on that day.
    pub fn add_entry(&mut self, day: NaiveDate, entry: NewProteinEntry) -> Result<ProteinEntry> {
        validate_grams(entry.grams)?;
        if let Some(id) = &entry.id {
            if self.state.find_entry(day, id).is_some() {
                bail!("Entry id '{id}' is already used on {day}");
            }
        }
        self.commit(|state| state.add_entry(day, entry), |_| true)
    }

    /// Log `grams` for today at the current time.
    pub fn add_protein_entry(&mut self, grams: f64) -> Result<ProteinEntry> {
        validate_grams(grams)?;
        let mut next = self.state.clone();
        let added = next.add_protein_entry(&self.clock, grams);
        self.db.save_state(&next)?;
        self.state = next;
        Ok(added)
    }

    pub fn update_entry(&mut self, day: NaiveDate, entry: ProteinEntry) -> Result<bool> {
        validate_grams(entry.grams)?;
        self.commit(|state| state.update_entry(day, entry), |updated| *updated)
    }

    pub fn remove_entry(&mut self, day: NaiveDate, id: &str) -> Result<bool> {
        self.commit(|state| state.remove_entry(day, id), |removed| *removed)
    }

    /// Find an entry by id when the caller does not know its day.
    pub fn locate_entry(&self, id: &str) -> Option<(NaiveDate, &ProteinEntry)> {
        self.state.locate_entry(id)
    }

    // --- Targets ---

    pub fn set_daily_target(&mut self, day: NaiveDate, target: Option<f64>) -> Result<()> {
        if let Some(target) = target {
            validate_target(target)?;
        }
        self.commit(|state| state.set_daily_target(day, target), |_| true)
    }

    /// Effective goal changes in calendar order.
    pub fn target_history(&self) -> Vec<DailyTargetRecord> {
        TargetTimeline::new(&self.state.daily_targets)
            .changes()
            .collect()
    }

    // --- Profile ---

    pub fn profile(&self) -> Option<&UserProfile> {
        self.profile.as_ref()
    }

    fn require_profile(&self) -> Result<&UserProfile> {
        self.profile
            .as_ref()
            .context("No profile set. Run `proteus profile set --weight <W>` first")
    }

    pub fn set_profile(&mut self, profile: UserProfile) -> Result<()> {
        validate_weight(&profile.weight)?;
        self.db.set_profile(&profile)?;
        self.profile = Some(profile);
        Ok(())
    }

    pub fn recommended_target(&self) -> Result<f64> {
        Ok(recommend::recommended_target(
            &self.require_profile()?.weight,
        ))
    }

    // --- Queries ---

    pub fn todays_entries(&self) -> &[ProteinEntry] {
        selectors::select_todays_entries(&self.state, self.clock.today())
    }

    pub fn entries_for_day(&self, day: NaiveDate) -> &[ProteinEntry] {
        self.state.entries_for(day)
    }

    pub fn total_for_day(&self, day: NaiveDate) -> f64 {
        selectors::select_total_protein_for_day(&self.state, day)
    }

    pub fn weekly_average(&self, week_start: NaiveDate) -> f64 {
        selectors::select_daily_avg(&self.state, week_start, self.clock.today())
    }

    pub fn monthly_average(&self, month_start: NaiveDate) -> Result<MonthlyAverage> {
        Ok(selectors::select_monthly_daily_average(
            &self.state,
            self.require_profile()?,
            month_start,
            self.clock.today(),
        ))
    }

    pub fn streak(&self) -> Result<u32> {
        Ok(selectors::select_streak(
            &self.state,
            self.require_profile()?,
            self.clock.today(),
        ))
    }

    pub fn daily_target_results(&self, start: NaiveDate) -> Result<Vec<DailyTargetResult>> {
        Ok(selectors::select_daily_target_results(
            &self.state,
            self.require_profile()?,
            start,
            self.clock.today(),
        ))
    }

    pub fn day_summary(&self, day: NaiveDate) -> Result<DaySummary> {
        Ok(selectors::select_day_summary(
            &self.state,
            self.require_profile()?,
            day,
        ))
    }

    pub fn target_for_day(&self, day: NaiveDate) -> Result<f64> {
        Ok(selectors::select_target_for_day(
            &self.state,
            self.require_profile()?,
            day,
        ))
    }

    // --- Export / Import ---

    pub fn export_all(&self) -> ExportData {
        ExportData {
            version: EXPORT_VERSION,
            exported_at: export_timestamp(),
            profile: self.profile.clone(),
            state: self.state.clone(),
        }
    }

    /// Replace the log with `data.state`. The stored profile is replaced only
    /// when the export carries one.
    pub fn import_all(&mut self, data: &ExportData) -> Result<ImportSummary> {
        validate_export(data).context("Import rejected")?;

        self.db.save_import(&data.state, data.profile.as_ref())?;
        self.state = data.state.clone();
        if let Some(profile) = &data.profile {
            self.profile = Some(profile.clone());
        }

        let summary = ImportSummary {
            days_imported: data.state.entries.len(),
            entries_imported: data.state.entry_count(),
            targets_imported: data.state.daily_targets.len(),
            profile_imported: data.profile.is_some(),
        };
        info!(
            days = summary.days_imported,
            entries = summary.entries_imported,
            "imported protein log"
        );
        Ok(summary)
    }

    pub fn import_csv<R: Read>(&mut self, reader: R, dry_run: bool) -> Result<CsvImportSummary> {
        let rows = csv_log::parse_protein_csv(reader)?;
        let mut next = self.state.clone();
        let summary = csv_log::import_rows(&mut next, &rows, dry_run)?;
        if !dry_run {
            self.db.save_state(&next)?;
            self.state = next;
        }
        Ok(summary)
    }

    pub fn export_csv<W: Write>(&self, writer: W) -> Result<usize> {
        csv_log::write_protein_csv(&self.state, writer)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::clock::FixedClock;
    use crate::models::BodyWeight;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    fn profile() -> UserProfile {
        UserProfile {
            name: "Sam".to_string(),
            weight: BodyWeight::kg(80.0),
            inception_date: today() - Duration::days(30),
        }
    }

    fn service() -> ProteinService<FixedClock> {
        let mut svc = ProteinService::open_in_memory(FixedClock::on(today())).unwrap();
        svc.set_profile(profile()).unwrap();
        svc
    }

    #[test]
    fn test_add_protein_entry_is_today() {
        let mut svc = service();
        svc.add_protein_entry(40.0).unwrap();
        svc.add_protein_entry(25.5).unwrap();
        assert_eq!(svc.todays_entries().len(), 2);
        assert!((svc.total_for_day(today()) - 65.5).abs() < 0.01);
        assert_eq!(
            svc.todays_entries()[0].time,
            NaiveTime::from_hms_opt(12, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_add_rejects_negative_grams() {
        let mut svc = service();
        assert!(svc.add_protein_entry(-1.0).is_err());
        assert!(svc.todays_entries().is_empty());
    }

    #[test]
    fn test_mutations_are_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proteus.db");
        let id = {
            let mut svc = ProteinService::open(&path, FixedClock::on(today())).unwrap();
            svc.set_profile(profile()).unwrap();
            svc.set_daily_target(today(), Some(150.0)).unwrap();
            svc.add_protein_entry(30.0).unwrap().id
        };

        let svc = ProteinService::open(&path, FixedClock::on(today())).unwrap();
        assert_eq!(svc.todays_entries()[0].id, id);
        assert_eq!(svc.profile(), Some(&profile()));
        assert!((svc.target_for_day(today()).unwrap() - 150.0).abs() < 0.01);
    }

    /// Make every later write to `table` fail, through a second connection.
    fn refuse_writes(path: &Path, table: &str) {
        let conn = rusqlite::Connection::open(path).unwrap();
        conn.execute_batch(&format!(
            "CREATE TRIGGER refuse_{table} BEFORE INSERT ON {table}
             BEGIN SELECT RAISE(ABORT, 'write refused'); END;"
        ))
        .unwrap();
    }

    #[test]
    fn test_failed_save_leaves_state_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proteus.db");
        let mut svc = ProteinService::open(&path, FixedClock::on(today())).unwrap();
        svc.set_profile(profile()).unwrap();
        let kept = svc.add_protein_entry(20.0).unwrap();

        refuse_writes(&path, "day_buckets");
        assert!(svc.add_protein_entry(40.0).is_err());
        assert!(svc.remove_entry(today(), &kept.id).is_err());
        assert_eq!(svc.todays_entries().len(), 1);
        assert!((svc.total_for_day(today()) - 20.0).abs() < 0.01);

        drop(svc);
        let reopened = ProteinService::open(&path, FixedClock::on(today())).unwrap();
        assert_eq!(reopened.todays_entries().len(), 1);
        assert_eq!(reopened.todays_entries()[0].id, kept.id);
    }

    #[test]
    fn test_failed_target_save_is_not_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proteus.db");
        let mut svc = ProteinService::open(&path, FixedClock::on(today())).unwrap();
        refuse_writes(&path, "daily_targets");
        assert!(svc.set_daily_target(today(), Some(150.0)).is_err());
        assert!(svc.state().daily_targets.is_empty());
    }

    #[test]
    fn test_add_entry_rejects_id_already_on_day() {
        let mut svc = service();
        let mut first = NewProteinEntry::new(30.0, NaiveTime::MIN);
        first.id = Some("fixed".to_string());
        svc.add_entry(today(), first.clone()).unwrap();

        let err = svc.add_entry(today(), first.clone()).unwrap_err();
        assert!(err.to_string().contains("already used"));
        assert_eq!(svc.todays_entries().len(), 1);

        // Another day may reuse it
        svc.add_entry(today() - Duration::days(1), first).unwrap();
        assert_eq!(svc.state().entry_count(), 2);
    }

    #[test]
    fn test_update_and_remove_entry() {
        let mut svc = service();
        let entry = svc
            .add_entry(today(), NewProteinEntry::new(30.0, NaiveTime::MIN))
            .unwrap();

        let changed = ProteinEntry {
            grams: 35.0,
            ..entry.clone()
        };
        assert!(svc.update_entry(today(), changed).unwrap());
        assert!((svc.total_for_day(today()) - 35.0).abs() < 0.01);

        let (day, found) = svc.locate_entry(&entry.id).unwrap();
        assert_eq!(day, today());
        assert_eq!(found.id, entry.id);

        assert!(svc.remove_entry(today(), &entry.id).unwrap());
        assert!(!svc.remove_entry(today(), &entry.id).unwrap());
        assert!(svc.todays_entries().is_empty());
    }

    #[test]
    fn test_queries_without_profile_fail() {
        let svc = ProteinService::open_in_memory(FixedClock::on(today())).unwrap();
        assert!(svc.profile().is_none());
        let err = svc.streak().unwrap_err();
        assert!(err.to_string().contains("No profile set"));
        assert!(svc.day_summary(today()).is_err());
        assert!(svc.recommended_target().is_err());
        // Day totals need no profile
        assert!(svc.total_for_day(today()).abs() < f64::EPSILON);
    }

    #[test]
    fn test_set_profile_rejects_zero_weight() {
        let mut svc = service();
        let mut bad = profile();
        bad.weight = BodyWeight::kg(0.0);
        assert!(svc.set_profile(bad).is_err());
        assert_eq!(svc.profile(), Some(&profile()));
    }

    #[test]
    fn test_target_defaults_to_recommended() {
        let mut svc = service();
        assert!((svc.recommended_target().unwrap() - 128.0).abs() < 0.01);
        assert!((svc.target_for_day(today()).unwrap() - 128.0).abs() < 0.01);

        svc.set_daily_target(today() - Duration::days(2), Some(140.0))
            .unwrap();
        svc.set_daily_target(today(), None).unwrap();
        assert!((svc.target_for_day(today() - Duration::days(1)).unwrap() - 140.0).abs() < 0.01);
        assert!((svc.target_for_day(today()).unwrap() - 128.0).abs() < 0.01);
        assert_eq!(svc.target_history().len(), 2);
    }

    #[test]
    fn test_set_daily_target_rejects_zero() {
        let mut svc = service();
        assert!(svc.set_daily_target(today(), Some(0.0)).is_err());
        assert!(svc.state().daily_targets.is_empty());
    }

    #[test]
    fn test_day_summary_and_streak() {
        let mut svc = service();
        svc.set_daily_target(today() - Duration::days(5), Some(100.0))
            .unwrap();
        for offset in 0..3 {
            svc.add_entry(
                today() - Duration::days(offset),
                NewProteinEntry::new(110.0, NaiveTime::MIN),
            )
            .unwrap();
        }
        assert_eq!(svc.streak().unwrap(), 3);

        let summary = svc.day_summary(today()).unwrap();
        assert!(summary.met_goal);
        assert!(summary.remaining.abs() < f64::EPSILON);
        assert_eq!(summary.entry_count, 1);

        let results = svc
            .daily_target_results(today() - Duration::days(3))
            .unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.met_goal));
    }

    #[test]
    fn test_averages() {
        let mut svc = service();
        let start = selectors::week_start(today());
        let mut day = start;
        while day <= today() {
            svc.add_entry(day, NewProteinEntry::new(90.0, NaiveTime::MIN))
                .unwrap();
            day = day.succ_opt().unwrap();
        }
        assert!((svc.weekly_average(start) - 90.0).abs() < 0.01);

        let month = svc.monthly_average(selectors::month_start(today())).unwrap();
        assert!(month.avg_protein_per_day > 0.0);
    }

    #[test]
    fn test_export_import_roundtrip() {
        let mut source = service();
        source.add_protein_entry(30.0).unwrap();
        source.set_daily_target(today(), Some(160.0)).unwrap();
        let data = source.export_all();
        assert_eq!(data.version, EXPORT_VERSION);

        let mut target = ProteinService::open_in_memory(FixedClock::on(today())).unwrap();
        let summary = target.import_all(&data).unwrap();
        assert_eq!(summary.entries_imported, 1);
        assert_eq!(summary.targets_imported, 1);
        assert!(summary.profile_imported);
        assert_eq!(target.state(), source.state());
        assert_eq!(target.profile(), Some(&profile()));
    }

    #[test]
    fn test_import_all_keeps_profile_when_absent() {
        let mut svc = service();
        svc.add_protein_entry(30.0).unwrap();
        let data = ExportData {
            version: EXPORT_VERSION,
            exported_at: String::new(),
            profile: None,
            state: ProteinState::default(),
        };
        let summary = svc.import_all(&data).unwrap();
        assert!(!summary.profile_imported);
        assert!(svc.todays_entries().is_empty());
        assert_eq!(svc.profile(), Some(&profile()));
    }

    #[test]
    fn test_import_all_rejects_bad_data() {
        let mut svc = service();
        svc.add_protein_entry(30.0).unwrap();
        let mut data = svc.export_all();
        data.version = 99;
        assert!(svc.import_all(&data).is_err());

        let mut data = svc.export_all();
        data.state.daily_targets.push(DailyTargetRecord {
            day: today(),
            target: Some(-5.0),
        });
        assert!(svc.import_all(&data).is_err());
        assert_eq!(svc.todays_entries().len(), 1);
    }

    #[test]
    fn test_csv_import_and_export() {
        let mut svc = service();
        let csv = "Date,Grams\n2024-06-14,40\n2024-06-15,25\n";

        let dry = svc.import_csv(csv.as_bytes(), true).unwrap();
        assert_eq!(dry.entries_added, 2);
        assert_eq!(svc.state().entry_count(), 0);

        let summary = svc.import_csv(csv.as_bytes(), false).unwrap();
        assert_eq!(summary.days_spanned, 2);
        assert!((svc.total_for_day(today()) - 25.0).abs() < 0.01);

        let mut out = Vec::new();
        assert_eq!(svc.export_csv(&mut out).unwrap(), 2);
        assert!(String::from_utf8(out).unwrap().contains("2024-06-14,00:00,40,,"));
    }
}
