use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate, NaiveTime};
use rusqlite::{Connection, params};
use tracing::info;

use crate::models::{
    BodyWeight, DATE_FORMAT, DailyTargetRecord, DayBucket, MassUnit, ProteinEntry, ProteinState,
    TIME_FORMAT, UserProfile,
};

const PROFILE_NAME: &str = "profile_name";
const WEIGHT_VALUE: &str = "weight_value";
const WEIGHT_UNIT: &str = "weight_unit";
const INCEPTION_DATE: &str = "inception_date";

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS day_buckets (
                    day TEXT PRIMARY KEY NOT NULL,
                    position INTEGER NOT NULL
                );

                CREATE TABLE IF NOT EXISTS protein_entries (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT NOT NULL,
                    day TEXT NOT NULL REFERENCES day_buckets(day),
                    position INTEGER NOT NULL,
                    grams REAL NOT NULL,
                    time TEXT NOT NULL,
                    food TEXT,
                    description TEXT
                );

                CREATE INDEX IF NOT EXISTS idx_protein_entries_day ON protein_entries(day);

                CREATE TABLE IF NOT EXISTS daily_targets (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    day TEXT NOT NULL,
                    target REAL
                );

                CREATE TABLE IF NOT EXISTS user_settings (
                    key TEXT PRIMARY KEY NOT NULL,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
                );

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    // --- State tree ---

    /// Rebuild the full state: buckets in first-touch order, entries in
    /// insertion order, and the target log in the order it was written.
    pub fn load_state(&self) -> Result<ProteinState> {
        let mut bucket_stmt = self
            .conn
            .prepare("SELECT day FROM day_buckets ORDER BY position")?;
        let days = bucket_stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut entry_stmt = self.conn.prepare(
            "SELECT uuid, grams, time, food, description
             FROM protein_entries WHERE day = ?1
             ORDER BY position",
        )?;

        let mut entries = Vec::with_capacity(days.len());
        for day_str in days {
            let day = parse_stored_day(&day_str)?;
            let bucket_entries = entry_stmt
                .query_map(params![day_str], Self::entry_row)?
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .map(|(uuid, grams, time, food, description)| {
                    Ok(ProteinEntry {
                        id: uuid,
                        grams,
                        time: parse_stored_time(&time)?,
                        food,
                        description,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            entries.push(DayBucket {
                day,
                entries: bucket_entries,
            });
        }

        let mut target_stmt = self
            .conn
            .prepare("SELECT day, target FROM daily_targets ORDER BY id")?;
        let daily_targets = target_stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Option<f64>>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|(day, target)| {
                Ok(DailyTargetRecord {
                    day: parse_stored_day(&day)?,
                    target,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ProteinState {
            entries,
            daily_targets,
        })
    }

    #[allow(clippy::type_complexity)]
    fn entry_row(
        row: &rusqlite::Row,
    ) -> rusqlite::Result<(String, f64, String, Option<String>, Option<String>)> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
        ))
    }

    /// Replace the stored state with `state` in a single transaction.
    pub fn save_state(&self, state: &ProteinState) -> Result<()> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to start save transaction")?;
        write_state(&tx, state)?;
        tx.commit().context("Failed to commit state")?;
        info!(
            days = state.entries.len(),
            targets = state.daily_targets.len(),
            "saved protein state"
        );
        Ok(())
    }

    /// Replace the stored state and, when given, the profile, all in one transaction.
    pub fn save_import(&self, state: &ProteinState, profile: Option<&UserProfile>) -> Result<()> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to start import transaction")?;
        write_state(&tx, state)?;
        if let Some(profile) = profile {
            write_profile(&tx, profile)?;
        }
        tx.commit().context("Failed to commit import")?;
        Ok(())
    }

    // --- Profile ---

    /// The stored profile, or `None` until weight and inception date have been set.
    pub fn get_profile(&self) -> Result<Option<UserProfile>> {
        let (Some(value), Some(unit), Some(inception)) = (
            self.get_setting(WEIGHT_VALUE)?,
            self.get_setting(WEIGHT_UNIT)?,
            self.get_setting(INCEPTION_DATE)?,
        ) else {
            return Ok(None);
        };
        let value: f64 = value
            .parse()
            .with_context(|| format!("Invalid stored weight '{value}'"))?;
        let unit: MassUnit = unit.parse()?;
        let inception_date = parse_stored_day(&inception)?;
        let name = self.get_setting(PROFILE_NAME)?.unwrap_or_default();
        Ok(Some(UserProfile {
            name,
            weight: BodyWeight { value, unit },
            inception_date,
        }))
    }

    pub fn set_profile(&self, profile: &UserProfile) -> Result<()> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to start profile transaction")?;
        write_profile(&tx, profile)?;
        tx.commit().context("Failed to commit profile")?;
        Ok(())
    }

    // --- User Settings ---

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM user_settings WHERE key = ?1")?;
        let mut rows = stmt.query(params![key])?;
        if let Some(row) = rows.next()? {
            Ok(Some(row.get(0)?))
        } else {
            Ok(None)
        }
    }
}

fn write_state(conn: &Connection, state: &ProteinState) -> Result<()> {
    conn.execute_batch(
        "DELETE FROM protein_entries;
         DELETE FROM day_buckets;
         DELETE FROM daily_targets;",
    )?;

    let mut bucket_stmt = conn.prepare("INSERT INTO day_buckets (day, position) VALUES (?1, ?2)")?;
    let mut entry_stmt = conn.prepare(
        "INSERT INTO protein_entries (uuid, day, position, grams, time, food, description)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    for (bucket_pos, bucket) in state.entries.iter().enumerate() {
        let day_str = bucket.day.format(DATE_FORMAT).to_string();
        bucket_stmt.execute(params![day_str, position(bucket_pos)])?;
        for (entry_pos, entry) in bucket.entries.iter().enumerate() {
            entry_stmt.execute(params![
                entry.id,
                day_str,
                position(entry_pos),
                entry.grams,
                entry.time.format(TIME_FORMAT).to_string(),
                entry.food,
                entry.description,
            ])?;
        }
    }

    let mut target_stmt = conn.prepare("INSERT INTO daily_targets (day, target) VALUES (?1, ?2)")?;
    for record in &state.daily_targets {
        target_stmt.execute(params![
            record.day.format(DATE_FORMAT).to_string(),
            record.target,
        ])?;
    }
    Ok(())
}

fn write_profile(conn: &Connection, profile: &UserProfile) -> Result<()> {
    write_setting(conn, PROFILE_NAME, &profile.name)?;
    write_setting(conn, WEIGHT_VALUE, &profile.weight.value.to_string())?;
    write_setting(conn, WEIGHT_UNIT, profile.weight.unit.as_str())?;
    write_setting(
        conn,
        INCEPTION_DATE,
        &profile.inception_date.format(DATE_FORMAT).to_string(),
    )
}

fn write_setting(conn: &Connection, key: &str, value: &str) -> Result<()> {
    let now = Local::now().to_rfc3339();
    conn.execute(
        "INSERT INTO user_settings (key, value, updated_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![key, value, now],
    )?;
    Ok(())
}

fn position(idx: usize) -> i64 {
    i64::try_from(idx).unwrap_or(i64::MAX)
}

fn parse_stored_day(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).with_context(|| format!("Corrupt stored day '{s}'"))
}

fn parse_stored_time(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s, TIME_FORMAT).with_context(|| format!("Corrupt stored time '{s}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewProteinEntry;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn sample_state() -> ProteinState {
        let mut state = ProteinState::default();
        state.add_entry(day(15), NewProteinEntry::new(30.0, at(8, 0)));
        let mut shake = NewProteinEntry::new(25.5, at(7, 30));
        shake.food = Some("whey".to_string());
        shake.description = Some("post-workout".to_string());
        state.add_entry(day(3), shake);
        state.add_entry(day(15), NewProteinEntry::new(40.0, at(6, 0)));
        state.set_daily_target(day(10), Some(150.0));
        state.set_daily_target(day(2), Some(120.0));
        state.set_daily_target(day(12), None);
        state
    }

    #[test]
    fn test_load_empty_state() {
        let db = Database::open_in_memory().unwrap();
        let state = db.load_state().unwrap();
        assert!(state.entries.is_empty());
        assert!(state.daily_targets.is_empty());
    }

    #[test]
    fn test_save_and_load_preserves_order() {
        let db = Database::open_in_memory().unwrap();
        let state = sample_state();
        db.save_state(&state).unwrap();

        let loaded = db.load_state().unwrap();
        assert_eq!(loaded, state);
        // First-touch order, not calendar order
        assert_eq!(loaded.entries[0].day, day(15));
        assert_eq!(loaded.entries[1].day, day(3));
        // Target log keeps write order
        assert_eq!(loaded.daily_targets[1].day, day(2));
        assert!(loaded.daily_targets[2].target.is_none());
    }

    #[test]
    fn test_save_replaces_previous_state() {
        let db = Database::open_in_memory().unwrap();
        db.save_state(&sample_state()).unwrap();

        let mut smaller = ProteinState::default();
        smaller.add_entry(day(20), NewProteinEntry::new(10.0, at(9, 0)));
        db.save_state(&smaller).unwrap();

        let loaded = db.load_state().unwrap();
        assert_eq!(loaded, smaller);
    }

    #[test]
    fn test_empty_bucket_survives_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let mut state = ProteinState::default();
        let entry = state.add_entry(day(15), NewProteinEntry::new(10.0, at(9, 0)));
        state.remove_entry(day(15), &entry.id);
        db.save_state(&state).unwrap();

        let loaded = db.load_state().unwrap();
        assert_eq!(loaded.entries.len(), 1);
        assert!(loaded.entries_for(day(15)).is_empty());
    }

    #[test]
    fn test_state_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proteus.db");
        let state = sample_state();
        {
            let db = Database::open(&path).unwrap();
            db.save_state(&state).unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.load_state().unwrap(), state);
    }

    #[test]
    fn test_profile_none_until_set() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_profile().unwrap().is_none());
    }

    #[test]
    fn test_profile_set_get() {
        let db = Database::open_in_memory().unwrap();
        let profile = UserProfile {
            name: "Sam".to_string(),
            weight: BodyWeight::lb(200.0),
            inception_date: day(1),
        };
        db.set_profile(&profile).unwrap();
        assert_eq!(db.get_profile().unwrap(), Some(profile.clone()));

        let heavier = UserProfile {
            weight: BodyWeight::kg(95.5),
            ..profile
        };
        db.set_profile(&heavier).unwrap();
        assert_eq!(db.get_profile().unwrap(), Some(heavier));
    }

    #[test]
    fn test_profile_corrupt_weight() {
        let db = Database::open_in_memory().unwrap();
        write_setting(&db.conn, WEIGHT_VALUE, "heavy").unwrap();
        write_setting(&db.conn, WEIGHT_UNIT, "kg").unwrap();
        write_setting(&db.conn, INCEPTION_DATE, "2024-06-01").unwrap();
        assert!(db.get_profile().is_err());
    }

    #[test]
    fn test_settings_overwrite() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_setting("missing").unwrap().is_none());
        write_setting(&db.conn, "k", "v1").unwrap();
        write_setting(&db.conn, "k", "v2").unwrap();
        assert_eq!(db.get_setting("k").unwrap().as_deref(), Some("v2"));
    }

    #[test]
    fn test_set_profile_is_all_or_nothing() {
        let db = Database::open_in_memory().unwrap();
        db.conn
            .execute_batch(
                "CREATE TRIGGER reject_inception BEFORE INSERT ON user_settings
                 WHEN NEW.key = 'inception_date'
                 BEGIN SELECT RAISE(ABORT, 'write refused'); END;",
            )
            .unwrap();
        let profile = UserProfile {
            name: "Sam".to_string(),
            weight: BodyWeight::kg(80.0),
            inception_date: day(1),
        };
        assert!(db.set_profile(&profile).is_err());
        assert!(db.get_setting(PROFILE_NAME).unwrap().is_none());
        assert!(db.get_setting(WEIGHT_VALUE).unwrap().is_none());
    }

    #[test]
    fn test_save_import_writes_state_and_profile() {
        let db = Database::open_in_memory().unwrap();
        let profile = UserProfile {
            name: String::new(),
            weight: BodyWeight::kg(70.0),
            inception_date: day(1),
        };
        db.save_import(&sample_state(), Some(&profile)).unwrap();
        assert_eq!(db.load_state().unwrap(), sample_state());
        assert_eq!(db.get_profile().unwrap(), Some(profile));
    }

    #[test]
    fn test_migration_sets_user_version() {
        let db = Database::open_in_memory().unwrap();
        let version: i64 = db
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, 1);
    }
}
