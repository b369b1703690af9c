use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Calendar-day format for bucket keys, CSV files, and the database.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Local clock-time format for entry times.
pub const TIME_FORMAT: &str = "%H:%M";

pub const KG_PER_LB: f64 = 0.453_592;
pub const LBS_PER_KG: f64 = 2.20462;

/// A single logged amount of protein.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProteinEntry {
    pub id: String,
    pub grams: f64,
    #[serde(with = "clock_time")]
    pub time: NaiveTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub food: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Input for `ProteinState::add_entry`. The store assigns an id when `id` is `None`.
#[derive(Debug, Clone)]
pub struct NewProteinEntry {
    pub id: Option<String>,
    pub grams: f64,
    pub time: NaiveTime,
    pub food: Option<String>,
    pub description: Option<String>,
}

impl NewProteinEntry {
    #[must_use]
    pub fn new(grams: f64, time: NaiveTime) -> Self {
        Self {
            id: None,
            grams,
            time,
            food: None,
            description: None,
        }
    }
}

/// All entries logged on one calendar day, in insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayBucket {
    pub day: NaiveDate,
    pub entries: Vec<ProteinEntry>,
}

/// A goal change, effective from `day` until a later record supersedes it.
/// `target: None` clears the override back to the recommended value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyTargetRecord {
    pub day: NaiveDate,
    pub target: Option<f64>,
}

/// The whole tracked state: day buckets in first-touch order plus the
/// append-only log of goal overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProteinState {
    #[serde(default)]
    pub entries: Vec<DayBucket>,
    #[serde(default)]
    pub daily_targets: Vec<DailyTargetRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MassUnit {
    Kg,
    Lb,
}

impl MassUnit {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MassUnit::Kg => "kg",
            MassUnit::Lb => "lb",
        }
    }
}

impl fmt::Display for MassUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MassUnit {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "kg" | "kgs" | "kilogram" | "kilograms" => Ok(MassUnit::Kg),
            "lb" | "lbs" | "pound" | "pounds" => Ok(MassUnit::Lb),
            _ => bail!("Invalid unit '{s}'. Use 'kg' or 'lb'"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BodyWeight {
    pub value: f64,
    pub unit: MassUnit,
}

impl BodyWeight {
    #[must_use]
    pub fn kg(value: f64) -> Self {
        Self {
            value,
            unit: MassUnit::Kg,
        }
    }

    #[must_use]
    pub fn lb(value: f64) -> Self {
        Self {
            value,
            unit: MassUnit::Lb,
        }
    }

    #[must_use]
    pub fn kilograms(&self) -> f64 {
        match self.unit {
            MassUnit::Kg => self.value,
            MassUnit::Lb => self.value * KG_PER_LB,
        }
    }

    #[must_use]
    pub fn pounds(&self) -> f64 {
        match self.unit {
            MassUnit::Kg => self.value * LBS_PER_KG,
            MassUnit::Lb => self.value,
        }
    }
}

/// Read-only profile data the aggregates depend on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    pub weight: BodyWeight,
    /// First day of the account; nothing before it is aggregated.
    pub inception_date: NaiveDate,
}

/// One row of the goal history: what was eaten on `day` against the goal in effect.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyTargetResult {
    pub day: NaiveDate,
    pub total_grams: f64,
    pub met_goal: bool,
    pub resolved_target: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MonthlyAverage {
    pub avg_protein_per_day: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DaySummary {
    pub day: NaiveDate,
    pub total_grams: f64,
    pub target: f64,
    pub remaining: f64,
    pub met_goal: bool,
    pub entry_count: usize,
}

// --- Export / Import types ---

pub const EXPORT_VERSION: i64 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportData {
    pub version: i64,
    pub exported_at: String,
    #[serde(default)]
    pub profile: Option<UserProfile>,
    pub state: ProteinState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSummary {
    pub days_imported: usize,
    pub entries_imported: usize,
    pub targets_imported: usize,
    pub profile_imported: bool,
}

// --- Boundary validation (the store itself accepts anything) ---

pub fn validate_grams(grams: f64) -> Result<f64> {
    if !grams.is_finite() {
        bail!("Protein amount must be a finite number");
    }
    if grams < 0.0 {
        bail!("Protein amount must not be negative");
    }
    Ok(grams)
}

pub fn validate_target(target: f64) -> Result<f64> {
    if !target.is_finite() || target <= 0.0 {
        bail!("Daily target must be greater than 0");
    }
    Ok(target)
}

pub fn validate_weight(weight: &BodyWeight) -> Result<()> {
    if !weight.value.is_finite() || weight.value <= 0.0 {
        bail!("Weight must be greater than 0");
    }
    Ok(())
}

/// Validate everything an imported state could smuggle past the CLI checks.
pub fn validate_state(state: &ProteinState) -> Result<()> {
    let mut seen = HashSet::new();
    for bucket in &state.entries {
        if !seen.insert(bucket.day) {
            bail!("Duplicate day bucket for {}", bucket.day.format(DATE_FORMAT));
        }
        let mut ids = HashSet::new();
        for entry in &bucket.entries {
            if !ids.insert(entry.id.as_str()) {
                bail!(
                    "Duplicate entry id '{}' on {}",
                    entry.id,
                    bucket.day.format(DATE_FORMAT)
                );
            }
            validate_grams(entry.grams).with_context(|| {
                format!(
                    "Invalid entry '{}' on {}",
                    entry.id,
                    bucket.day.format(DATE_FORMAT)
                )
            })?;
        }
    }
    for record in &state.daily_targets {
        if let Some(target) = record.target {
            validate_target(target).with_context(|| {
                format!(
                    "Invalid daily target on {}",
                    record.day.format(DATE_FORMAT)
                )
            })?;
        }
    }
    Ok(())
}

/// Everything `import_all` checks before touching the store.
pub fn validate_export(data: &ExportData) -> Result<()> {
    if data.version != EXPORT_VERSION {
        bail!(
            "Unsupported export version {} (expected {EXPORT_VERSION})",
            data.version
        );
    }
    validate_state(&data.state)?;
    if let Some(profile) = &data.profile {
        validate_weight(&profile.weight).context("Invalid profile")?;
    }
    Ok(())
}

pub fn parse_day(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
        .with_context(|| format!("Invalid date '{s}'. Use YYYY-MM-DD"))
}

pub fn parse_time(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), TIME_FORMAT)
        .with_context(|| format!("Invalid time '{s}'. Use HH:MM"))
}

#[must_use]
pub fn format_day(day: NaiveDate) -> String {
    day.format(DATE_FORMAT).to_string()
}

#[must_use]
pub fn format_time(time: NaiveTime) -> String {
    time.format(TIME_FORMAT).to_string()
}

#[must_use]
pub fn export_timestamp() -> String {
    Local::now().to_rfc3339()
}

mod clock_time {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    use super::TIME_FORMAT;

    pub fn serialize<S: Serializer>(time: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&time.format(TIME_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveTime::parse_from_str(&raw, TIME_FORMAT).map_err(D::Error::custom)
    }
}
