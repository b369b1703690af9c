use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use proteus_core::models::{ProteinEntry, format_time, parse_time};

/// Parse a protein amount: "30", "30g" or "30.5 g".
pub(crate) fn parse_grams(s: &str) -> Result<f64> {
    let trimmed = s.trim().trim_end_matches('g').trim();
    let value: f64 = trimmed
        .parse()
        .with_context(|| format!("Invalid amount: '{s}'. Use a number like '30' or '30g'"))?;
    if !value.is_finite() || value < 0.0 {
        bail!("Protein amount must not be negative");
    }
    Ok(value)
}

/// Parse a day relative to `today`. `None` means today.
pub(crate) fn parse_date(date_str: Option<String>, today: NaiveDate) -> Result<NaiveDate> {
    match date_str {
        None => Ok(today),
        Some(s) => match s.as_str() {
            "today" => Ok(today),
            "yesterday" => today.pred_opt().context("No day before today"),
            "tomorrow" => today.succ_opt().context("No day after today"),
            _ => NaiveDate::parse_from_str(&s, "%Y-%m-%d").with_context(|| {
                format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
            }),
        },
    }
}

pub(crate) fn parse_time_arg(time: Option<&str>, now: NaiveTime) -> Result<NaiveTime> {
    time.map_or(Ok(now), parse_time)
}

pub(crate) fn print_entry_table(entries: &[ProteinEntry]) {
    #[derive(Tabled)]
    struct EntryRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Time")]
        time: String,
        #[tabled(rename = "Protein")]
        grams: String,
        #[tabled(rename = "Food")]
        food: String,
        #[tabled(rename = "Description")]
        description: String,
    }

    let rows: Vec<EntryRow> = entries
        .iter()
        .map(|e| EntryRow {
            id: short_id(&e.id).to_string(),
            time: format_time(e.time),
            grams: format_grams(e.grams),
            food: e.food.as_deref().map(|f| truncate(f, 25)).unwrap_or_default(),
            description: e
                .description
                .as_deref()
                .map(|d| truncate(d, 35))
                .unwrap_or_default(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::single(2)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

/// First 8 characters of an entry id, enough to tell entries apart in a table.
pub(crate) fn short_id(id: &str) -> &str {
    id.char_indices().nth(8).map_or(id, |(i, _)| &id[..i])
}

/// Resolve a full or shortened entry id against `ids`.
pub(crate) fn match_id<'a>(
    prefix: &str,
    ids: impl Iterator<Item = &'a str>,
) -> Result<Option<String>> {
    let matches: Vec<&str> = ids.filter(|id| id.starts_with(prefix)).collect();
    match matches.as_slice() {
        [] => Ok(None),
        [id] => Ok(Some((*id).to_string())),
        _ if matches.contains(&prefix) => Ok(Some(prefix.to_string())),
        _ => bail!("Entry id '{prefix}' is ambiguous. Use more characters"),
    }
}

pub(crate) fn format_grams(grams: f64) -> String {
    let grams = no_neg_zero(grams);
    if grams.fract() == 0.0 {
        format!("{grams:.0}g")
    } else {
        format!("{grams:.1}g")
    }
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
