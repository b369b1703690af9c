use std::collections::HashSet;
use std::io::{Read, Write};

use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use tracing::{info, warn};

use crate::clock::truncate_to_minute;
use crate::models::{DATE_FORMAT, NewProteinEntry, ProteinState, TIME_FORMAT, validate_grams};

pub const CSV_HEADER: [&str; 5] = ["Date", "Time", "Grams", "Food", "Description"];

/// A single row parsed from a protein log CSV.
#[derive(Debug, Clone)]
pub struct CsvRow {
    pub date: String,
    pub time: Option<String>,
    pub grams: f64,
    pub food: Option<String>,
    pub description: Option<String>,
}

/// Summary of what a CSV import would do / did.
#[derive(Debug, Clone, Serialize)]
pub struct CsvImportSummary {
    pub rows_parsed: usize,
    pub entries_added: usize,
    pub days_spanned: usize,
}

/// Parse a protein log CSV from any reader.
///
/// Expected header: `Date,Grams` plus the optional `Time`, `Food` and
/// `Description` columns, in any order and any case.
pub fn parse_protein_csv<R: Read>(reader: R) -> Result<Vec<CsvRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers().context("Failed to read CSV headers")?.clone();

    for name in ["Date", "Grams"] {
        if !headers.iter().any(|h| h.eq_ignore_ascii_case(name)) {
            bail!("Missing required column: {name}");
        }
    }

    let col =
        |name: &str| -> Option<usize> { headers.iter().position(|h| h.eq_ignore_ascii_case(name)) };

    let idx_date = col("Date").context("Missing 'Date' column")?;
    let idx_grams = col("Grams").context("Missing 'Grams' column")?;
    let idx_time = col("Time");
    let idx_food = col("Food");
    let idx_desc = col("Description");

    let mut rows = Vec::new();

    for (line_num, result) in rdr.records().enumerate() {
        let line = line_num + 2;
        let record = result.with_context(|| format!("Failed to parse CSV row {line}"))?;

        let date = record.get(idx_date).unwrap_or("").to_string();
        let grams_raw = record.get(idx_grams).unwrap_or("");

        if date.is_empty() && grams_raw.is_empty() {
            continue;
        }
        if date.is_empty() {
            warn!(line, "skipping CSV row without a date");
            continue;
        }

        let grams: f64 = grams_raw
            .parse()
            .with_context(|| format!("Invalid grams '{grams_raw}' on CSV row {line}"))?;
        validate_grams(grams).with_context(|| format!("Invalid grams on CSV row {line}"))?;

        let optional = |idx: Option<usize>| -> Option<String> {
            idx.and_then(|i| record.get(i))
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        rows.push(CsvRow {
            date,
            time: optional(idx_time),
            grams,
            food: optional(idx_food),
            description: optional(idx_desc),
        });
    }

    Ok(rows)
}

/// Accept ISO dates as well as the `M/D/YYYY` and `D/M/YYYY` spreadsheet exports.
fn normalize_date(raw: &str) -> Result<NaiveDate> {
    for fmt in [DATE_FORMAT, "%m/%d/%Y", "%d/%m/%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return Ok(d);
        }
    }
    bail!("Cannot parse date: '{raw}'")
}

fn normalize_time(raw: Option<&str>) -> Result<NaiveTime> {
    match raw {
        None => Ok(NaiveTime::MIN),
        Some(t) => NaiveTime::parse_from_str(t, TIME_FORMAT)
            .or_else(|_| NaiveTime::parse_from_str(t, "%H:%M:%S"))
            .map(truncate_to_minute)
            .with_context(|| format!("Cannot parse time: '{t}'")),
    }
}

/// Append parsed rows to `state`. Rows without a time are logged at midnight.
///
/// Every row is validated before anything is written, so a bad row leaves
/// `state` untouched. When `dry_run` is true nothing is written at all.
pub fn import_rows(
    state: &mut ProteinState,
    rows: &[CsvRow],
    dry_run: bool,
) -> Result<CsvImportSummary> {
    let mut prepared = Vec::with_capacity(rows.len());
    let mut days: HashSet<NaiveDate> = HashSet::new();

    for row in rows {
        let day = normalize_date(&row.date)?;
        let time = normalize_time(row.time.as_deref())?;
        days.insert(day);
        prepared.push((
            day,
            NewProteinEntry {
                id: None,
                grams: row.grams,
                time,
                food: row.food.clone(),
                description: row.description.clone(),
            },
        ));
    }

    let entries_added = prepared.len();
    if !dry_run {
        for (day, entry) in prepared {
            state.add_entry(day, entry);
        }
        info!(entries_added, days = days.len(), "imported protein CSV");
    }

    Ok(CsvImportSummary {
        rows_parsed: rows.len(),
        entries_added,
        days_spanned: days.len(),
    })
}

/// Write every entry as CSV in calendar order. Returns the number of rows written.
pub fn write_protein_csv<W: Write>(state: &ProteinState, writer: W) -> Result<usize> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(CSV_HEADER)?;

    let mut buckets: Vec<_> = state.entries.iter().collect();
    buckets.sort_by_key(|b| b.day);

    let mut written = 0;
    for bucket in buckets {
        let date = bucket.day.format(DATE_FORMAT).to_string();
        for entry in &bucket.entries {
            let time = entry.time.format(TIME_FORMAT).to_string();
            let grams = entry.grams.to_string();
            wtr.write_record([
                date.as_str(),
                time.as_str(),
                grams.as_str(),
                entry.food.as_deref().unwrap_or(""),
                entry.description.as_deref().unwrap_or(""),
            ])?;
            written += 1;
        }
    }
    wtr.flush().context("Failed to flush CSV output")?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_CSV: &str = "\
Date,Time,Grams,Food,Description
2024-01-15,07:30,30,greek-yogurt,breakfast bowl
2024-01-15,12:45,42.5,,chicken wrap
2024-01-15,,25,whey,
2024-01-16,08:00,18,,
1/17/2024,19:10,55,steak,
";

    #[test]
    fn test_parse_protein_csv_basic() {
        let rows = parse_protein_csv(SAMPLE_CSV.as_bytes()).unwrap();
        assert_eq!(rows.len(), 5);

        assert_eq!(rows[0].date, "2024-01-15");
        assert_eq!(rows[0].time.as_deref(), Some("07:30"));
        assert!((rows[0].grams - 30.0).abs() < f64::EPSILON);
        assert_eq!(rows[0].food.as_deref(), Some("greek-yogurt"));
        assert_eq!(rows[0].description.as_deref(), Some("breakfast bowl"));

        assert!(rows[1].food.is_none());
        assert!(rows[2].time.is_none());
        assert!(rows[2].description.is_none());
    }

    #[test]
    fn test_parse_protein_csv_missing_required_column() {
        let bad_csv = "Date,Time\n2024-01-15,08:00\n";
        let result = parse_protein_csv(bad_csv.as_bytes());
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Grams"));
    }

    #[test]
    fn test_parse_protein_csv_case_insensitive_minimal() {
        let csv = "grams,date\n20,2024-01-15\n";
        let rows = parse_protein_csv(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].date, "2024-01-15");
        assert!(rows[0].time.is_none());
    }

    #[test]
    fn test_parse_protein_csv_skips_blank_rows() {
        let csv = "\
Date,Grams
2024-01-15,20
,
2024-01-16,30
";
        let rows = parse_protein_csv(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_parse_protein_csv_rejects_negative_grams() {
        let csv = "Date,Grams\n2024-01-15,-20\n";
        let err = parse_protein_csv(csv.as_bytes()).unwrap_err();
        assert!(format!("{err:#}").contains("row 2"));
    }

    #[test]
    fn test_parse_protein_csv_rejects_non_numeric_grams() {
        let csv = "Date,Grams\n2024-01-15,lots\n";
        assert!(parse_protein_csv(csv.as_bytes()).is_err());
    }

    #[test]
    fn test_normalize_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(normalize_date("2024-01-15").unwrap(), expected);
        assert_eq!(normalize_date("1/15/2024").unwrap(), expected);
        assert_eq!(normalize_date("15/01/2024").unwrap(), expected);
        assert!(normalize_date("not-a-date").is_err());
    }

    #[test]
    fn test_normalize_time() {
        assert_eq!(normalize_time(None).unwrap(), NaiveTime::MIN);
        assert_eq!(
            normalize_time(Some("18:20:45")).unwrap(),
            NaiveTime::from_hms_opt(18, 20, 0).unwrap()
        );
        assert!(normalize_time(Some("noon")).is_err());
    }

    #[test]
    fn test_import_rows_dry_run() {
        let mut state = ProteinState::default();
        let rows = parse_protein_csv(SAMPLE_CSV.as_bytes()).unwrap();

        let summary = import_rows(&mut state, &rows, true).unwrap();
        assert_eq!(summary.rows_parsed, 5);
        assert_eq!(summary.entries_added, 5);
        assert_eq!(summary.days_spanned, 3);
        assert_eq!(state, ProteinState::default());
    }

    #[test]
    fn test_import_rows_actual() {
        let mut state = ProteinState::default();
        let rows = parse_protein_csv(SAMPLE_CSV.as_bytes()).unwrap();

        let summary = import_rows(&mut state, &rows, false).unwrap();
        assert_eq!(summary.entries_added, 5);
        assert_eq!(state.entry_count(), 5);

        let jan15 = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let total: f64 = state.entries_for(jan15).iter().map(|e| e.grams).sum();
        assert!((total - 97.5).abs() < 0.01);
        assert_eq!(state.entries_for(jan15)[2].time, NaiveTime::MIN);
    }

    #[test]
    fn test_import_rows_bad_date_writes_nothing() {
        let mut state = ProteinState::default();
        let csv = "Date,Grams\n2024-01-15,20\nyesterday-ish,30\n";
        let rows = parse_protein_csv(csv.as_bytes()).unwrap();
        assert!(import_rows(&mut state, &rows, false).is_err());
        assert_eq!(state.entry_count(), 0);
    }

    #[test]
    fn test_write_protein_csv_calendar_order() {
        let mut state = ProteinState::default();
        let later = NaiveDate::from_ymd_opt(2024, 1, 20).unwrap();
        let earlier = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap();
        state.add_entry(later, NewProteinEntry::new(40.0, noon));
        let mut with_food = NewProteinEntry::new(22.5, noon);
        with_food.food = Some("tofu".to_string());
        state.add_entry(earlier, with_food);

        let mut out = Vec::new();
        let written = write_protein_csv(&state, &mut out).unwrap();
        assert_eq!(written, 2);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Date,Time,Grams,Food,Description");
        assert_eq!(lines[1], "2024-01-10,12:00,22.5,tofu,");
        assert_eq!(lines[2], "2024-01-20,12:00,40,,");
    }

    #[test]
    fn test_export_then_import_reproduces_totals() {
        let rows = parse_protein_csv(SAMPLE_CSV.as_bytes()).unwrap();
        let mut original = ProteinState::default();
        import_rows(&mut original, &rows, false).unwrap();

        let mut out = Vec::new();
        write_protein_csv(&original, &mut out).unwrap();

        let mut copy = ProteinState::default();
        let reparsed = parse_protein_csv(out.as_slice()).unwrap();
        import_rows(&mut copy, &reparsed, false).unwrap();
        assert_eq!(copy.entry_count(), original.entry_count());
        for bucket in &original.entries {
            let a: f64 = bucket.entries.iter().map(|e| e.grams).sum();
            let b: f64 = copy.entries_for(bucket.day).iter().map(|e| e.grams).sum();
            assert!((a - b).abs() < 0.01);
        }
    }
}
