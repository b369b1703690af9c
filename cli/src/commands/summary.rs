use anyhow::{Context, Result};
use chrono::{Days, NaiveDate};
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use proteus_core::models::format_day;
use proteus_core::selectors::{month_end, month_start, week_end, week_start};

use super::Service;
use super::helpers::{format_grams, no_neg_zero, parse_date, print_entry_table};

pub(crate) fn cmd_summary(svc: &Service, date: Option<String>, json: bool) -> Result<()> {
    let day = parse_date(date, svc.today())?;
    let summary = svc.day_summary(day)?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "summary": summary,
                "entries": svc.entries_for_day(day),
            })
        );
        return Ok(());
    }

    println!("=== {} ===\n", format_day(day));
    let entries = svc.entries_for_day(day);
    if entries.is_empty() {
        println!("  No entries yet.\n");
    } else {
        print_entry_table(entries);
        println!();
    }

    let total = no_neg_zero(summary.total_grams);
    println!("  TOTAL:     {total:.0}g");
    println!("  TARGET:    {}", format_grams(summary.target));
    if summary.met_goal {
        println!("  Goal met.");
    } else {
        println!("  REMAINING: {:.0}g", summary.remaining);
    }
    Ok(())
}

pub(crate) fn cmd_week(svc: &Service, start: Option<String>, json: bool) -> Result<()> {
    let start = match start {
        Some(s) => parse_date(Some(s), svc.today())?,
        None => week_start(svc.today()),
    };
    let avg = no_neg_zero(svc.weekly_average(start));

    if json {
        println!(
            "{}",
            serde_json::json!({ "week_start": format_day(start), "avg_protein_per_day": avg })
        );
    } else {
        println!(
            "Week {} to {}: {avg:.1}g/day average",
            format_day(start),
            format_day(week_end(start))
        );
    }
    Ok(())
}

pub(crate) fn cmd_month(svc: &Service, start: Option<String>, json: bool) -> Result<()> {
    let start = match start {
        Some(s) => month_start(parse_date(Some(s), svc.today())?),
        None => month_start(svc.today()),
    };
    let average = svc.monthly_average(start)?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "month_start": format_day(start),
                "avg_protein_per_day": no_neg_zero(average.avg_protein_per_day),
            })
        );
    } else {
        let avg = no_neg_zero(average.avg_protein_per_day);
        println!(
            "{} to {}: {avg:.1}g/day average",
            format_day(start),
            format_day(month_end(start))
        );
    }
    Ok(())
}

pub(crate) fn cmd_streak(svc: &Service, json: bool) -> Result<()> {
    let streak = svc.streak()?;

    if json {
        println!("{}", serde_json::json!({ "streak": streak }));
    } else if streak == 0 {
        println!("No streak yet. Hit today's target to start one.");
    } else {
        let days = if streak == 1 { "day" } else { "days" };
        println!("{streak} {days} in a row at or above target");
    }
    Ok(())
}

pub(crate) fn cmd_history(svc: &Service, days: u32, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct HistoryRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Protein")]
        protein: String,
        #[tabled(rename = "Target")]
        target: String,
        #[tabled(rename = "Met")]
        met: String,
    }

    let start = history_start(svc.today(), days)?;
    let mut results = svc.daily_target_results(start)?;
    results.reverse();

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.iter().all(|r| r.total_grams <= 0.0) {
        eprintln!("No entries in the last {days} days");
        process::exit(2);
    }

    let rows: Vec<HistoryRow> = results
        .iter()
        .map(|r| HistoryRow {
            date: format_day(r.day),
            protein: format_grams(r.total_grams),
            target: format_grams(r.resolved_target),
            met: if r.met_goal { "yes" } else { "no" }.to_string(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..3)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}

/// Day before the first row of a `days`-long history ending `today`.
/// Results cover the days after it, so this yields exactly `days` rows.
fn history_start(today: NaiveDate, days: u32) -> Result<NaiveDate> {
    today
        .checked_sub_days(Days::new(days.into()))
        .with_context(|| format!("--days {days} reaches before the start of the calendar"))
}
