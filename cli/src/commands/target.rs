use anyhow::{Context, Result, bail};
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use proteus_core::models::format_day;

use super::Service;
use super::helpers::{format_grams, parse_date};

/// `"unset"` (or `"none"`) returns to the recommended goal.
fn parse_target(value: &str) -> Result<Option<f64>> {
    match value.trim().to_lowercase().as_str() {
        "unset" | "none" => Ok(None),
        other => {
            let grams: f64 = other.trim_end_matches('g').trim().parse().with_context(|| {
                format!("Invalid target '{value}'. Use a number of grams or 'unset'")
            })?;
            if !grams.is_finite() || grams <= 0.0 {
                bail!("Daily target must be greater than 0");
            }
            Ok(Some(grams))
        }
    }
}

pub(crate) fn cmd_target_set(
    svc: &mut Service,
    value: &str,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let target = parse_target(value)?;
    let day = parse_date(date, svc.today())?;
    svc.set_daily_target(day, target)?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "day": format_day(day), "target": target })
        );
    } else {
        match target {
            Some(t) => println!("Daily target set to {} from {}", format_grams(t), format_day(day)),
            None => println!(
                "Daily target reset to the recommended goal from {}",
                format_day(day)
            ),
        }
    }
    Ok(())
}

pub(crate) fn cmd_target_show(svc: &Service, date: Option<String>, json: bool) -> Result<()> {
    let day = parse_date(date, svc.today())?;
    let target = svc.target_for_day(day)?;
    let recommended = svc.recommended_target()?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "day": format_day(day),
                "target": target,
                "recommended": recommended,
            })
        );
    } else {
        println!("{}: {}/day", format_day(day), format_grams(target));
        println!("  Recommended for your weight: {}", format_grams(recommended));
    }
    Ok(())
}

pub(crate) fn cmd_target_history(svc: &Service, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct TargetRow {
        #[tabled(rename = "From")]
        day: String,
        #[tabled(rename = "Target")]
        target: String,
    }

    let history = svc.target_history();

    if json {
        println!("{}", serde_json::to_string_pretty(&history)?);
        return Ok(());
    }

    if history.is_empty() {
        eprintln!("No target changes recorded. Using the recommended goal");
        process::exit(2);
    }

    let rows: Vec<TargetRow> = history
        .iter()
        .map(|r| TargetRow {
            day: format_day(r.day),
            target: r
                .target
                .map_or_else(|| "recommended".to_string(), format_grams),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::single(1)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}
