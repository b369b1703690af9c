use anyhow::{Result, bail};
use chrono::NaiveDate;
use std::process;

use proteus_core::clock::Clock;
use proteus_core::models::{NewProteinEntry, ProteinEntry, format_day, format_time, parse_time};
use proteus_core::service::ProteinService;

use super::Service;
use super::helpers::{
    format_grams, json_error, match_id, no_neg_zero, parse_date, parse_grams, parse_time_arg,
    print_entry_table, short_id,
};

pub(crate) struct EntryFields {
    pub(crate) time: Option<String>,
    pub(crate) food: Option<String>,
    pub(crate) description: Option<String>,
}

pub(crate) fn cmd_add(
    svc: &mut Service,
    grams: &str,
    date: Option<String>,
    fields: EntryFields,
    json: bool,
) -> Result<()> {
    let grams = parse_grams(grams)?;
    let day = parse_date(date, svc.today())?;
    let time = parse_time_arg(fields.time.as_deref(), svc.now())?;

    let entry = svc.add_entry(
        day,
        NewProteinEntry {
            id: None,
            grams,
            time,
            food: fields.food,
            description: fields.description,
        },
    )?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "day": format_day(day), "entry": entry })
        );
    } else {
        let total = no_neg_zero(svc.total_for_day(day));
        let label = entry.food.as_deref().unwrap_or("protein");
        println!(
            "Logged {} of {label} at {} on {} [{}] (day total {total:.0}g)",
            format_grams(entry.grams),
            format_time(entry.time),
            format_day(day),
            short_id(&entry.id),
        );
    }
    Ok(())
}

pub(crate) fn cmd_list(svc: &Service, date: Option<String>, json: bool) -> Result<()> {
    let day = parse_date(date, svc.today())?;
    let entries = svc.entries_for_day(day);

    if json {
        println!("{}", serde_json::to_string_pretty(entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        eprintln!("No entries for {}", format_day(day));
        process::exit(2);
    }

    println!("=== {} ===\n", format_day(day));
    print_entry_table(entries);
    let total = no_neg_zero(svc.total_for_day(day));
    println!("  TOTAL: {total:.0}g");
    Ok(())
}

/// Find the entry an id (or id prefix) refers to, optionally within one day.
/// With a date, only that day's bucket is searched; ids are only unique per day.
fn find_entry<C: Clock>(
    svc: &ProteinService<C>,
    id: &str,
    date: Option<String>,
) -> Result<Option<(NaiveDate, ProteinEntry)>> {
    if let Some(d) = date {
        let day = parse_date(Some(d), svc.today())?;
        let full = match_id(id, svc.entries_for_day(day).iter().map(|e| e.id.as_str()))?;
        return Ok(full.and_then(|full| {
            svc.state()
                .find_entry(day, &full)
                .map(|e| (day, e.clone()))
        }));
    }

    let full = match_id(
        id,
        svc.state()
            .entries
            .iter()
            .flat_map(|b| b.entries.iter().map(|e| e.id.as_str())),
    )?;
    let Some(full) = full else {
        return Ok(None);
    };
    let days = svc
        .state()
        .entries
        .iter()
        .filter(|b| b.entries.iter().any(|e| e.id == full))
        .count();
    if days > 1 {
        bail!("Entry {full} exists on {days} days. Pass --date to pick one");
    }
    Ok(svc.locate_entry(&full).map(|(day, e)| (day, e.clone())))
}

fn not_found(id: &str, json: bool) -> ! {
    if json {
        println!("{}", json_error(&format!("Entry {id} not found")));
    } else {
        eprintln!("Entry {id} not found");
    }
    process::exit(2);
}

pub(crate) fn cmd_update(
    svc: &mut Service,
    id: &str,
    date: Option<String>,
    grams: Option<&str>,
    fields: EntryFields,
    json: bool,
) -> Result<()> {
    if grams.is_none()
        && fields.time.is_none()
        && fields.food.is_none()
        && fields.description.is_none()
    {
        bail!("Nothing to update. Provide at least one of --grams, --time, --food, or --desc");
    }

    let Some((day, existing)) = find_entry(svc, id, date)? else {
        not_found(id, json);
    };

    let updated = ProteinEntry {
        grams: grams.map(parse_grams).transpose()?.unwrap_or(existing.grams),
        time: fields
            .time
            .as_deref()
            .map(parse_time)
            .transpose()?
            .unwrap_or(existing.time),
        food: fields.food.or(existing.food),
        description: fields.description.or(existing.description),
        id: existing.id,
    };

    if !svc.update_entry(day, updated.clone())? {
        not_found(id, json);
    }

    if json {
        println!(
            "{}",
            serde_json::json!({ "day": format_day(day), "entry": updated })
        );
    } else {
        println!(
            "Updated entry {} on {}: {} at {}",
            short_id(&updated.id),
            format_day(day),
            format_grams(updated.grams),
            format_time(updated.time),
        );
    }
    Ok(())
}

pub(crate) fn cmd_remove(
    svc: &mut Service,
    id: &str,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let Some((day, entry)) = find_entry(svc, id, date)? else {
        not_found(id, json);
    };

    if !svc.remove_entry(day, &entry.id)? {
        not_found(id, json);
    }

    if json {
        println!(
            "{}",
            serde_json::json!({ "deleted": entry.id, "day": format_day(day) })
        );
    } else {
        println!(
            "Removed entry {} ({}) from {}",
            short_id(&entry.id),
            format_grams(entry.grams),
            format_day(day)
        );
    }
    Ok(())
}
