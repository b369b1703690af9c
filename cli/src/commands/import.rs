use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};

use proteus_core::models::{ExportData, validate_export};

use super::Service;

pub(crate) fn cmd_export(svc: &Service, path: Option<&Path>, csv: bool, json: bool) -> Result<()> {
    let mut out: Box<dyn Write> = match path {
        Some(p) => Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("Failed to create file: {}", p.display()))?,
        )),
        None => Box::new(io::stdout().lock()),
    };

    let entries = if csv {
        svc.export_csv(&mut out)?
    } else {
        let data = svc.export_all();
        serde_json::to_writer_pretty(&mut out, &data)?;
        writeln!(out)?;
        data.state.entry_count()
    };
    out.flush()?;

    // Status goes to stderr when the export itself is on stdout
    if let Some(p) = path {
        if json {
            println!(
                "{}",
                serde_json::json!({ "path": p.display().to_string(), "entries": entries })
            );
        } else {
            println!("Exported {entries} entries to {}", p.display());
        }
    } else if !json {
        eprintln!("Exported {entries} entries");
    }
    Ok(())
}

pub(crate) fn cmd_import(
    svc: &mut Service,
    path: &Path,
    csv: bool,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let file =
        File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))?;

    if csv {
        let summary = svc.import_csv(file, dry_run)?;
        if json {
            println!(
                "{}",
                serde_json::json!({
                    "dry_run": dry_run,
                    "rows_parsed": summary.rows_parsed,
                    "entries_added": summary.entries_added,
                    "days_spanned": summary.days_spanned,
                })
            );
        } else {
            if dry_run {
                println!("Dry run. No changes made.\n");
            } else {
                println!("Import complete.\n");
            }
            println!("  Rows parsed:   {}", summary.rows_parsed);
            let verb = if dry_run { "Entries to add:" } else { "Entries added: " };
            println!("  {verb} {}", summary.entries_added);
            println!("  Days spanned:  {}", summary.days_spanned);
        }
        return Ok(());
    }

    let data: ExportData = serde_json::from_reader(io::BufReader::new(file))
        .with_context(|| format!("Failed to parse export file: {}", path.display()))?;

    if dry_run {
        validate_export(&data).context("Import would be rejected")?;
        let days = data.state.entries.len();
        let entries = data.state.entry_count();
        if json {
            println!(
                "{}",
                serde_json::json!({
                    "dry_run": true,
                    "days": days,
                    "entries": entries,
                    "targets": data.state.daily_targets.len(),
                    "profile": data.profile.is_some(),
                })
            );
        } else {
            println!("Dry run. No changes made.\n");
            println!("  Days:    {days}");
            println!("  Entries: {entries}");
            println!("  Targets: {}", data.state.daily_targets.len());
            println!("  Import replaces the current log.");
        }
        return Ok(());
    }

    let summary = svc.import_all(&data)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Import complete. The previous log was replaced.\n");
        println!("  Days:    {}", summary.days_imported);
        println!("  Entries: {}", summary.entries_imported);
        println!("  Targets: {}", summary.targets_imported);
        if summary.profile_imported {
            println!("  Profile updated.");
        }
    }
    Ok(())
}
