use anyhow::{Result, bail};
use chrono::NaiveDate;
use std::process;

use proteus_core::models::{BodyWeight, MassUnit, UserProfile, format_day};
use proteus_core::recommend::recommended_target;

use super::Service;
use super::helpers::{json_error, parse_date};

pub(crate) struct ProfileUpdate {
    pub(crate) name: Option<String>,
    pub(crate) weight: Option<f64>,
    pub(crate) unit: Option<String>,
    pub(crate) inception: Option<String>,
}

impl ProfileUpdate {
    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.weight.is_none()
            && self.unit.is_none()
            && self.inception.is_none()
    }
}

/// Merge `update` into the stored profile. A first profile needs a weight;
/// the inception date then defaults to today.
fn merge_profile(
    current: Option<&UserProfile>,
    update: ProfileUpdate,
    today: NaiveDate,
) -> Result<UserProfile> {
    let unit = update.unit.as_deref().map(str::parse::<MassUnit>).transpose()?;
    let inception = update
        .inception
        .map(|d| parse_date(Some(d), today))
        .transpose()?;

    let profile = match current {
        Some(existing) => UserProfile {
            name: update.name.unwrap_or_else(|| existing.name.clone()),
            weight: BodyWeight {
                value: update.weight.unwrap_or(existing.weight.value),
                unit: unit.unwrap_or(existing.weight.unit),
            },
            inception_date: inception.unwrap_or(existing.inception_date),
        },
        None => {
            let Some(value) = update.weight else {
                bail!("No profile yet. Provide at least --weight to create one");
            };
            UserProfile {
                name: update.name.unwrap_or_default(),
                weight: BodyWeight {
                    value,
                    unit: unit.unwrap_or(MassUnit::Kg),
                },
                inception_date: inception.unwrap_or(today),
            }
        }
    };
    Ok(profile)
}

pub(crate) fn cmd_profile_set(svc: &mut Service, update: ProfileUpdate, json: bool) -> Result<()> {
    if update.is_empty() {
        bail!("Nothing to update. Provide at least one of --name, --weight, --unit, or --inception");
    }

    let profile = merge_profile(svc.profile(), update, svc.today())?;
    svc.set_profile(profile.clone())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&profile)?);
    } else {
        println!("Profile saved.");
        print_profile(&profile);
    }
    Ok(())
}

pub(crate) fn cmd_profile_show(svc: &Service, json: bool) -> Result<()> {
    let Some(profile) = svc.profile() else {
        let message = "No profile set. Run `proteus profile set --weight <W>` first";
        if json {
            println!("{}", json_error(message));
        } else {
            eprintln!("{message}");
        }
        process::exit(2);
    };

    if json {
        println!(
            "{}",
            serde_json::json!({
                "profile": profile,
                "recommended_target": recommended_target(&profile.weight),
            })
        );
    } else {
        print_profile(profile);
    }
    Ok(())
}

fn print_profile(profile: &UserProfile) {
    if !profile.name.is_empty() {
        println!("  Name:        {}", profile.name);
    }
    let weight = &profile.weight;
    match weight.unit {
        MassUnit::Kg => println!("  Weight:      {:.1} kg ({:.1} lb)", weight.value, weight.pounds()),
        MassUnit::Lb => println!("  Weight:      {:.1} lb ({:.1} kg)", weight.value, weight.kilograms()),
    }
    println!("  Tracking since: {}", format_day(profile.inception_date));
    println!(
        "  Recommended: {:.0}g protein/day",
        recommended_target(weight)
    );
}
