//! Read-side queries over `ProteinState`.
//!
//! Every function here is pure: the same state, profile and `today` always
//! give the same answer. Days after `today` never count toward an average,
//! and days before the profile's inception date never count toward a
//! monthly average or a streak.

use chrono::{Datelike, Days, NaiveDate};

use crate::models::{
    DailyTargetResult, DaySummary, MonthlyAverage, ProteinEntry, ProteinState, UserProfile,
};
use crate::recommend::recommended_target;
use crate::resolver::TargetTimeline;

const DAYS_PER_WEEK: u64 = 7;

#[must_use]
pub fn select_todays_entries(state: &ProteinState, today: NaiveDate) -> &[ProteinEntry] {
    state.entries_for(today)
}

#[must_use]
pub fn select_total_protein_for_day(state: &ProteinState, day: NaiveDate) -> f64 {
    state.entries_for(day).iter().map(|e| e.grams).sum()
}

/// Average daily protein over the week beginning `week_start`, counting only
/// days up to and including `today`.
#[must_use]
pub fn select_daily_avg(state: &ProteinState, week_start: NaiveDate, today: NaiveDate) -> f64 {
    average_over(state, week_start, week_end(week_start).min(today))
}

/// Average daily protein for the calendar month of `month_start`, from
/// `month_start` to the end of that month, over elapsed days since inception.
#[must_use]
pub fn select_monthly_daily_average(
    state: &ProteinState,
    profile: &UserProfile,
    month_start: NaiveDate,
    today: NaiveDate,
) -> MonthlyAverage {
    let from = month_start.max(profile.inception_date);
    let to = month_end(month_start).min(today);
    MonthlyAverage {
        avg_protein_per_day: average_over(state, from, to),
    }
}

/// Consecutive days, ending today, whose total met the goal in effect that day.
#[must_use]
pub fn select_streak(state: &ProteinState, profile: &UserProfile, today: NaiveDate) -> u32 {
    let timeline = TargetTimeline::new(&state.daily_targets);
    let recommended = recommended_target(&profile.weight);

    let mut streak = 0;
    let mut day = today;
    while day >= profile.inception_date {
        let total = select_total_protein_for_day(state, day);
        if total < timeline.resolve(day, recommended) {
            break;
        }
        streak += 1;
        match day.pred_opt() {
            Some(prev) => day = prev,
            None => break,
        }
    }
    streak
}

/// Per-day goal comparison for every day after `start` through `today`.
#[must_use]
pub fn select_daily_target_results(
    state: &ProteinState,
    profile: &UserProfile,
    start: NaiveDate,
    today: NaiveDate,
) -> Vec<DailyTargetResult> {
    let Some(first) = start.succ_opt() else {
        return Vec::new();
    };
    let timeline = TargetTimeline::new(&state.daily_targets);
    let recommended = recommended_target(&profile.weight);

    days_between(first, today)
        .map(|day| {
            let total_grams = select_total_protein_for_day(state, day);
            let resolved_target = timeline.resolve(day, recommended);
            DailyTargetResult {
                day,
                total_grams,
                met_goal: total_grams >= resolved_target,
                resolved_target,
            }
        })
        .collect()
}

/// Goal in effect on `day` for this profile.
#[must_use]
pub fn select_target_for_day(state: &ProteinState, profile: &UserProfile, day: NaiveDate) -> f64 {
    TargetTimeline::new(&state.daily_targets).resolve(day, recommended_target(&profile.weight))
}

#[must_use]
pub fn select_day_summary(
    state: &ProteinState,
    profile: &UserProfile,
    day: NaiveDate,
) -> DaySummary {
    let total_grams = select_total_protein_for_day(state, day);
    let target = select_target_for_day(state, profile, day);
    DaySummary {
        day,
        total_grams,
        target,
        remaining: (target - total_grams).max(0.0),
        met_goal: total_grams >= target,
        entry_count: state.entries_for(day).len(),
    }
}

/// Last day of the calendar month containing `day`.
#[must_use]
pub fn month_end(day: NaiveDate) -> NaiveDate {
    let (year, month) = if day.month() == 12 {
        (day.year() + 1, 1)
    } else {
        (day.year(), day.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first_of_next| first_of_next.pred_opt())
        .unwrap_or(day)
}

/// Monday of the week containing `day`.
#[must_use]
pub fn week_start(day: NaiveDate) -> NaiveDate {
    day.checked_sub_days(Days::new(u64::from(day.weekday().num_days_from_monday())))
        .unwrap_or(NaiveDate::MIN)
}

/// Last day of the seven-day week beginning `week_start`, clamped to the calendar's end.
#[must_use]
pub fn week_end(week_start: NaiveDate) -> NaiveDate {
    week_start
        .checked_add_days(Days::new(DAYS_PER_WEEK - 1))
        .unwrap_or(NaiveDate::MAX)
}

#[must_use]
pub fn month_start(day: NaiveDate) -> NaiveDate {
    day.with_day(1).unwrap_or(day)
}

fn days_between(from: NaiveDate, to: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    from.iter_days().take_while(move |d| *d <= to)
}

fn average_over(state: &ProteinState, from: NaiveDate, to: NaiveDate) -> f64 {
    if from > to {
        return 0.0;
    }
    let (total, days) = days_between(from, to).fold((0.0, 0_u32), |(total, days), day| {
        (total + select_total_protein_for_day(state, day), days + 1)
    });
    if days == 0 {
        0.0
    } else {
        total / f64::from(days)
    }
}
