//! Derived statistics over a user's entries. Everything here is a pure
//! function of the entry list and the reference day.

use std::collections::HashSet;

use time::{Date, Duration, Weekday};

use crate::analytics::dto::{DayActivity, GymCounts, Insights, MoodDistribution};
use crate::entries::repo_types::{EntrySummary, GymStatus};

pub const MONTH_WINDOW_DAYS: i64 = 30;
pub const WEEK_WINDOW_DAYS: i64 = 7;
pub const MAX_STREAK_DAYS: u32 = 365;

/// Entries dated within `[today - days, today]`.
pub fn within_last<'a>(entries: &'a [EntrySummary], today: Date, days: i64) -> Vec<&'a EntrySummary> {
    let start = today.checked_sub(Duration::days(days)).unwrap_or(Date::MIN);
    entries
        .iter()
        .filter(|e| e.date >= start && e.date <= today)
        .collect()
}

pub fn target_met_percentage(window: &[&EntrySummary]) -> u32 {
    if window.is_empty() {
        return 0;
    }
    let met = window.iter().filter(|e| e.target_met).count();
    (met as f64 / window.len() as f64 * 100.0).round() as u32
}

pub fn gym_counts(window: &[&EntrySummary]) -> GymCounts {
    let mut counts = GymCounts::default();
    for status in window.iter().filter_map(|e| e.gym_status) {
        match status {
            GymStatus::WorkedOut => counts.worked_out += 1,
            GymStatus::RestDay => counts.rest_day += 1,
            GymStatus::Skipped => counts.skipped += 1,
        }
    }
    counts
}

pub fn mood_distribution(window: &[&EntrySummary]) -> MoodDistribution {
    let mut dist = MoodDistribution::default();
    for mood in window.iter().filter_map(|e| e.mood) {
        dist.record(mood);
    }
    dist
}

/// Mean mood score over entries that recorded a mood.
pub fn average_mood(window: &[&EntrySummary]) -> Option<f64> {
    let scores: Vec<f64> = window
        .iter()
        .filter_map(|e| e.mood)
        .map(|m| f64::from(m.score()))
        .collect();
    if scores.is_empty() {
        return None;
    }
    Some(scores.iter().sum::<f64>() / scores.len() as f64)
}

pub fn average_mood_label(avg: Option<f64>) -> String {
    avg.map_or_else(|| "-".to_string(), |v| format!("{v:.1}"))
}

/// Consecutive days with an entry, counting back from `today`. A missing
/// `today` does not break the streak; any other missing day ends it.
pub fn current_streak(entries: &[EntrySummary], today: Date) -> u32 {
    let days: HashSet<Date> = entries.iter().map(|e| e.date).collect();
    let mut streak = 0;
    let mut day = today;
    for i in 0..MAX_STREAK_DAYS {
        if days.contains(&day) {
            streak += 1;
        } else if i > 0 {
            break;
        }
        match day.previous_day() {
            Some(prev) => day = prev,
            None => break,
        }
    }
    streak
}

fn short_weekday(day: Weekday) -> &'static str {
    match day {
        Weekday::Sunday => "Sun",
        Weekday::Monday => "Mon",
        Weekday::Tuesday => "Tue",
        Weekday::Wednesday => "Wed",
        Weekday::Thursday => "Thu",
        Weekday::Friday => "Fri",
        Weekday::Saturday => "Sat",
    }
}

/// Sunday through Saturday of the week containing `today`. Entries are
/// expected newest first, so duplicate days report their latest entry.
pub fn weekly_activity(entries: &[EntrySummary], today: Date) -> Vec<DayActivity> {
    let offset = i64::from(today.weekday().number_days_from_sunday());
    let sunday = today.checked_sub(Duration::days(offset)).unwrap_or(today);

    (0..7)
        .filter_map(|i| sunday.checked_add(Duration::days(i)))
        .map(|date| {
            let entry = entries.iter().find(|e| e.date == date);
            DayActivity {
                date,
                day: short_weekday(date.weekday()),
                has_entry: entry.is_some(),
                mood: entry.and_then(|e| e.mood),
                target_met: entry.map(|e| e.target_met),
            }
        })
        .collect()
}

pub fn summarize(entries: &[EntrySummary], today: Date) -> Insights {
    let month = within_last(entries, today, MONTH_WINDOW_DAYS);
    let week = within_last(entries, today, WEEK_WINDOW_DAYS);
    let avg = average_mood(&month);

    Insights {
        today,
        total_entries: entries.len(),
        entries_this_month: month.len(),
        entries_this_week: week.len(),
        target_met_percentage: target_met_percentage(&month),
        gym: gym_counts(&month),
        mood_distribution: mood_distribution(&month),
        average_mood: avg,
        average_mood_label: average_mood_label(avg),
        current_streak: current_streak(entries, today),
        weekly_activity: weekly_activity(entries, today),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entries::repo_types::Mood;
    use time::macros::{date, datetime};
    use uuid::Uuid;

    // 2024-06-12 is a Wednesday
    const TODAY: Date = date!(2024-06-12);

    fn entry(date: Date) -> EntrySummary {
        EntrySummary {
            id: Uuid::new_v4(),
            date,
            mood: None,
            gym_status: None,
            target_met: false,
            has_reflection: false,
            created_at: datetime!(2024-06-12 12:00 UTC),
        }
    }

    fn days_ago(n: i64) -> Date {
        TODAY - Duration::days(n)
    }

    fn with(date: Date, f: impl FnOnce(&mut EntrySummary)) -> EntrySummary {
        let mut e = entry(date);
        f(&mut e);
        e
    }

    #[test]
    fn empty_list_yields_zeroes() {
        let s = summarize(&[], TODAY);
        assert_eq!(s.total_entries, 0);
        assert_eq!(s.target_met_percentage, 0);
        assert_eq!(s.current_streak, 0);
        assert_eq!(s.average_mood, None);
        assert_eq!(s.average_mood_label, "-");
        assert_eq!(s.weekly_activity.len(), 7);
        assert!(s.weekly_activity.iter().all(|d| !d.has_entry));
    }

    #[test]
    fn windows_are_inclusive_and_ignore_future_days() {
        let entries = vec![
            entry(TODAY),
            entry(days_ago(7)),
            entry(days_ago(8)),
            entry(days_ago(30)),
            entry(days_ago(31)),
            entry(TODAY + Duration::days(1)),
        ];
        assert_eq!(within_last(&entries, TODAY, WEEK_WINDOW_DAYS).len(), 2);
        assert_eq!(within_last(&entries, TODAY, MONTH_WINDOW_DAYS).len(), 4);
        let s = summarize(&entries, TODAY);
        assert_eq!(s.total_entries, 6);
        assert_eq!(s.entries_this_month, 4);
        assert_eq!(s.entries_this_week, 2);
    }

    #[test]
    fn target_met_percentage_rounds() {
        let all_met: Vec<_> = (0..4).map(|i| with(days_ago(i), |e| e.target_met = true)).collect();
        assert_eq!(summarize(&all_met, TODAY).target_met_percentage, 100);

        let mixed = vec![
            with(days_ago(0), |e| e.target_met = true),
            entry(days_ago(1)),
            entry(days_ago(2)),
        ];
        assert_eq!(summarize(&mixed, TODAY).target_met_percentage, 33);

        let two_of_three = vec![
            with(days_ago(0), |e| e.target_met = true),
            with(days_ago(1), |e| e.target_met = true),
            entry(days_ago(2)),
        ];
        assert_eq!(summarize(&two_of_three, TODAY).target_met_percentage, 67);
    }

    #[test]
    fn counts_gym_and_mood_inside_month_window() {
        let entries = vec![
            with(days_ago(0), |e| {
                e.gym_status = Some(GymStatus::WorkedOut);
                e.mood = Some(Mood::Great);
            }),
            with(days_ago(1), |e| e.gym_status = Some(GymStatus::WorkedOut)),
            with(days_ago(2), |e| {
                e.gym_status = Some(GymStatus::Skipped);
                e.mood = Some(Mood::Rough);
            }),
            with(days_ago(40), |e| {
                e.gym_status = Some(GymStatus::RestDay);
                e.mood = Some(Mood::Low);
            }),
        ];
        let s = summarize(&entries, TODAY);
        assert_eq!(
            s.gym,
            GymCounts {
                worked_out: 2,
                rest_day: 0,
                skipped: 1
            }
        );
        assert_eq!(s.mood_distribution.great, 1);
        assert_eq!(s.mood_distribution.rough, 1);
        assert_eq!(s.mood_distribution.low, 0);
        assert_eq!(s.average_mood, Some(3.0));
        assert_eq!(s.average_mood_label, "3.0");
    }

    #[test]
    fn streak_counts_consecutive_days_including_today() {
        let entries: Vec<_> = (0..5).map(|i| entry(days_ago(i))).collect();
        assert_eq!(current_streak(&entries, TODAY), 5);
    }

    #[test]
    fn streak_tolerates_missing_today() {
        let entries: Vec<_> = (1..4).map(|i| entry(days_ago(i))).collect();
        assert_eq!(current_streak(&entries, TODAY), 3);
    }

    #[test]
    fn streak_stops_at_first_gap() {
        let entries = vec![
            entry(days_ago(0)),
            entry(days_ago(1)),
            entry(days_ago(3)),
            entry(days_ago(4)),
        ];
        assert_eq!(current_streak(&entries, TODAY), 2);

        // yesterday missing as well as today
        let stale = vec![entry(days_ago(2)), entry(days_ago(3))];
        assert_eq!(current_streak(&stale, TODAY), 0);
    }

    #[test]
    fn streak_counts_duplicate_days_once_and_is_capped() {
        let mut entries: Vec<_> = (0..400).map(|i| entry(days_ago(i))).collect();
        entries.push(entry(TODAY));
        assert_eq!(current_streak(&entries, TODAY), MAX_STREAK_DAYS);
    }

    #[test]
    fn weekly_activity_runs_sunday_to_saturday() {
        let entries = vec![
            with(date!(2024-06-10), |e| {
                e.mood = Some(Mood::Good);
                e.target_met = true;
            }),
            entry(date!(2024-06-16)),
        ];
        let week = weekly_activity(&entries, TODAY);
        let labels: Vec<_> = week.iter().map(|d| d.day).collect();
        assert_eq!(labels, vec!["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"]);
        assert_eq!(week[0].date, date!(2024-06-09));
        assert_eq!(week[6].date, date!(2024-06-15));

        assert!(week[1].has_entry);
        assert_eq!(week[1].mood, Some(Mood::Good));
        assert_eq!(week[1].target_met, Some(true));
        assert!(!week[2].has_entry);
        assert_eq!(week[2].target_met, None);
        assert!(week.iter().filter(|d| d.has_entry).count() == 1);
    }

    #[test]
    fn summarize_is_deterministic() {
        let entries = vec![
            with(days_ago(0), |e| e.mood = Some(Mood::Okay)),
            with(days_ago(1), |e| e.target_met = true),
        ];
        assert_eq!(summarize(&entries, TODAY), summarize(&entries, TODAY));
    }
}
