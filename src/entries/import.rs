use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;
use time::{Date, Month};
use uuid::Uuid;

use crate::entries::{
    dto::ImportSummary,
    patch::Patch,
    repo_types::{EntryPatch, EntrySummary, GymStatus, NewEntry},
};

/// One usable row of a journal export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedRow {
    pub date: Date,
    pub text: String,
    /// Contents of the physical activity column, when the export has one.
    pub gym_notes: Option<String>,
}

impl ImportedRow {
    pub fn into_new_entry(self) -> NewEntry {
        let mut entry = NewEntry::on(self.date);
        let worked_out = self.gym_notes.is_some() || detect_workout(&self.text);
        entry.gym_status = worked_out.then_some(GymStatus::WorkedOut);
        entry.gym_notes = self.gym_notes;
        entry.reflection = (!self.text.is_empty()).then_some(self.text);
        entry
    }

    /// Patch for an existing entry that has no reflection yet. Other fields
    /// the user already filled in are kept.
    pub fn into_fill(self) -> EntryPatch {
        EntryPatch {
            reflection: if self.text.is_empty() {
                Patch::Missing
            } else {
                Patch::Value(self.text)
            },
            gym_notes: self.gym_notes.map_or(Patch::Missing, Patch::Value),
            ..Default::default()
        }
    }
}

#[derive(Debug, Default)]
pub struct ParsedJournal {
    /// At most one row per date, in first-seen order.
    pub rows: Vec<ImportedRow>,
    pub skipped: usize,
}

/// Parses `M/D/YYYY` as used by the spreadsheet exports.
pub fn parse_us_date(raw: &str) -> Option<Date> {
    lazy_static! {
        static ref US_DATE: Regex = Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{4})$").unwrap();
    }
    let caps = US_DATE.captures(raw.trim())?;
    let month: u8 = caps[1].parse().ok()?;
    let day: u8 = caps[2].parse().ok()?;
    let year: i32 = caps[3].parse().ok()?;
    Date::from_calendar_date(year, Month::try_from(month).ok()?, day).ok()
}

pub fn detect_workout(text: &str) -> bool {
    lazy_static! {
        static ref WORKOUT: Regex = Regex::new(
            r"(?i)\b(gym|gymmed|workout|worked out|chest|back|legs|shoulders|arms|biceps|triceps|abs|cardio|swimming|swam|swim|badminton|boxing|volleyball|basketball|cricket|football|jogged|jog|run|ran)\b"
        )
        .unwrap();
    }
    WORKOUT.is_match(text)
}

/// Column positions resolved from the header row. Exports without the
/// expected names fall back to `Day,Date,Text`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Columns {
    date: usize,
    text: usize,
    gym: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &csv::StringRecord) -> Self {
        let names: Vec<String> = headers
            .iter()
            .map(|h| h.trim().to_ascii_lowercase())
            .collect();
        let position = |pred: fn(&str) -> bool| names.iter().position(|h| pred(h));

        let date = position(|h| h == "date").unwrap_or(1);
        let text = position(|h| matches!(h, "journal" | "activity" | "text" | "reflection"))
            .unwrap_or(2);
        let gym = position(|h| h.contains("physical") || h.contains("gym"))
            .filter(|&i| i != text && i != date);
        Self { date, text, gym }
    }
}

/// Spreadsheet cells sometimes carry a stray leading `$`.
fn clean_text(raw: &str) -> String {
    let trimmed = raw.trim();
    trimmed.strip_prefix('$').unwrap_or(trimmed).trim().to_string()
}

/// Reads a CSV export with a header row. Rows with an unknown date format or
/// with neither text nor activity are skipped. When a date repeats, the row
/// with the longest text is kept and the others count as skipped.
pub fn parse_journal_csv(input: &str) -> Result<ParsedJournal, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input.as_bytes());
    let cols = Columns::from_headers(reader.headers()?);

    let mut parsed = ParsedJournal::default();
    let mut seen: HashMap<Date, usize> = HashMap::new();
    for record in reader.records() {
        let record = record?;
        let cell = |i: usize| record.get(i).unwrap_or_default();

        let text = clean_text(cell(cols.text));
        let gym_notes = cols
            .gym
            .map(|i| cell(i).trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let date = match parse_us_date(cell(cols.date)) {
            Some(d) if !text.is_empty() || gym_notes.is_some() => d,
            _ => {
                parsed.skipped += 1;
                continue;
            }
        };

        let row = ImportedRow {
            date,
            text,
            gym_notes,
        };
        match seen.get(&date) {
            Some(&i) => {
                parsed.skipped += 1;
                if row.text.chars().count() > parsed.rows[i].text.chars().count() {
                    parsed.rows[i] = row;
                }
            }
            None => {
                seen.insert(date, parsed.rows.len());
                parsed.rows.push(row);
            }
        }
    }
    Ok(parsed)
}

/// Writes an import makes against the user's current entries.
#[derive(Debug, Default)]
pub struct ImportPlan {
    pub create: Vec<NewEntry>,
    pub fill: Vec<(Uuid, EntryPatch)>,
    pub skipped: usize,
}

impl ImportPlan {
    pub fn summary(&self) -> ImportSummary {
        ImportSummary {
            imported: self.create.len(),
            updated: self.fill.len(),
            skipped: self.skipped,
        }
    }
}

/// Dates without an entry get a new one. Dates whose entries all lack a
/// reflection have the newest entry filled in. Dates that already have a
/// reflection are skipped.
pub fn plan_import(parsed: ParsedJournal, existing: &[EntrySummary]) -> ImportPlan {
    // `existing` is newest first, so the first id seen per day is the newest
    let mut days: HashMap<Date, (Uuid, bool)> = HashMap::new();
    for e in existing {
        let slot = days.entry(e.date).or_insert((e.id, false));
        slot.1 |= e.has_reflection;
    }

    let mut plan = ImportPlan {
        skipped: parsed.skipped,
        ..Default::default()
    };
    for row in parsed.rows {
        match days.get(&row.date) {
            None => plan.create.push(row.into_new_entry()),
            Some(&(_, true)) => plan.skipped += 1,
            Some(&(id, false)) => plan.fill.push((id, row.into_fill())),
        }
    }
    plan
}
