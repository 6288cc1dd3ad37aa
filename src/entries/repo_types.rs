use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::entries::patch::Patch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mood {
    Great,
    Good,
    Okay,
    Low,
    Rough,
}

impl Mood {
    pub const ALL: [Mood; 5] = [Mood::Great, Mood::Good, Mood::Okay, Mood::Low, Mood::Rough];

    pub fn as_str(self) -> &'static str {
        match self {
            Mood::Great => "great",
            Mood::Good => "good",
            Mood::Okay => "okay",
            Mood::Low => "low",
            Mood::Rough => "rough",
        }
    }

    /// Five-point scale, rough = 1 .. great = 5.
    pub fn score(self) -> u8 {
        match self {
            Mood::Great => 5,
            Mood::Good => 4,
            Mood::Okay => 3,
            Mood::Low => 2,
            Mood::Rough => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GymStatus {
    WorkedOut,
    RestDay,
    Skipped,
}

impl GymStatus {
    pub const ALL: [GymStatus; 3] = [GymStatus::WorkedOut, GymStatus::RestDay, GymStatus::Skipped];

    pub fn as_str(self) -> &'static str {
        match self {
            GymStatus::WorkedOut => "worked_out",
            GymStatus::RestDay => "rest_day",
            GymStatus::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown value {:?}", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

impl FromStr for Mood {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mood::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| UnknownVariant(s.to_string()))
    }
}

impl FromStr for GymStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GymStatus::ALL
            .into_iter()
            .find(|g| g.as_str() == s)
            .ok_or_else(|| UnknownVariant(s.to_string()))
    }
}

/// Calendar dates travel as `YYYY-MM-DD`. Timestamps are accepted on input and
/// truncated to their date part.
pub mod entry_date {
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};
    use time::{format_description::FormatItem, macros::format_description, Date};

    pub const FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

    pub fn parse(s: &str) -> Result<Date, time::error::Parse> {
        let day = s.trim().split('T').next().unwrap_or_default();
        Date::parse(day, FORMAT)
    }

    pub fn format(date: Date) -> String {
        date.format(FORMAT).unwrap_or_else(|_| date.to_string())
    }

    pub fn serialize<S: Serializer>(date: &Date, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(*date))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Date, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(D::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(with = "entry_date")]
    pub date: Date,
    pub target_plan: Option<String>,
    pub reflection: Option<String>,
    pub gym_status: Option<GymStatus>,
    pub gym_notes: Option<String>,
    pub food: Option<String>,
    pub mood: Option<Mood>,
    pub target_met: bool,
    pub images: Option<Vec<String>>,
    pub videos: Option<Vec<String>>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Row shape of `journal_entries`; enums are stored as text.
#[derive(Debug, FromRow)]
pub struct EntryRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub date: Date,
    pub target_plan: Option<String>,
    pub reflection: Option<String>,
    pub gym_status: Option<String>,
    pub gym_notes: Option<String>,
    pub food: Option<String>,
    pub mood: Option<String>,
    pub target_met: bool,
    pub images: Option<Vec<String>>,
    pub videos: Option<Vec<String>>,
    pub created_at: OffsetDateTime,
}

impl TryFrom<EntryRow> for JournalEntry {
    type Error = anyhow::Error;

    fn try_from(r: EntryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            user_id: r.user_id,
            date: r.date,
            target_plan: r.target_plan,
            reflection: r.reflection,
            gym_status: r.gym_status.as_deref().map(str::parse::<GymStatus>).transpose()?,
            gym_notes: r.gym_notes,
            food: r.food,
            mood: r.mood.as_deref().map(str::parse::<Mood>).transpose()?,
            target_met: r.target_met,
            images: r.images,
            videos: r.videos,
            created_at: r.created_at,
        })
    }
}

/// A validated entry ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntry {
    pub date: Date,
    pub target_plan: Option<String>,
    pub reflection: Option<String>,
    pub gym_status: Option<GymStatus>,
    pub gym_notes: Option<String>,
    pub food: Option<String>,
    pub mood: Option<Mood>,
    pub target_met: bool,
    pub images: Option<Vec<String>>,
    pub videos: Option<Vec<String>>,
}

impl NewEntry {
    /// An entry for `date` with every optional field left unset.
    pub fn on(date: Date) -> Self {
        Self {
            date,
            target_plan: None,
            reflection: None,
            gym_status: None,
            gym_notes: None,
            food: None,
            mood: None,
            target_met: false,
            images: None,
            videos: None,
        }
    }

    pub fn into_entry(self, id: Uuid, user_id: Uuid, created_at: OffsetDateTime) -> JournalEntry {
        JournalEntry {
            id,
            user_id,
            date: self.date,
            target_plan: self.target_plan,
            reflection: self.reflection,
            gym_status: self.gym_status,
            gym_notes: self.gym_notes,
            food: self.food,
            mood: self.mood,
            target_met: self.target_met,
            images: self.images,
            videos: self.videos,
            created_at,
        }
    }
}

/// A validated partial update. Owner, id and creation time are not patchable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryPatch {
    pub date: Option<Date>,
    pub target_plan: Patch<String>,
    pub reflection: Patch<String>,
    pub gym_status: Patch<GymStatus>,
    pub gym_notes: Patch<String>,
    pub food: Patch<String>,
    pub mood: Patch<Mood>,
    pub target_met: Option<bool>,
    pub images: Patch<Vec<String>>,
    pub videos: Patch<Vec<String>>,
}

impl EntryPatch {
    pub fn apply(self, entry: &mut JournalEntry) {
        if let Some(date) = self.date {
            entry.date = date;
        }
        self.target_plan.apply(&mut entry.target_plan);
        self.reflection.apply(&mut entry.reflection);
        self.gym_status.apply(&mut entry.gym_status);
        self.gym_notes.apply(&mut entry.gym_notes);
        self.food.apply(&mut entry.food);
        self.mood.apply(&mut entry.mood);
        if let Some(met) = self.target_met {
            entry.target_met = met;
        }
        self.images.apply(&mut entry.images);
        self.videos.apply(&mut entry.videos);
    }
}

/// Entry without its text bodies and media, for whole-history reads.
#[derive(Debug, Clone, PartialEq)]
pub struct EntrySummary {
    pub id: Uuid,
    pub date: Date,
    pub mood: Option<Mood>,
    pub gym_status: Option<GymStatus>,
    pub target_met: bool,
    pub has_reflection: bool,
    pub created_at: OffsetDateTime,
}

impl From<&JournalEntry> for EntrySummary {
    fn from(e: &JournalEntry) -> Self {
        Self {
            id: e.id,
            date: e.date,
            mood: e.mood,
            gym_status: e.gym_status,
            target_met: e.target_met,
            has_reflection: e.reflection.as_deref().is_some_and(|r| !r.trim().is_empty()),
            created_at: e.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct SummaryRow {
    pub id: Uuid,
    pub date: Date,
    pub mood: Option<String>,
    pub gym_status: Option<String>,
    pub target_met: bool,
    pub has_reflection: bool,
    pub created_at: OffsetDateTime,
}

impl TryFrom<SummaryRow> for EntrySummary {
    type Error = anyhow::Error;

    fn try_from(r: SummaryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            date: r.date,
            mood: r.mood.as_deref().map(str::parse::<Mood>).transpose()?,
            gym_status: r.gym_status.as_deref().map(str::parse::<GymStatus>).transpose()?,
            target_met: r.target_met,
            has_reflection: r.has_reflection,
            created_at: r.created_at,
        })
    }
}
