use serde::{Deserialize, Serialize};
use time::Date;

use crate::{
    entries::{
        media::{validate_attachments, MediaKind},
        patch::Patch,
        repo_types::{entry_date, EntryPatch, GymStatus, Mood, NewEntry},
    },
    error::{AppError, FieldError},
};

/// Request body for `POST /entries`. Unknown keys are ignored; the owner is
/// always the session user.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEntryRequest {
    pub date: Option<String>,
    pub target_plan: Option<String>,
    pub reflection: Option<String>,
    pub gym_status: Option<String>,
    pub gym_notes: Option<String>,
    pub food: Option<String>,
    pub mood: Option<String>,
    pub target_met: Option<bool>,
    pub images: Option<Vec<String>>,
    pub videos: Option<Vec<String>>,
}

/// Request body for `PATCH /entries/:id`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEntryRequest {
    #[serde(default)]
    pub date: Patch<String>,
    #[serde(default)]
    pub target_plan: Patch<String>,
    #[serde(default)]
    pub reflection: Patch<String>,
    #[serde(default)]
    pub gym_status: Patch<String>,
    #[serde(default)]
    pub gym_notes: Patch<String>,
    #[serde(default)]
    pub food: Patch<String>,
    #[serde(default)]
    pub mood: Patch<String>,
    #[serde(default)]
    pub target_met: Patch<bool>,
    #[serde(default)]
    pub images: Patch<Vec<String>>,
    #[serde(default)]
    pub videos: Patch<Vec<String>>,
    #[serde(default)]
    pub id: Patch<serde_json::Value>,
    #[serde(default)]
    pub user_id: Patch<serde_json::Value>,
    #[serde(default)]
    pub created_at: Patch<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct ImportSummary {
    pub imported: usize,
    pub updated: usize,
    pub skipped: usize,
}

fn parse_date(raw: &str, details: &mut Vec<FieldError>) -> Option<Date> {
    match entry_date::parse(raw) {
        Ok(d) => Some(d),
        Err(_) => {
            details.push(FieldError::new("date", "expected a YYYY-MM-DD date"));
            None
        }
    }
}

/// Empty strings mean "not chosen", which is what the entry form sends.
fn parse_choice<T>(field: &str, raw: Option<String>, details: &mut Vec<FieldError>) -> Option<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = raw?;
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.parse::<T>() {
        Ok(v) => Some(v),
        Err(e) => {
            details.push(FieldError::new(field, e.to_string()));
            None
        }
    }
}

fn parse_choice_patch<T>(field: &str, raw: Patch<String>, details: &mut Vec<FieldError>) -> Patch<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Patch::Missing => Patch::Missing,
        Patch::Null => Patch::Null,
        Patch::Value(s) => match parse_choice(field, Some(s), details) {
            Some(v) => Patch::Value(v),
            None => Patch::Null,
        },
    }
}

fn finish<T>(value: T, details: Vec<FieldError>) -> Result<T, AppError> {
    if details.is_empty() {
        Ok(value)
    } else {
        Err(AppError::invalid_fields("Invalid entry data", details))
    }
}

impl CreateEntryRequest {
    pub fn validate(self) -> Result<NewEntry, AppError> {
        let mut details = Vec::new();

        let date = match self.date.as_deref() {
            Some(raw) => parse_date(raw, &mut details),
            None => {
                details.push(FieldError::new("date", "date is required"));
                None
            }
        };
        let gym_status = parse_choice::<GymStatus>("gymStatus", self.gym_status, &mut details);
        let mood = parse_choice::<Mood>("mood", self.mood, &mut details);
        if let Some(images) = &self.images {
            validate_attachments("images", images, MediaKind::Image, &mut details);
        }
        if let Some(videos) = &self.videos {
            validate_attachments("videos", videos, MediaKind::Video, &mut details);
        }

        let Some(date) = date else {
            return Err(AppError::invalid_fields("Invalid entry data", details));
        };
        finish(
            NewEntry {
                date,
                target_plan: self.target_plan,
                reflection: self.reflection,
                gym_status,
                gym_notes: self.gym_notes,
                food: self.food,
                mood,
                target_met: self.target_met.unwrap_or(false),
                images: self.images,
                videos: self.videos,
            },
            details,
        )
    }
}

impl UpdateEntryRequest {
    pub fn validate(self) -> Result<EntryPatch, AppError> {
        let mut details = Vec::new();

        for (field, patch) in [
            ("id", &self.id),
            ("userId", &self.user_id),
            ("createdAt", &self.created_at),
        ] {
            if !patch.is_missing() {
                details.push(FieldError::new(field, format!("{field} cannot be changed")));
            }
        }

        let date = match self.date {
            Patch::Missing => None,
            Patch::Null => {
                details.push(FieldError::new("date", "date cannot be cleared"));
                None
            }
            Patch::Value(raw) => parse_date(&raw, &mut details),
        };
        let target_met = match self.target_met {
            Patch::Missing => None,
            Patch::Null => {
                details.push(FieldError::new("targetMet", "targetMet must be true or false"));
                None
            }
            Patch::Value(v) => Some(v),
        };
        let gym_status = parse_choice_patch::<GymStatus>("gymStatus", self.gym_status, &mut details);
        let mood = parse_choice_patch::<Mood>("mood", self.mood, &mut details);
        if let Patch::Value(images) = &self.images {
            validate_attachments("images", images, MediaKind::Image, &mut details);
        }
        if let Patch::Value(videos) = &self.videos {
            validate_attachments("videos", videos, MediaKind::Video, &mut details);
        }

        finish(
            EntryPatch {
                date,
                target_plan: self.target_plan,
                reflection: self.reflection,
                gym_status,
                gym_notes: self.gym_notes,
                food: self.food,
                mood,
                target_met,
                images: self.images,
                videos: self.videos,
            },
            details,
        )
    }
}
