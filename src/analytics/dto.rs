use serde::{Deserialize, Serialize};
use time::Date;

use crate::entries::repo_types::{entry_date, Mood};

#[derive(Debug, Deserialize)]
pub struct InsightsQuery {
    /// Reference day as `YYYY-MM-DD`; the server's UTC date when absent.
    pub today: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GymCounts {
    pub worked_out: usize,
    pub rest_day: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MoodDistribution {
    pub great: usize,
    pub good: usize,
    pub okay: usize,
    pub low: usize,
    pub rough: usize,
}

impl MoodDistribution {
    pub fn record(&mut self, mood: Mood) {
        match mood {
            Mood::Great => self.great += 1,
            Mood::Good => self.good += 1,
            Mood::Okay => self.okay += 1,
            Mood::Low => self.low += 1,
            Mood::Rough => self.rough += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayActivity {
    #[serde(with = "entry_date")]
    pub date: Date,
    pub day: &'static str,
    pub has_entry: bool,
    pub mood: Option<Mood>,
    pub target_met: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Insights {
    #[serde(with = "entry_date")]
    pub today: Date,
    pub total_entries: usize,
    pub entries_this_month: usize,
    pub entries_this_week: usize,
    pub target_met_percentage: u32,
    pub gym: GymCounts,
    pub mood_distribution: MoodDistribution,
    pub average_mood: Option<f64>,
    pub average_mood_label: String,
    pub current_streak: u32,
    pub weekly_activity: Vec<DayActivity>,
}
