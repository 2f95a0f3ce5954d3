use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::config::Settings;
use crate::db::models::MeetingEntry;
use crate::db::operations::DbOperations;
use crate::error::AppError;
use crate::pairing::Pair;
use crate::rituals::clean_text;
use crate::Result;

pub const MAX_FIELD_CHARS: usize = 4000;

/// ISO week key of a date, e.g. `2026-W07`.
pub fn week_key(date: NaiveDate) -> String {
    let week = date.iso_week();
    format!("{:04}-W{:02}", week.year(), week.week())
}

/// Parses a week key, returning the Monday it starts on.
pub fn parse_week_key(key: &str) -> Result<NaiveDate> {
    let invalid = || AppError::ValidationError(format!("Invalid week \"{key}\"; expected YYYY-Www"));

    let (year, week) = key.split_once("-W").ok_or_else(invalid)?;
    if year.len() != 4 || week.len() != 2 {
        return Err(invalid());
    }
    let year: i32 = year.parse().map_err(|_| invalid())?;
    let week: u32 = week.parse().map_err(|_| invalid())?;
    NaiveDate::from_isoywd_opt(year, week, Weekday::Mon).ok_or_else(invalid)
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntryInput {
    #[serde(default)]
    pub wins: String,
    #[serde(default)]
    pub challenges: String,
    #[serde(default)]
    pub intentions: String,
}

impl EntryInput {
    /// Trimmed copy; rejects over-long fields and entries with nothing in them.
    pub fn cleaned(&self) -> Result<EntryInput> {
        let cleaned = EntryInput {
            wins: clean_text(&self.wins, MAX_FIELD_CHARS, "Wins")?,
            challenges: clean_text(&self.challenges, MAX_FIELD_CHARS, "Challenges")?,
            intentions: clean_text(&self.intentions, MAX_FIELD_CHARS, "Intentions")?,
        };
        if cleaned.wins.is_empty() && cleaned.challenges.is_empty() && cleaned.intentions.is_empty() {
            return Err(AppError::ValidationError(
                "Fill in at least one of wins, challenges or intentions".into(),
            ));
        }
        Ok(cleaned)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WeekView {
    pub week: String,
    pub week_start: NaiveDate,
    pub my_entry: Option<MeetingEntry>,
    pub partner_submitted: bool,
    pub partner_entry: Option<MeetingEntry>,
}

pub fn build_week_view(
    week: String,
    week_start: NaiveDate,
    entries: Vec<MeetingEntry>,
    pair: &Pair,
) -> WeekView {
    let mut my_entry = None;
    let mut partner_entry = None;
    for entry in entries {
        if entry.user_id == pair.user_id {
            my_entry = Some(entry);
        } else if entry.user_id == pair.partner_id {
            partner_entry = Some(entry);
        }
    }
    let partner_submitted = partner_entry.is_some();
    let both = my_entry.is_some() && partner_submitted;

    WeekView {
        week,
        week_start,
        my_entry,
        partner_submitted,
        partner_entry: if both { partner_entry } else { None },
    }
}

pub struct MeetingService {
    db: DbOperations,
    settings: Arc<Settings>,
}

impl MeetingService {
    pub fn new(db: DbOperations, settings: Arc<Settings>) -> Self {
        Self { db, settings }
    }

    pub fn current_week(&self, now: DateTime<Utc>) -> String {
        week_key(self.settings.app.local_today(now))
    }

    pub async fn upsert_entry(&self, pair: &Pair, input: &EntryInput, now: DateTime<Utc>) -> Result<WeekView> {
        let input = input.cleaned()?;
        let week = self.current_week(now);

        let meeting = self.db.get_or_create_meeting(pair.relationship.id, &week).await?;
        self.db
            .upsert_meeting_entry(
                meeting.id,
                pair.user_id,
                &input.wins,
                &input.challenges,
                &input.intentions,
            )
            .await?;
        info!("User {} updated meeting notes for {}", pair.user_id, week);

        self.week_view(pair, &week).await
    }

    pub async fn week_view(&self, pair: &Pair, week: &str) -> Result<WeekView> {
        let week_start = parse_week_key(week)?;
        let entries = match self.db.find_meeting(pair.relationship.id, week).await? {
            Some(meeting) => self.db.meeting_entries(meeting.id).await?,
            None => Vec::new(),
        };
        Ok(build_week_view(week.to_string(), week_start, entries, pair))
    }
}
