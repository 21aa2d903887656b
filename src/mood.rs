use crate::errors::{AppError, AppResult};
use crate::models::{MoodEntry, SaveMoodPayload};
use crate::storage::{EntryRepository, KeyValueStore, MOOD_ENTRIES_KEY};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const MAX_LEVEL: u8 = 4;
pub const NEUTRAL_AVERAGE: f64 = 2.0;
pub const MOOD_LABELS: [&str; 5] = ["Very Sad", "Sad", "Neutral", "Happy", "Very Happy"];
pub const ENERGY_LABELS: [&str; 5] = ["Exhausted", "Tired", "Neutral", "Energetic", "Very Energetic"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpsertOutcome {
    Created,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoodStats {
    pub average_mood: f64,
    pub average_energy: f64,
    pub total_entries: usize,
    pub first_entry_date: Option<NaiveDate>,
}

pub struct MoodStore {
    repo: EntryRepository<Vec<MoodEntry>>,
    entries: Vec<MoodEntry>,
}

impl MoodStore {
    pub fn open(store: Arc<dyn KeyValueStore>) -> AppResult<Self> {
        let repo = EntryRepository::new(store, MOOD_ENTRIES_KEY);
        let entries = repo.load()?;
        Ok(Self { repo, entries })
    }

    pub fn entries(&self) -> &[MoodEntry] {
        &self.entries
    }

    pub fn entry_for(&self, date: NaiveDate) -> Option<&MoodEntry> {
        self.entries.iter().find(|entry| entry.date == date)
    }

    pub fn upsert(&mut self, date: NaiveDate, payload: SaveMoodPayload) -> AppResult<(MoodEntry, UpsertOutcome)> {
        if payload.mood > MAX_LEVEL || payload.energy > MAX_LEVEL {
            return Err(AppError::Validation(format!(
                "Mood and energy must be between 0 and {}.",
                MAX_LEVEL
            )));
        }

        let entry = MoodEntry {
            date,
            mood: payload.mood,
            energy: payload.energy,
            note: payload.note,
        };

        let mut next = self.entries.clone();
        let outcome = match next.iter_mut().find(|existing| existing.date == date) {
            Some(existing) => {
                *existing = entry.clone();
                UpsertOutcome::Updated
            }
            None => {
                next.push(entry.clone());
                UpsertOutcome::Created
            }
        };
        self.repo.save(&next)?;
        self.entries = next;

        tracing::info!(date = %date, outcome = ?outcome, "mood entry saved");
        Ok((entry, outcome))
    }

    pub fn stats(&self) -> MoodStats {
        compute_stats(&self.entries)
    }
}

pub fn compute_stats(entries: &[MoodEntry]) -> MoodStats {
    if entries.is_empty() {
        return MoodStats {
            average_mood: NEUTRAL_AVERAGE,
            average_energy: NEUTRAL_AVERAGE,
            total_entries: 0,
            first_entry_date: None,
        };
    }

    let count = entries.len() as f64;
    let mood_sum: f64 = entries.iter().map(|entry| f64::from(entry.mood)).sum();
    let energy_sum: f64 = entries.iter().map(|entry| f64::from(entry.energy)).sum();

    MoodStats {
        average_mood: round_one_decimal(mood_sum / count),
        average_energy: round_one_decimal(energy_sum / count),
        total_entries: entries.len(),
        first_entry_date: entries.iter().map(|entry| entry.date).min(),
    }
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn mood_label(level: u8) -> Option<&'static str> {
    MOOD_LABELS.get(usize::from(level)).copied()
}

pub fn energy_label(level: u8) -> Option<&'static str> {
    ENERGY_LABELS.get(usize::from(level)).copied()
}
