use crate::errors::{AppError, AppResult};
use crate::models::{JournalEntry, SaveEntryPayload};
use crate::notify::Confirm;
use crate::storage::{EntryRepository, KeyValueStore, JOURNAL_ENTRIES_KEY};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

static TAG_SEPARATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*,\s*").expect("valid tag separator regex"));

pub const DELETE_CONFIRMATION: &str = "Are you sure you want to delete this entry? This cannot be undone.";
const UNTITLED: &str = "Journal Entry";

pub fn parse_tags(raw: &str) -> Vec<String> {
    TAG_SEPARATOR
        .split(raw.trim())
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(ToString::to_string)
        .collect()
}

pub struct JournalStore {
    repo: EntryRepository<Vec<JournalEntry>>,
    entries: Vec<JournalEntry>,
}

impl JournalStore {
    pub fn open(store: Arc<dyn KeyValueStore>) -> AppResult<Self> {
        let repo = EntryRepository::new(store, JOURNAL_ENTRIES_KEY);
        let entries = repo.load()?;
        Ok(Self { repo, entries })
    }

    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&JournalEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn add(&mut self, payload: SaveEntryPayload) -> AppResult<JournalEntry> {
        if payload.content.trim().is_empty() {
            return Err(AppError::Validation("Please write something before saving.".to_string()));
        }

        let title = payload.title.trim();
        let entry = JournalEntry {
            id: self.next_id(),
            date: payload.date,
            content: payload.content,
            mood: payload.mood,
            tags: parse_tags(&payload.tags),
            title: if title.is_empty() { None } else { Some(title.to_string()) },
        };

        let mut next = Vec::with_capacity(self.entries.len() + 1);
        next.push(entry.clone());
        next.extend(self.entries.iter().cloned());
        self.repo.save(&next)?;
        self.entries = next;

        tracing::info!(entry_id = %entry.id, date = %entry.date, "journal entry saved");
        Ok(entry)
    }

    /// Returns `Ok(false)` when the user declines.
    pub fn delete(&mut self, id: &str, confirm: &dyn Confirm) -> AppResult<bool> {
        if self.get(id).is_none() {
            return Err(AppError::NotFound(format!("journal entry {}", id)));
        }
        if !confirm.confirm(DELETE_CONFIRMATION) {
            return Ok(false);
        }

        let next: Vec<JournalEntry> = self.entries.iter().filter(|entry| entry.id != id).cloned().collect();
        self.repo.save(&next)?;
        self.entries = next;

        tracing::info!(entry_id = %id, "journal entry deleted");
        Ok(true)
    }

    pub fn export_entry(&self, id: &str, dir: &Path) -> AppResult<PathBuf> {
        let entry = self
            .get(id)
            .ok_or_else(|| AppError::NotFound(format!("journal entry {}", id)))?;
        std::fs::create_dir_all(dir)?;
        let path = dir.join(export_file_name(entry));
        std::fs::write(&path, render_plain_text(entry))?;
        Ok(path)
    }

    fn next_id(&self) -> String {
        loop {
            let candidate = Uuid::new_v4().to_string();
            if self.get(&candidate).is_none() {
                return candidate;
            }
        }
    }
}

pub fn render_plain_text(entry: &JournalEntry) -> String {
    let mut lines = vec![
        entry.title.clone().unwrap_or_else(|| UNTITLED.to_string()),
        format!("Date: {}", entry.date.format("%Y-%m-%d")),
    ];
    if let Some(mood) = entry.mood {
        lines.push(format!("Mood: {}", mood.as_str()));
    }
    if !entry.tags.is_empty() {
        lines.push(format!("Tags: {}", entry.tags.join(", ")));
    }
    lines.push(String::new());
    lines.push(entry.content.trim().to_string());
    lines.join("\n")
}

pub fn export_file_name(entry: &JournalEntry) -> String {
    format!("journal-entry-{}.txt", entry.date.format("%Y-%m-%d"))
}
