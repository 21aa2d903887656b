use crate::models::{JournalEntry, MoodLabel};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Archive filter criteria. Empty fields impose no constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArchiveFilters {
    pub search: String,
    pub date: Option<NaiveDate>,
    pub mood: Option<MoodLabel>,
    pub tag: String,
}

impl ArchiveFilters {
    pub fn is_empty(&self) -> bool {
        self.search.is_empty() && self.date.is_none() && self.mood.is_none() && self.tag.is_empty()
    }

    pub fn matches(&self, entry: &JournalEntry) -> bool {
        if !self.search.is_empty() {
            let term = self.search.to_lowercase();
            let in_content = entry.content.to_lowercase().contains(&term);
            let in_title = entry
                .title
                .as_deref()
                .map(|title| title.to_lowercase().contains(&term))
                .unwrap_or(false);
            if !in_content && !in_title {
                return false;
            }
        }

        if let Some(date) = self.date {
            if entry.date != date {
                return false;
            }
        }

        if let Some(mood) = self.mood {
            if entry.mood != Some(mood) {
                return false;
            }
        }

        if !self.tag.is_empty() {
            let needle = self.tag.to_lowercase();
            if !entry.tags.iter().any(|tag| tag.to_lowercase().contains(&needle)) {
                return false;
            }
        }

        true
    }
}

pub fn filter_entries<'a>(entries: &'a [JournalEntry], filters: &ArchiveFilters) -> Vec<&'a JournalEntry> {
    entries.iter().filter(|entry| filters.matches(entry)).collect()
}

/// Archive screen state: the active criteria plus the opened entry.
#[derive(Debug, Clone, Default)]
pub struct ArchiveView {
    filters: ArchiveFilters,
    selected: Option<String>,
}

impl ArchiveView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filters(&self) -> &ArchiveFilters {
        &self.filters
    }

    pub fn set_filters(&mut self, filters: ArchiveFilters) {
        self.filters = filters;
    }

    pub fn reset(&mut self) {
        self.filters = ArchiveFilters::default();
    }

    pub fn visible<'a>(&self, entries: &'a [JournalEntry]) -> Vec<&'a JournalEntry> {
        filter_entries(entries, &self.filters)
    }

    pub fn select(&mut self, id: Option<String>) {
        self.selected = id;
    }

    pub fn selected<'a>(&self, entries: &'a [JournalEntry]) -> Option<&'a JournalEntry> {
        let id = self.selected.as_deref()?;
        entries.iter().find(|entry| entry.id == id)
    }

    pub fn forget(&mut self, id: &str) {
        if self.selected.as_deref() == Some(id) {
            self.selected = None;
        }
    }
}
