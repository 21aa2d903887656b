use crate::errors::AppResult;
use crate::notify::{Notification, NotificationHub};
use crate::storage::{EntryRepository, KeyValueStore, JOURNAL_STREAK_KEY, LAST_JOURNAL_DATE_KEY};
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;

// Older installs stored the visit day in the browser's `Mon Jan 15 2024` form.
const LEGACY_DATE_FORMAT: &str = "%a %b %d %Y";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakStatus {
    pub days: u32,
    pub last_visit: Option<NaiveDate>,
}

impl StreakStatus {
    pub fn label(&self) -> String {
        format!("{} {}", self.days, if self.days == 1 { "day" } else { "days" })
    }
}

/// Last visit day as stored, accepting both ISO and legacy text forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
struct VisitDay(NaiveDate);

impl<'de> Deserialize<'de> for VisitDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_visit_day(&raw)
            .map(VisitDay)
            .ok_or_else(|| serde::de::Error::custom(format!("unrecognised visit date {:?}", raw)))
    }
}

fn parse_visit_day(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, LEGACY_DATE_FORMAT))
        .ok()
}

/// Consecutive-day visit counter for the journaling area.
pub struct VisitStreak {
    days_repo: EntryRepository<u32>,
    last_repo: EntryRepository<Option<VisitDay>>,
    notifications: NotificationHub,
}

impl VisitStreak {
    pub fn new(store: Arc<dyn KeyValueStore>, notifications: NotificationHub) -> Self {
        Self {
            days_repo: EntryRepository::new(store.clone(), JOURNAL_STREAK_KEY),
            last_repo: EntryRepository::new(store, LAST_JOURNAL_DATE_KEY),
            notifications,
        }
    }

    pub fn status(&self) -> AppResult<StreakStatus> {
        Ok(StreakStatus {
            days: self.days_repo.load()?,
            last_visit: self.last_repo.load()?.map(|day| day.0),
        })
    }

    pub fn record_visit(&self, today: NaiveDate) -> AppResult<StreakStatus> {
        let current = self.status()?;
        let days = match current.last_visit {
            Some(last) if last == today => return Ok(current),
            Some(last) if last.succ_opt() == Some(today) => current.days.saturating_add(1),
            _ => 1,
        };

        self.days_repo.save(&days)?;
        self.last_repo.save(&Some(VisitDay(today)))?;
        tracing::debug!(days, date = %today, "journal streak updated");

        if days > 1 {
            self.notifications.emit(Notification::info(
                format!("Journal Streak: {} days! 🎉", days),
                "Keep up the great mindfulness practice!",
            ));
        }
        Ok(StreakStatus {
            days,
            last_visit: Some(today),
        })
    }
}
