use crate::errors::{AppError, AppResult};
use crate::models::{CreateCapsulePayload, TimeCapsuleEntry};
use crate::notify::{Notification, NotificationHub};
use crate::storage::{EntryRepository, KeyValueStore, TIME_CAPSULES_KEY};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RevealCue {
    Unearthing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum CapsuleView {
    #[serde(rename_all = "camelCase")]
    Locked {
        id: String,
        title: String,
        unlock_date: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    Unlocked {
        id: String,
        title: String,
        content: String,
        created_date: DateTime<Utc>,
        cue: RevealCue,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockReport {
    pub unlocked: Vec<String>,
}

impl UnlockReport {
    pub fn is_empty(&self) -> bool {
        self.unlocked.is_empty()
    }
}

pub struct TimeCapsuleStore {
    repo: EntryRepository<Vec<TimeCapsuleEntry>>,
    capsules: Vec<TimeCapsuleEntry>,
    notifications: NotificationHub,
}

impl TimeCapsuleStore {
    pub fn open(store: Arc<dyn KeyValueStore>, notifications: NotificationHub) -> AppResult<Self> {
        let repo = EntryRepository::new(store, TIME_CAPSULES_KEY);
        let capsules = repo.load()?;
        Ok(Self {
            repo,
            capsules,
            notifications,
        })
    }

    pub fn capsules(&self) -> &[TimeCapsuleEntry] {
        &self.capsules
    }

    pub fn create(&mut self, payload: CreateCapsulePayload, now: DateTime<Utc>) -> AppResult<TimeCapsuleEntry> {
        let unlock_date = match payload.unlock_date {
            Some(unlock_date) if !payload.title.trim().is_empty() && !payload.content.trim().is_empty() => unlock_date,
            _ => {
                return Err(self.reject(
                    "Missing information",
                    "Please fill in all fields to create your time capsule.",
                ))
            }
        };
        if unlock_date <= now {
            return Err(self.reject("Invalid date", "The unlock date must be in the future."));
        }

        let capsule = TimeCapsuleEntry {
            id: self.next_id(),
            title: payload.title,
            content: payload.content,
            created_date: now,
            unlock_date,
            is_locked: true,
        };

        let mut next = self.capsules.clone();
        next.push(capsule.clone());
        self.repo.save(&next)?;
        self.capsules = next;

        tracing::info!(capsule_id = %capsule.id, unlock_date = %capsule.unlock_date, "time capsule buried");
        self.notifications.emit(Notification::info(
            "Time Capsule Created! 🎁",
            format!(
                "Your message will be locked until {}.",
                capsule.unlock_date.format("%Y-%m-%d")
            ),
        ));
        Ok(capsule)
    }

    /// Unlocks every capsule whose time has come. One write, one notification.
    pub fn unlock_due(&mut self, now: DateTime<Utc>) -> AppResult<UnlockReport> {
        let mut report = UnlockReport::default();
        let mut next = self.capsules.clone();
        for capsule in next.iter_mut() {
            if capsule.is_locked && capsule.unlock_date <= now {
                capsule.is_locked = false;
                report.unlocked.push(capsule.id.clone());
            }
        }

        if report.is_empty() {
            return Ok(report);
        }

        self.repo.save(&next)?;
        self.capsules = next;

        tracing::info!(count = report.unlocked.len(), ids = ?report.unlocked, "time capsules unlocked");
        self.notifications.emit_or_hold(Notification::info(
            "Time Capsule Unlocked! 🎉",
            "One or more of your time capsules are now available to view.",
        ));
        Ok(report)
    }

    pub fn view(&self, id: &str) -> AppResult<CapsuleView> {
        let capsule = self
            .capsules
            .iter()
            .find(|capsule| capsule.id == id)
            .ok_or_else(|| AppError::NotFound(format!("time capsule {}", id)))?;

        if capsule.is_locked {
            return Ok(CapsuleView::Locked {
                id: capsule.id.clone(),
                title: capsule.title.clone(),
                unlock_date: capsule.unlock_date,
            });
        }

        Ok(CapsuleView::Unlocked {
            id: capsule.id.clone(),
            title: capsule.title.clone(),
            content: capsule.content.clone(),
            created_date: capsule.created_date,
            cue: RevealCue::Unearthing,
        })
    }

    fn reject(&self, title: &str, description: &str) -> AppError {
        self.notifications.emit(Notification::destructive(title, description));
        AppError::Validation(description.to_string())
    }

    fn next_id(&self) -> String {
        loop {
            let candidate = Uuid::new_v4().to_string();
            if !self.capsules.iter().any(|capsule| capsule.id == candidate) {
                return candidate;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CapsuleView, RevealCue, TimeCapsuleStore};
    use crate::errors::AppError;
    use crate::models::{CapsuleState, CreateCapsulePayload};
    use crate::notify::{drain, NotificationHub, NotificationVariant};
    use crate::storage::MemoryStore;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::sync::Arc;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).single().expect("time")
    }

    fn payload(unlock_in: Duration) -> CreateCapsulePayload {
        CreateCapsulePayload {
            title: "Dear future me".to_string(),
            content: "Remember the lake.".to_string(),
            unlock_date: Some(now() + unlock_in),
        }
    }

    #[test]
    fn fresh_capsule_is_locked_and_hides_content() {
        let mut capsules = TimeCapsuleStore::open(Arc::new(MemoryStore::new()), NotificationHub::new()).expect("open");
        let capsule = capsules.create(payload(Duration::days(1)), now()).expect("create");
        assert_eq!(capsule.state(), CapsuleState::Locked);

        match capsules.view(&capsule.id).expect("view") {
            CapsuleView::Locked { title, .. } => assert_eq!(title, "Dear future me"),
            other => panic!("expected locked view, got {:?}", other),
        }
    }

    #[test]
    fn past_or_present_unlock_date_is_rejected() {
        let hub = NotificationHub::new();
        let mut receiver = hub.subscribe();
        let store = Arc::new(MemoryStore::new());
        let mut capsules = TimeCapsuleStore::open(store.clone(), hub).expect("open");

        let err = capsules.create(payload(Duration::zero()), now()).expect_err("not future");
        assert!(matches!(err, AppError::Validation(_)));
        assert!(capsules.capsules().is_empty());
        assert_eq!(drain(&mut receiver)[0].variant, NotificationVariant::Destructive);

        let reopened = TimeCapsuleStore::open(store, NotificationHub::new()).expect("reopen");
        assert!(reopened.capsules().is_empty());
    }

    #[test]
    fn missing_fields_are_rejected() {
        let mut capsules = TimeCapsuleStore::open(Arc::new(MemoryStore::new()), NotificationHub::new()).expect("open");
        let mut missing_date = payload(Duration::days(1));
        missing_date.unlock_date = None;
        assert!(capsules.create(missing_date, now()).is_err());

        let mut blank_title = payload(Duration::days(1));
        blank_title.title = "  ".to_string();
        assert!(capsules.create(blank_title, now()).is_err());
    }

    #[test]
    fn unlock_pass_flips_only_due_capsules_with_one_write() {
        let hub = NotificationHub::new();
        let store = Arc::new(MemoryStore::new());
        let mut capsules = TimeCapsuleStore::open(store.clone(), hub.clone()).expect("open");
        let soon = capsules.create(payload(Duration::hours(1)), now()).expect("soon");
        let sooner = capsules.create(payload(Duration::minutes(5)), now()).expect("sooner");
        let later = capsules.create(payload(Duration::days(30)), now()).expect("later");

        let mut receiver = hub.subscribe();
        let report = capsules.unlock_due(now() + Duration::hours(2)).expect("unlock");
        assert_eq!(report.unlocked, vec![soon.id.clone(), sooner.id.clone()]);

        let notes = drain(&mut receiver);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].title, "Time Capsule Unlocked! 🎉");

        match capsules.view(&soon.id).expect("view") {
            CapsuleView::Unlocked { content, cue, .. } => {
                assert_eq!(content, "Remember the lake.");
                assert_eq!(cue, RevealCue::Unearthing);
            }
            other => panic!("expected unlocked view, got {:?}", other),
        }
        assert!(matches!(capsules.view(&later.id).expect("view"), CapsuleView::Locked { .. }));

        let reopened = TimeCapsuleStore::open(store, NotificationHub::new()).expect("reopen");
        let locked: Vec<bool> = reopened.capsules().iter().map(|capsule| capsule.is_locked).collect();
        assert_eq!(locked, vec![false, false, true]);
    }

    #[test]
    fn unlocked_capsules_stay_unlocked_and_quiet_passes_do_not_notify() {
        let hub = NotificationHub::new();
        let mut receiver = hub.subscribe();
        let mut capsules = TimeCapsuleStore::open(Arc::new(MemoryStore::new()), hub.clone()).expect("open");
        capsules.create(payload(Duration::minutes(1)), now()).expect("create");
        capsules.unlock_due(now() + Duration::minutes(2)).expect("unlock");
        drain(&mut receiver);

        let report = capsules.unlock_due(now()).expect("second pass");
        assert!(report.is_empty());
        assert!(!capsules.capsules()[0].is_locked);
        assert!(drain(&mut receiver).is_empty());
    }

    #[test]
    fn unlock_with_nobody_listening_waits_for_the_first_subscriber() {
        let hub = NotificationHub::new();
        let mut capsules = TimeCapsuleStore::open(Arc::new(MemoryStore::new()), hub.clone()).expect("open");
        capsules.create(payload(Duration::minutes(1)), now()).expect("create");
        capsules.unlock_due(now() + Duration::minutes(2)).expect("unlock");

        let titles: Vec<String> = drain(&mut hub.subscribe()).into_iter().map(|note| note.title).collect();
        assert_eq!(titles, vec!["Time Capsule Unlocked! 🎉"]);
    }

    #[test]
    fn viewing_unknown_capsule_is_not_found() {
        let capsules = TimeCapsuleStore::open(Arc::new(MemoryStore::new()), NotificationHub::new()).expect("open");
        assert!(matches!(capsules.view("nope"), Err(AppError::NotFound(_))));
    }
}
