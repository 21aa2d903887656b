use crate::errors::{poisoned, AppResult};
use crate::models::Draft;
use crate::notify::{Notification, NotificationHub};
use crate::scheduler::{TaskHandle, TaskScheduler};
use crate::storage::{EntryRepository, KeyValueStore, JOURNAL_DRAFT_KEY};
use std::sync::{Arc, Mutex};
use tokio::time::Duration;

/// Debounced autosave of the in-progress journal entry.
///
/// Every qualifying edit replaces the pending timer; only the last snapshot
/// taken before a quiet period is written.
pub struct DraftAutosave {
    repo: EntryRepository<Option<Draft>>,
    scheduler: TaskScheduler,
    notifications: NotificationHub,
    delay: Mutex<Duration>,
    pending: Mutex<Option<TaskHandle>>,
    // Bumped by every edit, save and clear. A timer only writes while its
    // generation is still current, and all writes happen under this lock.
    generation: Arc<Mutex<u64>>,
}

impl DraftAutosave {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        scheduler: TaskScheduler,
        notifications: NotificationHub,
        delay: Duration,
    ) -> Self {
        Self {
            repo: EntryRepository::new(store, JOURNAL_DRAFT_KEY),
            scheduler,
            notifications,
            delay: Mutex::new(delay),
            pending: Mutex::new(None),
            generation: Arc::new(Mutex::new(0)),
        }
    }

    pub fn set_delay(&self, delay: Duration) -> AppResult<()> {
        *self.delay.lock().map_err(|_| poisoned("autosave delay"))? = delay;
        Ok(())
    }

    pub fn current(&self) -> AppResult<Option<Draft>> {
        self.repo.load()
    }

    /// Loads a stored draft back into the editor on mount.
    pub fn restore(&self) -> AppResult<Option<Draft>> {
        let draft = self.repo.load()?;
        if draft.is_some() {
            self.notifications.emit(Notification::info(
                "Draft loaded",
                "We've restored your previous unsaved entry.",
            ));
        }
        Ok(draft)
    }

    /// Records an edit. Returns whether a save is now pending.
    pub fn on_edit(&self, draft: Draft) -> AppResult<bool> {
        if draft.content.is_empty() {
            return Ok(false);
        }

        let delay = *self.delay.lock().map_err(|_| poisoned("autosave delay"))?;
        let mut generation = self.generation.lock().map_err(|_| poisoned("autosave generation"))?;
        *generation += 1;
        let mut pending = self.pending.lock().map_err(|_| poisoned("autosave timer"))?;
        if let Some(previous) = pending.take() {
            previous.cancel();
        }

        let action = self.deferred_save(draft, *generation);
        let handle = self.scheduler.schedule("draft-autosave", delay, action)?;
        *pending = Some(handle);
        Ok(true)
    }

    /// Explicit "Save Draft".
    pub fn save_now(&self, draft: Draft) -> AppResult<()> {
        let mut generation = self.generation.lock().map_err(|_| poisoned("autosave generation"))?;
        *generation += 1;
        self.cancel_pending()?;
        self.repo.save(&Some(draft))
    }

    /// Drops the draft slot after the entry was saved or the form cleared.
    pub fn clear(&self) -> AppResult<()> {
        let mut generation = self.generation.lock().map_err(|_| poisoned("autosave generation"))?;
        *generation += 1;
        self.cancel_pending()?;
        self.repo.delete()
    }

    pub fn has_pending(&self) -> bool {
        self.pending
            .lock()
            .map(|pending| pending.as_ref().map(|handle| !handle.is_settled()).unwrap_or(false))
            .unwrap_or(false)
    }

    fn deferred_save(&self, draft: Draft, armed_at: u64) -> impl FnOnce() + Send + 'static {
        let repo = self.repo.clone();
        let notifications = self.notifications.clone();
        let generation = self.generation.clone();
        move || {
            let Ok(current) = generation.lock() else {
                tracing::warn!("autosave generation poisoned; skipping draft autosave");
                return;
            };
            if *current != armed_at {
                tracing::debug!(armed_at, current = *current, "stale draft autosave skipped");
                return;
            }
            match repo.save(&Some(draft)) {
                Ok(()) => notifications.emit(Notification::info(
                    "Entry auto-saved",
                    "Your journal entry has been automatically saved as a draft.",
                )),
                Err(error) => tracing::warn!(error = %error, "draft autosave failed"),
            }
        }
    }

    fn cancel_pending(&self) -> AppResult<()> {
        let mut pending = self.pending.lock().map_err(|_| poisoned("autosave timer"))?;
        if let Some(handle) = pending.take() {
            handle.cancel();
        }
        Ok(())
    }
}
