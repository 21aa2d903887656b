use crate::archive::{ArchiveFilters, ArchiveView};
use crate::calendar::{self, CalendarGrid, YearMonth};
use crate::capsule::{CapsuleView, TimeCapsuleStore, UnlockReport};
use crate::chat::{ApiKeyVault, ChatMessage, ChatSession, GeminiGenerator, SendOutcome, TextGenerator};
use crate::clock::{Clock, SystemClock};
use crate::db::Database;
use crate::draft::DraftAutosave;
use crate::errors::{poisoned, AppError, AppResult};
use crate::journal::JournalStore;
use crate::models::{
    AppSettings, BooleanResponse, CreateCapsulePayload, Draft, JournalEntry, MoodEntry, SaveEntryPayload,
    SaveMoodPayload, SignUpPayload, TimeCapsuleEntry,
};
use crate::mood::{MoodStats, MoodStore, UpsertOutcome};
use crate::notify::{Confirm, Notification, NotificationHub};
use crate::profile::{ProfileSnapshot, ProfileStore};
use crate::prompts::{FavoriteToggle, PromptCategory, PromptDeck};
use crate::scheduler::TaskScheduler;
use crate::storage::KeyValueStore;
use crate::streak::{StreakStatus, VisitStreak};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Duration;

const DB_FILE: &str = "journal.sqlite";
const EXPORT_DIR: &str = "exports";

/// Every store of the journal behind one shared handle.
pub struct JournalCore {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
    notifications: NotificationHub,
    scheduler: TaskScheduler,
    journal: Mutex<JournalStore>,
    archive: Mutex<ArchiveView>,
    moods: Mutex<MoodStore>,
    calendar_month: Mutex<YearMonth>,
    capsules: Mutex<TimeCapsuleStore>,
    prompts: Mutex<PromptDeck>,
    streak: VisitStreak,
    profile: ProfileStore,
    draft: DraftAutosave,
    chat: ChatSession,
    api_keys: ApiKeyVault,
    api_key: Mutex<Option<String>>,
    unlock_loop: Mutex<Option<JoinHandle<()>>>,
    app_data_dir: PathBuf,
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> AppResult<MutexGuard<'a, T>> {
    mutex.lock().map_err(|_| poisoned(what))
}

impl JournalCore {
    pub fn new(app_data_dir: PathBuf) -> AppResult<Arc<Self>> {
        Self::with_clock(app_data_dir, Arc::new(SystemClock))
    }

    pub fn with_clock(app_data_dir: PathBuf, clock: Arc<dyn Clock>) -> AppResult<Arc<Self>> {
        let db = Arc::new(Database::new(&app_data_dir.join(DB_FILE))?);
        let settings = db.get_settings()?;
        let store: Arc<dyn KeyValueStore> = db.clone();
        let notifications = NotificationHub::new();
        let scheduler = TaskScheduler::new();

        let generator: Arc<dyn TextGenerator> = Arc::new(GeminiGenerator::new(&settings, None)?);
        let this = Arc::new(Self {
            journal: Mutex::new(JournalStore::open(store.clone())?),
            archive: Mutex::new(ArchiveView::new()),
            moods: Mutex::new(MoodStore::open(store.clone())?),
            calendar_month: Mutex::new(YearMonth::of(clock.today())),
            capsules: Mutex::new(TimeCapsuleStore::open(store.clone(), notifications.clone())?),
            prompts: Mutex::new(PromptDeck::open(store.clone(), notifications.clone())?),
            streak: VisitStreak::new(store.clone(), notifications.clone()),
            profile: ProfileStore::new(store.clone(), notifications.clone()),
            draft: DraftAutosave::new(
                store,
                scheduler.clone(),
                notifications.clone(),
                Duration::from_secs(settings.autosave_delay_secs),
            ),
            chat: ChatSession::new(generator, clock.clone()),
            api_keys: ApiKeyVault::new(),
            api_key: Mutex::new(None),
            unlock_loop: Mutex::new(None),
            db,
            clock,
            notifications,
            scheduler,
            app_data_dir,
        });

        match this.run_unlock_pass() {
            Ok(report) if !report.is_empty() => {
                tracing::info!(count = report.unlocked.len(), "capsules unlocked on open");
            }
            Ok(_) => {}
            Err(error) => tracing::warn!(error = %error, "initial unlock pass failed"),
        }

        Ok(this)
    }

    pub fn app_data_dir(&self) -> &Path {
        &self.app_data_dir
    }

    pub fn database_path(&self) -> &Path {
        self.db.path()
    }

    pub fn storage_keys(&self) -> AppResult<Vec<String>> {
        self.db.list_keys()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    /// Starts the periodic unlock pass. Calling it again restarts the loop
    /// with the current interval setting.
    pub fn start_background_tasks(self: &Arc<Self>) -> AppResult<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| AppError::Internal("no async runtime available for background tasks".to_string()))?;
        let interval_secs = self.db.get_settings()?.unlock_check_interval_secs.max(1);

        let weak = Arc::downgrade(self);
        let task = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(core) = weak.upgrade() else {
                    break;
                };
                if let Err(error) = core.run_unlock_pass() {
                    tracing::warn!(error = %error, "periodic unlock pass failed");
                }
            }
        });

        let mut slot = lock(&self.unlock_loop, "unlock loop")?;
        if let Some(previous) = slot.replace(task) {
            previous.abort();
        }
        tracing::info!(interval_secs, "background unlock checks started");
        Ok(())
    }

    pub fn stop_background_tasks(&self) {
        if let Ok(mut slot) = self.unlock_loop.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }

    pub fn settings(&self) -> AppResult<AppSettings> {
        self.db.get_settings()
    }

    pub fn update_settings(&self, patch: serde_json::Value) -> AppResult<AppSettings> {
        let settings = self.db.update_settings(patch)?;
        self.draft
            .set_delay(Duration::from_secs(settings.autosave_delay_secs))?;
        self.rebuild_chat_backend(&settings)?;
        tracing::info!("settings updated");
        Ok(settings)
    }

    // Journal

    pub fn save_entry(&self, payload: SaveEntryPayload) -> AppResult<JournalEntry> {
        let entry = lock(&self.journal, "journal")?
            .add(payload)
            .map_err(|error| self.reject("Empty entry", error))?;
        if let Err(error) = self.draft.clear() {
            tracing::warn!(entry_id = %entry.id, error = %error, "entry saved but draft could not be cleared");
        }
        self.notifications.emit(Notification::info(
            "Entry saved!",
            "Your journal entry has been successfully saved.",
        ));
        Ok(entry)
    }

    pub fn list_entries(&self) -> AppResult<Vec<JournalEntry>> {
        Ok(lock(&self.journal, "journal")?.entries().to_vec())
    }

    pub fn get_entry(&self, id: &str) -> AppResult<JournalEntry> {
        lock(&self.journal, "journal")?
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("journal entry {}", id)))
    }

    pub fn delete_entry(&self, id: &str, confirm: &dyn Confirm) -> AppResult<bool> {
        let deleted = lock(&self.journal, "journal")?.delete(id, confirm)?;
        if deleted {
            lock(&self.archive, "archive")?.forget(id);
        }
        Ok(deleted)
    }

    pub fn export_entry(&self, id: &str, dir: Option<&Path>) -> AppResult<PathBuf> {
        let default_dir = self.app_data_dir.join(EXPORT_DIR);
        let path = lock(&self.journal, "journal")?.export_entry(id, dir.unwrap_or(&default_dir))?;
        tracing::info!(entry_id = %id, path = %path.display(), "journal entry exported");
        Ok(path)
    }

    // Draft

    pub fn restore_draft(&self) -> AppResult<Option<Draft>> {
        self.draft.restore()
    }

    pub fn edit_draft(&self, draft: Draft) -> AppResult<bool> {
        self.draft.on_edit(draft)
    }

    pub fn save_draft(&self, draft: Draft) -> AppResult<()> {
        self.draft.save_now(draft)
    }

    pub fn clear_draft(&self) -> AppResult<()> {
        self.draft.clear()?;
        self.notifications
            .emit(Notification::info("Entry cleared", "Your draft has been cleared."));
        Ok(())
    }

    pub fn has_pending_autosave(&self) -> bool {
        self.draft.has_pending()
    }

    // Archive

    pub fn archive_entries(&self) -> AppResult<Vec<JournalEntry>> {
        let journal = lock(&self.journal, "journal")?;
        let archive = lock(&self.archive, "archive")?;
        Ok(archive.visible(journal.entries()).into_iter().cloned().collect())
    }

    pub fn set_archive_filters(&self, filters: ArchiveFilters) -> AppResult<Vec<JournalEntry>> {
        lock(&self.archive, "archive")?.set_filters(filters);
        self.archive_entries()
    }

    pub fn reset_archive_filters(&self) -> AppResult<Vec<JournalEntry>> {
        lock(&self.archive, "archive")?.reset();
        self.archive_entries()
    }

    pub fn archive_filters(&self) -> AppResult<ArchiveFilters> {
        Ok(lock(&self.archive, "archive")?.filters().clone())
    }

    pub fn select_archive_entry(&self, id: Option<String>) -> AppResult<Option<JournalEntry>> {
        let journal = lock(&self.journal, "journal")?;
        if let Some(id) = id.as_deref() {
            if journal.get(id).is_none() {
                return Err(AppError::NotFound(format!("journal entry {}", id)));
            }
        }
        let mut archive = lock(&self.archive, "archive")?;
        archive.select(id);
        Ok(archive.selected(journal.entries()).cloned())
    }

    pub fn selected_archive_entry(&self) -> AppResult<Option<JournalEntry>> {
        let journal = lock(&self.journal, "journal")?;
        let archive = lock(&self.archive, "archive")?;
        Ok(archive.selected(journal.entries()).cloned())
    }

    // Mood

    pub fn save_mood(&self, payload: SaveMoodPayload) -> AppResult<MoodEntry> {
        let today = self.clock.today();
        let (entry, outcome) = lock(&self.moods, "moods")?
            .upsert(today, payload)
            .map_err(|error| self.reject("Invalid mood", error))?;
        self.notifications.emit(match outcome {
            UpsertOutcome::Created => Notification::info("Mood logged", "Your mood has been recorded for today."),
            UpsertOutcome::Updated => {
                Notification::info("Mood updated", "Your mood entry for today has been updated.")
            }
        });
        Ok(entry)
    }

    pub fn mood_entries(&self) -> AppResult<Vec<MoodEntry>> {
        Ok(lock(&self.moods, "moods")?.entries().to_vec())
    }

    pub fn today_mood(&self) -> AppResult<Option<MoodEntry>> {
        Ok(lock(&self.moods, "moods")?.entry_for(self.clock.today()).cloned())
    }

    pub fn mood_stats(&self) -> AppResult<MoodStats> {
        Ok(lock(&self.moods, "moods")?.stats())
    }

    pub fn mood_calendar(&self) -> AppResult<CalendarGrid> {
        let month = *lock(&self.calendar_month, "calendar month")?;
        self.project_month(month)
    }

    pub fn mood_calendar_previous(&self) -> AppResult<CalendarGrid> {
        self.move_calendar(YearMonth::previous)
    }

    pub fn mood_calendar_next(&self) -> AppResult<CalendarGrid> {
        self.move_calendar(YearMonth::next)
    }

    pub fn mood_calendar_goto(&self, month: YearMonth) -> AppResult<CalendarGrid> {
        self.move_calendar(|_| month)
    }

    fn move_calendar(&self, step: impl FnOnce(YearMonth) -> YearMonth) -> AppResult<CalendarGrid> {
        let month = {
            let mut current = lock(&self.calendar_month, "calendar month")?;
            *current = step(*current);
            *current
        };
        self.project_month(month)
    }

    fn project_month(&self, month: YearMonth) -> AppResult<CalendarGrid> {
        let moods = lock(&self.moods, "moods")?;
        Ok(calendar::project(month, moods.entries(), self.clock.today()))
    }

    // Time capsules

    pub fn create_capsule(&self, payload: CreateCapsulePayload) -> AppResult<TimeCapsuleEntry> {
        lock(&self.capsules, "capsules")?.create(payload, self.clock.now())
    }

    pub fn list_capsules(&self) -> AppResult<Vec<TimeCapsuleEntry>> {
        Ok(lock(&self.capsules, "capsules")?.capsules().to_vec())
    }

    pub fn view_capsule(&self, id: &str) -> AppResult<CapsuleView> {
        lock(&self.capsules, "capsules")?.view(id)
    }

    pub fn run_unlock_pass(&self) -> AppResult<UnlockReport> {
        lock(&self.capsules, "capsules")?.unlock_due(self.clock.now())
    }

    // Prompts

    pub fn draw_prompt(&self, category: PromptCategory) -> AppResult<String> {
        let mut rng = rand::rng();
        lock(&self.prompts, "prompts")?.draw(category, &mut rng)
    }

    pub fn toggle_favorite_prompt(&self, prompt: &str) -> AppResult<FavoriteToggle> {
        lock(&self.prompts, "prompts")?.toggle_favorite(prompt)
    }

    pub fn favorite_prompts(&self) -> AppResult<Vec<String>> {
        Ok(lock(&self.prompts, "prompts")?.favorites().to_vec())
    }

    pub fn use_favorite_prompt(&self, prompt: &str) -> AppResult<String> {
        lock(&self.prompts, "prompts")?.use_favorite(prompt)
    }

    pub fn select_prompt_for_journaling(&self, prompt: &str) -> AppResult<()> {
        lock(&self.prompts, "prompts")?.select_for_journaling(prompt)
    }

    pub fn take_selected_prompt(&self) -> AppResult<Option<String>> {
        lock(&self.prompts, "prompts")?.take_selected_prompt()
    }

    // Streak

    pub fn record_journal_visit(&self) -> AppResult<StreakStatus> {
        self.streak.record_visit(self.clock.today())
    }

    pub fn journal_streak(&self) -> AppResult<StreakStatus> {
        self.streak.status()
    }

    // Profile

    pub fn profile(&self) -> AppResult<ProfileSnapshot> {
        self.profile.snapshot()
    }

    pub fn sign_up(&self, payload: SignUpPayload) -> AppResult<ProfileSnapshot> {
        self.profile.sign_up(payload)
    }

    pub fn log_in(&self, email: &str) -> AppResult<ProfileSnapshot> {
        self.profile.log_in(email)
    }

    pub fn log_out(&self) -> AppResult<()> {
        self.profile.log_out()
    }

    pub fn set_profile_image(&self, mime: &str, bytes: &[u8]) -> AppResult<String> {
        self.profile.set_profile_image(mime, bytes)
    }

    // Chat

    pub async fn send_chat_message(&self, text: &str) -> AppResult<SendOutcome> {
        self.chat.send(text).await
    }

    pub fn chat_messages(&self) -> AppResult<Vec<ChatMessage>> {
        self.chat.messages()
    }

    pub fn chat_quick_replies(&self) -> Vec<&'static str> {
        self.chat.quick_replies()
    }

    pub fn set_chat_generator(&self, generator: Arc<dyn TextGenerator>) -> AppResult<()> {
        self.chat.set_generator(generator)
    }

    /// Reads the stored API key and points the chat at the configured model.
    pub async fn refresh_chat_backend(&self) -> AppResult<()> {
        let key = match self.api_keys.load().await {
            Ok(key) => key,
            Err(error) => {
                tracing::warn!(error = %error, "credential store unavailable; chat runs without an API key");
                None
            }
        };
        *lock(&self.api_key, "api key")? = key;
        self.rebuild_chat_backend(&self.db.get_settings()?)
    }

    pub async fn save_chat_api_key(&self, key: &str) -> AppResult<BooleanResponse> {
        let response = self.api_keys.save(key).await?;
        self.refresh_chat_backend().await?;
        Ok(response)
    }

    pub async fn clear_chat_api_key(&self) -> AppResult<BooleanResponse> {
        let response = self.api_keys.clear().await?;
        self.refresh_chat_backend().await?;
        Ok(response)
    }

    pub async fn has_chat_api_key(&self) -> AppResult<BooleanResponse> {
        self.api_keys.has().await
    }

    fn rebuild_chat_backend(&self, settings: &AppSettings) -> AppResult<()> {
        let key = lock(&self.api_key, "api key")?.clone();
        self.chat
            .set_generator(Arc::new(GeminiGenerator::new(settings, key)?))
    }

    fn reject(&self, title: &str, error: AppError) -> AppError {
        if let AppError::Validation(description) = &error {
            self.notifications
                .emit(Notification::destructive(title, description.clone()));
        }
        error
    }
}

impl Drop for JournalCore {
    fn drop(&mut self) {
        self.stop_background_tasks();
    }
}

#[cfg(test)]
mod tests {
    use super::JournalCore;
    use crate::clock::{Clock, FixedClock};
    use crate::models::{CreateCapsulePayload, Draft, SaveEntryPayload, SaveMoodPayload};
    use crate::notify::{drain, NotificationVariant};
    use chrono::{Duration, NaiveDate, TimeZone, Utc};
    use std::sync::Arc;

    fn clock() -> Arc<FixedClock> {
        Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 1, 15, 8, 30, 0).single().expect("time"),
        ))
    }

    fn entry(content: &str) -> SaveEntryPayload {
        SaveEntryPayload {
            title: String::new(),
            content: content.to_string(),
            mood: None,
            tags: String::new(),
            date: NaiveDate::from_ymd_opt(2024, 1, 15).expect("date"),
        }
    }

    #[test]
    fn empty_entry_emits_destructive_notification() {
        let dir = tempfile::tempdir().expect("tempdir");
        let core = JournalCore::with_clock(dir.path().to_path_buf(), clock()).expect("core");
        let mut receiver = core.subscribe();

        assert!(core.save_entry(entry("   ")).is_err());
        let notes = drain(&mut receiver);
        assert_eq!(notes[0].title, "Empty entry");
        assert_eq!(notes[0].variant, NotificationVariant::Destructive);
        assert!(core.list_entries().expect("entries").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn saving_entry_clears_draft_and_pending_autosave() {
        let dir = tempfile::tempdir().expect("tempdir");
        let core = JournalCore::with_clock(dir.path().to_path_buf(), clock()).expect("core");
        let draft = Draft {
            title: String::new(),
            content: "half a thought".to_string(),
            mood: None,
            tags: vec![],
            date: NaiveDate::from_ymd_opt(2024, 1, 15).expect("date"),
        };
        core.save_draft(draft.clone()).expect("save draft");
        core.edit_draft(draft).expect("edit");
        assert!(core.has_pending_autosave());

        core.save_entry(entry("a full thought")).expect("save");
        assert!(!core.has_pending_autosave());
        tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        assert!(core.restore_draft().expect("restore").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn entry_save_succeeds_when_draft_cleanup_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let core = JournalCore::with_clock(dir.path().to_path_buf(), clock()).expect("core");
        core.save_draft(Draft {
            title: String::new(),
            content: "pinned".to_string(),
            mood: None,
            tags: vec![],
            date: NaiveDate::from_ymd_opt(2024, 1, 15).expect("date"),
        })
        .expect("save draft");

        let conn = rusqlite::Connection::open(core.database_path()).expect("second connection");
        conn.execute_batch(
            "CREATE TRIGGER pin_draft BEFORE DELETE ON kv_store WHEN old.key = 'journalDraft'
             BEGIN SELECT RAISE(ABORT, 'draft pinned'); END;",
        )
        .expect("trigger");

        let mut receiver = core.subscribe();
        let saved = core.save_entry(entry("a full thought")).expect("entry still saved");
        assert_eq!(core.list_entries().expect("entries")[0].id, saved.id);
        assert_eq!(drain(&mut receiver)[0].title, "Entry saved!");
    }

    #[test]
    fn mood_is_recorded_for_the_clock_day_and_updates_in_place() {
        let dir = tempfile::tempdir().expect("tempdir");
        let core = JournalCore::with_clock(dir.path().to_path_buf(), clock()).expect("core");
        let mut receiver = core.subscribe();
        let payload = |mood| SaveMoodPayload {
            mood,
            energy: 2,
            note: String::new(),
        };

        core.save_mood(payload(1)).expect("log");
        core.save_mood(payload(3)).expect("update");
        let titles: Vec<String> = drain(&mut receiver).into_iter().map(|note| note.title).collect();
        assert_eq!(titles, vec!["Mood logged", "Mood updated"]);

        let today = core.today_mood().expect("today").expect("entry");
        assert_eq!(today.date, NaiveDate::from_ymd_opt(2024, 1, 15).expect("date"));
        assert_eq!(today.mood, 3);

        let grid = core.mood_calendar().expect("grid");
        assert_eq!(grid.label, "January 2024");
        assert_eq!(core.mood_calendar_previous().expect("prev").label, "December 2023");
        assert_eq!(core.mood_calendar_next().expect("next").label, "January 2024");
    }

    #[test]
    fn capsules_unlock_when_reopened_after_their_date() {
        let dir = tempfile::tempdir().expect("tempdir");
        let clock = clock();
        let core = JournalCore::with_clock(dir.path().to_path_buf(), clock.clone()).expect("core");
        let capsule = core
            .create_capsule(CreateCapsulePayload {
                title: "Next week".to_string(),
                content: "Did you rest?".to_string(),
                unlock_date: Some(clock.now() + Duration::days(7)),
            })
            .expect("create");
        drop(core);

        clock.advance(Duration::days(8));
        let reopened = JournalCore::with_clock(dir.path().to_path_buf(), clock).expect("reopen");
        let capsules = reopened.list_capsules().expect("capsules");
        assert_eq!(capsules.len(), 1);
        assert_eq!(capsules[0].id, capsule.id);
        assert!(!capsules[0].is_locked);

        let mut receiver = reopened.subscribe();
        let notes = drain(&mut receiver);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].title, "Time Capsule Unlocked! 🎉");
        assert!(reopened.run_unlock_pass().expect("quiet pass").is_empty());
        assert!(drain(&mut receiver).is_empty());
    }

    #[test]
    fn settings_patch_updates_and_persists() {
        let dir = tempfile::tempdir().expect("tempdir");
        let core = JournalCore::with_clock(dir.path().to_path_buf(), clock()).expect("core");
        let updated = core
            .update_settings(serde_json::json!({"autosaveDelaySecs": 10}))
            .expect("update");
        assert_eq!(updated.autosave_delay_secs, 10);
        assert!(core
            .update_settings(serde_json::json!({"autosaveDelaySecs": "soon"}))
            .is_err());
        assert_eq!(core.settings().expect("settings").autosave_delay_secs, 10);
    }
}
