pub mod app;
pub mod archive;
pub mod calendar;
pub mod capsule;
pub mod chat;
pub mod clock;
mod db;
pub mod draft;
pub mod errors;
pub mod journal;
pub mod models;
pub mod mood;
pub mod notify;
pub mod profile;
pub mod prompts;
pub mod scheduler;
pub mod storage;
pub mod streak;

use crate::app::JournalCore;
use crate::archive::ArchiveFilters;
use crate::calendar::{CalendarGrid, YearMonth};
use crate::capsule::{CapsuleView, UnlockReport};
use crate::chat::{ChatMessage, SendOutcome};
use crate::clock::Clock;
use crate::models::{
    AppSettings, BooleanResponse, CreateCapsulePayload, Draft, JournalEntry, MoodEntry, SaveEntryPayload,
    SaveMoodPayload, SignUpPayload, TimeCapsuleEntry,
};
use crate::mood::MoodStats;
use crate::notify::Notification;
use crate::profile::ProfileSnapshot;
use crate::prompts::{FavoriteToggle, PromptCategory};
use crate::streak::StreakStatus;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

/// Handle held by the UI shell. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    core: Arc<JournalCore>,
}

impl AppState {
    pub fn open(app_data_dir: PathBuf) -> Result<Self, String> {
        let core = JournalCore::new(app_data_dir).map_err(to_client_error)?;
        Ok(Self { core })
    }

    pub fn with_clock(app_data_dir: PathBuf, clock: Arc<dyn Clock>) -> Result<Self, String> {
        let core = JournalCore::with_clock(app_data_dir, clock).map_err(to_client_error)?;
        Ok(Self { core })
    }

    pub fn core(&self) -> &Arc<JournalCore> {
        &self.core
    }

    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.core.subscribe()
    }
}

/// Process entry point: logging, storage, background unlock checks and the
/// chat backend. Must be called from within a tokio runtime.
pub async fn start(app_data_dir: PathBuf) -> Result<AppState, String> {
    std::fs::create_dir_all(&app_data_dir).map_err(|error| error.to_string())?;
    init_tracing(&app_data_dir)?;

    let state = AppState::open(app_data_dir)?;
    state.core.start_background_tasks().map_err(to_client_error)?;

    tokio::spawn({
        let core = state.core.clone();
        async move {
            if let Err(error) = core.refresh_chat_backend().await {
                tracing::warn!(error = %error, "chat backend setup failed");
            }
        }
    });

    tracing::info!(db = %state.core.database_path().display(), "journal core started");
    Ok(state)
}

// Journal

pub fn save_journal_entry(state: &AppState, payload: SaveEntryPayload) -> Result<JournalEntry, String> {
    state.core.save_entry(payload).map_err(to_client_error)
}

pub fn list_journal_entries(state: &AppState) -> Result<Vec<JournalEntry>, String> {
    state.core.list_entries().map_err(to_client_error)
}

pub fn get_journal_entry(state: &AppState, entry_id: String) -> Result<JournalEntry, String> {
    state.core.get_entry(&entry_id).map_err(to_client_error)
}

/// `confirmed` is the user's answer to the delete confirmation dialog.
pub fn delete_journal_entry(state: &AppState, entry_id: String, confirmed: bool) -> Result<BooleanResponse, String> {
    let confirm = move |_: &str| confirmed;
    state
        .core
        .delete_entry(&entry_id, &confirm)
        .map(|success| BooleanResponse { success })
        .map_err(to_client_error)
}

pub fn export_journal_entry(state: &AppState, entry_id: String, dir: Option<String>) -> Result<String, String> {
    state
        .core
        .export_entry(&entry_id, dir.as_deref().map(Path::new))
        .map(|path| path.display().to_string())
        .map_err(to_client_error)
}

// Draft

pub fn restore_draft(state: &AppState) -> Result<Option<Draft>, String> {
    state.core.restore_draft().map_err(to_client_error)
}

pub fn update_draft(state: &AppState, draft: Draft) -> Result<BooleanResponse, String> {
    state
        .core
        .edit_draft(draft)
        .map(|success| BooleanResponse { success })
        .map_err(to_client_error)
}

pub fn save_draft(state: &AppState, draft: Draft) -> Result<BooleanResponse, String> {
    state.core.save_draft(draft).map_err(to_client_error)?;
    Ok(BooleanResponse { success: true })
}

pub fn clear_draft(state: &AppState) -> Result<BooleanResponse, String> {
    state.core.clear_draft().map_err(to_client_error)?;
    Ok(BooleanResponse { success: true })
}

// Archive

pub fn list_archive(state: &AppState) -> Result<Vec<JournalEntry>, String> {
    state.core.archive_entries().map_err(to_client_error)
}

pub fn set_archive_filters(state: &AppState, filters: ArchiveFilters) -> Result<Vec<JournalEntry>, String> {
    state.core.set_archive_filters(filters).map_err(to_client_error)
}

pub fn reset_archive_filters(state: &AppState) -> Result<Vec<JournalEntry>, String> {
    state.core.reset_archive_filters().map_err(to_client_error)
}

pub fn select_archive_entry(state: &AppState, entry_id: Option<String>) -> Result<Option<JournalEntry>, String> {
    state.core.select_archive_entry(entry_id).map_err(to_client_error)
}

// Mood

pub fn save_mood(state: &AppState, payload: SaveMoodPayload) -> Result<MoodEntry, String> {
    state.core.save_mood(payload).map_err(to_client_error)
}

pub fn list_mood_entries(state: &AppState) -> Result<Vec<MoodEntry>, String> {
    state.core.mood_entries().map_err(to_client_error)
}

pub fn get_today_mood(state: &AppState) -> Result<Option<MoodEntry>, String> {
    state.core.today_mood().map_err(to_client_error)
}

pub fn get_mood_stats(state: &AppState) -> Result<MoodStats, String> {
    state.core.mood_stats().map_err(to_client_error)
}

pub fn get_mood_calendar(state: &AppState) -> Result<CalendarGrid, String> {
    state.core.mood_calendar().map_err(to_client_error)
}

pub fn mood_calendar_previous(state: &AppState) -> Result<CalendarGrid, String> {
    state.core.mood_calendar_previous().map_err(to_client_error)
}

pub fn mood_calendar_next(state: &AppState) -> Result<CalendarGrid, String> {
    state.core.mood_calendar_next().map_err(to_client_error)
}

/// `month` is `YYYY-MM`.
pub fn set_mood_calendar_month(state: &AppState, month: String) -> Result<CalendarGrid, String> {
    let month = YearMonth::parse(&month).map_err(to_client_error)?;
    state.core.mood_calendar_goto(month).map_err(to_client_error)
}

// Time capsules

pub fn create_time_capsule(state: &AppState, payload: CreateCapsulePayload) -> Result<TimeCapsuleEntry, String> {
    state.core.create_capsule(payload).map_err(to_client_error)
}

pub fn list_time_capsules(state: &AppState) -> Result<Vec<TimeCapsuleEntry>, String> {
    state.core.list_capsules().map_err(to_client_error)
}

pub fn view_time_capsule(state: &AppState, capsule_id: String) -> Result<CapsuleView, String> {
    state.core.view_capsule(&capsule_id).map_err(to_client_error)
}

pub fn check_time_capsules(state: &AppState) -> Result<UnlockReport, String> {
    state.core.run_unlock_pass().map_err(to_client_error)
}

// Prompts

pub fn draw_prompt(state: &AppState, category: String) -> Result<String, String> {
    let category = PromptCategory::parse(&category).map_err(to_client_error)?;
    state.core.draw_prompt(category).map_err(to_client_error)
}

pub fn toggle_favorite_prompt(state: &AppState, prompt: String) -> Result<FavoriteToggle, String> {
    state.core.toggle_favorite_prompt(&prompt).map_err(to_client_error)
}

pub fn list_favorite_prompts(state: &AppState) -> Result<Vec<String>, String> {
    state.core.favorite_prompts().map_err(to_client_error)
}

pub fn use_favorite_prompt(state: &AppState, prompt: String) -> Result<String, String> {
    state.core.use_favorite_prompt(&prompt).map_err(to_client_error)
}

pub fn select_prompt_for_journaling(state: &AppState, prompt: String) -> Result<BooleanResponse, String> {
    state.core.select_prompt_for_journaling(&prompt).map_err(to_client_error)?;
    Ok(BooleanResponse { success: true })
}

pub fn take_selected_prompt(state: &AppState) -> Result<Option<String>, String> {
    state.core.take_selected_prompt().map_err(to_client_error)
}

// Streak

pub fn record_journal_visit(state: &AppState) -> Result<StreakStatus, String> {
    state.core.record_journal_visit().map_err(to_client_error)
}

pub fn get_journal_streak(state: &AppState) -> Result<StreakStatus, String> {
    state.core.journal_streak().map_err(to_client_error)
}

// Profile

pub fn get_profile(state: &AppState) -> Result<ProfileSnapshot, String> {
    state.core.profile().map_err(to_client_error)
}

pub fn sign_up(state: &AppState, payload: SignUpPayload) -> Result<ProfileSnapshot, String> {
    state.core.sign_up(payload).map_err(to_client_error)
}

pub fn log_in(state: &AppState, email: String) -> Result<ProfileSnapshot, String> {
    state.core.log_in(&email).map_err(to_client_error)
}

pub fn log_out(state: &AppState) -> Result<BooleanResponse, String> {
    state.core.log_out().map_err(to_client_error)?;
    Ok(BooleanResponse { success: true })
}

pub fn set_profile_image(state: &AppState, mime: String, bytes: Vec<u8>) -> Result<String, String> {
    state.core.set_profile_image(&mime, &bytes).map_err(to_client_error)
}

// Chat

pub async fn send_chat_message(state: &AppState, text: String) -> Result<SendOutcome, String> {
    state.core.send_chat_message(&text).await.map_err(to_client_error)
}

pub fn list_chat_messages(state: &AppState) -> Result<Vec<ChatMessage>, String> {
    state.core.chat_messages().map_err(to_client_error)
}

pub fn chat_quick_replies(state: &AppState) -> Vec<String> {
    state
        .core
        .chat_quick_replies()
        .into_iter()
        .map(ToString::to_string)
        .collect()
}

pub async fn save_chat_api_key(state: &AppState, key: String) -> Result<BooleanResponse, String> {
    state.core.save_chat_api_key(&key).await.map_err(to_client_error)
}

pub async fn clear_chat_api_key(state: &AppState) -> Result<BooleanResponse, String> {
    state.core.clear_chat_api_key().await.map_err(to_client_error)
}

pub async fn has_chat_api_key(state: &AppState) -> Result<BooleanResponse, String> {
    state.core.has_chat_api_key().await.map_err(to_client_error)
}

// Settings

pub fn get_settings(state: &AppState) -> Result<AppSettings, String> {
    state.core.settings().map_err(to_client_error)
}

pub fn update_settings(state: &AppState, patch: serde_json::Value) -> Result<AppSettings, String> {
    state.core.update_settings(patch).map_err(to_client_error)
}

pub fn list_storage_keys(state: &AppState) -> Result<Vec<String>, String> {
    state.core.storage_keys().map_err(to_client_error)
}

fn init_tracing(app_data_dir: &Path) -> Result<(), String> {
    let log_dir = app_data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).map_err(|error| error.to_string())?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "journal.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| error.to_string())
}

fn to_client_error(error: impl std::fmt::Display) -> String {
    error.to_string()
}
