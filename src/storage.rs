//! Key-value persistence for journal collections.
//!
//! Every collection lives under a fixed key as one JSON document. Writes are
//! whole-value overwrites. Values are wrapped in a versioned envelope:
//!
//! ```json
//! {"version": 1, "data": [...]}
//! ```
//!
//! Bare payloads without an envelope are treated as version 0 and upgraded on
//! read. A version 0 value that is not JSON at all is read as a plain string. Payloads that cannot be read load as the empty value; the raw text is
//! kept under `<key>.corrupt` so it can be recovered by hand.

use crate::errors::{poisoned, AppResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

pub const JOURNAL_ENTRIES_KEY: &str = "journalEntries";
pub const JOURNAL_DRAFT_KEY: &str = "journalDraft";
pub const MOOD_ENTRIES_KEY: &str = "moodEntries";
pub const TIME_CAPSULES_KEY: &str = "timeCapsules";
pub const FAVORITE_PROMPTS_KEY: &str = "favoritePrompts";
pub const USED_PROMPTS_KEY: &str = "usedPrompts";
pub const CURRENT_PROMPT_KEY: &str = "currentJournalPrompt";
pub const JOURNAL_STREAK_KEY: &str = "journalStreak";
pub const LAST_JOURNAL_DATE_KEY: &str = "lastJournalDate";
pub const PROFILE_IMAGE_KEY: &str = "profileImage";
pub const USER_NAME_KEY: &str = "userName";

pub const SCHEMA_VERSION: u64 = 1;
const CORRUPT_SUFFIX: &str = ".corrupt";

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> AppResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> AppResult<()>;
    fn remove(&self, key: &str) -> AppResult<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> AppResult<Option<String>> {
        let values = self.values.lock().map_err(|_| poisoned("memory store"))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        let mut values = self.values.lock().map_err(|_| poisoned("memory store"))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> AppResult<()> {
        let mut values = self.values.lock().map_err(|_| poisoned("memory store"))?;
        values.remove(key);
        Ok(())
    }
}

/// Typed view over one storage key.
pub struct EntryRepository<T> {
    store: Arc<dyn KeyValueStore>,
    key: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for EntryRepository<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            key: self.key,
            _marker: PhantomData,
        }
    }
}

impl<T> EntryRepository<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(store: Arc<dyn KeyValueStore>, key: &'static str) -> Self {
        Self {
            store,
            key,
            _marker: PhantomData,
        }
    }

    pub fn key(&self) -> &'static str {
        self.key
    }

    pub fn load(&self) -> AppResult<T> {
        let Some(raw) = self.store.get(self.key)? else {
            return Ok(T::default());
        };

        match decode::<T>(&raw) {
            Ok(value) => Ok(value),
            Err(reason) => {
                tracing::warn!(key = self.key, reason = %reason, "stored value unreadable; falling back to empty");
                self.quarantine(&raw);
                Ok(T::default())
            }
        }
    }

    pub fn save(&self, value: &T) -> AppResult<()> {
        let envelope = serde_json::json!({
            "version": SCHEMA_VERSION,
            "data": value,
        });
        self.store.set(self.key, &serde_json::to_string(&envelope)?)
    }

    pub fn delete(&self) -> AppResult<()> {
        self.store.remove(self.key)
    }

    fn quarantine(&self, raw: &str) {
        let backup_key = format!("{}{}", self.key, CORRUPT_SUFFIX);
        match self.store.get(&backup_key) {
            Ok(Some(_)) => {}
            Ok(None) => {
                if let Err(error) = self.store.set(&backup_key, raw) {
                    tracing::warn!(key = %backup_key, error = %error, "failed to quarantine unreadable value");
                }
            }
            Err(error) => {
                tracing::warn!(key = %backup_key, error = %error, "failed to inspect quarantine slot");
            }
        }
    }
}

fn decode<T: DeserializeOwned>(raw: &str) -> Result<T, String> {
    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(error) => return decode_plain_text(raw).ok_or_else(|| error.to_string()),
    };
    let legacy = envelope_version(&value) == 0;
    let decoded = upgrade(value).and_then(|payload| serde_json::from_value(payload).map_err(|error| error.to_string()));
    match decoded {
        Err(reason) if legacy => decode_plain_text(raw).ok_or(reason),
        other => other,
    }
}

// Version 0 string keys were written as the bare text, not as JSON.
fn decode_plain_text<T: DeserializeOwned>(raw: &str) -> Option<T> {
    serde_json::from_value(serde_json::Value::String(raw.to_string())).ok()
}

fn upgrade(value: serde_json::Value) -> Result<serde_json::Value, String> {
    let version = envelope_version(&value);
    match version {
        0 => Ok(value),
        SCHEMA_VERSION => match value {
            serde_json::Value::Object(mut map) => Ok(map.remove("data").unwrap_or(serde_json::Value::Null)),
            _ => Err("malformed envelope".to_string()),
        },
        newer => Err(format!("unsupported schema version {}", newer)),
    }
}

fn envelope_version(value: &serde_json::Value) -> u64 {
    let Some(map) = value.as_object() else {
        return 0;
    };
    if map.len() != 2 || !map.contains_key("data") {
        return 0;
    }
    map.get("version").and_then(serde_json::Value::as_u64).unwrap_or(0)
}
