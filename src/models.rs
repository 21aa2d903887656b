use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MoodLabel {
    Happy,
    Neutral,
    Sad,
    Angry,
    Calm,
    Content,
    Anxious,
    Thoughtful,
}

impl MoodLabel {
    pub const ALL: [MoodLabel; 8] = [
        Self::Happy,
        Self::Neutral,
        Self::Sad,
        Self::Angry,
        Self::Calm,
        Self::Content,
        Self::Anxious,
        Self::Thoughtful,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Happy => "Happy",
            Self::Neutral => "Neutral",
            Self::Sad => "Sad",
            Self::Angry => "Angry",
            Self::Calm => "Calm",
            Self::Content => "Content",
            Self::Anxious => "Anxious",
            Self::Thoughtful => "Thoughtful",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Self::Happy => "😊",
            Self::Neutral => "😐",
            Self::Sad => "😔",
            Self::Angry => "😡",
            Self::Calm => "😌",
            Self::Content => "🙂",
            Self::Anxious => "😰",
            Self::Thoughtful => "🤔",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|label| label.as_str() == raw)
    }
}

/// Stores `None` as the empty string the way older payloads did.
mod optional_mood_label {
    use super::MoodLabel;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<MoodLabel>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(value.map(MoodLabel::as_str).unwrap_or(""))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<MoodLabel>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        if raw.is_empty() {
            return Ok(None);
        }
        MoodLabel::parse(&raw)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("unknown mood label '{}'", raw)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub id: String,
    pub date: NaiveDate,
    pub content: String,
    #[serde(default, with = "optional_mood_label")]
    pub mood: Option<MoodLabel>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoodEntry {
    pub date: NaiveDate,
    pub mood: u8,
    pub energy: u8,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CapsuleState {
    Locked,
    Unlocked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeCapsuleEntry {
    pub id: String,
    pub title: String,
    pub content: String,
    pub created_date: DateTime<Utc>,
    pub unlock_date: DateTime<Utc>,
    pub is_locked: bool,
}

impl TimeCapsuleEntry {
    pub fn state(&self) -> CapsuleState {
        if self.is_locked {
            CapsuleState::Locked
        } else {
            CapsuleState::Unlocked
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, with = "optional_mood_label")]
    pub mood: Option<MoodLabel>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveEntryPayload {
    #[serde(default)]
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub mood: Option<MoodLabel>,
    /// Comma separated, as typed into the tags field.
    #[serde(default)]
    pub tags: String,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveMoodPayload {
    pub mood: u8,
    pub energy: u8,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCapsulePayload {
    pub title: String,
    pub content: String,
    pub unlock_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpPayload {
    pub name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    #[serde(default)]
    pub profile_image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BooleanResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    pub autosave_delay_secs: u64,
    pub unlock_check_interval_secs: u64,
    pub chat_endpoint: String,
    pub chat_model: String,
    pub chat_temperature: f32,
    pub chat_max_output_tokens: u32,
    pub chat_timeout_secs: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            autosave_delay_secs: 30,
            unlock_check_interval_secs: 60,
            chat_endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            chat_model: "gemini-2.0-flash".to_string(),
            chat_temperature: 0.7,
            chat_max_output_tokens: 800,
            chat_timeout_secs: 60,
        }
    }
}
