use crate::clock::Clock;
use crate::errors::{poisoned, AppError, AppResult};
use crate::models::{AppSettings, BooleanResponse};
use anyhow::Context;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

const KEYRING_SERVICE: &str = "mindful-journal";
const KEYRING_ACCOUNT: &str = "gemini-api-key";

const SYSTEM_INSTRUCTION: &str = "You are a mindfulness assistant named MindfulBot. Respond to the following with practical mindfulness advice. Keep responses concise and actionable: ";

pub const GREETING: &str = "Hello! 🌱 I'm here to help you find calm. How are you feeling today?";

pub const QUICK_REPLIES: [&str; 3] = [
    "Guide me through a breathing exercise",
    "I'm feeling anxious, what can I do?",
    "Share a mindful quote for today",
];

const NO_RESPONSE_REPLY: &str = "I'm sorry, I couldn't generate a response at the moment. Please try again later.";
const GENERIC_ERROR_REPLY: &str = "I'm sorry, I encountered an error. Please try again later.";

const BREATHING_GUIDE: &str = "🌿 **4-7-8 Breathing Meditation**

*A gentle journey to inner calm*

1. 🧘 **Sit Comfortably**
   • Find a peaceful spot
   • Relax your shoulders
   • Soften your jaw

2. 🫁 **Exhale Completely**
   • Release all the air from your lungs
   • Let go of tension

3. 🌬️ **Inhale (4 counts)**
   • Breathe deeply through your nose
   • Feel your belly expand
   • Allow peace to enter

4. 🕊️ **Hold (7 counts)**
   • Pause gently
   • Notice the stillness
   • Feel centered

5. 🌊 **Exhale (8 counts)**
   • Slowly breathe out through your mouth
   • Make a soft \"whoosh\" sound
   • Release all stress

**Repeat 3-4 times**

💫 *After each cycle, notice how you feel*
Observe without judgment. You're cultivating inner peace.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub content: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum SendOutcome {
    Ignored,
    Replied { reply: ChatMessage },
}

pub type GenerateFuture<'a> = Pin<Box<dyn Future<Output = AppResult<Option<String>>> + Send + 'a>>;

/// Produces a reply for one user prompt. `Ok(None)` means the upstream
/// answered without usable text.
pub trait TextGenerator: Send + Sync {
    fn generate<'a>(&'a self, prompt: &'a str) -> GenerateFuture<'a>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<RequestContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    error: Option<UpstreamError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpstreamError {
    message: Option<String>,
}

/// Gemini `generateContent` client.
pub struct GeminiGenerator {
    client: Client,
    endpoint: String,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
    api_key: Option<String>,
}

impl GeminiGenerator {
    pub fn new(settings: &AppSettings, api_key: Option<String>) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.chat_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint: settings.chat_endpoint.trim_end_matches('/').to_string(),
            model: settings.chat_model.clone(),
            temperature: settings.chat_temperature,
            max_output_tokens: settings.chat_max_output_tokens,
            api_key: api_key.filter(|key| !key.is_empty()),
        })
    }

    fn request_body(&self, prompt: &str) -> GenerateRequest {
        GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart {
                    text: format!("{}{}", SYSTEM_INSTRUCTION, prompt),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        }
    }

    async fn call(&self, prompt: &str) -> AppResult<Option<String>> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::Upstream("no API key configured".to_string()))?;
        let url = format!("{}/models/{}:generateContent", self.endpoint, self.model);

        let response = self
            .client
            .post(&url)
            .query(&[("key", api_key)])
            .json(&self.request_body(prompt))
            .send()
            .await?;
        let status = response.status();
        let body: GenerateResponse = response.json().await?;
        tracing::debug!(status = status.as_u16(), model = %self.model, "chat completion received");
        extract_reply(body)
    }
}

impl TextGenerator for GeminiGenerator {
    fn generate<'a>(&'a self, prompt: &'a str) -> GenerateFuture<'a> {
        Box::pin(self.call(prompt))
    }
}

fn extract_reply(body: GenerateResponse) -> AppResult<Option<String>> {
    let text = body
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .and_then(|content| content.parts.into_iter().next())
        .and_then(|part| part.text)
        .filter(|text| !text.is_empty());
    if text.is_some() {
        return Ok(text);
    }
    if let Some(error) = body.error {
        return Err(AppError::Upstream(
            error.message.unwrap_or_else(|| "Unknown error".to_string()),
        ));
    }
    tracing::warn!("unexpected chat response structure");
    Ok(None)
}

/// Chat API key kept in the OS credential store.
#[derive(Default)]
pub struct ApiKeyVault {
    lock: tokio::sync::Mutex<()>,
}

impl ApiKeyVault {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry() -> AppResult<keyring::Entry> {
        keyring::Entry::new(KEYRING_SERVICE, KEYRING_ACCOUNT).map_err(|error| AppError::Io(error.to_string()))
    }

    pub async fn save(&self, key: &str) -> AppResult<BooleanResponse> {
        if key.trim().is_empty() {
            return Err(AppError::Validation("API key must not be empty".to_string()));
        }
        let _guard = self.lock.lock().await;
        Self::entry()?
            .set_password(key.trim())
            .map_err(|error| AppError::Io(error.to_string()))?;
        Ok(BooleanResponse { success: true })
    }

    pub async fn clear(&self) -> AppResult<BooleanResponse> {
        let _guard = self.lock.lock().await;
        match Self::entry()?.delete_credential() {
            Ok(_) | Err(keyring::Error::NoEntry) => Ok(BooleanResponse { success: true }),
            Err(error) => Err(AppError::Io(error.to_string())),
        }
    }

    pub async fn load(&self) -> AppResult<Option<String>> {
        let _guard = self.lock.lock().await;
        match Self::entry()?.get_password() {
            Ok(value) if !value.is_empty() => Ok(Some(value)),
            Ok(_) | Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(AppError::Io(error.to_string())),
        }
    }

    pub async fn has(&self) -> AppResult<BooleanResponse> {
        Ok(BooleanResponse {
            success: self.load().await?.is_some(),
        })
    }
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct ChatSession {
    generator: Mutex<Arc<dyn TextGenerator>>,
    clock: Arc<dyn Clock>,
    messages: Mutex<Vec<ChatMessage>>,
    in_flight: AtomicBool,
    quick_replies_visible: AtomicBool,
}

impl ChatSession {
    pub fn new(generator: Arc<dyn TextGenerator>, clock: Arc<dyn Clock>) -> Self {
        let greeting = ChatMessage {
            id: Uuid::new_v4().to_string(),
            content: GREETING.to_string(),
            sender: Sender::Bot,
            timestamp: clock.now(),
        };
        Self {
            generator: Mutex::new(generator),
            clock,
            messages: Mutex::new(vec![greeting]),
            in_flight: AtomicBool::new(false),
            quick_replies_visible: AtomicBool::new(true),
        }
    }

    /// Swaps the backend, e.g. after the API key or chat settings change.
    pub fn set_generator(&self, generator: Arc<dyn TextGenerator>) -> AppResult<()> {
        *self.generator.lock().map_err(|_| poisoned("chat generator"))? = generator;
        Ok(())
    }

    pub fn messages(&self) -> AppResult<Vec<ChatMessage>> {
        Ok(self.messages.lock().map_err(|_| poisoned("chat messages"))?.clone())
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Suggestions are offered until the first message is sent.
    pub fn quick_replies(&self) -> Vec<&'static str> {
        if self.quick_replies_visible.load(Ordering::SeqCst) {
            QUICK_REPLIES.to_vec()
        } else {
            Vec::new()
        }
    }

    pub async fn send(&self, text: &str) -> AppResult<SendOutcome> {
        if text.trim().is_empty() {
            return Ok(SendOutcome::Ignored);
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("chat submission ignored while a reply is pending");
            return Ok(SendOutcome::Ignored);
        }
        let _in_flight = InFlight(&self.in_flight);

        self.push(text.to_string(), Sender::User)?;
        self.quick_replies_visible.store(false, Ordering::SeqCst);

        let content = if text.to_lowercase().contains("breathing exercise") {
            BREATHING_GUIDE.to_string()
        } else {
            let generator = self.generator.lock().map_err(|_| poisoned("chat generator"))?.clone();
            match generator.generate(text).await {
                Ok(Some(reply)) => reply,
                Ok(None) => NO_RESPONSE_REPLY.to_string(),
                Err(AppError::Upstream(message)) => {
                    tracing::warn!(error = %message, "chat upstream error");
                    format!("I'm sorry, I encountered an error: {}. Please try again later.", message)
                }
                Err(error) => {
                    tracing::warn!(error = %error, "chat request failed");
                    GENERIC_ERROR_REPLY.to_string()
                }
            }
        };

        let reply = self.push(content, Sender::Bot)?;
        Ok(SendOutcome::Replied { reply })
    }

    fn push(&self, content: String, sender: Sender) -> AppResult<ChatMessage> {
        let message = ChatMessage {
            id: Uuid::new_v4().to_string(),
            content,
            sender,
            timestamp: self.clock.now(),
        };
        self.messages
            .lock()
            .map_err(|_| poisoned("chat messages"))?
            .push(message.clone());
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        extract_reply, ChatSession, GeminiGenerator, GenerateFuture, GenerateResponse, SendOutcome, Sender,
        TextGenerator, GREETING,
    };
    use crate::clock::SystemClock;
    use crate::errors::AppError;
    use crate::models::AppSettings;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::Semaphore;

    enum Script {
        Reply(&'static str),
        Empty,
        Upstream(&'static str),
        Network,
    }

    struct FakeGenerator {
        script: Script,
        gate: Option<Arc<Semaphore>>,
        calls: AtomicUsize,
    }

    impl FakeGenerator {
        fn new(script: Script) -> Self {
            Self {
                script,
                gate: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl TextGenerator for FakeGenerator {
        fn generate<'a>(&'a self, _prompt: &'a str) -> GenerateFuture<'a> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if let Some(gate) = &self.gate {
                    let _permit = gate.acquire().await.expect("gate open");
                }
                match self.script {
                    Script::Reply(text) => Ok(Some(text.to_string())),
                    Script::Empty => Ok(None),
                    Script::Upstream(message) => Err(AppError::Upstream(message.to_string())),
                    Script::Network => Err(AppError::Io("connection refused".to_string())),
                }
            })
        }
    }

    fn session(generator: FakeGenerator) -> ChatSession {
        ChatSession::new(Arc::new(generator), Arc::new(SystemClock))
    }

    fn reply_text(outcome: SendOutcome) -> String {
        match outcome {
            SendOutcome::Replied { reply } => {
                assert_eq!(reply.sender, Sender::Bot);
                reply.content
            }
            SendOutcome::Ignored => panic!("expected a reply"),
        }
    }

    #[tokio::test]
    async fn starts_with_greeting_and_quick_replies() {
        let chat = session(FakeGenerator::new(Script::Reply("ok")));
        let messages = chat.messages().expect("messages");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, GREETING);
        assert_eq!(chat.quick_replies().len(), 3);

        chat.send("hi").await.expect("send");
        assert!(chat.quick_replies().is_empty());
        assert_eq!(chat.messages().expect("messages").len(), 3);
    }

    #[tokio::test]
    async fn blank_input_is_ignored() {
        let chat = session(FakeGenerator::new(Script::Reply("ok")));
        assert_eq!(chat.send("   ").await.expect("send"), SendOutcome::Ignored);
        assert_eq!(chat.messages().expect("messages").len(), 1);
    }

    #[tokio::test]
    async fn breathing_request_is_answered_locally() {
        let generator = Arc::new(FakeGenerator::new(Script::Reply("remote")));
        let chat = ChatSession::new(generator.clone(), Arc::new(SystemClock));
        let text = reply_text(chat.send("Guide me through a Breathing Exercise").await.expect("send"));
        assert!(text.contains("4-7-8"));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failures_become_apologies() {
        let upstream = session(FakeGenerator::new(Script::Upstream("quota exceeded")));
        assert_eq!(
            reply_text(upstream.send("help").await.expect("send")),
            "I'm sorry, I encountered an error: quota exceeded. Please try again later."
        );

        let network = session(FakeGenerator::new(Script::Network));
        assert_eq!(
            reply_text(network.send("help").await.expect("send")),
            "I'm sorry, I encountered an error. Please try again later."
        );

        let empty = session(FakeGenerator::new(Script::Empty));
        assert!(reply_text(empty.send("help").await.expect("send")).contains("couldn't generate"));
        assert!(!empty.is_loading());
    }

    #[tokio::test]
    async fn second_submission_is_ignored_while_first_is_pending() {
        let gate = Arc::new(Semaphore::new(0));
        let mut generator = FakeGenerator::new(Script::Reply("take a slow breath"));
        generator.gate = Some(gate.clone());
        let chat = Arc::new(session(generator));

        let first = {
            let chat = chat.clone();
            tokio::spawn(async move { chat.send("I feel tense").await })
        };
        while !chat.is_loading() {
            tokio::task::yield_now().await;
        }

        assert_eq!(chat.send("hello?").await.expect("send"), SendOutcome::Ignored);
        gate.add_permits(1);
        let outcome = first.await.expect("join").expect("send");
        assert_eq!(reply_text(outcome), "take a slow breath");
        assert!(!chat.is_loading());
        assert_eq!(chat.messages().expect("messages").len(), 3);
    }

    #[test]
    fn request_body_carries_instruction_and_config() {
        let generator = GeminiGenerator::new(&AppSettings::default(), Some("k".to_string())).expect("client");
        let body = serde_json::to_value(generator.request_body("I can't sleep")).expect("json");
        let text = body["contents"][0]["parts"][0]["text"].as_str().expect("text");
        assert!(text.starts_with("You are a mindfulness assistant named MindfulBot."));
        assert!(text.ends_with("actionable: I can't sleep"));
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 800);
    }

    #[test]
    fn extracts_first_candidate_or_upstream_error() {
        let ok: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"Notice your breath."}]}}]}"#,
        )
        .expect("parse");
        assert_eq!(extract_reply(ok).expect("reply").as_deref(), Some("Notice your breath."));

        let failed: GenerateResponse =
            serde_json::from_str(r#"{"error":{"code":400,"message":"API key not valid"}}"#).expect("parse");
        match extract_reply(failed) {
            Err(AppError::Upstream(message)) => assert_eq!(message, "API key not valid"),
            other => panic!("unexpected {:?}", other),
        }

        let odd: GenerateResponse = serde_json::from_str(r#"{"candidates":[]}"#).expect("parse");
        assert!(extract_reply(odd).expect("reply").is_none());
    }

    #[tokio::test]
    async fn missing_api_key_is_an_upstream_error() {
        let generator = GeminiGenerator::new(&AppSettings::default(), None).expect("client");
        match generator.generate("hi").await {
            Err(AppError::Upstream(message)) => assert_eq!(message, "no API key configured"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
