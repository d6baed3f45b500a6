//! Client for the external text-inference capability.
//!
//! [`InferenceClient`] wraps an OpenAI-compatible chat-completions backend
//! behind a single `prompt → text` operation with fail-open semantics: every
//! failure mode yields an empty string, never an error. Backend-reported
//! failures (auth, quota, service errors) additionally trip a one-way circuit
//! breaker that disables the capability for the rest of the client's
//! lifetime; transport-level failures do not, so a flaky network cannot
//! permanently degrade a run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use contactscrub_shared::{ContactScrubError, InferenceSettings, Result};

/// Fixed system framing sent with every request.
const SYSTEM_PROMPT: &str = "You are a helpful assistant for CRM data cleaning.";

/// Deterministic-leaning generation, not greedy-pure.
const TEMPERATURE: f64 = 0.2;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Runtime configuration for [`InferenceClient`].
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// API key; `None` leaves the capability disabled from the start.
    pub api_key: Option<String>,
    /// Base URL of the chat-completions backend.
    pub base_url: String,
    /// Model identifier sent with each request.
    pub model: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl InferenceConfig {
    /// Build runtime config from the `[inference]` config section, resolving
    /// the API key from its environment variable.
    pub fn from_settings(settings: &InferenceSettings) -> Self {
        Self {
            api_key: settings.api_key(),
            base_url: settings.base_url.clone(),
            model: settings.model.clone(),
            timeout: Duration::from_secs(settings.timeout_secs),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Stateful wrapper around the external inference backend.
///
/// The `enabled` flag is atomic so one client may be shared across
/// concurrently running jobs; the transition is one-way, with no automatic
/// re-enable.
pub struct InferenceClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    enabled: AtomicBool,
}

impl InferenceClient {
    /// Create a client. The capability starts enabled iff an API key is
    /// configured.
    pub fn new(config: InferenceConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| {
                ContactScrubError::Inference(format!(
                    "invalid base URL '{}': {e}",
                    config.base_url
                ))
            })?
            .to_string();

        let mut headers = HeaderMap::new();
        let enabled = match &config.api_key {
            Some(key) => {
                let value = HeaderValue::from_str(&format!("Bearer {key}"))
                    .map_err(|e| ContactScrubError::Inference(format!("invalid API key: {e}")))?;
                headers.insert(AUTHORIZATION, value);
                true
            }
            None => {
                debug!("no API key configured; inference capability disabled");
                false
            }
        };

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                ContactScrubError::Inference(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            http,
            base_url,
            model: config.model,
            enabled: AtomicBool::new(enabled),
        })
    }

    /// Whether the capability is currently enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// One-way trip; subsequent [`infer`](Self::infer) calls short-circuit.
    fn disable(&self, reason: &str) {
        if self.enabled.swap(false, Ordering::SeqCst) {
            warn!(reason, "inference capability disabled for the rest of this run");
        }
    }

    /// Send one prompt to the backend and return its raw text response.
    ///
    /// Returns an empty string when the capability is disabled, the backend
    /// rejects the request, or anything else goes wrong. Never errors.
    pub async fn infer(&self, prompt: &str) -> String {
        if !self.is_enabled() {
            return String::new();
        }

        let url = format!(
            "{}/chat/completions",
            self.base_url.trim_end_matches('/')
        );
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: TEMPERATURE,
        };

        let response = match self.http.post(&url).json(&body).send().await {
            Ok(response) => response,
            Err(e) => {
                // Transport failures are not a verdict on the credentials or
                // quota, so the circuit stays closed.
                warn!(error = %e, "inference request failed");
                return String::new();
            }
        };

        let status = response.status();
        if !status.is_success() {
            self.disable(&format!("backend returned {status}"));
            return String::new();
        }

        match response.json::<ChatResponse>().await {
            Ok(parsed) => parsed
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.message.content)
                .map(|content| content.trim().to_string())
                .unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "invalid inference response");
                String::new()
            }
        }
    }
}
