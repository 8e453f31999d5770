//! Annotation providers: one request in, the model's reply text out.
//!
//! Both wire protocols share the same capability trait so the retry and
//! fallback loop is written once. HTTP status failures come back as values
//! with the provider's error envelope decoded, which is what the error policy
//! classifies.
use crate::config::{ProviderConfig, ProviderKind};
use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use std::env;
use std::fmt;
use std::time::Duration;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const OPENAI_KEY_VARS: &[&str] = &["OPENAI_API_KEY"];
const GEMINI_KEY_VARS: &[&str] = &["GOOGLE_API_KEY", "GEMINI_API_KEY"];
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// A failed provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    /// HTTP status; `None` when no response arrived.
    pub status: Option<u16>,
    /// Provider error code (`rate_limit_exceeded`, `RESOURCE_EXHAUSTED`, ...).
    pub code: Option<String>,
    pub message: String,
}

impl ProviderError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            code: None,
            message: message.into(),
        }
    }

    /// Decode an error envelope of either provider shape:
    /// `{"error": {"message", "code"}}` or `{"error": {"code", "message", "status"}}`.
    pub fn from_http(status: u16, body: &str) -> Self {
        let envelope = serde_json::from_str::<Value>(body).ok();
        let error = envelope.as_ref().and_then(|value| value.get("error"));
        let message = error
            .and_then(|error| error.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| body.trim().to_string());
        let code = error.and_then(|error| {
            ["code", "status", "type"]
                .iter()
                .filter_map(|key| error.get(*key))
                .find_map(|value| value.as_str().map(str::to_string))
        });
        Self {
            status: Some(status),
            code,
            message,
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.status, self.code.as_deref()) {
            (Some(status), Some(code)) => write!(f, "HTTP {status} ({code}): {}", self.message),
            (Some(status), None) => write!(f, "HTTP {status}: {}", self.message),
            (None, _) => write!(f, "transport error: {}", self.message),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Capability shared by every LM backend.
pub trait AnnotationProvider {
    fn id(&self) -> &str;

    /// Send `prompt` to `model` and return the reply text.
    fn complete(&self, model: &str, prompt: &str) -> Result<String, ProviderError>;
}

/// Build the provider for `id`, failing when its credential is unset.
pub fn build_provider(id: &str, config: &ProviderConfig) -> Result<Box<dyn AnnotationProvider>> {
    let agent = http_agent();
    match config.kind {
        ProviderKind::Openai => Ok(Box::new(OpenAiProvider {
            id: id.to_string(),
            base_url: trimmed_base(config.base_url.as_deref(), OPENAI_BASE_URL),
            api_key: api_key(OPENAI_KEY_VARS)?,
            agent,
        })),
        ProviderKind::Gemini => Ok(Box::new(GeminiProvider {
            id: id.to_string(),
            base_url: trimmed_base(config.base_url.as_deref(), GEMINI_BASE_URL),
            api_key: api_key(GEMINI_KEY_VARS)?,
            agent,
        })),
    }
}

fn api_key(vars: &[&str]) -> Result<String> {
    vars.iter()
        .filter_map(|var| env::var(var).ok())
        .find(|value| !value.trim().is_empty())
        .ok_or_else(|| anyhow!("{} not set; export it in the environment", vars.join(" or ")))
}

fn trimmed_base(configured: Option<&str>, default: &str) -> String {
    configured.unwrap_or(default).trim_end_matches('/').to_string()
}

fn http_agent() -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .http_status_as_error(false)
        .timeout_global(Some(REQUEST_TIMEOUT))
        .build();
    config.into()
}

fn post_json(
    agent: &ureq::Agent,
    url: &str,
    headers: &[(&str, &str)],
    body: &Value,
) -> Result<Value, ProviderError> {
    let mut request = agent.post(url);
    for (name, value) in headers {
        request = request.header(*name, *value);
    }
    let mut response = request
        .send_json(body)
        .map_err(|err| ProviderError::transport(err.to_string()))?;
    let status = response.status().as_u16();
    let text = response
        .body_mut()
        .read_to_string()
        .map_err(|err| ProviderError::transport(format!("read response body: {err}")))?;
    if !(200..300).contains(&status) {
        return Err(ProviderError::from_http(status, &text));
    }
    serde_json::from_str(&text).map_err(|err| ProviderError {
        status: Some(status),
        code: None,
        message: format!("decode response envelope: {err}"),
    })
}

pub struct OpenAiProvider {
    id: String,
    base_url: String,
    api_key: String,
    agent: ureq::Agent,
}

impl AnnotationProvider for OpenAiProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn complete(&self, model: &str, prompt: &str) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let authorization = format!("Bearer {}", self.api_key);
        let body = json!({
            "model": model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": 0,
        });
        let headers = [("Authorization", authorization.as_str())];
        let envelope = post_json(&self.agent, &url, &headers, &body)?;
        Ok(openai_reply_text(&envelope))
    }
}

/// `choices[0].message.content`; an empty reply when absent so it is handled
/// like any other unparseable answer.
fn openai_reply_text(envelope: &Value) -> String {
    envelope
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

pub struct GeminiProvider {
    id: String,
    base_url: String,
    api_key: String,
    agent: ureq::Agent,
}

impl AnnotationProvider for GeminiProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn complete(&self, model: &str, prompt: &str) -> Result<String, ProviderError> {
        let url = format!("{}/models/{model}:generateContent", self.base_url);
        let body = json!({
            "contents": [{"parts": [{"text": prompt}]}],
        });
        let headers = [("x-goog-api-key", self.api_key.as_str())];
        let envelope = post_json(&self.agent, &url, &headers, &body)?;
        Ok(gemini_reply_text(&envelope))
    }
}

/// Concatenated text parts of the first candidate.
fn gemini_reply_text(envelope: &Value) -> String {
    envelope
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect::<String>()
        })
        .unwrap_or_default()
}
