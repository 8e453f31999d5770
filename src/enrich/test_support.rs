//! Fake providers for exercising the call loop and orchestrator offline.
use super::provider::{AnnotationProvider, ProviderError};
use crate::config::RetryPolicy;
use serde_json::{json, Map, Value};
use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};

pub type Reply = Result<String, ProviderError>;

/// Template whose rendered form [`EchoProvider`] can read back.
pub const ECHO_TEMPLATE: &str = "Codes: {codes}";

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 5,
        base_delay_ms: 0,
    }
}

pub fn not_found(model: &str) -> ProviderError {
    ProviderError {
        status: Some(404),
        code: Some("model_not_found".to_string()),
        message: format!("The model `{model}` does not exist"),
    }
}

pub fn throttled() -> ProviderError {
    ProviderError {
        status: Some(429),
        code: Some("rate_limit_exceeded".to_string()),
        message: "Rate limit reached".to_string(),
    }
}

pub fn unauthorized() -> ProviderError {
    ProviderError {
        status: Some(401),
        code: Some("invalid_api_key".to_string()),
        message: "Incorrect API key provided".to_string(),
    }
}

/// Replays queued replies per model; an empty queue answers "model not found".
#[derive(Default)]
pub struct ScriptedProvider {
    replies: RefCell<BTreeMap<String, VecDeque<Reply>>>,
    calls: RefCell<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, model: &str, text: &str) -> Self {
        self.push(model, Ok(text.to_string()));
        self
    }

    pub fn fail(self, model: &str, error: ProviderError) -> Self {
        self.push(model, Err(error));
        self
    }

    pub fn push(&self, model: &str, reply: Reply) {
        self.replies
            .borrow_mut()
            .entry(model.to_string())
            .or_default()
            .push_back(reply);
    }

    /// Models asked, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn calls_to(&self, model: &str) -> usize {
        self.calls.borrow().iter().filter(|m| *m == model).count()
    }
}

impl AnnotationProvider for ScriptedProvider {
    fn id(&self) -> &str {
        "scripted"
    }

    fn complete(&self, model: &str, _prompt: &str) -> Result<String, ProviderError> {
        self.calls.borrow_mut().push(model.to_string());
        self.replies
            .borrow_mut()
            .get_mut(model)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Err(not_found(model)))
    }
}

/// Answers every code of a prompt rendered from [`ECHO_TEMPLATE`] with the
/// lowercased code as its word, and records each batch.
#[derive(Default)]
pub struct EchoProvider {
    batches: RefCell<Vec<Vec<String>>>,
}

impl EchoProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.borrow().clone()
    }

    pub fn queried_codes(&self) -> Vec<String> {
        self.batches.borrow().iter().flatten().cloned().collect()
    }
}

impl AnnotationProvider for EchoProvider {
    fn id(&self) -> &str {
        "echo"
    }

    fn complete(&self, _model: &str, prompt: &str) -> Result<String, ProviderError> {
        let codes: Vec<String> = prompt
            .trim_start_matches("Codes: ")
            .split(", ")
            .map(str::to_string)
            .collect();
        let mut reply = Map::new();
        for code in &codes {
            let meaning = format!("test: {code} meaning");
            reply.insert(
                code.clone(),
                json!({"word": code.to_lowercase(), "abbreviations": [meaning]}),
            );
        }
        self.batches.borrow_mut().push(codes);
        Ok(Value::Object(reply).to_string())
    }
}
