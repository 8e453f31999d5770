//! Classification of provider failures.
//!
//! The rules are a plain table so they can be tuned from the config file
//! instead of living in string checks scattered through the call loop.
//! Throttle rules win over model-availability rules; failures without an
//! HTTP status (connection, DNS, TLS) are always fatal.
use super::provider::ProviderError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a failed call means for the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Capacity problem: back off and retry the same model.
    Throttled,
    /// The model will not answer: move to the next candidate.
    ModelUnavailable,
    /// Anything else: stop the run.
    Fatal,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Throttled => write!(f, "throttled"),
            Self::ModelUnavailable => write!(f, "model_unavailable"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ErrorPolicy {
    pub throttle_statuses: Vec<u16>,
    /// Compared case-insensitively against the provider error code.
    pub throttle_codes: Vec<String>,
    pub model_unavailable_statuses: Vec<u16>,
    pub model_unavailable_codes: Vec<String>,
    /// Substrings of the error message, lowercase.
    pub model_unavailable_phrases: Vec<String>,
}

impl Default for ErrorPolicy {
    fn default() -> Self {
        Self {
            throttle_statuses: vec![429],
            throttle_codes: strings(&["RESOURCE_EXHAUSTED", "rate_limit_exceeded"]),
            model_unavailable_statuses: vec![400, 404],
            model_unavailable_codes: strings(&["model_not_found", "NOT_FOUND"]),
            model_unavailable_phrases: strings(&[
                "does not exist",
                "invalid model",
                "not found",
                "not available",
                "unsupported model",
            ]),
        }
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

impl ErrorPolicy {
    pub fn classify(&self, error: &ProviderError) -> FailureClass {
        let Some(status) = error.status else {
            return FailureClass::Fatal;
        };
        let code = error.code.as_deref();
        if self.throttle_statuses.contains(&status) || matches_code(&self.throttle_codes, code) {
            return FailureClass::Throttled;
        }
        if self.model_unavailable_statuses.contains(&status)
            || matches_code(&self.model_unavailable_codes, code)
        {
            return FailureClass::ModelUnavailable;
        }
        let message = error.message.to_lowercase();
        if self
            .model_unavailable_phrases
            .iter()
            .any(|phrase| message.contains(&phrase.to_lowercase()))
        {
            return FailureClass::ModelUnavailable;
        }
        FailureClass::Fatal
    }
}

fn matches_code(codes: &[String], code: Option<&str>) -> bool {
    code.is_some_and(|code| codes.iter().any(|candidate| candidate.eq_ignore_ascii_case(code)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16, code: Option<&str>, message: &str) -> ProviderError {
        ProviderError {
            status: Some(status),
            code: code.map(str::to_string),
            message: message.to_string(),
        }
    }

    #[test]
    fn rate_limits_are_throttled() {
        let policy = ErrorPolicy::default();
        assert_eq!(
            policy.classify(&http(429, None, "slow down")),
            FailureClass::Throttled
        );
        // Code wins even when a proxy rewrites the status.
        assert_eq!(
            policy.classify(&http(503, Some("resource_exhausted"), "quota")),
            FailureClass::Throttled
        );
    }

    #[test]
    fn throttle_beats_model_phrases() {
        let policy = ErrorPolicy::default();
        assert_eq!(
            policy.classify(&http(429, None, "model not available right now")),
            FailureClass::Throttled
        );
    }

    #[test]
    fn missing_models_fall_back() {
        let policy = ErrorPolicy::default();
        assert_eq!(
            policy.classify(&http(404, Some("model_not_found"), "The model does not exist")),
            FailureClass::ModelUnavailable
        );
        assert_eq!(
            policy.classify(&http(400, None, "bad request")),
            FailureClass::ModelUnavailable
        );
        assert_eq!(
            policy.classify(&http(403, None, "Model gpt-x is Not Available in your region")),
            FailureClass::ModelUnavailable
        );
    }

    #[test]
    fn auth_and_transport_failures_are_fatal() {
        let policy = ErrorPolicy::default();
        assert_eq!(
            policy.classify(&http(401, Some("invalid_api_key"), "Incorrect API key provided")),
            FailureClass::Fatal
        );
        assert_eq!(
            policy.classify(&ProviderError::transport("connection refused")),
            FailureClass::Fatal
        );
    }

    #[test]
    fn policy_table_is_configurable() {
        let text = r#"{"model_unavailable_statuses": [], "model_unavailable_phrases": []}"#;
        let policy: ErrorPolicy = serde_json::from_str(text).unwrap();
        assert_eq!(policy.throttle_statuses, vec![429]);
        assert_eq!(
            policy.classify(&http(404, None, "not found")),
            FailureClass::Fatal
        );
        assert_eq!(
            policy.classify(&http(404, Some("NOT_FOUND"), "gone")),
            FailureClass::ModelUnavailable
        );
    }
}
