//! Resilient call layer: one batched request per provider with same-model
//! backoff and cross-model fallback.
//!
//! # Retry Tiers
//!
//! Candidates are the primary model followed by the configured fallbacks
//! (duplicates removed, order kept). Each candidate gets up to
//! `retry.max_attempts` attempts:
//!
//! 1. **Malformed reply**: back off `base * 2^attempt` and ask again; once the
//!    budget is spent the batch resolves to "no meanings found" on that model.
//! 2. **Throttled**: back off and retry the same model; when the budget is
//!    spent, move to the next candidate.
//! 3. **Model unavailable**: move to the next candidate immediately.
//! 4. **Anything else**: fail the run.
//!
//! Every decision goes through [`decide`], which has no I/O, so the policy can
//! be exercised without a network.
use super::policy::{ErrorPolicy, FailureClass};
use super::prompt::render_prompt;
use super::provider::{AnnotationProvider, ProviderError};
use super::response::{parse_reply, ParsedReply};
use crate::config::RetryPolicy;
use anyhow::{anyhow, Result};
use std::thread;
use std::time::Duration;

/// Result of a single request to a single model.
#[derive(Debug)]
pub enum AttemptOutcome {
    Parsed(ParsedReply),
    Malformed(String),
    Failed(ProviderError),
}

#[derive(Debug, PartialEq)]
pub enum RetryCause {
    Malformed(String),
    Throttled(ProviderError),
}

/// What the loop does after an attempt.
#[derive(Debug, PartialEq)]
pub enum Step {
    Done(ParsedReply),
    /// Parse budget spent: resolve the batch with no meanings.
    GiveUpEmpty(String),
    Retry { delay: Duration, cause: RetryCause },
    NextModel(ProviderError),
    Abort(ProviderError),
}

/// Map an attempt outcome to the next step. `attempt` is 0-based.
pub fn decide(
    outcome: AttemptOutcome,
    attempt: u32,
    retry: &RetryPolicy,
    policy: &ErrorPolicy,
) -> Step {
    let attempts_left = attempt + 1 < retry.max_attempts;
    match outcome {
        AttemptOutcome::Parsed(reply) => Step::Done(reply),
        AttemptOutcome::Malformed(reason) if attempts_left => Step::Retry {
            delay: retry.delay_for(attempt),
            cause: RetryCause::Malformed(reason),
        },
        AttemptOutcome::Malformed(reason) => Step::GiveUpEmpty(reason),
        AttemptOutcome::Failed(error) => match policy.classify(&error) {
            FailureClass::Throttled if attempts_left => Step::Retry {
                delay: retry.delay_for(attempt),
                cause: RetryCause::Throttled(error),
            },
            FailureClass::Throttled | FailureClass::ModelUnavailable => Step::NextModel(error),
            FailureClass::Fatal => Step::Abort(error),
        },
    }
}

/// `[primary] + fallbacks`, first occurrence of each model kept.
pub fn candidate_models(primary: &str, fallbacks: &[String]) -> Vec<String> {
    let mut models = vec![primary.to_string()];
    for model in fallbacks {
        if !models.contains(model) {
            models.push(model.clone());
        }
    }
    models
}

#[derive(Debug)]
pub struct CallResult {
    pub annotations: ParsedReply,
    /// Model that produced the reply (or the last one asked when degraded).
    pub model: String,
    /// Requests sent across all candidates.
    pub attempts: u32,
    /// True when the reply never parsed and the batch resolved empty.
    pub degraded: bool,
}

pub struct CallLayer<'a> {
    provider: &'a dyn AnnotationProvider,
    retry: RetryPolicy,
    policy: &'a ErrorPolicy,
}

impl<'a> CallLayer<'a> {
    pub fn new(
        provider: &'a dyn AnnotationProvider,
        retry: RetryPolicy,
        policy: &'a ErrorPolicy,
    ) -> Self {
        Self {
            provider,
            retry,
            policy,
        }
    }

    /// Annotate `codes` with `model`, falling back through `fallbacks`.
    pub fn call(
        &self,
        codes: &[String],
        model: &str,
        fallbacks: &[String],
        template: &str,
    ) -> Result<CallResult> {
        let provider_id = self.provider.id();
        let prompt = render_prompt(template, codes);
        let candidates = candidate_models(model, fallbacks);
        let mut attempts = 0;
        let mut last_error: Option<ProviderError> = None;

        for candidate in &candidates {
            for attempt in 0..self.retry.max_attempts {
                attempts += 1;
                let outcome = self.attempt(candidate, &prompt);
                match decide(outcome, attempt, &self.retry, self.policy) {
                    Step::Done(annotations) => {
                        return Ok(CallResult {
                            annotations,
                            model: candidate.clone(),
                            attempts,
                            degraded: false,
                        });
                    }
                    Step::GiveUpEmpty(reason) => {
                        tracing::warn!(
                            provider = provider_id,
                            model = candidate.as_str(),
                            first_codes = %preview(codes),
                            %reason,
                            "could not parse reply JSON; recording no meanings for batch"
                        );
                        return Ok(CallResult {
                            annotations: ParsedReply::new(),
                            model: candidate.clone(),
                            attempts,
                            degraded: true,
                        });
                    }
                    Step::Retry { delay, cause } => {
                        let delay_ms = delay.as_millis() as u64;
                        match cause {
                            RetryCause::Throttled(error) => {
                                tracing::warn!(
                                    provider = provider_id,
                                    model = candidate.as_str(),
                                    attempt = attempt + 1,
                                    delay_ms,
                                    %error,
                                    "rate limited, backing off"
                                );
                                last_error = Some(error);
                            }
                            RetryCause::Malformed(reason) => tracing::warn!(
                                provider = provider_id,
                                model = candidate.as_str(),
                                attempt = attempt + 1,
                                delay_ms,
                                %reason,
                                "malformed reply, retrying"
                            ),
                        }
                        thread::sleep(delay);
                    }
                    Step::NextModel(error) => {
                        tracing::warn!(
                            provider = provider_id,
                            model = candidate.as_str(),
                            %error,
                            "model failed, trying fallback"
                        );
                        last_error = Some(error);
                        break;
                    }
                    Step::Abort(error) => {
                        return Err(anyhow::Error::new(error).context(format!(
                            "{provider_id} request to model {candidate} failed"
                        )));
                    }
                }
            }
        }

        Err(anyhow!(
            "all {provider_id} models failed ({}); last error: {}",
            candidates.join(", "),
            last_error
                .map(|error| error.to_string())
                .unwrap_or_else(|| "none".to_string())
        ))
    }

    fn attempt(&self, model: &str, prompt: &str) -> AttemptOutcome {
        match self.provider.complete(model, prompt) {
            Ok(text) => match parse_reply(&text) {
                Ok(reply) => AttemptOutcome::Parsed(reply),
                Err(err) => AttemptOutcome::Malformed(format!("{err:#}")),
            },
            Err(error) => AttemptOutcome::Failed(error),
        }
    }
}

fn preview(codes: &[String]) -> String {
    codes
        .iter()
        .take(3)
        .cloned()
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
#[path = "call_tests.rs"]
mod tests;
