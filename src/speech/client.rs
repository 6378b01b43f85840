//! Core `SpeechSynthesizer` trait and `ApiSynthesizer` implementation.
//!
//! `ApiSynthesizer` calls any OpenAI-compatible `/v1/audio/speech` endpoint
//! and streams the returned audio bytes straight to a destination file.
//! All connection details come from [`ApiConfig`]; nothing is hardcoded.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::config::ApiConfig;
use crate::speech::request::SpeechRequest;

// ---------------------------------------------------------------------------
// SynthesisError
// ---------------------------------------------------------------------------

/// Errors that can occur while synthesizing one row of text.
#[derive(Debug, Error)]
pub enum SynthesisError {
    /// HTTP transport or connection error.
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// The request did not complete within the configured timeout.
    #[error("synthesis request timed out")]
    Timeout,

    /// The remote API returned a non-success status.
    #[error("API rejected the request (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// The audio stream could not be written to disk.
    #[error("could not write audio to {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No API key is configured; the client cannot be constructed.
    #[error("no API key configured — run `csv-to-speech config` to see where settings live")]
    Credentials,
}

impl From<reqwest::Error> for SynthesisError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SynthesisError::Timeout
        } else {
            SynthesisError::Request(e.to_string())
        }
    }
}

impl SynthesisError {
    /// Returns `true` when this error is the remote API rejecting the
    /// `instructions` parameter as unrecognized — the one failure mode the
    /// client retries (once, with the parameter stripped) and the batch
    /// runner reports with a distinct diagnostic.
    pub fn is_instructions_rejection(&self) -> bool {
        match self {
            SynthesisError::Api { status, message } if *status < 500 => {
                let msg = message.to_ascii_lowercase();
                msg.contains("instructions")
                    && (msg.contains("unknown")
                        || msg.contains("unrecognized")
                        || msg.contains("unexpected"))
            }
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// SpeechSynthesizer trait
// ---------------------------------------------------------------------------

/// Async trait for one-shot speech synthesis.
///
/// Implementors must be `Send + Sync` so they can be shared across tasks
/// (e.g. wrapped in `Arc<dyn SpeechSynthesizer>`).
///
/// One call performs at most two network attempts (see the retry rule on
/// [`ApiSynthesizer`]) and leaves the synthesized audio at `dest` on success.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, request: &SpeechRequest, dest: &Path) -> Result<(), SynthesisError>;
}

/// Constructs a synthesizer at the start of a run.
///
/// A construction failure aborts that run with no partial results; it is
/// reported through the run's own error path, never as a panic.
pub trait SynthesizerFactory: Send + Sync {
    fn create(&self) -> Result<Arc<dyn SpeechSynthesizer>, SynthesisError>;
}

// ---------------------------------------------------------------------------
// ApiSynthesizer
// ---------------------------------------------------------------------------

/// Calls an OpenAI-compatible `/v1/audio/speech` endpoint.
///
/// # Retry rule
///
/// When a request carrying `instructions` fails because the API does not
/// recognize that parameter, the call is retried exactly once with the
/// parameter stripped.  Every other failure — including a timeout —
/// propagates after a single attempt.
pub struct ApiSynthesizer {
    client: reqwest::Client,
    config: ApiConfig,
}

impl ApiSynthesizer {
    /// Build an `ApiSynthesizer` from application config.
    ///
    /// Fails with [`SynthesisError::Credentials`] when no API key is set.
    /// The HTTP client is pre-configured with the per-request timeout from
    /// `config.timeout_ms`.
    pub fn from_config(config: &ApiConfig) -> Result<Self, SynthesisError> {
        if config.api_key.trim().is_empty() {
            return Err(SynthesisError::Credentials);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| SynthesisError::Request(e.to_string()))?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// One network attempt: POST the request, stream the body to `dest`.
    async fn attempt(&self, request: &SpeechRequest, dest: &Path) -> Result<(), SynthesisError> {
        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SynthesisError::Api {
                status: status.as_u16(),
                message: api_error_message(&body),
            });
        }

        let io_err = |source| SynthesisError::Io {
            path: dest.to_path_buf(),
            source,
        };

        let mut file = tokio::fs::File::create(dest).await.map_err(io_err)?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await.map_err(io_err)?;
        }
        file.flush().await.map_err(io_err)?;

        Ok(())
    }
}

#[async_trait]
impl SpeechSynthesizer for ApiSynthesizer {
    async fn synthesize(&self, request: &SpeechRequest, dest: &Path) -> Result<(), SynthesisError> {
        match self.attempt(request, dest).await {
            Err(e) if should_retry_without_instructions(request, &e) => {
                log::warn!(
                    "model '{}' rejected the instructions parameter; retrying without it",
                    request.model
                );
                self.attempt(&request.without_instructions(), dest).await
            }
            other => other,
        }
    }
}

/// The retry decision: only a request that actually carried instructions,
/// failing with the instructions-rejection signature, earns the single
/// stripped retry.
fn should_retry_without_instructions(request: &SpeechRequest, error: &SynthesisError) -> bool {
    request.instructions.is_some() && error.is_instructions_rejection()
}

/// Extract the human-readable message from an API error body, falling back
/// to the raw body when it is not the expected JSON shape.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| body.trim().to_string())
}

// ---------------------------------------------------------------------------
// ApiSynthesizerFactory
// ---------------------------------------------------------------------------

/// Factory that builds an [`ApiSynthesizer`] per run from a config snapshot.
pub struct ApiSynthesizerFactory {
    config: ApiConfig,
}

impl ApiSynthesizerFactory {
    pub fn new(config: ApiConfig) -> Self {
        Self { config }
    }
}

impl SynthesizerFactory for ApiSynthesizerFactory {
    fn create(&self) -> Result<Arc<dyn SpeechSynthesizer>, SynthesisError> {
        Ok(Arc::new(ApiSynthesizer::from_config(&self.config)?))
    }
}

// ---------------------------------------------------------------------------
// MockSynthesizer  (test-only)
// ---------------------------------------------------------------------------

/// A test double that records every request and replays scripted outcomes
/// without touching the network or the filesystem.
#[cfg(test)]
pub struct MockSynthesizer {
    script: std::sync::Mutex<std::collections::VecDeque<Result<(), SynthesisError>>>,
    calls: std::sync::Mutex<Vec<(SpeechRequest, PathBuf)>>,
    delay: Duration,
    call_hook: Option<Box<dyn Fn(usize) + Send + Sync>>,
}

#[cfg(test)]
impl MockSynthesizer {
    /// A mock whose every call succeeds.
    pub fn ok() -> Self {
        Self::with_script(Vec::new())
    }

    /// A mock that replays `outcomes` call by call, then succeeds.
    pub fn with_script(outcomes: Vec<Result<(), SynthesisError>>) -> Self {
        Self {
            script: std::sync::Mutex::new(outcomes.into()),
            calls: std::sync::Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            call_hook: None,
        }
    }

    /// Sleep this long inside every call (for in-flight cancellation tests).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Invoke `hook` with the 1-based call count after each call completes.
    pub fn with_call_hook(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.call_hook = Some(Box::new(hook));
        self
    }

    pub fn calls(&self) -> Vec<(SpeechRequest, PathBuf)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[cfg(test)]
#[async_trait]
impl SpeechSynthesizer for MockSynthesizer {
    async fn synthesize(&self, request: &SpeechRequest, dest: &Path) -> Result<(), SynthesisError> {
        let count = {
            let mut calls = self.calls.lock().unwrap();
            calls.push((request.clone(), dest.to_path_buf()));
            calls.len()
        };

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let outcome = self.script.lock().unwrap().pop_front().unwrap_or(Ok(()));

        if let Some(hook) = &self.call_hook {
            hook(count);
        }

        outcome
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
