//! Speech synthesis module for csv-to-speech.
//!
//! This module provides:
//! * [`SpeechRequest`] — pure request builder with the model-capability gate.
//! * [`SpeechSynthesizer`] — async trait implemented by all synthesis backends.
//! * [`ApiSynthesizer`] — OpenAI-compatible `/v1/audio/speech` client with the
//!   single stripped-instructions retry.
//! * [`SynthesizerFactory`] / [`ApiSynthesizerFactory`] — run-scoped client
//!   construction.
//! * [`OutputFormat`] — the `mp3 | opus | aac | flac` container formats.
//! * [`SynthesisError`] — error variants for synthesis operations.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use csv_to_speech::config::ApiConfig;
//! use csv_to_speech::speech::{ApiSynthesizer, OutputFormat, SpeechRequest, SpeechSynthesizer};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ApiConfig {
//!         api_key: "sk-…".into(),
//!         ..ApiConfig::default()
//!     };
//!     let synthesizer = ApiSynthesizer::from_config(&config).unwrap();
//!
//!     let request = SpeechRequest::build(
//!         "hello world",
//!         "nova",
//!         "tts-1-hd",
//!         OutputFormat::Mp3,
//!         None,
//!     );
//!     synthesizer
//!         .synthesize(&request, Path::new("hello_1.mp3"))
//!         .await
//!         .unwrap();
//! }
//! ```

pub mod client;
pub mod request;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use client::{
    ApiSynthesizer, ApiSynthesizerFactory, SpeechSynthesizer, SynthesisError, SynthesizerFactory,
};
pub use request::{
    supports_instructions, OutputFormat, SpeechRequest, UnknownFormat, INSTRUCTIONS_MODEL,
};

// test-only re-export so the batch runner test module can import the mock
// without `use csv_to_speech::speech::client::MockSynthesizer`.
#[cfg(test)]
pub use client::MockSynthesizer;
