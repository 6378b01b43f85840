//! Batch execution module for csv-to-speech.
//!
//! This module wires the worklist → row extraction → synthesis loop and
//! exposes the notification channel contract the caller consumes.
//!
//! # Architecture
//!
//! ```text
//! BatchProcessor::start_batch(jobs)        ← caller context
//!        │  (cancels + joins any live run first)
//!        ▼
//! BatchRunner::run()                       ← dedicated tokio task
//!        │  per job:   extract_rows()
//!        │  per row:   SpeechRequest::build() → SpeechSynthesizer::synthesize()
//!        │             fixed inter-row delay
//!        ▼
//! mpsc::Sender<BatchEvent>  ──▶  Progress / Error / Completed / Cancelled
//!
//! CancelToken ← set by caller, observed between jobs and between rows
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::path::PathBuf;
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//! use csv_to_speech::batch::{BatchEvent, BatchProcessor, Job};
//! use csv_to_speech::config::AppConfig;
//! use csv_to_speech::speech::{ApiSynthesizerFactory, OutputFormat};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::load().unwrap();
//!     let (events_tx, mut events_rx) = mpsc::channel(32);
//!
//!     let factory = Arc::new(ApiSynthesizerFactory::new(config.api.clone()));
//!     let mut processor = BatchProcessor::new(factory, events_tx);
//!
//!     processor
//!         .start_batch(vec![Job {
//!             source_path: PathBuf::from("data.csv"),
//!             column_index: 0,
//!             voice: config.tts.default_voice.clone(),
//!             model: config.tts.default_model.clone(),
//!             instructions: None,
//!             output_dir: PathBuf::from("out"),
//!             format: OutputFormat::Mp3,
//!         }])
//!         .await;
//!
//!     while let Some(event) = events_rx.recv().await {
//!         if let BatchEvent::Completed { results } = event {
//!             println!("{} file(s) produced", results.len());
//!             break;
//!         }
//!     }
//! }
//! ```

pub mod job;
pub mod runner;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use job::{Job, ResultRecord};
pub use runner::{
    BatchEvent, BatchProcessor, BatchRunner, PreviewRequest, RunHandle, ROW_DELAY,
};
pub use state::{new_shared_phase, CancelToken, RunPhase, SharedPhase};
