//! csv-to-speech — batch text-to-speech over CSV columns.
//!
//! Reads a selected column from delimited-text files and synthesizes one
//! audio file per non-empty cell through an OpenAI-compatible
//! `/v1/audio/speech` endpoint, strictly one request in flight at a time.
//!
//! # Modules
//!
//! * [`config`] — settings structs, TOML persistence, platform paths.
//! * [`source`] — row extraction and CSV inspection.
//! * [`speech`] — request builder, synthesis client, retry rule.
//! * [`batch`] — the batch/preview execution core: worker task, progress
//!   events, cooperative cancellation.
//! * [`export`] — copy produced files to a destination directory.

pub mod batch;
pub mod config;
pub mod export;
pub mod source;
pub mod speech;
