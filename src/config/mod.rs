//! Configuration module for csv-to-speech.
//!
//! Provides `AppConfig` (top-level settings), sub-configs for the remote API
//! and synthesis defaults, `AppPaths` for cross-platform data directories,
//! and TOML persistence via `AppConfig::load` / `AppConfig::save`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{ApiConfig, AppConfig, TtsConfig, MODELS, VOICES};
