//! Cross-platform application paths using the `dirs` crate.
//!
//! Layout:
//!
//! Config dir (settings):
//!   Windows: %APPDATA%\csv-to-speech\
//!   macOS:   ~/Library/Application Support/csv-to-speech/
//!   Linux:   ~/.config/csv-to-speech/
//!
//! Data dir (preview temp files):
//!   Windows: %LOCALAPPDATA%\csv-to-speech\
//!   macOS:   ~/Library/Application Support/csv-to-speech/
//!   Linux:   ~/.local/share/csv-to-speech/

use std::path::PathBuf;

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for `settings.toml`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Directory for generated preview audio files.
    pub temp_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "csv-to-speech";

    /// Resolves all paths using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path (should be extremely rare in practice).
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let settings_file = config_dir.join("settings.toml");
        let temp_dir = data_dir.join("temp");

        Self {
            config_dir,
            settings_file,
            temp_dir,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
