//! Speech request construction and the model-capability gate.
//!
//! [`SpeechRequest::build`] is a pure function: it assembles the parameter
//! set for one synthesis call and decides whether the optional style
//! instructions are sent at all.  Only [`INSTRUCTIONS_MODEL`] understands the
//! `instructions` parameter; for every other model the field is omitted from
//! the serialized body entirely.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The only model that accepts the `instructions` parameter.
pub const INSTRUCTIONS_MODEL: &str = "gpt-4o-mini-tts";

/// Returns `true` when `model` accepts voice style instructions.
pub fn supports_instructions(model: &str) -> bool {
    model == INSTRUCTIONS_MODEL
}

// ---------------------------------------------------------------------------
// OutputFormat
// ---------------------------------------------------------------------------

/// Audio container format requested from the synthesis endpoint.
///
/// Doubles as the produced file's extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Mp3,
    Opus,
    Aac,
    Flac,
}

impl OutputFormat {
    /// File extension (without the dot) for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Mp3 => "mp3",
            OutputFormat::Opus => "opus",
            OutputFormat::Aac => "aac",
            OutputFormat::Flac => "flac",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Error returned when parsing an unknown format name.
#[derive(Debug, Clone, Error)]
#[error("unknown output format '{0}' (expected mp3, opus, aac or flac)")]
pub struct UnknownFormat(String);

impl FromStr for OutputFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mp3" => Ok(OutputFormat::Mp3),
            "opus" => Ok(OutputFormat::Opus),
            "aac" => Ok(OutputFormat::Aac),
            "flac" => Ok(OutputFormat::Flac),
            other => Err(UnknownFormat(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// SpeechRequest
// ---------------------------------------------------------------------------

/// Parameter set for one synthesis call, serialized as the request body.
///
/// `instructions` is `None` unless the model supports it — callers may pass
/// instructions for any model and the builder silently drops them when
/// unsupported.  The field is skipped during serialization when absent, never
/// sent as an empty string.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeechRequest {
    pub model: String,
    pub voice: String,
    pub input: String,
    pub response_format: OutputFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

impl SpeechRequest {
    /// Assemble the parameters for one synthesis call.
    ///
    /// Style instructions are included iff `model` is [`INSTRUCTIONS_MODEL`]
    /// and the instructions are non-empty after trimming.  This is a
    /// capability gate, not validation.
    pub fn build(
        text: &str,
        voice: &str,
        model: &str,
        format: OutputFormat,
        instructions: Option<&str>,
    ) -> Self {
        let instructions = instructions
            .filter(|s| supports_instructions(model) && !s.trim().is_empty())
            .map(String::from);

        Self {
            model: model.to_string(),
            voice: voice.to_string(),
            input: text.to_string(),
            response_format: format,
            instructions,
        }
    }

    /// A copy of this request with the `instructions` parameter stripped.
    ///
    /// Used by the synthesis client when the remote API rejects the
    /// parameter as unrecognized.
    pub fn without_instructions(&self) -> Self {
        Self {
            instructions: None,
            ..self.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
