//! Error types for the MIDI post-processing pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the pipeline.
///
/// Timing anomalies found while transforming (an event pushed before tick 0,
/// a negative re-derived delta) are not errors: they are clamped and logged.
#[derive(Debug, Error)]
pub enum PolishError {
    /// E001: Input file missing or unreadable
    #[error("E001: Cannot open MIDI file '{}' - {source}", .path.display())]
    InputRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// E002: Input bytes are not a valid Standard MIDI File
    #[error("E002: Malformed MIDI file '{}' - {reason}", .path.display())]
    MalformedInput { path: PathBuf, reason: String },
    /// E003: SMPTE timecode headers have no ticks-per-beat grid
    #[error("E003: Unsupported timing - SMPTE timecode files cannot be quantized to a beat grid")]
    UnsupportedTiming,
    /// E004: Resolution too coarse to hold a sixteenth-note grid
    #[error("E004: Invalid resolution - {0} ticks per beat is too small for a sixteenth-note grid")]
    InvalidResolution(u16),
    /// E005: Non-positive BPM
    #[error("E005: Invalid BPM value {0} - BPM must be a positive integer of at least 4")]
    InvalidTempo(u32),
    /// E006: Output not writable
    #[error("E006: Cannot save MIDI file to '{}' - {reason}", .path.display())]
    Write { path: PathBuf, reason: String },
    /// E007: Configuration validation failed
    #[error("E007: Configuration validation failed - {0}")]
    ConfigValidationFailed(String),
    /// E008: A re-derived delta does not fit the 28-bit variable-length field
    #[error("E008: Delta time {0} exceeds the 28-bit MIDI limit")]
    DeltaOverflow(u64),
    /// E009: Combination requested with no stems
    #[error("E009: No MIDI files provided for combination")]
    NothingToCombine,
    /// E010: Analysis export error
    #[error("E010: Analysis export error - {0}")]
    AnalysisExport(String),
    /// E011: Other file I/O error
    #[error("E011: File I/O error - {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for PolishError {
    fn from(err: serde_json::Error) -> Self {
        PolishError::AnalysisExport(format!("JSON serialization error: {}", err))
    }
}

impl PolishError {
    /// True for failures caused by the input document rather than the output side
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            PolishError::InputRead { .. }
                | PolishError::MalformedInput { .. }
                | PolishError::UnsupportedTiming
                | PolishError::InvalidResolution(_)
        )
    }
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PolishError>;
