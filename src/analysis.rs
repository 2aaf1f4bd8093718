//! Per-stage diagnostics and the JSON pipeline report

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Pass 0: tempo remap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetimeSummary {
    pub source_bpm: u32,
    pub target_bpm: u32,
    /// Factor applied to every absolute tick
    pub scale: f64,
    pub tempo_events_replaced: usize,
}

/// Pass 1: quantization
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuantizeSummary {
    pub ticks_per_16th: u64,
    pub micros_per_beat: u32,
    pub note_events: usize,
    /// Note events that were not already on the grid
    pub moved_note_events: usize,
    pub max_displacement_ticks: u64,
    pub tempo_events_replaced: usize,
}

/// Drift analysis of one chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkReport {
    pub index: usize,
    pub start_tick: u64,
    /// Sounding drum note-ons analysed
    pub drum_onsets: usize,
    /// Mean signed distance from the nearest measure start, in ticks
    pub mean_deviation: Option<f64>,
    /// Shift this chunk contributed (0 or one sixteenth either way)
    pub detected_shift: i64,
    /// Sum of all shifts applied to this chunk's events
    pub cumulative_shift: i64,
}

/// Pass 2: chunked drift correction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    pub ticks_per_16th: u64,
    pub chunk_ticks: u64,
    pub chunks: Vec<ChunkReport>,
    pub total_shift: i64,
    /// Events pulled back to tick 0 after a negative shift
    pub clamped_events: usize,
    /// Drum note events moved onto the grid before chunking
    pub resnapped_drum_events: usize,
    pub tempo_events_replaced: usize,
}

impl DriftReport {
    /// Chunks where a misalignment was detected
    pub fn shifted_chunks(&self) -> impl Iterator<Item = &ChunkReport> {
        self.chunks.iter().filter(|c| c.detected_shift != 0)
    }
}

/// Pass 3: duration prettifying
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrettifySummary {
    pub note_groups: usize,
    pub notes: usize,
    /// Groups stretched up to the minimum duration
    pub raised_to_minimum: usize,
    /// Groups cut down to the maximum duration
    pub capped_to_maximum: usize,
    /// Final groups whose duration came from a real note-off
    pub final_groups_from_note_off: usize,
}

/// Everything one pipeline run reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub version: String,
    pub input: Option<String>,
    pub output: Option<String>,
    pub ticks_per_beat: u16,
    pub bpm: u32,
    /// Stage names in the order they ran
    pub stages: Vec<String>,
    pub retime: Option<RetimeSummary>,
    pub quantize: Option<QuantizeSummary>,
    pub drift: Option<DriftReport>,
    pub prettify: Option<PrettifySummary>,
}

impl PipelineReport {
    pub fn new(ticks_per_beat: u16, bpm: u32) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            input: None,
            output: None,
            ticks_per_beat,
            bpm,
            stages: Vec::new(),
            retime: None,
            quantize: None,
            drift: None,
            prettify: None,
        }
    }
}

/// Write `<file_name>.analysis.json` into `output_dir`
pub fn export_analysis(
    report: &PipelineReport,
    output_dir: &Path,
    file_name: &str,
) -> crate::Result<PathBuf> {
    std::fs::create_dir_all(output_dir)?;
    let analysis_path = output_dir.join(format!("{}.analysis.json", file_name));

    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(&analysis_path, json)?;

    tracing::info!("Exported analysis results to {}", analysis_path.display());
    Ok(analysis_path)
}
