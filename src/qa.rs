//! Postcondition audit of a processed document

use crate::config::PrettifyConfig;
use crate::document::{Document, EventKind};
use crate::error::Result;
use crate::passes::pass_3::DurationBounds;
use crate::timeline::collect_track;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Per-track audit counts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackAudit {
    pub index: usize,
    pub name: Option<String>,
    pub note_ons: usize,
    pub note_offs: usize,
    pub end_of_track_events: usize,
}

/// What the audit found over a whole document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QaReport {
    pub ticks_per_beat: u16,
    pub ticks_per_16th: u64,
    pub tracks: Vec<TrackAudit>,
    pub tempo_events: usize,
    /// Note events whose tick is not a multiple of a sixteenth
    pub off_grid_note_events: usize,
    /// Notes lasting less than the minimum or more than the maximum duration
    pub duration_violations: usize,
    /// Sounding note-ons never released
    pub unreleased_notes: usize,
    /// Tracks not ending in exactly one EndOfTrack
    pub malformed_track_ends: usize,
}

impl QaReport {
    pub fn note_on_count(&self) -> usize {
        self.tracks.iter().map(|t| t.note_ons).sum()
    }

    /// True when the document satisfies every pipeline postcondition
    pub fn passed(&self) -> bool {
        self.off_grid_note_events == 0
            && self.duration_violations == 0
            && self.malformed_track_ends == 0
    }
}

/// Audit grid alignment, note durations and track endings
pub fn audit(document: &Document, prettify: &PrettifyConfig) -> Result<QaReport> {
    let time_base = document.time_base()?;
    let bounds = DurationBounds::new(&time_base, prettify);
    let mut report = QaReport {
        ticks_per_beat: document.ticks_per_beat,
        ticks_per_16th: time_base.ticks_per_16th(),
        ..Default::default()
    };

    for (index, track) in document.tracks.iter().enumerate() {
        let mut audit = TrackAudit {
            index,
            ..Default::default()
        };
        // Onset ticks still waiting for their release, per (channel, key)
        let mut open: HashMap<(u8, u8), Vec<u64>> = HashMap::new();

        for event in collect_track(track, index) {
            if event.kind.is_note() && !time_base.is_on_grid(event.tick) {
                report.off_grid_note_events += 1;
            }
            match &event.kind {
                EventKind::TrackName(bytes) if audit.name.is_none() => {
                    audit.name = Some(String::from_utf8_lossy(bytes).into_owned());
                }
                EventKind::Tempo(_) => report.tempo_events += 1,
                EventKind::EndOfTrack => audit.end_of_track_events += 1,
                kind if kind.is_sounding_note_on() => {
                    audit.note_ons += 1;
                    if let Some(key) = kind.note_key() {
                        open.entry(key).or_default().push(event.tick);
                    }
                }
                kind if kind.is_note_release() => {
                    audit.note_offs += 1;
                    let onset = kind
                        .note_key()
                        .and_then(|key| open.get_mut(&key))
                        .and_then(|ticks| (!ticks.is_empty()).then(|| ticks.remove(0)));
                    if let Some(start) = onset {
                        let duration = event.tick - start;
                        if duration < bounds.min || duration > bounds.max {
                            report.duration_violations += 1;
                        }
                    }
                }
                _ => {}
            }
        }

        report.unreleased_notes += open.values().map(Vec::len).sum::<usize>();
        let ends_once = audit.end_of_track_events == 1
            && track
                .events
                .last()
                .is_some_and(|e| e.kind.is_end_of_track());
        if !ends_once {
            report.malformed_track_ends += 1;
        }
        report.tracks.push(audit);
    }

    Ok(report)
}

/// Write `qa/statistics.txt` under `output_dir`
pub fn write_statistics_report(report: &QaReport, output_dir: &Path) -> Result<PathBuf> {
    let qa_dir = output_dir.join("qa");
    fs::create_dir_all(&qa_dir)?;
    let path = qa_dir.join("statistics.txt");

    let mut text = String::new();
    text.push_str("MIDI POST-PROCESSING - STATISTICS REPORT\n");
    text.push_str("========================================\n\n");
    text.push_str(&format!("Ticks per Beat: {}\n", report.ticks_per_beat));
    text.push_str(&format!("Ticks per 16th: {}\n", report.ticks_per_16th));
    text.push_str(&format!("Tracks: {}\n", report.tracks.len()));
    text.push_str(&format!("Tempo Events: {}\n", report.tempo_events));
    text.push_str(&format!("Total Notes: {}\n\n", report.note_on_count()));

    text.push_str(&format!(
        "Off-grid Note Events: {}\n",
        report.off_grid_note_events
    ));
    text.push_str(&format!(
        "Duration Violations: {}\n",
        report.duration_violations
    ));
    text.push_str(&format!("Unreleased Notes: {}\n", report.unreleased_notes));
    text.push_str(&format!(
        "Malformed Track Ends: {}\n",
        report.malformed_track_ends
    ));
    text.push_str(&format!(
        "Result: {}\n",
        if report.passed() { "PASS" } else { "FAIL" }
    ));

    text.push_str("\nPer-track Notes:\n");
    for track in &report.tracks {
        text.push_str(&format!(
            "  [{}] {}: {} on / {} off\n",
            track.index,
            track.name.as_deref().unwrap_or("(unnamed)"),
            track.note_ons,
            track.note_offs
        ));
    }

    fs::write(&path, text)?;
    tracing::info!("QA statistics written to {}", path.display());
    Ok(path)
}
