//! Pass 0: Tempo Remap
//!
//! Drum transcription renders its MIDI at a fixed tempo. This pass rescales
//! the timeline so the same material plays at the target tempo, then writes
//! the target tempo into track 0.

use crate::analysis::RetimeSummary;
use crate::document::Document;
use crate::error::Result;
use crate::passes::replace_tempo;
use crate::timebase::Tempo;
use crate::timeline::{collect_document, emit_track, sort_by_tick};

/// Scale an absolute tick, rounding to the nearest tick
pub fn scale_tick(tick: u64, scale: f64) -> u64 {
    (tick as f64 * scale).round() as u64
}

/// Rescale a document rendered at `source` so it lines up with `target`
pub fn run(document: &Document, source: Tempo, target: Tempo) -> Result<(Document, RetimeSummary)> {
    document.time_base()?;
    let scale = target.scale_from(source);
    let mut tempo_events_replaced = 0;

    let mut tracks = Vec::with_capacity(document.tracks.len());
    for (index, events) in collect_document(document).into_iter().enumerate() {
        let mut scaled: Vec<_> = events
            .into_iter()
            .map(|mut event| {
                event.tick = scale_tick(event.tick, scale);
                event
            })
            .collect();
        sort_by_tick(&mut scaled);

        let (events, removed) = replace_tempo(scaled, index, target);
        tempo_events_replaced += removed;
        tracks.push(emit_track(events)?);
    }

    tracing::info!(
        "Retimed {} tracks from {} to {} BPM (scale {:.4})",
        tracks.len(),
        source.bpm(),
        target.bpm(),
        scale
    );

    let summary = RetimeSummary {
        source_bpm: source.bpm(),
        target_bpm: target.bpm(),
        scale,
        tempo_events_replaced,
    };
    Ok((
        Document::new(document.format, document.ticks_per_beat, tracks),
        summary,
    ))
}
