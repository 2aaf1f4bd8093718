//! Pass 1: Quantization
//!
//! Snaps every note event to the nearest sixteenth and rewrites the tempo.
//! Everything that is not a note keeps its original tick.

use crate::analysis::QuantizeSummary;
use crate::document::{Document, TimedEvent};
use crate::error::Result;
use crate::passes::replace_tempo;
use crate::timebase::{Tempo, TimeBase};
use crate::timeline::{collect_document, emit_track, sort_by_tick};

/// Snap the note events of one track and restore tick order.
///
/// Events landing on the same tick keep their arrival order.
pub fn quantize_events(
    events: Vec<TimedEvent>,
    time_base: &TimeBase,
    summary: &mut QuantizeSummary,
) -> Vec<TimedEvent> {
    let mut quantized: Vec<TimedEvent> = events
        .into_iter()
        .map(|mut event| {
            if event.kind.is_note() {
                let snapped = time_base.snap_to_grid(event.tick);
                let displacement = snapped.abs_diff(event.tick);
                summary.note_events += 1;
                if displacement > 0 {
                    summary.moved_note_events += 1;
                    summary.max_displacement_ticks =
                        summary.max_displacement_ticks.max(displacement);
                }
                event.tick = snapped;
            }
            event
        })
        .collect();
    sort_by_tick(&mut quantized);
    quantized
}

/// Quantize a whole document to the sixteenth grid at `tempo`
pub fn run(document: &Document, tempo: Tempo) -> Result<(Document, QuantizeSummary)> {
    let time_base = document.time_base()?;
    let mut summary = QuantizeSummary {
        ticks_per_16th: time_base.ticks_per_16th(),
        micros_per_beat: tempo.micros_per_beat(),
        ..Default::default()
    };

    let mut tracks = Vec::with_capacity(document.tracks.len());
    for (index, events) in collect_document(document).into_iter().enumerate() {
        let quantized = quantize_events(events, &time_base, &mut summary);
        // The new tempo goes in front of everything else, tick 0 events included
        let (events, removed) = replace_tempo(quantized, index, tempo);
        summary.tempo_events_replaced += removed;
        tracks.push(emit_track(events)?);
    }

    tracing::info!(
        "Quantized {} note events to a {}-tick grid ({} moved, max displacement {} ticks)",
        summary.note_events,
        summary.ticks_per_16th,
        summary.moved_note_events,
        summary.max_displacement_ticks
    );

    Ok((
        Document::new(document.format, document.ticks_per_beat, tracks),
        summary,
    ))
}
