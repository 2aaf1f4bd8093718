//! Event collection and emission
//!
//! Passes never work on delta times. A track is expanded to absolute ticks,
//! transformed, stably re-sorted, and only then turned back into deltas.

use crate::document::{Document, Event, EventKind, TimedEvent, Track};
use crate::error::{PolishError, Result};
use crate::midi::MAX_DELTA;
use midly::Format;
use tracing::warn;

/// Expand one track's delta times into absolute ticks
pub fn collect_track(track: &Track, index: usize) -> Vec<TimedEvent> {
    let mut tick = 0u64;
    track
        .events
        .iter()
        .map(|event| {
            tick += u64::from(event.delta);
            TimedEvent::new(tick, index, event.kind.clone())
        })
        .collect()
}

/// Expand every track, keeping tracks apart
pub fn collect_document(document: &Document) -> Vec<Vec<TimedEvent>> {
    document
        .tracks
        .iter()
        .enumerate()
        .map(|(index, track)| collect_track(track, index))
        .collect()
}

/// Expand every track into one list, track by track
pub fn flatten_document(document: &Document) -> Vec<TimedEvent> {
    collect_document(document).into_iter().flatten().collect()
}

/// Stable sort by tick: events on the same tick keep their arrival order
pub fn sort_by_tick(events: &mut [TimedEvent]) {
    events.sort_by_key(|event| event.tick);
}

/// Re-derive delta times for events already in emission order.
///
/// Existing EndOfTrack events are dropped and a single one is appended at the
/// later of the last event and the latest original EndOfTrack. An event that
/// would need a negative delta is emitted with delta 0.
pub fn emit_track<I>(events: I) -> Result<Track>
where
    I: IntoIterator<Item = TimedEvent>,
{
    let mut out = Vec::new();
    let mut cursor = 0u64;
    let mut end_tick = 0u64;

    for event in events {
        end_tick = end_tick.max(event.tick);
        if event.kind.is_end_of_track() {
            continue;
        }
        let delta = if event.tick < cursor {
            warn!(
                "Negative delta time detected, setting to 0 (previous tick {}, current tick {})",
                cursor, event.tick
            );
            0
        } else {
            event.tick - cursor
        };
        cursor += delta;
        out.push(Event::new(checked_delta(delta)?, event.kind));
    }

    out.push(Event::new(
        checked_delta(end_tick.saturating_sub(cursor))?,
        EventKind::EndOfTrack,
    ));
    Ok(Track::new(out))
}

/// Distribute globally ordered events back to their tracks and emit each one
pub fn emit_document(
    format: Format,
    ticks_per_beat: u16,
    track_count: usize,
    events: Vec<TimedEvent>,
) -> Result<Document> {
    let mut lanes: Vec<Vec<TimedEvent>> = vec![Vec::new(); track_count];
    for event in events {
        if let Some(lane) = lanes.get_mut(event.track) {
            lane.push(event);
        } else {
            warn!(
                "Dropping event addressed to missing track {} (document has {})",
                event.track, track_count
            );
        }
    }

    let tracks = lanes
        .into_iter()
        .map(emit_track)
        .collect::<Result<Vec<_>>>()?;
    Ok(Document::new(format, ticks_per_beat, tracks))
}

fn checked_delta(delta: u64) -> Result<u32> {
    if delta > MAX_DELTA {
        return Err(PolishError::DeltaOverflow(delta));
    }
    Ok(delta as u32)
}
