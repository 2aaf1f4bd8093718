//! Pipeline passes, run in order: retime (optional), quantize, drift, prettify
//!
//! Every pass reads a [`Document`] and returns a new one; no pass mutates its
//! input.

use crate::document::{EventKind, TimedEvent};
use crate::timebase::Tempo;

pub mod pass_0;
pub mod pass_1;
pub mod pass_2;
pub mod pass_3;

/// Drop every tempo event and, for track 0, put a single tempo event first.
///
/// Returns the rewritten events and how many tempo events were removed.
pub(crate) fn replace_tempo(
    events: Vec<TimedEvent>,
    track: usize,
    tempo: Tempo,
) -> (Vec<TimedEvent>, usize) {
    let before = events.len();
    let mut kept: Vec<TimedEvent> = Vec::with_capacity(before + 1);
    if track == 0 {
        kept.push(TimedEvent::new(
            0,
            0,
            EventKind::Tempo(tempo.micros_per_beat()),
        ));
    }
    kept.extend(events.into_iter().filter(|e| !e.kind.is_tempo()));
    let removed = before + usize::from(track == 0) - kept.len();
    (kept, removed)
}
