//! Pass 3: Duration Prettifying
//!
//! Transcribed note-offs land wherever the detector lost the note, which
//! reads badly as notation. Every note that starts together is given the same
//! duration: up to the next onset, no shorter than a sixteenth and no longer
//! than a quarter (both configurable).

use crate::analysis::PrettifySummary;
use crate::config::PrettifyConfig;
use crate::document::{Document, EventKind, TimedEvent};
use crate::error::Result;
use crate::timebase::TimeBase;
use crate::timeline::{collect_document, emit_track};
use std::cmp::Ordering;

/// Note-ons that start on the same tick
#[derive(Debug, Clone, PartialEq)]
pub struct NoteGroup {
    pub start: u64,
    /// The note-on events, in arrival order
    pub notes: Vec<EventKind>,
}

impl NoteGroup {
    fn has_key(&self, key: (u8, u8)) -> bool {
        self.notes.iter().any(|note| note.note_key() == Some(key))
    }
}

/// Duration bounds in ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationBounds {
    pub min: u64,
    pub max: u64,
}

impl DurationBounds {
    pub fn new(time_base: &TimeBase, config: &PrettifyConfig) -> Self {
        Self {
            min: time_base.ticks_per_16th() * u64::from(config.min_sixteenths),
            max: time_base.ticks_per_quarter() * u64::from(config.max_quarters),
        }
    }

    pub fn clamp(&self, rest: u64) -> u64 {
        rest.min(self.max).max(self.min)
    }
}

/// Group sounding note-ons by start tick.
///
/// `events` must be in tick order. Groups come out in start order, and a tick
/// with no sounding note-on starts no group.
pub fn group_notes(events: &[TimedEvent]) -> Vec<NoteGroup> {
    let mut groups: Vec<NoteGroup> = Vec::new();
    for event in events.iter().filter(|e| e.kind.is_sounding_note_on()) {
        match groups.last_mut() {
            Some(group) if group.start == event.tick => group.notes.push(event.kind.clone()),
            _ => groups.push(NoteGroup {
                start: event.tick,
                notes: vec![event.kind.clone()],
            }),
        }
    }
    groups
}

/// Earliest release after the group starts of any note in the group
fn earliest_release(group: &NoteGroup, events: &[TimedEvent]) -> Option<u64> {
    events
        .iter()
        .filter(|e| e.tick > group.start && e.kind.is_note_release())
        .filter(|e| e.kind.note_key().is_some_and(|key| group.has_key(key)))
        .map(|e| e.tick)
        .min()
}

/// Rest for the last group: up to its first release, else the maximum.
/// The flag is set when a release was found.
fn final_rest(group: &NoteGroup, events: &[TimedEvent], bounds: &DurationBounds) -> (u64, bool) {
    match earliest_release(group, events) {
        Some(tick) => (tick - group.start, true),
        None => (bounds.max, false),
    }
}

/// Same-tick order: releases, then everything else, then onsets
fn emission_rank(kind: &EventKind) -> u8 {
    match kind {
        EventKind::NoteOff { .. } => 0,
        EventKind::NoteOn { .. } => 2,
        _ => 1,
    }
}

fn by_tick_then_rank(a: &TimedEvent, b: &TimedEvent) -> Ordering {
    a.tick
        .cmp(&b.tick)
        .then_with(|| emission_rank(&a.kind).cmp(&emission_rank(&b.kind)))
}

/// Rebuild one track's notes from its groups
pub fn prettify_events(
    events: &[TimedEvent],
    track: usize,
    bounds: &DurationBounds,
    summary: &mut PrettifySummary,
) -> Vec<TimedEvent> {
    let groups = group_notes(events);
    let mut rebuilt: Vec<TimedEvent> = Vec::with_capacity(events.len());

    for (index, group) in groups.iter().enumerate() {
        let rest = match groups.get(index + 1) {
            Some(next) => next.start - group.start,
            None => {
                let (rest, from_note_off) = final_rest(group, events, bounds);
                if from_note_off {
                    summary.final_groups_from_note_off += 1;
                }
                rest
            }
        };
        let duration = bounds.clamp(rest);
        if rest < bounds.min {
            summary.raised_to_minimum += 1;
        } else if rest > bounds.max {
            summary.capped_to_maximum += 1;
        }

        summary.note_groups += 1;
        summary.notes += group.notes.len();

        for note in &group.notes {
            rebuilt.push(TimedEvent::new(group.start, track, note.clone()));
        }
        let end = group.start + duration;
        for note in &group.notes {
            if let Some((channel, key)) = note.note_key() {
                rebuilt.push(TimedEvent::new(
                    end,
                    track,
                    EventKind::NoteOff {
                        channel,
                        key,
                        velocity: 0,
                    },
                ));
            }
        }
    }

    rebuilt.extend(events.iter().filter(|e| !e.kind.is_note()).cloned());
    rebuilt.sort_by(by_tick_then_rank);
    rebuilt
}

/// Rewrite note durations in every track
pub fn run(document: &Document, config: &PrettifyConfig) -> Result<(Document, PrettifySummary)> {
    let time_base = document.time_base()?;
    let bounds = DurationBounds::new(&time_base, config);
    let mut summary = PrettifySummary::default();

    let mut tracks = Vec::with_capacity(document.tracks.len());
    for (index, events) in collect_document(document).into_iter().enumerate() {
        let rebuilt = prettify_events(&events, index, &bounds, &mut summary);
        tracks.push(emit_track(rebuilt)?);
    }

    tracing::info!(
        "Prettified {} notes in {} groups ({} raised to {} ticks, {} capped at {} ticks)",
        summary.notes,
        summary.note_groups,
        summary.raised_to_minimum,
        bounds.min,
        summary.capped_to_maximum,
        bounds.max
    );

    Ok((
        Document::new(document.format, document.ticks_per_beat, tracks),
        summary,
    ))
}
