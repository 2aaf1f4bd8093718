//! Pass 2: Chunked Drift Correction
//!
//! Some drum transcriptions come out a whole sixteenth early or late for long
//! stretches, which quantization cannot see. The timeline is cut into
//! fixed-size chunks; when a chunk's drum onsets sit, on average, exactly one
//! sixteenth off the measure starts, that offset is added to the chunk and to
//! every later chunk.

use crate::analysis::{ChunkReport, DriftReport};
use crate::config::{validate_config, Config};
use crate::document::{Document, TimedEvent};
use crate::error::{PolishError, Result};
use crate::passes::replace_tempo;
use crate::timebase::{Tempo, TimeBase};
use crate::timeline::{emit_document, flatten_document, sort_by_tick};
use tracing::{debug, info, warn};

/// Event with its drum membership, decided once on intake
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkEvent {
    pub event: TimedEvent,
    pub drum: bool,
}

/// Contiguous window of the timeline
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub index: usize,
    pub start_tick: u64,
    pub events: Vec<ChunkEvent>,
}

/// A chunk after correction; `shift` is final once the record exists
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    pub index: usize,
    pub start_tick: u64,
    pub drum_onsets: usize,
    pub mean_deviation: Option<f64>,
    pub shift: i64,
    pub cumulative_shift: i64,
    pub events: Vec<ChunkEvent>,
}

/// Misalignment measured over one chunk's drum onsets
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Misalignment {
    pub onsets: usize,
    pub mean_deviation: Option<f64>,
    /// Positive when the drums sit late, negative when early, 0 when aligned
    pub shift: i64,
}

/// Measure how far drum onsets sit from the nearest measure start.
///
/// Only a mean that rounds to exactly one sixteenth, either way, counts as
/// misaligned. Larger offsets are reported but left alone.
pub fn measure_misalignment(onsets: &[u64], time_base: &TimeBase) -> Misalignment {
    if onsets.is_empty() {
        return Misalignment {
            onsets: 0,
            mean_deviation: None,
            shift: 0,
        };
    }

    let total: i64 = onsets
        .iter()
        .map(|&tick| time_base.strong_beat_deviation(tick))
        .sum();
    let mean = total as f64 / onsets.len() as f64;
    let rounded = time_base.round_to_sixteenths(mean);
    let sixteenth = time_base.ticks_per_16th() as i64;

    Misalignment {
        onsets: onsets.len(),
        mean_deviation: Some(mean),
        shift: if rounded.abs() == sixteenth { rounded } else { 0 },
    }
}

/// Split tick-ordered events into chunks of `chunk_ticks`, from tick 0 up to
/// the chunk holding the last event. Empty chunks in between are kept.
pub fn split_into_chunks(events: Vec<ChunkEvent>, chunk_ticks: u64) -> Vec<Chunk> {
    let chunk_count = events
        .last()
        .map(|last| (last.event.tick / chunk_ticks) as usize + 1)
        .unwrap_or(0);

    let mut chunks: Vec<Chunk> = (0..chunk_count)
        .map(|index| Chunk {
            index,
            start_tick: index as u64 * chunk_ticks,
            events: Vec::new(),
        })
        .collect();

    for event in events {
        let index = (event.event.tick / chunk_ticks) as usize;
        chunks[index].events.push(event);
    }
    chunks
}

/// Add `shift` to every event, clamping at tick 0. Returns how many were clamped.
fn shift_events(events: &mut [ChunkEvent], shift: i64) -> usize {
    let mut clamped = 0;
    for chunk_event in events.iter_mut() {
        let tick = chunk_event.event.tick as i64 + shift;
        chunk_event.event.tick = if tick < 0 {
            warn!(
                "Adjusted event time negative, setting to 0 (original tick {}, shift {})",
                chunk_event.event.tick, shift
            );
            clamped += 1;
            0
        } else {
            tick as u64
        };
    }
    clamped
}

/// Fold over the chunks in order.
///
/// Each chunk first receives every shift detected in earlier chunks, in the
/// order they were detected, and is only then analysed. Returns the finished
/// records and the number of clamped events.
pub fn correct_chunks(chunks: Vec<Chunk>, time_base: &TimeBase) -> (Vec<ChunkRecord>, usize) {
    let mut detected: Vec<i64> = Vec::new();
    let mut clamped = 0;
    let mut records = Vec::with_capacity(chunks.len());

    for chunk in chunks {
        let mut events = chunk.events;
        for &shift in &detected {
            clamped += shift_events(&mut events, shift);
        }

        let onsets: Vec<u64> = events
            .iter()
            .filter(|e| e.drum && e.event.kind.is_sounding_note_on())
            .map(|e| e.event.tick)
            .collect();
        let misalignment = measure_misalignment(&onsets, time_base);
        debug!(
            "Chunk {}: {} drum onsets, mean deviation {:?}",
            chunk.index + 1,
            misalignment.onsets,
            misalignment.mean_deviation
        );

        if misalignment.shift != 0 {
            info!(
                "Chunk {}: Detected misalignment of {} ticks",
                chunk.index + 1,
                misalignment.shift
            );
            clamped += shift_events(&mut events, misalignment.shift);
            detected.push(misalignment.shift);
        }

        records.push(ChunkRecord {
            index: chunk.index,
            start_tick: chunk.start_tick,
            drum_onsets: misalignment.onsets,
            mean_deviation: misalignment.mean_deviation,
            shift: misalignment.shift,
            cumulative_shift: detected.iter().sum(),
            events,
        });
    }

    (records, clamped)
}

fn is_drum_note(event: &TimedEvent, drum_channel: u8) -> bool {
    event.kind.is_note() && event.kind.channel() == Some(drum_channel)
}

/// Detect and undo per-chunk drum drift across the whole document
pub fn run(document: &Document, tempo: Tempo, config: &Config) -> Result<(Document, DriftReport)> {
    validate_config(config).map_err(|e| PolishError::ConfigValidationFailed(e.to_string()))?;
    let time_base = document.time_base()?;
    let drum_channel = config.drift.drum_channel;
    let chunk_ticks = time_base.chunk_ticks(config.drift.chunk_measures);

    let mut report = DriftReport {
        ticks_per_16th: time_base.ticks_per_16th(),
        chunk_ticks,
        ..Default::default()
    };

    // Tempo events are replaced wholesale once the chunks are corrected
    let (tempo_events, events): (Vec<TimedEvent>, Vec<TimedEvent>) = flatten_document(document)
        .into_iter()
        .partition(|event| event.kind.is_tempo());
    report.tempo_events_replaced = tempo_events.len();

    // Drum notes back on the grid before anything is measured
    let mut events: Vec<ChunkEvent> = events
        .into_iter()
        .map(|mut event| {
            let drum = is_drum_note(&event, drum_channel);
            if drum {
                let snapped = time_base.snap_to_grid(event.tick);
                if snapped != event.tick {
                    report.resnapped_drum_events += 1;
                    event.tick = snapped;
                }
            }
            ChunkEvent { event, drum }
        })
        .collect();
    events.sort_by_key(|e| e.event.tick);

    if report.resnapped_drum_events > 0 {
        warn!(
            "{} drum note events were off the sixteenth grid; run quantization first",
            report.resnapped_drum_events
        );
    }

    let chunks = split_into_chunks(events, chunk_ticks);
    let (records, clamped) = correct_chunks(chunks, &time_base);
    report.clamped_events = clamped;
    report.total_shift = records.last().map(|r| r.cumulative_shift).unwrap_or(0);
    report.chunks = records
        .iter()
        .map(|record| ChunkReport {
            index: record.index,
            start_tick: record.start_tick,
            drum_onsets: record.drum_onsets,
            mean_deviation: record.mean_deviation,
            detected_shift: record.shift,
            cumulative_shift: record.cumulative_shift,
        })
        .collect();

    let mut adjusted: Vec<TimedEvent> = records
        .into_iter()
        .flat_map(|record| record.events)
        .map(|chunk_event| {
            let mut event = chunk_event.event;
            if chunk_event.drum {
                event.kind = event.kind.with_channel(drum_channel);
            }
            event
        })
        .collect();
    sort_by_tick(&mut adjusted);

    if !document.tracks.is_empty() {
        adjusted = replace_tempo(adjusted, 0, tempo).0;
    }

    info!(
        "Drift correction: {} chunks, {} shifted, total shift {} ticks, {} events clamped",
        report.chunks.len(),
        report.shifted_chunks().count(),
        report.total_shift,
        report.clamped_events
    );

    let document = emit_document(
        document.format,
        document.ticks_per_beat,
        document.tracks.len(),
        adjusted,
    )?;
    Ok((document, report))
}
