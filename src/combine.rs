//! Stem combination
//!
//! Merges the per-stem MIDI files of one song into a single multi-track
//! document: a conductor track with the song's global meta events, then one
//! track per stem with its own instrument and channel.

use crate::config::{CombineConfig, InstrumentInfo};
use crate::document::{Document, EventKind, TimedEvent, Track};
use crate::error::{PolishError, Result};
use crate::timebase::Tempo;
use crate::timeline::{collect_track, emit_track};
use midly::Format;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// General MIDI percussion channel (channel 10)
pub const PERCUSSION_CHANNEL: u8 = 9;

/// Key, tempo and time signature of the conductor track
#[derive(Debug, Clone, PartialEq)]
pub struct InitialMeta {
    pub key_signature: EventKind,
    pub tempo: EventKind,
    pub time_signature: EventKind,
}

impl Default for InitialMeta {
    /// C major, 120 BPM, 4/4
    fn default() -> Self {
        Self {
            key_signature: EventKind::KeySignature {
                sharps: 0,
                minor: false,
            },
            tempo: EventKind::Tempo(Tempo::default().micros_per_beat()),
            time_signature: EventKind::TimeSignature {
                numerator: 4,
                denominator_pow2: 2,
                clocks_per_click: 24,
                thirty_seconds_per_quarter: 8,
            },
        }
    }
}

/// First key signature, tempo and time signature of a document's first track
pub fn extract_initial_meta(document: &Document) -> InitialMeta {
    let mut meta = InitialMeta::default();
    let (mut key, mut tempo, mut time) = (false, false, false);

    let Some(track) = document.tracks.first() else {
        return meta;
    };
    for event in &track.events {
        match &event.kind {
            kind @ EventKind::KeySignature { .. } if !key => {
                meta.key_signature = kind.clone();
                key = true;
            }
            kind @ EventKind::Tempo(_) if !tempo => {
                meta.tempo = kind.clone();
                tempo = true;
            }
            kind @ EventKind::TimeSignature { .. } if !time => {
                meta.time_signature = kind.clone();
                time = true;
            }
            _ => {}
        }
        if key && tempo && time {
            break;
        }
    }
    meta
}

/// Hands out stem channels: percussion on 9, everything else round-robin
/// over the remaining fifteen
#[derive(Debug, Default)]
pub struct ChannelAllocator {
    next: u32,
}

impl ChannelAllocator {
    pub fn assign(&mut self, instrument: &InstrumentInfo) -> u8 {
        if instrument.percussion {
            return PERCUSSION_CHANNEL;
        }
        let mut channel = (self.next % 16) as u8;
        if channel == PERCUSSION_CHANNEL {
            self.next += 1;
            channel = (self.next % 16) as u8;
        }
        self.next += 1;
        channel
    }
}

/// File name without directory or extension
pub fn stem_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Rescale an absolute tick between resolutions, rounding down
pub fn rescale_tick(tick: u64, from_tpb: u16, to_tpb: u16) -> u64 {
    if from_tpb == to_tpb {
        return tick;
    }
    tick * u64::from(to_tpb) / u64::from(from_tpb)
}

/// Build the track for one stem at the output resolution
pub fn stem_track(
    stem: &Document,
    name: &str,
    instrument: &InstrumentInfo,
    channel: u8,
    ticks_per_beat: u16,
    track_index: usize,
) -> Result<Track> {
    let mut events = vec![TimedEvent::new(
        0,
        track_index,
        EventKind::TrackName(name.as_bytes().to_vec()),
    )];
    if !instrument.percussion {
        events.push(TimedEvent::new(
            0,
            track_index,
            EventKind::program_change(channel, instrument.program),
        ));
    }

    if let Some(source) = stem.tracks.first() {
        for event in collect_track(source, track_index) {
            if event.kind.is_meta() {
                continue;
            }
            let tick = rescale_tick(event.tick, stem.ticks_per_beat, ticks_per_beat);
            events.push(TimedEvent::new(
                tick,
                track_index,
                event.kind.with_channel(channel),
            ));
        }
    }

    // Rounding down keeps the source order, so no re-sort is needed
    emit_track(events)
}

/// Combine stems into one format-1 document named `song_name`.
///
/// Stems that cannot be read are skipped with a warning. The conductor meta
/// events come from the first readable stem.
pub fn combine<P: AsRef<Path>>(
    paths: &[P],
    song_name: &str,
    config: &CombineConfig,
) -> Result<Document> {
    if paths.is_empty() {
        return Err(PolishError::NothingToCombine);
    }

    let mut stems: Vec<(PathBuf, Document)> = Vec::with_capacity(paths.len());
    for path in paths {
        let path = path.as_ref();
        match Document::load(path) {
            Ok(document) => stems.push((path.to_path_buf(), document)),
            Err(e) => warn!("Skipping stem '{}': {}", path.display(), e),
        }
    }

    let meta = stems
        .first()
        .map(|(_, document)| extract_initial_meta(document))
        .unwrap_or_default();

    let conductor = vec![
        TimedEvent::new(0, 0, EventKind::TrackName(song_name.as_bytes().to_vec())),
        TimedEvent::new(0, 0, meta.key_signature),
        TimedEvent::new(0, 0, meta.tempo),
        TimedEvent::new(0, 0, meta.time_signature),
    ];
    let mut tracks = vec![emit_track(conductor)?];

    let mut channels = ChannelAllocator::default();
    for (path, document) in &stems {
        let name = stem_name(path);
        let instrument = config.instrument_for(&name);
        let channel = channels.assign(instrument);
        debug!(
            "Stem '{}': {} (program {}) on channel {}",
            name, instrument.name, instrument.program, channel
        );
        tracks.push(stem_track(
            document,
            &name,
            instrument,
            channel,
            config.ticks_per_beat,
            tracks.len(),
        )?);
    }

    info!(
        "Combined {} of {} stems into '{}'",
        stems.len(),
        paths.len(),
        song_name
    );
    Ok(Document::new(Format::Parallel, config.ticks_per_beat, tracks))
}
