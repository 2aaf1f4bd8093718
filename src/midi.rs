//! Standard MIDI File I/O
//!
//! Converts between midly's borrowed wire types and the owned [`Document`]
//! model that every pass works on.

use crate::document::{Document, Event, EventKind, Track};
use crate::error::{PolishError, Result};
use crate::timebase::TimeBase;
use midly::num::{u15, u24, u28, u4, u7};
use midly::{
    Format, Fps, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind,
};
use std::path::Path;

/// Largest delta a track event can encode
pub const MAX_DELTA: u64 = 0x0FFF_FFFF;

/// Read and validate a MIDI file. Nothing is written on failure.
pub(crate) fn read_document(path: &Path) -> Result<Document> {
    let data = std::fs::read(path).map_err(|source| PolishError::InputRead {
        path: path.to_path_buf(),
        source,
    })?;
    let smf = Smf::parse(&data).map_err(|e| PolishError::MalformedInput {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    document_from_smf(&smf)
}

/// Serialize the whole document before touching the file system
pub(crate) fn write_document(document: &Document, path: &Path) -> Result<()> {
    let bytes = document_to_bytes(document).map_err(|e| match e {
        PolishError::Write { reason, .. } => PolishError::Write {
            path: path.to_path_buf(),
            reason,
        },
        other => other,
    })?;
    std::fs::write(path, bytes).map_err(|e| PolishError::Write {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Build a document from a parsed SMF, rejecting timings without a beat grid
pub fn document_from_smf(smf: &Smf<'_>) -> Result<Document> {
    let ticks_per_beat = match smf.header.timing {
        Timing::Metrical(tpb) => tpb.as_int(),
        Timing::Timecode(_, _) => return Err(PolishError::UnsupportedTiming),
    };
    TimeBase::new(ticks_per_beat)?;

    let tracks = smf
        .tracks
        .iter()
        .map(|track| {
            Track::new(
                track
                    .iter()
                    .map(|event| Event::new(event.delta.as_int(), kind_from_midly(&event.kind)))
                    .collect(),
            )
        })
        .collect();

    Ok(Document::new(smf.header.format, ticks_per_beat, tracks))
}

/// Encode a document as SMF bytes
pub fn document_to_bytes(document: &Document) -> Result<Vec<u8>> {
    // A single-track header cannot describe several tracks
    let format = match document.format {
        Format::SingleTrack if document.tracks.len() > 1 => Format::Parallel,
        format => format,
    };

    let mut tracks = Vec::with_capacity(document.tracks.len());
    for track in &document.tracks {
        let mut events = Vec::with_capacity(track.events.len());
        for event in &track.events {
            if u64::from(event.delta) > MAX_DELTA {
                return Err(PolishError::DeltaOverflow(u64::from(event.delta)));
            }
            events.push(TrackEvent {
                delta: u28::from(event.delta),
                kind: kind_to_midly(&event.kind),
            });
        }
        tracks.push(events);
    }

    let smf = Smf {
        header: Header::new(format, Timing::Metrical(u15::from(document.ticks_per_beat))),
        tracks,
    };

    let mut bytes = Vec::new();
    smf.write(&mut bytes).map_err(|e| PolishError::Write {
        path: Default::default(),
        reason: format!("Failed to encode MIDI data: {:?}", e),
    })?;
    Ok(bytes)
}

fn kind_from_midly(kind: &TrackEventKind<'_>) -> EventKind {
    match *kind {
        TrackEventKind::Midi { channel, message } => {
            let channel = channel.as_int();
            match message {
                MidiMessage::NoteOn { key, vel } => EventKind::NoteOn {
                    channel,
                    key: key.as_int(),
                    velocity: vel.as_int(),
                },
                MidiMessage::NoteOff { key, vel } => EventKind::NoteOff {
                    channel,
                    key: key.as_int(),
                    velocity: vel.as_int(),
                },
                MidiMessage::Controller { controller, value } => EventKind::ControlChange {
                    channel,
                    controller: controller.as_int(),
                    value: value.as_int(),
                },
                message => EventKind::Channel { channel, message },
            }
        }
        TrackEventKind::SysEx(data) => EventKind::SysEx {
            data: data.to_vec(),
            escape: false,
        },
        TrackEventKind::Escape(data) => EventKind::SysEx {
            data: data.to_vec(),
            escape: true,
        },
        TrackEventKind::Meta(meta) => meta_from_midly(&meta),
    }
}

fn meta_from_midly(meta: &MetaMessage<'_>) -> EventKind {
    let raw = |type_byte: u8, data: &[u8]| EventKind::Meta {
        type_byte,
        data: data.to_vec(),
    };
    match *meta {
        MetaMessage::Tempo(tempo) => EventKind::Tempo(tempo.as_int()),
        MetaMessage::TrackName(name) => EventKind::TrackName(name.to_vec()),
        MetaMessage::EndOfTrack => EventKind::EndOfTrack,
        MetaMessage::TimeSignature(numerator, denominator_pow2, clocks_per_click, thirty_seconds) => {
            EventKind::TimeSignature {
                numerator,
                denominator_pow2,
                clocks_per_click,
                thirty_seconds_per_quarter: thirty_seconds,
            }
        }
        MetaMessage::KeySignature(sharps, minor) => EventKind::KeySignature { sharps, minor },
        MetaMessage::TrackNumber(None) => raw(0x00, &[]),
        MetaMessage::TrackNumber(Some(number)) => raw(0x00, &number.to_be_bytes()),
        MetaMessage::Text(data) => raw(0x01, data),
        MetaMessage::Copyright(data) => raw(0x02, data),
        MetaMessage::InstrumentName(data) => raw(0x04, data),
        MetaMessage::Lyric(data) => raw(0x05, data),
        MetaMessage::Marker(data) => raw(0x06, data),
        MetaMessage::CuePoint(data) => raw(0x07, data),
        MetaMessage::ProgramName(data) => raw(0x08, data),
        MetaMessage::DeviceName(data) => raw(0x09, data),
        MetaMessage::MidiChannel(channel) => raw(0x20, &[channel.as_int()]),
        MetaMessage::MidiPort(port) => raw(0x21, &[port.as_int()]),
        MetaMessage::SmpteOffset(time) => {
            let rate: u8 = match time.fps() {
                Fps::Fps24 => 0,
                Fps::Fps25 => 1,
                Fps::Fps29 => 2,
                Fps::Fps30 => 3,
            };
            raw(
                0x54,
                &[
                    (rate << 5) | time.hour(),
                    time.minute(),
                    time.second(),
                    time.frame(),
                    time.subframe(),
                ],
            )
        }
        MetaMessage::SequencerSpecific(data) => raw(0x7F, data),
        MetaMessage::Unknown(type_byte, data) => raw(type_byte, data),
    }
}

fn kind_to_midly(kind: &EventKind) -> TrackEventKind<'_> {
    let midi = |channel: u8, message: MidiMessage| TrackEventKind::Midi {
        channel: u4::from(channel),
        message,
    };
    match kind {
        EventKind::NoteOn {
            channel,
            key,
            velocity,
        } => midi(
            *channel,
            MidiMessage::NoteOn {
                key: u7::from(*key),
                vel: u7::from(*velocity),
            },
        ),
        EventKind::NoteOff {
            channel,
            key,
            velocity,
        } => midi(
            *channel,
            MidiMessage::NoteOff {
                key: u7::from(*key),
                vel: u7::from(*velocity),
            },
        ),
        EventKind::ControlChange {
            channel,
            controller,
            value,
        } => midi(
            *channel,
            MidiMessage::Controller {
                controller: u7::from(*controller),
                value: u7::from(*value),
            },
        ),
        EventKind::Channel { channel, message } => midi(*channel, *message),
        EventKind::Tempo(tempo) => TrackEventKind::Meta(MetaMessage::Tempo(u24::from(*tempo))),
        EventKind::TrackName(name) => TrackEventKind::Meta(MetaMessage::TrackName(name.as_slice())),
        EventKind::TimeSignature {
            numerator,
            denominator_pow2,
            clocks_per_click,
            thirty_seconds_per_quarter,
        } => TrackEventKind::Meta(MetaMessage::TimeSignature(
            *numerator,
            *denominator_pow2,
            *clocks_per_click,
            *thirty_seconds_per_quarter,
        )),
        EventKind::KeySignature { sharps, minor } => {
            TrackEventKind::Meta(MetaMessage::KeySignature(*sharps, *minor))
        }
        EventKind::EndOfTrack => TrackEventKind::Meta(MetaMessage::EndOfTrack),
        EventKind::Meta { type_byte, data } => {
            TrackEventKind::Meta(meta_to_midly(*type_byte, data.as_slice()))
        }
        EventKind::SysEx { data, escape: false } => TrackEventKind::SysEx(data.as_slice()),
        EventKind::SysEx { data, escape: true } => TrackEventKind::Escape(data.as_slice()),
    }
}

fn meta_to_midly(type_byte: u8, data: &[u8]) -> MetaMessage<'_> {
    match type_byte {
        0x01 => MetaMessage::Text(data),
        0x02 => MetaMessage::Copyright(data),
        0x04 => MetaMessage::InstrumentName(data),
        0x05 => MetaMessage::Lyric(data),
        0x06 => MetaMessage::Marker(data),
        0x07 => MetaMessage::CuePoint(data),
        0x08 => MetaMessage::ProgramName(data),
        0x09 => MetaMessage::DeviceName(data),
        0x7F => MetaMessage::SequencerSpecific(data),
        // Track number, port, channel prefix and SMPTE offset go out byte-for-byte
        _ => MetaMessage::Unknown(type_byte, data),
    }
}
