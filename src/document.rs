//! Document model: tracks of delta-timed events sharing one resolution

use crate::error::Result;
use crate::midi;
use crate::timebase::TimeBase;
use midly::{Format, MidiMessage};
use std::path::Path;

/// What an event does, independent of when it happens
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// Note start. A velocity of 0 is a release in running-status style.
    NoteOn { channel: u8, key: u8, velocity: u8 },
    NoteOff { channel: u8, key: u8, velocity: u8 },
    ControlChange {
        channel: u8,
        controller: u8,
        value: u8,
    },
    /// Program change, pitch bend, aftertouch
    Channel { channel: u8, message: MidiMessage },
    /// Set-tempo meta event, microseconds per beat
    Tempo(u32),
    /// Track name meta event, raw bytes as stored in the file
    TrackName(Vec<u8>),
    TimeSignature {
        numerator: u8,
        denominator_pow2: u8,
        clocks_per_click: u8,
        thirty_seconds_per_quarter: u8,
    },
    KeySignature { sharps: i8, minor: bool },
    EndOfTrack,
    /// Any other meta event as its type byte and payload
    Meta { type_byte: u8, data: Vec<u8> },
    /// System exclusive or escape packet
    SysEx { data: Vec<u8>, escape: bool },
}

impl EventKind {
    /// NoteOn or NoteOff, whatever the velocity
    pub fn is_note(&self) -> bool {
        matches!(self, EventKind::NoteOn { .. } | EventKind::NoteOff { .. })
    }

    /// NoteOn with a non-zero velocity
    pub fn is_sounding_note_on(&self) -> bool {
        matches!(self, EventKind::NoteOn { velocity, .. } if *velocity > 0)
    }

    /// NoteOff, or NoteOn with velocity 0
    pub fn is_note_release(&self) -> bool {
        matches!(
            self,
            EventKind::NoteOff { .. } | EventKind::NoteOn { velocity: 0, .. }
        )
    }

    /// `(channel, key)` of a note event
    pub fn note_key(&self) -> Option<(u8, u8)> {
        match self {
            EventKind::NoteOn { channel, key, .. } | EventKind::NoteOff { channel, key, .. } => {
                Some((*channel, *key))
            }
            _ => None,
        }
    }

    /// Channel of any channel-voice event
    pub fn channel(&self) -> Option<u8> {
        match self {
            EventKind::NoteOn { channel, .. }
            | EventKind::NoteOff { channel, .. }
            | EventKind::ControlChange { channel, .. } => Some(*channel),
            EventKind::Channel { channel, .. } => Some(*channel),
            _ => None,
        }
    }

    /// Same event moved to another channel; non-channel events are returned unchanged
    pub fn with_channel(self, new_channel: u8) -> Self {
        match self {
            EventKind::NoteOn { key, velocity, .. } => EventKind::NoteOn {
                channel: new_channel,
                key,
                velocity,
            },
            EventKind::NoteOff { key, velocity, .. } => EventKind::NoteOff {
                channel: new_channel,
                key,
                velocity,
            },
            EventKind::ControlChange {
                controller, value, ..
            } => EventKind::ControlChange {
                channel: new_channel,
                controller,
                value,
            },
            EventKind::Channel { message, .. } => EventKind::Channel {
                channel: new_channel,
                message,
            },
            other => other,
        }
    }

    pub fn is_tempo(&self) -> bool {
        matches!(self, EventKind::Tempo(_))
    }

    pub fn is_end_of_track(&self) -> bool {
        matches!(self, EventKind::EndOfTrack)
    }

    /// Meta events (tempo, names, signatures, end of track, ...)
    pub fn is_meta(&self) -> bool {
        matches!(
            self,
            EventKind::Tempo(_)
                | EventKind::TrackName(_)
                | EventKind::TimeSignature { .. }
                | EventKind::KeySignature { .. }
                | EventKind::EndOfTrack
                | EventKind::Meta { .. }
        )
    }

    /// Program change on `channel`
    pub fn program_change(channel: u8, program: u8) -> Self {
        EventKind::Channel {
            channel,
            message: MidiMessage::ProgramChange {
                program: program.into(),
            },
        }
    }
}

/// Event in wire form: ticks since the previous event of the same track
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub delta: u32,
    pub kind: EventKind,
}

impl Event {
    pub fn new(delta: u32, kind: EventKind) -> Self {
        Self { delta, kind }
    }
}

/// Event in working form: ticks since the start of its track
#[derive(Debug, Clone, PartialEq)]
pub struct TimedEvent {
    pub tick: u64,
    /// Index of the owning track within the document
    pub track: usize,
    pub kind: EventKind,
}

impl TimedEvent {
    pub fn new(tick: u64, track: usize, kind: EventKind) -> Self {
        Self { tick, track, kind }
    }
}

/// One lane of events, in delta-time order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Track {
    pub events: Vec<Event>,
}

impl Track {
    pub fn new(events: Vec<Event>) -> Self {
        Self { events }
    }

    pub fn note_on_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| e.kind.is_sounding_note_on())
            .count()
    }
}

/// Ordered tracks sharing one ticks-per-beat resolution
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub format: Format,
    pub ticks_per_beat: u16,
    pub tracks: Vec<Track>,
}

impl Document {
    pub fn new(format: Format, ticks_per_beat: u16, tracks: Vec<Track>) -> Self {
        Self {
            format,
            ticks_per_beat,
            tracks,
        }
    }

    /// Load and validate a Standard MIDI File
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        midi::read_document(path.as_ref())
    }

    /// Serialize in memory, then write the file in one call
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        midi::write_document(self, path.as_ref())
    }

    pub fn time_base(&self) -> Result<TimeBase> {
        TimeBase::new(self.ticks_per_beat)
    }

    pub fn note_on_count(&self) -> usize {
        self.tracks.iter().map(Track::note_on_count).sum()
    }
}
