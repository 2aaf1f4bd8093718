//! Tick/time model shared by every pass
//!
//! All grid arithmetic derives from the document's ticks-per-beat resolution
//! under a fixed 4/4 assumption: a sixteenth is a quarter of a beat, a measure
//! is four beats.

use crate::error::{PolishError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Beats in one measure (4/4 throughout)
pub const BEATS_PER_MEASURE: u64 = 4;

/// Sixteenth notes in one beat
pub const SIXTEENTHS_PER_BEAT: u64 = 4;

/// Largest value the SMF tempo meta event can carry (24 bits)
const MAX_MICROS_PER_BEAT: u64 = 0x00FF_FFFF;

/// Time base of one document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBase {
    ticks_per_beat: u64,
}

impl TimeBase {
    /// Create a time base, rejecting resolutions too coarse for a sixteenth grid
    pub fn new(ticks_per_beat: u16) -> Result<Self> {
        if u64::from(ticks_per_beat) < SIXTEENTHS_PER_BEAT {
            return Err(PolishError::InvalidResolution(ticks_per_beat));
        }
        Ok(Self {
            ticks_per_beat: u64::from(ticks_per_beat),
        })
    }

    pub fn ticks_per_beat(&self) -> u64 {
        self.ticks_per_beat
    }

    /// One quarter note (the beat in 4/4)
    pub fn ticks_per_quarter(&self) -> u64 {
        self.ticks_per_beat
    }

    /// Integer division, like the resolution itself: 470 ticks per beat gives 117
    pub fn ticks_per_16th(&self) -> u64 {
        self.ticks_per_beat / SIXTEENTHS_PER_BEAT
    }

    pub fn ticks_per_measure(&self) -> u64 {
        self.ticks_per_beat * BEATS_PER_MEASURE
    }

    /// Size of a drift-analysis chunk spanning `measures` measures
    pub fn chunk_ticks(&self, measures: u32) -> u64 {
        self.ticks_per_measure() * u64::from(measures)
    }

    /// Snap a tick to the nearest sixteenth-note grid line
    pub fn snap_to_grid(&self, tick: u64) -> u64 {
        round_to_multiple(tick, self.ticks_per_16th())
    }

    pub fn is_on_grid(&self, tick: u64) -> bool {
        tick % self.ticks_per_16th() == 0
    }

    /// Signed distance from the nearest measure start.
    ///
    /// A tick exactly half a measure from two measure starts is measured from
    /// the earlier one.
    pub fn strong_beat_deviation(&self, tick: u64) -> i64 {
        let measure = self.ticks_per_measure();
        let offset = tick % measure;
        if offset * 2 <= measure {
            offset as i64
        } else {
            offset as i64 - measure as i64
        }
    }

    /// Round a signed tick amount to the nearest whole number of sixteenths
    pub fn round_to_sixteenths(&self, ticks: f64) -> i64 {
        let step = self.ticks_per_16th() as f64;
        ((ticks / step).round_ties_even() * step) as i64
    }
}

/// Round `value` to the nearest multiple of `step`, ties to the even multiple
pub fn round_to_multiple(value: u64, step: u64) -> u64 {
    if step == 0 {
        return value;
    }
    let quotient = value / step;
    let remainder = value % step;
    let round_up = match (remainder * 2).cmp(&step) {
        Ordering::Greater => true,
        Ordering::Equal => quotient % 2 == 1,
        Ordering::Less => false,
    };
    (quotient + u64::from(round_up)) * step
}

/// Target tempo, validated on construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tempo {
    bpm: u32,
}

impl Tempo {
    pub fn from_bpm(bpm: u32) -> Result<Self> {
        if bpm == 0 || micros_for_bpm(bpm) > MAX_MICROS_PER_BEAT {
            return Err(PolishError::InvalidTempo(bpm));
        }
        Ok(Self { bpm })
    }

    pub fn bpm(&self) -> u32 {
        self.bpm
    }

    /// Microseconds per beat for the tempo meta event
    pub fn micros_per_beat(&self) -> u32 {
        micros_for_bpm(self.bpm) as u32
    }

    /// Ratio used to rescale a document rendered at `source` to this tempo
    pub fn scale_from(&self, source: Tempo) -> f64 {
        f64::from(self.bpm) / f64::from(source.bpm)
    }
}

impl Default for Tempo {
    /// 120 BPM, the Standard MIDI File default
    fn default() -> Self {
        Self { bpm: 120 }
    }
}

fn micros_for_bpm(bpm: u32) -> u64 {
    let bpm = u64::from(bpm);
    (60_000_000 + bpm / 2) / bpm
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_sizes_follow_resolution() {
        let tb = TimeBase::new(480).unwrap();
        assert_eq!(tb.ticks_per_16th(), 120);
        assert_eq!(tb.ticks_per_quarter(), 480);
        assert_eq!(tb.ticks_per_measure(), 1920);
        assert_eq!(tb.chunk_ticks(8), 15360);
    }

    #[test]
    fn rejects_resolution_below_one_tick_per_sixteenth() {
        assert!(matches!(
            TimeBase::new(3),
            Err(PolishError::InvalidResolution(3))
        ));
        assert!(TimeBase::new(4).is_ok());
    }

    #[test]
    fn snapping_rounds_half_to_even() {
        let tb = TimeBase::new(480).unwrap();
        assert_eq!(tb.snap_to_grid(100), 120);
        assert_eq!(tb.snap_to_grid(110), 120);
        assert_eq!(tb.snap_to_grid(59), 0);
        assert_eq!(tb.snap_to_grid(60), 0);
        assert_eq!(tb.snap_to_grid(180), 240);
        assert_eq!(tb.snap_to_grid(300), 240);
        assert_eq!(tb.snap_to_grid(301), 360);
    }

    #[test]
    fn strong_beat_deviation_is_signed() {
        let tb = TimeBase::new(480).unwrap();
        assert_eq!(tb.strong_beat_deviation(1920 + 120), 120);
        assert_eq!(tb.strong_beat_deviation(1920 - 120), -120);
        assert_eq!(tb.strong_beat_deviation(960), 960);
        assert_eq!(tb.strong_beat_deviation(961), -959);
    }

    #[test]
    fn sixteenth_rounding_of_averages() {
        let tb = TimeBase::new(480).unwrap();
        assert_eq!(tb.round_to_sixteenths(30.0), 0);
        assert_eq!(tb.round_to_sixteenths(60.0), 0);
        assert_eq!(tb.round_to_sixteenths(61.0), 120);
        assert_eq!(tb.round_to_sixteenths(-100.0), -120);
        assert_eq!(tb.round_to_sixteenths(180.0), 240);
    }

    #[test]
    fn tempo_conversion() {
        assert_eq!(Tempo::from_bpm(120).unwrap().micros_per_beat(), 500_000);
        assert_eq!(Tempo::from_bpm(90).unwrap().micros_per_beat(), 666_667);
        assert!(Tempo::from_bpm(0).is_err());
        assert!(Tempo::from_bpm(3).is_err());
        assert!(Tempo::from_bpm(4).is_ok());
    }
}
