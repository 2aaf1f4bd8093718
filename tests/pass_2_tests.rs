//! Validation tests for Pass 2: Chunked Drift Correction

use midly::Format;
use tidymidi::config::Config;
use tidymidi::document::{Document, EventKind, TimedEvent};
use tidymidi::passes::pass_2;
use tidymidi::timeline::{collect_track, emit_track};
use tidymidi::{PolishError, Tempo, TimeBase};

fn drum(key: u8) -> EventKind {
    EventKind::NoteOn {
        channel: 9,
        key,
        velocity: 100,
    }
}

fn piano(key: u8) -> EventKind {
    EventKind::NoteOn {
        channel: 0,
        key,
        velocity: 80,
    }
}

fn build_document(tracks: Vec<Vec<(u64, EventKind)>>) -> Document {
    let tracks = tracks
        .into_iter()
        .enumerate()
        .map(|(index, events)| {
            emit_track(
                events
                    .into_iter()
                    .map(|(tick, kind)| TimedEvent::new(tick, index, kind)),
            )
            .unwrap()
        })
        .collect();
    Document::new(Format::Parallel, 480, tracks)
}

/// Config with `measures`-measure chunks (1920 ticks per measure at 480 tpb)
fn config_with_chunks(measures: u32) -> Config {
    let mut config = Config::default();
    config.drift.chunk_measures = measures;
    config
}

fn note_ticks(document: &Document, track: usize) -> Vec<u64> {
    collect_track(&document.tracks[track], track)
        .into_iter()
        .filter(|e| e.kind.is_note())
        .map(|e| e.tick)
        .collect()
}

/// Piano on track 0, drums on track 1. Chunks of two measures (3840 ticks):
/// chunk 0 aligned, chunk 1 and 2 one sixteenth early.
fn drifting_document() -> Document {
    build_document(vec![
        vec![(0, piano(60)), (4000, piano(62)), (8000, piano(64))],
        vec![
            (0, drum(36)),
            (1920, drum(38)),
            (5640, drum(36)),
            (7560, drum(38)),
            (9480, drum(36)),
            (11400, drum(38)),
        ],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_small_offsets_round_to_no_shift() {
        let tb = TimeBase::new(480).unwrap();
        let analysis = pass_2::measure_misalignment(&[1950, 3870, 5790, 7710], &tb);

        assert_eq!(analysis.onsets, 4);
        assert_eq!(analysis.mean_deviation, Some(30.0));
        assert_eq!(analysis.shift, 0);
    }

    #[test]
    fn test_only_exactly_one_sixteenth_counts() {
        let tb = TimeBase::new(480).unwrap();

        // 0.4 of a sixteenth
        assert_eq!(pass_2::measure_misalignment(&[1968], &tb).shift, 0);
        // mean 100 rounds to one sixteenth late
        assert_eq!(pass_2::measure_misalignment(&[2020, 2020, 3840 + 100], &tb).shift, 120);
        // one sixteenth early
        assert_eq!(pass_2::measure_misalignment(&[1800, 3720], &tb).shift, -120);
        // two sixteenths is left alone
        assert_eq!(pass_2::measure_misalignment(&[2160, 4080], &tb).shift, 0);
        assert_eq!(pass_2::measure_misalignment(&[], &tb).mean_deviation, None);
    }

    #[test]
    fn test_detected_shift_applies_to_chunk_and_all_later_chunks() {
        let config = config_with_chunks(2);
        let (adjusted, report) =
            pass_2::run(&drifting_document(), Tempo::default(), &config).unwrap();

        assert_eq!(report.chunk_ticks, 3840);
        let detected: Vec<i64> = report.chunks.iter().map(|c| c.detected_shift).collect();
        let cumulative: Vec<i64> = report.chunks.iter().map(|c| c.cumulative_shift).collect();
        assert_eq!(detected, vec![0, -120, 0]);
        assert_eq!(cumulative, vec![0, -120, -120]);
        assert_eq!(report.total_shift, -120);
        assert_eq!(report.chunks[1].start_tick, 3840);

        assert_eq!(note_ticks(&adjusted, 0), vec![0, 3880, 7880]);
        assert_eq!(
            note_ticks(&adjusted, 1),
            vec![0, 1920, 5520, 7440, 9360, 11280]
        );
    }

    #[test]
    fn test_later_chunks_reflect_at_least_earlier_shifts() {
        let config = config_with_chunks(2);
        let (_, report) = pass_2::run(&drifting_document(), Tempo::default(), &config).unwrap();

        let mut applied = 0;
        for chunk in &report.chunks {
            applied += chunk.detected_shift;
            assert_eq!(chunk.cumulative_shift, applied);
        }
    }

    #[test]
    fn test_negative_times_clamp_to_zero() {
        let config = config_with_chunks(1);
        let document = build_document(vec![
            vec![
                (
                    50,
                    EventKind::ControlChange {
                        channel: 0,
                        controller: 7,
                        value: 100,
                    },
                ),
                (1000, piano(60)),
            ],
            vec![(1800, drum(36))],
        ]);

        let (adjusted, report) = pass_2::run(&document, Tempo::default(), &config).unwrap();

        assert_eq!(report.clamped_events, 1);
        let cc_ticks: Vec<u64> = collect_track(&adjusted.tracks[0], 0)
            .into_iter()
            .filter(|e| matches!(e.kind, EventKind::ControlChange { .. }))
            .map(|e| e.tick)
            .collect();
        assert_eq!(cc_ticks, vec![0]);
        assert_eq!(note_ticks(&adjusted, 0), vec![880]);
        assert_eq!(note_ticks(&adjusted, 1), vec![1680]);
    }

    #[test]
    fn test_empty_chunks_are_kept() {
        let config = config_with_chunks(1);
        let document = build_document(vec![vec![(0, drum(36)), (3 * 1920, drum(38))]]);

        let (_, report) = pass_2::run(&document, Tempo::default(), &config).unwrap();

        assert_eq!(report.chunks.len(), 4);
        assert_eq!(report.chunks[1].drum_onsets, 0);
        assert_eq!(report.chunks[1].mean_deviation, None);
        assert_eq!(report.shifted_chunks().count(), 0);
    }

    #[test]
    fn test_off_grid_drums_are_resnapped_first() {
        let config = config_with_chunks(8);
        let document = build_document(vec![vec![(1930, drum(36)), (3845, drum(38))]]);

        let (adjusted, report) = pass_2::run(&document, Tempo::default(), &config).unwrap();

        assert_eq!(report.resnapped_drum_events, 2);
        assert_eq!(note_ticks(&adjusted, 0), vec![1920, 3840]);
    }

    #[test]
    fn test_tempo_rewritten_once_at_start_of_first_track() {
        let document = build_document(vec![
            vec![(0, EventKind::Tempo(400_000)), (960, EventKind::Tempo(450_000))],
            vec![(0, drum(36))],
        ]);
        let tempo = Tempo::from_bpm(100).unwrap();

        let (adjusted, report) = pass_2::run(&document, tempo, &Config::default()).unwrap();

        assert_eq!(report.tempo_events_replaced, 2);
        assert_eq!(adjusted.tracks[0].events[0].kind, EventKind::Tempo(600_000));
        let tempos: usize = adjusted
            .tracks
            .iter()
            .flat_map(|t| t.events.iter())
            .filter(|e| e.kind.is_tempo())
            .count();
        assert_eq!(tempos, 1);
    }

    #[test]
    fn test_drum_events_stay_on_drum_channel() {
        let config = config_with_chunks(2);
        let (adjusted, _) = pass_2::run(&drifting_document(), Tempo::default(), &config).unwrap();

        for event in &adjusted.tracks[1].events {
            if event.kind.is_note() {
                assert_eq!(event.kind.channel(), Some(9));
            }
        }
    }

    #[test]
    fn test_invalid_drift_settings_are_rejected() {
        let document = drifting_document();

        let err = pass_2::run(&document, Tempo::default(), &config_with_chunks(0)).unwrap_err();
        assert!(matches!(err, PolishError::ConfigValidationFailed(_)));

        let mut config = config_with_chunks(2);
        config.drift.drum_channel = 16;
        let err = pass_2::run(&document, Tempo::default(), &config).unwrap_err();
        assert!(matches!(err, PolishError::ConfigValidationFailed(_)));
    }
}
