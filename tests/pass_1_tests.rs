//! Validation tests for Pass 1: Quantization

use midly::Format;
use tidymidi::document::{Document, EventKind, TimedEvent};
use tidymidi::passes::{pass_1, pass_3};
use tidymidi::timeline::{collect_track, emit_track};
use tidymidi::Tempo;

fn note_on(channel: u8, key: u8) -> EventKind {
    EventKind::NoteOn {
        channel,
        key,
        velocity: 64,
    }
}

fn note_off(channel: u8, key: u8) -> EventKind {
    EventKind::NoteOff {
        channel,
        key,
        velocity: 0,
    }
}

/// Build a document from absolute-tick events, one list per track
fn build_document(ticks_per_beat: u16, tracks: Vec<Vec<(u64, EventKind)>>) -> Document {
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
    Document::new(Format::Parallel, ticks_per_beat, tracks)
}

/// Absolute ticks and kinds of one track, EndOfTrack excluded
fn timeline(document: &Document, track: usize) -> Vec<(u64, EventKind)> {
    collect_track(&document.tracks[track], track)
        .into_iter()
        .filter(|e| !e.kind.is_end_of_track())
        .map(|e| (e.tick, e.kind))
        .collect()
}

fn jittered_document() -> Document {
    build_document(
        480,
        vec![
            vec![
                (0, EventKind::Tempo(600_000)),
                (5, note_on(0, 60)),
                (50, EventKind::ControlChange {
                    channel: 0,
                    controller: 64,
                    value: 127,
                }),
                (233, note_off(0, 60)),
                (250, note_on(0, 62)),
                (470, note_off(0, 62)),
                (1000, EventKind::Tempo(550_000)),
            ],
            vec![
                (0, EventKind::Tempo(600_000)),
                (118, note_on(9, 36)),
                (361, note_on(9, 38)),
                (599, note_off(9, 36)),
                (841, note_off(9, 38)),
            ],
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_simultaneous_notes_collapse_into_one_group() {
        let document = build_document(480, vec![vec![(100, note_on(0, 60)), (110, note_on(0, 64))]]);
        let tempo = Tempo::from_bpm(120).unwrap();

        let (quantized, summary) = pass_1::run(&document, tempo).unwrap();

        assert_eq!(
            timeline(&quantized, 0),
            vec![
                (0, EventKind::Tempo(500_000)),
                (120, note_on(0, 60)),
                (120, note_on(0, 64)),
            ]
        );
        assert_eq!(summary.ticks_per_16th, 120);
        assert_eq!(summary.moved_note_events, 2);

        let events = collect_track(&quantized.tracks[0], 0);
        let groups = pass_3::group_notes(&events);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].start, 120);
        assert_eq!(groups[0].notes.len(), 2);
    }

    #[test]
    fn test_grid_property_holds_for_every_note_event() {
        let tempo = Tempo::from_bpm(97).unwrap();
        let (quantized, _) = pass_1::run(&jittered_document(), tempo).unwrap();

        for (index, track) in quantized.tracks.iter().enumerate() {
            for event in collect_track(track, index) {
                if event.kind.is_note() {
                    assert_eq!(event.tick % 120, 0, "{:?} is off the grid", event);
                }
            }
        }
    }

    #[test]
    fn test_quantizing_twice_is_a_no_op() {
        let tempo = Tempo::from_bpm(120).unwrap();
        let (once, _) = pass_1::run(&jittered_document(), tempo).unwrap();
        let (twice, summary) = pass_1::run(&once, tempo).unwrap();

        assert_eq!(once, twice);
        assert_eq!(summary.moved_note_events, 0);
        assert_eq!(summary.max_displacement_ticks, 0);
    }

    #[test]
    fn test_tempo_events_replaced_by_single_leading_tempo() {
        let tempo = Tempo::from_bpm(90).unwrap();
        let (quantized, summary) = pass_1::run(&jittered_document(), tempo).unwrap();

        let first = timeline(&quantized, 0);
        assert_eq!(first[0], (0, EventKind::Tempo(666_667)));
        assert_eq!(first.iter().filter(|(_, k)| k.is_tempo()).count(), 1);
        assert!(timeline(&quantized, 1).iter().all(|(_, k)| !k.is_tempo()));
        assert_eq!(summary.tempo_events_replaced, 3);
    }

    #[test]
    fn test_non_note_events_keep_their_ticks() {
        let tempo = Tempo::from_bpm(120).unwrap();
        let (quantized, _) = pass_1::run(&jittered_document(), tempo).unwrap();

        let control_changes: Vec<u64> = timeline(&quantized, 0)
            .into_iter()
            .filter(|(_, kind)| matches!(kind, EventKind::ControlChange { .. }))
            .map(|(tick, _)| tick)
            .collect();
        assert_eq!(control_changes, vec![50]);
    }

    #[test]
    fn test_collisions_keep_arrival_order() {
        let document = build_document(
            480,
            vec![vec![
                (118, note_on(0, 67)),
                (121, note_on(0, 60)),
                (125, note_on(0, 64)),
            ]],
        );
        let (quantized, _) = pass_1::run(&document, Tempo::default()).unwrap();

        let keys: Vec<u8> = timeline(&quantized, 0)
            .into_iter()
            .filter_map(|(_, kind)| kind.note_key().map(|(_, key)| key))
            .collect();
        assert_eq!(keys, vec![67, 60, 64]);
    }

    #[test]
    fn test_halfway_ticks_round_to_even_grid_line() {
        let document = build_document(
            480,
            vec![vec![(60, note_on(0, 60)), (180, note_on(0, 62)), (300, note_on(0, 64))]],
        );
        let (quantized, _) = pass_1::run(&document, Tempo::default()).unwrap();

        let ticks: Vec<u64> = timeline(&quantized, 0)
            .into_iter()
            .filter(|(_, kind)| kind.is_note())
            .map(|(tick, _)| tick)
            .collect();
        assert_eq!(ticks, vec![0, 240, 240]);
    }

    #[test]
    fn test_every_track_ends_with_one_end_of_track() {
        let (quantized, _) = pass_1::run(&jittered_document(), Tempo::default()).unwrap();

        for track in &quantized.tracks {
            let ends = track.events.iter().filter(|e| e.kind.is_end_of_track()).count();
            assert_eq!(ends, 1);
            assert!(track.events.last().unwrap().kind.is_end_of_track());
        }
    }
}
