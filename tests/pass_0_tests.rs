//! Validation tests for Pass 0: Tempo Remap

use midly::Format;
use tidymidi::document::{Document, EventKind, TimedEvent};
use tidymidi::passes::pass_0;
use tidymidi::timeline::{collect_track, emit_track};
use tidymidi::Tempo;

fn note_on(key: u8) -> EventKind {
    EventKind::NoteOn {
        channel: 9,
        key,
        velocity: 100,
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

fn ticks(document: &Document, track: usize) -> Vec<u64> {
    collect_track(&document.tracks[track], track)
        .into_iter()
        .map(|e| e.tick)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_scale_tick_rounds_to_nearest() {
        assert_eq!(pass_0::scale_tick(480, 0.75), 360);
        assert_eq!(pass_0::scale_tick(100, 1.0 / 3.0), 33);
        assert_eq!(pass_0::scale_tick(200, 1.0 / 3.0), 67);
    }

    #[test]
    fn test_retime_scales_every_track() {
        let document = build_document(vec![
            vec![(0, EventKind::Tempo(500_000)), (960, note_on(36))],
            vec![(480, note_on(38)), (1920, note_on(42))],
        ]);
        let source = Tempo::from_bpm(120).unwrap();
        let target = Tempo::from_bpm(90).unwrap();

        let (retimed, summary) = pass_0::run(&document, source, target).unwrap();

        assert_eq!(summary.scale, 0.75);
        assert_eq!(summary.source_bpm, 120);
        assert_eq!(summary.target_bpm, 90);
        // tempo, note, end of track
        assert_eq!(ticks(&retimed, 0), vec![0, 720, 720]);
        assert_eq!(ticks(&retimed, 1), vec![360, 1440, 1440]);
        assert_eq!(
            retimed.tracks[0].events[0].kind,
            EventKind::Tempo(target.micros_per_beat())
        );
    }

    #[test]
    fn test_equal_tempos_only_rewrite_tempo() {
        let document = build_document(vec![vec![
            (0, EventKind::Tempo(400_000)),
            (123, note_on(36)),
            (777, note_on(38)),
        ]]);
        let tempo = Tempo::from_bpm(120).unwrap();

        let (retimed, summary) = pass_0::run(&document, tempo, tempo).unwrap();

        assert_eq!(summary.tempo_events_replaced, 1);
        assert_eq!(ticks(&retimed, 0), ticks(&document, 0));
        assert_eq!(retimed.tracks[0].events[0].kind, EventKind::Tempo(500_000));
    }

    #[test]
    fn test_tempo_only_written_to_first_track() {
        let document = build_document(vec![
            vec![(0, note_on(36))],
            vec![(0, EventKind::Tempo(500_000)), (480, note_on(38))],
        ]);
        let (retimed, summary) =
            pass_0::run(&document, Tempo::default(), Tempo::from_bpm(60).unwrap()).unwrap();

        assert_eq!(summary.tempo_events_replaced, 1);
        let tempos = |track: usize| {
            retimed.tracks[track]
                .events
                .iter()
                .filter(|e| e.kind.is_tempo())
                .count()
        };
        assert_eq!(tempos(0), 1);
        assert_eq!(tempos(1), 0);
        assert_eq!(ticks(&retimed, 1), vec![240, 240]);
    }
}
