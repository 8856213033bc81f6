//! Event-stream to Standard MIDI File rendering.

use crate::event::{EventKind, EventStream, DEFAULT_US_PER_BEAT};

/// Render a stream as a format 1 file.
///
/// Track 0 carries the tempo map; each source track becomes one note
/// track on channel 0, so decoding the output yields the same notes,
/// tempos, and pedal positions with every track index shifted by one.
/// End-of-track lands on the stream's final tick, which keeps trailing
/// silence through a round trip.
pub fn encode(stream: &EventStream) -> Vec<u8> {
    let mut tracks = Vec::with_capacity(stream.track_count + 1);
    tracks.push(build_tempo_track(stream));
    for track in 0..stream.track_count {
        tracks.push(build_note_track(stream, track));
    }

    let mut out = Vec::new();
    out.extend_from_slice(b"MThd");
    out.extend_from_slice(&6u32.to_be_bytes());
    out.extend_from_slice(&1u16.to_be_bytes());
    out.extend_from_slice(&(tracks.len() as u16).to_be_bytes());
    out.extend_from_slice(&stream.ticks_per_beat.to_be_bytes());
    for track in &tracks {
        out.extend_from_slice(track);
    }
    out
}

/// Append a MIDI variable-length quantity, most significant 7 bits
/// first. Values beyond the four-byte SMF maximum are clamped.
fn write_vlq(out: &mut Vec<u8>, value: u64) {
    let mut value = value.min(0x0FFF_FFFF) as u32;
    let mut bytes = [0u8; 4];
    let mut count = 0;
    loop {
        bytes[count] = (value & 0x7F) as u8;
        value >>= 7;
        count += 1;
        if value == 0 {
            break;
        }
    }
    for i in (0..count).rev() {
        let mut byte = bytes[i];
        if i > 0 {
            byte |= 0x80;
        }
        out.push(byte);
    }
}

fn finish_track(body: Vec<u8>) -> Vec<u8> {
    let mut chunk = Vec::with_capacity(body.len() + 8);
    chunk.extend_from_slice(b"MTrk");
    chunk.extend_from_slice(&(body.len() as u32).to_be_bytes());
    chunk.extend_from_slice(&body);
    chunk
}

fn build_tempo_track(stream: &EventStream) -> Vec<u8> {
    let mut changes: Vec<(u64, u32)> = stream
        .events
        .iter()
        .filter_map(|e| match e.kind {
            EventKind::Tempo { us_per_beat } => Some((e.tick, us_per_beat)),
            _ => None,
        })
        .collect();
    // Make the initial tempo explicit so reading the file back does
    // not depend on the decoder's default.
    if changes.first().map_or(true, |&(tick, _)| tick > 0) {
        changes.insert(0, (0, DEFAULT_US_PER_BEAT));
    }

    let mut body = Vec::new();
    let mut last_tick = 0;
    for (tick, us_per_beat) in changes {
        write_vlq(&mut body, tick - last_tick);
        body.extend_from_slice(&[0xFF, 0x51, 0x03]);
        let us = us_per_beat.to_be_bytes();
        body.extend_from_slice(&[us[1], us[2], us[3]]);
        last_tick = tick;
    }
    write_vlq(&mut body, stream.final_tick.saturating_sub(last_tick));
    body.extend_from_slice(&[0xFF, 0x2F, 0x00]);
    finish_track(body)
}

fn build_note_track(stream: &EventStream, track: usize) -> Vec<u8> {
    // Note-offs sort before simultaneous note-ons so a retriggered
    // note is not cut off by its own release.
    let mut events: Vec<(u64, u8, EventKind)> = stream
        .events
        .iter()
        .filter(|e| e.track == track)
        .filter_map(|e| match e.kind {
            EventKind::NoteOff { .. } => Some((e.tick, 0, e.kind)),
            EventKind::Pedal { .. } => Some((e.tick, 1, e.kind)),
            EventKind::NoteOn { .. } => Some((e.tick, 2, e.kind)),
            EventKind::Tempo { .. } => None,
        })
        .collect();
    events.sort_by_key(|&(tick, rank, _)| (tick, rank));

    let mut body = Vec::new();
    if let Some(Some(name)) = stream.track_names.get(track) {
        body.extend_from_slice(&[0x00, 0xFF, 0x03]);
        write_vlq(&mut body, name.len() as u64);
        body.extend_from_slice(name.as_bytes());
    }
    let mut last_tick = 0;
    for (tick, _, kind) in events {
        write_vlq(&mut body, tick - last_tick);
        match kind {
            EventKind::NoteOn { pitch, velocity } => {
                body.extend_from_slice(&[0x90, pitch, velocity]);
            }
            EventKind::NoteOff { pitch } => {
                body.extend_from_slice(&[0x80, pitch, 0]);
            }
            EventKind::Pedal { value } => {
                body.extend_from_slice(&[0xB0, 64, value]);
            }
            EventKind::Tempo { .. } => {}
        }
        last_tick = tick;
    }
    write_vlq(&mut body, stream.final_tick.saturating_sub(last_tick));
    body.extend_from_slice(&[0xFF, 0x2F, 0x00]);
    finish_track(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decode;
    use crate::event::MusicEvent;
    use pretty_assertions::assert_eq;

    fn event(tick: u64, track: usize, kind: EventKind) -> MusicEvent {
        MusicEvent { tick, track, kind }
    }

    fn two_note_stream() -> EventStream {
        EventStream {
            ticks_per_beat: 480,
            track_count: 2,
            track_names: vec![Some("right hand".to_owned()), None],
            final_tick: 1920,
            events: vec![
                event(
                    0,
                    0,
                    EventKind::Tempo {
                        us_per_beat: 1_000_000,
                    },
                ),
                event(
                    0,
                    0,
                    EventKind::NoteOn {
                        pitch: 60,
                        velocity: 100,
                    },
                ),
                event(0, 1, EventKind::Pedal { value: 127 }),
                event(
                    480,
                    1,
                    EventKind::NoteOn {
                        pitch: 72,
                        velocity: 64,
                    },
                ),
                event(960, 0, EventKind::NoteOff { pitch: 60 }),
                event(960, 1, EventKind::NoteOff { pitch: 72 }),
                event(960, 1, EventKind::Pedal { value: 0 }),
            ],
        }
    }

    #[test]
    fn vlq_encoding_boundaries() {
        let cases: [(u64, &[u8]); 6] = [
            (0, &[0x00]),
            (0x7F, &[0x7F]),
            (0x80, &[0x81, 0x00]),
            (0x3FFF, &[0xFF, 0x7F]),
            (0x4000, &[0x81, 0x80, 0x00]),
            (0x0FFF_FFFF, &[0xFF, 0xFF, 0xFF, 0x7F]),
        ];
        for (value, expected) in cases {
            let mut buf = Vec::new();
            write_vlq(&mut buf, value);
            assert_eq!(buf, expected, "value {value:#x}");
        }
    }

    #[test]
    fn round_trip_keeps_notes_tempos_and_pedals() {
        let stream = two_note_stream();
        let decoded = decode(&encode(&stream)).unwrap();

        assert_eq!(decoded.ticks_per_beat, 480);
        // Tempo track in front shifts every source track up by one.
        assert_eq!(decoded.track_count, 3);
        assert_eq!(decoded.final_tick, 1920);
        let expected: Vec<MusicEvent> = stream
            .events
            .iter()
            .map(|e| MusicEvent {
                tick: e.tick,
                track: if matches!(e.kind, EventKind::Tempo { .. }) {
                    0
                } else {
                    e.track + 1
                },
                kind: e.kind,
            })
            .collect();
        assert_eq!(decoded.events, expected);
        assert_eq!(
            decoded.track_names,
            vec![None, Some("right hand".to_owned()), None]
        );
    }

    #[test]
    fn default_tempo_is_written_when_stream_has_none() {
        let stream = EventStream {
            ticks_per_beat: 96,
            track_count: 1,
            track_names: vec![None],
            final_tick: 96,
            events: vec![
                event(
                    0,
                    0,
                    EventKind::NoteOn {
                        pitch: 60,
                        velocity: 90,
                    },
                ),
                event(96, 0, EventKind::NoteOff { pitch: 60 }),
            ],
        };
        let decoded = decode(&encode(&stream)).unwrap();
        assert_eq!(decoded.initial_us_per_beat(), DEFAULT_US_PER_BEAT);
        assert_eq!(decoded.duration_seconds(), 0.5);
    }

    #[test]
    fn note_off_is_written_before_simultaneous_note_on() {
        let stream = EventStream {
            ticks_per_beat: 480,
            track_count: 1,
            track_names: vec![None],
            final_tick: 960,
            events: vec![
                event(
                    0,
                    0,
                    EventKind::NoteOn {
                        pitch: 60,
                        velocity: 100,
                    },
                ),
                event(
                    480,
                    0,
                    EventKind::NoteOn {
                        pitch: 60,
                        velocity: 80,
                    },
                ),
                event(480, 0, EventKind::NoteOff { pitch: 60 }),
                event(960, 0, EventKind::NoteOff { pitch: 60 }),
            ],
        };
        let decoded = decode(&encode(&stream)).unwrap();
        let kinds: Vec<EventKind> = decoded.events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds[1..],
            [
                EventKind::NoteOn {
                    pitch: 60,
                    velocity: 100
                },
                EventKind::NoteOff { pitch: 60 },
                EventKind::NoteOn {
                    pitch: 60,
                    velocity: 80
                },
                EventKind::NoteOff { pitch: 60 },
            ]
        );
    }

    #[test]
    fn output_parses_with_midly() {
        let bytes = encode(&two_note_stream());
        let smf = midly::Smf::parse(&bytes).unwrap();

        assert_eq!(smf.header.format, midly::Format::Parallel);
        assert_eq!(smf.tracks.len(), 3);
        match smf.header.timing {
            midly::Timing::Metrical(tpb) => assert_eq!(tpb.as_int(), 480),
            other => panic!("unexpected timing {other:?}"),
        }

        let has_tempo = smf.tracks[0].iter().any(|e| {
            matches!(
                e.kind,
                midly::TrackEventKind::Meta(midly::MetaMessage::Tempo(t)) if t.as_int() == 1_000_000
            )
        });
        assert!(has_tempo, "tempo track should carry the tempo meta");

        let note_ons = smf.tracks[1]
            .iter()
            .filter(|e| {
                matches!(
                    e.kind,
                    midly::TrackEventKind::Midi {
                        message: midly::MidiMessage::NoteOn { .. },
                        ..
                    }
                )
            })
            .count();
        assert_eq!(note_ons, 1);
    }
}
