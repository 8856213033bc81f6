//! Standard MIDI File parsing.
//!
//! Each MTrk chunk gets its own [`TrackCursor`] that walks the chunk
//! one event at a time, and a min-heap keyed by `(tick, track)` holds
//! the next pending event of every unfinished track. Pulling from the
//! heap and refilling from the popped track merges the file without
//! ever materialising per-track event lists.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};

use crate::event::{EventKind, EventStream, MusicEvent};
use crate::{DecodeError, Result};

const SUSTAIN_PEDAL: u8 = 64;
const META_TRACK_NAME: u8 = 0x03;
const META_END_OF_TRACK: u8 = 0x2F;
const META_TEMPO: u8 = 0x51;

/// Decode a Standard MIDI File into one merged event stream.
///
/// All tracks share the tick timeline (format 0 files simply have one
/// track). Ties at the same tick order by track index. Notes still
/// sounding when their track ends are closed at the file's final tick.
pub fn decode(bytes: &[u8]) -> Result<EventStream> {
    let mut reader = Reader::new(bytes);
    let header = parse_header(&mut reader)?;

    let mut cursors = Vec::with_capacity(usize::from(header.track_count));
    let mut found: u16 = 0;
    while found < header.track_count {
        if reader.remaining() == 0 {
            return Err(DecodeError::MissingTracks {
                declared: header.track_count,
                found,
            });
        }
        let chunk_offset = reader.pos;
        let tag = reader.bytes(4)?;
        let declared = reader.u32_be()?;
        let available = reader.remaining();
        if declared as usize > available {
            return Err(DecodeError::ChunkOverrun {
                chunk: String::from_utf8_lossy(tag).into_owned(),
                offset: chunk_offset,
                declared,
                available,
            });
        }
        let start = reader.pos;
        let end = start + declared as usize;
        reader.pos = end;
        if tag == b"MTrk" {
            cursors.push(TrackCursor::new(bytes, start, end));
            found += 1;
        }
        // Alien chunk types are skipped, as the SMF spec asks.
    }

    let track_count = cursors.len();
    let mut merge = EventMerge::new(cursors)?;
    let mut events: Vec<MusicEvent> = Vec::new();
    let mut open_notes: HashMap<(usize, u8), u32> = HashMap::new();
    while let Some(event) = merge.next_event()? {
        match event.kind {
            EventKind::NoteOn { pitch, .. } => {
                *open_notes.entry((event.track, pitch)).or_insert(0) += 1;
            }
            EventKind::NoteOff { pitch } => {
                // Unmatched NoteOffs are kept in the stream but do not
                // drive the depth below zero.
                if let Some(depth) = open_notes.get_mut(&(event.track, pitch)) {
                    *depth = depth.saturating_sub(1);
                }
            }
            _ => {}
        }
        events.push(event);
    }

    let EventMerge {
        names, end_ticks, ..
    } = merge;
    let final_tick = end_ticks
        .iter()
        .copied()
        .max()
        .unwrap_or(0)
        .max(events.last().map_or(0, |e| e.tick));

    // Close dangling notes at the end of the file, one NoteOff per
    // unmatched NoteOn.
    let mut dangling: Vec<(usize, u8, u32)> = open_notes
        .into_iter()
        .filter(|(_, depth)| *depth > 0)
        .map(|((track, pitch), depth)| (track, pitch, depth))
        .collect();
    dangling.sort_unstable();
    for (track, pitch, depth) in dangling {
        for _ in 0..depth {
            events.push(MusicEvent {
                tick: final_tick,
                track,
                kind: EventKind::NoteOff { pitch },
            });
        }
    }
    // The merge already ordered everything; a stable sort just slots
    // the synthesized closes in among other final-tick events.
    events.sort_by_key(|e| (e.tick, e.track));

    Ok(EventStream {
        ticks_per_beat: header.ticks_per_beat,
        track_count,
        track_names: names,
        final_tick,
        events,
    })
}

struct FileHeader {
    track_count: u16,
    ticks_per_beat: u16,
}

fn parse_header(reader: &mut Reader) -> Result<FileHeader> {
    if reader.remaining() < 8 {
        return Err(DecodeError::NotMidi);
    }
    if reader.bytes(4)? != b"MThd" {
        return Err(DecodeError::NotMidi);
    }
    let declared = reader.u32_be()?;
    if declared < 6 {
        return Err(DecodeError::NotMidi);
    }
    if declared as usize > reader.remaining() {
        return Err(DecodeError::ChunkOverrun {
            chunk: "MThd".to_owned(),
            offset: 0,
            declared,
            available: reader.remaining(),
        });
    }
    let body_end = reader.pos + declared as usize;
    let _format = reader.u16_be()?;
    let track_count = reader.u16_be()?;
    let division = reader.u16_be()?;
    // Only ticks-per-quarter-note timing; SMPTE division has the high
    // bit set and zero ticks would make time stand still.
    if division == 0 || division & 0x8000 != 0 {
        return Err(DecodeError::BadDivision { division });
    }
    reader.pos = body_end;
    Ok(FileHeader {
        track_count,
        ticks_per_beat: division,
    })
}

/// Byte cursor over a window of the input, reporting absolute offsets.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    end: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self::window(data, 0, data.len())
    }

    fn window(data: &'a [u8], start: usize, end: usize) -> Self {
        Self {
            data,
            pos: start,
            end,
        }
    }

    fn remaining(&self) -> usize {
        self.end - self.pos
    }

    fn u8(&mut self) -> Result<u8> {
        if self.pos >= self.end {
            return Err(DecodeError::Truncated { offset: self.pos });
        }
        let byte = self.data[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    /// Read one data byte, which must have the high bit clear.
    fn data_byte(&mut self) -> Result<u8> {
        let offset = self.pos;
        let byte = self.u8()?;
        if byte >= 0x80 {
            return Err(DecodeError::BadDataByte { byte, offset });
        }
        Ok(byte)
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(DecodeError::Truncated { offset: self.pos });
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn u16_be(&mut self) -> Result<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32_be(&mut self) -> Result<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// MIDI variable-length quantity: 7 bits per byte, high bit chains,
    /// at most four bytes.
    fn vlq(&mut self) -> Result<u32> {
        let start = self.pos;
        let mut value: u32 = 0;
        for _ in 0..4 {
            let byte = self.u8()?;
            value = (value << 7) | u32::from(byte & 0x7F);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(DecodeError::VlqTooLong { offset: start })
    }
}

/// Output of one step of a track cursor.
enum TrackStep {
    Event(u64, EventKind),
    Name(String),
    Done,
}

/// Incremental parser over one MTrk chunk body.
struct TrackCursor<'a> {
    reader: Reader<'a>,
    tick: u64,
    running_status: Option<u8>,
    done: bool,
}

impl<'a> TrackCursor<'a> {
    fn new(data: &'a [u8], start: usize, end: usize) -> Self {
        Self {
            reader: Reader::window(data, start, end),
            tick: 0,
            running_status: None,
            done: false,
        }
    }

    /// Advance to the next timeline event or track name. Returns
    /// `Done` at the end-of-track meta event, or when the chunk runs
    /// out of bytes without one.
    fn next_step(&mut self) -> Result<TrackStep> {
        while !self.done {
            if self.reader.remaining() == 0 {
                self.done = true;
                break;
            }
            self.tick += u64::from(self.reader.vlq()?);
            let offset = self.reader.pos;
            let status = self.reader.u8()?;
            let step = if status >= 0xF0 {
                self.system_event(status)?
            } else {
                let status = if status < 0x80 {
                    // Running status: rewind so this byte is read again
                    // as the first data byte of the reused status.
                    self.reader.pos = offset;
                    self.running_status
                        .ok_or(DecodeError::OrphanDataByte {
                            byte: status,
                            offset,
                        })?
                } else {
                    self.running_status = Some(status);
                    status
                };
                self.channel_event(status)?
            };
            if let Some(step) = step {
                return Ok(step);
            }
        }
        Ok(TrackStep::Done)
    }

    fn channel_event(&mut self, status: u8) -> Result<Option<TrackStep>> {
        let kind = match status & 0xF0 {
            0x80 => {
                let pitch = self.reader.data_byte()?;
                let _release_velocity = self.reader.data_byte()?;
                Some(EventKind::NoteOff { pitch })
            }
            0x90 => {
                let pitch = self.reader.data_byte()?;
                let velocity = self.reader.data_byte()?;
                if velocity == 0 {
                    // NoteOn with velocity 0 is the other spelling of
                    // NoteOff, common under running status.
                    Some(EventKind::NoteOff { pitch })
                } else {
                    Some(EventKind::NoteOn { pitch, velocity })
                }
            }
            0xB0 => {
                let controller = self.reader.data_byte()?;
                let value = self.reader.data_byte()?;
                if controller == SUSTAIN_PEDAL {
                    Some(EventKind::Pedal { value })
                } else {
                    None
                }
            }
            0xA0 | 0xE0 => {
                self.reader.data_byte()?;
                self.reader.data_byte()?;
                None
            }
            // 0xC0 and 0xD0 carry a single data byte.
            _ => {
                self.reader.data_byte()?;
                None
            }
        };
        Ok(kind.map(|kind| TrackStep::Event(self.tick, kind)))
    }

    fn system_event(&mut self, status: u8) -> Result<Option<TrackStep>> {
        match status {
            0xF0 | 0xF7 => {
                // SysEx: length-prefixed payload.
                let len = self.reader.vlq()? as usize;
                self.reader.bytes(len)?;
                Ok(None)
            }
            0xFF => self.meta_event(),
            // System common bytes have no business in a stored file;
            // skip their operands if they appear anyway.
            0xF1 | 0xF3 => {
                self.reader.u8()?;
                Ok(None)
            }
            0xF2 => {
                self.reader.bytes(2)?;
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    fn meta_event(&mut self) -> Result<Option<TrackStep>> {
        let kind = self.reader.u8()?;
        let len = self.reader.vlq()? as usize;
        let data = self.reader.bytes(len)?;
        match kind {
            META_END_OF_TRACK => {
                self.done = true;
                Ok(Some(TrackStep::Done))
            }
            META_TEMPO if len >= 3 => {
                let us_per_beat =
                    u32::from(data[0]) << 16 | u32::from(data[1]) << 8 | u32::from(data[2]);
                Ok(Some(TrackStep::Event(
                    self.tick,
                    EventKind::Tempo { us_per_beat },
                )))
            }
            META_TRACK_NAME => Ok(Some(TrackStep::Name(
                String::from_utf8_lossy(data).into_owned(),
            ))),
            _ => Ok(None),
        }
    }
}

/// The next undelivered event of one track, keyed for the merge heap.
struct PendingEvent {
    tick: u64,
    track: usize,
    kind: EventKind,
}

impl PartialEq for PendingEvent {
    fn eq(&self, other: &Self) -> bool {
        self.tick == other.tick && self.track == other.track
    }
}

impl Eq for PendingEvent {}

impl PartialOrd for PendingEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.tick, self.track).cmp(&(other.tick, other.track))
    }
}

/// K-way merge of track cursors. The heap holds at most one pending
/// event per track, which keeps same-tick events of a track in file
/// order.
struct EventMerge<'a> {
    cursors: Vec<TrackCursor<'a>>,
    heap: BinaryHeap<Reverse<PendingEvent>>,
    names: Vec<Option<String>>,
    end_ticks: Vec<u64>,
}

impl<'a> EventMerge<'a> {
    fn new(cursors: Vec<TrackCursor<'a>>) -> Result<Self> {
        let count = cursors.len();
        let mut merge = EventMerge {
            cursors,
            heap: BinaryHeap::with_capacity(count),
            names: vec![None; count],
            end_ticks: vec![0; count],
        };
        for track in 0..count {
            merge.refill(track)?;
        }
        Ok(merge)
    }

    /// Pull from one track until it yields a timeline event or ends.
    fn refill(&mut self, track: usize) -> Result<()> {
        loop {
            match self.cursors[track].next_step()? {
                TrackStep::Event(tick, kind) => {
                    self.heap.push(Reverse(PendingEvent { tick, track, kind }));
                    return Ok(());
                }
                TrackStep::Name(name) => {
                    // First name wins if a track carries several.
                    let slot = &mut self.names[track];
                    if slot.is_none() {
                        *slot = Some(name);
                    }
                }
                TrackStep::Done => {
                    self.end_ticks[track] = self.cursors[track].tick;
                    return Ok(());
                }
            }
        }
    }

    fn next_event(&mut self) -> Result<Option<MusicEvent>> {
        let Some(Reverse(next)) = self.heap.pop() else {
            return Ok(None);
        };
        self.refill(next.track)?;
        Ok(Some(MusicEvent {
            tick: next.tick,
            track: next.track,
            kind: next.kind,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn header(track_count: u16, division: u16) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"MThd");
        buf.extend_from_slice(&6u32.to_be_bytes());
        buf.extend_from_slice(&1u16.to_be_bytes());
        buf.extend_from_slice(&track_count.to_be_bytes());
        buf.extend_from_slice(&division.to_be_bytes());
        buf
    }

    /// Wrap event bytes in an MTrk chunk, appending end-of-track.
    fn track_chunk(body: &[u8]) -> Vec<u8> {
        let mut data = body.to_vec();
        data.extend_from_slice(&[0x00, 0xFF, 0x2F, 0x00]);
        let mut chunk = Vec::new();
        chunk.extend_from_slice(b"MTrk");
        chunk.extend_from_slice(&(data.len() as u32).to_be_bytes());
        chunk.extend_from_slice(&data);
        chunk
    }

    fn on(tick: u64, track: usize, pitch: u8, velocity: u8) -> MusicEvent {
        MusicEvent {
            tick,
            track,
            kind: EventKind::NoteOn { pitch, velocity },
        }
    }

    fn off(tick: u64, track: usize, pitch: u8) -> MusicEvent {
        MusicEvent {
            tick,
            track,
            kind: EventKind::NoteOff { pitch },
        }
    }

    #[test]
    fn decodes_a_single_note() {
        let mut buf = header(1, 480);
        let mut body = Vec::new();
        body.extend_from_slice(&[0x00, 0x90, 60, 100]);
        // Delta 480 as a two-byte VLQ.
        body.extend_from_slice(&[0x83, 0x60, 0x80, 60, 0]);
        buf.extend_from_slice(&track_chunk(&body));

        let stream = decode(&buf).unwrap();
        assert_eq!(stream.ticks_per_beat, 480);
        assert_eq!(stream.track_count, 1);
        assert_eq!(stream.final_tick, 480);
        assert_eq!(stream.events, vec![on(0, 0, 60, 100), off(480, 0, 60)]);
    }

    #[test]
    fn note_on_with_zero_velocity_is_a_note_off() {
        let mut buf = header(1, 96);
        let body = [0x00, 0x90, 72, 64, 0x60, 0x90, 72, 0];
        buf.extend_from_slice(&track_chunk(&body));

        let stream = decode(&buf).unwrap();
        assert_eq!(stream.events, vec![on(0, 0, 72, 64), off(96, 0, 72)]);
    }

    #[test]
    fn running_status_reuses_the_previous_status() {
        let mut buf = header(1, 96);
        // One explicit NoteOn, then two more notes without status bytes.
        let body = [
            0x00, 0x90, 60, 100, //
            0x00, 64, 100, //
            0x10, 60, 0, //
            0x00, 64, 0,
        ];
        buf.extend_from_slice(&track_chunk(&body));

        let stream = decode(&buf).unwrap();
        assert_eq!(
            stream.events,
            vec![
                on(0, 0, 60, 100),
                on(0, 0, 64, 100),
                off(16, 0, 60),
                off(16, 0, 64),
            ]
        );
    }

    #[test]
    fn running_status_survives_a_meta_event() {
        let mut buf = header(1, 96);
        let body = [
            0x00, 0x90, 60, 100, //
            0x00, 0xFF, 0x03, 0x02, b'l', b'h', //
            0x20, 60, 0,
        ];
        buf.extend_from_slice(&track_chunk(&body));

        let stream = decode(&buf).unwrap();
        assert_eq!(stream.track_names, vec![Some("lh".to_owned())]);
        assert_eq!(stream.events, vec![on(0, 0, 60, 100), off(32, 0, 60)]);
    }

    #[test]
    fn merges_tracks_by_tick_then_track_index() {
        let mut buf = header(2, 480);
        let track1 = [
            0x00, 0x90, 60, 100, //
            0x83, 0x60, 0x80, 60, 0,
        ];
        let track2 = [
            0x60, 0x90, 72, 90, //
            0x83, 0x00, 0x80, 72, 0,
        ];
        buf.extend_from_slice(&track_chunk(&track1));
        buf.extend_from_slice(&track_chunk(&track2));

        let stream = decode(&buf).unwrap();
        assert_eq!(stream.track_count, 2);
        assert_eq!(
            stream.events,
            vec![
                on(0, 0, 60, 100),
                on(96, 1, 72, 90),
                off(480, 0, 60),
                off(480, 1, 72),
            ]
        );
    }

    #[test]
    fn same_tick_events_order_by_track() {
        let mut buf = header(2, 480);
        buf.extend_from_slice(&track_chunk(&[0x00, 0x90, 60, 100, 0x00, 0x80, 60, 0]));
        buf.extend_from_slice(&track_chunk(&[0x00, 0x90, 64, 80, 0x00, 0x80, 64, 0]));

        let stream = decode(&buf).unwrap();
        let tracks: Vec<usize> = stream.events.iter().map(|e| e.track).collect();
        assert_eq!(tracks, vec![0, 0, 1, 1]);
    }

    #[test]
    fn dangling_notes_close_at_the_final_tick() {
        let mut buf = header(2, 480);
        // Track 0 never releases its note.
        buf.extend_from_slice(&track_chunk(&[0x00, 0x90, 60, 100]));
        // Track 1 ends later, pushing the final tick out to 960.
        let track2 = [
            0x00, 0x90, 72, 90, //
            0x87, 0x40, 0x80, 72, 0,
        ];
        buf.extend_from_slice(&track_chunk(&track2));

        let stream = decode(&buf).unwrap();
        assert_eq!(stream.final_tick, 960);
        assert_eq!(
            stream.events,
            vec![
                on(0, 0, 60, 100),
                on(0, 1, 72, 90),
                off(960, 0, 60),
                off(960, 1, 72),
            ]
        );
    }

    #[test]
    fn tempo_and_sustain_pedal_are_kept_other_controllers_dropped() {
        let mut buf = header(1, 480);
        let body = [
            0x00, 0xFF, 0x51, 0x03, 0x0F, 0x42, 0x40, // tempo 1_000_000
            0x00, 0xB0, 7, 100, // channel volume: dropped
            0x00, 0xB0, 64, 127, // sustain down
            0x60, 0xB0, 64, 0, // sustain up
        ];
        buf.extend_from_slice(&track_chunk(&body));

        let stream = decode(&buf).unwrap();
        assert_eq!(
            stream.events,
            vec![
                MusicEvent {
                    tick: 0,
                    track: 0,
                    kind: EventKind::Tempo {
                        us_per_beat: 1_000_000
                    },
                },
                MusicEvent {
                    tick: 0,
                    track: 0,
                    kind: EventKind::Pedal { value: 127 },
                },
                MusicEvent {
                    tick: 96,
                    track: 0,
                    kind: EventKind::Pedal { value: 0 },
                },
            ]
        );
    }

    #[test]
    fn skips_program_change_pitch_bend_and_sysex() {
        let mut buf = header(1, 480);
        let body = [
            0x00, 0xC0, 5, // program change
            0x00, 0xE0, 0x00, 0x40, // pitch bend
            0x00, 0xF0, 0x02, 0x01, 0xF7, // sysex with two payload bytes
            0x00, 0x90, 60, 100, //
            0x10, 0x80, 60, 0,
        ];
        buf.extend_from_slice(&track_chunk(&body));

        let stream = decode(&buf).unwrap();
        assert_eq!(stream.events, vec![on(0, 0, 60, 100), off(16, 0, 60)]);
    }

    #[test]
    fn skips_alien_chunks_between_tracks() {
        let mut buf = header(1, 480);
        buf.extend_from_slice(b"XFIH");
        buf.extend_from_slice(&3u32.to_be_bytes());
        buf.extend_from_slice(&[1, 2, 3]);
        buf.extend_from_slice(&track_chunk(&[0x00, 0x90, 60, 100, 0x00, 0x80, 60, 0]));

        let stream = decode(&buf).unwrap();
        assert_eq!(stream.track_count, 1);
        assert_eq!(stream.note_on_count(), 1);
    }

    #[test]
    fn rejects_non_midi_bytes() {
        assert_eq!(decode(b"RIFF1234WAVE"), Err(DecodeError::NotMidi));
        assert_eq!(decode(b""), Err(DecodeError::NotMidi));
    }

    #[test]
    fn rejects_smpte_and_zero_division() {
        let mut smpte = header(1, 0);
        smpte[12] = 0xE7; // -25 fps SMPTE division
        smpte[13] = 0x28;
        assert_eq!(
            decode(&smpte),
            Err(DecodeError::BadDivision { division: 0xE728 })
        );

        let zero = header(1, 0);
        assert_eq!(
            decode(&zero),
            Err(DecodeError::BadDivision { division: 0 })
        );
    }

    #[test]
    fn rejects_missing_tracks() {
        let mut buf = header(2, 480);
        buf.extend_from_slice(&track_chunk(&[0x00, 0x90, 60, 100, 0x00, 0x80, 60, 0]));
        assert_eq!(
            decode(&buf),
            Err(DecodeError::MissingTracks {
                declared: 2,
                found: 1
            })
        );
    }

    #[test]
    fn rejects_chunk_longer_than_the_file() {
        let mut buf = header(1, 480);
        buf.extend_from_slice(b"MTrk");
        buf.extend_from_slice(&100u32.to_be_bytes());
        buf.extend_from_slice(&[0x00, 0xFF, 0x2F, 0x00]);
        assert_eq!(
            decode(&buf),
            Err(DecodeError::ChunkOverrun {
                chunk: "MTrk".to_owned(),
                offset: 14,
                declared: 100,
                available: 4,
            })
        );
    }

    #[test]
    fn rejects_data_byte_with_no_running_status() {
        let mut buf = header(1, 480);
        buf.extend_from_slice(&track_chunk(&[0x00, 60, 100]));
        assert_eq!(
            decode(&buf),
            Err(DecodeError::OrphanDataByte {
                byte: 60,
                offset: 23
            })
        );
    }

    #[test]
    fn rejects_status_byte_in_data_position() {
        let mut buf = header(1, 480);
        buf.extend_from_slice(&track_chunk(&[0x00, 0x90, 60, 0x90]));
        assert_eq!(
            decode(&buf),
            Err(DecodeError::BadDataByte {
                byte: 0x90,
                offset: 25
            })
        );
    }

    #[test]
    fn rejects_overlong_delta_time() {
        let mut buf = header(1, 480);
        buf.extend_from_slice(&track_chunk(&[0x81, 0x81, 0x81, 0x81, 0x01]));
        assert_eq!(decode(&buf), Err(DecodeError::VlqTooLong { offset: 22 }));
    }

    #[test]
    fn rejects_event_truncated_by_chunk_end() {
        let mut buf = header(1, 480);
        // Chunk claims 3 bytes: delta + status + one data byte, but
        // NoteOn needs two.
        buf.extend_from_slice(b"MTrk");
        buf.extend_from_slice(&3u32.to_be_bytes());
        buf.extend_from_slice(&[0x00, 0x90, 60]);
        assert_eq!(decode(&buf), Err(DecodeError::Truncated { offset: 25 }));
    }

    #[test]
    fn doubled_note_on_needs_two_offs() {
        let mut buf = header(1, 480);
        let body = [
            0x00, 0x90, 60, 100, //
            0x10, 0x90, 60, 80, //
            0x10, 0x80, 60, 0,
        ];
        buf.extend_from_slice(&track_chunk(&body));

        let stream = decode(&buf).unwrap();
        // One off in the file, one synthesized at the final tick.
        assert_eq!(
            stream.events,
            vec![
                on(0, 0, 60, 100),
                on(16, 0, 60, 80),
                off(32, 0, 60),
                off(32, 0, 60),
            ]
        );
    }
}
