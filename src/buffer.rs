//! A thin, append-only façade over [`midly`]'s SMF types.
//!
//! Nothing outside this module touches a `midly` type directly; the rest of
//! the crate works in `(track, absolute_tick, bytes)` terms and only this
//! module knows how that maps onto a Standard MIDI File.

use std::fs;
use std::io;
use std::path::Path;

use midly::{Format, Header, MetaMessage, Smf, Timing, Track, TrackEvent, TrackEventKind};

use crate::tick::{MICROS_PER_QUARTER, PPQ};

/// One raw MIDI frame recorded at an absolute tick.
#[derive(Debug, Clone)]
struct Frame {
    tick: u32,
    bytes: Vec<u8>,
}

/// An in-memory, append-only Standard MIDI File under construction.
///
/// Internally frames are kept in absolute-tick order of arrival on a single
/// track (track 0); [`MidiFileBuffer::snapshot`] is responsible for the
/// delta-tick conversion `midly` needs on the wire.
#[derive(Debug, Clone)]
pub struct MidiFileBuffer {
    frames: Vec<Frame>,
}

impl MidiFileBuffer {
    /// Builds an empty buffer. The tempo meta-event and PPQ resolution are
    /// not stored as frames; they are synthesized by [`MidiFileBuffer::snapshot`]
    /// on every call, so there is nothing here to initialize beyond an empty
    /// frame list.
    pub fn new() -> Self {
        MidiFileBuffer { frames: Vec::new() }
    }

    /// Appends one raw MIDI frame at the given absolute tick.
    ///
    /// `track` is accepted for forward compatibility with a multi-track
    /// layout but this implementation only ever writes track 0.
    pub fn append(&mut self, _track: usize, absolute_tick: u32, bytes: Vec<u8>) {
        self.frames.push(Frame {
            tick: absolute_tick,
            bytes,
        });
    }

    /// Produces an independent, sorted copy ready to serialize. Appends made
    /// to `self` after this call do not affect the returned snapshot.
    pub fn snapshot(&self) -> BufferSnapshot {
        let mut frames = self.frames.clone();
        frames.sort_by_key(|f| f.tick);
        BufferSnapshot { frames }
    }
}

impl Default for MidiFileBuffer {
    fn default() -> Self {
        MidiFileBuffer::new()
    }
}

/// A sorted, independent copy of a [`MidiFileBuffer`]'s contents, ready to
/// be serialized to a Standard MIDI File.
#[derive(Debug, Clone)]
pub struct BufferSnapshot {
    frames: Vec<Frame>,
}

impl BufferSnapshot {
    /// Serializes this snapshot to Standard MIDI File bytes: format 1,
    /// one tempo track (the `Set Tempo` meta event at tick 0) followed by
    /// one event track holding every recorded frame in delta-tick form.
    pub fn to_smf_bytes(&self) -> Vec<u8> {
        let header = Header::new(
            Format::Parallel,
            Timing::Metrical(midly::num::u15::new(PPQ as u16)),
        );

        let mut tempo_track = Track::new();
        tempo_track.push(TrackEvent {
            delta: midly::num::u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(midly::num::u24::new(
                MICROS_PER_QUARTER,
            ))),
        });
        tempo_track.push(end_of_track());

        let mut event_track = Track::new();
        let mut last_tick = 0u32;
        for frame in &self.frames {
            let delta = frame.tick.saturating_sub(last_tick);
            last_tick = frame.tick;
            if let Some(kind) = decode_track_event(&frame.bytes) {
                event_track.push(TrackEvent {
                    delta: midly::num::u28::new(delta),
                    kind,
                });
            }
        }
        event_track.push(end_of_track());

        let smf = Smf {
            header,
            tracks: vec![tempo_track, event_track],
        };

        let mut out = Vec::new();
        smf.write(&mut out).expect("writing to a Vec is infallible");
        out
    }

    /// Serializes and writes this snapshot to `path`, overwriting any
    /// existing content. Callers that need the atomic temp-then-rename
    /// protocol build the temp path themselves and call this on it; this
    /// method itself performs a plain, non-atomic write.
    pub fn write_to(&self, path: &Path) -> io::Result<()> {
        fs::write(path, self.to_smf_bytes())
    }
}

fn end_of_track() -> TrackEvent<'static> {
    TrackEvent {
        delta: midly::num::u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    }
}

/// Maps a raw MIDI wire frame back onto a `midly` track event, for the
/// channel-voice and sysex shapes this crate's decode table produces.
fn decode_track_event(bytes: &[u8]) -> Option<TrackEventKind<'static>> {
    use midly::live::{LiveEvent, SystemCommon};

    match LiveEvent::parse(bytes).ok()? {
        LiveEvent::Midi { channel, message } => Some(TrackEventKind::Midi { channel, message }),
        LiveEvent::Common(SystemCommon::SysEx(data)) => {
            // `TrackEventKind` borrows; frames are owned and short-lived
            // only inside `to_smf_bytes`, so leaking here is the simplest
            // way to hand `midly` a `'static` slice for one write.
            let owned: &'static [u8] = data.to_vec().leak();
            Some(TrackEventKind::SysEx(owned))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_buffer_snapshot_has_no_frames() {
        let buf = MidiFileBuffer::new();
        let snap = buf.snapshot();
        assert!(snap.frames.is_empty());
    }

    #[test]
    fn append_preserves_frame_count() {
        let mut buf = MidiFileBuffer::new();
        buf.append(0, 0, vec![0x90, 60, 100]);
        buf.append(0, 10, vec![0x80, 60, 0]);
        let snap = buf.snapshot();
        assert_eq!(snap.frames.len(), 2);
    }

    #[test]
    fn snapshot_sorts_out_of_order_appends_by_tick() {
        let mut buf = MidiFileBuffer::new();
        buf.append(0, 50, vec![0x90, 60, 100]);
        buf.append(0, 10, vec![0x80, 60, 0]);
        let snap = buf.snapshot();
        assert_eq!(snap.frames[0].tick, 10);
        assert_eq!(snap.frames[1].tick, 50);
    }

    #[test]
    fn snapshot_is_independent_of_later_appends() {
        let mut buf = MidiFileBuffer::new();
        buf.append(0, 0, vec![0x90, 60, 100]);
        let snap = buf.snapshot();
        buf.append(0, 5, vec![0x80, 60, 0]);
        assert_eq!(snap.frames.len(), 1);
    }

    #[test]
    fn serialized_bytes_start_with_mthd_header() {
        let mut buf = MidiFileBuffer::new();
        buf.append(0, 0, vec![0x90, 60, 100]);
        let bytes = buf.snapshot().to_smf_bytes();
        assert_eq!(&bytes[0..4], b"MThd");
    }

    #[test]
    fn write_to_produces_a_readable_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.mid");
        let mut buf = MidiFileBuffer::new();
        buf.append(0, 0, vec![0x90, 60, 100]);
        buf.append(0, 480, vec![0x80, 60, 0]);
        buf.snapshot().write_to(&path).expect("write");
        let bytes = fs::read(&path).expect("read back");
        assert_eq!(&bytes[0..4], b"MThd");
    }
}
