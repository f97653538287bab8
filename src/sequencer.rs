//! Long-lived ALSA sequencer connection: one local input port, one
//! subscription to a source, and the system announce port for hot-plug
//! notifications.

use alsa::seq::{Addr, EvNote, EventType, PortCap, PortInfo, PortSubscribe, PortType, Seq};
use alsa::PollDescriptors;

use crate::errors::CaptureError;
use crate::port::PortHandle;

const CLIENT_NAME: &str = "keyscribe";
const PORT_NAME: &str = "keyscribe in";

const SND_SEQ_CLIENT_SYSTEM: i32 = 0;
const SND_SEQ_PORT_SYSTEM_ANNOUNCE: i32 = 1;

/// One decoded event off the sequencer's read side.
#[derive(Debug, Clone)]
pub enum SequencerMsg {
    /// A complete, well-formed raw MIDI wire message.
    MidiFrame { bytes: Vec<u8> },
    /// A topology-change notification from the system announce port.
    Announce { kind: AnnounceKind, addr: Addr },
}

/// Recognized announce event kinds. Anything else collapses to `Unknown`
/// and is dropped by [`Sequencer::get_event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnounceKind {
    ClientStart,
    ClientExit,
    PortStart,
    PortExit,
    PortChange,
    Unknown,
}

impl AnnounceKind {
    fn from_event_type(event_type: EventType) -> Self {
        match event_type {
            EventType::ClientStart => AnnounceKind::ClientStart,
            EventType::ClientExit => AnnounceKind::ClientExit,
            EventType::PortStart => AnnounceKind::PortStart,
            EventType::PortExit => AnnounceKind::PortExit,
            EventType::PortChange => AnnounceKind::PortChange,
            _ => AnnounceKind::Unknown,
        }
    }
}

/// The engine's one long-lived connection to the ALSA sequencer.
pub struct Sequencer {
    seq: Seq,
    local_port: i32,
    current_src: PortHandle,
}

impl Sequencer {
    /// Opens a non-blocking duplex sequencer connection, creates this
    /// process's local input port, and subscribes to the system announce
    /// port so topology changes arrive on the same event stream.
    pub fn open() -> Result<Self, CaptureError> {
        let seq = Seq::open(None, None, true)
            .map_err(|e| CaptureError::SequencerOpen(e.to_string()))?;
        seq.set_client_name(CLIENT_NAME)
            .map_err(|e| CaptureError::SequencerOpen(e.to_string()))?;

        let mut port_info = PortInfo::empty().map_err(|e| CaptureError::PortCreate(e.to_string()))?;
        port_info.set_name(PORT_NAME);
        port_info.set_capability(PortCap::WRITE | PortCap::SUBS_WRITE);
        port_info.set_type(PortType::MIDI_GENERIC | PortType::APPLICATION);
        seq.create_port(&port_info)
            .map_err(|e| CaptureError::PortCreate(e.to_string()))?;
        let local_port = port_info.get_port();

        let mut sequencer = Sequencer {
            seq,
            local_port,
            current_src: PortHandle::invalid(),
        };
        sequencer.subscribe_announcements();

        log::debug!("sequencer: opened, local port {}", local_port);
        Ok(sequencer)
    }

    fn subscribe_announcements(&self) {
        let sender = Addr {
            client: SND_SEQ_CLIENT_SYSTEM,
            port: SND_SEQ_PORT_SYSTEM_ANNOUNCE,
        };
        let dest = Addr {
            client: self.seq.client_id().unwrap_or(0),
            port: self.local_port,
        };
        if let Ok(sub) = PortSubscribe::empty() {
            sub.set_sender(sender);
            sub.set_dest(dest);
            if let Err(err) = self.seq.subscribe_port(&sub) {
                log::warn!("sequencer: could not subscribe to announce port: {}", err);
            }
        }
    }

    /// Requests delivery of events from `src`. If currently subscribed to a
    /// different source, that subscription is dropped first, best-effort.
    /// An invalid `src` means "no source"; this succeeds without
    /// subscribing to anything. Safe to call repeatedly, including when
    /// already subscribed to `src`.
    pub fn subscribe(&mut self, src: PortHandle) {
        if self.current_src.is_valid() && self.current_src != src {
            self.unsubscribe(self.current_src.clone());
        }

        if !src.is_valid() {
            self.current_src = src;
            return;
        }

        if self.current_src == src {
            return;
        }

        let dest = Addr {
            client: self.seq.client_id().unwrap_or(0),
            port: self.local_port,
        };

        let result = PortSubscribe::empty().and_then(|sub| {
            sub.set_sender(src.to_wire_addr());
            sub.set_dest(dest);
            sub.set_time_update(true);
            sub.set_time_real(true);
            self.seq.subscribe_port(&sub)
        });

        match result {
            Ok(()) => {
                log::info!("sequencer: subscribed to {}", src);
                self.current_src = src;
            }
            Err(err) => {
                log::warn!("sequencer: subscribe to {} failed: {}", src, err);
            }
        }
    }

    /// Drops a subscription. Never fatal; failures are logged and ignored.
    pub fn unsubscribe(&self, src: PortHandle) {
        if !src.is_valid() {
            return;
        }
        let dest = Addr {
            client: self.seq.client_id().unwrap_or(0),
            port: self.local_port,
        };
        let result = PortSubscribe::empty().and_then(|sub| {
            sub.set_sender(src.to_wire_addr());
            sub.set_dest(dest);
            self.seq.unsubscribe_port(&sub)
        });
        if let Err(err) = result {
            log::warn!("sequencer: unsubscribe from {} failed: {}", src, err);
        }
    }

    /// The currently subscribed source, if any.
    pub fn current_src(&self) -> &PortHandle {
        &self.current_src
    }

    /// OS-level poll descriptors to wait on for readability.
    pub fn poll_descriptors(&self) -> std::io::Result<Vec<libc::pollfd>> {
        (&self.seq, Some(alsa::Direction::Capture))
            .get()
            .map_err(|e| std::io::Error::from_raw_os_error(e.errno() as i32))
    }

    /// Enriches a port handle's descriptive fields using this connection.
    pub fn enrich(&self, handle: &mut PortHandle) {
        handle.enrich(&self.seq);
    }

    /// Reads and decodes one event, non-blocking.
    ///
    /// The outer `Option` is "is anything pending at all" -- `None` means
    /// the drain loop should stop. The inner `Option` distinguishes a
    /// decoded event (`Some`) from one that was read but dropped because it
    /// wasn't a recognized MIDI or announce event (`None`): a dropped event
    /// still consumed one slot off the queue, so the caller must keep
    /// draining rather than treating it the same as "nothing pending".
    pub fn get_event(&mut self) -> Option<Option<SequencerMsg>> {
        if !matches!(self.seq.event_input_pending(true), Ok(n) if n > 0) {
            return None;
        }

        let event = match self.seq.event_input() {
            Ok(event) => event,
            Err(err) => {
                log::trace!("sequencer: event_input failed: {}", err);
                return Some(None);
            }
        };

        let event_type = event.get_type();

        if is_announce_event(event_type) {
            let kind = AnnounceKind::from_event_type(event_type);
            let addr = event
                .get_data::<Addr>()
                .unwrap_or(Addr { client: -1, port: -1 });
            return Some(Some(SequencerMsg::Announce { kind, addr }));
        }

        Some(decode_midi_event(event_type, &event).map(|bytes| SequencerMsg::MidiFrame { bytes }))
    }
}

fn is_announce_event(event_type: EventType) -> bool {
    matches!(
        event_type,
        EventType::ClientStart
            | EventType::ClientExit
            | EventType::ClientChange
            | EventType::PortStart
            | EventType::PortExit
            | EventType::PortChange
    )
}

/// Decodes one ALSA sequencer MIDI event into a raw wire-format byte frame,
/// per the fixed encoding table. Events outside the table decode to `None`.
fn decode_midi_event(event_type: EventType, event: &alsa::seq::Event) -> Option<Vec<u8>> {
    match event_type {
        EventType::Noteon => {
            let note: EvNote = event.get_data()?;
            Some(vec![
                0x90 | (note.channel & 0x0F),
                note.note & 0x7F,
                note.velocity & 0x7F,
            ])
        }
        EventType::Noteoff => {
            let note: EvNote = event.get_data()?;
            Some(vec![
                0x80 | (note.channel & 0x0F),
                note.note & 0x7F,
                note.velocity & 0x7F,
            ])
        }
        EventType::Controller => {
            let ctrl: alsa::seq::EvCtrl = event.get_data()?;
            Some(vec![
                0xB0 | (ctrl.channel & 0x0F),
                (ctrl.param & 0x7F) as u8,
                (ctrl.value & 0x7F) as u8,
            ])
        }
        EventType::Pgmchange => {
            let ctrl: alsa::seq::EvCtrl = event.get_data()?;
            Some(vec![0xC0 | (ctrl.channel & 0x0F), (ctrl.value & 0x7F) as u8])
        }
        EventType::Chanpress => {
            let ctrl: alsa::seq::EvCtrl = event.get_data()?;
            Some(vec![0xD0 | (ctrl.channel & 0x0F), (ctrl.value & 0x7F) as u8])
        }
        EventType::Pitchbend => {
            let ctrl: alsa::seq::EvCtrl = event.get_data()?;
            let clamped = ctrl.value.clamp(-8192, 8191);
            let pb = (clamped + 8192) as u16;
            Some(vec![
                0xE0 | (ctrl.channel & 0x0F),
                (pb & 0x7F) as u8,
                ((pb >> 7) & 0x7F) as u8,
            ])
        }
        EventType::Sysex => {
            let payload: &[u8] = event.get_ext()?;
            if payload.is_empty() {
                None
            } else {
                Some(payload.to_vec())
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn announce_kind_maps_recognized_types() {
        assert_eq!(
            AnnounceKind::from_event_type(EventType::PortStart),
            AnnounceKind::PortStart
        );
        assert_eq!(
            AnnounceKind::from_event_type(EventType::PortExit),
            AnnounceKind::PortExit
        );
        assert_eq!(
            AnnounceKind::from_event_type(EventType::ClientStart),
            AnnounceKind::ClientStart
        );
        assert_eq!(
            AnnounceKind::from_event_type(EventType::ClientExit),
            AnnounceKind::ClientExit
        );
        assert_eq!(
            AnnounceKind::from_event_type(EventType::PortChange),
            AnnounceKind::PortChange
        );
    }

    #[test]
    fn announce_kind_unrecognized_falls_back() {
        assert_eq!(
            AnnounceKind::from_event_type(EventType::Noteon),
            AnnounceKind::Unknown
        );
    }

    #[test]
    fn is_announce_event_excludes_midi_types() {
        assert!(!is_announce_event(EventType::Noteon));
        assert!(!is_announce_event(EventType::Sysex));
        assert!(is_announce_event(EventType::PortStart));
    }
}
