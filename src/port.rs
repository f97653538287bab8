//! Identity and ranking for ALSA sequencer ports, and discovery of the ones
//! that can act as a recording source.

use std::fmt;

use alsa::seq::{Addr, ClientIter, ClientType, PortCap, PortType, Seq};

use crate::errors::CaptureError;

/// Value type identifying one ALSA sequencer port, with cached descriptive
/// fields and a derived ranking score.
///
/// `PortHandle` is deliberately cheap to copy: identity is just
/// `(client_id, port_id)`, and the remaining fields are a snapshot taken at
/// enumeration time. Re-enrich a handle with [`PortHandle::enrich`] if you
/// need fresher metadata.
#[derive(Debug, Clone)]
pub struct PortHandle {
    client_id: i32,
    port_id: i32,
    client_name: String,
    port_name: String,
    capability_bits: u32,
    type_bits: u32,
    is_kernel: bool,
}

/// Identity is `(client_id, port_id)`; descriptive fields do not
/// participate, since two enrichments of the same port taken moments apart
/// must still compare equal.
impl PartialEq for PortHandle {
    fn eq(&self, other: &Self) -> bool {
        self.client_id == other.client_id && self.port_id == other.port_id
    }
}

impl Eq for PortHandle {}

const UNKNOWN: &str = "UNKNOWN";

impl PortHandle {
    /// Builds an identity-only handle. Used before the first enrichment, or
    /// to address a port parsed from user input (e.g. the CLI's `--port`).
    pub fn new(client_id: i32, port_id: i32) -> Self {
        PortHandle {
            client_id,
            port_id,
            client_name: UNKNOWN.to_string(),
            port_name: UNKNOWN.to_string(),
            capability_bits: 0,
            type_bits: 0,
            is_kernel: false,
        }
    }

    /// An identity-only handle that is never valid; used as "no preferred
    /// source", which puts the recorder in auto-select mode.
    pub fn invalid() -> Self {
        PortHandle::new(-1, -1)
    }

    pub fn client_id(&self) -> i32 {
        self.client_id
    }

    pub fn port_id(&self) -> i32 {
        self.port_id
    }

    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn is_kernel(&self) -> bool {
        self.is_kernel
    }

    /// `client_id >= 0 && port_id >= 0`. The older iteration of this check
    /// required strictly positive ids; client 0 and port 0 are legal ALSA
    /// addresses (the system timer and announce ports live there), so this
    /// implementation follows `>= 0`.
    pub fn is_valid(&self) -> bool {
        self.client_id >= 0 && self.port_id >= 0
    }

    /// Whether this port's capability bits permit an external client (us)
    /// to subscribe and receive its events.
    pub fn is_subscribable_source(&self) -> bool {
        self.capability_bits & PortCap::SUBS_WRITE.bits() != 0
    }

    /// `(is_kernel ? 1000 : 0) + (type has MIDI-generic ? 500 : 0)`.
    /// Ascending order, so `max()` of a ranked set is the most preferred.
    pub fn rank_score(&self) -> i32 {
        let mut score = 0;
        if self.is_kernel {
            score += 1000;
        }
        if self.type_bits & PortType::MIDI_GENERIC.bits() != 0 {
            score += 500;
        }
        score
    }

    /// Converts to the `(client, port)` wire address ALSA subscribe calls
    /// need.
    pub fn to_wire_addr(&self) -> Addr {
        Addr {
            client: self.client_id,
            port: self.port_id,
        }
    }

    /// Builds an identity-only handle from a wire address, e.g. one carried
    /// by a `PortStart`/`PortExit` announce event.
    pub fn from_wire_addr(addr: Addr) -> Self {
        PortHandle::new(addr.client, addr.port)
    }

    /// Fills in the cached descriptive fields by querying the sequencer for
    /// this port's client info and port info. Tolerant of either lookup
    /// failing: fields whose lookup fails keep their previous (or default
    /// "UNKNOWN") value, and the handle remains usable for identity
    /// comparison either way.
    pub fn enrich(&mut self, seq: &Seq) {
        if let Ok(port_info) = seq.get_any_port_info(self.to_wire_addr()) {
            self.port_name = port_info.get_name().unwrap_or(UNKNOWN).to_string();
            self.capability_bits = port_info.get_capability().bits();
            self.type_bits = port_info.get_type().bits();
        }

        if let Ok(client_info) = seq.get_any_client_info(self.client_id) {
            self.client_name = client_info.get_name().unwrap_or(UNKNOWN).to_string();
            self.is_kernel = client_info.get_type() == Some(ClientType::Kernel);
        }
    }
}

impl fmt::Display for PortHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}:{} [{}] / [{}] kernel={} capabilities={} type={}",
            self.client_id,
            self.port_id,
            self.client_name,
            self.port_name,
            self.is_kernel,
            describe_bits(self.capability_bits, CAPABILITY_NAMES),
            describe_bits(self.type_bits, TYPE_NAMES),
        )
    }
}

const CAPABILITY_NAMES: &[(u32, &str)] = &[
    (PortCap::READ.bits(), "READ"),
    (PortCap::WRITE.bits(), "WRITE"),
    (PortCap::SUBS_READ.bits(), "SUBS_READ"),
    (PortCap::SUBS_WRITE.bits(), "SUBS_WRITE"),
];

const TYPE_NAMES: &[(u32, &str)] = &[
    (PortType::MIDI_GENERIC.bits(), "MIDI_GENERIC"),
    (PortType::SYNTH.bits(), "SYNTH"),
    (PortType::APPLICATION.bits(), "APPLICATION"),
    (PortType::HARDWARE.bits(), "HARDWARE"),
];

fn describe_bits(bits: u32, names: &[(u32, &str)]) -> String {
    let matched: Vec<&str> = names
        .iter()
        .filter(|(flag, _)| flag & bits != 0)
        .map(|(_, name)| *name)
        .collect();
    if matched.is_empty() {
        "NONE".to_string()
    } else {
        matched.join("|")
    }
}

/// An ordered collection of subscribable source ports, ascending by
/// [`PortHandle::rank_score`].
pub type SourceSet = Vec<PortHandle>;

/// Queries the host sequencer for all subscribable source ports.
///
/// Opens a transient sequencer connection, walks every client and every one
/// of its ports, keeps only the ports with the "subscribable as source"
/// capability bit, and closes the connection before returning. Safe to call
/// while a [`crate::recorder::Recorder`] is running: it never touches the
/// recorder's own long-lived [`crate::sequencer::Sequencer`] connection.
pub struct SourceEnumerator;

impl SourceEnumerator {
    /// Returns the current set of subscribable sources, ranked ascending by
    /// [`PortHandle::rank_score`].
    pub fn enumerate() -> Result<SourceSet, CaptureError> {
        let seq = Seq::open(None, None, false)
            .map_err(|e| CaptureError::SequencerOpen(e.to_string()))?;

        let mut sources = SourceSet::new();

        for client in ClientIter::new(&seq) {
            let client_id = client.get_client();
            for port in alsa::seq::PortIter::new(&seq, client_id) {
                let mut handle = PortHandle::new(client_id, port.get_port());
                handle.enrich(&seq);
                if handle.is_subscribable_source() {
                    sources.push(handle);
                }
            }
        }

        sources.sort_by_key(PortHandle::rank_score);
        Ok(sources)
    }

    /// Convenience for callers that just want one pick: the highest-ranked
    /// source, if any exists.
    pub fn best_source() -> Result<Option<PortHandle>, CaptureError> {
        Ok(SourceEnumerator::enumerate()?.pop())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(is_kernel: bool, midi_generic: bool) -> PortHandle {
        let mut h = PortHandle::new(1, 0);
        h.is_kernel = is_kernel;
        h.type_bits = if midi_generic {
            PortType::MIDI_GENERIC.bits()
        } else {
            0
        };
        h
    }

    #[test]
    fn validity_follows_ge_zero() {
        assert!(PortHandle::new(0, 0).is_valid());
        assert!(PortHandle::new(1, 5).is_valid());
        assert!(!PortHandle::invalid().is_valid());
        assert!(!PortHandle::new(-1, 0).is_valid());
        assert!(!PortHandle::new(0, -1).is_valid());
    }

    #[test]
    fn rank_ordering_matches_spec() {
        let neither = handle(false, false).rank_score();
        let midi_generic_only = handle(false, true).rank_score();
        let kernel_only = handle(true, false).rank_score();
        let both = handle(true, true).rank_score();

        assert!(both > kernel_only);
        assert!(kernel_only > midi_generic_only);
        assert!(midi_generic_only > neither);
    }

    #[test]
    fn enrichment_failure_keeps_unknown_defaults() {
        let h = PortHandle::new(5, 2);
        assert_eq!(h.client_name(), UNKNOWN);
        assert_eq!(h.port_name(), UNKNOWN);
        // identity comparisons still work without enrichment.
        assert_eq!(h, PortHandle::new(5, 2));
    }

    #[test]
    fn wire_addr_round_trips_identity() {
        let h = PortHandle::new(20, 3);
        let addr = h.to_wire_addr();
        let back = PortHandle::from_wire_addr(addr);
        assert_eq!(h.client_id(), back.client_id());
        assert_eq!(h.port_id(), back.port_id());
    }

    #[test]
    fn display_includes_both_names_and_flags() {
        let mut h = PortHandle::new(24, 0);
        h.client_name = "Digital Piano".to_string();
        h.port_name = "MIDI 1".to_string();
        h.capability_bits = PortCap::SUBS_WRITE.bits();
        h.type_bits = PortType::MIDI_GENERIC.bits();
        let text = format!("{}", h);
        assert!(text.contains("Digital Piano"));
        assert!(text.contains("MIDI 1"));
        assert!(text.contains("SUBS_WRITE"));
        assert!(text.contains("MIDI_GENERIC"));
    }
}
