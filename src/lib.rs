//! Captures live MIDI performance data from an ALSA sequencer source and
//! persists it as a Standard MIDI File.
//!
//! [`Recorder`] is the top-level entry point: configure it with a
//! [`RecorderConfig`], `start()` it, and `stop()` it when the session is
//! over. [`SourceEnumerator`] discovers recordable ALSA ports ahead of
//! constructing a config.

mod buffer;
mod errors;
mod port;
mod recorder;
mod sequencer;
mod tick;
mod wake;

pub use errors::CaptureError;
pub use port::{PortHandle, SourceEnumerator, SourceSet};
pub use recorder::{Recorder, RecorderConfig};
pub use sequencer::{AnnounceKind, SequencerMsg};
pub use tick::{MICROS_PER_QUARTER, PPQ, TEMPO_BPM, TICKS_PER_SEC};
