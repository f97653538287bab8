use std::error::Error;
use std::fmt;

const SEQUENCER_OPEN_MSG: &str = "could not open ALSA sequencer";
const PORT_CREATE_MSG: &str = "could not create local input port";

/// A failure that renders the capture channel itself unusable.
///
/// Anything that can instead be fixed by the peer reconnecting -- a dropped
/// subscription, a save that failed to write, a malformed event -- is logged
/// in place rather than represented here. Only failures at the sites named
/// below end a recording session.
#[derive(Debug)]
pub enum CaptureError {
    /// Opening the ALSA sequencer connection failed.
    SequencerOpen(String),
    /// Creating this process's local input port failed.
    PortCreate(String),
    /// `poll(2)` returned a hard error (anything other than `EINTR`).
    Poll(std::io::Error),
}

impl Error for CaptureError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CaptureError::Poll(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CaptureError::SequencerOpen(detail) => write!(f, "{}: {}", SEQUENCER_OPEN_MSG, detail),
            CaptureError::PortCreate(detail) => write!(f, "{}: {}", PORT_CREATE_MSG, detail),
            CaptureError::Poll(err) => write!(f, "poll() failed: {}", err),
        }
    }
}

impl From<std::io::Error> for CaptureError {
    fn from(err: std::io::Error) -> Self {
        CaptureError::Poll(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_detail() {
        let err = CaptureError::SequencerOpen("no such device".into());
        assert!(format!("{}", err).contains("no such device"));
    }

    #[test]
    fn poll_error_exposes_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err: CaptureError = io_err.into();
        assert!(err.source().is_some());
    }
}
