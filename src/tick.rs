//! Conversion between wall-clock time and the fixed-tempo tick grid used by
//! [`crate::buffer::MidiFileBuffer`].

use std::time::Instant;

/// Pulses per quarter note. Fixed; the recorder does not infer or vary tempo
/// from the incoming stream.
pub const PPQ: u32 = 960;

/// Fixed tempo, beats per minute.
pub const TEMPO_BPM: u32 = 120;

/// Microseconds per quarter note at [`TEMPO_BPM`], the value written into the
/// track's `Set Tempo` meta event.
pub const MICROS_PER_QUARTER: u32 = 60_000_000 / TEMPO_BPM;

/// Ticks per second at [`PPQ`]/[`TEMPO_BPM`]: `960 * 120 / 60 == 1920`.
pub const TICKS_PER_SEC: f64 = (PPQ as f64 * TEMPO_BPM as f64) / 60.0;

/// Monotonic clock mapping elapsed wall time onto the tick grid.
///
/// Ticks are taken from [`Instant`], never from the wall clock, so the
/// recording is immune to clock adjustments made while it runs. Monotonicity
/// is additionally enforced explicitly via `last_tick` rather than left to
/// `Instant`'s own guarantee, since it's a hard invariant of the engine, not
/// an incidental property of the clock it happens to be built on.
#[derive(Debug, Clone)]
pub struct TickClock {
    origin: Instant,
    last_tick: u32,
}

impl TickClock {
    /// Starts a new clock with its tick-zero at the current instant.
    pub fn start() -> Self {
        TickClock {
            origin: Instant::now(),
            last_tick: 0,
        }
    }

    /// The absolute tick corresponding to now, relative to [`TickClock::start`].
    /// `max(last_tick, round((now - origin).seconds * ticks_per_sec))`, and
    /// updates `last_tick` to the result.
    pub fn now_tick(&mut self) -> u32 {
        let elapsed = self.origin.elapsed().as_secs_f64();
        let raw = (elapsed * TICKS_PER_SEC).round() as u32;
        self.last_tick = self.last_tick.max(raw);
        self.last_tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn ticks_per_sec_matches_ppq_and_tempo() {
        assert_eq!(TICKS_PER_SEC, 1920.0);
    }

    #[test]
    fn fresh_clock_starts_at_zero() {
        let mut clock = TickClock::start();
        assert_eq!(clock.now_tick(), 0);
    }

    #[test]
    fn tick_advances_with_elapsed_time() {
        let mut clock = TickClock::start();
        thread::sleep(Duration::from_millis(50));
        let tick = clock.now_tick();
        // 50ms at 1920 ticks/sec is ~96 ticks; allow generous scheduler slack.
        assert!(tick >= 50, "expected at least 50 ticks, got {}", tick);
    }

    #[test]
    fn tick_never_decreases_across_calls() {
        let mut clock = TickClock::start();
        let first = clock.now_tick();
        let second = clock.now_tick();
        assert!(second >= first);
    }

    #[test]
    fn micros_per_quarter_matches_120_bpm() {
        assert_eq!(MICROS_PER_QUARTER, 500_000);
    }
}
