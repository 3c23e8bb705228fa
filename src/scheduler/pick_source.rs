//! Pick sources feeding the run loop.
//!
//! Both sources release the picks of a [`PickBuffer`] in non-decreasing arrival-time order.
//! They only differ in *when* a pick is released:
//!
//! * [`OfflineSource`] releases every pick immediately,
//! * [`PlaybackSource`] waits between two picks for the difference of their detection times
//!   (creation time, or arrival time when absent or requested), divided by the playback speed.
//!   A negative difference releases immediately, a single wait never exceeds
//!   [`MAX_PLAYBACK_DELAY`], and `accelerate` never waits.
use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::{Duration, Instant},
};

use hifitime::Epoch;
use tracing::debug;

use crate::{
    octoloc_errors::OctolocError,
    picks::pick_buffer::{IntakeStats, PickBuffer, StationPick},
};

/// Longest uninterrupted sleep of a playback source, bounding the cancellation latency.
const CANCEL_POLL: Duration = Duration::from_millis(20);

/// Longest wait between two playback picks.
pub const MAX_PLAYBACK_DELAY: Duration = Duration::from_secs(24 * 3600);

/// A time-ordered, lazily released sequence of picks.
pub trait PickSource {
    /// Release the next pick, or `None` when the source is exhausted or `cancel` was raised
    /// while waiting.
    fn next_pick(&mut self, cancel: &AtomicBool) -> Option<StationPick>;

    /// Number of picks left, if known.
    fn remaining(&self) -> Option<usize>;

    /// Intake counters of the buffer the picks came from.
    fn intake_stats(&self) -> IntakeStats;
}

impl<S: PickSource + ?Sized> PickSource for Box<S> {
    fn next_pick(&mut self, cancel: &AtomicBool) -> Option<StationPick> {
        (**self).next_pick(cancel)
    }

    fn remaining(&self) -> Option<usize> {
        (**self).remaining()
    }

    fn intake_stats(&self) -> IntakeStats {
        (**self).intake_stats()
    }
}

/// Drain-all source.
pub struct OfflineSource {
    buffer: PickBuffer,
}

impl OfflineSource {
    pub fn new(buffer: PickBuffer) -> Self {
        OfflineSource { buffer }
    }
}

impl PickSource for OfflineSource {
    fn next_pick(&mut self, _cancel: &AtomicBool) -> Option<StationPick> {
        self.buffer.pop()
    }

    fn remaining(&self) -> Option<usize> {
        Some(self.buffer.len())
    }

    fn intake_stats(&self) -> IntakeStats {
        self.buffer.stats().clone()
    }
}

/// Pacing of a playback run.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackOptions {
    /// Release without waiting
    pub accelerate: bool,
    /// Pace by arrival time instead of creation time
    pub use_pick_time: bool,
    /// Playback speed factor (2.0 plays twice as fast as real time)
    pub speed: f64,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        PlaybackOptions {
            accelerate: false,
            use_pick_time: false,
            speed: 1.0,
        }
    }
}

/// Time-paced source.
pub struct PlaybackSource {
    picks: std::vec::IntoIter<(StationPick, Duration)>,
    intake: IntakeStats,
    accelerate: bool,
}

impl PlaybackSource {
    /// Schedule the picks of a buffer.
    ///
    /// Return
    /// ----------
    /// * The source, or [`OctolocError::InvalidConfiguration`] when `speed` is not strictly
    ///   positive.
    pub fn new(mut buffer: PickBuffer, options: &PlaybackOptions) -> Result<Self, OctolocError> {
        if options.speed.partial_cmp(&0.0) != Some(std::cmp::Ordering::Greater) {
            return Err(OctolocError::InvalidConfiguration(
                "playback speed must be > 0".into(),
            ));
        }
        let intake = buffer.stats().clone();

        let mut previous: Option<Epoch> = None;
        let mut scheduled = Vec::with_capacity(buffer.len());
        for pick in buffer.drain() {
            let detection = pick.pick.detection_time(options.use_pick_time);
            let delay = previous
                .map(|prev| (detection - prev).to_seconds() / options.speed)
                .filter(|delay: &f64| *delay > 0.0)
                .map_or(Duration::ZERO, |delay| {
                    Duration::try_from_secs_f64(delay)
                        .unwrap_or(MAX_PLAYBACK_DELAY)
                        .min(MAX_PLAYBACK_DELAY)
                });
            previous = Some(detection);
            scheduled.push((pick, delay));
        }

        Ok(PlaybackSource {
            picks: scheduled.into_iter(),
            intake,
            accelerate: options.accelerate,
        })
    }

    /// Waits still ahead, in release order.
    pub fn pending_delays(&self) -> Vec<Duration> {
        self.picks.as_slice().iter().map(|(_, d)| *d).collect()
    }
}

impl PickSource for PlaybackSource {
    fn next_pick(&mut self, cancel: &AtomicBool) -> Option<StationPick> {
        let (pick, delay) = self.picks.next()?;
        if !self.accelerate && !delay.is_zero() {
            debug!(pick = %pick.pick.id, ?delay, "waiting for release");
            let release = Instant::now() + delay;
            loop {
                if cancel.load(Ordering::Relaxed) {
                    return None;
                }
                let now = Instant::now();
                if now >= release {
                    break;
                }
                std::thread::sleep((release - now).min(CANCEL_POLL));
            }
        }
        Some(pick)
    }

    fn remaining(&self) -> Option<usize> {
        Some(self.picks.len())
    }

    fn intake_stats(&self) -> IntakeStats {
        self.intake.clone()
    }
}
