//! Progress display of a run (feature `progress`).
//!
//! [`RunProgress`] wraps an `indicatif` bar counting processed picks. Its message shows the
//! processing time of the last pick and an exponential moving average (EMA) of it, kept by
//! [`PickTimer`]:
//!
//! ```text
//! ema ← α·dt + (1–α)·ema,   α ∈ (0, 1]
//! ```
//!
//! The first tick initializes the average to the first duration.
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

pub(crate) struct PickTimer {
    last: Instant,
    ema_ns: f64,
    alpha: f64,
    count: u64,
}

impl PickTimer {
    pub(crate) fn new(alpha: f64) -> Self {
        Self {
            last: Instant::now(),
            ema_ns: 0.0,
            alpha,
            count: 0,
        }
    }

    #[inline]
    pub(crate) fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let dt = now.duration_since(self.last);
        self.last = now;
        self.count += 1;

        let dt_ns = dt.as_nanos() as f64;
        self.ema_ns = if self.count == 1 {
            dt_ns
        } else {
            self.alpha * dt_ns + (1.0 - self.alpha) * self.ema_ns
        };
        dt
    }

    #[inline]
    pub(crate) fn avg(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(self.ema_ns as u64)
        }
    }
}

#[inline]
pub(crate) fn fmt_dur(d: Duration) -> String {
    let us = d.as_micros();
    if us < 1_000 {
        format!("{us}µs")
    } else if us < 1_000_000 {
        format!("{}ms", d.as_millis())
    } else {
        format!("{:.2}s", d.as_secs_f32())
    }
}

pub(crate) struct RunProgress {
    bar: ProgressBar,
    timer: PickTimer,
}

impl RunProgress {
    pub(crate) fn new(total: Option<usize>) -> Self {
        let bar = match total {
            Some(n) => ProgressBar::new(n.max(1) as u64),
            None => ProgressBar::no_length(),
        };
        let template = "{bar:40.cyan/blue} {pos}/{len} picks ({percent:>3}%) | {per_sec} | ETA {eta_precise} | {msg}";
        if let Ok(style) = ProgressStyle::with_template(template) {
            bar.set_style(style);
        }
        bar.enable_steady_tick(Duration::from_millis(200));
        RunProgress {
            bar,
            timer: PickTimer::new(0.2),
        }
    }

    pub(crate) fn tick(&mut self, open: usize) {
        let last = self.timer.tick();
        let avg = self.timer.avg();
        self.bar.set_message(format!(
            "last: {}, avg: {}, open: {open}",
            fmt_dur(last),
            fmt_dur(avg)
        ));
        self.bar.inc(1);
    }

    pub(crate) fn finish(self) {
        self.bar.disable_steady_tick();
        self.bar.finish_and_clear();
    }
}
