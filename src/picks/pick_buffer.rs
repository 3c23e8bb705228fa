//! # Pick buffer
//!
//! Ordered intake of picks ahead of the association engine. Every pick offered with
//! [`PickBuffer::push`] goes through the following filters, in order:
//!
//! 1. **author** – the pick author must match one of the allow-list globs (an empty allow-list
//!    accepts every author),
//! 2. **whitelist** – the stream must match the optional stream whitelist,
//! 3. **time range** – the arrival time must fall in the optional inclusive `[start, end]`,
//! 4. **station** – the stream must resolve in the [`StationCatalog`]
//!    ([`OctolocError::UnknownStation`] otherwise),
//! 5. **deduplication** – a pick with the same stream, phase and arrival time (rounded to the
//!    microsecond) as an earlier accepted pick is dropped. Keys of released picks are kept for
//!    the duplicate horizon, counted back from the latest release.
//!
//! Accepted picks are released by [`PickBuffer::pop`] in non-decreasing arrival-time order;
//! picks with identical times keep their intake order. Rejections are counted per reason in
//! [`IntakeStats`].
use std::{cmp::Ordering, collections::BinaryHeap, fmt, sync::Arc};

use hifitime::Epoch;
use ordered_float::OrderedFloat;
use regex::Regex;
use tracing::debug;

use crate::{
    constants::{FastHashSet, Second, DEFAULT_PICK_AUTHOR},
    octoloc_errors::OctolocError,
    picks::{PhaseType, Pick},
    stations::{whitelist::compile_glob, whitelist::StreamWhitelist, Station, StationCatalog, StreamId},
};

/// Default duration for which released picks are still recognised as duplicates (s).
pub const DEFAULT_DUPLICATE_HORIZON: Second = 120.0;

/// A pick resolved against the station catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct StationPick {
    pub pick: Arc<Pick>,
    pub station: Arc<Station>,
}

impl StationPick {
    #[inline]
    pub fn seconds(&self) -> Second {
        self.pick.seconds()
    }

    #[inline]
    pub fn phase(&self) -> PhaseType {
        self.pick.phase
    }
}

/// Filters applied at intake.
#[derive(Debug, Clone)]
pub struct PickFilter {
    /// Allowed author globs; empty accepts every author
    pub authors: Vec<String>,
    pub whitelist: Option<StreamWhitelist>,
    /// Inclusive arrival-time range
    pub time_range: Option<(Epoch, Epoch)>,
}

impl Default for PickFilter {
    fn default() -> Self {
        PickFilter {
            authors: vec![DEFAULT_PICK_AUTHOR.to_string()],
            whitelist: None,
            time_range: None,
        }
    }
}

/// Why a pick was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Author,
    Whitelist,
    OutOfTimeRange,
    UnknownStation,
    Duplicate,
}

/// Intake counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntakeStats {
    pub accepted: usize,
    pub rejected_author: usize,
    pub rejected_whitelist: usize,
    pub out_of_time_range: usize,
    pub unknown_station: usize,
    pub duplicate: usize,
}

impl IntakeStats {
    pub fn rejected(&self) -> usize {
        self.rejected_author
            + self.rejected_whitelist
            + self.out_of_time_range
            + self.unknown_station
            + self.duplicate
    }

    fn count(&mut self, rejection: Rejection) {
        match rejection {
            Rejection::Author => self.rejected_author += 1,
            Rejection::Whitelist => self.rejected_whitelist += 1,
            Rejection::OutOfTimeRange => self.out_of_time_range += 1,
            Rejection::UnknownStation => self.unknown_station += 1,
            Rejection::Duplicate => self.duplicate += 1,
        }
    }
}

impl fmt::Display for IntakeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "accepted={} rejected={} (author={}, whitelist={}, time={}, unknown station={}, duplicate={})",
            self.accepted,
            self.rejected(),
            self.rejected_author,
            self.rejected_whitelist,
            self.out_of_time_range,
            self.unknown_station,
            self.duplicate
        )
    }
}

struct QueuedPick {
    time: OrderedFloat<f64>,
    seq: u64,
    pick: StationPick,
}

// Max-heap: the earliest time (then the earliest intake) must compare greatest.
impl Eq for QueuedPick {}
impl PartialEq for QueuedPick {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Ord for QueuedPick {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}
impl PartialOrd for QueuedPick {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Filtered, deduplicated, time-ordered pick intake.
pub struct PickBuffer {
    catalog: Arc<StationCatalog>,
    authors: Vec<Regex>,
    whitelist: Option<StreamWhitelist>,
    time_range: Option<(Epoch, Epoch)>,
    seen: FastHashSet<(StreamId, i64, PhaseType)>,
    duplicate_horizon: Second,
    /// Release time at which `seen` is next pruned
    next_prune: Option<Second>,
    queue: BinaryHeap<QueuedPick>,
    seq: u64,
    stats: IntakeStats,
}

impl PickBuffer {
    /// Create a buffer resolving stations in `catalog`.
    ///
    /// Return
    /// ----------
    /// * The buffer, or [`OctolocError::InvalidPattern`] for a malformed author glob, or
    ///   [`OctolocError::InvalidConfiguration`] when the time range is reversed.
    pub fn new(catalog: Arc<StationCatalog>, filter: PickFilter) -> Result<Self, OctolocError> {
        if let Some((start, end)) = filter.time_range {
            if start > end {
                return Err(OctolocError::InvalidConfiguration(
                    "start time is after end time".into(),
                ));
            }
        }
        let authors = filter
            .authors
            .iter()
            .map(|a| compile_glob(a))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PickBuffer {
            catalog,
            authors,
            whitelist: filter.whitelist,
            time_range: filter.time_range,
            seen: FastHashSet::default(),
            duplicate_horizon: DEFAULT_DUPLICATE_HORIZON,
            next_prune: None,
            queue: BinaryHeap::new(),
            seq: 0,
            stats: IntakeStats::default(),
        })
    }

    /// Keep duplicate keys of released picks for `horizon` seconds.
    pub fn with_duplicate_horizon(mut self, horizon: Second) -> Self {
        self.duplicate_horizon = horizon;
        self
    }

    fn check(&self, pick: &Pick) -> Result<Arc<Station>, Rejection> {
        if !self.authors.is_empty() && !self.authors.iter().any(|re| re.is_match(&pick.author)) {
            return Err(Rejection::Author);
        }
        if self
            .whitelist
            .as_ref()
            .is_some_and(|w| !w.matches(&pick.stream))
        {
            return Err(Rejection::Whitelist);
        }
        if let Some((start, end)) = self.time_range {
            if pick.time < start || pick.time > end {
                return Err(Rejection::OutOfTimeRange);
            }
        }
        match self.catalog.lookup(&pick.stream) {
            Ok(station) => Ok(Arc::clone(station)),
            Err(err) => {
                debug!(pick = %pick.id, %err, "pick dropped");
                Err(Rejection::UnknownStation)
            }
        }
    }

    /// Offer a pick to the buffer.
    ///
    /// Return
    /// ----------
    /// * `Ok(())` when the pick was queued, `Err(rejection)` otherwise.
    pub fn push(&mut self, pick: Pick) -> Result<(), Rejection> {
        let outcome = self.check(&pick).and_then(|station| {
            let micros = (pick.seconds() * 1e6).round() as i64;
            if self.seen.insert((pick.stream.clone(), micros, pick.phase)) {
                Ok(station)
            } else {
                Err(Rejection::Duplicate)
            }
        });

        match outcome {
            Ok(station) => {
                self.stats.accepted += 1;
                self.seq += 1;
                self.queue.push(QueuedPick {
                    time: OrderedFloat(pick.seconds()),
                    seq: self.seq,
                    pick: StationPick {
                        pick: Arc::new(pick),
                        station,
                    },
                });
                Ok(())
            }
            Err(rejection) => {
                debug!(pick = %pick.id, ?rejection, "pick rejected");
                self.stats.count(rejection);
                Err(rejection)
            }
        }
    }

    /// Offer many picks; rejections are only counted.
    pub fn extend<I: IntoIterator<Item = Pick>>(&mut self, picks: I) {
        for pick in picks {
            let _ = self.push(pick);
        }
    }

    /// Release the earliest queued pick.
    pub fn pop(&mut self) -> Option<StationPick> {
        let released = self.queue.pop()?.pick;
        self.forget_released(released.seconds());
        Some(released)
    }

    /// Drop the keys of picks released more than the horizon before `now`. Runs at most once
    /// per horizon of release time.
    fn forget_released(&mut self, now: Second) {
        match self.next_prune {
            None => self.next_prune = Some(now + self.duplicate_horizon),
            Some(due) if now >= due => {
                let cutoff = ((now - self.duplicate_horizon) * 1e6).round() as i64;
                let before = self.seen.len();
                self.seen.retain(|(_, micros, _)| *micros >= cutoff);
                debug!(forgotten = before - self.seen.len(), "duplicate keys pruned");
                self.next_prune = Some(now + self.duplicate_horizon);
            }
            Some(_) => {}
        }
    }

    /// Arrival time of the earliest queued pick.
    pub fn peek_time(&self) -> Option<Second> {
        self.queue.peek().map(|q| q.time.into_inner())
    }

    /// Time-ordered lazy sequence over the queued picks.
    pub fn drain(&mut self) -> impl Iterator<Item = StationPick> + '_ {
        std::iter::from_fn(move || self.pop())
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn stats(&self) -> &IntakeStats {
        &self.stats
    }
}
