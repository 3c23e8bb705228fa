//! # Picks
//!
//! A [`Pick`] is a detected seismic phase arrival: stream identity, absolute arrival time,
//! phase type and author. Picks are immutable once created and are shared as `Arc<Pick>`
//! between the [`PickBuffer`](crate::picks::pick_buffer::PickBuffer), the association engine
//! and the emitted origins.
//!
//! ## Phases
//!
//! Only two phase types take part in location: compressional ([`PhaseType::P`]) and shear
//! ([`PhaseType::S`]). Phase hints are mapped by their leading letter (`Pg`, `Pn`, `P` → P;
//! `Sg`, `Sn`, `S` → S); a missing hint is treated as `P`.
//!
//! ## See also
//! ------------
//! * [`pick_buffer::PickBuffer`] – filtering, deduplication and time ordering.
//! * [`pick_reader::read_picks_csv`] – CSV pick catalog reader.
pub mod pick_buffer;
pub mod pick_reader;

use std::{fmt, str::FromStr};

use hifitime::Epoch;
use serde::{Deserialize, Serialize};

use crate::{
    constants::{PickId, Second},
    octoloc_errors::OctolocError,
    stations::StreamId,
    time::{epoch_to_seconds, time_to_str},
};

/// Phase type used by the travel-time model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PhaseType {
    P,
    S,
}

impl PhaseType {
    /// Map a phase hint to a phase type.
    ///
    /// Return
    /// ----------
    /// * `P` for an empty hint or one starting with `P`/`p`, `S` for a hint starting with
    ///   `S`/`s`, otherwise [`OctolocError::InvalidPhase`].
    pub fn from_hint(hint: &str) -> Result<Self, OctolocError> {
        match hint.trim().chars().next() {
            None | Some('P') | Some('p') => Ok(PhaseType::P),
            Some('S') | Some('s') => Ok(PhaseType::S),
            Some(_) => Err(OctolocError::InvalidPhase(hint.to_string())),
        }
    }
}

impl FromStr for PhaseType {
    type Err = OctolocError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hint(s)
    }
}

impl fmt::Display for PhaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            PhaseType::P => "P",
            PhaseType::S => "S",
        })
    }
}

/// A seismic phase detection.
///
/// Fields
/// -----------------
/// * `id`: public identifier, unique within a run.
/// * `stream`: the stream the phase was detected on.
/// * `time`: arrival time (UTC).
/// * `phase`: phase type.
/// * `author`: pick author, matched against the allow-list.
/// * `creation_time`: time the pick was created, used to pace playback. `None` when the
///   catalog does not carry it.
#[derive(Debug, Clone, PartialEq)]
pub struct Pick {
    pub id: PickId,
    pub stream: StreamId,
    pub time: Epoch,
    pub phase: PhaseType,
    pub author: String,
    pub creation_time: Option<Epoch>,
}

impl Pick {
    pub fn new(id: &str, stream: StreamId, time: Epoch, phase: PhaseType, author: &str) -> Self {
        Pick {
            id: id.to_string(),
            stream,
            time,
            phase,
            author: author.to_string(),
            creation_time: None,
        }
    }

    pub fn with_creation_time(mut self, creation_time: Epoch) -> Self {
        self.creation_time = Some(creation_time);
        self
    }

    /// Arrival time as UTC seconds.
    #[inline]
    pub fn seconds(&self) -> Second {
        epoch_to_seconds(&self.time)
    }

    /// Detection time used for playback pacing.
    ///
    /// Arguments
    /// -----------------
    /// * `use_pick_time`: ignore the creation time and pace by arrival time.
    pub fn detection_time(&self, use_pick_time: bool) -> Epoch {
        match self.creation_time {
            Some(t) if !use_pick_time => t,
            _ => self.time,
        }
    }
}

impl fmt::Display for Pick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.id,
            self.stream,
            time_to_str(&self.time, 3),
            self.phase
        )
    }
}
