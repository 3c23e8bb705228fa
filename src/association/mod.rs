//! # Incremental association
//!
//! This module groups incoming picks into **candidate events** and keeps each candidate's
//! location up to date as picks arrive.
//!
//! ## Components
//!
//! - [`AssociatorParams`] – tunable thresholds (pick-count requirements, acceptance residual,
//!   quiescence timeout, warm-start box, full re-search interval), built and validated through
//!   [`AssociatorParamsBuilder`].
//! - [`candidate::CandidateEvent`] – the lifecycle `Forming → Located → Closed` of one
//!   candidate, mutated only through [`candidate::EventCommand`]s.
//! - [`refinement`] – warm-start and periodic full octree searches.
//! - [`engine::AssociationEngine`] – owner of every candidate and of the pick → event map;
//!   decides for each new pick which candidate, if any, receives it.
//!
//! ## Pick-count requirement
//!
//! A candidate may be located once it holds at least `min_picks` picks, of which at least
//! `min_p_picks` are P, at least `min_s_picks` are S, and at least `min_p_and_s_picks` stations
//! contribute both a P and an S pick. The defaults (4 picks, 4 P) are the smallest set that
//! constrains three spatial coordinates and the origin time.
//!
//! ## Example
//!
//! ```rust
//! use octoloc::association::AssociatorParams;
//!
//! let params = AssociatorParams::builder()
//!     .min_picks(6)
//!     .min_p_picks(4)
//!     .min_s_picks(1)
//!     .acceptance_residual(1.5)
//!     .quiescence(90.0)
//!     .build()
//!     .unwrap();
//! println!("{params:#}");
//! ```
pub mod candidate;
pub mod engine;
pub mod refinement;

use std::cmp::Ordering::{Equal, Greater, Less};
use std::fmt;

use itertools::Itertools;

use crate::{
    constants::{Kilometer, Second, DEFAULT_PICK_MATCH_TOLERANCE},
    octoloc_errors::OctolocError,
    octree::SearchVolume,
    picks::{pick_buffer::StationPick, PhaseType},
};

pub use candidate::{CandidateEvent, EventCommand, EventState};
pub use engine::{AssociationEngine, EngineEvent, EngineStats};

/// Association and refinement thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct AssociatorParams {
    /// Minimum number of picks (P or S) before a candidate may be located
    pub min_picks: usize,
    /// Minimum number of P picks
    pub min_p_picks: usize,
    /// Minimum number of S picks
    pub min_s_picks: usize,
    /// Minimum number of stations with both a P and an S pick
    pub min_p_and_s_picks: usize,
    /// Largest absolute residual a pick may have and still belong to a located candidate (s)
    pub acceptance_residual: Second,
    /// Slack added to the travel-time compatibility bound (s)
    pub pick_match_tolerance: Second,
    /// A candidate with no new pick for longer than this is closed (s)
    pub quiescence: Second,
    /// Largest distance from a pick's station to the nearest station of a forming candidate
    /// for the pick to join it (km). `None` uses half the network radius of the volume.
    pub proximity_distance: Option<Kilometer>,
    /// Horizontal half extent of the warm-start box (km)
    pub warm_start_radius: Kilometer,
    /// Vertical half extent of the warm-start box (km)
    pub warm_start_depth: Kilometer,
    /// Every this many refinements a full-volume search is run as well
    pub full_search_interval: u32,
}

impl AssociatorParams {
    pub fn builder() -> AssociatorParamsBuilder {
        AssociatorParamsBuilder::new()
    }

    /// Whether a pick set satisfies the pick-count requirement.
    pub fn requirement_met(&self, picks: &[StationPick]) -> bool {
        let p_count = picks.iter().filter(|p| p.phase() == PhaseType::P).count();
        let s_count = picks.len() - p_count;
        if picks.len() < self.min_picks || p_count < self.min_p_picks || s_count < self.min_s_picks
        {
            return false;
        }
        if self.min_p_and_s_picks == 0 {
            return true;
        }
        let both = picks
            .iter()
            .into_group_map_by(|p| p.station.index)
            .into_values()
            .filter(|group| {
                group.iter().any(|p| p.phase() == PhaseType::P)
                    && group.iter().any(|p| p.phase() == PhaseType::S)
            })
            .count();
        both >= self.min_p_and_s_picks
    }

    /// Station linking distance of forming candidates in `volume`.
    pub fn linking_distance(&self, volume: &SearchVolume) -> Kilometer {
        self.proximity_distance.unwrap_or(volume.max_distance() / 2.0)
    }
}

impl Default for AssociatorParams {
    fn default() -> Self {
        AssociatorParams {
            min_picks: 4,
            min_p_picks: 4,
            min_s_picks: 0,
            min_p_and_s_picks: 0,
            acceptance_residual: 2.0,
            pick_match_tolerance: DEFAULT_PICK_MATCH_TOLERANCE,
            quiescence: 120.0,
            proximity_distance: None,
            warm_start_radius: 25.0,
            warm_start_depth: 15.0,
            full_search_interval: 5,
        }
    }
}

/// Builder for [`AssociatorParams`], with validation.
#[derive(Debug, Clone, Default)]
pub struct AssociatorParamsBuilder {
    params: AssociatorParams,
}

impl AssociatorParamsBuilder {
    pub fn new() -> Self {
        Self {
            params: AssociatorParams::default(),
        }
    }

    // --- Pick-count requirement ---
    pub fn min_picks(mut self, v: usize) -> Self {
        self.params.min_picks = v;
        self
    }
    pub fn min_p_picks(mut self, v: usize) -> Self {
        self.params.min_p_picks = v;
        self
    }
    pub fn min_s_picks(mut self, v: usize) -> Self {
        self.params.min_s_picks = v;
        self
    }
    pub fn min_p_and_s_picks(mut self, v: usize) -> Self {
        self.params.min_p_and_s_picks = v;
        self
    }

    // --- Acceptance ---
    pub fn acceptance_residual(mut self, v: Second) -> Self {
        self.params.acceptance_residual = v;
        self
    }
    pub fn pick_match_tolerance(mut self, v: Second) -> Self {
        self.params.pick_match_tolerance = v;
        self
    }
    pub fn quiescence(mut self, v: Second) -> Self {
        self.params.quiescence = v;
        self
    }
    pub fn proximity_distance(mut self, v: Kilometer) -> Self {
        self.params.proximity_distance = Some(v);
        self
    }

    // --- Refinement ---
    pub fn warm_start_radius(mut self, v: Kilometer) -> Self {
        self.params.warm_start_radius = v;
        self
    }
    pub fn warm_start_depth(mut self, v: Kilometer) -> Self {
        self.params.warm_start_depth = v;
        self
    }
    pub fn full_search_interval(mut self, v: u32) -> Self {
        self.params.full_search_interval = v;
        self
    }

    /// Return true iff x > 0.0 and comparable (i.e., not NaN).
    #[inline]
    fn gt0(x: f64) -> bool {
        x.partial_cmp(&0.0) == Some(Greater)
    }

    /// Return true iff a <= b and comparable (i.e., not NaN).
    #[inline]
    fn le(a: f64, b: f64) -> bool {
        matches!(a.partial_cmp(&b), Some(Less) | Some(Equal))
    }

    /// Finalize the builder.
    ///
    /// Validation rules
    /// -----------------
    /// * `min_picks >= 1`, and `min_picks >= min_p_picks`, `min_picks >= min_s_picks`.
    /// * `0 < acceptance_residual <= pick_match_tolerance`.
    /// * `quiescence`, `warm_start_radius`, `warm_start_depth` > 0, and `proximity_distance`
    ///   when set.
    /// * `full_search_interval >= 1`.
    ///
    /// Return
    /// ----------
    /// * The parameters, or [`OctolocError::InvalidConfiguration`] naming the first violated rule.
    pub fn build(self) -> Result<AssociatorParams, OctolocError> {
        let p = &self.params;

        if p.min_picks == 0 {
            return Err(OctolocError::InvalidConfiguration(
                "min_picks must be >= 1".into(),
            ));
        }
        if p.min_p_picks > p.min_picks || p.min_s_picks > p.min_picks {
            return Err(OctolocError::InvalidConfiguration(
                "per-phase minimum exceeds min_picks".into(),
            ));
        }
        if !Self::gt0(p.acceptance_residual) || !Self::gt0(p.pick_match_tolerance) {
            return Err(OctolocError::InvalidConfiguration(
                "acceptance_residual and pick_match_tolerance must be > 0".into(),
            ));
        }
        if !Self::le(p.acceptance_residual, p.pick_match_tolerance) {
            return Err(OctolocError::InvalidConfiguration(
                "acceptance_residual must not exceed pick_match_tolerance".into(),
            ));
        }
        if !Self::gt0(p.quiescence) {
            return Err(OctolocError::InvalidConfiguration(
                "quiescence must be > 0".into(),
            ));
        }
        if p.proximity_distance.is_some_and(|d| !Self::gt0(d)) {
            return Err(OctolocError::InvalidConfiguration(
                "proximity_distance must be > 0".into(),
            ));
        }
        if !Self::gt0(p.warm_start_radius) || !Self::gt0(p.warm_start_depth) {
            return Err(OctolocError::InvalidConfiguration(
                "warm-start box must have positive extents".into(),
            ));
        }
        if p.full_search_interval == 0 {
            return Err(OctolocError::InvalidConfiguration(
                "full_search_interval must be >= 1".into(),
            ));
        }

        Ok(self.params)
    }
}

impl fmt::Display for AssociatorParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            const PARAM_COL: usize = 44;
            writeln!(f, "Association Parameters")?;
            writeln!(f, "----------------------")?;

            macro_rules! line {
                ($fmt:expr, $val:expr, $comment:expr) => {{
                    let s = format!($fmt, $val);
                    let pad = if s.len() < PARAM_COL {
                        " ".repeat(PARAM_COL - s.len())
                    } else {
                        " ".to_string()
                    };
                    writeln!(f, "  {}{}# {}", s, pad, $comment)
                }};
            }

            writeln!(f, "[Pick-count requirement]")?;
            line!("min_picks            = {}", self.min_picks, "Picks (P or S) needed to locate")?;
            line!("min_p_picks          = {}", self.min_p_picks, "P picks needed")?;
            line!("min_s_picks          = {}", self.min_s_picks, "S picks needed")?;
            line!(
                "min_p_and_s_picks    = {}",
                self.min_p_and_s_picks,
                "Stations with both P and S"
            )?;

            writeln!(f, "\n[Acceptance]")?;
            line!(
                "acceptance_residual  = {:.2} s",
                self.acceptance_residual,
                "Max |residual| of an associated pick"
            )?;
            line!(
                "pick_match_tolerance = {:.2} s",
                self.pick_match_tolerance,
                "Slack of the compatibility bound"
            )?;
            line!(
                "quiescence           = {:.1} s",
                self.quiescence,
                "Inactivity before a candidate closes"
            )?;
            match self.proximity_distance {
                Some(d) => line!(
                    "proximity_distance   = {:.1} km",
                    d,
                    "Station linking distance while forming"
                )?,
                None => line!(
                    "proximity_distance   = {}",
                    "auto",
                    "Half the network radius"
                )?,
            }

            writeln!(f, "\n[Refinement]")?;
            line!(
                "warm_start_radius    = {:.1} km",
                self.warm_start_radius,
                "Horizontal half extent of warm start"
            )?;
            line!(
                "warm_start_depth     = {:.1} km",
                self.warm_start_depth,
                "Vertical half extent of warm start"
            )?;
            line!(
                "full_search_interval = {}",
                self.full_search_interval,
                "Refinements between full searches"
            )?;
            Ok(())
        } else {
            write!(
                f,
                "AssociatorParams(min_picks={}, min_p={}, min_s={}, min_p_and_s={}, acceptance={:.2}s, tolerance={:.2}s, quiescence={:.1}s)",
                self.min_picks,
                self.min_p_picks,
                self.min_s_picks,
                self.min_p_and_s_picks,
                self.acceptance_residual,
                self.pick_match_tolerance,
                self.quiescence
            )
        }
    }
}
