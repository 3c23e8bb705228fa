//! # Octree hypocenter search
//!
//! This module hosts the **best-first octree search** used to locate a set of associated picks,
//! together with the geometric objects it works on:
//!
//! - [`SearchVolume`] – the operator-declared area of interest (network center, horizontal
//!   radius, depth range). Fixed per run; every emitted hypocenter lies inside it.
//! - [`SearchRegion`] – an axis-aligned box in the local projected frame, used as the root
//!   cell of one search. The full region spans the whole volume; warm-start refinements use a
//!   tighter region around a previous hypocenter.
//! - [`SearchParams`] – termination controls (minimum cell size, evaluation budget, stall
//!   detection), built and validated through [`SearchParamsBuilder`].
//! - [`search_cell::SearchCell`] – the ephemeral sub-volume queued by the search.
//! - [`octree_search::locate`] – the search itself.
//!
//! ## Frame
//!
//! All coordinates are local Cartesian kilometres `(x = east, y = north, z = depth)` in the
//! azimuthal-equidistant projection of [`crate::geodesy::LocalProjection`] centred on the
//! volume center. Because the projection is equidistant from its center, the horizontal bound
//! of the volume is the exact great-circle radius.
//!
//! ## Example
//!
//! ```rust
//! use octoloc::octree::{SearchParams, SearchVolume};
//!
//! let volume = SearchVolume::new(-21.0, -69.0, 200.0, 0.0, 100.0).unwrap();
//! let params = SearchParams::builder()
//!     .min_cell_size(0.05)
//!     .max_evaluations(50_000)
//!     .build()
//!     .unwrap();
//!
//! assert!(volume.contains_epicenter(-21.5, -69.2));
//! println!("{params:#}");
//! ```
//!
//! ## See also
//! ------------
//! * [`crate::velocity_model::VelocityModel`] – travel-time predictions used by the misfit.
//! * [`crate::association`] – the incremental engine that drives repeated searches.
pub mod octree_search;
pub mod search_cell;

use std::cmp::Ordering::Greater;
use std::fmt;

use nalgebra::Vector3;

use crate::constants::{Degree, Kilometer, KM_PER_DEG};
use crate::geodesy::{distance_km, LocalProjection};
use crate::octoloc_errors::OctolocError;

pub use octree_search::{locate, LocationResult, ObservedArrival, Termination};

/// Bounded volume in which hypocenters are searched.
///
/// The bound is a vertical cylinder: horizontal distance from the center at most
/// `max_distance`, depth within `[min_depth, max_depth]`. Both bounds are inclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchVolume {
    center_lat: Degree,
    center_lon: Degree,
    max_distance: Kilometer,
    min_depth: Kilometer,
    max_depth: Kilometer,
    projection: LocalProjection,
}

impl SearchVolume {
    /// Create and validate a search volume.
    ///
    /// Arguments
    /// -----------------
    /// * `center_lat`, `center_lon`: network center (degrees).
    /// * `max_distance`: maximum horizontal distance from the center (km).
    /// * `min_depth`, `max_depth`: depth range (km, positive down).
    ///
    /// Return
    /// ----------
    /// * The volume, or [`OctolocError::InvalidConfiguration`] for a zero-size or
    ///   contradictory volume.
    pub fn new(
        center_lat: Degree,
        center_lon: Degree,
        max_distance: Kilometer,
        min_depth: Kilometer,
        max_depth: Kilometer,
    ) -> Result<Self, OctolocError> {
        if !(-90.0..=90.0).contains(&center_lat) || !(-180.0..=360.0).contains(&center_lon) {
            return Err(OctolocError::InvalidConfiguration(format!(
                "center {center_lat},{center_lon} is not a geographic coordinate"
            )));
        }
        if max_distance.partial_cmp(&0.0) != Some(Greater) {
            return Err(OctolocError::InvalidConfiguration(
                "max_distance must be > 0".into(),
            ));
        }
        if max_distance > 180.0 * KM_PER_DEG {
            return Err(OctolocError::InvalidConfiguration(
                "max_distance exceeds half the Earth circumference".into(),
            ));
        }
        if !min_depth.is_finite() || max_depth.partial_cmp(&min_depth) != Some(Greater) {
            return Err(OctolocError::InvalidConfiguration(
                "require min_depth < max_depth".into(),
            ));
        }

        Ok(SearchVolume {
            center_lat,
            center_lon,
            max_distance,
            min_depth,
            max_depth,
            projection: LocalProjection::new(center_lat, center_lon),
        })
    }

    pub fn center(&self) -> (Degree, Degree) {
        (self.center_lat, self.center_lon)
    }

    pub fn max_distance(&self) -> Kilometer {
        self.max_distance
    }

    pub fn min_depth(&self) -> Kilometer {
        self.min_depth
    }

    pub fn max_depth(&self) -> Kilometer {
        self.max_depth
    }

    pub fn projection(&self) -> &LocalProjection {
        &self.projection
    }

    /// Whether a local point lies inside the volume (boundary included).
    pub fn contains(&self, point: &Vector3<f64>) -> bool {
        let horizontal = point.x.hypot(point.y);
        horizontal <= self.max_distance && point.z >= self.min_depth && point.z <= self.max_depth
    }

    /// Whether a geographic epicenter lies within the horizontal bound.
    pub fn contains_epicenter(&self, lat: Degree, lon: Degree) -> bool {
        distance_km(self.center_lat, self.center_lon, lat, lon) <= self.max_distance
    }

    /// Local point → `(lat, lon, depth)`.
    pub fn to_geographic(&self, point: &Vector3<f64>) -> (Degree, Degree, Kilometer) {
        let (lat, lon) = self.projection.inverse(point.x, point.y);
        (lat, lon, point.z)
    }

    /// `(lat, lon, depth)` → local point.
    pub fn to_local(&self, lat: Degree, lon: Degree, depth: Kilometer) -> Vector3<f64> {
        let (x, y) = self.projection.forward(lat, lon);
        Vector3::new(x, y, depth)
    }

    /// The bounding box of the whole volume.
    pub fn full_region(&self) -> SearchRegion {
        let half_depth = 0.5 * (self.max_depth - self.min_depth);
        SearchRegion {
            center: Vector3::new(0.0, 0.0, self.min_depth + half_depth),
            half_extent: Vector3::new(self.max_distance, self.max_distance, half_depth),
        }
    }

    /// A box of the given half extents around `point`, clipped to the bounding box of the
    /// volume.
    ///
    /// Arguments
    /// -----------------
    /// * `point`: center of the requested box (local frame).
    /// * `horizontal`: requested horizontal half extent (km).
    /// * `vertical`: requested vertical half extent (km).
    ///
    /// Return
    /// ----------
    /// * The clipped region. Its extent never exceeds [`SearchVolume::full_region`].
    pub fn region_around(
        &self,
        point: &Vector3<f64>,
        horizontal: Kilometer,
        vertical: Kilometer,
    ) -> SearchRegion {
        let full = self.full_region();
        let lo_full = full.center - full.half_extent;
        let hi_full = full.center + full.half_extent;
        let half = Vector3::new(horizontal, horizontal, vertical);

        let lo = (point - half).sup(&lo_full);
        let hi = (point + half).inf(&hi_full);

        SearchRegion {
            center: 0.5 * (lo + hi),
            half_extent: 0.5 * (hi - lo).map(|v| v.max(0.0)),
        }
    }
}

impl fmt::Display for SearchVolume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SearchVolume(center={:.3},{:.3}, max_distance={:.1} km, depth∈[{:.1},{:.1}] km)",
            self.center_lat, self.center_lon, self.max_distance, self.min_depth, self.max_depth
        )
    }
}

/// Axis-aligned box in the local frame, used as the root cell of a search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchRegion {
    pub center: Vector3<f64>,
    pub half_extent: Vector3<f64>,
}

/// Termination controls of the octree search.
///
/// Fields
/// -----------------
/// * `min_cell_size`: cells with a full extent no larger than this in every dimension are
///   evaluated but never subdivided (km). The search ends once no larger cell can beat the
///   best point.
/// * `max_evaluations`: misfit evaluation budget. Hitting it flags the result as low confidence.
/// * `stall_pops`: the search stops when this many consecutive subdivisions did not improve
///   the best point.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParams {
    pub min_cell_size: Kilometer,
    pub max_evaluations: usize,
    pub stall_pops: usize,
}

impl SearchParams {
    pub fn builder() -> SearchParamsBuilder {
        SearchParamsBuilder::new()
    }
}

impl Default for SearchParams {
    fn default() -> Self {
        SearchParams {
            min_cell_size: 0.1,
            max_evaluations: 20_000,
            stall_pops: 500,
        }
    }
}

/// Builder for [`SearchParams`], with validation.
#[derive(Debug, Clone, Default)]
pub struct SearchParamsBuilder {
    params: SearchParams,
}

impl SearchParamsBuilder {
    pub fn new() -> Self {
        Self {
            params: SearchParams::default(),
        }
    }

    pub fn min_cell_size(mut self, v: Kilometer) -> Self {
        self.params.min_cell_size = v;
        self
    }
    pub fn max_evaluations(mut self, v: usize) -> Self {
        self.params.max_evaluations = v;
        self
    }
    pub fn stall_pops(mut self, v: usize) -> Self {
        self.params.stall_pops = v;
        self
    }

    /// Finalize the builder.
    ///
    /// Return
    /// ----------
    /// * The parameters, or [`OctolocError::InvalidConfiguration`] when `min_cell_size` is not
    ///   strictly positive or a count is zero.
    pub fn build(self) -> Result<SearchParams, OctolocError> {
        let p = &self.params;
        if p.min_cell_size.partial_cmp(&0.0) != Some(Greater) {
            return Err(OctolocError::InvalidConfiguration(
                "min_cell_size must be > 0".into(),
            ));
        }
        // one root evaluation plus at least one subdivision
        if p.max_evaluations < 9 {
            return Err(OctolocError::InvalidConfiguration(
                "max_evaluations must be >= 9".into(),
            ));
        }
        if p.stall_pops == 0 {
            return Err(OctolocError::InvalidConfiguration(
                "stall_pops must be >= 1".into(),
            ));
        }
        Ok(self.params)
    }
}

impl fmt::Display for SearchParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            const PARAM_COL: usize = 40;
            writeln!(f, "Octree Search Parameters")?;
            writeln!(f, "------------------------")?;

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

            line!(
                "min_cell_size   = {:.3} km",
                self.min_cell_size,
                "Stop once the best cell is this small"
            )?;
            line!(
                "max_evaluations = {}",
                self.max_evaluations,
                "Misfit evaluation budget"
            )?;
            line!(
                "stall_pops      = {}",
                self.stall_pops,
                "Pops without improvement before stopping"
            )?;
            Ok(())
        } else {
            write!(
                f,
                "SearchParams(min_cell_size={:.3}km, max_evaluations={}, stall_pops={})",
                self.min_cell_size, self.max_evaluations, self.stall_pops
            )
        }
    }
}
