//! # Velocity model
//!
//! Travel-time prediction from a hypocenter hypothesis to a station, for a given phase.
//!
//! The search and the association engine only depend on the [`VelocityModel`] trait. The crate
//! ships a single implementation, [`ConstantVelocityModel`], a homogeneous half-space with
//! separate P and S velocities and a depth-correction constant:
//!
//! ```text
//! tt = sqrt(dh² + (dz + rh)²) / v
//! ```
//!
//! where `dh` is the horizontal hypocenter–station distance, `dz` the vertical separation
//! (hypocenter depth plus station elevation), `rh` the depth correction and `v` the phase
//! velocity. The function is continuous, strictly increasing in `dh`, and increasing in depth
//! for every hypocenter below `-rh`.
//!
//! ## Specification string
//!
//! A constant model is usually given on the command line as `"vp[,vs[,rh]]"`:
//!
//! ```rust
//! use octoloc::velocity_model::ConstantVelocityModel;
//!
//! let model: ConstantVelocityModel = "6.0".parse().unwrap();
//! assert!((model.vs - 6.0 / 3f64.sqrt()).abs() < 1e-12);
//! assert!((model.depth_correction - (0.77 + 0.32 * 6.0)).abs() < 1e-12);
//!
//! let model: ConstantVelocityModel = "5.8, 3.4, 2.0".parse().unwrap();
//! assert_eq!((model.vp, model.vs, model.depth_correction), (5.8, 3.4, 2.0));
//! ```
use std::{fmt, str::FromStr};

use nalgebra::Vector3;
use nom::{
    character::complete::{char, multispace0},
    multi::separated_list1,
    number::complete::double,
    sequence::delimited,
    IResult, Parser,
};

use crate::{
    constants::{Kilometer, Second},
    octoloc_errors::OctolocError,
    picks::PhaseType,
};

/// Travel-time predictor.
///
/// Implementations must be deterministic, side-effect free and continuous in the hypocenter
/// position. The association engine additionally relies on the Lipschitz bound
///
/// ```text
/// |tt(h, a, phase) - tt(h, b, phase)| <= |a - b| / min_velocity(phase)
/// ```
///
/// to reject incompatible picks before running a full search.
pub trait VelocityModel: Send + Sync {
    /// Predicted travel time from `hypocenter` to `station`, both in the local frame (km,
    /// z positive down).
    fn travel_time(
        &self,
        hypocenter: &Vector3<f64>,
        station: &Vector3<f64>,
        phase: PhaseType,
    ) -> Second;

    /// Lowest propagation velocity of `phase` anywhere in the model (km/s).
    fn min_velocity(&self, phase: PhaseType) -> f64;
}

/// Homogeneous half-space with separate P and S velocities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantVelocityModel {
    /// P-wave velocity (km/s)
    pub vp: f64,
    /// S-wave velocity (km/s)
    pub vs: f64,
    /// Depth-correction constant added to the vertical separation (km)
    pub depth_correction: Kilometer,
}

impl ConstantVelocityModel {
    /// Create and validate a model.
    ///
    /// Return
    /// ----------
    /// * The model, or [`OctolocError::InvalidConfiguration`] unless `0 < vs < vp` and
    ///   `depth_correction >= 0`.
    pub fn new(vp: f64, vs: f64, depth_correction: Kilometer) -> Result<Self, OctolocError> {
        if !(vp.is_finite() && vs.is_finite() && vs > 0.0 && vs < vp) {
            return Err(OctolocError::InvalidConfiguration(format!(
                "velocities must satisfy 0 < vs < vp (vp={vp}, vs={vs})"
            )));
        }
        if !(depth_correction.is_finite() && depth_correction >= 0.0) {
            return Err(OctolocError::InvalidConfiguration(format!(
                "depth correction must be >= 0 (got {depth_correction})"
            )));
        }
        Ok(ConstantVelocityModel {
            vp,
            vs,
            depth_correction,
        })
    }

    /// Model from the P velocity alone, with `vs = vp/√3` and `rh = 0.77 + 0.32·vp`.
    pub fn from_vp(vp: f64) -> Result<Self, OctolocError> {
        Self::new(vp, vp / 3f64.sqrt(), 0.77 + 0.32 * vp)
    }

    #[inline]
    fn velocity(&self, phase: PhaseType) -> f64 {
        match phase {
            PhaseType::P => self.vp,
            PhaseType::S => self.vs,
        }
    }
}

impl Default for ConstantVelocityModel {
    fn default() -> Self {
        // vp = 6 km/s crustal average
        ConstantVelocityModel {
            vp: 6.0,
            vs: 6.0 / 3f64.sqrt(),
            depth_correction: 0.77 + 0.32 * 6.0,
        }
    }
}

impl VelocityModel for ConstantVelocityModel {
    #[inline]
    fn travel_time(
        &self,
        hypocenter: &Vector3<f64>,
        station: &Vector3<f64>,
        phase: PhaseType,
    ) -> Second {
        let dh = (hypocenter.x - station.x).hypot(hypocenter.y - station.y);
        let dz = hypocenter.z - station.z + self.depth_correction;
        dh.hypot(dz) / self.velocity(phase)
    }

    fn min_velocity(&self, phase: PhaseType) -> f64 {
        self.velocity(phase)
    }
}

fn parse_values(input: &str) -> IResult<&str, Vec<f64>> {
    separated_list1(
        delimited(multispace0, char(','), multispace0),
        delimited(multispace0, double, multispace0),
    )
    .parse(input)
}

impl FromStr for ConstantVelocityModel {
    type Err = OctolocError;

    /// Parse `"vp[,vs[,rh]]"`. Omitted values take their defaults (`vs = vp/√3`,
    /// `rh = 0.77 + 0.32·vp`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || OctolocError::InvalidVelocityModel(s.to_string());

        let (rest, values) = parse_values(s).map_err(|_| invalid())?;
        if !rest.is_empty() {
            return Err(invalid());
        }

        let model = match values.as_slice() {
            [vp] => Self::from_vp(*vp),
            [vp, vs] => Self::new(*vp, *vs, 0.77 + 0.32 * vp),
            [vp, vs, rh] => Self::new(*vp, *vs, *rh),
            _ => return Err(invalid()),
        };
        model.map_err(|e| OctolocError::InvalidVelocityModel(format!("{s}: {e}")))
    }
}

impl fmt::Display for ConstantVelocityModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "constant-velocity model vp,vs,rh={:.3},{:.3},{:.3}",
            self.vp, self.vs, self.depth_correction
        )
    }
}

#[cfg(test)]
mod velocity_model_test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_parse_model_string() {
        let m: ConstantVelocityModel = "6.0,3.5".parse().unwrap();
        assert_eq!(m.vs, 3.5);
        assert_relative_eq!(m.depth_correction, 0.77 + 0.32 * 6.0);

        assert!(matches!(
            "".parse::<ConstantVelocityModel>(),
            Err(OctolocError::InvalidVelocityModel(_))
        ));
        assert!("6,3,1,0".parse::<ConstantVelocityModel>().is_err());
        assert!("6;3".parse::<ConstantVelocityModel>().is_err());
        assert!("abc".parse::<ConstantVelocityModel>().is_err());
        // vs must be slower than vp
        assert!("6,7".parse::<ConstantVelocityModel>().is_err());
        assert!("-6".parse::<ConstantVelocityModel>().is_err());
    }

    #[test]
    fn test_travel_time_geometry() {
        let m = ConstantVelocityModel::new(6.0, 3.5, 0.0).unwrap();
        let station = Vector3::new(30.0, 40.0, 0.0);
        let hypo = Vector3::new(0.0, 0.0, 0.0);
        assert_relative_eq!(m.travel_time(&hypo, &station, PhaseType::P), 50.0 / 6.0);
        assert_relative_eq!(m.travel_time(&hypo, &station, PhaseType::S), 50.0 / 3.5);

        let m = ConstantVelocityModel::new(6.0, 3.5, 2.0).unwrap();
        let station = Vector3::new(0.0, 0.0, -1.0);
        let hypo = Vector3::new(0.0, 0.0, 9.0);
        assert_relative_eq!(m.travel_time(&hypo, &station, PhaseType::P), 12.0 / 6.0);
    }

    #[test]
    fn test_travel_time_is_monotonic_in_distance_and_depth() {
        let m = ConstantVelocityModel::default();
        let station = Vector3::zeros();
        let mut last = 0.0;
        for i in 0..200 {
            let tt = m.travel_time(&Vector3::new(i as f64, 0.0, 5.0), &station, PhaseType::P);
            assert!(tt > last);
            last = tt;
        }
        let mut last = 0.0;
        for i in 0..200 {
            let tt = m.travel_time(&Vector3::new(20.0, 0.0, i as f64 * 0.5), &station, PhaseType::S);
            assert!(tt > last);
            last = tt;
        }
    }

    #[test]
    fn test_lipschitz_bound_between_stations() {
        let m = ConstantVelocityModel::default();
        let a = Vector3::new(10.0, -5.0, -0.5);
        let b = Vector3::new(-40.0, 20.0, 0.0);
        let bound = (a - b).norm() / m.min_velocity(PhaseType::P);
        for hypo in [
            Vector3::new(0.0, 0.0, 10.0),
            Vector3::new(100.0, 50.0, 60.0),
            Vector3::new(-40.0, 20.0, 0.0),
        ] {
            let dt = m.travel_time(&hypo, &a, PhaseType::P) - m.travel_time(&hypo, &b, PhaseType::P);
            assert!(dt.abs() <= bound + 1e-12);
        }
    }
}
