//! Location updates of a candidate event.
//!
//! Once a candidate is located, every change of its pick set is followed by a *warm-start*
//! search: the octree root is a box of [`AssociatorParams::warm_start_radius`] by
//! [`AssociatorParams::warm_start_depth`] around the previous hypocenter, clipped to the
//! search volume, and the previous hypocenter itself is evaluated first. Every
//! [`AssociatorParams::full_search_interval`] refinements a search over the whole volume runs as
//! well, and the better of the two results is kept.
//!
//! Seeding with the previous hypocenter makes a refinement non-regressing: its misfit is never
//! larger than the misfit of the previous hypocenter on the current pick set.
use nalgebra::Vector3;
use tracing::debug;

use crate::{
    association::AssociatorParams,
    octoloc_errors::OctolocError,
    octree::{locate, LocationResult, ObservedArrival, SearchParams, SearchVolume},
    velocity_model::VelocityModel,
};

/// Result of a refinement.
#[derive(Debug, Clone, PartialEq)]
pub struct Refinement {
    pub location: LocationResult,
    /// A full-volume search was part of this refinement
    pub full_search: bool,
}

/// Locate a pick set over the whole search volume.
pub fn locate_full<M: VelocityModel + ?Sized>(
    arrivals: &[ObservedArrival],
    model: &M,
    volume: &SearchVolume,
    search: &SearchParams,
) -> Result<LocationResult, OctolocError> {
    locate(arrivals, model, volume, &volume.full_region(), None, search)
}

/// Whether the next refinement must include a full-volume search.
pub fn full_search_due(params: &AssociatorParams, refinements_since_full: u32) -> bool {
    refinements_since_full + 1 >= params.full_search_interval
}

/// Relocate a pick set starting from a previous hypocenter.
///
/// Arguments
/// -----------------
/// * `arrivals`: the current pick set.
/// * `model`: travel-time predictor.
/// * `volume`: search volume.
/// * `search`: octree termination controls.
/// * `params`: warm-start box extents.
/// * `previous`: the previous hypocenter; `None` runs a full search only.
/// * `full_due`: also run a full-volume search.
///
/// Return
/// ----------
/// * The better of the warm and full results. The evaluation count is the sum over both searches.
///
/// See also
/// ------------
/// * [`full_search_due`] – scheduling of the full-volume search.
pub fn refine<M: VelocityModel + ?Sized>(
    arrivals: &[ObservedArrival],
    model: &M,
    volume: &SearchVolume,
    search: &SearchParams,
    params: &AssociatorParams,
    previous: Option<&Vector3<f64>>,
    full_due: bool,
) -> Result<Refinement, OctolocError> {
    let Some(previous) = previous else {
        return Ok(Refinement {
            location: locate_full(arrivals, model, volume, search)?,
            full_search: true,
        });
    };

    let region =
        volume.region_around(previous, params.warm_start_radius, params.warm_start_depth);
    let warm = locate(arrivals, model, volume, &region, Some(previous), search)?;
    if !full_due {
        return Ok(Refinement {
            location: warm,
            full_search: false,
        });
    }

    let full = locate(
        arrivals,
        model,
        volume,
        &volume.full_region(),
        Some(previous),
        search,
    )?;
    let evaluations = warm.evaluations + full.evaluations;
    debug!(
        warm = warm.misfit,
        full = full.misfit,
        evaluations,
        "warm and full searches compared"
    );

    let mut location = if full.misfit < warm.misfit { full } else { warm };
    location.evaluations = evaluations;
    Ok(Refinement {
        location,
        full_search: true,
    })
}

#[cfg(test)]
mod refinement_test {
    use super::*;
    use crate::{octree::octree_search::misfit_at, picks::PhaseType, velocity_model::ConstantVelocityModel};

    fn arrivals(model: &ConstantVelocityModel, hypo: &Vector3<f64>) -> Vec<ObservedArrival> {
        [
            Vector3::new(35.0, 5.0, 0.0),
            Vector3::new(-5.0, 30.0, 0.0),
            Vector3::new(-40.0, -10.0, 0.0),
            Vector3::new(10.0, -25.0, 0.0),
            Vector3::new(20.0, 20.0, -0.5),
        ]
        .iter()
        .map(|s| ObservedArrival {
            station: *s,
            phase: PhaseType::P,
            time: 500.0 + model.travel_time(hypo, s, PhaseType::P),
        })
        .collect()
    }

    #[test]
    fn test_full_search_due() {
        let params = AssociatorParams::builder()
            .full_search_interval(3)
            .build()
            .unwrap();
        assert!(!full_search_due(&params, 0));
        assert!(!full_search_due(&params, 1));
        assert!(full_search_due(&params, 2));

        let every_time = AssociatorParams::builder()
            .full_search_interval(1)
            .build()
            .unwrap();
        assert!(full_search_due(&every_time, 0));
    }

    #[test]
    fn test_refinement_of_converged_candidate_does_not_worsen() {
        let model = ConstantVelocityModel::default();
        let volume = SearchVolume::new(0.0, 0.0, 100.0, 0.0, 40.0).unwrap();
        let search = SearchParams::default();
        let params = AssociatorParams::default();
        let data = arrivals(&model, &Vector3::new(4.0, -3.0, 11.0));

        let first = locate_full(&data, &model, &volume, &search).unwrap();
        for full_due in [false, true] {
            let again = refine(
                &data,
                &model,
                &volume,
                &search,
                &params,
                Some(&first.hypocenter),
                full_due,
            )
            .unwrap();
            assert!(again.location.misfit <= first.misfit);
            assert_eq!(again.full_search, full_due);
        }
    }

    #[test]
    fn test_refinement_never_regresses_from_previous_hypocenter() {
        let model = ConstantVelocityModel::default();
        let volume = SearchVolume::new(0.0, 0.0, 100.0, 0.0, 40.0).unwrap();
        let search = SearchParams::default();
        let params = AssociatorParams::default();
        let mut data = arrivals(&model, &Vector3::new(-6.0, 8.0, 15.0));

        let previous = locate_full(&data[..4], &model, &volume, &search).unwrap();
        // the last arrival is slightly late
        data[4].time += 0.4;
        let (_, at_previous) = misfit_at(&data, &model, &previous.hypocenter);

        let refined = refine(
            &data,
            &model,
            &volume,
            &search,
            &params,
            Some(&previous.hypocenter),
            false,
        )
        .unwrap();
        assert!(refined.location.misfit <= at_previous);
        assert!(volume.contains(&refined.location.hypocenter));
    }

    #[test]
    fn test_without_previous_runs_full_search() {
        let model = ConstantVelocityModel::default();
        let volume = SearchVolume::new(0.0, 0.0, 100.0, 0.0, 40.0).unwrap();
        let data = arrivals(&model, &Vector3::new(0.0, 0.0, 10.0));
        let refined = refine(
            &data,
            &model,
            &volume,
            &SearchParams::default(),
            &AssociatorParams::default(),
            None,
            false,
        )
        .unwrap();
        assert!(refined.full_search);
    }
}
