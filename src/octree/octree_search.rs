//! Best-first octree search for the hypocenter minimizing the arrival-time misfit.
//!
//! For a fixed trial hypocenter `h`, the origin time minimizing the sum of squared residuals
//! has the closed form
//!
//! ```text
//! t0(h) = mean_i( t_i - tt_i(h) )
//! ```
//!
//! so the misfit is a function of the three spatial coordinates only:
//!
//! ```text
//! misfit(h) = Σ_i ( t_i - t0(h) - tt_i(h) )²
//! ```
//!
//! The search keeps a priority queue of [`SearchCell`]s. Each cell carries the misfit at its
//! center and a lower bound of the misfit over the whole cell: a travel time changes by at
//! most `d / min_velocity` when the hypocenter moves by `d`, so every residual of the cell
//! may shift by the half diagonal over the phase velocity. Cells pop by ascending bound, so
//! a large unexplored cell is never buried under a deep local minimum. The popped cell is
//! split into up to eight children (see [`SearchCell::child_centers`]). Children whose
//! center falls outside the [`SearchVolume`] are dropped, children no larger than
//! [`SearchParams::min_cell_size`] are evaluated but not queued. The best point seen so far
//! is returned when one of the following happens first:
//!
//! 1. no queued cell can beat the best point, or the queue is empty (every remaining cell
//!    reached the minimum size),
//! 2. another subdivision would exceed [`SearchParams::max_evaluations`],
//! 3. [`SearchParams::stall_pops`] consecutive subdivisions did not improve the best point.
//!
//! The search is deterministic: children are generated in a fixed order and equal keys
//! are popped in insertion order.
use std::collections::BinaryHeap;

use nalgebra::Vector3;
use smallvec::SmallVec;
use tracing::debug;

use crate::{
    constants::{Kilometer, Second},
    octoloc_errors::OctolocError,
    picks::PhaseType,
    velocity_model::VelocityModel,
};

use super::{search_cell::SearchCell, SearchParams, SearchRegion, SearchVolume};

/// An arrival as seen by the search: where it was observed, which phase, and when.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObservedArrival {
    /// Station position in the local frame (km)
    pub station: Vector3<f64>,
    pub phase: PhaseType,
    /// Arrival time (UTC seconds)
    pub time: Second,
}

/// Why the search stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Every cell that could still beat the best point was refined to the minimum size
    MinCellSize,
    MaxEvaluations,
    Stalled,
}

/// Best point found by a search, with the per-arrival residuals at that point.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationResult {
    /// Hypocenter in the local frame (km)
    pub hypocenter: Vector3<f64>,
    /// Origin time (UTC seconds)
    pub origin_time: Second,
    /// Observed minus predicted arrival time, in the order of the input arrivals
    pub residuals: Vec<Second>,
    /// Sum of squared residuals
    pub misfit: f64,
    pub evaluations: usize,
    pub termination: Termination,
}

impl LocationResult {
    /// The evaluation budget ran out before the search converged.
    pub fn low_confidence(&self) -> bool {
        self.termination == Termination::MaxEvaluations
    }

    pub fn rms(&self) -> Second {
        if self.residuals.is_empty() {
            return 0.0;
        }
        (self.misfit / self.residuals.len() as f64).sqrt()
    }
}

/// Optimal origin time and misfit of a trial hypocenter.
///
/// Arguments
/// -----------------
/// * `arrivals`: the observed arrivals (non-empty).
/// * `model`: travel-time predictor.
/// * `point`: trial hypocenter in the local frame.
///
/// Return
/// ----------
/// * `(origin_time, misfit)`, the origin time in UTC seconds.
pub fn misfit_at<M: VelocityModel + ?Sized>(
    arrivals: &[ObservedArrival],
    model: &M,
    point: &Vector3<f64>,
) -> (Second, f64) {
    if arrivals.is_empty() {
        return (0.0, 0.0);
    }
    // Work relative to the first arrival to keep the sums small
    let t_ref = arrivals[0].time;
    let n = arrivals.len() as f64;

    let reduced: f64 = arrivals
        .iter()
        .map(|a| a.time - t_ref - model.travel_time(point, &a.station, a.phase))
        .sum();
    let t0 = reduced / n;

    let misfit = arrivals
        .iter()
        .map(|a| {
            let r = a.time - t_ref - t0 - model.travel_time(point, &a.station, a.phase);
            r * r
        })
        .sum();

    (t_ref + t0, misfit)
}

/// Observed minus predicted arrival times at a given hypocenter and origin time.
pub fn residuals_at<M: VelocityModel + ?Sized>(
    arrivals: &[ObservedArrival],
    model: &M,
    point: &Vector3<f64>,
    origin_time: Second,
) -> Vec<Second> {
    arrivals
        .iter()
        .map(|a| a.time - origin_time - model.travel_time(point, &a.station, a.phase))
        .collect()
}

/// Center misfit, origin time and misfit lower bound of a cell.
struct CellScore {
    origin_time: Second,
    misfit: f64,
    bound: f64,
}

fn score_cell<M: VelocityModel + ?Sized>(
    arrivals: &[ObservedArrival],
    model: &M,
    center: &Vector3<f64>,
    half_diagonal: Kilometer,
) -> CellScore {
    let t_ref = arrivals[0].time;
    // reduced origin times and their tolerance over the cell
    let spans: SmallVec<[(f64, f64); 32]> = arrivals
        .iter()
        .map(|a| {
            (
                a.time - t_ref - model.travel_time(center, &a.station, a.phase),
                half_diagonal / model.min_velocity(a.phase),
            )
        })
        .collect();

    let t0 = spans.iter().map(|(u, _)| u).sum::<f64>() / spans.len() as f64;
    let misfit = spans.iter().map(|(u, _)| (u - t0) * (u - t0)).sum();

    CellScore {
        origin_time: t_ref + t0,
        misfit,
        bound: misfit_lower_bound(&spans),
    }
}

/// Minimum over `t` of `Σ max(0, |u - t| - δ)²`.
///
/// The function is convex in `t`, its derivative is found by bisection.
fn misfit_lower_bound(spans: &[(f64, f64)]) -> f64 {
    let excess = |u: f64, delta: f64, t: f64| ((u - t).abs() - delta).max(0.0);
    let cost = |t: f64| {
        spans
            .iter()
            .map(|&(u, delta)| excess(u, delta, t).powi(2))
            .sum::<f64>()
    };
    let slope = |t: f64| {
        spans
            .iter()
            .map(|&(u, delta)| -(u - t).signum() * excess(u, delta, t))
            .sum::<f64>()
    };

    let (mut lo, mut hi) = spans
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &(u, delta)| {
            (lo.min(u - delta), hi.max(u + delta))
        });
    for _ in 0..64 {
        let mid = 0.5 * (lo + hi);
        if slope(mid) < 0.0 {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo <= 1e-9 {
            break;
        }
    }
    cost(0.5 * (lo + hi))
}

struct Best {
    point: Vector3<f64>,
    origin_time: Second,
    misfit: f64,
}

impl Best {
    /// Whether a cell with misfit lower bound `bound` may still hold a better point.
    fn beaten_by(best: &Option<Best>, bound: f64) -> bool {
        best.as_ref().is_none_or(|b| bound < b.misfit)
    }

    fn offer(best: &mut Option<Best>, point: Vector3<f64>, origin_time: Second, misfit: f64) -> bool {
        match best {
            Some(b) if !(misfit < b.misfit) => false,
            _ => {
                *best = Some(Best {
                    point,
                    origin_time,
                    misfit,
                });
                true
            }
        }
    }
}

/// Locate a set of arrivals with a best-first octree search.
///
/// Arguments
/// -----------------
/// * `arrivals`: the observed arrivals.
/// * `model`: travel-time predictor.
/// * `volume`: hard bound for every evaluated and returned point.
/// * `region`: root cell of this search (the full volume, or a warm-start box).
/// * `seed`: an optional point evaluated before the root, typically the previous hypocenter.
///   It is ignored when outside `volume`.
/// * `params`: termination controls.
///
/// Return
/// ----------
/// * The best point found. A search that stopped on the evaluation budget still returns its
///   best point, flagged through [`LocationResult::low_confidence`].
///
/// Errors
/// ----------
/// * [`OctolocError::DegenerateGeometry`] when `arrivals` is empty or no evaluated point lies
///   inside `volume`.
pub fn locate<M: VelocityModel + ?Sized>(
    arrivals: &[ObservedArrival],
    model: &M,
    volume: &SearchVolume,
    region: &SearchRegion,
    seed: Option<&Vector3<f64>>,
    params: &SearchParams,
) -> Result<LocationResult, OctolocError> {
    if arrivals.is_empty() {
        return Err(OctolocError::DegenerateGeometry(
            "no arrivals to locate".into(),
        ));
    }

    let mut best: Option<Best> = None;
    let mut evaluations = 0usize;
    let mut rank = 0u64;

    if let Some(seed) = seed.filter(|s| volume.contains(s)) {
        let (t0, misfit) = misfit_at(arrivals, model, seed);
        evaluations += 1;
        Best::offer(&mut best, *seed, t0, misfit);
    }

    let mut heap = BinaryHeap::new();
    let root = score_cell(arrivals, model, &region.center, region.half_extent.norm());
    evaluations += 1;
    if volume.contains(&region.center) {
        Best::offer(&mut best, region.center, root.origin_time, root.misfit);
    }
    heap.push(SearchCell::from_region(region, root.misfit, root.bound, rank));

    let mut stalled_pops = 0usize;
    let termination = loop {
        let Some(cell) = heap.pop() else {
            break Termination::MinCellSize;
        };
        // the queue pops by ascending bound, nothing left can improve
        if !Best::beaten_by(&best, cell.bound) {
            break Termination::MinCellSize;
        }
        if cell.size() <= params.min_cell_size {
            continue;
        }
        let (centers, half_extent) = cell.child_centers();
        if evaluations + centers.len() > params.max_evaluations {
            break Termination::MaxEvaluations;
        }

        let half_diagonal = half_extent.norm();
        let leaf = 2.0 * half_extent.max() <= params.min_cell_size;
        let mut improved = false;
        for center in centers.into_iter().filter(|c| volume.contains(c)) {
            let child = score_cell(arrivals, model, &center, half_diagonal);
            evaluations += 1;
            improved |= Best::offer(&mut best, center, child.origin_time, child.misfit);

            if leaf || !Best::beaten_by(&best, child.bound) {
                continue;
            }
            rank += 1;
            heap.push(SearchCell {
                center,
                half_extent,
                misfit: child.misfit,
                bound: child.bound,
                rank,
            });
        }

        if improved {
            stalled_pops = 0;
        } else {
            stalled_pops += 1;
            if stalled_pops >= params.stall_pops {
                break Termination::Stalled;
            }
        }
    };

    let best = best.ok_or_else(|| {
        OctolocError::DegenerateGeometry("search region does not intersect the volume".into())
    })?;

    debug!(
        evaluations,
        misfit = best.misfit,
        ?termination,
        "octree search finished"
    );

    Ok(LocationResult {
        residuals: residuals_at(arrivals, model, &best.point, best.origin_time),
        hypocenter: best.point,
        origin_time: best.origin_time,
        misfit: best.misfit,
        evaluations,
        termination,
    })
}
