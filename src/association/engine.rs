//! # Association engine
//!
//! [`AssociationEngine`] owns every open [`CandidateEvent`] and the pick → event map. Picks are
//! fed one at a time, in non-decreasing arrival-time order, through
//! [`AssociationEngine::process_pick`]:
//!
//! 1. candidates idle for longer than the quiescence timeout are closed,
//! 2. every open candidate is offered the pick (in parallel, the trials are independent):
//!    * a candidate already holding a pick of the same phase at the same station declines,
//!    * a cheap travel-time bound rejects picks that no hypocenter in the volume can reconcile
//!      with the candidate's picks,
//!    * a **located** candidate relocates with the pick included and accepts when every
//!      residual stays within the acceptance threshold,
//!    * a **forming** candidate accepts a pick whose station lies within the linking distance
//!      of one of the candidate's stations; when the pick completes the pick-count requirement,
//!      the candidate must also locate with every residual within the acceptance threshold,
//! 3. the accepting candidate with the lowest resulting misfit wins; forming candidates that
//!    accept without a location rank after every located one. Remaining ties go to the most
//!    recently updated candidate,
//! 4. a pick nobody accepts starts a new candidate.
//!
//! Every mutation is sent to the owning candidate as an [`EventCommand`]. The emitted
//! [`EngineEvent`]s are the origin revisions, withdrawals and closings in the order they
//! happened.
//!
//! The pick → event map keeps the picks of a closed candidate for one quiescence timeout
//! after the closing, then forgets them.
use std::{
    cmp::Reverse,
    collections::{BTreeMap, VecDeque},
    fmt,
    sync::Arc,
};

use nalgebra::Vector3;
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::{
    association::{
        candidate::{CandidateEvent, EventCommand, EventState, EventUpdate},
        refinement::{full_search_due, locate_full, refine},
        AssociatorParams,
    },
    constants::{EventId, FastHashMap, Kilometer, PickId, Second, MAX_STATION_ELEVATION_KM},
    octoloc_errors::OctolocError,
    octree::{LocationResult, SearchParams, SearchVolume},
    origin::Origin,
    picks::{pick_buffer::StationPick, PhaseType},
    velocity_model::VelocityModel,
};

/// Output of the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A new origin revision of a located candidate
    Revision(Origin),
    /// A located candidate lost its origin after a pick removal and is forming again; its
    /// earlier revisions no longer stand
    Withdrawn { event_id: EventId },
    /// A candidate closed; `final_origin` is its last revision, `None` if it never located
    Closed {
        event_id: EventId,
        final_origin: Option<Origin>,
    },
}

impl EngineEvent {
    pub fn event_id(&self) -> EventId {
        match self {
            EngineEvent::Revision(origin) => origin.event_id,
            EngineEvent::Withdrawn { event_id } | EngineEvent::Closed { event_id, .. } => {
                *event_id
            }
        }
    }

    pub fn origin(&self) -> Option<&Origin> {
        match self {
            EngineEvent::Revision(origin) => Some(origin),
            EngineEvent::Withdrawn { .. } => None,
            EngineEvent::Closed { final_origin, .. } => final_origin.as_ref(),
        }
    }
}

/// Counters of an engine run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Picks processed
    pub picks: usize,
    /// Candidates created
    pub created: usize,
    /// Transitions to `Located`
    pub located: usize,
    /// Origin revisions emitted
    pub revisions: usize,
    /// Origins withdrawn
    pub withdrawn: usize,
    /// Candidates closed
    pub closed: usize,
}

impl fmt::Display for EngineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "picks={} created={} located={} revisions={} withdrawn={} closed={}",
            self.picks,
            self.created,
            self.located,
            self.revisions,
            self.withdrawn,
            self.closed
        )
    }
}

/// A candidate's answer to an offered pick.
#[derive(Debug)]
struct Trial {
    event_id: EventId,
    location: Option<LocationResult>,
    full_search: bool,
    last_update: u64,
}

impl Trial {
    /// Smallest key wins.
    fn rank(&self) -> (bool, OrderedFloat<f64>, Reverse<u64>) {
        match &self.location {
            Some(loc) => (false, OrderedFloat(loc.misfit), Reverse(self.last_update)),
            None => (true, OrderedFloat(0.0), Reverse(self.last_update)),
        }
    }
}

/// Incremental association of picks into candidate events.
pub struct AssociationEngine {
    model: Arc<dyn VelocityModel>,
    volume: SearchVolume,
    search: SearchParams,
    params: AssociatorParams,
    open: BTreeMap<EventId, CandidateEvent>,
    membership: FastHashMap<PickId, EventId>,
    /// Closing time and picks of closed candidates still in `membership`, oldest first
    retired: VecDeque<(Second, Vec<PickId>)>,
    linking_distance: Kilometer,
    next_id: EventId,
    seq: u64,
    clock: Option<Second>,
    /// Largest travel time of any phase between two points of the volume
    max_travel_time: Second,
    stats: EngineStats,
}

impl AssociationEngine {
    /// Create an engine with no candidates.
    ///
    /// Arguments
    /// -----------------
    /// * `model`: travel-time predictor shared by every search.
    /// * `volume`: hard bound of every hypocenter.
    /// * `search`: octree termination controls.
    /// * `params`: association thresholds.
    pub fn new(
        model: Arc<dyn VelocityModel>,
        volume: SearchVolume,
        search: SearchParams,
        params: AssociatorParams,
    ) -> Self {
        let reach = volume.max_distance();
        let far_hypocenter = Vector3::new(-reach, 0.0, volume.max_depth());
        let far_station = Vector3::new(reach, 0.0, -MAX_STATION_ELEVATION_KM);
        let max_travel_time = [PhaseType::P, PhaseType::S]
            .into_iter()
            .map(|phase| model.travel_time(&far_hypocenter, &far_station, phase))
            .fold(0.0, f64::max);

        let linking_distance = params.linking_distance(&volume);

        AssociationEngine {
            model,
            volume,
            search,
            params,
            open: BTreeMap::new(),
            membership: Default::default(),
            retired: VecDeque::new(),
            linking_distance,
            next_id: 0,
            seq: 0,
            clock: None,
            max_travel_time,
            stats: EngineStats::default(),
        }
    }

    pub fn params(&self) -> &AssociatorParams {
        &self.params
    }

    pub fn volume(&self) -> &SearchVolume {
        &self.volume
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Open candidates in creation order.
    pub fn candidates(&self) -> impl Iterator<Item = &CandidateEvent> {
        self.open.values()
    }

    pub fn candidate(&self, event_id: EventId) -> Option<&CandidateEvent> {
        self.open.get(&event_id)
    }

    /// The candidate a pick belongs to. Closed candidates keep their picks for one quiescence
    /// timeout after closing.
    pub fn event_of(&self, pick_id: &str) -> Option<EventId> {
        self.membership.get(pick_id).copied()
    }

    /// Associate one pick.
    ///
    /// Arguments
    /// -----------------
    /// * `pick`: the next pick, resolved against the station catalog. Its arrival time advances
    ///   the engine clock.
    ///
    /// Return
    /// ----------
    /// * The origin revisions and closings caused by this pick, in order.
    pub fn process_pick(&mut self, pick: StationPick) -> Vec<EngineEvent> {
        let now = pick.seconds();
        match self.clock {
            Some(clock) if now < clock => {
                warn!(pick = %pick.pick.id, behind = clock - now, "pick older than the engine clock");
            }
            _ => self.clock = Some(now),
        }

        let mut events = self.close_quiescent(self.clock.unwrap_or(now));

        if self.membership.contains_key(&pick.pick.id) {
            warn!(pick = %pick.pick.id, "pick already associated, ignored");
            return events;
        }
        self.stats.picks += 1;

        let winner = self
            .open
            .par_iter()
            .filter_map(|(_, candidate)| self.trial(candidate, &pick))
            .collect::<Vec<_>>()
            .into_iter()
            .min_by_key(Trial::rank);

        match winner {
            Some(trial) => events.extend(self.add_pick(trial, pick, now)),
            None => events.extend(self.create_candidate(pick, now)),
        }
        events
    }

    /// Close every candidate idle for longer than the quiescence timeout at `now`, and forget
    /// the picks of candidates closed longer than that before `now`.
    pub fn close_quiescent(&mut self, now: Second) -> Vec<EngineEvent> {
        let quiescence = self.params.quiescence;
        while let Some((closed_at, _)) = self.retired.front() {
            if now - closed_at <= quiescence {
                break;
            }
            if let Some((_, picks)) = self.retired.pop_front() {
                for pick_id in picks {
                    self.membership.remove(&pick_id);
                }
            }
        }

        let idle: Vec<EventId> = self
            .open
            .values()
            .filter(|c| now - c.last_activity() > quiescence)
            .map(CandidateEvent::id)
            .collect();
        idle.into_iter().filter_map(|id| self.close(id)).collect()
    }

    /// Number of picks in the pick → event map.
    pub fn tracked_picks(&self) -> usize {
        self.membership.len()
    }

    /// Close every open candidate, oldest first.
    pub fn finish(&mut self) -> Vec<EngineEvent> {
        let ids: Vec<EventId> = self.open.keys().copied().collect();
        ids.into_iter().filter_map(|id| self.close(id)).collect()
    }

    /// Warm-start relocation of a located candidate without a pick change.
    ///
    /// Return
    /// ----------
    /// * A new revision when the relocation lowered the misfit, `None` otherwise.
    pub fn relocate(&mut self, event_id: EventId) -> Option<EngineEvent> {
        let candidate = self.open.get(&event_id)?;
        if candidate.state() != EventState::Located {
            return None;
        }
        let full_due = full_search_due(&self.params, candidate.refinements_since_full());
        let refinement = refine(
            &candidate.arrivals(),
            &*self.model,
            &self.volume,
            &self.search,
            &self.params,
            candidate.hypocenter(),
            full_due,
        )
        .map_err(|err| debug!(event = event_id, %err, "relocation failed"))
        .ok()?;
        if !(refinement.location.misfit < candidate.misfit()) {
            return None;
        }

        self.seq += 1;
        let candidate = self.open.get_mut(&event_id)?;
        candidate.mark_full_search(refinement.full_search);
        let now = candidate.last_activity();
        let update = candidate.apply(
            EventCommand::Relocate(refinement.location),
            &self.volume,
            now,
            self.seq,
        );
        self.on_update(event_id, update, true)
    }

    /// Withdraw a pick from its open candidate.
    ///
    /// A located candidate still meeting the pick-count requirement is relocated on its
    /// remaining picks. When the requirement is no longer met, or no acceptable location is
    /// found, the candidate drops its origin, returns to forming and an
    /// [`EngineEvent::Withdrawn`] is emitted. A candidate left without picks is closed without
    /// an origin.
    pub fn remove_pick(&mut self, pick_id: &str) -> Vec<EngineEvent> {
        let Some(event_id) = self.event_of(pick_id) else {
            return Vec::new();
        };
        let Some(candidate) = self.open.get(&event_id) else {
            return Vec::new();
        };

        let remaining: Vec<StationPick> = candidate
            .picks()
            .iter()
            .filter(|p| p.pick.id != pick_id)
            .cloned()
            .collect();
        let relocate =
            candidate.state() == EventState::Located && self.params.requirement_met(&remaining);
        let refinement = if relocate {
            let full_due = full_search_due(&self.params, candidate.refinements_since_full());
            refine(
                &candidate.arrivals_without(pick_id),
                &*self.model,
                &self.volume,
                &self.search,
                &self.params,
                candidate.hypocenter(),
                full_due,
            )
            .map_err(|err| debug!(event = event_id, %err, "relocation failed"))
            .ok()
            .filter(|r| self.accepts(&r.location))
        } else {
            None
        };

        self.membership.remove(pick_id);
        self.seq += 1;
        let mut events = Vec::new();
        let Some(candidate) = self.open.get_mut(&event_id) else {
            return events;
        };
        if let Some(refinement) = &refinement {
            candidate.mark_full_search(refinement.full_search);
        }
        let now = candidate.last_activity();
        let update = candidate.apply(
            EventCommand::RemovePick {
                pick_id: pick_id.to_string(),
                location: refinement.map(|r| r.location),
            },
            &self.volume,
            now,
            self.seq,
        );
        let emptied = candidate.picks().is_empty();
        events.extend(self.on_update(event_id, update, true));
        if emptied {
            events.extend(self.close(event_id));
        }
        events
    }

    fn trial(&self, candidate: &CandidateEvent, pick: &StationPick) -> Option<Trial> {
        if candidate.has_station_phase(pick.station.index, pick.phase()) {
            return None;
        }
        if !self.compatible(candidate, pick) {
            return None;
        }

        match candidate.state() {
            EventState::Located => {
                let full_due = full_search_due(&self.params, candidate.refinements_since_full());
                let refinement = refine(
                    &candidate.arrivals_with(pick),
                    &*self.model,
                    &self.volume,
                    &self.search,
                    &self.params,
                    candidate.hypocenter(),
                    full_due,
                )
                .map_err(|err| debug!(event = candidate.id(), %err, "trial relocation failed"))
                .ok()?;
                self.accepts(&refinement.location).then(|| Trial {
                    event_id: candidate.id(),
                    location: Some(refinement.location),
                    full_search: refinement.full_search,
                    last_update: candidate.last_update(),
                })
            }
            EventState::Forming => {
                let separation = candidate.nearest_station_distance(&pick.station)?;
                if separation > self.linking_distance {
                    return None;
                }

                let mut grown = candidate.picks().to_vec();
                grown.push(pick.clone());
                let location = if self.params.requirement_met(&grown) {
                    let location = locate_full(
                        &candidate.arrivals_with(pick),
                        &*self.model,
                        &self.volume,
                        &self.search,
                    )
                    .map_err(|err| debug!(event = candidate.id(), %err, "trial location failed"))
                    .ok()?;
                    if !self.accepts(&location) {
                        return None;
                    }
                    Some(location)
                } else {
                    None
                };
                Some(Trial {
                    event_id: candidate.id(),
                    full_search: location.is_some(),
                    location,
                    last_update: candidate.last_update(),
                })
            }
            EventState::Closed => None,
        }
    }

    /// Whether some hypocenter could explain the pick together with every pick of the
    /// candidate, up to the match tolerance.
    ///
    /// Two picks of the same phase cannot be further apart in time than the travel time
    /// between their stations. Picks of different phases are only bounded by the largest
    /// travel time within the volume.
    fn compatible(&self, candidate: &CandidateEvent, pick: &StationPick) -> bool {
        candidate.picks().iter().all(|other| {
            let dt = (pick.seconds() - other.seconds()).abs();
            let bound = if other.phase() == pick.phase() {
                (pick.station.position() - other.station.position()).norm()
                    / self.model.min_velocity(pick.phase())
            } else {
                self.max_travel_time
            };
            dt <= bound + self.params.pick_match_tolerance
        })
    }

    fn accepts(&self, location: &LocationResult) -> bool {
        location
            .residuals
            .iter()
            .all(|r| r.abs() <= self.params.acceptance_residual)
    }

    fn add_pick(&mut self, trial: Trial, pick: StationPick, now: Second) -> Option<EngineEvent> {
        self.seq += 1;
        self.membership
            .insert(pick.pick.id.clone(), trial.event_id);

        let candidate = self.open.get_mut(&trial.event_id)?;
        let was_located = candidate.state() == EventState::Located;
        if trial.location.is_some() {
            candidate.mark_full_search(trial.full_search);
        }
        let update = candidate.apply(
            EventCommand::AddPick {
                pick,
                location: trial.location,
            },
            &self.volume,
            now,
            self.seq,
        );
        self.on_update(trial.event_id, update, was_located)
    }

    fn create_candidate(&mut self, pick: StationPick, now: Second) -> Option<EngineEvent> {
        self.next_id += 1;
        self.seq += 1;
        let event_id = self.next_id;
        self.membership.insert(pick.pick.id.clone(), event_id);
        self.stats.created += 1;
        debug!(event = event_id, pick = %pick.pick.id, "candidate created");

        let mut candidate = CandidateEvent::new(event_id, pick, now, self.seq);
        let mut event = None;
        if self.params.requirement_met(candidate.picks()) {
            let location = locate_full(
                &candidate.arrivals(),
                &*self.model,
                &self.volume,
                &self.search,
            )
            .ok()
            .filter(|loc| self.accepts(loc));
            if let Some(location) = location {
                self.seq += 1;
                candidate.mark_full_search(true);
                let update = candidate.apply(
                    EventCommand::Relocate(location),
                    &self.volume,
                    now,
                    self.seq,
                );
                event = self.on_update(event_id, update, false);
            }
        }
        self.open.insert(event_id, candidate);
        event
    }

    fn close(&mut self, event_id: EventId) -> Option<EngineEvent> {
        let mut candidate = self.open.remove(&event_id)?;
        self.seq += 1;
        let now = self.clock.unwrap_or(candidate.last_activity());
        let picks = candidate.picks().iter().map(|p| p.pick.id.clone()).collect();
        self.retired.push_back((now, picks));
        let update = candidate.apply(EventCommand::Close, &self.volume, now, self.seq);
        self.on_update(event_id, update, candidate.origin().is_some())
    }

    fn on_update(
        &mut self,
        event_id: EventId,
        update: Option<EventUpdate>,
        was_located: bool,
    ) -> Option<EngineEvent> {
        match update? {
            EventUpdate::Revision(origin) => {
                self.stats.revisions += 1;
                if was_located {
                    debug!(
                        event = event_id,
                        revision = origin.revision,
                        rms = origin.quality.rms,
                        picks = origin.arrivals.len(),
                        "origin revised"
                    );
                } else {
                    self.stats.located += 1;
                    info!(
                        event = event_id,
                        lat = origin.latitude,
                        lon = origin.longitude,
                        depth = origin.depth,
                        picks = origin.arrivals.len(),
                        "candidate located"
                    );
                }
                if origin.quality.low_confidence {
                    let err = OctolocError::SearchNonConvergence {
                        evaluations: origin.quality.evaluations,
                    };
                    warn!(event = event_id, revision = origin.revision, "{err}");
                }
                Some(EngineEvent::Revision(origin))
            }
            EventUpdate::Withdrawn => {
                self.stats.withdrawn += 1;
                info!(event = event_id, "origin withdrawn, candidate forming again");
                Some(EngineEvent::Withdrawn { event_id })
            }
            EventUpdate::Closed(final_origin) => {
                self.stats.closed += 1;
                info!(
                    event = event_id,
                    located = final_origin.is_some(),
                    revision = final_origin.as_ref().map_or(0, |o| o.revision),
                    "candidate closed"
                );
                Some(EngineEvent::Closed {
                    event_id,
                    final_origin,
                })
            }
        }
    }
}

impl fmt::Debug for AssociationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssociationEngine")
            .field("volume", &self.volume)
            .field("params", &self.params)
            .field("open", &self.open.len())
            .field("linking_distance", &self.linking_distance)
            .field("stats", &self.stats)
            .finish()
    }
}
