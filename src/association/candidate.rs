//! Candidate events and the commands that mutate them.
//!
//! A [`CandidateEvent`] moves through three states:
//!
//! ```text
//!            AddPick / Relocate (requirement met, search accepted)
//!  Forming ───────────────────────────────────────────────▶ Located ──┐
//!     │   ◀──────────── RemovePick without a location ────────  │  ▲   │ AddPick / RemovePick /
//!     │ Close                                           Close │  └───┘ Relocate: new revision
//!     ▼                                                       │
//!  Closed ◀───────────────────────────────────────────────────┘
//! ```
//!
//! The candidate never decides anything on its own: the association engine computes the
//! location and hands it over inside an [`EventCommand`]. Applying a command that carries a
//! location emits a new [`Origin`] revision, and closing emits the final origin, if any. A pick
//! removal without a new location withdraws the origin of a located candidate.
use nalgebra::Vector3;
use tracing::{debug, warn};

use crate::{
    constants::{EventId, Kilometer, PickId, Second},
    octree::{LocationResult, ObservedArrival, SearchVolume},
    origin::Origin,
    picks::{pick_buffer::StationPick, PhaseType},
    stations::Station,
};

/// Lifecycle state of a candidate event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventState {
    /// Too few picks, or no acceptable location yet
    Forming,
    /// Has a current origin
    Located,
    /// Terminal
    Closed,
}

/// A mutation of one candidate event.
///
/// Locations carried by `AddPick` and `RemovePick` must have been computed on the pick set
/// *after* the mutation, in the candidate's pick order (existing picks first, the new pick
/// last; removal keeps the order of the remaining picks). A `RemovePick` without a location
/// sends a located candidate back to `Forming`.
#[derive(Debug, Clone)]
pub enum EventCommand {
    AddPick {
        pick: StationPick,
        location: Option<LocationResult>,
    },
    RemovePick {
        pick_id: PickId,
        location: Option<LocationResult>,
    },
    Relocate(LocationResult),
    Close,
}

/// Output of a command.
#[derive(Debug, Clone, PartialEq)]
pub enum EventUpdate {
    /// A new origin revision
    Revision(Origin),
    /// The current origin was dropped and the candidate is forming again
    Withdrawn,
    /// The candidate closed, with its final origin when it was located
    Closed(Option<Origin>),
}

/// A growing set of associated picks and the current best origin.
#[derive(Debug, Clone)]
pub struct CandidateEvent {
    id: EventId,
    state: EventState,
    picks: Vec<StationPick>,
    origin: Option<Origin>,
    hypocenter: Option<Vector3<f64>>,
    misfit: f64,
    revision: u32,
    refinements_since_full: u32,
    last_activity: Second,
    last_update: u64,
}

impl CandidateEvent {
    /// A new forming candidate holding a single pick.
    pub fn new(id: EventId, pick: StationPick, now: Second, update: u64) -> Self {
        CandidateEvent {
            id,
            state: EventState::Forming,
            picks: vec![pick],
            origin: None,
            hypocenter: None,
            misfit: 0.0,
            revision: 0,
            refinements_since_full: 0,
            last_activity: now,
            last_update: update,
        }
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn state(&self) -> EventState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state != EventState::Closed
    }

    pub fn picks(&self) -> &[StationPick] {
        &self.picks
    }

    pub fn origin(&self) -> Option<&Origin> {
        self.origin.as_ref()
    }

    /// Current hypocenter in the local frame.
    pub fn hypocenter(&self) -> Option<&Vector3<f64>> {
        self.hypocenter.as_ref()
    }

    /// Misfit of the current origin (0 while forming).
    pub fn misfit(&self) -> f64 {
        self.misfit
    }

    pub fn revision(&self) -> u32 {
        self.revision
    }

    /// Processing-clock time of the last pick added.
    pub fn last_activity(&self) -> Second {
        self.last_activity
    }

    /// Recency rank of the last mutation; larger is more recent.
    pub fn last_update(&self) -> u64 {
        self.last_update
    }

    /// Number of refinements since the last full-volume search.
    pub fn refinements_since_full(&self) -> u32 {
        self.refinements_since_full
    }

    /// Horizontal distance from `station` to the nearest station of the candidate's picks.
    pub fn nearest_station_distance(&self, station: &Station) -> Option<Kilometer> {
        self.picks
            .iter()
            .map(|p| (p.station.position() - station.position()).xy().norm())
            .min_by(f64::total_cmp)
    }

    pub fn contains_pick(&self, pick_id: &str) -> bool {
        self.picks.iter().any(|p| p.pick.id == pick_id)
    }

    /// Whether the candidate already holds a pick of this phase at this station.
    pub fn has_station_phase(&self, station: u16, phase: PhaseType) -> bool {
        self.picks
            .iter()
            .any(|p| p.station.index == station && p.phase() == phase)
    }

    /// The picks as search input, in candidate order.
    pub fn arrivals(&self) -> Vec<ObservedArrival> {
        self.picks.iter().map(observed).collect()
    }

    /// Search input for the candidate's picks plus one more, appended last.
    pub fn arrivals_with(&self, extra: &StationPick) -> Vec<ObservedArrival> {
        self.picks
            .iter()
            .chain(std::iter::once(extra))
            .map(observed)
            .collect()
    }

    /// Search input without the given pick.
    pub fn arrivals_without(&self, pick_id: &str) -> Vec<ObservedArrival> {
        self.picks
            .iter()
            .filter(|p| p.pick.id != pick_id)
            .map(observed)
            .collect()
    }

    pub(crate) fn mark_full_search(&mut self, full: bool) {
        if full {
            self.refinements_since_full = 0;
        } else {
            self.refinements_since_full += 1;
        }
    }

    /// Apply a command.
    ///
    /// Arguments
    /// -----------------
    /// * `command`: the mutation.
    /// * `volume`: search volume, to convert locations to origins.
    /// * `now`: processing-clock time (arrival time of the pick being processed).
    /// * `update`: recency rank stamped on the candidate.
    ///
    /// Return
    /// ----------
    /// * The emitted update, if any. Commands sent to a closed candidate are ignored.
    pub fn apply(
        &mut self,
        command: EventCommand,
        volume: &SearchVolume,
        now: Second,
        update: u64,
    ) -> Option<EventUpdate> {
        if self.state == EventState::Closed {
            warn!(event = self.id, ?command, "command sent to a closed candidate ignored");
            return None;
        }

        match command {
            EventCommand::AddPick { pick, location } => {
                debug!(event = self.id, pick = %pick.pick.id, "pick added");
                self.picks.push(pick);
                self.last_activity = self.last_activity.max(now);
                self.last_update = update;
                location.map(|loc| self.set_location(loc, volume))
            }
            EventCommand::RemovePick { pick_id, location } => {
                debug!(event = self.id, pick = %pick_id, "pick removed");
                self.picks.retain(|p| p.pick.id != pick_id);
                self.last_update = update;
                match location {
                    Some(loc) => Some(self.set_location(loc, volume)),
                    None => self.withdraw(),
                }
            }
            EventCommand::Relocate(location) => {
                self.last_update = update;
                Some(self.set_location(location, volume))
            }
            EventCommand::Close => {
                self.state = EventState::Closed;
                debug!(
                    event = self.id,
                    picks = self.picks.len(),
                    revisions = self.revision,
                    "candidate closed"
                );
                Some(EventUpdate::Closed(self.origin.clone()))
            }
        }
    }

    fn withdraw(&mut self) -> Option<EventUpdate> {
        let withdrawn = self.origin.take().is_some();
        self.state = EventState::Forming;
        self.hypocenter = None;
        self.misfit = 0.0;
        self.refinements_since_full = 0;
        withdrawn.then(|| {
            debug!(event = self.id, revision = self.revision, "origin withdrawn");
            EventUpdate::Withdrawn
        })
    }

    fn set_location(&mut self, location: LocationResult, volume: &SearchVolume) -> EventUpdate {
        self.revision += 1;
        self.state = EventState::Located;
        self.hypocenter = Some(location.hypocenter);
        self.misfit = location.misfit;

        let origin = Origin::from_location(self.id, self.revision, volume, &location, &self.picks);
        self.origin = Some(origin.clone());
        EventUpdate::Revision(origin)
    }
}

fn observed(pick: &StationPick) -> ObservedArrival {
    ObservedArrival {
        station: *pick.station.position(),
        phase: pick.phase(),
        time: pick.seconds(),
    }
}

#[cfg(test)]
mod candidate_test {
    use super::*;
    use crate::{
        octree::Termination,
        picks::Pick,
        stations::{InventoryRecord, StationCatalog, StreamId},
        time::parse_time,
    };
    use std::sync::Arc;

    fn station_picks(volume: &SearchVolume) -> Vec<StationPick> {
        let records = ["A", "B", "C"].map(|sta| InventoryRecord {
            network: "XX".into(),
            station: sta.into(),
            location: "".into(),
            latitude: 0.1,
            longitude: 0.1,
            elevation: 0.0,
        });
        let catalog = StationCatalog::from_inventory(records, volume, None).unwrap();
        let time = parse_time("2024-01-01T00:00:00Z").unwrap();
        ["A", "B", "C"]
            .iter()
            .map(|sta| {
                let stream = StreamId::new("XX", sta, "", "HHZ");
                StationPick {
                    station: Arc::clone(catalog.lookup(&stream).unwrap()),
                    pick: Arc::new(Pick::new(sta, stream, time, PhaseType::P, "a")),
                }
            })
            .collect()
    }

    fn location(n: usize, misfit: f64) -> LocationResult {
        LocationResult {
            hypocenter: Vector3::new(0.0, 0.0, 10.0),
            origin_time: 0.0,
            residuals: vec![0.0; n],
            misfit,
            evaluations: 1,
            termination: Termination::MinCellSize,
        }
    }

    #[test]
    fn test_lifecycle() {
        let volume = SearchVolume::new(0.0, 0.0, 100.0, 0.0, 50.0).unwrap();
        let picks = station_picks(&volume);
        let mut event = CandidateEvent::new(1, picks[0].clone(), 0.0, 1);
        assert_eq!(event.state(), EventState::Forming);

        let update = event.apply(
            EventCommand::AddPick {
                pick: picks[1].clone(),
                location: None,
            },
            &volume,
            5.0,
            2,
        );
        assert!(update.is_none());
        assert_eq!(event.last_activity(), 5.0);

        let update = event.apply(
            EventCommand::AddPick {
                pick: picks[2].clone(),
                location: Some(location(3, 0.5)),
            },
            &volume,
            6.0,
            3,
        );
        let Some(EventUpdate::Revision(origin)) = update else {
            panic!("expected a revision");
        };
        assert_eq!(origin.revision, 1);
        assert_eq!(origin.arrivals.len(), 3);
        assert_eq!(event.state(), EventState::Located);

        let update = event.apply(
            EventCommand::RemovePick {
                pick_id: "B".into(),
                location: Some(location(2, 0.1)),
            },
            &volume,
            7.0,
            4,
        );
        assert!(matches!(update, Some(EventUpdate::Revision(ref o)) if o.revision == 2));
        assert!(!event.contains_pick("B"));
        assert_eq!(event.arrivals().len(), 2);

        let update = event.apply(EventCommand::Close, &volume, 8.0, 5);
        assert!(matches!(update, Some(EventUpdate::Closed(Some(ref o))) if o.revision == 2));
        assert!(!event.is_open());

        assert!(event
            .apply(EventCommand::Relocate(location(2, 0.0)), &volume, 9.0, 6)
            .is_none());
    }

    #[test]
    fn test_remove_pick_without_location_withdraws_origin() {
        let volume = SearchVolume::new(0.0, 0.0, 100.0, 0.0, 50.0).unwrap();
        let picks = station_picks(&volume);
        let mut event = CandidateEvent::new(2, picks[0].clone(), 0.0, 1);
        event.apply(
            EventCommand::AddPick {
                pick: picks[1].clone(),
                location: Some(location(2, 0.3)),
            },
            &volume,
            1.0,
            2,
        );
        assert_eq!(event.state(), EventState::Located);

        let update = event.apply(
            EventCommand::RemovePick {
                pick_id: "A".into(),
                location: None,
            },
            &volume,
            2.0,
            3,
        );
        assert_eq!(update, Some(EventUpdate::Withdrawn));
        assert_eq!(event.state(), EventState::Forming);
        assert!(event.origin().is_none());
        assert!(event.hypocenter().is_none());
        assert_eq!(event.misfit(), 0.0);
        assert_eq!(event.picks().len(), 1);

        // a forming candidate has nothing to withdraw
        let update = event.apply(
            EventCommand::RemovePick {
                pick_id: "B".into(),
                location: None,
            },
            &volume,
            3.0,
            4,
        );
        assert!(update.is_none());
        assert_eq!(
            event.apply(EventCommand::Close, &volume, 4.0, 5),
            Some(EventUpdate::Closed(None))
        );
    }

    #[test]
    fn test_nearest_station_distance() {
        let volume = SearchVolume::new(0.0, 0.0, 100.0, 0.0, 50.0).unwrap();
        let picks = station_picks(&volume);
        let event = CandidateEvent::new(4, picks[0].clone(), 0.0, 1);
        let distance = event.nearest_station_distance(&picks[1].station).unwrap();
        assert!(distance.abs() < 1e-9);
    }

    #[test]
    fn test_forming_close_has_no_origin() {
        let volume = SearchVolume::new(0.0, 0.0, 100.0, 0.0, 50.0).unwrap();
        let picks = station_picks(&volume);
        let mut event = CandidateEvent::new(3, picks[0].clone(), 0.0, 1);
        assert_eq!(
            event.apply(EventCommand::Close, &volume, 1.0, 2),
            Some(EventUpdate::Closed(None))
        );
    }
}
