#![allow(dead_code)]

use std::sync::Arc;

use approx::assert_abs_diff_eq;
use nalgebra::Vector3;
use rand::{rngs::StdRng, Rng, SeedableRng};

use octoloc::{
    association::{AssociationEngine, AssociatorParams},
    constants::Second,
    octree::{ObservedArrival, SearchParams, SearchVolume},
    picks::{pick_buffer::StationPick, PhaseType, Pick},
    stations::{InventoryRecord, StationCatalog, StreamId},
    time::{parse_time, seconds_to_epoch, epoch_to_seconds},
    velocity_model::{ConstantVelocityModel, VelocityModel},
};

pub const NETWORK: &str = "XX";

/// 2024-04-10T12:00:00Z, the base time of every synthetic event.
pub fn base_time() -> Second {
    epoch_to_seconds(&parse_time("2024-04-10T12:00:00Z").unwrap())
}

/// Search parameters fine enough to resolve a noise-free hypocenter to well under 1 km.
pub fn fine_search() -> SearchParams {
    SearchParams::builder()
        .min_cell_size(0.05)
        .max_evaluations(50_000)
        .stall_pops(2_000)
        .build()
        .unwrap()
}

pub fn crustal_model() -> ConstantVelocityModel {
    ConstantVelocityModel::new(6.0, 3.5, 0.0).unwrap()
}

/// Stations laid out in the local frame of a search volume.
pub struct SyntheticNetwork {
    pub volume: SearchVolume,
    pub model: ConstantVelocityModel,
    pub catalog: Arc<StationCatalog>,
}

impl SyntheticNetwork {
    /// Create a network with one station per local `(x, y)` position (km, elevation 0).
    /// Station codes are `S00`, `S01`, ... in the order given.
    pub fn new(volume: SearchVolume, model: ConstantVelocityModel, positions: &[(f64, f64)]) -> Self {
        let records = inventory(&volume, positions);
        let catalog = StationCatalog::from_inventory(records, &volume, None).unwrap();
        assert_eq!(catalog.len(), positions.len(), "station outside the volume");
        SyntheticNetwork {
            volume,
            model,
            catalog: Arc::new(catalog),
        }
    }

    pub fn code(index: usize) -> String {
        format!("S{index:02}")
    }

    pub fn stream(index: usize) -> StreamId {
        StreamId::new(NETWORK, &Self::code(index), "", "HHZ")
    }

    pub fn engine(&self, search: SearchParams, params: AssociatorParams) -> AssociationEngine {
        AssociationEngine::new(Arc::new(self.model), self.volume.clone(), search, params)
    }

    /// Exact arrival time at a station for a source at `hypocenter` (local km) and `origin_time`.
    pub fn arrival_time(
        &self,
        index: usize,
        hypocenter: &Vector3<f64>,
        origin_time: Second,
        phase: PhaseType,
    ) -> Second {
        let station = self.catalog.get(index as u16).unwrap();
        origin_time + self.model.travel_time(hypocenter, station.position(), phase)
    }

    pub fn pick(&self, id: &str, index: usize, time: Second, phase: PhaseType) -> Pick {
        Pick::new(id, Self::stream(index), seconds_to_epoch(time), phase, "scautopick")
    }

    pub fn station_pick(&self, id: &str, index: usize, time: Second, phase: PhaseType) -> StationPick {
        let pick = self.pick(id, index, time, phase);
        let station = Arc::clone(self.catalog.lookup(&pick.stream).unwrap());
        StationPick {
            pick: Arc::new(pick),
            station,
        }
    }

    /// Picks of one event at every listed station, sorted by arrival time.
    ///
    /// Pick ids are `{prefix}/{code}/{phase}`. With `noise`, a uniform error in
    /// `[-amplitude, amplitude]` seconds is added to every arrival.
    pub fn event_picks(
        &self,
        prefix: &str,
        hypocenter: &Vector3<f64>,
        origin_time: Second,
        stations: &[(usize, PhaseType)],
        mut noise: Option<(&mut StdRng, f64)>,
    ) -> Vec<StationPick> {
        let mut picks: Vec<StationPick> = stations
            .iter()
            .map(|&(index, phase)| {
                let mut time = self.arrival_time(index, hypocenter, origin_time, phase);
                if let Some((rng, amplitude)) = noise.as_mut() {
                    time += rng.random_range(-*amplitude..=*amplitude);
                }
                let id = format!("{prefix}/{}/{phase}", Self::code(index));
                self.station_pick(&id, index, time, phase)
            })
            .collect();
        picks.sort_by(|a, b| a.seconds().total_cmp(&b.seconds()));
        picks
    }

    /// Observed arrivals of one event, in station order.
    pub fn arrivals(
        &self,
        hypocenter: &Vector3<f64>,
        origin_time: Second,
        stations: &[(usize, PhaseType)],
    ) -> Vec<ObservedArrival> {
        stations
            .iter()
            .map(|&(index, phase)| ObservedArrival {
                station: *self.catalog.get(index as u16).unwrap().position(),
                phase,
                time: self.arrival_time(index, hypocenter, origin_time, phase),
            })
            .collect()
    }
}

/// Inventory rows for stations at local `(x, y)` positions.
pub fn inventory(volume: &SearchVolume, positions: &[(f64, f64)]) -> Vec<InventoryRecord> {
    positions
        .iter()
        .enumerate()
        .map(|(i, &(x, y))| {
            let (latitude, longitude) = volume.projection().inverse(x, y);
            InventoryRecord {
                network: NETWORK.into(),
                station: SyntheticNetwork::code(i),
                location: String::new(),
                latitude,
                longitude,
                elevation: 0.0,
            }
        })
        .collect()
}

pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// P phase at every station index of `indices`.
pub fn p_only(indices: impl IntoIterator<Item = usize>) -> Vec<(usize, PhaseType)> {
    indices.into_iter().map(|i| (i, PhaseType::P)).collect()
}

pub fn assert_hypocenter_close(actual: &Vector3<f64>, expected: &Vector3<f64>, tolerance: f64) {
    assert!(
        (actual - expected).norm() <= tolerance,
        "hypocenter {actual:?} is further than {tolerance} km from {expected:?}"
    );
    assert_abs_diff_eq!(actual.z, expected.z, epsilon = tolerance);
}
