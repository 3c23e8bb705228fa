//! # Stations and the station catalog
//!
//! The [`StationCatalog`] is the static mapping from a stream identifier to the coordinates
//! of its sensor location, built once per run from inventory records.
//!
//! ## Construction
//!
//! A sensor location (network, station, location) from the inventory is kept when
//!
//! 1. it matches the optional [`StreamWhitelist`](crate::stations::whitelist::StreamWhitelist)
//!    with the channel treated as a wildcard, and
//! 2. its great-circle distance from the network center does not exceed the search volume's
//!    maximum horizontal distance.
//!
//! Each kept location receives a compact `u16` index; the first inventory record of a location
//! wins when the inventory lists it several times (one record per channel is common).
//!
//! ## Lookup
//!
//! Picks are resolved with [`StationCatalog::lookup`]. The channel code is ignored; a stream
//! whose location is absent from the catalog yields [`OctolocError::UnknownStation`].
//!
//! ## Local coordinates
//!
//! Like the observer sites of an astrometric pipeline, stations precompute their position in
//! the local projected frame at construction, so the travel-time loop of the octree search
//! never repeats the projection.
pub mod bimap;
pub mod inventory_reader;
mod stream_id;
pub mod whitelist;

use std::sync::Arc;

use nalgebra::Vector3;
use tracing::debug;

use crate::{
    constants::{Degree, Meter},
    octoloc_errors::OctolocError,
    octree::SearchVolume,
};

pub use inventory_reader::InventoryRecord;
pub use stream_id::{StationKey, StreamId};

use bimap::BiMap;
use whitelist::StreamWhitelist;

/// A sensor location of the network.
#[derive(Debug, Clone, PartialEq)]
pub struct Station {
    pub key: StationKey,
    pub latitude: Degree,
    pub longitude: Degree,
    /// Elevation above sea level (m)
    pub elevation: Meter,
    /// Compact catalog index
    pub index: u16,
    /// Precomputed position in the local frame (km, z positive down)
    position: Vector3<f64>,
}

impl Station {
    /// Create a station and precompute its local position.
    ///
    /// Arguments
    /// -----------------
    /// * `key`: network/station/location codes.
    /// * `latitude`, `longitude`: coordinates (degrees).
    /// * `elevation`: elevation above sea level (m).
    /// * `index`: catalog index.
    /// * `volume`: the search volume providing the projection.
    pub fn new(
        key: StationKey,
        latitude: Degree,
        longitude: Degree,
        elevation: Meter,
        index: u16,
        volume: &SearchVolume,
    ) -> Self {
        let position = volume
            .projection()
            .station_position(latitude, longitude, elevation / 1000.0);
        Station {
            key,
            latitude,
            longitude,
            elevation,
            index,
            position,
        }
    }

    /// Local position (km, z positive down).
    #[inline]
    pub fn position(&self) -> &Vector3<f64> {
        &self.position
    }
}

/// Static lookup from stream identifier to station.
#[derive(Debug, Clone, Default)]
pub struct StationCatalog {
    stations: Vec<Arc<Station>>,
    index: BiMap<StationKey>,
}

impl StationCatalog {
    /// Build the catalog from inventory records.
    ///
    /// Arguments
    /// -----------------
    /// * `records`: inventory records, one per channel or per location.
    /// * `volume`: the search volume; stations beyond its horizontal bound are dropped.
    /// * `whitelist`: optional stream whitelist.
    ///
    /// Return
    /// ----------
    /// * The catalog, or [`OctolocError::InvalidConfiguration`] when the inventory holds more
    ///   sensor locations than the index space allows.
    pub fn from_inventory<I>(
        records: I,
        volume: &SearchVolume,
        whitelist: Option<&StreamWhitelist>,
    ) -> Result<Self, OctolocError>
    where
        I: IntoIterator<Item = InventoryRecord>,
    {
        let mut catalog = StationCatalog::default();

        for record in records {
            let key = StationKey::new(&record.network, &record.station, &record.location);

            if whitelist.is_some_and(|w| !w.matches_station(&key)) {
                continue;
            }
            if !volume.contains_epicenter(record.latitude, record.longitude) {
                debug!(station = %key, "outside the search radius, skipped");
                continue;
            }

            let (idx, inserted) = catalog.index.entry_or_insert(key.clone()).ok_or_else(|| {
                OctolocError::InvalidConfiguration(
                    "too many stations in the inventory (max 65536)".into(),
                )
            })?;
            if !inserted {
                continue;
            }

            debug!(station = %key, idx, "station added to catalog");
            catalog.stations.push(Arc::new(Station::new(
                key,
                record.latitude,
                record.longitude,
                record.elevation,
                idx,
                volume,
            )));
        }

        Ok(catalog)
    }

    /// Resolve the station of a stream; the channel code is ignored.
    pub fn lookup(&self, stream: &StreamId) -> Result<&Arc<Station>, OctolocError> {
        self.index
            .get_by_key(&stream.station_key())
            .and_then(|idx| self.stations.get(idx as usize))
            .ok_or_else(|| OctolocError::UnknownStation(stream.to_string()))
    }

    pub fn get(&self, index: u16) -> Option<&Arc<Station>> {
        self.stations.get(index as usize)
    }

    pub fn contains(&self, key: &StationKey) -> bool {
        self.index.get_by_key(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Station>> {
        self.stations.iter()
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }
}
