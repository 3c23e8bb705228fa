//! # Origins
//!
//! An [`Origin`] is the immutable snapshot emitted for a candidate event each time its
//! location changes: hypocenter, origin time, the arrivals it was computed from, and quality
//! statistics. Every origin carries a revision number that increases by one per emission of
//! the same event.
//!
//! The arrivals reference the originating picks (`Arc<Pick>`), so a downstream writer can
//! reproduce the full association without a second lookup.
//!
//! ## Quality statistics
//!
//! | field               | meaning                                                      |
//! |---------------------|--------------------------------------------------------------|
//! | `rms`               | root mean square of the time residuals (s)                   |
//! | `max_residual`      | largest absolute residual (s)                                |
//! | `misfit`            | sum of squared residuals (s²), the quantity the search minimizes |
//! | `azimuthal_gap`     | largest gap between station azimuths (deg)                   |
//! | `secondary_gap`     | largest gap after removing one station (deg)                 |
//! | `tgap`              | sum of the two largest gaps (deg)                            |
//! | `low_confidence`    | the search ran out of evaluations before converging          |
//!
//! ## See also
//! ------------
//! * [`origin_writer::write_origins_csv`] – one CSV row per arrival.
//! * [`crate::octree::LocationResult`] – the raw search output an origin is built from.
pub mod gaps;
pub mod origin_writer;

use std::{fmt, sync::Arc};

use hifitime::Epoch;
use itertools::Itertools;
use ordered_float::OrderedFloat;

use crate::{
    constants::{Degree, EventId, Kilometer, Second},
    geodesy::delazi,
    octree::{LocationResult, SearchVolume, Termination},
    picks::{pick_buffer::StationPick, PhaseType, Pick},
    time::{seconds_to_epoch, time_to_str},
};

use gaps::{azimuthal_gap, secondary_azimuthal_gap, tgap};

/// A pick used by an origin, with its residual and the source–receiver geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct Arrival {
    pub pick: Arc<Pick>,
    pub phase: PhaseType,
    /// Observed minus predicted arrival time (s)
    pub residual: Second,
    /// Epicentral distance (deg)
    pub distance: Degree,
    /// Azimuth from the epicenter to the station (deg)
    pub azimuth: Degree,
}

/// Fit and coverage statistics of an origin.
#[derive(Debug, Clone, PartialEq)]
pub struct OriginQuality {
    pub rms: Second,
    pub max_residual: Second,
    pub misfit: f64,
    pub p_count: usize,
    pub s_count: usize,
    pub station_count: usize,
    pub azimuthal_gap: Degree,
    pub secondary_gap: Degree,
    pub tgap: Degree,
    pub low_confidence: bool,
    pub evaluations: usize,
    pub termination: Termination,
}

/// Immutable location snapshot of a candidate event.
#[derive(Debug, Clone, PartialEq)]
pub struct Origin {
    pub public_id: String,
    pub event_id: EventId,
    pub revision: u32,
    pub time: Epoch,
    pub latitude: Degree,
    pub longitude: Degree,
    pub depth: Kilometer,
    pub arrivals: Vec<Arrival>,
    pub quality: OriginQuality,
}

impl Origin {
    /// Build an origin from a search result.
    ///
    /// Arguments
    /// -----------------
    /// * `event_id`, `revision`: identity of the snapshot.
    /// * `volume`: the search volume, used to convert the local hypocenter to geographic
    ///   coordinates.
    /// * `result`: the search result; `result.residuals[i]` belongs to `picks[i]`.
    /// * `picks`: the located picks.
    pub fn from_location(
        event_id: EventId,
        revision: u32,
        volume: &SearchVolume,
        result: &LocationResult,
        picks: &[StationPick],
    ) -> Self {
        let (latitude, longitude, depth) = volume.to_geographic(&result.hypocenter);

        let arrivals: Vec<Arrival> = picks
            .iter()
            .zip(&result.residuals)
            .map(|(sp, &residual)| {
                let (distance, azimuth, _) =
                    delazi(latitude, longitude, sp.station.latitude, sp.station.longitude);
                Arrival {
                    pick: Arc::clone(&sp.pick),
                    phase: sp.phase(),
                    residual,
                    distance,
                    azimuth,
                }
            })
            .collect();

        let azimuths: Vec<Degree> = arrivals.iter().map(|a| a.azimuth).collect();
        let quality = OriginQuality {
            rms: result.rms(),
            max_residual: result
                .residuals
                .iter()
                .map(|r| OrderedFloat(r.abs()))
                .max()
                .map_or(0.0, |r| r.into_inner()),
            misfit: result.misfit,
            p_count: picks.iter().filter(|p| p.phase() == PhaseType::P).count(),
            s_count: picks.iter().filter(|p| p.phase() == PhaseType::S).count(),
            station_count: picks.iter().map(|p| p.station.index).unique().count(),
            azimuthal_gap: azimuthal_gap(&azimuths),
            secondary_gap: secondary_azimuthal_gap(&azimuths),
            tgap: tgap(&azimuths),
            low_confidence: result.low_confidence(),
            evaluations: result.evaluations,
            termination: result.termination,
        };

        Origin {
            public_id: format!("Origin/Octoloc/{event_id:06}.{revision:03}"),
            event_id,
            revision,
            time: seconds_to_epoch(result.origin_time),
            latitude,
            longitude,
            depth,
            arrivals,
            quality,
        }
    }

    /// Whether one of the arrivals references the pick.
    pub fn references_pick(&self, pick_id: &str) -> bool {
        self.arrivals.iter().any(|a| a.pick.id == pick_id)
    }

    /// Arrivals sorted by epicentral distance.
    pub fn sorted_arrivals(&self) -> Vec<&Arrival> {
        self.arrivals
            .iter()
            .sorted_by_key(|a| OrderedFloat(a.distance))
            .collect()
    }
}

fn lat2str(lat: Degree) -> String {
    format!("{:.3} {}", lat.abs(), if lat >= 0.0 { "N" } else { "S" })
}

fn lon2str(lon: Degree) -> String {
    format!("{:.3} {}", lon.abs(), if lon >= 0.0 { "E" } else { "W" })
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "public id  {}", self.public_id)?;
        writeln!(f, "revision   {}", self.revision)?;
        writeln!(f, "time       {}", time_to_str(&self.time, 3))?;
        writeln!(f, "latitude   {}", lat2str(self.latitude))?;
        writeln!(f, "longitude  {}", lon2str(self.longitude))?;
        writeln!(f, "depth      {:6.2} km", self.depth)?;
        writeln!(
            f,
            "rms        {:.3} s   gap {:.0}°   picks {} (P {}, S {})   stations {}{}",
            self.quality.rms,
            self.quality.azimuthal_gap,
            self.arrivals.len(),
            self.quality.p_count,
            self.quality.s_count,
            self.quality.station_count,
            if self.quality.low_confidence {
                "   LOW CONFIDENCE"
            } else {
                ""
            }
        )?;
        write!(f, "arrivals:")?;
        for arr in self.sorted_arrivals() {
            let stream = &arr.pick.stream;
            let location = if stream.location.is_empty() {
                "--"
            } else {
                stream.location.as_str()
            };
            write!(
                f,
                "\n{:<2} {:6.3} {:3.0}  {:<2} {:<5} {:<2}  {}  {:6.2}",
                arr.phase,
                arr.distance,
                arr.azimuth,
                stream.network,
                stream.station,
                location,
                time_to_str(&arr.pick.time, 3),
                arr.residual
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod origin_test {
    use super::*;
    use crate::{
        octree::Termination,
        stations::{StationCatalog, InventoryRecord, StreamId},
        time::{epoch_to_seconds, parse_time},
    };
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    #[test]
    fn test_origin_from_location() {
        let volume = SearchVolume::new(10.0, 20.0, 300.0, 0.0, 50.0).unwrap();
        let records = [("N", 10.5, 20.0), ("E", 10.0, 20.5), ("S", 9.5, 20.0)].map(
            |(sta, lat, lon)| InventoryRecord {
                network: "XX".into(),
                station: sta.into(),
                location: "".into(),
                latitude: lat,
                longitude: lon,
                elevation: 0.0,
            },
        );
        let catalog = StationCatalog::from_inventory(records, &volume, None).unwrap();
        let t0 = parse_time("2024-04-10T12:00:00Z").unwrap();

        let picks: Vec<StationPick> = ["N", "E", "S"]
            .iter()
            .enumerate()
            .map(|(i, sta)| {
                let stream = StreamId::new("XX", sta, "", "HHZ");
                let phase = if i == 2 { PhaseType::S } else { PhaseType::P };
                StationPick {
                    station: Arc::clone(catalog.lookup(&stream).unwrap()),
                    pick: Arc::new(Pick::new(&format!("Pick/{i}"), stream, t0, phase, "a")),
                }
            })
            .collect();

        let result = LocationResult {
            hypocenter: Vector3::new(0.0, 0.0, 12.0),
            origin_time: epoch_to_seconds(&t0) - 8.0,
            residuals: vec![0.5, -1.5, 1.0],
            misfit: 0.25 + 2.25 + 1.0,
            evaluations: 42,
            termination: Termination::MinCellSize,
        };
        let origin = Origin::from_location(7, 2, &volume, &result, &picks);

        assert_eq!(origin.public_id, "Origin/Octoloc/000007.002");
        assert_relative_eq!(origin.latitude, 10.0, epsilon = 1e-9);
        assert_relative_eq!(origin.longitude, 20.0, epsilon = 1e-9);
        assert_relative_eq!(origin.depth, 12.0);
        assert_relative_eq!(origin.quality.max_residual, 1.5);
        assert_relative_eq!(origin.quality.rms, (3.5f64 / 3.0).sqrt());
        assert_eq!((origin.quality.p_count, origin.quality.s_count), (2, 1));
        assert_eq!(origin.quality.station_count, 3);
        assert!(!origin.quality.low_confidence);
        // stations at 0, 90 and 180 degrees
        assert_relative_eq!(origin.quality.azimuthal_gap, 180.0, epsilon = 1e-6);
        assert_relative_eq!(origin.arrivals[1].azimuth, 90.0, epsilon = 0.1);
        assert_relative_eq!(origin.arrivals[0].distance, 0.5, epsilon = 1e-9);
        assert!(origin.references_pick("Pick/2"));
        assert!(!origin.references_pick("Pick/9"));

        let text = origin.to_string();
        assert!(text.contains("latitude   10.000 N"));
        assert!(text.contains("longitude  20.000 E"));
        assert!(text.contains("2024-04-10 11:59:52.000"));
    }

    #[test]
    fn test_lat_lon_strings() {
        assert_eq!(lat2str(-21.5), "21.500 S");
        assert_eq!(lon2str(-69.25), "69.250 W");
    }
}
