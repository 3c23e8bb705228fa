//! CSV output of origins, one row per arrival.
//!
//! ```text
//! origin_id,event_id,revision,origin_time,latitude,longitude,depth,rms,azimuthal_gap,low_confidence,pick_id,stream,phase,residual,distance,azimuth
//! ```
use camino::Utf8Path;
use serde::Serialize;

use crate::{octoloc_errors::OctolocError, origin::Origin, time::time_to_str};

#[derive(Debug, Serialize)]
struct ArrivalRow<'a> {
    origin_id: &'a str,
    event_id: u64,
    revision: u32,
    origin_time: String,
    latitude: f64,
    longitude: f64,
    depth: f64,
    rms: f64,
    azimuthal_gap: f64,
    low_confidence: bool,
    pick_id: &'a str,
    stream: String,
    phase: String,
    residual: f64,
    distance: f64,
    azimuth: f64,
}

/// Serialize origins to any writer.
pub fn write_origins<'a, W, I>(writer: W, origins: I) -> Result<(), OctolocError>
where
    W: std::io::Write,
    I: IntoIterator<Item = &'a Origin>,
{
    let mut csv_writer = csv::Writer::from_writer(writer);
    for origin in origins {
        let origin_time = time_to_str(&origin.time, 6);
        for arr in &origin.arrivals {
            csv_writer.serialize(ArrivalRow {
                origin_id: &origin.public_id,
                event_id: origin.event_id,
                revision: origin.revision,
                origin_time: origin_time.clone(),
                latitude: origin.latitude,
                longitude: origin.longitude,
                depth: origin.depth,
                rms: origin.quality.rms,
                azimuthal_gap: origin.quality.azimuthal_gap,
                low_confidence: origin.quality.low_confidence,
                pick_id: &arr.pick.id,
                stream: arr.pick.stream.to_string(),
                phase: arr.phase.to_string(),
                residual: arr.residual,
                distance: arr.distance,
                azimuth: arr.azimuth,
            })?;
        }
    }
    csv_writer.flush()?;
    Ok(())
}

/// Write origins to a CSV file, replacing it if present.
pub fn write_origins_csv<'a, I>(path: &Utf8Path, origins: I) -> Result<(), OctolocError>
where
    I: IntoIterator<Item = &'a Origin>,
{
    let file = std::fs::File::create(path)?;
    write_origins(std::io::BufWriter::new(file), origins)
}
