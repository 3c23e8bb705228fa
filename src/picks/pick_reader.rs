//! Pick catalog CSV reader.
//!
//! Expected header:
//!
//! ```text
//! id,network,station,location,channel,time,phase,author,creation_time
//! Pick/001,GE,WLF,,HHZ,2024-04-10T12:30:45.120Z,P,scautopick,2024-04-10T12:30:51.0Z
//! ```
//!
//! `phase` may be empty (read as `P`), `creation_time` may be empty. Times accept the layouts
//! of [`crate::time::parse_time`].
use camino::Utf8Path;
use serde::Deserialize;

use crate::{
    octoloc_errors::OctolocError,
    picks::{PhaseType, Pick},
    stations::StreamId,
    time::parse_time,
};

#[derive(Debug, Deserialize)]
struct PickRow {
    id: String,
    network: String,
    station: String,
    #[serde(default)]
    location: String,
    channel: String,
    time: String,
    #[serde(default)]
    phase: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    creation_time: String,
}

impl TryFrom<PickRow> for Pick {
    type Error = OctolocError;

    fn try_from(row: PickRow) -> Result<Self, Self::Error> {
        let location = if row.location == "--" {
            ""
        } else {
            row.location.as_str()
        };
        let stream = StreamId::new(&row.network, &row.station, location, &row.channel);
        let pick = Pick::new(
            &row.id,
            stream,
            parse_time(&row.time)?,
            PhaseType::from_hint(&row.phase)?,
            &row.author,
        );
        if row.creation_time.trim().is_empty() {
            Ok(pick)
        } else {
            Ok(pick.with_creation_time(parse_time(&row.creation_time)?))
        }
    }
}

/// Deserialize picks from any CSV source.
///
/// Return
/// ----------
/// * The picks in file order, or the first CSV, time or phase error encountered.
pub fn read_picks<R: std::io::Read>(reader: R) -> Result<Vec<Pick>, OctolocError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    csv_reader
        .deserialize::<PickRow>()
        .map(|row| Pick::try_from(row?))
        .collect()
}

/// Read a pick CSV file.
pub fn read_picks_csv(path: &Utf8Path) -> Result<Vec<Pick>, OctolocError> {
    let file = std::fs::File::open(path)?;
    read_picks(std::io::BufReader::new(file))
}

#[cfg(test)]
mod pick_reader_test {
    use super::*;

    const HEADER: &str = "id,network,station,location,channel,time,phase,author,creation_time\n";

    #[test]
    fn test_read_picks() {
        let data = format!(
            "{HEADER}\
             Pick/1,GE,WLF,,HHZ,2024-04-10T12:30:45.120Z,Pg,scautopick,2024-04-10T12:30:51Z\n\
             Pick/2,GE,STU,--,HHE,2024-04-10 12:30:49.5,S,scautopick,\n\
             Pick/3,GE,STU,00,HHZ,2024-04-10 12:30:47,,manual,\n"
        );
        let picks = read_picks(data.as_bytes()).unwrap();
        assert_eq!(picks.len(), 3);
        assert_eq!(picks[0].phase, PhaseType::P);
        assert!(picks[0].creation_time.is_some());
        assert_eq!(picks[1].stream, StreamId::new("GE", "STU", "", "HHE"));
        assert_eq!(picks[1].phase, PhaseType::S);
        assert_eq!(picks[1].creation_time, None);
        assert_eq!(picks[2].phase, PhaseType::P);
        assert_eq!(picks[2].author, "manual");
    }

    #[test]
    fn test_read_picks_errors() {
        let bad_time = format!("{HEADER}Pick/1,GE,WLF,,HHZ,noon,P,scautopick,\n");
        assert_eq!(
            read_picks(bad_time.as_bytes()),
            Err(OctolocError::InvalidTime("noon".into()))
        );

        let bad_phase = format!("{HEADER}Pick/1,GE,WLF,,HHZ,2024-04-10 12:30:47,Lg,a,\n");
        assert_eq!(
            read_picks(bad_phase.as_bytes()),
            Err(OctolocError::InvalidPhase("Lg".into()))
        );
    }
}
