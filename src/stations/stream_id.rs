use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::octoloc_errors::OctolocError;

/// Network / station / location / channel codes of a waveform stream.
///
/// An empty location code is valid and common; it is rendered as `--` only where a
/// placeholder is needed (whitelist matching).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamId {
    pub network: String,
    pub station: String,
    pub location: String,
    pub channel: String,
}

/// Station-level key: the stream identifier without its channel code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StationKey {
    pub network: String,
    pub station: String,
    pub location: String,
}

impl StreamId {
    pub fn new(network: &str, station: &str, location: &str, channel: &str) -> Self {
        StreamId {
            network: network.to_string(),
            station: station.to_string(),
            location: location.to_string(),
            channel: channel.to_string(),
        }
    }

    /// The station-level key used by the station catalog.
    pub fn station_key(&self) -> StationKey {
        StationKey {
            network: self.network.clone(),
            station: self.station.clone(),
            location: self.location.clone(),
        }
    }
}

impl StationKey {
    pub fn new(network: &str, station: &str, location: &str) -> Self {
        StationKey {
            network: network.to_string(),
            station: station.to_string(),
            location: location.to_string(),
        }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.network, self.station, self.location, self.channel
        )
    }
}

impl fmt::Display for StationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.network, self.station, self.location)
    }
}

impl FromStr for StreamId {
    type Err = OctolocError;

    /// Parse `NET.STA.LOC.CHA`. The location may be empty (`GE.FALKS..HHZ`) or written
    /// as `--`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        let [net, sta, loc, cha] = parts.as_slice() else {
            return Err(OctolocError::InvalidStreamId(s.to_string()));
        };
        if net.is_empty() || sta.is_empty() {
            return Err(OctolocError::InvalidStreamId(s.to_string()));
        }
        let loc = if *loc == "--" { "" } else { loc };
        Ok(StreamId::new(net, sta, loc, cha))
    }
}

#[cfg(test)]
mod stream_id_test {
    use super::*;

    #[test]
    fn test_parse_stream_id() {
        let id: StreamId = "GE.FALKS..HHZ".parse().unwrap();
        assert_eq!(id, StreamId::new("GE", "FALKS", "", "HHZ"));
        assert_eq!(id.to_string(), "GE.FALKS..HHZ");
        assert_eq!(id.station_key().to_string(), "GE.FALKS.");

        let id: StreamId = "IU.ANMO.--.BHZ".parse().unwrap();
        assert_eq!(id.location, "");

        assert!("GE.FALKS".parse::<StreamId>().is_err());
        assert!(".FALKS..HHZ".parse::<StreamId>().is_err());
    }
}
