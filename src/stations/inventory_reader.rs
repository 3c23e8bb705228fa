//! Inventory CSV reader.
//!
//! Expected header:
//!
//! ```text
//! network,station,location,latitude,longitude,elevation
//! GE,WLF,,49.6646,6.1526,295.0
//! IU,ANMO,00,34.9459,-106.4572,1850.0
//! ```
//!
//! `elevation` is in metres above sea level. An empty location code is written as an empty
//! field (or `--`).
use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::{
    constants::{Degree, Meter},
    octoloc_errors::OctolocError,
};

/// One inventory row: a sensor location with its coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub network: String,
    pub station: String,
    #[serde(default)]
    pub location: String,
    pub latitude: Degree,
    pub longitude: Degree,
    #[serde(default)]
    pub elevation: Meter,
}

/// Deserialize inventory records from any CSV source.
pub fn read_inventory<R: std::io::Read>(reader: R) -> Result<Vec<InventoryRecord>, OctolocError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    csv_reader
        .deserialize::<InventoryRecord>()
        .map(|row| {
            let mut record = row?;
            if record.location == "--" {
                record.location.clear();
            }
            Ok(record)
        })
        .collect()
}

/// Read an inventory CSV file.
///
/// See also
/// ------------
/// * [`crate::stations::StationCatalog::from_inventory`] – catalog construction from the records.
pub fn read_inventory_csv(path: &Utf8Path) -> Result<Vec<InventoryRecord>, OctolocError> {
    let file = std::fs::File::open(path)?;
    read_inventory(std::io::BufReader::new(file))
}

#[cfg(test)]
mod inventory_reader_test {
    use super::*;

    #[test]
    fn test_read_inventory() {
        let data = "network,station,location,latitude,longitude,elevation\n\
                    GE,WLF,,49.6646,6.1526,295.0\n\
                    IU, ANMO ,--,34.9459,-106.4572,1850\n";
        let records = read_inventory(data.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].location, "");
        assert_eq!(records[1].station, "ANMO");
        assert_eq!(records[1].location, "");
        assert_eq!(records[1].elevation, 1850.0);
    }

    #[test]
    fn test_read_inventory_bad_row() {
        let data = "network,station,location,latitude,longitude,elevation\n\
                    GE,WLF,,north,6.1526,295.0\n";
        assert!(matches!(
            read_inventory(data.as_bytes()),
            Err(OctolocError::CsvError(_))
        ));
    }
}
