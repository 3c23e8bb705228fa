//! # Constants and type definitions for Octoloc
//!
//! This module centralizes the **geophysical constants**, **conversion factors**, and **common
//! type definitions** used throughout the `octoloc` library.
//!
//! ## Overview
//!
//! - Earth model constants (spherical radius, kilometres per degree)
//! - Unit aliases (degrees, kilometres, seconds)
//! - Default tuning values shared by the parameter builders
//! - Identifier aliases for picks, stations and candidate events

use ahash::RandomState;
use std::collections::{HashMap, HashSet};

// -------------------------------------------------------------------------------------------------
// Geophysical constants and unit conversions
// -------------------------------------------------------------------------------------------------

/// Kilometres per great-circle degree on the reference sphere
pub const KM_PER_DEG: f64 = 111.195;

/// Radius of the reference sphere in kilometres, consistent with [`KM_PER_DEG`]
pub const EARTH_RADIUS_KM: f64 = KM_PER_DEG * 180.0 / std::f64::consts::PI;

/// Degrees → radians
pub const RADEG: f64 = std::f64::consts::PI / 180.0;

/// Numerical epsilon used for floating-point comparisons of coordinates (km)
pub const EPS_KM: f64 = 1e-9;

/// Upper bound on station elevation used for travel-time bounds (km)
pub const MAX_STATION_ELEVATION_KM: f64 = 9.0;

// -------------------------------------------------------------------------------------------------
// Defaults
// -------------------------------------------------------------------------------------------------

/// Default maximum horizontal search distance from the network center (km)
pub const DEFAULT_MAX_DISTANCE_KM: f64 = 500.0;

/// Default maximum hypocenter depth (km)
pub const DEFAULT_MAX_DEPTH_KM: f64 = 100.0;

/// Default tolerance applied by the coarse compatibility bound (s)
pub const DEFAULT_PICK_MATCH_TOLERANCE: f64 = 6.0;

/// Default pick author allow-list
pub const DEFAULT_PICK_AUTHOR: &str = "scautopick*";

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Angle in degrees
pub type Degree = f64;
/// Distance in kilometres
pub type Kilometer = f64;
/// Distance in metres
pub type Meter = f64;
/// Time or time span in seconds
pub type Second = f64;

/// Public identifier of a pick
pub type PickId = String;

/// Identifier of a candidate event, unique for the lifetime of an engine
pub type EventId = u64;

/// Fast hash map used for identifier lookups
pub type FastHashMap<K, V> = HashMap<K, V, RandomState>;

/// Fast hash set used for deduplication keys
pub type FastHashSet<K> = HashSet<K, RandomState>;
