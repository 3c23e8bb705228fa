//! Time helpers built on [`hifitime::Epoch`].
//!
//! Inside the search and association code, times are handled as `f64` **UTC seconds**
//! (hifitime's UTC second count) so that residuals reduce to plain subtraction.
//! Conversion to and from [`Epoch`] happens only at the edges (readers, origin output).
use hifitime::{Epoch, TimeScale};
use std::str::FromStr;

use crate::{constants::Second, octoloc_errors::OctolocError};

/// Convert an [`Epoch`] to UTC seconds.
#[inline]
pub fn epoch_to_seconds(epoch: &Epoch) -> Second {
    epoch.to_utc_seconds()
}

/// Convert UTC seconds back to an [`Epoch`].
#[inline]
pub fn seconds_to_epoch(seconds: Second) -> Epoch {
    Epoch::from_utc_seconds(seconds)
}

/// Parse a UTC time string.
///
/// Accepted layouts mirror the usual ISO-8601 variants found in pick catalogs:
/// `YYYY-MM-DDTHH:MM:SSZ`, `YYYY-MM-DDTHH:MM:SS.ffffffZ`, `YYYY-MM-DD HH:MM:SS` and
/// `YYYY-MM-DD HH:MM:SS.ffffff`. The trailing `Z` is optional in all of them.
///
/// Arguments
/// -----------------
/// * `s`: the time string.
///
/// Return
/// ----------
/// * The parsed [`Epoch`] in the UTC time scale, or [`OctolocError::InvalidTime`].
pub fn parse_time(s: &str) -> Result<Epoch, OctolocError> {
    let invalid = || OctolocError::InvalidTime(s.to_string());

    let trimmed = s.trim();
    let trimmed = trimmed.strip_suffix('Z').unwrap_or(trimmed);

    let (date, clock) = trimmed
        .split_once('T')
        .or_else(|| trimmed.split_once(' '))
        .ok_or_else(invalid)?;

    let mut date_parts = date.trim().splitn(3, '-');
    let year = date_parts
        .next()
        .and_then(|v| i32::from_str(v).ok())
        .ok_or_else(invalid)?;
    let month = date_parts
        .next()
        .and_then(|v| u8::from_str(v).ok())
        .ok_or_else(invalid)?;
    let day = date_parts
        .next()
        .and_then(|v| u8::from_str(v).ok())
        .ok_or_else(invalid)?;

    let mut clock_parts = clock.trim().splitn(3, ':');
    let hour = clock_parts
        .next()
        .and_then(|v| u8::from_str(v).ok())
        .ok_or_else(invalid)?;
    let minute = clock_parts
        .next()
        .and_then(|v| u8::from_str(v).ok())
        .ok_or_else(invalid)?;
    let seconds_str = clock_parts.next().ok_or_else(invalid)?;

    let (second, nanos) = match seconds_str.split_once('.') {
        Some((whole, frac)) => {
            let second = u8::from_str(whole).map_err(|_| invalid())?;
            if frac.is_empty() || frac.len() > 9 || !frac.chars().all(|c| c.is_ascii_digit()) {
                return Err(invalid());
            }
            // Right-pad the fraction to nanoseconds
            let padded = format!("{frac:0<9}");
            let nanos = u32::from_str(&padded).map_err(|_| invalid())?;
            (second, nanos)
        }
        None => (u8::from_str(seconds_str).map_err(|_| invalid())?, 0),
    };

    if hour > 23 || minute > 59 || second > 60 {
        return Err(invalid());
    }

    Epoch::maybe_from_gregorian(
        year,
        month,
        day,
        hour,
        minute,
        second,
        nanos,
        TimeScale::UTC,
    )
    .map_err(|_| invalid())
}

/// Render an [`Epoch`] as `YYYY-MM-DD HH:MM:SS.fff` (UTC) with `digits` fractional digits.
///
/// Arguments
/// -----------------
/// * `epoch`: the time to format.
/// * `digits`: number of fractional second digits (0..=6). With `0` no decimal point is written.
pub fn time_to_str(epoch: &Epoch, digits: usize) -> String {
    let (y, mo, d, h, mi, s, ns) = epoch.to_gregorian_utc();
    let digits = digits.min(6);
    let base = format!("{y:04}-{mo:02}-{d:02} {h:02}:{mi:02}:{s:02}");
    if digits == 0 {
        return base;
    }
    let micros = format!("{:06}", ns / 1_000);
    format!("{base}.{}", &micros[..digits])
}
