//! Azimuthal coverage statistics of an origin.
//!
//! All functions take station azimuths seen from the epicenter, in degrees, in any order.
//! With fewer than two distinct azimuths every gap is 360°.
use itertools::Itertools;
use ordered_float::OrderedFloat;

use crate::constants::Degree;

/// Distinct azimuths normalised to `[0, 360)`, sorted.
fn normalised(azimuths: &[Degree]) -> Vec<Degree> {
    azimuths
        .iter()
        .map(|a| a.rem_euclid(360.0))
        .sorted_by_key(|&a| OrderedFloat(a))
        .dedup()
        .collect()
}

/// Gaps between consecutive azimuths, the last one wrapping through north.
fn gaps(azimuths: &[Degree]) -> Option<Vec<Degree>> {
    let azi = normalised(azimuths);
    if azi.len() < 2 {
        return None;
    }
    let mut gaps: Vec<Degree> = azi.windows(2).map(|w| w[1] - w[0]).collect();
    gaps.push(azi[0] + 360.0 - azi[azi.len() - 1]);
    Some(gaps)
}

/// Largest azimuthal gap.
pub fn azimuthal_gap(azimuths: &[Degree]) -> Degree {
    gaps(azimuths)
        .and_then(|g| g.into_iter().max_by_key(|&v| OrderedFloat(v)))
        .unwrap_or(360.0)
}

/// Largest gap obtained by removing a single station, i.e. the largest sum of two adjacent
/// gaps.
pub fn secondary_azimuthal_gap(azimuths: &[Degree]) -> Degree {
    let Some(gaps) = gaps(azimuths) else {
        return 360.0;
    };
    (0..gaps.len())
        .map(|i| gaps[i] + gaps[(i + 1) % gaps.len()])
        .max_by_key(|&v| OrderedFloat(v))
        .unwrap_or(360.0)
        .min(360.0)
}

/// Sum of the two largest gaps, adjacent or not.
pub fn tgap(azimuths: &[Degree]) -> Degree {
    let Some(gaps) = gaps(azimuths) else {
        return 360.0;
    };
    gaps.into_iter()
        .sorted_by_key(|&v| std::cmp::Reverse(OrderedFloat(v)))
        .take(2)
        .sum()
}

#[cfg(test)]
mod gaps_test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_gaps_four_quadrants() {
        let azi = [0.0, 90.0, 180.0, 270.0];
        assert_relative_eq!(azimuthal_gap(&azi), 90.0);
        assert_relative_eq!(secondary_azimuthal_gap(&azi), 180.0);
        assert_relative_eq!(tgap(&azi), 180.0);
    }

    #[test]
    fn test_gaps_wrap_through_north() {
        let azi = [350.0, 10.0, 40.0, -20.0];
        // sorted: 10, 40, 340, 350 -> gaps 30, 300, 10, 20
        assert_relative_eq!(azimuthal_gap(&azi), 300.0);
        assert_relative_eq!(secondary_azimuthal_gap(&azi), 330.0);
        assert_relative_eq!(tgap(&azi), 330.0);
    }

    #[test]
    fn test_gaps_degenerate() {
        assert_eq!(azimuthal_gap(&[]), 360.0);
        assert_eq!(azimuthal_gap(&[45.0, 405.0]), 360.0);
        assert_eq!(secondary_azimuthal_gap(&[12.0]), 360.0);
        assert_eq!(tgap(&[12.0]), 360.0);
        // two stations: both gaps together cover the full circle
        assert_relative_eq!(secondary_azimuthal_gap(&[0.0, 100.0]), 360.0);
    }
}
