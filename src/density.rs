//! The stories-to-density mapping used for potential-unit estimates.
//!
//! Calibrated against observed development patterns: flat below 2 stories,
//! increasing in bands, capped above very tall buildings. Kept as a pure
//! lookup so the estimate is trivially reproducible.

/// (stories, units per acre), ascending by stories.
const STORIES_TO_UPA: [(f64, f64); 11] = [
    (2.0, 30.0),
    (2.5, 35.0),
    (3.0, 60.0),
    (5.0, 100.0),
    (7.0, 160.0),
    (8.0, 160.0),
    (10.0, 160.0),
    (12.0, 220.0),
    (16.0, 280.0),
    (20.0, 350.0),
    (30.0, 450.0),
];

/// Units per acre allowed at a given story count: the table entry with the
/// nearest story band, clamped at both ends. Non-decreasing in `stories`.
#[must_use]
pub fn units_per_acre(stories: f64) -> f64 {
    let (first, last) = (STORIES_TO_UPA[0], STORIES_TO_UPA[STORIES_TO_UPA.len() - 1]);
    if stories <= first.0 {
        return first.1;
    }
    if stories >= last.0 {
        return last.1;
    }
    let mut nearest = first;
    for band in STORIES_TO_UPA {
        if (band.0 - stories).abs() < (nearest.0 - stories).abs() {
            nearest = band;
        }
    }
    nearest.1
}

/// Estimated units a parcel could hold at the given height:
/// `round(acres × units_per_acre(stories))`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn potential_units(land_area_acres: f64, stories: f64) -> u64 {
    let units = land_area_acres.max(0.0) * units_per_acre(stories);
    units.round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn exact_bands() {
        assert_approx_eq!(units_per_acre(3.0), 60.0);
        assert_approx_eq!(units_per_acre(5.0), 100.0);
        assert_approx_eq!(units_per_acre(8.0), 160.0);
        assert_approx_eq!(units_per_acre(30.0), 450.0);
    }

    #[test]
    fn clamped_at_both_ends() {
        assert_approx_eq!(units_per_acre(0.0), 30.0);
        assert_approx_eq!(units_per_acre(1.0), 30.0);
        assert_approx_eq!(units_per_acre(45.0), 450.0);
    }

    #[test]
    fn nearest_band_between_entries() {
        // 4 stories is nearer 3 than 5
        assert_approx_eq!(units_per_acre(4.0), 60.0);
        // 6 stories is nearer 5 than 7
        assert_approx_eq!(units_per_acre(6.0), 100.0);
        // 14 stories ties toward whichever band is strictly nearer; 14 is
        // equidistant from 12 and 16 so the lower band wins.
        assert_approx_eq!(units_per_acre(14.0), 220.0);
    }

    #[test]
    fn non_decreasing_step_function() {
        let mut previous = 0.0;
        let mut stories = 0.0;
        while stories <= 40.0 {
            let upa = units_per_acre(stories);
            assert!(
                upa >= previous,
                "units_per_acre decreased at {stories} stories: {upa} < {previous}"
            );
            previous = upa;
            stories += 0.25;
        }
    }

    #[test]
    fn deterministic() {
        assert_approx_eq!(units_per_acre(7.3), units_per_acre(7.3));
    }

    #[test]
    fn unit_estimates_round() {
        // 0.5 acres at 8 stories: 0.5 * 160 = 80
        assert_eq!(potential_units(0.5, 8.0), 80);
        // 0.33 acres at 3 stories: 19.8 rounds to 20
        assert_eq!(potential_units(0.33, 3.0), 20);
        assert_eq!(potential_units(0.0, 8.0), 0);
        assert_eq!(potential_units(-1.0, 8.0), 0);
    }
}
