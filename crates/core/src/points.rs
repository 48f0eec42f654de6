//! Championship points table and fastest-lap bonus detection.

/// Points awarded for finishing positions 1–10.
pub const POINTS_BY_POSITION: [f64; 10] = [25.0, 18.0, 15.0, 12.0, 10.0, 8.0, 6.0, 4.0, 2.0, 1.0];

/// Table points for a finishing position, if it scores at all.
pub fn points_for_position(position: i32) -> Option<f64> {
    if (1..=10).contains(&position) {
        Some(POINTS_BY_POSITION[(position - 1) as usize])
    } else {
        None
    }
}

/// Whether earned points exceed the table value for the position. The
/// only way that happens is the fastest-lap bonus.
pub fn fastest_lap_bonus(points_earned: f64, position: i32) -> bool {
    match points_for_position(position) {
        Some(expected) => points_earned > expected,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_points() {
        assert_eq!(points_for_position(1), Some(25.0));
        assert_eq!(points_for_position(10), Some(1.0));
        assert_eq!(points_for_position(11), None);
        assert_eq!(points_for_position(0), None);
    }

    #[test]
    fn bonus_detected_from_discrepancy() {
        // P2 with 19 points = 18 for position + 1 fastest lap.
        assert!(fastest_lap_bonus(19.0, 2));
        assert!(!fastest_lap_bonus(18.0, 2));
        // Outside the points there is no bonus to detect.
        assert!(!fastest_lap_bonus(1.0, 12));
    }
}
