//! Wheel contact point selection.

use crate::core::types::{Silhouette, WheelPointSet};

/// Keep the silhouette entries within `clearance` of the global minimum height.
///
/// The clearance band should be larger than the legal minimum ground
/// clearance but tolerant of undercarriage protrusions such as mudflaps.
/// The global minimum itself always passes for any `clearance >= 0`.
pub fn lowest_points(silhouette: &Silhouette, clearance: f64) -> WheelPointSet {
    let Some((_, min_height)) = silhouette.min_height() else {
        return WheelPointSet::empty();
    };
    let ceiling = min_height + clearance;

    let points = silhouette.filter(|_, y| y <= ceiling);
    log::debug!(
        "{} of {} silhouette points within {:.3} of minimum height {:.3}",
        points.len(),
        silhouette.len(),
        clearance,
        min_height
    );
    points
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> Silhouette {
        Silhouette::from_points(&[
            [0.0, 0.50],
            [0.1, 0.05],
            [0.2, 0.00],
            [0.3, 0.04],
            [0.4, 0.45],
            [0.5, 0.07],
            [0.6, 0.01],
        ])
        .unwrap()
    }

    #[test]
    fn test_band_subset() {
        let s = profile();
        for clearance in [0.0, 0.01, 0.05, 0.06, 0.3, 10.0] {
            let low = lowest_points(&s, clearance);
            assert!(low.heights().iter().all(|&y| y <= clearance));
            assert!(low.positions().iter().all(|x| s.positions().contains(x)));
            assert!(low.positions().contains(&0.2));
        }
    }

    #[test]
    fn test_default_clearance() {
        let low = lowest_points(&profile(), 0.06);
        assert_eq!(low.positions(), &[0.1, 0.2, 0.3, 0.6]);
    }

    #[test]
    fn test_zero_clearance_keeps_unique_minimum() {
        let low = lowest_points(&profile(), 0.0);
        assert_eq!(low.len(), 1);
        assert_eq!(low.point(0), [0.2, 0.0]);
    }

    #[test]
    fn test_empty_silhouette() {
        assert!(lowest_points(&Silhouette::empty(), 0.06).is_empty());
    }
}
