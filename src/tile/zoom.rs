//! Pyramid level selection.

/// Relative distance under which a level counts as an exact match.
const ZOOM_MATCH_TOLERANCE: f64 = 0.01;

/// Pick the pyramid level to read for a requested zoom factor.
///
/// `zooms` holds each level's scale relative to the base level, sorted
/// descending so that index 0 is the finest level. Requests at or above the
/// finest zoom use level 0. A level within 1% of the request is used as-is.
/// A request that falls between two levels uses the finer of the two, and a
/// request below every level uses the coarsest.
///
/// Returns 0 for an empty level list.
pub fn select_zoom_level(requested: f64, zooms: &[f64]) -> usize {
    let Some(&finest) = zooms.first() else {
        return 0;
    };
    if requested >= finest {
        return 0;
    }

    for index in 1..zooms.len() {
        let current = zooms[index];
        let previous = zooms[index - 1];
        if ((current - requested) / current).abs() < ZOOM_MATCH_TOLERANCE {
            return index;
        }
        if requested <= previous && requested > current {
            return index - 1;
        }
    }

    zooms.len() - 1
}
