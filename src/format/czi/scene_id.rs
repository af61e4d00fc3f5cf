//! Packing of the non-pixel coordinates that identify a scene.
//!
//! A CZI file can hold many independent images distinguished by scene,
//! illumination, view, phase, rotation and acquisition indices. Those six
//! indices are packed base-1000 into one `u64`:
//!
//! ```text
//! id = s + i*1000 + v*1000^2 + h*1000^3 + r*1000^4 + b*1000^5
//! ```
//!
//! Each index must be in `0..1000` for the packing to round-trip. Larger or
//! negative indices spill into neighbouring digit groups; this is not
//! detected.

use std::collections::BTreeSet;
use std::fmt;

use super::subblock::{Axis, Dimension};

/// Base of the positional packing.
pub const SCENE_ID_RADIX: u64 = 1000;

/// Identity axes in packing order, least significant first.
const IDENTITY_AXES: [Axis; 6] = [
    Axis::Scene,
    Axis::Illumination,
    Axis::View,
    Axis::Phase,
    Axis::Rotation,
    Axis::Acquisition,
];

/// The six identity indices of a scene.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SceneCoordinates {
    pub scene: i32,
    pub illumination: i32,
    pub view: i32,
    pub phase: i32,
    pub rotation: i32,
    pub acquisition: i32,
}

impl SceneCoordinates {
    fn get(&self, axis: Axis) -> i32 {
        match axis {
            Axis::Scene => self.scene,
            Axis::Illumination => self.illumination,
            Axis::View => self.view,
            Axis::Phase => self.phase,
            Axis::Rotation => self.rotation,
            Axis::Acquisition => self.acquisition,
            _ => 0,
        }
    }

    fn set(&mut self, axis: Axis, value: i32) {
        match axis {
            Axis::Scene => self.scene = value,
            Axis::Illumination => self.illumination = value,
            Axis::View => self.view = value,
            Axis::Phase => self.phase = value,
            Axis::Rotation => self.rotation = value,
            Axis::Acquisition => self.acquisition = value,
            _ => {}
        }
    }

    /// Coordinates taken from the start index of each identity dimension.
    pub fn from_dimensions(dimensions: &[Dimension]) -> Self {
        let mut coords = Self::default();
        for dim in dimensions {
            coords.set(dim.axis, dim.start);
        }
        coords
    }
}

impl fmt::Display for SceneCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "s:{} i:{} v:{} h:{} r:{} b:{}",
            self.scene, self.illumination, self.view, self.phase, self.rotation, self.acquisition
        )
    }
}

/// Packed scene identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SceneId(u64);

impl SceneId {
    pub fn encode(coords: &SceneCoordinates) -> Self {
        let mut id = 0u64;
        let mut weight = 1u64;
        for axis in IDENTITY_AXES {
            id = id.wrapping_add((coords.get(axis) as u64).wrapping_mul(weight));
            weight = weight.wrapping_mul(SCENE_ID_RADIX);
        }
        SceneId(id)
    }

    pub fn decode(self) -> SceneCoordinates {
        let mut coords = SceneCoordinates::default();
        let mut weight = 1u64;
        for axis in IDENTITY_AXES {
            let digit = (self.0 / weight) % SCENE_ID_RADIX;
            coords.set(axis, digit as i32);
            weight = weight.saturating_mul(SCENE_ID_RADIX);
        }
        coords
    }

    pub fn from_dimensions(dimensions: &[Dimension]) -> Self {
        Self::encode(&SceneCoordinates::from_dimensions(dimensions))
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl From<u64> for SceneId {
    fn from(value: u64) -> Self {
        SceneId(value)
    }
}

/// Upper bound on the identities [`enumerate_identities`] will expand.
pub const MAX_ENUMERATED_IDENTITIES: u64 = 1 << 16;

/// Every scene identity reachable from the given dimension ranges.
///
/// Each identity axis ranges over `start..start + size`, clipped to the
/// packing digit range `0..1000`; axes that are not listed stay at 0.
/// Non-identity axes are ignored. The result is sorted and free of
/// duplicates.
///
/// Returns `None` when the ranges span more than
/// [`MAX_ENUMERATED_IDENTITIES`] combinations.
pub fn enumerate_identities(ranges: &[Dimension]) -> Option<Vec<SceneId>> {
    let digits: Vec<(Axis, i32, i32)> = ranges
        .iter()
        .filter(|r| IDENTITY_AXES.contains(&r.axis))
        .map(|r| {
            let start = r.start.clamp(0, SCENE_ID_RADIX as i32);
            let end = r.start.saturating_add(r.size).clamp(start, SCENE_ID_RADIX as i32);
            (r.axis, start, end)
        })
        .collect();

    let total = digits
        .iter()
        .try_fold(1u64, |acc, &(_, start, end)| acc.checked_mul((end - start) as u64))?;
    if total > MAX_ENUMERATED_IDENTITIES {
        return None;
    }

    let mut partial = vec![SceneCoordinates::default()];
    for &(axis, start, end) in &digits {
        let mut expanded = Vec::with_capacity(partial.len() * (end - start) as usize);
        for coords in &partial {
            for value in start..end {
                let mut next = *coords;
                next.set(axis, value);
                expanded.push(next);
            }
        }
        partial = expanded;
    }

    Some(
        partial
            .iter()
            .map(SceneId::encode)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect(),
    )
}
