//! Distances between residences on the 100 m statistical grid

/// Centre-less position of a 100 m grid cell, in metres
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridCell {
    pub east_m: f64,
    pub north_m: f64,
}

impl GridCell {
    /// Parse a grid label such as `E1234N5678`
    ///
    /// Characters 1..5 hold the easting and everything from character 6 the
    /// northing, both in hectometres. Labels starting with `-` mark an unknown
    /// location and yield `None`.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        let label = label.trim();
        if label.is_empty() || label.starts_with('-') || !label.is_ascii() || label.len() < 7 {
            return None;
        }
        let east: f64 = label[1..5].parse().ok()?;
        let north: f64 = label[6..].parse().ok()?;
        Some(Self {
            east_m: east * 100.0,
            north_m: north * 100.0,
        })
    }

    /// Straight-line distance in metres
    #[must_use]
    pub fn euclidean(&self, other: &Self) -> f64 {
        (self.east_m - other.east_m).hypot(self.north_m - other.north_m)
    }
}

/// Where a person lives
#[derive(Debug, Clone, PartialEq)]
pub struct Residence {
    /// Address object identifier
    pub address: String,
    pub cell: GridCell,
}

/// Distance between two residences
///
/// People at the same address object are 0 m apart. Otherwise the grid distance
/// is increased by `offset_m`, the mean distance between two random points of
/// neighbouring cells.
#[must_use]
pub fn pair_distance(a: &Residence, b: &Residence, offset_m: f64) -> f64 {
    if !a.address.is_empty() && a.address == b.address {
        0.0
    } else {
        offset_m + a.cell.euclidean(&b.cell)
    }
}
