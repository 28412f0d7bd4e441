//! Detector layers, disks and the displaced seeding combinations.

use serde::{Deserialize, Serialize};

/// A barrel layer or an endcap disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LayerDisk {
    L1,
    L2,
    L3,
    L4,
    L5,
    L6,
    D1,
    D2,
    D3,
    D4,
    D5,
}

impl LayerDisk {
    pub const ALL: [LayerDisk; 11] = [
        LayerDisk::L1,
        LayerDisk::L2,
        LayerDisk::L3,
        LayerDisk::L4,
        LayerDisk::L5,
        LayerDisk::L6,
        LayerDisk::D1,
        LayerDisk::D2,
        LayerDisk::D3,
        LayerDisk::D4,
        LayerDisk::D5,
    ];

    /// Combined index: layers 0-5, disks 6-10.
    pub fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub fn is_barrel(self) -> bool {
        self.index() < 6
    }

    #[inline]
    pub fn is_disk(self) -> bool {
        !self.is_barrel()
    }

    /// Barrel layer index (0 for L1), or `None` for disks.
    pub fn layer_index(self) -> Option<usize> {
        self.is_barrel().then(|| self.index())
    }

    /// Disk index (0 for D1), or `None` for barrel layers.
    pub fn disk_index(self) -> Option<usize> {
        self.is_disk().then(|| self.index() - 6)
    }

    pub fn name(self) -> &'static str {
        match self {
            LayerDisk::L1 => "L1",
            LayerDisk::L2 => "L2",
            LayerDisk::L3 => "L3",
            LayerDisk::L4 => "L4",
            LayerDisk::L5 => "L5",
            LayerDisk::L6 => "L6",
            LayerDisk::D1 => "D1",
            LayerDisk::D2 => "D2",
            LayerDisk::D3 => "D3",
            LayerDisk::D4 => "D4",
            LayerDisk::D5 => "D5",
        }
    }
}

impl std::fmt::Display for LayerDisk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for LayerDisk {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LayerDisk::ALL
            .iter()
            .copied()
            .find(|ld| ld.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown layer/disk: {}", s))
    }
}

/// Displaced seeding combinations.
///
/// Each seed pairs a first (middle) and second (outer) layer/disk and extends
/// the pair with a stub from the third layer/disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Seed {
    L3L4L2,
    L5L6L4,
    L2L3D1,
    D1D2L2,
}

impl Seed {
    pub const ALL: [Seed; 4] = [Seed::L3L4L2, Seed::L5L6L4, Seed::L2L3D1, Seed::D1D2L2];

    /// Seed index as used in the tracklet-calculator index (standard seeds
    /// occupy 0-7).
    pub fn index(self) -> u32 {
        match self {
            Seed::L3L4L2 => 8,
            Seed::L5L6L4 => 9,
            Seed::L2L3D1 => 10,
            Seed::D1D2L2 => 11,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Seed::L3L4L2 => "L3L4L2",
            Seed::L5L6L4 => "L5L6L4",
            Seed::L2L3D1 => "L2L3D1",
            Seed::D1D2L2 => "D1D2L2",
        }
    }

    /// First (middle) layer/disk of the seed.
    pub fn first(self) -> LayerDisk {
        match self {
            Seed::L3L4L2 => LayerDisk::L3,
            Seed::L5L6L4 => LayerDisk::L5,
            Seed::L2L3D1 => LayerDisk::L2,
            Seed::D1D2L2 => LayerDisk::D1,
        }
    }

    /// Second (outer) layer/disk of the seed.
    pub fn second(self) -> LayerDisk {
        match self {
            Seed::L3L4L2 => LayerDisk::L4,
            Seed::L5L6L4 => LayerDisk::L6,
            Seed::L2L3D1 => LayerDisk::L3,
            Seed::D1D2L2 => LayerDisk::D2,
        }
    }

    /// Third layer/disk used to form the triplet.
    pub fn third(self) -> LayerDisk {
        match self {
            Seed::L3L4L2 => LayerDisk::L2,
            Seed::L5L6L4 => LayerDisk::L4,
            Seed::L2L3D1 => LayerDisk::D1,
            Seed::D1D2L2 => LayerDisk::L2,
        }
    }

    /// Layers and disks the seed's tracklets are projected to.
    pub fn projection_targets(self) -> &'static [LayerDisk] {
        use LayerDisk::*;
        match self {
            Seed::L3L4L2 => &[L1, L5, L6, D1, D2, D3, D4],
            Seed::L5L6L4 => &[L1, L2, L3, D1, D2],
            Seed::L2L3D1 => &[L1, L4, D2, D3, D4],
            Seed::D1D2L2 => &[L1, D3, D4, D5],
        }
    }

    pub fn projects_to(self, target: LayerDisk) -> bool {
        self.projection_targets().contains(&target)
    }
}

impl std::fmt::Display for Seed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Seed {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Seed::ALL
            .iter()
            .copied()
            .find(|seed| seed.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown displaced seed: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_disk_indices() {
        assert_eq!(LayerDisk::L3.layer_index(), Some(2));
        assert_eq!(LayerDisk::L3.disk_index(), None);
        assert_eq!(LayerDisk::D2.disk_index(), Some(1));
        assert!(LayerDisk::D5.is_disk());
        assert!(LayerDisk::L6.is_barrel());
    }

    #[test]
    fn test_parse_round_trip() {
        for ld in LayerDisk::ALL {
            assert_eq!(ld.name().parse::<LayerDisk>().unwrap(), ld);
        }
        for seed in Seed::ALL {
            assert_eq!(seed.to_string().parse::<Seed>().unwrap(), seed);
        }
        assert!("L7".parse::<LayerDisk>().is_err());
        assert!("L1L2".parse::<Seed>().is_err());
    }

    #[test]
    fn test_seed_layers_are_distinct() {
        for seed in Seed::ALL {
            assert_ne!(seed.first(), seed.second());
            assert_ne!(seed.first(), seed.third());
            assert!(!seed.projects_to(seed.first()));
            assert!(!seed.projects_to(seed.third()));
        }
    }
}
