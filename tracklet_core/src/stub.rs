//! Quantized detector hits.

use serde::{Deserialize, Serialize};

use crate::error::TrackletError;
use crate::geometry::LayerDisk;
use crate::settings::Settings;
use crate::word::FixedWord;

/// A quantized hit on one layer or disk.
///
/// Barrel stubs carry `r` as a signed residual from the nominal layer radius
/// and `z` as signed absolute z. Disk stubs carry `r` as unsigned absolute
/// radius and `z` as a signed residual of |z| from the nominal disk position,
/// with the side in `negative_z`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stub {
    layer_disk: LayerDisk,
    phi: FixedWord,
    r: FixedWord,
    z: FixedWord,
    negative_z: bool,
}

impl Stub {
    /// Creates a barrel stub. Values are in `kphi`, `kr` and `kz` units.
    pub fn barrel(
        settings: &Settings,
        layer: LayerDisk,
        phi: i64,
        r_residual: i64,
        z: i64,
    ) -> Result<Self, TrackletError> {
        if !layer.is_barrel() {
            return Err(TrackletError::config(format!("{} is not a barrel layer", layer)));
        }
        Ok(Self {
            layer_disk: layer,
            phi: FixedWord::unsigned(phi, settings.nbits_phi)?,
            r: FixedWord::signed(r_residual, settings.nbits_r_barrel)?,
            z: FixedWord::signed(z, settings.nbits_z_barrel)?,
            negative_z: z < 0,
        })
    }

    /// Creates a disk stub. `z_residual` is relative to the disk's nominal |z|.
    pub fn disk(
        settings: &Settings,
        disk: LayerDisk,
        phi: i64,
        r: i64,
        z_residual: i64,
        negative_z: bool,
    ) -> Result<Self, TrackletError> {
        if !disk.is_disk() {
            return Err(TrackletError::config(format!("{} is not a disk", disk)));
        }
        Ok(Self {
            layer_disk: disk,
            phi: FixedWord::unsigned(phi, settings.nbits_phi)?,
            r: FixedWord::unsigned(r, settings.nbits_r_disk)?,
            z: FixedWord::signed(z_residual, settings.nbits_z_disk)?,
            negative_z,
        })
    }

    #[inline]
    pub fn layer_disk(&self) -> LayerDisk {
        self.layer_disk
    }

    #[inline]
    pub fn phi(&self) -> FixedWord {
        self.phi
    }

    #[inline]
    pub fn r(&self) -> FixedWord {
        self.r
    }

    #[inline]
    pub fn z(&self) -> FixedWord {
        self.z
    }

    #[inline]
    pub fn negative_z(&self) -> bool {
        self.negative_z
    }

    /// Phi reduced to its `bits` most significant bits.
    #[inline]
    pub fn phi_reduced(&self, bits: u32) -> i32 {
        self.phi.value() >> (self.phi.nbits() - bits)
    }

    /// Absolute radius in `kr` units.
    pub fn r_abs(&self, settings: &Settings) -> i32 {
        if self.layer_disk.is_barrel() {
            settings.barrel_radius_int(self.layer_disk) + self.r.value()
        } else {
            self.r.value()
        }
    }

    /// Absolute signed z in `kz` units.
    pub fn z_abs(&self, settings: &Settings) -> i32 {
        if self.layer_disk.is_barrel() {
            self.z.value()
        } else {
            let z = settings.disk_z_int(self.layer_disk) + self.z.value();
            if self.negative_z {
                -z
            } else {
                z
            }
        }
    }

    /// True when the word widths agree with the settings for this layer/disk.
    pub fn matches_settings(&self, settings: &Settings) -> bool {
        let (r_bits, _, z_bits, _) = settings.stub_widths(self.layer_disk);
        self.phi.nbits() == settings.nbits_phi && self.r.nbits() == r_bits && self.z.nbits() == z_bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_barrel_stub_absolute_coordinates() {
        let settings = Settings::default();
        let stub = Stub::barrel(&settings, LayerDisk::L3, 100, -5, -300).unwrap();
        assert_eq!(stub.r_abs(&settings), 1659);
        assert_eq!(stub.z_abs(&settings), -300);
        assert!(stub.negative_z());
        assert!(stub.matches_settings(&settings));
    }

    #[test]
    fn test_disk_stub_side() {
        let settings = Settings::default();
        let plus = Stub::disk(&settings, LayerDisk::D1, 10, 1200, 3, false).unwrap();
        let minus = Stub::disk(&settings, LayerDisk::D1, 10, 1200, 3, true).unwrap();
        assert_eq!(plus.z_abs(&settings), 2102);
        assert_eq!(minus.z_abs(&settings), -2102);
        assert_eq!(plus.r_abs(&settings), 1200);
    }

    #[test]
    fn test_out_of_range_fields_rejected() {
        let settings = Settings::default();
        assert!(Stub::barrel(&settings, LayerDisk::L3, 1 << 14, 0, 0).is_err());
        assert!(Stub::barrel(&settings, LayerDisk::L3, 0, 64, 0).is_err());
        assert!(Stub::disk(&settings, LayerDisk::D2, 0, -1, 0, false).is_err());
        assert!(Stub::barrel(&settings, LayerDisk::D2, 0, 0, 0).is_err());
    }

    #[test]
    fn test_phi_reduction() {
        let settings = Settings::default();
        let stub = Stub::barrel(&settings, LayerDisk::L2, 0b11_0101_1100_0111, 0, 0).unwrap();
        assert_eq!(stub.phi_reduced(12), 0b11_0101_1100_01);
        assert_eq!(stub.phi_reduced(10), 0b11_0101_1100);
    }
}
