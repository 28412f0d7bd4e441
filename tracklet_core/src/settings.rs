//! Geometry and bit-width configuration.
//!
//! `Settings` is loaded once before any processing and shared immutably.
//! Physical quantities (cm, rad) are only used here and while building LUTs;
//! every per-stub computation works on the integer units derived below.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::path::Path;

use crate::error::TrackletError;
use crate::geometry::LayerDisk;
use crate::stub::Stub;

/// Fixed-point shift of the `B = -rinv/2` coefficient.
pub const B_SHIFT: u32 = 12;
/// Fixed-point shift of the `C = -d0` coefficient.
pub const C_SHIFT: u32 = 8;
/// Fixed-point shift of the r-z slope `t`.
pub const T_SHIFT: u32 = 10;
/// Scale of the inverse-radius table: entries hold `2^INV_R_SHIFT / r`.
pub const INV_R_SHIFT: u32 = 20;
/// Width of an inverse-radius table entry.
pub const INV_R_VALUE_BITS: u32 = 12;

/// Coarse rz bits of a VM stub memory (8 bins).
pub const RZ_BITS: u32 = 3;
/// Fine rz bits within a coarse bin.
pub const FINE_RZ_BITS: u32 = 3;
/// Number of coarse rz bins in a VM stub memory.
pub const NUM_RZ_BINS: usize = 1 << RZ_BITS;
/// Number of fine rz positions across the whole target.
pub const NUM_FINE_RZ: u32 = 1 << (RZ_BITS + FINE_RZ_BITS);

/// Configuration for the displaced tracklet pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // === Geometry (cm) ===
    /// Nominal radii of barrel layers L1-L6
    pub barrel_radii: [f64; 6],

    /// Nominal |z| of disks D1-D5
    pub disk_z: [f64; 5],

    /// Barrel half length
    pub barrel_half_length: f64,

    /// Inner radius of the disk acceptance
    pub disk_rmin: f64,

    /// Outer radius of the disk acceptance
    pub disk_rmax: f64,

    /// Number of phi sectors
    pub n_sectors: u32,

    /// Phi overlap added on each side of a sector (rad)
    pub sector_overlap: f64,

    /// Radial LSB (cm)
    pub kr: f64,

    /// Longitudinal LSB (cm)
    pub kz: f64,

    // === Stub words ===
    pub nbits_phi: u32,
    pub nbits_r_barrel: u32,
    pub nbits_z_barrel: u32,
    pub nbits_r_disk: u32,
    pub nbits_z_disk: u32,

    // === LUT addressing ===
    pub lut_z_bits_barrel: u32,
    pub lut_r_bits_barrel: u32,
    pub lut_z_bits_disk: u32,
    pub lut_r_bits_disk: u32,

    /// Phi bits kept for the first-layer stub
    pub first_phi_bits: u32,

    /// Phi bits kept for the second-layer stub
    pub second_phi_bits: u32,

    /// Phi bits of a third-layer phi region
    pub third_phi_bits: u32,

    /// Width of the coarse phi-compatibility window at the reduced resolution
    pub phi_window: u32,

    // === Pipeline resources ===
    pub buffer_capacity: usize,
    pub num_units: usize,

    /// Dispatch cycles available per `execute`
    pub max_step: u32,

    pub max_vm_stubs_per_bin: usize,

    /// Tracklets per parameter memory (7-bit tracklet index)
    pub max_tracklets: usize,

    pub max_projections: usize,

    // === Acceptance ===
    /// Beamline |z0| reach (cm), also used to open the LUT windows
    pub z0_max: f64,

    /// Maximum |1/R| (1/cm)
    pub rinv_max: f64,

    /// Maximum |d0| (cm)
    pub d0_max: f64,

    /// Maximum |tan(lambda)|
    pub t_max: f64,

    // === Tracklet parameter words ===
    pub nbits_rinv: u32,
    pub nbits_phi0: u32,
    pub nbits_d0: u32,
    pub nbits_z0: u32,
    pub nbits_t: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            barrel_radii: [25.0, 37.0, 52.0, 68.6, 80.0, 110.0],
            disk_z: [131.2, 155.0, 185.3, 221.6, 265.0],
            barrel_half_length: 120.0,
            disk_rmin: 20.0,
            disk_rmax: 120.0,
            n_sectors: 9,
            sector_overlap: 0.1,
            kr: 1.0 / 32.0,
            kz: 1.0 / 16.0,

            nbits_phi: 14,
            nbits_r_barrel: 7,
            nbits_z_barrel: 12,
            nbits_r_disk: 12,
            nbits_z_disk: 7,

            lut_z_bits_barrel: 7,
            lut_r_bits_barrel: 4,
            lut_z_bits_disk: 3,
            lut_r_bits_disk: 7,
            first_phi_bits: 6,
            second_phi_bits: 6,
            third_phi_bits: 7,
            phi_window: 8,

            buffer_capacity: 16,
            num_units: 4,
            max_step: 108,
            max_vm_stubs_per_bin: 16,
            max_tracklets: 127,
            max_projections: 64,

            z0_max: 20.0,
            rinv_max: 0.0057,
            d0_max: 10.0,
            t_max: 7.0,

            nbits_rinv: 16,
            nbits_phi0: 16,
            nbits_d0: 13,
            nbits_z0: 11,
            nbits_t: 14,
        }
    }
}

/// Integer phi window of one `execute` call, inclusive on both ends.
/// `lo > hi` denotes an empty window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhiWindow {
    pub lo: i32,
    pub hi: i32,
}

impl PhiWindow {
    #[inline]
    pub fn contains(&self, phi: i64) -> bool {
        phi >= self.lo as i64 && phi <= self.hi as i64
    }

    pub fn is_empty(&self) -> bool {
        self.lo > self.hi
    }
}

impl Settings {
    /// Loads settings from a JSON file; missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, TrackletError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| TrackletError::config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&text)
    }

    /// Parses settings from JSON text and validates them.
    pub fn from_json_str(text: &str) -> Result<Self, TrackletError> {
        let settings: Settings = serde_json::from_str(text)
            .map_err(|e| TrackletError::config(format!("settings: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Rejects configurations whose widths, capacities or ranges disagree.
    pub fn validate(&self) -> Result<(), TrackletError> {
        let fail = |msg: String| Err(TrackletError::config(msg));

        if !(4..=20).contains(&self.nbits_phi) {
            return fail(format!("nbits_phi {} outside 4..=20", self.nbits_phi));
        }
        for (name, bits) in [
            ("first_phi_bits", self.first_phi_bits),
            ("second_phi_bits", self.second_phi_bits),
            ("third_phi_bits", self.third_phi_bits),
        ] {
            if bits == 0 || bits > self.nbits_phi {
                return fail(format!("{} {} outside 1..={}", name, bits, self.nbits_phi));
            }
        }
        for (name, lut_bits, word_bits) in [
            ("lut_z_bits_barrel", self.lut_z_bits_barrel, self.nbits_z_barrel),
            ("lut_r_bits_barrel", self.lut_r_bits_barrel, self.nbits_r_barrel),
            ("lut_z_bits_disk", self.lut_z_bits_disk, self.nbits_z_disk),
            ("lut_r_bits_disk", self.lut_r_bits_disk, self.nbits_r_disk),
        ] {
            if lut_bits == 0 || lut_bits > word_bits {
                return fail(format!("{} {} exceeds stub word of {} bits", name, lut_bits, word_bits));
            }
        }
        if self.lut_z_bits_barrel + self.lut_r_bits_barrel > 16
            || self.lut_z_bits_disk + self.lut_r_bits_disk > 16
        {
            return fail("LUT key wider than 16 bits".to_string());
        }
        if self.buffer_capacity == 0
            || self.num_units == 0
            || self.max_step == 0
            || self.max_vm_stubs_per_bin == 0
            || self.max_tracklets == 0
            || self.max_projections == 0
        {
            return fail("pipeline capacities must be non-zero".to_string());
        }
        if self.n_sectors == 0 || self.kr <= 0.0 || self.kz <= 0.0 {
            return fail("sector count and LSBs must be positive".to_string());
        }
        if self.disk_rmin >= self.disk_rmax {
            return fail("disk_rmin must be below disk_rmax".to_string());
        }

        // The inverse-radius table is addressed by absolute radius.
        let r_limit = 1i64 << self.nbits_r_disk;
        let max_barrel_r = self.barrel_radius_int(LayerDisk::L6) as i64
            + (1i64 << (self.nbits_r_barrel - 1));
        if max_barrel_r >= r_limit || self.disk_rmax_int() as i64 >= r_limit {
            return fail(format!("radii exceed the {}-bit radius domain", self.nbits_r_disk));
        }

        for (name, max, nbits) in [
            ("rinv", self.rinv_max_int(), self.nbits_rinv),
            ("d0", self.d0_max_int(), self.nbits_d0),
            ("z0", self.z0_max_int(), self.nbits_z0),
            ("t", self.t_max_int(), self.nbits_t),
            ("phi0", (1i64 << self.nbits_phi) - 1, self.nbits_phi0),
        ] {
            if nbits == 0 || nbits > 31 || max >= (1i64 << (nbits - 1)) {
                return fail(format!("{} range {} does not fit {} signed bits", name, max, nbits));
            }
        }
        Ok(())
    }

    // ========================================================================
    // PHI
    // ========================================================================

    /// Sector width without overlap (rad).
    pub fn dphi_sector(&self) -> f64 {
        2.0 * PI / self.n_sectors as f64
    }

    /// Sector width including the overlap on both sides (rad).
    pub fn dphi_sector_hg(&self) -> f64 {
        self.dphi_sector() + 2.0 * self.sector_overlap
    }

    /// Phi LSB (rad).
    pub fn kphi(&self) -> f64 {
        self.dphi_sector_hg() / (1u64 << self.nbits_phi) as f64
    }

    /// Global phi range covered by a sector's local phi words (rad).
    pub fn sector_phi_range(&self, sector: u32) -> (f64, f64) {
        let origin = sector as f64 * self.dphi_sector() - self.sector_overlap;
        (origin, origin + self.dphi_sector_hg())
    }

    /// Quantizes the global `[phimin, phimax]` window to sector-local integer
    /// phi, clamped to the phi word.
    pub fn phi_window(&self, sector: u32, phimin: f64, phimax: f64) -> Result<PhiWindow, TrackletError> {
        if sector >= self.n_sectors {
            return Err(TrackletError::config(format!(
                "sector {} outside 0..{}",
                sector, self.n_sectors
            )));
        }
        if !phimin.is_finite() || !phimax.is_finite() || phimin > phimax {
            return Err(TrackletError::config(format!(
                "invalid phi window [{}, {}]",
                phimin, phimax
            )));
        }
        let (origin, _) = self.sector_phi_range(sector);
        let kphi = self.kphi();
        let max = (1i64 << self.nbits_phi) - 1;
        let lo = (((phimin - origin) / kphi).floor() as i64).clamp(0, max + 1);
        let hi = (((phimax - origin) / kphi).floor() as i64).clamp(-1, max);
        Ok(PhiWindow {
            lo: lo as i32,
            hi: hi as i32,
        })
    }

    // ========================================================================
    // INTEGER GEOMETRY
    // ========================================================================

    /// Nominal radius of a barrel layer in `kr` units.
    pub fn barrel_radius_int(&self, layer: LayerDisk) -> i32 {
        let index = layer.layer_index().unwrap_or(0);
        (self.barrel_radii[index] / self.kr).round() as i32
    }

    /// Nominal |z| of a disk in `kz` units.
    pub fn disk_z_int(&self, disk: LayerDisk) -> i32 {
        let index = disk.disk_index().unwrap_or(0);
        (self.disk_z[index] / self.kz).round() as i32
    }

    pub fn zlength_int(&self) -> i32 {
        (self.barrel_half_length / self.kz).round() as i32
    }

    pub fn disk_rmin_int(&self) -> i32 {
        (self.disk_rmin / self.kr).round() as i32
    }

    pub fn disk_rmax_int(&self) -> i32 {
        (self.disk_rmax / self.kr).round() as i32
    }

    /// `(r bits, r signed, z bits, z signed)` of stubs on a layer/disk.
    pub fn stub_widths(&self, layer_disk: LayerDisk) -> (u32, bool, u32, bool) {
        if layer_disk.is_barrel() {
            (self.nbits_r_barrel, true, self.nbits_z_barrel, true)
        } else {
            (self.nbits_r_disk, false, self.nbits_z_disk, true)
        }
    }

    /// `(z bits, r bits)` of the fine-bin LUT key for stubs on a layer/disk.
    pub fn lut_bits(&self, layer_disk: LayerDisk) -> (u32, u32) {
        if layer_disk.is_barrel() {
            (self.lut_z_bits_barrel, self.lut_r_bits_barrel)
        } else {
            (self.lut_z_bits_disk, self.lut_r_bits_disk)
        }
    }

    /// Fine rz position (0..64) of a stub within a target layer/disk: z along
    /// the barrel, r across a disk.
    pub fn fine_rz_bin(&self, stub: &Stub) -> u32 {
        let (coordinate, lo, hi) = if stub.layer_disk().is_barrel() {
            let zl = self.zlength_int() as i64;
            (stub.z_abs(self) as i64, -zl, zl)
        } else {
            (
                stub.r_abs(self) as i64,
                self.disk_rmin_int() as i64,
                self.disk_rmax_int() as i64,
            )
        };
        let span = hi - lo;
        let scaled = ((coordinate - lo).max(0) * NUM_FINE_RZ as i64) / span;
        scaled.clamp(0, NUM_FINE_RZ as i64 - 1) as u32
    }

    /// Floating-point counterpart of [`fine_rz_bin`](Self::fine_rz_bin),
    /// unclamped. Used while building LUTs.
    pub fn fine_rz_position(&self, target: LayerDisk, coordinate_cm: f64) -> f64 {
        let (lo, hi) = if target.is_barrel() {
            (-self.barrel_half_length, self.barrel_half_length)
        } else {
            (self.disk_rmin, self.disk_rmax)
        };
        (coordinate_cm - lo) / (hi - lo) * NUM_FINE_RZ as f64
    }

    // ========================================================================
    // TRACKLET PARAMETER UNITS
    // ========================================================================

    /// LSB of `rinv` (1/cm).
    pub fn krinv(&self) -> f64 {
        self.kphi() / self.kr / (1u64 << B_SHIFT) as f64
    }

    /// LSB of `d0` (cm).
    pub fn kd0(&self) -> f64 {
        self.kphi() * self.kr * (1u64 << (INV_R_SHIFT - C_SHIFT)) as f64
    }

    /// LSB of `t`.
    pub fn kt(&self) -> f64 {
        self.kz / self.kr / (1u64 << T_SHIFT) as f64
    }

    pub fn rinv_max_int(&self) -> i64 {
        (self.rinv_max / self.krinv()).floor() as i64
    }

    pub fn d0_max_int(&self) -> i64 {
        (self.d0_max / self.kd0()).floor() as i64
    }

    pub fn z0_max_int(&self) -> i64 {
        (self.z0_max / self.kz).floor() as i64
    }

    pub fn t_max_int(&self) -> i64 {
        (self.t_max / self.kt()).floor() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_settings_are_valid() {
        Settings::default().validate().unwrap();
    }

    #[test]
    fn test_integer_geometry() {
        let settings = Settings::default();
        assert_eq!(settings.barrel_radius_int(LayerDisk::L3), 1664);
        assert_eq!(settings.barrel_radius_int(LayerDisk::L4), 2195);
        assert_eq!(settings.zlength_int(), 1920);
        assert_eq!(settings.disk_rmin_int(), 640);
        assert_eq!(settings.disk_rmax_int(), 3840);
        assert_eq!(settings.disk_z_int(LayerDisk::D1), 2099);
    }

    #[test]
    fn test_parameter_units() {
        let settings = Settings::default();
        assert_relative_eq!(
            settings.rinv_max_int() as f64 * settings.krinv(),
            settings.rinv_max,
            max_relative = 1e-3
        );
        assert_relative_eq!(settings.kt(), 2.0 / 1024.0);
        assert!(settings.d0_max_int() > 0);
    }

    #[test]
    fn test_full_sector_window() {
        let settings = Settings::default();
        let (lo, hi) = settings.sector_phi_range(3);
        let window = settings.phi_window(3, lo, hi).unwrap();
        assert_eq!(window.lo, 0);
        assert_eq!(window.hi, (1 << settings.nbits_phi) - 1);
    }

    #[test]
    fn test_phi_window_rejects_bad_input() {
        let settings = Settings::default();
        assert!(settings.phi_window(9, 0.0, 0.1).is_err());
        assert!(settings.phi_window(0, 0.2, 0.1).is_err());
        assert!(settings.phi_window(0, f64::NAN, 0.1).is_err());
    }

    #[test]
    fn test_window_outside_sector_is_empty() {
        let settings = Settings::default();
        let (_, hi) = settings.sector_phi_range(0);
        let window = settings.phi_window(0, hi + 0.5, hi + 0.6).unwrap();
        assert!(window.is_empty());
    }

    #[test]
    fn test_json_overrides() {
        let settings = Settings::from_json_str(r#"{ "num_units": 2, "buffer_capacity": 4 }"#).unwrap();
        assert_eq!(settings.num_units, 2);
        assert_eq!(settings.buffer_capacity, 4);
        assert_eq!(settings.max_step, Settings::default().max_step);
    }

    #[test]
    fn test_validate_rejects_inconsistent_widths() {
        let settings = Settings {
            lut_z_bits_barrel: 13,
            ..Default::default()
        };
        assert!(settings.validate().is_err());

        let settings = Settings {
            nbits_rinv: 8,
            ..Default::default()
        };
        assert!(settings.validate().is_err());

        assert!(Settings::from_json_str(r#"{ "num_units": 0 }"#).is_err());
    }
}
