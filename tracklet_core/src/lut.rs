//! Lookup tables.
//!
//! Tables are built once from [`Settings`] (floating point is allowed here)
//! and are read-only afterwards. The two projection tables of a seed map a
//! first-layer fine bin to the rz window reachable in the second and third
//! layers; the inverse-radius table feeds the parameter calculator.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::TrackletError;
use crate::geometry::{LayerDisk, Seed};
use crate::settings::{Settings, FINE_RZ_BITS, INV_R_SHIFT, INV_R_VALUE_BITS, NUM_FINE_RZ, NUM_RZ_BINS};
use crate::stub::Stub;

/// Width of an encoded projection window.
pub const PROJECTION_VALUE_BITS: u32 = 11;

const FIRST_BITS: u32 = 3;
const DIFF_BITS: u32 = 4;
const START_BITS: u32 = 3;

/// Destination of a projection table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProjectionTarget {
    /// The seed's second layer/disk
    Outer,
    /// The seed's third layer/disk
    Third,
}

impl ProjectionTarget {
    pub fn layer_disk(self, seed: Seed) -> LayerDisk {
        match self {
            ProjectionTarget::Outer => seed.second(),
            ProjectionTarget::Third => seed.third(),
        }
    }
}

// ============================================================================
// PROJECTION WINDOW
// ============================================================================

/// Reachable rz range in a target VM memory.
///
/// Covers at most two adjacent coarse bins: `start` and, when `next` is set,
/// `start + 1`. Fine positions are counted from the start bin, so positions
/// in the next bin are offset by 8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectionWindow {
    pub start: u32,
    pub next: bool,
    pub rzbin_first: u32,
    pub rzdiff_max: u32,
}

impl ProjectionWindow {
    /// Window over fine positions `lo..=hi` (0..64). Ranges reaching beyond
    /// two coarse bins are truncated.
    pub fn from_fine_range(lo: u32, hi: u32) -> Self {
        let lo = lo.min(NUM_FINE_RZ - 1);
        let start = lo >> FINE_RZ_BITS;
        let hi = hi.max(lo).min(((start + 2) << FINE_RZ_BITS) - 1).min(NUM_FINE_RZ - 1);
        Self {
            start,
            next: (hi >> FINE_RZ_BITS) > start,
            rzbin_first: lo & ((1 << FINE_RZ_BITS) - 1),
            rzdiff_max: hi - lo,
        }
    }

    pub fn encode(&self) -> u32 {
        self.rzbin_first
            | self.rzdiff_max << FIRST_BITS
            | self.start << (FIRST_BITS + DIFF_BITS)
            | (self.next as u32) << (FIRST_BITS + DIFF_BITS + START_BITS)
    }

    pub fn decode(value: u32) -> Self {
        Self {
            rzbin_first: value & ((1 << FIRST_BITS) - 1),
            rzdiff_max: (value >> FIRST_BITS) & ((1 << DIFF_BITS) - 1),
            start: (value >> (FIRST_BITS + DIFF_BITS)) & ((1 << START_BITS) - 1),
            next: (value >> (FIRST_BITS + DIFF_BITS + START_BITS)) & 1 == 1,
        }
    }

    /// Coarse bins covered by the window, in ascending order.
    pub fn bins(&self) -> impl Iterator<Item = usize> {
        let start = self.start as usize;
        let last = if self.next { start + 1 } else { start };
        start..=last.min(NUM_RZ_BINS - 1)
    }

    /// True when a stub in coarse `bin` at `fine` position lies inside.
    pub fn accepts(&self, bin: usize, fine: u32) -> bool {
        let rzbin = if bin == self.start as usize {
            fine
        } else if self.next && bin == self.start as usize + 1 {
            fine + (1 << FINE_RZ_BITS)
        } else {
            return false;
        };
        rzbin >= self.rzbin_first && rzbin <= self.rzbin_first + self.rzdiff_max
    }

    /// First and last fine position covered.
    pub fn fine_range(&self) -> (u32, u32) {
        let lo = (self.start << FINE_RZ_BITS) + self.rzbin_first;
        (lo, lo + self.rzdiff_max)
    }

    /// The window reflected through z = 0 (fine position `p` maps to `63 - p`).
    pub fn mirrored(&self) -> Self {
        let (lo, hi) = self.fine_range();
        let top = NUM_FINE_RZ - 1;
        Self::from_fine_range(top - hi.min(top), top - lo)
    }
}

// ============================================================================
// TABLES
// ============================================================================

/// A read-only lookup table with `2^key_bits` optional entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackletLut {
    name: String,
    key_bits: u32,
    value_bits: u32,
    entries: Vec<Option<u32>>,
}

impl TrackletLut {
    /// Wraps precomputed entries; every entry must fit `value_bits`.
    pub fn from_entries(
        name: impl Into<String>,
        key_bits: u32,
        value_bits: u32,
        entries: Vec<Option<u32>>,
    ) -> Result<Self, TrackletError> {
        let name = name.into();
        if key_bits == 0 || key_bits > 20 {
            return Err(TrackletError::config(format!("{}: unsupported key width {}", name, key_bits)));
        }
        if entries.len() != 1 << key_bits {
            return Err(TrackletError::config(format!(
                "{}: {} entries for a {}-bit key",
                name,
                entries.len(),
                key_bits
            )));
        }
        if let Some(value) = entries.iter().flatten().find(|&&v| v >> value_bits != 0) {
            return Err(TrackletError::WordOverflow {
                value: *value as i64,
                nbits: value_bits,
                kind: "unsigned",
            });
        }
        Ok(Self {
            name,
            key_bits,
            value_bits,
            entries,
        })
    }

    /// Projection table from the first layer of `seed` to `target`.
    pub fn projection(
        settings: &Settings,
        seed: Seed,
        target: ProjectionTarget,
    ) -> Result<Self, TrackletError> {
        let source = seed.first();
        let destination = target.layer_disk(seed);
        let (nz, nr) = settings.lut_bits(source);
        let key_bits = nz + nr;

        let entries: Vec<Option<u32>> = (0..1u32 << key_bits)
            .map(|key| {
                let (z_range, r_range) = source_extent(settings, source, key >> nr, key & ((1 << nr) - 1));
                reachable_fine_range(settings, destination, z_range, r_range)
                    .map(|(lo, hi)| ProjectionWindow::from_fine_range(lo, hi).encode())
            })
            .collect();

        let suffix = match target {
            ProjectionTarget::Outer => "inner",
            ProjectionTarget::Third => "inner_third",
        };
        let lut = Self::from_entries(
            format!("TP_{}_{}", seed, suffix),
            key_bits,
            PROJECTION_VALUE_BITS,
            entries,
        )?;
        debug!(
            table = %lut.name,
            valid = lut.valid_entries(),
            size = lut.len(),
            "Built projection table"
        );
        Ok(lut)
    }

    /// `2^INV_R_SHIFT / r` indexed by absolute radius in `kr` units.
    pub fn inverse_r(settings: &Settings) -> Result<Self, TrackletError> {
        let key_bits = settings.nbits_r_disk;
        let min_r = 1u32 << (INV_R_SHIFT - INV_R_VALUE_BITS);
        let entries = (0..1u32 << key_bits)
            .map(|r| (r > min_r).then(|| (1u32 << INV_R_SHIFT) / r))
            .collect();
        Self::from_entries("TC_invr", key_bits, INV_R_VALUE_BITS, entries)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key_bits(&self) -> u32 {
        self.key_bits
    }

    pub fn value_bits(&self) -> u32 {
        self.value_bits
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn valid_entries(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    /// Entry for `key`; `None` means no valid projection from that bin.
    pub fn lookup(&self, key: u32) -> Result<Option<u32>, TrackletError> {
        if key >> self.key_bits != 0 {
            return Err(TrackletError::LutKeyOutOfRange {
                table: self.name.clone(),
                key,
                key_bits: self.key_bits,
            });
        }
        Ok(self.entries[key as usize])
    }

    /// Decoded projection window for `key`.
    pub fn window(&self, key: u32) -> Result<Option<ProjectionWindow>, TrackletError> {
        Ok(self.lookup(key)?.map(ProjectionWindow::decode))
    }
}

/// Fine-bin key of a first-layer stub: the top `nz` bits of the offset z
/// word followed by the top `nr` bits of the offset r word.
pub fn lut_key(settings: &Settings, stub: &Stub) -> Result<u32, TrackletError> {
    let (nz, nr) = settings.lut_bits(stub.layer_disk());
    let (z, r) = (stub.z(), stub.r());
    if z.nbits() < nz {
        return Err(TrackletError::WidthMismatch {
            field: format!("{} z", stub.layer_disk()),
            expected: nz,
            found: z.nbits(),
        });
    }
    if r.nbits() < nr {
        return Err(TrackletError::WidthMismatch {
            field: format!("{} r", stub.layer_disk()),
            expected: nr,
            found: r.nbits(),
        });
    }
    let indexz = z.offset_unsigned() >> (z.nbits() - nz);
    let indexr = r.offset_unsigned() >> (r.nbits() - nr);
    Ok(indexz << nr | indexr)
}

/// The projection tables of one seed, shared between sector instances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedTables {
    pub seed: Seed,
    pub inner: TrackletLut,
    pub inner_third: TrackletLut,
}

impl SeedTables {
    pub fn build(settings: &Settings, seed: Seed) -> Result<Self, TrackletError> {
        Ok(Self {
            seed,
            inner: TrackletLut::projection(settings, seed, ProjectionTarget::Outer)?,
            inner_third: TrackletLut::projection(settings, seed, ProjectionTarget::Third)?,
        })
    }
}

/// Physical (z, r) extent in cm of the stubs sharing a fine-bin key.
/// Disk extents are given on the positive side.
fn source_extent(settings: &Settings, source: LayerDisk, indexz: u32, indexr: u32) -> ((f64, f64), (f64, f64)) {
    let (nz, nr) = settings.lut_bits(source);
    let (r_bits, r_signed, z_bits, _) = settings.stub_widths(source);

    let z_step = 1i64 << (z_bits - nz);
    let z_lo = (indexz as i64) * z_step - (1i64 << (z_bits - 1));
    let r_step = 1i64 << (r_bits - nr);
    let r_lo = (indexr as i64) * r_step - if r_signed { 1i64 << (r_bits - 1) } else { 0 };

    let (z_offset, r_offset) = if source.is_barrel() {
        (0, settings.barrel_radius_int(source) as i64)
    } else {
        (settings.disk_z_int(source) as i64, 0)
    };
    let z = ((z_offset + z_lo) as f64 * settings.kz, (z_offset + z_lo + z_step) as f64 * settings.kz);
    let r = ((r_offset + r_lo) as f64 * settings.kr, (r_offset + r_lo + r_step) as f64 * settings.kr);
    (z, r)
}

/// Fine positions in `destination` reached by straight r-z lines from the
/// beamline (`|z0| <= z0_max`) through the corners of a source bin.
fn reachable_fine_range(
    settings: &Settings,
    destination: LayerDisk,
    z_range: (f64, f64),
    r_range: (f64, f64),
) -> Option<(u32, u32)> {
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;

    for z0 in [-settings.z0_max, settings.z0_max] {
        for z in [z_range.0, z_range.1] {
            for r in [r_range.0, r_range.1] {
                if r <= 0.0 {
                    continue;
                }
                let coordinate = if let Some(layer) = destination.layer_index() {
                    let radius = settings.barrel_radii[layer];
                    z0 + (z - z0) * radius / r
                } else {
                    let dz = z - z0;
                    if dz == 0.0 {
                        continue;
                    }
                    let disk_z = settings.disk_z[destination.disk_index().unwrap_or(0)];
                    let target_z = if dz > 0.0 { disk_z } else { -disk_z };
                    r * (target_z - z0) / dz
                };
                let position = settings.fine_rz_position(destination, coordinate);
                lo = lo.min(position);
                hi = hi.max(position);
            }
        }
    }

    let top = (NUM_FINE_RZ - 1) as f64;
    if !lo.is_finite() || hi < 0.0 || lo >= NUM_FINE_RZ as f64 {
        return None;
    }
    Some((lo.floor().clamp(0.0, top) as u32, hi.floor().clamp(0.0, top) as u32))
}
