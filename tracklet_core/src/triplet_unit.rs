//! Candidate pairs and the triplet engine units that consume them.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::TrackletError;
use crate::geometry::Seed;
use crate::lut::ProjectionWindow;
use crate::memory::{MemoryRegistry, StubRef, VmMemoryId};
use crate::settings::Settings;
use crate::stub::Stub;
use crate::tracklet::Triplet;

/// A first/second stub pair waiting for a third-layer match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrpEData {
    pub inner: StubRef,
    pub outer: StubRef,
    /// Inner phi at `first_phi_bits`
    pub first_phi: i32,
    /// Outer phi at `second_phi_bits`
    pub second_phi: i32,
    /// Predicted third-layer phi region at `third_phi_bits`
    pub third_phi: i32,
    pub third_window: ProjectionWindow,
    /// Required side of a disk third stub
    pub third_negative_z: bool,
}

impl TrpEData {
    /// Coarse phi compatibility of an inner/outer pair at reduced resolution.
    pub fn phi_compatible(settings: &Settings, first_phi: i32, second_phi: i32) -> bool {
        let shift = settings.first_phi_bits as i32 - settings.second_phi_bits as i32;
        let second = if shift >= 0 {
            second_phi << shift
        } else {
            second_phi >> -shift
        };
        2 * (first_phi - second).unsigned_abs() <= settings.phi_window
    }

    /// Third-layer phi predicted by straight-line extrapolation in r through
    /// the pair, reduced to `third_phi_bits`. `None` when the extrapolation is
    /// undefined or leaves the phi word.
    pub fn predict_third_phi(settings: &Settings, seed: Seed, inner: &Stub, outer: &Stub) -> Option<i32> {
        let (r1, r2) = (inner.r_abs(settings) as i64, outer.r_abs(settings) as i64);
        let (p1, p2) = (inner.phi().value() as i64, outer.phi().value() as i64);
        if r1 == r2 {
            return None;
        }

        let third = seed.third();
        let r3 = if third.is_barrel() {
            settings.barrel_radius_int(third) as i64
        } else {
            let (z1, z2) = (inner.z_abs(settings) as i64, outer.z_abs(settings) as i64);
            if z1 == z2 {
                return None;
            }
            let disk_z = settings.disk_z_int(third) as i64;
            let z3 = if z2 < 0 { -disk_z } else { disk_z };
            r1 + (z3 - z1) * (r2 - r1) / (z2 - z1)
        };

        let predicted = p1 + (p2 - p1) * (r3 - r1) / (r2 - r1);
        if predicted < 0 || predicted >> settings.nbits_phi != 0 {
            return None;
        }
        Some((predicted >> (settings.nbits_phi - settings.third_phi_bits)) as i32)
    }
}

/// One replicated triplet engine.
///
/// Units carry no state between candidates beyond their counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TripletEngineUnit {
    index: usize,
    processed: u64,
    emitted: u64,
}

impl TripletEngineUnit {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            ..Default::default()
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Pairs consumed since construction.
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Triplets emitted since construction.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Searches the third-layer memories for stubs completing `pair`.
    ///
    /// Memories are scanned in binding order, then bins in ascending order,
    /// then stubs in storage order.
    pub fn step(
        &mut self,
        pair: &TrpEData,
        registry: &MemoryRegistry,
        third_memories: &[VmMemoryId],
        settings: &Settings,
    ) -> Result<Vec<Triplet>, TrackletError> {
        self.processed += 1;
        let mut triplets = Vec::new();

        for &id in third_memories {
            let memory = registry.vm_stubs(id)?;
            for bin in pair.third_window.bins() {
                for entry in memory.bin(bin) {
                    if !pair.third_window.accepts(bin, entry.fine_rz) {
                        continue;
                    }
                    let stub = registry.stub(entry.stub)?;
                    if stub.layer_disk().is_disk() && stub.negative_z() != pair.third_negative_z {
                        continue;
                    }
                    let phi = stub.phi_reduced(settings.third_phi_bits);
                    if (phi - pair.third_phi).abs() > 1 {
                        continue;
                    }
                    trace!(unit = self.index, third = entry.stub.index, "Third stub matched");
                    triplets.push(Triplet {
                        inner: pair.inner,
                        outer: pair.outer,
                        third: entry.stub,
                    });
                }
            }
        }

        self.emitted += triplets.len() as u64;
        Ok(triplets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::LayerDisk;

    struct Fixture {
        settings: Settings,
        registry: MemoryRegistry,
        pair: TrpEData,
        third_vm: VmMemoryId,
    }

    fn fixture(third_phis: &[i64]) -> Fixture {
        let settings = Settings::default();
        let mut registry = MemoryRegistry::new();
        let inner_mem = registry.add_all_stubs("AS_L3PHIA", LayerDisk::L3);
        let outer_mem = registry.add_all_stubs("AS_L4PHIA", LayerDisk::L4);
        let third_mem = registry.add_all_stubs("AS_L2PHIA", LayerDisk::L2);
        let third_vm = registry.add_vm_stubs("VMSTE_L2PHIA1", LayerDisk::L2, 16);

        let inner = Stub::barrel(&settings, LayerDisk::L3, 1000, 0, 166).unwrap();
        let outer = Stub::barrel(&settings, LayerDisk::L4, 1002, 0, 220).unwrap();
        let inner_ref = registry.push_stub(inner_mem, inner).unwrap();
        let outer_ref = registry.push_stub(outer_mem, outer).unwrap();
        for &phi in third_phis {
            let stub = Stub::barrel(&settings, LayerDisk::L2, phi, 0, 118).unwrap();
            let stub_ref = registry.push_stub(third_mem, stub).unwrap();
            registry
                .vm_stubs_mut(third_vm)
                .unwrap()
                .add_stub(&settings, stub_ref, &stub)
                .unwrap();
        }

        let third_phi = TrpEData::predict_third_phi(&settings, Seed::L3L4L2, &inner, &outer).unwrap();
        let pair = TrpEData {
            inner: inner_ref,
            outer: outer_ref,
            first_phi: inner.phi_reduced(settings.first_phi_bits),
            second_phi: outer.phi_reduced(settings.second_phi_bits),
            third_phi,
            third_window: ProjectionWindow::from_fine_range(32, 35),
            third_negative_z: false,
        };
        Fixture {
            settings,
            registry,
            pair,
            third_vm,
        }
    }

    #[test]
    fn test_prediction_between_layers() {
        let settings = Settings::default();
        let inner = Stub::barrel(&settings, LayerDisk::L3, 100, 0, 166).unwrap();
        let outer = Stub::barrel(&settings, LayerDisk::L4, 102, 0, 220).unwrap();
        // 100 + 2 * (1184 - 1664) / 531 truncates to 99
        let region = TrpEData::predict_third_phi(&settings, Seed::L3L4L2, &inner, &outer).unwrap();
        assert_eq!(region, 99 >> 7);
    }

    #[test]
    fn test_prediction_leaving_phi_word_is_undefined() {
        let settings = Settings::default();
        let inner = Stub::barrel(&settings, LayerDisk::L3, 10, 0, 0).unwrap();
        let outer = Stub::barrel(&settings, LayerDisk::L4, 600, 0, 0).unwrap();
        assert_eq!(TrpEData::predict_third_phi(&settings, Seed::L3L4L2, &inner, &outer), None);
    }

    #[test]
    fn test_coarse_phi_window() {
        let settings = Settings::default();
        assert!(TrpEData::phi_compatible(&settings, 10, 14));
        assert!(TrpEData::phi_compatible(&settings, 14, 10));
        assert!(!TrpEData::phi_compatible(&settings, 10, 15));
    }

    #[test]
    fn test_step_emits_one_triplet_per_match() {
        let mut f = fixture(&[1000, 1001, 5000]);
        let mut unit = TripletEngineUnit::new(2);
        let triplets = unit
            .step(&f.pair, &f.registry, &[f.third_vm], &f.settings)
            .unwrap();
        assert_eq!(triplets.len(), 2);
        assert_eq!(triplets[0].third.index, 0);
        assert_eq!(triplets[1].third.index, 1);
        assert_eq!(unit.processed(), 1);
        assert_eq!(unit.emitted(), 2);

        f.pair.third_window = ProjectionWindow::from_fine_range(40, 44);
        let triplets = unit
            .step(&f.pair, &f.registry, &[f.third_vm], &f.settings)
            .unwrap();
        assert!(triplets.is_empty());
        assert_eq!(unit.processed(), 2);
    }

    #[test]
    fn test_step_with_no_third_stub() {
        let f = fixture(&[]);
        let mut unit = TripletEngineUnit::new(0);
        let triplets = unit
            .step(&f.pair, &f.registry, &[f.third_vm], &f.settings)
            .unwrap();
        assert!(triplets.is_empty());
    }
}
