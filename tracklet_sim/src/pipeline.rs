//! One processor with its memories, for one seed and sector.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use tracklet_core::{
    LayerDisk, MemoryRegistry, ParamMemoryId, ProcessorStats, ProjMemoryId, Seed, SeedTables,
    Settings, StubMemoryId, Tracklet, TrackletProcessorDisplaced, TrackletProjection, VmMemoryId,
};

use crate::error::SimError;
use crate::generator::GeneratedStub;

/// Memories feeding one layer/disk of the seed.
#[derive(Debug, Clone, Copy)]
struct LayerInput {
    layer_disk: LayerDisk,
    all: StubMemoryId,
    vm: Option<VmMemoryId>,
}

/// Outputs and counters of one sector for one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorOutput {
    pub seed: Seed,
    pub sector: u32,
    pub tracklets: Vec<Tracklet>,
    pub projections: Vec<TrackletProjection>,
    /// Stubs lost to full VM bins while loading
    pub dropped_vm_stubs: usize,
    pub stats: ProcessorStats,
}

/// Registry and wiring around a [`TrackletProcessorDisplaced`].
pub struct SectorPipeline {
    settings: Arc<Settings>,
    seed: Seed,
    sector: u32,
    registry: MemoryRegistry,
    processor: TrackletProcessorDisplaced,
    inputs: [LayerInput; 3],
    trackpar: ParamMemoryId,
    projections: Vec<ProjMemoryId>,
    dropped_vm_stubs: usize,
}

impl SectorPipeline {
    pub fn new(
        settings: Arc<Settings>,
        tables: Arc<SeedTables>,
        sector: u32,
    ) -> Result<Self, SimError> {
        let seed = tables.seed;
        let region = format!("{}PHIA", seed);
        let mut registry = MemoryRegistry::new();

        let layers = [seed.first(), seed.second(), seed.third()];
        let mut inputs = layers.map(|layer_disk| LayerInput {
            layer_disk,
            all: registry.add_all_stubs(format!("AS_{}PHIA_{}", layer_disk, seed), layer_disk),
            vm: None,
        });
        for input in &mut inputs[1..] {
            input.vm = Some(registry.add_vm_stubs(
                format!("VMSTE_{}PHIA_{}", input.layer_disk, seed),
                input.layer_disk,
                settings.max_vm_stubs_per_bin,
            ));
        }
        let trackpar = registry.add_parameters(format!("TPAR_{}", region), settings.max_tracklets);

        let mut processor =
            TrackletProcessorDisplaced::with_tables(&format!("TPD_{}A", seed), settings.clone(), tables)?;
        processor.add_input(&registry, inputs[0].all, "firstallstubin")?;
        if let Some(vm) = inputs[1].vm {
            processor.add_input(&registry, vm, "secondvmstubin")?;
        }
        if let Some(vm) = inputs[2].vm {
            processor.add_input(&registry, vm, "thirdvmstubin")?;
        }
        processor.add_output(&registry, trackpar, "trackpar")?;

        let mut projections = Vec::new();
        for &target in seed.projection_targets() {
            let memory = registry.add_projections(
                format!("TPROJ_{}_{}PHIA", region, target),
                target,
                settings.max_projections,
            );
            processor.add_output(&registry, memory, &format!("projout{}PHIA", target))?;
            projections.push(memory);
        }

        debug!(seed = %seed, sector, targets = projections.len(), "Wired sector pipeline");

        Ok(Self {
            settings,
            seed,
            sector,
            registry,
            processor,
            inputs,
            trackpar,
            projections,
            dropped_vm_stubs: 0,
        })
    }

    pub fn seed(&self) -> Seed {
        self.seed
    }

    pub fn sector(&self) -> u32 {
        self.sector
    }

    pub fn processor(&self) -> &TrackletProcessorDisplaced {
        &self.processor
    }

    /// Empties all memories and loads this sector's stubs of the seed's
    /// three layers/disks. Other stubs are ignored.
    pub fn load<'a>(&mut self, stubs: impl IntoIterator<Item = &'a GeneratedStub>) -> Result<(), SimError> {
        self.registry.clear_event();
        self.dropped_vm_stubs = 0;

        for generated in stubs {
            if generated.sector != self.sector {
                continue;
            }
            let layer_disk = generated.stub.layer_disk();
            for input in &self.inputs {
                if input.layer_disk != layer_disk {
                    continue;
                }
                let stub_ref = self.registry.push_stub(input.all, generated.stub)?;
                if let Some(vm) = input.vm {
                    let kept = self
                        .registry
                        .vm_stubs_mut(vm)?
                        .add_stub(&self.settings, stub_ref, &generated.stub)?;
                    if !kept {
                        self.dropped_vm_stubs += 1;
                    }
                }
            }
        }
        Ok(())
    }

    /// Runs the processor over the whole sector and snapshots its outputs.
    pub fn run(&mut self) -> Result<SectorOutput, SimError> {
        let (phimin, phimax) = self.settings.sector_phi_range(self.sector);
        self.processor
            .execute(&mut self.registry, self.sector, phimin, phimax)?;

        let tracklets = self.registry.parameters(self.trackpar)?.tracklets().to_vec();
        let mut projections = Vec::new();
        for &memory in &self.projections {
            projections.extend_from_slice(self.registry.projections(memory)?.projections());
        }

        Ok(SectorOutput {
            seed: self.seed,
            sector: self.sector,
            tracklets,
            projections,
            dropped_vm_stubs: self.dropped_vm_stubs,
            stats: self.processor.last_run().clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracklet_core::Stub;

    fn pipeline(seed: Seed) -> SectorPipeline {
        let settings = Arc::new(Settings::default());
        let tables = Arc::new(SeedTables::build(&settings, seed).unwrap());
        SectorPipeline::new(settings, tables, 0).unwrap()
    }

    fn barrel(settings: &Settings, layer: LayerDisk, phi: i64, z: i64, particle: usize) -> GeneratedStub {
        GeneratedStub {
            sector: 0,
            stub: Stub::barrel(settings, layer, phi, 0, z).unwrap(),
            particle: Some(particle),
        }
    }

    #[test]
    fn test_wires_every_projection_target() {
        for seed in Seed::ALL {
            let pipeline = pipeline(seed);
            assert_eq!(
                pipeline.processor().projection_outputs().len(),
                seed.projection_targets().len()
            );
        }
    }

    #[test]
    fn test_loads_only_seed_layers_of_own_sector() {
        let mut pipeline = pipeline(Seed::L3L4L2);
        let settings = Settings::default();
        let stubs = vec![
            barrel(&settings, LayerDisk::L3, 100, 166, 0),
            barrel(&settings, LayerDisk::L4, 102, 220, 0),
            barrel(&settings, LayerDisk::L2, 99, 118, 0),
            // Other layers and sectors are ignored
            barrel(&settings, LayerDisk::L1, 100, 0, 0),
            GeneratedStub {
                sector: 3,
                ..barrel(&settings, LayerDisk::L3, 100, 166, 1)
            },
        ];
        pipeline.load(&stubs).unwrap();
        let output = pipeline.run().unwrap();

        assert_eq!(output.stats.candidate_pairs, 1);
        assert_eq!(output.tracklets.len(), 1);
        assert_eq!(output.projections.len() as u64, output.stats.projections);
    }

    #[test]
    fn test_load_clears_previous_event() {
        let mut pipeline = pipeline(Seed::L3L4L2);
        let settings = Settings::default();
        let stubs = vec![barrel(&settings, LayerDisk::L3, 1000, 0, 0)];
        pipeline.load(&stubs).unwrap();
        pipeline.load(&stubs).unwrap();
        let output = pipeline.run().unwrap();
        assert_eq!(output.stats.first_stubs, 1);
        assert!(output.tracklets.is_empty());
    }
}
