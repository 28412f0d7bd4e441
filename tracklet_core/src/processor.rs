//! The displaced tracklet processor.
//!
//! Combines pair finding, triplet finding and parameter calculation for one
//! displaced seed in one phi region. Each `execute` call scans the first
//! layer into compatible first/second pairs, streams them through a bounded
//! buffer into a fixed pool of triplet engine units for at most `max_step`
//! cycles, and writes tracklets and projections to the bound output memories.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::calculator::{Calculation, DisplacedCalculator, ParameterCalculator};
use crate::circular_buffer::CircularBuffer;
use crate::error::TrackletError;
use crate::geometry::{LayerDisk, Seed};
use crate::lut::{lut_key, ProjectionWindow, SeedTables};
use crate::memory::{
    MemoryHandle, MemoryRegistry, ParamMemoryId, ProjMemoryId, StubMemoryId, StubRef, VmMemoryId,
};
use crate::settings::{PhiWindow, Settings};
use crate::stub::Stub;
use crate::tracklet::{Tracklet, TrackletProjection, Triplet};
use crate::triplet_unit::{TripletEngineUnit, TrpEData};

pub const INPUT_FIRST_ALLSTUBS: &str = "firstallstubin";
pub const INPUT_SECOND_VMSTUBS: &str = "secondvmstubin";
pub const INPUT_THIRD_VMSTUBS: &str = "thirdvmstubin";
pub const OUTPUT_TRACKPAR: &str = "trackpar";
pub const OUTPUT_PROJECTION_PREFIX: &str = "projout";

const NAME_PREFIX: &str = "TPD_";
const MAX_REGIONS: u32 = 16;

/// Phase of an `execute` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    Idle,
    /// Scanner topping up the pair buffer
    Scanning,
    /// Buffer loaded for the next cycle
    Buffered,
    /// Units popping pairs
    Dispatching,
    Done,
}

/// Occupancy and inefficiency counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorStats {
    pub executions: u64,
    /// First-layer stubs inside the phi window
    pub first_stubs: u64,
    /// Pairs passing every scanning test
    pub candidate_pairs: u64,
    /// Pairs overwritten in a full buffer. The scanner stalls instead of
    /// pushing into a full buffer, so this stays zero.
    pub dropped_pairs: u64,
    /// Pairs buffered or still in the scanner when the cycle budget ran out
    pub unconsumed_pairs: u64,
    pub processed_pairs: u64,
    pub pairs_without_triplet: u64,
    pub triplets: u64,
    pub rejected_triplets: u64,
    pub tracklets: u64,
    /// Tracklets lost to a full parameter memory
    pub dropped_tracklets: u64,
    pub projections: u64,
    /// Projections lost to a full projection memory
    pub dropped_projections: u64,
    /// Dispatch cycles used
    pub cycles: u64,
}

impl ProcessorStats {
    /// Candidates lost to finite resources or without a third stub.
    pub fn inefficiencies(&self) -> u64 {
        self.dropped_pairs
            + self.unconsumed_pairs
            + self.pairs_without_triplet
            + self.dropped_tracklets
            + self.dropped_projections
    }

    pub fn accumulate(&mut self, other: &ProcessorStats) {
        self.executions += other.executions;
        self.first_stubs += other.first_stubs;
        self.candidate_pairs += other.candidate_pairs;
        self.dropped_pairs += other.dropped_pairs;
        self.unconsumed_pairs += other.unconsumed_pairs;
        self.processed_pairs += other.processed_pairs;
        self.pairs_without_triplet += other.pairs_without_triplet;
        self.triplets += other.triplets;
        self.rejected_triplets += other.rejected_triplets;
        self.tracklets += other.tracklets;
        self.dropped_tracklets += other.dropped_tracklets;
        self.projections += other.projections;
        self.dropped_projections += other.dropped_projections;
        self.cycles += other.cycles;
    }
}

/// Displaced tracklet processor for one seed and phi region.
#[derive(Debug)]
pub struct TrackletProcessorDisplaced<C = DisplacedCalculator> {
    name: String,
    seed: Seed,
    region: u32,
    tc_index: u32,
    settings: Arc<Settings>,
    tables: Arc<SeedTables>,
    calculator: C,

    buffer: CircularBuffer<TrpEData>,
    units: Box<[TripletEngineUnit]>,

    first_stubs: Vec<StubMemoryId>,
    second_vm: Vec<VmMemoryId>,
    third_vm: Vec<VmMemoryId>,
    trackpar: Option<ParamMemoryId>,
    projection_outputs: BTreeMap<LayerDisk, ProjMemoryId>,

    state: PipelineState,
    stats: ProcessorStats,
    last_run: ProcessorStats,
}

impl TrackletProcessorDisplaced {
    /// Creates a processor from a name of the form `TPD_<seed><region>`,
    /// e.g. `TPD_L3L4L2A`, building the seed's tables.
    pub fn new(name: &str, settings: Arc<Settings>) -> Result<Self, TrackletError> {
        settings.validate()?;
        let (seed, _) = parse_name(name)?;
        let tables = Arc::new(SeedTables::build(&settings, seed)?);
        Self::with_tables(name, settings, tables)
    }

    /// Creates a processor sharing pre-built tables.
    pub fn with_tables(
        name: &str,
        settings: Arc<Settings>,
        tables: Arc<SeedTables>,
    ) -> Result<Self, TrackletError> {
        settings.validate()?;
        let (seed, region) = parse_name(name)?;
        if tables.seed != seed {
            return Err(TrackletError::config(format!(
                "{}: tables built for {}",
                name, tables.seed
            )));
        }
        let calculator = DisplacedCalculator::new(settings.clone())?;
        let buffer = CircularBuffer::new(settings.buffer_capacity)?;
        let units = (0..settings.num_units).map(TripletEngineUnit::new).collect();

        debug!(
            processor = name,
            seed = %seed,
            region,
            units = settings.num_units,
            buffer = settings.buffer_capacity,
            "Created displaced tracklet processor"
        );

        Ok(Self {
            name: name.to_string(),
            seed,
            region,
            tc_index: seed.index() << 4 | region,
            settings,
            tables,
            calculator,
            buffer,
            units,
            first_stubs: Vec::new(),
            second_vm: Vec::new(),
            third_vm: Vec::new(),
            trackpar: None,
            projection_outputs: BTreeMap::new(),
            state: PipelineState::Idle,
            stats: ProcessorStats::default(),
            last_run: ProcessorStats::default(),
        })
    }
}

impl<C: ParameterCalculator> TrackletProcessorDisplaced<C> {
    /// Replaces the parameter calculator, keeping all wiring.
    pub fn with_calculator<D: ParameterCalculator>(self, calculator: D) -> TrackletProcessorDisplaced<D> {
        TrackletProcessorDisplaced {
            name: self.name,
            seed: self.seed,
            region: self.region,
            tc_index: self.tc_index,
            settings: self.settings,
            tables: self.tables,
            calculator,
            buffer: self.buffer,
            units: self.units,
            first_stubs: self.first_stubs,
            second_vm: self.second_vm,
            third_vm: self.third_vm,
            trackpar: self.trackpar,
            projection_outputs: self.projection_outputs,
            state: self.state,
            stats: self.stats,
            last_run: self.last_run,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn seed(&self) -> Seed {
        self.seed
    }

    pub fn region(&self) -> u32 {
        self.region
    }

    pub fn tc_index(&self) -> u32 {
        self.tc_index
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn tables(&self) -> &Arc<SeedTables> {
        &self.tables
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn units(&self) -> &[TripletEngineUnit] {
        &self.units
    }

    /// Counters accumulated since construction or the last `reset_stats`.
    pub fn stats(&self) -> &ProcessorStats {
        &self.stats
    }

    /// Counters of the most recent `execute` call.
    pub fn last_run(&self) -> &ProcessorStats {
        &self.last_run
    }

    pub fn reset_stats(&mut self) {
        self.stats = ProcessorStats::default();
        self.last_run = ProcessorStats::default();
    }

    /// Projection outputs by target, in layer/disk order.
    pub fn projection_outputs(&self) -> &BTreeMap<LayerDisk, ProjMemoryId> {
        &self.projection_outputs
    }

    // ========================================================================
    // WIRING
    // ========================================================================

    /// Binds an input memory to `firstallstubin`, `secondvmstubin` or
    /// `thirdvmstubin`. Several memories may share a label.
    pub fn add_input(
        &mut self,
        registry: &MemoryRegistry,
        memory: impl Into<MemoryHandle>,
        label: &str,
    ) -> Result<(), TrackletError> {
        let handle = memory.into();
        let memory_name = registry.name_of(handle)?.to_string();

        match label {
            INPUT_FIRST_ALLSTUBS => {
                let MemoryHandle::AllStubs(id) = handle else {
                    return Err(self.mismatch(label, &memory_name, format!("{} memory", handle.kind())));
                };
                let memory = registry.all_stubs(id)?;
                self.check_layer(label, &memory_name, memory.layer_disk(), self.seed.first())?;
                self.check_widths(memory.stubs())?;
                if self.first_stubs.contains(&id) {
                    return Err(self.already_bound(label, &memory_name));
                }
                self.first_stubs.push(id);
            }
            INPUT_SECOND_VMSTUBS | INPUT_THIRD_VMSTUBS => {
                let MemoryHandle::VmStubs(id) = handle else {
                    return Err(self.mismatch(label, &memory_name, format!("{} memory", handle.kind())));
                };
                let expected = if label == INPUT_SECOND_VMSTUBS {
                    self.seed.second()
                } else {
                    self.seed.third()
                };
                let memory = registry.vm_stubs(id)?;
                self.check_layer(label, &memory_name, memory.layer_disk(), expected)?;
                if self.second_vm.contains(&id) || self.third_vm.contains(&id) {
                    return Err(self.already_bound(label, &memory_name));
                }
                if label == INPUT_SECOND_VMSTUBS {
                    self.second_vm.push(id);
                } else {
                    self.third_vm.push(id);
                }
            }
            _ => {
                return Err(TrackletError::UnknownInput {
                    processor: self.name.clone(),
                    label: label.to_string(),
                })
            }
        }

        debug!(processor = %self.name, label, memory = %memory_name, "Bound input");
        Ok(())
    }

    /// Binds `trackpar` or a `projout<LD>` output (e.g. `projoutL1`,
    /// `projoutD2PHIA`).
    pub fn add_output(
        &mut self,
        registry: &MemoryRegistry,
        memory: impl Into<MemoryHandle>,
        label: &str,
    ) -> Result<(), TrackletError> {
        let handle = memory.into();
        let memory_name = registry.name_of(handle)?.to_string();

        if label == OUTPUT_TRACKPAR {
            let MemoryHandle::Parameters(id) = handle else {
                return Err(self.mismatch(label, &memory_name, format!("{} memory", handle.kind())));
            };
            if self.trackpar.is_some() {
                return Err(self.already_bound(label, &memory_name));
            }
            self.trackpar = Some(id);
            debug!(processor = %self.name, label, memory = %memory_name, "Bound output");
            return Ok(());
        }

        let target = label
            .strip_prefix(OUTPUT_PROJECTION_PREFIX)
            .and_then(|rest| rest.get(..2))
            .and_then(|ld| ld.parse::<LayerDisk>().ok())
            .ok_or_else(|| TrackletError::UnknownOutput {
                processor: self.name.clone(),
                label: label.to_string(),
            })?;
        let MemoryHandle::Projections(id) = handle else {
            return Err(self.mismatch(label, &memory_name, format!("{} memory", handle.kind())));
        };
        self.add_output_projection(registry, target, id)
    }

    /// Wires the projection memory for one downstream layer/disk.
    pub fn add_output_projection(
        &mut self,
        registry: &MemoryRegistry,
        target: LayerDisk,
        memory: ProjMemoryId,
    ) -> Result<(), TrackletError> {
        let label = format!("{}{}", OUTPUT_PROJECTION_PREFIX, target);
        if !self.seed.projects_to(target) {
            return Err(TrackletError::UnknownOutput {
                processor: self.name.clone(),
                label,
            });
        }
        let projections = registry.projections(memory)?;
        let memory_name = projections.name().to_string();
        self.check_layer(&label, &memory_name, projections.target(), target)?;
        if self.projection_outputs.contains_key(&target) {
            return Err(self.already_bound(&label, &memory_name));
        }
        self.projection_outputs.insert(target, memory);
        debug!(processor = %self.name, label = %label, memory = %memory_name, "Bound output");
        Ok(())
    }

    // ========================================================================
    // EXECUTION
    // ========================================================================

    /// Processes one sector and phi window, appending to the output memories.
    ///
    /// Each cycle the scanner tops up the pair buffer and stalls while it is
    /// full, then every unit pops one pair in index order. Pairs still in
    /// the buffer or the scanner after `max_step` cycles are counted as
    /// unconsumed.
    ///
    /// On error the state returns to `Idle` and the counters gathered so far
    /// are still recorded. Tracklets and projections committed in earlier
    /// cycles stay in the output memories.
    pub fn execute(
        &mut self,
        registry: &mut MemoryRegistry,
        sector: u32,
        phimin: f64,
        phimax: f64,
    ) -> Result<(), TrackletError> {
        let trackpar = self.trackpar.ok_or_else(|| TrackletError::MissingOutput {
            processor: self.name.clone(),
            label: OUTPUT_TRACKPAR.to_string(),
        })?;
        let window = self.settings.phi_window(sector, phimin, phimax)?;

        let mut run = ProcessorStats {
            executions: 1,
            ..Default::default()
        };
        self.buffer.clear();
        let outcome = self.run_cycles(registry, sector, window, trackpar, &mut run);
        self.buffer.clear();

        match &outcome {
            Ok(()) => {
                self.enter(PipelineState::Done);
                debug!(
                    processor = %self.name,
                    sector,
                    pairs = run.candidate_pairs,
                    unconsumed = run.unconsumed_pairs,
                    triplets = run.triplets,
                    tracklets = run.tracklets,
                    cycles = run.cycles,
                    "Execute finished"
                );
            }
            Err(err) => {
                self.enter(PipelineState::Idle);
                warn!(processor = %self.name, sector, cycles = run.cycles, %err, "Execute aborted");
            }
        }
        self.stats.accumulate(&run);
        self.last_run = run;
        outcome
    }

    fn enter(&mut self, state: PipelineState) {
        trace!(processor = %self.name, from = ?self.state, to = ?state, "State transition");
        self.state = state;
    }

    fn run_cycles(
        &mut self,
        registry: &mut MemoryRegistry,
        sector: u32,
        window: PhiWindow,
        trackpar: ParamMemoryId,
        run: &mut ProcessorStats,
    ) -> Result<(), TrackletError> {
        let mut cursor = ScanCursor::default();
        while run.cycles < self.settings.max_step as u64 {
            self.enter(PipelineState::Scanning);
            self.fill(registry, window, &mut cursor, run)?;
            if self.buffer.is_empty() {
                break;
            }
            self.enter(PipelineState::Buffered);
            self.enter(PipelineState::Dispatching);
            run.cycles += 1;
            self.dispatch(registry, sector, window, trackpar, run)?;
        }

        // Count the pairs the budget never reached.
        while self.stage_next(registry, window, &mut cursor, run)? {}
        run.unconsumed_pairs = (cursor.staged.len() + self.buffer.len()) as u64;
        run.dropped_pairs = self.buffer.overflows();
        Ok(())
    }

    /// Moves pairs from the scanner into the buffer until it is full or the
    /// first-layer memories are exhausted.
    fn fill(
        &mut self,
        registry: &MemoryRegistry,
        window: PhiWindow,
        cursor: &mut ScanCursor,
        run: &mut ProcessorStats,
    ) -> Result<(), TrackletError> {
        while !self.buffer.is_full() {
            if let Some(pair) = cursor.staged.pop_front() {
                self.buffer.push(pair);
            } else if !self.stage_next(registry, window, cursor, run)? {
                break;
            }
        }
        if self.buffer.is_full() && !cursor.staged.is_empty() {
            trace!(processor = %self.name, waiting = cursor.staged.len(), "Buffer full, scanner stalled");
        }
        Ok(())
    }

    /// Advances the cursor by one first-layer stub and stages its candidate
    /// pairs. Returns `false` once every first-layer memory is exhausted.
    fn stage_next(
        &self,
        registry: &MemoryRegistry,
        window: PhiWindow,
        cursor: &mut ScanCursor,
        run: &mut ProcessorStats,
    ) -> Result<bool, TrackletError> {
        let settings = &*self.settings;
        let seed = self.seed;

        let (memory_id, index, inner) = loop {
            let Some(&memory_id) = self.first_stubs.get(cursor.memory) else {
                return Ok(false);
            };
            let stubs = registry.all_stubs(memory_id)?.stubs();
            let Some(inner) = stubs.get(cursor.index) else {
                cursor.memory += 1;
                cursor.index = 0;
                continue;
            };
            cursor.index += 1;
            if window.contains(inner.phi().value() as i64) {
                break (memory_id, cursor.index - 1, inner);
            }
        };
        run.first_stubs += 1;

        let key = lut_key(settings, inner)?;
        let (Some(outer_window), Some(third_window)) =
            (self.tables.inner.window(key)?, self.tables.inner_third.window(key)?)
        else {
            trace!(processor = %self.name, index, key, "No projection from first stub");
            return Ok(true);
        };
        let negative = inner.negative_z();
        let outer_window = oriented(outer_window, seed.first(), seed.second(), negative);
        let third_window = oriented(third_window, seed.first(), seed.third(), negative);
        let first_phi = inner.phi_reduced(settings.first_phi_bits);
        let inner_ref = StubRef {
            memory: memory_id,
            index,
        };

        for &vm_id in &self.second_vm {
            let vm = registry.vm_stubs(vm_id)?;
            for bin in outer_window.bins() {
                for entry in vm.bin(bin) {
                    if !outer_window.accepts(bin, entry.fine_rz) {
                        continue;
                    }
                    let outer = registry.stub(entry.stub)?;
                    if seed.second().is_disk() && outer.negative_z() != negative {
                        continue;
                    }
                    let second_phi = outer.phi_reduced(settings.second_phi_bits);
                    if !TrpEData::phi_compatible(settings, first_phi, second_phi) {
                        continue;
                    }
                    let Some(third_phi) = TrpEData::predict_third_phi(settings, seed, inner, outer) else {
                        trace!(processor = %self.name, "Third phi undefined for pair");
                        continue;
                    };

                    run.candidate_pairs += 1;
                    cursor.staged.push_back(TrpEData {
                        inner: inner_ref,
                        outer: entry.stub,
                        first_phi,
                        second_phi,
                        third_phi,
                        third_window,
                        third_negative_z: third_side(settings, seed, inner, outer),
                    });
                }
            }
        }
        Ok(true)
    }

    /// One cycle: the units pop one pair each in index order; the cycle's
    /// triplets are then committed in the same order.
    fn dispatch(
        &mut self,
        registry: &mut MemoryRegistry,
        sector: u32,
        window: PhiWindow,
        trackpar: ParamMemoryId,
        run: &mut ProcessorStats,
    ) -> Result<(), TrackletError> {
        let mut committed = Vec::new();
        for unit in self.units.iter_mut() {
            let Some(pair) = self.buffer.pop() else {
                break;
            };
            let triplets = unit.step(&pair, registry, &self.third_vm, &self.settings)?;
            run.processed_pairs += 1;
            if triplets.is_empty() {
                run.pairs_without_triplet += 1;
            }
            committed.extend(triplets);
        }
        for triplet in committed {
            self.commit(registry, triplet, sector, window, trackpar, run)?;
        }
        Ok(())
    }

    /// Calculates parameters for a triplet and writes the tracklet and its
    /// projections.
    fn commit(
        &self,
        registry: &mut MemoryRegistry,
        triplet: Triplet,
        sector: u32,
        window: PhiWindow,
        trackpar: ParamMemoryId,
        run: &mut ProcessorStats,
    ) -> Result<(), TrackletError> {
        run.triplets += 1;
        let inner = *registry.stub(triplet.inner)?;
        let outer = *registry.stub(triplet.outer)?;
        let third = *registry.stub(triplet.third)?;

        let params = match self.calculator.calculate([&inner, &outer, &third], window)? {
            Calculation::Accepted(params) => params,
            Calculation::Rejected(reason) => {
                run.rejected_triplets += 1;
                trace!(processor = %self.name, %reason, "Triplet rejected");
                return Ok(());
            }
        };

        let tracklet = Tracklet {
            seed: self.seed,
            sector,
            tc_index: self.tc_index,
            stubs: triplet,
            params,
        };
        let Some(tracklet_index) = registry.parameters_mut(trackpar)?.add(tracklet) else {
            run.dropped_tracklets += 1;
            return Ok(());
        };
        run.tracklets += 1;

        for (&target, &memory) in &self.projection_outputs {
            let Some(point) = self.calculator.project(&params, target)? else {
                continue;
            };
            let projection = TrackletProjection {
                tracklet_index,
                seed: self.seed,
                tc_index: self.tc_index,
                point,
            };
            if registry.projections_mut(memory)?.add(projection) {
                run.projections += 1;
            } else {
                run.dropped_projections += 1;
            }
        }
        Ok(())
    }

    // ========================================================================
    // ERRORS
    // ========================================================================

    fn check_layer(
        &self,
        label: &str,
        memory: &str,
        found: LayerDisk,
        expected: LayerDisk,
    ) -> Result<(), TrackletError> {
        if found == expected {
            return Ok(());
        }
        Err(self.mismatch(label, memory, format!("serves {}, expected {}", found, expected)))
    }

    fn check_widths(&self, stubs: &[Stub]) -> Result<(), TrackletError> {
        let Some(stub) = stubs.iter().find(|stub| !stub.matches_settings(&self.settings)) else {
            return Ok(());
        };
        let (r_bits, _, z_bits, _) = self.settings.stub_widths(stub.layer_disk());
        let (field, expected, found) = if stub.phi().nbits() != self.settings.nbits_phi {
            ("phi", self.settings.nbits_phi, stub.phi().nbits())
        } else if stub.r().nbits() != r_bits {
            ("r", r_bits, stub.r().nbits())
        } else {
            ("z", z_bits, stub.z().nbits())
        };
        Err(TrackletError::WidthMismatch {
            field: format!("{} {}", stub.layer_disk(), field),
            expected,
            found,
        })
    }

    fn mismatch(&self, label: &str, memory: &str, reason: String) -> TrackletError {
        TrackletError::LayerMismatch {
            processor: self.name.clone(),
            label: label.to_string(),
            memory: memory.to_string(),
            reason,
        }
    }

    fn already_bound(&self, label: &str, memory: &str) -> TrackletError {
        TrackletError::AlreadyBound {
            processor: self.name.clone(),
            label: label.to_string(),
            memory: memory.to_string(),
        }
    }
}

/// Scanner position: the next first-layer stub to visit and the pairs of
/// the current one that have not reached the buffer yet.
#[derive(Debug, Default)]
struct ScanCursor {
    memory: usize,
    index: usize,
    staged: VecDeque<TrpEData>,
}

/// Splits `TPD_L3L4L2A` into its seed and region index.
fn parse_name(name: &str) -> Result<(Seed, u32), TrackletError> {
    let invalid = || TrackletError::config(format!("invalid processor name {}", name));
    let body = name.strip_prefix(NAME_PREFIX).ok_or_else(invalid)?;
    let region_char = body.chars().last().ok_or_else(invalid)?;
    if !region_char.is_ascii_uppercase() {
        return Err(invalid());
    }
    let region = region_char as u32 - 'A' as u32;
    if region >= MAX_REGIONS {
        return Err(invalid());
    }
    let seed = body[..body.len() - 1].parse::<Seed>().map_err(|_| invalid())?;
    Ok((seed, region))
}

/// Windows from a negative-side disk into the barrel are mirrored; every
/// other combination is side-independent.
fn oriented(window: ProjectionWindow, source: LayerDisk, target: LayerDisk, negative: bool) -> ProjectionWindow {
    if source.is_disk() && target.is_barrel() && negative {
        window.mirrored()
    } else {
        window
    }
}

/// Side a disk third stub must be on: the side the pair heads towards.
fn third_side(settings: &Settings, seed: Seed, inner: &Stub, outer: &Stub) -> bool {
    if seed.third().is_barrel() {
        false
    } else if seed.first().is_disk() {
        inner.negative_z()
    } else {
        outer.z_abs(settings) < 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processor() -> TrackletProcessorDisplaced {
        TrackletProcessorDisplaced::new("TPD_L3L4L2C", Arc::new(Settings::default())).unwrap()
    }

    #[test]
    fn test_name_parsing() {
        let processor = processor();
        assert_eq!(processor.seed(), Seed::L3L4L2);
        assert_eq!(processor.region(), 2);
        assert_eq!(processor.tc_index(), 8 << 4 | 2);
        assert_eq!(processor.units().len(), 4);
        assert_eq!(processor.state(), PipelineState::Idle);

        let settings = Arc::new(Settings::default());
        for name in ["L3L4L2A", "TPD_L3L4L2", "TPD_L1L2L3A", "TPD_D1D2L2Z", "TPD_"] {
            assert!(TrackletProcessorDisplaced::new(name, settings.clone()).is_err(), "{}", name);
        }
    }

    #[test]
    fn test_tables_must_match_seed() {
        let settings = Arc::new(Settings::default());
        let tables = Arc::new(SeedTables::build(&settings, Seed::L5L6L4).unwrap());
        assert!(TrackletProcessorDisplaced::with_tables("TPD_L3L4L2A", settings.clone(), tables.clone()).is_err());
        assert!(TrackletProcessorDisplaced::with_tables("TPD_L5L6L4B", settings, tables).is_ok());
    }

    #[test]
    fn test_input_labels() {
        let mut processor = processor();
        let mut registry = MemoryRegistry::new();
        let first = registry.add_all_stubs("AS_L3PHIC", LayerDisk::L3);
        let wrong_layer = registry.add_all_stubs("AS_L2PHIC", LayerDisk::L2);
        let second = registry.add_vm_stubs("VMSTE_L4PHIC1", LayerDisk::L4, 16);
        let third = registry.add_vm_stubs("VMSTE_L2PHIC1", LayerDisk::L2, 16);

        processor.add_input(&registry, first, INPUT_FIRST_ALLSTUBS).unwrap();
        processor.add_input(&registry, second, INPUT_SECOND_VMSTUBS).unwrap();
        processor.add_input(&registry, third, INPUT_THIRD_VMSTUBS).unwrap();

        assert!(matches!(
            processor.add_input(&registry, first, "innerallstubin"),
            Err(TrackletError::UnknownInput { .. })
        ));
        assert!(matches!(
            processor.add_input(&registry, first, INPUT_FIRST_ALLSTUBS),
            Err(TrackletError::AlreadyBound { .. })
        ));
        assert!(matches!(
            processor.add_input(&registry, wrong_layer, INPUT_FIRST_ALLSTUBS),
            Err(TrackletError::LayerMismatch { .. })
        ));
        assert!(matches!(
            processor.add_input(&registry, third, INPUT_SECOND_VMSTUBS),
            Err(TrackletError::LayerMismatch { .. })
        ));
        assert!(matches!(
            processor.add_input(&registry, first, INPUT_THIRD_VMSTUBS),
            Err(TrackletError::LayerMismatch { .. })
        ));
    }

    #[test]
    fn test_width_mismatch_on_input() {
        let mut processor = processor();
        let narrow = Settings {
            nbits_z_barrel: 11,
            ..Default::default()
        };
        let mut registry = MemoryRegistry::new();
        let first = registry.add_all_stubs("AS_L3PHIC", LayerDisk::L3);
        let stub = Stub::barrel(&narrow, LayerDisk::L3, 10, 0, 10).unwrap();
        registry.push_stub(first, stub).unwrap();
        assert!(matches!(
            processor.add_input(&registry, first, INPUT_FIRST_ALLSTUBS),
            Err(TrackletError::WidthMismatch { expected: 12, found: 11, .. })
        ));
    }

    #[test]
    fn test_output_labels() {
        let mut processor = processor();
        let mut registry = MemoryRegistry::new();
        let trackpar = registry.add_parameters("TPAR_L3L4L2C", 127);
        let other = registry.add_parameters("TPAR_L3L4L2D", 127);
        let l1 = registry.add_projections("TPROJ_L3L4L2C_L1PHIA", LayerDisk::L1, 64);
        let d2 = registry.add_projections("TPROJ_L3L4L2C_D2PHIA", LayerDisk::D2, 64);
        let l2 = registry.add_projections("TPROJ_L3L4L2C_L2PHIA", LayerDisk::L2, 64);

        processor.add_output(&registry, trackpar, OUTPUT_TRACKPAR).unwrap();
        processor.add_output(&registry, l1, "projoutL1PHIA").unwrap();
        processor.add_output(&registry, d2, "projoutD2").unwrap();
        assert_eq!(processor.projection_outputs().len(), 2);

        assert!(matches!(
            processor.add_output(&registry, other, OUTPUT_TRACKPAR),
            Err(TrackletError::AlreadyBound { .. })
        ));
        assert!(matches!(
            processor.add_output(&registry, l1, "projoutL1"),
            Err(TrackletError::AlreadyBound { .. })
        ));
        // L2 is the third layer of this seed, not a projection target
        assert!(matches!(
            processor.add_output(&registry, l2, "projoutL2"),
            Err(TrackletError::UnknownOutput { .. })
        ));
        assert!(matches!(
            processor.add_output(&registry, l1, "projections"),
            Err(TrackletError::UnknownOutput { .. })
        ));
        assert!(matches!(
            processor.add_output(&registry, l1, "projoutL5"),
            Err(TrackletError::LayerMismatch { .. })
        ));
    }

    #[test]
    fn test_execute_requires_trackpar() {
        let mut processor = processor();
        let mut registry = MemoryRegistry::new();
        assert!(matches!(
            processor.execute(&mut registry, 0, 0.0, 0.5),
            Err(TrackletError::MissingOutput { .. })
        ));
    }

    #[test]
    fn test_execute_rejects_bad_window() {
        let mut processor = processor();
        let mut registry = MemoryRegistry::new();
        let trackpar = registry.add_parameters("TPAR_L3L4L2C", 127);
        processor.add_output(&registry, trackpar, OUTPUT_TRACKPAR).unwrap();
        assert!(processor.execute(&mut registry, 0, 0.5, 0.1).is_err());
        assert!(processor.execute(&mut registry, 9, 0.1, 0.5).is_err());
        processor.execute(&mut registry, 0, 0.1, 0.5).unwrap();
        assert_eq!(processor.state(), PipelineState::Done);
        assert_eq!(processor.stats().executions, 1);
    }

    #[test]
    fn test_stats_accumulate_and_inefficiencies() {
        let mut total = ProcessorStats::default();
        let run = ProcessorStats {
            executions: 1,
            dropped_pairs: 2,
            unconsumed_pairs: 3,
            pairs_without_triplet: 1,
            triplets: 4,
            ..Default::default()
        };
        total.accumulate(&run);
        total.accumulate(&run);
        assert_eq!(total.executions, 2);
        assert_eq!(total.triplets, 8);
        assert_eq!(total.inefficiencies(), 12);
    }

    #[test]
    fn test_oriented_windows() {
        let window = ProjectionWindow::from_fine_range(40, 44);
        assert_eq!(oriented(window, LayerDisk::D1, LayerDisk::L2, true), window.mirrored());
        assert_eq!(oriented(window, LayerDisk::D1, LayerDisk::L2, false), window);
        assert_eq!(oriented(window, LayerDisk::D1, LayerDisk::D2, true), window);
        assert_eq!(oriented(window, LayerDisk::L3, LayerDisk::L4, true), window);
    }
}
