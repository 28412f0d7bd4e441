//! Pipeline memories and the registry that owns them.
//!
//! Processors never own memories. They hold typed ids handed out by a
//! [`MemoryRegistry`] and resolve them on every access, so a missing or
//! foreign id surfaces as [`TrackletError::UnknownMemory`].

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::TrackletError;
use crate::geometry::LayerDisk;
use crate::settings::{Settings, FINE_RZ_BITS, NUM_RZ_BINS};
use crate::stub::Stub;
use crate::tracklet::{Tracklet, TrackletProjection};

/// Id of an [`AllStubsMemory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StubMemoryId(usize);

/// Id of a [`VmStubsTeMemory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VmMemoryId(usize);

/// Id of a [`TrackletParametersMemory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParamMemoryId(usize);

/// Id of a [`TrackletProjectionsMemory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjMemoryId(usize);

/// Any memory id, as passed to the processor's wiring calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemoryHandle {
    AllStubs(StubMemoryId),
    VmStubs(VmMemoryId),
    Parameters(ParamMemoryId),
    Projections(ProjMemoryId),
}

impl MemoryHandle {
    pub fn kind(&self) -> &'static str {
        match self {
            MemoryHandle::AllStubs(_) => "AllStubs",
            MemoryHandle::VmStubs(_) => "VMStubsTE",
            MemoryHandle::Parameters(_) => "TrackletParameters",
            MemoryHandle::Projections(_) => "TrackletProjections",
        }
    }
}

impl From<StubMemoryId> for MemoryHandle {
    fn from(id: StubMemoryId) -> Self {
        MemoryHandle::AllStubs(id)
    }
}

impl From<VmMemoryId> for MemoryHandle {
    fn from(id: VmMemoryId) -> Self {
        MemoryHandle::VmStubs(id)
    }
}

impl From<ParamMemoryId> for MemoryHandle {
    fn from(id: ParamMemoryId) -> Self {
        MemoryHandle::Parameters(id)
    }
}

impl From<ProjMemoryId> for MemoryHandle {
    fn from(id: ProjMemoryId) -> Self {
        MemoryHandle::Projections(id)
    }
}

/// Reference to a stub held in an [`AllStubsMemory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StubRef {
    pub memory: StubMemoryId,
    pub index: usize,
}

// ============================================================================
// MEMORIES
// ============================================================================

/// Ordered stubs of one layer or disk.
#[derive(Debug, Clone)]
pub struct AllStubsMemory {
    name: String,
    layer_disk: LayerDisk,
    stubs: Vec<Stub>,
}

impl AllStubsMemory {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layer_disk(&self) -> LayerDisk {
        self.layer_disk
    }

    pub fn stubs(&self) -> &[Stub] {
        &self.stubs
    }

    pub fn len(&self) -> usize {
        self.stubs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stubs.is_empty()
    }
}

/// Entry of a VM stub memory: the stub and its fine rz position in the bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmStubTe {
    pub stub: StubRef,
    pub fine_rz: u32,
}

/// Stub references of one layer/disk binned by coarse rz.
#[derive(Debug, Clone)]
pub struct VmStubsTeMemory {
    name: String,
    layer_disk: LayerDisk,
    bins: Vec<Vec<VmStubTe>>,
    bin_capacity: usize,
    dropped: usize,
}

impl VmStubsTeMemory {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layer_disk(&self) -> LayerDisk {
        self.layer_disk
    }

    /// Entries of one coarse bin; empty for bins outside `0..8`.
    pub fn bin(&self, bin: usize) -> &[VmStubTe] {
        self.bins.get(bin).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.bins.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stubs refused because their bin was full.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Bins a stub by its fine rz position. Returns `Ok(false)` when the bin
    /// is full and the stub is dropped.
    pub fn add_stub(
        &mut self,
        settings: &Settings,
        stub_ref: StubRef,
        stub: &Stub,
    ) -> Result<bool, TrackletError> {
        if stub.layer_disk() != self.layer_disk {
            return Err(TrackletError::config(format!(
                "{}: stub from {} in {} memory",
                self.name,
                stub.layer_disk(),
                self.layer_disk
            )));
        }
        let fine = settings.fine_rz_bin(stub);
        let bin = (fine >> FINE_RZ_BITS) as usize;
        let entries = &mut self.bins[bin];
        if entries.len() >= self.bin_capacity {
            self.dropped += 1;
            return Ok(false);
        }
        entries.push(VmStubTe {
            stub: stub_ref,
            fine_rz: fine & ((1 << FINE_RZ_BITS) - 1),
        });
        Ok(true)
    }
}

/// Bounded, ordered tracklet storage.
#[derive(Debug, Clone)]
pub struct TrackletParametersMemory {
    name: String,
    capacity: usize,
    tracklets: Vec<Tracklet>,
}

impl TrackletParametersMemory {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn tracklets(&self) -> &[Tracklet] {
        &self.tracklets
    }

    pub fn len(&self) -> usize {
        self.tracklets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracklets.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.tracklets.len() >= self.capacity
    }

    /// Appends a tracklet and returns its index, or `None` when full.
    pub fn add(&mut self, tracklet: Tracklet) -> Option<usize> {
        if self.is_full() {
            warn!(memory = %self.name, "Will break on too many tracklets");
            return None;
        }
        self.tracklets.push(tracklet);
        Some(self.tracklets.len() - 1)
    }
}

/// Bounded, ordered projections to one target layer/disk.
#[derive(Debug, Clone)]
pub struct TrackletProjectionsMemory {
    name: String,
    target: LayerDisk,
    capacity: usize,
    projections: Vec<TrackletProjection>,
}

impl TrackletProjectionsMemory {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> LayerDisk {
        self.target
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn projections(&self) -> &[TrackletProjection] {
        &self.projections
    }

    pub fn len(&self) -> usize {
        self.projections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projections.is_empty()
    }

    /// Appends a projection. Returns `false` when full.
    pub fn add(&mut self, projection: TrackletProjection) -> bool {
        if self.projections.len() >= self.capacity {
            warn!(memory = %self.name, "Projection memory full");
            return false;
        }
        self.projections.push(projection);
        true
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Owner of every memory in a pipeline.
#[derive(Debug, Clone, Default)]
pub struct MemoryRegistry {
    all_stubs: Vec<AllStubsMemory>,
    vm_stubs: Vec<VmStubsTeMemory>,
    parameters: Vec<TrackletParametersMemory>,
    projections: Vec<TrackletProjectionsMemory>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_all_stubs(&mut self, name: impl Into<String>, layer_disk: LayerDisk) -> StubMemoryId {
        self.all_stubs.push(AllStubsMemory {
            name: name.into(),
            layer_disk,
            stubs: Vec::new(),
        });
        StubMemoryId(self.all_stubs.len() - 1)
    }

    pub fn add_vm_stubs(
        &mut self,
        name: impl Into<String>,
        layer_disk: LayerDisk,
        bin_capacity: usize,
    ) -> VmMemoryId {
        self.vm_stubs.push(VmStubsTeMemory {
            name: name.into(),
            layer_disk,
            bins: vec![Vec::new(); NUM_RZ_BINS],
            bin_capacity,
            dropped: 0,
        });
        VmMemoryId(self.vm_stubs.len() - 1)
    }

    pub fn add_parameters(&mut self, name: impl Into<String>, capacity: usize) -> ParamMemoryId {
        self.parameters.push(TrackletParametersMemory {
            name: name.into(),
            capacity,
            tracklets: Vec::new(),
        });
        ParamMemoryId(self.parameters.len() - 1)
    }

    pub fn add_projections(
        &mut self,
        name: impl Into<String>,
        target: LayerDisk,
        capacity: usize,
    ) -> ProjMemoryId {
        self.projections.push(TrackletProjectionsMemory {
            name: name.into(),
            target,
            capacity,
            projections: Vec::new(),
        });
        ProjMemoryId(self.projections.len() - 1)
    }

    pub fn all_stubs(&self, id: StubMemoryId) -> Result<&AllStubsMemory, TrackletError> {
        self.all_stubs
            .get(id.0)
            .ok_or_else(|| TrackletError::UnknownMemory(format!("{:?}", id)))
    }

    pub fn vm_stubs(&self, id: VmMemoryId) -> Result<&VmStubsTeMemory, TrackletError> {
        self.vm_stubs
            .get(id.0)
            .ok_or_else(|| TrackletError::UnknownMemory(format!("{:?}", id)))
    }

    pub fn vm_stubs_mut(&mut self, id: VmMemoryId) -> Result<&mut VmStubsTeMemory, TrackletError> {
        self.vm_stubs
            .get_mut(id.0)
            .ok_or_else(|| TrackletError::UnknownMemory(format!("{:?}", id)))
    }

    pub fn parameters(&self, id: ParamMemoryId) -> Result<&TrackletParametersMemory, TrackletError> {
        self.parameters
            .get(id.0)
            .ok_or_else(|| TrackletError::UnknownMemory(format!("{:?}", id)))
    }

    pub fn parameters_mut(
        &mut self,
        id: ParamMemoryId,
    ) -> Result<&mut TrackletParametersMemory, TrackletError> {
        self.parameters
            .get_mut(id.0)
            .ok_or_else(|| TrackletError::UnknownMemory(format!("{:?}", id)))
    }

    pub fn projections(&self, id: ProjMemoryId) -> Result<&TrackletProjectionsMemory, TrackletError> {
        self.projections
            .get(id.0)
            .ok_or_else(|| TrackletError::UnknownMemory(format!("{:?}", id)))
    }

    pub fn projections_mut(
        &mut self,
        id: ProjMemoryId,
    ) -> Result<&mut TrackletProjectionsMemory, TrackletError> {
        self.projections
            .get_mut(id.0)
            .ok_or_else(|| TrackletError::UnknownMemory(format!("{:?}", id)))
    }

    /// Name of the memory behind any handle.
    pub fn name_of(&self, handle: MemoryHandle) -> Result<&str, TrackletError> {
        Ok(match handle {
            MemoryHandle::AllStubs(id) => self.all_stubs(id)?.name(),
            MemoryHandle::VmStubs(id) => self.vm_stubs(id)?.name(),
            MemoryHandle::Parameters(id) => self.parameters(id)?.name(),
            MemoryHandle::Projections(id) => self.projections(id)?.name(),
        })
    }

    /// Appends a stub to an AllStubs memory and returns its reference.
    pub fn push_stub(&mut self, id: StubMemoryId, stub: Stub) -> Result<StubRef, TrackletError> {
        let memory = self
            .all_stubs
            .get_mut(id.0)
            .ok_or_else(|| TrackletError::UnknownMemory(format!("{:?}", id)))?;
        if stub.layer_disk() != memory.layer_disk {
            return Err(TrackletError::config(format!(
                "{}: stub from {} in {} memory",
                memory.name,
                stub.layer_disk(),
                memory.layer_disk
            )));
        }
        memory.stubs.push(stub);
        Ok(StubRef {
            memory: id,
            index: memory.stubs.len() - 1,
        })
    }

    /// Resolves a stub reference, bounds-checked.
    pub fn stub(&self, stub_ref: StubRef) -> Result<&Stub, TrackletError> {
        let memory = self.all_stubs(stub_ref.memory)?;
        memory
            .stubs
            .get(stub_ref.index)
            .ok_or_else(|| TrackletError::StubOutOfBounds {
                memory: memory.name.clone(),
                index: stub_ref.index,
                len: memory.stubs.len(),
            })
    }

    /// Empties every memory for the next event; wiring stays valid.
    pub fn clear_event(&mut self) {
        for memory in &mut self.all_stubs {
            memory.stubs.clear();
        }
        for memory in &mut self.vm_stubs {
            memory.bins.iter_mut().for_each(Vec::clear);
            memory.dropped = 0;
        }
        for memory in &mut self.parameters {
            memory.tracklets.clear();
        }
        for memory in &mut self.projections {
            memory.projections.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stub_refs_resolve() {
        let settings = Settings::default();
        let mut registry = MemoryRegistry::new();
        let id = registry.add_all_stubs("AS_L3PHIA", LayerDisk::L3);
        let stub = Stub::barrel(&settings, LayerDisk::L3, 10, 0, 20).unwrap();
        let stub_ref = registry.push_stub(id, stub).unwrap();
        assert_eq!(stub_ref.index, 0);
        assert_eq!(registry.stub(stub_ref).unwrap(), &stub);

        let dangling = StubRef { memory: id, index: 3 };
        assert!(matches!(
            registry.stub(dangling),
            Err(TrackletError::StubOutOfBounds { len: 1, .. })
        ));
    }

    #[test]
    fn test_push_rejects_wrong_layer() {
        let settings = Settings::default();
        let mut registry = MemoryRegistry::new();
        let id = registry.add_all_stubs("AS_L3PHIA", LayerDisk::L3);
        let stub = Stub::barrel(&settings, LayerDisk::L2, 10, 0, 20).unwrap();
        assert!(registry.push_stub(id, stub).is_err());
    }

    #[test]
    fn test_vm_binning_and_bin_capacity() {
        let settings = Settings::default();
        let mut registry = MemoryRegistry::new();
        let all = registry.add_all_stubs("AS_L4PHIA", LayerDisk::L4);
        let vm = registry.add_vm_stubs("VMSTE_L4PHIA1", LayerDisk::L4, 2);

        // z = 220 lands in fine position 35: bin 4, fine 3
        for _ in 0..3 {
            let stub = Stub::barrel(&settings, LayerDisk::L4, 50, 0, 220).unwrap();
            let stub_ref = registry.push_stub(all, stub).unwrap();
            registry.vm_stubs_mut(vm).unwrap().add_stub(&settings, stub_ref, &stub).unwrap();
        }
        let memory = registry.vm_stubs(vm).unwrap();
        assert_eq!(memory.bin(4).len(), 2);
        assert_eq!(memory.bin(4)[0].fine_rz, 3);
        assert_eq!(memory.dropped(), 1);
        assert!(memory.bin(9).is_empty());
    }

    #[test]
    fn test_parameter_memory_capacity() {
        let mut registry = MemoryRegistry::new();
        let id = registry.add_parameters("TPAR_L3L4L2A", 0);
        assert!(registry.parameters(id).unwrap().is_full());
    }

    #[test]
    fn test_clear_event_keeps_wiring() {
        let settings = Settings::default();
        let mut registry = MemoryRegistry::new();
        let id = registry.add_all_stubs("AS_L2PHIA", LayerDisk::L2);
        let stub = Stub::barrel(&settings, LayerDisk::L2, 1, 0, 0).unwrap();
        registry.push_stub(id, stub).unwrap();
        registry.clear_event();
        assert!(registry.all_stubs(id).unwrap().is_empty());
        assert_eq!(registry.name_of(id.into()).unwrap(), "AS_L2PHIA");
    }

    #[test]
    fn test_unknown_memory() {
        let registry = MemoryRegistry::new();
        let mut other = MemoryRegistry::new();
        let id = other.add_parameters("TPAR_L5L6L4A", 4);
        assert!(matches!(
            registry.parameters(id),
            Err(TrackletError::UnknownMemory(_))
        ));
    }
}
