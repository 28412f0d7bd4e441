//! Cycle-level emulation of the displaced tracklet processor.
//!
//! Stubs from three layers/disks are combined into triplets by a scanning
//! stage, a fixed-capacity pair buffer and a pool of triplet engine units.
//! Accepted triplets become tracklets with integer helix parameters that are
//! projected to the downstream layers and disks.
//!
//! Memories are owned by a [`MemoryRegistry`]; processors only hold typed ids
//! into it. Given identical memories and arguments, `execute` produces
//! identical outputs.

pub mod calculator;
pub mod circular_buffer;
pub mod error;
pub mod geometry;
pub mod lut;
pub mod memory;
pub mod processor;
pub mod settings;
pub mod stub;
pub mod tracklet;
pub mod triplet_unit;
pub mod word;

pub use calculator::{Calculation, DisplacedCalculator, ParameterCalculator, RejectReason};
pub use circular_buffer::CircularBuffer;
pub use error::TrackletError;
pub use geometry::{LayerDisk, Seed};
pub use lut::{lut_key, ProjectionTarget, ProjectionWindow, SeedTables, TrackletLut};
pub use memory::{
    AllStubsMemory, MemoryHandle, MemoryRegistry, ParamMemoryId, ProjMemoryId, StubMemoryId,
    StubRef, TrackletParametersMemory, TrackletProjectionsMemory, VmMemoryId, VmStubTe,
    VmStubsTeMemory,
};
pub use processor::{PipelineState, ProcessorStats, TrackletProcessorDisplaced};
pub use settings::{PhiWindow, Settings};
pub use stub::Stub;
pub use tracklet::{ProjectionPoint, Tracklet, TrackletParams, TrackletProjection, Triplet};
pub use triplet_unit::{TripletEngineUnit, TrpEData};
pub use word::FixedWord;
