//! Triplets, tracklets and their projections.

use serde::{Deserialize, Serialize};

use crate::geometry::{LayerDisk, Seed};
use crate::memory::StubRef;
use crate::word::FixedWord;

/// Three stubs confirmed to lie on a common displaced trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Triplet {
    pub inner: StubRef,
    pub outer: StubRef,
    pub third: StubRef,
}

/// Helix parameters of a tracklet, in the integer units of
/// [`Settings`](crate::Settings) (`krinv`, `kphi`, `kd0`, `kz`, `kt`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackletParams {
    pub rinv: FixedWord,
    pub phi0: FixedWord,
    pub d0: FixedWord,
    pub z0: FixedWord,
    pub t: FixedWord,
}

/// A seed track written to a tracklet parameter memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tracklet {
    pub seed: Seed,
    pub sector: u32,
    /// Tracklet-calculator index: `seed << 4 | region`
    pub tc_index: u32,
    pub stubs: Triplet,
    pub params: TrackletParams,
}

/// Projected intersection with a downstream layer or disk.
///
/// `rz` is z for barrel targets and r for disk targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionPoint {
    pub target: LayerDisk,
    pub phi: FixedWord,
    pub rz: FixedWord,
}

/// A projection written to a tracklet projection memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackletProjection {
    /// Index of the source tracklet in its parameter memory
    pub tracklet_index: usize,
    pub seed: Seed,
    pub tc_index: u32,
    pub point: ProjectionPoint,
}
