//! Deterministic simulation harness for the displaced tracklet processor.
//!
//! Every run is reproducible from a single 64-bit seed: the event generator
//! draws all particles and noise from one `ChaCha8Rng`, and sector pipelines
//! run in parallel but report in a fixed (seed, sector) order.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐    stubs per sector    ┌───────────────────────────┐
//! │  EventGenerator  │ ─────────────────────► │ SectorPipeline (seed, k)  │
//! │ particles, noise │                        │  MemoryRegistry           │
//! └──────────────────┘                        │  TrackletProcessorDisplaced│
//!          ▲                                  └─────────────┬─────────────┘
//!          │ seed                                           │ SectorOutput
//! ┌────────┴─────────┐                        ┌─────────────▼─────────────┐
//! │  ScenarioRunner  │ ◄───────────────────── │  accounting checks,       │
//! │                  │                        │  metrics, SimExport       │
//! └──────────────────┘                        └───────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use tracklet_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42)
//!     .with_events(20)
//!     .run(ScenarioId::DisplacedJets)?;
//! assert!(result.passed);
//! ```

pub mod error;
pub mod exporter;
pub mod generator;
pub mod pipeline;
pub mod runner;
pub mod scenarios;

pub use error::SimError;
pub use exporter::{EventExport, ProjectionRecord, SectorExport, SimExport, TrackletRecord};
pub use generator::{Event, EventGenerator, GeneratedStub, GeneratorConfig, Particle};
pub use pipeline::{SectorOutput, SectorPipeline};
pub use runner::{EventOutput, ScenarioMetrics, ScenarioResult, ScenarioRunner};
