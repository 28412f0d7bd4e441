//! JSON exporter for offline analysis.
//!
//! Exports tracklets and projections per event and sector, both as raw
//! integer words and converted to physical units.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;

use tracklet_core::{Settings, Tracklet, TrackletParams, TrackletProjection};

use crate::pipeline::SectorOutput;
use crate::runner::{ScenarioMetrics, ScenarioResult};

/// A tracklet with its parameters in physical units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackletRecord {
    pub tc_index: u32,
    /// Curvature (1/cm)
    pub rinv: f64,
    /// Global azimuth (rad)
    pub phi0: f64,
    /// Impact parameter (cm)
    pub d0: f64,
    /// Longitudinal vertex (cm)
    pub z0: f64,
    pub t: f64,
    pub raw: TrackletParams,
}

impl TrackletRecord {
    pub fn new(settings: &Settings, tracklet: &Tracklet) -> Self {
        let p = &tracklet.params;
        let (origin, _) = settings.sector_phi_range(tracklet.sector);
        Self {
            tc_index: tracklet.tc_index,
            rinv: p.rinv.value() as f64 * settings.krinv(),
            phi0: origin + p.phi0.value() as f64 * settings.kphi(),
            d0: p.d0.value() as f64 * settings.kd0(),
            z0: p.z0.value() as f64 * settings.kz,
            t: p.t.value() as f64 * settings.kt(),
            raw: *p,
        }
    }
}

/// A projection in physical units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionRecord {
    pub tracklet_index: usize,
    pub target: String,
    /// Global azimuth (rad)
    pub phi: f64,
    /// z on barrel layers, r on disks (cm)
    pub rz: f64,
}

impl ProjectionRecord {
    pub fn new(settings: &Settings, sector: u32, projection: &TrackletProjection) -> Self {
        let point = &projection.point;
        let (origin, _) = settings.sector_phi_range(sector);
        let lsb = if point.target.is_barrel() {
            settings.kz
        } else {
            settings.kr
        };
        Self {
            tracklet_index: projection.tracklet_index,
            target: point.target.to_string(),
            phi: origin + point.phi.value() as f64 * settings.kphi(),
            rz: point.rz.value() as f64 * lsb,
        }
    }
}

/// Outputs of one sector pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorExport {
    pub seed: String,
    pub sector: u32,
    pub tracklets: Vec<TrackletRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub projections: Vec<ProjectionRecord>,
}

impl SectorExport {
    pub fn new(settings: &Settings, output: &SectorOutput) -> Self {
        Self {
            seed: output.seed.to_string(),
            sector: output.sector,
            tracklets: output
                .tracklets
                .iter()
                .map(|t| TrackletRecord::new(settings, t))
                .collect(),
            projections: output
                .projections
                .iter()
                .map(|p| ProjectionRecord::new(settings, output.sector, p))
                .collect(),
        }
    }
}

/// One event. Sectors without tracklets are omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventExport {
    pub event: u64,
    pub particles: usize,
    pub sectors: Vec<SectorExport>,
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// All events
    pub events: Vec<EventExport>,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    pub metrics: ScenarioMetrics,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            events: Vec::new(),
            passed: false,
            failure_reason: None,
            metrics: ScenarioMetrics::default(),
        }
    }

    /// Builds the export of a finished scenario.
    pub fn from_result(settings: &Settings, result: &ScenarioResult) -> Self {
        let settings = result.scenario.settings(settings);
        let mut export = Self::new(result.scenario.name(), result.seed);
        for event in &result.events {
            export.add_event(EventExport {
                event: event.event,
                particles: event.particles,
                sectors: event
                    .sectors
                    .iter()
                    .filter(|s| !s.tracklets.is_empty())
                    .map(|s| SectorExport::new(&settings, s))
                    .collect(),
            });
        }
        export.finalize(result.passed, result.failure_reason.clone(), result.metrics.clone());
        export
    }

    /// Adds an event.
    pub fn add_event(&mut self, event: EventExport) {
        self.events.push(event);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, failure_reason: Option<String>, metrics: ScenarioMetrics) {
        self.passed = passed;
        self.failure_reason = failure_reason;
        self.metrics = metrics;
    }

    /// Writes the export to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }

    /// Returns the export as a JSON string.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
