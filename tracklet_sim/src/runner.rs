//! Scenario runner - generates events and drives every sector pipeline.

use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use tracklet_core::{ProcessorStats, Seed, SeedTables, Settings};

use crate::error::SimError;
use crate::generator::EventGenerator;
use crate::pipeline::{SectorOutput, SectorPipeline};
use crate::scenarios::ScenarioId;

/// Outputs of all pipelines for one event, in (seed, sector) order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventOutput {
    pub event: u64,
    pub particles: usize,
    pub stubs: usize,
    pub sectors: Vec<SectorOutput>,
}

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,

    /// Per-event outputs
    pub events: Vec<EventOutput>,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioMetrics {
    /// Events generated
    pub events: u64,

    /// Particles generated
    pub particles: u64,

    /// Sector stubs generated (a stub in an overlap counts once per sector)
    pub stubs: u64,

    /// Stubs lost to full VM bins
    pub dropped_vm_stubs: u64,

    /// Processor counters summed over every pipeline and event
    pub stats: ProcessorStats,
}

impl ScenarioMetrics {
    fn record(&mut self, event: &EventOutput) {
        self.events += 1;
        self.particles += event.particles as u64;
        self.stubs += event.stubs as u64;
        for sector in &event.sectors {
            self.dropped_vm_stubs += sector.dropped_vm_stubs as u64;
            self.stats.accumulate(&sector.stats);
        }
    }
}

/// Runs tracklet scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Events per scenario
    events: usize,

    /// Base settings before scenario overrides
    settings: Settings,

    /// Seeds instantiated in every sector
    seeds: Vec<Seed>,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            events: 10,
            settings: Settings::default(),
            seeds: Seed::ALL.to_vec(),
        }
    }

    /// Sets the number of events.
    pub fn with_events(mut self, events: usize) -> Self {
        self.events = events;
        self
    }

    /// Sets the base settings.
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Restricts the seeds that are run.
    pub fn with_seeds(mut self, seeds: Vec<Seed>) -> Self {
        self.seeds = seeds;
        self
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> Result<ScenarioResult, SimError> {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);
        let settings = scenario.settings(&self.settings);
        settings.validate()?;

        let events = self.simulate(scenario, &settings)?;
        let mut metrics = ScenarioMetrics::default();
        events.iter().for_each(|event| metrics.record(event));

        let mut failure_reason = check_accounting(&settings, &events);
        if failure_reason.is_none() && scenario.expects_losses() {
            let lost = metrics.stats.dropped_pairs + metrics.stats.unconsumed_pairs;
            if lost == 0 {
                failure_reason = Some("no pairs were lost under reduced resources".to_string());
            }
        }
        if failure_reason.is_none() && scenario == ScenarioId::Determinism {
            let replay = self.simulate(scenario, &settings)?;
            if replay != events {
                failure_reason = Some("replay with the same seed produced different outputs".to_string());
            }
        }

        if let Some(reason) = &failure_reason {
            warn!("Scenario {} failed: {}", scenario.name(), reason);
        }
        info!(
            "Scenario {} finished: {} tracklets, {} projections, {} inefficiencies",
            scenario.name(),
            metrics.stats.tracklets,
            metrics.stats.projections,
            metrics.stats.inefficiencies()
        );

        Ok(ScenarioResult {
            scenario,
            seed: self.seed,
            passed: failure_reason.is_none(),
            failure_reason,
            metrics,
            events,
        })
    }

    /// Generates the events and runs every (seed, sector) pipeline on them.
    fn simulate(&self, scenario: ScenarioId, settings: &Settings) -> Result<Vec<EventOutput>, SimError> {
        let settings = Arc::new(settings.clone());
        let mut pipelines = Vec::with_capacity(self.seeds.len() * settings.n_sectors as usize);
        for &seed in &self.seeds {
            let tables = Arc::new(SeedTables::build(&settings, seed)?);
            for sector in 0..settings.n_sectors {
                pipelines.push(SectorPipeline::new(settings.clone(), tables.clone(), sector)?);
            }
        }

        let mut generator = EventGenerator::new(self.seed, scenario.generator_config());
        let mut outputs = Vec::with_capacity(self.events);
        for _ in 0..self.events {
            let event = generator.generate(&settings)?;
            let sectors = pipelines
                .par_iter_mut()
                .map(|pipeline| {
                    pipeline.load(event.sector_stubs(pipeline.sector()))?;
                    pipeline.run()
                })
                .collect::<Result<Vec<_>, SimError>>()?;
            debug!(event = event.index, stubs = event.stubs.len(), "Event processed");
            outputs.push(EventOutput {
                event: event.index,
                particles: event.particles.len(),
                stubs: event.stubs.len(),
                sectors,
            });
        }
        Ok(outputs)
    }
}

/// Checks that every pair and triplet is accounted for exactly once.
fn check_accounting(settings: &Settings, events: &[EventOutput]) -> Option<String> {
    for event in events {
        for output in &event.sectors {
            let s = &output.stats;
            let context = format!("event {} {} sector {}", event.event, output.seed, output.sector);
            if s.candidate_pairs != s.processed_pairs + s.unconsumed_pairs + s.dropped_pairs {
                return Some(format!("{}: pair counts do not add up", context));
            }
            if s.triplets != s.rejected_triplets + s.tracklets + s.dropped_tracklets {
                return Some(format!("{}: triplet counts do not add up", context));
            }
            if output.tracklets.len() as u64 != s.tracklets {
                return Some(format!(
                    "{}: parameter memory holds {} tracklets, counted {}",
                    context,
                    output.tracklets.len(),
                    s.tracklets
                ));
            }
            if output.projections.len() as u64 != s.projections {
                return Some(format!("{}: projection count mismatch", context));
            }
            if s.cycles > settings.max_step as u64
                || s.processed_pairs > s.cycles * settings.num_units as u64
            {
                return Some(format!("{}: {} pairs in {} cycles", context, s.processed_pairs, s.cycles));
            }
            if output
                .tracklets
                .iter()
                .any(|t| t.seed != output.seed || t.sector != output.sector)
            {
                return Some(format!("{}: tracklet tagged with another seed or sector", context));
            }
        }
    }
    None
}
