//! Workload scenarios for the displaced tracklet processor.

use tracklet_core::Settings;

use crate::generator::GeneratorConfig;

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// TPD-001: One prompt-ish particle per event, no noise
    SingleParticle,

    /// TPD-002: Collimated displaced jets with noise
    DisplacedJets,

    /// TPD-003: Busy events against a two-slot pair buffer and a short budget
    BufferPressure,

    /// TPD-004: Busy events with one unit and a two-cycle budget
    PipelineStarvation,

    /// TPD-005: Replays displaced jets and compares every output
    Determinism,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::SingleParticle,
            ScenarioId::DisplacedJets,
            ScenarioId::BufferPressure,
            ScenarioId::PipelineStarvation,
            ScenarioId::Determinism,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::SingleParticle => "single_particle",
            ScenarioId::DisplacedJets => "displaced_jets",
            ScenarioId::BufferPressure => "buffer_pressure",
            ScenarioId::PipelineStarvation => "pipeline_starvation",
            ScenarioId::Determinism => "determinism",
        }
    }

    /// Returns the scenario description.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::SingleParticle => "Single particle per event: baseline tracklet output",
            ScenarioId::DisplacedJets => "Displaced jets plus noise: occupancy",
            ScenarioId::BufferPressure => "Two-slot pair buffer: scanner stalls, budget runs out",
            ScenarioId::PipelineStarvation => "One unit, two cycles: pairs left unconsumed",
            ScenarioId::Determinism => "Identical seed replayed: outputs must match exactly",
        }
    }

    /// Event generation parameters.
    pub fn generator_config(&self) -> GeneratorConfig {
        match self {
            ScenarioId::SingleParticle => GeneratorConfig::default(),
            ScenarioId::DisplacedJets | ScenarioId::Determinism => GeneratorConfig {
                particles: 24,
                jets: 3,
                d0_sigma: 2.0,
                noise_per_layer: 4,
                ..Default::default()
            },
            ScenarioId::BufferPressure | ScenarioId::PipelineStarvation => GeneratorConfig {
                particles: 60,
                jets: 2,
                jet_spread: 0.03,
                d0_sigma: 1.0,
                noise_per_layer: 20,
                ..Default::default()
            },
        }
    }

    /// Scenario overrides applied to the base settings.
    pub fn settings(&self, base: &Settings) -> Settings {
        let mut settings = base.clone();
        match self {
            ScenarioId::BufferPressure => {
                settings.buffer_capacity = 2;
                settings.max_step = 12;
            }
            ScenarioId::PipelineStarvation => {
                settings.num_units = 1;
                settings.max_step = 2;
            }
            _ => {}
        }
        settings
    }

    /// Returns true if the scenario must show lost pairs to pass.
    pub fn expects_losses(&self) -> bool {
        matches!(self, ScenarioId::BufferPressure | ScenarioId::PipelineStarvation)
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single_particle" | "singleparticle" | "tpd-001" => Ok(ScenarioId::SingleParticle),
            "displaced_jets" | "displacedjets" | "tpd-002" => Ok(ScenarioId::DisplacedJets),
            "buffer_pressure" | "bufferpressure" | "tpd-003" => Ok(ScenarioId::BufferPressure),
            "pipeline_starvation" | "pipelinestarvation" | "tpd-004" => {
                Ok(ScenarioId::PipelineStarvation)
            }
            "determinism" | "tpd-005" => Ok(ScenarioId::Determinism),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
