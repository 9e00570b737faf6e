use crate::budget::IterationBudget;
use crate::coverage::{CoverageTracker, Granularity, TraceLimits};
use crate::scheduler::{
    AflFastSchedule, DEFAULT_AFL_FAST_EXPONENT, DEFAULT_MIN_ENERGY, PowerSchedule,
    PowerScheduler, UniformSchedule,
};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct FuzzerSettings {
    #[serde(default = "default_rng_seed")]
    pub rng_seed: u64,
    /// Iteration count used by [`GreyfuzzConfig::iteration_budget`]. Unset means the
    /// caller supplies its own budget.
    #[serde(default)]
    pub max_iterations: Option<u64>,
}

pub fn default_rng_seed() -> u64 {
    0
}

impl Default for FuzzerSettings {
    fn default() -> Self {
        Self {
            rng_seed: default_rng_seed(),
            max_iterations: None,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct CoverageConfig {
    #[serde(default)]
    pub granularity: Granularity,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ScheduleKind {
    #[default]
    AflFast,
    Uniform,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct ScheduleConfig {
    #[serde(default)]
    pub kind: ScheduleKind,
    /// Only read by the `afl-fast` schedule.
    #[serde(default = "default_exponent")]
    pub exponent: f64,
    #[serde(default = "default_min_energy")]
    pub min_energy: f64,
}

fn default_exponent() -> f64 {
    DEFAULT_AFL_FAST_EXPONENT
}

fn default_min_energy() -> f64 {
    DEFAULT_MIN_ENERGY
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            kind: ScheduleKind::default(),
            exponent: default_exponent(),
            min_energy: default_min_energy(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct ExecutorConfig {
    /// Per-execution wall-clock limit in milliseconds. `0` disables it.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Trace events one execution may record. `0` disables it.
    #[serde(default = "default_max_trace_events")]
    pub max_trace_events: usize,
}

fn default_timeout_ms() -> u64 {
    2000
}

fn default_max_trace_events() -> usize {
    1_000_000
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_trace_events: default_max_trace_events(),
        }
    }
}

impl ExecutorConfig {
    pub fn trace_limits(&self) -> TraceLimits {
        TraceLimits {
            max_events: (self.max_trace_events > 0).then_some(self.max_trace_events),
            timeout: (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms)),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct GreyfuzzConfig {
    #[serde(default)]
    pub fuzzer: FuzzerSettings,
    #[serde(default)]
    pub coverage: CoverageConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
}

impl GreyfuzzConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file at {:?}: {}", path, e))?;

        Self::from_toml_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid config file {:?}: {:#}", path, e))
    }

    pub fn from_toml_str(content: &str) -> Result<Self, anyhow::Error> {
        let config: GreyfuzzConfig = toml::from_str(content)
            .map_err(|e| anyhow::anyhow!("Failed to parse TOML: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        let schedule = &self.schedule;
        if !(schedule.min_energy.is_finite() && schedule.min_energy > 0.0) {
            anyhow::bail!(
                "schedule.min-energy must be a positive number, got {}",
                schedule.min_energy
            );
        }
        if !(schedule.exponent.is_finite() && schedule.exponent >= 0.0) {
            anyhow::bail!(
                "schedule.exponent must be a non-negative number, got {}",
                schedule.exponent
            );
        }
        Ok(())
    }

    pub fn coverage_tracker(&self) -> CoverageTracker {
        CoverageTracker::new(Box::new(self.coverage.granularity.policy()))
            .with_limits(self.executor.trace_limits())
    }

    pub fn power_schedule(&self) -> Box<dyn PowerSchedule> {
        match self.schedule.kind {
            ScheduleKind::AflFast => Box::new(AflFastSchedule::new(self.schedule.exponent)),
            ScheduleKind::Uniform => Box::new(UniformSchedule),
        }
    }

    pub fn scheduler(&self) -> PowerScheduler<Box<dyn PowerSchedule>> {
        PowerScheduler::new(self.power_schedule()).with_min_energy(self.schedule.min_energy)
    }

    pub fn iteration_budget(&self) -> Option<IterationBudget> {
        self.fuzzer.max_iterations.map(IterationBudget)
    }
}
