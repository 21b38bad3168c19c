use parse_display::Display;
use serde::{Deserialize, Serialize};

use crate::randvars::ArrivalModel;
use crate::types::Duration;
use crate::utils::prelude::*;

/// Everything fixed for the lifetime of one simulated pipeline. Sizes are in MB,
/// rates in Hz, bandwidth in MB/s.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PipelineConfig {
    pub tick_secs: f64,
    pub raw_event_size_mb: f64,
    pub reco_event_size_mb: f64,
    pub daq: DaqConfig,
    pub grid: GridConfig,
    pub tape: TapeConfig,
    pub enstore: EnstoreConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DaqConfig {
    pub rate_hz: f64,
    #[serde(default)]
    pub arrivals: ArrivalModel,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GridConfig {
    pub workers: u64,
    pub rate_per_worker_hz: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TapeConfig {
    pub bandwidth_mb_per_sec: f64,
    pub backlog_events: u64,
    #[serde(default)]
    pub leftover_sizing: LeftoverSizing,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EnstoreConfig {
    pub capacity_mb: f64,
}

/// Which event size converts leftover tape bandwidth into a count of raw events to stage.
///
/// `Reco` reproduces the historical model, which divides by the reco event size even
/// though the events pulled from tape are raw. `Raw` uses the raw size and so stages
/// more events per tick.
#[derive(Debug, Clone, Copy, PartialEq, Display, Deserialize, Serialize)]
#[display(style = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LeftoverSizing {
    Reco,
    Raw,
}

impl Default for LeftoverSizing {
    fn default() -> Self {
        LeftoverSizing::Reco
    }
}

/// When to stop and how often to report
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RunConfig {
    pub horizon_days: f64,
    pub report_interval_days: f64,
    #[serde(default)]
    pub max_ticks: Option<u64>,
}

impl PipelineConfig {
    pub fn tick(&self) -> Duration {
        Duration(self.tick_secs)
    }

    /// Tape transfer budget for one tick, in MB
    pub fn tape_budget_mb(&self) -> f64 {
        self.tape.bandwidth_mb_per_sec * self.tick_secs
    }

    pub fn validate(&self) -> Result<()> {
        positive("tick_secs", self.tick_secs)?;
        positive("raw_event_size_mb", self.raw_event_size_mb)?;
        positive("reco_event_size_mb", self.reco_event_size_mb)?;
        positive("daq.rate_hz", self.daq.rate_hz)?;
        positive("grid.rate_per_worker_hz", self.grid.rate_per_worker_hz)?;
        positive("tape.bandwidth_mb_per_sec", self.tape.bandwidth_mb_per_sec)?;
        positive("enstore.capacity_mb", self.enstore.capacity_mb)?;
        if self.grid.workers == 0 {
            return Err(Error::InvalidParameter {
                name: "grid.workers".into(),
                reason: "need at least one worker".into(),
            });
        }
        Ok(())
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        positive("run.horizon_days", self.horizon_days)?;
        positive("run.report_interval_days", self.report_interval_days)
    }
}

fn positive(name: &str, value: f64) -> Result<()> {
    // also rejects NaN
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(Error::InvalidParameter {
            name: name.into(),
            reason: format!("must be a positive number, got {}", value),
        })
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tick_secs: 10.0,
            raw_event_size_mb: 40.0,
            reco_event_size_mb: 120.0,
            daq: DaqConfig {
                rate_hz: 0.5,
                arrivals: ArrivalModel::Poisson,
            },
            grid: GridConfig {
                workers: 1000,
                rate_per_worker_hz: 1.0 / 800.0,
            },
            tape: TapeConfig {
                bandwidth_mb_per_sec: 450.0,
                // 120 days of backlog at 5 Hz
                backlog_events: 5 * 3600 * 24 * 120,
                leftover_sizing: LeftoverSizing::Reco,
            },
            enstore: EnstoreConfig { capacity_mb: 50e6 },
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            horizon_days: 120.0,
            report_interval_days: 5.0,
            max_ticks: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn defaults_are_valid() {
        let cfg = PipelineConfig::default();
        cfg.validate().unwrap();
        RunConfig::default().validate().unwrap();
        assert_relative_eq!(cfg.tape_budget_mb(), 4500.0);
        assert_eq!(cfg.tape.backlog_events, 51_840_000);
    }

    #[test]
    fn rejects_non_positive_values() {
        let mut cfg = PipelineConfig::default();
        cfg.tick_secs = 0.0;
        assert!(matches!(
            cfg.validate(),
            Err(Error::InvalidParameter { ref name, .. }) if name == "tick_secs"
        ));

        let mut cfg = PipelineConfig::default();
        cfg.enstore.capacity_mb = f64::NAN;
        assert!(cfg.validate().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.grid.workers = 0;
        assert!(cfg.validate().is_err());
    }
}
