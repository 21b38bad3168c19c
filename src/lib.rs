use std::io;

use rand_seeder::{Seeder, SipRng};

use crate::config::AppConfigExt;
use crate::report::Reporter;
use crate::sim::{PipelineConfig, RunConfig, Simulation};
use crate::utils::prelude::*;

mod config;
pub mod nodes;
pub mod randvars;
pub mod report;
pub mod sim;
pub mod types;
pub mod utils;

pub use crate::report::RunSummary;
pub use crate::types::DataPacket;

/// Seed phrase used when the config has none, so plain runs are reproducible
const DEFAULT_SEED: &str = "tape drive hum";

/// Everything a run reads from the app config
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct SimConfig {
    pub seed: Option<String>,
    pub pipeline: PipelineConfig,
    pub run: RunConfig,
}

impl SimConfig {
    /// A simulation with the configured arrival model, seeded from `seed`
    pub fn build(&self) -> Result<Simulation> {
        let seed = self.seed.as_deref().unwrap_or(DEFAULT_SEED);
        info!(seed, "seeding arrivals");
        let rng: SipRng = Seeder::from(seed).make_rng();
        let counts = randvars::from_config(self.pipeline.daq.arrivals, rng);
        Simulation::new(self.pipeline.clone(), counts)
    }
}

/// Run the configured simulation to its horizon, printing status reports to `out`
pub fn run_sim(out: impl io::Write) -> Result<RunSummary> {
    let _g = info_span!("sim").entered();

    let cfg: SimConfig = config().fetch()?;
    let output_dir = config().output_dir()?;

    let mut reporter = Reporter::new(cfg.run.report_interval_days, out);
    if let Some(dir) = &output_dir {
        reporter = reporter.with_trace(dir.file("report.csv")?)?;
    }

    let mut sim = cfg.build()?;
    sim.run(&cfg.run, &mut reporter)?;

    let summary = reporter.finish()?;
    info!(
        ticks = summary.ticks,
        reco_to_tape = summary.totals.reco_to_tape,
        raw_from_tape = summary.totals.raw_from_tape,
        full_ticks = summary.totals.full_ticks,
        "summary"
    );

    if let Some(dir) = &output_dir {
        let _g = info_span!("output").entered();
        report::render_summary(dir.file("summary.json")?, &summary, &cfg)?;
    }

    Ok(summary)
}
