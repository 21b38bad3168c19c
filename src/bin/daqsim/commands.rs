use std::io;

use structopt::StructOpt;

use daqsim::utils::prelude::*;
use daqsim::SimConfig;

/// Should be implemented by individual subcommand
pub trait Cmd {
    fn run(self) -> Result<()>;
}

/// Show the configuration that a run would use
#[derive(StructOpt)]
pub struct Config {}

impl Cmd for Config {
    fn run(self) -> Result<()> {
        let cfg: SimConfig = config().fetch()?;
        print!("{}", serde_yaml::to_string(&cfg)?);
        Ok(())
    }
}

/// Run simulation end-to-end
#[derive(StructOpt)]
pub struct Run {
    /// Seed phrase for the arrival draws
    #[structopt(long)]
    seed: Option<String>,

    /// Simulated days to run for
    #[structopt(long)]
    days: Option<f64>,
}

impl Cmd for Run {
    fn run(self) -> Result<()> {
        {
            let mut cfg = config_mut();
            if let Some(seed) = self.seed {
                cfg.set_override("seed", seed)?;
            }
            if let Some(days) = self.days {
                cfg.set_override("run.horizon_days", days)?;
            }
        }

        let stdout = io::stdout();
        let summary = daqsim::run_sim(stdout.lock())?;
        println!("{}", summary);
        Ok(())
    }
}

/// Step simulation
#[derive(StructOpt)]
pub struct Step {
    /// Number of ticks to advance
    #[structopt(short, long, default_value = "10")]
    ticks: u64,
}

impl Cmd for Step {
    fn run(self) -> Result<()> {
        let cfg: SimConfig = config().fetch()?;
        let mut sim = cfg.build()?;
        for _ in 0..self.ticks {
            let t = sim.step();
            let s = sim.snapshot();
            println!(
                "tick={} t={}s daq={} grid_out={} reco_to_tape={} raw_from_tape={} raw_to_grid={} fill={:.4}%{}",
                t.tick,
                t.time,
                t.daq,
                t.grid_out,
                t.reco_to_tape,
                t.raw_from_tape,
                t.raw_to_grid,
                100.0 * s.enstore.fill,
                if s.enstore.full { " FULL" } else { "" }
            );
        }
        Ok(())
    }
}
