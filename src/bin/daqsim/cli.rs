use std::path::PathBuf;

use structopt::clap::AppSettings;
use structopt::StructOpt;

use daqsim::utils::logging::GlobalLoggingContext;
use daqsim::utils::prelude::*;

use crate::commands::{self, Cmd};

#[derive(StructOpt)]
#[structopt(
    name = "daqsim",
    setting = AppSettings::ArgRequiredElseHelp,
    global_setting = AppSettings::VersionlessSubcommands
)]
struct Opt {
    /// Set a custom config file
    #[structopt(short, long, value_name = "FILE", parse(from_os_str))]
    config: Option<PathBuf>,

    /// Apply a named preset from the `presets` config section
    #[structopt(short, long, value_name = "NAME")]
    preset: Option<String>,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(StructOpt)]
enum Command {
    /// Show the effective configuration
    Config(commands::Config),
    /// Run the simulation to its horizon
    Run(commands::Run),
    /// Advance a few ticks and print what moved
    Step(commands::Step),
}

/// Parse the arguments, finish loading config and dispatch the subcommand
pub fn execute(logging: &mut GlobalLoggingContext) -> Result<()> {
    let opt = Opt::from_args();

    {
        let mut cfg = config_mut();
        if let Some(path) = &opt.config {
            cfg.use_file(path)?;
        }
        if let Some(name) = &opt.preset {
            cfg.use_preset(name)?;
        }
    }
    // every subcommand prints its result on stdout
    logging.reconfigure(true)?;

    match opt.cmd {
        Command::Config(c) => c.run(),
        Command::Run(c) => c.run(),
        Command::Step(c) => c.run(),
    }
}
