use std::path::PathBuf;
use clap::{Parser, Subcommand};

use crate::device::types::{BatteryLevel, LedRoutine};
use crate::error::ArgumentError;

fn parse_routine(value: &str) -> Result<LedRoutine, ArgumentError> {
    let index: usize = value.trim().parse()?;
    LedRoutine::try_from(index)
}

fn parse_level(value: &str) -> Result<BatteryLevel, ArgumentError> {
    let fraction: f64 = value.trim().parse()?;
    Ok(BatteryLevel::new(fraction))
}

#[derive(Parser, Debug)]
#[command(author, version)]
#[command(about = "Mirrors this machine's battery level to a BatteryMonitor peripheral and switches its LED routines", long_about = None)]
pub struct Args {
    /// Read the configuration from this file instead of the default location
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Report this battery level (0 to 1) instead of reading the power supply
    #[arg(long, global = true, value_parser = parse_level)]
    pub level: Option<BatteryLevel>,

    /// Log debug messages
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CliCommand {
    /// Connect and push the battery level periodically until interrupted (the default)
    Run {
        /// Switch to this LED routine (index) after every successful connect
        #[arg(long, value_parser = parse_routine)]
        routine: Option<LedRoutine>,

        /// Exit when the connection fails or drops instead of reconnecting
        #[arg(long)]
        no_reconnect: bool,
    },

    /// Connect, switch the LED routine and disconnect
    Led {
        /// Index of the routine, see `routines`
        #[arg(value_parser = parse_routine)]
        routine: LedRoutine,
    },

    /// List the LED routines and their indices
    Routines,
}

impl Default for CliCommand {
    fn default() -> Self {
        CliCommand::Run { routine: None, no_reconnect: false }
    }
}
