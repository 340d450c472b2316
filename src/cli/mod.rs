use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::LevelFilter;

use crate::config::DEFAULT_CONFIG_PATH;

/// Exit status on an invalid or unreadable configuration (`EX_CONFIG`).
pub const EXIT_CONFIG: u8 = 78;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Verbosity of the command output.
    #[arg(long)]
    pub verbose: Option<LevelFilter>,

    /// Configuration file describing what to back up.
    #[arg(long, short = 'c', env = "DAILY_BACKUP_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Log what would be done instead of altering anything.
    #[arg(long)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub action: Option<Action>,
}

#[derive(Subcommand, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Dump, archive, sync and notify. (Default)
    #[default]
    Run,
    /// Validate the configuration file and show the enabled stages.
    Check,
}
