use std::process::ExitCode;

use clap::Parser;

use daily_backup_lib::backends::{Borg, MysqlDump, PushApi, Rclone};
use daily_backup_lib::cli::{Action, Cli, EXIT_CONFIG};
use daily_backup_lib::config;
use daily_backup_lib::context::RunContext;
use daily_backup_lib::pipeline::{Backends, Pipeline};
use daily_backup_lib::util::CancelToken;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // init logger
    let mut env_logger = env_logger::builder();
    if let Some(level) = cli.verbose {
        env_logger.filter_level(level);
    } else if std::env::var_os("RUST_LOG").is_none() {
        env_logger.filter_level(log::LevelFilter::Info);
    }
    if let Err(e) = env_logger.try_init() {
        eprintln!("Initializing the logger failed: {e}");
    }

    let config = match config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            log::error!("Failed to load configuration file: {e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    if cli.action.unwrap_or_default() == Action::Check {
        print!("{config}");
        println!("Configuration is valid, enabled stages: {}", config.enabled_stages().join(", "));
        return ExitCode::SUCCESS;
    }

    let dry_run = cli.dry_run;
    if dry_run {
        log::warn!("Running in dry-run mode");
    }

    let cancel = CancelToken::new();
    let handler_cancel = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        log::warn!("Received termination signal, aborting the run");
        handler_cancel.cancel();
    }) {
        log::warn!("Installing the signal handler failed, the run can't be interrupted cleanly: {e}");
    }

    let mysqldump = MysqlDump::new(dry_run);
    let borg = Borg::new(dry_run);
    let rclone = Rclone::new(dry_run);
    let push = PushApi::new(dry_run);
    let backends = Backends {
        dump: &mysqldump,
        archive: &borg,
        sync: &rclone,
        notifier: &push,
    };

    let report = Pipeline::new(&config, RunContext::detect(), backends, cancel).run();
    ExitCode::from(report.exit_code())
}
