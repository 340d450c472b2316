//! Creates and prunes archives using [Borg](https://borgbackup.readthedocs.io/).

use std::path::PathBuf;
use std::process::Command;

use super::{relay, ArchiveEngine, ArchiveError, CreateArchive, PruneError};
use crate::config::Secret;
use crate::context::ArchiveName;
use crate::util::process::{self, Output, RunOptions};
use crate::util::retention::{Retention, RetentionPolicy};
use crate::util::{CancelToken, ProcessError};

const TARGET: &str = "backend::borg";

/// Borg reports warnings, e.g. a file vanished while reading, with exit code 1.
/// The archive is complete nevertheless.
const WARNING_EXIT_CODE: i32 = 1;

/// Wraps the `borg` executable.
///
/// The passphrase is handed over in the `BORG_PASSPHRASE` environment
/// variable of the child process only, so it never shows up in the process
/// list.
#[derive(Debug, Clone)]
pub struct Borg {
    program: PathBuf,
    dry_run: bool,
}

impl Borg {
    pub fn new(dry_run: bool) -> Self {
        Self::with_program("borg", dry_run)
    }

    pub fn with_program(program: impl Into<PathBuf>, dry_run: bool) -> Self {
        Self {
            program: program.into(),
            dry_run,
        }
    }

    fn command(&self, passphrase: Option<&Secret>) -> Command {
        let mut command = Command::new(&self.program);
        if let Some(passphrase) = passphrase {
            command.env("BORG_PASSPHRASE", passphrase.expose());
        }
        command
    }

    fn run(&self, command: &mut Command, options: RunOptions) -> Result<Output, ProcessError> {
        match process::run(command, options) {
            Ok(output) => {
                relay(TARGET, log::Level::Info, &output.stderr);
                Ok(output)
            }
            Err(ProcessError::Failed { status, stderr, .. })
                if status.code() == Some(WARNING_EXIT_CODE) =>
            {
                relay(TARGET, log::Level::Warn, &stderr);
                log::warn!(target: TARGET, "borg finished with warnings");
                Ok(Output {
                    stdout: String::new(),
                    stderr,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Archives of `prefix` in `repository` that a prune would delete,
    /// newest first.
    ///
    /// Only lists the repository, nothing is deleted.
    pub fn prune_preview(
        &self,
        repository: &str,
        prefix: &str,
        policy: &RetentionPolicy,
        passphrase: Option<&Secret>,
        cancel: &CancelToken,
    ) -> Result<Vec<ArchiveName>, PruneError> {
        let mut command = self.command(passphrase);
        command
            .arg("list")
            .arg("--short")
            .arg("--glob-archives")
            .arg(archive_glob(prefix))
            .arg(repository);

        let output = self.run(&mut command, RunOptions::new(cancel))?;
        let archives: Vec<ArchiveName> = output
            .stdout
            .lines()
            .filter_map(|line| line.parse::<ArchiveName>().ok())
            .filter(|name: &ArchiveName| name.prefix() == prefix)
            .collect();

        let (_, pruned) = Retention::new(*policy)
            .keep_oldest()
            .partition(archives, ArchiveName::timestamp);
        Ok(pruned)
    }
}

/// Glob matching exactly the archives named `{prefix}-{YYYYMMDDHHMMSS}`.
fn archive_glob(prefix: &str) -> String {
    format!("{prefix}-{}", "[0-9]".repeat(14))
}

impl ArchiveEngine for Borg {
    fn create(
        &self,
        request: &CreateArchive<'_>,
        cancel: &CancelToken,
    ) -> Result<(), ArchiveError> {
        let mut command = self.command(request.passphrase);
        command
            .arg("create")
            .arg("--stats")
            .arg("--compression")
            .arg(request.compression)
            .arg(format!("{}::{}", request.repository, request.name))
            .args(request.paths);
        for exclude in request.excludes {
            command.arg("--exclude").arg(exclude);
        }

        if self.dry_run {
            log::info!(target: TARGET, "Dry-run, not running: {:?} {:?}", command.get_program(), command.get_args().collect::<Vec<_>>());
            return Ok(());
        }

        self.run(&mut command, RunOptions::new(cancel).timeout(request.timeout))?;
        Ok(())
    }

    fn prune(
        &self,
        repository: &str,
        prefix: &str,
        policy: &RetentionPolicy,
        passphrase: Option<&Secret>,
        cancel: &CancelToken,
    ) -> Result<(), PruneError> {
        if self.dry_run {
            let pruned = self.prune_preview(repository, prefix, policy, passphrase, cancel)?;
            if pruned.is_empty() {
                log::info!(target: TARGET, "Dry-run, no archive would be pruned");
            }
            for name in pruned {
                log::info!(target: TARGET, "Dry-run, would prune: {name}");
            }
            return Ok(());
        }

        let mut command = self.command(passphrase);
        command
            .arg("prune")
            .arg("--verbose")
            .arg("--list")
            .arg("--glob-archives")
            .arg(archive_glob(prefix))
            .arg(format!("--keep-daily={}", policy.daily))
            .arg(format!("--keep-weekly={}", policy.weekly))
            .arg(format!("--keep-monthly={}", policy.monthly))
            .arg(repository);

        self.run(&mut command, RunOptions::new(cancel))?;
        Ok(())
    }
}
