//! Mirrors the archive repository to cloud storage using [Rclone](https://rclone.org/).

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use super::{relay, SyncError, SyncTool};
use crate::util::process::{self, RunOptions};
use crate::util::CancelToken;

const TARGET: &str = "backend::rclone";

/// Wraps `rclone sync`.
///
/// The remote has to be configured in rclone beforehand. In dry-run mode
/// rclone's own `--dry-run` is used, so the transfer plan is still logged.
#[derive(Debug, Clone)]
pub struct Rclone {
    program: PathBuf,
    dry_run: bool,
}

impl Rclone {
    pub fn new(dry_run: bool) -> Self {
        Self::with_program("rclone", dry_run)
    }

    pub fn with_program(program: impl Into<PathBuf>, dry_run: bool) -> Self {
        Self {
            program: program.into(),
            dry_run,
        }
    }
}

impl SyncTool for Rclone {
    fn sync(
        &self,
        local: &Path,
        remote: &str,
        timeout: Option<Duration>,
        cancel: &CancelToken,
    ) -> Result<(), SyncError> {
        let mut command = Command::new(&self.program);
        command.arg("sync");
        if self.dry_run {
            command.arg("--dry-run");
        }
        command.arg(local).arg(remote);

        let output = process::run(&mut command, RunOptions::new(cancel).timeout(timeout))?;
        relay(TARGET, log::Level::Info, &output.stdout);
        relay(TARGET, log::Level::Info, &output.stderr);

        Ok(())
    }
}
