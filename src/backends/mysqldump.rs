//! Dumps MySQL/MariaDB databases using [MysqlDump].

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use super::{relay, DumpError, DumpTool};
use crate::util::process::{self, RunOptions};
use crate::util::CancelToken;

const TARGET: &str = "backend::mysqldump";

/// Runs `mysqldump` once per database.
///
/// User and password are read by `mysqldump` from the `--defaults-extra-file`.
#[derive(Debug, Clone)]
pub struct MysqlDump {
    program: PathBuf,
    dry_run: bool,
}

impl MysqlDump {
    pub fn new(dry_run: bool) -> Self {
        Self::with_program("mysqldump", dry_run)
    }

    /// Use another `mysqldump` compatible executable, e.g. `mariadb-dump`.
    pub fn with_program(program: impl Into<PathBuf>, dry_run: bool) -> Self {
        Self {
            program: program.into(),
            dry_run,
        }
    }

    fn command(&self, credentials: &Path, database: &str) -> Command {
        let mut command = Command::new(&self.program);
        command
            // must be the first option
            .arg(format!("--defaults-extra-file={}", credentials.display()))
            .arg("--flush-logs")
            .arg("--lock-tables")
            .arg("--tz-utc")
            .arg("--databases")
            .arg(database);
        command
    }
}

impl DumpTool for MysqlDump {
    fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn dump(
        &self,
        credentials: &Path,
        database: &str,
        target: &Path,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<(), DumpError> {
        let mut command = self.command(credentials, database);
        if self.dry_run {
            log::info!(target: TARGET, "Dry-run, not running: {command:?} > {}", target.display());
            return Ok(());
        }

        // truncates the dump of the previous run
        let file = File::create(target).map_err(|source| DumpError::Target {
            path: target.to_path_buf(),
            source,
        })?;

        let options = RunOptions::new(cancel).timeout(Some(timeout)).stdout_to(file);
        match process::run(&mut command, options) {
            Ok(output) => {
                relay(TARGET, log::Level::Warn, &output.stderr);
                Ok(())
            }
            Err(e) => {
                // don't leave a truncated dump behind
                if let Err(rm) = fs::remove_file(target) {
                    log::debug!(target: TARGET, "Removing incomplete dump {} failed: {rm}", target.display());
                }
                Err(e.into())
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use super::*;
    use crate::util::ProcessError;

    fn fake_mysqldump(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("mysqldump");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn dump_is_written_to_target() {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_mysqldump(dir.path(), r#"echo "-- dump of $6""#);
        let target = dir.path().join("app.sql");
        fs::write(&target, "stale dump of the previous run\n").unwrap();

        MysqlDump::with_program(program, false)
            .dump(
                Path::new("/etc/my.cnf"),
                "app",
                &target,
                Duration::from_secs(10),
                &CancelToken::new(),
            )
            .unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "-- dump of app\n");
    }

    #[test]
    fn credentials_file_comes_first() {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_mysqldump(dir.path(), r#"echo "$@""#);
        let target = dir.path().join("app.sql");

        MysqlDump::with_program(program, false)
            .dump(
                Path::new("/home/me/.my.cnf"),
                "app",
                &target,
                Duration::from_secs(10),
                &CancelToken::new(),
            )
            .unwrap();

        assert_eq!(
            fs::read_to_string(&target).unwrap().trim(),
            "--defaults-extra-file=/home/me/.my.cnf --flush-logs --lock-tables --tz-utc --databases app"
        );
    }

    #[test]
    fn failed_dump_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_mysqldump(dir.path(), "echo partial; echo 'Access denied' >&2; exit 2");
        let target = dir.path().join("app.sql");

        let err = MysqlDump::with_program(program, false)
            .dump(
                Path::new("/etc/my.cnf"),
                "app",
                &target,
                Duration::from_secs(10),
                &CancelToken::new(),
            )
            .unwrap_err();

        assert!(matches!(
            err,
            DumpError::Process(ProcessError::Failed { ref stderr, .. }) if stderr == "Access denied"
        ));
        assert!(!target.exists());
    }

    #[test]
    fn dry_run_does_not_touch_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("app.sql");

        MysqlDump::with_program("/nonexistent/mysqldump", true)
            .dump(
                Path::new("/etc/my.cnf"),
                "app",
                &target,
                Duration::from_secs(10),
                &CancelToken::new(),
            )
            .unwrap();

        assert!(!target.exists());
    }
}
