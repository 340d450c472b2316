//! Dumps the configured databases into `{directory}/{database}.sql`.

use std::path::Path;
use std::time::Duration;

use crate::backends::DumpTool;
use crate::config::{DatabaseNames, MysqlConfig};
use crate::stages::{ItemFailure, StageResult};
use crate::util::{expand_path, CancelToken};

const TARGET: &str = "stage::dump";

/// Dump every database in `databases` into `output_directory`.
///
/// A failing database is recorded in [StageResult::failures] and the
/// remaining databases are dumped anyway. Dumps of earlier runs are
/// overwritten. Databases not reached because of cancellation are recorded
/// as failures, too.
pub fn dump(
    tool: &dyn DumpTool,
    credentials: &Path,
    databases: &DatabaseNames,
    output_directory: &Path,
    timeout: Duration,
    cancel: &CancelToken,
) -> StageResult {
    let mut result = StageResult::default();

    let resolved = expand_path(credentials).and_then(|credentials| {
        let directory = expand_path(output_directory)?;
        if !tool.is_dry_run() {
            std::fs::create_dir_all(&directory)?;
        } else if !directory.is_dir() {
            log::info!(target: TARGET, "Dry-run, not creating {}", directory.display());
        }
        Ok((credentials, directory))
    });
    let (credentials, directory) = match resolved {
        Ok(resolved) => resolved,
        Err(e) => {
            log::error!(target: TARGET, "Preparing dump directory {} failed: {e}", output_directory.display());
            result.failures = databases
                .iter()
                .map(|database| ItemFailure::new(database, &e))
                .collect();
            return result;
        }
    };

    log::info!(target: TARGET, "Dumping {} database(s) into {}", databases.len(), directory.display());
    for database in databases {
        if cancel.is_cancelled() {
            result.interrupted = true;
            result
                .failures
                .push(ItemFailure::new(database, "interrupted"));
            continue;
        }

        let target = directory.join(format!("{database}.sql"));
        match tool.dump(&credentials, database, &target, timeout, cancel) {
            Ok(()) => {
                log::info!(target: TARGET, "Database {database} dumped");
                result.produced.insert(target);
            }
            Err(e) => {
                result.interrupted |= e.is_cancelled();
                log::error!(target: TARGET, "Failed to dump database {database}: {e}");
                result.failures.push(ItemFailure::new(database, e));
            }
        }
    }

    result
}

/// [dump] with the settings of the `mysql` section.
pub fn run(tool: &dyn DumpTool, config: &MysqlConfig, cancel: &CancelToken) -> StageResult {
    dump(
        tool,
        &config.defaults_extra_file,
        &config.databases,
        &config.directory,
        config.timeout,
        cancel,
    )
}
