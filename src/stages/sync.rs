//! Mirrors the local archive repository to remote storage.

use std::path::Path;
use std::time::Duration;

use crate::backends::{SyncError, SyncTool};
use crate::config::SyncConfig;
use crate::util::{expand_path, CancelToken};

const TARGET: &str = "stage::sync";

/// Make `remote_path` match `local_path`.
pub fn sync(
    tool: &dyn SyncTool,
    local_path: &Path,
    remote_path: &str,
    timeout: Option<Duration>,
    cancel: &CancelToken,
) -> Result<(), SyncError> {
    let local_path = expand_path(local_path).map_err(|source| SyncError::Resolve {
        path: local_path.to_path_buf(),
        source,
    })?;

    log::info!(target: TARGET, "Syncing {} to {remote_path}", local_path.display());
    tool.sync(&local_path, remote_path, timeout, cancel)?;
    log::info!(target: TARGET, "Synced {} to {remote_path}", local_path.display());

    Ok(())
}

/// [sync] with the settings of the `sync` section.
pub fn run(tool: &dyn SyncTool, config: &SyncConfig, cancel: &CancelToken) -> Result<(), SyncError> {
    sync(
        tool,
        &config.local_path,
        &config.remote_path,
        config.timeout,
        cancel,
    )
}
