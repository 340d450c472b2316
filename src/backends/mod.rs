//! External collaborators of a backup run.
//!
//! Every tool is hidden behind a trait so the stages don't depend on the
//! concrete programs:
//!
//! - [DumpTool]: dump a single database, implemented by [MysqlDump].
//! - [ArchiveEngine]: create and prune archives, implemented by [Borg].
//! - [SyncTool]: mirror a directory to remote storage, implemented by [Rclone].
//! - [Notifier]: deliver a short message, implemented by [PushApi].
//!
//! All implementations support a dry-run mode in which nothing is altered.

pub mod borg;
pub mod mysqldump;
pub mod push;
pub mod rclone;

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use derive_more::{Display, Error, From};

pub use borg::Borg;
pub use mysqldump::MysqlDump;
pub use push::PushApi;
pub use rclone::Rclone;

use crate::config::{NotificationConfig, Secret};
use crate::context::ArchiveName;
use crate::util::retention::RetentionPolicy;
use crate::util::{CancelToken, ProcessError};

/// Dumps a single database into a file.
pub trait DumpTool {
    /// Dump `database` into `target`, replacing any previous dump.
    ///
    /// `credentials` is an option file with user and password.
    fn dump(
        &self,
        credentials: &Path,
        database: &str,
        target: &Path,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<(), DumpError>;

    /// Whether dumps are only logged, in which case nothing on disk may be
    /// altered.
    fn is_dry_run(&self) -> bool {
        false
    }
}

/// Everything needed to create one archive.
#[derive(Debug)]
pub struct CreateArchive<'a> {
    pub repository: &'a str,
    pub name: &'a ArchiveName,
    /// Existing, absolute paths.
    pub paths: &'a [PathBuf],
    pub excludes: &'a [String],
    pub compression: &'a str,
    pub passphrase: Option<&'a Secret>,
    pub timeout: Option<Duration>,
}

/// Deduplicating archive store.
pub trait ArchiveEngine {
    /// Create the archive atomically: it either exists afterwards or the
    /// repository is unchanged.
    fn create(&self, request: &CreateArchive<'_>, cancel: &CancelToken)
        -> Result<(), ArchiveError>;

    /// Delete archives named `{prefix}-{timestamp}` not covered by `policy`.
    fn prune(
        &self,
        repository: &str,
        prefix: &str,
        policy: &RetentionPolicy,
        passphrase: Option<&Secret>,
        cancel: &CancelToken,
    ) -> Result<(), PruneError>;
}

/// One-way mirror of a local directory to remote storage.
pub trait SyncTool {
    fn sync(
        &self,
        local: &Path,
        remote: &str,
        timeout: Option<Duration>,
        cancel: &CancelToken,
    ) -> Result<(), SyncError>;
}

/// Delivers a short text to the operator.
pub trait Notifier {
    fn notify(&self, config: &NotificationConfig, text: &str) -> Result<(), NotifyError>;
}

/// Errors of a single database dump.
#[derive(Debug, Display, Error, From)]
pub enum DumpError {
    /// The dump file can't be created.
    #[display("Creating dump file {} failed: {source}", path.display())]
    Target { path: PathBuf, source: io::Error },
    #[display("{_0}")]
    #[from]
    Process(ProcessError),
}

impl DumpError {
    /// Whether the tool was stopped because the run was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Process(e) if e.is_cancelled())
    }
}

/// Errors on archive creation.
#[derive(Debug, Display, Error, From)]
pub enum ArchiveError {
    /// Paths or repository location can't be resolved.
    #[display("Resolving {what} failed: {source}")]
    Resolve { what: String, source: io::Error },
    #[display("{_0}")]
    #[from]
    Process(ProcessError),
}

impl ArchiveError {
    /// Whether the tool was stopped because the run was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Process(e) if e.is_cancelled())
    }
}

/// Errors on pruning old archives.
#[derive(Debug, Display, Error, From)]
pub enum PruneError {
    /// The repository location can't be resolved.
    #[display("Resolving {what} failed: {source}")]
    Resolve { what: String, source: io::Error },
    #[display("{_0}")]
    #[from]
    Process(ProcessError),
}

/// Errors on mirroring to remote storage.
#[derive(Debug, Display, Error, From)]
pub enum SyncError {
    /// The local path can't be resolved.
    #[display("Resolving {} failed: {source}", path.display())]
    Resolve { path: PathBuf, source: io::Error },
    #[display("{_0}")]
    #[from]
    Process(ProcessError),
}

impl SyncError {
    /// Whether the tool was stopped because the run was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Process(e) if e.is_cancelled())
    }
}

/// Errors on delivering a notification.
#[derive(Debug, Display, Error, From)]
pub enum NotifyError {
    /// The request didn't reach the API or the response wasn't JSON.
    #[display("Push request failed: {_0}")]
    #[from]
    Transport(reqwest::Error),
    /// The API answered, but didn't confirm delivery.
    #[display("Push API did not confirm delivery (code: {})", code.map_or("none".to_string(), |c| c.to_string()))]
    Rejected { code: Option<i64> },
}

/// Log every line of a tool's output under `target`.
pub(crate) fn relay(target: &str, level: log::Level, output: &str) {
    for line in output.lines().filter(|line| !line.trim().is_empty()) {
        log::log!(target: target, level, "{line}");
    }
}
