//! Sequences the stages of one backup run.
//!
//! ```text
//! Idle → ConfigLoaded → DumpDone? → ArchiveDone? → SyncDone? → Notified? → Terminal
//! ```
//!
//! Stages whose section is absent are skipped. Only the archive stage decides
//! whether a run succeeded: failed dumps or a failed sync are logged, but the
//! archive created from whatever is there is the result that counts.
//! A notification is sent once, and only if an archive was attempted or the
//! run was interrupted. A run counts as interrupted only if cancellation
//! skipped a configured stage or stopped a running tool.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use crate::backends::{ArchiveEngine, DumpTool, Notifier, SyncTool};
use crate::config::BackupConfiguration;
use crate::context::RunContext;
use crate::stages::{self, StageResult};
use crate::util::CancelToken;

const TARGET: &str = "pipeline";

/// Exit status of an interrupted run.
pub const EXIT_INTERRUPTED: u8 = 130;

/// Progress of a run.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Stage {
    Idle,
    ConfigLoaded,
    DumpDone,
    ArchiveDone,
    SyncDone,
    Notified,
    Terminal,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Headline result of a run, source of the single notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutcome {
    pub succeeded: bool,
    pub archive_identifier: Option<String>,
    pub error_detail: Option<String>,
}

impl PipelineOutcome {
    pub fn success(archive_identifier: String) -> Self {
        Self {
            succeeded: true,
            archive_identifier: Some(archive_identifier),
            error_detail: None,
        }
    }

    pub fn failure(detail: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            archive_identifier: None,
            error_detail: Some(detail.into()),
        }
    }
}

/// The external collaborators used by a run.
#[derive(Clone, Copy)]
pub struct Backends<'a> {
    pub dump: &'a dyn DumpTool,
    pub archive: &'a dyn ArchiveEngine,
    pub sync: &'a dyn SyncTool,
    pub notifier: &'a dyn Notifier,
}

/// Everything a finished run has to tell.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Result of the dump stage, if it ran.
    pub dump: Option<StageResult>,
    /// Result of the sync stage, if it ran.
    pub sync: Option<Result<(), String>>,
    /// `None` if neither an archive was attempted nor the run was interrupted.
    pub outcome: Option<PipelineOutcome>,
    /// Whether the notification was confirmed, if one was sent.
    pub notified: Option<bool>,
    pub interrupted: bool,
    /// States passed through, in order.
    pub trail: Vec<Stage>,
}

impl RunReport {
    fn new() -> Self {
        Self {
            dump: None,
            sync: None,
            outcome: None,
            notified: None,
            interrupted: false,
            trail: vec![Stage::Idle],
        }
    }

    fn enter(&mut self, stage: Stage) {
        log::debug!(target: TARGET, "Entering state {stage}");
        self.trail.push(stage);
    }

    /// Process exit status: a completed run exits with `0` regardless of
    /// partial failures.
    pub fn exit_code(&self) -> u8 {
        if self.interrupted {
            EXIT_INTERRUPTED
        } else {
            0
        }
    }
}

fn interrupt(report: &mut RunReport) {
    if !report.interrupted {
        log::warn!(target: TARGET, "Run interrupted, skipping remaining stages");
        report.interrupted = true;
    }
}

/// One backup run over a loaded [BackupConfiguration].
pub struct Pipeline<'a> {
    config: &'a BackupConfiguration,
    ctx: RunContext,
    backends: Backends<'a>,
    cancel: CancelToken,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a BackupConfiguration,
        ctx: RunContext,
        backends: Backends<'a>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            config,
            ctx,
            backends,
            cancel,
        }
    }

    /// Whether a configured stage has to be skipped because the run was
    /// cancelled.
    fn skip_stage(&self, report: &mut RunReport) -> bool {
        if self.cancel.is_cancelled() {
            interrupt(report);
        }
        report.interrupted
    }

    /// Run all configured stages in order.
    pub fn run(&self) -> RunReport {
        let Self {
            config,
            ctx,
            backends,
            cancel,
        } = self;

        let mut report = RunReport::new();
        report.enter(Stage::ConfigLoaded);
        log::info!(
            target: TARGET,
            "Starting backup of {} with stages: {}",
            ctx.hostname(),
            config.enabled_stages().join(", ")
        );

        let mut dumps = BTreeSet::<PathBuf>::new();
        if let Some(mysql) = &config.mysql {
            if !self.skip_stage(&mut report) {
                let result = stages::dump::run(backends.dump, mysql, cancel);
                if !result.is_complete() {
                    log::warn!(
                        target: TARGET,
                        "{} of {} database dump(s) failed",
                        result.failures.len(),
                        mysql.databases.len()
                    );
                }
                if result.interrupted {
                    interrupt(&mut report);
                }
                dumps.clone_from(&result.produced);
                report.dump = Some(result);
                report.enter(Stage::DumpDone);
            }
        }

        let mut archive_identifier = None;
        if let Some(archive) = &config.archive {
            if !self.skip_stage(&mut report) {
                let outcome =
                    match stages::archive::run(backends.archive, archive, ctx, &dumps, cancel) {
                        Ok(id) => {
                            archive_identifier = Some(id.to_string());
                            PipelineOutcome::success(id.to_string())
                        }
                        Err(e) => {
                            if e.is_cancelled() {
                                interrupt(&mut report);
                            }
                            log::error!(target: TARGET, "Creating the archive failed: {e}");
                            PipelineOutcome::failure(e.to_string())
                        }
                    };
                report.outcome = Some(outcome);
                report.enter(Stage::ArchiveDone);
            }
        }

        if let Some(sync) = &config.sync {
            if !self.skip_stage(&mut report) {
                let result = stages::sync::run(backends.sync, sync, cancel).map_err(|e| {
                    if e.is_cancelled() {
                        interrupt(&mut report);
                    }
                    log::error!(target: TARGET, "Syncing the repository failed: {e}");
                    e.to_string()
                });
                report.sync = Some(result);
                report.enter(Stage::SyncDone);
            }
        }

        if report.interrupted {
            report.outcome = Some(PipelineOutcome {
                archive_identifier,
                ..PipelineOutcome::failure("backup run was interrupted")
            });
        }

        match (&report.outcome, &config.notification) {
            (Some(outcome), Some(notification)) => {
                let message = stages::notify::message(ctx, outcome);
                let delivered = stages::notify::notify(backends.notifier, notification, &message);
                report.notified = Some(delivered);
                report.enter(Stage::Notified);
            }
            (Some(_), None) => {
                log::debug!(target: TARGET, "No notification configured");
            }
            (None, _) => {
                log::debug!(target: TARGET, "No archive attempted, nothing to notify");
            }
        }

        match &report.outcome {
            Some(outcome) if outcome.succeeded => {
                log::info!(target: TARGET, "Backup finished: {}", outcome.archive_identifier.as_deref().unwrap_or_default());
            }
            Some(outcome) => {
                log::error!(target: TARGET, "Backup failed: {}", outcome.error_detail.as_deref().unwrap_or_default());
            }
            None => log::info!(target: TARGET, "Backup finished without archive"),
        }
        report.enter(Stage::Terminal);

        report
    }
}
