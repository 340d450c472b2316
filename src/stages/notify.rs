//! Tells the operator how the run went.

use crate::backends::Notifier;
use crate::config::NotificationConfig;
use crate::context::RunContext;
use crate::pipeline::PipelineOutcome;

const TARGET: &str = "stage::notify";

const PREFIX: &str = "*BackupBot*: ";

/// Text of the notification for `outcome`.
///
/// Success and failure texts are mutually exclusive and chosen only by
/// [PipelineOutcome::succeeded].
pub fn message(ctx: &RunContext, outcome: &PipelineOutcome) -> String {
    let hostname = ctx.hostname();
    if outcome.succeeded {
        let archive = outcome.archive_identifier.as_deref().unwrap_or("unknown");
        format!("{PREFIX}Daily backup of host `{hostname}` succeeded, archive `{archive}`")
    } else {
        let detail = outcome.error_detail.as_deref().unwrap_or("unknown error");
        format!("{PREFIX}Daily backup of host `{hostname}` failed: {detail}")
    }
}

/// Deliver `message`, returns whether the API confirmed the delivery.
///
/// Failures are logged and never escalated.
pub fn notify(notifier: &dyn Notifier, config: &NotificationConfig, message: &str) -> bool {
    match notifier.notify(config, message) {
        Ok(()) => {
            log::info!(target: TARGET, "Notification delivered");
            true
        }
        Err(e) => {
            log::error!(target: TARGET, "Notification could not be delivered: {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn ctx() -> RunContext {
        RunContext::new("web-01", Utc.with_ymd_and_hms(2026, 10, 18, 3, 4, 5).unwrap())
    }

    #[test]
    fn success_message_names_the_archive() {
        let outcome = PipelineOutcome::success("/srv/borg::web-01-20261018030405".to_string());

        assert_eq!(
            message(&ctx(), &outcome),
            "*BackupBot*: Daily backup of host `web-01` succeeded, archive `/srv/borg::web-01-20261018030405`"
        );
    }

    #[test]
    fn failure_message_carries_the_error() {
        let outcome = PipelineOutcome::failure("borg failed (exit status: 2): repository locked");

        let text = message(&ctx(), &outcome);
        assert_eq!(
            text,
            "*BackupBot*: Daily backup of host `web-01` failed: borg failed (exit status: 2): repository locked"
        );
        assert!(!text.contains("succeeded"));
    }
}
