//! Pushes messages to the operator through an HTTP push API.

use reqwest::blocking::Client;
use serde_json::Value;

use super::{Notifier, NotifyError};
use crate::config::NotificationConfig;

const TARGET: &str = "backend::push";

/// `code` value of the JSON response confirming delivery.
const DELIVERED: i64 = 200;

/// Posts `code` and `text` form-encoded to the configured endpoint.
#[derive(Debug, Clone)]
pub struct PushApi {
    client: Client,
    dry_run: bool,
}

impl PushApi {
    pub fn new(dry_run: bool) -> Self {
        Self {
            client: Client::new(),
            dry_run,
        }
    }
}

impl Notifier for PushApi {
    fn notify(&self, config: &NotificationConfig, text: &str) -> Result<(), NotifyError> {
        if self.dry_run {
            log::info!(target: TARGET, "Dry-run, not pushing to {}: {text}", config.endpoint);
            return Ok(());
        }

        log::debug!(target: TARGET, "Pushing notification to {}", config.endpoint);
        let response: Value = self
            .client
            .post(&config.endpoint)
            .timeout(config.timeout)
            .form(&[("code", config.push_code.expose()), ("text", text)])
            .send()?
            .json()?;

        confirm_delivery(&response)
    }
}

fn confirm_delivery(response: &Value) -> Result<(), NotifyError> {
    match response.get("code").and_then(Value::as_i64) {
        Some(DELIVERED) => Ok(()),
        code => Err(NotifyError::Rejected { code }),
    }
}
