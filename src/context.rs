//! Per-run values that are computed once when a run starts.

use std::fmt;
use std::process::Command;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use derive_more::{Display, Error};
use regex::Regex;

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

static ARCHIVE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?<prefix>.+)-(?<timestamp>\d{14})$").unwrap());

/// Identity of one pipeline run.
///
/// The archive prefix defaults to the hostname, so every host prunes only its
/// own archives in a shared repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    hostname: String,
    prefix: String,
    started_at: DateTime<Utc>,
}

impl RunContext {
    pub fn new(hostname: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        let hostname = hostname.into().trim().to_string();
        Self {
            prefix: hostname.clone(),
            hostname,
            started_at,
        }
    }

    /// Context for a run starting now on this machine.
    pub fn detect() -> Self {
        Self::new(detect_hostname(), Utc::now())
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Prefix shared by all archives of this host.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Name of the archive created by this run.
    pub fn archive_name(&self) -> ArchiveName {
        ArchiveName {
            prefix: self.prefix.clone(),
            timestamp: self.started_at.naive_utc(),
        }
    }
}

fn detect_hostname() -> String {
    let from_command = Command::new("hostname")
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string());

    from_command
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| {
            log::warn!(target: "context", "Unable to determine hostname, using 'localhost'");
            "localhost".to_string()
        })
}

/// Name of an archive: `{prefix}-{YYYYMMDDHHMMSS}` with the timestamp in UTC.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchiveName {
    prefix: String,
    timestamp: NaiveDateTime,
}

impl ArchiveName {
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// UTC creation time encoded in the name.
    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }
}

impl fmt::Display for ArchiveName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            self.prefix,
            self.timestamp.format(TIMESTAMP_FORMAT)
        )
    }
}

/// The string is not of the form `{prefix}-{YYYYMMDDHHMMSS}`.
#[derive(Debug, Display, Error)]
#[display("Not an archive name: {_0}")]
pub struct InvalidArchiveName(#[error(ignore)] String);

impl FromStr for ArchiveName {
    type Err = InvalidArchiveName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidArchiveName(s.to_string());
        let captures = ARCHIVE_NAME.captures(s.trim()).ok_or_else(invalid)?;

        let timestamp = NaiveDateTime::parse_from_str(&captures["timestamp"], TIMESTAMP_FORMAT)
            .map_err(|_| invalid())?;

        Ok(Self {
            prefix: captures["prefix"].to_string(),
            timestamp,
        })
    }
}
