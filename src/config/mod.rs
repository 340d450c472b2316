//! Configuration model of a backup run.
//!
//! The configuration file is TOML with one optional table per stage:
//!
//! ```toml
//! [mysql]
//! defaults_extra_file = "~/.my.cnf"
//! databases = [
//!     "nextcloud",
//!     "wiki",
//! ]
//! directory = "~/db_dumps"
//!
//! [archive]
//! repo = "/srv/borg"
//! passphrase = "my borg passphrase"
//! directories = ["~/db_dumps", "~/projects"]
//! files = ["~/.vimrc", "/etc/fstab"]
//! excludes = ["*.pyc", "*.swp"]
//!
//! [sync]
//! local_path = "/srv/borg"
//! remote_path = "dropbox:backups"
//!
//! [notification]
//! push_code = "my push code"
//! ```
//!
//! A missing table disables its stage. A present table must carry all of its
//! required keys, otherwise loading fails before anything is run.
//! Paths are kept as written and resolved by the stages using them.

mod values;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use derive_more::{Display, Error};

pub use values::{DatabaseNames, Secret, ValueList};

use crate::util::expand_path;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "~/.daily_backup.toml";

/// Default endpoint of the push notification API.
pub const DEFAULT_PUSH_ENDPOINT: &str = "https://eth.api.mynook.info/push";

/// Default borg compression.
pub const DEFAULT_COMPRESSION: &str = "zlib,5";

const DEFAULT_DUMP_TIMEOUT: Duration = Duration::from_secs(30 * 60);
const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors on loading the [BackupConfiguration].
#[derive(Debug, Display, Error)]
pub enum ConfigError {
    /// The file can't be read.
    #[display("Reading the config file {} failed: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    /// The file is no valid TOML or a value has the wrong type.
    #[display("Parsing the config file failed: {_0}")]
    Parse(toml::de::Error),
    /// A required key of a present section is absent or blank.
    #[display("Missing value for option {field} in section {section}")]
    MissingField {
        section: &'static str,
        field: &'static str,
    },
    /// A multi-value key was given a single value.
    #[display("Option {field} in section {section} must be a list, e.g. {field} = [\"...\"]")]
    NotAList {
        section: &'static str,
        field: &'static str,
    },
    /// A value is present but unusable.
    #[display("Invalid value for option {field} in section {section}: {reason}")]
    Invalid {
        section: &'static str,
        field: &'static str,
        reason: String,
    },
}

/// Immutable configuration of one run.
#[derive(Debug, Clone, Default)]
pub struct BackupConfiguration {
    pub mysql: Option<MysqlConfig>,
    pub archive: Option<ArchiveConfig>,
    pub sync: Option<SyncConfig>,
    pub notification: Option<NotificationConfig>,
}

/// Settings of the database dump stage.
#[derive(Debug, Clone)]
pub struct MysqlConfig {
    /// Option file holding user and password for `mysqldump`.
    pub defaults_extra_file: PathBuf,
    pub databases: DatabaseNames,
    /// Directory receiving one `{database}.sql` per database.
    pub directory: PathBuf,
    /// Time limit of a single database dump.
    pub timeout: Duration,
}

/// Settings of the archive stage.
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    /// Borg repository, a local path or a remote location.
    pub repository: String,
    pub passphrase: Secret,
    pub directories: Vec<PathBuf>,
    pub files: Vec<PathBuf>,
    /// Borg exclude patterns.
    pub excludes: ValueList,
    pub compression: String,
    pub timeout: Option<Duration>,
}

/// Settings of the sync stage.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub local_path: PathBuf,
    /// Rclone remote, e.g. `dropbox:backups/host`.
    pub remote_path: String,
    pub timeout: Option<Duration>,
}

/// Settings of the notification stage.
#[derive(Debug, Clone)]
pub struct NotificationConfig {
    pub push_code: Secret,
    pub endpoint: String,
    pub timeout: Duration,
}

/// Load and validate the configuration file at `path`.
///
/// A leading `~` in `path` is resolved to the home directory.
pub fn load(path: &Path) -> Result<BackupConfiguration, ConfigError> {
    let read_error = |source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    };
    let path = expand_path(path).map_err(read_error)?;
    let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;

    log::debug!(target: "config", "Loaded configuration from {}", path.display());
    content.parse()
}

impl FromStr for BackupConfiguration {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw: raw::Config = toml::from_str(s).map_err(ConfigError::Parse)?;
        raw.validate()
    }
}

impl BackupConfiguration {
    /// Names of the enabled stages in execution order.
    pub fn enabled_stages(&self) -> Vec<&'static str> {
        [
            self.mysql.as_ref().map(|_| "mysql"),
            self.archive.as_ref().map(|_| "archive"),
            self.sync.as_ref().map(|_| "sync"),
            self.notification.as_ref().map(|_| "notification"),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

impl fmt::Display for BackupConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(mysql) = &self.mysql {
            let databases: Vec<_> = mysql.databases.iter().map(String::as_str).collect();
            writeln!(
                f,
                "mysql: dump {} into {}",
                databases.join(", "),
                mysql.directory.display()
            )?;
        }
        if let Some(archive) = &self.archive {
            writeln!(
                f,
                "archive: {} directories, {} files, {} excludes into {}",
                archive.directories.len(),
                archive.files.len(),
                archive.excludes.len(),
                archive.repository
            )?;
        }
        if let Some(sync) = &self.sync {
            writeln!(
                f,
                "sync: {} -> {}",
                sync.local_path.display(),
                sync.remote_path
            )?;
        }
        if let Some(notification) = &self.notification {
            writeln!(f, "notification: {}", notification.endpoint)?;
        }
        Ok(())
    }
}

/// Serde representation of the file before validation.
mod raw {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Default, Deserialize)]
    pub(super) struct Config {
        mysql: Option<Mysql>,
        #[serde(alias = "borg")]
        archive: Option<Archive>,
        #[serde(alias = "rclone")]
        sync: Option<SyncSection>,
        notification: Option<Notification>,
    }

    #[derive(Debug, Deserialize)]
    struct Mysql {
        #[serde(alias = "defaults-extra-file")]
        defaults_extra_file: Option<String>,
        databases: Option<toml::Value>,
        directory: Option<String>,
        timeout_secs: Option<u64>,
    }

    #[derive(Debug, Deserialize)]
    struct Archive {
        repo: Option<String>,
        passphrase: Option<String>,
        directories: Option<toml::Value>,
        files: Option<toml::Value>,
        excludes: Option<toml::Value>,
        compression: Option<String>,
        timeout_secs: Option<u64>,
    }

    #[derive(Debug, Deserialize)]
    struct SyncSection {
        local_path: Option<String>,
        remote_path: Option<String>,
        timeout_secs: Option<u64>,
    }

    #[derive(Debug, Deserialize)]
    struct Notification {
        #[serde(alias = "eth0_pushcode")]
        push_code: Option<String>,
        endpoint: Option<String>,
        timeout_secs: Option<u64>,
    }

    impl Config {
        pub(super) fn validate(self) -> Result<BackupConfiguration, ConfigError> {
            Ok(BackupConfiguration {
                mysql: self.mysql.map(Mysql::validate).transpose()?,
                archive: self.archive.map(Archive::validate).transpose()?,
                sync: self.sync.map(SyncSection::validate).transpose()?,
                notification: self.notification.map(Notification::validate).transpose()?,
            })
        }
    }

    impl Mysql {
        const SECTION: &'static str = "mysql";

        fn validate(self) -> Result<MysqlConfig, ConfigError> {
            let section = Self::SECTION;
            let defaults_extra_file =
                required(section, "defaults_extra_file", self.defaults_extra_file)?;
            let databases = self
                .databases
                .ok_or(ConfigError::MissingField {
                    section,
                    field: "databases",
                })
                .and_then(|value| list(section, "databases", value))?;
            if databases.is_empty() {
                return Err(ConfigError::MissingField {
                    section,
                    field: "databases",
                });
            }
            let databases =
                DatabaseNames::new(databases).map_err(|reason| ConfigError::Invalid {
                    section,
                    field: "databases",
                    reason,
                })?;
            let directory = required(section, "directory", self.directory)?;
            let timeout = timeout(section, self.timeout_secs)?.unwrap_or(DEFAULT_DUMP_TIMEOUT);

            Ok(MysqlConfig {
                defaults_extra_file: defaults_extra_file.into(),
                databases,
                directory: directory.into(),
                timeout,
            })
        }
    }

    impl Archive {
        const SECTION: &'static str = "archive";

        fn validate(self) -> Result<ArchiveConfig, ConfigError> {
            let section = Self::SECTION;
            let repository = required(section, "repo", self.repo)?;
            let passphrase = required(section, "passphrase", self.passphrase)?;
            let paths = |field, value: Option<toml::Value>| {
                optional_list(section, field, value)
                    .map(|list| list.into_iter().map(PathBuf::from).collect::<Vec<_>>())
            };

            Ok(ArchiveConfig {
                repository,
                passphrase: Secret::new(passphrase),
                directories: paths("directories", self.directories)?,
                files: paths("files", self.files)?,
                excludes: optional_list(section, "excludes", self.excludes)?,
                compression: self
                    .compression
                    .filter(|c| !c.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_COMPRESSION.to_string()),
                timeout: timeout(section, self.timeout_secs)?,
            })
        }
    }

    impl SyncSection {
        const SECTION: &'static str = "sync";

        fn validate(self) -> Result<SyncConfig, ConfigError> {
            let section = Self::SECTION;
            Ok(SyncConfig {
                local_path: required(section, "local_path", self.local_path)?.into(),
                remote_path: required(section, "remote_path", self.remote_path)?,
                timeout: timeout(section, self.timeout_secs)?,
            })
        }
    }

    impl Notification {
        const SECTION: &'static str = "notification";

        fn validate(self) -> Result<NotificationConfig, ConfigError> {
            let section = Self::SECTION;
            Ok(NotificationConfig {
                push_code: Secret::new(required(section, "push_code", self.push_code)?),
                endpoint: self
                    .endpoint
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_PUSH_ENDPOINT.to_string()),
                timeout: timeout(section, self.timeout_secs)?.unwrap_or(DEFAULT_NOTIFY_TIMEOUT),
            })
        }
    }

    /// Blank values count as missing. Present values are kept verbatim.
    fn required(
        section: &'static str,
        field: &'static str,
        value: Option<String>,
    ) -> Result<String, ConfigError> {
        value
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::MissingField { section, field })
    }

    fn optional_list(
        section: &'static str,
        field: &'static str,
        value: Option<toml::Value>,
    ) -> Result<ValueList, ConfigError> {
        match value {
            Some(value) => list(section, field, value),
            None => Ok(ValueList::default()),
        }
    }

    /// Blank entries are dropped, so trailing commas and empty lines are harmless.
    fn list(
        section: &'static str,
        field: &'static str,
        value: toml::Value,
    ) -> Result<ValueList, ConfigError> {
        let toml::Value::Array(items) = value else {
            return Err(ConfigError::NotAList { section, field });
        };

        items
            .into_iter()
            .map(|item| match item {
                toml::Value::String(s) => Ok(s.trim().to_string()),
                other => Err(ConfigError::Invalid {
                    section,
                    field,
                    reason: format!("expected a string, found {}", other.type_str()),
                }),
            })
            .filter(|item| !matches!(item, Ok(s) if s.is_empty()))
            .collect::<Result<Vec<_>, _>>()
            .map(ValueList::new)
    }

    fn timeout(
        section: &'static str,
        secs: Option<u64>,
    ) -> Result<Option<Duration>, ConfigError> {
        match secs {
            Some(0) => Err(ConfigError::Invalid {
                section,
                field: "timeout_secs",
                reason: "must be greater than zero".to_string(),
            }),
            other => Ok(other.map(Duration::from_secs)),
        }
    }
}
