//! Bundles dumps and static paths into a new archive and prunes old ones.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use crate::backends::{ArchiveEngine, ArchiveError, CreateArchive, PruneError};
use crate::config::ArchiveConfig;
use crate::context::{ArchiveName, RunContext};
use crate::util::retention::RetentionPolicy;
use crate::util::{expand_path, CancelToken};

const TARGET: &str = "stage::archive";

/// Identifier of a created archive: `{repository}::{name}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchiveId(String);

impl ArchiveId {
    fn new(repository: &str, name: &ArchiveName) -> Self {
        Self(format!("{repository}::{name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArchiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolve local repository paths, keep remote locations
/// (`ssh://…`, `user@host:path`) as they are.
fn resolve_repository(repository: &str) -> io::Result<String> {
    let is_remote = repository.contains("://")
        || repository
            .split_once(':')
            .is_some_and(|(host, _)| !host.is_empty() && !host.contains('/'));

    if is_remote {
        Ok(repository.to_string())
    } else {
        Ok(expand_path(Path::new(repository))?.display().to_string())
    }
}

/// Absolute, existing and unique paths of `paths`, in their original order.
///
/// Missing paths are dropped silently: an upstream stage may have produced
/// nothing without failing the run.
pub fn existing_paths<'a>(paths: impl IntoIterator<Item = &'a PathBuf>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    paths
        .into_iter()
        .filter_map(|path| match expand_path(path) {
            Ok(expanded) => Some(expanded),
            Err(e) => {
                log::warn!(target: TARGET, "Skipping {}: {e}", path.display());
                None
            }
        })
        .filter(|path| {
            let exists = path.exists();
            if !exists {
                log::debug!(target: TARGET, "Skipping missing path {}", path.display());
            }
            exists
        })
        .filter(|path| seen.insert(path.clone()))
        .collect()
}

/// Create the archive `name` from the existing entries of `paths`.
pub fn create_archive(
    engine: &dyn ArchiveEngine,
    config: &ArchiveConfig,
    name: &ArchiveName,
    paths: &[PathBuf],
    cancel: &CancelToken,
) -> Result<ArchiveId, ArchiveError> {
    let repository =
        resolve_repository(&config.repository).map_err(|source| ArchiveError::Resolve {
            what: format!("repository {}", config.repository),
            source,
        })?;
    let paths = existing_paths(paths);
    let id = ArchiveId::new(&repository, name);

    log::info!(target: TARGET, "Creating archive {id} with {} direct items", paths.len());
    engine.create(
        &CreateArchive {
            repository: &repository,
            name,
            paths: &paths,
            excludes: config.excludes.as_slice(),
            compression: &config.compression,
            passphrase: Some(&config.passphrase),
            timeout: config.timeout,
        },
        cancel,
    )?;
    log::info!(target: TARGET, "Archive {id} created");

    Ok(id)
}

/// Prune archives of `prefix` down to [RetentionPolicy::DEFAULT].
pub fn prune(
    engine: &dyn ArchiveEngine,
    config: &ArchiveConfig,
    prefix: &str,
    cancel: &CancelToken,
) -> Result<(), PruneError> {
    let repository =
        resolve_repository(&config.repository).map_err(|source| PruneError::Resolve {
            what: format!("repository {}", config.repository),
            source,
        })?;

    log::info!(target: TARGET, "Pruning archives with prefix {prefix}");
    engine.prune(
        &repository,
        prefix,
        &RetentionPolicy::DEFAULT,
        Some(&config.passphrase),
        cancel,
    )
}

/// Archive `dumps` together with the configured directories and files,
/// then prune old archives of this host.
///
/// Only a failing creation is an error. Pruning is best effort.
pub fn run(
    engine: &dyn ArchiveEngine,
    config: &ArchiveConfig,
    ctx: &RunContext,
    dumps: &BTreeSet<PathBuf>,
    cancel: &CancelToken,
) -> Result<ArchiveId, ArchiveError> {
    let paths: Vec<PathBuf> = dumps
        .iter()
        .chain(&config.directories)
        .chain(&config.files)
        .cloned()
        .collect();

    let id = create_archive(engine, config, &ctx.archive_name(), &paths, cancel)?;

    if cancel.is_cancelled() {
        log::warn!(target: TARGET, "Interrupted, not pruning old archives");
    } else if let Err(e) = prune(engine, config, ctx.prefix(), cancel) {
        log::error!(target: TARGET, "Pruning old archives failed: {e}");
    }

    Ok(id)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::fs;
    use std::time::Duration;

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::config::{Secret, ValueList};
    use crate::util::ProcessError;

    #[derive(Debug, Clone, PartialEq)]
    struct Created {
        repository: String,
        name: String,
        paths: Vec<PathBuf>,
        passphrase: Option<String>,
    }

    #[derive(Default)]
    struct FakeEngine {
        fail_create: bool,
        fail_prune: bool,
        created: RefCell<Vec<Created>>,
        pruned: RefCell<Vec<(String, String, RetentionPolicy)>>,
    }

    fn failed(program: &str) -> ProcessError {
        ProcessError::TimedOut {
            program: program.to_string(),
            timeout: Duration::from_secs(1),
        }
    }

    impl ArchiveEngine for FakeEngine {
        fn create(
            &self,
            request: &CreateArchive<'_>,
            _cancel: &CancelToken,
        ) -> Result<(), ArchiveError> {
            if self.fail_create {
                return Err(failed("borg").into());
            }
            self.created.borrow_mut().push(Created {
                repository: request.repository.to_string(),
                name: request.name.to_string(),
                paths: request.paths.to_vec(),
                passphrase: request.passphrase.map(|p| p.expose().to_string()),
            });
            Ok(())
        }

        fn prune(
            &self,
            repository: &str,
            prefix: &str,
            policy: &RetentionPolicy,
            _passphrase: Option<&Secret>,
            _cancel: &CancelToken,
        ) -> Result<(), PruneError> {
            self.pruned
                .borrow_mut()
                .push((repository.to_string(), prefix.to_string(), *policy));
            if self.fail_prune {
                return Err(failed("borg").into());
            }
            Ok(())
        }
    }

    fn config(directories: Vec<PathBuf>) -> ArchiveConfig {
        ArchiveConfig {
            repository: "/srv/borg".to_string(),
            passphrase: Secret::new("secret"),
            directories,
            files: Vec::new(),
            excludes: ValueList::default(),
            compression: "zlib,5".to_string(),
            timeout: None,
        }
    }

    fn ctx() -> RunContext {
        RunContext::new("web-01", Utc.with_ymd_and_hms(2026, 10, 18, 3, 4, 5).unwrap())
    }

    #[test]
    fn missing_directories_are_left_out() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present");
        fs::create_dir(&present).unwrap();
        let missing = dir.path().join("missing");
        let engine = FakeEngine::default();

        let id = run(
            &engine,
            &config(vec![present.clone(), missing]),
            &ctx(),
            &BTreeSet::new(),
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(id.as_str(), "/srv/borg::web-01-20261018030405");
        let created = engine.created.borrow();
        assert_eq!(
            *created,
            [Created {
                repository: "/srv/borg".to_string(),
                name: "web-01-20261018030405".to_string(),
                paths: vec![present],
                passphrase: Some("secret".to_string()),
            }]
        );
    }

    #[test]
    fn dumps_come_first_and_duplicates_collapse() {
        let dir = tempfile::tempdir().unwrap();
        let dumps_dir = dir.path().join("dumps");
        fs::create_dir(&dumps_dir).unwrap();
        let dump = dumps_dir.join("app.sql");
        fs::write(&dump, "-- app").unwrap();
        let engine = FakeEngine::default();

        run(
            &engine,
            &config(vec![dumps_dir.clone(), dumps_dir.clone()]),
            &ctx(),
            &[dump.clone()].into(),
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(engine.created.borrow()[0].paths, vec![dump, dumps_dir]);
    }

    #[test]
    fn created_archive_is_pruned_with_default_policy() {
        let engine = FakeEngine::default();

        run(&engine, &config(Vec::new()), &ctx(), &BTreeSet::new(), &CancelToken::new()).unwrap();

        assert_eq!(
            *engine.pruned.borrow(),
            [(
                "/srv/borg".to_string(),
                "web-01".to_string(),
                RetentionPolicy::DEFAULT
            )]
        );
    }

    #[test]
    fn prune_failure_keeps_the_archive() {
        let engine = FakeEngine {
            fail_prune: true,
            ..Default::default()
        };

        let id = run(&engine, &config(Vec::new()), &ctx(), &BTreeSet::new(), &CancelToken::new());

        assert!(id.is_ok());
        assert_eq!(engine.pruned.borrow().len(), 1);
    }

    #[test]
    fn failed_creation_is_not_pruned() {
        let engine = FakeEngine {
            fail_create: true,
            ..Default::default()
        };

        let err = run(&engine, &config(Vec::new()), &ctx(), &BTreeSet::new(), &CancelToken::new())
            .unwrap_err();

        assert_eq!(err.to_string(), "borg timed out after 1s");
        assert!(engine.pruned.borrow().is_empty());
    }

    #[test]
    fn cancelled_run_is_not_pruned() {
        let engine = FakeEngine::default();
        let cancel = CancelToken::new();
        cancel.cancel();

        run(&engine, &config(Vec::new()), &ctx(), &BTreeSet::new(), &cancel).unwrap();

        assert!(engine.pruned.borrow().is_empty());
    }

    #[test]
    fn remote_repositories_are_kept_verbatim() {
        assert_eq!(
            resolve_repository("backup@nas:borg/web").unwrap(),
            "backup@nas:borg/web"
        );
        assert_eq!(
            resolve_repository("ssh://backup@nas:22/./borg").unwrap(),
            "ssh://backup@nas:22/./borg"
        );
        assert_eq!(resolve_repository("/srv/borg").unwrap(), "/srv/borg");
        assert!(Path::new(&resolve_repository("borg/repo").unwrap()).is_absolute());
    }
}
