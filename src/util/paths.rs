use std::io;
use std::path::{Path, PathBuf};

/// Resolve a leading `~` to the home directory and make the path absolute.
///
/// Relative paths are resolved against the current working directory.
/// The path is not required to exist.
pub fn expand_path(path: &Path) -> io::Result<PathBuf> {
    let expanded = match path.strip_prefix("~") {
        Ok(rest) => {
            let home = dirs::home_dir().ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, "home directory is unknown")
            })?;
            home.join(rest)
        }
        Err(_) => path.to_path_buf(),
    };

    std::path::absolute(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_paths_are_kept() {
        let path = Path::new("/srv/backup/repo");
        assert_eq!(expand_path(path).unwrap(), PathBuf::from("/srv/backup/repo"));
    }

    #[test]
    fn tilde_resolves_to_home() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        let expanded = expand_path(Path::new("~/dumps")).unwrap();
        assert_eq!(expanded, home.join("dumps"));
    }

    #[test]
    fn relative_paths_become_absolute() {
        let expanded = expand_path(Path::new("dumps/db.sql")).unwrap();
        assert!(expanded.is_absolute());
        assert!(expanded.ends_with("dumps/db.sql"));
    }

    #[test]
    fn tilde_inside_a_name_is_literal() {
        let expanded = expand_path(Path::new("/tmp/~notes")).unwrap();
        assert_eq!(expanded, PathBuf::from("/tmp/~notes"));
    }
}
