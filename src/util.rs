use glob::{GlobError, PatternError, glob};
use std::{
    collections::HashSet,
    path::{Component, Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileError {
    #[error("Invalid glob pattern: {0}")]
    GlobPattern(#[from] PatternError),
    #[error("Failed to expand glob: {0}")]
    GlobExpansion(#[from] GlobError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub fn is_glob_pattern(path: &str) -> bool {
    path.contains('*') || path.contains('?') || path.contains('[')
}

/// Expands patterns relative to `root` into the existing files they name.
/// Literal paths that do not exist are skipped.
pub fn expand_globs(root: &Path, patterns: &[String]) -> Result<Vec<PathBuf>, FileError> {
    let mut result = Vec::new();
    let mut seen = HashSet::new();

    for pattern in patterns {
        let full = root.join(pattern);
        let full_str = full.to_string_lossy();

        if is_glob_pattern(pattern) {
            for entry in glob(&full_str)? {
                let path = entry?;
                if path.is_file() && seen.insert(path.clone()) {
                    result.push(path);
                }
            }
        } else if full.is_file() && seen.insert(full.clone()) {
            result.push(full);
        } else if !full.exists() {
            tracing::debug!("Input '{}' does not exist", full.display());
        }
    }

    result.sort();
    Ok(result)
}

/// The directory part of a pattern that contains no wildcards, and whether
/// anything below it needs a recursive watch.
///
/// `sass/**/*.scss` gives (`sass`, true); `Dockerfile` gives (``, false).
pub fn glob_base(pattern: &str) -> (PathBuf, bool) {
    let path = Path::new(pattern);
    let mut base = PathBuf::new();
    let mut components = path.components().peekable();

    while let Some(component) = components.next() {
        let text = component.as_os_str().to_string_lossy();
        if is_glob_pattern(&text) {
            let nested = components.peek().is_some() || text.contains("**");
            return (base, nested);
        }
        if components.peek().is_none() {
            // last literal component names a file
            return (base, false);
        }
        match component {
            Component::CurDir => {}
            other => base.push(other.as_os_str()),
        }
    }

    (base, false)
}

pub fn has_extension(url_path: &str) -> bool {
    Path::new(url_path).extension().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn glob_base_splits_at_first_wildcard() {
        assert_eq!(glob_base("sass/**/*.scss"), (PathBuf::from("sass"), true));
        assert_eq!(
            glob_base("bower_components/font-awesome/fonts/fontawesome*"),
            (PathBuf::from("bower_components/font-awesome/fonts"), false)
        );
        assert_eq!(glob_base("Dockerfile"), (PathBuf::new(), false));
        assert_eq!(glob_base("server/www/**/*"), (PathBuf::from("server/www"), true));
    }

    #[test]
    fn extension_detection_follows_last_segment() {
        assert!(has_extension("/js/bundle.js"));
        assert!(!has_extension("/posts/5"));
        assert!(!has_extension("/"));
        assert!(!has_extension("/.json"));
        assert!(!has_extension("/api/v2.1/posts"));
    }

    #[test]
    fn expand_globs_returns_sorted_unique_files() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("fonts")).unwrap();
        fs::write(dir.path().join("fonts/fontawesome-webfont.woff"), b"w").unwrap();
        fs::write(dir.path().join("fonts/fontawesome-webfont.ttf"), b"t").unwrap();
        fs::write(dir.path().join("fonts/other.ttf"), b"o").unwrap();

        let files = expand_globs(
            dir.path(),
            &[
                "fonts/fontawesome*".to_string(),
                "fonts/fontawesome-webfont.ttf".to_string(),
                "fonts/missing.eot".to_string(),
            ],
        )
        .unwrap();

        assert_eq!(
            files,
            vec![
                dir.path().join("fonts/fontawesome-webfont.ttf"),
                dir.path().join("fonts/fontawesome-webfont.woff"),
            ]
        );
    }
}
