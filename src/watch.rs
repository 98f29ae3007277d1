//! File watching for the `watch*` tasks.
//!
//! Each [`WatchBinding`] pairs a set of globs with what should happen when
//! one of them matches. The watcher only reports which binding fired; the
//! runner decides what to re-run.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use glob::{MatchOptions, Pattern, PatternError};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::{
    error::Result,
    util::{FileError, glob_base},
};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchBinding {
    /// Patterns relative to the project root.
    pub globs: Vec<String>,
    /// Task to re-run on change. `None` only pushes the changed path to
    /// live-reload clients.
    pub owner: Option<String>,
    /// Re-run the owner with its dependencies instead of its bare action.
    pub rerun_dependencies: bool,
}

impl WatchBinding {
    pub fn task(owner: &str, globs: Vec<String>) -> Self {
        Self {
            globs,
            owner: Some(owner.to_string()),
            rerun_dependencies: false,
        }
    }

    pub fn with_dependencies(owner: &str, globs: Vec<String>) -> Self {
        Self {
            rerun_dependencies: true,
            ..Self::task(owner, globs)
        }
    }

    pub fn notify_only(globs: Vec<String>) -> Self {
        Self {
            globs,
            owner: None,
            rerun_dependencies: false,
        }
    }

    fn patterns(&self) -> std::result::Result<Vec<Pattern>, PatternError> {
        self.globs.iter().map(|g| Pattern::new(g)).collect()
    }

    /// Whether `relative` (a path below the project root) is covered.
    pub fn matches(&self, relative: &Path) -> bool {
        self.patterns()
            .map(|patterns| matches_any(&patterns, relative))
            .unwrap_or(false)
    }
}

fn matches_any(patterns: &[Pattern], relative: &Path) -> bool {
    patterns
        .iter()
        .any(|p| p.matches_path_with(relative, MATCH_OPTIONS))
}

/// Remembers when each path last fired so bursts of OS events collapse
/// into one. Entries older than the window are dropped on every insert.
#[derive(Debug)]
struct Debouncer {
    window: Duration,
    last_seen: HashMap<PathBuf, Instant>,
}

impl Debouncer {
    fn new(window: Duration) -> Self {
        Self {
            window,
            last_seen: HashMap::new(),
        }
    }

    fn is_quiet(&self, path: &Path, now: Instant) -> bool {
        !self
            .last_seen
            .get(path)
            .is_some_and(|seen| now.duration_since(*seen) < self.window)
    }

    fn record(&mut self, path: PathBuf, now: Instant) {
        let window = self.window;
        self.last_seen
            .retain(|_, seen| now.duration_since(*seen) < window);
        self.last_seen.insert(path, now);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    /// Index into the bindings the watcher was created with.
    pub binding: usize,
    pub path: PathBuf,
}

pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    root: PathBuf,
}

impl FileWatcher {
    /// Starts watching. Events for the same path inside `debounce` of each
    /// other are collapsed into the first one.
    pub fn spawn(
        root: &Path,
        bindings: &[WatchBinding],
        debounce: Duration,
    ) -> Result<(Self, mpsc::Receiver<WatchEvent>)> {
        let root = fs::canonicalize(root)?;
        let matchers = bindings
            .iter()
            .map(WatchBinding::patterns)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(FileError::from)?;

        let (tx, rx) = mpsc::channel(100);
        let event_root = root.clone();
        let mut debouncer = Debouncer::new(debounce);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!("Watch error: {}", e);
                    return;
                }
            };
            if !matches!(
                event.kind,
                EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
            ) {
                return;
            }

            for path in event.paths {
                let Ok(relative) = path.strip_prefix(&event_root) else {
                    continue;
                };

                let now = Instant::now();
                if !debouncer.is_quiet(&path, now) {
                    continue;
                }

                let mut matched = false;
                for (binding, patterns) in matchers.iter().enumerate() {
                    if !matches_any(patterns, relative) {
                        continue;
                    }
                    matched = true;
                    let change = WatchEvent {
                        binding,
                        path: path.clone(),
                    };
                    if tx.blocking_send(change).is_err() {
                        return;
                    }
                }
                if matched {
                    debouncer.record(path, now);
                }
            }
        })?;

        for (dir, recursive) in watch_roots(&root, bindings) {
            let mode = if recursive {
                RecursiveMode::Recursive
            } else {
                RecursiveMode::NonRecursive
            };
            tracing::debug!("Watching {} ({:?})", dir.display(), mode);
            watcher.watch(&dir, mode)?;
        }

        Ok((
            Self {
                _watcher: watcher,
                root,
            },
            rx,
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Directories to register with the OS watcher. A glob whose base does not
/// exist yet is covered by watching its closest existing ancestor.
fn watch_roots(root: &Path, bindings: &[WatchBinding]) -> Vec<(PathBuf, bool)> {
    let mut roots: Vec<(PathBuf, bool)> = Vec::new();

    for glob in bindings.iter().flat_map(|b| &b.globs) {
        let (base, mut recursive) = glob_base(glob);
        let mut dir = root.join(base);
        while !dir.is_dir() {
            recursive = true;
            match dir.parent() {
                Some(parent) if parent.starts_with(root) => dir = parent.to_path_buf(),
                _ => break,
            }
        }

        match roots.iter_mut().find(|(existing, _)| *existing == dir) {
            Some(entry) => entry.1 |= recursive,
            None => roots.push((dir, recursive)),
        }
    }

    roots
}
