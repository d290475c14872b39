//! Watch mode: map filesystem changes to task runs.
//!
//! Each [`WatchBinding`] pairs a root-relative glob pattern with the tasks to
//! run when a matching file changes. Events are debounced, and a batch that
//! matches several bindings runs the union of their tasks once. Dispatch is
//! serial: changes that arrive while tasks are running queue up in the event
//! channel and are coalesced into the next batch.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use globset::{GlobBuilder, GlobMatcher};
use notify::RecursiveMode;
use notify_debouncer_mini::{DebouncedEvent, new_debouncer};
use serde::Deserialize;

use crate::config::Config;
use crate::error::WatchError;
use crate::logging::Log;

/// How often the loop checks the stop flag while idle.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// A glob pattern and the tasks it triggers.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct WatchBinding {
    /// Root-relative glob; may use the `{src}`-style path placeholders.
    pub pattern: String,
    /// Tasks to run, in order.
    pub tasks: Vec<String>,
}

impl WatchBinding {
    /// Convenience constructor.
    #[must_use]
    pub fn new(pattern: &str, tasks: &[&str]) -> Self {
        Self {
            pattern: pattern.to_string(),
            tasks: tasks.iter().map(ToString::to_string).collect(),
        }
    }
}

#[derive(Debug)]
struct CompiledBinding {
    pattern: String,
    matcher: GlobMatcher,
    tasks: Vec<String>,
}

/// Compiled bindings for one project root.
#[derive(Debug)]
pub struct WatchSet {
    root: PathBuf,
    canonical_root: PathBuf,
    bindings: Vec<CompiledBinding>,
}

impl WatchSet {
    /// Compile the configured bindings.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Pattern`] for an invalid glob.
    pub fn new(config: &Config) -> Result<Self, WatchError> {
        Self::with_bindings(config, &config.watch.bindings)
    }

    /// Compile `bindings` against `config`'s root and path table.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Pattern`] for an invalid glob.
    pub fn with_bindings(config: &Config, bindings: &[WatchBinding]) -> Result<Self, WatchError> {
        let bindings = bindings
            .iter()
            .map(|b| {
                let pattern = config.substitute(&b.pattern);
                let matcher = GlobBuilder::new(&pattern)
                    .literal_separator(true)
                    .build()
                    .map_err(|source| WatchError::Pattern {
                        pattern: b.pattern.clone(),
                        source,
                    })?
                    .compile_matcher();
                Ok(CompiledBinding {
                    pattern,
                    matcher,
                    tasks: b.tasks.clone(),
                })
            })
            .collect::<Result<Vec<_>, WatchError>>()?;
        Ok(Self {
            root: config.root.clone(),
            canonical_root: dunce::canonicalize(&config.root).unwrap_or_else(|_| config.root.clone()),
            bindings,
        })
    }

    /// Number of bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether there are no bindings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// `path` as a `/`-separated string relative to the project root, or
    /// `None` if it lies outside the root.
    fn relative(&self, path: &Path) -> Option<String> {
        let rel = if path.is_relative() {
            path.to_path_buf()
        } else {
            path.strip_prefix(&self.canonical_root)
                .or_else(|_| path.strip_prefix(&self.root))
                .map(Path::to_path_buf)
                .ok()
                .or_else(|| {
                    let canonical = dunce::canonicalize(path).ok()?;
                    canonical
                        .strip_prefix(&self.canonical_root)
                        .ok()
                        .map(Path::to_path_buf)
                })?
        };
        let parts: Vec<String> = rel
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        Some(parts.join("/"))
    }

    /// Patterns of the bindings matching `path`.
    #[must_use]
    pub fn matching(&self, path: &Path) -> Vec<&str> {
        let Some(rel) = self.relative(path) else {
            return Vec::new();
        };
        self.bindings
            .iter()
            .filter(|b| b.matcher.is_match(&rel))
            .map(|b| b.pattern.as_str())
            .collect()
    }

    /// Tasks triggered by `paths`: the tasks of every binding matched by at
    /// least one path, in binding order, each listed once.
    #[must_use]
    pub fn tasks_for(&self, paths: &[PathBuf]) -> Vec<String> {
        let relative: Vec<String> = paths.iter().filter_map(|p| self.relative(p)).collect();
        let mut seen = HashSet::new();
        self.bindings
            .iter()
            .filter(|b| relative.iter().any(|r| b.matcher.is_match(r)))
            .flat_map(|b| b.tasks.iter())
            .filter(|t| seen.insert(t.as_str()))
            .cloned()
            .collect()
    }

    /// Run `run` once with the tasks triggered by `paths`, if any, and return
    /// those tasks.
    pub fn dispatch(&self, paths: &[PathBuf], mut run: impl FnMut(&[String])) -> Vec<String> {
        let tasks = self.tasks_for(paths);
        if !tasks.is_empty() {
            run(&tasks);
        }
        tasks
    }

    /// Directories to register with the watcher.
    ///
    /// Each pattern contributes its longest literal directory prefix, watched
    /// recursively; a pattern without wildcards contributes its parent
    /// directory, watched non-recursively.
    #[must_use]
    pub fn watch_roots(&self) -> Vec<(PathBuf, RecursiveMode)> {
        let mut roots: Vec<(PathBuf, RecursiveMode)> = Vec::new();
        for binding in &self.bindings {
            let (dir, mode) = literal_prefix(&binding.pattern);
            let path = self.root.join(dir);
            match roots.iter_mut().find(|(p, _)| *p == path) {
                Some(entry) if mode == RecursiveMode::Recursive => entry.1 = mode,
                Some(_) => {}
                None => roots.push((path, mode)),
            }
        }
        roots
    }
}

fn is_glob_segment(segment: &str) -> bool {
    segment.contains(['*', '?', '[', '{'])
}

fn literal_prefix(pattern: &str) -> (String, RecursiveMode) {
    let segments: Vec<&str> = pattern.split('/').collect();
    match segments.iter().position(|s| is_glob_segment(s)) {
        Some(first_glob) => (
            segments.get(..first_glob).unwrap_or_default().join("/"),
            RecursiveMode::Recursive,
        ),
        None => (
            segments
                .get(..segments.len().saturating_sub(1))
                .unwrap_or_default()
                .join("/"),
            RecursiveMode::NonRecursive,
        ),
    }
}

/// Watch the project until `stop` is set, calling `on_batch` with the tasks
/// triggered by each debounced batch of changes.
///
/// Errors reported by the watcher are logged and watching continues.
///
/// # Errors
///
/// Returns [`WatchError::Init`] or [`WatchError::Path`] if watching cannot
/// start, or [`WatchError::ChannelClosed`] if the event channel closes.
pub fn watch(
    set: &WatchSet,
    debounce: Duration,
    stop: &AtomicBool,
    log: &dyn Log,
    mut on_batch: impl FnMut(&[String]),
) -> Result<(), WatchError> {
    let (tx, rx) = mpsc::channel();
    let mut debouncer = new_debouncer(debounce, tx).map_err(WatchError::Init)?;

    for (path, mode) in set.watch_roots() {
        if !path.exists() {
            log.warn(&format!("not watching missing directory {}", path.display()));
            continue;
        }
        debouncer
            .watcher()
            .watch(&path, mode)
            .map_err(|source| WatchError::Path {
                path: path.clone(),
                source,
            })?;
        log.debug(&format!("watching {}", path.display()));
    }
    log.info(&format!(
        "watching {} patterns (ctrl-c to stop)",
        set.len()
    ));

    while !stop.load(Ordering::SeqCst) {
        let first = match rx.recv_timeout(POLL_INTERVAL) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return Err(WatchError::ChannelClosed),
        };

        let mut changed: Vec<PathBuf> = Vec::new();
        for result in std::iter::once(first).chain(rx.try_iter()) {
            match result {
                Ok(events) => changed.extend(events.into_iter().map(|e: DebouncedEvent| e.path)),
                Err(e) => log.warn(&format!("watch error: {e}")),
            }
        }
        changed.sort();
        changed.dedup();

        for path in &changed {
            let patterns = set.matching(path);
            if !patterns.is_empty() {
                log.debug(&format!("changed: {} ({})", path.display(), patterns.join(", ")));
            }
        }
        set.dispatch(&changed, &mut on_batch);
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn set() -> WatchSet {
        WatchSet::new(&Config::with_root("/project")).unwrap()
    }

    fn paths(list: &[&str]) -> Vec<PathBuf> {
        list.iter().map(|p| Path::new("/project").join(p)).collect()
    }

    #[test]
    fn scss_change_runs_styles_once() {
        let set = set();
        let mut runs = Vec::new();
        let tasks = set.dispatch(
            &paths(&["app/src/styles/main.scss", "app/src/styles/partials/_grid.scss"]),
            |t| runs.push(t.to_vec()),
        );
        assert_eq!(tasks, ["styles"]);
        assert_eq!(runs, [vec!["styles".to_string()]]);
    }

    #[test]
    fn overlapping_bindings_run_each_task_once() {
        let set = set();
        let tasks = set.tasks_for(&paths(&["assetpipe.toml", "app/src/scripts/nav/menu.js"]));
        assert_eq!(tasks, ["lint", "bundle"]);
    }

    #[test]
    fn unrelated_changes_run_nothing() {
        let set = set();
        let mut called = false;
        let tasks = set.dispatch(
            &paths(&["app/public/styles/main.css", "README.md"]),
            |_| called = true,
        );
        assert!(tasks.is_empty());
        assert!(!called);
        assert!(set.tasks_for(&[PathBuf::from("/elsewhere/app/src/styles/a.scss")]).is_empty());
    }

    #[test]
    fn single_star_does_not_cross_directories() {
        let config = Config::with_root("/project");
        let set = WatchSet::with_bindings(
            &config,
            &[WatchBinding::new("{src}/scripts/*.js", &["lint"])],
        )
        .unwrap();
        assert_eq!(set.matching(Path::new("/project/app/src/scripts/main.js")).len(), 1);
        assert!(set.matching(Path::new("/project/app/src/scripts/nav/menu.js")).is_empty());
    }

    #[test]
    fn relative_paths_are_matched_against_root() {
        let set = set();
        assert_eq!(
            set.matching(Path::new("app/src/styles/main.scss")),
            ["app/src/styles/**/*.scss"]
        );
    }

    #[test]
    fn watch_roots_use_literal_prefixes() {
        let roots = set().watch_roots();
        assert_eq!(
            roots,
            [
                (PathBuf::from("/project"), RecursiveMode::NonRecursive),
                (PathBuf::from("/project/app/src/scripts"), RecursiveMode::Recursive),
                (PathBuf::from("/project/app/src/styles"), RecursiveMode::Recursive),
            ]
        );
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let config = Config::with_root("/project");
        let err = WatchSet::with_bindings(&config, &[WatchBinding::new("{src}/[", &["styles"])])
            .unwrap_err();
        assert!(matches!(err, WatchError::Pattern { ref pattern, .. } if pattern == "{src}/["));
    }

    #[test]
    fn binding_deserializes_from_toml() {
        let binding: WatchBinding =
            toml::from_str("pattern = \"{src}/**/*.css\"\ntasks = [\"styles\"]").unwrap();
        assert_eq!(binding, WatchBinding::new("{src}/**/*.css", &["styles"]));
    }
}
