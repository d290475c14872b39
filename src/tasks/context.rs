use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::exec::Executor;
use crate::logging::Log;

/// Shared context passed to every task action.
#[derive(Clone)]
pub struct Context {
    /// Project configuration, immutable for the whole run.
    pub config: Arc<Config>,
    /// Logger for output and task recording.
    pub log: Arc<dyn Log>,
    /// Runs external programs (style compiler, linter, rsync).
    pub executor: Arc<dyn Executor>,
    /// Report what would be written or transferred without doing it.
    pub dry_run: bool,
    /// Run independent tasks concurrently and process images with Rayon.
    pub parallel: bool,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("root", &self.config.root)
            .field("log", &"<dyn Log>")
            .field("executor", &self.executor)
            .field("dry_run", &self.dry_run)
            .field("parallel", &self.parallel)
            .finish()
    }
}

impl Context {
    /// Creates a new context for task execution.
    #[must_use]
    pub fn new(
        config: Arc<Config>,
        log: Arc<dyn Log>,
        executor: Arc<dyn Executor>,
        dry_run: bool,
        parallel: bool,
    ) -> Self {
        Self {
            config,
            log,
            executor,
            dry_run,
            parallel,
        }
    }

    /// Clone this context with a different log sink.
    #[must_use]
    pub fn with_log(&self, log: Arc<dyn Log>) -> Self {
        Self {
            log,
            ..self.clone()
        }
    }

    /// Project root directory.
    #[must_use]
    pub fn root(&self) -> &std::path::Path {
        &self.config.root
    }

    /// Resolve a configured path template under the project root.
    #[must_use]
    pub fn path(&self, template: &str) -> PathBuf {
        self.config.path(template)
    }

    /// `path` relative to the project root, for log messages.
    #[must_use]
    pub fn display_path(&self, path: &std::path::Path) -> String {
        path.strip_prefix(&self.config.root)
            .unwrap_or(path)
            .display()
            .to_string()
    }
}
