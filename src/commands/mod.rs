//! Top-level subcommand orchestration.
pub mod list;
pub mod run;
pub mod version;
pub mod watch;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};

use crate::cli::GlobalOpts;
use crate::config::{CONFIG_FILE_NAME, Config};
use crate::error::TaskError;
use crate::exec::SystemExecutor;
use crate::logging::{Log, Logger};
use crate::tasks::{Context, Orchestrator};

/// Shared state produced by the common command setup sequence.
#[derive(Debug)]
pub struct CommandSetup {
    /// Loaded, root-adjusted configuration.
    pub config: Arc<Config>,
}

impl CommandSetup {
    /// Resolve the project root, load and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the working directory cannot be determined or the
    /// config file exists but cannot be read or parsed.
    pub fn init(global: &GlobalOpts, log: &Logger) -> Result<Self> {
        let config_path = resolve_config_path(global)?;
        log.debug(&format!("config: {}", config_path.display()));

        let mut config = Config::load(&config_path)?;
        if let Some(root) = &global.root {
            config.root.clone_from(root);
        }
        if !config_path.exists() {
            log.debug("no config file, using defaults");
        }
        log.debug(&format!("root: {}", config.root.display()));

        let warnings = config.validate();
        if !warnings.is_empty() {
            log.warn(&format!(
                "found {} configuration warning(s):",
                warnings.len()
            ));
            for warning in &warnings {
                log.warn(&format!(
                    "  {} [{}]: {}",
                    warning.source, warning.item, warning.message
                ));
            }
        }

        Ok(Self {
            config: Arc::new(config),
        })
    }

    /// Task context over the loaded configuration and the real executor.
    #[must_use]
    pub fn context(&self, global: &GlobalOpts, log: &Arc<Logger>) -> Context {
        Context::new(
            Arc::clone(&self.config),
            Arc::clone(log) as Arc<dyn Log>,
            Arc::new(SystemExecutor),
            global.dry_run,
            global.parallel,
        )
    }
}

/// `--config` as given, else `assetpipe.toml` in `--root` or the working
/// directory.
fn resolve_config_path(global: &GlobalOpts) -> Result<PathBuf> {
    if let Some(path) = &global.config {
        return Ok(path.clone());
    }
    let root = match &global.root {
        Some(root) => root.clone(),
        None => std::env::current_dir().context("determining working directory")?,
    };
    Ok(root.join(CONFIG_FILE_NAME))
}

/// Run `names`, print the summary, and bail if anything failed.
///
/// # Errors
///
/// Returns the structural error (unknown task, cycle) if resolution failed,
/// or an error if one or more tasks recorded a failure.
pub fn run_tasks_to_completion(
    orch: &Orchestrator,
    names: &[&str],
    ctx: &Context,
    log: &Logger,
) -> Result<()> {
    let result = orch.run_many(names, ctx);
    log.print_summary();

    match result {
        Ok(()) | Err(TaskError::ExecutionFailed { .. }) => {}
        Err(e) => return Err(e.into()),
    }
    let count = log.failure_count();
    if count > 0 {
        anyhow::bail!("{count} task(s) failed");
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::tasks::test_helpers::{make_context, noop};

    fn global(config: Option<PathBuf>, root: Option<PathBuf>) -> GlobalOpts {
        GlobalOpts {
            dry_run: false,
            config,
            root,
            parallel: false,
            timestamps: false,
        }
    }

    #[test]
    fn config_path_prefers_explicit_file() {
        let path = resolve_config_path(&global(
            Some(PathBuf::from("site/build.toml")),
            Some(PathBuf::from("/elsewhere")),
        ))
        .unwrap();
        assert_eq!(path, PathBuf::from("site/build.toml"));
    }

    #[test]
    fn config_path_defaults_under_root() {
        let path = resolve_config_path(&global(None, Some(PathBuf::from("/site")))).unwrap();
        assert_eq!(path, PathBuf::from("/site/assetpipe.toml"));
    }

    #[test]
    fn setup_uses_root_override() {
        let dir = tempfile::tempdir().unwrap();
        let log = Logger::new("test");
        let setup = CommandSetup::init(&global(None, Some(dir.path().to_path_buf())), &log).unwrap();
        assert_eq!(setup.config.root, dir.path());
    }

    #[test]
    fn structural_errors_are_returned() {
        let mut orch = Orchestrator::new();
        orch.register("a", &["missing"], noop).unwrap();
        let (ctx, log) = make_context();
        let err = run_tasks_to_completion(&orch, &["a"], &ctx, &log).unwrap_err();
        assert!(err.to_string().contains("missing"), "{err}");
    }

    #[test]
    fn failures_are_counted() {
        let mut orch = Orchestrator::new();
        orch.register("bad", &[], |_| anyhow::bail!("boom")).unwrap();
        let (ctx, log) = make_context();
        let err = run_tasks_to_completion(&orch, &["bad"], &ctx, &log).unwrap_err();
        assert_eq!(err.to_string(), "1 task(s) failed");
    }
}
