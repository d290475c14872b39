use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context as _, Result};

use super::CommandSetup;
use crate::cli::{GlobalOpts, WatchOpts};
use crate::error::TaskError;
use crate::logging::Logger;
use crate::tasks::{self, Context, Orchestrator};
use crate::watch::{self, WatchSet};

/// Watch the project and run bound tasks on every change until Ctrl-C.
///
/// # Errors
///
/// Returns an error if configuration loading fails, a binding names an
/// unknown task or has an invalid pattern, or the watcher cannot start.
pub fn run(global: &GlobalOpts, opts: &WatchOpts, log: &Arc<Logger>) -> Result<()> {
    let setup = CommandSetup::init(global, log)?;
    let orch = tasks::build_orchestrator()?;
    let ctx = setup.context(global, log);
    let set = WatchSet::new(&setup.config)?;

    for binding in &setup.config.watch.bindings {
        let names: Vec<&str> = binding.tasks.iter().map(String::as_str).collect();
        orch.plan_many(&names)
            .with_context(|| format!("watch binding '{}'", binding.pattern))?;
    }

    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
        .context("installing Ctrl-C handler")?;

    if !opts.initial.is_empty() {
        run_batch(&orch, &opts.initial, &ctx, log);
    }

    log.stage("Watching");
    let debounce = Duration::from_millis(setup.config.watch.debounce_ms);
    watch::watch(&set, debounce, &stop, log.as_ref(), |names| {
        run_batch(&orch, names, &ctx, log);
        log.info("waiting for changes");
    })?;
    log.info("stopped");
    Ok(())
}

/// Run one batch of triggered tasks, each with its own `run` in the order
/// given.
///
/// A failing task is reported and the remaining tasks still run; failures
/// never end the watch. Returns the number of tasks that did not succeed.
pub fn run_batch(orch: &Orchestrator, names: &[String], ctx: &Context, log: &Logger) -> usize {
    log.clear_tasks();
    log.info(&format!("running {}", names.join(", ")));
    let mut failed = 0;
    for name in names {
        match orch.run(name, ctx) {
            Ok(()) => {}
            Err(TaskError::ExecutionFailed { .. }) => failed += 1,
            Err(e) => {
                log.error(&e.to_string());
                failed += 1;
            }
        }
    }
    log.print_summary();
    failed
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::logging::TaskStatus;
    use crate::tasks::test_helpers::{make_context, noop};

    #[test]
    fn batch_failure_does_not_panic_and_is_recorded() {
        let mut orch = Orchestrator::new();
        orch.register("styles", &[], |_| anyhow::bail!("syntax error")).unwrap();
        orch.register("lint", &[], noop).unwrap();
        let (ctx, log) = make_context();

        let failed = run_batch(&orch, &["styles".to_string(), "lint".to_string()], &ctx, &log);
        assert_eq!(failed, 1);
        let entries = log.task_entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].status, TaskStatus::Failed);
        assert_eq!(entries[1].name, "lint");
        assert_eq!(entries[1].status, TaskStatus::Ok);

        assert_eq!(run_batch(&orch, &["lint".to_string()], &ctx, &log), 0);
        assert_eq!(log.task_entries().len(), 1, "entries reset per batch");
    }

    #[test]
    fn unknown_task_in_batch_is_logged_not_raised() {
        let orch = Orchestrator::new();
        let (ctx, log) = make_context();
        assert_eq!(run_batch(&orch, &["nope".to_string()], &ctx, &log), 1);
        assert!(log.task_entries().is_empty());
    }
}
