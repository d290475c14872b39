use std::sync::Arc;

use anyhow::Result;

use super::{CommandSetup, run_tasks_to_completion};
use crate::cli::{GlobalOpts, RunOpts};
use crate::logging::Logger;
use crate::tasks;

/// Run the requested tasks and their prerequisites.
///
/// # Errors
///
/// Returns an error if configuration loading fails, a task is unknown or part
/// of a cycle, or any task fails.
pub fn run(global: &GlobalOpts, opts: &RunOpts, log: &Arc<Logger>) -> Result<()> {
    let setup = CommandSetup::init(global, log)?;
    let orch = tasks::build_orchestrator()?;
    let ctx = setup.context(global, log);

    if global.dry_run {
        log.info("dry run: nothing will be written or transferred");
    }
    let names: Vec<&str> = opts.tasks.iter().map(String::as_str).collect();
    run_tasks_to_completion(&orch, &names, &ctx, log)
}
