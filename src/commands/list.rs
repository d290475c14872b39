use anyhow::Result;

use super::CommandSetup;
use crate::cli::GlobalOpts;
use crate::config::Config;
use crate::logging::Logger;
use crate::tasks::{self, DEFAULT, Orchestrator};

/// Show registered tasks, the resolved order of `default`, and the watch
/// bindings.
///
/// # Errors
///
/// Returns an error if configuration loading fails or the task graph is
/// malformed.
pub fn run(global: &GlobalOpts, log: &Logger) -> Result<()> {
    let setup = CommandSetup::init(global, log)?;
    let orch = tasks::build_orchestrator()?;

    log.stage("Tasks");
    for line in task_lines(&orch) {
        log.info(&line);
    }

    log.stage("Execution order");
    log.info(&format!("{DEFAULT}: {}", orch.plan(DEFAULT)?.join(" -> ")));

    log.stage("Watch bindings");
    for line in binding_lines(&setup.config) {
        log.info(&line);
    }
    Ok(())
}

fn task_lines(orch: &Orchestrator) -> Vec<String> {
    orch.tasks()
        .map(|t| {
            let kind = if t.is_composite() { " (group)" } else { "" };
            if t.prerequisites().is_empty() {
                format!("{}{kind}", t.name())
            } else {
                format!("{}{kind} <- {}", t.name(), t.prerequisites().join(", "))
            }
        })
        .collect()
}

fn binding_lines(config: &Config) -> Vec<String> {
    config
        .watch
        .bindings
        .iter()
        .map(|b| format!("{} -> {}", config.substitute(&b.pattern), b.tasks.join(", ")))
        .collect()
}
