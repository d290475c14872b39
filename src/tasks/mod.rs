//! Named, dependency-ordered tasks and the orchestrator that runs them.
//!
//! The orchestrator core lives in [`registry`] (registration and lookup),
//! [`graph`] (prerequisite resolution) and [`scheduler`] (execution). The
//! remaining modules are the built-in task actions, each binding one
//! [`transforms`](crate::transforms) leaf to the project's path
//! configuration. [`build_orchestrator`] wires them together.
pub mod bundle;
mod context;
pub mod feature_detect;
pub mod graph;
pub mod images;
pub mod lint;
mod output;
pub mod registry;
pub mod scheduler;
pub mod styles;
pub mod sync;

pub use context::Context;
pub use output::write_artifact;
pub use registry::{Orchestrator, TaskDef};

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::error::TaskError;
use crate::logging::TaskStatus;

/// Compile and post-process the stylesheet entry point.
pub const STYLES: &str = "styles";
/// Bundle the CommonJS entry module.
pub const BUNDLE: &str = "bundle";
/// Optimise new or changed images.
pub const IMAGES: &str = "images";
/// Lint scripts and the config file.
pub const LINT: &str = "lint";
/// Build the feature-detection script from the built styles and scripts.
pub const FEATURE_DETECT: &str = "feature-detect";
/// Pull the staged assets directory into `dest`.
pub const SYNC_FROM_REMOTE: &str = "sync-from-remote";
/// Push `dest`'s assets directory to the staging location.
pub const SYNC_TO_REMOTE: &str = "sync-to-remote";
/// Everything a plain build needs.
pub const DEFAULT: &str = "default";

/// Result of a single task execution.
///
/// # Examples
///
/// ```
/// use assetpipe::tasks::TaskResult;
///
/// let skipped = TaskResult::Skipped("jshint not found".into());
/// assert!(matches!(skipped, TaskResult::Skipped(_)));
/// ```
#[derive(Debug, Clone)]
pub enum TaskResult {
    /// Task completed successfully.
    Ok,
    /// Task had nothing to do or its tool is unavailable.
    Skipped(String),
    /// Task ran in dry-run mode.
    DryRun,
}

/// Counters for tasks that write a set of artifacts.
///
/// # Examples
///
/// ```
/// use assetpipe::tasks::TaskStats;
///
/// let stats = TaskStats { written: 2, up_to_date: 5, skipped: 0 };
/// assert_eq!(stats.summary(false), "2 written, 5 up to date");
/// assert_eq!(stats.summary(true), "2 would be written, 5 up to date");
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TaskStats {
    /// Artifacts created or replaced.
    pub written: u32,
    /// Artifacts whose content was already current.
    pub up_to_date: u32,
    /// Inputs that were not processed.
    pub skipped: u32,
}

impl TaskStats {
    /// Create a new empty stats counter.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            written: 0,
            up_to_date: 0,
            skipped: 0,
        }
    }

    /// Format as a one-line summary.
    #[must_use]
    pub fn summary(&self, dry_run: bool) -> String {
        let verb = if dry_run { "would be written" } else { "written" };
        let base = format!("{} {verb}, {} up to date", self.written, self.up_to_date);
        if self.skipped > 0 {
            format!("{base}, {} skipped", self.skipped)
        } else {
            base
        }
    }

    /// Log the summary and return the appropriate `TaskResult`.
    #[must_use]
    pub fn finish(self, ctx: &Context) -> TaskResult {
        ctx.log.info(&self.summary(ctx.dry_run));
        if ctx.dry_run {
            TaskResult::DryRun
        } else {
            TaskResult::Ok
        }
    }
}

impl std::ops::AddAssign for TaskStats {
    fn add_assign(&mut self, other: Self) {
        self.written += other.written;
        self.up_to_date += other.up_to_date;
        self.skipped += other.skipped;
    }
}

/// Register every built-in task.
///
/// `feature-detect` reads the output of `styles` and `bundle` and so
/// depends on both.
///
/// # Errors
///
/// Returns [`TaskError::DuplicateTask`] only if the table below repeats a name.
pub fn build_orchestrator() -> Result<Orchestrator, TaskError> {
    let mut orch = Orchestrator::new();
    orch.register(STYLES, &[], styles::run)?;
    orch.register(BUNDLE, &[], bundle::run)?;
    orch.register(IMAGES, &[], images::run)?;
    orch.register(LINT, &[], lint::run)?;
    orch.register(FEATURE_DETECT, &[STYLES, BUNDLE], feature_detect::run)?;
    orch.register(SYNC_FROM_REMOTE, &[], sync::pull)?;
    orch.register(SYNC_TO_REMOTE, &[], sync::push)?;
    orch.register_composite(DEFAULT, &[STYLES, BUNDLE, IMAGES, FEATURE_DETECT])?;
    Ok(orch)
}

/// Execute one task, logging and recording its outcome.
///
/// # Errors
///
/// Returns [`TaskError::ExecutionFailed`] carrying the full error chain when
/// the action fails or panics.
pub fn execute(task: &TaskDef, ctx: &Context) -> Result<(), TaskError> {
    if !task.is_composite() {
        ctx.log.stage(task.name());
    }

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| task.invoke(ctx)))
        .unwrap_or_else(|payload| Err(anyhow::anyhow!("panicked: {}", panic_message(&*payload))));

    match outcome {
        Ok(TaskResult::Ok) => {
            ctx.log.record_task(task.name(), TaskStatus::Ok, None);
            Ok(())
        }
        Ok(TaskResult::Skipped(reason)) => {
            ctx.log.info(&format!("skipped: {reason}"));
            ctx.log
                .record_task(task.name(), TaskStatus::Skipped, Some(&reason));
            Ok(())
        }
        Ok(TaskResult::DryRun) => {
            ctx.log.record_task(task.name(), TaskStatus::DryRun, None);
            Ok(())
        }
        Err(e) => {
            let reason = format!("{e:#}");
            ctx.log.error(&format!("{}: {reason}", task.name()));
            ctx.log
                .record_task(task.name(), TaskStatus::Failed, Some(&reason));
            Err(TaskError::ExecutionFailed {
                task: task.name().to_string(),
                reason,
            })
        }
    }
}

/// Text of a panic payload raised with a string message.
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
