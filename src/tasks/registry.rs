//! The task registry: named tasks, their prerequisites and actions.
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;

use super::{Context, TaskResult, graph, scheduler};
use crate::error::TaskError;

/// A task action. Shared so that the parallel scheduler can hand it to a
/// worker thread without cloning the closure.
pub type Action = Arc<dyn Fn(&Context) -> Result<TaskResult> + Send + Sync>;

/// A registered task.
#[derive(Clone)]
pub struct TaskDef {
    name: String,
    prerequisites: Vec<String>,
    action: Option<Action>,
}

impl fmt::Debug for TaskDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDef")
            .field("name", &self.name)
            .field("prerequisites", &self.prerequisites)
            .field("composite", &self.is_composite())
            .finish()
    }
}

impl TaskDef {
    /// Task name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Prerequisite names, in declaration order.
    #[must_use]
    pub fn prerequisites(&self) -> &[String] {
        &self.prerequisites
    }

    /// `true` for tasks that only group their prerequisites.
    #[must_use]
    pub const fn is_composite(&self) -> bool {
        self.action.is_none()
    }

    /// Invoke the action; composite tasks succeed immediately.
    ///
    /// # Errors
    ///
    /// Propagates the action's error.
    pub fn invoke(&self, ctx: &Context) -> Result<TaskResult> {
        self.action
            .as_ref()
            .map_or(Ok(TaskResult::Ok), |action| action(ctx))
    }
}

/// Holds every registered task and runs them by name.
///
/// Prerequisites may name tasks that are registered later; references are
/// only checked when a task is resolved for a run.
#[derive(Debug, Default)]
pub struct Orchestrator {
    tasks: HashMap<String, TaskDef>,
    order: Vec<String>,
}

impl Orchestrator {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::DuplicateTask`] if `name` is taken; the existing
    /// registration is kept.
    pub fn register<F>(
        &mut self,
        name: impl Into<String>,
        prerequisites: &[&str],
        action: F,
    ) -> Result<(), TaskError>
    where
        F: Fn(&Context) -> Result<TaskResult> + Send + Sync + 'static,
    {
        self.insert(name.into(), prerequisites, Some(Arc::new(action)))
    }

    /// Register a task that does nothing itself and exists to group its
    /// prerequisites (e.g. `default`).
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::DuplicateTask`] if `name` is taken.
    pub fn register_composite(
        &mut self,
        name: impl Into<String>,
        prerequisites: &[&str],
    ) -> Result<(), TaskError> {
        self.insert(name.into(), prerequisites, None)
    }

    fn insert(
        &mut self,
        name: String,
        prerequisites: &[&str],
        action: Option<Action>,
    ) -> Result<(), TaskError> {
        if self.tasks.contains_key(&name) {
            return Err(TaskError::DuplicateTask(name));
        }
        self.order.push(name.clone());
        self.tasks.insert(
            name.clone(),
            TaskDef {
                name,
                prerequisites: prerequisites.iter().map(ToString::to_string).collect(),
                action,
            },
        );
        Ok(())
    }

    /// Look up a task by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TaskDef> {
        self.tasks.get(name)
    }

    /// Whether `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    /// Registered tasks in registration order.
    pub fn tasks(&self) -> impl Iterator<Item = &TaskDef> {
        self.order.iter().filter_map(|name| self.tasks.get(name))
    }

    /// Number of registered tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// The order in which `run(name)` would invoke tasks.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::UnknownTask`] or [`TaskError::CyclicDependency`].
    pub fn plan(&self, name: &str) -> Result<Vec<String>, TaskError> {
        graph::resolve(self, &[name])
    }

    /// The order in which `run_many(names)` would invoke tasks.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::UnknownTask`] or [`TaskError::CyclicDependency`].
    pub fn plan_many(&self, names: &[&str]) -> Result<Vec<String>, TaskError> {
        graph::resolve(self, names)
    }

    /// Run `name` and everything it transitively requires, each exactly once.
    ///
    /// Structural problems are reported before any action runs. When an
    /// action fails, tasks that have not started are not started and tasks
    /// already running are allowed to finish.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::UnknownTask`], [`TaskError::CyclicDependency`], or
    /// [`TaskError::ExecutionFailed`] for the first action that failed.
    pub fn run(&self, name: &str, ctx: &Context) -> Result<(), TaskError> {
        self.run_many(&[name], ctx)
    }

    /// Run several requested tasks as one invocation over the union of their
    /// prerequisite closures.
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    pub fn run_many(&self, names: &[&str], ctx: &Context) -> Result<(), TaskError> {
        let order = graph::resolve(self, names)?;
        let plan: Vec<&TaskDef> = order.iter().filter_map(|n| self.tasks.get(n)).collect();
        ctx.log.debug(&format!("execution order: {}", order.join(", ")));
        if ctx.parallel && plan.len() > 1 {
            scheduler::run_parallel(&plan, ctx)
        } else {
            scheduler::run_sequential(&plan, ctx)
        }
    }
}
