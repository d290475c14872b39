//! Dependency-driven task scheduling, parallel and sequential.
//!
//! Both schedulers take an already-resolved plan (every task after its
//! prerequisites, see [`graph::resolve`](super::graph::resolve)) and stop
//! starting new tasks as soon as one fails.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};

use super::registry::TaskDef;
use super::{Context, execute};
use crate::error::TaskError;
use crate::logging::{BufferedLog, Log, TaskStatus};

/// Lifecycle of one task within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Not started yet.
    Pending,
    /// Action in progress.
    Running,
    /// Action returned `Ok`.
    Succeeded,
    /// Action returned an error.
    Failed,
}

#[derive(Debug, Default)]
struct RunState {
    states: HashMap<String, TaskState>,
    /// First failure; once set, no further task starts.
    failure: Option<TaskError>,
}

/// Shared state for dependency-driven parallel scheduling.
///
/// Tasks call [`wait_for_deps`](TaskGraph::wait_for_deps) before starting and
/// [`finish`](TaskGraph::finish) when done.  The [`Condvar`] wakes all
/// waiting tasks whenever a state changes.
#[derive(Debug, Default)]
struct TaskGraph {
    state: Mutex<RunState>,
    condvar: Condvar,
}

impl TaskGraph {
    fn new<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let states = names
            .into_iter()
            .map(|n| (n.to_string(), TaskState::Pending))
            .collect();
        Self {
            state: Mutex::new(RunState {
                states,
                failure: None,
            }),
            condvar: Condvar::new(),
        }
    }

    /// Block until every name in `deps` has succeeded, then mark `name`
    /// running and return `true`.  Returns `false` without starting if the
    /// run halted first.
    fn wait_for_deps(&self, name: &str, deps: &[String]) -> bool {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        loop {
            if state.failure.is_some() {
                return false;
            }
            if deps
                .iter()
                .all(|d| state.states.get(d) == Some(&TaskState::Succeeded))
            {
                state.states.insert(name.to_string(), TaskState::Running);
                return true;
            }
            state = self
                .condvar
                .wait(state)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }

    /// Record the outcome of `name` and wake all waiting threads.
    fn finish(&self, name: &str, outcome: Result<(), TaskError>) {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match outcome {
            Ok(()) => {
                state.states.insert(name.to_string(), TaskState::Succeeded);
            }
            Err(e) => {
                state.states.insert(name.to_string(), TaskState::Failed);
                if state.failure.is_none() {
                    state.failure = Some(e);
                }
            }
        }
        drop(state);
        self.condvar.notify_all();
    }

    fn state_of(&self, name: &str) -> TaskState {
        self.state
            .lock()
            .map_or(TaskState::Pending, |s| {
                s.states.get(name).copied().unwrap_or(TaskState::Pending)
            })
    }

    fn into_failure(self) -> Option<TaskError> {
        self.state
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .failure
    }
}

/// Run `plan` with one OS thread per task.
///
/// Each thread waits for its prerequisites to succeed before executing.
/// OS threads are used rather than a Rayon pool because waiting on a
/// [`Condvar`] inside a fixed-size pool deadlocks once the pool is smaller
/// than the number of blocked tasks.  Output is buffered per task and
/// flushed on completion.
pub(super) fn run_parallel(plan: &[&TaskDef], ctx: &Context) -> Result<(), TaskError> {
    let graph = TaskGraph::new(plan.iter().map(|t| t.name()));

    std::thread::scope(|s| {
        for task in plan {
            let graph = &graph;
            s.spawn(move || {
                if !graph.wait_for_deps(task.name(), task.prerequisites()) {
                    return;
                }
                let buf = Arc::new(BufferedLog::new(Arc::clone(&ctx.log)));
                let task_ctx = ctx.with_log(Arc::clone(&buf) as Arc<dyn Log>);
                let outcome = execute(task, &task_ctx);
                buf.flush();
                graph.finish(task.name(), outcome);
            });
        }
    });

    for task in plan {
        if graph.state_of(task.name()) == TaskState::Pending {
            ctx.log.record_task(task.name(), TaskStatus::NotStarted, None);
        }
    }
    graph.into_failure().map_or(Ok(()), Err)
}

/// Run `plan` one task at a time in order, stopping at the first failure.
pub(super) fn run_sequential(plan: &[&TaskDef], ctx: &Context) -> Result<(), TaskError> {
    let mut tasks = plan.iter();
    for task in tasks.by_ref() {
        if let Err(e) = execute(task, ctx) {
            for rest in tasks {
                ctx.log.record_task(rest.name(), TaskStatus::NotStarted, None);
            }
            return Err(e);
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::tasks::registry::Orchestrator;
    use crate::tasks::test_helpers::{make_context, make_parallel_context, noop};
    use crate::tasks::TaskResult;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // -----------------------------------------------------------------------
    // TaskGraph
    // -----------------------------------------------------------------------

    #[test]
    fn graph_no_deps_does_not_block() {
        let graph = TaskGraph::new(["a"]);
        assert!(graph.wait_for_deps("a", &[]));
        assert_eq!(graph.state_of("a"), TaskState::Running);
    }

    #[test]
    fn graph_notifies_waiters() {
        let graph = Arc::new(TaskGraph::new(["a", "b"]));
        let g = Arc::clone(&graph);
        let handle = std::thread::spawn(move || g.wait_for_deps("b", &["a".to_string()]));
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert_eq!(graph.state_of("b"), TaskState::Pending);
        graph.finish("a", Ok(()));
        assert!(handle.join().expect("waiter thread should complete"));
    }

    #[test]
    fn graph_failure_releases_waiters_without_starting() {
        let graph = Arc::new(TaskGraph::new(["a", "b"]));
        let g = Arc::clone(&graph);
        let handle = std::thread::spawn(move || g.wait_for_deps("b", &["a".to_string()]));
        graph.finish(
            "a",
            Err(TaskError::ExecutionFailed {
                task: "a".to_string(),
                reason: "boom".to_string(),
            }),
        );
        assert!(!handle.join().unwrap());
        assert_eq!(graph.state_of("b"), TaskState::Pending);
        assert_eq!(graph.state_of("a"), TaskState::Failed);
    }

    #[test]
    fn graph_keeps_first_failure() {
        let graph = TaskGraph::new(["a", "b"]);
        for name in ["a", "b"] {
            graph.finish(
                name,
                Err(TaskError::ExecutionFailed {
                    task: name.to_string(),
                    reason: String::new(),
                }),
            );
        }
        assert!(matches!(
            graph.into_failure(),
            Some(TaskError::ExecutionFailed { task, .. }) if task == "a"
        ));
    }

    // -----------------------------------------------------------------------
    // Schedulers
    // -----------------------------------------------------------------------

    fn failing_chain() -> (Orchestrator, Arc<AtomicUsize>) {
        let after = Arc::new(AtomicUsize::new(0));
        let mut orch = Orchestrator::new();
        orch.register("bad", &[], |_| anyhow::bail!("kaboom")).unwrap();
        let counter = Arc::clone(&after);
        orch.register("after", &["bad"], move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(TaskResult::Ok)
        })
        .unwrap();
        (orch, after)
    }

    #[test]
    fn sequential_failure_marks_rest_not_started() {
        let (orch, after) = failing_chain();
        let (ctx, log) = make_context();
        let err = orch.run("after", &ctx).unwrap_err();
        assert!(matches!(err, TaskError::ExecutionFailed { ref task, .. } if task == "bad"));
        assert_eq!(after.load(Ordering::SeqCst), 0);
        let entries = log.task_entries();
        assert_eq!(entries[0].status, TaskStatus::Failed);
        assert_eq!(entries[1].name, "after");
        assert_eq!(entries[1].status, TaskStatus::NotStarted);
    }

    #[test]
    fn parallel_failure_marks_dependents_not_started() {
        let (orch, after) = failing_chain();
        let (ctx, log) = make_parallel_context();
        let err = orch.run("after", &ctx).unwrap_err();
        assert!(err.to_string().contains("kaboom"), "got {err}");
        assert_eq!(after.load(Ordering::SeqCst), 0);
        assert!(
            log.task_entries()
                .iter()
                .any(|e| e.name == "after" && e.status == TaskStatus::NotStarted)
        );
    }

    #[test]
    fn parallel_in_flight_task_finishes_after_failure() {
        let finished = Arc::new(AtomicUsize::new(0));
        let mut orch = Orchestrator::new();
        orch.register("fails", &[], |_| {
            std::thread::sleep(std::time::Duration::from_millis(60));
            anyhow::bail!("early failure")
        })
        .unwrap();
        let counter = Arc::clone(&finished);
        orch.register("slow", &[], move |_| {
            std::thread::sleep(std::time::Duration::from_millis(250));
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(TaskResult::Ok)
        })
        .unwrap();
        orch.register_composite("both", &["fails", "slow"]).unwrap();

        let (ctx, _log) = make_parallel_context();
        assert!(orch.run("both", &ctx).is_err());
        assert_eq!(finished.load(Ordering::SeqCst), 1, "running task must finish");
    }

    #[test]
    fn parallel_runs_each_task_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut orch = Orchestrator::new();
        for name in ["a", "b", "c"] {
            let counter = Arc::clone(&count);
            orch.register(name, &[], move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(TaskResult::Ok)
            })
            .unwrap();
        }
        orch.register("d", &["a", "b", "c"], noop).unwrap();
        let (ctx, log) = make_parallel_context();
        orch.run_many(&["d", "a"], &ctx).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(log.task_entries().len(), 4);
    }

    fn panicking_chain() -> (Orchestrator, Arc<AtomicUsize>) {
        let after = Arc::new(AtomicUsize::new(0));
        let mut orch = Orchestrator::new();
        #[allow(clippy::panic)]
        orch.register("boom", &[], |_| panic!("index out of range"))
            .unwrap();
        let counter = Arc::clone(&after);
        orch.register("after", &["boom"], move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(TaskResult::Ok)
        })
        .unwrap();
        (orch, after)
    }

    #[test]
    fn panicking_prerequisite_fails_the_run_in_both_modes() {
        for (ctx, log) in [make_context(), make_parallel_context()] {
            let (orch, after) = panicking_chain();
            let err = orch.run("after", &ctx).unwrap_err();
            assert_eq!(
                err,
                TaskError::ExecutionFailed {
                    task: "boom".to_string(),
                    reason: "panicked: index out of range".to_string(),
                }
            );
            assert_eq!(after.load(Ordering::SeqCst), 0);
            assert!(
                log.task_entries()
                    .iter()
                    .any(|e| e.name == "after" && e.status == TaskStatus::NotStarted)
            );
        }
    }
}
