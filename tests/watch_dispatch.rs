#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::wildcard_imports,
    clippy::indexing_slicing
)]
//! Watch bindings driving real task runs.
//!
//! The filesystem watcher itself is not started; changed paths are fed to
//! the dispatch function directly, as the watch loop does after debouncing.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use assetpipe::commands::watch::run_batch;
use assetpipe::tasks::{self, Orchestrator, TaskResult};
use assetpipe::watch::{WatchBinding, WatchSet};

use common::TestProject;

#[test]
fn scss_change_rebuilds_styles_only() {
    let project = TestProject::classic();
    let orch = tasks::build_orchestrator().unwrap();
    let (ctx, log) = project.context(false, false);
    let set = WatchSet::new(&project.config()).unwrap();

    let changed = [project.path("app/src/styles/_base.scss")];
    let ran = set.dispatch(&changed, |names| {
        assert_eq!(run_batch(&orch, names, &ctx, &log), 0);
    });

    assert_eq!(ran, ["styles"]);
    assert_eq!(common::statuses(&log), ["styles: Ok"]);
    assert!(project.path("app/public/styles/main.css").is_file());
    assert!(!project.path("app/public/scripts/bundle.js").exists());
}

#[test]
fn script_change_runs_lint_then_bundle() {
    let project = TestProject::classic();
    let orch = tasks::build_orchestrator().unwrap();
    let (ctx, log) = project.context(false, false);
    let set = WatchSet::new(&project.config()).unwrap();

    let changed = [project.path("app/src/scripts/nav/menu.js")];
    set.dispatch(&changed, |names| {
        assert_eq!(run_batch(&orch, names, &ctx, &log), 0);
    });

    let order: Vec<String> = log.task_entries().into_iter().map(|e| e.name).collect();
    assert_eq!(order, ["lint", "bundle"]);
    // No linter installed in the test environment.
    assert_eq!(common::statuses(&log), ["bundle: Ok", "lint: Skipped"]);
}

#[test]
fn failing_batch_does_not_prevent_the_next() {
    let project = TestProject::classic();
    let orch = tasks::build_orchestrator().unwrap();
    let (ctx, log) = project.context(false, false);
    let set = WatchSet::new(&project.config()).unwrap();
    let changed = [project.path("app/src/styles/main.scss")];

    std::fs::write(&changed[0], "@import 'nowhere';\n").unwrap();
    let mut results = Vec::new();
    let mut run = |names: &[String]| results.push(run_batch(&orch, names, &ctx, &log) == 0);
    set.dispatch(&changed, &mut run);

    std::fs::write(&changed[0], ".a { color: red; }\n").unwrap();
    set.dispatch(&changed, &mut run);

    assert_eq!(results, [false, true]);
    assert_eq!(common::statuses(&log), ["styles: Ok"]);
}

#[test]
fn failing_task_does_not_stop_the_rest_of_its_binding() {
    let project = TestProject::classic();
    let bundles = Arc::new(AtomicUsize::new(0));
    let mut orch = Orchestrator::new();
    orch.register("styles", &[], |_| anyhow::bail!("undefined variable"))
        .unwrap();
    let counter = Arc::clone(&bundles);
    orch.register("bundle", &[], move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(TaskResult::Ok)
    })
    .unwrap();
    let set = WatchSet::with_bindings(
        &project.config(),
        &[WatchBinding::new("{src}/**/*.scss", &["styles", "bundle"])],
    )
    .unwrap();

    for parallel in [false, true] {
        bundles.store(0, Ordering::SeqCst);
        let (ctx, log) = project.context(false, parallel);
        let changed = [project.path("app/src/styles/main.scss")];
        set.dispatch(&changed, |names| {
            assert_eq!(run_batch(&orch, names, &ctx, &log), 1);
        });

        assert_eq!(bundles.load(Ordering::SeqCst), 1, "parallel={parallel}");
        assert_eq!(common::statuses(&log), ["bundle: Ok", "styles: Failed"]);
    }
}

#[test]
fn custom_bindings_with_placeholders() {
    let project = TestProject::classic();
    let set = WatchSet::with_bindings(
        &project.config(),
        &[
            WatchBinding::new("{src}/images/**/*.{png,svg}", &["images"]),
            WatchBinding::new("{src}/**/*", &["images", "styles"]),
        ],
    )
    .unwrap();

    assert_eq!(
        set.tasks_for(&[project.path("app/src/images/icons/menu.svg")]),
        ["images", "styles"]
    );
    assert!(set.tasks_for(&[project.path("node_modules/left-pad/index.js")]).is_empty());
}
