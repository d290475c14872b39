//! Front-end asset build runner.
//!
//! Named tasks with prerequisites are registered on an [`Orchestrator`](tasks::Orchestrator),
//! which resolves the prerequisite closure of a request depth-first, rejects
//! unknown names and cycles before anything runs, and executes every task in
//! the closure exactly once. The built-in tasks compile stylesheets, bundle
//! CommonJS scripts, optimise images, lint scripts, build a feature-detection
//! script and sync the built assets with a staging host over rsync. Watch
//! mode maps file changes to task runs.
//!
//! The public API is organised into layers:
//!
//! - **[`config`]**: load and validate `assetpipe.toml`
//! - **[`transforms`]**: leaf capabilities (styles, bundles, images, lint, feature detection, sync)
//! - **[`tasks`]**: the orchestrator and the built-in task actions
//! - **[`watch`]**: glob bindings from changed files to tasks
//! - **[`commands`]**: top-level subcommands (`run`, `watch`, `list`, `version`)
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod exec;
pub mod logging;
pub mod tasks;
pub mod transforms;
pub mod watch;
