use std::fs;

use anyhow::{Context as _, Result};

use super::{Context, TaskResult};
use crate::logging::format_size;
use crate::transforms::sync::{self, SyncReport};

/// Pull the staged assets directory into the local `dest` mirror.
///
/// # Errors
///
/// Returns an error if rsync is missing or the transfer fails.
pub fn pull(ctx: &Context) -> Result<TaskResult> {
    let local = ctx.config.local_sync_location();
    if !ctx.dry_run {
        fs::create_dir_all(&local).with_context(|| format!("creating {local}"))?;
    }
    transfer(ctx, &ctx.config.stage_location(), &local)
}

/// Push the local assets directory to the staging location.
///
/// # Errors
///
/// Returns an error if rsync is missing or the transfer fails.
pub fn push(ctx: &Context) -> Result<TaskResult> {
    transfer(ctx, &ctx.config.local_sync_location(), &ctx.config.stage_location())
}

fn transfer(ctx: &Context, source: &str, destination: &str) -> Result<TaskResult> {
    ctx.log.debug(&format!("{source} -> {destination}"));
    let report = sync::sync(
        ctx.executor.as_ref(),
        ctx.root(),
        &ctx.config.sync,
        source,
        destination,
        ctx.dry_run,
    )?;
    ctx.log.info(&describe(&report));
    if report.dry_run {
        Ok(TaskResult::DryRun)
    } else {
        Ok(TaskResult::Ok)
    }
}

fn describe(report: &SyncReport) -> String {
    let verb = if report.dry_run {
        "would transfer"
    } else {
        "transferred"
    };
    let noun = if report.files_transferred == 1 {
        "file"
    } else {
        "files"
    };
    format!(
        "{verb} {} {noun} ({})",
        report.files_transferred,
        format_size(report.bytes_transferred)
    )
}
