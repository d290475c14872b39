use anyhow::{Context as _, Result};

use super::{Context, TaskResult, write_artifact};
use crate::transforms::bundle;

/// Bundle the CommonJS entry module into a single script.
///
/// # Errors
///
/// Returns an error if a `require` cannot be resolved or the bundle cannot
/// be written.
pub fn run(ctx: &Context) -> Result<TaskResult> {
    let opts = &ctx.config.scripts;
    let entry = ctx.path(&opts.entry);
    let deps_root = ctx.path("{deps}");

    let bundle = bundle::bundle(&entry, &deps_root)
        .with_context(|| format!("bundling {}", ctx.display_path(&entry)))?;
    ctx.log.debug(&format!("{} modules", bundle.modules.len()));
    for module in bundle.modules.iter().skip(1) {
        ctx.log
            .debug(&format!("  {} {}", module.id, ctx.display_path(&module.path)));
    }

    let stats = write_artifact(ctx, &ctx.path(&opts.output), bundle.render().as_bytes())?;
    Ok(stats.finish(ctx))
}
