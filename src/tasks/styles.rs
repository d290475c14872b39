use anyhow::{Context as _, Result};

use super::{Context, TaskResult, write_artifact};
use crate::transforms::style::{self, PostProcess};

/// Compile the stylesheet entry point into `main.css` and `main.min.css`.
///
/// # Errors
///
/// Returns an error if the entry cannot be preprocessed or parsed, or an
/// output cannot be written.
pub fn run(ctx: &Context) -> Result<TaskResult> {
    let opts = &ctx.config.styles;
    let entry = ctx.path(&opts.entry);
    let include_paths: Vec<_> = opts.include_paths.iter().map(|p| ctx.path(p)).collect();
    let post = PostProcess {
        browsers: opts.browsers.clone(),
        media_query_packing: opts.media_query_packing,
        minify: opts.minify,
    };

    ctx.log.debug(&format!("entry: {}", ctx.display_path(&entry)));
    let output = style::transform(
        &entry,
        &include_paths,
        opts.compiler.as_deref(),
        ctx.executor.as_ref(),
        &post,
    )
    .with_context(|| format!("compiling {}", ctx.display_path(&entry)))?;

    for warning in &output.warnings {
        ctx.log.warn(warning);
    }

    let out_dir = ctx.path(&opts.output_dir);
    let mut stats = write_artifact(
        ctx,
        &out_dir.join(format!("{}.css", opts.output_name)),
        output.css.as_bytes(),
    )?;
    stats += write_artifact(
        ctx,
        &out_dir.join(format!("{}.min.css", opts.output_name)),
        output.minified.as_bytes(),
    )?;
    Ok(stats.finish(ctx))
}
