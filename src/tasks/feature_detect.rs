use std::fs;
use std::path::Path;

use anyhow::{Context as _, Result};

use super::{Context, TaskResult, write_artifact};
use crate::transforms::feature_detect;

/// Build the feature-detection script from the built stylesheet and bundle.
///
/// # Errors
///
/// Returns an error if an existing input cannot be read or the script cannot
/// be written.
pub fn run(ctx: &Context) -> Result<TaskResult> {
    let config = &ctx.config;
    let css_path = ctx
        .path(&config.styles.output_dir)
        .join(format!("{}.css", config.styles.output_name));
    let js_path = ctx.path(&config.scripts.output);

    let css = read_input(ctx, &css_path)?;
    let js = read_input(ctx, &js_path)?;
    let detection = feature_detect::build(css.as_deref(), js.as_deref(), &config.feature_detect.always);

    for name in &detection.unknown {
        ctx.log.warn(&format!("unknown feature test: {name}"));
    }
    ctx.log.debug(&format!(
        "tests: {}",
        if detection.features.is_empty() {
            "none".to_string()
        } else {
            detection.features.join(", ")
        }
    ));

    let stats = write_artifact(
        ctx,
        &ctx.path(&config.feature_detect.output),
        detection.script.as_bytes(),
    )?;
    Ok(stats.finish(ctx))
}

/// Read a built artifact; `None` if it has not been written (dry run, or the
/// task was run on its own).
fn read_input(ctx: &Context, path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            ctx.log
                .debug(&format!("not built yet: {}", ctx.display_path(path)));
            Ok(None)
        }
        Err(e) => Err(e).with_context(|| format!("reading {}", ctx.display_path(path))),
    }
}
