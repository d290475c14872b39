use std::fs;
use std::path::Path;

use anyhow::{Context as _, Result};

use super::{Context, TaskStats};
use crate::logging::format_size;

/// Write one build artifact, honouring dry-run and skipping identical content.
///
/// Logs the artifact's path relative to the project root and its size.
///
/// # Errors
///
/// Returns an error if the parent directory or the file cannot be written.
pub fn write_artifact(ctx: &Context, path: &Path, contents: &[u8]) -> Result<TaskStats> {
    let shown = ctx.display_path(path);
    let size = format_size(contents.len() as u64);

    if fs::read(path).is_ok_and(|existing| existing == contents) {
        ctx.log.debug(&format!("up to date: {shown} ({size})"));
        return Ok(TaskStats {
            up_to_date: 1,
            ..TaskStats::new()
        });
    }

    if ctx.dry_run {
        ctx.log.dry_run(&format!("would write {shown} ({size})"));
    } else {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
        fs::write(path, contents).with_context(|| format!("writing {}", path.display()))?;
        ctx.log.info(&format!("{shown} {size}"));
    }
    Ok(TaskStats {
        written: 1,
        ..TaskStats::new()
    })
}
