use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use anyhow::{Context as _, Result};

use super::{Context, TaskResult, TaskStats, write_artifact};
use crate::logging::format_size;
use crate::transforms::image::{self, Format, ImageSettings};

/// Optimise new or changed images into the output directory.
///
/// Only the top level of the source directory and one level of
/// subdirectories are scanned. An image is processed when its destination
/// is missing or older than the source.
///
/// # Errors
///
/// Returns an error if an image cannot be read, decoded or written.
pub fn run(ctx: &Context) -> Result<TaskResult> {
    let opts = &ctx.config.images;
    let source = ctx.path(&opts.source);
    let output = ctx.path(&opts.output);
    let settings = ImageSettings {
        png_compression: opts.png_compression,
        svg_remove_comments: opts.svg_remove_comments,
        svg_remove_doctype: opts.svg_remove_doctype,
    };

    let files = discover(&source, &opts.extensions)?;
    if files.is_empty() {
        return Ok(TaskResult::Skipped(format!(
            "no images in {}",
            ctx.display_path(&source)
        )));
    }

    let mut stats = TaskStats::new();
    let mut pending = Vec::new();
    for file in files {
        let rel = file.strip_prefix(&source).unwrap_or(&file).to_path_buf();
        let dest = output.join(&rel);
        if is_newer(&file, &dest) {
            pending.push((file, dest));
        } else {
            ctx.log.debug(&format!("unchanged: {}", rel.display()));
            stats.up_to_date += 1;
        }
    }

    let work = |(src, dest): (PathBuf, PathBuf)| optimize_one(ctx, &src, &dest, &settings);
    stats += if ctx.parallel {
        collect_parallel_stats(pending, work)?
    } else {
        pending
            .into_iter()
            .try_fold(TaskStats::new(), |mut acc, item| -> Result<TaskStats> {
                acc += work(item)?;
                Ok(acc)
            })?
    };
    Ok(stats.finish(ctx))
}

fn optimize_one(ctx: &Context, src: &Path, dest: &Path, settings: &ImageSettings) -> Result<TaskStats> {
    let shown = ctx.display_path(src);
    let ext = src
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    let format = match Format::from_extension(ext) {
        Ok(format) => format,
        Err(e) => {
            ctx.log.warn(&format!("{shown}: {e}"));
            return Ok(TaskStats {
                skipped: 1,
                ..TaskStats::new()
            });
        }
    };

    let input = fs::read(src).with_context(|| format!("reading {shown}"))?;
    let optimized =
        image::optimize(&input, format, settings).with_context(|| format!("optimising {shown}"))?;
    if optimized.len() < input.len() {
        ctx.log.debug(&format!(
            "{shown}: saved {}",
            format_size((input.len() - optimized.len()) as u64)
        ));
    }
    let stats = write_artifact(ctx, dest, &optimized)?;
    if stats.up_to_date > 0 && !ctx.dry_run {
        // Same bytes as the existing copy: restamp it so the source stops
        // looking newer.
        let stamp = fs::metadata(src)
            .and_then(|m| m.modified())
            .map_or_else(|_| SystemTime::now(), |m| m.max(SystemTime::now()));
        fs::File::options()
            .write(true)
            .open(dest)
            .and_then(|f| f.set_modified(stamp))
            .with_context(|| format!("updating timestamp of {}", ctx.display_path(dest)))?;
    }
    Ok(stats)
}

/// Images at depth 0 and 1 under `dir` with one of `extensions`, sorted.
fn discover(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let options = glob::MatchOptions {
        case_sensitive: false,
        ..glob::MatchOptions::new()
    };
    let base = glob::Pattern::escape(&dir.to_string_lossy());
    let mut files = Vec::new();
    for ext in extensions {
        for pattern in [format!("{base}/*.{ext}"), format!("{base}/*/*.{ext}")] {
            let entries = glob::glob_with(&pattern, options)
                .with_context(|| format!("invalid image pattern {pattern}"))?;
            files.extend(entries.filter_map(Result::ok).filter(|p| p.is_file()));
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

/// Destination missing, or older than the source.
fn is_newer(src: &Path, dest: &Path) -> bool {
    let modified = |p: &Path| fs::metadata(p).and_then(|m| m.modified()).ok();
    match (modified(src), modified(dest)) {
        (Some(s), Some(d)) => s > d,
        _ => true,
    }
}

/// Run `work` on every item with Rayon and sum the resulting stats.
fn collect_parallel_stats<T: Send>(
    items: Vec<T>,
    work: impl Fn(T) -> Result<TaskStats> + Sync + Send,
) -> Result<TaskStats> {
    use rayon::prelude::*;
    let stats = Mutex::new(TaskStats::new());
    items.into_par_iter().try_for_each(|item| -> Result<()> {
        let delta = work(item)?;
        *stats
            .lock()
            .map_err(|e| anyhow::anyhow!("stats mutex poisoned: {e}"))? += delta;
        Ok(())
    })?;
    Ok(stats
        .into_inner()
        .unwrap_or_else(std::sync::PoisonError::into_inner))
}
