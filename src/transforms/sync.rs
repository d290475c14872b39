//! Remote sync through `rsync`.
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::config::SyncOptions;
use crate::error::SyncError;
use crate::exec::Executor;

#[allow(clippy::expect_used)]
static FILES_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^Number of (?:regular )?files transferred:\s*([\d,]+)")
        .expect("valid files regex")
});

#[allow(clippy::expect_used)]
static BYTES_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^Total transferred file size:\s*([\d,]+)").expect("valid bytes regex")
});

/// Transfer statistics parsed from `rsync --stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Regular files sent (or that would be sent in dry-run mode).
    pub files_transferred: u64,
    /// Bytes of file data sent.
    pub bytes_transferred: u64,
    /// No files were changed on the receiving side.
    pub dry_run: bool,
}

/// Build the rsync argument list for `source` → `destination`.
///
/// `--delete` is only added when configured.
#[must_use]
pub fn build_args(options: &SyncOptions, source: &str, destination: &str, dry_run: bool) -> Vec<String> {
    let mut args = options.args.clone();
    if options.checksum {
        args.push("--checksum".to_string());
    }
    if options.delete {
        args.push("--delete".to_string());
    }
    args.extend(options.exclude.iter().map(|p| format!("--exclude={p}")));
    if options.ssh {
        args.push("-e".to_string());
        args.push("ssh".to_string());
    }
    if dry_run {
        args.push("--dry-run".to_string());
    }
    args.push(source.to_string());
    args.push(destination.to_string());
    args
}

/// Parse the `--stats` block; missing fields count as zero.
#[must_use]
pub fn parse_stats(output: &str, dry_run: bool) -> SyncReport {
    let number = |re: &Regex| {
        re.captures(output)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().replace(',', "").parse().ok())
            .unwrap_or(0)
    };
    SyncReport {
        files_transferred: number(&FILES_RE),
        bytes_transferred: number(&BYTES_RE),
        dry_run,
    }
}

/// Synchronise `source` to `destination`.
///
/// # Errors
///
/// Returns [`SyncError::MissingRsync`] if rsync is not installed, or
/// [`SyncError::Transfer`] if it exits non-zero or cannot be spawned.
pub fn sync(
    executor: &dyn Executor,
    dir: &Path,
    options: &SyncOptions,
    source: &str,
    destination: &str,
    dry_run: bool,
) -> Result<SyncReport, SyncError> {
    if !executor.which("rsync") {
        return Err(SyncError::MissingRsync);
    }
    let args = build_args(options, source, destination, dry_run);
    let argv: Vec<&str> = args.iter().map(String::as_str).collect();
    let result = executor
        .run_unchecked(dir, "rsync", &argv)
        .map_err(|e| SyncError::Transfer {
            code: -1,
            stderr: format!("{e:#}"),
        })?;
    if !result.success {
        return Err(SyncError::Transfer {
            code: result.code.unwrap_or(-1),
            stderr: result.stderr.trim().to_string(),
        });
    }
    Ok(parse_stats(&result.stdout, dry_run))
}
