use anyhow::{Context as _, Result};

use super::{Context, TaskResult};
use crate::transforms::lint;

/// Lint the configured script files.
///
/// Findings are reported as warnings and never fail the task. A missing
/// linter or an empty file list skips the task.
///
/// # Errors
///
/// Returns an error for an invalid file pattern or if the linter cannot be
/// spawned.
pub fn run(ctx: &Context) -> Result<TaskResult> {
    let opts = &ctx.config.lint;
    if !ctx.executor.which(&opts.command) {
        return Ok(TaskResult::Skipped(format!("{} not found", opts.command)));
    }

    let files = expand(ctx, &opts.files)?;
    if files.is_empty() {
        return Ok(TaskResult::Skipped("no files to lint".to_string()));
    }
    ctx.log.debug(&format!("{} files", files.len()));

    let findings = lint::check(ctx.executor.as_ref(), ctx.root(), &opts.command, &opts.args, &files)?;
    for finding in &findings {
        ctx.log.warn(&finding.to_string());
    }
    ctx.log.info(&match findings.len() {
        0 => format!("{} files clean", files.len()),
        1 => "1 problem".to_string(),
        n => format!("{n} problems"),
    });
    Ok(TaskResult::Ok)
}

/// Expand root-relative glob patterns into a sorted, deduplicated list of
/// root-relative file paths.
fn expand(ctx: &Context, patterns: &[String]) -> Result<Vec<String>> {
    let root = glob::Pattern::escape(&ctx.root().to_string_lossy());
    let mut files = Vec::new();
    for template in patterns {
        let pattern = format!("{root}/{}", ctx.config.substitute(template));
        let entries =
            glob::glob(&pattern).with_context(|| format!("invalid lint pattern {template}"))?;
        files.extend(
            entries
                .filter_map(Result::ok)
                .filter(|p| p.is_file())
                .map(|p| ctx.display_path(&p)),
        );
    }
    files.sort();
    files.dedup();
    Ok(files)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::fs;
    use std::sync::Arc;

    use super::*;
    use crate::config::Config;
    use crate::exec::ExecResult;
    use crate::tasks::test_helpers::{RecordingExecutor, project_context};

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let scripts = dir.path().join("app/src/scripts");
        fs::create_dir_all(scripts.join("nav")).unwrap();
        fs::create_dir_all(scripts.join("vendor/deep")).unwrap();
        fs::write(scripts.join("main.js"), "").unwrap();
        fs::write(scripts.join("nav/menu.js"), "").unwrap();
        fs::write(scripts.join("vendor/deep/lib.js"), "").unwrap();
        dir
    }

    #[test]
    fn missing_linter_skips() {
        let dir = project();
        let exec = Arc::new(RecordingExecutor::new());
        let (ctx, _log) = project_context(Config::with_root(dir.path()), exec.clone(), false);
        let result = run(&ctx).unwrap();
        assert!(matches!(result, TaskResult::Skipped(ref r) if r == "jshint not found"));
        assert!(exec.calls().is_empty());
    }

    #[test]
    fn findings_become_warnings_not_failures() {
        let dir = project();
        let exec = Arc::new(RecordingExecutor::new().with_program(
            "jshint",
            ExecResult {
                stdout: "app/src/scripts/main.js:1:5: Missing semicolon.\n".to_string(),
                success: false,
                code: Some(2),
                ..ExecResult::default()
            },
        ));
        let (ctx, log) = project_context(Config::with_root(dir.path()), exec.clone(), false);

        assert!(matches!(run(&ctx).unwrap(), TaskResult::Ok));
        assert_eq!(log.messages("warn"), ["app/src/scripts/main.js:1:5: Missing semicolon."]);
        assert_eq!(log.messages("info"), ["1 problem"]);

        let call = &exec.calls()[0];
        assert_eq!(
            call.args,
            ["--reporter=unix", "app/src/scripts/main.js", "app/src/scripts/nav/menu.js"]
        );
        assert_eq!(call.dir.as_deref(), Some(dir.path()));
    }

    #[test]
    fn no_matching_files_skips() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Arc::new(RecordingExecutor::new().with_program("jshint", ExecResult::default()));
        let (ctx, _log) = project_context(Config::with_root(dir.path()), exec, false);
        assert!(matches!(run(&ctx).unwrap(), TaskResult::Skipped(_)));
    }
}
