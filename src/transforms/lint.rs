//! Script linting through an external linter.
use std::path::Path;
use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;

use crate::exec::Executor;

#[allow(clippy::expect_used)]
static FINDING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?):(\d+):(\d+): (.*)$").expect("valid finding regex"));

/// One problem reported by the linter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    /// File as the linter printed it.
    pub file: String,
    /// 1-based line.
    pub line: u32,
    /// 1-based column.
    pub column: u32,
    /// Linter message, without the location prefix.
    pub message: String,
}

impl std::fmt::Display for Finding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}: {}", self.file, self.line, self.column, self.message)
    }
}

/// Parse `file:line:col: message` lines; everything else (summaries, blank
/// lines) is ignored.
#[must_use]
pub fn parse_findings(output: &str) -> Vec<Finding> {
    output
        .lines()
        .filter_map(|line| {
            let caps = FINDING_RE.captures(line.trim_end())?;
            Some(Finding {
                file: caps.get(1)?.as_str().to_string(),
                line: caps.get(2)?.as_str().parse().ok()?,
                column: caps.get(3)?.as_str().parse().ok()?,
                message: caps.get(4)?.as_str().to_string(),
            })
        })
        .collect()
}

/// Run `command args... files...` in `dir` and collect its findings.
///
/// A non-zero exit is expected when there are findings and is not an error.
///
/// # Errors
///
/// Returns an error only if the linter cannot be spawned.
pub fn check(
    executor: &dyn Executor,
    dir: &Path,
    command: &str,
    args: &[String],
    files: &[String],
) -> Result<Vec<Finding>> {
    let argv: Vec<&str> = args
        .iter()
        .chain(files.iter())
        .map(String::as_str)
        .collect();
    let result = executor.run_unchecked(dir, command, &argv)?;
    Ok(parse_findings(&result.stdout))
}
