//! Stylesheet transform.
//!
//! Two stages:
//!
//! 1. **Preprocess** the entry stylesheet into plain CSS. When the configured
//!    compiler (normally `sass`) is installed it does the work; otherwise the
//!    built-in preprocessor inlines `@import`s, expands global `$variables`,
//!    and drops `//` comments, leaving nesting to the next stage.
//! 2. **Post-process** with `lightningcss`: parse with nesting and error
//!    recovery, pack media queries, prefix and lower syntax for the browser
//!    targets, then print a readable and a minified copy.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, RwLock};

use lightningcss::printer::PrinterOptions;
use lightningcss::rules::{CssRule, CssRuleList};
use lightningcss::stylesheet::{MinifyOptions, ParserFlags, ParserOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use lightningcss::traits::ToCss;
use regex::Regex;

use crate::error::TransformError;
use crate::exec::Executor;

#[allow(clippy::expect_used)]
static IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*@import\s+(.+?)\s*;\s*$"#).expect("valid import regex")
});

#[allow(clippy::expect_used)]
static QUOTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"["']([^"']+)["']"#).expect("valid quoted regex"));

#[allow(clippy::expect_used)]
static VARIABLE_DECL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\$([A-Za-z0-9_-]+)\s*:\s*(.+?)\s*(!default)?\s*;\s*$")
        .expect("valid variable regex")
});

#[allow(clippy::expect_used)]
static VARIABLE_REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$([A-Za-z0-9_-]+)").expect("valid variable ref regex"));

/// Post-processing options.
#[derive(Debug, Clone, Default)]
pub struct PostProcess {
    /// Browserslist queries; empty disables prefixing.
    pub browsers: Vec<String>,
    /// Merge identical `@media` blocks and move them to the end.
    pub media_query_packing: bool,
    /// Minify the readable output as well.
    pub minify: bool,
}

/// The two printed stylesheets plus recovered parse warnings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleOutput {
    /// Readable CSS (`main.css`).
    pub css: String,
    /// Minified CSS (`main.min.css`).
    pub minified: String,
    /// Problems the parser recovered from.
    pub warnings: Vec<String>,
}

/// Preprocess and post-process `entry`.
///
/// # Errors
///
/// Returns a [`TransformError`] for unresolvable imports, compiler failure,
/// or unrecoverable parse errors.
pub fn transform(
    entry: &Path,
    include_paths: &[PathBuf],
    compiler: Option<&str>,
    executor: &dyn Executor,
    options: &PostProcess,
) -> Result<StyleOutput, TransformError> {
    let css = preprocess(entry, include_paths, compiler, executor)?;
    let filename = entry.display().to_string();
    postprocess(&css, &filename, options)
}

/// Turn the entry stylesheet into plain CSS (nesting allowed).
///
/// # Errors
///
/// Returns [`TransformError::Compiler`] if the external compiler fails, or
/// any error from [`inline_imports`] when the built-in path is used.
pub fn preprocess(
    entry: &Path,
    include_paths: &[PathBuf],
    compiler: Option<&str>,
    executor: &dyn Executor,
) -> Result<String, TransformError> {
    match compiler {
        Some(program) if executor.which(program) => {
            compile_external(program, entry, include_paths, executor)
        }
        _ => inline_imports(entry, include_paths),
    }
}

fn compile_external(
    program: &str,
    entry: &Path,
    include_paths: &[PathBuf],
    executor: &dyn Executor,
) -> Result<String, TransformError> {
    let mut args = vec!["--no-source-map".to_string()];
    args.extend(
        include_paths
            .iter()
            .map(|p| format!("--load-path={}", p.display())),
    );
    args.push(entry.display().to_string());
    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();

    let dir = entry.parent().unwrap_or_else(|| Path::new("."));
    let result = executor
        .run_unchecked(dir, program, &arg_refs)
        .map_err(|e| TransformError::Compiler {
            compiler: program.to_string(),
            message: format!("{e:#}"),
        })?;
    if !result.success {
        return Err(TransformError::Compiler {
            compiler: program.to_string(),
            message: result.stderr.trim().to_string(),
        });
    }
    Ok(result.stdout)
}

/// The built-in preprocessor.
///
/// Each `@import` is resolved against the importing file's directory, then
/// each include path, trying `name.scss`, `_name.scss`, `name.css`,
/// `_name.css` and `name/_index.scss` (or `name`, `_name` when the import
/// already has an extension). `url(...)` and remote imports are left alone.
///
/// # Errors
///
/// Returns [`TransformError::UnresolvedImport`], [`TransformError::CircularImport`]
/// or [`TransformError::Io`].
pub fn inline_imports(entry: &Path, include_paths: &[PathBuf]) -> Result<String, TransformError> {
    let mut inliner = Inliner {
        include_paths,
        stack: Vec::new(),
        variables: HashMap::new(),
    };
    inliner.inline(entry)
}

struct Inliner<'a> {
    include_paths: &'a [PathBuf],
    stack: Vec<PathBuf>,
    variables: HashMap<String, String>,
}

impl Inliner<'_> {
    fn inline(&mut self, file: &Path) -> Result<String, TransformError> {
        let io_err = |source| TransformError::Io {
            path: file.to_path_buf(),
            source,
        };
        let canonical = dunce::canonicalize(file).map_err(io_err)?;
        if self.stack.contains(&canonical) {
            return Err(TransformError::CircularImport(canonical));
        }
        let source = fs::read_to_string(&canonical).map_err(io_err)?;
        let dir = canonical
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        self.stack.push(canonical.clone());

        let mut out = String::with_capacity(source.len());
        for line in source.lines() {
            let line = strip_line_comment(line);
            if let Some(caps) = IMPORT_RE.captures(line) {
                let targets = caps.get(1).map_or("", |m| m.as_str());
                if is_plain_css_import(targets) {
                    out.push_str(line);
                    out.push('\n');
                    continue;
                }
                for spec in QUOTED_RE.captures_iter(targets).filter_map(|c| c.get(1)) {
                    let resolved = self.resolve(spec.as_str(), &dir).ok_or_else(|| {
                        TransformError::UnresolvedImport {
                            import: spec.as_str().to_string(),
                            from: canonical.clone(),
                        }
                    })?;
                    out.push_str(&self.inline(&resolved)?);
                }
            } else if let Some(caps) = VARIABLE_DECL_RE.captures(line) {
                self.declare(&caps);
            } else {
                out.push_str(&self.expand(line));
                out.push('\n');
            }
        }

        self.stack.pop();
        Ok(out)
    }

    fn declare(&mut self, caps: &regex::Captures<'_>) {
        let (Some(name), Some(value)) = (caps.get(1), caps.get(2)) else {
            return;
        };
        let is_default = caps.get(3).is_some();
        if is_default && self.variables.contains_key(name.as_str()) {
            return;
        }
        let value = self.expand(value.as_str());
        self.variables.insert(name.as_str().to_string(), value);
    }

    fn expand(&self, text: &str) -> String {
        VARIABLE_REF_RE
            .replace_all(text, |caps: &regex::Captures<'_>| {
                let whole = caps.get(0).map_or("", |m| m.as_str());
                caps.get(1)
                    .and_then(|name| self.variables.get(name.as_str()))
                    .map_or_else(|| whole.to_string(), Clone::clone)
            })
            .into_owned()
    }

    fn resolve(&self, spec: &str, dir: &Path) -> Option<PathBuf> {
        let candidates = import_candidates(spec);
        std::iter::once(dir)
            .chain(self.include_paths.iter().map(PathBuf::as_path))
            .flat_map(|base| candidates.iter().map(move |c| base.join(c)))
            .find(|p| p.is_file())
    }
}

fn is_plain_css_import(targets: &str) -> bool {
    let t = targets.trim_start_matches(['"', '\'']);
    targets.starts_with("url(") || t.starts_with("http://") || t.starts_with("https://") || t.starts_with("//")
}

fn import_candidates(spec: &str) -> Vec<PathBuf> {
    let path = Path::new(spec);
    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return Vec::new();
    };
    let names = if path.extension().is_some() {
        vec![name.to_string(), format!("_{name}")]
    } else {
        vec![
            format!("{name}.scss"),
            format!("_{name}.scss"),
            format!("{name}.css"),
            format!("_{name}.css"),
            format!("{name}/_index.scss"),
            format!("{name}/index.scss"),
        ]
    };
    names.into_iter().map(|n| parent.join(n)).collect()
}

/// Cut a `//` comment that starts outside quotes and parentheses.
fn strip_line_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut depth = 0usize;
    let mut prev = '\0';
    for (i, c) in line.char_indices() {
        match (quote, c) {
            (Some(q), _) if c == q && prev != '\\' => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => depth = depth.saturating_sub(1),
            (None, '/') if prev == '/' && depth == 0 => {
                return line.get(..i - 1).unwrap_or("").trim_end();
            }
            _ => {}
        }
        prev = c;
    }
    line
}

/// Parse, pack, prefix and print `css`.
///
/// # Errors
///
/// Returns [`TransformError::Parse`] if the stylesheet cannot be parsed even
/// with error recovery, [`TransformError::Targets`] for an invalid browser
/// query, and [`TransformError::Output`] if minification or printing fails.
pub fn postprocess(
    css: &str,
    filename: &str,
    options: &PostProcess,
) -> Result<StyleOutput, TransformError> {
    let warnings = Arc::new(RwLock::new(Vec::new()));
    let mut sheet = StyleSheet::parse(
        css,
        ParserOptions {
            filename: filename.to_string(),
            flags: ParserFlags::NESTING,
            error_recovery: true,
            warnings: Some(Arc::clone(&warnings)),
            ..ParserOptions::default()
        },
    )
    .map_err(|e| TransformError::Parse(e.to_string()))?;

    let warnings: Vec<String> = warnings
        .read()
        .map(|w| w.iter().map(ToString::to_string).collect())
        .unwrap_or_default();

    if options.media_query_packing {
        pack_media_queries(&mut sheet.rules)?;
    }

    let targets = browser_targets(&options.browsers)?;
    sheet
        .minify(MinifyOptions {
            targets,
            ..MinifyOptions::default()
        })
        .map_err(|e| TransformError::Output(e.to_string()))?;

    let print = |minify: bool| {
        sheet
            .to_css(PrinterOptions {
                minify,
                targets,
                ..PrinterOptions::default()
            })
            .map(|out| out.code)
            .map_err(|e| TransformError::Output(e.to_string()))
    };

    Ok(StyleOutput {
        css: print(options.minify)?,
        minified: print(true)?,
        warnings,
    })
}

/// Resolve browserslist queries into lightningcss targets.
///
/// # Errors
///
/// Returns [`TransformError::Targets`] if a query is invalid.
pub fn browser_targets(queries: &[String]) -> Result<Targets, TransformError> {
    if queries.is_empty() {
        return Ok(Targets::default());
    }
    let browsers = Browsers::from_browserslist(queries.iter().map(String::as_str))
        .map_err(|e| TransformError::Targets(e.to_string()))?;
    Ok(browsers.map(Targets::from).unwrap_or_default())
}

/// Merge top-level `@media` rules with identical queries, keeping the order
/// of first appearance, and move them after all other rules.
fn pack_media_queries(rules: &mut CssRuleList<'_>) -> Result<(), TransformError> {
    let mut plain = Vec::with_capacity(rules.0.len());
    let mut packed: Vec<(String, CssRule<'_>)> = Vec::new();

    for rule in std::mem::take(&mut rules.0) {
        let CssRule::Media(media) = rule else {
            plain.push(rule);
            continue;
        };
        let key = media
            .query
            .to_css_string(PrinterOptions::default())
            .map_err(|e| TransformError::Output(e.to_string()))?;
        match packed.iter_mut().find(|(k, _)| *k == key) {
            Some((_, CssRule::Media(existing))) => existing.rules.0.extend(media.rules.0),
            _ => packed.push((key, CssRule::Media(media))),
        }
    }

    plain.extend(packed.into_iter().map(|(_, rule)| rule));
    rules.0 = plain;
    Ok(())
}
