// Shared helpers for integration tests.
//
// Provides a temporary-directory-backed project with the classic
// `app/src` layout, and an executor that reports every external tool as
// missing so the built-in code paths are exercised.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use assetpipe::config::Config;
use assetpipe::exec::{ExecResult, Executor};
use assetpipe::logging::{Log, Logger};
use assetpipe::tasks::Context;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ImageEncoder, Rgba, RgbaImage};

/// Executor for a machine with no external tools installed.
#[derive(Debug, Default)]
pub struct NoTools;

impl Executor for NoTools {
    fn run(&self, program: &str, _args: &[&str]) -> Result<ExecResult> {
        anyhow::bail!("{program} is not installed")
    }

    fn run_in(&self, _dir: &Path, program: &str, _args: &[&str]) -> Result<ExecResult> {
        anyhow::bail!("{program} is not installed")
    }

    fn run_unchecked(&self, _dir: &Path, program: &str, _args: &[&str]) -> Result<ExecResult> {
        anyhow::bail!("{program} is not installed")
    }

    fn which(&self, _program: &str) -> bool {
        false
    }
}

/// A PNG written with the fastest, unfiltered settings, leaving room for
/// the optimiser.
pub fn loose_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, 96, 255])
    });
    let mut out = Vec::new();
    PngEncoder::new_with_quality(&mut out, CompressionType::Fast, FilterType::NoFilter)
        .write_image(img.as_raw(), width, height, image::ColorType::Rgba8)
        .expect("encode png");
    out
}

/// An isolated project backed by a [`tempfile::TempDir`].
pub struct TestProject {
    pub root: tempfile::TempDir,
}

impl TestProject {
    /// Empty project directory.
    pub fn empty() -> Self {
        Self {
            root: tempfile::tempdir().expect("create temp dir"),
        }
    }

    /// A project with a stylesheet (one partial), a script with one local
    /// module and one package, and two images.
    pub fn classic() -> Self {
        Self::empty()
            .with_file(
                "app/src/styles/main.scss",
                "@import 'base';\n\n.nav {\n  display: flex;\n  .item { color: $accent; }\n}\n.no-svg .logo { background: url(logo.png); }\n",
            )
            .with_file("app/src/styles/_base.scss", "$accent: #c0ffee;\nbody { margin: 0; }\n")
            .with_file(
                "app/src/scripts/main.js",
                "var menu = require('./nav/menu');\nvar pad = require('left-pad');\nif (Modernizr.touchevents) { menu(pad('x', 2)); }\n",
            )
            .with_file("app/src/scripts/nav/menu.js", "module.exports = function (s) { return s; };\n")
            .with_file("node_modules/left-pad/index.js", "module.exports = function (s) { return s; };\n")
            .with_bytes("app/src/images/logo.png", &loose_png(48, 48))
            .with_file("app/src/images/icons/menu.svg", "<svg>\n  <!-- menu -->\n  <path d=\"M0 0h8\"/>\n</svg>\n")
    }

    /// Write `contents` to `rel` under the root, creating parent directories.
    pub fn with_file(self, rel: &str, contents: &str) -> Self {
        self.with_bytes(rel, contents.as_bytes())
    }

    /// Binary variant of [`with_file`](Self::with_file).
    pub fn with_bytes(self, rel: &str, contents: &[u8]) -> Self {
        let path = self.path(rel);
        std::fs::create_dir_all(path.parent().expect("parent dir")).expect("create parent dir");
        std::fs::write(&path, contents).expect("write file");
        self
    }

    /// Absolute path of `rel`.
    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.path().join(rel)
    }

    /// Read `rel` as text.
    pub fn read(&self, rel: &str) -> String {
        std::fs::read_to_string(self.path(rel)).expect("read file")
    }

    /// Default configuration rooted here.
    pub fn config(&self) -> Config {
        Config::with_root(self.root.path())
    }

    /// Task context with no external tools.
    pub fn context(&self, dry_run: bool, parallel: bool) -> (Context, Arc<Logger>) {
        let log = Arc::new(Logger::new("test"));
        let ctx = Context::new(
            Arc::new(self.config()),
            Arc::clone(&log) as Arc<dyn Log>,
            Arc::new(NoTools),
            dry_run,
            parallel,
        );
        (ctx, log)
    }
}

/// Task names and statuses from `log`, sorted by name.
pub fn statuses(log: &Logger) -> Vec<String> {
    let mut lines: Vec<String> = log
        .task_entries()
        .iter()
        .map(|e| format!("{}: {:?}", e.name, e.status))
        .collect();
    lines.sort();
    lines
}
