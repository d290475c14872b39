//! Project configuration loaded from `assetpipe.toml`.
//!
//! Every key is optional: a missing file or a missing key falls back to the
//! defaults below, which reproduce the classic `app/src` → `app/public`
//! layout. Path-valued options are templates that may reference the path
//! table with `{src}`, `{dest}`, `{deps}` and `{config}` placeholders.
pub mod toml_loader;
pub mod validation;

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;
use crate::watch::WatchBinding;

pub use validation::ValidationWarning;

/// Default config file name, looked up in the project root.
pub const CONFIG_FILE_NAME: &str = "assetpipe.toml";

/// All loaded configuration for a project.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Project root; every relative path is resolved against it.
    #[serde(skip)]
    pub root: PathBuf,
    /// Config file path relative to `root` (watched).
    #[serde(skip)]
    pub file: String,
    /// `[paths]`: `src`, `dest` and `deps`.
    pub paths: PathConfig,
    /// `[styles]`
    pub styles: StyleOptions,
    /// `[scripts]`
    pub scripts: ScriptOptions,
    /// `[images]`
    pub images: ImageOptions,
    /// `[lint]`
    pub lint: LintOptions,
    /// `[feature_detect]`
    pub feature_detect: FeatureDetectOptions,
    /// `[sync]`
    pub sync: SyncOptions,
    /// `[watch]`: debounce and bindings.
    pub watch: WatchOptions,
}

/// Symbolic path table consumed by every task.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct PathConfig {
    /// Source root.
    pub src: String,
    /// Destination root for built artifacts.
    pub dest: String,
    /// Third-party dependency root.
    pub deps: String,
    /// Remote staging location (`user@host:/path`), mirror of `dest`.
    pub stage: String,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            src: "./app/src".to_string(),
            dest: "./app/public".to_string(),
            deps: "./node_modules".to_string(),
            stage: "user@servername:/path/to/site/app/public".to_string(),
        }
    }
}

/// Options for the `styles` task.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct StyleOptions {
    /// Stylesheet entry point.
    pub entry: String,
    /// Directory receiving `main.css` and `main.min.css`.
    pub output_dir: String,
    /// Base name of the output files.
    pub output_name: String,
    /// Browserslist queries used for prefixing and syntax lowering.
    pub browsers: Vec<String>,
    /// Directories searched when resolving `@import`.
    pub include_paths: Vec<String>,
    /// Merge identical media queries and move them to the end.
    pub media_query_packing: bool,
    /// Minify the readable `main.css` too.
    pub minify: bool,
    /// External preprocessor; the built-in one is used when unset or missing.
    pub compiler: Option<String>,
}

impl Default for StyleOptions {
    fn default() -> Self {
        Self {
            entry: "{src}/styles/main.scss".to_string(),
            output_dir: "{dest}/styles".to_string(),
            output_name: "main".to_string(),
            browsers: vec![
                "last 3 versions".to_string(),
                "ie 8".to_string(),
                "ie 9".to_string(),
            ],
            include_paths: vec![
                "{src}/styles".to_string(),
                "{deps}/bourbon/app/assets/stylesheets".to_string(),
                "{deps}/bourbon-neat/app/assets/stylesheets".to_string(),
                "{deps}/node.normalize.scss".to_string(),
            ],
            media_query_packing: true,
            minify: false,
            compiler: Some("sass".to_string()),
        }
    }
}

/// Options for the `bundle` task.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ScriptOptions {
    /// CommonJS entry module.
    pub entry: String,
    /// Bundle output file.
    pub output: String,
}

impl Default for ScriptOptions {
    fn default() -> Self {
        Self {
            entry: "{src}/scripts/main.js".to_string(),
            output: "{dest}/scripts/bundle.js".to_string(),
        }
    }
}

/// PNG re-encoding effort.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PngCompression {
    /// Fastest encode, largest output.
    Fast,
    /// Balanced.
    Default,
    /// Smallest output.
    #[default]
    Best,
}

/// Options for the `images` task.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ImageOptions {
    /// Directory scanned for images (top level and one level of subdirectories).
    pub source: String,
    /// Directory receiving optimised copies, mirroring `source`.
    pub output: String,
    /// File extensions to process (lowercase, without dot).
    pub extensions: Vec<String>,
    /// zlib effort for re-encoded PNGs.
    pub png_compression: PngCompression,
    /// Strip `<!-- -->` comments from SVG files.
    pub svg_remove_comments: bool,
    /// Strip the `<!DOCTYPE>` declaration from SVG files.
    pub svg_remove_doctype: bool,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            source: "{src}/images".to_string(),
            output: "{dest}/images".to_string(),
            extensions: ["gif", "jpg", "jpeg", "png", "svg"]
                .iter()
                .map(ToString::to_string)
                .collect(),
            png_compression: PngCompression::Best,
            svg_remove_comments: true,
            svg_remove_doctype: false,
        }
    }
}

/// Options for the `lint` task.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct LintOptions {
    /// Linter program.
    pub command: String,
    /// Arguments placed before the file list; must select a
    /// `file:line:col: message` reporter.
    pub args: Vec<String>,
    /// Glob patterns of files to lint.
    pub files: Vec<String>,
}

impl Default for LintOptions {
    fn default() -> Self {
        Self {
            command: "jshint".to_string(),
            args: vec!["--reporter=unix".to_string()],
            files: vec![
                "{src}/scripts/*.js".to_string(),
                "{src}/scripts/*/*.js".to_string(),
            ],
        }
    }
}

/// Options for the `feature-detect` task.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct FeatureDetectOptions {
    /// Detector script output file.
    pub output: String,
    /// Tests always included, whether referenced or not.
    pub always: Vec<String>,
}

impl Default for FeatureDetectOptions {
    fn default() -> Self {
        Self {
            output: "{dest}/scripts/modernizr.js".to_string(),
            always: Vec::new(),
        }
    }
}

/// Options for the `sync-from-remote` and `sync-to-remote` tasks.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SyncOptions {
    /// Base rsync flags.
    pub args: Vec<String>,
    /// Subdirectory of `dest` / `stage` that is synchronised.
    pub directory: String,
    /// Delete destination files missing from the source.
    pub delete: bool,
    /// Exclude patterns.
    pub exclude: Vec<String>,
    /// Use ssh as the remote shell.
    pub ssh: bool,
    /// Compare by checksum instead of size and mtime.
    pub checksum: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            args: ["--archive", "--compress", "--stats", "--verbose"]
                .iter()
                .map(ToString::to_string)
                .collect(),
            directory: "assets".to_string(),
            delete: false,
            exclude: [".git*", "*.scss", "node_modules"]
                .iter()
                .map(ToString::to_string)
                .collect(),
            ssh: true,
            checksum: true,
        }
    }
}

/// Options for watch mode.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct WatchOptions {
    /// Debounce window for filesystem events.
    pub debounce_ms: u64,
    /// Pattern → task bindings.
    pub bindings: Vec<WatchBinding>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            debounce_ms: 100,
            bindings: vec![
                WatchBinding::new("{config}", &["lint"]),
                WatchBinding::new("{src}/scripts/**/*.js", &["lint", "bundle"]),
                WatchBinding::new("{src}/styles/**/*.scss", &["styles"]),
            ],
        }
    }
}

impl Config {
    /// Load configuration from `path`; the file's directory becomes the root.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config: Self = toml_loader::load_config(path)?;
        config.root = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        config.file = path
            .file_name()
            .map_or_else(|| CONFIG_FILE_NAME.to_string(), |n| n.to_string_lossy().into_owned());
        Ok(config)
    }

    /// Default configuration rooted at `root`.
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            file: CONFIG_FILE_NAME.to_string(),
            ..Self::default()
        }
    }

    /// Replace path placeholders in `template` and normalise the result to a
    /// root-relative string (no leading `./`).
    #[must_use]
    pub fn substitute(&self, template: &str) -> String {
        let expanded = template
            .replace("{src}", &self.paths.src)
            .replace("{dest}", &self.paths.dest)
            .replace("{deps}", &self.paths.deps)
            .replace("{config}", &self.file);
        normalize(&expanded)
    }

    /// Resolve `template` to a filesystem path under the project root.
    #[must_use]
    pub fn path(&self, template: &str) -> PathBuf {
        self.root.join(self.substitute(template))
    }

    /// Remote staging location with the sync subdirectory, e.g.
    /// `user@host:/site/app/public/assets/`.
    #[must_use]
    pub fn stage_location(&self) -> String {
        format!(
            "{}/{}/",
            self.paths.stage.trim_end_matches('/'),
            self.sync.directory.trim_matches('/')
        )
    }

    /// Local mirror of [`stage_location`](Self::stage_location).
    #[must_use]
    pub fn local_sync_location(&self) -> String {
        let dest = self.path("{dest}");
        format!(
            "{}/{}/",
            dest.display().to_string().trim_end_matches('/'),
            self.sync.directory.trim_matches('/')
        )
    }

    /// Check the configuration for common mistakes.
    #[must_use]
    pub fn validate(&self) -> Vec<ValidationWarning> {
        validation::validate(self)
    }
}

/// Strip leading `./` segments and normalise separators to `/`.
fn normalize(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let mut rest = unified.as_str();
    while let Some(stripped) = rest.strip_prefix("./") {
        rest = stripped;
    }
    if rest == "." {
        String::new()
    } else {
        rest.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_classic_layout() {
        let config = Config::with_root("/project");
        assert_eq!(config.substitute("{src}/styles/main.scss"), "app/src/styles/main.scss");
        assert_eq!(
            config.path("{dest}/scripts/bundle.js"),
            PathBuf::from("/project/app/public/scripts/bundle.js")
        );
        assert_eq!(config.styles.browsers, ["last 3 versions", "ie 8", "ie 9"]);
        assert!(!config.sync.delete, "sync must never delete by default");
        assert!(config.sync.checksum);
    }

    #[test]
    fn config_placeholder_expands_to_file_name() {
        let config = Config::with_root("/project");
        assert_eq!(config.substitute("{config}"), "assetpipe.toml");
    }

    #[test]
    fn normalize_strips_dot_segments() {
        assert_eq!(normalize("./././a/b"), "a/b");
        assert_eq!(normalize("a\\b"), "a/b");
        assert_eq!(normalize("."), "");
    }

    #[test]
    fn stage_location_appends_sync_directory() {
        let config = Config::with_root("/project");
        assert_eq!(
            config.stage_location(),
            "user@servername:/path/to/site/app/public/assets/"
        );
        assert_eq!(
            config.local_sync_location(),
            "/project/app/public/assets/"
        );
    }

    #[test]
    fn load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join(CONFIG_FILE_NAME)).unwrap();
        assert_eq!(config.root, dir.path());
        assert_eq!(config.paths, PathConfig::default());
        assert_eq!(config.watch.bindings.len(), 3);
    }

    #[test]
    fn load_overrides_selected_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("build.toml");
        std::fs::write(
            &path,
            "[paths]\nsrc = \"assets\"\n\n[styles]\nbrowsers = [\"chrome 100\"]\n\n\
             [[watch.bindings]]\npattern = \"{src}/**/*.css\"\ntasks = [\"styles\"]\n",
        )
        .unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.file, "build.toml");
        assert_eq!(config.paths.src, "assets");
        assert_eq!(config.paths.dest, "./app/public");
        assert_eq!(config.styles.browsers, ["chrome 100"]);
        assert!(config.styles.media_query_packing);
        assert_eq!(config.watch.bindings.len(), 1);
        assert_eq!(config.watch.debounce_ms, 100);
    }

    #[test]
    fn load_rejects_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[paths]\nsource = \"x\"\n").unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }), "got {err:?}");
    }

    #[test]
    fn png_compression_parses_lowercase() {
        let opts: ImageOptions = toml::from_str("png_compression = \"fast\"").unwrap();
        assert_eq!(opts.png_compression, PngCompression::Fast);
    }
}
