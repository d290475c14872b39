//! Domain-specific error types for the asset pipeline.
//!
//! Internal modules return typed errors (e.g., [`TaskError`], [`BundleError`])
//! while command handlers at the CLI boundary convert them to [`anyhow::Error`]
//! via the standard `?` operator.
//!
//! # Error hierarchy
//!
//! ```text
//! AssetpipeError
//! ├── Config(ConfigError)       — reading and parsing assetpipe.toml
//! ├── Task(TaskError)           — registration, resolution, execution
//! ├── Transform(TransformError) — style preprocessing and CSS output
//! ├── Bundle(BundleError)       — CommonJS module resolution
//! ├── Image(ImageError)         — image decode / re-encode
//! ├── Sync(SyncError)           — rsync transfers
//! └── Watch(WatchError)         — filesystem observation
//! ```

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for the asset pipeline.
#[derive(Error, Debug)]
pub enum AssetpipeError {
    /// Configuration-related error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Orchestrator error (duplicate, unknown, cycle, failed action).
    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    /// Style transform error.
    #[error("Style error: {0}")]
    Transform(#[from] TransformError),

    /// Script bundling error.
    #[error("Bundle error: {0}")]
    Bundle(#[from] BundleError),

    /// Image optimisation error.
    #[error("Image error: {0}")]
    Image(#[from] ImageError),

    /// Remote sync error.
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// Watch mode error.
    #[error("Watch error: {0}")]
    Watch(#[from] WatchError),
}

/// Errors that arise from loading `assetpipe.toml`.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("IO error reading config file {path}: {source}")]
    Io {
        /// Path to the file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML or does not match the schema.
    #[error("Invalid config in {path}: {message}")]
    Parse {
        /// Path to the offending file.
        path: PathBuf,
        /// Parser message.
        message: String,
    },
}

/// Errors raised by the task orchestrator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// A task with this name is already registered.
    #[error("Task '{0}' is already registered")]
    DuplicateTask(String),

    /// A requested task or prerequisite is not registered.
    #[error("{}", unknown_task_message(.name, .required_by.as_deref()))]
    UnknownTask {
        /// The name that could not be resolved.
        name: String,
        /// The task that referenced it, if it was a prerequisite.
        required_by: Option<String>,
    },

    /// The prerequisite graph reachable from the requested task has a cycle.
    #[error("Task dependency cycle detected: {0}")]
    CyclicDependency(String),

    /// A task's action failed.
    #[error("Task '{task}' failed: {reason}")]
    ExecutionFailed {
        /// Name of the task that failed.
        task: String,
        /// Human-readable cause, including the error chain.
        reason: String,
    },
}

fn unknown_task_message(name: &str, required_by: Option<&str>) -> String {
    match required_by {
        Some(parent) => format!("Task '{name}' (required by '{parent}') is not registered"),
        None => format!("Task '{name}' is not registered"),
    }
}

/// Errors from the style transform.
#[derive(Error, Debug)]
pub enum TransformError {
    /// An `@import` could not be resolved against the include paths.
    #[error("cannot resolve @import \"{import}\" from {}", .from.display())]
    UnresolvedImport {
        /// The import specifier as written.
        import: String,
        /// File containing the import.
        from: PathBuf,
    },

    /// An `@import` chain refers back to a file already being inlined.
    #[error("circular @import of {}", .0.display())]
    CircularImport(PathBuf),

    /// The external style compiler exited with an error.
    #[error("{compiler} failed: {message}")]
    Compiler {
        /// Program name.
        compiler: String,
        /// Stderr or exit description.
        message: String,
    },

    /// The stylesheet could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// The browserslist query is invalid.
    #[error("invalid browser targets: {0}")]
    Targets(String),

    /// Minification or printing failed.
    #[error("output error: {0}")]
    Output(String),

    /// An I/O error reading a source file.
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        /// File being read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
}

/// Errors from the script bundler.
#[derive(Error, Debug)]
pub enum BundleError {
    /// A `require()` specifier did not resolve to a file.
    #[error("cannot find module '{module}' required from {}", .from.display())]
    Unresolved {
        /// The specifier as written.
        module: String,
        /// File containing the `require()` call.
        from: PathBuf,
    },

    /// An I/O error reading a module.
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        /// File being read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A package manifest could not be parsed.
    #[error("invalid package.json at {}: {message}", .path.display())]
    Manifest {
        /// Manifest path.
        path: PathBuf,
        /// Parser message.
        message: String,
    },
}

/// Errors from the image optimiser.
#[derive(Error, Debug)]
pub enum ImageError {
    /// The file extension is not one of the supported formats.
    #[error("unsupported image format: {0}")]
    Unsupported(String),

    /// The image could not be decoded or encoded.
    #[error("codec error: {0}")]
    Codec(#[from] image::ImageError),

    /// SVG input is not valid UTF-8.
    #[error("SVG is not valid UTF-8")]
    InvalidSvg,
}

/// Errors from the remote sync.
#[derive(Error, Debug)]
pub enum SyncError {
    /// `rsync` is not installed.
    #[error("rsync not found on PATH")]
    MissingRsync,

    /// The transfer failed (connection, permission, checksum mismatch, ...).
    #[error("rsync exited with {code}: {stderr}")]
    Transfer {
        /// Exit code, `-1` if terminated by a signal.
        code: i32,
        /// Trimmed standard error output.
        stderr: String,
    },
}

/// Errors that stop watch mode from starting or continuing.
#[derive(Error, Debug)]
pub enum WatchError {
    /// A binding's glob pattern is invalid.
    #[error("invalid watch pattern '{pattern}': {source}")]
    Pattern {
        /// The pattern as configured.
        pattern: String,
        /// Underlying glob error.
        source: globset::Error,
    },

    /// The filesystem watcher could not be created.
    #[error("failed to initialize file watcher: {0}")]
    Init(notify::Error),

    /// A directory could not be registered with the watcher.
    #[error("failed to watch {}: {source}", .path.display())]
    Path {
        /// Directory being watched.
        path: PathBuf,
        /// Underlying notify error.
        source: notify::Error,
    },

    /// The event channel closed unexpectedly.
    #[error("watch channel closed")]
    ChannelClosed,
}
