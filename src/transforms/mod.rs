//! Leaf transforms: the capabilities task actions are built from.
//!
//! Each module works on explicit inputs (paths, bytes, option structs) and
//! knows nothing about the task orchestrator or the project layout; the
//! [`tasks`](crate::tasks) modules bind them to the configuration.
pub mod bundle;
pub mod feature_detect;
pub mod image;
pub mod lint;
pub mod style;
pub mod sync;
