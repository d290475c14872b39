//! Non-fatal configuration checks reported at startup.
use super::Config;

/// A validation warning detected during configuration loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    /// The configuration section (e.g., "styles", "sync").
    pub source: String,
    /// The specific item that triggered the warning.
    pub item: String,
    /// Human-readable warning message.
    pub message: String,
}

impl ValidationWarning {
    #[must_use]
    pub fn new(
        source: impl Into<String>,
        item: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            item: item.into(),
            message: message.into(),
        }
    }
}

/// Run every check against `config`.
#[must_use]
pub fn validate(config: &Config) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    check_styles(config, &mut warnings);
    check_scripts(config, &mut warnings);
    check_sync(config, &mut warnings);
    check_watch(config, &mut warnings);
    warnings
}

fn check_styles(config: &Config, warnings: &mut Vec<ValidationWarning>) {
    let entry = config.path(&config.styles.entry);
    if !entry.exists() {
        warnings.push(ValidationWarning::new(
            "styles",
            &config.styles.entry,
            format!("entry stylesheet {} does not exist", entry.display()),
        ));
    }
    for include in &config.styles.include_paths {
        let dir = config.path(include);
        if !dir.is_dir() {
            warnings.push(ValidationWarning::new(
                "styles",
                include,
                format!("include path {} is not a directory", dir.display()),
            ));
        }
    }
    if config.styles.browsers.is_empty() {
        warnings.push(ValidationWarning::new(
            "styles",
            "browsers",
            "no browser targets; output will not be prefixed",
        ));
    }
}

fn check_scripts(config: &Config, warnings: &mut Vec<ValidationWarning>) {
    let entry = config.path(&config.scripts.entry);
    if !entry.exists() {
        warnings.push(ValidationWarning::new(
            "scripts",
            &config.scripts.entry,
            format!("entry module {} does not exist", entry.display()),
        ));
    }
}

fn check_sync(config: &Config, warnings: &mut Vec<ValidationWarning>) {
    if !config.paths.stage.contains(':') {
        warnings.push(ValidationWarning::new(
            "paths",
            "stage",
            "stage location has no host part; sync will copy locally",
        ));
    }
    if config.sync.delete {
        warnings.push(ValidationWarning::new(
            "sync",
            "delete",
            "delete is enabled; files missing from the source will be removed",
        ));
    }
}

fn check_watch(config: &Config, warnings: &mut Vec<ValidationWarning>) {
    for binding in &config.watch.bindings {
        if binding.tasks.is_empty() {
            warnings.push(ValidationWarning::new(
                "watch",
                &binding.pattern,
                "binding has no tasks",
            ));
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::watch::WatchBinding;

    fn warnings_for(config: &Config, source: &str) -> Vec<ValidationWarning> {
        validate(config)
            .into_iter()
            .filter(|w| w.source == source)
            .collect()
    }

    #[test]
    fn empty_project_reports_missing_entries() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_root(dir.path());
        let styles = warnings_for(&config, "styles");
        assert!(styles.iter().any(|w| w.item == "{src}/styles/main.scss"));
        assert!(styles.iter().any(|w| w.message.contains("include path")));
        assert_eq!(warnings_for(&config, "scripts").len(), 1);
    }

    #[test]
    fn complete_project_has_no_style_warnings() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::with_root(dir.path());
        config.styles.include_paths = vec!["{src}/styles".to_string()];
        std::fs::create_dir_all(dir.path().join("app/src/styles")).unwrap();
        std::fs::write(dir.path().join("app/src/styles/main.scss"), "").unwrap();
        assert!(warnings_for(&config, "styles").is_empty());
    }

    #[test]
    fn local_stage_is_flagged() {
        let mut config = Config::with_root("/project");
        config.paths.stage = "/mnt/stage".to_string();
        assert_eq!(warnings_for(&config, "paths").len(), 1);
    }

    #[test]
    fn delete_is_flagged() {
        let mut config = Config::with_root("/project");
        config.sync.delete = true;
        assert!(warnings_for(&config, "sync").iter().any(|w| w.item == "delete"));
    }

    #[test]
    fn empty_binding_is_flagged() {
        let mut config = Config::with_root("/project");
        config.watch.bindings = vec![WatchBinding::new("**/*.css", &[])];
        assert_eq!(warnings_for(&config, "watch").len(), 1);
    }
}
