//! Settings layering.
//!
//! Settings are read from two levels and deep-merged, the higher level
//! overriding the lower one key by key:
//!
//! ```text
//! User     {config_dir}/csm-flow/settings.json
//!   ↓ overridden by
//! Project  <project>/.csm/settings.json
//! ```
//!
//! Missing files are skipped. A file that exists but does not parse is an
//! error.

use super::FlowConfig;
use crate::error::{FlowError, Result};
use std::path::{Path, PathBuf};

// ============================================================================
// Configuration Level
// ============================================================================

/// Configuration level. Later levels override earlier ones.
///
/// ```rust
/// use csm_flow::config::ConfigLevel;
///
/// assert!(ConfigLevel::User < ConfigLevel::Project);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConfigLevel {
    /// `{config_dir}/csm-flow/settings.json`
    User,
    /// `<project>/.csm/settings.json`
    Project,
}

impl std::fmt::Display for ConfigLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Project => write!(f, "project"),
        }
    }
}

/// A settings file that was checked during loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSource {
    pub level: ConfigLevel,
    pub path: PathBuf,
    /// `false` if the file does not exist.
    pub loaded: bool,
}

/// Every settings file checked, lowest level first.
#[derive(Debug, Clone, Default)]
pub struct InheritanceChain {
    pub sources: Vec<ConfigSource>,
}

impl InheritanceChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_source(&mut self, level: ConfigLevel, path: PathBuf, loaded: bool) {
        self.sources.push(ConfigSource {
            level,
            path,
            loaded,
        });
    }

    /// Get the number of files that were actually loaded.
    #[must_use]
    pub fn loaded_count(&self) -> usize {
        self.sources.iter().filter(|s| s.loaded).count()
    }

    /// One line per source, `+` for loaded and `-` for missing.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut lines = vec!["Configuration inheritance chain:".to_string()];
        for source in &self.sources {
            let status = if source.loaded { "+" } else { "-" };
            lines.push(format!(
                "  {} [{}] {}",
                status,
                source.level,
                source.path.display()
            ));
        }
        lines.join("\n")
    }
}

// ============================================================================
// Configuration Loader
// ============================================================================

/// Loads [`FlowConfig`] from the user and project levels.
///
/// # Example
///
/// ```rust,ignore
/// let (config, chain) = ConfigLoader::new().load_with_chain(&project_dir)?;
/// tracing::debug!("{}", chain.describe());
/// ```
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    user_config_path: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a loader using the platform's user config directory.
    #[must_use]
    pub fn new() -> Self {
        Self {
            user_config_path: Self::default_user_path(),
        }
    }

    /// `{config_dir}/csm-flow/settings.json`, if the platform has one.
    #[must_use]
    pub fn default_user_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("csm-flow").join("settings.json"))
    }

    /// Override the user settings path.
    #[must_use]
    pub fn with_user_config_path(mut self, path: PathBuf) -> Self {
        self.user_config_path = Some(path);
        self
    }

    /// Skip the user level entirely.
    #[must_use]
    pub fn without_user_config(mut self) -> Self {
        self.user_config_path = None;
        self
    }

    #[must_use]
    pub fn user_config_path(&self) -> Option<&PathBuf> {
        self.user_config_path.as_ref()
    }

    /// Load and merge settings for `project_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Config`] if a settings file cannot be read or
    /// parsed, or the merged settings do not match [`FlowConfig`].
    pub fn load(&self, project_dir: &Path) -> Result<FlowConfig> {
        self.load_with_chain(project_dir).map(|(config, _)| config)
    }

    /// Load settings and report which files were used.
    ///
    /// # Errors
    ///
    /// See [`ConfigLoader::load`].
    pub fn load_with_chain(&self, project_dir: &Path) -> Result<(FlowConfig, InheritanceChain)> {
        let mut chain = InheritanceChain::new();
        let mut merged = serde_json::Value::Object(serde_json::Map::new());

        if let Some(ref user_path) = self.user_config_path {
            let loaded = load_and_merge(&mut merged, user_path)?;
            chain.add_source(ConfigLevel::User, user_path.clone(), loaded);
        }

        let project_path = FlowConfig::settings_path(project_dir);
        let loaded = load_and_merge(&mut merged, &project_path)?;
        chain.add_source(ConfigLevel::Project, project_path.clone(), loaded);

        let config: FlowConfig = serde_json::from_value(merged).map_err(|e| {
            FlowError::config_with_path(format!("Invalid settings: {}", e), project_path)
        })?;

        Ok((config, chain))
    }
}

/// Merge the file at `path` into `accumulated`. Returns `false` if missing.
fn load_and_merge(accumulated: &mut serde_json::Value, path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        FlowError::config_with_path(format!("Failed to read settings: {}", e), path.to_path_buf())
    })?;
    let value: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
        FlowError::config_with_path(
            format!("Failed to parse {}: {}", path.display(), e),
            path.to_path_buf(),
        )
    })?;

    if !value.is_object() {
        return Err(FlowError::config_with_path(
            format!("{} must contain a JSON object", path.display()),
            path.to_path_buf(),
        ));
    }

    deep_merge(accumulated, value);
    Ok(true)
}

/// Deep merge two JSON values, with child overriding parent.
///
/// Objects merge key by key; every other value (arrays included) replaces.
pub fn deep_merge(parent: &mut serde_json::Value, child: serde_json::Value) {
    match (parent, child) {
        (serde_json::Value::Object(parent_map), serde_json::Value::Object(child_map)) => {
            for (key, child_value) in child_map {
                match parent_map.get_mut(&key) {
                    Some(parent_value) => deep_merge(parent_value, child_value),
                    None => {
                        parent_map.insert(key, child_value);
                    }
                }
            }
        }
        (parent, child) => {
            *parent = child;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write(path: &Path, value: serde_json::Value) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, serde_json::to_string_pretty(&value).unwrap()).unwrap();
    }

    #[test]
    fn test_config_level_ordering() {
        assert!(ConfigLevel::User < ConfigLevel::Project);
        assert_eq!(ConfigLevel::Project.to_string(), "project");
    }

    #[test]
    fn test_deep_merge_nested() {
        let mut parent = json!({"max_retries": 2, "llm": {"provider": "openai", "temperature": 0.5}});
        deep_merge(&mut parent, json!({"llm": {"temperature": 0.1}, "client": "Acme"}));
        assert_eq!(
            parent,
            json!({"max_retries": 2, "client": "Acme", "llm": {"provider": "openai", "temperature": 0.1}})
        );
    }

    #[test]
    fn test_load_defaults_when_nothing_exists() {
        let temp = TempDir::new().unwrap();
        let (config, chain) = ConfigLoader::new()
            .with_user_config_path(temp.path().join("user/settings.json"))
            .load_with_chain(temp.path())
            .unwrap();

        assert_eq!(config, FlowConfig::default());
        assert_eq!(chain.sources.len(), 2);
        assert_eq!(chain.loaded_count(), 0);
    }

    #[test]
    fn test_project_overrides_user_key_by_key() {
        let temp = TempDir::new().unwrap();
        let user_path = temp.path().join("user/settings.json");
        write(
            &user_path,
            json!({"client": "Globex", "max_retries": 5, "llm": {"model": "gpt-4o", "temperature": 0.2}}),
        );
        write(
            &FlowConfig::settings_path(temp.path()),
            json!({"client": "Acme", "llm": {"temperature": 0.9}}),
        );

        let (config, chain) = ConfigLoader::new()
            .with_user_config_path(user_path)
            .load_with_chain(temp.path())
            .unwrap();

        assert_eq!(config.client.as_deref(), Some("Acme"));
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.llm.model.as_deref(), Some("gpt-4o"));
        assert!((config.llm.temperature - 0.9).abs() < f32::EPSILON);
        assert_eq!(chain.loaded_count(), 2);
        assert!(chain.describe().contains("+ [project]"));
    }

    #[test]
    fn test_parse_error_names_file() {
        let temp = TempDir::new().unwrap();
        let path = FlowConfig::settings_path(temp.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();

        let err = ConfigLoader::new()
            .without_user_config()
            .load(temp.path())
            .unwrap_err();
        assert!(matches!(err, FlowError::Config { path: Some(_), .. }));
        assert_eq!(err.exit_code(), 7);
    }

    #[test]
    fn test_non_object_settings_rejected() {
        let temp = TempDir::new().unwrap();
        write(&FlowConfig::settings_path(temp.path()), json!([1, 2, 3]));

        let result = ConfigLoader::new().without_user_config().load(temp.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_wrong_type_rejected() {
        let temp = TempDir::new().unwrap();
        write(
            &FlowConfig::settings_path(temp.path()),
            json!({"max_retries": "three"}),
        );

        let result = ConfigLoader::new().without_user_config().load(temp.path());
        assert!(matches!(result, Err(FlowError::Config { .. })));
    }
}
