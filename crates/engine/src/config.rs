//! Run configuration via `proctor.toml`
//!
//! Settings come from three layers, each overriding the previous one:
//! the config file, `PROCTOR_*` environment variables, then command-line
//! flags (applied by the caller). Environment variables are read once, when
//! the run starts.

use proctor_core::{ProctorError, ProctorResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file name looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "proctor.toml";

/// Prefix of configuration environment variables
pub const ENV_PREFIX: &str = "PROCTOR_";

/// Run configuration loaded from `proctor.toml`
///
/// # Example
///
/// ```toml
/// addons_path = "addons"
/// use_template = true
/// template = "base"
/// drop_database = true
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Directory holding one sub-directory per module
    pub addons_path: PathBuf,
    /// Existing database to run against; never dropped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Provision databases with demo data
    pub require_demo: bool,
    /// Create databases from the template when possible
    pub use_template: bool,
    /// Template database name
    pub template: String,
    /// Drop databases created for the run
    pub drop_database: bool,
    /// Languages for translation checks
    pub languages: Vec<String>,
    /// Also test every dependency of the requested modules
    pub test_dependencies: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            addons_path: PathBuf::from("addons"),
            database: None,
            require_demo: false,
            use_template: true,
            template: "base".to_string(),
            drop_database: true,
            languages: Vec::new(),
            test_dependencies: false,
        }
    }
}

impl RunConfig {
    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Proctor run configuration
#
# Environment variables (PROCTOR_ADDONS_PATH, PROCTOR_DB_NAME, ...) override
# these values; command-line flags override both.

# Directory holding the modules, one sub-directory each
addons_path = "addons"

# Run against an existing database instead of creating one per module.
# A configured database is never dropped.
# database = "my_database"

# Create databases from the template (fast) unless demo data is required
use_template = true
template = "base"

# Load demo data when creating databases (forces a full install)
require_demo = false

# Drop the databases created for the run once their tests finish
drop_database = true

# Languages for translation checks
languages = []

# Also test every dependency of the requested modules
test_dependencies = false
"#
    }

    /// Read and parse config from a file path.
    pub fn from_file(path: &Path) -> ProctorResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProctorError::invalid_config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        toml::from_str(&content).map_err(|e| {
            ProctorError::invalid_config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> ProctorResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml())?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> ProctorResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProctorError::invalid_config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load `path` if given (defaults otherwise), then apply the process environment
    pub fn load(path: Option<&Path>) -> ProctorResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Override fields from `PROCTOR_*` variables found through `lookup`
    ///
    /// Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> ProctorResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(&format!("{}{}", ENV_PREFIX, name)).filter(|v| !v.trim().is_empty())
        };

        if let Some(v) = get("ADDONS_PATH") {
            self.addons_path = PathBuf::from(v);
        }
        if let Some(v) = get("DB_NAME") {
            self.database = Some(v);
        }
        if let Some(v) = get("REQUIRE_DEMO") {
            self.require_demo = parse_bool("PROCTOR_REQUIRE_DEMO", &v)?;
        }
        if let Some(v) = get("USE_TEMPLATE") {
            self.use_template = parse_bool("PROCTOR_USE_TEMPLATE", &v)?;
        }
        if let Some(v) = get("TEMPLATE") {
            self.template = v;
        }
        if let Some(v) = get("DROP_DATABASE") {
            self.drop_database = parse_bool("PROCTOR_DROP_DATABASE", &v)?;
        }
        if let Some(v) = get("LANGUAGES") {
            self.languages = v
                .split(',')
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = get("TEST_DEPENDENCIES") {
            self.test_dependencies = parse_bool("PROCTOR_TEST_DEPENDENCIES", &v)?;
        }
        Ok(())
    }

    /// Check settings that cannot be expressed in types
    pub fn validate(&self) -> ProctorResult<()> {
        if self.use_template && self.template.trim().is_empty() {
            return Err(ProctorError::invalid_config(
                "use_template is set but template is empty",
            ));
        }
        if let Some(db) = &self.database {
            if db.trim().is_empty() {
                return Err(ProctorError::invalid_config("database name is empty"));
            }
        }
        Ok(())
    }
}

fn parse_bool(name: &str, value: &str) -> ProctorResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ProctorError::invalid_config(format!(
            "{} must be a boolean, got '{}'",
            name, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_toml_parses_to_default() {
        let config: RunConfig = toml::from_str(RunConfig::default_toml()).unwrap();
        assert_eq!(config, RunConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "database = \"prod_copy\"\ndrop_database = false\n").unwrap();

        let config = RunConfig::from_file(&path).unwrap();
        assert_eq!(config.database.as_deref(), Some("prod_copy"));
        assert!(!config.drop_database);
        assert!(config.use_template);
        assert_eq!(config.template, "base");
    }

    #[test]
    fn test_invalid_file_is_configuration_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "use_template = \"maybe\"").unwrap();
        let err = RunConfig::from_file(&path).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_write_default_if_missing_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        RunConfig::write_default_if_missing(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), RunConfig::default_toml());

        std::fs::write(&path, "template = \"custom\"").unwrap();
        RunConfig::write_default_if_missing(&path).unwrap();
        assert_eq!(RunConfig::from_file(&path).unwrap().template, "custom");
    }

    #[test]
    fn test_write_to_file_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let mut config = RunConfig::default();
        config.database = Some("db".into());
        config.languages = vec!["es_ES".into()];
        config.write_to_file(&path).unwrap();
        assert_eq!(RunConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = RunConfig::default();
        config
            .apply_env(env(&[
                ("PROCTOR_ADDONS_PATH", "/srv/addons"),
                ("PROCTOR_DB_NAME", "shared"),
                ("PROCTOR_REQUIRE_DEMO", "1"),
                ("PROCTOR_USE_TEMPLATE", "false"),
                ("PROCTOR_DROP_DATABASE", "no"),
                ("PROCTOR_LANGUAGES", "es_ES, ca_ES,"),
                ("PROCTOR_TEST_DEPENDENCIES", "TRUE"),
                ("PROCTOR_TEMPLATE", ""),
            ]))
            .unwrap();

        assert_eq!(config.addons_path, PathBuf::from("/srv/addons"));
        assert_eq!(config.database.as_deref(), Some("shared"));
        assert!(config.require_demo);
        assert!(!config.use_template);
        assert!(!config.drop_database);
        assert_eq!(config.languages, vec!["es_ES", "ca_ES"]);
        assert!(config.test_dependencies);
        assert_eq!(config.template, "base");
    }

    #[test]
    fn test_bad_env_bool_is_rejected() {
        let mut config = RunConfig::default();
        let err = config
            .apply_env(env(&[("PROCTOR_REQUIRE_DEMO", "sometimes")]))
            .unwrap_err();
        assert!(err.to_string().contains("PROCTOR_REQUIRE_DEMO"));
    }

    #[test]
    fn test_validate() {
        let mut config = RunConfig::default();
        config.validate().unwrap();
        config.template = " ".into();
        assert!(config.validate().is_err());
        config.use_template = false;
        config.validate().unwrap();
    }
}
