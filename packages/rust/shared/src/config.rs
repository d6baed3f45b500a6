//! Application configuration for ContactScrub.
//!
//! User config lives at `~/.contactscrub/contactscrub.toml`.
//! CLI flags override config file values, which override defaults.
//! The inference API key itself is never stored in the file — only the name
//! of the environment variable that holds it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ContactScrubError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "contactscrub.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".contactscrub";

// ---------------------------------------------------------------------------
// Config structs (matching contactscrub.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Inference backend settings.
    #[serde(default)]
    pub inference: InferenceSettings,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Default database path (relative paths resolve against the working
    /// directory).
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "var/contactscrub.db".into()
}

/// `[inference]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceSettings {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Base URL of the OpenAI-compatible chat-completions backend.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model identifier sent with each request.
    #[serde(default = "default_model")]
    pub model: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            model: default_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl InferenceSettings {
    /// Resolve the API key from the configured environment variable.
    ///
    /// `None` means the capability is unconfigured and the pipeline runs
    /// with deterministic enrichment only.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.is_empty())
    }
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-3.5-turbo".into()
}
fn default_timeout_secs() -> u64 {
    30
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.contactscrub/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ContactScrubError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.contactscrub/contactscrub.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ContactScrubError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        ContactScrubError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ContactScrubError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ContactScrubError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ContactScrubError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("db_path"));
        assert!(toml_str.contains("OPENAI_API_KEY"));
        assert!(toml_str.contains("api.openai.com"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.defaults.db_path, "var/contactscrub.db");
        assert_eq!(parsed.inference.model, "gpt-3.5-turbo");
        assert_eq!(parsed.inference.timeout_secs, 30);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[inference]
model = "gpt-4o-mini"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.inference.model, "gpt-4o-mini");
        assert_eq!(config.inference.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.defaults.db_path, "var/contactscrub.db");
    }

    #[test]
    fn api_key_resolution() {
        let mut settings = InferenceSettings::default();
        // Use a unique env var name to avoid interfering with other tests
        settings.api_key_env = "CS_TEST_NONEXISTENT_KEY_12345".into();
        assert!(settings.api_key().is_none());

        settings.api_key_env = "CS_TEST_PRESENT_KEY_12345".into();
        // SAFETY: test-local variable name, not read concurrently.
        unsafe { std::env::set_var("CS_TEST_PRESENT_KEY_12345", "sk-test") };
        assert_eq!(settings.api_key().as_deref(), Some("sk-test"));
    }
}
