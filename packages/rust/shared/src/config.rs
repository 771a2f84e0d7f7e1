//! Application configuration for the BMEcat builder.
//!
//! User config lives at `~/.bmecat/bmecat.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BmecatError, Result};
use crate::types::BmecatFormat;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "bmecat.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".bmecat";

/// Default specification database file name inside the config directory.
const SPEC_DB_FILE_NAME: &str = "specs.db";

// ---------------------------------------------------------------------------
// Config structs (matching bmecat.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// OpenRouter settings for the templating oracle.
    #[serde(default)]
    pub openrouter: OpenRouterConfig,

    /// Article price rendering rules.
    #[serde(default)]
    pub pricing: PricingConfig,

    /// Specification store location.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Format used when neither the header file nor a flag sets one.
    #[serde(default)]
    pub format: BmecatFormat,
}

/// `[openrouter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model used for template and mapping inference.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// API base URL (the `/chat/completions` path is appended).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// HTTP timeout per oracle call, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            default_model: default_model(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_model() -> String {
    "google/gemini-2.5-flash".into()
}
fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_timeout_secs() -> u64 {
    120
}

/// `[pricing]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Value written into every `<TAX>` element.
    #[serde(default = "default_tax_rate")]
    pub tax_rate: String,

    /// Replace the first `,` of a price with `.` before rendering.
    #[serde(default = "default_true")]
    pub decimal_comma_to_point: bool,

    /// `price_type` attribute used when a row has none.
    #[serde(default = "default_price_type")]
    pub default_price_type: String,

    /// Currency used when neither the row nor the header has one.
    #[serde(default = "default_currency")]
    pub default_currency: String,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            tax_rate: default_tax_rate(),
            decimal_comma_to_point: true,
            default_price_type: default_price_type(),
            default_currency: default_currency(),
        }
    }
}

fn default_tax_rate() -> String {
    "0.19".into()
}
fn default_true() -> bool {
    true
}
fn default_price_type() -> String {
    "net_list".into()
}
fn default_currency() -> String {
    "EUR".into()
}

/// `[storage]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the specification database. Defaults to `~/.bmecat/specs.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<String>,
}

// ---------------------------------------------------------------------------
// Assembly config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime rendering configuration handed to the document assembler.
#[derive(Debug, Clone)]
pub struct AssemblyConfig {
    pub tax_rate: String,
    pub decimal_comma_to_point: bool,
    pub default_price_type: String,
    pub default_currency: String,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for AssemblyConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            tax_rate: config.pricing.tax_rate.clone(),
            decimal_comma_to_point: config.pricing.decimal_comma_to_point,
            default_price_type: config.pricing.default_price_type.clone(),
            default_currency: config.pricing.default_currency.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.bmecat/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| BmecatError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.bmecat/bmecat.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Resolve the specification database path from config, falling back to the config dir.
pub fn spec_db_path(config: &AppConfig) -> Result<PathBuf> {
    match &config.storage.database_path {
        Some(path) => Ok(PathBuf::from(path)),
        None => Ok(config_dir()?.join(SPEC_DB_FILE_NAME)),
    }
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
    let content = std::fs::read_to_string(path).map_err(|e| BmecatError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| BmecatError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| BmecatError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| BmecatError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| BmecatError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the OpenRouter API key from the configured env var.
pub fn resolve_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.openrouter.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(BmecatError::config(format!(
            "OpenRouter API key not found. Set the {var_name} environment variable.\n\
             Get a key at https://openrouter.ai/keys"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("tax_rate"));
        assert!(toml_str.contains("OPENROUTER_API_KEY"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.pricing.tax_rate, "0.19");
        assert_eq!(parsed.openrouter.api_key_env, "OPENROUTER_API_KEY");
        assert_eq!(parsed.defaults.format, BmecatFormat::V1_2);
    }

    #[test]
    fn partial_pricing_section() {
        let toml_str = r#"
[defaults]
format = "2005"

[pricing]
tax_rate = "0.07"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.defaults.format, BmecatFormat::V2005);
        assert_eq!(config.pricing.tax_rate, "0.07");
        assert!(config.pricing.decimal_comma_to_point);
        assert_eq!(config.pricing.default_price_type, "net_list");
    }

    #[test]
    fn assembly_config_from_app_config() {
        let assembly = AssemblyConfig::default();
        assert_eq!(assembly.tax_rate, "0.19");
        assert_eq!(assembly.default_currency, "EUR");
        assert!(assembly.decimal_comma_to_point);
    }

    #[test]
    fn explicit_database_path_wins() {
        let mut config = AppConfig::default();
        config.storage.database_path = Some("/tmp/specs-test.db".into());
        assert_eq!(
            spec_db_path(&config).unwrap(),
            PathBuf::from("/tmp/specs-test.db")
        );
    }

    #[test]
    fn api_key_resolution() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.openrouter.api_key_env = "BMECAT_TEST_NONEXISTENT_KEY_12345".into();
        let result = resolve_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
