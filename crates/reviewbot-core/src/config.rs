use std::env;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use dirs::config_dir;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

const CONFIG_DIR_NAME: &str = "reviewbot";
const CONFIG_FILE_NAME: &str = "config.toml";

/// File holding the `yelp_api_key` and `openai_api_key` entries.
pub const API_KEYS_FILE_NAME: &str = "api_keys.json";
/// File holding the `email` and `password` used by the browser login flow.
pub const LOGIN_FILE_NAME: &str = "credentials.json";

pub const DEFAULT_SEARCH_BASE_URL: &str = "https://api.yelp.com/v3/businesses/";
pub const DEFAULT_COMPLETION_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_MAX_TOKENS: u32 = 1024;
pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";
pub const DEFAULT_SHORT_WAIT_MS: u64 = 5_000;
pub const DEFAULT_LONG_WAIT_MS: u64 = 20_000;

/// Errors raised while loading settings or credentials.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("{field} in {path} must not be empty")]
    Empty { path: PathBuf, field: &'static str },
}

/// Indicates where the settings were loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsSource {
    /// No usable settings file was found; defaults were used.
    Default,
    /// Settings were read from `config.toml`.
    File,
}

/// Result returned by [`load_settings`], capturing the source and any non-fatal issues.
#[derive(Debug, Clone)]
pub struct SettingsLoadResult {
    pub settings: Settings,
    pub warnings: Vec<String>,
    pub source: SettingsSource,
}

/// Disk-backed settings schema.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FileSettings {
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub paths: PathSettings,
    #[serde(default)]
    pub browser: BrowserSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ApiSettings {
    #[serde(default = "ApiSettings::default_search_base_url")]
    pub search_base_url: String,
    #[serde(default = "ApiSettings::default_completion_base_url")]
    pub completion_base_url: String,
    #[serde(default = "ApiSettings::default_model")]
    pub model: String,
    #[serde(default = "ApiSettings::default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            search_base_url: Self::default_search_base_url(),
            completion_base_url: Self::default_completion_base_url(),
            model: Self::default_model(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl ApiSettings {
    fn default_search_base_url() -> String {
        DEFAULT_SEARCH_BASE_URL.to_string()
    }

    fn default_completion_base_url() -> String {
        DEFAULT_COMPLETION_BASE_URL.to_string()
    }

    fn default_model() -> String {
        DEFAULT_MODEL.to_string()
    }

    const fn default_max_tokens() -> u32 {
        DEFAULT_MAX_TOKENS
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PathSettings {
    #[serde(default = "PathSettings::default_credentials_dir")]
    pub credentials_dir: String,
    #[serde(default = "PathSettings::default_output_dir")]
    pub output_dir: String,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            credentials_dir: Self::default_credentials_dir(),
            output_dir: Self::default_output_dir(),
        }
    }
}

impl PathSettings {
    fn default_credentials_dir() -> String {
        config_directory().to_string_lossy().into_owned()
    }

    fn default_output_dir() -> String {
        ".".to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BrowserSettings {
    #[serde(default = "BrowserSettings::default_webdriver_url")]
    pub webdriver_url: String,
    #[serde(default = "BrowserSettings::default_short_wait_ms")]
    pub short_wait_ms: u64,
    #[serde(default = "BrowserSettings::default_long_wait_ms")]
    pub long_wait_ms: u64,
    #[serde(default)]
    pub headless: bool,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            webdriver_url: Self::default_webdriver_url(),
            short_wait_ms: DEFAULT_SHORT_WAIT_MS,
            long_wait_ms: DEFAULT_LONG_WAIT_MS,
            headless: false,
        }
    }
}

impl BrowserSettings {
    fn default_webdriver_url() -> String {
        DEFAULT_WEBDRIVER_URL.to_string()
    }

    const fn default_short_wait_ms() -> u64 {
        DEFAULT_SHORT_WAIT_MS
    }

    const fn default_long_wait_ms() -> u64 {
        DEFAULT_LONG_WAIT_MS
    }
}

/// Fully resolved runtime settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub search_base_url: String,
    pub completion_base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub credentials_dir: PathBuf,
    pub output_dir: PathBuf,
    pub webdriver_url: String,
    pub short_wait_ms: u64,
    pub long_wait_ms: u64,
    pub headless: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings::from(FileSettings::default())
    }
}

impl From<FileSettings> for Settings {
    fn from(file: FileSettings) -> Self {
        let FileSettings {
            api,
            paths,
            browser,
        } = file;
        Self {
            search_base_url: api.search_base_url,
            completion_base_url: api.completion_base_url,
            model: api.model,
            max_tokens: api.max_tokens,
            credentials_dir: expand_path(&paths.credentials_dir),
            output_dir: expand_path(&paths.output_dir),
            webdriver_url: browser.webdriver_url,
            short_wait_ms: browser.short_wait_ms,
            long_wait_ms: browser.long_wait_ms,
            headless: browser.headless,
        }
    }
}

/// Path to the configuration directory.
pub fn config_directory() -> PathBuf {
    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

/// Path to `config.toml`.
pub fn config_path() -> PathBuf {
    config_directory().join(CONFIG_FILE_NAME)
}

/// Expand a leading `~` and environment references in a user-supplied path.
pub fn expand_path(raw: &str) -> PathBuf {
    match shellexpand::full(raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(raw).as_ref()),
    }
}

/// Load settings from `path` (or [`config_path`]) and apply `REVIEWBOT_*` overrides.
///
/// A missing or unreadable file falls back to defaults with a warning; an invalid
/// environment override is fatal.
pub fn load_settings(path: Option<&Path>) -> Result<SettingsLoadResult, ConfigError> {
    load_settings_with(path, |name| env::var(name).ok())
}

/// Like [`load_settings`], reading overrides through `lookup` instead of the
/// process environment.
pub fn load_settings_with<F>(
    path: Option<&Path>,
    lookup: F,
) -> Result<SettingsLoadResult, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let path = path.map(Path::to_path_buf).unwrap_or_else(config_path);
    let mut warnings = Vec::new();
    let mut source = SettingsSource::Default;

    let mut file_settings = FileSettings::default();
    if path.exists() {
        match fs::read_to_string(&path) {
            Ok(raw) => match toml::from_str::<FileSettings>(&raw) {
                Ok(parsed) => {
                    file_settings = parsed;
                    source = SettingsSource::File;
                }
                Err(err) => warnings.push(format!(
                    "Failed to parse {} as TOML: {}. Falling back to defaults.",
                    path.display(),
                    err
                )),
            },
            Err(err) => warnings.push(format!(
                "Failed to read {}: {}. Falling back to defaults.",
                path.display(),
                err
            )),
        }
    }

    apply_overrides(&mut file_settings, lookup)?;

    Ok(SettingsLoadResult {
        settings: Settings::from(file_settings),
        warnings,
        source,
    })
}

/// Apply overrides looked up by variable name on top of file settings.
pub fn apply_overrides<F>(settings: &mut FileSettings, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup("REVIEWBOT_SEARCH_BASE_URL") {
        settings.api.search_base_url = value;
    }
    if let Some(value) = lookup("REVIEWBOT_COMPLETION_BASE_URL") {
        settings.api.completion_base_url = value;
    }
    if let Some(value) = lookup("REVIEWBOT_MODEL") {
        settings.api.model = value;
    }
    if let Some(value) = lookup("REVIEWBOT_CREDENTIALS_DIR") {
        settings.paths.credentials_dir = value;
    }
    if let Some(value) = lookup("REVIEWBOT_OUTPUT_DIR") {
        settings.paths.output_dir = value;
    }
    if let Some(value) = lookup("REVIEWBOT_WEBDRIVER_URL") {
        settings.browser.webdriver_url = value;
    }

    parse_override(&lookup, "REVIEWBOT_MAX_TOKENS", &mut settings.api.max_tokens)?;
    parse_override(
        &lookup,
        "REVIEWBOT_SHORT_WAIT_MS",
        &mut settings.browser.short_wait_ms,
    )?;
    parse_override(
        &lookup,
        "REVIEWBOT_LONG_WAIT_MS",
        &mut settings.browser.long_wait_ms,
    )?;
    parse_override(&lookup, "REVIEWBOT_HEADLESS", &mut settings.browser.headless)?;
    Ok(())
}

fn parse_override<F, T>(lookup: &F, name: &str, target: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    let Some(raw) = lookup(name) else {
        return Ok(());
    };
    *target = raw
        .trim()
        .parse::<T>()
        .map_err(|err| ConfigError::InvalidValue {
            name: name.to_string(),
            message: err.to_string(),
        })?;
    Ok(())
}

/// API keys for the review platform and the completion service.
#[derive(Clone, Deserialize)]
pub struct ApiKeys {
    pub yelp_api_key: String,
    pub openai_api_key: String,
}

impl fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeys")
            .field("yelp_api_key", &"<redacted>")
            .field("openai_api_key", &"<redacted>")
            .finish()
    }
}

/// Login used by the browser session.
#[derive(Clone, Deserialize)]
pub struct LoginCredentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

pub fn load_api_keys(dir: &Path) -> Result<ApiKeys, ConfigError> {
    let path = dir.join(API_KEYS_FILE_NAME);
    let keys: ApiKeys = read_json(&path)?;
    require_non_empty(&path, "yelp_api_key", &keys.yelp_api_key)?;
    require_non_empty(&path, "openai_api_key", &keys.openai_api_key)?;
    Ok(keys)
}

pub fn load_login_credentials(dir: &Path) -> Result<LoginCredentials, ConfigError> {
    let path = dir.join(LOGIN_FILE_NAME);
    let login: LoginCredentials = read_json(&path)?;
    require_non_empty(&path, "email", &login.email)?;
    require_non_empty(&path, "password", &login.password)?;
    Ok(login)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|err| ConfigError::Parse {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

fn require_non_empty(path: &Path, field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Empty {
            path: path.to_path_buf(),
            field,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn no_env(_name: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_api_keys_load_from_directory() {
        let dir = tempdir().expect("tempdir");
        fs::write(
            dir.path().join(API_KEYS_FILE_NAME),
            r#"{"yelp_api_key": "yelp-123", "openai_api_key": "sk-456"}"#,
        )
        .expect("write keys");

        let keys = load_api_keys(dir.path()).expect("keys load");
        assert_eq!(keys.yelp_api_key, "yelp-123");
        assert_eq!(keys.openai_api_key, "sk-456");
        assert!(!format!("{keys:?}").contains("sk-456"));
    }

    #[test]
    fn test_missing_key_file_is_fatal() {
        let dir = tempdir().expect("tempdir");
        let err = load_api_keys(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_wrong_key_type_is_fatal() {
        let dir = tempdir().expect("tempdir");
        fs::write(
            dir.path().join(API_KEYS_FILE_NAME),
            r#"{"yelp_api_key": 42, "openai_api_key": "sk"}"#,
        )
        .expect("write keys");

        let err = load_api_keys(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_login_rejects_blank_password() {
        let dir = tempdir().expect("tempdir");
        fs::write(
            dir.path().join(LOGIN_FILE_NAME),
            r#"{"email": "me@example.com", "password": "  "}"#,
        )
        .expect("write login");

        let err = load_login_credentials(dir.path()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Empty {
                field: "password",
                ..
            }
        ));
    }

    #[test]
    fn test_login_debug_redacts_password() {
        let login = LoginCredentials {
            email: "me@example.com".to_string(),
            password: "hunter2".to_string(),
        };
        let debug = format!("{login:?}");
        assert!(debug.contains("me@example.com"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_load_settings_partial_file_keeps_defaults() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "[api]\nmodel = \"gpt-4o-mini\"\n").expect("write config");

        let result = load_settings_with(Some(&path), no_env).expect("settings load");
        assert_eq!(result.source, SettingsSource::File);
        assert_eq!(result.settings.model, "gpt-4o-mini");
        assert_eq!(result.settings.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(result.settings.short_wait_ms, DEFAULT_SHORT_WAIT_MS);
    }

    #[test]
    fn test_load_settings_bad_toml_warns() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "this is = = not toml").expect("write config");

        let result = load_settings_with(Some(&path), no_env).expect("settings load");
        assert_eq!(result.source, SettingsSource::Default);
        assert!(result.warnings.iter().any(|w| w.contains("TOML")));
    }

    #[test]
    fn test_load_settings_with_applies_lookup_over_file() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "[browser]\nheadless = false\nshort_wait_ms = 1500\n")
            .expect("write config");

        let result = load_settings_with(Some(&path), |name| {
            (name == "REVIEWBOT_HEADLESS").then(|| "true".to_string())
        })
        .expect("settings load");
        assert!(result.settings.headless);
        assert_eq!(result.settings.short_wait_ms, 1500);
        assert_eq!(result.settings.model, DEFAULT_MODEL);
    }

    #[test]
    fn test_overrides_apply_and_validate() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("REVIEWBOT_MODEL", "local-model"),
            ("REVIEWBOT_LONG_WAIT_MS", "30000"),
        ]);
        let mut settings = FileSettings::default();
        apply_overrides(&mut settings, |name| vars.get(name).map(|v| v.to_string()))
            .expect("overrides apply");
        assert_eq!(settings.api.model, "local-model");
        assert_eq!(settings.browser.long_wait_ms, 30_000);

        let mut settings = FileSettings::default();
        let err = apply_overrides(&mut settings, |name| {
            (name == "REVIEWBOT_MAX_TOKENS").then(|| "lots".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
