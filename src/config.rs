use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const DEHASHED_API_KEY_ENV: &str = "DEHASHED_API_KEY";
pub const DEHASHED_EMAIL_ENV: &str = "DEHASHED_EMAIL";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ProfileConfig {
    pub model: Option<String>,
    pub system: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout: Option<u64>,
    pub search_timeout: Option<u64>,
    pub retries: Option<u32>,
    pub retry_delay: Option<u64>,
    pub session: Option<String>,
    pub session_file: Option<PathBuf>,
    pub history_limit: Option<usize>,
    pub result_limit: Option<usize>,
    pub openai_base_url: Option<String>,
    pub dehashed_base_url: Option<String>,
    pub show_usage: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    profiles: Option<HashMap<String, ProfileConfig>>,
}

fn read_config(path: &Path) -> Result<ConfigFile, String> {
    let raw = fs::read_to_string(path)
        .map_err(|err| format!("Failed to read config file '{}': {err}", path.display()))?;
    toml::from_str(&raw)
        .map_err(|err| format!("Failed to parse config file '{}': {err}", path.display()))
}

pub fn load_profile(name: &str) -> Result<ProfileConfig, String> {
    let path = config_path()?;
    let config = read_config(&path)?;

    let profiles = config.profiles.ok_or_else(|| {
        format!(
            "Config file '{}' does not contain a [profiles] section.",
            path.display()
        )
    })?;

    let profile = profiles.get(name).cloned().ok_or_else(|| {
        format!(
            "Profile '{}' not found in config file '{}'.",
            name,
            path.display()
        )
    })?;
    validate_profile(name, &profile)?;
    Ok(profile)
}

/// Checks the config file (and `profile`, if given) and returns its path.
pub fn validate_config(profile: Option<&str>) -> Result<PathBuf, String> {
    let path = config_path()?;
    let config = read_config(&path)?;
    let profiles = config.profiles.unwrap_or_default();

    for (name, settings) in &profiles {
        validate_profile(name, settings)?;
    }
    if let Some(name) = profile {
        if !profiles.contains_key(name) {
            return Err(format!(
                "Profile '{}' not found in config file '{}'.",
                name,
                path.display()
            ));
        }
    }
    Ok(path)
}

fn validate_profile(name: &str, profile: &ProfileConfig) -> Result<(), String> {
    if let Some(temperature) = profile.temperature {
        check_temperature(temperature)
            .map_err(|err| format!("Invalid profile temperature in '{name}': {err}"))?;
    }
    if profile.history_limit == Some(0) {
        return Err(format!(
            "Invalid profile history_limit in '{name}': must be at least 1."
        ));
    }
    if profile.result_limit == Some(0) {
        return Err(format!(
            "Invalid profile result_limit in '{name}': must be at least 1."
        ));
    }
    Ok(())
}

pub fn check_temperature(value: f32) -> Result<f32, String> {
    if (0.0..=2.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("{value} is outside 0.0..=2.0"))
    }
}

fn config_path() -> Result<PathBuf, String> {
    if let Some(path) = non_empty_env("BC_CONFIG") {
        return Ok(PathBuf::from(path));
    }
    if let Some(xdg) = non_empty_env("XDG_CONFIG_HOME") {
        return Ok(PathBuf::from(xdg).join("breachchat").join("config.toml"));
    }

    let home = non_empty_env("HOME").ok_or_else(|| {
        "Cannot resolve config path: set BC_CONFIG or HOME/XDG_CONFIG_HOME.".to_string()
    })?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("breachchat")
        .join("config.toml"))
}

/// Where sessions are kept when nothing else is configured.
pub fn default_session_file() -> PathBuf {
    const FILE: &str = "chat_sessions.json";
    if let Some(data) = non_empty_env("XDG_DATA_HOME") {
        return PathBuf::from(data).join("breachchat").join(FILE);
    }
    match non_empty_env("HOME") {
        Some(home) => PathBuf::from(home)
            .join(".local")
            .join("share")
            .join("breachchat")
            .join(FILE),
        None => PathBuf::from(FILE),
    }
}

pub fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Parses `key` from the environment, naming the variable on failure.
pub fn parse_env<T: FromStr>(key: &str) -> Result<Option<T>, String> {
    parse_value(key, non_empty_env(key))
}

pub(crate) fn parse_value<T: FromStr>(key: &str, raw: Option<String>) -> Result<Option<T>, String> {
    match raw {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| format!("Invalid {key} '{raw}'.")),
    }
}

#[derive(Clone)]
pub struct Credentials {
    pub openai_api_key: String,
    pub dehashed_api_key: String,
    pub dehashed_email: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("openai_api_key", &"***")
            .field("dehashed_api_key", &"***")
            .field("dehashed_email", &self.dehashed_email)
            .finish()
    }
}

impl Credentials {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(non_empty_env)
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let require = |key: &str| {
            lookup(key).ok_or_else(|| format!("{key} is not set in the environment"))
        };
        Ok(Self {
            openai_api_key: require(OPENAI_API_KEY_ENV)?,
            dehashed_api_key: require(DEHASHED_API_KEY_ENV)?,
            dehashed_email: lookup(DEHASHED_EMAIL_ENV),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect::<HashMap<_, _>>();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn credentials_require_both_api_keys() {
        let err = Credentials::from_lookup(lookup(&[(DEHASHED_API_KEY_ENV, "dh")]))
            .expect_err("missing openai key");
        assert_eq!(err, "OPENAI_API_KEY is not set in the environment");

        let err = Credentials::from_lookup(lookup(&[(OPENAI_API_KEY_ENV, "sk")]))
            .expect_err("missing dehashed key");
        assert_eq!(err, "DEHASHED_API_KEY is not set in the environment");

        let creds = Credentials::from_lookup(lookup(&[
            (OPENAI_API_KEY_ENV, "sk-secret"),
            (DEHASHED_API_KEY_ENV, "dh-secret"),
            (DEHASHED_EMAIL_ENV, "me@example.com"),
        ]))
        .expect("complete credentials");
        assert_eq!(creds.dehashed_email.as_deref(), Some("me@example.com"));
        assert!(!format!("{creds:?}").contains("secret"));
    }

    #[test]
    fn parse_value_names_the_source() {
        assert_eq!(parse_value::<u32>("BC_RETRIES", None), Ok(None));
        assert_eq!(parse_value::<u32>("BC_RETRIES", Some("3".into())), Ok(Some(3)));
        assert_eq!(
            parse_value::<u32>("BC_RETRIES", Some("many".into())),
            Err("Invalid BC_RETRIES 'many'.".to_string())
        );
    }

    #[test]
    fn profile_validation_rejects_out_of_range_values() {
        let profile = ProfileConfig {
            temperature: Some(3.5),
            ..ProfileConfig::default()
        };
        assert!(validate_profile("hot", &profile)
            .expect_err("too hot")
            .contains("Invalid profile temperature in 'hot'"));

        let profile = ProfileConfig {
            history_limit: Some(0),
            ..ProfileConfig::default()
        };
        assert!(validate_profile("empty", &profile).is_err());
        assert!(validate_profile("default", &ProfileConfig::default()).is_ok());
    }

    #[test]
    fn profile_toml_parses_known_keys() {
        let config: ConfigFile = toml::from_str(
            "[profiles.work]\nmodel = \"gpt-4o\"\nhistory_limit = 10\nsession_file = \"/tmp/s.json\"\n",
        )
        .expect("valid toml");
        let profile = &config.profiles.expect("profiles")["work"];
        assert_eq!(profile.model.as_deref(), Some("gpt-4o"));
        assert_eq!(profile.history_limit, Some(10));
        assert_eq!(profile.session_file, Some(PathBuf::from("/tmp/s.json")));

        let err = toml::from_str::<ConfigFile>("[profiles.work]\nprovider = \"openai\"\n");
        assert!(err.is_err());
    }
}
