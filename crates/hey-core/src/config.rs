//! Configuration: named connection profiles plus a few behaviour switches.
//!
//! Loaded from `<home>/config.toml` (or an explicit `--config` path) and
//! resolved once per invocation into a [`CompletionConfig`].

use crate::context::{Message, Role};
use crate::error::ConfigError;
use dirs_next::home_dir;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Apply `Option`-field overrides from a source struct to a target struct.
///
/// For each field name, if `$src.field` is `Some(v)`, sets `$dst.field = v`.
macro_rules! apply_option_overrides {
    ($src:expr, $dst:expr, $($field:ident),+ $(,)?) => {
        $(
            if let Some(ref v) = $src.$field {
                $dst.$field = v.clone();
            }
        )+
    };
}

pub const CONFIG_FILE_NAME: &str = "config.toml";
const API_KEY_ENV: &str = "OPENAI_API_KEY";
const HOME_ENV: &str = "HEY_HOME";

pub struct ConfigDefaults;

impl ConfigDefaults {
    pub const PROFILE: &'static str = "default";
    pub const MODEL: &'static str = "gpt-3.5-turbo";
    pub const BASE_URL: &'static str = "https://api.openai.com/v1";
    pub const STREAM: bool = true;
}

fn default_profile_name() -> String {
    ConfigDefaults::PROFILE.to_string()
}
fn default_stream() -> bool {
    ConfigDefaults::STREAM
}

/// Top-level `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_profile_name")]
    pub default_profile: String,
    #[serde(default = "default_stream")]
    pub stream: bool,
    /// Drop the user message when a completion fails without any reply.
    #[serde(default)]
    pub rollback_on_failure: bool,
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        let mut config = Self {
            default_profile: default_profile_name(),
            stream: default_stream(),
            rollback_on_failure: false,
            profiles: BTreeMap::new(),
        };
        config.ensure_default_profile();
        config
    }
}

/// Connection parameters and priming prompt for one named profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Messages seeded into every new context created with this profile.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prompt: Vec<PromptMessage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

/// Per-invocation overrides from the command line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub profile: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub stream: Option<bool>,
}

/// Everything the completion provider needs for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionConfig {
    pub model: String,
    pub temperature: Option<f32>,
    pub stream: bool,
    pub base_url: String,
    pub api_key: Option<String>,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: ConfigDefaults::MODEL.to_string(),
            temperature: None,
            stream: ConfigDefaults::STREAM,
            base_url: ConfigDefaults::BASE_URL.to_string(),
            api_key: None,
        }
    }
}

impl Config {
    /// Load a config file that must exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    /// Load `<home>/config.toml`, falling back to defaults when it is absent.
    pub fn load_from_home(home: &Path) -> Result<Self, ConfigError> {
        let path = home.join(CONFIG_FILE_NAME);
        match fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content, &path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Read { path, source }),
        }
    }

    fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.ensure_default_profile();
        for profile in config.profiles.values() {
            if let Some(t) = profile.temperature {
                validate_temperature(t)?;
            }
        }
        Ok(config)
    }

    fn ensure_default_profile(&mut self) {
        self.profiles
            .entry(ConfigDefaults::PROFILE.to_string())
            .or_default();
    }

    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::UnknownProfile(name.to_string()))
    }

    /// Pick the profile for a turn: an explicit choice wins, then the one the
    /// context was last used with, then `default_profile`.
    ///
    /// An explicit unknown profile is an error; a recorded one that has since
    /// been removed from the config falls back with a warning.
    pub fn choose_profile(
        &self,
        explicit: Option<&str>,
        recorded: Option<&str>,
    ) -> Result<String, ConfigError> {
        if let Some(name) = explicit {
            self.profile(name)?;
            return Ok(name.to_string());
        }
        if let Some(name) = recorded {
            if self.profiles.contains_key(name) {
                return Ok(name.to_string());
            }
            warn!(
                "profile '{}' is no longer configured, using '{}'",
                name, self.default_profile
            );
        }
        self.profile(&self.default_profile)?;
        Ok(self.default_profile.clone())
    }

    /// Resolve a profile plus overrides into a [`CompletionConfig`].
    ///
    /// Precedence: command-line override > profile > built-in default. The
    /// api key falls back to `OPENAI_API_KEY`.
    pub fn resolve(
        &self,
        profile_name: &str,
        overrides: &Overrides,
    ) -> Result<CompletionConfig, ConfigError> {
        self.resolve_with_env_key(profile_name, overrides, std::env::var(API_KEY_ENV).ok())
    }

    fn resolve_with_env_key(
        &self,
        profile_name: &str,
        overrides: &Overrides,
        env_api_key: Option<String>,
    ) -> Result<CompletionConfig, ConfigError> {
        let profile = self.profile(profile_name)?;

        let mut resolved = CompletionConfig {
            stream: self.stream,
            api_key: env_api_key.filter(|k| !k.is_empty()),
            ..CompletionConfig::default()
        };
        apply_option_overrides!(profile, resolved, model, base_url);
        if profile.api_key.is_some() {
            resolved.api_key = profile.api_key.clone();
        }
        resolved.temperature = profile.temperature;

        apply_option_overrides!(overrides, resolved, model, stream);
        if overrides.temperature.is_some() {
            resolved.temperature = overrides.temperature;
        }

        if let Some(t) = resolved.temperature {
            validate_temperature(t)?;
        }
        Ok(resolved)
    }

    /// The priming messages a new context created under `profile_name` starts with.
    pub fn prompt_messages(&self, profile_name: &str) -> Result<Vec<Message>, ConfigError> {
        Ok(self
            .profile(profile_name)?
            .prompt
            .iter()
            .map(|p| Message::new(p.role, p.content.clone()))
            .collect())
    }
}

fn validate_temperature(t: f32) -> Result<(), ConfigError> {
    if (0.0..=2.0).contains(&t) {
        Ok(())
    } else {
        Err(ConfigError::Temperature(t))
    }
}

/// Locate the hey home directory.
///
/// Precedence:
/// 1. `home_override` (from `--home`)
/// 2. `HEY_HOME` environment variable
/// 3. `~/.hey`
pub fn resolve_home(home_override: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = home_override {
        return Ok(path);
    }
    if let Ok(hey_home) = std::env::var(HOME_ENV)
        && !hey_home.is_empty()
    {
        return Ok(PathBuf::from(hey_home));
    }
    home_dir()
        .map(|home| home.join(".hey"))
        .ok_or(ConfigError::NoHome)
}
