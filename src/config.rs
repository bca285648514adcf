use crate::cli::{ServeArgs, SessionArgs};
use crate::error::ConfigError;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_ADDR: &str = "http://localhost:4646";
pub const DEFAULT_EVENT_TOPICS: &str = "Job,Allocation,Deployment,Evaluation";
pub const DEFAULT_EVENT_NAMESPACE: &str = "default";
pub const DEFAULT_UPDATE_SECONDS: u64 = 2;
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 21324;
pub const DEFAULT_HOST_KEY_PATH: &str = ".ssh/drover_ed25519";
const TOKEN_LEN: usize = 36;

/// Immutable per-session settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub base_url: String,
    pub token: String,
    pub event_topics: Vec<String>,
    pub event_namespace: String,
    pub update_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_ADDR.to_string(),
            token: String::new(),
            event_topics: split_topics(DEFAULT_EVENT_TOPICS),
            event_namespace: DEFAULT_EVENT_NAMESPACE.to_string(),
            update_interval: Duration::from_secs(DEFAULT_UPDATE_SECONDS),
        }
    }
}

impl SessionConfig {
    /// Same settings bound to a different token, used for per-connection
    /// overrides.
    pub fn with_token(&self, token: &str) -> Result<Self, ConfigError> {
        validate_token(token)?;
        Ok(Self {
            token: token.to_string(),
            ..self.clone()
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    pub host: String,
    pub port: u16,
    pub host_key_path: PathBuf,
}

/// Flat key/value view of the YAML config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    source: Option<PathBuf>,
    values: BTreeMap<String, Value>,
}

impl ConfigFile {
    pub fn discover() -> Result<Self, ConfigError> {
        match discover_config_path() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let file_error = |reason: String| ConfigError::File {
            path: path.display().to_string(),
            reason,
        };
        let raw = fs::read_to_string(path).map_err(|error| file_error(error.to_string()))?;
        let mut file = Self::parse(&raw).map_err(|error| file_error(error.to_string()))?;
        file.source = Some(path.to_path_buf());
        Ok(file)
    }

    pub fn parse(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let values: BTreeMap<String, Value> = serde_yaml::from_str(raw)?;
        Ok(Self {
            source: None,
            values,
        })
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    fn get(&self, key: &str) -> Option<String> {
        match self.values.get(key)? {
            Value::String(value) => Some(value.clone()),
            Value::Number(value) => Some(value.to_string()),
            Value::Bool(value) => Some(value.to_string()),
            _ => None,
        }
    }
}

/// One configuration value and where to look for it, most specific first.
struct Setting<'a> {
    flag: Option<&'a str>,
    env: &'a str,
    key: &'a str,
    legacy: Option<(&'a str, &'a str)>,
}

struct Resolver<'a, E: Fn(&str) -> Option<String>> {
    env: E,
    file: &'a ConfigFile,
}

impl<E: Fn(&str) -> Option<String>> Resolver<'_, E> {
    fn env(&self, name: &str) -> Option<String> {
        (self.env)(name).filter(|value| !value.trim().is_empty())
    }

    fn file(&self, key: &str) -> Option<String> {
        self.file.get(key).filter(|value| !value.trim().is_empty())
    }

    fn lookup(&self, setting: Setting<'_>) -> Option<String> {
        if let Some(flag) = setting.flag {
            return Some(flag.to_string());
        }
        if let Some(value) = self.env(setting.env).or_else(|| self.file(setting.key)) {
            return Some(value);
        }

        let (legacy_env, legacy_key) = setting.legacy?;
        if let Some(value) = self.env(legacy_env) {
            warn!("{legacy_env} is deprecated; use {} instead", setting.env);
            return Some(value);
        }
        if let Some(value) = self.file(legacy_key) {
            warn!(
                "config key {legacy_key} is deprecated; use {} instead",
                setting.key
            );
            return Some(value);
        }
        None
    }
}

pub fn resolve_session(
    args: &SessionArgs,
    env: impl Fn(&str) -> Option<String>,
    file: &ConfigFile,
) -> Result<SessionConfig, ConfigError> {
    let resolver = Resolver { env, file };

    let base_url = resolver
        .lookup(Setting {
            flag: args.addr.as_deref(),
            env: "NOMAD_ADDR",
            key: "nomad_addr",
            legacy: Some(("DROVER_ADDR", "drover_addr")),
        })
        .unwrap_or_else(|| DEFAULT_ADDR.to_string());
    let token = resolver
        .lookup(Setting {
            flag: args.token.as_deref(),
            env: "NOMAD_TOKEN",
            key: "nomad_token",
            legacy: Some(("DROVER_TOKEN", "drover_token")),
        })
        .unwrap_or_default();
    let topics = resolver
        .lookup(Setting {
            flag: args.event_topics.as_deref(),
            env: "DROVER_EVENT_TOPICS",
            key: "drover_event_topics",
            legacy: None,
        })
        .unwrap_or_else(|| DEFAULT_EVENT_TOPICS.to_string());
    let event_namespace = resolver
        .lookup(Setting {
            flag: args.event_namespace.as_deref(),
            env: "DROVER_EVENT_NAMESPACE",
            key: "drover_event_namespace",
            legacy: None,
        })
        .unwrap_or_else(|| DEFAULT_EVENT_NAMESPACE.to_string());
    let update = resolver.lookup(Setting {
        flag: args.update.as_deref(),
        env: "DROVER_UPDATE_SECONDS",
        key: "drover_update_seconds",
        legacy: None,
    });

    validate_token(&token)?;
    let update_interval = match update {
        Some(raw) => parse_update_seconds(&raw)?,
        None => Duration::from_secs(DEFAULT_UPDATE_SECONDS),
    };

    Ok(SessionConfig {
        base_url: normalize_url(&base_url)?,
        token,
        event_topics: split_topics(&topics),
        event_namespace,
        update_interval,
    })
}

pub fn resolve_host(
    args: &ServeArgs,
    env: impl Fn(&str) -> Option<String>,
    file: &ConfigFile,
) -> Result<HostConfig, ConfigError> {
    let resolver = Resolver { env, file };

    let host = resolver
        .lookup(Setting {
            flag: args.host.as_deref(),
            env: "DROVER_HOST",
            key: "drover_host",
            legacy: None,
        })
        .unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = match resolver.lookup(Setting {
        flag: args.port.as_deref(),
        env: "DROVER_PORT",
        key: "drover_port",
        legacy: None,
    }) {
        Some(raw) => raw
            .trim()
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort(raw.clone()))?,
        None => DEFAULT_PORT,
    };
    let host_key_path = args
        .host_key_path
        .as_ref()
        .and_then(|path| path.to_str())
        .map(str::to_string);
    let host_key_path = resolver
        .lookup(Setting {
            flag: host_key_path.as_deref(),
            env: "DROVER_HOST_KEY_PATH",
            key: "drover_host_key_path",
            legacy: None,
        })
        .unwrap_or_else(|| DEFAULT_HOST_KEY_PATH.to_string());

    Ok(HostConfig {
        host,
        port,
        host_key_path: PathBuf::from(host_key_path),
    })
}

/// A token is either absent (empty) or exactly 36 characters.
pub fn validate_token(token: &str) -> Result<(), ConfigError> {
    let len = token.chars().count();
    if len == 0 || len == TOKEN_LEN {
        Ok(())
    } else {
        Err(ConfigError::InvalidToken(len))
    }
}

pub fn parse_update_seconds(raw: &str) -> Result<Duration, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(seconds) if seconds > 0 => Ok(Duration::from_secs(seconds)),
        _ => Err(ConfigError::InvalidUpdateSeconds(raw.to_string())),
    }
}

fn normalize_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Ok(trimmed.to_string())
    } else {
        Err(ConfigError::InvalidUrl(raw.to_string()))
    }
}

fn split_topics(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|topic| !topic.is_empty())
        .map(str::to_string)
        .collect()
}

fn discover_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("DROVER_CONFIG")
        && !path.trim().is_empty()
    {
        return Some(PathBuf::from(path));
    }

    let cwd_candidates = [PathBuf::from("drover.yaml"), PathBuf::from(".drover.yaml")];
    for candidate in cwd_candidates {
        if candidate.exists() {
            return Some(candidate);
        }
    }

    if let Ok(home) = std::env::var("HOME") {
        let user_candidates = [
            PathBuf::from(&home).join(".config/drover/config.yaml"),
            PathBuf::from(&home).join(".drover.yaml"),
        ];
        for candidate in user_candidates {
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    None
}
