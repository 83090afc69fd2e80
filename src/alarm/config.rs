//! Alarm configuration schema and loading: the `@path` / inline-JSON input
//! contract, schema validation, and the per-alarm channel variants, per
//! spec §3 (`Alarm`, `ChannelSpec`, `AlarmConfig`) and §6.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct EmailSettings {
    pub provider: Option<String>,
    #[serde(default)]
    pub use_oauth2: bool,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub tenant_id: Option<String>,
    pub smtp_host: Option<String>,
    pub smtp_port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub use_tls: bool,
    pub from_address: Option<String>,
    pub from_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct SmsSettings {
    pub provider: Option<String>,
    pub api_key: Option<String>,
    pub from: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct EmailChannelDetail {
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct SmsChannelDetail {
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type")]
#[serde(rename_all = "lowercase")]
pub enum ChannelSpec {
    Console {
        #[serde(default)]
        template: String,
    },
    Syslog {
        #[serde(default)]
        template: String,
    },
    Eventlog {
        #[serde(default)]
        template: String,
    },
    Oslog {
        #[serde(default)]
        template: String,
    },
    Email {
        #[serde(default)]
        email: EmailChannelDetail,
    },
    Sms {
        #[serde(default)]
        sms: SmsChannelDetail,
    },
}

impl ChannelSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            ChannelSpec::Console { .. } => "console",
            ChannelSpec::Syslog { .. } => "syslog",
            ChannelSpec::Eventlog { .. } => "eventlog",
            ChannelSpec::Oslog { .. } => "oslog",
            ChannelSpec::Email { .. } => "email",
            ChannelSpec::Sms { .. } => "sms",
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self {
            ChannelSpec::Console { template }
            | ChannelSpec::Syslog { template }
            | ChannelSpec::Eventlog { template }
            | ChannelSpec::Oslog { template } => {
                if template.trim().is_empty() {
                    return Err(ConfigError::Schema(format!(
                        "{} channel requires a non-empty template",
                        self.kind()
                    )));
                }
            }
            ChannelSpec::Email { email } => {
                if email.to.is_empty() {
                    return Err(ConfigError::Schema(
                        "email channel requires a non-empty recipient list".to_string(),
                    ));
                }
            }
            ChannelSpec::Sms { sms } => {
                if sms.to.is_empty() {
                    return Err(ConfigError::Schema(
                        "sms channel requires a non-empty recipient list".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AlarmDef {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub condition: String,
    #[serde(default)]
    pub cooldown: i64,
    pub channels: Vec<ChannelSpec>,
}

fn default_true() -> bool {
    true
}

impl AlarmDef {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Schema("alarm name must not be empty".to_string()));
        }
        if self.condition.trim().is_empty() {
            return Err(ConfigError::Schema(format!(
                "alarm '{}' has an empty condition",
                self.name
            )));
        }
        if self.channels.is_empty() {
            return Err(ConfigError::Schema(format!(
                "alarm '{}' must have at least one channel",
                self.name
            )));
        }
        if self.cooldown < 0 {
            return Err(ConfigError::Schema(format!(
                "alarm '{}' has a negative cooldown",
                self.name
            )));
        }
        for channel in &self.channels {
            channel.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AlarmConfig {
    pub email: Option<EmailSettings>,
    pub sms: Option<SmsSettings>,
    #[serde(default)]
    pub alarms: Vec<AlarmDef>,
}

impl AlarmConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for alarm in &self.alarms {
            alarm.validate()?;
            if !seen.insert(alarm.name.clone()) {
                return Err(ConfigError::Schema(format!(
                    "duplicate alarm name '{}'",
                    alarm.name
                )));
            }
        }
        Ok(())
    }

    /// Parse a JSON document directly (no `@path` resolution).
    pub fn parse(json: &str) -> Result<Self, ConfigError> {
        let config: AlarmConfig = serde_json::from_str(json).map_err(|e| ConfigError::Syntax {
            line: e.line(),
            column: e.column(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }
}

/// Reference to an alarm configuration document: either a literal JSON
/// string or an `@path`-prefixed filesystem path, per spec §6. Bare paths
/// (no `@`) are rejected with a usability hint rather than silently
/// treated as inline JSON.
pub enum ConfigRef<'a> {
    Inline(&'a str),
    Path(&'a Path),
}

pub fn resolve_ref(input: &str) -> Result<ConfigRef<'_>, ConfigError> {
    if let Some(path) = input.strip_prefix('@') {
        return Ok(ConfigRef::Path(Path::new(path)));
    }
    // Looks like a bare path (no JSON object/array delimiters) rather than
    // inline JSON: reject with the `@` hint instead of trying to parse it.
    let trimmed = input.trim();
    if !trimmed.starts_with('{') && !trimmed.starts_with('[') {
        return Err(ConfigError::MissingSigilHint {
            path: input.to_string(),
        });
    }
    Ok(ConfigRef::Inline(input))
}

/// Load and validate an `AlarmConfig` from either an inline JSON string or
/// an `@path` reference.
pub fn load(input: &str) -> Result<AlarmConfig, ConfigError> {
    match resolve_ref(input)? {
        ConfigRef::Inline(json) => AlarmConfig::parse(json),
        ConfigRef::Path(path) => {
            let body = std::fs::read_to_string(path)?;
            AlarmConfig::parse(&body)
        }
    }
}
