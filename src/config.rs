//! Bot configuration from the environment.
//!
//! | Variable                   | Default               |
//! |----------------------------|-----------------------|
//! | `TIDEBOT_HOST`             | `irc.chat.twitch.tv`  |
//! | `TIDEBOT_PORT`             | `6667`                |
//! | `TIDEBOT_NICK`             | required              |
//! | `TIDEBOT_TOKEN`            | required (`oauth:…`)  |
//! | `TIDEBOT_CHANNEL`          | required              |
//! | `TIDEBOT_PREFIX`           | `$`                   |
//! | `TIDEBOT_ADMINS`           | none (comma-separated)|
//! | `TIDEBOT_ROLES`            | `broadcaster=4,moderator=3,vip=2,subscriber=1` |
//! | `TIDEBOT_DATA_DIR`         | `./tidebot-data`      |
//! | `TIDEBOT_AUTO_POLL`        | `<data_dir>/poll.json`|
//! | `TIDEBOT_READ_BUFFER`      | `1024`                |
//! | `TIDEBOT_CONNECT_ATTEMPTS` | `3`                   |

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

use crate::bot::permission::DEFAULT_AUTHORITIES;
use crate::irc::transport::TransportConfig;

const DEFAULT_HOST: &str = "irc.chat.twitch.tv";
const DEFAULT_PORT: u16 = 6667;
const DEFAULT_PREFIX: &str = "$";
const DEFAULT_DATA_DIR: &str = "./tidebot-data";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub transport: TransportConfig,
    /// Marks a chat line as a command (e.g. `$` in `$vote 2`).
    pub command_prefix: String,
    /// Logins allowed to run every command regardless of badges, lowercased.
    pub admins: Vec<String>,
    /// Badge name → authority level.
    pub roles: HashMap<String, i32>,
    pub data_dir: PathBuf,
    /// File read by `poll create auto`.
    pub auto_poll_path: PathBuf,
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key → value source; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let host = get("TIDEBOT_HOST").unwrap_or_else(|| DEFAULT_HOST.to_owned());
        let port = parse_or("TIDEBOT_PORT", get("TIDEBOT_PORT"), DEFAULT_PORT)?;
        let nick = required("TIDEBOT_NICK")?;
        let token = required("TIDEBOT_TOKEN")?;
        let channel = required("TIDEBOT_CHANNEL")?;

        let mut transport = TransportConfig::new(&host, port, &nick, &token, &channel);
        transport.read_buffer = parse_or(
            "TIDEBOT_READ_BUFFER",
            get("TIDEBOT_READ_BUFFER"),
            transport.read_buffer,
        )?;
        transport.connect_attempts = parse_or(
            "TIDEBOT_CONNECT_ATTEMPTS",
            get("TIDEBOT_CONNECT_ATTEMPTS"),
            transport.connect_attempts,
        )?;

        let admins = get("TIDEBOT_ADMINS")
            .map(|raw| {
                raw.split(',')
                    .map(|a| a.trim().to_lowercase())
                    .filter(|a| !a.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let roles = match get("TIDEBOT_ROLES") {
            Some(raw) => parse_roles(&raw)?,
            None => DEFAULT_AUTHORITIES
                .iter()
                .map(|(role, level)| ((*role).to_owned(), *level))
                .collect(),
        };

        let data_dir = PathBuf::from(get("TIDEBOT_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.to_owned()));
        let auto_poll_path = get("TIDEBOT_AUTO_POLL")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("poll.json"));

        Ok(Self {
            transport,
            command_prefix: get("TIDEBOT_PREFIX").unwrap_or_else(|| DEFAULT_PREFIX.to_owned()),
            admins,
            roles,
            data_dir,
            auto_poll_path,
        })
    }

    pub fn custom_commands_path(&self) -> PathBuf {
        self.data_dir.join("custom_commands.json")
    }

    pub fn auto_replies_path(&self) -> PathBuf {
        self.data_dir.join("auto_replies.json")
    }

    pub fn timers_path(&self) -> PathBuf {
        self.data_dir.join("timers.json")
    }

    pub fn aliases_path(&self) -> PathBuf {
        self.data_dir.join("command_aliases.json")
    }
}

fn parse_or<T>(var: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

/// Parse `broadcaster=4,moderator=3,...`.
fn parse_roles(raw: &str) -> Result<HashMap<String, i32>, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        var: "TIDEBOT_ROLES",
        value: raw.to_owned(),
        reason,
    };
    let mut roles = HashMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (role, level) = entry
            .split_once('=')
            .ok_or_else(|| invalid(format!("expected role=level, got {entry:?}")))?;
        let level = level
            .trim()
            .parse::<i32>()
            .map_err(|e| invalid(format!("{entry:?}: {e}")))?;
        roles.insert(role.trim().to_lowercase(), level);
    }
    Ok(roles)
}
