//! Command routing.
//!
//! A chat line that starts with the command prefix is split into a command
//! name and whitespace-separated arguments. The name is lowercased and
//! resolved in order:
//!
//! 1. custom commands (static replies, sent to the channel verbatim);
//! 2. built-in commands by alias, after their declared minimum role is
//!    checked;
//! 3. otherwise the sender is told privately that the command is unknown.
//!
//! The built-in table is fixed at compile time; only the aliases can be
//! changed, through `command_aliases.json` in the data directory.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use super::commands;
use super::error::CommandError;
use super::permission::Role;
use super::{BotState, Outbox};
use crate::irc::event::{Badges, ChatEvent};

/// Built-in commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandId {
    Ping,
    Echo,
    Disconnect,
    Poll,
    Vote,
    Command,
    Reply,
    Timer,
}

/// A parsed command line.
#[derive(Debug)]
pub struct Invocation<'a> {
    pub sender: &'a str,
    pub badges: &'a Badges,
    /// Lowercased command name as typed (an alias, not the canonical name).
    pub name: String,
    pub args: Vec<&'a str>,
}

pub type Handler = fn(&mut BotState, &Invocation<'_>, &mut Outbox) -> Result<(), CommandError>;

pub struct CommandSpec {
    pub id: CommandId,
    /// Checked before the handler runs; `None` means anyone.
    pub minimum: Option<Role>,
    pub handler: Handler,
    pub aliases: &'static [&'static str],
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSpec")
            .field("id", &self.id)
            .field("minimum", &self.minimum)
            .field("aliases", &self.aliases)
            .finish_non_exhaustive()
    }
}

pub static BUILTINS: &[CommandSpec] = &[
    CommandSpec {
        id: CommandId::Ping,
        minimum: Some(Role::Moderator),
        handler: commands::ping,
        aliases: &["ping"],
    },
    CommandSpec {
        id: CommandId::Echo,
        minimum: Some(Role::Moderator),
        handler: commands::echo,
        aliases: &["echo", "say"],
    },
    CommandSpec {
        id: CommandId::Disconnect,
        minimum: Some(Role::Broadcaster),
        handler: commands::disconnect,
        aliases: &["disconnect", "quit"],
    },
    CommandSpec {
        // Each poll action declares its own minimum.
        id: CommandId::Poll,
        minimum: None,
        handler: commands::poll,
        aliases: &["poll"],
    },
    CommandSpec {
        id: CommandId::Vote,
        minimum: None,
        handler: commands::vote,
        aliases: &["vote", "v"],
    },
    CommandSpec {
        id: CommandId::Command,
        minimum: Some(Role::Moderator),
        handler: commands::custom_command,
        aliases: &["command", "cmd"],
    },
    CommandSpec {
        id: CommandId::Reply,
        minimum: Some(Role::Moderator),
        handler: commands::auto_reply,
        aliases: &["reply", "replyto"],
    },
    CommandSpec {
        id: CommandId::Timer,
        minimum: Some(Role::Moderator),
        handler: commands::timer,
        aliases: &["timer", "schedule"],
    },
];

/// Alias → built-in command, built once at startup.
#[derive(Debug, Clone)]
pub struct CommandRegistry {
    aliases: HashMap<String, &'static CommandSpec>,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::with_overrides(HashMap::new())
    }
}

impl CommandRegistry {
    /// Built-in aliases, with `overrides` replacing the alias list of any
    /// command it names.
    pub fn with_overrides(overrides: HashMap<CommandId, Vec<String>>) -> Self {
        let mut aliases = HashMap::new();
        for spec in BUILTINS {
            match overrides.get(&spec.id) {
                Some(custom) => {
                    for alias in custom {
                        let alias = alias.trim().to_lowercase();
                        if alias.is_empty() {
                            continue;
                        }
                        if let Some(previous) = aliases.insert(alias.clone(), spec) {
                            warn!(%alias, previous = ?previous.id, now = ?spec.id, "alias reassigned");
                        }
                    }
                }
                None => {
                    for alias in spec.aliases {
                        aliases.entry((*alias).to_owned()).or_insert(spec);
                    }
                }
            }
        }
        Self { aliases }
    }

    /// Load alias overrides from `path` if it exists.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        let parsed = std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|json| {
                serde_json::from_str::<HashMap<CommandId, Vec<String>>>(&json).map_err(|e| e.to_string())
            });
        match parsed {
            Ok(overrides) => {
                info!(path = %path.display(), commands = overrides.len(), "loaded command aliases");
                Self::with_overrides(overrides)
            }
            Err(e) => {
                warn!("failed to load {}: {e}; using built-in aliases", path.display());
                Self::default()
            }
        }
    }

    pub fn resolve(&self, name: &str) -> Option<&'static CommandSpec> {
        self.aliases.get(name).copied()
    }
}

/// Route one command line (`body` is the text after the prefix).
pub fn dispatch(state: &mut BotState, event: &ChatEvent, body: &str, out: &mut Outbox) {
    let mut tokens = body.split_whitespace();
    let Some(name) = tokens.next() else {
        return;
    };
    let name = name.to_lowercase();

    if let Some(reply) = state.custom_commands.get(&name) {
        info!(sender = %event.sender, command = %name, "custom command");
        out.channel(reply.clone());
        return;
    }

    let Some(spec) = state.registry.resolve(&name) else {
        info!(sender = %event.sender, command = %name, "unknown command");
        out.private(&event.sender, format!("Unknown command: {}{name}", state.prefix));
        return;
    };

    let invocation = Invocation {
        sender: &event.sender,
        badges: &event.badges,
        name,
        args: tokens.collect(),
    };
    info!(sender = %event.sender, command = ?spec.id, args = ?invocation.args, "command");

    let result = state
        .authorize(&invocation, spec.minimum)
        .and_then(|()| (spec.handler)(state, &invocation, out));
    if let Err(e) = result {
        info!(sender = %event.sender, command = ?spec.id, "command rejected: {e}");
        out.private(&event.sender, e.to_string());
    }
}
