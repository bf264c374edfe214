//! The bot: command handling state and the main loop.
//!
//! [`BotState`] owns everything a command can touch. Handlers never talk to
//! the network; they queue [`Reply`]s in an [`Outbox`] that [`run`] flushes
//! through the transport after each batch. The loop is single-threaded:
//! nothing here is shared, so nothing is locked.

pub mod commands;
pub mod error;
pub mod permission;
pub mod poll;
pub mod router;
pub mod schedule;

use std::path::PathBuf;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{error, info};

use crate::config::BotConfig;
use crate::irc::event::ChatEvent;
use crate::irc::transport::{Transport, TransportError};
use crate::store::JsonStore;

use self::error::CommandError;
use self::permission::{PermissionTable, Role};
use self::poll::PollEngine;
use self::router::{CommandRegistry, Invocation};
use self::schedule::Scheduler;

/// A line the bot wants to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Channel(String),
    Private { to: String, text: String },
}

/// Replies queued while handling one batch.
#[derive(Debug, Default)]
pub struct Outbox {
    pub replies: Vec<Reply>,
    /// Set by the disconnect command; the loop closes the transport and stops.
    pub shutdown: bool,
}

impl Outbox {
    pub fn channel(&mut self, text: impl Into<String>) {
        self.replies.push(Reply::Channel(single_line(text.into())));
    }

    pub fn private(&mut self, to: &str, text: impl Into<String>) {
        self.replies.push(Reply::Private {
            to: to.to_owned(),
            text: single_line(text.into()),
        });
    }

    pub fn request_shutdown(&mut self) {
        self.shutdown = true;
    }
}

/// Chat lines are single frames; line breaks from stored or JSON-supplied
/// text become spaces.
fn single_line(text: String) -> String {
    if text.contains(['\r', '\n']) {
        text.replace(['\r', '\n'], " ")
    } else {
        text
    }
}

#[derive(Debug)]
pub struct BotState {
    pub prefix: String,
    pub permissions: PermissionTable,
    pub registry: CommandRegistry,
    /// Command name (lowercase, no prefix) → static reply.
    pub custom_commands: JsonStore<String>,
    /// Exact chat line → reply.
    pub auto_replies: JsonStore<String>,
    pub scheduler: Scheduler,
    pub polls: PollEngine,
    pub auto_poll_path: PathBuf,
    pub rng: StdRng,
}

impl BotState {
    /// State backed by the files in the configured data directory.
    pub fn new(config: &BotConfig) -> Self {
        Self {
            prefix: config.command_prefix.clone(),
            permissions: PermissionTable::new(config.roles.clone(), config.admins.clone()),
            registry: CommandRegistry::load(&config.aliases_path()),
            custom_commands: JsonStore::load_or_create(&config.custom_commands_path()),
            auto_replies: JsonStore::load_or_create(&config.auto_replies_path()),
            scheduler: Scheduler::new(JsonStore::load_or_create(&config.timers_path())),
            polls: PollEngine::new(),
            auto_poll_path: config.auto_poll_path.clone(),
            rng: StdRng::from_entropy(),
        }
    }

    /// State that never touches the disk.
    pub fn in_memory(prefix: &str, permissions: PermissionTable) -> Self {
        Self {
            prefix: prefix.to_owned(),
            permissions,
            registry: CommandRegistry::default(),
            custom_commands: JsonStore::in_memory(),
            auto_replies: JsonStore::in_memory(),
            scheduler: Scheduler::default(),
            polls: PollEngine::new(),
            auto_poll_path: PathBuf::from("poll.json"),
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Route one chat line: commands go to the router, anything else is
    /// checked against the auto-replies.
    pub fn handle_event(&mut self, event: &ChatEvent, out: &mut Outbox) {
        if event.text.starts_with(self.prefix.as_str()) {
            let body = &event.text[self.prefix.len()..];
            router::dispatch(self, event, body, out);
            return;
        }
        if let Some(reply) = self.auto_replies.get(&event.text) {
            info!(sender = %event.sender, trigger = %event.text, "auto-reply");
            out.channel(reply.clone());
        }
    }

    /// Queue the timers due at `elapsed_minutes` since start.
    pub fn tick(&mut self, elapsed_minutes: u64, out: &mut Outbox) {
        for text in self.scheduler.due(elapsed_minutes) {
            info!(%text, elapsed_minutes, "timer fired");
            out.channel(text);
        }
    }

    /// Check a command's declared minimum, if it has one.
    pub fn authorize(&self, inv: &Invocation<'_>, minimum: Option<Role>) -> Result<(), CommandError> {
        match minimum {
            Some(role) => self.require(inv, role, || format!("{}{}", self.prefix, inv.name)),
            None => Ok(()),
        }
    }

    /// Check the minimum of one action of a command (`poll end`, ...).
    pub fn authorize_action(
        &self,
        inv: &Invocation<'_>,
        action: &str,
        minimum: Role,
    ) -> Result<(), CommandError> {
        self.require(inv, minimum, || format!("{}{} {action}", self.prefix, inv.name))
    }

    fn require(
        &self,
        inv: &Invocation<'_>,
        minimum: Role,
        command: impl FnOnce() -> String,
    ) -> Result<(), CommandError> {
        if self.permissions.has_permission(inv.sender, inv.badges, minimum) {
            Ok(())
        } else {
            Err(CommandError::Permission {
                command: command(),
                required: minimum,
            })
        }
    }

    /// Usage error for the invoked command, e.g. `$vote <number>|random`.
    pub fn usage(&self, inv: &Invocation<'_>, args: &str) -> CommandError {
        CommandError::NoArgument(format!("{}{} {args}", self.prefix, inv.name))
    }

    /// Normalise a user-supplied command name: lowercase, prefix stripped.
    pub fn command_name(&self, raw: &str) -> String {
        raw.strip_prefix(self.prefix.as_str())
            .unwrap_or(raw)
            .to_lowercase()
    }
}

/// Run until disconnect, Ctrl-C, or a fatal transport error.
///
/// `transport` must already be connected.
pub async fn run(mut transport: Transport, mut state: BotState) -> Result<(), TransportError> {
    let started = Instant::now();
    info!(channel = %transport.channel(), prefix = %state.prefix, "bot running");

    loop {
        let received = tokio::select! {
            batch = transport.receive() => Some(batch),
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(batch) = received else {
            info!("interrupted, shutting down");
            transport.close().await;
            return Ok(());
        };

        let mut out = Outbox::default();
        for event in ChatEvent::from_batch(&batch?) {
            state.handle_event(&event, &mut out);
        }
        let elapsed_minutes = started.elapsed().as_secs() / 60;
        state.tick(elapsed_minutes, &mut out);

        for reply in out.replies {
            let sent = match &reply {
                Reply::Channel(text) => transport.send_channel(text).await,
                Reply::Private { to, text } => transport.send_private(to, text).await,
            };
            if let Err(e) = sent {
                error!(?reply, "failed to send: {e}");
            }
        }

        if out.shutdown {
            info!("disconnect command received, shutting down");
            transport.close().await;
            return Ok(());
        }
    }
}
