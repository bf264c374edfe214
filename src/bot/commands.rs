//! Built-in command handlers.
//!
//! Handlers run after the router has checked the command's declared
//! minimum. Commands with actions (`poll`, `command`, `reply`, `timer`)
//! check each action's own minimum with [`BotState::authorize_action`]
//! before reading its arguments.

use tracing::info;

use super::error::CommandError;
use super::permission::Role;
use super::poll::PollDefinition;
use super::router::Invocation;
use super::{BotState, Outbox};

type CommandResult = Result<(), CommandError>;

pub fn ping(_state: &mut BotState, _inv: &Invocation<'_>, out: &mut Outbox) -> CommandResult {
    out.channel("Pong!");
    Ok(())
}

pub fn echo(state: &mut BotState, inv: &Invocation<'_>, out: &mut Outbox) -> CommandResult {
    if inv.args.is_empty() {
        return Err(state.usage(inv, "<text>"));
    }
    out.channel(inv.args.join(" "));
    Ok(())
}

pub fn disconnect(_state: &mut BotState, inv: &Invocation<'_>, out: &mut Outbox) -> CommandResult {
    info!(sender = %inv.sender, "disconnect requested");
    out.request_shutdown();
    Ok(())
}

pub fn poll(state: &mut BotState, inv: &Invocation<'_>, out: &mut Outbox) -> CommandResult {
    let Some(action) = inv.args.first() else {
        return Err(state.usage(inv, "create <json>|auto | end | display"));
    };

    match action.to_lowercase().as_str() {
        "create" => {
            state.authorize_action(inv, "create", Role::Moderator)?;
            let source = inv.args[1..].join(" ");
            if source.is_empty() {
                return Err(state.usage(inv, "create <json>|auto"));
            }
            let definition = if source.eq_ignore_ascii_case("auto") {
                PollDefinition::load(&state.auto_poll_path)?
            } else {
                PollDefinition::from_json(&source)?
            };
            let title = definition.title.clone();
            state.polls.create(definition)?;
            out.private(inv.sender, format!("Poll created: {title}"));
        }
        "end" => {
            state.authorize_action(inv, "end", Role::Moderator)?;
            let outcome = state.polls.end(&mut state.rng)?;
            out.channel(outcome.to_string());
        }
        "display" => {
            state.authorize_action(inv, "display", Role::Subscriber)?;
            let text = state.polls.display(&state.prefix)?;
            out.channel(text);
        }
        other => {
            return Err(CommandError::BadArgument(format!(
                "unknown poll action {other:?}, expected create, end or display"
            )));
        }
    }
    Ok(())
}

pub fn vote(state: &mut BotState, inv: &Invocation<'_>, out: &mut Outbox) -> CommandResult {
    let Some(pick) = inv.args.first() else {
        return Err(state.usage(inv, "<number>|random"));
    };
    let (index, choice) = state.polls.vote(inv.sender, pick, &mut state.rng)?;
    let ack = format!("Vote recorded: {index}. {choice}");
    out.private(inv.sender, ack);
    Ok(())
}

/// `command add <name> <reply...>` / `command remove <name>`.
pub fn custom_command(state: &mut BotState, inv: &Invocation<'_>, out: &mut Outbox) -> CommandResult {
    const USAGE: &str = "add <name> <reply> | remove <name>";
    let Some(action) = inv.args.first() else {
        return Err(state.usage(inv, USAGE));
    };

    match action.to_lowercase().as_str() {
        "add" => {
            state.authorize_action(inv, "add", Role::Moderator)?;
            let (Some(name), true) = (inv.args.get(1), inv.args.len() > 2) else {
                return Err(state.usage(inv, "add <name> <reply>"));
            };
            let name = state.command_name(name);
            if name.is_empty() {
                return Err(CommandError::BadArgument("command name is empty".into()));
            }
            if state.registry.resolve(&name).is_some() {
                return Err(CommandError::BadArgument(format!(
                    "{}{name} is a built-in command",
                    state.prefix
                )));
            }
            let reply = inv.args[2..].join(" ");
            let verb = match state.custom_commands.set(name.clone(), reply) {
                Some(_) => "updated",
                None => "added",
            };
            info!(sender = %inv.sender, command = %name, "custom command {verb}");
            out.private(inv.sender, format!("Command {}{name} {verb}", state.prefix));
        }
        "remove" => {
            state.authorize_action(inv, "remove", Role::Moderator)?;
            let Some(name) = inv.args.get(1) else {
                return Err(state.usage(inv, "remove <name>"));
            };
            let name = state.command_name(name);
            if state.custom_commands.delete(&name).is_none() {
                return Err(CommandError::BadArgument(format!(
                    "there is no custom command {}{name}",
                    state.prefix
                )));
            }
            info!(sender = %inv.sender, command = %name, "custom command removed");
            out.private(inv.sender, format!("Command {}{name} removed", state.prefix));
        }
        _ => return Err(state.usage(inv, USAGE)),
    }
    Ok(())
}

/// `reply add <trigger> | <response>` / `reply remove <trigger>`.
pub fn auto_reply(state: &mut BotState, inv: &Invocation<'_>, out: &mut Outbox) -> CommandResult {
    const USAGE: &str = "add <trigger> | <response> | remove <trigger>";
    let Some(action) = inv.args.first() else {
        return Err(state.usage(inv, USAGE));
    };

    match action.to_lowercase().as_str() {
        "add" => {
            state.authorize_action(inv, "add", Role::Moderator)?;
            let rest = inv.args[1..].join(" ");
            let Some((trigger, response)) = rest
                .split_once('|')
                .map(|(t, r)| (t.trim(), r.trim()))
                .filter(|(t, r)| !t.is_empty() && !r.is_empty())
            else {
                return Err(state.usage(inv, "add <trigger> | <response>"));
            };
            if trigger.starts_with(state.prefix.as_str()) {
                return Err(CommandError::BadArgument(format!(
                    "triggers cannot start with {}",
                    state.prefix
                )));
            }
            let verb = match state.auto_replies.set(trigger, response.to_owned()) {
                Some(_) => "updated",
                None => "added",
            };
            info!(sender = %inv.sender, %trigger, "auto-reply {verb}");
            out.private(inv.sender, format!("Auto-reply for \"{trigger}\" {verb}"));
        }
        "remove" => {
            state.authorize_action(inv, "remove", Role::Moderator)?;
            let trigger = inv.args[1..].join(" ");
            if trigger.is_empty() {
                return Err(state.usage(inv, "remove <trigger>"));
            }
            if state.auto_replies.delete(&trigger).is_none() {
                return Err(CommandError::BadArgument(format!(
                    "there is no auto-reply for \"{trigger}\""
                )));
            }
            info!(sender = %inv.sender, %trigger, "auto-reply removed");
            out.private(inv.sender, format!("Auto-reply for \"{trigger}\" removed"));
        }
        _ => return Err(state.usage(inv, USAGE)),
    }
    Ok(())
}

/// `timer add <minutes> <text...>` / `timer remove <text...>`.
pub fn timer(state: &mut BotState, inv: &Invocation<'_>, out: &mut Outbox) -> CommandResult {
    const USAGE: &str = "add <minutes> <text> | remove <text>";
    let Some(action) = inv.args.first() else {
        return Err(state.usage(inv, USAGE));
    };

    match action.to_lowercase().as_str() {
        "add" => {
            state.authorize_action(inv, "add", Role::Moderator)?;
            let (Some(minutes), true) = (inv.args.get(1), inv.args.len() > 2) else {
                return Err(state.usage(inv, "add <minutes> <text>"));
            };
            let minutes: u64 = minutes.parse().map_err(|_| {
                CommandError::BadArgument(format!("{minutes:?} is not a number of minutes"))
            })?;
            let text = inv.args[2..].join(" ");
            let previous = state
                .scheduler
                .add(&text, minutes)
                .map_err(|e| CommandError::BadArgument(e.to_string()))?;
            let verb = if previous.is_some() { "updated" } else { "added" };
            out.private(inv.sender, format!("Timer {verb}: every {minutes} min"));
        }
        "remove" => {
            state.authorize_action(inv, "remove", Role::Moderator)?;
            let text = inv.args[1..].join(" ");
            if text.is_empty() {
                return Err(state.usage(inv, "remove <text>"));
            }
            if state.scheduler.remove(&text).is_none() {
                return Err(CommandError::BadArgument("there is no timer with that text".into()));
            }
            out.private(inv.sender, "Timer removed");
        }
        _ => return Err(state.usage(inv, USAGE)),
    }
    Ok(())
}
