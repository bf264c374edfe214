use super::permission::Role;
use super::poll::PollError;

/// A command that could not run. Rendered as a private reply to the sender;
/// never ends the bot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("PermissionError: {command} needs {required} or higher")]
    Permission { command: String, required: Role },

    #[error("NoArgError: usage: {0}")]
    NoArgument(String),

    #[error("BadArgError: {0}")]
    BadArgument(String),

    #[error("BadStateError: {0}")]
    BadState(String),

    #[error("ParseError: {0}")]
    Parse(String),
}

impl From<PollError> for CommandError {
    fn from(e: PollError) -> Self {
        match e {
            PollError::NotOpen => Self::BadState(e.to_string()),
            PollError::Definition(_) => Self::Parse(e.to_string()),
            PollError::RandomNotAllowed | PollError::InvalidChoice { .. } => {
                Self::BadArgument(e.to_string())
            }
        }
    }
}
