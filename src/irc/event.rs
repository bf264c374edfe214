/// Chat events - the structured form of a channel `PRIVMSG`.
///
/// Everything past the transport works with [`ChatEvent`]; raw lines and
/// [`Message`]s stop here.
use std::collections::BTreeMap;

use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tracing::debug;

use super::codec::IrcCodec;
use super::message::Message;

/// Badge name → level (e.g. `subscriber` → months subscribed).
pub type Badges = BTreeMap<String, i64>;

/// One chat line from a channel member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEvent {
    /// Login of the sender (the token between `!` and `@`).
    pub sender: String,
    /// Channel the line was sent to, including `#`.
    pub channel: String,
    pub text: String,
    pub badges: Badges,
}

impl ChatEvent {
    /// Extract a chat event from a parsed message.
    ///
    /// Returns `None` unless the message has the shape
    /// `:<nick>!<user>@<host> PRIVMSG #<channel> :<text>` with non-empty text.
    pub fn from_message(msg: &Message) -> Option<Self> {
        if msg.command != "PRIVMSG" {
            return None;
        }
        let prefix = msg.prefix.as_deref()?;
        let (nick, rest) = prefix.split_once('!')?;
        let (user, host) = rest.split_once('@')?;
        if !is_login(nick) || !is_login(user) || host.is_empty() {
            return None;
        }

        let channel = msg.params.first().filter(|c| c.len() > 1 && c.starts_with('#'))?;
        let text = msg.params.get(1).filter(|t| !t.is_empty())?;

        Some(Self {
            sender: user.to_owned(),
            channel: channel.clone(),
            text: text.clone(),
            badges: msg.tag("badges").map(parse_badges).unwrap_or_default(),
        })
    }

    /// Parse one raw line. Non-chat lines yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        Message::parse(line).ok().as_ref().and_then(Self::from_message)
    }

    /// Chat events among decoded frames, in order.
    pub fn from_batch(batch: &[Message]) -> Vec<Self> {
        batch.iter().filter_map(Self::from_message).collect()
    }

    /// Parse a raw buffer holding any number of `\r\n`-terminated lines,
    /// framed exactly as the transport frames the socket. An unterminated
    /// tail is not a frame and yields nothing.
    pub fn parse_batch(buffer: &str) -> Vec<Self> {
        let mut codec = IrcCodec::default();
        let mut buf = BytesMut::from(buffer.as_bytes());
        let mut frames = Vec::new();
        while let Ok(Some(msg)) = codec.decode_eof(&mut buf) {
            frames.push(msg);
        }
        Self::from_batch(&frames)
    }
}

fn is_login(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parse a `role/level,role/level` badge list.
///
/// A malformed entry makes the whole list unusable, so the result is empty
/// rather than partially trusted.
pub fn parse_badges(raw: &str) -> Badges {
    let mut badges = Badges::new();
    for entry in raw.split(',').filter(|e| !e.is_empty()) {
        let parsed = entry
            .split_once('/')
            .and_then(|(role, level)| Some((role, level.parse::<i64>().ok()?)))
            .filter(|(role, _)| !role.is_empty());
        match parsed {
            Some((role, level)) => {
                badges.insert(role.to_owned(), level);
            }
            None => {
                debug!(badges = raw, "ignoring malformed badge tag");
                return Badges::new();
            }
        }
    }
    badges
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MOD_LINE: &str = "@badge-info=subscriber/8;badges=moderator/1,subscriber/6;mod=1 \
        :ronni!ronni@ronni.tmi.twitch.tv PRIVMSG #dallas :$poll display";

    #[test]
    fn extracts_sender_text_and_badges() {
        let event = ChatEvent::parse(MOD_LINE).unwrap();
        assert_eq!(event.sender, "ronni");
        assert_eq!(event.channel, "#dallas");
        assert_eq!(event.text, "$poll display");
        assert_eq!(
            event.badges,
            Badges::from([("moderator".to_string(), 1), ("subscriber".to_string(), 6)])
        );
    }

    #[test]
    fn untagged_line_has_empty_badges() {
        let event =
            ChatEvent::parse(":ronni!ronni@ronni.tmi.twitch.tv PRIVMSG #dallas :hello there")
                .unwrap();
        assert!(event.badges.is_empty());
        assert_eq!(event.text, "hello there");
    }

    #[test]
    fn text_keeps_later_colons() {
        let event =
            ChatEvent::parse(":ronni!ronni@ronni.tmi.twitch.tv PRIVMSG #dallas :time: 12:30").unwrap();
        assert_eq!(event.text, "time: 12:30");
    }

    #[test]
    fn non_chat_lines_yield_nothing() {
        assert_eq!(ChatEvent::parse("PING :tmi.twitch.tv"), None);
        assert_eq!(ChatEvent::parse(":tmi.twitch.tv 001 tidebot :Welcome, GLHF!"), None);
        assert_eq!(
            ChatEvent::parse(":ronni!ronni@ronni.tmi.twitch.tv JOIN #dallas"),
            None
        );
        // Whisper target is not a channel.
        assert_eq!(
            ChatEvent::parse(":ronni!ronni@ronni.tmi.twitch.tv PRIVMSG tidebot :psst"),
            None
        );
        // Empty text.
        assert_eq!(
            ChatEvent::parse(":ronni!ronni@ronni.tmi.twitch.tv PRIVMSG #dallas :"),
            None
        );
        // Server prefix, no identity.
        assert_eq!(ChatEvent::parse(":tmi.twitch.tv PRIVMSG #dallas :hi"), None);
    }

    #[test]
    fn malformed_badges_do_not_drop_the_frame() {
        let line = "@badges=moderator,subscriber/x :ronni!ronni@ronni.tmi.twitch.tv PRIVMSG #dallas :hi";
        let event = ChatEvent::parse(line).unwrap();
        assert!(event.badges.is_empty());
        assert_eq!(event.text, "hi");
    }

    #[test]
    fn empty_badge_tag_is_empty_map() {
        assert!(parse_badges("").is_empty());
    }

    #[test]
    fn batch_preserves_order_and_skips_noise() {
        let buffer = format!(
            "PING :tmi.twitch.tv\r\n{MOD_LINE}\r\n:a!a@a.tmi.twitch.tv PRIVMSG #dallas :second\r\n"
        );
        let events = ChatEvent::parse_batch(&buffer);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].sender, "ronni");
        assert_eq!(events[1].text, "second");
    }

    #[test]
    fn batch_ignores_unterminated_tail() {
        let buffer = format!("{MOD_LINE}\r\n:a!a@a.tmi.twitch.tv PRIVMSG #dallas :hal");
        let events = ChatEvent::parse_batch(&buffer);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].sender, "ronni");
    }
}
