//! Chat transport - the bot's single connection to the IRC server.
//!
//! Owns the TCP session: connect with bounded retries, register and check
//! the login reply, join the channel and request the Twitch capabilities.
//! [`Transport::receive`] hands back decoded frames after answering any
//! `PING` in the batch, and transparently reconnects when the server drops
//! us. Reconnection is a bounded loop returning a typed error, never a
//! recursive call.
//!
//! Reads are not allowed to block forever: after `idle_tick` of silence
//! `receive` returns an empty batch so timers keep running, and after
//! `stale_after` of silence the connection is presumed dead and replaced.

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use futures::{FutureExt, SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};

use super::codec::{CodecError, IrcCodec};
use super::message::Message;

/// Capabilities requested after joining, in order.
pub const CAPABILITIES: [&str; 3] = [
    "twitch.tv/membership",
    "twitch.tv/commands",
    "twitch.tv/tags",
];

/// Server notices that mean the credentials were refused.
const AUTH_FAILURE_PHRASES: [&str; 2] = ["Login authentication failed", "Login unsuccessful"];

/// Connection settings for [`Transport`].
#[derive(Clone)]
pub struct TransportConfig {
    pub host: String,
    pub port: u16,
    /// Bot login; sent lowercased.
    pub nick: String,
    /// OAuth token, sent verbatim as `PASS`.
    pub token: String,
    /// Channel name without `#`.
    pub channel: String,
    /// Initial read buffer size in bytes.
    pub read_buffer: usize,
    pub connect_attempts: u32,
    /// Delay before the second attempt; doubles each retry.
    pub retry_backoff: Duration,
    /// Bound on each TCP connect and on the wait for the login reply.
    pub handshake_timeout: Duration,
    /// Longest a single `receive` waits before returning an empty batch.
    pub idle_tick: Duration,
    /// Silence after which the connection is presumed dead.
    pub stale_after: Duration,
}

impl TransportConfig {
    pub fn new(host: &str, port: u16, nick: &str, token: &str, channel: &str) -> Self {
        Self {
            host: host.to_owned(),
            port,
            nick: nick.to_owned(),
            token: token.to_owned(),
            channel: channel.trim_start_matches('#').to_lowercase(),
            read_buffer: 1024,
            connect_attempts: 3,
            retry_backoff: Duration::from_secs(1),
            handshake_timeout: Duration::from_secs(10),
            idle_tick: Duration::from_secs(30),
            stale_after: Duration::from_secs(600),
        }
    }

    fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for TransportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("nick", &self.nick)
            .field("token", &"<redacted>")
            .field("channel", &self.channel)
            .field("read_buffer", &self.read_buffer)
            .field("connect_attempts", &self.connect_attempts)
            .field("retry_backoff", &self.retry_backoff)
            .field("handshake_timeout", &self.handshake_timeout)
            .field("idle_tick", &self.idle_tick)
            .field("stale_after", &self.stale_after)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to connect to {addr} after {attempts} attempts")]
    Connect { addr: String, attempts: u32 },

    #[error("login rejected by {addr}: {notice}")]
    Authentication { addr: String, notice: String },

    #[error("handshake with {addr} failed: {reason}")]
    Handshake { addr: String, reason: String },

    #[error("connection lost and could not be re-established: {0}")]
    ConnectionLost(#[source] Box<TransportError>),

    #[error("not connected")]
    NotConnected,

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// A live, registered session.
struct Connection {
    framed: Framed<TcpStream, IrcCodec>,
    authenticated: bool,
    last_inbound: Instant,
    /// Set when EOF or a read error was seen while draining a batch.
    dropped: bool,
}

/// The bot's connection to the chat server.
pub struct Transport {
    config: TransportConfig,
    conn: Option<Connection>,
    /// Frames read during the handshake, delivered by the next `receive`.
    pending: VecDeque<Message>,
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("addr", &self.config.addr())
            .field("channel", &self.config.channel)
            .field("connected", &self.is_connected())
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl Transport {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            conn: None,
            pending: VecDeque::new(),
        }
    }

    /// Channel name including `#`.
    pub fn channel(&self) -> String {
        format!("#{}", self.config.channel)
    }

    pub fn is_connected(&self) -> bool {
        self.conn.as_ref().is_some_and(|c| c.authenticated)
    }

    /// Open the TCP session, log in, join the channel, request capabilities.
    ///
    /// Each attempt covers the whole handshake; a refused login ends the
    /// retries at once. Replaces any existing connection.
    pub async fn connect(&mut self) -> Result<(), TransportError> {
        self.conn = None;
        let addr = self.config.addr();
        let max = self.config.connect_attempts.max(1);
        let mut backoff = self.config.retry_backoff;
        let mut attempt = 0;

        let (conn, reply) = loop {
            attempt += 1;
            match self.open(&addr).await {
                Ok(session) => break session,
                Err(e @ TransportError::Authentication { .. }) => return Err(e),
                Err(e) => error!(%addr, "connect attempt {attempt}/{max} failed: {e}"),
            }
            if attempt >= max {
                error!(%addr, "giving up after {attempt} attempts");
                return Err(TransportError::Connect { addr, attempts: attempt });
            }
            sleep(backoff).await;
            backoff = backoff.saturating_mul(2);
        };

        self.pending.push_back(reply);
        self.conn = Some(conn);
        Ok(())
    }

    /// One connection attempt: TCP connect, login, JOIN and `CAP REQ`s.
    /// Returns the session and the server's reply to the login.
    async fn open(&self, addr: &str) -> Result<(Connection, Message), TransportError> {
        let handshake_failed = |reason: String| TransportError::Handshake {
            addr: addr.to_owned(),
            reason,
        };

        let stream = match timeout(self.config.handshake_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(handshake_failed(e.to_string())),
            Err(_) => return Err(handshake_failed("TCP connect timed out".into())),
        };
        info!(%addr, "connected to IRC server");

        let mut conn = Connection {
            framed: Framed::with_capacity(stream, IrcCodec::default(), self.config.read_buffer),
            authenticated: false,
            last_inbound: Instant::now(),
            dropped: false,
        };

        let nick = self.config.nick.to_lowercase();
        send_on(&mut conn, format!("USER {nick}")).await?;
        send_on(&mut conn, format!("PASS {}", self.config.token)).await?;
        send_on(&mut conn, format!("NICK {nick}")).await?;

        let reply = match timeout(self.config.handshake_timeout, conn.framed.next()).await {
            Ok(Some(Ok(reply))) => reply,
            Ok(Some(Err(e))) => return Err(handshake_failed(e.to_string())),
            Ok(None) => {
                return Err(handshake_failed(
                    "server closed the connection before replying".into(),
                ))
            }
            Err(_) => return Err(handshake_failed("no reply to login".into())),
        };

        if let Some(notice) = auth_failure(&reply) {
            error!(%addr, "invalid login: {notice}");
            return Err(TransportError::Authentication {
                addr: addr.to_owned(),
                notice,
            });
        }
        info!("login successful");
        conn.authenticated = true;

        let channel = self.channel();
        send_on(&mut conn, format!("JOIN {channel}")).await?;
        info!(%channel, "joined channel");

        debug!("requesting capabilities");
        for cap in CAPABILITIES {
            send_on(&mut conn, format!("CAP REQ :{cap}")).await?;
        }

        Ok((conn, reply))
    }

    /// Wait for the next batch of frames.
    ///
    /// `PING`s are answered and removed from the batch. An empty batch means
    /// either nothing arrived within `idle_tick` or the connection dropped and
    /// was re-established.
    pub async fn receive(&mut self) -> Result<Vec<Message>, TransportError> {
        let mut frames: Vec<Message> = self.pending.drain(..).collect();

        if frames.is_empty() {
            let conn = self.conn.as_mut().ok_or(TransportError::NotConnected)?;
            if conn.dropped {
                error!("lost connection, reconnecting");
                self.reconnect().await?;
                return Ok(Vec::new());
            }

            match timeout(self.config.idle_tick, conn.framed.next()).await {
                Ok(Some(Ok(msg))) => frames.push(msg),
                Ok(Some(Err(e))) => {
                    error!("read failed, reconnecting: {e}");
                    self.reconnect().await?;
                    return Ok(Vec::new());
                }
                Ok(None) => {
                    error!("lost connection, reconnecting");
                    self.reconnect().await?;
                    return Ok(Vec::new());
                }
                Err(_) => {
                    let silent_for = conn.last_inbound.elapsed();
                    if silent_for >= self.config.stale_after {
                        warn!(?silent_for, "connection went quiet, reconnecting");
                        self.reconnect().await?;
                    }
                    return Ok(Vec::new());
                }
            }

            // Take whatever else is already decodable without waiting.
            loop {
                match conn.framed.next().now_or_never() {
                    Some(Some(Ok(msg))) => frames.push(msg),
                    Some(Some(Err(e))) => {
                        warn!("read failed after batch: {e}");
                        conn.dropped = true;
                        break;
                    }
                    Some(None) => {
                        conn.dropped = true;
                        break;
                    }
                    None => break,
                }
            }
            conn.last_inbound = Instant::now();
        }

        let mut batch = Vec::with_capacity(frames.len());
        for msg in frames {
            debug!("recv: {msg}");
            match msg.command.as_str() {
                "PING" => self.pong(&msg).await,
                "RECONNECT" => {
                    info!("server requested reconnect");
                    self.reconnect().await?;
                }
                _ => batch.push(msg),
            }
        }
        Ok(batch)
    }

    /// Send a chat line to the channel.
    pub async fn send_channel(&mut self, text: &str) -> Result<(), TransportError> {
        let line = format!("PRIVMSG {} :{text}", self.channel());
        self.send_line(line).await
    }

    /// Whisper a user through the channel's `.w` command.
    pub async fn send_private(&mut self, user: &str, text: &str) -> Result<(), TransportError> {
        let line = format!("PRIVMSG {} :.w {user} {text}", self.channel());
        self.send_line(line).await
    }

    /// Send one raw frame. A trailing `\r\n` on `line` is not doubled.
    pub async fn send_line(&mut self, line: String) -> Result<(), TransportError> {
        let conn = self.conn.as_mut().ok_or(TransportError::NotConnected)?;
        send_on(conn, line).await
    }

    /// Shut the socket down.
    pub async fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            let mut stream = conn.framed.into_inner();
            let _ = stream.shutdown().await;
            info!("closed connection to IRC server");
        }
    }

    async fn pong(&mut self, ping: &Message) {
        let Some(conn) = self.conn.as_mut() else {
            return;
        };
        let pong = Message::new("PONG", ping.params.clone());
        match send_on(conn, pong.to_wire()).await {
            Ok(()) => debug!("answered server PING"),
            Err(e) => {
                warn!("failed to answer PING: {e}");
                conn.dropped = true;
            }
        }
    }

    async fn reconnect(&mut self) -> Result<(), TransportError> {
        match self.connect().await {
            Ok(()) => Ok(()),
            Err(e @ TransportError::Authentication { .. }) => Err(e),
            Err(e) => Err(TransportError::ConnectionLost(Box::new(e))),
        }
    }
}

async fn send_on(conn: &mut Connection, line: String) -> Result<(), TransportError> {
    if line.starts_with("PASS ") {
        debug!("sent: PASS <redacted>");
    } else {
        debug!("sent: {}", line.trim_end());
    }
    conn.framed.send(line).await?;
    Ok(())
}

/// The notice text if `reply` is a login-failure `NOTICE`.
fn auth_failure(reply: &Message) -> Option<String> {
    if reply.command != "NOTICE" {
        return None;
    }
    let text = reply.params.last()?;
    AUTH_FAILURE_PHRASES
        .iter()
        .any(|phrase| text.contains(phrase))
        .then(|| text.clone())
}
