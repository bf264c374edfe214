//! In-process stand-in for the chat server, one accepted session at a time.
#![allow(dead_code)]

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::time::timeout;

use tidebot::irc::transport::TransportConfig;

pub const WELCOME: &str = ":tmi.twitch.tv 001 tidebot :Welcome, GLHF!\r\n";

/// Bind a listener on a free port and a transport config pointing at it,
/// with timings shrunk for tests.
pub async fn listen() -> (TcpListener, TransportConfig) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let mut config = TransportConfig::new("127.0.0.1", port, "TideBot", "oauth:secret", "#Dallas");
    config.connect_attempts = 2;
    config.retry_backoff = Duration::from_millis(10);
    config.handshake_timeout = Duration::from_secs(2);
    config.idle_tick = Duration::from_millis(200);
    (listener, config)
}

/// The server's end of one bot connection.
pub struct Session {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Session {
    pub async fn accept(listener: &TcpListener) -> Self {
        let (stream, _) = timeout(Duration::from_secs(5), listener.accept())
            .await
            .expect("bot never connected")
            .unwrap();
        let (read, writer) = stream.into_split();
        Self {
            lines: BufReader::new(read).lines(),
            writer,
        }
    }

    /// Next line from the bot without its CRLF; `None` on EOF.
    pub async fn line(&mut self) -> Option<String> {
        timeout(Duration::from_secs(5), self.lines.next_line())
            .await
            .expect("bot went quiet")
            .unwrap()
    }

    pub async fn lines(&mut self, n: usize) -> Vec<String> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(self.line().await.expect("bot hung up"));
        }
        out
    }

    pub async fn send(&mut self, raw: &str) {
        self.writer.write_all(raw.as_bytes()).await.unwrap();
    }

    /// Read the login lines and answer with `reply`.
    pub async fn login(&mut self, reply: &str) -> Vec<String> {
        let lines = self.lines(3).await;
        self.send(reply).await;
        lines
    }

    /// Full successful handshake: login, then JOIN and the capability requests.
    pub async fn handshake(&mut self) -> Vec<String> {
        let mut lines = self.login(WELCOME).await;
        lines.extend(self.lines(4).await);
        lines
    }
}
