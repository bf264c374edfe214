/// Transport tests against a fake chat server on 127.0.0.1.
mod common;

use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::time::timeout;

use common::{listen, Session, WELCOME};
use tidebot::irc::codec::CodecError;
use tidebot::irc::message::Message;
use tidebot::irc::transport::{Transport, TransportError};

/// Connect `transport` while the server side completes a normal handshake.
async fn connected(transport: &mut Transport, listener: &tokio::net::TcpListener) -> Session {
    let (result, session) = tokio::join!(transport.connect(), async {
        let mut session = Session::accept(listener).await;
        session.handshake().await;
        session
    });
    result.unwrap();
    session
}

/// Receive until a non-empty batch arrives.
async fn next_batch(transport: &mut Transport) -> Vec<Message> {
    timeout(Duration::from_secs(5), async {
        loop {
            let batch = transport.receive().await.unwrap();
            if !batch.is_empty() {
                return batch;
            }
        }
    })
    .await
    .expect("nothing received")
}

#[tokio::test]
async fn handshake_logs_in_joins_and_requests_capabilities() {
    let (listener, config) = listen().await;
    let mut transport = Transport::new(config);

    let (result, (_session, lines)) = tokio::join!(transport.connect(), async {
        let mut session = Session::accept(&listener).await;
        let lines = session.handshake().await;
        (session, lines)
    });
    result.unwrap();

    assert_eq!(
        lines,
        vec![
            "USER tidebot",
            "PASS oauth:secret",
            "NICK tidebot",
            "JOIN #dallas",
            "CAP REQ :twitch.tv/membership",
            "CAP REQ :twitch.tv/commands",
            "CAP REQ :twitch.tv/tags",
        ]
    );
    assert!(transport.is_connected());

    // The login reply is delivered, not swallowed.
    let batch = next_batch(&mut transport).await;
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].command, "001");
}

#[tokio::test]
async fn rejected_login_is_fatal() {
    let (listener, config) = listen().await;
    let mut transport = Transport::new(config);

    let (result, _session) = tokio::join!(transport.connect(), async {
        let mut session = Session::accept(&listener).await;
        session
            .login(":tmi.twitch.tv NOTICE * :Login authentication failed\r\n")
            .await;
        session
    });

    match result {
        Err(TransportError::Authentication { notice, .. }) => {
            assert_eq!(notice, "Login authentication failed");
        }
        other => panic!("expected authentication error, got {other:?}"),
    }
    assert!(!transport.is_connected());
}

#[tokio::test]
async fn unreachable_server_gives_up() {
    let (listener, config) = listen().await;
    drop(listener);
    let mut transport = Transport::new(config);

    assert!(matches!(
        transport.connect().await,
        Err(TransportError::Connect { attempts: 2, .. })
    ));
}

#[tokio::test]
async fn ping_is_answered_and_hidden() {
    let (listener, config) = listen().await;
    let mut transport = Transport::new(config);
    let mut session = connected(&mut transport, &listener).await;
    next_batch(&mut transport).await;

    session
        .send(concat!(
            "PING :tmi.twitch.tv\r\n",
            "@badges=moderator/1 :ronni!ronni@ronni.tmi.twitch.tv PRIVMSG #dallas :$ping\r\n",
        ))
        .await;

    let mut seen = Vec::new();
    while !seen.iter().any(|m: &Message| m.command == "PRIVMSG") {
        seen.extend(next_batch(&mut transport).await);
    }
    assert!(seen.iter().all(|m| m.command != "PING"));
    assert_eq!(session.line().await.as_deref(), Some("PONG :tmi.twitch.tv"));
}

#[tokio::test]
async fn split_frames_are_reassembled() {
    let (listener, config) = listen().await;
    let mut transport = Transport::new(config);
    let mut session = connected(&mut transport, &listener).await;
    next_batch(&mut transport).await;

    session.send(":ronni!ronni@ronni.tmi.twitch.tv PRIVMSG #dal").await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    session.send("las :hello there\r\n").await;

    let batch = next_batch(&mut transport).await;
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].params, vec!["#dallas", "hello there"]);
}

#[tokio::test]
async fn quiet_channel_yields_empty_batches() {
    let (listener, config) = listen().await;
    let mut transport = Transport::new(config);
    let _session = connected(&mut transport, &listener).await;
    next_batch(&mut transport).await;

    let batch = transport.receive().await.unwrap();
    assert!(batch.is_empty());
    assert!(transport.is_connected());
}

#[tokio::test]
async fn dropped_connection_is_replaced() {
    let (listener, config) = listen().await;
    let mut transport = Transport::new(config);
    let session = connected(&mut transport, &listener).await;
    next_batch(&mut transport).await;
    drop(session);

    let (batch, _second) = tokio::join!(transport.receive(), async {
        let mut session = Session::accept(&listener).await;
        session.handshake().await;
        session
    });
    assert!(batch.unwrap().is_empty());
    assert!(transport.is_connected());

    let batch = next_batch(&mut transport).await;
    assert_eq!(batch[0].command, "001");
}

#[tokio::test]
async fn reconnect_retries_a_failed_handshake() {
    let (listener, config) = listen().await;
    let mut transport = Transport::new(config);
    let session = connected(&mut transport, &listener).await;
    next_batch(&mut transport).await;
    drop(session);

    let (batch, _third) = tokio::join!(transport.receive(), async {
        // Hang up after the login lines, without a reply.
        let mut second = Session::accept(&listener).await;
        second.lines(3).await;
        drop(second);

        let mut third = Session::accept(&listener).await;
        third.handshake().await;
        third
    });
    assert!(batch.unwrap().is_empty());
    assert!(transport.is_connected());
}

#[tokio::test]
async fn first_connect_retries_a_failed_handshake() {
    let (listener, config) = listen().await;
    let mut transport = Transport::new(config);

    let (result, _second) = tokio::join!(transport.connect(), async {
        let mut first = Session::accept(&listener).await;
        first.lines(3).await;
        drop(first);

        let mut second = Session::accept(&listener).await;
        second.handshake().await;
        second
    });
    result.unwrap();
    assert!(transport.is_connected());
    assert_eq!(next_batch(&mut transport).await[0].command, "001");
}

#[tokio::test]
async fn server_requested_reconnect() {
    let (listener, config) = listen().await;
    let mut transport = Transport::new(config);
    let mut session = connected(&mut transport, &listener).await;
    next_batch(&mut transport).await;

    session.send(":tmi.twitch.tv RECONNECT\r\n").await;
    let (batch, _second) = tokio::join!(transport.receive(), async {
        let mut session = Session::accept(&listener).await;
        session.handshake().await;
        session
    });
    assert!(batch.unwrap().is_empty());
    assert!(transport.is_connected());
}

#[tokio::test]
async fn lost_for_good_is_reported() {
    let (listener, config) = listen().await;
    let mut transport = Transport::new(config);
    let session = connected(&mut transport, &listener).await;
    next_batch(&mut transport).await;
    drop(session);
    drop(listener);

    assert!(matches!(
        transport.receive().await,
        Err(TransportError::ConnectionLost(_))
    ));
}

#[tokio::test]
async fn outbound_formats() {
    let (listener, config) = listen().await;
    let mut transport = Transport::new(config);
    let mut session = connected(&mut transport, &listener).await;

    transport.send_channel("hello chat").await.unwrap();
    transport.send_private("ronni", "psst").await.unwrap();
    transport
        .send_line("PRIVMSG #dallas :no doubled newline\r\n".into())
        .await
        .unwrap();

    assert_eq!(
        session.lines(3).await,
        vec![
            "PRIVMSG #dallas :hello chat",
            "PRIVMSG #dallas :.w ronni psst",
            "PRIVMSG #dallas :no doubled newline",
        ]
    );

    assert!(matches!(
        transport.send_channel("one\r\nQUIT").await,
        Err(TransportError::Codec(CodecError::EmbeddedNewline))
    ));

    transport.close().await;
    assert!(!transport.is_connected());
    assert_eq!(session.line().await, None);
}

#[tokio::test]
async fn welcome_constant_parses() {
    let msg = Message::parse(WELCOME.trim_end()).unwrap();
    assert_eq!(msg.command, "001");
}
