//! WebSocket sessions against a mock server.

use std::net::SocketAddr;
use std::time::Duration;

use wireprobe::config::Target;
use wireprobe::error::{ErrorKind, ProbeError, TimeoutPhase, WsError};
use wireprobe::websocket::{Message, OpCode, Session, SessionConfig, SessionEvent, SessionState};

mod common;

use common::{SeenFrame, WsBehavior, WsSeen};

fn session_for(addr: SocketAddr) -> Session {
    let target = Target::parse(&format!("ws://127.0.0.1:{}/chat?room=1", addr.port())).unwrap();
    let mut config = SessionConfig::new(&target);
    config.timeout = Duration::from_secs(2);
    Session::new(config)
}

async fn next(session: &mut Session) -> Option<SessionEvent> {
    tokio::time::timeout(Duration::from_secs(2), session.next_event())
        .await
        .expect("timed out waiting for session event")
}

async fn next_frame(seen: &mut tokio::sync::mpsc::UnboundedReceiver<WsSeen>) -> Option<SeenFrame> {
    loop {
        match common::recv(seen).await {
            WsSeen::Frame(frame) => return Some(frame),
            WsSeen::Eof => return None,
            WsSeen::Upgrade(_) => continue,
        }
    }
}

#[tokio::test]
async fn echo_roundtrip_with_subprotocol() {
    let (addr, mut seen) = common::start_ws_server(WsBehavior::Echo).await;
    let target = Target::parse(&format!("ws://127.0.0.1:{}/chat?room=1", addr.port())).unwrap();
    let mut config = SessionConfig::new(&target);
    config.subprotocols = vec!["chat".into(), "superchat".into()];
    config.cookie = Some("sid=xyz".into());
    let mut session = Session::new(config);

    session.connect().await.unwrap();
    assert_eq!(session.state(), SessionState::Open);
    assert_eq!(session.protocol(), Some("chat"));

    match common::recv(&mut seen).await {
        WsSeen::Upgrade(request) => {
            assert!(request.starts_with("GET /chat?room=1 HTTP/1.1\r\n"));
            assert!(request.contains("Sec-WebSocket-Protocol: chat, superchat\r\n"));
            assert!(request.contains("Cookie: sid=xyz\r\n"));
        }
        other => panic!("unexpected {:?}", other),
    }

    match next(&mut session).await {
        Some(SessionEvent::Open { protocol }) => assert_eq!(protocol.as_deref(), Some("chat")),
        other => panic!("unexpected {:?}", other),
    }

    session.send_text("hello").unwrap();
    session.send_binary(&[0, 159, 255]).unwrap();

    match next(&mut session).await {
        Some(SessionEvent::Message(Message::Text(text))) => assert_eq!(text, "hello"),
        other => panic!("unexpected {:?}", other),
    }
    match next(&mut session).await {
        Some(SessionEvent::Message(Message::Binary(bytes))) => assert_eq!(&bytes[..], &[0, 159, 255]),
        other => panic!("unexpected {:?}", other),
    }

    let first = next_frame(&mut seen).await.unwrap();
    assert!(first.masked);
    assert_eq!(first.opcode, OpCode::Text);
    assert_eq!(first.payload, b"hello");
}

#[tokio::test]
async fn server_ping_is_answered_automatically() {
    let (addr, mut seen) = common::start_ws_server(WsBehavior::PingFirst).await;
    let mut session = session_for(addr);
    session.connect().await.unwrap();

    assert!(matches!(next(&mut session).await, Some(SessionEvent::Open { .. })));
    match next(&mut session).await {
        Some(SessionEvent::Ping(payload)) => assert_eq!(&payload[..], b"hb"),
        other => panic!("unexpected {:?}", other),
    }

    let pong = next_frame(&mut seen).await.unwrap();
    assert_eq!(pong.opcode, OpCode::Pong);
    assert_eq!(pong.payload, b"hb");
    assert!(pong.masked);
}

#[tokio::test]
async fn client_ping_yields_pong_event() {
    let (addr, _seen) = common::start_ws_server(WsBehavior::Echo).await;
    let mut session = session_for(addr);
    session.connect().await.unwrap();
    assert!(matches!(next(&mut session).await, Some(SessionEvent::Open { .. })));

    session.ping(b"probe").unwrap();
    match next(&mut session).await {
        Some(SessionEvent::Pong(payload)) => assert_eq!(&payload[..], b"probe"),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn peer_close_is_echoed_and_reported() {
    let (addr, mut seen) = common::start_ws_server(WsBehavior::CloseFirst).await;
    let mut session = session_for(addr);
    session.connect().await.unwrap();
    assert!(matches!(next(&mut session).await, Some(SessionEvent::Open { .. })));

    match next(&mut session).await {
        Some(SessionEvent::Close { code, reason }) => {
            assert_eq!(code, Some(1001));
            assert_eq!(reason, "bye");
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(next(&mut session).await.is_none());
    assert_eq!(session.state(), SessionState::Closed);

    let echo = next_frame(&mut seen).await.unwrap();
    assert_eq!(echo.opcode, OpCode::Close);
    assert_eq!(&echo.payload[..2], &1001u16.to_be_bytes());
    assert!(next_frame(&mut seen).await.is_none());

    let err = session.send_text("too late").unwrap_err();
    assert!(matches!(err, ProbeError::WebSocket(WsError::InvalidState(_))));
}

#[tokio::test]
async fn double_close_sends_one_close_frame() {
    let (addr, mut seen) = common::start_ws_server(WsBehavior::Echo).await;
    let mut session = session_for(addr);
    session.connect().await.unwrap();
    assert!(matches!(next(&mut session).await, Some(SessionEvent::Open { .. })));

    session.close();
    session.close();
    session.close_with(4000, "again");
    assert_eq!(session.state(), SessionState::Closing);
    assert!(session.send_text("after close").is_err());

    match next(&mut session).await {
        Some(SessionEvent::Close { code, .. }) => assert_eq!(code, Some(1000)),
        other => panic!("unexpected {:?}", other),
    }
    assert!(next(&mut session).await.is_none());

    let mut close_frames = 0;
    while let Some(frame) = next_frame(&mut seen).await {
        if frame.opcode == OpCode::Close {
            close_frames += 1;
            assert_eq!(frame.payload, 1000u16.to_be_bytes());
        }
    }
    assert_eq!(close_frames, 1);
}

#[tokio::test]
async fn dropped_connection_reports_abnormal_close_once() {
    let (addr, _seen) = common::start_ws_server(WsBehavior::DropAfterOpen).await;
    let mut session = session_for(addr);
    session.connect().await.unwrap();
    assert!(matches!(next(&mut session).await, Some(SessionEvent::Open { .. })));

    match next(&mut session).await {
        Some(SessionEvent::Close { code, reason }) => {
            assert_eq!(code, Some(1006));
            assert!(reason.is_empty());
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(next(&mut session).await.is_none());
    assert!(next(&mut session).await.is_none());
}

#[tokio::test]
async fn wrong_accept_fails_handshake() {
    let (addr, _seen) = common::start_ws_server(WsBehavior::BadAccept).await;
    let mut session = session_for(addr);

    let err = session.connect().await.unwrap_err();
    assert!(matches!(err, ProbeError::WebSocket(WsError::Handshake(_))), "{:?}", err);
    assert_eq!(session.state(), SessionState::Closed);
    assert!(session.send_text("x").is_err());
}

#[tokio::test]
async fn silent_server_times_out_handshake() {
    let (addr, _seen) = common::start_ws_server(WsBehavior::Silent).await;
    let target = Target::parse(&format!("ws://127.0.0.1:{}/", addr.port())).unwrap();
    let mut config = SessionConfig::new(&target);
    config.timeout = Duration::from_millis(150);
    let mut session = Session::new(config);

    match session.connect().await {
        Err(ProbeError::Timeout { phase, timeout_ms }) => {
            assert_eq!(phase, TimeoutPhase::Handshake);
            assert_eq!(timeout_ms, 150);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn sender_handle_writes_while_reading() {
    let (addr, _seen) = common::start_ws_server(WsBehavior::Echo).await;
    let mut session = session_for(addr);
    session.connect().await.unwrap();
    let sender = session.sender().unwrap();
    assert!(matches!(next(&mut session).await, Some(SessionEvent::Open { .. })));

    let writer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        sender.send(Message::Text("from another task".into())).unwrap();
        sender
    });

    match next(&mut session).await {
        Some(SessionEvent::Message(Message::Text(text))) => assert_eq!(text, "from another task"),
        other => panic!("unexpected {:?}", other),
    }

    let sender = writer.await.unwrap();
    sender.close();
    assert_eq!(sender.state(), SessionState::Closing);
}

#[tokio::test]
async fn caller_header_lines_are_sent_verbatim() {
    let (addr, mut seen) = common::start_ws_server(WsBehavior::Echo).await;
    let target = Target::parse(&format!("ws://127.0.0.1:{}/", addr.port())).unwrap();
    let mut config = SessionConfig::new(&target);
    config.headers = vec!["X-Smuggle".into(), "Origin : http://evil.example".into()];
    config.timeout = Duration::from_secs(2);
    let mut session = Session::new(config);

    session.connect().await.unwrap();
    match common::recv(&mut seen).await {
        WsSeen::Upgrade(request) => {
            assert!(request.ends_with(
                "Sec-WebSocket-Version: 13\r\nX-Smuggle\r\nOrigin : http://evil.example\r\n\r\n"
            ));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn fragmented_frames_raise_errors_and_session_stays_open() {
    let (addr, _seen) = common::start_ws_server(WsBehavior::FragmentThenText).await;
    let mut session = session_for(addr);
    session.connect().await.unwrap();
    assert!(matches!(next(&mut session).await, Some(SessionEvent::Open { .. })));

    for _ in 0..2 {
        match next(&mut session).await {
            Some(SessionEvent::Error(ProbeError::WebSocket(WsError::Protocol(msg)))) => {
                assert!(msg.contains("fragmented"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(session.state(), SessionState::Open);
    }
    match next(&mut session).await {
        Some(SessionEvent::Message(Message::Text(text))) => assert_eq!(text, "ok"),
        other => panic!("unexpected {:?}", other),
    }

    session.send_text("still open").unwrap();
    match next(&mut session).await {
        Some(SessionEvent::Message(Message::Text(text))) => assert_eq!(text, "still open"),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn unknown_opcode_closes_with_protocol_error() {
    let (addr, mut seen) = common::start_ws_server(WsBehavior::UnknownOpcode).await;
    let mut session = session_for(addr);
    session.connect().await.unwrap();
    assert!(matches!(next(&mut session).await, Some(SessionEvent::Open { .. })));

    match next(&mut session).await {
        Some(SessionEvent::Error(ProbeError::WebSocket(WsError::Protocol(msg)))) => {
            assert!(msg.contains("0x3"), "{}", msg);
        }
        other => panic!("unexpected {:?}", other),
    }
    match next(&mut session).await {
        Some(SessionEvent::Close { code, .. }) => assert_eq!(code, Some(1002)),
        other => panic!("unexpected {:?}", other),
    }
    assert!(next(&mut session).await.is_none());
    assert_eq!(session.state(), SessionState::Closed);

    let close = next_frame(&mut seen).await.unwrap();
    assert_eq!(close.opcode, OpCode::Close);
    assert!(close.masked);
    assert_eq!(close.payload, 1002u16.to_be_bytes());
}

#[tokio::test]
async fn write_failure_closes_session_and_surfaces_error() {
    let (addr, _seen) = common::start_ws_server(WsBehavior::DropAfterOpen).await;
    let mut session = session_for(addr);
    session.connect().await.unwrap();
    let sender = session.sender().unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    // The first writes may still land in the kernel buffer before the reset.
    let mut rejected = None;
    for _ in 0..100 {
        if let Err(e) = sender.send_text("into the void") {
            rejected = Some(e);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let rejected = rejected.expect("writes never failed");
    assert!(matches!(rejected, ProbeError::WebSocket(WsError::InvalidState(_))));
    assert_eq!(sender.state(), SessionState::Closed);
    assert_eq!(session.state(), SessionState::Closed);

    assert!(matches!(next(&mut session).await, Some(SessionEvent::Open { .. })));
    match next(&mut session).await {
        Some(SessionEvent::Error(err)) => assert_eq!(err.kind(), ErrorKind::Connection),
        other => panic!("unexpected {:?}", other),
    }
    match next(&mut session).await {
        Some(SessionEvent::Close { code, .. }) => assert_eq!(code, Some(1006)),
        other => panic!("unexpected {:?}", other),
    }
    assert!(next(&mut session).await.is_none());
}
