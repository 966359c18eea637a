//! Mock servers shared by the integration tests.
//!
//! Each helper binds `127.0.0.1:0`, serves from a spawned task and reports
//! what it saw over a channel.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use wireprobe::http::response::find_header_end;
use wireprobe::websocket::frame::{create_frame, parse_frame, FrameParse, OpCode};
use wireprobe::websocket::handshake::compute_accept;

/// Read one request head (and a `Content-Length` body, if declared).
pub async fn read_request(socket: &mut TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        if let Some(pos) = find_header_end(&buf) {
            break pos + 4;
        }
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            return buf;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_ascii_lowercase();
    let body_len = head
        .lines()
        .find_map(|l| l.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < head_end + body_len {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    buf
}

/// HTTP backend that answers every connection with `response` and closes.
pub async fn start_http_backend(response: &'static [u8]) -> (SocketAddr, mpsc::UnboundedReceiver<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let request = read_request(&mut socket).await;
                let _ = tx.send(request);
                let _ = socket.write_all(response).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, rx)
}

/// How the mock WebSocket server behaves once a client connects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WsBehavior {
    /// Echo data frames, answer pings, answer CLOSE with CLOSE.
    Echo,
    /// Ping the client right after the handshake, then echo.
    PingFirst,
    /// Send CLOSE 1001 "bye" right after the handshake.
    CloseFirst,
    /// Drop the TCP connection right after the handshake.
    DropAfterOpen,
    /// Send a TEXT frame with FIN=0, its continuation, then TEXT "ok"; then echo.
    FragmentThenText,
    /// Send a frame with reserved opcode 0x3, then echo.
    UnknownOpcode,
    /// Answer the upgrade with a wrong `Sec-WebSocket-Accept`.
    BadAccept,
    /// Read the upgrade request and never answer.
    Silent,
}

/// A frame the mock server received, payload already unmasked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenFrame {
    pub opcode: OpCode,
    pub masked: bool,
    pub payload: Vec<u8>,
}

/// Everything the mock server observed on one connection.
#[derive(Debug)]
pub enum WsSeen {
    Upgrade(String),
    Frame(SeenFrame),
    Eof,
}

/// WebSocket server on a fresh port.
pub async fn start_ws_server(behavior: WsBehavior) -> (SocketAddr, mpsc::UnboundedReceiver<WsSeen>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(serve_ws(socket, behavior, tx.clone()));
        }
    });

    (addr, rx)
}

/// Run the server side of one WebSocket connection.
pub async fn serve_ws(mut socket: TcpStream, behavior: WsBehavior, seen: mpsc::UnboundedSender<WsSeen>) {
    let request = read_request(&mut socket).await;
    let request = String::from_utf8_lossy(&request).into_owned();
    let key = request
        .lines()
        .find_map(|l| {
            let (name, value) = l.split_once(':')?;
            name.eq_ignore_ascii_case("sec-websocket-key")
                .then(|| value.trim().to_string())
        })
        .unwrap_or_default();
    let protocol = request.lines().find_map(|l| {
        let (name, value) = l.split_once(':')?;
        name.eq_ignore_ascii_case("sec-websocket-protocol")
            .then(|| value.split(',').next().unwrap_or("").trim().to_string())
    });
    let _ = seen.send(WsSeen::Upgrade(request));

    match behavior {
        WsBehavior::Silent => {
            tokio::time::sleep(Duration::from_secs(5)).await;
            return;
        }
        WsBehavior::BadAccept => {
            let _ = socket
                .write_all(b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: AAAAAAAAAAAAAAAAAAAAAAAAAAA=\r\n\r\n")
                .await;
            tokio::time::sleep(Duration::from_millis(200)).await;
            return;
        }
        _ => {}
    }

    let mut reply = format!(
        "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: {}\r\n",
        compute_accept(&key)
    );
    if let Some(protocol) = protocol {
        reply.push_str(&format!("Sec-WebSocket-Protocol: {}\r\n", protocol));
    }
    reply.push_str("\r\n");
    socket.write_all(reply.as_bytes()).await.unwrap();

    match behavior {
        WsBehavior::DropAfterOpen => return,
        WsBehavior::CloseFirst => {
            let mut payload = 1001u16.to_be_bytes().to_vec();
            payload.extend_from_slice(b"bye");
            socket
                .write_all(&create_frame(&payload, OpCode::Close, false))
                .await
                .unwrap();
        }
        WsBehavior::PingFirst => {
            socket
                .write_all(&create_frame(b"hb", OpCode::Ping, false))
                .await
                .unwrap();
        }
        WsBehavior::FragmentThenText => {
            let mut bytes = vec![0x01, 3, b'p', b'a', b'r'];
            bytes.extend_from_slice(&[0x80, 1, b't']);
            bytes.extend_from_slice(&create_frame(b"ok", OpCode::Text, false));
            socket.write_all(&bytes).await.unwrap();
        }
        WsBehavior::UnknownOpcode => {
            socket.write_all(&[0x83, 0]).await.unwrap();
        }
        _ => {}
    }

    let mut buf = BytesMut::new();
    loop {
        let frame = loop {
            match parse_frame(&buf).unwrap() {
                FrameParse::Complete(frame) => {
                    let _ = buf.split_to(frame.frame_length);
                    break Some(frame);
                }
                FrameParse::Incomplete => {}
            }
            buf.reserve(4096);
            match socket.read_buf(&mut buf).await {
                Ok(0) | Err(_) => break None,
                Ok(_) => {}
            }
        };

        let Some(frame) = frame else {
            let _ = seen.send(WsSeen::Eof);
            return;
        };

        let payload = frame.payload.to_vec();
        let _ = seen.send(WsSeen::Frame(SeenFrame {
            opcode: frame.opcode,
            masked: frame.masked,
            payload: payload.clone(),
        }));

        let response = match frame.opcode {
            OpCode::Text | OpCode::Binary => Some(create_frame(&payload, frame.opcode, false)),
            OpCode::Ping => Some(create_frame(&payload, OpCode::Pong, false)),
            OpCode::Close if behavior != WsBehavior::CloseFirst => {
                Some(create_frame(&payload, OpCode::Close, false))
            }
            _ => None,
        };
        if let Some(bytes) = response {
            let _ = socket.write_all(&bytes).await;
        }
    }
}

/// What the CONNECT proxy saw.
#[derive(Debug)]
pub struct ProxySeen {
    pub connect_head: String,
    /// Bytes the client sent after a refused CONNECT.
    pub after_refusal: Vec<u8>,
}

/// CONNECT proxy answering with `status_line`.
///
/// On a `200` it pipes to `upstream`; otherwise it records whatever the
/// client sends next until EOF.
pub async fn start_connect_proxy(
    status_line: &'static str,
    upstream: Option<SocketAddr>,
) -> (SocketAddr, mpsc::UnboundedReceiver<ProxySeen>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut client, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let head = read_request(&mut client).await;
                let connect_head = String::from_utf8_lossy(&head).into_owned();
                client
                    .write_all(format!("{}\r\n\r\n", status_line).as_bytes())
                    .await
                    .unwrap();

                if status_line.contains(" 200 ") {
                    let _ = tx.send(ProxySeen {
                        connect_head,
                        after_refusal: Vec::new(),
                    });
                    if let Some(upstream) = upstream {
                        let mut server = TcpStream::connect(upstream).await.unwrap();
                        let _ = tokio::io::copy_bidirectional(&mut client, &mut server).await;
                    }
                    return;
                }

                let mut after_refusal = Vec::new();
                let _ = tokio::time::timeout(
                    Duration::from_millis(500),
                    client.read_to_end(&mut after_refusal),
                )
                .await;
                let _ = tx.send(ProxySeen {
                    connect_head,
                    after_refusal,
                });
            });
        }
    });

    (addr, rx)
}

/// Receive from `rx` or fail after two seconds.
pub async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for mock server")
        .expect("mock server channel closed")
}
