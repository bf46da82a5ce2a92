//! Listener tests

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use hermes_protocol::{build_ack, AckConfig, Delimiters, Message};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::{MessageHandler, MllpServer, MllpServerConfig};

const DEADLINE: Duration = Duration::from_secs(5);

const SAMPLE: &str = "MSH|^~\\&|LAB|ACME|||202401020304||ADT^A01|MSG00001|P|2.5.1|\nPID|1||12345";

/// Parses each payload and replies with a default ack; unparsable payloads
/// get no reply. Every received payload is recorded.
struct AckHandler {
    seen: Arc<Mutex<Vec<String>>>,
}

impl AckHandler {
    fn new() -> (Self, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        (Self { seen: seen.clone() }, seen)
    }
}

#[async_trait]
impl MessageHandler for AckHandler {
    async fn handle(&self, payload: Bytes, _peer: SocketAddr) -> Option<Message> {
        let text = String::from_utf8_lossy(&payload).into_owned();
        self.seen.lock().push(text.clone());
        let message = Message::parse(&text).ok()?;
        Some(build_ack(&message, &AckConfig::default(), false))
    }
}

/// Start a server on an ephemeral port and return its address and cancel.
async fn start_server(handler: Arc<dyn MessageHandler>) -> (SocketAddr, CancellationToken) {
    let config = MllpServerConfig::new("test", "127.0.0.1", 0);
    let server = MllpServer::new(config, handler);
    let cancel = CancellationToken::new();
    let (tx, rx) = tokio::sync::oneshot::channel();

    let server_cancel = cancel.clone();
    tokio::spawn(async move {
        server.run_with_bound_addr(server_cancel, tx).await.unwrap();
    });

    let addr = timeout(DEADLINE, rx).await.unwrap().unwrap();
    (addr, cancel)
}

/// Read from the stream until one complete frame arrives, returning the
/// unframed payload.
async fn read_frame(stream: &mut TcpStream, delimiters: Delimiters) -> String {
    let mut collected = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let n = timeout(DEADLINE, stream.read(&mut buf)).await.unwrap().unwrap();
        assert!(n > 0, "connection closed before a complete frame arrived");
        collected.extend_from_slice(&buf[..n]);
        if collected.len() >= 2
            && collected[collected.len() - 1] == delimiters.cr
            && collected[collected.len() - 2] == delimiters.end
        {
            break;
        }
    }
    assert_eq!(collected[0], delimiters.start);
    String::from_utf8(collected[1..collected.len() - 2].to_vec()).unwrap()
}

#[tokio::test]
async fn acks_a_framed_message() {
    let (handler, seen) = AckHandler::new();
    let (addr, cancel) = start_server(Arc::new(handler)).await;
    let delimiters = Delimiters::default();

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(&delimiters.frame(SAMPLE))
        .await
        .unwrap();

    let reply = read_frame(&mut stream, delimiters).await;
    let ack = Message::parse(&reply).unwrap();
    assert_eq!(ack.get("MSA-1").unwrap(), Some("AA"));
    assert_eq!(ack.get("MSA-2").unwrap(), Some("MSG00001"));

    assert_eq!(seen.lock().as_slice(), [SAMPLE]);
    cancel.cancel();
}

#[tokio::test]
async fn reassembles_a_frame_split_across_writes() {
    let (handler, seen) = AckHandler::new();
    let (addr, cancel) = start_server(Arc::new(handler)).await;
    let delimiters = Delimiters::default();

    let framed = delimiters.frame(SAMPLE);
    let (first, second) = framed.split_at(framed.len() / 2);

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(first).await.unwrap();
    stream.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    stream.write_all(second).await.unwrap();

    let reply = read_frame(&mut stream, delimiters).await;
    assert!(reply.starts_with("MSH|"));
    assert_eq!(seen.lock().as_slice(), [SAMPLE]);
    cancel.cancel();
}

#[tokio::test]
async fn connection_survives_an_unparsable_payload() {
    let (handler, seen) = AckHandler::new();
    let (addr, cancel) = start_server(Arc::new(handler)).await;
    let delimiters = Delimiters::default();

    let mut stream = TcpStream::connect(addr).await.unwrap();

    // Whitespace only, parses to no segments. No reply, but the
    // connection stays open for the next message.
    stream.write_all(&delimiters.frame("\r\n")).await.unwrap();
    stream.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    stream.write_all(&delimiters.frame(SAMPLE)).await.unwrap();

    let reply = read_frame(&mut stream, delimiters).await;
    assert!(reply.contains("MSA|AA|MSG00001"));
    assert_eq!(seen.lock().len(), 2);
    cancel.cancel();
}

#[tokio::test]
async fn restarted_frame_discards_the_stale_partial() {
    let (handler, seen) = AckHandler::new();
    let (addr, cancel) = start_server(Arc::new(handler)).await;
    let delimiters = Delimiters::default();

    let mut stream = TcpStream::connect(addr).await.unwrap();

    // Start a frame but never finish it, then send a complete one.
    stream.write_all(&[delimiters.start]).await.unwrap();
    stream.write_all(b"MSH|truncated").await.unwrap();
    stream.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    stream.write_all(&delimiters.frame(SAMPLE)).await.unwrap();

    let reply = read_frame(&mut stream, delimiters).await;
    assert!(reply.contains("MSA|AA|MSG00001"));

    // Only the complete message reached the handler.
    assert_eq!(seen.lock().as_slice(), [SAMPLE]);
    cancel.cancel();
}

#[tokio::test]
async fn serves_multiple_connections() {
    let (handler, seen) = AckHandler::new();
    let (addr, cancel) = start_server(Arc::new(handler)).await;
    let delimiters = Delimiters::default();

    let mut a = TcpStream::connect(addr).await.unwrap();
    let mut b = TcpStream::connect(addr).await.unwrap();

    a.write_all(&delimiters.frame(SAMPLE)).await.unwrap();
    b.write_all(&delimiters.frame(SAMPLE)).await.unwrap();

    let _ = read_frame(&mut a, delimiters).await;
    let _ = read_frame(&mut b, delimiters).await;

    assert_eq!(seen.lock().len(), 2);
    cancel.cancel();
}

#[tokio::test]
async fn custom_delimiters_are_honored() {
    let (handler, _seen) = AckHandler::new();
    let delimiters = Delimiters {
        start: b'<',
        end: b'>',
        cr: b'\n',
    };
    let config =
        MllpServerConfig::new("custom", "127.0.0.1", 0).with_delimiters(delimiters);
    let server = MllpServer::new(config, Arc::new(handler));
    let cancel = CancellationToken::new();
    let (tx, rx) = tokio::sync::oneshot::channel();
    let server_cancel = cancel.clone();
    tokio::spawn(async move {
        server.run_with_bound_addr(server_cancel, tx).await.unwrap();
    });
    let addr = timeout(DEADLINE, rx).await.unwrap().unwrap();

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(&delimiters.frame(SAMPLE)).await.unwrap();

    let reply = read_frame(&mut stream, delimiters).await;
    assert!(reply.starts_with("MSH|"));
    cancel.cancel();
}
