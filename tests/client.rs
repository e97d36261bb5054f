//! End-to-end tests driving a real `NodeClient` against a scripted
//! `Connector` instead of a real socket, following the teacher's
//! `tests/client.rs` convention of spinning up a listener and driving a
//! client against it; here the "listener" is an in-memory duplex pipe the
//! test plays mock Redis node over.

use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use redis_node_client::{
    AsyncStream, Command, Connector, DownReason, Frame, NodeClient, NodeClientOptions, Reply,
    ReplyError, Status, StopReason,
};
use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

/// Hands the client one half of an in-memory duplex pipe per scripted
/// outcome, in order; the other half is sent to the test driver over
/// `server_rx` so it can play mock Redis node for that connection. Once the
/// scripted list is exhausted, further `connect` calls succeed, modeling a
/// node that comes back for good after flapping.
struct ScriptedConnector {
    outcomes: Mutex<VecDeque<Outcome>>,
    server_tx: mpsc::UnboundedSender<DuplexStream>,
}

enum Outcome {
    Fail,
    Succeed,
}

impl ScriptedConnector {
    fn new(outcomes: Vec<Outcome>) -> (Arc<Self>, mpsc::UnboundedReceiver<DuplexStream>) {
        let (server_tx, server_rx) = mpsc::unbounded_channel();
        (
            Arc::new(ScriptedConnector {
                outcomes: Mutex::new(outcomes.into()),
                server_tx,
            }),
            server_rx,
        )
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, _host: &str, _port: u16) -> std::io::Result<Box<dyn AsyncStream>> {
        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Outcome::Succeed);
        match outcome {
            Outcome::Fail => Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "refused",
            )),
            Outcome::Succeed => {
                let (client_half, server_half) = tokio::io::duplex(8192);
                let _ = self.server_tx.send(server_half);
                Ok(Box::new(client_half))
            }
        }
    }
}

/// A `Connector` that never connects, for tests that only care about
/// waiting-queue and node-down behavior.
struct AlwaysFailConnector;

#[async_trait]
impl Connector for AlwaysFailConnector {
    async fn connect(&self, _host: &str, _port: u16) -> std::io::Result<Box<dyn AsyncStream>> {
        Err(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ))
    }
}

/// Reads exactly one RESP frame off `stream`, buffering partial reads in
/// `buf` across calls so a test can read frame-by-frame.
async fn read_frame(stream: &mut DuplexStream, buf: &mut BytesMut) -> Frame {
    loop {
        if let Some(frame) = try_take_frame(buf) {
            return frame;
        }
        let mut chunk = [0u8; 4096];
        let n = stream
            .read(&mut chunk)
            .await
            .expect("mock server read failed");
        assert!(n > 0, "stream closed while a frame was still expected");
        buf.extend_from_slice(&chunk[..n]);
    }
}

fn try_take_frame(buf: &mut BytesMut) -> Option<Frame> {
    let mut cursor = Cursor::new(&buf[..]);
    if Frame::check(&mut cursor).is_err() {
        return None;
    }
    let len = cursor.position() as usize;
    let mut cursor = Cursor::new(&buf[..]);
    let frame = Frame::parse(&mut cursor).expect("frame checked ok but failed to parse");
    buf.advance(len);
    Some(frame)
}

fn get_frame(key: &str) -> Frame {
    Frame::Array(vec![
        Frame::Bulk(Bytes::from_static(b"GET")),
        Frame::Bulk(Bytes::from(key.to_string())),
    ])
}

async fn write_bulk_reply(stream: &mut DuplexStream, value: &str) {
    let body = format!("${}\r\n{}\r\n", value.len(), value);
    stream.write_all(body.as_bytes()).await.unwrap();
}

fn assert_bulk_ok(reply: Reply, expected: &str) {
    match reply {
        Reply::Ok(Frame::Bulk(b)) => assert_eq!(&b[..], expected.as_bytes()),
        other => panic!("expected Ok(Bulk({expected:?})), got {other:?}"),
    }
}

#[tokio::test]
async fn happy_path_drains_within_in_flight_window() {
    let (connector, mut server_rx) = ScriptedConnector::new(vec![Outcome::Succeed]);
    let options = NodeClientOptions::new("node-a", 6379)
        .max_pending(2)
        .resp_version(2);
    let client = NodeClient::start_with_connector(options, connector)
        .await
        .unwrap();
    let mut server = server_rx.recv().await.expect("mock server connected");
    let mut buf = BytesMut::new();

    let (tx_a, rx_a) = oneshot::channel();
    let (tx_b, rx_b) = oneshot::channel();
    let (tx_c, rx_c) = oneshot::channel();
    client.command_async(Command::get("A"), tx_a);
    client.command_async(Command::get("B"), tx_b);
    client.command_async(Command::get("C"), tx_c);

    assert_eq!(read_frame(&mut server, &mut buf).await, get_frame("A"));
    assert_eq!(read_frame(&mut server, &mut buf).await, get_frame("B"));

    // `C` must still be sitting in `waiting`: the in-flight window is full.
    assert!(matches!(
        rx_c.try_recv(),
        Err(oneshot::error::TryRecvError::Empty)
    ));

    write_bulk_reply(&mut server, "A").await;
    assert_eq!(read_frame(&mut server, &mut buf).await, get_frame("C"));

    write_bulk_reply(&mut server, "B").await;
    write_bulk_reply(&mut server, "C").await;

    assert_bulk_ok(rx_a.await.unwrap(), "A");
    assert_bulk_ok(rx_b.await.unwrap(), "B");
    assert_bulk_ok(rx_c.await.unwrap(), "C");

    client.stop().await;
}

#[tokio::test]
async fn overflow_drops_the_oldest_waiting_command() {
    let connector = Arc::new(AlwaysFailConnector);
    let (status_tx, mut status_rx) = mpsc::unbounded_channel();
    let options = NodeClientOptions::new("node-a", 6379)
        .max_waiting(3)
        .max_pending(1)
        .reconnect_wait(Duration::from_secs(5))
        .node_down_timeout(Duration::from_secs(5))
        .status_sink(status_tx);
    let client = NodeClient::start_with_connector(options, connector)
        .await
        .unwrap();

    let (tx_a, rx_a) = oneshot::channel();
    let (tx_b, rx_b) = oneshot::channel();
    let (tx_c, rx_c) = oneshot::channel();
    let (tx_d, rx_d) = oneshot::channel();
    let (tx_e, rx_e) = oneshot::channel();
    client.command_async(Command::get("A"), tx_a);
    client.command_async(Command::get("B"), tx_b);
    client.command_async(Command::get("C"), tx_c);
    client.command_async(Command::get("D"), tx_d);
    client.command_async(Command::get("E"), tx_e);

    // The two oldest are dropped to bring `waiting` back down to bound.
    assert!(matches!(
        rx_a.await.unwrap(),
        Reply::Err(ReplyError::QueueOverflow)
    ));
    assert!(matches!(
        rx_b.await.unwrap(),
        Reply::Err(ReplyError::QueueOverflow)
    ));

    for rx in [rx_c, rx_d, rx_e] {
        assert!(matches!(
            rx.try_recv(),
            Err(oneshot::error::TryRecvError::Empty)
        ));
    }

    // Exactly two status events: the connect failure and a single
    // `queue_full` (order between the two isn't guaranteed, since both are
    // triggered from independent tasks racing the scheduler).
    let mut events = Vec::new();
    for _ in 0..2 {
        let event = timeout(Duration::from_millis(300), status_rx.recv())
            .await
            .expect("expected a status event")
            .unwrap();
        events.push(event.status);
    }
    assert!(events
        .iter()
        .any(|s| matches!(s, Status::ConnectionDown(DownReason::ConnectError(_)))));
    assert!(events.iter().any(|s| matches!(s, Status::QueueFull)));
    assert!(timeout(Duration::from_millis(50), status_rx.recv())
        .await
        .is_err());

    client.stop().await;
}

#[tokio::test]
async fn node_down_timeout_is_sticky_until_reconnected() {
    let (connector, mut server_rx) =
        ScriptedConnector::new(std::iter::repeat_with(|| Outcome::Fail).take(8).collect());
    let options = NodeClientOptions::new("node-a", 6379)
        .reconnect_wait(Duration::from_millis(15))
        .node_down_timeout(Duration::from_millis(60));
    let client = NodeClient::start_with_connector(options, connector)
        .await
        .unwrap();

    let (tx_a, rx_a) = oneshot::channel();
    client.command_async(Command::get("A"), tx_a);
    let reply = timeout(Duration::from_millis(500), rx_a)
        .await
        .expect("node-down timer should have fired")
        .unwrap();
    assert!(matches!(reply, Reply::Err(ReplyError::NodeDown)));

    // Sticky: a submission made while `node_down` is set is answered
    // synchronously, without ever touching a queue.
    let (tx_b, rx_b) = oneshot::channel();
    client.command_async(Command::get("B"), tx_b);
    let reply = timeout(Duration::from_millis(50), rx_b)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(reply, Reply::Err(ReplyError::NodeDown)));

    // The 8 scripted failures exhaust, so the connector starts succeeding;
    // once `connected` arrives the sticky state clears.
    let mut server = timeout(Duration::from_secs(2), server_rx.recv())
        .await
        .expect("connector should eventually succeed")
        .unwrap();
    let mut buf = BytesMut::new();

    let (tx_c, rx_c) = oneshot::channel();
    client.command_async(Command::get("C"), tx_c);
    assert_eq!(read_frame(&mut server, &mut buf).await, get_frame("C"));
    write_bulk_reply(&mut server, "C").await;
    assert_bulk_ok(rx_c.await.unwrap(), "C");

    client.stop().await;
}

#[tokio::test]
async fn reconnect_replays_pending_commands_in_original_order() {
    let (connector, mut server_rx) = ScriptedConnector::new(vec![Outcome::Succeed]);
    let options = NodeClientOptions::new("node-a", 6379).max_pending(2);
    let client = NodeClient::start_with_connector(options, connector)
        .await
        .unwrap();

    let mut server = server_rx.recv().await.unwrap();
    let mut buf = BytesMut::new();

    let (tx_a, rx_a) = oneshot::channel();
    let (tx_b, rx_b) = oneshot::channel();
    let (tx_c, rx_c) = oneshot::channel();
    let (tx_d, rx_d) = oneshot::channel();
    client.command_async(Command::get("A"), tx_a);
    client.command_async(Command::get("B"), tx_b);
    client.command_async(Command::get("C"), tx_c);
    client.command_async(Command::get("D"), tx_d);

    assert_eq!(read_frame(&mut server, &mut buf).await, get_frame("A"));
    assert_eq!(read_frame(&mut server, &mut buf).await, get_frame("B"));

    drop(server); // socket_closed

    let mut server2 = timeout(Duration::from_secs(2), server_rx.recv())
        .await
        .expect("supervisor should reconnect")
        .unwrap();
    let mut buf2 = BytesMut::new();

    // `A` and `B` are resubmitted first, in their original order, ahead of
    // `C`/`D` which never made it onto the wire the first time.
    assert_eq!(read_frame(&mut server2, &mut buf2).await, get_frame("A"));
    assert_eq!(read_frame(&mut server2, &mut buf2).await, get_frame("B"));
    write_bulk_reply(&mut server2, "A").await;
    assert_eq!(read_frame(&mut server2, &mut buf2).await, get_frame("C"));
    write_bulk_reply(&mut server2, "B").await;
    assert_eq!(read_frame(&mut server2, &mut buf2).await, get_frame("D"));
    write_bulk_reply(&mut server2, "C").await;
    write_bulk_reply(&mut server2, "D").await;

    assert_bulk_ok(rx_a.await.unwrap(), "A");
    assert_bulk_ok(rx_b.await.unwrap(), "B");
    assert_bulk_ok(rx_c.await.unwrap(), "C");
    assert_bulk_ok(rx_d.await.unwrap(), "D");

    client.stop().await;
}

#[tokio::test]
async fn repeated_connect_errors_emit_connection_down_once() {
    let connector = Arc::new(AlwaysFailConnector);
    let (status_tx, mut status_rx) = mpsc::unbounded_channel();
    let options = NodeClientOptions::new("node-a", 6379)
        .reconnect_wait(Duration::from_millis(10))
        .node_down_timeout(Duration::from_secs(5))
        .status_sink(status_tx);
    let client = NodeClient::start_with_connector(options, connector)
        .await
        .unwrap();

    // Several connect attempts happen in this window, all with the same
    // reason string.
    tokio::time::sleep(Duration::from_millis(150)).await;

    let first = timeout(Duration::from_millis(50), status_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(
        first.status,
        Status::ConnectionDown(DownReason::ConnectError(_))
    ));
    assert!(timeout(Duration::from_millis(50), status_rx.recv())
        .await
        .is_err());

    client.stop().await;
}

#[tokio::test]
async fn stop_fails_every_outstanding_command() {
    let (connector, mut server_rx) = ScriptedConnector::new(vec![Outcome::Succeed]);
    let (status_tx, mut status_rx) = mpsc::unbounded_channel();
    let options = NodeClientOptions::new("node-a", 6379)
        .max_pending(1)
        .status_sink(status_tx);
    let client = NodeClient::start_with_connector(options, connector)
        .await
        .unwrap();

    let mut server = server_rx.recv().await.unwrap();
    let mut buf = BytesMut::new();

    let (tx_a, rx_a) = oneshot::channel();
    let (tx_b, rx_b) = oneshot::channel();
    let (tx_c, rx_c) = oneshot::channel();
    client.command_async(Command::get("A"), tx_a);
    client.command_async(Command::get("B"), tx_b);
    client.command_async(Command::get("C"), tx_c);

    // `A` reaches the wire; `B`, `C` sit in `waiting` behind the
    // `max_pending=1` window.
    assert_eq!(read_frame(&mut server, &mut buf).await, get_frame("A"));

    let up = timeout(Duration::from_millis(50), status_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(up.status, Status::ConnectionUp);

    client.stop().await;

    assert!(matches!(
        rx_a.await.unwrap(),
        Reply::Err(ReplyError::ClientStopped(StopReason::Normal))
    ));
    assert!(matches!(
        rx_b.await.unwrap(),
        Reply::Err(ReplyError::ClientStopped(StopReason::Normal))
    ));
    assert!(matches!(
        rx_c.await.unwrap(),
        Reply::Err(ReplyError::ClientStopped(StopReason::Normal))
    ));

    let down = timeout(Duration::from_millis(50), status_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        down.status,
        Status::ConnectionDown(DownReason::ClientStopped(StopReason::Normal))
    );
}
