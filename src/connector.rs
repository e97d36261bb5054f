//! Concrete default for the Connection collaborator (C2): a framed RESP
//! transport over any `AsyncRead + AsyncWrite` stream, split into an
//! independent reader task and writer task so that `submit` never blocks the
//! core and a socket-closed signal can be raised without the core having to
//! poll for it directly.
//!
//! `Connector` is the seam tests hook into: the default is plain TCP, but
//! anything implementing the trait (e.g. one end of a `tokio::io::duplex`
//! driven by a fake server task) works the same way.

use crate::frame::{self, Frame};
use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use std::io::Cursor;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};

/// Blanket marker for anything usable as the byte-level transport.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send + 'static> AsyncStream for T {}

/// How a fresh socket gets opened. `TcpConnector` is the production default;
/// tests supply their own to hand the client one half of an in-memory pipe.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, host: &str, port: u16) -> std::io::Result<Box<dyn AsyncStream>>;
}

/// Opens a plain TCP connection to `host:port`.
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, host: &str, port: u16) -> std::io::Result<Box<dyn AsyncStream>> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }
}

/// An event produced by a connection's reader task.
pub(crate) enum ReaderEvent {
    /// A fully parsed reply frame, in wire arrival order.
    Frame(Frame),
}

/// The handle a connected socket is known by once it's live. Submitting
/// bytes is a non-blocking send into the writer task's channel, matching the
/// `submit(handle, payload, tag) -> ()` contract in §4.2: it hands off and
/// returns immediately.
#[derive(Clone)]
pub(crate) struct ConnectionHandle {
    pub(crate) generation: u64,
    write_tx: mpsc::UnboundedSender<Bytes>,
}

impl ConnectionHandle {
    pub(crate) fn submit(&self, payload: Bytes) {
        // A full write task only disappears after emitting `Closed`, which
        // the core observes independently; a failed send here just means a
        // frame that will never get a reply, indistinguishable in effect
        // from one lost to a socket that closes a moment later.
        let _ = self.write_tx.send(payload);
    }
}

/// Splits a stream into a writer task (drains an mpsc of outgoing payloads)
/// and a reader task (parses frames and forwards them), returning the handle
/// for the former and the event stream for the latter plus a one-shot that
/// fires with the close reason regardless of which side is currently reading
/// frames off the event stream. This is what lets ownership of `frame_rx`
/// move from the handshake driver to the core without losing the ability to
/// notice the socket closing afterwards.
pub(crate) fn spawn_io(
    stream: Box<dyn AsyncStream>,
    generation: u64,
) -> (
    ConnectionHandle,
    mpsc::UnboundedReceiver<ReaderEvent>,
    oneshot::Receiver<String>,
) {
    let (read_half, write_half) = tokio::io::split(stream);
    let (write_tx, write_rx) = mpsc::unbounded_channel::<Bytes>();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (closed_tx, closed_rx) = oneshot::channel();

    tokio::spawn(writer_task(write_half, write_rx));
    tokio::spawn(reader_task(read_half, event_tx, closed_tx));

    (ConnectionHandle { generation, write_tx }, event_rx, closed_rx)
}

async fn writer_task(
    mut write_half: impl AsyncWrite + Unpin,
    mut write_rx: mpsc::UnboundedReceiver<Bytes>,
) {
    while let Some(payload) = write_rx.recv().await {
        if write_half.write_all(&payload).await.is_err() {
            return;
        }
        if write_half.flush().await.is_err() {
            return;
        }
    }
}

async fn reader_task(
    mut read_half: impl AsyncRead + Unpin,
    event_tx: mpsc::UnboundedSender<ReaderEvent>,
    closed_tx: oneshot::Sender<String>,
) {
    let mut buffer = BytesMut::with_capacity(4 * 1024);
    loop {
        match try_parse_frame(&mut buffer) {
            Ok(Some(frame)) => {
                if event_tx.send(ReaderEvent::Frame(frame)).is_err() {
                    // Nobody is reading frames anymore (core dropped the
                    // receiver on a later disconnect); no point continuing.
                    let _ = closed_tx.send("receiver dropped".to_string());
                    return;
                }
                continue;
            }
            Ok(None) => {}
            Err(e) => {
                let _ = closed_tx.send(format!("protocol error: {e}"));
                return;
            }
        }

        match read_half.read_buf(&mut buffer).await {
            Ok(0) => {
                let reason = if buffer.is_empty() {
                    "connection closed".to_string()
                } else {
                    "connection reset mid-frame".to_string()
                };
                let _ = closed_tx.send(reason);
                return;
            }
            Ok(_) => continue,
            Err(e) => {
                let _ = closed_tx.send(e.to_string());
                return;
            }
        }
    }
}

fn try_parse_frame(buffer: &mut BytesMut) -> Result<Option<Frame>, frame::Error> {
    use frame::Error::Incomplete;

    let mut cursor = Cursor::new(&buffer[..]);
    match Frame::check(&mut cursor) {
        Ok(_) => {
            let len = cursor.position() as usize;
            cursor.set_position(0);
            let frame = Frame::parse(&mut cursor)?;
            buffer.advance(len);
            Ok(Some(frame))
        }
        Err(Incomplete) => Ok(None),
        Err(e) => Err(e),
    }
}
