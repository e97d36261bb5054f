//! Reconnect supervisor (C4). A long-lived task, independent of the core,
//! that owns the connect → handshake → "wait for it to die" loop and talks
//! to the core purely by message. The core never touches a socket and the
//! supervisor never touches a queue.

use crate::connector::{spawn_io, ConnectionHandle, Connector, ReaderEvent};
use crate::handshake;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// The supervisor-to-core protocol: every state change the supervisor
/// observes arrives as one of these.
pub(crate) enum SupervisorEvent {
    ConnectError {
        reason: String,
    },
    InitError {
        generation: u64,
        errors: Vec<String>,
    },
    SocketClosed {
        generation: u64,
        reason: String,
    },
    Connected {
        handle: ConnectionHandle,
        frame_rx: mpsc::UnboundedReceiver<ReaderEvent>,
        cluster_id: Option<Bytes>,
    },
}

/// Runs forever. Spawn this once per `NodeClient` and forget the
/// `JoinHandle`; the task has no way to notice its own core going away, so
/// `NodeClient::stop` aborts it directly instead (see `core.rs`).
pub(crate) async fn run(
    connector: Arc<dyn Connector>,
    host: String,
    port: u16,
    use_cluster_id: bool,
    resp_version: u8,
    reconnect_wait: Duration,
    core_tx: mpsc::UnboundedSender<SupervisorEvent>,
) {
    let mut generation: u64 = 0;
    loop {
        generation += 1;

        let stream = match connector.connect(&host, port).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(%host, port, error = %e, "connect failed");
                let _ = core_tx.send(SupervisorEvent::ConnectError {
                    reason: e.to_string(),
                });
                tokio::time::sleep(reconnect_wait).await;
                continue;
            }
        };

        let (handle, mut frame_rx, mut closed_rx) = spawn_io(stream, generation);

        let handshake_result = handshake::run(
            &handle,
            &mut frame_rx,
            &mut closed_rx,
            use_cluster_id,
            resp_version,
            reconnect_wait,
            &core_tx,
        )
        .await;

        match handshake_result {
            Ok(cluster_id) => {
                debug!(%host, port, generation, "connected");
                let _ = core_tx.send(SupervisorEvent::Connected {
                    handle,
                    frame_rx,
                    cluster_id,
                });
                let reason = closed_rx
                    .await
                    .unwrap_or_else(|_| "connection closed".to_string());
                let _ = core_tx.send(SupervisorEvent::SocketClosed { generation, reason });
            }
            Err(err) => {
                let _ = core_tx.send(SupervisorEvent::SocketClosed {
                    generation,
                    reason: err.0,
                });
            }
        }
    }
}
