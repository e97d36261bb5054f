//! Handshake driver (C3). Runs the deterministic `CLUSTER MYID` /
//! `HELLO 3` batch on a fresh socket and reports `init_error` events back to
//! the supervisor while it retries, per §4.3.

use crate::command::handshake_batch;
use crate::connector::{ConnectionHandle, ReaderEvent};
use crate::frame::{self, Frame};
use crate::supervisor::SupervisorEvent;
use bytes::Bytes;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Why the handshake never completed: the socket closed out from under it,
/// either before a reply came back or between retries.
pub(crate) struct SocketClosedDuringHandshake(pub(crate) String);

/// Runs the handshake to completion, retrying on `init_error` forever (the
/// supervisor's outer connect loop is the only thing that gives up, and it
/// never does either, see §4.4). Returns the cluster id once the node
/// accepts the batch, or an error if the socket closed first.
pub(crate) async fn run(
    handle: &ConnectionHandle,
    frame_rx: &mut mpsc::UnboundedReceiver<ReaderEvent>,
    closed_rx: &mut oneshot::Receiver<String>,
    use_cluster_id: bool,
    resp_version: u8,
    reconnect_wait: Duration,
    supervisor_tx: &mpsc::UnboundedSender<SupervisorEvent>,
) -> Result<Option<Bytes>, SocketClosedDuringHandshake> {
    let batch = handshake_batch(use_cluster_id, resp_version);
    if batch.is_empty() {
        debug!("handshake batch is empty, skipping");
        return Ok(None);
    }

    loop {
        for frame in &batch {
            handle.submit(frame::encode(frame));
        }

        let mut replies = Vec::with_capacity(batch.len());
        let close_reason = loop {
            if replies.len() == batch.len() {
                break None;
            }
            tokio::select! {
                biased;
                event = frame_rx.recv() => match event {
                    Some(ReaderEvent::Frame(f)) => replies.push(f),
                    None => break Some("connection closed".to_string()),
                },
                reason = &mut *closed_rx => {
                    break Some(reason.unwrap_or_else(|_| "connection closed".to_string()));
                }
            }
        };

        if let Some(reason) = close_reason {
            return Err(SocketClosedDuringHandshake(reason));
        }

        let errors: Vec<String> = replies
            .iter()
            .filter_map(|f| match f {
                Frame::Error(msg) => Some(msg.clone()),
                _ => None,
            })
            .collect();

        if errors.is_empty() {
            let cluster_id = if use_cluster_id {
                match &replies[0] {
                    Frame::Bulk(b) => Some(b.clone()),
                    Frame::Simple(s) => Some(Bytes::from(s.clone().into_bytes())),
                    _ => None,
                }
            } else {
                None
            };
            debug!(?cluster_id, "handshake completed");
            return Ok(cluster_id);
        }

        warn!(?errors, "handshake batch returned errors, retrying");
        let _ = supervisor_tx.send(SupervisorEvent::InitError {
            generation: handle.generation,
            errors,
        });
        tokio::time::sleep(reconnect_wait).await;
    }
}
