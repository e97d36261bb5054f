//! The command pipeline (C5) and core state machine (C7): a single Tokio
//! task that owns `waiting`, `pending`, the current connection, and both
//! timers, and processes exactly one event to completion at a time. Nothing
//! here ever awaits mid-handler; the only suspension point is the
//! `tokio::select!` at the top of the loop, matching §5's "single-threaded
//! cooperative serializer" model.
//!
//! This generalizes the teacher's `buffered_client::run(client, rx)` loop,
//! which only ever had one message source (caller commands), to the four
//! event sources this state machine needs: callers, the reconnect
//! supervisor, the live connection's reply stream, and the node-down timer.

use crate::connector::{ConnectionHandle, ReaderEvent};
use crate::error::{DownReason, ReplyError, StopReason};
use crate::frame::Frame;
use crate::options::NodeClientOptions;
use crate::queue::Q;
use crate::reply::Reply;
use crate::status::{Status, StatusReporter};
use crate::supervisor::SupervisorEvent;
use bytes::Bytes;
use std::pin::Pin;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Sleep;
use tracing::{debug, instrument, trace, warn};

/// A command accepted from a caller: its already-encoded payload (so a
/// reconnect can resubmit the identical bytes) and the one-shot its result
/// is delivered through exactly once.
struct CommandEntry {
    payload: Bytes,
    reply_tx: oneshot::Sender<Reply>,
}

impl CommandEntry {
    fn fail(self, err: ReplyError) {
        // A dropped receiver means the caller already gave up (e.g. its
        // `command(timeout)` deadline fired); nothing left to do.
        let _ = self.reply_tx.send(Reply::Err(err));
    }
}

/// What a caller (or `NodeClient::stop`) sends into the core.
pub(crate) enum ClientMessage {
    Submit(Bytes, oneshot::Sender<Reply>),
    Stop(oneshot::Sender<()>),
}

struct CoreState {
    waiting: Q<CommandEntry>,
    pending: Q<CommandEntry>,
    connection: Option<ConnectionHandle>,
    frame_rx: Option<mpsc::UnboundedReceiver<ReaderEvent>>,
    cluster_id: Option<Bytes>,
    node_down: bool,
    node_down_timer: Option<Pin<Box<Sleep>>>,
    queue_full_event_sent: bool,
    status: StatusReporter,

    max_waiting: usize,
    max_pending: usize,
    queue_ok_level: usize,
    node_down_timeout: std::time::Duration,
}

impl CoreState {
    fn new(options: &NodeClientOptions) -> Self {
        CoreState {
            waiting: Q::new(),
            pending: Q::new(),
            connection: None,
            frame_rx: None,
            cluster_id: None,
            node_down: false,
            node_down_timer: None,
            queue_full_event_sent: false,
            status: StatusReporter::new(
                options.connection_opts.host.clone(),
                options.connection_opts.port,
                options.status_sink.clone(),
            ),
            max_waiting: options.max_waiting,
            max_pending: options.max_pending,
            queue_ok_level: options.queue_ok_level,
            node_down_timeout: options.node_down_timeout,
        }
    }

    fn handle_submit(&mut self, payload: Bytes, reply_tx: oneshot::Sender<Reply>) {
        if self.node_down {
            let _ = reply_tx.send(Reply::Err(ReplyError::NodeDown));
            return;
        }
        self.waiting.push_back(CommandEntry { payload, reply_tx });
        self.run_pipeline_driver();
    }

    /// The pipeline driver (§4.5): drains `waiting` into `pending` within the
    /// in-flight window, then enforces the overflow/hysteresis policy. Runs
    /// in a bounded loop (at most `max_pending` submissions and
    /// `waiting.len()` drops), so it always returns.
    fn run_pipeline_driver(&mut self) {
        if let Some(handle) = &self.connection {
            while self.pending.len() < self.max_pending {
                match self.waiting.pop_front() {
                    Some(entry) => {
                        handle.submit(entry.payload.clone());
                        self.pending.push_back(entry);
                    }
                    None => break,
                }
            }
        }

        let w = self.waiting.len();
        if w > self.max_waiting {
            if !self.queue_full_event_sent {
                self.status.emit(self.cluster_id.as_ref(), Status::QueueFull);
                self.queue_full_event_sent = true;
            }
            while self.waiting.len() > self.max_waiting {
                if let Some(entry) = self.waiting.pop_front() {
                    entry.fail(ReplyError::QueueOverflow);
                }
            }
        } else if w < self.queue_ok_level && self.queue_full_event_sent {
            self.status.emit(self.cluster_id.as_ref(), Status::QueueOk);
            self.queue_full_event_sent = false;
        }
    }

    fn handle_connected(
        &mut self,
        handle: ConnectionHandle,
        frame_rx: mpsc::UnboundedReceiver<ReaderEvent>,
        cluster_id: Option<Bytes>,
    ) {
        self.node_down_timer = None;
        self.connection = Some(handle);
        self.frame_rx = Some(frame_rx);
        self.cluster_id = cluster_id;
        self.node_down = false;
        self.status.emit(self.cluster_id.as_ref(), Status::ConnectionUp);
        self.run_pipeline_driver();
    }

    /// Common path for `connect_error` / `init_error` / `socket_closed`: move
    /// `pending` back to the front of `waiting` (§4.5's replay-order
    /// guarantee), drop the connection, and arm the node-down timer if one
    /// isn't already running.
    fn handle_disconnect(&mut self, reason: DownReason) {
        let mut reordered = std::mem::take(&mut self.pending);
        reordered.append(std::mem::take(&mut self.waiting));
        self.waiting = reordered;

        self.connection = None;
        self.frame_rx = None;

        self.run_pipeline_driver();
        self.status
            .emit(self.cluster_id.as_ref(), Status::ConnectionDown(reason));

        if self.node_down_timer.is_none() {
            debug!(timeout = ?self.node_down_timeout, "arming node-down timer");
            self.node_down_timer = Some(Box::pin(tokio::time::sleep(self.node_down_timeout)));
        }
    }

    fn handle_reply(&mut self, frame: Frame) {
        if let Some(entry) = self.pending.pop_front() {
            let _ = entry.reply_tx.send(Reply::Ok(frame));
        } else {
            warn!("reply arrived with nothing in pending, discarding");
        }
        self.run_pipeline_driver();
    }

    fn handle_node_down_timeout(&mut self) {
        warn!("node-down timeout elapsed, failing outstanding commands");
        self.node_down_timer = None;
        for entry in self.waiting.snapshot() {
            entry.fail(ReplyError::NodeDown);
        }
        for entry in self.pending.snapshot() {
            entry.fail(ReplyError::NodeDown);
        }
        self.node_down = true;
    }

    fn handle_stop(&mut self, reason: StopReason) {
        for entry in self.waiting.snapshot() {
            entry.fail(ReplyError::ClientStopped(reason));
        }
        for entry in self.pending.snapshot() {
            entry.fail(ReplyError::ClientStopped(reason));
        }
        self.status.emit(
            self.cluster_id.as_ref(),
            Status::ConnectionDown(DownReason::ClientStopped(reason)),
        );
    }
}

async fn recv_frame(frame_rx: &mut Option<mpsc::UnboundedReceiver<ReaderEvent>>) -> Option<ReaderEvent> {
    match frame_rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn recv_node_down_timeout(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

/// Runs the core event loop until stopped or every `NodeClient` handle is
/// dropped. `supervisor_task` is aborted on exit since the supervisor has no
/// way to notice on its own that the core is gone.
#[instrument(skip_all)]
pub(crate) async fn run(
    options: NodeClientOptions,
    mut client_rx: mpsc::UnboundedReceiver<ClientMessage>,
    mut supervisor_rx: mpsc::UnboundedReceiver<SupervisorEvent>,
    supervisor_task: tokio::task::JoinHandle<()>,
) {
    let mut state = CoreState::new(&options);

    loop {
        tokio::select! {
            msg = client_rx.recv() => {
                match msg {
                    Some(ClientMessage::Submit(payload, reply_tx)) => {
                        state.handle_submit(payload, reply_tx);
                    }
                    Some(ClientMessage::Stop(ack)) => {
                        state.handle_stop(StopReason::Normal);
                        let _ = ack.send(());
                        break;
                    }
                    None => {
                        trace!("all client handles dropped, stopping");
                        state.handle_stop(StopReason::Normal);
                        break;
                    }
                }
            }
            event = supervisor_rx.recv() => {
                match event {
                    Some(SupervisorEvent::ConnectError { reason }) => {
                        state.handle_disconnect(DownReason::ConnectError(reason));
                    }
                    Some(SupervisorEvent::InitError { errors, .. }) => {
                        state.handle_disconnect(DownReason::InitError(errors));
                    }
                    Some(SupervisorEvent::SocketClosed { reason, .. }) => {
                        state.handle_disconnect(DownReason::SocketClosed(reason));
                    }
                    Some(SupervisorEvent::Connected { handle, frame_rx, cluster_id }) => {
                        state.handle_connected(handle, frame_rx, cluster_id);
                    }
                    None => {
                        // The supervisor loops forever by design; it only
                        // disappears if the task panicked.
                        warn!("reconnect supervisor channel closed unexpectedly");
                    }
                }
            }
            event = recv_frame(&mut state.frame_rx) => {
                if let Some(ReaderEvent::Frame(frame)) = event {
                    state.handle_reply(frame);
                }
            }
            _ = recv_node_down_timeout(&mut state.node_down_timer) => {
                state.handle_node_down_timeout();
            }
        }
    }

    supervisor_task.abort();
}
