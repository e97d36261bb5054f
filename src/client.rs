//! The public entry point (§6): `NodeClient` is the cloneable handle callers
//! hold. It owns nothing but a channel to the core task, all state lives in
//! `core::run`'s `CoreState`, never here.

use crate::command::Command;
use crate::connector::{Connector, TcpConnector};
use crate::core::{self, ClientMessage};
use crate::error::ConfigError;
use crate::frame;
use crate::options::NodeClientOptions;
use crate::reply::Reply;
use crate::supervisor;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::instrument;

/// A handle to one running node client. Cloning it is cheap (an `mpsc`
/// sender clone) and every clone talks to the same core task, the same way
/// the teacher's `BufferedClient` handles all share one connection task.
#[derive(Clone)]
pub struct NodeClient {
    client_tx: mpsc::UnboundedSender<ClientMessage>,
}

impl NodeClient {
    /// Starts a node client against `options.connection_opts`'s endpoint,
    /// spawning the reconnect supervisor and the core event loop as
    /// independent Tokio tasks. Returns a `ConfigError` without touching the
    /// network if the options are internally inconsistent.
    pub async fn start(options: NodeClientOptions) -> Result<NodeClient, ConfigError> {
        Self::start_with_connector(options, Arc::new(TcpConnector)).await
    }

    /// Same as [`Self::start`], but with an explicit [`Connector`], the
    /// seam a caller swaps in a non-TCP transport (or, as integration tests
    /// do, an in-memory socket) through.
    pub async fn start_with_connector(
        options: NodeClientOptions,
        connector: Arc<dyn Connector>,
    ) -> Result<NodeClient, ConfigError> {
        options.validate()?;

        let (client_tx, client_rx) = mpsc::unbounded_channel();
        let (supervisor_tx, supervisor_rx) = mpsc::unbounded_channel();

        let host = options.connection_opts.host.clone();
        let port = options.connection_opts.port;
        let use_cluster_id = options.use_cluster_id;
        let resp_version = options.resp_version;
        let reconnect_wait = options.reconnect_wait;

        let supervisor_task = tokio::spawn(supervisor::run(
            connector,
            host,
            port,
            use_cluster_id,
            resp_version,
            reconnect_wait,
            supervisor_tx,
        ));

        tokio::spawn(core::run(options, client_rx, supervisor_rx, supervisor_task));

        Ok(NodeClient { client_tx })
    }

    /// Submits a command and awaits its reply, giving up after `timeout`.
    ///
    /// A timed-out command is *not* retracted from the pipeline: per §5,
    /// the client has no per-command cancellation, so the command still
    /// occupies a slot until it eventually gets a reply (or is dropped by
    /// overflow/node-down/stop); this call just stops waiting for it.
    #[instrument(skip(self, cmd))]
    pub async fn command(&self, cmd: Command, timeout: Duration) -> Reply {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_async(cmd, reply_tx);
        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(reply)) => reply,
            // Either the timeout elapsed, or the core dropped the sender
            // without replying (only happens if it panicked); both are
            // presented to a deadline-bound caller the same way.
            Ok(Err(_)) | Err(_) => Reply::Err(crate::error::ReplyError::NodeDown),
        }
    }

    /// Submits a command without waiting; `reply_tx` is completed exactly
    /// once, later, on the core's own schedule.
    pub fn command_async(&self, cmd: Command, reply_tx: oneshot::Sender<Reply>) {
        let payload = frame::encode(&cmd.into_frame());
        // The core task only goes away after `stop()`. A send failure here
        // means that already happened, so answer as if this command had
        // been in flight when it did.
        if let Err(mpsc::error::SendError(ClientMessage::Submit(_, reply_tx))) =
            self.client_tx.send(ClientMessage::Submit(payload, reply_tx))
        {
            let _ = reply_tx.send(Reply::Err(crate::error::ReplyError::ClientStopped(
                crate::error::StopReason::Normal,
            )));
        }
    }

    /// Stops the client: every outstanding command gets
    /// `Reply::Err(ClientStopped)`, a final `connection_down` status is
    /// emitted, and both background tasks are torn down. A no-op if the
    /// client already stopped.
    pub async fn stop(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.client_tx.send(ClientMessage::Stop(ack_tx)).is_err() {
            return;
        }
        let _ = ack_rx.await;
    }
}
