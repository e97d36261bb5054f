//! Error types visible to callers of the node client.
//!
//! Transport- and protocol-level failures (a bad frame, a reset socket) stay
//! boxed behind [`crate::Error`], the same catch-all the teacher crate used for
//! its `Connection`/`Frame` plumbing. The pipeline's own error surface is a
//! small, closed set that callers are expected to match on, so it gets a
//! `thiserror` enum instead.

use std::fmt;

/// Why the client transitioned to (or reports being in) a down state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DownReason {
    /// The reconnect supervisor's `connect` call failed.
    ConnectError(String),
    /// The handshake batch (`CLUSTER MYID` / `HELLO 3`) came back with errors.
    InitError(Vec<String>),
    /// The socket closed, with the transport's own description of why.
    SocketClosed(String),
    /// The client was stopped while commands were still outstanding.
    ClientStopped(StopReason),
}

impl fmt::Display for DownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownReason::ConnectError(r) => write!(f, "connect error: {r}"),
            DownReason::InitError(errs) => write!(f, "handshake error: {}", errs.join(", ")),
            DownReason::SocketClosed(r) => write!(f, "socket closed: {r}"),
            DownReason::ClientStopped(r) => write!(f, "client stopped: {r}"),
        }
    }
}

/// Why a client was stopped. `Normal` covers an explicit `stop()` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    Normal,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Normal => write!(f, "normal"),
        }
    }
}

/// The error half of a command [`crate::Reply`].
///
/// These are the only failures a caller ever sees from a command: everything
/// transport-related is folded into one of these three kinds rather than
/// leaking connection internals into the per-command result.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ReplyError {
    /// The waiting queue exceeded `max_waiting` and this command was the
    /// oldest one still unsent, so it was dropped to make room.
    #[error("waiting queue overflowed, command dropped")]
    QueueOverflow,
    /// The node has been unreachable for longer than `node_down_timeout`.
    #[error("node is down")]
    NodeDown,
    /// The client was stopped with this command still outstanding.
    #[error("client stopped: {0}")]
    ClientStopped(StopReason),
}

/// Fatal configuration problems caught at `start()`, before any socket is
/// opened. Analogous to the teacher's "unknown option at init is a fatal
/// configuration error"; these never surface as a per-command `ReplyError`.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("queue_ok_level ({queue_ok_level}) must be less than max_waiting ({max_waiting})")]
    QueueOkLevelNotBelowMaxWaiting {
        queue_ok_level: usize,
        max_waiting: usize,
    },
    #[error("max_pending must be at least 1")]
    MaxPendingZero,
    #[error("resp_version must be 2 or 3, got {0}")]
    InvalidRespVersion(u8),
}
