//! A single-node Redis client state machine: multiplexes commands from many
//! callers onto one TCP connection, survives reconnects, and enforces
//! bounded backpressure with FIFO reply ordering. Meant to sit as the
//! per-node leaf underneath a higher-level Redis Cluster client, one
//! instance per `(host, port)` endpoint.
//!
//! The entry point is [`NodeClient`]; [`NodeClientOptions`] configures it.

pub mod client;
pub use client::NodeClient;

pub mod command;
pub use command::Command;

pub mod options;
pub use options::{ConnectionOpts, NodeClientOptions};

pub mod reply;
pub use reply::Reply;

pub mod status;
pub use status::{Status, StatusEvent, StatusSink};

pub mod error;
pub use error::{ConfigError, DownReason, ReplyError, StopReason};

pub mod frame;
pub use frame::Frame;

pub mod connector;
pub use connector::{AsyncStream, Connector, TcpConnector};

pub(crate) mod core;
pub(crate) mod handshake;
pub(crate) mod queue;
pub(crate) mod supervisor;

/// Default port a Redis node listens on.
pub const DEFAULT_PORT: u16 = 6379;

/// Error returned by the transport/protocol layer (connection reset, a
/// malformed frame). Kept as a boxed `dyn Error` rather than a closed enum
/// because these are opaque I/O failures a caller can't usefully match on;
/// the pipeline's own closed error surface is [`ReplyError`] instead.
pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// A specialized `Result` for transport/protocol operations.
pub type Result<T> = std::result::Result<T, Error>;
