//! The `CommandCodec` collaborator (C8): turns a typed command into the RESP
//! bytes this crate's `Connection` submits on the wire.
//!
//! Only a handful of commands get their own variant; `Command::Raw` is the
//! escape hatch a higher-level cluster client would use to forward any argv
//! it already knows how to build, the same way the teacher's `Frame::array`
//! plus `push_bulk` builders are used by each of its `cmd::*::into_frame`
//! methods.

use crate::frame::Frame;
use bytes::Bytes;
use std::time::Duration;

/// A command accepted from a caller, already reduced to the handful of
/// shapes this crate knows how to encode.
#[derive(Clone, Debug)]
pub enum Command {
    Ping(Option<Bytes>),
    Get(String),
    Set {
        key: String,
        value: Bytes,
        expire: Option<Duration>,
    },
    /// Arbitrary argv, encoded as-is. Used by callers (e.g. an enclosing
    /// cluster client) that already have a serialized command and only need
    /// this crate's queueing and reconnect behavior.
    Raw(Vec<Bytes>),
}

impl Command {
    pub fn ping(msg: Option<Bytes>) -> Command {
        Command::Ping(msg)
    }

    pub fn get(key: impl Into<String>) -> Command {
        Command::Get(key.into())
    }

    pub fn set(key: impl Into<String>, value: Bytes, expire: Option<Duration>) -> Command {
        Command::Set {
            key: key.into(),
            value,
            expire,
        }
    }

    pub fn raw(argv: Vec<Bytes>) -> Command {
        Command::Raw(argv)
    }

    /// Encodes the command as a RESP array frame, ready to be handed to a
    /// `Connection::submit`.
    pub(crate) fn into_frame(self) -> Frame {
        match self {
            Command::Ping(msg) => {
                let mut frame = Frame::array();
                frame.push_bulk(Bytes::from_static(b"PING"));
                if let Some(msg) = msg {
                    frame.push_bulk(msg);
                }
                frame
            }
            Command::Get(key) => {
                let mut frame = Frame::array();
                frame.push_bulk(Bytes::from_static(b"GET"));
                frame.push_bulk(Bytes::from(key.into_bytes()));
                frame
            }
            Command::Set { key, value, expire } => {
                let mut frame = Frame::array();
                frame.push_bulk(Bytes::from_static(b"SET"));
                frame.push_bulk(Bytes::from(key.into_bytes()));
                frame.push_bulk(value);
                if let Some(ms) = expire {
                    // PX rather than EX: finer precision, and callers already
                    // think in milliseconds when they hold a `Duration`.
                    frame.push_bulk(Bytes::from_static(b"PX"));
                    frame.push_int(ms.as_millis() as u64);
                }
                frame
            }
            Command::Raw(argv) => {
                let mut frame = Frame::array();
                for arg in argv {
                    frame.push_bulk(arg);
                }
                frame
            }
        }
    }
}

/// Builds the deterministic handshake batch described in §4.3: `CLUSTER
/// MYID` first (if requested), then `HELLO 3` (if requested). Returns an
/// empty vec when neither applies, meaning the handshake completes with no
/// bytes written.
pub(crate) fn handshake_batch(use_cluster_id: bool, resp_version: u8) -> Vec<Frame> {
    let mut batch = Vec::with_capacity(2);
    if use_cluster_id {
        let mut frame = Frame::array();
        frame.push_bulk(Bytes::from_static(b"CLUSTER"));
        frame.push_bulk(Bytes::from_static(b"MYID"));
        batch.push(frame);
    }
    if resp_version == 3 {
        let mut frame = Frame::array();
        frame.push_bulk(Bytes::from_static(b"HELLO"));
        frame.push_bulk(Bytes::from_static(b"3"));
        batch.push(frame);
    }
    batch
}
