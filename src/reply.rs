//! The result a caller gets back for a single command.

use crate::error::ReplyError;
use crate::frame::Frame;

/// Either the raw reply frame the server sent back, or one of the three
/// pipeline-level failures from §7. A RESP error reply (`-ERR ...`) is
/// *not* a `Reply::Err`; it's delivered as `Ok(Frame::Error(_))`, since only
/// queueing/connection-lifecycle failures are pipeline errors; a
/// server-reported error is still a successful round trip as far as the
/// pipeline is concerned.
#[derive(Debug)]
pub enum Reply {
    Ok(Frame),
    Err(ReplyError),
}
