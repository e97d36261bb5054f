//! A single RESP2 or RESP3 value, plus the incremental parser used to read
//! one off a byte buffer that may not yet hold a complete frame.
//!
//! This is the wire format half of the `CommandCodec` collaborator: encoding
//! lives on [`crate::command::Command::into_frame`], decoding lives here.
//! Only RESP2 types are ever encoded (everything this client sends is a
//! plain command array), but a node running in RESP3 mode (the default,
//! negotiated by `HELLO 3` during the handshake) replies with the richer
//! RESP3 type set, so `parse`/`check` have to understand both.

use bytes::{BufMut, Buf, Bytes, BytesMut};
use std::convert::TryInto;
use std::fmt;
use std::io::Cursor;
use std::num::TryFromIntError;
use std::string::FromUtf8Error;

/// A value in the Redis serialization protocol.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Simple(String),
    Error(String),
    Integer(u64),
    Bulk(Bytes),
    Null,
    Array(Vec<Frame>),
    /// RESP3 map (`%`): alternating key/value pairs, kept as a flat list of
    /// `(key, value)` pairs in wire order.
    Map(Vec<(Frame, Frame)>),
    /// RESP3 set (`~`). Encoded and parsed exactly like an array; kept as a
    /// distinct variant only to preserve what the server actually sent.
    Set(Vec<Frame>),
    /// RESP3 double (`,`), e.g. the score replies of sorted-set commands.
    Double(f64),
    /// RESP3 boolean (`#`).
    Boolean(bool),
    /// RESP3 big number (`(`), kept as its decimal text since it may exceed
    /// `u64`/`i64` range.
    BigNumber(String),
    /// RESP3 verbatim string (`=`): a three-byte format marker (`txt`,
    /// `mkd`, ...) plus the payload.
    Verbatim(String, Bytes),
    /// RESP3 out-of-band push message (`>`). Structurally an array; kept
    /// distinct so a caller can tell a push from a reply if it ever reads
    /// one off the same stream.
    Push(Vec<Frame>),
}

#[derive(Debug)]
pub enum Error {
    /// Not enough data has been buffered yet to parse a whole frame.
    Incomplete,
    /// The buffered bytes don't form a valid frame.
    Other(crate::Error),
}

impl Frame {
    pub(crate) fn array() -> Frame {
        Frame::Array(vec![])
    }

    /// Pushes a bulk string entry. Panics if `self` isn't `Array`.
    pub(crate) fn push_bulk(&mut self, bytes: Bytes) {
        match self {
            Frame::Array(vec) => vec.push(Frame::Bulk(bytes)),
            _ => panic!("not an array frame"),
        }
    }

    pub(crate) fn push_int(&mut self, value: u64) {
        match self {
            Frame::Array(vec) => vec.push(Frame::Integer(value)),
            _ => panic!("not an array frame"),
        }
    }

    /// Checks whether `src` contains a complete frame, without allocating the
    /// parsed representation. Used to decide whether to keep reading from the
    /// socket before paying for a real parse.
    pub fn check(src: &mut Cursor<&[u8]>) -> Result<(), Error> {
        match get_u8(src)? {
            b'+' => {
                get_line(src)?;
                Ok(())
            }
            b'-' => {
                get_line(src)?;
                Ok(())
            }
            b':' => {
                let _ = get_decimal(src)?;
                Ok(())
            }
            b'$' => {
                if b'-' == peek_u8(src)? {
                    // skip the "-1\r\n" null bulk marker
                    skip(src, 4)
                } else {
                    let len: usize = get_decimal(src)?.try_into()?;
                    skip(src, len + 2)
                }
            }
            b'*' | b'~' | b'>' => {
                let len = get_decimal(src)?;
                for _ in 0..len {
                    Frame::check(src)?;
                }
                Ok(())
            }
            b'%' => {
                let len = get_decimal(src)?;
                for _ in 0..len {
                    Frame::check(src)?;
                    Frame::check(src)?;
                }
                Ok(())
            }
            b'_' => get_line(src).map(|_| ()),
            b'#' => get_line(src).map(|_| ()),
            b',' => get_line(src).map(|_| ()),
            b'(' => get_line(src).map(|_| ()),
            b'=' => {
                let len: usize = get_decimal(src)?.try_into()?;
                skip(src, len + 2)
            }
            actual => Err(format!("protocol error: invalid frame type byte `{actual}`").into()),
        }
    }

    /// Parses a frame assuming `check` has already confirmed one is present.
    pub fn parse(src: &mut Cursor<&[u8]>) -> Result<Frame, Error> {
        match get_u8(src)? {
            b'+' => {
                let line = get_line(src)?.to_vec();
                Ok(Frame::Simple(String::from_utf8(line)?))
            }
            b'-' => {
                let line = get_line(src)?.to_vec();
                Ok(Frame::Error(String::from_utf8(line)?))
            }
            b':' => Ok(Frame::Integer(get_decimal(src)?)),
            b'$' => {
                if b'-' == peek_u8(src)? {
                    let line = get_line(src)?;
                    if line != b"-1" {
                        return Err("protocol error; invalid frame format".into());
                    }
                    Ok(Frame::Null)
                } else {
                    let len: usize = get_decimal(src)?.try_into()?;
                    let n = len + 2;
                    if src.remaining() < n {
                        return Err(Error::Incomplete);
                    }
                    let data = Bytes::copy_from_slice(&src.chunk()[..len]);
                    skip(src, n)?;
                    Ok(Frame::Bulk(data))
                }
            }
            b'*' => {
                let len: usize = get_decimal(src)?.try_into()?;
                let mut out = Vec::with_capacity(len);
                for _ in 0..len {
                    out.push(Frame::parse(src)?);
                }
                Ok(Frame::Array(out))
            }
            b'~' => {
                let len: usize = get_decimal(src)?.try_into()?;
                let mut out = Vec::with_capacity(len);
                for _ in 0..len {
                    out.push(Frame::parse(src)?);
                }
                Ok(Frame::Set(out))
            }
            b'>' => {
                let len: usize = get_decimal(src)?.try_into()?;
                let mut out = Vec::with_capacity(len);
                for _ in 0..len {
                    out.push(Frame::parse(src)?);
                }
                Ok(Frame::Push(out))
            }
            b'%' => {
                let len: usize = get_decimal(src)?.try_into()?;
                let mut out = Vec::with_capacity(len);
                for _ in 0..len {
                    let key = Frame::parse(src)?;
                    let value = Frame::parse(src)?;
                    out.push((key, value));
                }
                Ok(Frame::Map(out))
            }
            b'_' => {
                let line = get_line(src)?;
                if !line.is_empty() {
                    return Err("protocol error; invalid frame format".into());
                }
                Ok(Frame::Null)
            }
            b'#' => {
                let line = get_line(src)?;
                match line {
                    b"t" => Ok(Frame::Boolean(true)),
                    b"f" => Ok(Frame::Boolean(false)),
                    _ => Err("protocol error; invalid frame format".into()),
                }
            }
            b',' => {
                let line = get_line(src)?.to_vec();
                let text =
                    String::from_utf8(line).map_err(|_| Error::from("protocol error; invalid frame format"))?;
                let value: f64 = text
                    .parse()
                    .map_err(|_| Error::from("protocol error; invalid frame format"))?;
                Ok(Frame::Double(value))
            }
            b'(' => {
                let line = get_line(src)?.to_vec();
                Ok(Frame::BigNumber(String::from_utf8(line)?))
            }
            b'=' => {
                let len: usize = get_decimal(src)?.try_into()?;
                let n = len + 2;
                if src.remaining() < n {
                    return Err(Error::Incomplete);
                }
                if len < 4 || src.chunk()[3] != b':' {
                    return Err("protocol error; invalid frame format".into());
                }
                let format = String::from_utf8(src.chunk()[..3].to_vec())?;
                let data = Bytes::copy_from_slice(&src.chunk()[4..len]);
                skip(src, n)?;
                Ok(Frame::Verbatim(format, data))
            }
            actual => Err(format!("protocol error: invalid frame type byte `{actual}`").into()),
        }
    }
}

/// Encodes a frame into RESP wire bytes. The submission path for outgoing
/// commands: where the teacher's `Connection::write_frame` wrote straight to
/// a buffered `TcpStream`, this builds the same bytes into a `BytesMut` so
/// they can be handed to a `ConnectionHandle::submit` instead.
pub(crate) fn encode(frame: &Frame) -> Bytes {
    let mut buf = BytesMut::new();
    encode_into(frame, &mut buf);
    buf.freeze()
}

fn encode_into(frame: &Frame, buf: &mut BytesMut) {
    match frame {
        Frame::Array(entries) => {
            buf.put_u8(b'*');
            put_decimal(buf, entries.len() as u64);
            for entry in entries {
                encode_value(entry, buf);
            }
        }
        other => encode_value(other, buf),
    }
}

fn encode_value(frame: &Frame, buf: &mut BytesMut) {
    match frame {
        Frame::Simple(val) => {
            buf.put_u8(b'+');
            buf.put_slice(val.as_bytes());
            buf.put_slice(b"\r\n");
        }
        Frame::Error(val) => {
            buf.put_u8(b'-');
            buf.put_slice(val.as_bytes());
            buf.put_slice(b"\r\n");
        }
        Frame::Integer(val) => {
            buf.put_u8(b':');
            put_decimal(buf, *val);
        }
        Frame::Null => buf.put_slice(b"$-1\r\n"),
        Frame::Bulk(val) => {
            buf.put_u8(b'$');
            put_decimal(buf, val.len() as u64);
            buf.put_slice(val);
            buf.put_slice(b"\r\n");
        }
        // Nested arrays aren't needed for the commands this crate encodes.
        Frame::Array(_) => unreachable!("nested arrays are not encoded"),
        // RESP3 types are reply-only: this client never sends a Map, Set,
        // Double, Boolean, BigNumber, Verbatim string, or Push.
        Frame::Map(_)
        | Frame::Set(_)
        | Frame::Double(_)
        | Frame::Boolean(_)
        | Frame::BigNumber(_)
        | Frame::Verbatim(_, _)
        | Frame::Push(_) => unreachable!("RESP3 reply types are never encoded outbound"),
    }
}

fn put_decimal(buf: &mut BytesMut, val: u64) {
    use std::io::Write;
    let mut tmp = [0u8; 20];
    let mut cursor = Cursor::new(&mut tmp[..]);
    write!(&mut cursor, "{val}").unwrap();
    let pos = cursor.position() as usize;
    buf.put_slice(&tmp[..pos]);
    buf.put_slice(b"\r\n");
}

impl PartialEq<&str> for Frame {
    fn eq(&self, other: &&str) -> bool {
        match self {
            Frame::Simple(s) => s.eq(other),
            Frame::Bulk(s) => s.eq(other),
            _ => false,
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Simple(response) => response.fmt(f),
            Frame::Error(msg) => write!(f, "error: {msg}"),
            Frame::Integer(num) => num.fmt(f),
            Frame::Bulk(msg) => match std::str::from_utf8(msg) {
                Ok(string) => string.fmt(f),
                Err(_) => write!(f, "{msg:?}"),
            },
            Frame::Null => "(nil)".fmt(f),
            Frame::Array(parts) | Frame::Set(parts) | Frame::Push(parts) => {
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    part.fmt(f)?;
                }
                Ok(())
            }
            Frame::Map(entries) => {
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{key} => {value}")?;
                }
                Ok(())
            }
            Frame::Double(val) => val.fmt(f),
            Frame::Boolean(val) => val.fmt(f),
            Frame::BigNumber(val) => val.fmt(f),
            Frame::Verbatim(_, data) => match std::str::from_utf8(data) {
                Ok(string) => string.fmt(f),
                Err(_) => write!(f, "{data:?}"),
            },
        }
    }
}

fn peek_u8(src: &mut Cursor<&[u8]>) -> Result<u8, Error> {
    if !src.has_remaining() {
        return Err(Error::Incomplete);
    }
    Ok(src.chunk()[0])
}

fn get_u8(src: &mut Cursor<&[u8]>) -> Result<u8, Error> {
    if !src.has_remaining() {
        return Err(Error::Incomplete);
    }
    Ok(src.get_u8())
}

fn skip(src: &mut Cursor<&[u8]>, n: usize) -> Result<(), Error> {
    if src.remaining() < n {
        return Err(Error::Incomplete);
    }
    src.advance(n);
    Ok(())
}

fn get_decimal(src: &mut Cursor<&[u8]>) -> Result<u64, Error> {
    use atoi::atoi;
    let line = get_line(src)?;
    atoi::<u64>(line).ok_or_else(|| "protocol error: invalid frame format".into())
}

/// Returns the bytes up to (and consumes past) the next `\r\n`.
fn get_line<'a>(src: &mut Cursor<&'a [u8]>) -> Result<&'a [u8], Error> {
    let start = src.position() as usize;
    let end = src.get_ref().len().saturating_sub(1);
    for i in start..end {
        if src.get_ref()[i] == b'\r' && src.get_ref()[i + 1] == b'\n' {
            src.set_position((i + 2) as u64);
            return Ok(&src.get_ref()[start..i]);
        }
    }
    Err(Error::Incomplete)
}

impl From<String> for Error {
    fn from(value: String) -> Error {
        Error::Other(value.into())
    }
}

impl From<&str> for Error {
    fn from(value: &str) -> Error {
        Error::Other(value.into())
    }
}

impl From<FromUtf8Error> for Error {
    fn from(_value: FromUtf8Error) -> Error {
        "protocol error; invalid frame format".into()
    }
}

impl From<TryFromIntError> for Error {
    fn from(_value: TryFromIntError) -> Error {
        "protocol error; invalid frame format".into()
    }
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Incomplete => "stream ended early".fmt(f),
            Error::Other(err) => err.fmt(f),
        }
    }
}
