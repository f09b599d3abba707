//! Incremental RESP stream decoder.
//!
//! One parser per connection, fed by that connection's read half. Each call
//! to [`RespParser::next`] decodes one frame:
//!
//! - `*n` opens a multi-bulk body: n repetitions of a `$len` header line
//!   followed by exactly len+2 payload bytes ending in CRLF.
//! - `$len` at top level is a single bulk string (`$-1` the null bulk).
//! - `+`, `-`, `:` are single-line frames.
//! - Any other first byte is treated as an inline command and split on
//!   whitespace into a multi-bulk.
//!
//! A protocol error resets the frame state and is reported once; parsing
//! resumes at the next line, so a malformed frame does not poison a pipeline
//! whose framing recovers. I/O errors and EOF end the stream.

use super::{Reply, RespError};
use bytes::Bytes;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// Refuse degenerate headers before allocating.
const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;
const MAX_MULTI_BULK_LEN: i64 = 1024 * 1024;

pub struct RespParser<R> {
    reader: R,
    closed: bool,
}

enum ReadErr {
    Eof,
    Io(std::io::Error),
    Protocol(String),
}

impl ReadErr {
    fn protocol(frame: &[u8]) -> ReadErr {
        ReadErr::Protocol(String::from_utf8_lossy(frame).into_owned())
    }
}

impl<R: AsyncBufRead + Unpin> RespParser<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            closed: false,
        }
    }

    /// Decode the next frame. `None` means the stream ended. A protocol error
    /// is recoverable: the caller may keep polling. After an I/O error the
    /// next poll returns `None`.
    pub async fn next(&mut self) -> Option<Result<Reply, RespError>> {
        if self.closed {
            return None;
        }
        match self.parse_frame().await {
            Ok(reply) => Some(Ok(reply)),
            Err(ReadErr::Eof) => {
                self.closed = true;
                None
            }
            Err(ReadErr::Io(e)) => {
                self.closed = true;
                Some(Err(RespError::Io(e)))
            }
            Err(ReadErr::Protocol(frame)) => Some(Err(RespError::Protocol(frame))),
        }
    }

    async fn parse_frame(&mut self) -> Result<Reply, ReadErr> {
        let header = self.read_header_line().await?;
        match header.first() {
            Some(b'*') => self.parse_multi_bulk(&header).await,
            Some(b'$') => self.parse_single_bulk(&header).await,
            Some(b'+') => Ok(Reply::Status(text_of(&header[1..]))),
            Some(b'-') => Ok(Reply::Error(text_of(&header[1..]))),
            Some(b':') => match parse_int(&header[1..]) {
                Some(n) => Ok(Reply::Integer(n)),
                None => Err(ReadErr::protocol(&header)),
            },
            _ => parse_inline(&header),
        }
    }

    /// A header line: bytes up to `\n`, which must be preceded by `\r`. The
    /// returned line excludes the CRLF.
    async fn read_header_line(&mut self) -> Result<Vec<u8>, ReadErr> {
        let mut line = Vec::new();
        let n = self
            .reader
            .read_until(b'\n', &mut line)
            .await
            .map_err(ReadErr::Io)?;
        if n == 0 {
            return Err(ReadErr::Eof);
        }
        if line.len() < 2 || line[line.len() - 2] != b'\r' {
            return Err(ReadErr::protocol(&line));
        }
        line.truncate(line.len() - 2);
        Ok(line)
    }

    /// A length-prefixed payload: exactly `len + 2` bytes, the last two being
    /// CRLF.
    async fn read_payload(&mut self, len: usize) -> Result<Bytes, ReadErr> {
        let mut buf = vec![0u8; len + 2];
        if let Err(e) = self.reader.read_exact(&mut buf).await {
            return Err(match e.kind() {
                std::io::ErrorKind::UnexpectedEof => ReadErr::Eof,
                _ => ReadErr::Io(e),
            });
        }
        if &buf[len..] != b"\r\n" {
            return Err(ReadErr::protocol(&buf));
        }
        buf.truncate(len);
        Ok(Bytes::from(buf))
    }

    async fn parse_multi_bulk(&mut self, header: &[u8]) -> Result<Reply, ReadErr> {
        let expected = match parse_int(&header[1..]) {
            Some(n) if n <= MAX_MULTI_BULK_LEN => n,
            _ => return Err(ReadErr::protocol(header)),
        };
        match expected {
            0 => return Ok(Reply::EmptyMultiBulk),
            -1 => return Ok(Reply::NullMultiBulk),
            n if n < 0 => return Err(ReadErr::protocol(header)),
            _ => {}
        }

        let mut args = Vec::with_capacity(expected as usize);
        for _ in 0..expected {
            let line = self.read_header_line().await?;
            if line.first() != Some(&b'$') {
                return Err(ReadErr::protocol(&line));
            }
            let len = match parse_int(&line[1..]) {
                Some(len) if len <= MAX_BULK_LEN => len,
                _ => return Err(ReadErr::protocol(&line)),
            };
            if len < 0 {
                // negative body lengths carry no payload; record empty
                args.push(Bytes::new());
                continue;
            }
            args.push(self.read_payload(len as usize).await?);
        }
        Ok(Reply::MultiBulk(args))
    }

    async fn parse_single_bulk(&mut self, header: &[u8]) -> Result<Reply, ReadErr> {
        let len = match parse_int(&header[1..]) {
            Some(len) if len <= MAX_BULK_LEN => len,
            _ => return Err(ReadErr::protocol(header)),
        };
        match len {
            -1 => Ok(Reply::NullBulk),
            n if n < 0 => Err(ReadErr::protocol(header)),
            n => Ok(Reply::Bulk(self.read_payload(n as usize).await?)),
        }
    }
}

/// Inline fallback: a bare line is split on whitespace and treated as a
/// command, so `PING\r\n` works from a plain telnet session.
fn parse_inline(line: &[u8]) -> Result<Reply, ReadErr> {
    let text = String::from_utf8_lossy(line);
    let args: Vec<Bytes> = text
        .split_ascii_whitespace()
        .map(|word| Bytes::copy_from_slice(word.as_bytes()))
        .collect();
    if args.is_empty() {
        return Err(ReadErr::protocol(line));
    }
    Ok(Reply::MultiBulk(args))
}

fn parse_int(bytes: &[u8]) -> Option<i64> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

fn text_of(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
