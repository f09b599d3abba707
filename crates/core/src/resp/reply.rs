//! The closed set of reply kinds and their wire encodings.
//!
//! | kind             | wire                          |
//! |------------------|-------------------------------|
//! | Status           | `+text\r\n`                   |
//! | Error            | `-text\r\n`                   |
//! | Integer          | `:n\r\n`                      |
//! | Bulk             | `$len\r\n<bytes>\r\n`         |
//! | NullBulk         | `$-1\r\n`                     |
//! | MultiBulk        | `*n\r\n` + n bulk encodings   |
//! | EmptyMultiBulk   | `*0\r\n`                      |
//! | NullMultiBulk    | `*-1\r\n`                     |
//! | MultiRaw         | `*n\r\n` + n full encodings   |
//! | NoReply          | nothing                       |
//!
//! `MultiRaw` carries already-typed replies and is how EXEC returns its
//! result vector (and MGET its nullable value row).

use bytes::{BufMut, Bytes, BytesMut};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Status(String),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    NullBulk,
    MultiBulk(Vec<Bytes>),
    EmptyMultiBulk,
    NullMultiBulk,
    MultiRaw(Vec<Reply>),
    NoReply,
}

impl Reply {
    pub fn ok() -> Reply {
        Reply::Status("OK".to_string())
    }

    pub fn pong() -> Reply {
        Reply::Status("PONG".to_string())
    }

    pub fn queued() -> Reply {
        Reply::Status("QUEUED".to_string())
    }

    pub fn bulk(value: impl Into<Bytes>) -> Reply {
        Reply::Bulk(value.into())
    }

    pub fn err(message: impl Into<String>) -> Reply {
        Reply::Error(message.into())
    }

    /// Generic reply for contained panics.
    pub fn unknown_err() -> Reply {
        Reply::err("ERR unknown")
    }

    pub fn unknown_command_err(name: &str) -> Reply {
        Reply::err(format!("ERR unknown command '{name}'"))
    }

    pub fn arg_num_err(name: &str) -> Reply {
        Reply::err(format!("ERR wrong number of arguments for '{name}' command"))
    }

    pub fn wrong_type_err() -> Reply {
        Reply::err("WRONGTYPE Operation against a key holding the wrong kind of value")
    }

    pub fn not_integer_err() -> Reply {
        Reply::err("ERR value is not an integer or out of range")
    }

    pub fn syntax_err() -> Reply {
        Reply::err("ERR syntax error")
    }

    /// The classifier EXEC uses to decide whether a queued command aborted
    /// the transaction: exactly the replies whose wire form starts with `-`.
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64);
        self.encode(&mut buf);
        buf.freeze()
    }

    fn encode(&self, buf: &mut BytesMut) {
        let mut itoa_buf = itoa::Buffer::new();
        match self {
            Reply::Status(text) => {
                buf.put_u8(b'+');
                buf.put_slice(text.as_bytes());
                buf.put_slice(b"\r\n");
            }
            Reply::Error(text) => {
                buf.put_u8(b'-');
                buf.put_slice(text.as_bytes());
                buf.put_slice(b"\r\n");
            }
            Reply::Integer(n) => {
                buf.put_u8(b':');
                buf.put_slice(itoa_buf.format(*n).as_bytes());
                buf.put_slice(b"\r\n");
            }
            Reply::Bulk(bytes) => {
                encode_bulk(buf, bytes);
            }
            Reply::NullBulk => buf.put_slice(b"$-1\r\n"),
            Reply::MultiBulk(items) => {
                buf.put_u8(b'*');
                buf.put_slice(itoa_buf.format(items.len()).as_bytes());
                buf.put_slice(b"\r\n");
                for item in items {
                    encode_bulk(buf, item);
                }
            }
            Reply::EmptyMultiBulk => buf.put_slice(b"*0\r\n"),
            Reply::NullMultiBulk => buf.put_slice(b"*-1\r\n"),
            Reply::MultiRaw(items) => {
                buf.put_u8(b'*');
                buf.put_slice(itoa_buf.format(items.len()).as_bytes());
                buf.put_slice(b"\r\n");
                for item in items {
                    item.encode(buf);
                }
            }
            Reply::NoReply => {}
        }
    }
}

fn encode_bulk(buf: &mut BytesMut, bytes: &[u8]) {
    let mut itoa_buf = itoa::Buffer::new();
    buf.put_u8(b'$');
    buf.put_slice(itoa_buf.format(bytes.len()).as_bytes());
    buf.put_slice(b"\r\n");
    buf.put_slice(bytes);
    buf.put_slice(b"\r\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_kinds_are_bit_exact() {
        assert_eq!(&Reply::ok().to_bytes()[..], b"+OK\r\n");
        assert_eq!(&Reply::pong().to_bytes()[..], b"+PONG\r\n");
        assert_eq!(&Reply::queued().to_bytes()[..], b"+QUEUED\r\n");
        assert_eq!(&Reply::err("ERR boom").to_bytes()[..], b"-ERR boom\r\n");
        assert_eq!(&Reply::Integer(-42).to_bytes()[..], b":-42\r\n");
        assert_eq!(&Reply::NullBulk.to_bytes()[..], b"$-1\r\n");
        assert_eq!(&Reply::EmptyMultiBulk.to_bytes()[..], b"*0\r\n");
        assert_eq!(&Reply::NullMultiBulk.to_bytes()[..], b"*-1\r\n");
        assert_eq!(&Reply::NoReply.to_bytes()[..], b"");
    }

    #[test]
    fn bulk_is_length_prefixed() {
        assert_eq!(&Reply::bulk("hello").to_bytes()[..], b"$5\r\nhello\r\n");
        assert_eq!(&Reply::bulk("").to_bytes()[..], b"$0\r\n\r\n");
        // binary-safe: embedded CRLF is framed by the length
        assert_eq!(
            &Reply::bulk(&b"a\r\nb"[..]).to_bytes()[..],
            b"$4\r\na\r\nb\r\n"
        );
    }

    #[test]
    fn multi_bulk_nests_bulks() {
        let reply = Reply::MultiBulk(vec![Bytes::from("SET"), Bytes::from("k"), Bytes::from("v")]);
        assert_eq!(
            &reply.to_bytes()[..],
            b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n"
        );
    }

    #[test]
    fn multi_raw_concatenates_full_encodings() {
        let reply = Reply::MultiRaw(vec![Reply::ok(), Reply::Integer(1), Reply::NullBulk]);
        assert_eq!(&reply.to_bytes()[..], b"*3\r\n+OK\r\n:1\r\n$-1\r\n");
    }

    #[test]
    fn error_classifier_tracks_the_wire_prefix() {
        assert!(Reply::err("EXECABORT nope").is_error());
        assert!(!Reply::ok().is_error());
        assert!(!Reply::NullBulk.is_error());
        assert!(!Reply::EmptyMultiBulk.is_error());
        assert!(!Reply::MultiRaw(vec![Reply::err("inner")]).is_error());
    }
}
