//! RouterOS API client
//!
//! Minimal implementation of the RouterOS API wire protocol, enough to log
//! in and run `print` commands:
//!
//! - A *word* is a length prefix (1-5 bytes) followed by that many bytes.
//! - A *sentence* is a sequence of words terminated by an empty word.
//! - Replies start with `!re` (one record), `!done` (end of reply),
//!   `!trap` (command error) or `!fatal` (session is being closed).
//!   RouterOS 7.18+ also sends `!empty` ahead of `!done` when a `print`
//!   matched nothing.
//! - Record attributes are words of the form `=name=value`.
//!
//! Only the plain-text login introduced in RouterOS 6.43 is supported.

use crate::device::{Connector, Element, ElementTree, Session};
use crate::error::{DeviceError, DeviceResult};
use std::io::{Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::time::Duration;
use tracing::{debug, trace};

/// Default API port (plain text)
pub const DEFAULT_API_PORT: u16 = 8728;

/// Largest word we accept from a router
const MAX_WORD_LEN: usize = 16 * 1024 * 1024;

/// Encode a word length prefix
pub fn encode_length(len: usize, out: &mut Vec<u8>) {
    let len = len as u32;
    if len < 0x80 {
        out.push(len as u8);
    } else if len < 0x4000 {
        out.extend_from_slice(&((len | 0x8000) as u16).to_be_bytes());
    } else if len < 0x20_0000 {
        let v = len | 0xC0_0000;
        out.extend_from_slice(&v.to_be_bytes()[1..]);
    } else if len < 0x1000_0000 {
        out.extend_from_slice(&(len | 0xE000_0000).to_be_bytes());
    } else {
        out.push(0xF0);
        out.extend_from_slice(&len.to_be_bytes());
    }
}

/// Decode a word length prefix from a reader
pub fn decode_length<R: Read>(reader: &mut R) -> DeviceResult<usize> {
    let mut first = [0u8; 1];
    reader.read_exact(&mut first)?;
    let b = first[0];

    let (extra, initial) = if b & 0x80 == 0 {
        (0, b as u32)
    } else if b & 0xC0 == 0x80 {
        (1, (b & 0x3F) as u32)
    } else if b & 0xE0 == 0xC0 {
        (2, (b & 0x1F) as u32)
    } else if b & 0xF0 == 0xE0 {
        (3, (b & 0x0F) as u32)
    } else if b == 0xF0 {
        (4, 0)
    } else {
        return Err(DeviceError::Protocol(format!(
            "invalid length prefix byte 0x{:02x}",
            b
        )));
    };

    let mut rest = [0u8; 4];
    reader.read_exact(&mut rest[..extra])?;
    let len = rest[..extra]
        .iter()
        .fold(initial, |acc, byte| (acc << 8) | *byte as u32);

    Ok(len as usize)
}

/// A parsed reply: `!re` records plus the attributes carried by `!done`
#[derive(Debug, Default)]
struct Reply {
    records: ElementTree,
    done: Element,
}

/// Connects to routers over the RouterOS API
#[derive(Debug, Clone)]
pub struct ApiConnector {
    timeout: Duration,
}

impl ApiConnector {
    /// Create a connector; `timeout` applies to connect and every round-trip
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Connector for ApiConnector {
    fn connect(
        &self,
        address: Ipv4Addr,
        port: u16,
        login: &str,
        password: &str,
    ) -> DeviceResult<Box<dyn Session>> {
        let socket = SocketAddr::from((address, port));
        let connect_err = |e: std::io::Error| DeviceError::ConnectFailed {
            address,
            port,
            reason: e.to_string(),
        };

        let stream = TcpStream::connect_timeout(&socket, self.timeout).map_err(connect_err)?;
        stream
            .set_read_timeout(Some(self.timeout))
            .map_err(connect_err)?;
        stream
            .set_write_timeout(Some(self.timeout))
            .map_err(connect_err)?;
        stream.set_nodelay(true).map_err(connect_err)?;

        let mut session = ApiSession::new(stream);
        match session.login(login, password) {
            Ok(()) => {
                debug!(router = %address, "API session established");
                Ok(Box::new(session))
            }
            Err(DeviceError::Trap { message, .. }) => {
                session.close();
                Err(DeviceError::LoginRejected { address, message })
            }
            Err(e) => {
                session.close();
                Err(e)
            }
        }
    }
}

/// One API session over any byte stream
pub struct ApiSession<S: Read + Write + Send = TcpStream> {
    stream: S,
    alive: bool,
}

impl<S: Read + Write + Send> ApiSession<S> {
    /// Wrap an already connected stream (no login performed)
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            alive: true,
        }
    }

    /// Plain-text login
    pub fn login(&mut self, login: &str, password: &str) -> DeviceResult<()> {
        let words = [
            "/login".to_string(),
            format!("=name={}", login),
            format!("=password={}", password),
        ];
        let reply = self.command(&words)?;

        // pre-6.43 routers answer with a challenge instead of logging in
        if reply.done.get("ret").is_some() {
            return Err(DeviceError::Trap {
                command: "/login".into(),
                message: "challenge-response login is not supported".into(),
            });
        }
        Ok(())
    }

    fn write_sentence(&mut self, words: &[String]) -> DeviceResult<()> {
        let mut buf = Vec::new();
        for word in words {
            encode_length(word.len(), &mut buf);
            buf.extend_from_slice(word.as_bytes());
        }
        buf.push(0);
        self.stream.write_all(&buf)?;
        self.stream.flush()?;
        Ok(())
    }

    fn read_word(&mut self) -> DeviceResult<String> {
        let len = decode_length(&mut self.stream)?;
        if len > MAX_WORD_LEN {
            return Err(DeviceError::Protocol(format!("word of {} bytes is too long", len)));
        }
        let mut buf = vec![0u8; len];
        self.stream.read_exact(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    fn read_sentence(&mut self) -> DeviceResult<Vec<String>> {
        let mut words = Vec::new();
        loop {
            let word = self.read_word()?;
            if word.is_empty() {
                return Ok(words);
            }
            words.push(word);
        }
    }

    /// Send one command and collect the full reply
    fn command(&mut self, words: &[String]) -> DeviceResult<Reply> {
        if !self.alive {
            return Err(DeviceError::Closed);
        }

        let result = self.exchange(words);
        if let Err(DeviceError::Io(_) | DeviceError::Protocol(_) | DeviceError::Fatal(_)) = &result
        {
            self.alive = false;
        }
        result
    }

    fn exchange(&mut self, words: &[String]) -> DeviceResult<Reply> {
        let command = words.first().cloned().unwrap_or_default();
        trace!(command = %command, "API command");
        self.write_sentence(words)?;

        let mut reply = Reply::default();
        let mut trap: Option<String> = None;

        loop {
            let sentence = self.read_sentence()?;
            let Some((kind, attrs)) = sentence.split_first() else {
                continue;
            };
            let element = parse_attributes(attrs);

            match kind.as_str() {
                "!re" => reply.records.push(element),
                "!empty" => {}
                "!trap" => {
                    if trap.is_none() {
                        trap = Some(element.get("message").unwrap_or("unknown error").to_string());
                    }
                }
                "!done" => {
                    reply.done = element;
                    break;
                }
                "!fatal" => {
                    let message = attrs.first().cloned().unwrap_or_default();
                    return Err(DeviceError::Fatal(message));
                }
                other => {
                    return Err(DeviceError::Protocol(format!("unexpected reply '{}'", other)));
                }
            }
        }

        match trap {
            Some(message) => Err(DeviceError::Trap { command, message }),
            None => Ok(reply),
        }
    }
}

/// Turn `=name=value` words into an element; other words are ignored
fn parse_attributes(words: &[String]) -> Element {
    let mut element = Element::new();
    for word in words {
        if let Some((key, value)) = word.strip_prefix('=').and_then(|w| w.split_once('=')) {
            element.insert(key, value);
        }
    }
    element
}

impl<S: Read + Write + Send> Session for ApiSession<S> {
    fn is_alive(&self) -> bool {
        self.alive
    }

    fn fetch(&mut self, path: &str, fields: &[&str]) -> DeviceResult<ElementTree> {
        let mut words = vec![format!("{}/print", path.trim_end_matches('/'))];
        if !fields.is_empty() {
            words.push(format!("=.proplist={}", fields.join(",")));
        }
        Ok(self.command(&words)?.records)
    }

    fn close(&mut self) {
        if self.alive {
            // best effort; the router drops the connection after /quit
            let _ = self.write_sentence(&["/quit".to_string()]);
            self.alive = false;
        }
    }
}
