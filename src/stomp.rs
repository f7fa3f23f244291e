//! Minimal STOMP 1.2 frame codec.
//!
//! The game server speaks STOMP over WebSocket text messages. Each WebSocket
//! message carries exactly one frame:
//!
//! ```text
//! COMMAND\n
//! header1:value1\n
//! header2:value2\n
//! \n
//! body^@
//! ```
//!
//! Only the client side of the protocol is covered: the frames a client sends
//! (`CONNECT`, `SUBSCRIBE`, `UNSUBSCRIBE`, `SEND`, `DISCONNECT`) and the
//! frames a broker sends back (`CONNECTED`, `MESSAGE`, `RECEIPT`, `ERROR`).
//! Transactions and acknowledgements are not used.

use std::fmt;

use crate::error::{LifeGameError, Result};

/// Frame terminator.
const NUL: char = '\0';

/// A STOMP frame command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Connect,
    Stomp,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Message,
    Receipt,
    Error,
    Disconnect,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Stomp => "STOMP",
            Command::Connected => "CONNECTED",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
            Command::Disconnect => "DISCONNECT",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "CONNECT" => Command::Connect,
            "STOMP" => Command::Stomp,
            "CONNECTED" => Command::Connected,
            "SEND" => Command::Send,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "MESSAGE" => Command::Message,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            "DISCONNECT" => Command::Disconnect,
            _ => return None,
        })
    }

    /// `CONNECT` and `CONNECTED` headers are never escaped (STOMP 1.2 §Value Encoding).
    fn escapes_headers(&self) -> bool {
        !matches!(self, Command::Connect | Command::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One STOMP frame.
///
/// Headers keep their wire order; when a header repeats, the first
/// occurrence wins, as the protocol requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Value of the first header called `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    // ── Client frames ───────────────────────────────────────────────

    /// `CONNECT` frame for the given virtual host, heart-beating disabled.
    pub fn connect(host: &str) -> Self {
        Frame::new(Command::Connect)
            .with_header("accept-version", "1.2,1.1")
            .with_header("host", host)
            .with_header("heart-beat", "0,0")
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Frame::new(Command::Subscribe)
            .with_header("id", id)
            .with_header("destination", destination)
            .with_header("ack", "auto")
    }

    pub fn unsubscribe(id: &str) -> Self {
        Frame::new(Command::Unsubscribe).with_header("id", id)
    }

    /// `SEND` frame with a JSON body. An empty body is sent without a content type.
    pub fn send(destination: &str, body: impl Into<String>) -> Self {
        let body = body.into();
        let frame = Frame::new(Command::Send).with_header("destination", destination);
        if body.is_empty() {
            frame
        } else {
            frame
                .with_header("content-type", "application/json")
                .with_body(body)
        }
    }

    pub fn disconnect() -> Self {
        Frame::new(Command::Disconnect)
    }

    // ── Broker frames ───────────────────────────────────────────────

    /// `MESSAGE` frame as a broker would deliver it.
    pub fn message(
        destination: &str,
        subscription: &str,
        message_id: &str,
        body: impl Into<String>,
    ) -> Self {
        Frame::new(Command::Message)
            .with_header("destination", destination)
            .with_header("subscription", subscription)
            .with_header("message-id", message_id)
            .with_body(body)
    }

    // ── Codec ───────────────────────────────────────────────────────

    /// Serialize to the wire representation, NUL terminator included.
    ///
    /// A `content-length` header is added for non-empty bodies unless one is
    /// already present.
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');

        let escape = self.command.escapes_headers();
        for (name, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(name));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        if !self.body.is_empty() && self.header("content-length").is_none() {
            out.push_str("content-length:");
            out.push_str(&self.body.len().to_string());
            out.push('\n');
        }

        out.push('\n');
        out.push_str(&self.body);
        out.push(NUL);
        out
    }

    /// Parse one frame.
    ///
    /// Returns `Ok(None)` for heart-beats (input consisting only of line
    /// endings or NULs).
    ///
    /// # Errors
    ///
    /// Returns [`LifeGameError::Frame`] for unknown commands, header lines
    /// without a colon, invalid escape sequences or a `content-length` that
    /// exceeds the payload.
    pub fn parse(text: &str) -> Result<Option<Frame>> {
        let text = text.trim_start_matches(['\r', '\n']);
        if text.trim_matches(NUL).trim().is_empty() {
            return Ok(None);
        }

        let (head, rest) = split_head(text);
        let mut lines = head.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l));

        let command_line = lines.next().unwrap_or_default();
        let command = Command::parse(command_line)
            .ok_or_else(|| LifeGameError::Frame(format!("unknown command {command_line:?}")))?;

        let escape = command.escapes_headers();
        let mut headers = Vec::new();
        for line in lines.filter(|l| !l.is_empty()) {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| LifeGameError::Frame(format!("header without colon: {line:?}")))?;
            if escape {
                headers.push((unescape_header(name)?, unescape_header(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let mut frame = Frame {
            command,
            headers,
            body: String::new(),
        };
        frame.body = match frame.header("content-length") {
            Some(len) => {
                let len: usize = len
                    .trim()
                    .parse()
                    .map_err(|_| LifeGameError::Frame(format!("bad content-length {len:?}")))?;
                rest.get(..len)
                    .ok_or_else(|| {
                        LifeGameError::Frame(format!(
                            "content-length {len} exceeds body of {} bytes",
                            rest.len()
                        ))
                    })?
                    .to_string()
            }
            None => match rest.find(NUL) {
                Some(end) => rest.get(..end).unwrap_or(rest).to_string(),
                None => rest.to_string(),
            },
        };

        Ok(Some(frame))
    }
}

/// Split at the blank line separating headers from the body.
fn split_head(text: &str) -> (&str, &str) {
    let lf = text.find("\n\n").map(|i| (i, 2));
    let crlf = text.find("\r\n\r\n").map(|i| (i, 4));
    let sep = match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    };
    match sep {
        Some((idx, len)) => (
            text.get(..idx).unwrap_or_default(),
            text.get(idx + len..).unwrap_or_default(),
        ),
        // No blank line: a bodiless frame that dropped its trailing EOL.
        None => (text.trim_end_matches(NUL), ""),
    }
}

fn escape_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('c') => out.push(':'),
            other => {
                return Err(LifeGameError::Frame(format!(
                    "invalid header escape \\{}",
                    other.map(String::from).unwrap_or_default()
                )))
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn connect_frame_wire_format() {
        let wire = Frame::connect("localhost").encode();
        assert_eq!(
            wire,
            "CONNECT\naccept-version:1.2,1.1\nhost:localhost\nheart-beat:0,0\n\n\0"
        );
    }

    #[test]
    fn send_frame_carries_content_length() {
        let wire = Frame::send("/app/chat", r#"{"a":1}"#).encode();
        assert!(wire.starts_with("SEND\ndestination:/app/chat\n"));
        assert!(wire.contains("content-type:application/json\n"));
        assert!(wire.contains("content-length:7\n"));
        assert!(wire.ends_with("\n\n{\"a\":1}\0"));
    }

    #[test]
    fn empty_send_has_no_body_headers() {
        let frame = Frame::send("/app/game/start/7", "");
        assert!(frame.header("content-type").is_none());
        assert_eq!(frame.encode(), "SEND\ndestination:/app/game/start/7\n\n\0");
    }

    #[test]
    fn parses_spring_message_frame() {
        let wire = "MESSAGE\ndestination:/topic/game\ncontent-type:application/json\nsubscription:sub-0\nmessage-id:abc-1\ncontent-length:17\n\n{\"playerName\":\"A\"}\0";
        // content-length deliberately one short: parser must honour it.
        let frame = Frame::parse(wire).unwrap().unwrap();
        assert_eq!(frame.command, Command::Message);
        assert_eq!(frame.header("subscription"), Some("sub-0"));
        assert_eq!(frame.body, "{\"playerName\":\"A\"");
    }

    #[test]
    fn parses_body_up_to_nul_without_length() {
        let frame = Frame::parse("MESSAGE\nsubscription:s\n\nhello\0\n")
            .unwrap()
            .unwrap();
        assert_eq!(frame.body, "hello");
    }

    #[test]
    fn parses_crlf_line_endings() {
        let frame = Frame::parse("CONNECTED\r\nversion:1.2\r\n\r\n\0")
            .unwrap()
            .unwrap();
        assert_eq!(frame.command, Command::Connected);
        assert_eq!(frame.header("version"), Some("1.2"));
        assert!(frame.body.is_empty());
    }

    #[test]
    fn heart_beats_are_skipped() {
        assert!(Frame::parse("\n").unwrap().is_none());
        assert!(Frame::parse("\r\n").unwrap().is_none());
        assert!(Frame::parse("").unwrap().is_none());
    }

    #[test]
    fn header_escaping_survives_the_wire() {
        let frame = Frame::new(Command::Message)
            .with_header("destination", "/topic/a:b")
            .with_header("note", "line1\nline2\\x");
        let parsed = Frame::parse(&frame.encode()).unwrap().unwrap();
        assert_eq!(parsed.header("destination"), Some("/topic/a:b"));
        assert_eq!(parsed.header("note"), Some("line1\nline2\\x"));
    }

    #[test]
    fn connected_headers_are_not_unescaped() {
        let frame = Frame::parse("CONNECTED\nserver:a\\cb\n\n\0").unwrap().unwrap();
        assert_eq!(frame.header("server"), Some("a\\cb"));
    }

    #[test]
    fn first_repeated_header_wins() {
        let frame = Frame::parse("MESSAGE\nfoo:1\nfoo:2\n\n\0").unwrap().unwrap();
        assert_eq!(frame.header("foo"), Some("1"));
    }

    #[test]
    fn rejects_unknown_command() {
        let err = Frame::parse("HELLO\n\n\0").unwrap_err();
        assert!(matches!(err, LifeGameError::Frame(_)));
    }

    #[test]
    fn rejects_bad_escape_and_missing_colon() {
        assert!(Frame::parse("MESSAGE\nfoo:\\t\n\n\0").is_err());
        assert!(Frame::parse("MESSAGE\nfoo\n\n\0").is_err());
    }

    #[test]
    fn rejects_oversized_content_length() {
        let err = Frame::parse("MESSAGE\ncontent-length:99\n\nshort\0").unwrap_err();
        assert!(err.to_string().contains("content-length"));
    }

    #[test]
    fn error_frame_exposes_message_header() {
        let frame = Frame::parse("ERROR\nmessage:Broker unavailable\n\ndetails\0")
            .unwrap()
            .unwrap();
        assert_eq!(frame.command, Command::Error);
        assert_eq!(frame.header("message"), Some("Broker unavailable"));
        assert_eq!(frame.body, "details");
    }
}
