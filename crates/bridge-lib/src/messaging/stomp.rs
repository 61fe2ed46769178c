//! STOMP 1.2 transport
//!
//! Talks to the broker's STOMP acceptor over TCP. Bus topics map onto STOMP
//! destinations (`topic://a.b` is `/topic/a.b`), the correlation id and the
//! application annotation travel as headers and the body is the JSON body.
//!
//! Wire format:
//! - command line, `header:value` lines, an empty line
//! - body terminated by NUL (`content-length` is honoured when present)
//! - header values use STOMP 1.2 escaping, except in CONNECT/CONNECTED

use super::transport::{Connection, Connector, TopicSender};
use super::{Annotations, Envelope, MessagingError};
use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::{Decoder, Encoder, Framed};
use tracing::{debug, info, warn};

/// Time allowed for queued frames to drain on close
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Frames larger than this are rejected (16 MB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

pub const HEADER_CORRELATION_ID: &str = "correlation-id";
pub const HEADER_APPLICATION: &str = "application";

#[derive(Debug, thiserror::Error)]
pub enum StompError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("invalid header escape sequence in '{0}'")]
    InvalidEscape(String),

    #[error("frame too large: {0} bytes (max: {MAX_FRAME_SIZE})")]
    FrameTooLarge(usize),

    #[error("broker error: {0}")]
    Broker(String),
}

impl From<StompError> for MessagingError {
    fn from(err: StompError) -> Self {
        MessagingError::Transport(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Frame {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of a header; repeated headers keep the first
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    fn escapes_headers(&self) -> bool {
        !matches!(self.command.as_str(), "CONNECT" | "CONNECTED")
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape(value: &str) -> Result<String, StompError> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(StompError::InvalidEscape(value.to_string())),
        }
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StompCodec;

impl Decoder for StompCodec {
    type Item = Frame;
    type Error = StompError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, StompError> {
        // heart-beats and stray EOLs between frames
        while !src.is_empty() && (src[0] == b'\n' || src[0] == b'\r') {
            src.advance(1);
        }
        if src.is_empty() {
            return Ok(None);
        }

        let mut command: Option<String> = None;
        let mut raw_headers: Vec<(String, String)> = Vec::new();
        let mut pos = 0;
        let body_start = loop {
            let Some(offset) = src[pos..].iter().position(|b| *b == b'\n') else {
                if src.len() > MAX_FRAME_SIZE {
                    return Err(StompError::FrameTooLarge(src.len()));
                }
                return Ok(None);
            };
            let end = pos + offset;
            let mut line = &src[pos..end];
            if line.last() == Some(&b'\r') {
                line = &line[..line.len() - 1];
            }
            let line = std::str::from_utf8(line)
                .map_err(|_| StompError::Malformed("header is not UTF-8".to_string()))?;

            if command.is_none() {
                command = Some(line.to_string());
            } else if line.is_empty() {
                break end + 1;
            } else {
                let (name, value) = line
                    .split_once(':')
                    .ok_or_else(|| StompError::Malformed(format!("header without ':': {}", line)))?;
                raw_headers.push((name.to_string(), value.to_string()));
            }
            pos = end + 1;
        };

        let content_length = raw_headers
            .iter()
            .find(|(n, _)| n == "content-length")
            .map(|(_, v)| {
                v.trim()
                    .parse::<usize>()
                    .map_err(|_| StompError::Malformed(format!("bad content-length '{}'", v)))
            })
            .transpose()?;

        let body_end = match content_length {
            Some(length) => {
                if length > MAX_FRAME_SIZE {
                    return Err(StompError::FrameTooLarge(length));
                }
                if src.len() < body_start + length + 1 {
                    return Ok(None);
                }
                if src[body_start + length] != 0 {
                    return Err(StompError::Malformed(
                        "body is not NUL terminated".to_string(),
                    ));
                }
                body_start + length
            }
            None => match src[body_start..].iter().position(|b| *b == 0) {
                Some(offset) => body_start + offset,
                None => {
                    if src.len() > MAX_FRAME_SIZE {
                        return Err(StompError::FrameTooLarge(src.len()));
                    }
                    return Ok(None);
                }
            },
        };

        let command = command.unwrap_or_default();
        let escaped = !matches!(command.as_str(), "CONNECT" | "CONNECTED");
        let headers = raw_headers
            .into_iter()
            .map(|(name, value)| {
                if escaped {
                    Ok((unescape(&name)?, unescape(&value)?))
                } else {
                    Ok((name, value))
                }
            })
            .collect::<Result<Vec<_>, StompError>>()?;

        let mut frame_bytes = src.split_to(body_end + 1);
        frame_bytes.truncate(body_end);
        let body = frame_bytes.split_off(body_start).freeze();

        Ok(Some(Frame {
            command,
            headers,
            body,
        }))
    }
}

impl Encoder<Frame> for StompCodec {
    type Error = StompError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), StompError> {
        if frame.body.len() > MAX_FRAME_SIZE {
            return Err(StompError::FrameTooLarge(frame.body.len()));
        }
        let escaped = frame.escapes_headers();

        dst.put_slice(frame.command.as_bytes());
        dst.put_u8(b'\n');
        for (name, value) in &frame.headers {
            if escaped {
                dst.put_slice(escape(name).as_bytes());
                dst.put_u8(b':');
                dst.put_slice(escape(value).as_bytes());
            } else {
                dst.put_slice(name.as_bytes());
                dst.put_u8(b':');
                dst.put_slice(value.as_bytes());
            }
            dst.put_u8(b'\n');
        }
        if !frame.body.is_empty() && frame.get("content-length").is_none() {
            dst.put_slice(format!("content-length:{}\n", frame.body.len()).as_bytes());
        }
        dst.put_u8(b'\n');
        dst.put_slice(&frame.body);
        dst.put_u8(0);
        Ok(())
    }
}

/// Bus topic to STOMP destination
pub fn destination_for(topic: &str) -> String {
    if let Some(rest) = topic.strip_prefix("topic://") {
        format!("/topic/{}", rest)
    } else if let Some(rest) = topic.strip_prefix("queue://") {
        format!("/queue/{}", rest)
    } else {
        topic.to_string()
    }
}

/// STOMP destination back to a bus topic
pub fn topic_for(destination: &str) -> String {
    if let Some(rest) = destination.strip_prefix("/topic/") {
        format!("topic://{}", rest)
    } else if let Some(rest) = destination.strip_prefix("/queue/") {
        format!("queue://{}", rest)
    } else {
        destination.to_string()
    }
}

pub fn envelope_to_frame(envelope: &Envelope) -> Result<Frame, MessagingError> {
    let body = serde_json::to_vec(&envelope.body)?;
    let mut frame = Frame::new("SEND")
        .header("destination", destination_for(&envelope.to))
        .header("content-type", "application/json");
    if let Some(id) = &envelope.correlation_id {
        frame = frame.header(HEADER_CORRELATION_ID, id.as_str());
    }
    if let Some(application) = envelope.application() {
        frame = frame.header(HEADER_APPLICATION, application);
    }
    Ok(frame.body(body))
}

pub fn frame_to_envelope(frame: &Frame) -> Envelope {
    let to = frame.get("destination").map(topic_for).unwrap_or_default();
    let body = if frame.body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&frame.body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&frame.body).into_owned()))
    };
    let annotations = Annotations {
        application: frame.get(HEADER_APPLICATION).map(str::to_string),
    };

    Envelope {
        to,
        correlation_id: frame.get(HEADER_CORRELATION_ID).map(str::to_string),
        message_annotations: annotations.clone(),
        application_properties: annotations,
        body,
    }
}

/// Connection settings for the STOMP acceptor
#[derive(Debug, Clone)]
pub struct StompConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub connect_timeout: Duration,
}

impl Default for StompConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 61613,
            username: None,
            password: None,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

pub struct StompConnector {
    config: StompConfig,
}

impl StompConnector {
    pub fn new(config: StompConfig) -> Self {
        Self { config }
    }

    fn connect_frame(&self) -> Frame {
        let mut frame = Frame::new("CONNECT")
            .header("accept-version", "1.2")
            .header("host", self.config.host.as_str())
            .header("heart-beat", "0,0");
        if let Some(login) = &self.config.username {
            frame = frame.header("login", login.as_str());
        }
        if let Some(passcode) = &self.config.password {
            frame = frame.header("passcode", passcode.as_str());
        }
        frame
    }

    async fn handshake(
        &self,
        subscriptions: &[String],
    ) -> Result<Framed<TcpStream, StompCodec>, StompError> {
        let stream = TcpStream::connect((self.config.host.as_str(), self.config.port)).await?;
        stream.set_nodelay(true)?;
        let mut framed = Framed::new(stream, StompCodec);

        framed.send(self.connect_frame()).await?;
        match framed.next().await {
            Some(Ok(frame)) if frame.command == "CONNECTED" => {
                debug!(
                    version = frame.get("version").unwrap_or("1.0"),
                    server = frame.get("server").unwrap_or("unknown"),
                    "STOMP session established"
                );
            }
            Some(Ok(frame)) if frame.command == "ERROR" => {
                return Err(StompError::Broker(
                    frame.get("message").unwrap_or("connection refused").to_string(),
                ));
            }
            Some(Ok(frame)) => {
                return Err(StompError::Malformed(format!(
                    "expected CONNECTED, got {}",
                    frame.command
                )));
            }
            Some(Err(e)) => return Err(e),
            None => return Err(StompError::Broker("connection closed during handshake".to_string())),
        }

        for (index, topic) in subscriptions.iter().enumerate() {
            framed
                .send(
                    Frame::new("SUBSCRIBE")
                        .header("id", format!("sub-{}", index))
                        .header("destination", destination_for(topic))
                        .header("ack", "auto"),
                )
                .await?;
        }

        Ok(framed)
    }
}

#[async_trait]
impl Connector for StompConnector {
    async fn connect(&self, subscriptions: &[String]) -> Result<Box<dyn Connection>, MessagingError> {
        let framed = tokio::time::timeout(self.config.connect_timeout, self.handshake(subscriptions))
            .await
            .map_err(|_| {
                MessagingError::Transport(format!(
                    "timed out connecting to {}",
                    self.endpoint()
                ))
            })??;

        let (mut sink, frames) = framed.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Frame>();
        let (close_tx, mut close_rx) = oneshot::channel::<()>();
        let writer = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    frame = rx.recv() => match frame {
                        Some(frame) => {
                            if let Err(e) = sink.send(frame).await {
                                warn!(error = %e, "STOMP write failed");
                                return;
                            }
                        }
                        None => break,
                    },
                    _ = &mut close_rx => break,
                }
            }
            // queued frames go out before DISCONNECT
            while let Ok(frame) = rx.try_recv() {
                if sink.feed(frame).await.is_err() {
                    return;
                }
            }
            let _ = sink.send(Frame::new("DISCONNECT")).await;
        });

        info!(
            endpoint = %self.endpoint(),
            subscriptions = subscriptions.len(),
            "STOMP connection open"
        );

        Ok(Box::new(StompConnection {
            frames,
            sender: Arc::new(StompSender { tx }),
            close: Some(close_tx),
            writer: Some(writer),
        }))
    }

    fn endpoint(&self) -> String {
        format!("stomp://{}:{}", self.config.host, self.config.port)
    }
}

struct StompConnection {
    frames: SplitStream<Framed<TcpStream, StompCodec>>,
    sender: Arc<StompSender>,
    close: Option<oneshot::Sender<()>>,
    writer: Option<JoinHandle<()>>,
}

impl Drop for StompConnection {
    fn drop(&mut self) {
        if let Some(writer) = &self.writer {
            writer.abort();
        }
    }
}

#[async_trait]
impl Connection for StompConnection {
    fn sender(&self) -> Arc<dyn TopicSender> {
        self.sender.clone()
    }

    async fn next(&mut self) -> Option<Envelope> {
        loop {
            match self.frames.next().await {
                Some(Ok(frame)) => match frame.command.as_str() {
                    "MESSAGE" => return Some(frame_to_envelope(&frame)),
                    "ERROR" => {
                        warn!(
                            message = frame.get("message").unwrap_or(""),
                            "STOMP broker sent ERROR, dropping connection"
                        );
                        return None;
                    }
                    other => debug!(command = %other, "Ignoring STOMP frame"),
                },
                Some(Err(e)) => {
                    warn!(error = %e, "STOMP read failed");
                    return None;
                }
                None => return None,
            }
        }
    }

    async fn close(&mut self) {
        if let Some(close) = self.close.take() {
            let _ = close.send(());
        }
        let Some(writer) = self.writer.take() else {
            return;
        };
        let abort = writer.abort_handle();
        if tokio::time::timeout(CLOSE_GRACE, writer).await.is_err() {
            abort.abort();
            debug!("STOMP writer did not drain in time");
        }
    }
}

struct StompSender {
    tx: mpsc::UnboundedSender<Frame>,
}

impl TopicSender for StompSender {
    fn send(&self, envelope: Envelope) -> Result<(), MessagingError> {
        let frame = envelope_to_frame(&envelope)?;
        self.tx
            .send(frame)
            .map_err(|_| MessagingError::not_connected(envelope.to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encode(frame: Frame) -> BytesMut {
        let mut buf = BytesMut::new();
        StompCodec.encode(frame, &mut buf).unwrap();
        buf
    }

    #[test]
    fn test_header_escaping() {
        assert_eq!(escape("a:b\nc\\d\re"), "a\\cb\\nc\\\\d\\re");
        assert_eq!(unescape("a\\cb\\nc\\\\d\\re").unwrap(), "a:b\nc\\d\re");
        assert!(matches!(unescape("bad\\t"), Err(StompError::InvalidEscape(_))));
    }

    #[test]
    fn test_encode_send_frame() {
        let frame = Frame::new("SEND")
            .header("destination", "/topic/x")
            .header("note", "k:v")
            .body(&b"{}"[..]);
        let bytes = encode(frame);
        assert_eq!(
            &bytes[..],
            &b"SEND\ndestination:/topic/x\nnote:k\\cv\ncontent-length:2\n\n{}\0"[..]
        );
    }

    #[test]
    fn test_connect_headers_are_not_escaped() {
        let bytes = encode(Frame::new("CONNECT").header("passcode", "p:w"));
        assert_eq!(&bytes[..], &b"CONNECT\npasscode:p:w\n\n\0"[..]);
    }

    #[test]
    fn test_decode_message_frame() {
        let mut buf = BytesMut::from(
            &b"\n\nMESSAGE\r\ndestination:/topic/a\r\ncorrelation-id:c\\c1\r\n\r\nhello\0"[..],
        );
        let frame = StompCodec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.command, "MESSAGE");
        assert_eq!(frame.get("destination"), Some("/topic/a"));
        assert_eq!(frame.get("correlation-id"), Some("c:1"));
        assert_eq!(&frame.body[..], b"hello");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_partial_frames() {
        let full = b"MESSAGE\ndestination:/topic/a\ncontent-length:5\n\na\0b\0c\0RECEIPT\nreceipt-id:1\n\n\0";
        let mut buf = BytesMut::new();
        let mut frames = Vec::new();
        for chunk in full.chunks(7) {
            buf.extend_from_slice(chunk);
            while let Some(frame) = StompCodec.decode(&mut buf).unwrap() {
                frames.push(frame);
            }
        }
        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0].body[..], b"a\0b\0c");
        assert_eq!(frames[1].command, "RECEIPT");
        assert_eq!(frames[1].get("receipt-id"), Some("1"));
    }

    #[test]
    fn test_repeated_header_keeps_first() {
        let mut buf = BytesMut::from(&b"MESSAGE\nfoo:1\nfoo:2\n\n\0"[..]);
        let frame = StompCodec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.get("foo"), Some("1"));
    }

    #[test]
    fn test_malformed_header() {
        let mut buf = BytesMut::from(&b"MESSAGE\nnocolon\n\n\0"[..]);
        assert!(matches!(
            StompCodec.decode(&mut buf),
            Err(StompError::Malformed(_))
        ));
    }

    #[test]
    fn test_destination_mapping() {
        assert_eq!(
            destination_for("topic://eu.nebulouscloud.ui.app.get"),
            "/topic/eu.nebulouscloud.ui.app.get"
        );
        assert_eq!(topic_for("/topic/a.b"), "topic://a.b");
        assert_eq!(topic_for("/queue/q"), "queue://q");
    }

    #[test]
    fn test_envelope_frame_mapping() {
        let envelope = Envelope::new("topic://a.b", json!({"appId": "x"}))
            .with_correlation_id("c-1")
            .with_application(&Annotations::application("app"));
        let frame = envelope_to_frame(&envelope).unwrap();
        assert_eq!(frame.get("destination"), Some("/topic/a.b"));
        assert_eq!(frame.get("content-type"), Some("application/json"));

        let mut buf = encode(frame.clone());
        let mut decoded = StompCodec.decode(&mut buf).unwrap().unwrap();
        decoded.command = "MESSAGE".to_string();
        assert_eq!(frame_to_envelope(&decoded), envelope);
    }

    #[test]
    fn test_non_json_body_becomes_string() {
        let frame = Frame::new("MESSAGE")
            .header("destination", "/topic/a")
            .body(&b"plain text"[..]);
        assert_eq!(frame_to_envelope(&frame).body, json!("plain text"));
    }
}
