//! Line-oriented client protocol.
//!
//! Every message is one `\n`-terminated UTF-8 line:
//! `<STATUS> [<key> [<value...>]]`. The value is the rest of the line and may
//! contain spaces. A `PUT` without a value (or with the literal value `null`)
//! is a delete.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Value clients send to request a delete through PUT
pub const NULL_VALUE: &str = "null";

/// Default upper bound for a single encoded line
pub const DEFAULT_MAX_LINE_LENGTH: usize = 128 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusType {
    Get,
    GetError,
    GetSuccess,
    Put,
    PutSuccess,
    PutUpdate,
    PutError,
    DeleteSuccess,
    DeleteError,
    Keyrange,
    KeyrangeSuccess,
    ServerStopped,
    ServerWriteLock,
    ServerNotResponsible,
}

impl StatusType {
    const ALL: [StatusType; 14] = [
        StatusType::Get,
        StatusType::GetError,
        StatusType::GetSuccess,
        StatusType::Put,
        StatusType::PutSuccess,
        StatusType::PutUpdate,
        StatusType::PutError,
        StatusType::DeleteSuccess,
        StatusType::DeleteError,
        StatusType::Keyrange,
        StatusType::KeyrangeSuccess,
        StatusType::ServerStopped,
        StatusType::ServerWriteLock,
        StatusType::ServerNotResponsible,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusType::Get => "GET",
            StatusType::GetError => "GET_ERROR",
            StatusType::GetSuccess => "GET_SUCCESS",
            StatusType::Put => "PUT",
            StatusType::PutSuccess => "PUT_SUCCESS",
            StatusType::PutUpdate => "PUT_UPDATE",
            StatusType::PutError => "PUT_ERROR",
            StatusType::DeleteSuccess => "DELETE_SUCCESS",
            StatusType::DeleteError => "DELETE_ERROR",
            StatusType::Keyrange => "KEYRANGE",
            StatusType::KeyrangeSuccess => "KEYRANGE_SUCCESS",
            StatusType::ServerStopped => "SERVER_STOPPED",
            StatusType::ServerWriteLock => "SERVER_WRITE_LOCK",
            StatusType::ServerNotResponsible => "SERVER_NOT_RESPONSIBLE",
        }
    }

    /// Kinds a client may send
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            StatusType::Get | StatusType::Put | StatusType::Keyrange
        )
    }
}

impl fmt::Display for StatusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatusType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ProtocolError::UnknownStatus(s.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Empty message")]
    Empty,

    #[error("Unknown status: {0}")]
    UnknownStatus(String),

    #[error("Message exceeds {0} bytes")]
    LineTooLong(usize),

    #[error("Message is not valid UTF-8")]
    InvalidUtf8,
}

/// A request or a response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvMessage {
    pub status: StatusType,
    pub key: Option<String>,
    pub value: Option<String>,
}

impl KvMessage {
    pub fn new(status: StatusType, key: Option<String>, value: Option<String>) -> Self {
        Self { status, key, value }
    }

    /// Message carrying only a status
    pub fn status(status: StatusType) -> Self {
        Self::new(status, None, None)
    }

    pub fn get(key: impl Into<String>) -> Self {
        Self::new(StatusType::Get, Some(key.into()), None)
    }

    pub fn put(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(StatusType::Put, Some(key.into()), Some(value.into()))
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Self::new(StatusType::Put, Some(key.into()), None)
    }

    pub fn keyrange() -> Self {
        Self::status(StatusType::Keyrange)
    }

    pub fn key(&self) -> &str {
        self.key.as_deref().unwrap_or_default()
    }

    /// Value with the `null` delete sentinel folded into `None`
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref().filter(|v| *v != NULL_VALUE)
    }

    /// Encoded line without the trailing newline
    pub fn encode(&self) -> String {
        let mut line = self.status.as_str().to_string();
        if let Some(key) = &self.key {
            line.push(' ');
            line.push_str(key);
            if let Some(value) = &self.value {
                line.push(' ');
                line.push_str(value);
            }
        }
        line
    }

    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Err(ProtocolError::Empty);
        }

        let mut parts = line.splitn(3, ' ');
        let status = parts.next().unwrap_or_default().parse::<StatusType>()?;
        let key = parts.next().filter(|k| !k.is_empty()).map(str::to_string);
        let value = parts.next().map(str::to_string);

        Ok(Self { status, key, value })
    }
}

impl fmt::Display for KvMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Read one message. `Ok(None)` means the peer closed the stream.
pub async fn read_message<R>(
    reader: &mut R,
    max_line_length: usize,
) -> Result<Option<KvMessage>, ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            if buf.is_empty() {
                return Ok(None);
            }
            // Unterminated final line
            break;
        }

        match available.iter().position(|b| *b == b'\n') {
            Some(pos) => {
                buf.extend_from_slice(&available[..pos]);
                reader.consume(pos + 1);
                break;
            }
            None => {
                let n = available.len();
                buf.extend_from_slice(available);
                reader.consume(n);
            }
        }

        if buf.len() > max_line_length {
            return Err(ProtocolError::LineTooLong(max_line_length));
        }
    }

    if buf.len() > max_line_length {
        return Err(ProtocolError::LineTooLong(max_line_length));
    }

    let line = String::from_utf8(buf).map_err(|_| ProtocolError::InvalidUtf8)?;
    KvMessage::decode(&line).map(Some)
}

pub async fn write_message<W>(writer: &mut W, message: &KvMessage) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let mut line = message.encode();
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
