use tokio::io::BufReader;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

use crate::protocol::{
    read_message, write_message, KvMessage, ProtocolError, StatusType, DEFAULT_MAX_LINE_LENGTH,
};
use crate::ring::{parse_metadata, RingEntry};
use crate::RingstoreError;

/// Client for a single ringstore node
pub struct KvClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    peer: String,
    max_line_length: usize,
}

impl KvClient {
    /// Connect to a node's client port
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, RingstoreError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?.to_string();
        debug!("Connected to {}", peer);

        let (read_half, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer,
            peer,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        })
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub async fn get(&mut self, key: &str) -> Result<KvMessage, RingstoreError> {
        self.send(&KvMessage::get(key)).await
    }

    pub async fn put(&mut self, key: &str, value: &str) -> Result<KvMessage, RingstoreError> {
        self.send(&KvMessage::put(key, value)).await
    }

    pub async fn delete(&mut self, key: &str) -> Result<KvMessage, RingstoreError> {
        self.send(&KvMessage::delete(key)).await
    }

    /// Fetch the raw KEYRANGE reply
    pub async fn keyrange(&mut self) -> Result<KvMessage, RingstoreError> {
        self.send(&KvMessage::keyrange()).await
    }

    /// Fetch and parse the cluster partition table. Any reply other than
    /// `KEYRANGE_SUCCESS` is an error.
    pub async fn metadata(&mut self) -> Result<Vec<RingEntry>, RingstoreError> {
        let reply = self.keyrange().await?;
        if reply.status != StatusType::KeyrangeSuccess {
            return Err(RingstoreError::UnexpectedReply(reply.status));
        }
        Ok(parse_metadata(reply.key())?)
    }

    /// Send one request and wait for its reply
    pub async fn send(&mut self, request: &KvMessage) -> Result<KvMessage, RingstoreError> {
        debug!("Sending to {}: {}", self.peer, request);
        write_message(&mut self.writer, request).await?;

        let reply = read_message(&mut self.reader, self.max_line_length)
            .await?
            .ok_or_else(|| {
                ProtocolError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("connection to {} closed", self.peer),
                ))
            })?;
        debug!("Received from {}: {}", self.peer, reply);
        Ok(reply)
    }
}

// Client tests are in test.rs
#[cfg(test)]
mod test;
