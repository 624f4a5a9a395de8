//! The frame layer.
//!
//! After the JSON preamble, a connection carries an unbounded stream of
//! frames. One frame is one header chunk immediately followed by one body
//! chunk; a chunk is a 4-byte big-endian length and that many bytes, both
//! encoded with the connection's negotiated codec. Responses whose header
//! carries an error string still carry a (unit) placeholder body, so the
//! reader can always consume header and body in lockstep.

use crate::config::Options;
use crate::error::RpcError;
use serde_derive::{Deserialize, Serialize};
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter,
};

/// Upper bound for a single chunk. A length above this is treated as a
/// desynchronized or hostile stream.
pub const MAX_CHUNK_LEN: u32 = 64 << 20;

/// The per-frame header, codec-encoded as the first chunk of every frame.
///
/// `seq` correlates a response with its request; responses need not come
/// back in request order. A non-empty `error` means the body is a
/// placeholder.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Header {
    /// `Service.Method`
    pub service_method: String,
    pub seq: u64,
    pub error: String,
}

/// Buffered reading side of a connection.
///
/// Single-reader by construction: the server's dispatch loop or the
/// client's receive task is the only task touching it.
pub struct FrameReader<R: AsyncRead + Unpin> {
    inner: BufReader<R>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner: BufReader::new(inner) }
    }

    /// Reads the preamble line. Must be the first read on the stream.
    pub async fn read_options(&mut self) -> Result<Options, RpcError> {
        let mut line = String::new();
        let n = self.inner.read_line(&mut line).await?;
        if n == 0 {
            return Err(RpcError::Eof);
        }
        serde_json::from_str(line.trim_end())
            .map_err(|e| RpcError::Protocol(format!("options: {}", e)))
    }

    /// Reads an HTTP request (or status) head: returns the first line and
    /// consumes the remaining header lines through the blank terminator.
    pub async fn read_http_head(&mut self) -> Result<String, RpcError> {
        let mut line = String::new();
        let n = self.inner.read_line(&mut line).await?;
        if n == 0 {
            return Err(RpcError::Eof);
        }
        let head = line.trim_end().to_string();
        loop {
            let mut field = String::new();
            let n = self.inner.read_line(&mut field).await?;
            if n == 0 || field.trim_end().is_empty() {
                return Ok(head);
            }
        }
    }

    /// Reads one length-delimited chunk.
    pub async fn read_chunk(&mut self) -> Result<Vec<u8>, RpcError> {
        let len = self.inner.read_u32().await?;
        if len > MAX_CHUNK_LEN {
            return Err(RpcError::Protocol(format!("chunk length {} exceeds limit", len)));
        }
        let mut buf = vec![0u8; len as usize];
        self.inner.read_exact(&mut buf).await?;
        Ok(buf)
    }
}

/// Buffered writing side of a connection.
///
/// [write_frame](Self::write_frame) emits header and body back to back and
/// flushes before returning, so a frame is either fully on the wire or the
/// connection is dead. Callers serialize access (a mutex on the client, a
/// dedicated writer task on the server); this type does not.
pub struct FrameWriter<W: AsyncWrite + Unpin> {
    inner: BufWriter<W>,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner: BufWriter::new(inner) }
    }

    /// Sends the preamble line. Must be the first write on the stream.
    pub async fn write_options(&mut self, opt: &Options) -> Result<(), RpcError> {
        let mut line =
            serde_json::to_vec(opt).map_err(|e| RpcError::Encode(e.to_string()))?;
        line.push(b'\n');
        self.inner.write_all(&line).await?;
        self.inner.flush().await?;
        Ok(())
    }

    pub async fn write_frame(&mut self, header: &[u8], body: &[u8]) -> Result<(), RpcError> {
        self.inner.write_u32(header.len() as u32).await?;
        self.inner.write_all(header).await?;
        self.inner.write_u32(body.len() as u32).await?;
        self.inner.write_all(body).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Half-closes the connection; the peer observes EOF after the last
    /// flushed frame.
    pub async fn shutdown(&mut self) -> Result<(), RpcError> {
        self.inner.flush().await?;
        self.inner.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frame_round_trip() {
        let (a, b) = tokio::io::duplex(4096);
        let mut w = FrameWriter::new(a);
        let mut r = FrameReader::new(b);

        w.write_options(&Options::default()).await.expect("options");
        w.write_frame(b"head", b"body-bytes").await.expect("frame");
        w.write_frame(b"head2", b"").await.expect("frame");

        let opt = r.read_options().await.expect("options");
        assert_eq!(opt.magic_number, crate::MAGIC_NUMBER);
        assert_eq!(r.read_chunk().await.expect("chunk"), b"head");
        assert_eq!(r.read_chunk().await.expect("chunk"), b"body-bytes");
        assert_eq!(r.read_chunk().await.expect("chunk"), b"head2");
        assert_eq!(r.read_chunk().await.expect("chunk"), b"");
    }

    #[tokio::test]
    async fn test_oversized_chunk_rejected() {
        let (a, b) = tokio::io::duplex(64);
        let mut r = FrameReader::new(b);
        tokio::spawn(async move {
            let mut a = a;
            a.write_u32(MAX_CHUNK_LEN + 1).await.expect("write");
        });
        match r.read_chunk().await {
            Err(RpcError::Protocol(_)) => {}
            other => panic!("expected protocol error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_eof_at_frame_boundary() {
        let (a, b) = tokio::io::duplex(64);
        drop(a);
        let mut r = FrameReader::new(b);
        assert_eq!(r.read_chunk().await.unwrap_err(), RpcError::Eof);
    }

    #[tokio::test]
    async fn test_http_head() {
        let (a, b) = tokio::io::duplex(256);
        let mut r = FrameReader::new(b);
        tokio::spawn(async move {
            let mut a = a;
            a.write_all(b"CONNECT /_geerpc_ HTTP/1.0\r\nHost: x\r\n\r\n").await.expect("write");
        });
        assert_eq!(r.read_http_head().await.expect("head"), "CONNECT /_geerpc_ HTTP/1.0");
    }
}
