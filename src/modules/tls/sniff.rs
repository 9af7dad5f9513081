//! First-byte protocol sniffing.
//!
//! A TLS connection always opens with a handshake record, content type 0x16.
//! Anything else is treated as plaintext HTTP. The consumed byte is replayed
//! through [`SniffedStream`] so the TLS or HTTP stack sees an intact stream.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadBuf};

use super::error::{TlsError, TlsResult};

/// TLS record content type of a handshake record.
pub const TLS_HANDSHAKE_BYTE: u8 = 0x16;

/// Whether a first byte opens a TLS handshake.
#[must_use]
pub fn is_tls_first_byte(byte: u8) -> bool {
    byte == TLS_HANDSHAKE_BYTE
}

/// Read exactly one byte from a fresh connection.
///
/// # Errors
///
/// Returns an error when the peer closes before sending anything or the read
/// fails.
pub async fn sniff_first_byte<S>(stream: &mut S) -> TlsResult<u8>
where
    S: AsyncRead + Unpin,
{
    let mut first = [0u8; 1];
    let n = stream.read(&mut first).await?;
    if n == 0 {
        return Err(TlsError::ClosedBeforeFirstByte);
    }
    Ok(first[0])
}

/// A stream that replays the sniffed byte before the underlying data.
#[derive(Debug)]
pub struct SniffedStream<S> {
    inner: S,
    prefix: Option<u8>,
}

impl<S> SniffedStream<S> {
    /// Wrap a stream whose first byte has already been consumed.
    #[must_use]
    pub fn new(inner: S, first: u8) -> Self {
        Self {
            inner,
            prefix: Some(first),
        }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for SniffedStream<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if let Some(byte) = self.prefix.take() {
            buf.put_slice(&[byte]);
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for SniffedStream<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_sniff_detects_tls() {
        let mut stream = Cursor::new(vec![0x16, 0x03, 0x01]);
        let first = sniff_first_byte(&mut stream).await.unwrap();
        assert!(is_tls_first_byte(first));
    }

    #[tokio::test]
    async fn test_sniff_detects_plaintext() {
        let mut stream = Cursor::new(b"GET / HTTP/1.1\r\n".to_vec());
        let first = sniff_first_byte(&mut stream).await.unwrap();
        assert!(!is_tls_first_byte(first));
        assert_eq!(first, b'G');
    }

    #[tokio::test]
    async fn test_sniff_empty_stream_fails() {
        let mut stream = Cursor::new(Vec::new());
        let result = sniff_first_byte(&mut stream).await;
        assert!(matches!(result, Err(TlsError::ClosedBeforeFirstByte)));
    }

    #[tokio::test]
    async fn test_replay_restores_full_stream() {
        let mut raw = Cursor::new(b"GET / HTTP/1.1\r\n".to_vec());
        let first = sniff_first_byte(&mut raw).await.unwrap();
        let mut replayed = SniffedStream::new(raw, first);

        let mut content = Vec::new();
        replayed.read_to_end(&mut content).await.unwrap();
        assert_eq!(content, b"GET / HTTP/1.1\r\n");
    }
}
