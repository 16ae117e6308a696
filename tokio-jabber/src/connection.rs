// Copyright (c) 2026 jabber-simple contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The socket underneath a stream, together with its read buffer and TLS
//! state.

use core::pin::Pin;
use core::task::{ready, Context, Poll};
use std::io;

use bytes::{Buf, Bytes, BytesMut};
use log::Level;
use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite, ReadBuf};

use crate::connect::{tls, BoxedStream, StartTlsError};
use crate::log_to;
use crate::logging::Logger;

const READ_CHUNK: usize = 4096;

/// Whether the bytes on the wire are encrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsState {
    /// Cleartext.
    Plaintext,
    /// A STARTTLS handshake is in progress.
    Upgrading,
    /// TLS is established.
    Secured,
}

/// A connected socket.
///
/// The connection owns a read buffer which the XML parser consumes from.
/// When the connection is upgraded to TLS, bytes still sitting in that
/// buffer are handed to the TLS layer before anything else is read from the
/// socket.
pub struct Connection {
    stream: Option<BoxedStream>,
    tls: TlsState,
    read_buf: BytesMut,
    logger: Logger,
}

impl core::fmt::Debug for Connection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Connection")
            .field("tls", &self.tls)
            .field("buffered", &self.read_buf.len())
            .field("open", &self.stream.is_some())
            .finish()
    }
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "connection is closed")
}

impl Connection {
    /// Wrap an established byte stream.
    pub fn new(stream: BoxedStream, tls: TlsState) -> Connection {
        Connection {
            stream: Some(stream),
            tls,
            read_buf: BytesMut::with_capacity(READ_CHUNK),
            logger: Logger::default(),
        }
    }

    /// Report through `logger` from now on.
    pub fn set_logger(&mut self, logger: Logger) {
        self.logger = logger;
    }

    /// The logger of this connection.
    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// The TLS state.
    pub fn tls_state(&self) -> TlsState {
        self.tls
    }

    /// Whether the socket is still attached.
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Number of received bytes not consumed yet.
    pub fn buffered(&self) -> usize {
        self.read_buf.len()
    }

    /// Upgrade the connection to TLS, verifying the certificate against
    /// `domain`.
    ///
    /// On failure the connection is left closed.
    pub async fn starttls(&mut self, domain: &str) -> Result<(), StartTlsError> {
        let stream = self.stream.take().ok_or_else(|| StartTlsError::Io(not_connected()))?;
        self.tls = TlsState::Upgrading;
        let pending: Bytes = self.read_buf.split().freeze();
        if !pending.is_empty() {
            log_to!(
                self.logger,
                Level::Debug,
                "Replaying {} buffered bytes into TLS",
                pending.len()
            );
        }
        let secured = tls::connect(stream, pending, domain, &self.logger).await?;
        self.stream = Some(secured);
        self.tls = TlsState::Secured;
        Ok(())
    }

    /// Drop the socket. Further reads report end of file, writes fail.
    pub fn close(&mut self) {
        self.stream = None;
        self.read_buf.clear();
    }
}

impl AsyncRead for Connection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if !this.read_buf.is_empty() {
            let n = this.read_buf.len().min(buf.remaining());
            buf.put_slice(&this.read_buf[..n]);
            this.read_buf.advance(n);
            return Poll::Ready(Ok(()));
        }
        match this.stream.as_mut() {
            Some(stream) => Pin::new(stream).poll_read(cx, buf),
            None => Poll::Ready(Ok(())),
        }
    }
}

impl AsyncBufRead for Connection {
    fn poll_fill_buf(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<&[u8]>> {
        let this = self.get_mut();
        if this.read_buf.is_empty() {
            if let Some(stream) = this.stream.as_mut() {
                let mut chunk = [0u8; READ_CHUNK];
                let mut chunk_buf = ReadBuf::new(&mut chunk);
                ready!(Pin::new(stream).poll_read(cx, &mut chunk_buf))?;
                this.read_buf.extend_from_slice(chunk_buf.filled());
            }
        }
        Poll::Ready(Ok(&this.read_buf[..]))
    }

    fn consume(self: Pin<&mut Self>, amt: usize) {
        self.get_mut().read_buf.advance(amt);
    }
}

impl AsyncWrite for Connection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut().stream.as_mut() {
            Some(stream) => Pin::new(stream).poll_write(cx, buf),
            None => Poll::Ready(Err(not_connected())),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut().stream.as_mut() {
            Some(stream) => Pin::new(stream).poll_flush(cx),
            None => Poll::Ready(Ok(())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut().stream.as_mut() {
            Some(stream) => Pin::new(stream).poll_shutdown(cx),
            None => Poll::Ready(Ok(())),
        }
    }
}

pin_project_lite::pin_project! {
    /// A stream which yields `prefix` before reading from `inner`.
    pub(crate) struct Prefixed<T> {
        prefix: Bytes,
        #[pin]
        inner: T,
    }
}

impl<T> Prefixed<T> {
    pub(crate) fn new(prefix: Bytes, inner: T) -> Prefixed<T> {
        Prefixed { prefix, inner }
    }
}

impl<T: AsyncRead> AsyncRead for Prefixed<T> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.project();
        if !this.prefix.is_empty() {
            let n = this.prefix.len().min(buf.remaining());
            buf.put_slice(&this.prefix[..n]);
            this.prefix.advance(n);
            return Poll::Ready(Ok(()));
        }
        this.inner.poll_read(cx, buf)
    }
}

impl<T: AsyncWrite> AsyncWrite for Prefixed<T> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.project().inner.poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, DuplexStream};

    /// A socket counting how often it is read from.
    struct CountingSocket {
        inner: DuplexStream,
        reads: Arc<AtomicUsize>,
    }

    impl AsyncRead for CountingSocket {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Pin::new(&mut self.inner).poll_read(cx, buf)
        }
    }

    impl AsyncWrite for CountingSocket {
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

    #[tokio::test]
    async fn test_buffered_reads() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut conn = Connection::new(Box::new(client), TlsState::Plaintext);
        server.write_all(b"hello world").await.unwrap();
        let buf = conn.fill_buf().await.unwrap();
        assert_eq!(buf, b"hello world");
        conn.consume(6);
        assert_eq!(conn.buffered(), 5);
        let mut rest = [0u8; 5];
        conn.read_exact(&mut rest).await.unwrap();
        assert_eq!(&rest, b"world");
    }

    #[tokio::test]
    async fn test_closed_connection() {
        let (client, _server) = tokio::io::duplex(64);
        let mut conn = Connection::new(Box::new(client), TlsState::Plaintext);
        conn.close();
        assert!(!conn.is_open());
        assert!(conn.write_all(b"x").await.is_err());
        assert_eq!(conn.fill_buf().await.unwrap(), b"");
    }

    #[tokio::test]
    async fn test_prefixed_replays_first() {
        let (client, mut server) = tokio::io::duplex(64);
        server.write_all(b" and more").await.unwrap();
        drop(server);
        let mut prefixed = Prefixed::new(Bytes::from_static(b"buffered"), client);
        let mut out = String::new();
        prefixed.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "buffered and more");
    }

    #[tokio::test]
    async fn test_starttls_reads_buffered_bytes_first() {
        let (client, mut server) = tokio::io::duplex(16384);
        let reads = Arc::new(AtomicUsize::new(0));
        let socket = CountingSocket {
            inner: client,
            reads: reads.clone(),
        };
        let mut conn = Connection::new(Box::new(socket), TlsState::Plaintext);

        // Bytes which arrived right behind <proceed/> sit in the read buffer.
        server.write_all(b"garbage").await.unwrap();
        assert_eq!(conn.fill_buf().await.unwrap(), b"garbage");
        assert_eq!(conn.buffered(), 7);
        let socket_reads = reads.load(Ordering::SeqCst);

        // The server stays silent: a handshake reading the socket first
        // would hang, one fed the buffer first chokes on it at once.
        let result = tokio::time::timeout(Duration::from_secs(10), conn.starttls("example.org"))
            .await
            .expect("handshake waited on the socket");
        assert!(matches!(result, Err(StartTlsError::Tls(_))));
        assert_eq!(reads.load(Ordering::SeqCst), socket_reads);
        assert_eq!(conn.buffered(), 0);
        assert!(!conn.is_open());

        // The ClientHello went out before the buffered bytes were read.
        let mut record_type = [0u8; 1];
        server.read_exact(&mut record_type).await.unwrap();
        assert_eq!(record_type[0], 0x16);
    }
}
