// Copyright (c) 2026 jabber-simple contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! # RFC 6120 XML Streams
//!
//! **Note:** The XML stream is a low-level API which you should probably not
//! use directly.
//!
//! An [`XmlStream`] owns a [`Connection`] and frames it into top-level
//! elements. Establishing a stream is a multi-step process:
//!
//! 1. [`XmlStream::send_header`] opens our side of the stream.
//! 2. [`XmlStream::recv_header`] reads the peer's stream header.
//! 3. Top-level elements are then read by polling the stream
//!    ([`futures::Stream`]) and written with [`XmlStream::send_element`].
//!
//! After STARTTLS or SASL success both sides start over with a fresh
//! header: call [`XmlStream::reset`] and go back to step 1.

use core::pin::Pin;
use core::task::{Context, Poll};
use std::io;

use futures::{ready, Stream};
use log::Level;
use minidom::Element;
use rxml::{Event, Namespace};
use tokio::io::AsyncWriteExt;

use crate::connect::StartTlsError;
use crate::connection::{Connection, TlsState};
use crate::error::IoError;
use crate::log_to;
use crate::logging::Logger;
use crate::ns;

mod tree;
use tree::TreeBuilder;

#[cfg(test)]
mod tests;

/// Contents of the stream header sent by the peer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamHeader {
    /// The optional `from` attribute.
    pub from: Option<String>,

    /// The optional `to` attribute.
    pub to: Option<String>,

    /// The optional `id` attribute.
    pub id: Option<String>,
}

/// An XML stream over a [`Connection`].
pub struct XmlStream {
    reader: Pin<Box<rxml::AsyncReader<Connection>>>,
    tree: TreeBuilder,
    stream_ns: &'static str,
    header: Option<StreamHeader>,
    footer_received: bool,
    logger: Logger,
}

impl core::fmt::Debug for XmlStream {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("XmlStream")
            .field("connection", self.reader.inner())
            .field("stream_ns", &self.stream_ns)
            .field("header", &self.header)
            .finish()
    }
}

fn invalid_data<E: Into<Box<dyn std::error::Error + Send + Sync>>>(e: E) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e)
}

/// Serialise an element on its own, declaring the namespaces it needs.
pub fn element_to_string(element: &Element) -> io::Result<String> {
    let mut out = Vec::new();
    element.write_to(&mut out).map_err(invalid_data)?;
    String::from_utf8(out).map_err(invalid_data)
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('\'', "&apos;")
}

impl XmlStream {
    /// Wrap a connection. Nothing is exchanged yet.
    pub fn new(connection: Connection, stream_ns: &'static str) -> XmlStream {
        let logger = connection.logger().clone();
        XmlStream {
            reader: Box::pin(rxml::AsyncReader::wrap(connection, rxml::Parser::default())),
            tree: TreeBuilder::new(),
            stream_ns,
            header: None,
            footer_received: false,
            logger,
        }
    }

    /// Report traffic and errors through `logger`, on this stream and the
    /// connection underneath.
    pub fn set_logger(&mut self, logger: Logger) {
        self.reader
            .as_mut()
            .inner_pinned()
            .get_mut()
            .set_logger(logger.clone());
        self.logger = logger;
    }

    /// The logger of this stream.
    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// The connection underneath.
    pub fn connection(&self) -> &Connection {
        self.reader.inner()
    }

    /// TLS state of the connection underneath.
    pub fn tls_state(&self) -> TlsState {
        self.connection().tls_state()
    }

    /// The last stream header received from the peer.
    pub fn header(&self) -> Option<&StreamHeader> {
        self.header.as_ref()
    }

    /// Forget the parser state so that a new stream can begin on the same
    /// connection.
    pub fn reset(&mut self) {
        *self.reader.as_mut().parser_pinned() = rxml::Parser::default();
        self.tree = TreeBuilder::new();
        self.header = None;
        self.footer_received = false;
    }

    /// Write raw bytes and flush them.
    pub async fn send_raw(&mut self, data: &str) -> io::Result<()> {
        log_to!(self.logger, Level::Trace, "SEND: {}", data);
        let connection = self.reader.as_mut().inner_pinned().get_mut();
        connection.write_all(data.as_bytes()).await?;
        connection.flush().await
    }

    /// Serialise and write one top-level element.
    pub async fn send_element(&mut self, element: &Element) -> io::Result<()> {
        let data = element_to_string(element)?;
        self.send_raw(&data).await
    }

    /// Open our side of the stream.
    pub async fn send_header(&mut self, to: &str) -> io::Result<()> {
        let header = format!(
            "<?xml version='1.0'?><stream:stream to='{}' version='1.0' xmlns='{}' xmlns:stream='{}'>",
            escape_attr(to),
            self.stream_ns,
            ns::STREAM,
        );
        self.send_raw(&header).await
    }

    /// Read the peer's stream header.
    pub async fn recv_header(&mut self) -> io::Result<StreamHeader> {
        loop {
            let ev = futures::future::poll_fn(|cx| self.reader.as_mut().poll_read(cx)).await?;
            match ev {
                Some(Event::StartElement(_, (ns, name), mut attrs)) => {
                    if ns != ns::STREAM || name != "stream" {
                        return Err(invalid_data("unknown stream header"));
                    }

                    match attrs.remove(Namespace::none(), "version") {
                        Some(v) => {
                            if v != "1.0" {
                                return Err(invalid_data(format!(
                                    "unsupported stream version: {}",
                                    v
                                )));
                            }
                        }
                        None => return Err(invalid_data("required `version` attribute missing")),
                    }

                    let header = StreamHeader {
                        from: attrs.remove(Namespace::none(), "from"),
                        to: attrs.remove(Namespace::none(), "to"),
                        id: attrs.remove(Namespace::none(), "id"),
                    };
                    log_to!(self.logger, Level::Trace, "RECV: stream header {:?}", header);
                    self.header = Some(header.clone());
                    return Ok(header);
                }
                Some(Event::Text(_, _)) | Some(Event::EndElement(_)) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "unexpected content before stream header",
                    ))
                }
                // The parser rejects a second declaration, so this cannot loop
                // forever.
                Some(Event::XmlDeclaration(_, _)) => (),
                None => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "eof before stream header",
                    ))
                }
            }
        }
    }

    /// Send our header and read the peer's.
    pub async fn initiate(&mut self, to: &str) -> io::Result<StreamHeader> {
        self.send_header(to).await?;
        self.recv_header().await
    }

    /// Upgrade the connection to TLS. The caller must [`reset`][Self::reset]
    /// and re-initiate the stream afterwards.
    pub async fn starttls(&mut self, domain: &str) -> Result<(), StartTlsError> {
        log_to!(self.logger, Level::Debug, "Starting TLS handshake with {}", domain);
        self.reader
            .as_mut()
            .inner_pinned()
            .get_mut()
            .starttls(domain)
            .await
    }

    /// Send the stream footer and shut the connection down.
    pub async fn close(&mut self) -> io::Result<()> {
        let connection = self.reader.as_mut().inner_pinned().get_mut();
        if !connection.is_open() {
            return Ok(());
        }
        log_to!(self.logger, Level::Trace, "SEND: </stream:stream>");
        let result = async {
            connection.write_all(b"</stream:stream>").await?;
            connection.shutdown().await
        }
        .await;
        connection.close();
        result
    }

    fn poll_element(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<Element, IoError>>> {
        if self.footer_received {
            return Poll::Ready(None);
        }
        loop {
            // Whitespace keepalives between elements are not worth buffering.
            let text_buffering = !self.tree.is_idle();
            self.reader
                .as_mut()
                .parser_pinned()
                .set_text_buffering(text_buffering);
            let ev = match ready!(self.reader.as_mut().poll_read(cx)) {
                Ok(Some(ev)) => ev,
                Ok(None) => {
                    self.footer_received = true;
                    return Poll::Ready(Some(Err(IoError::Closed)));
                }
                Err(e) => {
                    self.footer_received = true;
                    return Poll::Ready(Some(Err(IoError::from_io(e))));
                }
            };
            if let Event::EndElement(_) = ev {
                if self.tree.is_idle() {
                    log_to!(self.logger, Level::Trace, "RECV: </stream:stream>");
                    self.footer_received = true;
                    return Poll::Ready(Some(Err(IoError::Closed)));
                }
            }
            match self.tree.feed(ev) {
                Ok(Some(element)) => {
                    if log::log_enabled!(Level::Trace) || self.logger.has_sink() {
                        if let Ok(data) = element_to_string(&element) {
                            log_to!(self.logger, Level::Trace, "RECV: {}", data);
                        }
                    }
                    return Poll::Ready(Some(Ok(element)));
                }
                Ok(None) => (),
                Err(e) => {
                    log_to!(self.logger, Level::Debug, "Dropping the stream: {}", e);
                    self.footer_received = true;
                    return Poll::Ready(Some(Err(IoError::Reset(e))));
                }
            }
        }
    }
}

impl Stream for XmlStream {
    type Item = Result<Element, IoError>;

    /// Yields top-level elements until the stream ends. The end is reported
    /// once as an error, [`IoError::Closed`] for an orderly close, after
    /// which the stream is exhausted.
    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().poll_element(cx)
    }
}
