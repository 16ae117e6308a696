// Copyright (c) 2026 jabber-simple contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::sync::{Arc, Mutex};

use futures::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use super::*;

const SERVER_HEADER: &str = "<?xml version='1.0'?><stream:stream xmlns='jabber:client' xmlns:stream='http://etherx.jabber.org/streams' id='abc' from='example.org' version='1.0'>";

fn pair() -> (XmlStream, DuplexStream) {
    let (client, server) = tokio::io::duplex(65536);
    let connection = Connection::new(Box::new(client), TlsState::Plaintext);
    (XmlStream::new(connection, ns::JABBER_CLIENT), server)
}

async fn read_string(server: &mut DuplexStream, len: usize) -> String {
    let mut buf = vec![0u8; len];
    server.read_exact(&mut buf).await.unwrap();
    String::from_utf8(buf).unwrap()
}

async fn opened() -> (XmlStream, DuplexStream) {
    let (mut stream, mut server) = pair();
    server.write_all(SERVER_HEADER.as_bytes()).await.unwrap();
    stream.initiate("example.org").await.unwrap();
    (stream, server)
}

#[tokio::test]
async fn test_header_exchange() {
    let (mut stream, mut server) = pair();
    stream.send_header("example.org").await.unwrap();
    let expected = "<?xml version='1.0'?><stream:stream to='example.org' version='1.0' xmlns='jabber:client' xmlns:stream='http://etherx.jabber.org/streams'>";
    assert_eq!(read_string(&mut server, expected.len()).await, expected);

    server.write_all(SERVER_HEADER.as_bytes()).await.unwrap();
    let header = stream.recv_header().await.unwrap();
    assert_eq!(header.id.as_deref(), Some("abc"));
    assert_eq!(header.from.as_deref(), Some("example.org"));
    assert_eq!(stream.header(), Some(&header));
}

#[tokio::test]
async fn test_header_requires_version() {
    let (mut stream, mut server) = pair();
    server
        .write_all(b"<stream:stream xmlns='jabber:client' xmlns:stream='http://etherx.jabber.org/streams' id='abc'>")
        .await
        .unwrap();
    let err = stream.recv_header().await.unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidData);
}

#[tokio::test]
async fn test_header_rejects_other_root() {
    let (mut stream, mut server) = pair();
    server
        .write_all(b"<html xmlns='http://www.w3.org/1999/xhtml'>")
        .await
        .unwrap();
    assert!(stream.recv_header().await.is_err());
}

#[tokio::test]
async fn test_elements_between_keepalives() {
    let (mut stream, mut server) = opened().await;
    server
        .write_all(b" <message type='chat' from='a@example.org'><body>hi</body></message>\n \n<presence/>")
        .await
        .unwrap();

    let message = stream.next().await.unwrap().unwrap();
    assert!(message.is("message", ns::JABBER_CLIENT));
    assert_eq!(
        message.get_child("body", ns::JABBER_CLIENT).unwrap().text(),
        "hi"
    );
    let presence = stream.next().await.unwrap().unwrap();
    assert!(presence.is("presence", ns::JABBER_CLIENT));
}

#[tokio::test]
async fn test_element_split_across_reads() {
    let (mut stream, mut server) = opened().await;
    let reader = tokio::spawn(async move {
        let element = stream.next().await.unwrap().unwrap();
        assert_eq!(element.attr("id"), Some("split"));
    });
    server.write_all(b"<iq type='get' i").await.unwrap();
    tokio::task::yield_now().await;
    server.write_all(b"d='split'/>").await.unwrap();
    reader.await.unwrap();
}

#[tokio::test]
async fn test_footer_closes() {
    let (mut stream, mut server) = opened().await;
    server.write_all(b"</stream:stream>").await.unwrap();
    assert!(matches!(stream.next().await, Some(Err(IoError::Closed))));
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_eof_closes() {
    let (mut stream, server) = opened().await;
    drop(server);
    assert!(matches!(stream.next().await, Some(Err(IoError::Closed))));
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_text_outside_element_resets() {
    let (mut stream, mut server) = opened().await;
    server.write_all(b"garbage<presence/>").await.unwrap();
    assert!(matches!(stream.next().await, Some(Err(IoError::Reset(_)))));
}

#[tokio::test]
async fn test_send_element() {
    let (mut stream, mut server) = pair();
    let message = Element::builder("message", ns::JABBER_CLIENT)
        .attr("to", "b@example.org")
        .attr("type", "chat")
        .append(Element::builder("body", ns::JABBER_CLIENT).append("<3"))
        .build();
    stream.send_element(&message).await.unwrap();
    stream.close().await.unwrap();
    let mut sent = String::new();
    server.read_to_string(&mut sent).await.unwrap();

    let (element, footer) = sent.split_at(sent.len() - "</stream:stream>".len());
    assert_eq!(footer, "</stream:stream>");
    let echoed: Element = element.parse().unwrap();
    assert!(echoed.is("message", ns::JABBER_CLIENT));
    assert_eq!(echoed.attr("to"), Some("b@example.org"));
    assert_eq!(
        echoed.get_child("body", ns::JABBER_CLIENT).unwrap().text(),
        "<3"
    );
}

#[tokio::test]
async fn test_traffic_reaches_logger() {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink_lines = lines.clone();
    let (mut stream, mut server) = pair();
    stream.set_logger(Logger::new(Arc::new(move |level, line: &str| {
        sink_lines.lock().unwrap().push((level, line.to_owned()));
    })));

    stream.send_header("example.org").await.unwrap();
    server.write_all(SERVER_HEADER.as_bytes()).await.unwrap();
    stream.recv_header().await.unwrap();
    server.write_all(b"<presence/>").await.unwrap();
    stream.next().await.unwrap().unwrap();

    let lines = lines.lock().unwrap();
    assert!(lines.iter().all(|(level, _)| *level == Level::Trace));
    assert!(lines[0].1.starts_with("SEND: <?xml version='1.0'?><stream:stream"));
    assert!(lines[1].1.starts_with("RECV: stream header"));
    assert!(lines[2].1.starts_with("RECV: <presence"));
    assert!(stream.connection().logger().has_sink());
}

#[tokio::test]
async fn test_reset_restarts_stream() {
    let (mut stream, mut server) = opened().await;
    server
        .write_all(b"<success xmlns='urn:ietf:params:xml:ns:xmpp-sasl'/>")
        .await
        .unwrap();
    let success = stream.next().await.unwrap().unwrap();
    assert!(success.is("success", ns::SASL));

    stream.reset();
    assert!(stream.header().is_none());
    server.write_all(SERVER_HEADER.as_bytes()).await.unwrap();
    let header = stream.initiate("example.org").await.unwrap();
    assert_eq!(header.id.as_deref(), Some("abc"));
    server.write_all(b"<presence/>").await.unwrap();
    assert!(stream.next().await.unwrap().is_ok());
}

#[tokio::test]
async fn test_close_sends_footer_once() {
    let (mut stream, mut server) = pair();
    stream.close().await.unwrap();
    stream.close().await.unwrap();
    let mut rest = String::new();
    server.read_to_string(&mut rest).await.unwrap();
    assert_eq!(rest, "</stream:stream>");
    assert!(!stream.connection().is_open());
}
