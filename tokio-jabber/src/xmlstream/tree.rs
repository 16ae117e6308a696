// Copyright (c) 2026 jabber-simple contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Assemble [`minidom::Element`]s out of the namespace-resolved events of
//! the stream parser.

use std::io;

use log::debug;
use minidom::Element;
use rxml::{AttrMap, Event};

/// Namespace of the predeclared `xml:` prefix.
const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

fn is_xml_whitespace(s: &str) -> bool {
    s.bytes().all(|b| matches!(b, b' ' | b'\t' | b'\r' | b'\n'))
}

fn element_from_start(ns: &str, name: &str, attrs: AttrMap) -> Element {
    let mut elem = Element::bare(name, ns);
    for ((attr_ns, attr_name), value) in attrs.into_iter() {
        let attr_ns = attr_ns.to_string();
        if attr_ns.is_empty() {
            elem.set_attr(attr_name.to_string(), value.to_string());
        } else if attr_ns == XML_NS {
            elem.set_attr(format!("xml:{}", attr_name), value.to_string());
        } else {
            debug!("Dropping attribute {{{}}}{} on <{}/>", attr_ns, attr_name, name);
        }
    }
    elem
}

/// Stack of the elements currently open below the stream root.
#[derive(Debug, Default)]
pub(crate) struct TreeBuilder {
    stack: Vec<Element>,
}

impl TreeBuilder {
    pub(crate) fn new() -> TreeBuilder {
        TreeBuilder::default()
    }

    /// Whether no element is currently open.
    pub(crate) fn is_idle(&self) -> bool {
        self.stack.is_empty()
    }

    /// Feed one event, returning the top-level element it completes.
    ///
    /// Whitespace between top-level elements is dropped; any other text
    /// there is an error. Callers check [`TreeBuilder::is_idle`] before
    /// feeding an end event, which would close the stream root.
    pub(crate) fn feed(&mut self, ev: Event) -> io::Result<Option<Element>> {
        match ev {
            Event::XmlDeclaration(_, _) if self.is_idle() => Ok(None),
            Event::XmlDeclaration(_, _) => Err(invalid("XML declaration inside element")),
            Event::StartElement(_, (ns, name), attrs) => {
                let elem = element_from_start(&ns.to_string(), &name.to_string(), attrs);
                self.stack.push(elem);
                Ok(None)
            }
            Event::Text(_, data) => {
                let text: &str = &data;
                match self.stack.last_mut() {
                    Some(parent) => {
                        if !text.is_empty() {
                            parent.append_text_node(text);
                        }
                        Ok(None)
                    }
                    None if is_xml_whitespace(text) => Ok(None),
                    None => Err(invalid("text outside of any element")),
                }
            }
            Event::EndElement(_) => {
                let Some(elem) = self.stack.pop() else {
                    return Err(invalid("end of element while idle"));
                };
                match self.stack.last_mut() {
                    Some(parent) => {
                        parent.append_child(elem);
                        Ok(None)
                    }
                    None => Ok(Some(elem)),
                }
            }
        }
    }
}

fn invalid(msg: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}
