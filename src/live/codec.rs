use std::collections::HashMap;
use std::str::FromStr;

use bytes::{BufMut, BytesMut};
use log::debug;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tokio_util::codec::{Decoder, Encoder};

use crate::live::errors::CodecError;
use crate::live::models::{
    Comment, Element, OutgoingComment, Outbound, PostAcknowledgement, ThreadHandshakeAck,
    ThreadRequest,
};

/// Every fragment on the wire, in both directions, is followed by this byte.
pub const TERMINATOR: u8 = 0;

pub const PROTOCOL_VERSION: &str = "20061206";
pub const BACKLOG_FROM: i64 = -1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ElementKind {
    Thread,
    Chat,
    ChatResult,
}

#[derive(Debug)]
struct Signature {
    kind: ElementKind,
    tag: &'static [u8],
    begin: &'static [u8],
    end: &'static [u8],
}

const SIGNATURES: &[Signature] = &[
    Signature {
        kind: ElementKind::Thread,
        tag: b"thread",
        begin: b"<thread ",
        end: b"/>",
    },
    Signature {
        kind: ElementKind::Chat,
        tag: b"chat",
        begin: b"<chat ",
        end: b"</chat>",
    },
    Signature {
        kind: ElementKind::ChatResult,
        tag: b"chat_result",
        begin: b"<chat_result ",
        end: b"/>",
    },
];

/// Splits the relay byte stream into [`Element`]s and frames outbound
/// fragments.
///
/// A fragment is complete only once its terminator has arrived, so a read
/// that stops right after a closing tag keeps the bytes buffered. Complete
/// fragments that do not decode are dropped and decoding carries on with the
/// next one.
#[derive(Debug)]
pub struct StreamCodec {
    signatures: &'static [Signature],
    // bytes before this offset are known to hold no terminator
    next_index: usize,
}

impl Default for StreamCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamCodec {
    pub fn new() -> Self {
        Self {
            signatures: SIGNATURES,
            next_index: 0,
        }
    }

    /// Extracts every complete element from `buf`, leaving the remainder in place.
    pub fn drain(&mut self, buf: &mut BytesMut) -> Vec<Element> {
        let mut elements = Vec::new();
        while let Ok(Some(element)) = self.decode(buf) {
            elements.push(element);
        }
        elements
    }

    fn decode_fragment(&self, fragment: &[u8]) -> Result<Element, CodecError> {
        let start = fragment
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(fragment.len());
        let fragment = &fragment[start..];

        let signature = self
            .signatures
            .iter()
            .find(|s| fragment.starts_with(s.begin) && fragment.ends_with(s.end))
            .ok_or_else(|| CodecError::Malformed(format!("unknown fragment {}", preview(fragment))))?;

        let (attrs, body_start) = start_tag(fragment, signature.tag)?;
        match signature.kind {
            ElementKind::Thread => Ok(Element::Handshake(ThreadHandshakeAck {
                result_code: attrs.number("resultcode")?,
                last_res: attrs.number("last_res")?,
                ticket: attrs.text("ticket"),
                server_time: attrs.number("server_time")?,
            })),
            ElementKind::Chat => {
                let body_end = fragment.len() - signature.end.len();
                if body_start > body_end {
                    return Err(CodecError::Malformed("chat without body".to_string()));
                }
                let body = std::str::from_utf8(&fragment[body_start..body_end])
                    .map_err(|e| CodecError::Malformed(e.to_string()))?;

                Ok(Element::Comment(Comment {
                    thread: attrs.number("thread")?,
                    no: attrs.number("no")?,
                    vpos: attrs.number("vpos")?,
                    date: attrs.number("date")?,
                    user_id: attrs.text("user_id"),
                    premium: attrs.number("premium")?,
                    anonymity: attrs.number::<i32>("anonymity")? != 0,
                    mail: attrs.text("mail"),
                    ticket: attrs.text("ticket"),
                    post_key: attrs.get("postkey").map(str::to_string),
                    body: body.to_string(),
                    speaker: None,
                }))
            }
            ElementKind::ChatResult => Ok(Element::PostAck(PostAcknowledgement {
                status: attrs.number("status")?,
                no: attrs.number("no")?,
            })),
        }
    }
}

impl Decoder for StreamCodec {
    type Item = Element;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Element>, CodecError> {
        loop {
            let scan_from = self.next_index.min(src.len());
            let Some(offset) = src[scan_from..].iter().position(|b| *b == TERMINATOR) else {
                self.next_index = src.len();
                return Ok(None);
            };

            let frame = src.split_to(scan_from + offset + 1);
            self.next_index = 0;

            match self.decode_fragment(&frame[..frame.len() - 1]) {
                Ok(element) => return Ok(Some(element)),
                Err(e) => debug!("Dropping fragment: {}", e),
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Element>, CodecError> {
        match self.decode(buf)? {
            Some(element) => Ok(Some(element)),
            None => {
                if !buf.is_empty() {
                    debug!("Discarding {} unterminated bytes at end of stream", buf.len());
                    buf.clear();
                    self.next_index = 0;
                }
                Ok(None)
            }
        }
    }
}

impl Encoder<Outbound> for StreamCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Outbound, dst: &mut BytesMut) -> Result<(), CodecError> {
        let fragment = match item {
            Outbound::Thread(request) => encode_thread_request(&request),
            Outbound::Comment(comment) => encode_comment(&comment),
        };

        dst.reserve(fragment.len() + 1);
        dst.extend_from_slice(fragment.as_bytes());
        dst.put_u8(TERMINATOR);
        Ok(())
    }
}

pub fn encode_thread_request(request: &ThreadRequest) -> String {
    format!(
        r#"<thread thread="{}" version="{}" res_from="{}"/>"#,
        request.thread, PROTOCOL_VERSION, BACKLOG_FROM
    )
}

pub fn encode_comment(comment: &OutgoingComment) -> String {
    format!(
        r#"<chat thread="{}" ticket="{}" vpos="{}" postkey="{}" mail="{}" user_id="{}" premium="{}">{}</chat>"#,
        comment.thread,
        escape(&comment.ticket),
        comment.vpos,
        escape(&comment.post_key),
        escape(&comment.mail),
        escape(&comment.user_id),
        comment.premium,
        escape(&comment.text),
    )
}

struct Attributes(HashMap<String, String>);

impl Attributes {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    fn text(&self, key: &str) -> String {
        self.get(key).unwrap_or_default().to_string()
    }

    /// Missing attributes read as zero; present but unparsable ones are malformed.
    fn number<T>(&self, key: &str) -> Result<T, CodecError>
    where
        T: FromStr + Default,
    {
        match self.get(key) {
            None => Ok(T::default()),
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| CodecError::Malformed(format!("{}={:?} is not a number", key, raw))),
        }
    }
}

fn start_tag(fragment: &[u8], name: &[u8]) -> Result<(Attributes, usize), CodecError> {
    let mut reader = Reader::from_reader(fragment);
    let event = reader
        .read_event()
        .map_err(|e| CodecError::Malformed(e.to_string()))?;

    match event {
        Event::Start(tag) | Event::Empty(tag) if tag.name().as_ref() == name => {
            let attrs = attributes(&tag)?;
            Ok((attrs, reader.buffer_position()))
        }
        _ => Err(CodecError::Malformed(format!("expected <{}>", String::from_utf8_lossy(name)))),
    }
}

fn attributes(tag: &BytesStart) -> Result<Attributes, CodecError> {
    let mut attrs = HashMap::new();
    for attr in tag.attributes() {
        let attr = attr.map_err(|e| CodecError::Malformed(e.to_string()))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| CodecError::Malformed(e.to_string()))?
            .to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| CodecError::Malformed(e.to_string()))?
            .into_owned();
        attrs.insert(key, value);
    }
    Ok(Attributes(attrs))
}

fn preview(fragment: &[u8]) -> String {
    let head = &fragment[..fragment.len().min(32)];
    String::from_utf8_lossy(head).into_owned()
}
