//! C3: message record — typed header fields + MIME body tree (spec §3, §4.3).
//!
//! Construction from the wire reads field lines `xyz=value` until a
//! `text` sentinel, then reads the body until `000`, mirroring
//! `original_source/webcit-ng/server/messages.c`'s field parser.

use std::collections::BTreeMap;

/// Field mnemonics recognized by the semantic layer (spec §3 table).
/// Unknown mnemonics are preserved in `Message::extra_fields` but ignored
/// here, per spec §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Field {
    Author,
    Euid,
    FromAddr,
    MsgId,
    Journal,
    ReplyTo,
    ListId,
    Node,
    Path,
    Recipient,
    Special,
    Timestamp,
    Subject,
    EnvelopeTo,
    References,
    Cc,
    HeadersOnly,
    OriginalRoom,
    FormatType,
}

impl Field {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Field::Author => "A",
            Field::Euid => "E",
            Field::FromAddr => "F",
            Field::MsgId => "I",
            Field::Journal => "J",
            Field::ReplyTo => "K",
            Field::ListId => "L",
            Field::Node => "N",
            Field::Path => "P",
            Field::Recipient => "R",
            Field::Special => "S",
            Field::Timestamp => "T",
            Field::Subject => "U",
            Field::EnvelopeTo => "V",
            Field::References => "W",
            Field::Cc => "Y",
            Field::HeadersOnly => "H",
            Field::OriginalRoom => "O",
            Field::FormatType => "F2",
        }
    }

    pub fn from_mnemonic(s: &str) -> Option<Field> {
        Some(match s {
            "A" => Field::Author,
            "E" => Field::Euid,
            "F" => Field::FromAddr,
            "I" => Field::MsgId,
            "J" => Field::Journal,
            "K" => Field::ReplyTo,
            "L" => Field::ListId,
            "N" => Field::Node,
            "P" => Field::Path,
            "R" => Field::Recipient,
            "S" => Field::Special,
            "T" => Field::Timestamp,
            "U" => Field::Subject,
            "V" => Field::EnvelopeTo,
            "W" => Field::References,
            "Y" => Field::Cc,
            "H" => Field::HeadersOnly,
            "O" => Field::OriginalRoom,
            "F2" => Field::FormatType,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatType {
    Legacy = 0,
    Flat = 1,
    Mime = 4,
}

impl FormatType {
    pub fn from_code(n: i32) -> FormatType {
        match n {
            1 => FormatType::Flat,
            4 => FormatType::Mime,
            _ => FormatType::Legacy,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MimePart {
    pub content_type: String,
    pub charset: Option<String>,
    pub disposition: Option<String>,
    pub transfer_encoding: Option<String>,
    pub filename: Option<String>,
    pub data: Vec<u8>,
}

impl MimePart {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Decode this part's bytes to text, applying its declared
    /// transfer-encoding (spec §4.2's body decoders).
    pub fn decoded_text(&self) -> String {
        let raw = match self.transfer_encoding.as_deref() {
            Some(te) if te.eq_ignore_ascii_case("base64") => {
                crate::mime::base64_decode(&self.data).unwrap_or_default()
            }
            Some(te) if te.eq_ignore_ascii_case("quoted-printable") => {
                crate::mime::quoted_printable_decode(&self.data, false)
            }
            _ => self.data.clone(),
        };
        String::from_utf8_lossy(&raw).into_owned()
    }
}

#[derive(Debug, Clone)]
pub enum Body {
    /// Legacy/flat plain text body.
    Flat(String),
    /// A MIME tree: multipart/alternative or multipart/mixed container,
    /// or a single leaf part.
    Mime(MimeNode),
}

#[derive(Debug, Clone)]
pub enum MimeNode {
    Leaf(MimePart),
    Multipart {
        subtype: MultipartKind,
        parts: Vec<MimeNode>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultipartKind {
    Alternative,
    Mixed,
}

#[derive(Debug, Clone)]
pub struct Message {
    /// Globally unique monotonic numeric id; `None` until committed.
    pub msgnum: Option<i64>,
    pub fields: BTreeMap<Field, String>,
    /// Unrecognized mnemonics, preserved verbatim (spec §4.3).
    pub extra_fields: BTreeMap<String, String>,
    pub body: Body,
}

impl Message {
    pub fn new(body: Body) -> Self {
        Message {
            msgnum: None,
            fields: BTreeMap::new(),
            extra_fields: BTreeMap::new(),
            body,
        }
    }

    pub fn set(&mut self, field: Field, value: impl Into<String>) -> &mut Self {
        self.fields.insert(field, value.into());
        self
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    pub fn euid(&self) -> Option<&str> {
        self.get(Field::Euid)
    }

    pub fn subject(&self) -> Option<&str> {
        self.get(Field::Subject)
    }

    pub fn format_type(&self) -> FormatType {
        self.get(Field::FormatType)
            .and_then(|s| s.parse::<i32>().ok())
            .map(FormatType::from_code)
            .unwrap_or(match &self.body {
                Body::Flat(_) => FormatType::Flat,
                Body::Mime(_) => FormatType::Mime,
            })
    }

    /// Local-origin is derived from the `N` field matching this node's
    /// configured short name (spec §4.3).
    pub fn is_local(&self, node_name: &str) -> bool {
        match self.get(Field::Node) {
            Some(n) => n == node_name,
            None => true,
        }
    }

    /// Flat text representation of the body, for search/summary purposes.
    pub fn body_text(&self) -> String {
        match &self.body {
            Body::Flat(s) => s.clone(),
            Body::Mime(node) => mime_node_text(node),
        }
    }

    /// Parse a wire-format message: lines `mnemonic=value` until a bare
    /// `text` sentinel, then body lines until a bare `000` terminator
    /// (spec §4.3, the `MSG0`/`MSG2`/`MSG4` wire shape).
    pub fn parse_wire(lines: &[String]) -> Message {
        let mut fields = BTreeMap::new();
        let mut extra_fields = BTreeMap::new();
        let mut i = 0;
        while i < lines.len() {
            let line = &lines[i];
            if line == "text" {
                i += 1;
                break;
            }
            if let Some((mnemonic, value)) = line.split_once('=') {
                match Field::from_mnemonic(mnemonic) {
                    Some(f) => {
                        fields.insert(f, value.to_string());
                    }
                    None => {
                        extra_fields.insert(mnemonic.to_string(), value.to_string());
                    }
                }
            }
            i += 1;
        }
        let body_lines: Vec<&str> = lines[i..]
            .iter()
            .take_while(|l| l.as_str() != "000")
            .map(String::as_str)
            .collect();
        let body = Body::Flat(body_lines.join("\n"));

        Message {
            msgnum: None,
            fields,
            extra_fields,
            body,
        }
    }

    /// Serialize to the wire field-line format (without the `000`
    /// terminator, which the protocol layer appends).
    pub fn to_wire_lines(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .fields
            .iter()
            .map(|(f, v)| format!("{}={}", f.mnemonic(), v))
            .collect();
        for (k, v) in &self.extra_fields {
            out.push(format!("{k}={v}"));
        }
        out.push("text".to_string());
        match &self.body {
            Body::Flat(s) => out.extend(s.lines().map(str::to_string)),
            Body::Mime(node) => out.push(mime_node_text(node)),
        }
        out
    }
}

fn mime_node_text(node: &MimeNode) -> String {
    match node {
        MimeNode::Leaf(part) if part.content_type.starts_with("text/") => part.decoded_text(),
        MimeNode::Leaf(_) => String::new(),
        MimeNode::Multipart { subtype, parts } => {
            match subtype {
                MultipartKind::Alternative => parts
                    .iter()
                    .rev()
                    .find(|p| matches!(p, MimeNode::Leaf(l) if l.content_type == "text/plain"))
                    .or_else(|| parts.first())
                    .map(mime_node_text)
                    .unwrap_or_default(),
                MultipartKind::Mixed => parts
                    .iter()
                    .map(mime_node_text)
                    .collect::<Vec<_>>()
                    .join("\n"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_field_lines_then_body() {
        let lines: Vec<String> = vec![
            "A=alice".into(),
            "U=hello".into(),
            "E=abc-123".into(),
            "text".into(),
            "line one".into(),
            "line two".into(),
            "000".into(),
        ];
        let msg = Message::parse_wire(&lines);
        assert_eq!(msg.get(Field::Author), Some("alice"));
        assert_eq!(msg.get(Field::Subject), Some("hello"));
        assert_eq!(msg.euid(), Some("abc-123"));
        assert_eq!(msg.body_text(), "line one\nline two");
    }

    #[test]
    fn unknown_mnemonic_preserved_but_ignored() {
        let lines: Vec<String> = vec!["Q=mystery".into(), "text".into(), "000".into()];
        let msg = Message::parse_wire(&lines);
        assert_eq!(msg.extra_fields.get("Q"), Some(&"mystery".to_string()));
        assert_eq!(msg.get(Field::Author), None);
    }

    #[test]
    fn local_origin_matches_node_name() {
        let mut msg = Message::new(Body::Flat("hi".into()));
        msg.set(Field::Node, "citadel");
        assert!(msg.is_local("citadel"));
        assert!(!msg.is_local("othernode"));
    }

    #[test]
    fn mime_alternative_prefers_last_text_plain() {
        let node = MimeNode::Multipart {
            subtype: MultipartKind::Alternative,
            parts: vec![
                MimeNode::Leaf(MimePart {
                    content_type: "text/html".into(),
                    charset: None,
                    disposition: None,
                    transfer_encoding: None,
                    filename: None,
                    data: b"<p>hi</p>".to_vec(),
                }),
                MimeNode::Leaf(MimePart {
                    content_type: "text/plain".into(),
                    charset: None,
                    disposition: None,
                    transfer_encoding: None,
                    filename: None,
                    data: b"hi plain".to_vec(),
                }),
            ],
        };
        assert_eq!(mime_node_text(&node), "hi plain");
    }
}
