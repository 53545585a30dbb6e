//! PDF Object Model
//!
//! Values produced by the scanner (ISO 32000-1 Section 7.3). Every value parsed from
//! the input remembers its byte range; synthetic values built by post-passes do not.

use super::decode::DecodedStream;
use super::lexer::latin1;
use crate::analysis::ElementRef;
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, OnceLock};

/// Shared input buffer. Streams keep a handle so their payload can be re-sliced
/// against the declared `/Length` long after the scan is over.
pub type Source = Arc<[u8]>;

/// Object number and generation of an indirect object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ObjectId {
    pub number: i32,
    pub generation: i32,
}

impl ObjectId {
    /// Object number reserved for trailer pseudo-objects
    pub const TRAILER_NUMBER: i32 = -1;

    pub fn new(number: i32, generation: i32) -> Self {
        Self { number, generation }
    }

    /// Id of the `counter`-th trailer found in the file
    pub fn trailer(counter: i32) -> Self {
        Self::new(Self::TRAILER_NUMBER, counter)
    }

    pub fn is_trailer(&self) -> bool {
        self.number == Self::TRAILER_NUMBER
    }

    /// `(0, 0)` is used for objects whose id could not be recovered
    pub fn is_undefined(&self) -> bool {
        self.number == 0 && self.generation == 0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_undefined() {
            write!(f, "undefined")
        } else if self.is_trailer() {
            write!(f, "trailer #{}", self.generation)
        } else {
            write!(f, "{} {}", self.number, self.generation)
        }
    }
}

/// Half-open byte range `[start, end)` in a source buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// PDF Number object, kept verbatim as written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfNumber(pub String);

impl PdfNumber {
    /// Check the `[+-]?\d*\.?\d*` shape with at least one digit
    pub fn is_numeric(token: &[u8]) -> bool {
        let body = match token.first() {
            Some(b'+') | Some(b'-') => &token[1..],
            _ => token,
        };
        let (integer, fraction) = match body.iter().position(|&b| b == b'.') {
            Some(dot) => (&body[..dot], &body[dot + 1..]),
            None => (body, &body[body.len()..]),
        };
        let all_digits = |part: &[u8]| part.iter().all(u8::is_ascii_digit);
        all_digits(integer) && all_digits(fraction) && (!integer.is_empty() || !fraction.is_empty())
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.0.parse::<f64>().ok()
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self.0.parse::<i64>() {
            Ok(value) => Some(value),
            Err(_) => self
                .as_f64()
                .filter(|value| value.fract() == 0.0 && value.abs() < i64::MAX as f64)
                .map(|value| value as i64),
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        self.as_i64().and_then(|value| i32::try_from(value).ok())
    }

    pub fn as_usize(&self) -> Option<usize> {
        self.as_i64().and_then(|value| usize::try_from(value).ok())
    }
}

/// PDF Name object, stored without its leading slash and with `#XX` escapes decoded
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PdfName(pub String);

impl PdfName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Build a name from its raw token (including the slash)
    pub fn from_token(token: &[u8]) -> Self {
        let body = token.strip_prefix(b"/").unwrap_or(token);
        let mut decoded = Vec::with_capacity(body.len());
        let mut i = 0;
        while i < body.len() {
            if body[i] == b'#' {
                let escaped = body
                    .get(i + 1..i + 3)
                    .filter(|hex| hex.iter().all(u8::is_ascii_hexdigit))
                    .and_then(|hex| std::str::from_utf8(hex).ok())
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok());
                if let Some(byte) = escaped {
                    decoded.push(byte);
                    i += 3;
                    continue;
                }
            }
            decoded.push(body[i]);
            i += 1;
        }
        Self(latin1(&decoded))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PdfName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0)
    }
}

/// PDF String object (literal or hexadecimal)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfString {
    pub bytes: Vec<u8>,
    pub hex: bool,
    /// Plain text once the string decryption pass has run
    pub decrypted: Option<Vec<u8>>,
}

impl PdfString {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            hex: false,
            decrypted: None,
        }
    }

    pub fn hex(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            hex: true,
            decrypted: None,
        }
    }

    /// Decrypted bytes when available, raw bytes otherwise
    pub fn value(&self) -> &[u8] {
        self.decrypted.as_deref().unwrap_or(&self.bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_text(&self) -> String {
        latin1(self.value())
    }
}

/// PDF Array object
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PdfArray(pub Vec<PdfValue>);

impl PdfArray {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PdfValue> {
        self.0.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PdfValue> {
        self.0.iter()
    }

    pub fn push(&mut self, value: PdfValue) {
        self.0.push(value);
    }
}

/// PDF Dictionary object. Entries keep their written order; duplicated keys are
/// kept and lookups return the first one.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PdfDictionary(pub Vec<(PdfName, PdfValue)>);

impl PdfDictionary {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Direct (non dereferenced) lookup
    pub fn get(&self, key: &str) -> Option<&PdfValue> {
        self.0
            .iter()
            .find(|(name, _)| name.as_str() == key)
            .map(|(_, value)| value)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: PdfValue) {
        self.0.push((PdfName::new(key), value));
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some_and(|value| !value.is_null())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &PdfName> {
        self.0.iter().map(|(name, _)| name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PdfName, &PdfValue)> {
        self.0.iter().map(|(name, value)| (name, value))
    }

    /// `/Type` when it is written as a direct name
    pub fn get_type(&self) -> Option<&str> {
        self.get("Type").and_then(|value| value.as_name()).map(PdfName::as_str)
    }
}

/// PDF Stream object: a dictionary plus a payload range in a source buffer
#[derive(Debug, Clone)]
pub struct PdfStream {
    pub dict: PdfDictionary,
    source: Source,
    range: Span,
    /// The two bytes following the payload, used to explain `/Length` mismatches
    pub(crate) extra: [u8; 2],
    pub(crate) owner: Option<ObjectId>,
    pub(crate) revision: usize,
    pub(crate) element: ElementRef,
    pub(crate) decoded: OnceLock<DecodedStream>,
}

impl PdfStream {
    pub(crate) fn new(
        dict: PdfDictionary,
        source: Source,
        range: Span,
        extra: [u8; 2],
        owner: Option<ObjectId>,
        revision: usize,
        element: ElementRef,
    ) -> Self {
        Self {
            dict,
            source,
            range,
            extra,
            owner,
            revision,
            element,
            decoded: OnceLock::new(),
        }
    }

    /// A stream whose payload is already plain data (rebuilt JavaScript or XFA)
    pub(crate) fn synthetic(
        dict: PdfDictionary,
        data: Vec<u8>,
        owner: Option<ObjectId>,
        revision: usize,
        element: ElementRef,
    ) -> Self {
        let range = Span::new(0, data.len());
        let decoded = DecodedStream::plain(data.clone());
        Self {
            dict,
            source: Arc::from(data),
            range,
            extra: [0, 0],
            owner,
            revision,
            element,
            decoded: OnceLock::from(decoded),
        }
    }

    /// Raw payload as found between `stream` and `endstream`
    pub fn encoded_data(&self) -> &[u8] {
        &self.source[self.range.start..self.range.end]
    }

    /// Byte range of the payload in its source buffer
    pub fn range(&self) -> Span {
        self.range
    }

    pub fn parsed_length(&self) -> usize {
        self.range.len()
    }

    /// `declared` bytes of the source starting at the payload, if they fit in the buffer
    pub(crate) fn declared_slice(&self, declared: usize) -> Option<&[u8]> {
        let end = self.range.start.checked_add(declared)?;
        self.source.get(self.range.start..end)
    }

    /// Id of the indirect object owning this stream
    pub fn owner(&self) -> Option<ObjectId> {
        self.owner
    }

    pub fn revision(&self) -> usize {
        self.revision
    }

    /// Decoded payload, if decoding already ran
    pub fn cached_decoded(&self) -> Option<&DecodedStream> {
        self.decoded.get()
    }
}

impl PartialEq for PdfStream {
    fn eq(&self, other: &Self) -> bool {
        self.dict == other.dict && self.encoded_data() == other.encoded_data()
    }
}

/// PDF Object types
#[derive(Debug, Clone, PartialEq)]
pub enum PdfObject {
    Null,
    Boolean(bool),
    Number(PdfNumber),
    Name(PdfName),
    String(PdfString),
    Array(PdfArray),
    Dictionary(PdfDictionary),
    Stream(PdfStream),
    Reference(ObjectId),
    /// Opaque token preserved verbatim
    Unknown(String),
}

impl PdfObject {
    pub fn type_name(&self) -> &'static str {
        match self {
            PdfObject::Null => "Null",
            PdfObject::Boolean(_) => "Boolean",
            PdfObject::Number(_) => "Number",
            PdfObject::Name(_) => "Name",
            PdfObject::String(_) => "String",
            PdfObject::Array(_) => "Array",
            PdfObject::Dictionary(_) => "Dictionary",
            PdfObject::Stream(_) => "Stream",
            PdfObject::Reference(_) => "Reference",
            PdfObject::Unknown(_) => "Unknown",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, PdfObject::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PdfObject::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<&PdfNumber> {
        match self {
            PdfObject::Number(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        self.as_number().and_then(PdfNumber::as_i64)
    }

    pub fn as_name(&self) -> Option<&PdfName> {
        match self {
            PdfObject::Name(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&PdfString> {
        match self {
            PdfObject::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&PdfArray> {
        match self {
            PdfObject::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&PdfDictionary> {
        match self {
            PdfObject::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_stream(&self) -> Option<&PdfStream> {
        match self {
            PdfObject::Stream(s) => Some(s),
            _ => None,
        }
    }

    /// Dictionary of a dictionary or of a stream
    pub fn dictionary(&self) -> Option<&PdfDictionary> {
        match self {
            PdfObject::Dictionary(d) => Some(d),
            PdfObject::Stream(s) => Some(&s.dict),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<ObjectId> {
        match self {
            PdfObject::Reference(id) => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for PdfObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PdfObject::Null => write!(f, "null"),
            PdfObject::Boolean(b) => write!(f, "{b}"),
            PdfObject::Number(n) => write!(f, "{}", n.0),
            PdfObject::Name(n) => write!(f, "{n}"),
            PdfObject::String(s) => write!(f, "{}", s.to_text()),
            PdfObject::Array(array) => {
                write!(f, "[")?;
                for value in array.iter() {
                    match &value.object {
                        PdfObject::String(s) => write!(f, " ({}) ", s.to_text())?,
                        other => write!(f, " {other} ")?,
                    }
                }
                write!(f, "]")
            }
            PdfObject::Dictionary(dict) => write_dictionary(f, dict),
            PdfObject::Stream(stream) => {
                write!(f, "Stream ")?;
                write_dictionary(f, &stream.dict)
            }
            PdfObject::Reference(id) => write!(f, "{} {} R", id.number, id.generation),
            PdfObject::Unknown(token) => write!(f, "{token}"),
        }
    }
}

fn write_dictionary(f: &mut fmt::Formatter<'_>, dict: &PdfDictionary) -> fmt::Result {
    write!(f, "<<")?;
    for (key, value) in dict.iter() {
        match &value.object {
            PdfObject::String(s) => write!(f, "  {key} ({})  ", s.to_text())?,
            other => write!(f, "  {key} {other}  ")?,
        }
    }
    write!(f, ">>")
}

/// A parsed value and where it came from
#[derive(Debug, Clone, PartialEq)]
pub struct PdfValue {
    pub object: PdfObject,
    /// Byte range in the source buffer, absent for synthetic values
    pub span: Option<Span>,
}

/// Returned when dereferencing a missing or cyclic reference
pub(crate) static NULL_VALUE: PdfValue = PdfValue {
    object: PdfObject::Null,
    span: None,
};

impl PdfValue {
    pub fn new(object: PdfObject, span: Span) -> Self {
        Self {
            object,
            span: Some(span),
        }
    }

    pub fn synthetic(object: PdfObject) -> Self {
        Self { object, span: None }
    }

    pub fn null() -> Self {
        Self::synthetic(PdfObject::Null)
    }

    pub fn start(&self) -> Option<usize> {
        self.span.map(|span| span.start)
    }
}

impl Deref for PdfValue {
    type Target = PdfObject;

    fn deref(&self) -> &PdfObject {
        &self.object
    }
}

impl fmt::Display for PdfValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.object.fmt(f)
    }
}

/// How an indirect object entered the object table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// `N G obj ... endobj` in the file body
    Indirect,
    /// Unpacked from an object stream
    FromContainer { container: ObjectId },
    /// A `trailer` section or a cross-reference stream dictionary
    Trailer,
}

/// An entry of a revision's object table
#[derive(Debug, Clone, PartialEq)]
pub struct IndirectObject {
    pub id: ObjectId,
    pub value: PdfValue,
    pub kind: ObjectKind,
    /// Index of the revision that defined this object
    pub revision: usize,
    /// Range from the object number to the end token, in the buffer the object came from
    pub span: Span,
}

impl IndirectObject {
    pub fn is_container_child(&self) -> bool {
        matches!(self.kind, ObjectKind::FromContainer { .. })
    }

    pub fn is_trailer(&self) -> bool {
        self.kind == ObjectKind::Trailer
    }

    /// Object stream this object was unpacked from
    pub fn container(&self) -> Option<ObjectId> {
        match self.kind {
            ObjectKind::FromContainer { container } => Some(container),
            _ => None,
        }
    }

    pub fn as_stream(&self) -> Option<&PdfStream> {
        self.value.as_stream()
    }
}

impl fmt::Display for IndirectObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@({},{}) {} ", self.span.start, self.span.end, self.id)?;
        if self.kind == ObjectKind::Indirect {
            write!(f, "obj ")?;
        }
        match &self.value.object {
            PdfObject::String(s) => write!(f, "({})", s.to_text()),
            other => write!(f, "{other}"),
        }
    }
}
