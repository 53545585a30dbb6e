//! Stream classification
//!
//! Decides what a stream most likely holds so that consumers can pick a viewer:
//! the functional role assigned during analysis wins, then the dictionary
//! `/Type` and `/Subtype`, then a sniff of the decoded bytes.

use crate::parser::{PdfDictionary, PdfObject};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum StreamKind {
    Xml,
    AdobeFont,
    Flash,
    U3d,
    /// Generic binary payload
    Stream,
    Javascript,
    /// Page content stream
    Contents,
    /// Part of an XFA form spread over several streams
    XfaFragment,
    Xfa,
    /// Declared `/Type` and `/Subtype` concatenated (`/XObject/Image`...)
    Typed(String),
}

const MAGIC: &[(&[u8], StreamKind)] = &[
    (b"<?xpacket", StreamKind::Xml),
    (b"<?xml", StreamKind::Xml),
    (b"%!PS-AdobeFont", StreamKind::AdobeFont),
    (b"CWS", StreamKind::Flash),
    (b"FWS", StreamKind::Flash),
    (b"ZWS", StreamKind::Flash),
    (b"U3D", StreamKind::U3d),
];

impl StreamKind {
    /// `/Type` and `/Subtype` of a stream dictionary, both direct names
    pub fn full_type(dict: &PdfDictionary) -> Option<String> {
        let name = |key: &str| {
            dict.get(key)
                .and_then(|value| value.as_name())
                .map(ToString::to_string)
        };
        match (name("Type"), name("Subtype")) {
            (None, None) => None,
            (kind, subtype) => Some(format!(
                "{}{}",
                kind.unwrap_or_default(),
                subtype.unwrap_or_default()
            )),
        }
    }

    /// Guess the kind from the first bytes of decoded data
    pub fn sniff(data: &[u8]) -> Option<StreamKind> {
        let start = data
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(data.len());
        let data = &data[start..];
        MAGIC
            .iter()
            .find(|(magic, _)| data.starts_with(magic))
            .map(|(_, kind)| kind.clone())
    }

    /// Classify from what is known about a stream, in priority order
    pub fn classify(role: Option<&StreamKind>, dict: &PdfDictionary, decoded: &[u8]) -> StreamKind {
        if let Some(role) = role {
            return role.clone();
        }
        if let Some(full_type) = Self::full_type(dict) {
            return StreamKind::Typed(full_type);
        }
        Self::sniff(decoded).unwrap_or(StreamKind::Stream)
    }

    pub fn is_image(&self) -> bool {
        matches!(self, StreamKind::Typed(t) if t == "/XObject/Image")
    }

    pub fn as_str(&self) -> &str {
        match self {
            StreamKind::Xml => "xml",
            StreamKind::AdobeFont => "font",
            StreamKind::Flash => "flash",
            StreamKind::U3d => "u3d",
            StreamKind::Stream => "stream",
            StreamKind::Javascript => "javascript",
            StreamKind::Contents => "contents",
            StreamKind::XfaFragment => "xfa-fragment",
            StreamKind::Xfa => "xfa",
            StreamKind::Typed(t) => t,
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// True for image XObjects whose last filter is DCT: the decoded payload is still
/// a JPEG file
pub fn is_jpeg(dict: &PdfDictionary) -> bool {
    if StreamKind::full_type(dict).as_deref() != Some("/XObject/Image") {
        return false;
    }
    let last = match dict.get("Filter").map(|value| &value.object) {
        Some(PdfObject::Name(name)) => Some(name),
        Some(PdfObject::Array(filters)) => filters.iter().last().and_then(|value| value.as_name()),
        _ => None,
    };
    last.is_some_and(|name| matches!(name.as_str(), "DCTDecode" | "DCT"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{PdfArray, PdfName, PdfValue};

    fn name(value: &str) -> PdfValue {
        PdfValue::synthetic(PdfObject::Name(PdfName::new(value)))
    }

    #[test]
    fn test_sniff_magic_prefixes() {
        assert_eq!(StreamKind::sniff(b"<?xml version"), Some(StreamKind::Xml));
        assert_eq!(StreamKind::sniff(b"\n <?xpacket begin"), Some(StreamKind::Xml));
        assert_eq!(
            StreamKind::sniff(b"%!PS-AdobeFont-1.0"),
            Some(StreamKind::AdobeFont)
        );
        assert_eq!(StreamKind::sniff(b"CWS\x0a"), Some(StreamKind::Flash));
        assert_eq!(StreamKind::sniff(b"U3D\0"), Some(StreamKind::U3d));
        assert_eq!(StreamKind::sniff(b"BT /F1 12 Tf"), None);
        assert_eq!(StreamKind::sniff(b""), None);
    }

    #[test]
    fn test_classification_priority() {
        let mut dict = PdfDictionary::new();
        assert_eq!(
            StreamKind::classify(None, &dict, b"<?xml"),
            StreamKind::Xml
        );
        assert_eq!(StreamKind::classify(None, &dict, b"q"), StreamKind::Stream);

        dict.insert("Type", name("XObject"));
        dict.insert("Subtype", name("Image"));
        let kind = StreamKind::classify(None, &dict, b"<?xml");
        assert!(kind.is_image());
        assert_eq!(kind.to_string(), "/XObject/Image");

        let role = StreamKind::Javascript;
        assert_eq!(
            StreamKind::classify(Some(&role), &dict, b""),
            StreamKind::Javascript
        );
    }

    #[test]
    fn test_jpeg_detection() {
        let mut dict = PdfDictionary::new();
        assert!(!is_jpeg(&dict));
        dict.insert("Type", name("XObject"));
        dict.insert("Subtype", name("Image"));
        dict.insert(
            "Filter",
            PdfValue::synthetic(PdfObject::Array(PdfArray(vec![
                name("FlateDecode"),
                name("DCTDecode"),
            ]))),
        );
        assert!(is_jpeg(&dict));

        let mut dict = PdfDictionary::new();
        dict.insert("Type", name("XObject"));
        dict.insert("Subtype", name("Image"));
        dict.insert("Filter", name("FlateDecode"));
        assert!(!is_jpeg(&dict));

        // DCT payload outside an image XObject
        let mut dict = PdfDictionary::new();
        dict.insert("Filter", name("DCTDecode"));
        assert!(!is_jpeg(&dict));
    }
}
