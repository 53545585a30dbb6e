//! Bare token parsing
//!
//! Turns the token at a position into a primitive value, detecting the three-token
//! `N G R` indirect reference pattern with rollback.

use super::context::ParseContext;
use super::lexer::{is_boundary, is_separator, latin1, scan_token, skip_separators};
use super::objects::{ObjectId, PdfName, PdfNumber, PdfObject, PdfValue, Span};
use super::{ParseError, ParseResult};
use lazy_static::lazy_static;
use std::collections::HashMap;

lazy_static! {
    /// Names worth flagging, with the category reported for them
    static ref SUSPICIOUS_NAMES: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("JavaScript", "Javascript");
        m.insert("JS", "Javascript");
        m.insert("OpenAction", "Automatic Action");
        m.insert("AA", "Automatic Action");
        m.insert("RichMedia", "Flash");
        m.insert("AcroForm", "AcroForm");
        m.insert("XFA", "XML Forms Architecture");
        m.insert("Launch", "Launch Action");
        m.insert("EmbeddedFile", "Embedded File");
        m
    };
}

/// Category of a suspicious name, if it is one
pub fn suspicious_category(name: &str) -> Option<&'static str> {
    SUSPICIOUS_NAMES.get(name).copied()
}

/// Record a suspicious name found at `offset`
pub(crate) fn check_name(ctx: &mut ParseContext<'_>, name: &PdfName, offset: usize) {
    if let Some(category) = suspicious_category(name.as_str()) {
        // `/JS` sits next to `/S /JavaScript` in the same action dictionary
        let drop_same_level = name.as_str() == "JS";
        ctx.report_token(offset, &name.to_string(), category, drop_same_level);
    }
}

fn is_integer_token(token: &[u8]) -> bool {
    !token.is_empty() && token.iter().all(u8::is_ascii_digit)
}

fn parse_integer(token: &[u8]) -> Option<i32> {
    std::str::from_utf8(token).ok()?.parse().ok()
}

/// Try to read `G R` after the object number ending at `number_end`.
///
/// Returns the generation and the position following `R`.
fn parse_reference_tail(data: &[u8], number_end: usize) -> Option<(i32, usize)> {
    if !data.get(number_end).is_some_and(|&b| is_separator(b)) {
        return None;
    }
    let generation_start = skip_separators(data, number_end);
    if generation_start >= data.len() {
        return None;
    }
    let generation_end = scan_token(data, generation_start);
    let generation_token = &data[generation_start..generation_end];
    if !is_integer_token(generation_token) {
        return None;
    }
    let generation = parse_integer(generation_token)?;
    let r = skip_separators(data, generation_end);
    if data.get(r) == Some(&b'R') && is_boundary(data, r + 1) {
        Some((generation, r + 1))
    } else {
        None
    }
}

/// Parse the bare token starting at `pos`.
///
/// Returns the value and the position right after it. An `obj` keyword where a
/// value is expected means the enclosing object lost its `endobj`: this is
/// reported as [`ParseError::UnexpectedObjectStart`].
pub fn parse_token(
    data: &[u8],
    pos: usize,
    ctx: &mut ParseContext<'_>,
) -> ParseResult<(PdfValue, usize)> {
    if pos >= data.len() {
        return Ok((PdfValue::new(PdfObject::Null, Span::new(pos, pos)), pos));
    }
    let end = scan_token(data, pos);
    let token = &data[pos..end];

    if is_integer_token(token) {
        if let Some((generation, after)) = parse_reference_tail(data, end) {
            if let Some(number) = parse_integer(token) {
                let id = ObjectId::new(number, generation);
                return Ok((PdfValue::new(PdfObject::Reference(id), Span::new(pos, after)), after));
            }
        }
    }

    let span = Span::new(pos, end);
    let object = if token.is_empty() {
        PdfObject::Null
    } else if token[0] == b'/' {
        let name = PdfName::from_token(token);
        check_name(ctx, &name, pos);
        PdfObject::Name(name)
    } else if PdfNumber::is_numeric(token) {
        PdfObject::Number(PdfNumber(latin1(token)))
    } else {
        match token {
            b"true" => PdfObject::Boolean(true),
            b"false" => PdfObject::Boolean(false),
            b"null" => PdfObject::Null,
            b"obj" => return Err(ParseError::UnexpectedObjectStart { position: pos }),
            _ => PdfObject::Unknown(latin1(token)),
        }
    };
    Ok((PdfValue::new(object, span), end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::PdfStatistics;

    fn parse(input: &[u8]) -> (PdfValue, usize) {
        let mut stats = PdfStatistics::new();
        let mut ctx = ParseContext::new(&mut stats, Some(ObjectId::new(1, 0)), 0);
        parse_token(input, 0, &mut ctx).unwrap()
    }

    #[test]
    fn test_numbers() {
        let (value, end) = parse(b"15\nendobj");
        assert_eq!(value.as_number().unwrap().0, "15");
        assert_eq!(end, 2);
        let (value, _) = parse(b"-3.5]");
        assert_eq!(value.as_number().unwrap().as_f64(), Some(-3.5));
    }

    #[test]
    fn test_reference_detection() {
        let (value, end) = parse(b"12 0 R /Next");
        assert_eq!(value.as_reference(), Some(ObjectId::new(12, 0)));
        assert_eq!(end, 6);
        assert_eq!(value.span, Some(Span::new(0, 6)));
    }

    #[test]
    fn test_reference_rollback() {
        // no R
        let (value, end) = parse(b"549 3.14 false");
        assert_eq!(value.as_number().unwrap().0, "549");
        assert_eq!(end, 3);
        // R glued to another token
        let (value, end) = parse(b"1 0 RG");
        assert!(value.as_number().is_some());
        assert_eq!(end, 1);
        // second token is not an integer
        let (value, _) = parse(b"1 /Name R");
        assert!(value.as_number().is_some());
        // end of data
        let (value, _) = parse(b"549");
        assert!(value.as_number().is_some());
        // closing delimiter right after the number
        let (value, end) = parse(b"549]");
        assert!(value.as_number().is_some());
        assert_eq!(end, 3);
    }

    #[test]
    fn test_keywords_and_unknown() {
        assert_eq!(parse(b"true").0.as_bool(), Some(true));
        assert_eq!(parse(b"false ").0.as_bool(), Some(false));
        assert!(parse(b"null").0.is_null());
        assert!(parse(b"").0.is_null());
        match &parse(b"foo>>").0.object {
            PdfObject::Unknown(token) => assert_eq!(token, "foo"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_obj_signals_restart() {
        let mut stats = PdfStatistics::new();
        let mut ctx = ParseContext::new(&mut stats, None, 0);
        match parse_token(b"<< obj", 3, &mut ctx) {
            Err(ParseError::UnexpectedObjectStart { position }) => assert_eq!(position, 3),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_suspicious_names_are_counted() {
        let mut stats = PdfStatistics::new();
        {
            let mut ctx = ParseContext::new(&mut stats, Some(ObjectId::new(3, 0)), 0);
            let (value, _) = parse_token(b"/J#61vaScript", 0, &mut ctx).unwrap();
            assert_eq!(value.as_name().unwrap().as_str(), "JavaScript");
            parse_token(b"/Type", 0, &mut ctx).unwrap();
        }
        assert_eq!(stats.tokens().get("/JavaScript"), Some(&1));
        assert_eq!(stats.tokens().len(), 1);
        assert_eq!(suspicious_category("OpenAction"), Some("Automatic Action"));
    }
}
