//! Composite values
//!
//! Recursive parsing of dictionaries, arrays and strings (ISO 32000-1 Sections
//! 7.3.4 to 7.3.7). Every element goes through [`parse_value`], which falls back to
//! the bare token parser.

use super::context::ParseContext;
use super::lexer::{
    is_separator, matches_keyword, scan_token, skip_comment, skip_separators,
    skip_separators_and_comments, Keyword,
};
use super::objects::{PdfArray, PdfDictionary, PdfName, PdfObject, PdfString, PdfValue, Source, Span};
use super::stream;
use super::value::{check_name, parse_token};
use super::ParseResult;
use crate::analysis::SuspiciousType;

/// Parse the value starting at `pos`.
///
/// Returns `None` for a comment, which yields no value.
pub fn parse_value(
    source: &Source,
    pos: usize,
    ctx: &mut ParseContext<'_>,
) -> ParseResult<(Option<PdfValue>, usize)> {
    let data: &[u8] = source;
    match data.get(pos) {
        Some(b'[' | b'<') if !ctx.can_nest() && is_composite_start(data, pos) => {
            ctx.report_current(pos, SuspiciousType::Malformed, "Nesting too deep");
            let end = skip_composite(data, pos);
            Ok((Some(PdfValue::new(PdfObject::Null, Span::new(pos, end))), end))
        }
        Some(b'<') if data.get(pos + 1) == Some(&b'<') => {
            parse_dictionary(source, pos, ctx).map(|(value, end)| (Some(value), end))
        }
        Some(b'<') => {
            let (value, end) = parse_hex_string(data, pos, ctx);
            Ok((Some(value), end))
        }
        Some(b'(') => {
            let (value, end) = parse_literal_string(data, pos, ctx);
            Ok((Some(value), end))
        }
        Some(b'[') => parse_array(source, pos, ctx).map(|(value, end)| (Some(value), end)),
        Some(b'%') => Ok((None, skip_comment(data, pos))),
        _ => parse_token(data, pos, ctx).map(|(value, end)| (Some(value), end)),
    }
}

/// Parse a dictionary starting at `<<`, and the stream following it if any
pub fn parse_dictionary(
    source: &Source,
    start: usize,
    ctx: &mut ParseContext<'_>,
) -> ParseResult<(PdfValue, usize)> {
    let data: &[u8] = source;
    let mut dict = PdfDictionary::new();
    let mut pos = start + 2;
    ctx.enter(start);
    loop {
        pos = skip_separators_and_comments(data, pos);
        if pos >= data.len() {
            ctx.report_current(start, SuspiciousType::Malformed, "Unclosed dictionary");
            break;
        }
        if data[pos..].starts_with(b">>") {
            pos += 2;
            break;
        }
        if data[pos] != b'/' {
            ctx.report_current(
                start,
                SuspiciousType::Malformed,
                format!("Incorrect Dictionary entries at address {pos:X}"),
            );
            break;
        }
        let key_end = scan_token(data, pos);
        let key = PdfName::from_token(&data[pos..key_end]);
        check_name(ctx, &key, pos);

        pos = skip_separators_and_comments(data, key_end);
        if pos >= data.len() || data[pos..].starts_with(b">>") {
            dict.0.push((key, PdfValue::new(PdfObject::Null, Span::new(pos, pos))));
            continue;
        }
        let (value, next) = parse_value(source, pos, ctx)?;
        pos = next;
        if let Some(value) = value {
            dict.0.push((key, value));
        }
    }
    ctx.leave();

    let after = skip_separators(data, pos);
    if matches_keyword(data, after, Keyword::Stream) {
        let (stream, next) = stream::extract(source, after, dict, start, ctx);
        return Ok((PdfValue::new(PdfObject::Stream(stream), Span::new(start, next)), next));
    }
    Ok((PdfValue::new(PdfObject::Dictionary(dict), Span::new(start, pos)), pos))
}

/// Parse an array starting at `[`
pub fn parse_array(
    source: &Source,
    start: usize,
    ctx: &mut ParseContext<'_>,
) -> ParseResult<(PdfValue, usize)> {
    let data: &[u8] = source;
    let mut array = PdfArray::new();
    let mut pos = start + 1;
    ctx.enter(start);
    loop {
        pos = skip_separators(data, pos);
        if pos >= data.len() {
            ctx.report_current(start, SuspiciousType::Malformed, "Unclosed array");
            break;
        }
        if data[pos] == b']' {
            pos += 1;
            break;
        }
        let (value, next) = parse_value(source, pos, ctx)?;
        pos = next;
        if let Some(value) = value {
            array.push(value);
        }
    }
    ctx.leave();
    Ok((PdfValue::new(PdfObject::Array(array), Span::new(start, pos)), pos))
}

fn is_composite_start(data: &[u8], pos: usize) -> bool {
    data[pos] == b'[' || data[pos..].starts_with(b"<<")
}

/// End of the composite value starting at `start`, found without building it.
///
/// Stops at the balancing delimiter, at `endobj` or at the end of the data.
fn skip_composite(data: &[u8], start: usize) -> usize {
    let mut depth = 0usize;
    let mut pos = start;
    while pos < data.len() {
        match data[pos] {
            b'[' => {
                depth += 1;
                pos += 1;
            }
            b'<' if data.get(pos + 1) == Some(&b'<') => {
                depth += 1;
                pos += 2;
            }
            b']' => {
                depth = depth.saturating_sub(1);
                pos += 1;
            }
            b'>' if data.get(pos + 1) == Some(&b'>') => {
                depth = depth.saturating_sub(1);
                pos += 2;
            }
            b'(' => {
                let mut nested = 0usize;
                pos += 1;
                while pos < data.len() {
                    match data[pos] {
                        b'\\' => pos += 1,
                        b'(' => nested += 1,
                        b')' if nested == 0 => break,
                        b')' => nested -= 1,
                        _ => {}
                    }
                    pos += 1;
                }
                pos += 1;
            }
            b'<' => {
                pos = data[pos..]
                    .iter()
                    .position(|&b| b == b'>')
                    .map_or(data.len(), |offset| pos + offset + 1);
            }
            b'%' => pos = skip_comment(data, pos),
            b'e' if matches_keyword(data, pos, Keyword::EndObj) => break,
            _ => pos += 1,
        }
        if depth == 0 {
            break;
        }
    }
    pos.min(data.len())
}

fn is_octal(b: u8) -> bool {
    (b'0'..=b'7').contains(&b)
}

/// Parse a literal string starting at `(`
pub fn parse_literal_string(data: &[u8], start: usize, ctx: &mut ParseContext<'_>) -> (PdfValue, usize) {
    let mut bytes = Vec::new();
    let mut depth = 0usize;
    let mut pos = start + 1;
    let mut closed = false;
    while pos < data.len() {
        let b = data[pos];
        pos += 1;
        match b {
            b'\\' => {
                let Some(&escaped) = data.get(pos) else {
                    break;
                };
                pos += 1;
                match escaped {
                    b'n' => bytes.push(b'\n'),
                    b'r' => bytes.push(b'\r'),
                    b't' => bytes.push(b'\t'),
                    b'b' => bytes.push(0x08),
                    b'f' => bytes.push(0x0C),
                    b'(' | b')' | b'\\' => bytes.push(escaped),
                    b'\r' => {
                        if data.get(pos) == Some(&b'\n') {
                            pos += 1;
                        }
                    }
                    b'\n' => {}
                    b if is_octal(b) => {
                        let mut code = u32::from(b - b'0');
                        let mut digits = 1;
                        while digits < 3 && data.get(pos).is_some_and(|&d| is_octal(d)) {
                            code = code * 8 + u32::from(data[pos] - b'0');
                            pos += 1;
                            digits += 1;
                        }
                        bytes.push((code & 0xFF) as u8);
                    }
                    other => bytes.push(other),
                }
            }
            b'(' => depth += 1,
            b')' if depth == 0 => {
                closed = true;
                break;
            }
            b')' => depth -= 1,
            other => bytes.push(other),
        }
    }
    if !closed {
        ctx.report(ctx.element(start), SuspiciousType::Malformed, "Unclosed string");
    }
    (
        PdfValue::new(PdfObject::String(PdfString::new(bytes)), Span::new(start, pos)),
        pos,
    )
}

/// Parse a hexadecimal string starting at `<`
pub fn parse_hex_string(data: &[u8], start: usize, ctx: &mut ParseContext<'_>) -> (PdfValue, usize) {
    let close = data[start + 1..]
        .iter()
        .position(|&b| b == b'>')
        .map(|offset| start + 1 + offset);
    let (raw, end) = match close {
        Some(close) => (&data[start + 1..close], close + 1),
        None => {
            ctx.report(ctx.element(start), SuspiciousType::Malformed, "Unclosed string");
            (&data[start + 1..], data.len())
        }
    };

    let mut digits: Vec<u8> = raw.iter().copied().filter(|&b| !is_separator(b)).collect();
    if digits.len() % 2 == 1 {
        digits.push(b'0');
    }
    let decoded: Option<Vec<u8>> = digits
        .chunks(2)
        .map(|pair| {
            if pair.iter().all(u8::is_ascii_hexdigit) {
                std::str::from_utf8(pair)
                    .ok()
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok())
            } else {
                None
            }
        })
        .collect();

    let string = match decoded {
        Some(bytes) => PdfString::hex(bytes),
        None => {
            ctx.report(ctx.element(start), SuspiciousType::Malformed, "Incorrect String format");
            let mut fallback = Vec::with_capacity(raw.len() + 2);
            fallback.push(b'<');
            fallback.extend_from_slice(raw);
            fallback.push(b'>');
            PdfString::new(fallback)
        }
    };
    (PdfValue::new(PdfObject::String(string), Span::new(start, end)), end)
}
