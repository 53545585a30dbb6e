//! PDF Object Stream Parser
//!
//! Unpacks the objects stored in an object stream (ISO 32000-1 Section 7.5.7). The
//! decoded payload starts with `N` pairs of integers (object number, offset relative
//! to `/First`); each object body follows without `obj`/`endobj` wrappers.

use super::context::ParseContext;
use super::indirect::{parse_body, Terminator};
use super::lexer::skip_separators_and_comments;
use super::objects::{IndirectObject, ObjectId, ObjectKind, PdfObject, Source, Span};
use super::value::parse_token;
use super::{ParseError, ParseResult};
use crate::analysis::PdfStatistics;
use tracing::warn;

/// Entry of the object stream header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectStreamEntry {
    pub number: i32,
    /// Offset relative to `/First`
    pub offset: usize,
}

/// Read the `n` (number, offset) pairs at the start of `data`
pub fn parse_header(data: &[u8], n: usize, stats: &mut PdfStatistics) -> ParseResult<Vec<ObjectStreamEntry>> {
    let mut ctx = ParseContext::new(stats, None, 0);
    let mut pos = 0;
    let mut next_integer = |what: &str, pos: &mut usize| -> ParseResult<i64> {
        let start = skip_separators_and_comments(data, *pos);
        let (value, end) = parse_token(data, start, &mut ctx)?;
        *pos = end;
        match &value.object {
            PdfObject::Number(number) => number.as_i64(),
            _ => None,
        }
        .ok_or_else(|| ParseError::SyntaxError {
            position: start,
            message: format!("Expected {what} in object stream"),
        })
    };

    let mut entries = Vec::with_capacity(n.min(data.len()));
    for _ in 0..n {
        let number = next_integer("object number", &mut pos)?;
        let offset = next_integer("offset", &mut pos)?;
        let number = i32::try_from(number).map_err(|_| ParseError::SyntaxError {
            position: pos,
            message: format!("Object number {number} out of range"),
        })?;
        let offset = usize::try_from(offset).map_err(|_| ParseError::SyntaxError {
            position: pos,
            message: format!("Negative offset {offset} in object stream"),
        })?;
        entries.push(ObjectStreamEntry { number, offset });
    }
    Ok(entries)
}

/// Parse the children of `container` from its decoded payload.
///
/// Children get generation 0 and belong to the container's revision.
pub fn expand(
    decoded: &Source,
    container: ObjectId,
    revision: usize,
    n: usize,
    first: usize,
    max_depth: usize,
    stats: &mut PdfStatistics,
) -> ParseResult<Vec<IndirectObject>> {
    let entries = parse_header(decoded, n, stats)?;
    let mut children = Vec::with_capacity(entries.len());
    for entry in entries {
        let id = ObjectId::new(entry.number, 0);
        let Some(start) = first.checked_add(entry.offset).filter(|&start| start <= decoded.len()) else {
            warn!(%container, object = %id, offset = entry.offset, "object offset outside object stream");
            continue;
        };
        let mut ctx = ParseContext::new(stats, Some(id), revision).with_max_depth(max_depth);
        let body = parse_body(decoded, start, Terminator::None, start, &mut ctx);
        children.push(IndirectObject {
            id,
            value: body.value,
            kind: ObjectKind::FromContainer { container },
            revision,
            span: Span::new(start, body.end),
        });
    }
    Ok(children)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::context::MAX_NESTING_DEPTH;
    use std::sync::Arc;

    const CONTAINER: ObjectId = ObjectId {
        number: 20,
        generation: 0,
    };

    fn source(data: &[u8]) -> Source {
        Arc::from(data)
    }

    #[test]
    fn test_header_pairs() {
        let mut stats = PdfStatistics::new();
        let entries = parse_header(b"11 0 12 15 % note\n13 30", 3, &mut stats).unwrap();
        assert_eq!(
            entries,
            vec![
                ObjectStreamEntry { number: 11, offset: 0 },
                ObjectStreamEntry { number: 12, offset: 15 },
                ObjectStreamEntry { number: 13, offset: 30 },
            ]
        );
    }

    #[test]
    fn test_short_header_is_an_error() {
        let mut stats = PdfStatistics::new();
        assert!(parse_header(b"11 0 12", 2, &mut stats).is_err());
        assert!(parse_header(b"11 /Name", 1, &mut stats).is_err());
    }

    #[test]
    fn test_expand_children() {
        let mut stats = PdfStatistics::new();
        let data = source(b"1 0 2 12 3 15 << /A 1 >> 42 [(x) 2 0 R]");
        let children = expand(&data, CONTAINER, 1, 3, 13, MAX_NESTING_DEPTH, &mut stats).unwrap();
        assert_eq!(children.len(), 3);
        assert_eq!(children[0].id, ObjectId::new(1, 0));
        assert!(children[0].value.as_dict().is_some());
        assert_eq!(children[1].value.as_integer(), Some(42));
        let array = children[2].value.as_array().unwrap();
        assert_eq!(array.len(), 2);
        assert_eq!(array.get(1).unwrap().as_reference(), Some(ObjectId::new(2, 0)));
        assert!(children.iter().all(|child| child.revision == 1
            && child.kind == ObjectKind::FromContainer { container: CONTAINER }));
    }

    #[test]
    fn test_out_of_range_offset_is_skipped() {
        let mut stats = PdfStatistics::new();
        let data = source(b"1 0 2 500 true");
        let children = expand(&data, CONTAINER, 0, 2, 10, MAX_NESTING_DEPTH, &mut stats).unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].value.as_bool(), Some(true));
    }
}
