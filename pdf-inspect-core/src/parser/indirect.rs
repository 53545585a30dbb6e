//! Indirect object bodies
//!
//! Parses what follows `obj`, `trailer`, or an object offset inside an object stream,
//! until the matching terminator. A missing terminator never fails the parse: the
//! body is closed at the next token that cannot belong to it.

use super::composite::parse_value;
use super::context::ParseContext;
use super::lexer::{matches_keyword, skip_comment, skip_separators, Keyword};
use super::objects::{PdfObject, PdfValue, Source, Span};
use super::ParseError;
use crate::analysis::{ElementRef, SuspiciousType};
use tracing::{error, info};

/// What closes a body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    /// `endobj`, consumed
    EndObj,
    /// `startxref`, left for the caller
    StartXref,
    /// Object stream children end after their single value
    None,
}

/// Outcome of parsing a body
#[derive(Debug, Clone)]
pub struct Body {
    pub value: PdfValue,
    /// Position where scanning resumes
    pub next: usize,
    /// End of the object text (terminator included when consumed)
    pub end: usize,
    /// A new `obj` started inside the body; `next` points at that keyword
    pub restarted: bool,
}

fn keyword_closes_body(data: &[u8], pos: usize) -> bool {
    [Keyword::Xref, Keyword::Trailer, Keyword::StartXref, Keyword::EndObj]
        .into_iter()
        .any(|keyword| matches_keyword(data, pos, keyword))
}

/// Parse a body starting at `pos`.
///
/// `root` is the offset anomalies about the object as a whole are attached to.
pub fn parse_body(
    source: &Source,
    mut pos: usize,
    terminator: Terminator,
    root: usize,
    ctx: &mut ParseContext<'_>,
) -> Body {
    let data: &[u8] = source;
    let depth = ctx.depth();
    let mut value: Option<PdfValue> = None;
    let finish = |value: Option<PdfValue>, next: usize, end: usize| Body {
        value: value.unwrap_or_else(|| PdfValue::new(PdfObject::Null, Span::new(next, next))),
        next,
        end,
        restarted: false,
    };

    loop {
        pos = skip_separators(data, pos);
        if pos >= data.len() {
            return finish(value, data.len(), data.len());
        }
        match terminator {
            Terminator::EndObj if matches_keyword(data, pos, Keyword::EndObj) => {
                let end = pos + Keyword::EndObj.len();
                return finish(value, end, end);
            }
            Terminator::StartXref if matches_keyword(data, pos, Keyword::StartXref) => {
                return finish(value, pos, pos);
            }
            _ => {}
        }
        if matches_keyword(data, pos, Keyword::Eof) {
            info!(position = pos, "end of file marker inside object, endobj is missing");
            return finish(value, pos, pos);
        }
        if data[pos] == b'%' {
            pos = skip_comment(data, pos);
            continue;
        }
        if value.is_some() || (terminator == Terminator::EndObj && keyword_closes_body(data, pos)) {
            info!(position = pos, "endobj is missing");
            return finish(value, pos, pos);
        }

        match parse_value(source, pos, ctx) {
            Ok((parsed, next)) => {
                pos = next;
                if parsed.is_some() {
                    value = parsed;
                    if terminator == Terminator::None {
                        return finish(value, pos, pos);
                    }
                }
            }
            Err(ParseError::UnexpectedObjectStart { position }) => {
                ctx.truncate(depth);
                ctx.report(
                    ElementRef::root(root),
                    SuspiciousType::Malformed,
                    format!("Unexpected new obj definition in Indirect Object at address {position:x}"),
                );
                return Body {
                    value: PdfValue::new(PdfObject::Null, Span::new(pos, pos)),
                    next: position,
                    end: position,
                    restarted: true,
                };
            }
            Err(err) => {
                ctx.truncate(depth);
                error!(position = pos, %err, "unable to parse object body");
                let next = (pos + 1).min(data.len());
                return finish(value, next, next);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::PdfStatistics;
    use crate::parser::ObjectId;
    use std::sync::Arc;

    const OWNER: ObjectId = ObjectId {
        number: 1,
        generation: 0,
    };

    fn body(input: &[u8], terminator: Terminator, stats: &mut PdfStatistics) -> Body {
        let source: Source = Arc::from(input);
        let mut ctx = ParseContext::new(stats, Some(OWNER), 0);
        parse_body(&source, 0, terminator, 0, &mut ctx)
    }

    #[test]
    fn test_number_body() {
        let mut stats = PdfStatistics::new();
        let parsed = body(b"\n15\nendobj\n", Terminator::EndObj, &mut stats);
        assert_eq!(parsed.value.as_number().unwrap().0, "15");
        assert_eq!(parsed.next, 10);
        assert!(!parsed.restarted);
    }

    #[test]
    fn test_empty_body_is_null() {
        let mut stats = PdfStatistics::new();
        let parsed = body(b" endobj", Terminator::EndObj, &mut stats);
        assert!(parsed.value.is_null());
        assert_eq!(parsed.next, 7);
    }

    #[test]
    fn test_missing_endobj_closes_on_next_token() {
        let mut stats = PdfStatistics::new();
        let parsed = body(b"<< /A 1 >>\n2 0 obj", Terminator::EndObj, &mut stats);
        assert!(parsed.value.as_dict().is_some());
        assert_eq!(parsed.next, 11);
        assert!(!parsed.restarted);
    }

    #[test]
    fn test_restart_inside_composite() {
        let mut stats = PdfStatistics::new();
        let parsed = body(b"[1 2\n3 0 obj 4 endobj", Terminator::EndObj, &mut stats);
        assert!(parsed.restarted);
        assert!(parsed.value.is_null());
        assert_eq!(parsed.next, 9);
        assert_eq!(
            stats.anomalies().for_owner(OWNER)[0].description,
            "Unexpected new obj definition in Indirect Object at address 9"
        );
    }

    #[test]
    fn test_trailer_stops_before_startxref() {
        let mut stats = PdfStatistics::new();
        let input = b" << /Size 3 >>\nstartxref\n100\n%%EOF";
        let parsed = body(input, Terminator::StartXref, &mut stats);
        assert!(parsed.value.as_dict().is_some());
        assert!(matches_keyword(input, parsed.next, Keyword::StartXref));
    }

    #[test]
    fn test_eof_marker_is_not_swallowed() {
        let mut stats = PdfStatistics::new();
        let input = b"<< /Size 3 >>\n%%EOF\n";
        let parsed = body(input, Terminator::StartXref, &mut stats);
        assert_eq!(parsed.next, 14);
    }

    #[test]
    fn test_container_child_takes_one_value() {
        let mut stats = PdfStatistics::new();
        let parsed = body(b"<< /A 1 >> 42", Terminator::None, &mut stats);
        assert!(parsed.value.as_dict().is_some());
        assert_eq!(parsed.next, 10);
    }
}
