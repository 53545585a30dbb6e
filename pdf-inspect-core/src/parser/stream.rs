//! Stream extraction
//!
//! Locates the payload between `stream` and `endstream` and reconciles its length
//! with the declared `/Length` (ISO 32000-1 Section 7.3.8).

use super::context::ParseContext;
use super::lexer::{
    end_line_len, is_end_line, matches_keyword, previous_end_line_len, Keyword,
};
use super::objects::{ObjectId, PdfDictionary, PdfObject, PdfStream, Source, Span};
use crate::analysis::{PdfStatistics, SuspiciousType};
use tracing::{error, warn};

/// Position of the next `endstream` at or after `from`, or the end of data
fn find_end_stream(data: &[u8], from: usize) -> Option<usize> {
    let keyword = Keyword::EndStream.as_bytes();
    let mut cursor = from;
    while cursor < data.len() {
        let offset = data[cursor..]
            .windows(keyword.len())
            .position(|window| window == keyword)?;
        let candidate = cursor + offset;
        if matches_keyword(data, candidate, Keyword::EndStream) {
            return Some(candidate);
        }
        cursor = candidate + 1;
    }
    None
}

/// Extract the stream whose `stream` keyword starts at `keyword_pos`.
///
/// Returns the stream and the position following `endstream` (or the end of data
/// when `endstream` is missing).
pub fn extract(
    source: &Source,
    keyword_pos: usize,
    dict: PdfDictionary,
    dict_start: usize,
    ctx: &mut ParseContext<'_>,
) -> (PdfStream, usize) {
    let data: &[u8] = source;
    let mut from = keyword_pos + Keyword::Stream.len();
    match end_line_len(data, from) {
        Some(0) => error!(position = keyword_pos, "stream keyword at end of data"),
        Some(eol) => from += eol,
        None => warn!(position = keyword_pos, "missing end of line after stream keyword"),
    }

    let (cursor, next) = match find_end_stream(data, from) {
        Some(end) => (end, end + Keyword::EndStream.len()),
        None => {
            warn!(position = keyword_pos, "endstream keyword not found");
            (data.len(), data.len())
        }
    };
    let eol = previous_end_line_len(data, cursor.checked_sub(1)).unwrap_or(0);
    let to = cursor.saturating_sub(eol).max(from);
    let extra = [
        data.get(to).copied().unwrap_or(0),
        data.get(to + 1).copied().unwrap_or(0),
    ];

    let stream = PdfStream::new(
        dict,
        source.clone(),
        Span::new(from, to),
        extra,
        ctx.owner,
        ctx.revision,
        ctx.element(dict_start),
    );
    (stream, next)
}

/// Whether a parsed payload length agrees with the declared one.
///
/// A difference of one or two bytes is accepted when the end-of-line markers around
/// `endstream` explain it.
pub fn is_length_consistent(parsed: usize, declared: usize, extra: [u8; 2], last: Option<u8>) -> bool {
    if parsed == declared {
        return true;
    }
    if parsed + 1 == declared {
        return is_end_line(extra[0]);
    }
    if parsed + 2 == declared {
        return is_end_line(extra[0]) && is_end_line(extra[1]);
    }
    if parsed == declared + 1 {
        return last.map_or(true, |b| b == 0x0D);
    }
    false
}

/// Compare a stream payload to its `/Length` (already dereferenced)
pub fn check_size(
    stream: &PdfStream,
    id: ObjectId,
    declared: Option<&PdfObject>,
    stats: &mut PdfStatistics,
) {
    let parsed = stream.parsed_length();
    match declared {
        None | Some(PdfObject::Null) => {
            warn!(%id, parsed, "stream has no /Length");
        }
        Some(PdfObject::Number(number)) => {
            let declared = number.as_usize().unwrap_or(0);
            let last = stream.encoded_data().last().copied();
            if !is_length_consistent(parsed, declared, stream.extra, last) {
                warn!(%id, "Length defined: {declared}. Parser found {parsed}");
            }
        }
        Some(_) => {
            stats.add_anomaly(
                id,
                stream.element,
                SuspiciousType::Malformed,
                format!("Unable to parse [Stream {id}]/Length: expected number"),
            );
        }
    }
}
