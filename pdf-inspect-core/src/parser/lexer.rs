//! PDF Lexer
//!
//! Stateless byte classification and keyword recognition over a raw buffer
//! (ISO 32000-1 Section 7.2). Every helper treats positions past the end of the
//! buffer as an implicit boundary instead of failing.

/// Structural keywords recognized by the scanner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Obj,
    EndObj,
    Stream,
    EndStream,
    Trailer,
    StartXref,
    Xref,
    Eof,
}

impl Keyword {
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            Keyword::Obj => b"obj",
            Keyword::EndObj => b"endobj",
            Keyword::Stream => b"stream",
            Keyword::EndStream => b"endstream",
            Keyword::Trailer => b"trailer",
            Keyword::StartXref => b"startxref",
            Keyword::Xref => b"xref",
            Keyword::Eof => b"%%EOF",
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// `endstream` often follows binary payload bytes directly, so only its
    /// trailing side is checked. `%%EOF` starts with a delimiter of its own.
    fn checks_preceding_byte(&self) -> bool {
        !matches!(self, Keyword::EndStream | Keyword::Eof)
    }
}

/// White-space characters (Table 1)
pub fn is_separator(b: u8) -> bool {
    matches!(b, 0x00 | 0x09 | 0x0A | 0x0C | 0x0D | 0x20)
}

/// Delimiter characters (Table 2)
pub fn is_delimiter(b: u8) -> bool {
    matches!(
        b,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

pub fn is_comment(b: u8) -> bool {
    b == b'%'
}

pub fn is_end_line(b: u8) -> bool {
    b == 0x0A || b == 0x0D
}

pub fn is_end_comment(b: u8) -> bool {
    is_end_line(b) || b == 0x00 || b == 0x0C
}

/// True when `pos` is out of range or holds a delimiter or separator
pub fn is_boundary(data: &[u8], pos: usize) -> bool {
    match data.get(pos) {
        Some(&b) => is_delimiter(b) || is_separator(b),
        None => true,
    }
}

/// Check whether `keyword` starts at `pos` and is not embedded in a longer token
pub fn matches_keyword(data: &[u8], pos: usize, keyword: Keyword) -> bool {
    let bytes = keyword.as_bytes();
    let end = match pos.checked_add(bytes.len()) {
        Some(end) if end <= data.len() => end,
        _ => return false,
    };
    if &data[pos..end] != bytes {
        return false;
    }
    if keyword.checks_preceding_byte() && pos > 0 && !is_boundary(data, pos - 1) {
        return false;
    }
    is_boundary(data, end)
}

/// Skip white-space, returning the first non-separator position
pub fn skip_separators(data: &[u8], mut pos: usize) -> usize {
    while pos < data.len() && is_separator(data[pos]) {
        pos += 1;
    }
    pos
}

/// Skip a comment starting at `pos` (which holds `%`).
///
/// Returns the position of the byte that ends the comment, which is left unconsumed.
pub fn skip_comment(data: &[u8], mut pos: usize) -> usize {
    while pos < data.len() && !is_end_comment(data[pos]) {
        pos += 1;
    }
    pos
}

/// Skip any mix of white-space and comments
pub fn skip_separators_and_comments(data: &[u8], mut pos: usize) -> usize {
    loop {
        pos = skip_separators(data, pos);
        if pos < data.len() && is_comment(data[pos]) {
            pos = skip_comment(data, pos);
        } else {
            return pos;
        }
    }
}

/// Length of the end-of-line sequence starting at `pos`.
///
/// `Some(0)` means the buffer ends at `pos`, `None` that no EOL is present.
/// CRLF is preferred over a lone CR.
pub fn end_line_len(data: &[u8], pos: usize) -> Option<usize> {
    match data.get(pos) {
        None => Some(0),
        Some(0x0A) => Some(1),
        Some(0x0D) => match data.get(pos + 1) {
            Some(0x0A) => Some(2),
            _ => Some(1),
        },
        Some(_) => None,
    }
}

/// Length of the end-of-line sequence ending at `pos` (inclusive), scanning backwards
pub fn previous_end_line_len(data: &[u8], pos: Option<usize>) -> Option<usize> {
    let pos = match pos {
        Some(pos) => pos,
        None => return Some(0),
    };
    match data.get(pos) {
        Some(0x0A) if pos > 0 && data[pos - 1] == 0x0D => Some(2),
        Some(0x0A) | Some(0x0D) => Some(1),
        _ => None,
    }
}

/// End (exclusive) of the bare token starting at `pos`.
///
/// The first byte is always consumed; scanning stops before the next delimiter or
/// separator so that a following `]` or `>>` is left for the caller.
pub fn scan_token(data: &[u8], pos: usize) -> usize {
    let mut end = pos.saturating_add(1).min(data.len());
    while end < data.len() && !is_boundary(data, end) {
        end += 1;
    }
    end
}

/// Render raw bytes as text, one char per byte
pub fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}
