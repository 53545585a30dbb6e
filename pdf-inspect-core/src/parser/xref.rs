//! PDF Cross-Reference Table Parser
//!
//! Classic `xref` tables (ISO 32000-1 Section 7.5.4). The scanner only measures them;
//! they are read back on demand since object lookup never depends on their offsets.

use super::lexer::{is_separator, scan_token, skip_separators};
use super::objects::Span;
use super::{ParseError, ParseResult};
use std::collections::BTreeMap;

/// Cross-reference entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct XRefTableEntry {
    /// Byte offset in the file (for in-use entries)
    pub offset: u64,
    pub generation: u32,
    pub in_use: bool,
}

/// End of the table whose `xref` keyword ends at `pos`: the table runs over
/// integers and `n`/`f` flags and stops before the first other token
pub fn skip_table(data: &[u8], mut pos: usize) -> usize {
    loop {
        let start = skip_separators(data, pos);
        if start >= data.len() {
            return start;
        }
        let end = scan_token(data, start);
        let token = &data[start..end];
        let is_table_token =
            token.iter().all(u8::is_ascii_digit) || token == b"n" || token == b"f";
        if !is_table_token {
            // keep the separators before the next token inside the section
            return start;
        }
        pos = end;
    }
}

/// Entries of one or more classic tables
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XRefTable {
    entries: BTreeMap<i64, XRefTableEntry>,
}

impl XRefTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the section at `span`, `xref` keyword included or not
    pub fn parse(data: &[u8], span: Span) -> ParseResult<Self> {
        let mut table = Self::new();
        table.parse_section(data, span)?;
        Ok(table)
    }

    /// Add the entries of the section at `span`; later sections override earlier ones
    pub fn parse_section(&mut self, data: &[u8], span: Span) -> ParseResult<()> {
        let end = span.end.min(data.len());
        let body = &data[span.start.min(end)..end];
        let body = body.strip_prefix(b"xref".as_slice()).unwrap_or(body);
        let mut tokens = Tokens { data: body, pos: 0 };

        while let Some(first) = tokens.next() {
            let first = parse_number(first, "first object number")?;
            let count = tokens
                .next()
                .ok_or_else(|| ParseError::InvalidXRef("subsection without count".to_string()))
                .and_then(|token| parse_number(token, "subsection count"))?;
            for number in first..first.saturating_add(count) {
                let offset = tokens.next().map(|t| parse_number(t, "offset"));
                let generation = tokens.next().map(|t| parse_number(t, "generation"));
                let flag = tokens.next();
                let (Some(offset), Some(generation), Some(flag)) = (offset, generation, flag) else {
                    return Err(ParseError::InvalidXRef(format!(
                        "subsection starting at {first} is truncated"
                    )));
                };
                let in_use = match flag {
                    b"n" => true,
                    b"f" => false,
                    other => {
                        return Err(ParseError::InvalidXRef(format!(
                            "invalid entry flag '{}'",
                            String::from_utf8_lossy(other)
                        )))
                    }
                };
                self.entries.insert(
                    number,
                    XRefTableEntry {
                        offset: offset? as u64,
                        generation: u32::try_from(generation?).unwrap_or(u32::MAX),
                        in_use,
                    },
                );
            }
        }
        Ok(())
    }

    pub fn get(&self, number: i64) -> Option<&XRefTableEntry> {
        self.entries.get(&number)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries ordered by object number
    pub fn iter(&self) -> impl Iterator<Item = (i64, &XRefTableEntry)> {
        self.entries.iter().map(|(number, entry)| (*number, entry))
    }
}

struct Tokens<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for Tokens<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        let start = skip_separators(self.data, self.pos);
        if start >= self.data.len() {
            return None;
        }
        let mut end = start;
        while end < self.data.len() && !is_separator(self.data[end]) {
            end += 1;
        }
        self.pos = end;
        Some(&self.data[start..end])
    }
}

fn parse_number(token: &[u8], what: &str) -> ParseResult<i64> {
    std::str::from_utf8(token)
        .ok()
        .and_then(|text| text.parse::<i64>().ok())
        .filter(|&value| value >= 0)
        .ok_or_else(|| {
            ParseError::InvalidXRef(format!(
                "invalid {what} '{}'",
                String::from_utf8_lossy(token)
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &[u8] = b"xref\n0 3\n0000000000 65535 f \n0000000015 00000 n \n0000000074 00002 n \ntrailer\n<< >>";

    #[test]
    fn test_skip_table_stops_at_trailer() {
        let end = skip_table(TABLE, 4);
        assert!(TABLE[end..].starts_with(b"trailer"));
    }

    #[test]
    fn test_parse_entries() {
        let end = skip_table(TABLE, 4);
        let table = XRefTable::parse(TABLE, Span::new(0, end)).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(
            table.get(0),
            Some(&XRefTableEntry {
                offset: 0,
                generation: 65535,
                in_use: false
            })
        );
        assert_eq!(table.get(2).unwrap().offset, 74);
        assert_eq!(table.get(2).unwrap().generation, 2);
        assert!(table.get(1).unwrap().in_use);
    }

    #[test]
    fn test_several_subsections_and_override() {
        let data = b"xref\n0 1\n0000000000 65535 f\n4 1\n0000000100 00000 n\n";
        let mut table = XRefTable::parse(data, Span::new(0, data.len())).unwrap();
        let update = b"xref 4 1 0000000200 00000 n";
        table.parse_section(update, Span::new(0, update.len())).unwrap();
        let numbers: Vec<_> = table.iter().map(|(number, _)| number).collect();
        assert_eq!(numbers, vec![0, 4]);
        assert_eq!(table.get(4).unwrap().offset, 200);
    }

    #[test]
    fn test_truncated_section_is_an_error() {
        let data = b"xref\n0 2\n0000000000 65535 f\n";
        assert!(matches!(
            XRefTable::parse(data, Span::new(0, data.len())),
            Err(ParseError::InvalidXRef(_))
        ));
        let data = b"xref\n0 1\n0000000000 65535 x\n";
        assert!(XRefTable::parse(data, Span::new(0, data.len())).is_err());
    }
}
