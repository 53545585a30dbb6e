//! PDF Header Parser
//!
//! Locates the `%PDF-x.y` marker (ISO 32000-1 Section 7.5.2). Files often carry junk or
//! comments before the marker, so it is searched for in the first kilobyte.

use super::lexer::is_end_line;
use super::{ParseError, ParseResult};
use tracing::warn;

/// How far into the file the header marker is searched for
const HEADER_SEARCH_WINDOW: usize = 1024;

const HEADER_MARKER: &[u8] = b"%PDF-";

/// PDF Version information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PdfVersion {
    pub major: u8,
    pub minor: u8,
}

impl PdfVersion {
    pub fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Versions defined by ISO 32000 and its predecessors
    pub fn is_supported(&self) -> bool {
        matches!((self.major, self.minor), (1, 0..=7) | (2, 0))
    }

    fn parse(text: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(text).ok()?;
        let (major, minor) = text.trim().split_once('.')?;
        // trailing junk after the minor digits is common (`%PDF-1.4 `, `%PDF-1.3abc`)
        let minor: String = minor.chars().take_while(char::is_ascii_digit).collect();
        Some(Self::new(major.parse().ok()?, minor.parse().ok()?))
    }
}

impl std::fmt::Display for PdfVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// PDF Header information
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PdfHeader {
    /// `None` when the marker is present but the version is unreadable
    pub version: Option<PdfVersion>,
    /// Offset of the `%PDF-` marker
    pub offset: usize,
    pub has_binary_marker: bool,
}

impl PdfHeader {
    /// Find and parse the header in a raw buffer
    pub fn parse(data: &[u8]) -> ParseResult<Self> {
        let window = &data[..data.len().min(HEADER_SEARCH_WINDOW)];
        let offset = window
            .windows(HEADER_MARKER.len())
            .position(|w| w == HEADER_MARKER)
            .ok_or(ParseError::InvalidHeader)?;

        let line_start = offset + HEADER_MARKER.len();
        let line_end = Self::line_end(data, line_start);
        let version = PdfVersion::parse(&data[line_start..line_end]);
        match version {
            Some(version) if !version.is_supported() => {
                warn!(%version, "unusual PDF version in header")
            }
            None => warn!("unreadable PDF version in header"),
            _ => {}
        }
        if offset > 0 {
            warn!(offset, "PDF header does not start the file");
        }

        Ok(PdfHeader {
            version,
            offset,
            has_binary_marker: Self::check_binary_marker(data, line_end),
        })
    }

    fn line_end(data: &[u8], from: usize) -> usize {
        data[from..]
            .iter()
            .position(|&b| is_end_line(b))
            .map_or(data.len(), |offset| from + offset)
    }

    /// The line following the header should be a comment with at least 4 binary bytes
    fn check_binary_marker(data: &[u8], header_end: usize) -> bool {
        let mut start = header_end;
        while start < data.len() && is_end_line(data[start]) {
            start += 1;
        }
        let end = Self::line_end(data, start);
        let line = &data[start..end];
        line.first() == Some(&b'%') && line.iter().skip(1).filter(|&&b| b >= 128).count() >= 4
    }
}
