//! Cross-reference streams
//!
//! Binary cross-reference tables (ISO 32000-1 Section 7.5.8). The decoded payload is a
//! run of fixed-width big-endian records, one per object, grouped in the subsections
//! listed by `/Index`.

use super::objects::{PdfDictionary, PdfValue};
use super::{ParseError, ParseResult};
use std::fmt;
use tracing::debug;

/// Meaning of one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum XRefEntry {
    /// Type 0: a free object
    Free { next_free_object: u64, generation: u64 },
    /// Type 1: an object at a byte offset in the file
    InUse { offset: u64, generation: u64 },
    /// Type 2: an object stored in an object stream
    Compressed {
        stream_object_number: u64,
        index_within_stream: u64,
    },
    /// Other types are to be read as null references
    Unknown { kind: u64 },
}

/// A record and the object number it describes
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct XRefStreamEntry {
    pub object_number: i64,
    pub fields: [u64; 3],
    pub widths: [usize; 3],
}

impl XRefStreamEntry {
    pub fn entry(&self) -> XRefEntry {
        let [kind, second, third] = self.fields;
        match kind {
            0 => XRefEntry::Free {
                next_free_object: second,
                generation: third,
            },
            1 => XRefEntry::InUse {
                offset: second,
                generation: third,
            },
            2 => XRefEntry::Compressed {
                stream_object_number: second,
                index_within_stream: third,
            },
            kind => XRefEntry::Unknown { kind },
        }
    }
}

/// Fields as fixed-width hexadecimal text, in the widths they were stored with
impl fmt::Display for XRefStreamEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.object_number)?;
        for (value, width) in self.fields.iter().zip(self.widths) {
            // an absent type field still reads as type 1
            let digits = (width * 2).max(1);
            write!(f, " {value:0digits$x}")?;
        }
        Ok(())
    }
}

/// Layout of a cross-reference stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XRefStream {
    pub widths: [usize; 3],
    /// `(first object number, count)` pairs
    pub subsections: Vec<(i64, i64)>,
}

impl XRefStream {
    /// Read `/W`, `/Index` and `/Size` from a stream dictionary
    pub fn parse<'a>(
        dict: &'a PdfDictionary,
        resolve: impl Fn(&'a PdfValue) -> &'a PdfValue,
    ) -> ParseResult<Self> {
        let integers = |key: &str| -> Option<Vec<i64>> {
            let array = resolve(dict.get(key)?).as_array()?;
            array
                .iter()
                .map(|value| resolve(value).as_integer())
                .collect()
        };

        let widths = integers("W").ok_or_else(|| ParseError::MissingKey("W".to_string()))?;
        let widths: [usize; 3] = match widths.as_slice() {
            &[a, b, c] => [a, b, c].map(|w| usize::try_from(w).unwrap_or(usize::MAX)),
            _ => {
                return Err(ParseError::InvalidXRef(format!(
                    "W array must have 3 elements, found {}",
                    widths.len()
                )))
            }
        };
        // more than eight bytes cannot hold a meaningful offset
        if widths.iter().any(|&w| w > 8) {
            return Err(ParseError::InvalidXRef(format!("unsupported field widths {widths:?}")));
        }

        let subsections = match dict.get("Index") {
            Some(_) => {
                let index = integers("Index")
                    .ok_or_else(|| ParseError::InvalidXRef("Index must be an array of integers".to_string()))?;
                if index.len() % 2 != 0 {
                    return Err(ParseError::InvalidXRef(format!(
                        "Index must hold pairs, found {} integers",
                        index.len()
                    )));
                }
                index.chunks(2).map(|pair| (pair[0], pair[1])).collect()
            }
            None => {
                let size = dict
                    .get("Size")
                    .map(&resolve)
                    .and_then(|value| value.as_integer())
                    .ok_or_else(|| ParseError::MissingKey("Size in xref stream".to_string()))?;
                vec![(0, size)]
            }
        };
        if subsections.iter().any(|&(first, count)| first < 0 || count < 0) {
            return Err(ParseError::InvalidXRef("negative subsection bounds".to_string()));
        }

        Ok(Self {
            widths,
            subsections,
        })
    }

    pub fn entry_size(&self) -> usize {
        self.widths.iter().sum()
    }

    /// Number of records announced by the subsections
    pub fn expected_entries(&self) -> usize {
        self.subsections
            .iter()
            .map(|&(_, count)| usize::try_from(count).unwrap_or(0))
            .fold(0, usize::saturating_add)
    }

    /// Read every record of the decoded payload.
    ///
    /// A payload too short for the announced subsections is rejected as a whole.
    pub fn entries(&self, data: &[u8]) -> ParseResult<Vec<XRefStreamEntry>> {
        let entry_size = self.entry_size();
        if entry_size == 0 {
            return Err(ParseError::InvalidXRef("entry size is 0".to_string()));
        }
        let expected = self.expected_entries();
        let needed = expected.checked_mul(entry_size).unwrap_or(usize::MAX);
        if needed > data.len() {
            return Err(ParseError::InvalidXRef(format!(
                "{expected} entries of {entry_size} bytes do not fit in {} bytes",
                data.len()
            )));
        }
        if needed < data.len() {
            debug!(extra = data.len() - needed, "trailing bytes after xref stream entries");
        }

        let mut entries = Vec::with_capacity(expected);
        let mut records = data.chunks_exact(entry_size);
        for &(first, count) in &self.subsections {
            for number in first..first.saturating_add(count) {
                let Some(record) = records.next() else {
                    break;
                };
                entries.push(self.read_record(number, record));
            }
        }
        Ok(entries)
    }

    fn read_record(&self, object_number: i64, record: &[u8]) -> XRefStreamEntry {
        let mut fields = [0u64; 3];
        let mut offset = 0;
        for (field, &width) in fields.iter_mut().zip(&self.widths) {
            *field = read_field(&record[offset..offset + width]);
            offset += width;
        }
        if self.widths[0] == 0 {
            fields[0] = 1;
        }
        XRefStreamEntry {
            object_number,
            fields,
            widths: self.widths,
        }
    }
}

/// Read a field from bytes (big-endian)
fn read_field(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(0u64, |value, &byte| (value << 8) | u64::from(byte))
}
