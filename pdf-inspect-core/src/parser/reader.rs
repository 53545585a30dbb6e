//! High-level PDF Reader API
//!
//! Reads the whole input into memory and runs the body scan: a single left-to-right
//! pass that dispatches on `obj`, `trailer`, `xref`, `startxref` and `%%EOF`.
//! Everything else between objects is parsed and dropped, except the two integers
//! that may announce the next object id.

use super::composite::parse_value;
use super::context::ParseContext;
use super::document::Document;
use super::header::PdfHeader;
use super::indirect::{parse_body, Terminator};
use super::lexer::{matches_keyword, skip_comment, skip_separators, skip_separators_and_comments, Keyword};
use super::object_id::recover_object_id;
use super::objects::{IndirectObject, ObjectId, ObjectKind, PdfObject, Source, Span};
use super::revision::Revision;
use super::trailer::{TrailerRef, TrailerRegistry};
use super::value::parse_token;
use super::xref::skip_table;
use super::{ParseError, ParseOptions, ParseResult};
use crate::analysis::PdfStatistics;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// High-level PDF reader
#[derive(Debug, Clone)]
pub struct PdfReader {
    source: Source,
    options: ParseOptions,
}

impl PdfReader {
    /// Create a reader over an in-memory buffer
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            source: Arc::from(data.into()),
            options: ParseOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ParseOptions) -> Self {
        self.options = options;
        self
    }

    /// Read a PDF file from a path
    pub fn open<P: AsRef<Path>>(path: P) -> ParseResult<Self> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    /// Drain any reader into memory; parsing never streams
    pub fn from_reader<R: Read>(mut reader: R) -> ParseResult<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Ok(Self::new(data))
    }

    /// Get parsing options
    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    /// Scan the buffer and run the post-passes.
    ///
    /// Only a missing header fails; every other problem ends up in the anomalies.
    pub fn parse(self) -> ParseResult<Document> {
        let header = PdfHeader::parse(&self.source)?;
        let mut stats = PdfStatistics::new();
        if let Some(version) = header.version {
            stats.set_version(version.to_string());
        }
        let scan = Scanner::new(&self.source, &mut stats, self.options.max_nesting_depth).run();
        debug!(
            revisions = scan.revisions.len(),
            trailers = scan.trailers.len(),
            "body scan complete"
        );
        Ok(Document::build(
            self.source,
            header,
            scan,
            stats,
            self.options,
        ))
    }
}

/// Revisions and trailers found by the body scan
#[derive(Debug, Default)]
pub struct ScanOutput {
    pub revisions: Vec<Revision>,
    pub trailers: TrailerRegistry,
}

/// An integer token seen between objects
#[derive(Debug, Clone, Copy)]
struct PendingInteger {
    value: i64,
    start: usize,
}

struct Scanner<'a> {
    source: &'a Source,
    stats: &'a mut PdfStatistics,
    revisions: Vec<Revision>,
    current: Revision,
    trailers: TrailerRegistry,
    /// Trailers seen in the current revision
    trailer_count: i32,
    /// The last integers read, most recent last
    pending: Vec<PendingInteger>,
    max_depth: usize,
}

impl<'a> Scanner<'a> {
    fn new(source: &'a Source, stats: &'a mut PdfStatistics, max_depth: usize) -> Self {
        Self {
            source,
            stats,
            revisions: Vec::new(),
            current: Revision::new(0),
            trailers: TrailerRegistry::new(),
            trailer_count: 0,
            pending: Vec::new(),
            max_depth,
        }
    }

    fn run(mut self) -> ScanOutput {
        let data: &[u8] = self.source;
        let mut pos = 0;
        while pos < data.len() {
            pos = skip_separators(data, pos);
            if pos >= data.len() {
                break;
            }
            pos = if matches_keyword(data, pos, Keyword::Eof) {
                self.end_revision();
                pos + Keyword::Eof.len()
            } else if data[pos] == b'%' {
                skip_comment(data, pos)
            } else if matches_keyword(data, pos, Keyword::Obj) {
                self.indirect_object(pos)
            } else if matches_keyword(data, pos, Keyword::Trailer) {
                self.trailer(pos)
            } else if matches_keyword(data, pos, Keyword::StartXref) {
                self.start_xref(pos)
            } else if matches_keyword(data, pos, Keyword::Xref) {
                self.pending.clear();
                let end = skip_table(data, pos + Keyword::Xref.len());
                self.current.add_xref_section(Span::new(pos, end));
                end
            } else if let Some(keyword) = [Keyword::EndObj, Keyword::EndStream]
                .into_iter()
                .find(|&keyword| matches_keyword(data, pos, keyword))
            {
                debug!(position = pos, "stray {} keyword", String::from_utf8_lossy(keyword.as_bytes()));
                self.pending.clear();
                pos + keyword.len()
            } else {
                self.stray_value(pos)
            };
        }
        self.end_revision();
        ScanOutput {
            revisions: self.revisions,
            trailers: self.trailers,
        }
    }

    /// Close the current revision at `%%EOF` (or at the end of data)
    fn end_revision(&mut self) {
        self.pending.clear();
        if self.current.is_empty() {
            return;
        }
        let index = self.revisions.len() + 1;
        let finished = std::mem::replace(&mut self.current, Revision::new(index));
        debug!(revision = finished.index, objects = finished.len(), "revision closed");
        self.revisions.push(finished);
        self.trailer_count = 0;
    }

    /// Value found outside any object. Integers are kept as a possible object id.
    fn stray_value(&mut self, pos: usize) -> usize {
        let mut ctx = ParseContext::new(self.stats, None, self.current.index).with_max_depth(self.max_depth);
        match parse_value(self.source, pos, &mut ctx) {
            Ok((Some(value), next)) => {
                match &value.object {
                    PdfObject::Number(number) if number.0.bytes().all(|b| b.is_ascii_digit()) => {
                        if let Some(value) = number.as_i64() {
                            self.pending.push(PendingInteger { value, start: pos });
                            if self.pending.len() > 2 {
                                self.pending.remove(0);
                            }
                        }
                    }
                    _ => self.pending.clear(),
                }
                next.max(pos + 1)
            }
            Ok((None, next)) => next.max(pos + 1),
            Err(ParseError::UnexpectedObjectStart { position }) if position > pos => {
                self.pending.clear();
                position
            }
            Err(err) => {
                debug!(position = pos, %err, "skipping unparsable byte");
                self.pending.clear();
                pos + 1
            }
        }
    }

    /// Id of the object whose `obj` keyword is at `obj_pos`, and where it starts
    fn object_id(&mut self, obj_pos: usize) -> (ObjectId, usize) {
        let announced = match self.pending.as_slice() {
            [number, generation] => i32::try_from(number.value)
                .ok()
                .zip(i32::try_from(generation.value).ok())
                .map(|(n, g)| (ObjectId::new(n, g), number.start)),
            _ => None,
        };
        self.pending.clear();
        announced.unwrap_or_else(|| {
            let recovered = recover_object_id(self.source, obj_pos);
            (recovered.id, recovered.start)
        })
    }

    fn indirect_object(&mut self, obj_pos: usize) -> usize {
        let (id, start) = self.object_id(obj_pos);
        let revision = self.current.index;
        let mut ctx = ParseContext::new(self.stats, Some(id), revision).with_max_depth(self.max_depth);
        let body = parse_body(
            self.source,
            obj_pos + Keyword::Obj.len(),
            Terminator::EndObj,
            start,
            &mut ctx,
        );
        self.stats.nb_indirect_objects += 1;
        let replaced = self.current.insert(IndirectObject {
            id,
            value: body.value,
            kind: ObjectKind::Indirect,
            revision,
            span: Span::new(start, body.end),
        });
        if replaced.is_some() {
            info!(%id, revision, "object defined twice in the same revision, keeping the last one");
        }
        body.next.max(obj_pos + Keyword::Obj.len())
    }

    fn trailer(&mut self, pos: usize) -> usize {
        self.pending.clear();
        let id = ObjectId::trailer(self.trailer_count);
        self.trailer_count += 1;
        let revision = self.current.index;
        let mut ctx = ParseContext::new(self.stats, Some(id), revision).with_max_depth(self.max_depth);
        let body = parse_body(
            self.source,
            pos + Keyword::Trailer.len(),
            Terminator::StartXref,
            pos,
            &mut ctx,
        );
        self.stats.nb_trailers += 1;
        self.stats.nb_indirect_objects += 1;
        self.current.insert(IndirectObject {
            id,
            value: body.value,
            kind: ObjectKind::Trailer,
            revision,
            span: Span::new(pos, body.end),
        });
        self.current.set_trailer(id);

        // `/Prev` points at the xref section the trailer closes
        let offset = self
            .current
            .xref_sections()
            .last()
            .map_or(pos, |section| section.start);
        self.trailers.register(offset, TrailerRef { id, revision });
        body.next.max(pos + Keyword::Trailer.len())
    }

    fn start_xref(&mut self, pos: usize) -> usize {
        self.pending.clear();
        let data: &[u8] = self.source;
        let start = skip_separators_and_comments(data, pos + Keyword::StartXref.len());
        let mut ctx = ParseContext::new(self.stats, None, self.current.index).with_max_depth(self.max_depth);
        match parse_token(data, start, &mut ctx) {
            Ok((value, next)) => match value.as_number().and_then(|number| number.as_usize()) {
                Some(offset) => {
                    self.current.set_start_xref(offset);
                    next
                }
                None => {
                    info!(position = pos, "startxref is not followed by an offset");
                    start.max(pos + Keyword::StartXref.len())
                }
            },
            Err(_) => start.max(pos + Keyword::StartXref.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::context::MAX_NESTING_DEPTH;

    fn scan(input: &[u8]) -> (ScanOutput, PdfStatistics) {
        let source: Source = Arc::from(input);
        let mut stats = PdfStatistics::new();
        let output = Scanner::new(&source, &mut stats, MAX_NESTING_DEPTH).run();
        (output, stats)
    }

    #[test]
    fn test_single_object() {
        let (output, stats) = scan(b"%PDF-1.4\n1 0 obj\n15\nendobj\n");
        assert_eq!(output.revisions.len(), 1);
        let object = output.revisions[0].get(ObjectId::new(1, 0)).unwrap();
        assert_eq!(object.value.as_number().unwrap().0, "15");
        assert_eq!(object.span.start, 9);
        assert_eq!(stats.nb_indirect_objects, 1);
    }

    #[test]
    fn test_revisions_split_at_eof() {
        let input = b"%PDF-1.4\n1 0 obj 1 endobj\ntrailer << /Size 2 >>\nstartxref\n0\n%%EOF\n\
                      1 0 obj 2 endobj\ntrailer << /Size 2 /Prev 0 >>\nstartxref\n9\n%%EOF\n";
        let (output, stats) = scan(input);
        assert_eq!(output.revisions.len(), 2);
        assert_eq!(output.revisions[0].start_xref(), Some(0));
        assert_eq!(output.revisions[1].index, 1);
        assert_eq!(output.revisions[1].trailer(), Some(ObjectId::trailer(0)));
        assert_eq!(stats.nb_trailers, 2);
        assert_eq!(output.trailers.len(), 2);
    }

    #[test]
    fn test_xref_section_is_recorded_and_keys_trailer() {
        let input = b"1 0 obj 1 endobj\nxref\n0 2\n0000000000 65535 f \n0000000000 00000 n \ntrailer\n<< /Size 2 >>\nstartxref\n17\n%%EOF";
        let (output, _) = scan(input);
        let revision = &output.revisions[0];
        assert_eq!(revision.xref_sections().len(), 1);
        assert_eq!(revision.xref_sections()[0].start, 17);
        let trailer = output.trailers.get(17).unwrap();
        assert_eq!(trailer.id, ObjectId::trailer(0));
    }

    #[test]
    fn test_missing_endobj_restarts_at_next_object() {
        let input = b"1 0 obj\n<< /A [1 2\n2 0 obj\n(two)\nendobj\n";
        let (output, stats) = scan(input);
        let revision = &output.revisions[0];
        assert!(revision.get(ObjectId::new(1, 0)).unwrap().value.is_null());
        let second = revision.get(ObjectId::new(2, 0)).unwrap();
        assert_eq!(second.value.as_string().unwrap().value(), b"two");
        assert!(!stats.anomalies().for_owner(ObjectId::new(1, 0)).is_empty());
    }

    #[test]
    fn test_stray_tokens_do_not_leak_into_ids() {
        let input = b"1 0 obj 1 endobj\n7 /Junk 2 0 obj 2 endobj\n";
        let (output, _) = scan(input);
        assert!(output.revisions[0].contains(ObjectId::new(2, 0)));
        assert_eq!(output.revisions[0].len(), 2);
    }

    #[test]
    fn test_unrecoverable_id_is_kept_as_undefined() {
        let (output, _) = scan(b"/Name obj 5 endobj");
        let object = output.revisions[0].get(ObjectId::new(0, 0)).unwrap();
        assert_eq!(object.value.as_integer(), Some(5));
    }

    #[test]
    fn test_reader_requires_header() {
        assert!(matches!(
            PdfReader::new(b"1 0 obj 1 endobj".to_vec()).parse(),
            Err(ParseError::InvalidHeader)
        ));
        assert!(PdfReader::new(b"%PDF-1.7\n".to_vec()).parse().is_ok());
    }
}
