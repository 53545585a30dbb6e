//! PDF Document
//!
//! The navigable view over a parsed file: the revisions found by the scan, the merged
//! object table (the newest definition of each id wins), the trailer chain and the
//! lazily decoded stream payloads.

use super::decode::{decode_stream, DecodedStream};
use super::encryption_handler::EncryptionState;
use super::header::PdfHeader;
use super::object_stream;
use super::objects::{
    IndirectObject, ObjectId, ObjectKind, PdfDictionary, PdfObject, PdfStream, PdfString, PdfValue,
    Source, NULL_VALUE,
};
use super::reader::{PdfReader, ScanOutput};
use super::revision::Revision;
use super::stream::check_size;
use super::trailer::{TrailerRef, TrailerRegistry};
use super::xref::XRefTable;
use super::xref_stream::{XRefStream, XRefStreamEntry};
use super::{ParseOptions, ParseResult};
use crate::analysis::functional::{FunctionalRoles, SyntheticStream};
use crate::analysis::{CrossReferences, ElementRef, PdfStatistics, StreamKind, SuspiciousType};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, warn};

static NOT_ENCRYPTED: EncryptionState = EncryptionState::NotEncrypted;

/// A stream listed for consumers
#[derive(Debug, Clone, Copy)]
pub struct StreamEntry<'a> {
    /// The stream object, or the object a synthetic stream was built from
    pub id: ObjectId,
    pub stream: &'a PdfStream,
    /// Role found by the functional analysis
    pub role: Option<&'a StreamKind>,
    pub synthetic: bool,
}

/// A parsed PDF document
#[derive(Debug)]
pub struct Document {
    source: Source,
    header: PdfHeader,
    revisions: Vec<Revision>,
    /// Merged view: id to the revision holding its newest definition
    index: BTreeMap<ObjectId, usize>,
    trailers: TrailerRegistry,
    /// Object streams extending another one, hidden from the stream list
    extending: BTreeSet<ObjectId>,
    /// Base object stream to the streams extending it
    extended_by: BTreeMap<ObjectId, Vec<ObjectId>>,
    roles: FunctionalRoles,
    statistics: RefCell<PdfStatistics>,
    options: ParseOptions,
}

impl Document {
    /// Parse an in-memory PDF with default options
    pub fn parse(data: &[u8]) -> ParseResult<Self> {
        PdfReader::new(data).parse()
    }

    pub fn parse_with_options(data: &[u8], options: ParseOptions) -> ParseResult<Self> {
        PdfReader::new(data).with_options(options).parse()
    }

    /// Read and parse a PDF file
    pub fn open<P: AsRef<Path>>(path: P) -> ParseResult<Self> {
        PdfReader::open(path)?.parse()
    }

    pub fn open_with_options<P: AsRef<Path>>(path: P, options: ParseOptions) -> ParseResult<Self> {
        PdfReader::open(path)?.with_options(options).parse()
    }

    pub(crate) fn build(
        source: Source,
        header: PdfHeader,
        scan: ScanOutput,
        stats: PdfStatistics,
        options: ParseOptions,
    ) -> Self {
        let mut doc = Self {
            source,
            header,
            revisions: scan.revisions,
            index: BTreeMap::new(),
            trailers: scan.trailers,
            extending: BTreeSet::new(),
            extended_by: BTreeMap::new(),
            roles: FunctionalRoles::new(),
            statistics: RefCell::new(stats),
            options,
        };
        doc.rebuild_index();
        doc.register_xref_streams();
        doc.alias_start_xrefs();
        doc.expand_object_streams();
        doc.check_stream_sizes();
        doc.decrypt_strings();
        if doc.options.analyze_content {
            doc.roles = FunctionalRoles::analyze(&doc);
        }
        let streams = doc.streams().len();
        {
            let stats = doc.statistics.get_mut();
            stats.nb_revisions = doc.revisions.len();
            stats.nb_streams = streams;
        }
        if doc.options.eager_decoding {
            let decoded = doc.decode_all_streams();
            debug!(decoded, "eager decoding complete");
        }
        doc
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        for revision in &self.revisions {
            for id in revision.ids() {
                self.index.insert(id, revision.index);
            }
        }
    }

    /// Streams declaring `/Type /XRef` join the trailer chain at their own offset
    fn register_xref_streams(&mut self) {
        let mut found = Vec::new();
        for revision in &self.revisions {
            for object in revision.objects() {
                let Some(stream) = object.as_stream() else {
                    continue;
                };
                if object.kind == ObjectKind::Indirect && self.declared_type(&stream.dict) == Some("XRef") {
                    found.push((object.span.start, object.id, revision.index));
                }
            }
        }
        for (offset, id, revision) in found {
            debug!(%id, offset, "cross-reference stream");
            self.trailers.register(offset, TrailerRef { id, revision });
            if let Some(revision) = self.revisions.get_mut(revision) {
                revision.set_trailer(id);
            }
            self.statistics.get_mut().nb_trailers += 1;
        }
    }

    /// `startxref` values are authoritative for the next revision's `/Prev`
    fn alias_start_xrefs(&mut self) {
        for revision in &self.revisions {
            if let (Some(offset), Some(id)) = (revision.start_xref(), revision.trailer()) {
                self.trailers.alias(
                    offset,
                    TrailerRef {
                        id,
                        revision: revision.index,
                    },
                );
            }
        }
    }

    fn expand_object_streams(&mut self) {
        let mut containers = Vec::new();
        for revision in &self.revisions {
            for object in revision.objects() {
                if let Some(stream) = object.as_stream() {
                    if object.kind == ObjectKind::Indirect
                        && self.declared_type(&stream.dict) == Some("ObjStm")
                    {
                        containers.push((object.id, revision.index));
                    }
                }
            }
        }
        if containers.is_empty() {
            return;
        }

        let mut children = Vec::new();
        let mut links = Vec::new();
        for &(id, revision) in &containers {
            let Some(stream) = self.get_in_revision(revision, id).and_then(|o| o.as_stream()) else {
                continue;
            };
            let integer = |key: &str| {
                self.get_attribute(&stream.dict, key)
                    .and_then(|value| value.as_number())
                    .and_then(|number| number.as_usize())
            };
            let expanded = match (integer("N"), integer("First")) {
                (Some(n), Some(first)) => {
                    let decoded: Source = Arc::from(self.decoded_data(stream));
                    let mut stats = self.statistics.borrow_mut();
                    object_stream::expand(
                        &decoded,
                        id,
                        revision,
                        n,
                        first,
                        self.options.max_nesting_depth,
                        &mut stats,
                    )
                }
                _ => Err(super::ParseError::MissingKey("N or First in object stream".to_string())),
            };
            match expanded {
                Ok(objects) => {
                    debug!(container = %id, children = objects.len(), "object stream expanded");
                    children.extend(objects);
                }
                Err(err) => {
                    error!(container = %id, %err, "Unable to parse Stream/ObjStm stream");
                    self.report(
                        Some(id),
                        stream.element,
                        SuspiciousType::MalformedStream,
                        "Unable to parse Stream/ObjStm stream",
                    );
                }
            }
            if let Some(base) = stream.dict.get("Extends").and_then(|value| value.as_reference()) {
                links.push((base, id));
            }
        }

        let mut streamed = 0;
        for child in children {
            let (id, revision) = (child.id, child.revision);
            let inserted = self
                .revisions
                .get_mut(revision)
                .is_some_and(|target| target.insert_if_absent(child));
            if inserted {
                streamed += 1;
            } else {
                debug!(%id, revision, "object stream child already defined");
            }
        }
        for (base, extension) in links {
            self.extending.insert(extension);
            self.extended_by.entry(base).or_default().push(extension);
        }
        self.statistics.get_mut().nb_streamed_objects += streamed;
        self.rebuild_index();
    }

    fn check_stream_sizes(&self) {
        for revision in &self.revisions {
            for object in revision.objects() {
                if let (Some(stream), ObjectKind::Indirect) = (object.as_stream(), object.kind) {
                    let declared = stream
                        .dict
                        .get("Length")
                        .map(|value| &self.resolve(value).object);
                    check_size(stream, object.id, declared, &mut self.statistics.borrow_mut());
                }
            }
        }
    }

    /// Decrypt every string of the objects written in the file body
    fn decrypt_strings(&mut self) {
        for revision in 0..self.revisions.len() {
            let state = self.encryption_state(revision).clone();
            if !state.is_encrypted() {
                continue;
            }
            let encrypt_id = state.encrypt_id();
            let targets: Vec<ObjectId> = self.revisions[revision]
                .objects()
                .filter(|object| object.kind == ObjectKind::Indirect && Some(object.id) != encrypt_id)
                .filter(|object| {
                    object
                        .value
                        .dictionary()
                        .map_or(true, |dict| self.declared_type(dict) != Some("XRef"))
                })
                .map(|object| object.id)
                .collect();

            let mut failures = Vec::new();
            for id in targets {
                let Some(object) = self.revisions[revision].get_mut(id) else {
                    continue;
                };
                let root = object.span.start;
                let mut failed = None;
                let mut found = false;
                decrypt_value(&mut object.value, &mut |string: &mut PdfString, offset: Option<usize>| {
                    found = true;
                    let Some(handler) = state.handler() else {
                        return;
                    };
                    match handler.decrypt_string(id, &string.bytes) {
                        Ok(plain) => string.decrypted = Some(plain),
                        Err(err) => {
                            debug!(%id, %err, "string decryption failed");
                            failed.get_or_insert(offset.unwrap_or(root));
                        }
                    }
                });
                if let Some(offset) = failed {
                    failures.push((id, offset, "Can not unencrypt String"));
                } else if found && state.handler().is_none() {
                    failures.push((id, root, "Encrypted"));
                }
            }
            let stats = self.statistics.get_mut();
            for (id, offset, description) in failures {
                stats.add_anomaly(
                    id,
                    ElementRef::root(offset),
                    SuspiciousType::StreamUnfiltered,
                    description,
                );
            }
        }
    }

    /// `/Type` of a dictionary, dereferenced
    fn declared_type<'a>(&'a self, dict: &'a PdfDictionary) -> Option<&'a str> {
        self.get_attribute(dict, "Type")
            .and_then(|value| value.as_name())
            .map(|name| name.as_str())
    }

    fn get_in_revision(&self, revision: usize, id: ObjectId) -> Option<&IndirectObject> {
        self.revisions.get(revision)?.get(id)
    }

    pub fn header(&self) -> &PdfHeader {
        &self.header
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    /// The whole input buffer
    pub fn source(&self) -> &[u8] {
        &self.source
    }

    pub fn revisions(&self) -> &[Revision] {
        &self.revisions
    }

    /// Top-level objects of the merged view, ordered by id
    pub fn get_object_list(&self) -> Vec<&IndirectObject> {
        self.index
            .iter()
            .filter_map(|(&id, &revision)| self.get_in_revision(revision, id))
            .collect()
    }

    /// Newest definition of `id`
    pub fn get_object(&self, id: ObjectId) -> Option<&IndirectObject> {
        let revision = *self.index.get(&id)?;
        self.get_in_revision(revision, id)
    }

    /// Follow references until a direct value is reached.
    ///
    /// A missing target or a chain longer than `max_reference_depth` yields null.
    pub fn resolve<'a>(&'a self, value: &'a PdfValue) -> &'a PdfValue {
        let mut current = value;
        for _ in 0..self.options.max_reference_depth {
            let Some(id) = current.as_reference() else {
                return current;
            };
            match self.get_object(id) {
                Some(object) => current = &object.value,
                None => {
                    debug!(%id, "reference to a missing object");
                    return &NULL_VALUE;
                }
            }
        }
        match current.as_reference() {
            Some(id) => {
                warn!(%id, depth = self.options.max_reference_depth, "reference chain too deep");
                &NULL_VALUE
            }
            None => current,
        }
    }

    /// Value of `key` in `dict`, dereferenced; `None` when the key is absent
    pub fn get_attribute<'a>(&'a self, dict: &'a PdfDictionary, key: &str) -> Option<&'a PdfValue> {
        dict.get(key).map(|value| self.resolve(value))
    }

    /// Decoded payload of `stream`, with its pipeline history. Computed once.
    pub fn decode<'a>(&self, stream: &'a PdfStream) -> &'a DecodedStream {
        stream.decoded.get_or_init(|| decode_stream(self, stream))
    }

    /// Decoded bytes of `stream`
    pub fn decoded_data<'a>(&self, stream: &'a PdfStream) -> &'a [u8] {
        &self.decode(stream).data
    }

    /// Payload before each decoding stage, raw bytes first
    pub fn encoded_data_list<'a>(&self, stream: &'a PdfStream) -> &'a [Vec<u8>] {
        &self.decode(stream).snapshots
    }

    /// Streams for consumers: top-level stream objects (object streams extending
    /// another one excluded), then synthetic streams
    pub fn streams(&self) -> Vec<StreamEntry<'_>> {
        let mut entries: Vec<StreamEntry<'_>> = self
            .get_object_list()
            .into_iter()
            .filter(|object| !self.extending.contains(&object.id))
            .filter_map(|object| {
                object.as_stream().map(|stream| StreamEntry {
                    id: object.id,
                    stream,
                    role: self.roles.role(object.id),
                    synthetic: false,
                })
            })
            .collect();
        entries.extend(self.roles.synthetic().iter().map(|synthetic: &SyntheticStream| StreamEntry {
            id: synthetic.owner,
            stream: &synthetic.stream,
            role: Some(&synthetic.kind),
            synthetic: true,
        }));
        entries
    }

    /// What a listed stream most likely holds; decodes it when sniffing is needed
    pub fn stream_kind(&self, entry: &StreamEntry<'_>) -> StreamKind {
        if let Some(role) = entry.role {
            return role.clone();
        }
        let dict = &entry.stream.dict;
        if let Some(full_type) = StreamKind::full_type(dict) {
            return StreamKind::Typed(full_type);
        }
        StreamKind::classify(None, dict, self.decoded_data(entry.stream))
    }

    pub fn roles(&self) -> &FunctionalRoles {
        &self.roles
    }

    /// Object streams extending `base` through `/Extends`
    pub fn extensions_of(&self, base: ObjectId) -> &[ObjectId] {
        self.extended_by.get(&base).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_extending(&self, id: ObjectId) -> bool {
        self.extending.contains(&id)
    }

    /// Decode every listed stream now; returns how many were decoded
    pub fn decode_all_streams(&self) -> usize {
        let entries = self.streams();
        for entry in &entries {
            self.decode(entry.stream);
        }
        entries.len()
    }

    /// Trailers and cross-reference streams, ordered by revision
    pub fn trailers(&self) -> Vec<TrailerRef> {
        self.trailers.trailers()
    }

    pub fn trailer_registry(&self) -> &TrailerRegistry {
        &self.trailers
    }

    fn trailer_dict(&self, trailer: TrailerRef) -> Option<&PdfDictionary> {
        self.get_in_revision(trailer.revision, trailer.id)?
            .value
            .dictionary()
    }

    /// Trailer a lookup for `revision` starts from: its own, else the nearest later
    /// one (whose `/Prev` chain reaches back), else the nearest earlier one
    fn starting_trailer(&self, revision: usize) -> Option<TrailerRef> {
        let own = self.revisions.get(revision).into_iter();
        let later = self.revisions.iter().skip(revision + 1);
        let earlier = self.revisions.iter().take(revision.min(self.revisions.len())).rev();
        own.chain(later)
            .chain(earlier)
            .find_map(|candidate| {
                candidate.trailer().map(|id| TrailerRef {
                    id,
                    revision: candidate.index,
                })
            })
    }

    /// The trailer of `revision` and every trailer reached through `/Prev`
    pub fn trailer_chain(&self, revision: usize) -> Vec<TrailerRef> {
        let mut chain = Vec::new();
        let mut visited = BTreeSet::new();
        let mut next = self.starting_trailer(revision);
        while let Some(trailer) = next {
            if !visited.insert((trailer.revision, trailer.id)) {
                debug!(trailer = %trailer.id, "cycle in /Prev chain");
                break;
            }
            chain.push(trailer);
            next = self
                .trailer_dict(trailer)
                .and_then(|dict| self.get_attribute(dict, "Prev"))
                .and_then(|prev| prev.as_number())
                .and_then(|prev| prev.as_usize())
                .and_then(|offset| self.trailers.get(offset));
        }
        chain
    }

    /// First non-null `key` along the trailer chain of `revision`, not dereferenced,
    /// and the revision of the trailer holding it
    fn trailer_value_in(&self, revision: usize, key: &str) -> Option<(&PdfValue, usize)> {
        self.trailer_chain(revision).into_iter().find_map(|trailer| {
            let value = self.trailer_dict(trailer)?.get(key)?;
            (!value.is_null()).then_some((value, trailer.revision))
        })
    }

    fn newest_revision(&self) -> usize {
        self.revisions.len().saturating_sub(1)
    }

    /// `key` from the newest trailer defining it, not dereferenced
    pub fn trailer_value(&self, key: &str) -> Option<&PdfValue> {
        self.trailer_value_in(self.newest_revision(), key)
            .map(|(value, _)| value)
    }

    /// `key` from the newest trailer defining it, dereferenced
    pub fn trailer_attribute(&self, key: &str) -> Option<&PdfValue> {
        self.trailer_value(key).map(|value| self.resolve(value))
    }

    /// Decryption state of a revision, derived on first use
    pub fn encryption_state(&self, revision: usize) -> &EncryptionState {
        let Some(target) = self.revisions.get(revision) else {
            return &NOT_ENCRYPTED;
        };
        target
            .encryption
            .get_or_init(|| self.derive_encryption(revision))
    }

    fn derive_encryption(&self, revision: usize) -> EncryptionState {
        let Some((encrypt, _)) = self.trailer_value_in(revision, "Encrypt") else {
            return EncryptionState::NotEncrypted;
        };
        let encrypt_id = encrypt.as_reference();
        let state = match self.resolve(encrypt).as_dict() {
            Some(dict) => {
                let doc_id = self
                    .trailer_value_in(revision, "ID")
                    .and_then(|(ids, _)| self.resolve(ids).as_array())
                    .and_then(|ids| ids.get(0))
                    .and_then(|first| self.resolve(first).as_string())
                    .map(|id| id.as_bytes().to_vec())
                    .unwrap_or_default();
                EncryptionState::derive(
                    dict,
                    encrypt_id,
                    &doc_id,
                    self.options.password.as_deref(),
                    |value| self.resolve(value),
                )
            }
            None => {
                error!(revision, "Can not decrypt PDF file: /Encrypt is not a dictionary");
                EncryptionState::Locked {
                    encrypt_id,
                    password_required: false,
                    reason: "/Encrypt is not a dictionary".to_string(),
                }
            }
        };
        self.statistics
            .borrow_mut()
            .set_encrypted(state.is_encrypted(), state.is_password_required());
        state
    }

    pub fn is_encrypted(&self) -> bool {
        (0..self.revisions.len()).any(|revision| self.encryption_state(revision).is_encrypted())
    }

    /// Entries of every classic `xref` section, later revisions overriding earlier ones
    pub fn xref_table(&self) -> XRefTable {
        let mut table = XRefTable::new();
        for revision in &self.revisions {
            for &section in revision.xref_sections() {
                if let Err(err) = table.parse_section(&self.source, section) {
                    warn!(revision = revision.index, offset = section.start, %err, "unreadable xref section");
                }
            }
        }
        table
    }

    /// Records of every cross-reference stream. A stream whose layout does not match
    /// its payload yields no records.
    pub fn xref_stream_entries(&self) -> Vec<(ObjectId, Vec<XRefStreamEntry>)> {
        let mut result = Vec::new();
        for trailer in self.trailers() {
            let Some(stream) = self
                .get_in_revision(trailer.revision, trailer.id)
                .and_then(|object| object.as_stream())
            else {
                continue;
            };
            let entries = XRefStream::parse(&stream.dict, |value| self.resolve(value))
                .and_then(|layout| layout.entries(self.decoded_data(stream)));
            match entries {
                Ok(entries) => result.push((trailer.id, entries)),
                Err(err) => {
                    error!(stream = %trailer.id, %err, "Unable to parse cross-reference stream");
                    self.report(
                        Some(trailer.id),
                        stream.element,
                        SuspiciousType::Malformed,
                        format!("Unable to parse [Stream {}]: {err}", trailer.id),
                    );
                    result.push((trailer.id, Vec::new()));
                }
            }
        }
        result
    }

    /// Every place each object number is defined or referenced
    pub fn cross_references(&self) -> CrossReferences {
        CrossReferences::build(self.get_object_list())
    }

    /// Snapshot of the statistics and anomalies collected so far
    pub fn statistics(&self) -> PdfStatistics {
        self.statistics.borrow().clone()
    }

    pub fn into_statistics(self) -> PdfStatistics {
        self.statistics.into_inner()
    }

    pub(crate) fn report(
        &self,
        owner: Option<ObjectId>,
        element: ElementRef,
        kind: SuspiciousType,
        description: impl AsRef<str>,
    ) {
        match owner {
            Some(owner) => {
                self.statistics
                    .borrow_mut()
                    .add_anomaly(owner, element, kind, description);
            }
            None => debug!(%kind, "{} outside of any object", description.as_ref()),
        }
    }

    pub(crate) fn record_filter(&self, name: &str) {
        self.statistics.borrow_mut().add_filter_used(name);
    }
}

/// Apply `visit` to every string of a value tree, with the string's offset
fn decrypt_value(
    value: &mut PdfValue,
    visit: &mut dyn FnMut(&mut PdfString, Option<usize>),
) {
    let offset = value.start();
    match &mut value.object {
        PdfObject::String(string) => visit(string, offset),
        PdfObject::Array(array) => {
            for item in array.0.iter_mut() {
                decrypt_value(item, visit);
            }
        }
        PdfObject::Dictionary(dict) => {
            for (_, item) in dict.0.iter_mut() {
                decrypt_value(item, visit);
            }
        }
        PdfObject::Stream(stream) => {
            for (_, item) in stream.dict.0.iter_mut() {
                decrypt_value(item, visit);
            }
        }
        _ => {}
    }
}
