//! Functional roles
//!
//! Marks streams by what the document does with them rather than by what they
//! declare: scripts reached from `/JS`, page content streams and XFA forms. Scripts
//! and forms that are not stored as a single stream get a synthetic one so consumers
//! can treat every payload the same way.

use super::anomalies::ElementRef;
use super::stream_kind::StreamKind;
use crate::parser::{Document, IndirectObject, ObjectId, PdfDictionary, PdfObject, PdfStream, PdfValue};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// A stream built from data spread over the object graph
#[derive(Debug, Clone)]
pub struct SyntheticStream {
    /// Object the data was found in
    pub owner: ObjectId,
    pub stream: PdfStream,
    pub kind: StreamKind,
}

#[derive(Debug, Clone, Default)]
pub struct FunctionalRoles {
    roles: BTreeMap<ObjectId, StreamKind>,
    synthetic: Vec<SyntheticStream>,
}

impl FunctionalRoles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Role of the stream object `id`, if one was found
    pub fn role(&self, id: ObjectId) -> Option<&StreamKind> {
        self.roles.get(&id)
    }

    pub fn roles(&self) -> impl Iterator<Item = (ObjectId, &StreamKind)> {
        self.roles.iter().map(|(id, kind)| (*id, kind))
    }

    pub fn synthetic(&self) -> &[SyntheticStream] {
        &self.synthetic
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty() && self.synthetic.is_empty()
    }

    /// Walk the merged object list of `doc`
    pub fn analyze(doc: &Document) -> Self {
        let mut analysis = Analysis {
            doc,
            roles: Self::new(),
            seen_scripts: BTreeSet::new(),
        };
        for object in doc.get_object_list() {
            analysis.walk(object, &object.value);
        }
        analysis.forms();
        debug!(
            roles = analysis.roles.roles.len(),
            synthetic = analysis.roles.synthetic.len(),
            "functional analysis complete"
        );
        analysis.roles
    }

    fn assign(&mut self, id: ObjectId, kind: StreamKind) {
        self.roles.entry(id).or_insert(kind);
    }
}

struct Analysis<'a> {
    doc: &'a Document,
    roles: FunctionalRoles,
    /// Script strings already turned into streams, by owner and offset
    seen_scripts: BTreeSet<(ObjectId, Option<usize>)>,
}

impl<'a> Analysis<'a> {
    fn walk(&mut self, object: &'a IndirectObject, value: &'a PdfValue) {
        match &value.object {
            PdfObject::Array(array) => {
                for item in array.iter() {
                    self.walk(object, item);
                }
            }
            PdfObject::Dictionary(dict) => self.dictionary(object, dict),
            PdfObject::Stream(stream) => self.dictionary(object, &stream.dict),
            _ => {}
        }
    }

    fn dictionary(&mut self, object: &'a IndirectObject, dict: &'a PdfDictionary) {
        if let Some(js) = dict.get("JS") {
            self.script(object, js);
        }
        if self.declared_type(dict) == Some("Page") {
            self.page_contents(dict);
        }
        for (_, value) in dict.iter() {
            self.walk(object, value);
        }
    }

    fn declared_type(&self, dict: &'a PdfDictionary) -> Option<&'a str> {
        self.doc
            .get_attribute(dict, "Type")
            .and_then(|value| value.as_name())
            .map(|name| name.as_str())
    }

    fn script(&mut self, object: &'a IndirectObject, js: &'a PdfValue) {
        let (owner, target) = match js.as_reference() {
            Some(id) => (id, self.doc.resolve(js)),
            None => (object.id, js),
        };
        match &target.object {
            PdfObject::Stream(_) => self.roles.assign(owner, StreamKind::Javascript),
            PdfObject::String(script) => {
                if !self.seen_scripts.insert((owner, target.start())) {
                    return;
                }
                let element = ElementRef::root(target.start().unwrap_or(object.span.start));
                self.roles.synthetic.push(SyntheticStream {
                    owner,
                    stream: PdfStream::synthetic(
                        PdfDictionary::new(),
                        script.value().to_vec(),
                        Some(owner),
                        object.revision,
                        element,
                    ),
                    kind: StreamKind::Javascript,
                });
            }
            _ => {}
        }
    }

    fn page_contents(&mut self, page: &'a PdfDictionary) {
        let Some(contents) = page.get("Contents") else {
            return;
        };
        let items: Vec<&PdfValue> = match &self.doc.resolve(contents).object {
            PdfObject::Array(array) => array.iter().collect(),
            _ => vec![contents],
        };
        for item in items {
            if let Some(id) = self.stream_reference(item) {
                self.roles.assign(id, StreamKind::Contents);
            }
        }
    }

    /// Id of the stream `value` refers to
    fn stream_reference(&self, value: &PdfValue) -> Option<ObjectId> {
        let id = value.as_reference()?;
        self.doc.resolve(value).as_stream().map(|_| id)
    }

    fn catalogs(&self) -> Vec<&'a IndirectObject> {
        let mut catalogs: Vec<&IndirectObject> = Vec::new();
        let root = self
            .doc
            .trailer_value("Root")
            .and_then(|value| value.as_reference())
            .and_then(|id| self.doc.get_object(id));
        catalogs.extend(root);
        for object in self.doc.get_object_list() {
            let is_catalog = object
                .value
                .as_dict()
                .is_some_and(|dict| self.declared_type(dict) == Some("Catalog"));
            if is_catalog && !catalogs.iter().any(|known| known.id == object.id) {
                catalogs.push(object);
            }
        }
        catalogs
    }

    /// `/AcroForm /XFA`: one stream, or an array of `(name, stream)` pairs
    fn forms(&mut self) {
        for catalog in self.catalogs() {
            let Some(catalog_dict) = catalog.value.as_dict() else {
                continue;
            };
            let Some(xfa) = self
                .doc
                .get_attribute(catalog_dict, "AcroForm")
                .and_then(|form| form.as_dict())
                .and_then(|form| form.get("XFA"))
            else {
                continue;
            };
            if let Some(id) = self.stream_reference(xfa) {
                self.roles.assign(id, StreamKind::Xfa);
                continue;
            }
            let Some(parts) = self.doc.resolve(xfa).as_array() else {
                continue;
            };
            let fragments: Vec<ObjectId> = parts
                .iter()
                .filter_map(|part| self.stream_reference(part))
                .collect();
            match fragments.as_slice() {
                [] => {}
                [single] => self.roles.assign(*single, StreamKind::Xfa),
                _ => self.assemble(catalog, &fragments),
            }
        }
    }

    fn assemble(&mut self, catalog: &'a IndirectObject, fragments: &[ObjectId]) {
        let mut data = Vec::new();
        for &id in fragments {
            self.roles.assign(id, StreamKind::XfaFragment);
            if let Some(stream) = self.doc.get_object(id).and_then(|object| object.as_stream()) {
                data.extend_from_slice(self.doc.decoded_data(stream));
            }
        }
        self.roles.synthetic.push(SyntheticStream {
            owner: catalog.id,
            stream: PdfStream::synthetic(
                PdfDictionary::new(),
                data,
                Some(catalog.id),
                catalog.revision,
                ElementRef::root(catalog.span.start),
            ),
            kind: StreamKind::Xfa,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyze(input: &[u8]) -> (Document, FunctionalRoles) {
        let doc = Document::parse_with_options(
            input,
            crate::parser::ParseOptions::default().with_content_analysis(false),
        )
        .unwrap();
        let roles = FunctionalRoles::analyze(&doc);
        (doc, roles)
    }

    #[test]
    fn test_script_stream_and_string() {
        let input = b"%PDF-1.4\n\
            1 0 obj << /S /JavaScript /JS 2 0 R >> endobj\n\
            2 0 obj << /Length 8 >>\nstream\napp.alert\nendstream\nendobj\n\
            3 0 obj << /S /JavaScript /JS (this.print) >> endobj\n";
        let (_, roles) = analyze(input);
        assert_eq!(roles.role(ObjectId::new(2, 0)), Some(&StreamKind::Javascript));
        assert_eq!(roles.synthetic().len(), 1);
        let script = &roles.synthetic()[0];
        assert_eq!(script.owner, ObjectId::new(3, 0));
        assert_eq!(script.kind, StreamKind::Javascript);
        assert_eq!(script.stream.encoded_data(), b"this.print");
    }

    #[test]
    fn test_page_contents() {
        let input = b"%PDF-1.4\n\
            1 0 obj << /Type /Page /Contents [2 0 R 3 0 R] >> endobj\n\
            2 0 obj << /Length 1 >>\nstream\nq\nendstream\nendobj\n\
            3 0 obj << /Length 1 >>\nstream\nQ\nendstream\nendobj\n";
        let (_, roles) = analyze(input);
        assert_eq!(roles.role(ObjectId::new(2, 0)), Some(&StreamKind::Contents));
        assert_eq!(roles.role(ObjectId::new(3, 0)), Some(&StreamKind::Contents));
        assert!(roles.synthetic().is_empty());
    }

    #[test]
    fn test_xfa_fragments_are_assembled() {
        let input = b"%PDF-1.5\n\
            1 0 obj << /Type /Catalog /AcroForm << /XFA [(preamble) 2 0 R (postamble) 3 0 R] >> >> endobj\n\
            2 0 obj << /Length 5 >>\nstream\n<xdp>\nendstream\nendobj\n\
            3 0 obj << /Length 6 >>\nstream\n</xdp>\nendstream\nendobj\n";
        let (_, roles) = analyze(input);
        assert_eq!(roles.role(ObjectId::new(2, 0)), Some(&StreamKind::XfaFragment));
        assert_eq!(roles.role(ObjectId::new(3, 0)), Some(&StreamKind::XfaFragment));
        let xfa = &roles.synthetic()[0];
        assert_eq!(xfa.kind, StreamKind::Xfa);
        assert_eq!(xfa.owner, ObjectId::new(1, 0));
        assert_eq!(xfa.stream.encoded_data(), b"<xdp></xdp>");
    }

    #[test]
    fn test_single_xfa_stream() {
        let input = b"%PDF-1.5\n\
            1 0 obj << /Type /Catalog /AcroForm 4 0 R >> endobj\n\
            4 0 obj << /XFA 2 0 R >> endobj\n\
            2 0 obj << /Length 5 >>\nstream\n<xdp>\nendstream\nendobj\n";
        let (_, roles) = analyze(input);
        assert_eq!(roles.role(ObjectId::new(2, 0)), Some(&StreamKind::Xfa));
    }
}
