//! Incremental updates, trailer chains, object streams and cross-reference streams

mod common;

use common::{object_stream_payload, PdfBuilder};
use pdf_inspect::analysis::StreamKind;
use pdf_inspect::parser::xref_stream::XRefEntry;
use pdf_inspect::parser::{Document, ObjectId, ObjectKind};
use pretty_assertions::assert_eq;

fn two_revisions() -> Vec<u8> {
    let mut builder = PdfBuilder::new("1.4");
    builder
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [] /Count 0 >>")
        .object(3, "<< /Title (first) >>")
        .end_revision("/Root 1 0 R /Info 3 0 R /Size 4");
    let prev = builder.last_xref();
    builder
        .object(3, "<< /Title (second) >>")
        .object(4, "(added)")
        .end_revision(&format!("/Size 5 /Prev {prev}"));
    builder.build()
}

#[test]
fn test_later_revision_shadows_earlier_object() {
    let doc = Document::parse(&two_revisions()).unwrap();
    assert_eq!(doc.revisions().len(), 2);

    let info = doc.get_object(ObjectId::new(3, 0)).unwrap();
    assert_eq!(info.revision, 1);
    let title = info.value.as_dict().unwrap().get("Title").unwrap();
    assert_eq!(title.as_string().unwrap().to_text(), "second");

    let numbered: Vec<i32> = doc
        .get_object_list()
        .iter()
        .filter(|object| !object.is_trailer())
        .map(|object| object.id.number)
        .collect();
    assert_eq!(numbered, vec![1, 2, 3, 4]);

    // the shadowed definition is still in its revision
    let first = doc.revisions()[0].get(ObjectId::new(3, 0)).unwrap();
    let title = first.value.as_dict().unwrap().get("Title").unwrap();
    assert_eq!(title.as_string().unwrap().to_text(), "first");
}

#[test]
fn test_trailer_lookup_follows_prev() {
    let doc = Document::parse(&two_revisions()).unwrap();
    let chain = doc.trailer_chain(1);
    assert_eq!(chain.len(), 2);
    assert_eq!(chain[0].revision, 1);
    assert_eq!(chain[1].revision, 0);

    // /Size is in the newest trailer, /Root only in the first one
    assert_eq!(doc.trailer_value("Size").unwrap().as_integer(), Some(5));
    assert_eq!(
        doc.trailer_value("Root").unwrap().as_reference(),
        Some(ObjectId::new(1, 0))
    );
    let info = doc.trailer_attribute("Info").unwrap().as_dict().unwrap();
    assert_eq!(
        info.get("Title").unwrap().as_string().unwrap().to_text(),
        "second"
    );
    assert!(doc.trailer_value("Encrypt").is_none());
}

#[test]
fn test_xref_sections_are_merged() {
    let doc = Document::parse(&two_revisions()).unwrap();
    let table = doc.xref_table();
    assert_eq!(table.len(), 5);
    let entry = table.get(4).unwrap();
    assert!(entry.in_use);
    assert_eq!(entry.generation, 0);
    assert!(!table.get(0).unwrap().in_use);
    let stats = doc.statistics();
    assert_eq!(stats.nb_revisions, 2);
    assert_eq!(stats.nb_trailers, 2);
}

fn object_streams() -> Vec<u8> {
    let children: Vec<(i32, String)> = (1..=13)
        .map(|number| (number, format!("<< /Index {number} >>")))
        .collect();
    let children: Vec<(i32, &str)> = children
        .iter()
        .map(|(number, value)| (*number, value.as_str()))
        .collect();
    let (payload, first) = object_stream_payload(&children);
    let (extension, extension_first) = object_stream_payload(&[(14, "(fourteen)")]);

    let mut builder = PdfBuilder::new("1.5");
    builder
        .stream(
            20,
            &format!("/Type /ObjStm /N 13 /First {first}"),
            &payload,
        )
        .stream(
            30,
            &format!("/Type /ObjStm /N 1 /First {extension_first} /Extends 20 0 R"),
            &extension,
        )
        .object(40, "<< /Type /Catalog >>")
        .end_revision("/Root 40 0 R /Size 41");
    builder.build()
}

#[test]
fn test_object_stream_children_are_addressable() {
    let doc = Document::parse(&object_streams()).unwrap();
    for number in 1..=13 {
        let child = doc.get_object(ObjectId::new(number, 0)).unwrap();
        assert_eq!(
            child.kind,
            ObjectKind::FromContainer {
                container: ObjectId::new(20, 0)
            }
        );
        let dict = child.value.as_dict().unwrap();
        assert_eq!(dict.get("Index").unwrap().as_integer(), Some(number as i64));
    }
    let extended = doc.get_object(ObjectId::new(14, 0)).unwrap();
    assert!(extended.is_container_child());
    assert_eq!(extended.value.as_string().unwrap().to_text(), "fourteen");
    assert_eq!(doc.statistics().nb_streamed_objects, 14);
}

#[test]
fn test_extending_object_stream_is_not_listed() {
    let doc = Document::parse(&object_streams()).unwrap();
    let listed: Vec<ObjectId> = doc.streams().iter().map(|entry| entry.id).collect();
    assert_eq!(listed, vec![ObjectId::new(20, 0)]);
    assert!(doc.is_extending(ObjectId::new(30, 0)));
    assert_eq!(doc.extensions_of(ObjectId::new(20, 0)), &[ObjectId::new(30, 0)]);
    assert_eq!(doc.statistics().nb_streams, 1);
}

#[test]
fn test_container_child_does_not_replace_body_object() {
    let (payload, first) = object_stream_payload(&[(5, "(from container)")]);
    let mut builder = PdfBuilder::new("1.5");
    builder
        .object(5, "(from body)")
        .stream(6, &format!("/Type /ObjStm /N 1 /First {first}"), &payload);
    let doc = Document::parse(&builder.build()).unwrap();
    let five = doc.get_object(ObjectId::new(5, 0)).unwrap();
    assert_eq!(five.kind, ObjectKind::Indirect);
    assert_eq!(five.value.as_string().unwrap().to_text(), "from body");
}

#[test]
fn test_broken_object_stream_is_reported() {
    let mut builder = PdfBuilder::new("1.5");
    builder.stream(6, "/Type /ObjStm /N 3 /First 4", b"1 0");
    let doc = Document::parse(&builder.build()).unwrap();
    let stats = doc.statistics();
    let anomalies = stats.anomalies().for_owner(ObjectId::new(6, 0));
    assert!(anomalies
        .iter()
        .any(|anomaly| anomaly.description == "Unable to parse Stream/ObjStm stream"));
}

fn xref_stream_document() -> Vec<u8> {
    let mut builder = PdfBuilder::new("1.5");
    builder.object(1, "<< /Type /Catalog >>");
    let payload: &[u8] = &[
        0x00, 0x00, 0x00, 0xff, //
        0x01, 0x00, 0x0f, 0x00, //
        0x02, 0x00, 0x05, 0x00, //
    ];
    builder.stream(2, "/Type /XRef /W [1 2 1] /Size 3 /Root 1 0 R", payload);
    builder.raw(b"startxref\n0\n%%EOF\n");
    builder.build()
}

#[test]
fn test_xref_stream_joins_trailer_chain() {
    let doc = Document::parse(&xref_stream_document()).unwrap();
    let trailers = doc.trailers();
    assert_eq!(trailers.len(), 1);
    assert_eq!(trailers[0].id, ObjectId::new(2, 0));
    let root = doc.trailer_attribute("Root").unwrap();
    assert_eq!(root.as_dict().unwrap().get_type(), Some("Catalog"));
}

#[test]
fn test_xref_stream_entries() {
    let doc = Document::parse(&xref_stream_document()).unwrap();
    let streams = doc.xref_stream_entries();
    assert_eq!(streams.len(), 1);
    let (id, entries) = &streams[0];
    assert_eq!(*id, ObjectId::new(2, 0));
    let rendered: Vec<String> = entries.iter().map(ToString::to_string).collect();
    assert_eq!(rendered, vec!["0: 00 0000 ff", "1: 01 000f 00", "2: 02 0005 00"]);
    assert_eq!(
        entries[2].entry(),
        XRefEntry::Compressed {
            stream_object_number: 5,
            index_within_stream: 0
        }
    );
}

#[test]
fn test_xref_stream_shape_mismatch_yields_no_entries() {
    let mut builder = PdfBuilder::new("1.5");
    builder.stream(2, "/Type /XRef /W [1 2] /Size 3", b"\x01\x00\x0f");
    let doc = Document::parse(&builder.build()).unwrap();
    let streams = doc.xref_stream_entries();
    assert_eq!(streams.len(), 1);
    assert!(streams[0].1.is_empty());
    assert!(!doc
        .statistics()
        .anomalies()
        .for_owner(ObjectId::new(2, 0))
        .is_empty());
}

#[test]
fn test_functional_roles_classify_streams() {
    let mut builder = PdfBuilder::new("1.6");
    builder
        .object(1, "<< /Type /Catalog /Pages 2 0 R /OpenAction 5 0 R >>")
        .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
        .object(3, "<< /Type /Page /Parent 2 0 R /Contents 4 0 R >>")
        .stream(4, "", b"BT ET")
        .object(5, "<< /S /JavaScript /JS 6 0 R >>")
        .stream(6, "", b"app.alert('hi');")
        .stream(7, "/Type /Metadata /Subtype /XML", b"<?xpacket begin?>")
        .end_revision("/Root 1 0 R /Size 8");
    let doc = Document::parse(&builder.build()).unwrap();
    let kinds: Vec<(i32, String)> = doc
        .streams()
        .iter()
        .map(|entry| (entry.id.number, doc.stream_kind(entry).to_string()))
        .collect();
    assert_eq!(
        kinds,
        vec![
            (4, StreamKind::Contents.to_string()),
            (6, StreamKind::Javascript.to_string()),
            (7, "/Metadata/XML".to_string()),
        ]
    );
}
