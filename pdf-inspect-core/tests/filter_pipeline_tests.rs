//! Stream decoding through the filter pipeline

mod common;

use common::PdfBuilder;
use pdf_inspect::analysis::SuspiciousType;
use pdf_inspect::parser::{Document, ObjectId, ParseOptions, PdfStream};
use pretty_assertions::assert_eq;

fn stream(doc: &Document, number: i32) -> &PdfStream {
    doc.get_object(ObjectId::new(number, 0))
        .and_then(|object| object.as_stream())
        .unwrap()
}

fn has_anomaly(doc: &Document, number: i32, kind: SuspiciousType) -> bool {
    doc.statistics()
        .anomalies()
        .for_owner(ObjectId::new(number, 0))
        .iter()
        .any(|anomaly| anomaly.kind == kind)
}

#[cfg(feature = "compression")]
fn deflate(data: &[u8]) -> Vec<u8> {
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

#[cfg(feature = "compression")]
#[test]
fn test_flate_stream() {
    let content = b"BT /F1 12 Tf 72 712 Td (Hello, pipeline) Tj ET";
    let compressed = deflate(content);
    let mut builder = PdfBuilder::new("1.4");
    builder.stream(1, "/Filter /FlateDecode", &compressed);
    let doc = Document::parse(&builder.build()).unwrap();

    let stream = stream(&doc, 1);
    assert_eq!(stream.encoded_data(), compressed.as_slice());
    assert_eq!(doc.decoded_data(stream), content);
    assert_eq!(doc.encoded_data_list(stream), &[compressed.clone()]);
    assert!(doc.decode(stream).is_complete());
    assert!(doc.statistics().filters_used().contains("FlateDecode"));
}

#[cfg(feature = "compression")]
#[test]
fn test_filter_chain_keeps_every_stage() {
    let content = b"0123456789";
    let compressed = deflate(content);
    let mut hex: Vec<u8> = hex::encode(&compressed).into_bytes();
    hex.push(b'>');
    let mut builder = PdfBuilder::new("1.4");
    builder.stream(1, "/Filter [/AHx /Fl]", &hex);
    let doc = Document::parse(&builder.build()).unwrap();

    let stream = stream(&doc, 1);
    assert_eq!(doc.decoded_data(stream), content);
    assert_eq!(doc.encoded_data_list(stream), &[hex.clone(), compressed.clone()]);
    assert!(has_anomaly(&doc, 1, SuspiciousType::StreamWithMultipleFilters));
    let stats = doc.statistics();
    let filters: Vec<&str> = stats.filters_used().iter().map(String::as_str).collect();
    assert_eq!(filters, vec!["AHx", "Fl"]);
}

#[cfg(feature = "compression")]
#[test]
fn test_png_predictor() {
    let rows = [0u8, 1, 2, 3, 2, 1, 1, 1];
    let mut builder = PdfBuilder::new("1.4");
    builder.stream(
        1,
        "/Filter /FlateDecode /DecodeParms << /Predictor 12 /Columns 3 >>",
        &deflate(&rows),
    );
    let doc = Document::parse(&builder.build()).unwrap();
    assert_eq!(doc.decoded_data(stream(&doc, 1)), &[1, 2, 3, 2, 3, 4]);
}

#[cfg(feature = "compression")]
#[test]
fn test_oversized_predictor_columns_keep_inflated_bytes() {
    let rows = [0u8, 1, 2, 3, 2, 1, 1, 1];
    let mut builder = PdfBuilder::new("1.4");
    builder.stream(
        1,
        "/Filter /FlateDecode /DecodeParms << /Predictor 12 /Columns 4000000000000 >>",
        &deflate(&rows),
    );
    builder.stream(
        2,
        "/Filter /FlateDecode /DecodeParms << /Predictor 15 /Colors 9223372036854775807 /Columns 2 >>",
        &deflate(&rows),
    );
    let doc = Document::parse(&builder.build()).unwrap();

    for number in [1, 2] {
        let decoded = doc.decode(stream(&doc, number));
        assert_eq!(decoded.data, rows);
        let failure = decoded.failure.as_ref().unwrap();
        assert_eq!(failure.filter_index, 0);
        assert!(failure.message.contains("Predictor row"));
        assert!(has_anomaly(&doc, number, SuspiciousType::MalformedStream));
    }
}

#[test]
fn test_oversized_predictor_columns_after_lzw() {
    // "-----A---B" with EarlyChange 1
    let encoded = [0x80u8, 0x0B, 0x60, 0x50, 0x22, 0x0C, 0x0C, 0x85, 0x01];
    let mut builder = PdfBuilder::new("1.4");
    builder.stream(
        1,
        "/Filter /LZWDecode /DecodeParms << /Predictor 2 /Columns 99999999999 >>",
        &encoded,
    );
    let doc = Document::parse(&builder.build()).unwrap();

    let decoded = doc.decode(stream(&doc, 1));
    assert_eq!(decoded.data, b"-----A---B");
    assert!(decoded.failure.is_some());
    assert!(has_anomaly(&doc, 1, SuspiciousType::MalformedStream));
}

#[test]
fn test_single_filter_is_retried_with_declared_length() {
    // the scanned payload holds an extra invalid digit past /Length
    let input = b"%PDF-1.4\n\
        1 0 obj << /Filter /ASCIIHexDecode /Length 3 >>\nstream\n414X\nendstream\nendobj\n";
    let doc = Document::parse(input).unwrap();
    let stream = stream(&doc, 1);
    assert_eq!(stream.parsed_length(), 4);

    let decoded = doc.decode(stream);
    assert_eq!(decoded.data, b"A@");
    let failure = decoded.failure.as_ref().unwrap();
    assert_eq!(failure.filter_index, 0);
    assert_eq!(failure.partial_output, b"A");
    assert!(failure.message.contains("Invalid hex digit"));
    assert!(has_anomaly(&doc, 1, SuspiciousType::MalformedStream));
}

#[test]
fn test_failure_without_usable_length_keeps_partial_output() {
    let input = b"%PDF-1.4\n\
        1 0 obj << /Filter /ASCIIHexDecode /Length 4 >>\nstream\n414X\nendstream\nendobj\n";
    let doc = Document::parse(input).unwrap();
    let decoded = doc.decode(stream(&doc, 1));
    assert_eq!(decoded.data, b"A");
    assert!(decoded.failure.is_some());
}

#[test]
fn test_empty_intermediate_stage_stops_chain() {
    let input = b"%PDF-1.4\n\
        1 0 obj << /Filter [/ASCIIHexDecode /FlateDecode] /Length 2 >>\nstream\nXX\nendstream\nendobj\n";
    let doc = Document::parse(input).unwrap();
    let stream = stream(&doc, 1);
    let decoded = doc.decode(stream);
    assert!(decoded.data.is_empty());
    let failure = decoded.failure.as_ref().unwrap();
    assert_eq!(failure.filter_index, 0);
    assert_eq!(decoded.snapshots, vec![b"XX".to_vec(), Vec::new()]);
    assert!(has_anomaly(&doc, 1, SuspiciousType::StreamWithMultipleFilters));
    assert!(has_anomaly(&doc, 1, SuspiciousType::MalformedStream));
}

#[test]
fn test_unknown_filter_is_identity() {
    let mut builder = PdfBuilder::new("1.4");
    builder.stream(1, "/Filter /NoSuchDecode", b"kept as is");
    let doc = Document::parse(&builder.build()).unwrap();
    assert_eq!(doc.decoded_data(stream(&doc, 1)), b"kept as is");
    assert!(has_anomaly(&doc, 1, SuspiciousType::StreamUnfiltered));
}

#[test]
fn test_image_codecs_are_passed_through() {
    let mut builder = PdfBuilder::new("1.4");
    builder.stream(
        1,
        "/Type /XObject /Subtype /Image /Filter /DCTDecode",
        b"\xFF\xD8\xFF\xE0 not really a jpeg",
    );
    let doc = Document::parse(&builder.build()).unwrap();
    let entry = doc.streams().into_iter().next().unwrap();
    assert!(doc.stream_kind(&entry).is_image());
    assert!(doc.decoded_data(entry.stream).starts_with(b"\xFF\xD8"));
}

#[test]
fn test_ascii85_and_run_length() {
    let mut builder = PdfBuilder::new("1.4");
    builder
        .stream(1, "/Filter /ASCII85Decode", b"<~87cURD]i,\"Ebo7~>")
        .stream(2, "/Filter /RunLengthDecode", &[2, b'a', b'b', b'c', 253, b'z', 128]);
    let doc = Document::parse(&builder.build()).unwrap();
    assert_eq!(doc.decoded_data(stream(&doc, 1)), b"Hello World");
    assert_eq!(doc.decoded_data(stream(&doc, 2)), b"abczzzz");
}

#[test]
fn test_oversized_output_is_flagged_not_truncated() {
    let mut builder = PdfBuilder::new("1.4");
    builder.stream(1, "", &[b'x'; 64]);
    let options = ParseOptions::default().with_max_decoded_size(16);
    let doc = Document::parse_with_options(&builder.build(), options).unwrap();
    assert_eq!(doc.decoded_data(stream(&doc, 1)).len(), 64);
    assert!(has_anomaly(&doc, 1, SuspiciousType::PotentialHarmfulFile));
}

#[test]
fn test_external_stream_data_is_not_read() {
    let mut builder = PdfBuilder::new("1.4");
    builder.stream(1, "/F (other.bin)", b"ignored");
    let doc = Document::parse(&builder.build()).unwrap();
    assert!(doc.decoded_data(stream(&doc, 1)).is_empty());
    assert!(has_anomaly(&doc, 1, SuspiciousType::StreamUnfiltered));
}

#[test]
fn test_eager_decoding_fills_cache() {
    let mut builder = PdfBuilder::new("1.4");
    builder.stream(1, "/Filter /AHx", b"48 69>");
    let doc = Document::parse_with_options(&builder.build(), ParseOptions::thorough()).unwrap();
    let stream = stream(&doc, 1);
    assert_eq!(stream.cached_decoded().map(|d| d.data.as_slice()), Some(&b"Hi"[..]));

    let lazy = Document::parse(&builder.build()).unwrap();
    assert!(self::stream(&lazy, 1).cached_decoded().is_none());
}
