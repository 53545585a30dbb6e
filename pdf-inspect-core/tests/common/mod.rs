//! Helpers for building PDF fixtures in integration tests
#![allow(dead_code)]

/// Incrementally writes a PDF file, one revision at a time
pub struct PdfBuilder {
    data: Vec<u8>,
    /// Objects written since the last xref section
    pending: Vec<(i32, usize)>,
    last_xref: Option<usize>,
}

impl PdfBuilder {
    pub fn new(version: &str) -> Self {
        let mut data = format!("%PDF-{version}\n").into_bytes();
        data.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");
        Self {
            data,
            pending: Vec::new(),
            last_xref: None,
        }
    }

    pub fn object(&mut self, number: i32, body: &str) -> &mut Self {
        self.object_bytes(number, body.as_bytes())
    }

    pub fn object_bytes(&mut self, number: i32, body: &[u8]) -> &mut Self {
        self.pending.push((number, self.data.len()));
        self.data
            .extend_from_slice(format!("{number} 0 obj\n").as_bytes());
        self.data.extend_from_slice(body);
        self.data.extend_from_slice(b"\nendobj\n");
        self
    }

    /// A stream object; `/Length` is appended to `dict` entries
    pub fn stream(&mut self, number: i32, dict: &str, payload: &[u8]) -> &mut Self {
        let mut body = format!("<< {dict} /Length {} >>\nstream\n", payload.len()).into_bytes();
        body.extend_from_slice(payload);
        body.extend_from_slice(b"\nendstream");
        self.object_bytes(number, &body)
    }

    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.data.extend_from_slice(bytes);
        self
    }

    /// Close the revision: xref section for the pending objects, trailer, `startxref`
    /// and `%%EOF`
    pub fn end_revision(&mut self, trailer: &str) -> &mut Self {
        let xref = self.data.len();
        let mut section = String::from("xref\n");
        if self.last_xref.is_none() {
            section.push_str("0 1\n0000000000 65535 f \n");
        }
        for (number, offset) in self.pending.drain(..) {
            section.push_str(&format!("{number} 1\n{offset:010} 00000 n \n"));
        }
        self.data.extend_from_slice(section.as_bytes());
        self.data.extend_from_slice(
            format!("trailer\n<< {trailer} >>\nstartxref\n{xref}\n%%EOF\n").as_bytes(),
        );
        self.last_xref = Some(xref);
        self
    }

    /// Offset of the most recent xref section
    pub fn last_xref(&self) -> usize {
        self.last_xref.unwrap_or(0)
    }

    pub fn build(&self) -> Vec<u8> {
        self.data.clone()
    }
}

/// Body and `/First` of an uncompressed object stream holding `objects`
pub fn object_stream_payload(objects: &[(i32, &str)]) -> (Vec<u8>, usize) {
    let mut header = String::new();
    let mut body = String::new();
    for (number, value) in objects {
        header.push_str(&format!("{number} {} ", body.len()));
        body.push_str(value);
        body.push(' ');
    }
    let first = header.len();
    (format!("{header}{body}").into_bytes(), first)
}
