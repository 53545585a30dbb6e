//! Stream decoding pipeline
//!
//! Turns the raw payload of a stream into content bytes: decryption first, then each
//! filter of `/Filter` in order (ISO 32000-1 Section 7.3.8). Decoding never fails.
//! The first decoder error is kept for diagnostics and the best partial output wins.

use super::document::Document;
use super::filters::{DecodeParams, Filter, FilterFailure};
use super::objects::{ObjectId, PdfDictionary, PdfName, PdfObject, PdfStream, PdfValue};
use crate::analysis::SuspiciousType;
use crate::encryption::IDENTITY;
use tracing::{debug, error};

/// Result of running the pipeline on a stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedStream {
    pub data: Vec<u8>,
    /// Payload before each stage: the raw bytes, the decrypted bytes, then every
    /// intermediate filter output
    pub snapshots: Vec<Vec<u8>>,
    /// First decoder error of the chain
    pub failure: Option<FilterFailure>,
    /// The payload is encrypted and no key is available
    pub locked: bool,
}

impl DecodedStream {
    /// Already decoded data, with no pipeline history
    pub fn plain(data: Vec<u8>) -> Self {
        Self {
            data,
            ..Default::default()
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failure.is_none() && !self.locked
    }
}

/// One resolved entry of the filter chain
#[derive(Debug, Clone, PartialEq)]
enum Stage {
    Decode {
        filter: Filter,
        params: DecodeParams,
        /// `/Name` of a `/Crypt` filter
        crypt_filter: String,
    },
    /// Unknown filter name, applied as the identity
    Unsupported,
}

/// Decoding environment of one stream
struct Pipeline<'a> {
    doc: &'a Document,
    stream: &'a PdfStream,
    id: ObjectId,
}

impl<'a> Pipeline<'a> {
    fn report(&self, kind: SuspiciousType, description: impl AsRef<str>) {
        self.doc
            .report(self.stream.owner(), self.stream.element, kind, description);
    }

    fn attribute(&self, key: &str) -> Option<&'a PdfValue> {
        let value = self.doc.resolve(self.stream.dict.get(key)?);
        (!value.is_null()).then_some(value)
    }

    fn declared_type(&self) -> Option<&'a str> {
        self.attribute("Type")
            .and_then(|value| value.as_name())
            .map(PdfName::as_str)
    }

    /// `/Filter` and `/DecodeParms` as (name, parameters) pairs
    fn filters(&self) -> Vec<(&'a PdfName, Option<&'a PdfValue>)> {
        let Some(filter) = self.attribute("Filter") else {
            return Vec::new();
        };
        let parms = self.attribute("DecodeParms");
        match &filter.object {
            PdfObject::Name(name) => vec![(name, parms)],
            PdfObject::Array(names) => {
                if names.len() > 1 {
                    self.report(
                        SuspiciousType::StreamWithMultipleFilters,
                        format!("[Stream {}] has several filters", self.id),
                    );
                }
                let parms = match parms.map(|value| &value.object) {
                    None | Some(PdfObject::Array(_)) => parms.and_then(|value| value.as_array()),
                    Some(_) => {
                        self.report(
                            SuspiciousType::Malformed,
                            format!("Unable to parse [Stream {}]/DecodeParms: expected array", self.id),
                        );
                        None
                    }
                };
                let mut filters = Vec::with_capacity(names.len());
                for (index, entry) in names.iter().enumerate() {
                    let Some(name) = self.doc.resolve(entry).as_name() else {
                        self.report(
                            SuspiciousType::Malformed,
                            format!("Unable to parse [Stream {}]/Filter: expected name or array", self.id),
                        );
                        continue;
                    };
                    let parm = parms
                        .and_then(|array| array.get(index))
                        .map(|value| self.doc.resolve(value));
                    filters.push((name, parm));
                }
                filters
            }
            _ => {
                self.report(
                    SuspiciousType::Malformed,
                    format!("Unable to parse [Stream {}]/Filter: expected name or array", self.id),
                );
                Vec::new()
            }
        }
    }

    fn stage(&self, name: &PdfName, parms: Option<&'a PdfValue>) -> Stage {
        self.doc.record_filter(name.as_str());
        let parms: Option<&PdfDictionary> = match parms.map(|value| &value.object) {
            None | Some(PdfObject::Null) => None,
            Some(PdfObject::Dictionary(dict)) => Some(dict),
            Some(_) => {
                self.report(
                    SuspiciousType::Malformed,
                    format!(
                        "Unable to parse [Stream {}]/DecodeParms: expected dictionary or null",
                        self.id
                    ),
                );
                None
            }
        };
        let Some(filter) = Filter::from_name(name.as_str()) else {
            self.report(
                SuspiciousType::StreamUnfiltered,
                format!("Unable to parse [Stream {}]{name}: not supported filter", self.id),
            );
            return Stage::Unsupported;
        };
        let lookup = |key: &str| {
            parms
                .and_then(|dict| dict.get(key))
                .map(|value| self.doc.resolve(value))
        };
        let params = DecodeParams::from_lookup(|key| lookup(key).and_then(|value| value.as_integer()));
        let crypt_filter = lookup("Name")
            .and_then(|value| value.as_name())
            .map_or_else(|| IDENTITY.to_string(), |name| name.as_str().to_string());
        Stage::Decode {
            filter,
            params,
            crypt_filter,
        }
    }

    fn apply(&self, stage: &Stage, data: &[u8]) -> Result<Vec<u8>, FilterFailure> {
        match stage {
            Stage::Unsupported => Ok(data.to_vec()),
            Stage::Decode {
                filter: Filter::Crypt,
                crypt_filter,
                ..
            } => {
                let state = self.doc.encryption_state(self.stream.revision());
                match state.handler() {
                    Some(handler) => handler
                        .decrypt_with_filter(crypt_filter, self.id, data)
                        .map_err(|e| FilterFailure::new(Vec::new(), 0, e.to_string())),
                    None if crypt_filter == IDENTITY => Ok(data.to_vec()),
                    None => Err(FilterFailure::new(
                        Vec::new(),
                        0,
                        format!("no decrypter for crypt filter {crypt_filter}"),
                    )),
                }
            }
            Stage::Decode { filter, params, .. } => filter.decode(data, params),
        }
    }

    /// Single filter of an unencrypted stream: on failure, retry once on the
    /// `/Length` slice of the buffer when it differs from the scanned payload
    fn apply_with_retry(&self, stage: &Stage, data: &[u8], failure: &mut Option<FilterFailure>) -> Vec<u8> {
        let first = match self.apply(stage, data) {
            Ok(output) => return output,
            Err(first) => first,
        };
        let partial = first.partial_output.clone();
        failure.get_or_insert(first);

        let declared = self
            .attribute("Length")
            .and_then(|value| value.as_number())
            .and_then(|number| number.as_usize());
        let retry_slice = declared
            .filter(|&declared| declared != self.stream.parsed_length())
            .and_then(|declared| self.stream.declared_slice(declared));
        let Some(slice) = retry_slice else {
            return partial;
        };
        debug!(stream = %self.id, declared = slice.len(), "retrying first filter with declared length");
        match self.apply(stage, slice) {
            Ok(output) => output,
            Err(second) => second.partial_output,
        }
    }

    fn run(&self) -> DecodedStream {
        let mut decoded = DecodedStream::default();
        if self.attribute("F").is_some() {
            self.report(
                SuspiciousType::StreamUnfiltered,
                "External Stream data is not implemented",
            );
            return decoded;
        }

        let raw = self.stream.encoded_data();
        let declared_type = self.declared_type();
        let state = self.doc.encryption_state(self.stream.revision());
        // cross-reference streams are never encrypted
        let encrypted = state.is_encrypted() && declared_type != Some("XRef");
        let mut data = if encrypted {
            decoded.snapshots.push(raw.to_vec());
            let plain = state.handler().map(|handler| {
                handler.decrypt_stream(self.id, raw, declared_type == Some("Metadata"))
            });
            match plain {
                Some(Ok(plain)) => plain,
                _ => {
                    self.report(SuspiciousType::StreamUnfiltered, "Encrypted");
                    decoded.locked = true;
                    return decoded;
                }
            }
        } else {
            raw.to_vec()
        };

        let stages: Vec<Stage> = self
            .filters()
            .into_iter()
            .map(|(name, parms)| self.stage(name, parms))
            .collect();
        let mut failure: Option<FilterFailure> = None;
        if let Some((first, rest)) = stages.split_first() {
            decoded.snapshots.push(data.clone());
            // the declared-length retry only applies to a lone filter on plain data
            data = if encrypted || !rest.is_empty() {
                self.apply(first, &data).unwrap_or_else(|e| {
                    let partial = e.partial_output.clone();
                    failure.get_or_insert(e);
                    partial
                })
            } else {
                self.apply_with_retry(first, &data, &mut failure)
            };
            if !rest.is_empty() {
                decoded.snapshots.push(data.clone());
            }
            for (offset, stage) in rest.iter().enumerate() {
                let index = offset + 1;
                if data.is_empty() {
                    break;
                }
                data = self.apply(stage, &data).unwrap_or_else(|e| {
                    let partial = e.partial_output.clone();
                    failure.get_or_insert(e.at_index(index));
                    partial
                });
                if index < stages.len() - 1 {
                    decoded.snapshots.push(data.clone());
                }
            }
        }

        if data.len() > self.doc.options().max_decoded_size {
            self.report(
                SuspiciousType::PotentialHarmfulFile,
                format!("Decoded stream is {} Mb", data.len() / 1_000_000),
            );
        }
        if let Some(failure) = &failure {
            error!(stream = %self.id, %failure, "Unable to parse Stream");
            self.report(SuspiciousType::MalformedStream, "Unable to parse Stream: filter failed");
        }
        decoded.data = data;
        decoded.failure = failure;
        decoded
    }
}

/// Run the pipeline for `stream`, without caching
pub(crate) fn decode_stream(doc: &Document, stream: &PdfStream) -> DecodedStream {
    Pipeline {
        doc,
        stream,
        id: stream.owner().unwrap_or_default(),
    }
    .run()
}
