//! # pdf-inspect
//!
//! A lenient PDF object-graph parser for inspecting untrusted and corrupted documents.
//!
//! ## Features
//!
//! - **Best-effort parsing**: structural damage is recorded as anomalies, never fatal
//! - **Incremental updates**: one revision per `%%EOF` segment, newest definitions win
//! - **Object streams**: compressed containers are expanded into addressable objects
//! - **Cross-reference streams**: registered in the trailer chain and readable as tables
//! - **Stream decoding**: lazy, cached filter pipeline with partial-failure capture
//! - **Decryption**: Standard Security Handler, RC4 and AES crypt filters
//! - **Classification**: scripts, page contents, XFA forms and well-known payloads
//!
//! ## Quick Start
//!
//! ```rust
//! use pdf_inspect::parser::{Document, ObjectId};
//!
//! # fn main() -> pdf_inspect::Result<()> {
//! let data = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog >>\nendobj\n\
//!              trailer\n<< /Root 1 0 R >>\nstartxref\n0\n%%EOF\n";
//! let document = Document::parse(data)?;
//!
//! for object in document.get_object_list() {
//!     println!("{} {}", object.id, object.value.type_name());
//! }
//!
//! let catalog = document.trailer_attribute("Root").and_then(|root| root.as_dict());
//! assert_eq!(catalog.and_then(|dict| dict.get_type()), Some("Catalog"));
//! assert!(document.get_object(ObjectId::new(1, 0)).is_some());
//! # Ok(())
//! # }
//! ```
//!
//! ### Decoding streams
//!
//! ```rust,no_run
//! use pdf_inspect::parser::{Document, ParseOptions};
//!
//! # fn main() -> pdf_inspect::Result<()> {
//! let options = ParseOptions::default().with_password("secret");
//! let document = Document::open_with_options("document.pdf", options)?;
//!
//! for entry in document.streams() {
//!     let kind = document.stream_kind(&entry);
//!     let data = document.decoded_data(entry.stream);
//!     println!("{} {kind}: {} bytes", entry.id, data.len());
//! }
//! println!("{}", document.statistics().description());
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod encryption;
pub mod error;
pub mod parser;

pub use error::{InspectError, Result};

// Re-export parsing types
pub use parser::{
    Document, IndirectObject, ObjectId, ParseOptions, PdfArray, PdfDictionary, PdfName,
    PdfObject, PdfReader, PdfStream, PdfString, PdfValue, StreamEntry,
};

// Re-export analysis types
pub use analysis::{Anomaly, NotificationType, PdfStatistics, StreamKind, SuspiciousType};

/// Current version of pdf-inspect
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
