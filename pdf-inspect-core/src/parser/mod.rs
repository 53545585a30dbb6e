//! PDF Parser Module
//!
//! A lenient, single-pass scanner that turns a raw PDF byte buffer into a navigable
//! object graph. The scanner never gives up on a document: structural violations are
//! recorded as anomalies and the best-effort value is kept.
//!
//! Control flow:
//! 1. [`reader::PdfReader`] scans the buffer left to right, building one
//!    [`revision::Revision`] per `%%EOF`-terminated segment.
//! 2. Post-passes expand object streams and register cross-reference streams as trailers.
//! 3. Stream payloads are decrypted and decoded lazily, on first access through
//!    [`document::Document::decoded_data`].

pub mod composite;
pub mod context;
pub mod decode;
pub mod document;
pub mod encryption_handler;
pub mod filters;
pub mod header;
pub mod indirect;
pub mod lexer;
pub mod object_id;
pub mod object_stream;
pub mod objects;
pub mod reader;
pub mod revision;
pub mod stream;
pub mod trailer;
pub mod value;
pub mod xref;
pub mod xref_stream;

pub use self::document::{Document, StreamEntry};
pub use self::filters::{Filter, FilterFailure};
pub use self::header::{PdfHeader, PdfVersion};
pub use self::objects::{
    IndirectObject, ObjectId, ObjectKind, PdfArray, PdfDictionary, PdfName, PdfNumber, PdfObject,
    PdfStream, PdfString, PdfValue, Span,
};
pub use self::reader::PdfReader;
pub use self::revision::Revision;

/// Result type for parser operations
pub type ParseResult<T> = Result<T, ParseError>;

/// PDF Parser errors
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid PDF header")]
    InvalidHeader,

    #[error("Syntax error at position {position}: {message}")]
    SyntaxError { position: usize, message: String },

    /// An `obj` keyword showed up where a value was expected: the enclosing
    /// object lost its `endobj` and a new object starts at `position`.
    #[error("Unexpected new object definition at position {position}")]
    UnexpectedObjectStart { position: usize },

    #[error("Missing required key: {0}")]
    MissingKey(String),

    #[error("Invalid xref: {0}")]
    InvalidXRef(String),

    #[error("Stream decode error: {0}")]
    StreamDecodeError(String),

    #[error("Encryption not supported: {0}")]
    EncryptionNotSupported(String),

    #[error("A user password is required to decrypt this document")]
    PasswordRequired,

    #[error("Reference depth exceeded while resolving {0}")]
    ReferenceDepthExceeded(ObjectId),
}

/// Options controlling how a document is parsed and decoded
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Decoded payloads larger than this are flagged as potentially harmful (never truncated)
    pub max_decoded_size: usize,

    /// Password tried before the empty password when deriving the decrypter
    pub password: Option<String>,

    /// Maximum number of references followed when dereferencing a value
    pub max_reference_depth: usize,

    /// Arrays and dictionaries nested deeper than this are replaced by null
    pub max_nesting_depth: usize,

    /// Decode every stream right after the scan instead of on first access
    pub eager_decoding: bool,

    /// Classify JavaScript, page contents and XFA streams after the scan
    pub analyze_content: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_decoded_size: 10_000_000,
            password: None,
            max_reference_depth: 64,
            max_nesting_depth: context::MAX_NESTING_DEPTH,
            eager_decoding: false,
            analyze_content: true,
        }
    }
}

impl ParseOptions {
    /// Create options with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Tight limits for batch processing of untrusted files
    pub fn strict() -> Self {
        Self {
            max_decoded_size: 1_000_000,
            max_reference_depth: 16,
            max_nesting_depth: 64,
            ..Default::default()
        }
    }

    /// Decode everything up front so all anomalies are known after parsing
    pub fn thorough() -> Self {
        Self {
            eager_decoding: true,
            ..Default::default()
        }
    }

    pub fn with_max_decoded_size(mut self, size: usize) -> Self {
        self.max_decoded_size = size;
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_max_reference_depth(mut self, depth: usize) -> Self {
        self.max_reference_depth = depth;
        self
    }

    pub fn with_max_nesting_depth(mut self, depth: usize) -> Self {
        self.max_nesting_depth = depth;
        self
    }

    pub fn with_eager_decoding(mut self, eager: bool) -> Self {
        self.eager_decoding = eager;
        self
    }

    pub fn with_content_analysis(mut self, analyze: bool) -> Self {
        self.analyze_content = analyze;
        self
    }
}
