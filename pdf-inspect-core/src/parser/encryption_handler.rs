//! PDF encryption detection and password handling
//!
//! Each revision derives its decrypter once, from the `/Encrypt` dictionary and the
//! first `/ID` string reachable through its trailer chain. A revision that cannot be
//! unlocked stays readable: only its protected strings and streams are left undecoded.

use super::objects::{ObjectId, PdfDictionary, PdfValue};
use super::{ParseError, ParseResult};
use crate::encryption::{CryptMethod, EncryptParams, StandardSecurityHandler, IDENTITY};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error};

/// Decryption state of a revision
#[derive(Debug, Clone, Default)]
pub enum EncryptionState {
    #[default]
    NotEncrypted,
    /// A password (possibly the empty one) unlocked the document key
    Unlocked {
        handler: Arc<StandardSecurityHandler>,
        encrypt_id: Option<ObjectId>,
    },
    /// Encrypted, but no decrypter could be derived
    Locked {
        encrypt_id: Option<ObjectId>,
        password_required: bool,
        reason: String,
    },
}

impl EncryptionState {
    pub fn is_encrypted(&self) -> bool {
        !matches!(self, EncryptionState::NotEncrypted)
    }

    pub fn is_password_required(&self) -> bool {
        matches!(
            self,
            EncryptionState::Locked {
                password_required: true,
                ..
            }
        )
    }

    pub fn handler(&self) -> Option<&StandardSecurityHandler> {
        match self {
            EncryptionState::Unlocked { handler, .. } => Some(handler),
            _ => None,
        }
    }

    /// Id of the indirect object holding the `/Encrypt` dictionary, when it is one
    pub fn encrypt_id(&self) -> Option<ObjectId> {
        match self {
            EncryptionState::NotEncrypted => None,
            EncryptionState::Unlocked { encrypt_id, .. } | EncryptionState::Locked { encrypt_id, .. } => {
                *encrypt_id
            }
        }
    }

    /// Unlock `encrypt` with the configured password, then with the empty one
    pub fn derive<'a>(
        encrypt: &'a PdfDictionary,
        encrypt_id: Option<ObjectId>,
        doc_id: &[u8],
        password: Option<&str>,
        resolve: impl Fn(&'a PdfValue) -> &'a PdfValue,
    ) -> Self {
        let unlocked = parse_encryption_dict(encrypt, resolve).and_then(|params| {
            let mut passwords: Vec<&[u8]> = Vec::new();
            if let Some(password) = password {
                passwords.push(password.as_bytes());
            }
            passwords.push(b"");
            StandardSecurityHandler::unlock(&params, doc_id, &passwords)
        });
        match unlocked {
            Ok(handler) => {
                debug!(revision = handler.revision(), "document key unlocked");
                EncryptionState::Unlocked {
                    handler: Arc::new(handler),
                    encrypt_id,
                }
            }
            Err(err) => {
                error!(%err, "Can not decrypt PDF file: PDF probably requires user password");
                EncryptionState::Locked {
                    encrypt_id,
                    password_required: matches!(err, ParseError::PasswordRequired),
                    reason: err.to_string(),
                }
            }
        }
    }
}

/// Read a `/Standard` encryption dictionary
pub fn parse_encryption_dict<'a>(
    dict: &'a PdfDictionary,
    resolve: impl Fn(&'a PdfValue) -> &'a PdfValue,
) -> ParseResult<EncryptParams> {
    let get = |key: &str| dict.get(key).map(&resolve).filter(|value| !value.is_null());
    let integer = |key: &str| get(key).and_then(|value| value.as_integer());
    let bytes = |key: &str| {
        get(key)
            .and_then(|value| value.as_string())
            .map(|s| s.as_bytes().to_vec())
    };
    let name = |key: &str| {
        get(key)
            .and_then(|value| value.as_name())
            .map(|name| name.as_str().to_string())
    };

    let filter = name("Filter").ok_or_else(|| ParseError::MissingKey("Filter".to_string()))?;
    if filter != "Standard" {
        return Err(ParseError::EncryptionNotSupported(format!(
            "security handler '{filter}'"
        )));
    }

    let v = integer("V").unwrap_or(0);
    let r = integer("R").ok_or_else(|| ParseError::MissingKey("R".to_string()))?;
    let mut crypt_filters = BTreeMap::new();
    if let Some(cf) = get("CF").and_then(|value| value.as_dict()) {
        for (filter_name, entry) in cf.iter() {
            let Some(entry) = resolve(entry).as_dict() else {
                continue;
            };
            let cfm = entry
                .get("CFM")
                .map(&resolve)
                .and_then(|value| value.as_name())
                .map_or("None", |name| name.as_str());
            let method = CryptMethod::from_name(cfm).ok_or_else(|| {
                ParseError::EncryptionNotSupported(format!("crypt filter method '{cfm}'"))
            })?;
            crypt_filters.insert(filter_name.as_str().to_string(), method);
        }
    }

    Ok(EncryptParams {
        v,
        r,
        length: integer("Length").unwrap_or(if v >= 4 { 128 } else { 40 }),
        o: bytes("O").ok_or_else(|| ParseError::MissingKey("O".to_string()))?,
        u: bytes("U").ok_or_else(|| ParseError::MissingKey("U".to_string()))?,
        oe: bytes("OE").unwrap_or_default(),
        ue: bytes("UE").unwrap_or_default(),
        // /P is a signed 32-bit field; values written unsigned wrap around
        p: integer("P").ok_or_else(|| ParseError::MissingKey("P".to_string()))? as i32,
        encrypt_metadata: get("EncryptMetadata")
            .and_then(|value| value.as_bool())
            .unwrap_or(true),
        string_filter: name("StrF").unwrap_or_else(|| IDENTITY.to_string()),
        stream_filter: name("StmF").unwrap_or_else(|| IDENTITY.to_string()),
        crypt_filters,
    })
}
