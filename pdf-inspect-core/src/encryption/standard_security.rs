//! Standard Security Handler according to ISO 32000-1 Section 7.6.3
//!
//! Only decryption is implemented. Revisions 2 to 4 derive the file key from MD5
//! and RC4 (Algorithms 2 to 7); revisions 5 and 6 use SHA-2 and AES-256 (ISO 32000-2
//! Algorithms 2.A and 2.B).

use sha2::{Digest, Sha256, Sha384, Sha512};
use std::collections::BTreeMap;
use std::fmt;

use super::aes::{aes128_cbc_encrypt, aes_cbc_decrypt, decrypt_payload};
use super::rc4::rc4;
use crate::parser::{ObjectId, ParseError, ParseResult};

/// Padding used in password processing
const PADDING: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

/// Name of the crypt filter that leaves data untouched
pub const IDENTITY: &str = "Identity";

/// Cipher selected by a crypt filter (`/CFM`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptMethod {
    Identity,
    /// RC4
    V2,
    /// AES-128
    AesV2,
    /// AES-256
    AesV3,
}

impl CryptMethod {
    /// Parse a `/CFM` value; `None` means the identity transform
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "None" | "Identity" => Some(CryptMethod::Identity),
            "V2" => Some(CryptMethod::V2),
            "AESV2" => Some(CryptMethod::AesV2),
            "AESV3" => Some(CryptMethod::AesV3),
            _ => None,
        }
    }
}

/// Values of a `/Standard` encryption dictionary
#[derive(Debug, Clone)]
pub struct EncryptParams {
    pub v: i64,
    pub r: i64,
    /// Key length in bits
    pub length: i64,
    pub o: Vec<u8>,
    pub u: Vec<u8>,
    pub oe: Vec<u8>,
    pub ue: Vec<u8>,
    pub p: i32,
    pub encrypt_metadata: bool,
    /// `/StrF`
    pub string_filter: String,
    /// `/StmF`
    pub stream_filter: String,
    /// `/CF` entries by name
    pub crypt_filters: BTreeMap<String, CryptMethod>,
}

impl Default for EncryptParams {
    fn default() -> Self {
        Self {
            v: 0,
            r: 2,
            length: 40,
            o: Vec::new(),
            u: Vec::new(),
            oe: Vec::new(),
            ue: Vec::new(),
            p: 0,
            encrypt_metadata: true,
            string_filter: IDENTITY.to_string(),
            stream_filter: IDENTITY.to_string(),
            crypt_filters: BTreeMap::new(),
        }
    }
}

/// A document key unlocked with a password
#[derive(Clone)]
pub struct StandardSecurityHandler {
    revision: i64,
    key: Vec<u8>,
    string_method: CryptMethod,
    stream_method: CryptMethod,
    crypt_filters: BTreeMap<String, CryptMethod>,
    encrypt_metadata: bool,
}

impl fmt::Debug for StandardSecurityHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StandardSecurityHandler")
            .field("revision", &self.revision)
            .field("key_len", &self.key.len())
            .field("string_method", &self.string_method)
            .field("stream_method", &self.stream_method)
            .finish()
    }
}

fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut padded = [0u8; 32];
    let len = password.len().min(32);
    padded[..len].copy_from_slice(&password[..len]);
    padded[len..].copy_from_slice(&PADDING[..32 - len]);
    padded
}

fn xor_key(key: &[u8], round: u8) -> Vec<u8> {
    key.iter().map(|b| b ^ round).collect()
}

impl StandardSecurityHandler {
    /// Try each password in turn, as user then as owner password
    pub fn unlock(params: &EncryptParams, doc_id: &[u8], passwords: &[&[u8]]) -> ParseResult<Self> {
        for password in passwords {
            match Self::authenticate(params, doc_id, password) {
                Ok(handler) => return Ok(handler),
                Err(ParseError::PasswordRequired) => continue,
                Err(err) => return Err(err),
            }
        }
        Err(ParseError::PasswordRequired)
    }

    pub fn authenticate(params: &EncryptParams, doc_id: &[u8], password: &[u8]) -> ParseResult<Self> {
        let (string_method, stream_method) = match params.v {
            0 | 1 | 2 | 3 => (CryptMethod::V2, CryptMethod::V2),
            4 | 5 => (
                Self::method(params, &params.string_filter)?,
                Self::method(params, &params.stream_filter)?,
            ),
            v => {
                return Err(ParseError::EncryptionNotSupported(format!(
                    "encryption algorithm V={v}"
                )))
            }
        };
        let key = match params.r {
            2..=4 => Self::legacy_key(params, doc_id, password)?,
            5 | 6 => Self::aes256_key(params, password)?,
            r => {
                return Err(ParseError::EncryptionNotSupported(format!(
                    "security handler revision R={r}"
                )))
            }
        };
        Ok(Self {
            revision: params.r,
            key,
            string_method,
            stream_method,
            crypt_filters: params.crypt_filters.clone(),
            encrypt_metadata: params.encrypt_metadata,
        })
    }

    fn method(params: &EncryptParams, name: &str) -> ParseResult<CryptMethod> {
        if name == IDENTITY {
            return Ok(CryptMethod::Identity);
        }
        params.crypt_filters.get(name).copied().ok_or_else(|| {
            ParseError::EncryptionNotSupported(format!("crypt filter '{name}' not found in CF"))
        })
    }

    pub fn revision(&self) -> i64 {
        self.revision
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// Key length in bytes for revisions 2 to 4
    fn key_length(params: &EncryptParams) -> usize {
        match params.r {
            2 => 5,
            _ => usize::try_from(params.length / 8).unwrap_or(5).clamp(5, 16),
        }
    }

    /// Algorithm 2: file key from a (user) password
    fn compute_key(params: &EncryptParams, doc_id: &[u8], password: &[u8]) -> Vec<u8> {
        let n = Self::key_length(params);
        let mut context = md5::Context::new();
        context.consume(pad_password(password));
        context.consume(&params.o);
        context.consume(params.p.to_le_bytes());
        context.consume(doc_id);
        if params.r >= 4 && !params.encrypt_metadata {
            context.consume([0xFF, 0xFF, 0xFF, 0xFF]);
        }
        let mut digest = context.finalize().0;
        if params.r >= 3 {
            for _ in 0..50 {
                digest = md5::compute(&digest[..n]).0;
            }
        }
        digest[..n].to_vec()
    }

    /// Algorithms 4 and 5: expected `/U` for a file key
    fn compute_u(params: &EncryptParams, doc_id: &[u8], key: &[u8]) -> Vec<u8> {
        if params.r == 2 {
            return rc4(key, &PADDING);
        }
        let mut context = md5::Context::new();
        context.consume(PADDING);
        context.consume(doc_id);
        let mut result = rc4(key, &context.finalize().0);
        for round in 1..20u8 {
            result = rc4(&xor_key(key, round), &result);
        }
        result
    }

    fn check_user_password(params: &EncryptParams, doc_id: &[u8], password: &[u8]) -> Option<Vec<u8>> {
        let key = Self::compute_key(params, doc_id, password);
        let expected = Self::compute_u(params, doc_id, &key);
        let matches = if params.r == 2 {
            params.u.len() >= 32 && expected[..] == params.u[..32]
        } else {
            params.u.len() >= 16 && expected[..16] == params.u[..16]
        };
        matches.then_some(key)
    }

    /// Algorithm 7: recover the user password from `/O`, then authenticate it
    fn check_owner_password(params: &EncryptParams, doc_id: &[u8], password: &[u8]) -> Option<Vec<u8>> {
        let n = Self::key_length(params);
        let mut digest = md5::compute(pad_password(password)).0;
        if params.r >= 3 {
            for _ in 0..50 {
                digest = md5::compute(digest).0;
            }
        }
        let owner_key = &digest[..n];
        let user_password = if params.r == 2 {
            rc4(owner_key, &params.o)
        } else {
            (0..20u8)
                .rev()
                .fold(params.o.clone(), |data, round| rc4(&xor_key(owner_key, round), &data))
        };
        Self::check_user_password(params, doc_id, &user_password)
    }

    fn legacy_key(params: &EncryptParams, doc_id: &[u8], password: &[u8]) -> ParseResult<Vec<u8>> {
        Self::check_user_password(params, doc_id, password)
            .or_else(|| Self::check_owner_password(params, doc_id, password))
            .ok_or(ParseError::PasswordRequired)
    }

    fn aes256_key(params: &EncryptParams, password: &[u8]) -> ParseResult<Vec<u8>> {
        if params.o.len() < 48 || params.u.len() < 48 || params.oe.len() < 32 || params.ue.len() < 32 {
            return Err(ParseError::EncryptionNotSupported(
                "truncated AES-256 password entries".to_string(),
            ));
        }
        let password = &password[..password.len().min(127)];
        let (o_hash, o_validation, o_key_salt) = (&params.o[..32], &params.o[32..40], &params.o[40..48]);
        let (u_hash, u_validation, u_key_salt) = (&params.u[..32], &params.u[32..40], &params.u[40..48]);
        let user_vector = &params.u[..48];

        if Self::hash_r5_r6(params.r, password, o_validation, Some(user_vector))? == o_hash {
            let intermediate = Self::hash_r5_r6(params.r, password, o_key_salt, Some(user_vector))?;
            return aes_cbc_decrypt(&intermediate, &[0u8; 16], &params.oe[..32]);
        }
        if Self::hash_r5_r6(params.r, password, u_validation, None)? == u_hash {
            let intermediate = Self::hash_r5_r6(params.r, password, u_key_salt, None)?;
            return aes_cbc_decrypt(&intermediate, &[0u8; 16], &params.ue[..32]);
        }
        Err(ParseError::PasswordRequired)
    }

    /// Algorithm 2.B (revision 6) or a single SHA-256 (revision 5)
    fn hash_r5_r6(revision: i64, password: &[u8], salt: &[u8], vector: Option<&[u8]>) -> ParseResult<Vec<u8>> {
        let vector = vector.unwrap_or(&[]);
        let mut k = Sha256::new()
            .chain_update(password)
            .chain_update(salt)
            .chain_update(vector)
            .finalize()
            .to_vec();
        if revision == 5 {
            return Ok(k);
        }

        let mut round: u32 = 0;
        loop {
            let block: Vec<u8> = [password, k.as_slice(), vector].concat();
            let k1 = block.repeat(64);
            let e = aes128_cbc_encrypt(&k[..16], &k[16..32], &k1)?;
            let selector = e[..16].iter().map(|&b| u32::from(b) % 3).sum::<u32>() % 3;
            k = match selector {
                0 => Sha256::digest(&e).to_vec(),
                1 => Sha384::digest(&e).to_vec(),
                _ => Sha512::digest(&e).to_vec(),
            };
            round += 1;
            let last = e.last().copied().map_or(0, u32::from);
            if round >= 64 && last <= round - 32 {
                break;
            }
        }
        k.truncate(32);
        Ok(k)
    }

    /// Algorithm 1: per-object key
    fn object_key(&self, id: ObjectId, aes: bool) -> Vec<u8> {
        let mut context = md5::Context::new();
        context.consume(&self.key);
        context.consume(&id.number.to_le_bytes()[..3]);
        context.consume(&id.generation.to_le_bytes()[..2]);
        if aes {
            context.consume(b"sAlT");
        }
        let len = (self.key.len() + 5).min(16);
        context.finalize().0[..len].to_vec()
    }

    fn decrypt(&self, method: CryptMethod, id: ObjectId, data: &[u8]) -> ParseResult<Vec<u8>> {
        match method {
            CryptMethod::Identity => Ok(data.to_vec()),
            CryptMethod::V2 => Ok(rc4(&self.object_key(id, false), data)),
            CryptMethod::AesV2 => decrypt_payload(&self.object_key(id, true), data),
            CryptMethod::AesV3 => decrypt_payload(&self.key, data),
        }
    }

    pub fn decrypt_string(&self, id: ObjectId, data: &[u8]) -> ParseResult<Vec<u8>> {
        self.decrypt(self.string_method, id, data)
    }

    /// `/Type /Metadata` streams stay in clear text when `/EncryptMetadata` is false
    pub fn decrypt_stream(&self, id: ObjectId, data: &[u8], is_metadata: bool) -> ParseResult<Vec<u8>> {
        if is_metadata && !self.encrypt_metadata {
            return Ok(data.to_vec());
        }
        self.decrypt(self.stream_method, id, data)
    }

    /// Apply a named crypt filter (the `/Crypt` stream filter)
    pub fn decrypt_with_filter(&self, name: &str, id: ObjectId, data: &[u8]) -> ParseResult<Vec<u8>> {
        let method = if name == IDENTITY {
            CryptMethod::Identity
        } else {
            self.crypt_filters.get(name).copied().ok_or_else(|| {
                ParseError::EncryptionNotSupported(format!("crypt filter '{name}' not found in CF"))
            })?
        };
        self.decrypt(method, id, data)
    }
}
