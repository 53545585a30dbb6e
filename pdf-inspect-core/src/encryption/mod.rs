//! PDF decryption support according to ISO 32000-1 Chapter 7.6
//!
//! This module provides the Standard Security Handler (revisions 2 to 6) with the
//! RC4, AES-128 and AES-256 crypt filters. Documents are only ever decrypted.

mod aes;
mod rc4;
mod standard_security;

pub use aes::{aes_cbc_decrypt, decrypt_payload, unpad};
pub use rc4::{rc4, Rc4};
pub use standard_security::{CryptMethod, EncryptParams, StandardSecurityHandler, IDENTITY};
