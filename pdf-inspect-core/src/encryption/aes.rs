//! AES-CBC helpers for the AESV2 and AESV3 crypt filters
//!
//! Payloads carry their 16-byte initialization vector in front of the cipher text
//! (ISO 32000-1 Section 7.6.2).

use aes::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use cbc::{Decryptor, Encryptor};

use crate::parser::{ParseError, ParseResult};

type Aes128CbcDec = Decryptor<aes::Aes128>;
type Aes256CbcDec = Decryptor<aes::Aes256>;
type Aes128CbcEnc = Encryptor<aes::Aes128>;

const BLOCK_SIZE: usize = 16;

fn cipher_error(message: impl Into<String>) -> ParseError {
    ParseError::EncryptionNotSupported(message.into())
}

/// Decrypt whole blocks with a 16 or 32 byte key, without touching the padding
pub fn aes_cbc_decrypt(key: &[u8], iv: &[u8], data: &[u8]) -> ParseResult<Vec<u8>> {
    if data.len() % BLOCK_SIZE != 0 {
        return Err(cipher_error(format!(
            "AES payload of {} bytes is not a multiple of the block size",
            data.len()
        )));
    }
    let mut buf = data.to_vec();
    let result = match key.len() {
        16 => Aes128CbcDec::new_from_slices(key, iv)
            .map_err(|e| cipher_error(e.to_string()))?
            .decrypt_padded_mut::<NoPadding>(&mut buf)
            .map(|plain| plain.len()),
        32 => Aes256CbcDec::new_from_slices(key, iv)
            .map_err(|e| cipher_error(e.to_string()))?
            .decrypt_padded_mut::<NoPadding>(&mut buf)
            .map(|plain| plain.len()),
        n => return Err(cipher_error(format!("AES key must be 16 or 32 bytes, got {n}"))),
    };
    let len = result.map_err(|e| cipher_error(e.to_string()))?;
    buf.truncate(len);
    Ok(buf)
}

/// Encrypt whole blocks with a 16 byte key (used by the revision 6 password hash)
pub fn aes128_cbc_encrypt(key: &[u8], iv: &[u8], data: &[u8]) -> ParseResult<Vec<u8>> {
    let mut buf = data.to_vec();
    let len = Aes128CbcEnc::new_from_slices(key, iv)
        .map_err(|e| cipher_error(e.to_string()))?
        .encrypt_padded_mut::<NoPadding>(&mut buf, data.len())
        .map_err(|e| cipher_error(e.to_string()))?
        .len();
    buf.truncate(len);
    Ok(buf)
}

/// Strip PKCS#7 padding; invalid padding leaves the data untouched
pub fn unpad(data: &[u8]) -> &[u8] {
    let Some(&last) = data.last() else {
        return data;
    };
    let pad_len = last as usize;
    if pad_len == 0 || pad_len > BLOCK_SIZE || pad_len > data.len() {
        return data;
    }
    let start = data.len() - pad_len;
    if data[start..].iter().all(|&b| b == last) {
        &data[..start]
    } else {
        data
    }
}

/// Decrypt an object payload: IV prefix, cipher text, PKCS#7 padding
pub fn decrypt_payload(key: &[u8], data: &[u8]) -> ParseResult<Vec<u8>> {
    if data.len() < BLOCK_SIZE {
        return Err(cipher_error("AES payload shorter than its initialization vector"));
    }
    let (iv, cipher_text) = data.split_at(BLOCK_SIZE);
    if cipher_text.is_empty() {
        return Ok(Vec::new());
    }
    let plain = aes_cbc_decrypt(key, iv, cipher_text)?;
    Ok(unpad(&plain).to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encrypt_payload(key: &[u8], iv: &[u8; 16], plain: &[u8]) -> Vec<u8> {
        let pad = BLOCK_SIZE - plain.len() % BLOCK_SIZE;
        let mut padded = plain.to_vec();
        padded.extend(std::iter::repeat(pad as u8).take(pad));
        let mut out = iv.to_vec();
        out.extend(aes128_cbc_encrypt(key, iv, &padded).unwrap());
        out
    }

    #[test]
    fn test_payload_roundtrip() {
        let key = [7u8; 16];
        let payload = encrypt_payload(&key, &[1u8; 16], b"secret stream data");
        assert_eq!(payload.len(), 48);
        assert_eq!(decrypt_payload(&key, &payload).unwrap(), b"secret stream data");
    }

    #[test]
    fn test_unpad() {
        assert_eq!(unpad(b"abc\x03\x03\x03"), b"abc");
        assert_eq!(unpad(b"abc\x03\x02\x03"), b"abc\x03\x02\x03");
        assert_eq!(unpad(b"abc\x00"), b"abc\x00");
        assert_eq!(unpad(b""), b"");
    }

    #[test]
    fn test_invalid_inputs_are_errors() {
        let key = [7u8; 16];
        assert!(decrypt_payload(&key, b"short").is_err());
        assert!(aes_cbc_decrypt(&key, &[0u8; 16], &[0u8; 17]).is_err());
        assert!(aes_cbc_decrypt(&[0u8; 5], &[0u8; 16], &[0u8; 16]).is_err());
        assert!(decrypt_payload(&key, &[0u8; 16]).unwrap().is_empty());
    }
}
