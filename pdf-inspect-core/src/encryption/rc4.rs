//! RC4 stream cipher used by the V1/V2 security handlers

/// RC4 cipher state
pub struct Rc4 {
    s: [u8; 256],
    i: usize,
    j: usize,
}

impl Rc4 {
    /// Create a cipher for `key`. An empty key behaves as a single zero byte.
    pub fn new(key: &[u8]) -> Self {
        let key: &[u8] = if key.is_empty() { &[0] } else { key };
        let mut s = [0u8; 256];
        for (i, byte) in s.iter_mut().enumerate() {
            *byte = i as u8;
        }

        // Key scheduling algorithm (KSA)
        let mut j = 0usize;
        for i in 0..256 {
            j = (j + s[i] as usize + key[i % key.len()] as usize) % 256;
            s.swap(i, j);
        }

        Self { s, i: 0, j: 0 }
    }

    /// Process data (RC4 is symmetric)
    pub fn process(&mut self, data: &[u8]) -> Vec<u8> {
        let mut output = data.to_vec();
        self.process_in_place(&mut output);
        output
    }

    pub fn process_in_place(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            // Pseudo-random generation algorithm (PRGA)
            self.i = (self.i + 1) % 256;
            self.j = (self.j + self.s[self.i] as usize) % 256;
            self.s.swap(self.i, self.j);

            let k = self.s[(self.s[self.i] as usize + self.s[self.j] as usize) % 256];
            *byte ^= k;
        }
    }
}

/// One-shot RC4 transform
pub fn rc4(key: &[u8], data: &[u8]) -> Vec<u8> {
    Rc4::new(key).process(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rc4_known_vector() {
        // Key "Key", plaintext "Plaintext"
        let encrypted = rc4(b"Key", b"Plaintext");
        assert_eq!(encrypted, hex::decode("BBF316E8D940AF0AD3").unwrap());
    }

    #[test]
    fn test_rc4_is_symmetric() {
        let data = b"Hello, RC4!";
        let encrypted = rc4(b"secret", data);
        assert_ne!(encrypted.as_slice(), data);
        assert_eq!(rc4(b"secret", &encrypted), data);
    }

    #[test]
    fn test_rc4_empty_key_does_not_panic() {
        let encrypted = rc4(b"", b"abc");
        assert_eq!(rc4(&[0], b"abc"), encrypted);
    }
}
