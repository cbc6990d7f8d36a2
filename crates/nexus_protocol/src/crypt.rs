//! Per-session stream cipher.
//!
//! 128 bytes of key material are expanded from the 16-byte session key by
//! iterated SHA-256. A 64-bit counter advances once per byte; the keystream
//! index is taken from the top byte of `counter * MULT`. Encrypt and decrypt
//! are the same XOR, so the two directions each thread their own state and
//! must be applied in on-wire order.

use sha2::{Digest, Sha256};

const KEY_BYTES: usize = 128;
const COUNTER_MULT: u64 = 0x9e37_79b9_7f4a_7c15;

#[derive(Clone)]
pub struct SessionCipher {
    key: [u8; KEY_BYTES],
    counter: u64,
}

impl SessionCipher {
    pub fn new(session_key: &[u8; 16]) -> Self {
        let mut key = [0u8; KEY_BYTES];
        for (i, block) in key.chunks_mut(32).enumerate() {
            let mut h = Sha256::new();
            h.update(session_key);
            h.update([i as u8]);
            block.copy_from_slice(&h.finalize());
        }
        Self { key, counter: 0 }
    }

    /// XORs the keystream over `data` in place, advancing the counter.
    pub fn apply(&mut self, data: &mut [u8]) {
        for b in data.iter_mut() {
            let idx = (self.counter.wrapping_mul(COUNTER_MULT) >> 56) as usize & (KEY_BYTES - 1);
            *b ^= self.key[idx];
            self.counter = self.counter.wrapping_add(1);
        }
    }
}

impl std::fmt::Debug for SessionCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCipher")
            .field("counter", &self.counter)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 16] = *b"0123456789abcdef";

    #[test]
    fn decrypt_inverts_encrypt() {
        let plain = b"the strain is spreading".to_vec();

        let mut data = plain.clone();
        SessionCipher::new(&KEY).apply(&mut data);
        assert_ne!(data, plain);

        SessionCipher::new(&KEY).apply(&mut data);
        assert_eq!(data, plain);
    }

    #[test]
    fn state_evolves_deterministically() {
        let mut whole = [0u8; 64];
        let mut split = [0u8; 64];

        SessionCipher::new(&KEY).apply(&mut whole);

        let mut c = SessionCipher::new(&KEY);
        let (a, b) = split.split_at_mut(19);
        c.apply(a);
        c.apply(b);

        assert_eq!(whole, split);
    }

    #[test]
    fn keys_produce_distinct_streams() {
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        SessionCipher::new(&KEY).apply(&mut a);
        SessionCipher::new(&[9; 16]).apply(&mut b);
        assert_ne!(a, b);
    }
}
