//! License key format: `XXXX-XXXX-XXXX-XXXX`, uppercase alphanumeric.

use rand::{CryptoRng, Rng};

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const GROUPS: usize = 4;
const GROUP_LEN: usize = 4;

/// Total key length including separators.
pub const KEY_LEN: usize = GROUPS * GROUP_LEN + (GROUPS - 1);

/// Draw a fresh key. Callers must still check it against the store.
pub fn generate<R: Rng + CryptoRng>(rng: &mut R) -> String {
    let mut key = String::with_capacity(KEY_LEN);
    for group in 0..GROUPS {
        if group > 0 {
            key.push('-');
        }
        for _ in 0..GROUP_LEN {
            key.push(ALPHABET[rng.gen_range(0..ALPHABET.len())] as char);
        }
    }
    key
}

/// Whether `key` has the exact shape of a license key.
pub fn is_well_formed(key: &str) -> bool {
    let bytes = key.as_bytes();
    bytes.len() == KEY_LEN
        && bytes.iter().enumerate().all(|(i, b)| {
            if i % (GROUP_LEN + 1) == GROUP_LEN {
                *b == b'-'
            } else {
                b.is_ascii_uppercase() || b.is_ascii_digit()
            }
        })
}
