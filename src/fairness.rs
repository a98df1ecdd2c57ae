//! Deterministic derivation of game outcomes from a committed seed pair.
//!
//! Everything here is a pure function of (server seed, client seed, round
//! counter): identical inputs always yield identical outputs. This is the
//! audit contract players verify against the published seed hash.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha512};

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 output size; the byte stream is produced in blocks this big.
const BLOCK_LEN: usize = 32;

/// Restartable byte stream derived from a seed pair and round counter.
///
/// Block *k* is `HMAC-SHA256(key = server_seed, msg = "client:nonce:k")`;
/// blocks are concatenated in order and consumed one byte at a time from the
/// cursor position. The cursor is explicit so a stream can be re-entered at
/// any offset.
pub struct ByteStream {
    server_seed: String,
    client_seed: String,
    nonce: u64,
    block: u64,
    buffer: [u8; BLOCK_LEN],
    offset: usize,
}

impl ByteStream {
    pub fn new(server_seed: &str, client_seed: &str, nonce: u64) -> Self {
        Self::with_cursor(server_seed, client_seed, nonce, 0)
    }

    /// Start the stream at an arbitrary byte offset.
    pub fn with_cursor(server_seed: &str, client_seed: &str, nonce: u64, cursor: usize) -> Self {
        let mut stream = Self {
            server_seed: server_seed.to_string(),
            client_seed: client_seed.to_string(),
            nonce,
            block: (cursor / BLOCK_LEN) as u64,
            buffer: [0u8; BLOCK_LEN],
            offset: cursor % BLOCK_LEN,
        };
        stream.refill();
        stream
    }

    fn refill(&mut self) {
        let mut mac = HmacSha256::new_from_slice(self.server_seed.as_bytes())
            .expect("hmac accepts any key length");
        mac.update(format!("{}:{}:{}", self.client_seed, self.nonce, self.block).as_bytes());
        self.buffer.copy_from_slice(&mac.finalize().into_bytes());
    }

    /// Produce the next byte, rolling over to the next HMAC block as needed.
    pub fn next_byte(&mut self) -> u8 {
        if self.offset == BLOCK_LEN {
            self.block += 1;
            self.offset = 0;
            self.refill();
        }
        let byte = self.buffer[self.offset];
        self.offset += 1;
        byte
    }

    /// Produce the next `n` bytes.
    pub fn take_bytes(&mut self, n: usize) -> Vec<u8> {
        (0..n).map(|_| self.next_byte()).collect()
    }

    /// Produce a uniform value in [0, 1) from the next 4 bytes.
    ///
    /// Value = sum of byte_i / 256^(i+1), a fixed-point float with
    /// resolution 1/256^4.
    pub fn next_float(&mut self) -> f64 {
        let mut value = 0.0;
        for i in 0..4 {
            value += self.next_byte() as f64 / 256f64.powi(i + 1);
        }
        value
    }

    /// Produce `count` uniform values in [0, 1).
    pub fn floats(&mut self, count: usize) -> Vec<f64> {
        (0..count).map(|_| self.next_float()).collect()
    }
}

/// SHA-256 commitment hash of a server seed, hex encoded.
///
/// Published before any round under the seed is played.
pub fn commitment_hash(seed: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hex::encode(hasher.finalize())
}

/// Single-shot round digest: hex SHA-512 over the concatenated inputs.
///
/// Used where one deterministic value per round suffices (mine placement,
/// plinko target slot, shuffle key).
pub fn round_digest(server_seed: &str, client_seed: &str, nonce: u64) -> String {
    let mut hasher = Sha512::new();
    hasher.update(format!("{}{}{}", server_seed, client_seed, nonce).as_bytes());
    hex::encode(hasher.finalize())
}

/// Round digest with a distinguishing tag appended, for secondary draws
/// within the same round.
pub fn tagged_digest(server_seed: &str, client_seed: &str, nonce: u64, tag: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(format!("{}{}{}{}", server_seed, client_seed, nonce, tag).as_bytes());
    hex::encode(hasher.finalize())
}

/// Integer reduction of a hex digest: its first 13 hex digits as a u64.
pub fn digest_prefix(digest: &str) -> u64 {
    u64::from_str_radix(&digest[..13], 16).unwrap_or(0)
}

/// Weighted sample over a weight vector, driven by a round digest.
///
/// Reduces the digest prefix modulo the total weight and walks the
/// cumulative weights to the matching index. The weight vector must be
/// non-empty with a positive total; callers validate that at table load.
pub fn weighted_index(digest: &str, weights: &[u32]) -> usize {
    let total: u64 = weights.iter().map(|&w| w as u64).sum();
    let scaled = digest_prefix(digest) % total.max(1);

    let mut accumulated = 0u64;
    for (i, &weight) in weights.iter().enumerate() {
        accumulated += weight as u64;
        if scaled < accumulated {
            return i;
        }
    }
    weights.len() - 1
}
