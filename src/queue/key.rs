//! Key hashing for the persistent queue: `lowercase_hex(md5(utf8(str(key))))`.
//!
//! Pinned to MD5 by spec §6 because the hash is itself the durable,
//! wire-visible lookup index -- it cannot be swapped for a stronger digest
//! without breaking existing on-disk queues.

/// A 32-hex-character MD5 digest of a queue key's UTF-8 textual form.
pub fn key_hash(key: &str) -> String {
    format!("{:x}", md5::compute(key.as_bytes()))
}
