//! Opaque, self-describing serialization for queue payloads.
//!
//! The envelope carries a version so a future codec change can be detected
//! on read; today there is exactly one version. Any consumer that reads the
//! durable queue directly (bypassing this crate) must agree on this format --
//! spec §6 calls it explicitly private to one deployment.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const ENVELOPE_VERSION: u16 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    version: u16,
    payload: &'a T,
}

#[derive(Deserialize)]
struct EnvelopeOwned<T> {
    #[allow(dead_code)]
    version: u16,
    payload: T,
}

pub fn encode<T: Serialize>(item: &T) -> Result<Vec<u8>> {
    let envelope = EnvelopeRef {
        version: ENVELOPE_VERSION,
        payload: item,
    };
    Ok(serde_json::to_vec(&envelope)?)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let envelope: EnvelopeOwned<T> = serde_json::from_slice(bytes)?;
    Ok(envelope.payload)
}

/// Canonical textual representation used to derive a key when the caller
/// supplies none -- the Rust analogue of the original's `str(item)` default.
pub fn canonical_string<T: Serialize>(item: &T) -> Result<String> {
    Ok(serde_json::to_string(item)?)
}
