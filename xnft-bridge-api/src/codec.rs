//! MessagePack codec for protocol messages
//!
//! Structs are encoded with field names so that payloads stay readable by
//! plugin-side decoders that do not share these Rust definitions.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Encoding failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("Decoding failed: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Encode a protocol value
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CodecError> {
    Ok(rmp_serde::to_vec_named(value)?)
}

/// Decode a protocol value
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    Ok(rmp_serde::from_slice(bytes)?)
}
