//! Control message codec
//!
//! Control messages are serde types; on the wire they are postcard bytes.
//! Only `decode(encode(m)) == m` is guaranteed, not byte-level stability.

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::CodecError;

/// Encode a message into a byte buffer
pub fn encode<T: Serialize>(message: &T) -> Result<Bytes, CodecError> {
    postcard::to_allocvec(message)
        .map(Bytes::from)
        .map_err(|e| CodecError::Encode(e.to_string()))
}

/// Decode a message from a byte buffer
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    postcard::from_bytes(bytes).map_err(|e| CodecError::Decode(e.to_string()))
}
