//! Conversions between typed records and cache payloads.

use crate::cache::Payload;
use serde::de::DeserializeOwned;
use serde::Serialize;
use vitrine_core::NetworkError;

pub(crate) fn encode<T: Serialize>(resource: &str, value: &T) -> Result<Payload, NetworkError> {
    serde_json::to_value(value).map_err(|e| NetworkError::Decode {
        path: resource.to_string(),
        reason: e.to_string(),
    })
}

pub(crate) fn decode<T: DeserializeOwned>(
    resource: &str,
    payload: Payload,
) -> Result<T, NetworkError> {
    serde_json::from_value(payload).map_err(|e| NetworkError::Decode {
        path: resource.to_string(),
        reason: e.to_string(),
    })
}
