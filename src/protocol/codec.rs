//! Request/response codec for the pb0 dialect
//!
//! Builds request bodies and interprets response bodies. Framing (the
//! `u32` big-endian length prefix) is applied by the connection; the
//! functions here work on bare protobuf bodies.

use crate::common::{Error, Result};
use crate::protocol::messages::{GetRequest, GetResponse, Request, RequestType};
use bytes::Bytes;
use prost::Message;

/// Build the body of a get request for `key` against `store`.
///
/// Only unrouted gets are produced; the server performs no rerouting on
/// behalf of this client.
pub fn build_get(store: &str, key: &[u8]) -> Vec<u8> {
    let request = Request {
        request_type: Some(RequestType::Get as i32),
        should_route: Some(false),
        store: Some(store.to_string()),
        get: Some(GetRequest {
            key: Some(key.to_vec()),
        }),
    };

    request.encode_to_vec()
}

/// Interpret a get response body.
///
/// A response carrying an error object fails the request with the remote
/// code and message. An empty version list is the distinguished
/// key-not-found outcome. Otherwise the entry with the greatest vector
/// clock timestamp wins, first entry on ties.
pub fn parse_get(body: &[u8]) -> Result<Bytes> {
    let response = GetResponse::decode(body)?;

    if let Some(error) = response.error {
        let message = error.error_message.unwrap_or_default();
        if !message.is_empty() {
            return Err(Error::Remote {
                code: error.error_code.unwrap_or(0),
                message,
            });
        }
    }

    let mut best: Option<(i64, Vec<u8>)> = None;
    for versioned in response.versioned {
        let timestamp = versioned
            .version
            .and_then(|v| v.timestamp)
            .unwrap_or(i64::MIN);
        let value = versioned.value.unwrap_or_default();

        match &best {
            Some((best_ts, _)) if timestamp <= *best_ts => {}
            _ => best = Some((timestamp, value)),
        }
    }

    match best {
        Some((_, value)) => Ok(Bytes::from(value)),
        None => Err(Error::KeyNotFound),
    }
}

/// Prefix a body with the `u32` big-endian length the wire expects.
pub fn frame(body: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(4 + body.len());
    framed.extend_from_slice(&(body.len() as u32).to_be_bytes());
    framed.extend_from_slice(body);
    framed
}
