//! Request and response envelopes carried inside a frame.
//!
//! Request:  `[service_id: u16 LE][method_id: u16 LE][body...]`
//! Response: `[status_code: u16 LE][body...]`
//!
//! On an OK response the body is the JSON-encoded message; otherwise it is
//! the UTF-8 status message (possibly empty).

use afcdisk_types::{Status, StatusCode};
use bytes::{BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::NetError;

pub const REQUEST_ENVELOPE_SIZE: usize = 4;
pub const RESPONSE_ENVELOPE_SIZE: usize = 2;

/// Decoded request envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestEnvelope {
    pub service_id: u16,
    pub method_id: u16,
    pub body: Bytes,
}

pub fn encode_request(service_id: u16, method_id: u16, body: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(REQUEST_ENVELOPE_SIZE + body.len());
    buf.put_u16_le(service_id);
    buf.put_u16_le(method_id);
    buf.extend_from_slice(body);
    buf.freeze()
}

pub fn decode_request(payload: Bytes) -> Result<RequestEnvelope, NetError> {
    if payload.len() < REQUEST_ENVELOPE_SIZE {
        return Err(NetError::MalformedEnvelope {
            need: REQUEST_ENVELOPE_SIZE,
            have: payload.len(),
        });
    }
    Ok(RequestEnvelope {
        service_id: u16::from_le_bytes([payload[0], payload[1]]),
        method_id: u16::from_le_bytes([payload[2], payload[3]]),
        body: payload.slice(REQUEST_ENVELOPE_SIZE..),
    })
}

pub fn encode_response(result: Result<Bytes, Status>) -> Bytes {
    match result {
        Ok(body) => {
            let mut buf = BytesMut::with_capacity(RESPONSE_ENVELOPE_SIZE + body.len());
            buf.put_u16_le(StatusCode::OK);
            buf.extend_from_slice(&body);
            buf.freeze()
        }
        Err(status) => {
            let msg = status.message().unwrap_or_default();
            let mut buf = BytesMut::with_capacity(RESPONSE_ENVELOPE_SIZE + msg.len());
            buf.put_u16_le(status.code());
            buf.extend_from_slice(msg.as_bytes());
            buf.freeze()
        }
    }
}

/// Split a response payload into the body or the remote status.
pub fn decode_response(payload: Bytes) -> Result<Bytes, NetError> {
    if payload.len() < RESPONSE_ENVELOPE_SIZE {
        return Err(NetError::MalformedEnvelope {
            need: RESPONSE_ENVELOPE_SIZE,
            have: payload.len(),
        });
    }
    let code = u16::from_le_bytes([payload[0], payload[1]]);
    let body = payload.slice(RESPONSE_ENVELOPE_SIZE..);
    if code == StatusCode::OK {
        return Ok(body);
    }
    let status = if body.is_empty() {
        Status::new(code)
    } else {
        Status::with_message(code, String::from_utf8_lossy(&body).into_owned())
    };
    Err(NetError::ServiceError(status))
}

pub fn encode_message<T: Serialize>(msg: &T) -> Result<Bytes, NetError> {
    Ok(Bytes::from(serde_json::to_vec(msg)?))
}

pub fn decode_message<T: DeserializeOwned>(body: &[u8]) -> Result<T, NetError> {
    Ok(serde_json::from_slice(body)?)
}

/// Decode a request body on the server side, reporting failures as a status.
pub fn decode_request_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, Status> {
    serde_json::from_slice(body)
        .map_err(|e| Status::with_message(StatusCode::INVALID_FORMAT, e.to_string()))
}

/// Encode a handler's typed result into a response body.
pub fn encode_result<T: Serialize>(result: afcdisk_types::Result<T>) -> Result<Bytes, Status> {
    let rsp = result?;
    serde_json::to_vec(&rsp)
        .map(Bytes::from)
        .map_err(|e| Status::with_message(StatusCode::INVALID_FORMAT, e.to_string()))
}
