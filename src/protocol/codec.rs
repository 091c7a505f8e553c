//! Newline-delimited JSON framing.
//!
//! One message per line in both directions. The first line the dispatcher
//! writes to a fresh worker is the configuration document; every later line
//! is a [`RequestDescriptor`]. The worker only ever writes
//! [`ReplyDescriptor`] lines.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::protocol::{ReplyDescriptor, RequestDescriptor};

/// A line that could not be turned into a valid message.
#[derive(Debug)]
pub struct MalformedMessage {
    /// Recovered from the raw JSON when possible, so the sender can still be answered.
    pub correlation_id: Option<String>,
    pub error: ProxyError,
}

/// Serialize one message as a single line, newline included.
pub fn encode<T: Serialize>(message: &T) -> Result<String, ProxyError> {
    let mut line = serde_json::to_string(message).map_err(|e| ProxyError::MessageMalformed(e.to_string()))?;
    line.push('\n');
    Ok(line)
}

pub fn encode_config(config: &ProxyConfig) -> Result<String, ProxyError> {
    encode(config)
}

pub fn decode_config(line: &str) -> Result<ProxyConfig, serde_json::Error> {
    serde_json::from_str(line)
}

pub fn decode_request(line: &str) -> Result<RequestDescriptor, MalformedMessage> {
    let request: RequestDescriptor = decode(line)?;
    request.validate().map_err(|error| MalformedMessage {
        correlation_id: Some(request.correlation_id.clone()).filter(|id| !id.is_empty()),
        error,
    })?;
    Ok(request)
}

/// Decode a reply. Payload validation is left to the caller, which can still
/// route an invalid reply to its pending request.
pub fn decode_reply(line: &str) -> Result<ReplyDescriptor, MalformedMessage> {
    decode(line)
}

fn decode<T: DeserializeOwned>(line: &str) -> Result<T, MalformedMessage> {
    serde_json::from_str(line).map_err(|e| MalformedMessage {
        correlation_id: recover_correlation_id(line),
        error: ProxyError::MessageMalformed(e.to_string()),
    })
}

fn recover_correlation_id(line: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(line).ok()?;
    value
        .get("correlationId")?
        .as_str()
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}
