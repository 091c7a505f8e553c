//! Descriptors exchanged between the dispatcher and a worker.

use std::collections::HashMap;

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::ProxyError;

/// Kind of work a descriptor asks for. Only plain HTTP forwarding exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestType {
    #[serde(rename = "http")]
    Http,
}

/// Dispatcher → worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDescriptor {
    pub correlation_id: String,
    pub request_type: RequestType,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: String,
    /// Request target: path plus optional query string.
    pub url: String,
}

impl RequestDescriptor {
    pub fn http(correlation_id: impl Into<String>, url: impl Into<String>, headers: HashMap<String, String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            request_type: RequestType::Http,
            headers,
            body: String::new(),
            url: url.into(),
        }
    }

    /// Checks serde cannot express.
    pub fn validate(&self) -> Result<(), ProxyError> {
        if self.correlation_id.is_empty() {
            return Err(ProxyError::MessageMalformed("empty correlationId".into()));
        }
        if !self.url.starts_with('/') {
            return Err(ProxyError::MessageMalformed(format!("url '{}' is not an absolute path", self.url)));
        }
        Ok(())
    }
}

/// Error classes a worker may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    #[serde(rename = "400")]
    BadRequest,
    #[serde(rename = "404")]
    NotFound,
    #[serde(rename = "429")]
    TooManyRequests,
    #[serde(rename = "500")]
    Internal,
}

impl ErrorCode {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorCode::BadRequest => StatusCode::BAD_REQUEST,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Worker → dispatcher. Exactly one of `data` / `error` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyDescriptor {
    pub correlation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
}

impl ReplyDescriptor {
    pub fn success(correlation_id: impl Into<String>, data: String) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            data: Some(data),
            error: None,
            error_code: None,
        }
    }

    /// Reply for a worker-side failure. Errors without a wire code report 500.
    pub fn failure(correlation_id: impl Into<String>, err: &ProxyError) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            data: None,
            error: Some(err.client_message().to_string()),
            error_code: Some(err.error_code().unwrap_or(ErrorCode::Internal)),
        }
    }

    pub fn validate(&self) -> Result<(), ProxyError> {
        match (&self.data, &self.error) {
            (Some(_), None) if self.error_code.is_none() => Ok(()),
            (None, Some(_)) if self.error_code.is_some() => Ok(()),
            _ => Err(ProxyError::MessageMalformed(format!(
                "reply {} must carry either data or error with errorCode",
                self.correlation_id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_uses_camel_case_wire_names() {
        let descriptor = RequestDescriptor::http("abc", "/todos", HashMap::new());
        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(json["correlationId"], "abc");
        assert_eq!(json["requestType"], "http");
        assert_eq!(json["url"], "/todos");
        assert_eq!(json["body"], "");
    }

    #[test]
    fn error_codes_are_numeric_strings() {
        let reply = ReplyDescriptor::failure("1", &ProxyError::RuleNotFound("/x".into()));
        let json = serde_json::to_string(&reply).unwrap();
        assert!(json.contains(r#""errorCode":"404""#), "{json}");
        assert!(json.contains(r#""error":"Rule Not Found""#), "{json}");
        assert!(!json.contains("data"));
        assert_eq!(ErrorCode::Internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn reply_must_carry_exactly_one_payload() {
        assert!(ReplyDescriptor::success("1", "ok".into()).validate().is_ok());
        assert!(ReplyDescriptor::failure("1", &ProxyError::RateLimited).validate().is_ok());

        let empty = ReplyDescriptor { correlation_id: "1".into(), data: None, error: None, error_code: None };
        assert!(empty.validate().is_err());

        let both = ReplyDescriptor {
            correlation_id: "1".into(),
            data: Some("x".into()),
            error: Some("y".into()),
            error_code: Some(ErrorCode::Internal),
        };
        assert!(both.validate().is_err());
    }

    #[test]
    fn request_validation() {
        assert!(RequestDescriptor::http("1", "/a", HashMap::new()).validate().is_ok());
        assert!(RequestDescriptor::http("", "/a", HashMap::new()).validate().is_err());
        assert!(RequestDescriptor::http("1", "a", HashMap::new()).validate().is_err());
    }
}
