//! Response handling and transformation.
//!
//! # Responsibilities
//! - Turn a pipeline result into an HTTP response
//! - Mark successful responses with `x-cache: HIT` or `MISS`
//! - Attach `Retry-After` to rate-limited responses

use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::dispatcher::{ProxyResponse, ResponseSource};

pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

impl IntoResponse for ProxyResponse {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.body).into_response();
        let headers = response.headers_mut();

        if self.status == StatusCode::OK {
            let marker = match self.source {
                ResponseSource::Cache => "HIT",
                _ => "MISS",
            };
            headers.insert(X_CACHE, HeaderValue::from_static(marker));
        }
        if let Some(secs) = self.retry_after {
            headers.insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;

    fn proxy_response(status: StatusCode, source: ResponseSource) -> ProxyResponse {
        ProxyResponse { status, body: Bytes::from_static(b"x"), source, retry_after: None }
    }

    #[test]
    fn cache_marker_only_on_success() {
        let hit = proxy_response(StatusCode::OK, ResponseSource::Cache).into_response();
        assert_eq!(hit.headers()[&X_CACHE], "HIT");

        let miss = proxy_response(StatusCode::OK, ResponseSource::Worker).into_response();
        assert_eq!(miss.headers()[&X_CACHE], "MISS");

        let not_found = proxy_response(StatusCode::NOT_FOUND, ResponseSource::Worker).into_response();
        assert!(not_found.headers().get(&X_CACHE).is_none());
    }

    #[test]
    fn retry_after_is_whole_seconds() {
        let mut limited = proxy_response(StatusCode::TOO_MANY_REQUESTS, ResponseSource::Dispatcher);
        limited.retry_after = Some(7);
        let response = limited.into_response();
        assert_eq!(response.headers()[header::RETRY_AFTER], "7");
    }
}
