//! Errors of the payment API client.

use http::StatusCode;
use icpay::IcpayError;

/// Errors that can occur while talking to the payment API.
#[derive(Debug, thiserror::Error)]
pub enum ApiClientError {
    /// URL parse error.
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        /// Human-readable context.
        context: &'static str,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },
    /// A credential could not be turned into a header value.
    #[error("Invalid header value: {context}")]
    InvalidHeader {
        /// Which header.
        context: &'static str,
    },
    /// HTTP transport error.
    #[error("HTTP error: {context}: {source}")]
    Http {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// JSON deserialization error.
    #[error("Failed to deserialize JSON: {context}: {source}")]
    JsonDeserialization {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// Unexpected HTTP status code.
    #[error("Unexpected HTTP status {status}: {context}: {body}")]
    HttpStatus {
        /// Human-readable context.
        context: &'static str,
        /// The HTTP status code.
        status: StatusCode,
        /// The response body.
        body: String,
    },
    /// Failed to read response body.
    #[error("Failed to read response body as text: {context}: {source}")]
    ResponseBodyRead {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
}

impl ApiClientError {
    /// The HTTP status of the failed call, if a response was received.
    #[must_use]
    pub const fn status(&self) -> Option<StatusCode> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<ApiClientError> for IcpayError {
    fn from(err: ApiClientError) -> Self {
        match &err {
            ApiClientError::Http { .. } | ApiClientError::ResponseBodyRead { .. } => Self::Network {
                message: err.to_string(),
            },
            ApiClientError::UrlParse { .. } | ApiClientError::InvalidHeader { .. } => {
                Self::invalid_config(err.to_string())
            }
            ApiClientError::HttpStatus { status, body, .. } => Self::Api {
                status: Some(status.as_u16()),
                message: api_message(body).unwrap_or_else(|| err.to_string()),
            },
            ApiClientError::JsonDeserialization { .. } => Self::Api {
                status: None,
                message: err.to_string(),
            },
        }
    }
}

/// Extracts `message` (or `error`) from a JSON error body.
fn api_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .or_else(|| value.get("error"))
        .and_then(serde_json::Value::as_str)
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use icpay::ErrorCode;

    #[test]
    fn status_errors_become_api_errors_with_body_message() {
        let err: IcpayError = ApiClientError::HttpStatus {
            context: "GET /accounts/info",
            status: StatusCode::UNAUTHORIZED,
            body: r#"{"message":"invalid key"}"#.into(),
        }
        .into();
        assert_eq!(err.code(), ErrorCode::ApiError);
        match err {
            IcpayError::Api { status, message } => {
                assert_eq!(status, Some(401));
                assert_eq!(message, "invalid key");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn plain_bodies_keep_the_full_description() {
        let err: IcpayError = ApiClientError::HttpStatus {
            context: "GET /ledgers/verified",
            status: StatusCode::BAD_GATEWAY,
            body: "upstream down".into(),
        }
        .into();
        assert!(err.to_string().contains("upstream down"));
    }
}
