use serde_json::Value;
use thiserror::Error;

/// Error types for the on-ramp SDK
#[derive(Error, Debug)]
pub enum SdkError {
    /// The payment service could not be reached
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The payment service answered with a non-success status.
    ///
    /// `message` is the server payload rendered for display, or a generic
    /// `API error: <status>` when the body carried nothing usable.
    #[error("{message}")]
    ApiError {
        status: u16,
        message: String,
        payload: Option<Value>,
    },

    /// Confirm was invoked without a selected quote
    #[error("No quote selected")]
    NoQuoteSelected,

    /// Confirm was invoked without a quote batch to take the state token from
    #[error("No quote batch available")]
    NoQuoteBatch,

    /// The quote batch is past its `accept_by` deadline
    #[error("Quote expired at {0}")]
    QuoteExpired(String),

    /// The service answered successfully but the body was not what we expected
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Error raised by the external browser surface
    #[error("Browser error: {0}")]
    BrowserError(String),

    /// Error raised by the wallet while signing
    #[error("Signing error: {0}")]
    SigningError(String),

    /// The SDK has been disconnected
    #[error("SDK has been shut down")]
    ShutDown,

    /// Generic error with a message
    #[error("Generic error: {0}")]
    GenericError(String),
}

impl SdkError {
    /// Builds an [SdkError::ApiError] from a raw response body.
    ///
    /// JSON bodies are kept as the payload and pretty-printed for display.
    /// A non-JSON body is shown verbatim. Empty bodies and empty JSON values
    /// (null, "", {}, []) fall back to `API error: <status>`.
    pub fn api(status: u16, body: &str) -> Self {
        let fallback = || format!("API error: {status}");
        let (message, payload) = match serde_json::from_str::<Value>(body) {
            Ok(value) if is_empty_json(&value) => (fallback(), None),
            Ok(Value::String(text)) => (text.clone(), Some(Value::String(text))),
            Ok(value) => (
                serde_json::to_string_pretty(&value).unwrap_or_else(|_| fallback()),
                Some(value),
            ),
            Err(_) if !body.trim().is_empty() => (body.trim().to_string(), None),
            Err(_) => (fallback(), None),
        };

        SdkError::ApiError {
            status,
            message,
            payload,
        }
    }

    /// Whether the failure happened before the service produced an answer
    pub fn is_transport(&self) -> bool {
        matches!(self, SdkError::NetworkError(_))
    }
}

fn is_empty_json(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

impl From<reqwest::Error> for SdkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SdkError::InvalidResponse(err.to_string())
        } else {
            SdkError::NetworkError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SdkError {
    fn from(err: serde_json::Error) -> Self {
        SdkError::InvalidResponse(err.to_string())
    }
}

impl From<std::io::Error> for SdkError {
    fn from(err: std::io::Error) -> Self {
        SdkError::GenericError(err.to_string())
    }
}
