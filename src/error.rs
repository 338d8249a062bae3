//! Error types for try-on jobs.
//!
//! Every failure a job can end in is one of the [`TryOnError`] variants below.
//! Status codes, transport errors and backend messages are mapped onto them
//! by the `classify` module, never at the call site.

use serde::{Deserialize, Serialize};

/// Longest backend-provided message we surface verbatim.
const MAX_MESSAGE_LEN: usize = 300;

/// Errors that can end a try-on job.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TryOnError {
    /// An input image is missing or empty.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The client is missing required configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An image could not be uploaded to the backend.
    #[error("upload failed: {0}")]
    UploadFailed(String),

    /// The backend answered with something this client does not understand.
    #[error("invalid response from server: {0}")]
    Protocol(String),

    /// The job finished without producing an image.
    #[error("empty response from server, the AI service returned no result")]
    EmptyResult,

    /// Inline image data could not be decoded.
    #[error("failed to decode result image: {0}")]
    Decode(String),

    /// The result image could not be downloaded.
    #[error("failed to download result image (HTTP {status})")]
    DownloadFailed {
        /// HTTP status of the download response.
        status: u16,
    },

    /// HTTP 429.
    #[error("rate limit reached, please wait a minute and try again")]
    RateLimited,

    /// HTTP 503.
    #[error("AI service is busy, please try again in a moment")]
    ServiceBusy,

    /// HTTP 500.
    #[error("server error, the AI service may be temporarily down")]
    ServerError,

    /// Any other non-success HTTP status.
    #[error("server error: HTTP {0}")]
    ServerErrorWithCode(u16),

    /// HTTP 404.
    #[error("API endpoint not found, please check the configured URL")]
    EndpointNotFound,

    /// Host name could not be resolved or no connection could be made.
    #[error("cannot reach {0}, check the internet connection and the configured URL")]
    NetworkUnreachable(String),

    /// Read or write timed out.
    #[error("timeout: the AI service is taking too long, please try again")]
    Timeout,

    /// Generic I/O failure.
    #[error("network error: {0}")]
    Network(String),

    /// The backend reports that a service it depends on is unavailable.
    #[error("the AI service is currently unavailable, wait 2-3 minutes and try again")]
    ServiceUnavailableUpstream,

    /// Anything the classifier could not place.
    #[error("error: {0}, please try again")]
    Unknown(String),
}

/// Fieldless view of [`TryOnError`] for programmatic matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// See [`TryOnError::InvalidInput`].
    InvalidInput,
    /// See [`TryOnError::Configuration`].
    ConfigurationError,
    /// See [`TryOnError::UploadFailed`].
    UploadFailed,
    /// See [`TryOnError::Protocol`].
    ProtocolError,
    /// See [`TryOnError::EmptyResult`].
    EmptyResult,
    /// See [`TryOnError::Decode`].
    DecodeError,
    /// See [`TryOnError::DownloadFailed`].
    DownloadFailed,
    /// See [`TryOnError::RateLimited`].
    RateLimited,
    /// See [`TryOnError::ServiceBusy`].
    ServiceBusy,
    /// See [`TryOnError::ServerError`].
    ServerError,
    /// See [`TryOnError::ServerErrorWithCode`].
    ServerErrorWithCode,
    /// See [`TryOnError::EndpointNotFound`].
    EndpointNotFound,
    /// See [`TryOnError::NetworkUnreachable`].
    NetworkUnreachable,
    /// See [`TryOnError::Timeout`].
    Timeout,
    /// See [`TryOnError::Network`].
    NetworkError,
    /// See [`TryOnError::ServiceUnavailableUpstream`].
    ServiceUnavailableUpstream,
    /// See [`TryOnError::Unknown`].
    Unknown,
}

impl TryOnError {
    /// Returns the category of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidInput(_) => ErrorCategory::InvalidInput,
            Self::Configuration(_) => ErrorCategory::ConfigurationError,
            Self::UploadFailed(_) => ErrorCategory::UploadFailed,
            Self::Protocol(_) => ErrorCategory::ProtocolError,
            Self::EmptyResult => ErrorCategory::EmptyResult,
            Self::Decode(_) => ErrorCategory::DecodeError,
            Self::DownloadFailed { .. } => ErrorCategory::DownloadFailed,
            Self::RateLimited => ErrorCategory::RateLimited,
            Self::ServiceBusy => ErrorCategory::ServiceBusy,
            Self::ServerError => ErrorCategory::ServerError,
            Self::ServerErrorWithCode(_) => ErrorCategory::ServerErrorWithCode,
            Self::EndpointNotFound => ErrorCategory::EndpointNotFound,
            Self::NetworkUnreachable(_) => ErrorCategory::NetworkUnreachable,
            Self::Timeout => ErrorCategory::Timeout,
            Self::Network(_) => ErrorCategory::NetworkError,
            Self::ServiceUnavailableUpstream => ErrorCategory::ServiceUnavailableUpstream,
            Self::Unknown(_) => ErrorCategory::Unknown,
        }
    }

    /// Returns true if a caller re-running the whole job later may succeed.
    ///
    /// Nothing inside this crate retries; this is a hint for callers.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited
                | Self::ServiceBusy
                | Self::Timeout
                | Self::Network(_)
                | Self::ServiceUnavailableUpstream
        )
    }

    /// Returns true if the endpoint itself looks unusable, so a different
    /// endpoint is worth trying.
    pub fn is_endpoint_failure(&self) -> bool {
        matches!(self, Self::NetworkUnreachable(_) | Self::EndpointNotFound)
    }
}

impl From<reqwest::Error> for TryOnError {
    fn from(err: reqwest::Error) -> Self {
        crate::classify::from_reqwest(&err)
    }
}

impl From<serde_json::Error> for TryOnError {
    fn from(err: serde_json::Error) -> Self {
        crate::classify::from_transport(crate::classify::TransportFailure::MalformedBody, &err.to_string())
    }
}

/// Normalizes backend-provided text before it reaches a user.
///
/// Collapses runs of whitespace and truncates overly long messages so that a
/// whole HTML error page or traceback never ends up in a message.
pub fn sanitize_error_message(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= MAX_MESSAGE_LEN {
        return collapsed;
    }
    let mut truncated: String = collapsed.chars().take(MAX_MESSAGE_LEN).collect();
    truncated.push_str("...");
    truncated
}

/// Result type alias for try-on operations.
pub type Result<T> = std::result::Result<T, TryOnError>;
