//! Maps HTTP statuses, transport failures and free-text messages onto
//! [`TryOnError`].
//!
//! Pure functions, no I/O. Every fallible boundary of a job converts its
//! failure through one of these before the job advances or ends.

use crate::error::{sanitize_error_message, TryOnError};
use std::error::Error as _;

/// Kinds of transport-level failure the classifier distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailure {
    /// DNS lookup failed.
    NameResolution,
    /// A read or write timed out.
    Timeout,
    /// Any other I/O failure (reset, refused, broken pipe).
    Io,
    /// The body arrived but could not be decoded.
    MalformedBody,
}

/// Maps a non-success HTTP status code to an error.
///
/// Only meaningful for non-2xx codes; callers check success first.
pub fn from_status(status: u16) -> TryOnError {
    match status {
        429 => TryOnError::RateLimited,
        503 => TryOnError::ServiceBusy,
        500 => TryOnError::ServerError,
        404 => TryOnError::EndpointNotFound,
        other => TryOnError::ServerErrorWithCode(other),
    }
}

/// Maps a transport failure kind to an error.
///
/// `detail` is the host for [`TransportFailure::NameResolution`] and a short
/// cause otherwise.
pub fn from_transport(kind: TransportFailure, detail: &str) -> TryOnError {
    match kind {
        TransportFailure::NameResolution => TryOnError::NetworkUnreachable(detail.to_string()),
        TransportFailure::Timeout => TryOnError::Timeout,
        TransportFailure::Io => TryOnError::Network(sanitize_error_message(detail)),
        TransportFailure::MalformedBody => TryOnError::Protocol(sanitize_error_message(detail)),
    }
}

/// Classifies an error that carries only a message.
pub fn from_message(message: &str) -> TryOnError {
    let lower = message.to_lowercase();
    if lower.contains("429") || lower.contains("rate limit") {
        TryOnError::RateLimited
    } else if lower.contains("503") || lower.contains("busy") {
        TryOnError::ServiceBusy
    } else if lower.contains("unavailable") {
        TryOnError::ServiceUnavailableUpstream
    } else if message.trim().is_empty() {
        TryOnError::Unknown("unknown error".into())
    } else {
        TryOnError::Unknown(sanitize_error_message(message))
    }
}

/// Works out which [`TransportFailure`] a reqwest error represents.
pub fn transport_failure_of(err: &reqwest::Error) -> TransportFailure {
    if err.is_timeout() || is_io_timeout(err) {
        return TransportFailure::Timeout;
    }
    if err.is_decode() {
        return TransportFailure::MalformedBody;
    }
    if err.is_connect() && is_dns_failure(err) {
        return TransportFailure::NameResolution;
    }
    TransportFailure::Io
}

/// Classifies a reqwest error.
pub fn from_reqwest(err: &reqwest::Error) -> TryOnError {
    let kind = transport_failure_of(err);
    let detail = match kind {
        TransportFailure::NameResolution => err
            .url()
            .and_then(|u| u.host_str())
            .unwrap_or("the configured host")
            .to_string(),
        _ => root_cause(err),
    };
    tracing::debug!(?kind, "classified transport failure");
    from_transport(kind, &detail)
}

fn is_io_timeout(err: &reqwest::Error) -> bool {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::TimedOut {
                return true;
            }
        }
        source = cause.source();
    }
    false
}

fn is_dns_failure(err: &reqwest::Error) -> bool {
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string().to_lowercase();
        if text.contains("dns error")
            || text.contains("failed to lookup address")
            || text.contains("name or service not known")
            || text.contains("no such host")
        {
            return true;
        }
        source = cause.source();
    }
    false
}

/// Innermost cause of an error, which unlike reqwest's top-level message
/// does not include the request URL.
fn root_cause(err: &reqwest::Error) -> String {
    let mut cause: &dyn std::error::Error = err;
    while let Some(next) = cause.source() {
        cause = next;
    }
    cause.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::error::ErrorCategory;
    use crate::transport::{HttpTransport, Transport};
    use std::time::Duration;

    #[test]
    fn test_from_status() {
        assert_eq!(from_status(429), TryOnError::RateLimited);
        assert_eq!(from_status(503), TryOnError::ServiceBusy);
        assert_eq!(from_status(500), TryOnError::ServerError);
        assert_eq!(from_status(404), TryOnError::EndpointNotFound);
        assert_eq!(from_status(502), TryOnError::ServerErrorWithCode(502));
        assert_eq!(from_status(401), TryOnError::ServerErrorWithCode(401));
    }

    #[test]
    fn test_from_transport() {
        assert_eq!(
            from_transport(TransportFailure::NameResolution, "abc.gradio.live"),
            TryOnError::NetworkUnreachable("abc.gradio.live".into())
        );
        assert_eq!(
            from_transport(TransportFailure::Timeout, "read timed out"),
            TryOnError::Timeout
        );
        assert_eq!(
            from_transport(TransportFailure::Io, "connection reset").category(),
            ErrorCategory::NetworkError
        );
        assert_eq!(
            from_transport(TransportFailure::MalformedBody, "expected value").category(),
            ErrorCategory::ProtocolError
        );
    }

    #[test]
    fn test_from_message_rate_limit() {
        assert_eq!(from_message("HTTP 429 Too Many Requests"), TryOnError::RateLimited);
        assert_eq!(from_message("Rate Limit exceeded"), TryOnError::RateLimited);
    }

    #[test]
    fn test_from_message_busy() {
        assert_eq!(from_message("got 503 from upstream"), TryOnError::ServiceBusy);
        assert_eq!(from_message("GPU is BUSY"), TryOnError::ServiceBusy);
    }

    #[test]
    fn test_from_message_unavailable() {
        assert_eq!(
            from_message("The upstream Space is Unavailable"),
            TryOnError::ServiceUnavailableUpstream
        );
    }

    #[test]
    fn test_from_message_unknown() {
        assert_eq!(
            from_message("CUDA out of memory"),
            TryOnError::Unknown("CUDA out of memory".into())
        );
        assert_eq!(from_message("  "), TryOnError::Unknown("unknown error".into()));
    }

    #[test]
    fn test_from_message_priority() {
        // Rate limit wins over busy when both appear.
        assert_eq!(from_message("429: service busy"), TryOnError::RateLimited);
    }

    fn transport(io_timeout: Duration) -> HttpTransport {
        let config = ClientConfig::builder()
            .base_url("http://localhost:7860")
            .fallback_urls(Vec::<String>::new())
            .io_timeout(io_timeout)
            .build()
            .unwrap();
        HttpTransport::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_unresolvable_host_is_network_unreachable() {
        let err = transport(Duration::from_secs(5))
            .get("http://tryon-does-not-exist.invalid/queue/data")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            TryOnError::NetworkUnreachable("tryon-does-not-exist.invalid".into())
        );
        assert!(err.is_endpoint_failure());
    }

    #[tokio::test]
    async fn test_silent_server_is_timeout() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let err = transport(Duration::from_millis(50))
            .get(&format!("http://{addr}/queue/data"))
            .await
            .unwrap_err();
        assert_eq!(err, TryOnError::Timeout);
    }

    #[tokio::test]
    async fn test_refused_connection_is_network_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = transport(Duration::from_secs(5))
            .get(&format!("http://{addr}/queue/data"))
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::NetworkError);
    }

    #[test]
    fn test_serde_error_is_protocol_error() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let classified: TryOnError = err.into();
        assert_eq!(classified.category(), ErrorCategory::ProtocolError);
    }
}
