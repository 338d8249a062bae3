//! Turns the stream's image reference into image bytes.

use crate::error::{Result, TryOnError};
use crate::protocol::Protocol;
use crate::transport::Transport;
use crate::types::ImageReference;
use base64::Engine;

/// Resolves references against the endpoint a job ran on.
pub struct ResultResolver<'a> {
    transport: &'a dyn Transport,
    protocol: &'a dyn Protocol,
    base_url: &'a str,
}

impl<'a> ResultResolver<'a> {
    /// Creates a resolver. `protocol` must be the one the job was submitted
    /// with, since it decides how relative paths are rewritten.
    pub fn new(transport: &'a dyn Transport, protocol: &'a dyn Protocol, base_url: &'a str) -> Self {
        Self {
            transport,
            protocol,
            base_url,
        }
    }

    /// URL a non-inline reference is downloaded from.
    pub fn download_url(&self, reference: &ImageReference) -> Option<String> {
        match reference {
            ImageReference::InlineDataUrl { .. } => None,
            ImageReference::RemotePath(path) | ImageReference::UploadedHandle(path) => {
                if is_absolute_url(path) {
                    Some(path.clone())
                } else {
                    Some(self.protocol.file_url(self.base_url, path))
                }
            }
        }
    }

    /// Produces the image bytes, decoding inline data or downloading.
    pub async fn resolve(&self, reference: &ImageReference) -> Result<Vec<u8>> {
        let url = match (reference, self.download_url(reference)) {
            (ImageReference::InlineDataUrl { data, .. }, _) => return decode_base64(data),
            (_, Some(url)) => url,
            (_, None) => return Err(TryOnError::EmptyResult),
        };

        tracing::debug!(url = %url, "downloading result image");
        let response = self.transport.get(&url).await?;
        if !response.is_success() {
            return Err(TryOnError::DownloadFailed {
                status: response.status,
            });
        }
        if response.body.is_empty() {
            return Err(TryOnError::EmptyResult);
        }
        Ok(response.body)
    }
}

fn is_absolute_url(reference: &str) -> bool {
    let lower = reference.get(..8).unwrap_or(reference).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Decodes base64 that may carry whitespace or lack padding.
fn decode_base64(input: &str) -> Result<Vec<u8>> {
    let cleaned: String = input.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if cleaned.is_empty() {
        return Err(TryOnError::Decode("inline image has no data".into()));
    }

    base64::engine::general_purpose::STANDARD
        .decode(&cleaned)
        .or_else(|_| base64::engine::general_purpose::STANDARD_NO_PAD.decode(&cleaned))
        .map_err(|e| TryOnError::Decode(e.to_string()))
}
