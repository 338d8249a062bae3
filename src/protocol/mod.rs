//! Backend protocol strategies.
//!
//! The two payload conventions share one job state machine and differ only
//! in the decisions captured by [`Protocol`].

mod inline;
mod upload;

pub use inline::InlineDataProtocol;
pub use upload::{parse_upload_response, UploadReferenceProtocol};

use crate::config::ProtocolVariant;
use crate::error::Result;
use crate::payload::PayloadVariant;
use crate::types::{ImageReference, JobHandle, JobRequest};
use std::sync::Arc;

/// Handles returned by the upload step, body first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedPair {
    /// Handle of the body image.
    pub body: ImageReference,
    /// Handle of the clothing image.
    pub clothing: ImageReference,
}

/// What differs between backend payload conventions.
pub trait Protocol: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Returns true if both images must be uploaded before submitting.
    fn requires_upload(&self) -> bool;

    /// Chooses how the images enter the request.
    ///
    /// `uploaded` is `Some` exactly when [`Protocol::requires_upload`] is true.
    fn payload<'a>(
        &'a self,
        uploaded: Option<&'a UploadedPair>,
        base_url: &'a str,
    ) -> Result<PayloadVariant<'a>>;

    /// Picks the handle that keys the result stream.
    fn job_handle(&self, event_id: &str, request: &JobRequest) -> JobHandle;

    /// Turns a backend-relative file path into a downloadable URL.
    fn file_url(&self, base_url: &str, path: &str) -> String;
}

/// Returns the strategy for a configured variant.
pub fn for_variant(variant: &ProtocolVariant) -> Arc<dyn Protocol> {
    match variant {
        ProtocolVariant::InlineData => Arc::new(InlineDataProtocol),
        ProtocolVariant::UploadReference(params) => Arc::new(UploadReferenceProtocol::new(*params)),
    }
}
