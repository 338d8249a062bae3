//! Inline data protocol: images travel as base64 data URLs.

use super::{Protocol, UploadedPair};
use crate::error::Result;
use crate::payload::PayloadVariant;
use crate::types::{JobHandle, JobRequest};

/// Sends both images inline and keys the stream by the returned event id.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineDataProtocol;

impl Protocol for InlineDataProtocol {
    fn name(&self) -> &'static str {
        "inline-data"
    }

    fn requires_upload(&self) -> bool {
        false
    }

    fn payload<'a>(
        &'a self,
        _uploaded: Option<&'a UploadedPair>,
        _base_url: &'a str,
    ) -> Result<PayloadVariant<'a>> {
        Ok(PayloadVariant::Inline)
    }

    fn job_handle(&self, event_id: &str, _request: &JobRequest) -> JobHandle {
        JobHandle::EventId(event_id.to_string())
    }

    fn file_url(&self, base_url: &str, path: &str) -> String {
        if path.starts_with('/') {
            format!("{base_url}{path}")
        } else {
            format!("{base_url}/{path}")
        }
    }
}
