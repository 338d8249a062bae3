//! Upload-then-reference protocol: images are uploaded first and the
//! submission refers to them by backend path.

use super::{Protocol, UploadedPair};
use crate::error::{Result, TryOnError};
use crate::payload::PayloadVariant;
use crate::transport::HttpResponse;
use crate::types::{GenerationParams, ImageReference, JobHandle, JobRequest};

/// Uploads both images, sends the fixed generation parameters and keys the
/// stream by the session hash.
#[derive(Debug, Clone, Copy, Default)]
pub struct UploadReferenceProtocol {
    params: GenerationParams,
}

impl UploadReferenceProtocol {
    /// Creates the strategy with the given generation parameters.
    pub fn new(params: GenerationParams) -> Self {
        Self { params }
    }

    /// Generation parameters appended to every request.
    pub fn params(&self) -> &GenerationParams {
        &self.params
    }
}

impl Protocol for UploadReferenceProtocol {
    fn name(&self) -> &'static str {
        "upload-reference"
    }

    fn requires_upload(&self) -> bool {
        true
    }

    fn payload<'a>(
        &'a self,
        uploaded: Option<&'a UploadedPair>,
        base_url: &'a str,
    ) -> Result<PayloadVariant<'a>> {
        let uploaded = uploaded.ok_or_else(|| {
            TryOnError::InvalidInput("images must be uploaded before submitting".into())
        })?;
        Ok(PayloadVariant::Uploaded {
            body: &uploaded.body,
            clothing: &uploaded.clothing,
            params: self.params(),
            base_url,
        })
    }

    fn job_handle(&self, _event_id: &str, request: &JobRequest) -> JobHandle {
        JobHandle::SessionHash(request.session_hash.clone())
    }

    fn file_url(&self, base_url: &str, path: &str) -> String {
        format!("{base_url}/file={path}")
    }
}

/// Reads the handle out of an upload response.
///
/// The backend answers with a JSON array of stored paths; the first one is
/// the file we sent.
pub fn parse_upload_response(response: &HttpResponse, role: &str) -> Result<ImageReference> {
    if !response.is_success() {
        return Err(TryOnError::UploadFailed(format!(
            "{role} image rejected with HTTP {}",
            response.status
        )));
    }

    let paths: Vec<String> = serde_json::from_slice(&response.body).map_err(|e| {
        TryOnError::UploadFailed(format!("{role} image: unreadable upload response: {e}"))
    })?;

    paths
        .into_iter()
        .next()
        .filter(|path| !path.trim().is_empty())
        .map(ImageReference::UploadedHandle)
        .ok_or_else(|| TryOnError::UploadFailed(format!("{role} image: no file path returned")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_is_session_hash() {
        let request = JobRequest {
            data: Vec::new(),
            fn_index: None,
            session_hash: "feedbeef".into(),
            api_name: None,
        };
        let handle = UploadReferenceProtocol::default().job_handle("evt-9", &request);
        assert_eq!(handle, JobHandle::SessionHash("feedbeef".into()));
    }

    #[test]
    fn test_file_url() {
        assert_eq!(
            UploadReferenceProtocol::default().file_url("http://localhost:7860", "/tmp/gradio/x.png"),
            "http://localhost:7860/file=/tmp/gradio/x.png"
        );
    }

    #[test]
    fn test_payload_requires_uploads() {
        let protocol = UploadReferenceProtocol::default();
        let err = protocol.payload(None, "http://h").unwrap_err();
        assert!(matches!(err, TryOnError::InvalidInput(_)));

        let pair = UploadedPair {
            body: ImageReference::UploadedHandle("/a".into()),
            clothing: ImageReference::UploadedHandle("/b".into()),
        };
        let variant = protocol.payload(Some(&pair), "http://h").unwrap();
        assert!(matches!(variant, PayloadVariant::Uploaded { .. }));
    }

    #[test]
    fn test_payload_carries_params() {
        let custom = GenerationParams {
            image_count: 2,
            steps: 35,
            guidance_scale: 3.5,
            seed: 1234,
        };
        let protocol = UploadReferenceProtocol::new(custom);
        assert_eq!(protocol.params(), &custom);

        let pair = UploadedPair {
            body: ImageReference::UploadedHandle("/a".into()),
            clothing: ImageReference::UploadedHandle("/b".into()),
        };
        match protocol.payload(Some(&pair), "http://h").unwrap() {
            PayloadVariant::Uploaded { params, .. } => assert_eq!(params, &custom),
            other => panic!("Expected uploaded payload, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_upload_response() {
        let response = HttpResponse::new(200, r#"["/tmp/gradio/abc/body.jpg"]"#);
        assert_eq!(
            parse_upload_response(&response, "body").unwrap(),
            ImageReference::UploadedHandle("/tmp/gradio/abc/body.jpg".into())
        );
    }

    #[test]
    fn test_parse_upload_response_failures() {
        for response in [
            HttpResponse::new(500, "oops"),
            HttpResponse::new(200, "[]"),
            HttpResponse::new(200, r#"[""]"#),
            HttpResponse::new(200, "{}"),
        ] {
            let err = parse_upload_response(&response, "clothing").unwrap_err();
            assert!(matches!(err, TryOnError::UploadFailed(_)), "{err:?}");
        }
    }
}
