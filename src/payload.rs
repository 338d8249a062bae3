//! Builds the submission body for a try-on job.

use crate::config::ClientConfig;
use crate::error::{Result, TryOnError};
use crate::types::{
    FileData, FileMeta, GenerationParams, ImageAsset, ImageReference, JobInput, JobRequest,
};

/// Largest integer an `f64` represents exactly.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// How the two images enter the request.
#[derive(Debug, Clone, Copy)]
pub enum PayloadVariant<'a> {
    /// Both images inline as data URLs, nothing else.
    Inline,
    /// Both images already uploaded, followed by the generation parameters.
    Uploaded {
        /// Handle returned for the body image.
        body: &'a ImageReference,
        /// Handle returned for the clothing image.
        clothing: &'a ImageReference,
        /// Fixed generation parameters.
        params: &'a GenerationParams,
        /// Endpoint the files were uploaded to.
        base_url: &'a str,
    },
}

/// Builds [`JobRequest`]s.
#[derive(Debug, Clone, Default)]
pub struct PayloadBuilder {
    fn_index: Option<u32>,
    api_name: Option<String>,
}

impl PayloadBuilder {
    /// Creates a builder that targets the backend's default function.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder using the function index and name from `config`.
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            fn_index: config.fn_index(),
            api_name: config.api_name().map(str::to_string),
        }
    }

    /// Builds the request for one job attempt.
    ///
    /// Always mints a new session hash, so two calls with identical inputs
    /// never produce the same request.
    pub fn build(
        &self,
        body: &ImageAsset,
        clothing: &ImageAsset,
        variant: PayloadVariant<'_>,
    ) -> Result<JobRequest> {
        ensure_not_empty(body, "body")?;
        ensure_not_empty(clothing, "clothing")?;

        let data = match variant {
            PayloadVariant::Inline => vec![
                JobInput::File(inline_file(body)),
                JobInput::File(inline_file(clothing)),
            ],
            PayloadVariant::Uploaded {
                body: body_ref,
                clothing: clothing_ref,
                params,
                base_url,
            } => vec![
                JobInput::File(uploaded_file(body, body_ref, base_url)?),
                JobInput::File(uploaded_file(clothing, clothing_ref, base_url)?),
                JobInput::Integer(u64::from(params.image_count)),
                JobInput::Integer(u64::from(params.steps)),
                guidance_input(params.guidance_scale),
                JobInput::Integer(params.seed),
            ],
        };

        Ok(JobRequest {
            data,
            fn_index: self.fn_index,
            session_hash: new_session_hash(),
            api_name: self.api_name.clone(),
        })
    }
}

/// Mints a session identifier: 128 random bits as lowercase hex.
pub fn new_session_hash() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Whole-valued guidance is sent as an integer (`2`, not `2.0`).
fn guidance_input(scale: f64) -> JobInput {
    if scale.fract() == 0.0 && (0.0..=MAX_EXACT_INTEGER).contains(&scale) {
        JobInput::Integer(scale as u64)
    } else {
        JobInput::Float(scale)
    }
}

fn ensure_not_empty(asset: &ImageAsset, role: &str) -> Result<()> {
    if asset.is_empty() {
        return Err(TryOnError::InvalidInput(format!("{role} image is empty")));
    }
    Ok(())
}

fn inline_file(asset: &ImageAsset) -> FileData {
    FileData {
        path: None,
        url: ImageReference::inline(asset).to_data_url(),
        orig_name: asset.filename().to_string(),
        size: Some(asset.size()),
        mime_type: asset.mime_type().to_string(),
        is_stream: false,
        meta: FileMeta::default(),
    }
}

fn uploaded_file(asset: &ImageAsset, reference: &ImageReference, base_url: &str) -> Result<FileData> {
    let path = match reference {
        ImageReference::UploadedHandle(path) if !path.is_empty() => path,
        _ => {
            return Err(TryOnError::InvalidInput(format!(
                "{} must be uploaded before it can be referenced",
                asset.filename()
            )))
        }
    };

    Ok(FileData {
        path: Some(path.clone()),
        url: Some(format!("{base_url}/file={path}")),
        orig_name: asset.filename().to_string(),
        size: Some(asset.size()),
        mime_type: asset.mime_type().to_string(),
        is_stream: false,
        meta: FileMeta::default(),
    })
}
