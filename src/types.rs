//! Core types for try-on jobs.

use crate::error::TryOnError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Supported image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// PNG format (lossless).
    Png,
    /// JPEG format (lossy).
    Jpeg,
    /// WebP format.
    WebP,
}

impl ImageFormat {
    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::WebP => "webp",
        }
    }

    /// Returns the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
        }
    }

    /// Attempts to detect format from file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Detects image format from magic bytes.
    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        // PNG: 89 50 4E 47 0D 0A 1A 0A
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(Self::Png);
        }

        // JPEG: FF D8 FF
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::Jpeg);
        }

        // WebP: RIFF....WEBP
        if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            return Some(Self::WebP);
        }

        None
    }
}

/// A captured input image: raw bytes plus what we know about them.
///
/// Produced by whatever acquires the picture (camera, gallery, bundled
/// sample). Never modified after construction.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageAsset {
    data: Vec<u8>,
    mime_type: String,
    filename: String,
}

impl ImageAsset {
    /// Creates an asset with an explicit MIME type.
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            data,
            mime_type: mime_type.into(),
            filename: filename.into(),
        }
    }

    /// Creates an asset, inferring the MIME type from magic bytes, then from
    /// the filename extension, then defaulting to JPEG.
    pub fn from_bytes(data: Vec<u8>, filename: impl Into<String>) -> Self {
        let filename = filename.into();
        let format = ImageFormat::from_magic_bytes(&data)
            .or_else(|| {
                filename
                    .rsplit_once('.')
                    .and_then(|(_, ext)| ImageFormat::from_extension(ext))
            })
            .unwrap_or(ImageFormat::Jpeg);
        Self::new(data, format.mime_type(), filename)
    }

    /// Raw image bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Declared MIME type.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Declared original filename.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Size of the image data in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Returns true if there are no bytes to send.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl std::fmt::Debug for ImageAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageAsset")
            .field("size", &self.data.len())
            .field("mime_type", &self.mime_type)
            .field("filename", &self.filename)
            .finish()
    }
}

/// Where an image lives, as far as the backend is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageReference {
    /// Image carried inline as a base64 `data:` URL.
    InlineDataUrl {
        /// MIME type from the URL header.
        mime: String,
        /// Base64 payload after the `base64,` marker.
        data: String,
    },
    /// Absolute URL or backend-relative file path.
    RemotePath(String),
    /// Path the backend assigned to a file we uploaded.
    UploadedHandle(String),
}

impl ImageReference {
    /// Wraps an asset's bytes as an inline data URL reference.
    pub fn inline(asset: &ImageAsset) -> Self {
        use base64::Engine;
        Self::InlineDataUrl {
            mime: asset.mime_type().to_string(),
            data: base64::engine::general_purpose::STANDARD.encode(asset.data()),
        }
    }

    /// Interprets a reference string found in a backend response.
    ///
    /// Returns `None` for empty strings and the literal `null`.
    pub fn parse(reference: &str) -> Option<Self> {
        let reference = reference.trim();
        if reference.is_empty() || reference == "null" {
            return None;
        }
        if let Some(rest) = reference.strip_prefix("data:") {
            let (header, data) = rest.split_once(',').unwrap_or((rest, ""));
            let mime = header.trim_end_matches(";base64");
            return Some(Self::InlineDataUrl {
                mime: mime.to_string(),
                data: data.to_string(),
            });
        }
        Some(Self::RemotePath(reference.to_string()))
    }

    /// Renders inline references as a `data:<mime>;base64,<payload>` URL.
    pub fn to_data_url(&self) -> Option<String> {
        match self {
            Self::InlineDataUrl { mime, data } => Some(format!("data:{mime};base64,{data}")),
            _ => None,
        }
    }
}

/// Fixed generation parameters sent by the upload-then-reference protocol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Number of images to generate.
    pub image_count: u32,
    /// Denoising step count.
    pub steps: u32,
    /// Classifier-free guidance scale.
    pub guidance_scale: f64,
    /// Seed for deterministic generation.
    pub seed: u64,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            image_count: 1,
            steps: 20,
            guidance_scale: 2.0,
            seed: 42,
        }
    }
}

/// Gradio `FileData` marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    #[serde(rename = "_type")]
    kind: String,
}

impl Default for FileMeta {
    fn default() -> Self {
        Self {
            kind: "gradio.FileData".into(),
        }
    }
}

/// File descriptor as the backend expects it inside `data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileData {
    /// Backend path of an uploaded file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// URL of the file; a `data:` URL for inline images.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Original filename.
    pub orig_name: String,
    /// Size in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    /// MIME type.
    pub mime_type: String,
    /// Always false for still images.
    #[serde(default)]
    pub is_stream: bool,
    /// Type marker.
    #[serde(default)]
    pub meta: FileMeta,
}

/// One positional entry of [`JobRequest::data`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobInput {
    /// An image descriptor.
    File(FileData),
    /// An integer parameter.
    Integer(u64),
    /// A floating point parameter.
    Float(f64),
}

impl JobInput {
    /// Returns the file descriptor if this entry is an image.
    pub fn as_file(&self) -> Option<&FileData> {
        match self {
            Self::File(file) => Some(file),
            _ => None,
        }
    }
}

/// The body sent to the submit endpoint.
///
/// Built once per attempt and never mutated. Parameter order inside `data` is
/// part of the backend contract.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRequest {
    /// Positional inputs.
    pub data: Vec<JobInput>,
    /// Index of the backend function, if the backend needs it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fn_index: Option<u32>,
    /// Client-generated session identifier.
    pub session_hash: String,
    /// Named backend endpoint, if the backend needs it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_name: Option<String>,
}

/// Identifier returned by the submit step that keys the result stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobHandle {
    /// The backend-assigned event id.
    EventId(String),
    /// The session hash sent with the request.
    SessionHash(String),
}

impl JobHandle {
    /// Value sent to the stream endpoint.
    pub fn as_str(&self) -> &str {
        match self {
            Self::EventId(id) | Self::SessionHash(id) => id,
        }
    }
}

impl std::fmt::Display for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EventId(id) => write!(f, "event:{id}"),
            Self::SessionHash(hash) => write!(f, "session:{hash}"),
        }
    }
}

/// Details about a finished job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobMetadata {
    /// Endpoint the job ran against.
    pub endpoint: String,
    /// Session identifier minted for the job.
    pub session_hash: String,
    /// Handle the result stream was keyed by.
    pub handle: JobHandle,
    /// Wall-clock time of the whole job.
    pub duration: Duration,
}

/// The final try-on image.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "try-on image should be displayed or stored"]
pub struct TryOnImage {
    /// Raw image bytes.
    pub data: Vec<u8>,
    /// Format detected from magic bytes, if recognized.
    pub format: Option<ImageFormat>,
    /// Job details.
    pub metadata: JobMetadata,
}

impl TryOnImage {
    /// Creates a result image, detecting the format from magic bytes.
    pub fn new(data: Vec<u8>, metadata: JobMetadata) -> Self {
        let format = ImageFormat::from_magic_bytes(&data);
        Self {
            data,
            format,
            metadata,
        }
    }

    /// Returns the size of the image data in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// What a consumer of a try-on job observes.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum TryOnOutcome {
    /// No job has run yet.
    #[default]
    Idle,
    /// A job is running.
    InProgress,
    /// The job produced an image.
    Completed(TryOnImage),
    /// The job failed.
    Failed(TryOnError),
}

impl TryOnOutcome {
    /// Returns true for `Completed` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Failed(_))
    }

    /// Returns the error if the job failed.
    pub fn error(&self) -> Option<&TryOnError> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Returns the image if the job completed.
    pub fn image(&self) -> Option<&TryOnImage> {
        match self {
            Self::Completed(image) => Some(image),
            _ => None,
        }
    }
}

impl From<crate::error::Result<TryOnImage>> for TryOnOutcome {
    fn from(result: crate::error::Result<TryOnImage>) -> Self {
        match result {
            Ok(image) => Self::Completed(image),
            Err(err) => Self::Failed(err),
        }
    }
}
