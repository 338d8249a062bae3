#![warn(missing_docs)]
//! TryOn - client for queue-based virtual try-on inference backends.
//!
//! Submits a body photo and a clothing photo to a Gradio-style job queue,
//! reads the server-sent event stream until the job finishes, and returns
//! the generated image bytes.
//!
//! # Quick Start
//!
//! ```no_run
//! use tryon::{ClientConfig, ImageAsset, TryOnClient, TryOnOutcome};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ClientConfig::builder()
//!         .base_url("https://example.gradio.live")
//!         .build()?;
//!     let client = TryOnClient::new(config)?;
//!
//!     let body = ImageAsset::from_bytes(std::fs::read("body.jpg")?, "body.jpg");
//!     let clothing = ImageAsset::from_bytes(std::fs::read("shirt.jpg")?, "shirt.jpg");
//!
//!     match client.submit(&body, &clothing).await {
//!         TryOnOutcome::Completed(image) => println!("{} bytes", image.size()),
//!         TryOnOutcome::Failed(e) => eprintln!("{e}"),
//!         _ => unreachable!(),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Protocol variants
//!
//! - [`ProtocolVariant::InlineData`]: both images travel inline as base64
//!   data URLs and the result stream is keyed by the event id.
//! - [`ProtocolVariant::UploadReference`]: both images are uploaded first,
//!   the request carries their handles plus fixed generation parameters, and
//!   the result stream is keyed by the session hash.
//!
//! # Configuration
//!
//! - `TRYON_API_URL`: base endpoint, used when none is set on the builder
//! - `TRYON_FALLBACK_URLS`: comma-separated endpoints for
//!   [`TryOnClient::submit_with_fallback`]

mod classify;
mod error;

pub mod client;
pub mod config;
pub mod payload;
pub mod protocol;
pub mod resolve;
pub mod stream;
pub mod transport;
pub mod types;

// Re-export error types at crate root
pub use error::{sanitize_error_message, ErrorCategory, Result, TryOnError};

pub use client::{JobState, TryOnClient, TryOnClientBuilder};
pub use config::{ClientConfig, ClientConfigBuilder, ProtocolVariant};
pub use transport::{HttpResponse, HttpTransport, Transport};
pub use types::{
    GenerationParams, ImageAsset, ImageFormat, ImageReference, JobHandle, JobMetadata, TryOnImage,
    TryOnOutcome,
};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::client::TryOnClient;
    pub use crate::config::{ClientConfig, ProtocolVariant};
    pub use crate::error::{Result, TryOnError};
    pub use crate::types::{ImageAsset, TryOnImage, TryOnOutcome};
}
