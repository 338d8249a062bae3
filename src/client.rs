//! Job client: drives one try-on job from upload to result bytes.

use crate::classify;
use crate::config::ClientConfig;
use crate::error::{sanitize_error_message, Result, TryOnError};
use crate::payload::PayloadBuilder;
use crate::protocol::{self, parse_upload_response, Protocol, UploadedPair};
use crate::resolve::ResultResolver;
use crate::stream::{self, StreamOutcome};
use crate::transport::{HttpTransport, Transport};
use crate::types::{
    ImageAsset, ImageReference, JobHandle, JobMetadata, TryOnImage, TryOnOutcome,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

/// Stages of a single job attempt. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum JobState {
    /// Nothing sent yet.
    Idle,
    /// Uploading the input images.
    Uploading,
    /// Submitting the job request.
    Submitting,
    /// Reading the result stream and fetching the image.
    Polling,
    /// Finished with an image.
    Completed,
    /// Finished with an error.
    Failed,
}

/// Builder for [`TryOnClient`].
#[derive(Default)]
pub struct TryOnClientBuilder {
    config: Option<ClientConfig>,
    transport: Option<Arc<dyn Transport>>,
}

impl TryOnClientBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration. Defaults to one built from the environment.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the transport. Defaults to [`HttpTransport`].
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Builds the client.
    pub fn build(self) -> Result<TryOnClient> {
        let config = match self.config {
            Some(config) => config,
            None => ClientConfig::builder().build()?,
        };
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(&config)?),
        };

        Ok(TryOnClient {
            protocol: protocol::for_variant(config.variant()),
            payload: PayloadBuilder::from_config(&config),
            config: Arc::new(config),
            transport,
        })
    }
}

/// Runs try-on jobs against a queue-based inference backend.
///
/// Holds only immutable configuration; every call runs an independent job
/// with its own session hash and job handle.
#[derive(Clone)]
pub struct TryOnClient {
    config: Arc<ClientConfig>,
    transport: Arc<dyn Transport>,
    protocol: Arc<dyn Protocol>,
    payload: PayloadBuilder,
}

impl TryOnClient {
    /// Creates a new [`TryOnClientBuilder`].
    pub fn builder() -> TryOnClientBuilder {
        TryOnClientBuilder::new()
    }

    /// Creates a client with the default HTTP transport.
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::builder().config(config).build()
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Runs one job against the primary endpoint.
    pub async fn run(&self, body: &ImageAsset, clothing: &ImageAsset) -> Result<TryOnImage> {
        self.run_on(self.config.base_url(), body, clothing).await
    }

    /// Runs one job and reports its terminal outcome.
    pub async fn submit(&self, body: &ImageAsset, clothing: &ImageAsset) -> TryOnOutcome {
        self.run(body, clothing).await.into()
    }

    /// Like [`submit`](Self::submit), also publishing `InProgress` and then
    /// the terminal outcome to `progress`.
    ///
    /// If the returned future is dropped before it finishes, no terminal
    /// outcome is published.
    pub async fn submit_with_progress(
        &self,
        body: &ImageAsset,
        clothing: &ImageAsset,
        progress: &watch::Sender<TryOnOutcome>,
    ) -> TryOnOutcome {
        progress.send_replace(TryOnOutcome::InProgress);
        let outcome = self.submit(body, clothing).await;
        progress.send_replace(outcome.clone());
        outcome
    }

    /// Runs the job against each configured endpoint in turn, moving on only
    /// when an endpoint is unreachable or not found.
    ///
    /// Every attempt is a fresh job with a fresh session hash.
    pub async fn submit_with_fallback(
        &self,
        body: &ImageAsset,
        clothing: &ImageAsset,
    ) -> TryOnOutcome {
        let endpoints: Vec<&str> = self.config.endpoints().collect();
        let mut last_error = None;

        for (attempt, endpoint) in endpoints.iter().enumerate() {
            match self.run_on(endpoint, body, clothing).await {
                Ok(image) => return TryOnOutcome::Completed(image),
                Err(e) if e.is_endpoint_failure() && attempt + 1 < endpoints.len() => {
                    tracing::warn!(
                        endpoint = %endpoint,
                        attempt = attempt + 1,
                        "endpoint unusable, trying next: {e}"
                    );
                    last_error = Some(e);
                }
                Err(e) => return TryOnOutcome::Failed(e),
            }
        }

        TryOnOutcome::Failed(last_error.unwrap_or_else(|| {
            TryOnError::Configuration("no endpoints configured".into())
        }))
    }

    async fn run_on(
        &self,
        endpoint: &str,
        body: &ImageAsset,
        clothing: &ImageAsset,
    ) -> Result<TryOnImage> {
        Job::new(self, endpoint).run(body, clothing).await
    }
}

/// Acknowledgement returned by the submit endpoint.
#[derive(Debug, Deserialize)]
struct QueueAck {
    #[serde(default)]
    event_id: Option<String>,
}

/// One job attempt. Lives for the duration of a single `run`.
struct Job<'a> {
    client: &'a TryOnClient,
    endpoint: &'a str,
    state: JobState,
    started: Instant,
}

impl<'a> Job<'a> {
    fn new(client: &'a TryOnClient, endpoint: &'a str) -> Self {
        Self {
            client,
            endpoint,
            state: JobState::Idle,
            started: Instant::now(),
        }
    }

    fn advance(&mut self, next: JobState) {
        debug_assert!(next > self.state, "job moved from {:?} to {:?}", self.state, next);
        tracing::debug!(
            from = ?self.state,
            to = ?next,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "job state"
        );
        self.state = next;
    }

    async fn run(mut self, body: &ImageAsset, clothing: &ImageAsset) -> Result<TryOnImage> {
        let result = self.drive(body, clothing).await;
        match &result {
            Ok(image) => {
                self.advance(JobState::Completed);
                tracing::info!(
                    endpoint = %self.endpoint,
                    bytes = image.size(),
                    elapsed_ms = image.metadata.duration.as_millis() as u64,
                    "try-on job completed"
                );
            }
            Err(e) => {
                self.advance(JobState::Failed);
                tracing::warn!(
                    endpoint = %self.endpoint,
                    category = ?e.category(),
                    "try-on job failed: {e}"
                );
            }
        }
        result
    }

    async fn drive(&mut self, body: &ImageAsset, clothing: &ImageAsset) -> Result<TryOnImage> {
        for (asset, role) in [(body, "body"), (clothing, "clothing")] {
            if asset.is_empty() {
                return Err(TryOnError::InvalidInput(format!("{role} image is empty")));
            }
        }

        let client = self.client;
        let protocol = client.protocol.as_ref();
        let transport = client.transport.as_ref();

        let uploaded = if protocol.requires_upload() {
            self.advance(JobState::Uploading);
            Some(UploadedPair {
                body: self.upload(body, "body").await?,
                clothing: self.upload(clothing, "clothing").await?,
            })
        } else {
            None
        };

        self.advance(JobState::Submitting);
        let request = client.payload.build(
            body,
            clothing,
            protocol.payload(uploaded.as_ref(), self.endpoint)?,
        )?;
        let session_hash = request.session_hash.clone();
        tracing::debug!(
            protocol = protocol.name(),
            session_hash = %session_hash,
            inputs = request.data.len(),
            body_bytes = body.size(),
            clothing_bytes = clothing.size(),
            "submitting job"
        );

        let response = transport
            .post_json(&self.url("/queue/join"), &serde_json::to_value(&request)?)
            .await?;
        if !response.is_success() {
            tracing::debug!(
                status = response.status,
                body = %sanitize_error_message(&response.text()),
                "submit rejected"
            );
            return Err(classify::from_status(response.status));
        }
        let ack: QueueAck = response.json()?;
        let event_id = ack
            .event_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| TryOnError::Protocol("no event ID received".into()))?;
        let handle = protocol.job_handle(&event_id, &request);

        self.advance(JobState::Polling);
        let outcome = self.poll(&handle).await?;
        let reference = match outcome {
            Some(StreamOutcome::Image(reference)) => reference,
            Some(StreamOutcome::Error(detail)) => return Err(detail.into()),
            None => return Err(TryOnError::EmptyResult),
        };

        let resolver = ResultResolver::new(transport, protocol, self.endpoint);
        let data = resolver.resolve(&reference).await?;

        Ok(TryOnImage::new(
            data,
            JobMetadata {
                endpoint: self.endpoint.to_string(),
                session_hash,
                handle,
                duration: self.started.elapsed(),
            },
        ))
    }

    async fn upload(&self, asset: &ImageAsset, role: &str) -> Result<ImageReference> {
        let response = self
            .client
            .transport
            .upload(&self.url("/upload"), asset)
            .await?;
        let reference = parse_upload_response(&response, role)?;
        tracing::debug!(role, bytes = asset.size(), "uploaded image");
        Ok(reference)
    }

    async fn poll(&self, handle: &JobHandle) -> Result<Option<StreamOutcome>> {
        let mut url = reqwest::Url::parse(&self.url("/queue/data"))
            .map_err(|e| TryOnError::Configuration(format!("invalid endpoint: {e}")))?;
        url.query_pairs_mut()
            .append_pair("session_hash", handle.as_str());

        tracing::debug!(handle = %handle, "waiting for result stream");
        let response = self.client.transport.get(url.as_str()).await?;
        if !response.is_success() {
            tracing::debug!(
                status = response.status,
                body = %sanitize_error_message(&response.text()),
                "result stream rejected"
            );
            return Err(classify::from_status(response.status));
        }

        Ok(stream::parse_stream(&response.text()))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }
}
