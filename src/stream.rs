//! Parser for the backend's event stream.
//!
//! The result endpoint answers with line-oriented `event:` / `data:` frames.
//! Two framing conventions show up in practice:
//!
//! - labelled frames: an `event:` line and one or more `data:` lines,
//!   terminated by a blank line;
//! - message frames: a single `data:` line holding a JSON object whose `msg`
//!   field says what it is, with no blank-line boundary needed.
//!
//! Only the first terminal frame matters. Everything after it is ignored.

use crate::classify;
use crate::error::{sanitize_error_message, TryOnError};
use crate::types::ImageReference;
use serde_json::Value;

const PROCESS_COMPLETED: &str = "process_completed";

const UNSPECIFIED_ERROR: &str = "server returned an error without details; check that the \
     API endpoint is configured correctly, check the server logs, and try again in a moment";

const GENERIC_JOB_FAILURE: &str = "the job failed on the server";

/// What a frame is, as far as the job is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Queue position, heartbeat, generation progress.
    Progress,
    /// Terminal success.
    Complete,
    /// Terminal failure.
    Error,
    /// Anything else.
    Unrecognized,
}

impl FrameKind {
    /// Returns true for frames that end the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }

    fn from_label(label: &str) -> Self {
        match label {
            "complete" => Self::Complete,
            "error" => Self::Error,
            "generating" | "heartbeat" | "progress" => Self::Progress,
            _ => Self::Unrecognized,
        }
    }

    fn from_msg(msg: &str) -> Self {
        match msg {
            "estimation" | "send_hash" | "send_data" | "process_starts" | "progress"
            | "process_generating" | "heartbeat" | "log" => Self::Progress,
            _ => Self::Unrecognized,
        }
    }
}

/// One frame read from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFrame {
    /// Frame kind.
    pub kind: FrameKind,
    /// Raw data payload.
    pub data: String,
}

/// Why a terminal frame did not yield an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorDetail {
    /// The backend reported this message.
    Reported(String),
    /// The backend signalled an error with no payload.
    Unspecified,
    /// The job completed without a usable image reference.
    EmptyResult,
}

impl ErrorDetail {
    /// Message carried by the detail, if any.
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Reported(msg) => Some(msg),
            _ => None,
        }
    }
}

impl From<ErrorDetail> for TryOnError {
    fn from(detail: ErrorDetail) -> Self {
        match detail {
            ErrorDetail::Reported(msg) => classify::from_message(&msg),
            ErrorDetail::Unspecified => TryOnError::Protocol(UNSPECIFIED_ERROR.into()),
            ErrorDetail::EmptyResult => TryOnError::EmptyResult,
        }
    }
}

/// Result of the first terminal frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The job produced an image at this reference.
    Image(ImageReference),
    /// The job failed.
    Error(ErrorDetail),
}

/// Shapes a successful payload may take, tried in order.
const PAYLOAD_SHAPES: [fn(&str) -> Option<ImageReference>; 4] = [
    single_object_shape,
    object_array_shape,
    nested_array_shape,
    process_output_shape,
];

/// Incremental parser, fed one line at a time.
#[derive(Debug, Default)]
pub struct StreamParser {
    event: Option<String>,
    data: Vec<String>,
    outcome: Option<StreamOutcome>,
    frames: usize,
}

impl StreamParser {
    /// Creates an empty parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true once a terminal frame has been seen.
    pub fn is_done(&self) -> bool {
        self.outcome.is_some()
    }

    /// Number of frames dispatched so far.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Feeds one line, without its newline.
    ///
    /// Returns the outcome once a terminal frame is reached; later lines are
    /// ignored.
    pub fn push_line(&mut self, line: &str) -> Option<&StreamOutcome> {
        if self.outcome.is_some() {
            return self.outcome.as_ref();
        }

        let line = line.strip_suffix('\r').unwrap_or(line);

        if line.is_empty() {
            self.flush();
        } else if let Some(label) = line.strip_prefix("event:") {
            self.event = Some(label.trim().to_string());
        } else if let Some(payload) = line.strip_prefix("data:") {
            self.push_data(payload.trim());
        }
        // `id:`, `retry:` and `:` comment lines carry nothing we need.

        self.outcome.as_ref()
    }

    /// Ends the stream, dispatching any frame still pending.
    pub fn finish(mut self) -> Option<StreamOutcome> {
        if self.outcome.is_none() {
            self.flush();
        }
        self.outcome
    }

    fn push_data(&mut self, payload: &str) {
        match message_type(payload).as_deref() {
            Some(PROCESS_COMPLETED) => {
                self.event = None;
                self.data.clear();
                self.frames += 1;
                self.outcome = Some(process_completed(payload));
            }
            Some(msg) if self.event.is_none() => {
                self.frames += 1;
                tracing::trace!(msg, kind = ?FrameKind::from_msg(msg), "skipping message frame");
            }
            _ => self.data.push(payload.to_string()),
        }
    }

    fn flush(&mut self) {
        let label = self.event.take();
        if label.is_none() && self.data.is_empty() {
            return;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        self.frames += 1;

        // A completion message split over several `data:` lines still wins
        // over the frame label.
        if message_type(&data).as_deref() == Some(PROCESS_COMPLETED) {
            self.outcome = Some(process_completed(&data));
            return;
        }

        let frame = StreamFrame {
            kind: label.as_deref().map_or(FrameKind::Unrecognized, FrameKind::from_label),
            data,
        };
        self.outcome = dispatch(frame);
    }
}

/// Parses a whole response body.
///
/// Returns `None` when the stream ends without a terminal frame.
pub fn parse_stream(body: &str) -> Option<StreamOutcome> {
    let mut parser = StreamParser::new();
    for line in body.split('\n') {
        if parser.push_line(line).is_some() {
            break;
        }
    }
    let frames = parser.frames();
    let outcome = parser.finish();
    tracing::debug!(frames, terminal = outcome.is_some(), "parsed result stream");
    outcome
}

fn dispatch(frame: StreamFrame) -> Option<StreamOutcome> {
    match frame.kind {
        FrameKind::Complete => Some(extract_image(&frame.data)),
        FrameKind::Error => Some(StreamOutcome::Error(error_detail(&frame.data))),
        FrameKind::Progress | FrameKind::Unrecognized => {
            tracing::trace!(kind = ?frame.kind, len = frame.data.len(), "skipping frame");
            None
        }
    }
}

fn message_type(payload: &str) -> Option<String> {
    let value: Value = serde_json::from_str(payload).ok()?;
    value.get("msg")?.as_str().map(str::to_string)
}

fn is_absent(payload: &str) -> bool {
    let payload = payload.trim();
    payload.is_empty() || payload == "null"
}

fn extract_image(payload: &str) -> StreamOutcome {
    if is_absent(payload) {
        return StreamOutcome::Error(ErrorDetail::EmptyResult);
    }
    PAYLOAD_SHAPES
        .iter()
        .find_map(|shape| shape(payload))
        .map_or(StreamOutcome::Error(ErrorDetail::EmptyResult), StreamOutcome::Image)
}

fn error_detail(payload: &str) -> ErrorDetail {
    if is_absent(payload) {
        return ErrorDetail::Unspecified;
    }
    // A JSON string payload is unwrapped; anything else is shown as sent.
    let text = match serde_json::from_str::<Value>(payload) {
        Ok(Value::String(s)) => s,
        _ => payload.to_string(),
    };
    if is_absent(&text) {
        return ErrorDetail::Unspecified;
    }
    ErrorDetail::Reported(sanitize_error_message(&text))
}

fn process_completed(payload: &str) -> StreamOutcome {
    let Ok(value) = serde_json::from_str::<Value>(payload) else {
        return StreamOutcome::Error(ErrorDetail::EmptyResult);
    };
    if value.get("success").and_then(Value::as_bool) == Some(false) {
        let message = value
            .pointer("/output/error")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|msg| !msg.is_empty() && *msg != "null")
            .unwrap_or(GENERIC_JOB_FAILURE);
        return StreamOutcome::Error(ErrorDetail::Reported(sanitize_error_message(message)));
    }
    extract_image(payload)
}

fn reference_from_object(value: &Value) -> Option<ImageReference> {
    let object = value.as_object()?;
    ["url", "path"]
        .iter()
        .filter_map(|key| object.get(*key).and_then(Value::as_str))
        .find_map(ImageReference::parse)
}

fn reference_from_entry(value: &Value) -> Option<ImageReference> {
    match value {
        Value::String(s) => ImageReference::parse(s),
        Value::Object(object) => match object.get("image") {
            Some(Value::String(s)) => ImageReference::parse(s),
            Some(image) => reference_from_object(image).or_else(|| reference_from_object(value)),
            None => reference_from_object(value),
        },
        _ => None,
    }
}

/// `{"url": ...}` or `{"path": ...}`.
fn single_object_shape(payload: &str) -> Option<ImageReference> {
    let value: Value = serde_json::from_str(payload).ok()?;
    reference_from_object(&value)
}

/// `[{"url": ...}, ...]`.
fn object_array_shape(payload: &str) -> Option<ImageReference> {
    let value: Value = serde_json::from_str(payload).ok()?;
    let first = value.as_array()?.first()?;
    reference_from_object(first)
}

/// `[["<reference>", ...], ...]`, the legacy nesting.
fn nested_array_shape(payload: &str) -> Option<ImageReference> {
    let value: Value = serde_json::from_str(payload).ok()?;
    let inner = value.as_array()?.first()?.as_array()?;
    ImageReference::parse(inner.first()?.as_str()?)
}

/// `{"output": {"data": [...]}}` as carried by `process_completed`.
fn process_output_shape(payload: &str) -> Option<ImageReference> {
    let value: Value = serde_json::from_str(payload).ok()?;
    let first = value.pointer("/output/data")?.as_array()?.first()?;
    match first {
        Value::Array(nested) => reference_from_entry(nested.first()?),
        other => reference_from_entry(other),
    }
}
