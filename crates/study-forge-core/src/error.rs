//! Error taxonomy for the generation pipeline.
//!
//! Every stage returns a typed error rather than unwinding:
//!
//! | Type | Raised by | Fatal to the request? |
//! |------|-----------|------------------------|
//! | [`CallFailure`] | generation backend | no, counted per chunk |
//! | [`ParseError`] | response sanitizer | no, counted per chunk |
//! | [`ValidationError`] | schema validator (container shape only) | no, counted per chunk |
//! | [`RequestError`] | [`GenerationRequest::new`](crate::models::GenerationRequest::new) | yes, before any call |
//! | [`PipelineError::Exhaustion`] | assembly, when nothing usable was produced | yes |
//!
//! Per-chunk failures are wrapped in [`ChunkError`] and folded into the
//! result counters; only exhaustion is surfaced as a terminal error.

use serde::Serialize;
use thiserror::Error;

use crate::models::ArtifactType;
use crate::sanitize::Shape;

/// Failure of a single call to the generative-text service.
///
/// Returned by [`GenerationBackend::generate`](crate::backend::GenerationBackend::generate)
/// instead of panicking or bubbling transport errors, so the caller can
/// keep going chunk by chunk.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallFailure {
    /// Transport failure reaching the service (DNS, connect, TLS, reset).
    #[error("network error: {0}")]
    Network(String),

    /// Connect or total timeout elapsed.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Non-success status, or a success reply missing the expected field.
    #[error("upstream error{}: {message}", .status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
    Upstream {
        status: Option<u16>,
        message: String,
    },
}

impl CallFailure {
    pub fn upstream(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            message: message.into(),
        }
    }

    /// Whether a retry has a reasonable chance of succeeding.
    ///
    /// Timeouts are never retried. Upstream failures are retried only on
    /// rate limiting (429) and server errors (5xx).
    pub fn is_retryable(&self) -> bool {
        match self {
            CallFailure::Network(_) => true,
            CallFailure::Timeout(_) => false,
            CallFailure::Upstream { status, .. } => {
                matches!(status, Some(429) | Some(500..=599))
            }
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            CallFailure::Network(_) => FailureKind::Network,
            CallFailure::Timeout(_) => FailureKind::Timeout,
            CallFailure::Upstream { .. } => FailureKind::Upstream,
        }
    }
}

/// The sanitizer could not recover a usable JSON value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    #[error("response was empty")]
    Empty,

    #[error("no well-formed JSON value found in response")]
    NoJson,

    #[error("JSON nesting exceeds {0} levels")]
    TooDeep(usize),

    #[error("\"text\" wrappers nested deeper than {0} levels")]
    WrapperTooDeep(usize),

    #[error("expected a JSON {expected}, found {found}")]
    ShapeMismatch { expected: Shape, found: &'static str },
}

/// Structural mismatch of the top-level container.
///
/// Individual bad records are dropped silently and never produce this error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ValidationError {
    #[error("{artifact} expects a JSON {expected}, found {found}")]
    ContainerMismatch {
        artifact: ArtifactType,
        expected: Shape,
        found: &'static str,
    },
}

/// A [`GenerationRequest`](crate::models::GenerationRequest) that cannot be served.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum RequestError {
    #[error("source text is empty")]
    EmptySource,

    #[error("{0} requests require a target count")]
    MissingTargetCount(ArtifactType),

    #[error("target count {0} is outside 1..={max}", max = crate::models::MAX_TARGET_COUNT)]
    TargetCountOutOfRange(u32),

    #[error("{artifact} requests require the `{param}` parameter")]
    MissingParam {
        artifact: ArtifactType,
        param: &'static str,
    },

    #[error("unknown {what}: '{value}'")]
    UnknownVariant { what: &'static str, value: String },
}

/// Why a single chunk contributed zero records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkError {
    #[error(transparent)]
    Call(#[from] CallFailure),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl ChunkError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ChunkError::Call(c) => c.kind(),
            ChunkError::Parse(_) => FailureKind::Parse,
            ChunkError::Validation(_) => FailureKind::Validation,
        }
    }
}

/// Flat classification of chunk failures, exposed in results for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Network,
    Timeout,
    Upstream,
    Parse,
    Validation,
}

/// Errors surfaced to the caller of the pipeline.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PipelineError {
    #[error("invalid request: {0}")]
    Request(#[from] RequestError),

    /// Assembly produced zero usable records.
    #[error("no usable records were produced ({failed_chunks} of {total_chunks} chunks failed)")]
    Exhaustion {
        failed_chunks: usize,
        total_chunks: usize,
    },
}
