//! Error taxonomy shared across every bounded context.

use thiserror::Error;

/// Top-level error type returned by library-facing APIs in this workspace.
///
/// Subsystem crates may define narrower errors internally, but anything
/// crossing a component boundary (store <-> ingest <-> batch <-> gateway)
/// converges here so the gateway can map a single enum to HTTP status codes.
#[derive(Debug, Error)]
pub enum KwonError {
 /// Unique-constraint violation on append; callers treat this as a no-op.
 #[error("duplicate: {0}")]
 Duplicate(String),

 /// Requested entity does not exist.
 #[error("not found: {0}")]
 NotFound(String),

 /// Upstream HTTP adapter failed or timed out. Never rewinds cursors.
 #[error("upstream unavailable: {0}")]
 UpstreamUnavailable(String),

 /// Orchestrator terminal state after exhausting data-quality retries.
 #[error("data quality failure: {0}")]
 DataQualityFailure(String),

 /// Malformed request or bad payload shape.
 #[error("validation error: {0}")]
 Validation(String),

 /// Tool name not registered in the gateway's handler registry.
 #[error("unknown tool: {0}")]
 UnknownTool(String),

 /// `resume` called for a `thread_id` with no durable checkpoint.
 #[error("checkpoint missing for thread {0}")]
 CheckpointMissing(String),

 /// Persistence-layer failure (SQL error, pool exhaustion, etc.).
 #[error("storage error: {0}")]
 Storage(String),

 /// Catch-all for conditions that should be impossible given the above.
 #[error("internal error: {0}")]
 Internal(String),
}

pub type KwonResult<T> = Result<T, KwonError>;

impl KwonError {
 /// HTTP status code for the tool-server RPC shape.
 pub fn http_status(&self) -> u16 {
 match self {
 KwonError::NotFound(_) | KwonError::UnknownTool(_) | KwonError::CheckpointMissing(_) => 404,
 KwonError::Validation(_) => 400,
 _ => 500,
 }
 }
}
