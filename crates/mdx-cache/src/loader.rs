use crate::body::SegmentBody;
use crate::header::SegmentHeader;
use std::sync::Arc;

/// Failure of one backend fetch.
///
/// Cloneable (shared message storage) so the index can hand the same error to
/// every waiter attached to the failed load.
#[derive(Clone, Debug, thiserror::Error)]
#[error("aggregate load failed for {header}: {message}")]
pub struct SegmentLoadError {
    header: Arc<str>,
    message: Arc<str>,
}

impl SegmentLoadError {
    pub fn new(header: &SegmentHeader, message: impl Into<String>) -> Self {
        Self {
            header: header.to_string().into(),
            message: message.into().into(),
        }
    }

    pub(crate) fn abandoned(header: &SegmentHeader) -> Self {
        Self::new(header, "load abandoned before completion")
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// The external aggregate fetch backend (typically SQL generation + execution).
///
/// The cache index invokes `load` exactly once per owned Loading transition;
/// latency and transport are entirely the implementation's concern.
pub trait AggregateLoader: Send + Sync {
    fn load(&self, header: &SegmentHeader) -> Result<SegmentBody, SegmentLoadError>;
}
