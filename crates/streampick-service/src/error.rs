use std::time::Duration;

use thiserror::Error;

/// An error that happens while resolving streams for a media item.
///
/// One computation can be observed by many callers at once, so this error is cheap to clone and
/// carries its details as plain strings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The catalog or debrid service could not be reached or answered with a failure.
    ///
    /// The attached string contains the upstream's response or the transport error.
    #[error("upstream request failed: {0}")]
    Upstream(String),
    /// The upstream call did not finish within the configured timeout.
    #[error("upstream request timed out after {0:?}")]
    Timeout(Duration),
    /// The upstream answered, but the payload could not be understood.
    #[error("malformed upstream data: {0}")]
    Malformed(String),
    /// The request names a content type other than `movie` or `series`.
    #[error("unsupported content type: {0}")]
    UnsupportedType(String),
    /// Too many distinct media items are pending at the same time.
    #[error("maximum number of pending resolutions reached")]
    QueueFull,
    /// An unexpected error in the service itself, such as a panicking computation.
    #[error("internal error")]
    InternalError,
}

impl From<reqwest::Error> for ResolveError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Malformed(err.to_string())
        } else {
            Self::Upstream(err.to_string())
        }
    }
}

/// A failed resolution, tagged with the media request id it originated from.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed request {id}: {source}")]
pub struct ResolutionFailure {
    /// The media request id as it was received.
    pub id: String,
    /// The reason the resolution failed.
    #[source]
    pub source: ResolveError,
}

impl ResolutionFailure {
    pub fn new(id: impl Into<String>, source: ResolveError) -> Self {
        Self {
            id: id.into(),
            source,
        }
    }
}

/// The media request id does not have any of the recognized shapes.
///
/// This is not a failure of the resolution, such ids resolve to an empty stream list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported media id format: {0:?}")]
pub struct UnsupportedIdFormat(pub String);
