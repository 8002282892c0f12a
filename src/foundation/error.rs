/// Convenience result type used across framecut.
pub type FramecutResult<T> = Result<T, FramecutError>;

/// Error taxonomy shared by the grid slicer and the frame capturer.
///
/// Every variant is fatal to the call that produced it. Cleanup of already produced handles
/// happens before the error is returned.
#[derive(thiserror::Error, Debug)]
pub enum FramecutError {
    /// Caller-provided input was rejected before any IO.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The source exceeded the configured byte ceiling.
    #[error("resource too large: {size} bytes exceeds limit of {limit} bytes")]
    ResourceTooLarge {
        /// Observed size in bytes (a lower bound when the body was cut off at the ceiling).
        size: u64,
        /// Configured ceiling in bytes.
        limit: u64,
    },

    /// The source responded with a non-success status.
    #[error("fetch failed with status {status}: {url}")]
    Fetch {
        /// HTTP-style status code.
        status: u16,
        /// Requested source reference.
        url: String,
    },

    /// No decode strategy produced a usable image.
    #[error("decode error: {0}")]
    Decode(String),

    /// Encoding a rendered canvas produced no output.
    #[error("encode error: {0}")]
    Encode(String),

    /// The media element failed to load metadata.
    #[error("media load error: {0}")]
    MediaLoad(String),

    /// A seek did not complete before its deadline.
    #[error("seek timed out after {timeout_ms} ms at {target:.3}s")]
    SeekTimeout {
        /// Seek target in seconds.
        target: f64,
        /// Deadline that elapsed.
        timeout_ms: u64,
    },

    /// The media element reported an error while seeking.
    #[error("seek failed at {target:.3}s: {reason}")]
    Seek {
        /// Seek target in seconds.
        target: f64,
        /// Reason reported by the media element.
        reason: String,
    },

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FramecutError {
    /// Build a [`FramecutError::InvalidInput`] value.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Build a [`FramecutError::Decode`] value.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Build a [`FramecutError::Encode`] value.
    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    /// Build a [`FramecutError::MediaLoad`] value.
    pub fn media_load(msg: impl Into<String>) -> Self {
        Self::MediaLoad(msg.into())
    }

    /// Build a [`FramecutError::Seek`] value.
    pub fn seek(target: f64, reason: impl Into<String>) -> Self {
        Self::Seek {
            target,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
