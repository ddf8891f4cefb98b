use promptline_core::ApiError;
use thiserror::Error;

/// Errors delivered on a stream's error channel.
///
/// None of these carry retry metadata: a stream is never restarted, the
/// caller has to open a new one.
#[derive(Debug, Error)]
pub enum StreamError {
    /// An `error` event: a malformed line, a read failure, or an error the
    /// server sent in-band. Displays as the bare message.
    #[error("{0}")]
    Event(String),

    /// A `data` payload that is not valid JSON for the target shape.
    #[error("failed to decode stream payload: {0}")]
    Decode(#[from] serde_json::Error),

    /// The server answered the stream request with a non-200 status.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The stream request never produced a response.
    #[error("failed to open stream: {0}")]
    Request(String),
}
