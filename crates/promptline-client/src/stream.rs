use futures_util::{Stream, TryStreamExt};
use promptline_core::ApiError;
use promptline_stream::{convert, pipeline, DataEvent, StreamError, TypedStream};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::io::StreamReader;
use tracing::{debug, warn};

use crate::client::{Client, API_KEY_HEADER, JSON_CONTENT_TYPE};
use crate::models::{CompletionResponse, MessageResponse};

const EVENT_STREAM: &str = "text/event-stream";

/// Converter fixed to completion-shaped payloads.
pub fn completion_stream_converter<S>(events: S, capacity: usize) -> TypedStream<CompletionResponse>
where
    S: Stream<Item = DataEvent> + Send + 'static,
{
    convert(events, capacity)
}

/// Converter fixed to message-shaped payloads.
pub fn message_stream_converter<S>(events: S, capacity: usize) -> TypedStream<MessageResponse>
where
    S: Stream<Item = DataEvent> + Send + 'static,
{
    convert(events, capacity)
}

impl Client {
    /// Issue a single streaming POST and hand a 200 body to the event pipeline.
    ///
    /// Not retried. A transport failure, a non-200 status, or a body that is
    /// not `text/event-stream` ends up as the only item on the error channel
    /// and the framer is never started.
    pub(crate) async fn open_stream<T, B>(&self, path: &str, body: &B) -> TypedStream<T>
    where
        T: DeserializeOwned + Send + 'static,
        B: Serialize + ?Sized,
    {
        let payload = match serde_json::to_vec(body) {
            Ok(p) => p,
            Err(e) => {
                return TypedStream::from_error(StreamError::Request(format!(
                    "failed to encode request body: {e}"
                )))
            }
        };

        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "opening event stream");

        let resp = self
            .http
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .header(ACCEPT, EVENT_STREAM)
            .body(payload)
            .send()
            .await;

        let resp = match resp {
            Ok(resp) => resp,
            Err(e) => {
                warn!(error = %e, "stream request failed");
                return TypedStream::from_error(StreamError::Request(e.to_string()));
            }
        };

        let status = resp.status();
        if status != StatusCode::OK {
            let text = read_body(resp).await;
            warn!(status = status.as_u16(), body = %text, "stream request rejected");
            return TypedStream::from_error(ApiError::new(status.as_u16(), text).into());
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !is_event_stream(&content_type) {
            let text = read_body(resp).await;
            warn!(content_type = %content_type, body = %text, "stream response is not an event stream");
            return TypedStream::from_error(StreamError::Request(format!(
                "expected {EVENT_STREAM} response, got {content_type:?}"
            )));
        }

        let body = StreamReader::new(resp.bytes_stream().map_err(std::io::Error::other));
        pipeline(body, &self.stream)
    }
}

fn is_event_stream(content_type: &str) -> bool {
    content_type
        .trim_start()
        .to_ascii_lowercase()
        .starts_with(EVENT_STREAM)
}

/// Body text of a response that will not be streamed, empty if it cannot be read.
async fn read_body(resp: reqwest::Response) -> String {
    match resp.text().await {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "failed to read response body");
            String::new()
        }
    }
}
