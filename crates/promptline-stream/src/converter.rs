use futures_util::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, trace};

use crate::error::StreamError;
use crate::event::{DataEvent, EVENT_DATA, EVENT_ERROR};
use crate::framer::{consume_stream, FramerOptions};

/// The two output channels of a converted stream.
///
/// Both channels close once the input is exhausted. Consume them
/// concurrently (or use [`TypedStream::next`]): a full error channel blocks
/// the converter just like a full response channel does.
#[derive(Debug)]
pub struct TypedStream<T> {
    responses: mpsc::Receiver<T>,
    errors: mpsc::Receiver<StreamError>,
    responses_closed: bool,
    errors_closed: bool,
}

impl<T> TypedStream<T> {
    fn new(responses: mpsc::Receiver<T>, errors: mpsc::Receiver<StreamError>) -> Self {
        Self {
            responses,
            errors,
            responses_closed: false,
            errors_closed: false,
        }
    }

    /// A stream that failed before producing any events: no responses, one error.
    pub fn from_error(error: StreamError) -> Self {
        let (_, responses) = mpsc::channel(1);
        let (err_tx, errors) = mpsc::channel(1);
        // capacity 1 and nothing else queued, so this cannot fail
        let _ = err_tx.try_send(error);
        Self::new(responses, errors)
    }

    /// Split into the raw response and error receivers.
    pub fn into_parts(self) -> (mpsc::Receiver<T>, mpsc::Receiver<StreamError>) {
        (self.responses, self.errors)
    }

    /// Next item from either channel, or `None` once both are closed.
    ///
    /// Order holds within each channel but not across them: a pending
    /// response is preferred, so an error may surface after responses that
    /// were converted later than it.
    pub async fn next(&mut self) -> Option<Result<T, StreamError>> {
        loop {
            if self.responses_closed && self.errors_closed {
                return None;
            }
            tokio::select! {
                biased;

                resp = self.responses.recv(), if !self.responses_closed => match resp {
                    Some(value) => return Some(Ok(value)),
                    None => self.responses_closed = true,
                },
                err = self.errors.recv(), if !self.errors_closed => match err {
                    Some(e) => return Some(Err(e)),
                    None => self.errors_closed = true,
                },
            }
        }
    }

    /// Drain both channels until they close.
    pub async fn collect(mut self) -> (Vec<T>, Vec<StreamError>) {
        let mut responses = Vec::new();
        let mut errors = Vec::new();
        while let Some(item) = self.next().await {
            match item {
                Ok(value) => responses.push(value),
                Err(e) => errors.push(e),
            }
        }
        (responses, errors)
    }
}

/// Spawn a converter task that decodes `data` events into `T`.
///
/// - `error` events go to the error channel with their payload as message.
/// - `data` events decode as JSON; failures go to the error channel and the
///   stream keeps going.
/// - any other (named) event is dropped.
///
/// Order is preserved on each channel. The task stops as soon as both
/// receivers are dropped, even while waiting on a quiet input, and drops
/// `events` on the way out.
pub fn convert<T, S>(events: S, capacity: usize) -> TypedStream<T>
where
    T: DeserializeOwned + Send + 'static,
    S: Stream<Item = DataEvent> + Send + 'static,
{
    let (resp_tx, resp_rx) = mpsc::channel(capacity.max(1));
    let (err_tx, err_rx) = mpsc::channel(capacity.max(1));

    tokio::spawn(async move {
        let mut events = std::pin::pin!(events);
        let mut responses = Some(resp_tx);
        let mut errors = Some(err_tx);

        loop {
            prune(&mut responses);
            prune(&mut errors);
            if responses.is_none() && errors.is_none() {
                debug!("stream receivers dropped, stopping converter");
                break;
            }

            let event = tokio::select! {
                event = events.next() => event,
                _ = receivers_gone(&responses, &errors) => {
                    debug!("stream receivers dropped while idle, stopping converter");
                    break;
                }
            };
            let Some(event) = event else {
                break;
            };
            match event.event.as_str() {
                EVENT_ERROR => forward(&mut errors, StreamError::Event(event.text())).await,
                EVENT_DATA => match serde_json::from_slice::<T>(&event.data) {
                    Ok(value) => forward(&mut responses, value).await,
                    Err(e) => {
                        debug!(error = %e, "stream payload did not decode");
                        forward(&mut errors, StreamError::Decode(e)).await
                    }
                },
                other => trace!(event = other, "dropping named event"),
            }
        }
        // senders drop here, closing both channels together
    });

    TypedStream::new(resp_rx, err_rx)
}

/// Frame `reader` and convert its events into `T`: the full pipeline, one
/// task per stage.
pub fn pipeline<T, R>(reader: R, options: &FramerOptions) -> TypedStream<T>
where
    T: DeserializeOwned + Send + 'static,
    R: AsyncRead + Send + 'static,
{
    let events = consume_stream(reader, options);
    convert(ReceiverStream::new(events), options.channel_capacity)
}

fn prune<V>(slot: &mut Option<mpsc::Sender<V>>) {
    if slot.as_ref().is_some_and(|tx| tx.is_closed()) {
        *slot = None;
    }
}

/// Resolves once every sender still held has lost its receiver.
async fn receivers_gone<A, B>(
    responses: &Option<mpsc::Sender<A>>,
    errors: &Option<mpsc::Sender<B>>,
) {
    let responses = async {
        if let Some(tx) = responses {
            tx.closed().await;
        }
    };
    let errors = async {
        if let Some(tx) = errors {
            tx.closed().await;
        }
    };
    tokio::join!(responses, errors);
}

async fn forward<V>(slot: &mut Option<mpsc::Sender<V>>, value: V) {
    let Some(tx) = slot.as_ref() else {
        return;
    };
    if tx.send(value).await.is_err() {
        *slot = None;
    }
}
