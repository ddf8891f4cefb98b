use std::io;

use bytes::BytesMut;
use futures_util::{Stream, StreamExt};
use promptline_core::StreamConfig;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::codec::{Decoder, FramedRead};
use tracing::{debug, warn};

use crate::event::{classify_line, DataEvent};

/// Settings shared by the framer and the converter.
#[derive(Debug, Clone)]
pub struct FramerOptions {
    /// Drop empty lines instead of classifying them. With this off, every
    /// blank line becomes an `invalid server event` error.
    pub skip_blank_lines: bool,
    /// Longest line accepted before the stream fails with a read error.
    pub max_line_bytes: usize,
    /// Capacity of each channel between pipeline stages.
    pub channel_capacity: usize,
}

impl Default for FramerOptions {
    fn default() -> Self {
        Self::from(&StreamConfig::default())
    }
}

impl From<&StreamConfig> for FramerOptions {
    fn from(config: &StreamConfig) -> Self {
        Self {
            skip_blank_lines: config.skip_blank_lines,
            max_line_bytes: config.max_line_bytes,
            channel_capacity: config.channel_capacity.max(1),
        }
    }
}

/// Splits a byte stream on `\n` and classifies each line into a [`DataEvent`].
///
/// A trailing `\r` is stripped. A final line without a terminator is still
/// emitted at end of input.
#[derive(Debug)]
pub struct SseLineCodec {
    skip_blank_lines: bool,
    max_line_bytes: usize,
    // where to resume scanning for '\n' in the buffer
    next_index: usize,
}

impl SseLineCodec {
    pub fn new(options: &FramerOptions) -> Self {
        Self {
            skip_blank_lines: options.skip_blank_lines,
            max_line_bytes: options.max_line_bytes,
            next_index: 0,
        }
    }

    fn emit(&self, mut line: BytesMut) -> Option<DataEvent> {
        if line.last() == Some(&b'\r') {
            line.truncate(line.len() - 1);
        }
        if line.is_empty() && self.skip_blank_lines {
            return None;
        }
        Some(classify_line(line.freeze()))
    }

    fn line_too_long(&self) -> io::Error {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("server event line exceeds {} bytes", self.max_line_bytes),
        )
    }
}

impl Decoder for SseLineCodec {
    type Item = DataEvent;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<DataEvent>, io::Error> {
        loop {
            let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') else {
                if src.len() > self.max_line_bytes {
                    return Err(self.line_too_long());
                }
                self.next_index = src.len();
                return Ok(None);
            };

            let newline = self.next_index + offset;
            self.next_index = 0;
            if newline > self.max_line_bytes {
                return Err(self.line_too_long());
            }

            let mut line = src.split_to(newline + 1);
            line.truncate(newline);
            if let Some(event) = self.emit(line) {
                return Ok(Some(event));
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<DataEvent>, io::Error> {
        if let Some(event) = self.decode(src)? {
            return Ok(Some(event));
        }
        self.next_index = 0;
        if src.is_empty() {
            return Ok(None);
        }
        let line = src.split_to(src.len());
        Ok(self.emit(line))
    }
}

/// Lazily frame `reader` into events, pulling bytes only as events are polled.
///
/// A read error becomes one final `error` event carrying the error text, after
/// which the sequence ends. The reader is dropped as soon as the sequence
/// ends, or together with the stream if the caller abandons it early.
pub fn frame_events<R>(reader: R, options: &FramerOptions) -> impl Stream<Item = DataEvent>
where
    R: AsyncRead + Send + 'static,
{
    let frames = FramedRead::new(Box::pin(reader), SseLineCodec::new(options));

    futures_util::stream::unfold(Some(frames), |state| async move {
        let mut frames = state?;
        match frames.next().await? {
            Ok(event) => Some((event, Some(frames))),
            Err(e) => {
                warn!(error = %e, "event stream read failed");
                Some((DataEvent::error(e.to_string()), None))
            }
        }
    })
}

/// Spawn a task that frames `reader` and sends each event, in order, on the
/// returned channel.
///
/// The task owns the reader and releases it when it exits: at end of input,
/// after a read error, or once the receiver is dropped, including while the
/// read is still waiting for bytes.
pub fn consume_stream<R>(reader: R, options: &FramerOptions) -> mpsc::Receiver<DataEvent>
where
    R: AsyncRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(options.channel_capacity.max(1));
    let events = frame_events(reader, options);

    tokio::spawn(async move {
        let mut events = std::pin::pin!(events);
        let mut forwarded: u64 = 0;
        loop {
            let event = tokio::select! {
                event = events.next() => event,
                _ = tx.closed() => {
                    debug!(forwarded, "event receiver dropped while idle, abandoning stream");
                    return;
                }
            };
            let Some(event) = event else {
                break;
            };
            if tx.send(event).await.is_err() {
                debug!(forwarded, "event receiver dropped, abandoning stream");
                return;
            }
            forwarded += 1;
        }
        debug!(forwarded, "event stream finished");
    });

    rx
}
