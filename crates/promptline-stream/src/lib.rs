//! Incremental server-sent-event pipeline: bytes → [`DataEvent`]s → typed values.
//!
//! The framer and the converter each run on their own tokio task and talk
//! through bounded channels, so a slow consumer applies back-pressure to the
//! network read instead of buffering the whole body.

pub mod converter;
pub mod error;
pub mod event;
pub mod framer;

pub use converter::{convert, pipeline, TypedStream};
pub use error::StreamError;
pub use event::DataEvent;
pub use framer::{consume_stream, frame_events, FramerOptions, SseLineCodec};
