pub mod catalog;
pub mod client;
pub mod completions;
pub mod error;
pub mod messages;
pub mod models;
pub mod retry;
pub mod stream;

pub use client::Client;
pub use error::ClientError;
pub use models::{
    CompletionRequest, CompletionResponse, Message, MessageRequest, MessageResponse, Model,
    ModelList, Role,
};
pub use promptline_core::ApiError;
pub use promptline_stream::{FramerOptions, StreamError, TypedStream};
pub use retry::{ExponentialBackoff, HttpStatus, Jitter, RandomJitter, RetryPolicy};
