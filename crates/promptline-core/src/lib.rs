pub mod config;
pub mod error;

pub use config::{PromptlineConfig, RetryConfig, StreamConfig};
pub use error::{ApiError, CoreError, Result};
