//! OpenAI chat-completions client used as Xerobot's text generator.
//!
//! Pure HTTP client; retry and fallback policy live with the caller.

mod client;
mod error;
mod openai;
mod types;

pub use client::{DEFAULT_MAX_TOKENS, DEFAULT_MODEL, LlmClient};
pub use error::{LlmError, Result};
pub use types::{ChatMessage, ChatResponse, Role, Usage};
