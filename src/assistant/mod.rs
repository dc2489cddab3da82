pub mod decoder;
pub mod http;
pub mod models;
pub mod session;

pub use decoder::{StreamDecoder, StreamEvent};
pub use http::HttpCompletionTransport;
pub use models::{ChatMessage, ChatRequestContext, CompletionRequest, Role, StreamFrame};
pub use session::ChatSession;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use thiserror::Error;

pub const DEFAULT_GREETING: &str = "Hi! I'm your VYAPAR AI assistant. I can help you with invoices, customers, inventory, and business insights. What would you like to know?";

/// Failures of one chat exchange.
///
/// The `Display` text of the exchange failures is what the user sees as the
/// assistant's reply, so keep it human readable.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Message is empty")]
    EmptyMessage,
    #[error("A response is already being generated")]
    Busy,
    #[error("Rate limit exceeded. Please try again later.")]
    RateLimited,
    #[error("AI credits exhausted. Please add more credits.")]
    CreditsExhausted,
    #[error("Failed to get response")]
    RequestFailed(String),
}

/// Raw response from the completion endpoint before any decoding.
pub struct CompletionResponse {
    pub status: u16,
    pub body: BoxStream<'static, Result<Bytes, ChatError>>,
}

/// Sends a transcript to the completion endpoint.
///
/// Headers and authentication belong to the implementation; the session only
/// looks at the status code and the body bytes.
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    async fn send(&self, request: &CompletionRequest) -> Result<CompletionResponse, ChatError>;
}
