pub mod gemini;
pub mod retry;

pub use gemini::{GeminiTransport, GenerateRequest, GenerationConfig, HttpReply, Transport, TransportError};
pub use retry::{RetryPolicy, RetryingCaller};
