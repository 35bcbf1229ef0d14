pub mod ai;
pub mod auth;
pub mod config;
pub mod error;
pub mod history;
pub mod language;
pub mod ocr;
pub mod orchestrator;
pub mod prompt;
pub mod rate_limiter;
pub mod render;
pub mod request;
pub mod state;
pub mod storage;

// Re-export main types for convenience
pub use ai::{GeminiTransport, RetryPolicy, RetryingCaller, Transport};
pub use auth::{AuthError, Identity, LocalIdentity, User};
pub use config::Config;
pub use error::{Error, Result};
pub use history::{DocumentStore, OrderField, ReportRecord, SqliteHistory};
pub use language::Language;
pub use ocr::{Ocr, TesseractOcr};
pub use orchestrator::{Failed, Orchestrator, Persistence, ReportOutcome, Stage};
pub use prompt::PromptBuilder;
pub use rate_limiter::RateLimiter;
pub use render::{food_verdict, AiCallResult, FoodVerdict};
pub use request::{AnalysisRequest, RequestKind};
pub use state::{ChatRole, ChatTurn, Conversation, ConversationContext};
pub use storage::{LocalObjectStorage, ObjectStorage};
