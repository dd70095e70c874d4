pub mod config;
pub mod error;
pub mod guard;
pub mod llm;
pub mod parser;
pub mod pipeline;
pub mod prompt;
pub mod result;
pub mod schema;
pub mod session;
pub mod sql_format;
pub mod store;

pub use error::{AssistantError, Result};
pub use pipeline::{TranslationOutcome, TranslationRequest, TranslationResult, Translator};
pub use session::Session;
