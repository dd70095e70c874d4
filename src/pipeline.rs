//! Translation Pipeline - natural-language question to (SQL, label)
//!
//! schema introspection -> system prompt -> one completion call ->
//! JSON parsing -> SQL normalization
//!
//! Every call is stateless. Failures never escape `translate`: they come back
//! as an empty result plus the underlying error.

use crate::error::{AssistantError, Result};
use crate::llm::CompletionService;
use crate::parser::parse_response;
use crate::prompt::{build_system_prompt, compose_user_message, ChatMessage};
use crate::schema::introspect;
use crate::sql_format::normalize_sql;
use crate::store::DataStore;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// One user interaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationRequest {
    /// The question, or the prior question when refining
    pub question: String,
    pub refinement: Option<String>,
}

impl TranslationRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            refinement: None,
        }
    }

    pub fn refine(prior_question: impl Into<String>, refinement: impl Into<String>) -> Self {
        Self {
            question: prior_question.into(),
            refinement: Some(refinement.into()),
        }
    }

    pub fn user_message(&self) -> String {
        compose_user_message(&self.question, self.refinement.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationResult {
    pub sql: String,
    pub label: String,
}

impl TranslationResult {
    /// Empty SQL means nothing should be executed.
    pub fn has_sql(&self) -> bool {
        !self.sql.trim().is_empty()
    }
}

/// Result plus the diagnostic when translation failed
#[derive(Debug)]
pub struct TranslationOutcome {
    pub result: TranslationResult,
    pub failure: Option<AssistantError>,
}

impl TranslationOutcome {
    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }

    pub fn into_result(self) -> Result<TranslationResult> {
        match self.failure {
            Some(err) => Err(err),
            None => Ok(self.result),
        }
    }
}

pub struct Translator<C: CompletionService> {
    client: C,
}

impl<C: CompletionService> Translator<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Messages sent to the completion service for `request`.
    pub fn build_messages(&self, request: &TranslationRequest, store: &dyn DataStore) -> Result<Vec<ChatMessage>> {
        let schema = introspect(store)?;
        Ok(vec![
            build_system_prompt(&schema),
            ChatMessage::user(request.user_message()),
        ])
    }

    async fn try_translate(&self, request: &TranslationRequest, store: &dyn DataStore) -> Result<TranslationResult> {
        let messages = self.build_messages(request, store)?;
        let raw = self.client.complete(&messages).await?;
        let parsed = parse_response(&raw)?;

        if parsed.sql.trim().is_empty() {
            warn!("Model response carried no SQL (label: {})", parsed.label);
        }

        Ok(TranslationResult {
            sql: normalize_sql(&parsed.sql),
            label: parsed.label,
        })
    }

    /// Translate one request. Never fails: errors are reported in the outcome
    /// alongside an empty `("", "")` result.
    pub async fn translate_request(&self, request: &TranslationRequest, store: &dyn DataStore) -> TranslationOutcome {
        match self.try_translate(request, store).await {
            Ok(result) => {
                info!("Translated question into SQL labelled {:?}", result.label);
                TranslationOutcome {
                    result,
                    failure: None,
                }
            }
            Err(e) => {
                error!("Failed to generate or parse SQL: {}", e);
                TranslationOutcome {
                    result: TranslationResult::default(),
                    failure: Some(e),
                }
            }
        }
    }

    /// `translate(question, store[, prior_question, refinement])`
    ///
    /// With both `prior_question` and `refinement`, the prior question is
    /// refined and `question` is ignored.
    pub async fn translate(
        &self,
        question: &str,
        store: &dyn DataStore,
        prior_question: Option<&str>,
        refinement: Option<&str>,
    ) -> TranslationOutcome {
        let request = match (prior_question, refinement) {
            (Some(prior), Some(refinement)) => TranslationRequest::refine(prior, refinement),
            (None, Some(refinement)) => TranslationRequest::refine(question, refinement),
            _ => TranslationRequest::new(question),
        };
        self.translate_request(&request, store).await
    }
}
