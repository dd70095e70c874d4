//! Caller-owned session state and bounded query history
//!
//! The pipeline is stateless; everything that spans interactions (the last
//! question, its SQL and rows, a pending refinement, history) lives here and
//! is passed in explicitly.

use crate::error::{AssistantError, Result};
use crate::guard::ensure_read_only;
use crate::llm::CompletionService;
use crate::pipeline::{TranslationRequest, TranslationResult, Translator};
use crate::result::QueryRows;
use crate::store::DataStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{info, warn};

/// Maximum number of history entries kept
pub const HISTORY_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub label: String,
    pub sql: String,
    pub results: QueryRows,
    pub recorded_at: DateTime<Utc>,
}

/// Most recent results, oldest first.
///
/// A result carrying the same label as the newest entry replaces that
/// entry's query and rows instead of adding a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryHistory {
    entries: VecDeque<HistoryEntry>,
    limit: usize,
}

impl Default for QueryHistory {
    fn default() -> Self {
        Self::with_limit(HISTORY_LIMIT)
    }
}

impl QueryHistory {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(limit),
            limit,
        }
    }

    pub fn record(&mut self, label: &str, sql: &str, results: QueryRows) {
        if let Some(last) = self.entries.back_mut() {
            if last.label == label {
                last.sql = sql.to_string();
                last.results = results;
                last.recorded_at = Utc::now();
                return;
            }
        }

        self.entries.push_back(HistoryEntry {
            label: label.to_string(),
            sql: sql.to_string(),
            results,
            recorded_at: Utc::now(),
        });
        while self.entries.len() > self.limit {
            self.entries.pop_front();
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn get(&self, index: usize) -> Option<&HistoryEntry> {
        self.entries.get(index)
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Everything one user interaction cycle needs to remember
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub last_question: Option<String>,
    pub last_sql: Option<String>,
    pub last_results: Option<QueryRows>,
    pub pending_refinement: bool,
    pub history: QueryHistory,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate `question`, execute the SQL and record the result.
    pub async fn ask<C: CompletionService>(
        &mut self,
        translator: &Translator<C>,
        store: &dyn DataStore,
        question: &str,
    ) -> Result<TranslationResult> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AssistantError::InvalidInput("Question is empty".to_string()));
        }

        let request = TranslationRequest::new(question);
        let result = self.run(translator, store, &request).await?;
        self.last_question = Some(question.to_string());
        self.pending_refinement = false;
        Ok(result)
    }

    /// Mark the current result as awaiting a refinement.
    pub fn request_refinement(&mut self) {
        self.pending_refinement = true;
    }

    /// Refine the last question with `refinement`.
    pub async fn refine<C: CompletionService>(
        &mut self,
        translator: &Translator<C>,
        store: &dyn DataStore,
        refinement: &str,
    ) -> Result<TranslationResult> {
        let refinement = refinement.trim();
        if refinement.is_empty() {
            return Err(AssistantError::InvalidInput("Please enter your refinement".to_string()));
        }
        let prior = self
            .last_question
            .clone()
            .ok_or_else(|| AssistantError::InvalidInput("There is no question to refine".to_string()))?;

        let request = TranslationRequest::refine(prior, refinement);
        let result = self.run(translator, store, &request).await?;
        self.pending_refinement = false;
        Ok(result)
    }

    async fn run<C: CompletionService>(
        &mut self,
        translator: &Translator<C>,
        store: &dyn DataStore,
        request: &TranslationRequest,
    ) -> Result<TranslationResult> {
        let result = translator.translate_request(request, store).await.into_result()?;
        if !result.has_sql() {
            warn!("Model did not return SQL");
            return Err(AssistantError::NoSql);
        }

        ensure_read_only(&result.sql)?;
        let rows = store.execute_read_query(&result.sql)?;
        info!("{} returned {} rows", result.label, rows.row_count());

        self.history.record(&result.label, &result.sql, rows.clone());
        self.last_sql = Some(result.sql.clone());
        self.last_results = Some(rows);
        Ok(result)
    }

    /// Forget the current question and result; history is kept.
    pub fn reset(&mut self) {
        self.last_question = None;
        self.last_sql = None;
        self.last_results = None;
        self.pending_refinement = false;
    }

    /// Called when the underlying data is replaced.
    pub fn clear_history(&mut self) {
        self.history.clear();
    }
}
