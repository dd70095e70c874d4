//! Read-only guard
//!
//! The system prompt asks the model for SELECT statements only. This check
//! enforces it before anything is executed: exactly one statement, and that
//! statement must be a query.

use crate::error::{AssistantError, Result};
use sqlparser::ast::{SetExpr, Statement};
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer};
use tracing::{debug, warn};

const READ_STARTS: &[&str] = &["SELECT", "WITH", "VALUES"];

const WRITE_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "ATTACH", "DETACH", "PRAGMA",
    "VACUUM", "REINDEX", "ANALYZE", "BEGIN", "COMMIT", "ROLLBACK", "SAVEPOINT", "RELEASE",
];

fn violation(reason: impl Into<String>) -> AssistantError {
    AssistantError::ReadOnlyViolation(reason.into())
}

/// Accept `sql` only if it is a single read-only query.
pub fn ensure_read_only(sql: &str) -> Result<()> {
    let dialect = SQLiteDialect {};
    match Parser::parse_sql(&dialect, sql) {
        Ok(statements) => match statements.as_slice() {
            [] => Err(violation("empty statement")),
            [Statement::Query(query)] => match *query.body {
                SetExpr::Insert(_) | SetExpr::Update(_) => {
                    Err(violation("query body modifies data"))
                }
                _ => Ok(()),
            },
            [other] => Err(violation(format!(
                "statement is not a query: {}",
                statement_head(other)
            ))),
            many => Err(violation(format!("expected one statement, found {}", many.len()))),
        },
        Err(e) => {
            // sqlparser does not cover every SQLite construct
            warn!("SQL parsing failed: {}, using lexical check", e);
            lexical_check(sql)
        }
    }
}

fn statement_head(statement: &Statement) -> String {
    statement
        .to_string()
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_uppercase()
}

fn lexical_check(sql: &str) -> Result<()> {
    let dialect = SQLiteDialect {};
    let tokens = Tokenizer::new(&dialect, sql)
        .tokenize()
        .map_err(|e| violation(format!("could not tokenize: {}", e)))?;

    let significant: Vec<&Token> = tokens
        .iter()
        .filter(|t| !matches!(t, Token::Whitespace(_) | Token::EOF))
        .collect();

    let first = significant.first().and_then(|t| match t {
        Token::Word(w) if w.quote_style.is_none() => Some(w.value.to_uppercase()),
        _ => None,
    });
    match first {
        Some(ref word) if READ_STARTS.contains(&word.as_str()) => {}
        _ => return Err(violation("statement does not start with SELECT, WITH or VALUES")),
    }

    if let Some(pos) = significant.iter().position(|t| matches!(t, Token::SemiColon)) {
        if pos + 1 < significant.len() {
            return Err(violation("multiple statements"));
        }
    }

    let write = significant.iter().find_map(|t| match t {
        Token::Word(w) if w.quote_style.is_none() => {
            let upper = w.value.to_uppercase();
            WRITE_KEYWORDS.contains(&upper.as_str()).then_some(upper)
        }
        _ => None,
    });
    if let Some(keyword) = write {
        return Err(violation(format!("statement contains {}", keyword)));
    }

    debug!("Lexical read-only check passed");
    Ok(())
}
