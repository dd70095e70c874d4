//! SQL Normalizer - canonical layout for generated SQL
//!
//! Tokenizes with sqlparser and re-lays the token stream:
//! - keywords (and known function names in call position) are upper-cased
//! - each top-level clause starts a new line
//! - top-level commas break the line, aligning items under the first one
//! - top-level AND/OR start an indented continuation line
//! - parenthesised content stays inline
//!
//! Original whitespace is discarded, so formatting already formatted SQL is a
//! no-op. There is no semantic validation here.

use sqlparser::dialect::SQLiteDialect;
use sqlparser::tokenizer::{Token, Tokenizer, Whitespace, Word};
use tracing::warn;

const KEYWORDS: &[&str] = &[
    "ALL", "ALTER", "AND", "AS", "ASC", "BETWEEN", "BY", "CASE", "CAST", "COLLATE", "CREATE",
    "CROSS", "DELETE", "DESC", "DISTINCT", "DROP", "ELSE", "END", "ESCAPE", "EXCEPT", "EXISTS",
    "FROM", "FULL", "GLOB", "GROUP", "HAVING", "IN", "INNER", "INSERT", "INTERSECT", "INTO", "IS",
    "JOIN", "LEFT", "LIKE", "LIMIT", "NATURAL", "NOT", "NULL", "OFFSET", "ON", "OR", "ORDER",
    "OUTER", "OVER", "PARTITION", "RECURSIVE", "RIGHT", "SELECT", "SET", "TABLE", "THEN", "UNION",
    "UPDATE", "USING", "VALUES", "WHEN", "WHERE", "WITH",
];

/// Upper-cased only when immediately followed by `(`
const FUNCTIONS: &[&str] = &[
    "ABS", "AVG", "COALESCE", "COUNT", "DATE", "DATETIME", "DENSE_RANK", "GROUP_CONCAT", "IFNULL",
    "INSTR", "JULIANDAY", "LAG", "LEAD", "LENGTH", "LOWER", "MAX", "MIN", "NULLIF", "RANK",
    "REPLACE", "ROUND", "ROW_NUMBER", "STRFTIME", "SUBSTR", "SUM", "TIME", "TOTAL", "TRIM",
    "UPPER",
];

const JOIN_MODIFIERS: &[&str] = &["LEFT", "RIGHT", "INNER", "OUTER", "FULL", "CROSS", "NATURAL"];

/// Keywords that never start a clause's first item
const NO_ALIGN: &[&str] = &[
    "ALL", "BY", "DISTINCT", "RECURSIVE", "JOIN", "LEFT", "RIGHT", "INNER", "OUTER", "FULL",
    "CROSS", "NATURAL",
];

const CONTINUATION_INDENT: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Start,
    Keyword,
    Word,
    Open,
    Close,
    Comma,
    Dot,
    Semi,
    Operator,
    Sign,
    Other,
}

fn needs_space(prev: Kind, cur: Kind) -> bool {
    match (prev, cur) {
        (Kind::Start, _) => false,
        (_, Kind::Comma | Kind::Close | Kind::Semi | Kind::Dot) => false,
        (Kind::Open | Kind::Dot | Kind::Sign, _) => false,
        (Kind::Word, Kind::Open) => false,
        _ => true,
    }
}

fn word_upper(token: &Token) -> Option<String> {
    match token {
        Token::Word(w) if w.quote_style.is_none() => Some(w.value.to_uppercase()),
        _ => None,
    }
}

fn render_quoted(word: &Word, quote: char) -> String {
    let end = if quote == '[' { ']' } else { quote };
    let doubled: String = [end, end].iter().collect();
    format!("{}{}{}", quote, word.value.replace(end, &doubled), end)
}

struct Layout {
    out: String,
    prev: Kind,
    prev_keyword: Option<String>,
    depth: usize,
    case_depth: usize,
    align: usize,
    align_pending: bool,
    between_pending: bool,
    at_line_start: bool,
    force_newline: bool,
}

impl Layout {
    fn new() -> Self {
        Self {
            out: String::new(),
            prev: Kind::Start,
            prev_keyword: None,
            depth: 0,
            case_depth: 0,
            align: 0,
            align_pending: false,
            between_pending: false,
            at_line_start: true,
            force_newline: false,
        }
    }

    fn column(&self) -> usize {
        let line_start = self.out.rfind('\n').map(|i| i + 1).unwrap_or(0);
        self.out[line_start..].chars().count()
    }

    fn newline(&mut self, indent: usize) {
        let trimmed = self.out.trim_end_matches(' ').len();
        self.out.truncate(trimmed);
        self.out.push('\n');
        self.out.push_str(&" ".repeat(indent));
        self.at_line_start = true;
        self.force_newline = false;
    }

    fn top_level(&self) -> bool {
        self.depth == 0 && self.case_depth == 0
    }

    fn emit(&mut self, text: &str, kind: Kind, capture_align: bool) {
        if self.force_newline {
            let indent = if self.depth == 0 { self.align } else { 0 };
            self.newline(indent);
        }
        if !self.at_line_start && (needs_space(self.prev, kind) || self.would_open_comment(text)) {
            self.out.push(' ');
        }
        if self.align_pending && self.depth == 0 && capture_align {
            self.align = self.column();
            self.align_pending = false;
        }
        self.out.push_str(text);
        self.at_line_start = false;
        self.prev = kind;
    }

    /// `-` `-` or `/` `*` written back to back would start a comment.
    fn would_open_comment(&self, text: &str) -> bool {
        (self.out.ends_with('-') && text.starts_with('-'))
            || (self.out.ends_with('/') && text.starts_with('*'))
    }

    fn start_clause(&mut self) {
        if !self.out.is_empty() {
            self.newline(0);
        }
        self.align = 0;
        self.align_pending = true;
    }

    fn is_clause_start(&self, tokens: &[Token], i: usize, upper: &str) -> bool {
        if !self.top_level() {
            return false;
        }
        let after_modifier = self
            .prev_keyword
            .as_deref()
            .map(|k| JOIN_MODIFIERS.contains(&k))
            .unwrap_or(false)
            && self.prev == Kind::Keyword;

        match upper {
            "SELECT" | "FROM" | "WHERE" | "HAVING" | "LIMIT" | "OFFSET" | "UNION" | "INTERSECT"
            | "EXCEPT" | "WITH" | "VALUES" => true,
            "GROUP" | "ORDER" => tokens
                .get(i + 1)
                .and_then(word_upper)
                .map(|next| next == "BY")
                .unwrap_or(false),
            "JOIN" => !after_modifier,
            m if JOIN_MODIFIERS.contains(&m) => {
                if after_modifier {
                    return false;
                }
                // A modifier run must end in JOIN
                tokens[i + 1..]
                    .iter()
                    .map(word_upper)
                    .take_while(|w| w.is_some())
                    .flatten()
                    .find(|w| !JOIN_MODIFIERS.contains(&w.as_str()))
                    .map(|w| w == "JOIN")
                    .unwrap_or(false)
            }
            _ => false,
        }
    }

    /// Words that are keywords only in one position, e.g. `NULLS LAST`.
    fn is_contextual_keyword(&self, tokens: &[Token], i: usize, upper: &str) -> bool {
        match upper {
            "NULLS" => matches!(
                tokens.get(i + 1).and_then(word_upper).as_deref(),
                Some("FIRST" | "LAST")
            ),
            "FIRST" | "LAST" => {
                self.prev == Kind::Keyword && self.prev_keyword.as_deref() == Some("NULLS")
            }
            "FILTER" => self.prev == Kind::Close && matches!(tokens.get(i + 1), Some(Token::LParen)),
            _ => false,
        }
    }

    fn push_keyword(&mut self, tokens: &[Token], i: usize, upper: String) {
        let clause_start = self.is_clause_start(tokens, i, &upper);
        if clause_start {
            self.start_clause();
        } else if (upper == "AND" || upper == "OR") && self.top_level() {
            if upper == "AND" && self.between_pending {
                self.between_pending = false;
            } else {
                self.newline(CONTINUATION_INDENT);
            }
        }

        match upper.as_str() {
            "BETWEEN" if self.top_level() => self.between_pending = true,
            "CASE" => self.case_depth += 1,
            "END" => self.case_depth = self.case_depth.saturating_sub(1),
            _ => {}
        }

        // The first item of a clause sets the alignment, not the clause keyword
        let capture = !clause_start && !NO_ALIGN.contains(&upper.as_str());
        self.emit(&upper, Kind::Keyword, capture);
        self.prev_keyword = Some(upper);
    }

    fn push(&mut self, tokens: &[Token], i: usize) {
        let token = &tokens[i];
        match token {
            Token::Word(w) => match w.quote_style {
                Some(q) => self.emit(&render_quoted(w, q), Kind::Word, true),
                None => {
                    let upper = w.value.to_uppercase();
                    let call = matches!(tokens.get(i + 1), Some(Token::LParen));
                    if upper == "CAST" && call {
                        self.emit(&upper, Kind::Word, true);
                        return;
                    }
                    if KEYWORDS.contains(&upper.as_str())
                        || self.is_contextual_keyword(tokens, i, &upper)
                    {
                        self.push_keyword(tokens, i, upper);
                        return;
                    }
                    if call && FUNCTIONS.contains(&upper.as_str()) {
                        self.emit(&upper, Kind::Word, true);
                    } else {
                        self.emit(&w.value, Kind::Word, true);
                    }
                }
            },
            Token::Comma => {
                if self.top_level() {
                    self.emit(",", Kind::Comma, false);
                    let align = self.align;
                    self.newline(align);
                } else {
                    self.emit(",", Kind::Comma, false);
                }
            }
            Token::LParen => {
                self.emit("(", Kind::Open, true);
                self.depth += 1;
            }
            Token::RParen => {
                self.depth = self.depth.saturating_sub(1);
                self.emit(")", Kind::Close, false);
            }
            Token::Period => self.emit(".", Kind::Dot, false),
            Token::SemiColon => {
                self.emit(";", Kind::Semi, false);
                if self.depth == 0 {
                    self.align = 0;
                    self.align_pending = false;
                    self.between_pending = false;
                    self.case_depth = 0;
                    self.force_newline = i + 1 < tokens.len();
                }
            }
            Token::Plus | Token::Minus => {
                let unary = matches!(
                    self.prev,
                    Kind::Start | Kind::Open | Kind::Comma | Kind::Operator | Kind::Keyword | Kind::Sign
                );
                let kind = if unary { Kind::Sign } else { Kind::Operator };
                self.emit(&token.to_string(), kind, true);
            }
            Token::Eq
            | Token::DoubleEq
            | Token::Neq
            | Token::Lt
            | Token::Gt
            | Token::LtEq
            | Token::GtEq
            | Token::Spaceship
            | Token::Mul
            | Token::Div
            | Token::Mod
            | Token::StringConcat => self.emit(&token.to_string(), Kind::Operator, true),
            Token::SingleQuotedString(s) => {
                self.emit(&format!("'{}'", s.replace('\'', "''")), Kind::Other, true)
            }
            Token::Whitespace(Whitespace::SingleLineComment { comment, prefix }) => {
                self.emit(&format!("{}{}", prefix, comment.trim_end()), Kind::Other, false);
                self.force_newline = true;
            }
            Token::Whitespace(Whitespace::MultiLineComment(comment)) => {
                self.emit(&format!("/*{}*/", comment), Kind::Other, false)
            }
            Token::Whitespace(_) | Token::EOF => {}
            other => self.emit(&other.to_string(), Kind::Other, true),
        }
    }

    fn finish(self) -> String {
        self.out.trim_end().to_string()
    }
}

/// Reformat `sql` into canonical, indented, keyword-upper-cased text.
///
/// Text the tokenizer rejects is returned trimmed but otherwise unchanged.
pub fn normalize_sql(sql: &str) -> String {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let dialect = SQLiteDialect {};
    let tokens = match Tokenizer::new(&dialect, trimmed).tokenize() {
        Ok(tokens) => tokens,
        Err(e) => {
            warn!("SQL tokenizing failed: {}, leaving query unformatted", e);
            return trimmed.to_string();
        }
    };

    let tokens: Vec<Token> = tokens
        .into_iter()
        .filter(|t| {
            !matches!(
                t,
                Token::EOF
                    | Token::Whitespace(Whitespace::Space | Whitespace::Newline | Whitespace::Tab)
            )
        })
        .collect();

    let mut layout = Layout::new();
    for i in 0..tokens.len() {
        layout.push(&tokens, i);
    }
    layout.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collapse(s: &str) -> String {
        s.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_count_query() {
        let sql = normalize_sql("select count(*) from orders");
        assert_eq!(sql, "SELECT COUNT(*)\nFROM orders");
        assert!(collapse(&sql).contains("SELECT COUNT(*) FROM orders"));
    }

    #[test]
    fn test_clauses_commas_and_conditions() {
        let sql = normalize_sql(
            "select a, b from t where x = 1 and y between 1 and 5 order by a desc limit 3",
        );
        assert_eq!(
            sql,
            "SELECT a,\n       b\nFROM t\nWHERE x = 1\n  AND y BETWEEN 1 AND 5\nORDER BY a DESC\nLIMIT 3"
        );
    }

    #[test]
    fn test_join_layout() {
        let sql = normalize_sql(
            "select o.id, c.name from orders o left join customers c on o.cid = c.id",
        );
        assert_eq!(
            sql,
            "SELECT o.id,\n       c.name\nFROM orders o\nLEFT JOIN customers c ON o.cid = c.id"
        );
    }

    #[test]
    fn test_subquery_stays_inline() {
        let sql = normalize_sql("select * from (select id from t where a = 1 and b = 2) sub");
        assert_eq!(sql, "SELECT *\nFROM (SELECT id FROM t WHERE a = 1 AND b = 2) sub");
    }

    #[test]
    fn test_case_expression_not_split() {
        let sql = normalize_sql("select case when a > 1 and b < 2 then 'x' else 'y' end as lbl from t");
        assert_eq!(
            sql,
            "SELECT CASE WHEN a > 1 AND b < 2 THEN 'x' ELSE 'y' END AS lbl\nFROM t"
        );
    }

    #[test]
    fn test_functions_only_uppercased_when_called() {
        let sql = normalize_sql("select date(created), max(amount), date from t");
        assert_eq!(sql, "SELECT DATE(created),\n       MAX(amount),\n       date\nFROM t");
    }

    #[test]
    fn test_literals_and_quoting_preserved() {
        let sql = normalize_sql(r#"select "Order Id" from t where name = 'O''Brien' and x = -1"#);
        assert_eq!(
            sql,
            "SELECT \"Order Id\"\nFROM t\nWHERE name = 'O''Brien'\n  AND x = -1"
        );
    }

    #[test]
    fn test_idempotent() {
        let queries = [
            "select count(*) from orders",
            "select a, b from t where x = 1 and y between 1 and 5 order by a desc limit 3",
            "with recent as (select * from orders where year = 2023) select customer, sum(amount) as total from recent group by customer order by total desc limit 5",
            "select o.id from orders o inner join customers c on o.cid = c.id union all select id from archive;",
            "select a -- pick a\n, b from t",
            "select case when a > 1 then 'x' end, t.* from t where a in (1, 2, 3) or b is not null",
        ];
        for q in queries {
            let once = normalize_sql(q);
            assert_eq!(normalize_sql(&once), once, "not idempotent for {:?}", q);
        }
    }

    #[test]
    fn test_union_starts_new_lines() {
        let sql = normalize_sql("select id from a union all select id from b");
        assert_eq!(sql, "SELECT id\nFROM a\nUNION ALL\nSELECT id\nFROM b");
    }

    #[test]
    fn test_unary_minus_never_becomes_comment() {
        assert_eq!(normalize_sql("select - -x as v from t"), "SELECT - -x AS v\nFROM t");
        assert_eq!(normalize_sql("select x from t where x = - -2"), "SELECT x\nFROM t\nWHERE x = - -2");
        assert_eq!(normalize_sql("select (- -1) as v"), "SELECT (- -1) AS v");
        assert_eq!(normalize_sql("select x - -1 from t"), "SELECT x - -1\nFROM t");
    }

    #[test]
    fn test_cast_filter_and_nulls_ordering() {
        assert_eq!(
            normalize_sql("select cast(amount as integer) from t"),
            "SELECT CAST(amount AS integer)\nFROM t"
        );
        assert_eq!(
            normalize_sql("select count(*) filter (where a > 1) from t"),
            "SELECT COUNT(*) FILTER (WHERE a > 1)\nFROM t"
        );
        assert_eq!(
            normalize_sql("select a from t order by a desc nulls last"),
            "SELECT a\nFROM t\nORDER BY a DESC NULLS LAST"
        );
        // Plain identifiers that happen to share those names stay as written
        assert_eq!(normalize_sql("select first, last, filter from t"), "SELECT first,\n       last,\n       filter\nFROM t");
    }

    fn rows(conn: &rusqlite::Connection, sql: &str) -> Vec<Vec<rusqlite::types::Value>> {
        let mut stmt = conn
            .prepare(sql)
            .unwrap_or_else(|e| panic!("{:?} failed to prepare: {}", sql, e));
        let width = stmt.column_count();
        let mut out = Vec::new();
        let mut result = stmt.query([]).unwrap();
        while let Some(row) = result.next().unwrap() {
            out.push((0..width).map(|i| row.get(i).unwrap()).collect());
        }
        out
    }

    #[test]
    fn test_normalized_queries_return_same_rows() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE t (id INTEGER, name TEXT, amount REAL);
             INSERT INTO t VALUES (1, 'alpha', 5.5), (2, 'beta', 20.0), (3, 'gamma', NULL), (4, 'able', 42.0);",
        )
        .unwrap();

        let queries = [
            "select - -id as v, name from t order by id",
            "select id from t where amount > - -2 order by id",
            "select (- -1) as v",
            "select id - -1 as n from t order by id",
            "select cast(amount as integer) as a, name from t order by id",
            "select name from t where id in (select id from t where amount between 1 and 50) order by name",
            "select id -- the key\n, name from t /* all rows */ order by id",
            "select count(*) filter (where amount > 10) as big, count(*) as total from t",
            "select name from t order by amount desc nulls last, id",
            "select id, case when amount > 10 and name like 'a%' then 'big' else 'small' end as size from t order by id",
            "select name, sum(amount) as s from t group by name having s > 1 or s is null order by name limit 3",
        ];
        for q in queries {
            let normalized = normalize_sql(q);
            assert_eq!(rows(&conn, &normalized), rows(&conn, q), "rows differ for {:?} -> {:?}", q, normalized);
            assert_eq!(normalize_sql(&normalized), normalized, "not idempotent for {:?}", q);
        }
    }

    #[test]
    fn test_unformattable_returned_trimmed() {
        assert_eq!(normalize_sql("  select 'unterminated  "), "select 'unterminated");
        assert_eq!(normalize_sql("   "), "");
    }
}
