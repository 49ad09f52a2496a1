//! Tracing instrumentation for scheduled tasks.
//!
//! Every task runs inside a [`tracing`] span created by [`task_span`]. Span
//! and attribute names follow the OpenTelemetry database semantic
//! conventions so that a `tracing-opentelemetry` layer in the host
//! application exports them without renaming.
//!
//! ## Semantic Conventions
//!
//! - `db.system`: "postgresql"
//! - `db.statement`: SQL statement (sanitized if configured)
//! - `db.operation`: Query operation type (SELECT, INSERT, etc.)
//! - `db.connection_id`: Driver-local connection id
//! - `pgq.task_id`: Task id returned by the binding surface

use tracing::Span;

use crate::connection::ConnectionId;
use crate::task::{Request, Task};

/// Database system identifier.
pub const DB_SYSTEM: &str = "postgresql";

/// Span names for task kinds.
pub mod span_names {
    /// Span name for CONNECT tasks.
    pub const CONNECT: &str = "pgq.connect";
    /// Span name for EXECUTE tasks.
    pub const EXECUTE: &str = "pgq.execute";
    /// Span name for DISCONNECT tasks.
    pub const DISCONNECT: &str = "pgq.disconnect";
}

/// Attribute keys following OpenTelemetry semantic conventions.
pub mod attributes {
    /// Database system type.
    pub const DB_SYSTEM: &str = "db.system";
    /// SQL statement (may be sanitized).
    pub const DB_STATEMENT: &str = "db.statement";
    /// Database operation type.
    pub const DB_OPERATION: &str = "db.operation";
    /// Connection ID.
    pub const DB_CONNECTION_ID: &str = "db.connection_id";
    /// Task ID.
    pub const TASK_ID: &str = "pgq.task_id";
}

/// Configuration for SQL statement sanitization.
#[derive(Debug, Clone)]
pub struct SanitizationConfig {
    /// Whether to sanitize SQL statements.
    pub enabled: bool,
    /// Maximum length of statement to record.
    pub max_length: usize,
    /// Placeholder to use for sanitized values.
    pub placeholder: String,
}

impl Default for SanitizationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_length: 2048,
            placeholder: "?".to_string(),
        }
    }
}

impl SanitizationConfig {
    /// Create a configuration that doesn't sanitize statements.
    #[must_use]
    pub fn no_sanitization() -> Self {
        Self {
            enabled: false,
            max_length: usize::MAX,
            placeholder: String::new(),
        }
    }

    /// Sanitize a SQL statement according to the configuration.
    #[must_use]
    pub fn sanitize(&self, sql: &str) -> String {
        if !self.enabled {
            return truncate_string(sql, self.max_length);
        }
        let sanitized = sanitize_sql(sql, &self.placeholder);
        truncate_string(&sanitized, self.max_length)
    }
}

/// Replace string and numeric literals with `placeholder`.
///
/// Handles `'...'` literals (with `''` escapes, including `E'...'`) and
/// dollar-quoted bodies. Double-quoted identifiers and `$n` parameters are
/// left alone.
fn sanitize_sql(sql: &str, placeholder: &str) -> String {
    let mut result = String::with_capacity(sql.len());
    let mut chars = sql.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            '\'' => {
                if result.ends_with(['E', 'e']) && !ends_with_word(&result[..result.len() - 1]) {
                    result.pop();
                }
                loop {
                    match chars.next() {
                        Some((_, '\'')) if chars.next_if(|(_, c)| *c == '\'').is_some() => {}
                        Some((_, '\'')) | None => break,
                        Some(_) => {}
                    }
                }
                result.push_str(placeholder);
            }
            '"' => {
                result.push(c);
                for (_, c) in chars.by_ref() {
                    result.push(c);
                    if c == '"' {
                        break;
                    }
                }
            }
            '$' => {
                let rest = &sql[pos + 1..];
                if rest.starts_with(|ch: char| ch.is_ascii_digit()) {
                    // Positional parameter: keep it.
                    result.push(c);
                    while let Some((_, d)) = chars.next_if(|(_, d)| d.is_ascii_digit()) {
                        result.push(d);
                    }
                } else if let Some(tag_len) = rest.find('$').filter(|&n| {
                    rest[..n].chars().all(|ch| ch.is_alphanumeric() || ch == '_')
                }) {
                    let tag = &sql[pos..pos + tag_len + 2];
                    let body_start = pos + tag.len();
                    let end = sql[body_start..]
                        .find(tag)
                        .map_or(sql.len(), |n| body_start + n + tag.len());
                    while chars.next_if(|(i, _)| *i < end).is_some() {}
                    result.push_str(placeholder);
                } else {
                    result.push(c);
                }
            }
            c if c.is_ascii_digit() && !ends_with_word(&result) => {
                while chars
                    .next_if(|(_, ch)| ch.is_ascii_digit() || *ch == '.')
                    .is_some()
                {}
                result.push_str(placeholder);
            }
            c => result.push(c),
        }
    }

    result
}

fn ends_with_word(s: &str) -> bool {
    s.ends_with(|ch: char| ch.is_alphanumeric() || ch == '_')
}

/// Truncate a string to a maximum length, respecting char boundaries.
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut cut = max_len.saturating_sub(3);
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &s[..cut])
}

/// Extract the operation type from a SQL statement.
#[must_use]
pub fn extract_operation(sql: &str) -> &'static str {
    let keyword = sql
        .trim_start()
        .split(|c: char| !c.is_ascii_alphabetic())
        .next()
        .unwrap_or("")
        .to_ascii_uppercase();

    match keyword.as_str() {
        "SELECT" | "WITH" => "SELECT",
        "INSERT" => "INSERT",
        "UPDATE" => "UPDATE",
        "DELETE" => "DELETE",
        "COPY" => "COPY",
        "BEGIN" | "START" => "BEGIN",
        "COMMIT" | "END" => "COMMIT",
        "ROLLBACK" | "ABORT" => "ROLLBACK",
        "CREATE" => "CREATE",
        "ALTER" => "ALTER",
        "DROP" => "DROP",
        "SET" => "SET",
        _ => "OTHER",
    }
}

/// Create the span a task runs in.
pub fn task_span(connection: ConnectionId, task: &Task, sanitization: &SanitizationConfig) -> Span {
    match task.request() {
        Request::Connect { .. } => tracing::debug_span!(
            span_names::CONNECT,
            db.system = DB_SYSTEM,
            db.connection_id = connection.get(),
            pgq.task_id = task.id().get(),
        ),
        Request::Disconnect => tracing::debug_span!(
            span_names::DISCONNECT,
            db.system = DB_SYSTEM,
            db.connection_id = connection.get(),
            pgq.task_id = task.id().get(),
        ),
        Request::Execute { query } => tracing::debug_span!(
            span_names::EXECUTE,
            db.system = DB_SYSTEM,
            db.connection_id = connection.get(),
            pgq.task_id = task.id().get(),
            db.operation = extract_operation(query),
            db.statement = %sanitization.sanitize(query),
        ),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn span_metadata(task: &Task) -> (&'static str, Vec<&'static str>) {
        let subscriber = tracing_subscriber::registry();
        tracing::subscriber::with_default(subscriber, || {
            let span = task_span(ConnectionId(7), task, &SanitizationConfig::default());
            let metadata = span.metadata().unwrap();
            let fields = metadata.fields().iter().map(|field| field.name()).collect();
            (metadata.name(), fields)
        })
    }

    #[test]
    fn test_task_span_names_and_fields() {
        let (name, fields) = span_metadata(&Task::connect("dbname=app"));
        assert_eq!(name, span_names::CONNECT);
        assert_eq!(
            fields,
            [attributes::DB_SYSTEM, attributes::DB_CONNECTION_ID, attributes::TASK_ID]
        );

        let (name, _) = span_metadata(&Task::disconnect());
        assert_eq!(name, span_names::DISCONNECT);

        let (name, fields) = span_metadata(&Task::execute("SELECT 1"));
        assert_eq!(name, span_names::EXECUTE);
        assert!(fields.contains(&attributes::DB_OPERATION));
        assert!(fields.contains(&attributes::DB_STATEMENT));
    }

    #[test]
    fn test_extract_operation() {
        assert_eq!(extract_operation("SELECT * FROM users"), "SELECT");
        assert_eq!(extract_operation("  select id from users"), "SELECT");
        assert_eq!(extract_operation("WITH t AS (SELECT 1) SELECT * FROM t"), "SELECT");
        assert_eq!(extract_operation("INSERT INTO users VALUES (1)"), "INSERT");
        assert_eq!(extract_operation("UPDATE users SET name = 'foo'"), "UPDATE");
        assert_eq!(extract_operation("DELETE FROM users"), "DELETE");
        assert_eq!(extract_operation("BEGIN"), "BEGIN");
        assert_eq!(extract_operation("START TRANSACTION"), "BEGIN");
        assert_eq!(extract_operation("COMMIT"), "COMMIT");
        assert_eq!(extract_operation("ROLLBACK"), "ROLLBACK");
        assert_eq!(extract_operation("CREATE TABLE foo"), "CREATE");
        assert_eq!(extract_operation("VACUUM"), "OTHER");
        assert_eq!(extract_operation(""), "OTHER");
    }

    #[test]
    fn test_sanitize_literals() {
        let p = "?";
        assert_eq!(
            sanitize_sql("SELECT * FROM users WHERE name = 'Alice'", p),
            "SELECT * FROM users WHERE name = ?"
        );
        assert_eq!(
            sanitize_sql("INSERT INTO t VALUES ('a', 'b')", p),
            "INSERT INTO t VALUES (?, ?)"
        );
        assert_eq!(
            sanitize_sql("SELECT * WHERE name = 'O''Brien'", p),
            "SELECT * WHERE name = ?"
        );
        assert_eq!(sanitize_sql("SELECT * WHERE id = 42.5", p), "SELECT * WHERE id = ?");
        assert_eq!(sanitize_sql("SELECT E'a\\nb'", p), "SELECT ?");
    }

    #[test]
    fn test_sanitize_keeps_identifiers_and_parameters() {
        let p = "?";
        assert_eq!(
            sanitize_sql("SELECT \"Col1\" FROM t2 WHERE id = $1", p),
            "SELECT \"Col1\" FROM t2 WHERE id = $1"
        );
    }

    #[test]
    fn test_sanitize_dollar_quoted() {
        let p = "?";
        assert_eq!(
            sanitize_sql("SELECT $$it's secret$$, 1", p),
            "SELECT ?, ?"
        );
        assert_eq!(
            sanitize_sql("DO $body$ BEGIN PERFORM 1; END $body$", p),
            "DO ?"
        );
    }

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("hello", 10), "hello");
        assert_eq!(truncate_string("hello world", 8), "hello...");
        assert_eq!(truncate_string("hi", 2), "hi");
        assert_eq!(truncate_string("ééééé", 6), "é...");
    }

    #[test]
    fn test_sanitization_config_no_sanitization() {
        let config = SanitizationConfig::no_sanitization();
        assert!(!config.enabled);

        let sql = "SELECT * FROM users WHERE name = 'Alice'";
        assert_eq!(config.sanitize(sql), sql);
    }
}
