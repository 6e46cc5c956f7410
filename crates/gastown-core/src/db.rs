//! SQL access layer for the external Dolt server.
//!
//! Engine logic is written against the [`SqlConn`] trait so the retention
//! engine and mailbox can be driven by scripted fakes in tests. The
//! production implementation speaks the MySQL wire protocol to the Dolt
//! server on loopback.
//!
//! Identifier hygiene: database names are interpolated into SQL (the wire
//! protocol has no placeholder for identifiers), so every name is gated by
//! a conservative regex first. Values always travel as `?` placeholders.

use std::sync::LazyLock;
use std::time::Duration;

use mysql::prelude::Queryable;
use mysql::{Conn, Opts, OptsBuilder, Params, Value};
use regex::Regex;

static VALID_DB_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[A-Za-z0-9_]+$").expect("static regex"));

/// Whether `name` is safe to interpolate as a database identifier.
#[must_use]
pub fn is_valid_db_name(name: &str) -> bool {
    !name.is_empty() && VALID_DB_NAME.is_match(name)
}

/// Errors from the SQL layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// Could not open a connection to the server.
    #[error("open connection to {database}: {source}")]
    Connect {
        /// Database name the connection targeted.
        database: String,
        /// Driver failure.
        #[source]
        source: mysql::Error,
    },

    /// A statement failed.
    #[error("{context}: {source}")]
    Query {
        /// What the statement was doing.
        context: &'static str,
        /// Driver failure.
        #[source]
        source: mysql::Error,
    },

    /// A batched phase ran past its wall-clock deadline.
    #[error("batch phase deadline exceeded after {0:?}")]
    Deadline(Duration),

    /// Database name failed identifier validation.
    #[error("invalid database name: {0:?}")]
    InvalidName(String),

    /// Failure raised by a non-driver implementation (test fakes).
    #[error("{0}")]
    Other(String),
}

/// A single untyped SQL value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL.
    Null,
    /// Any integer column.
    Int(i64),
    /// Text, bytes, and temporal columns, decoded as text.
    Text(String),
}

impl SqlValue {
    /// The value as text, if it is text.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The value as an integer, accepting numeric text.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Text(s) => s.parse().ok(),
            Self::Null => None,
        }
    }

    /// The value as a boolean (nonzero integers are true).
    #[must_use]
    pub fn as_bool(&self) -> bool {
        self.as_i64().is_some_and(|i| i != 0)
    }
}

/// One result row.
pub type SqlRow = Vec<SqlValue>;

/// A connection capable of running the control plane's statements.
///
/// `params` are positional `?` placeholders, passed as text; the server
/// coerces datetime strings where needed.
pub trait SqlConn {
    /// Execute a statement, returning the number of affected rows.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] when the statement fails.
    fn exec(&mut self, sql: &str, params: &[String]) -> Result<u64, DbError>;

    /// Run a single-value COUNT-style query.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] when the query fails.
    fn query_count(&mut self, sql: &str, params: &[String]) -> Result<i64, DbError>;

    /// Run a single-column query of strings (id selects).
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] when the query fails.
    fn query_strings(&mut self, sql: &str, params: &[String]) -> Result<Vec<String>, DbError>;

    /// Run an arbitrary query, returning untyped rows.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] when the query fails.
    fn query_rows(&mut self, sql: &str, params: &[String]) -> Result<Vec<SqlRow>, DbError>;
}

/// Opens connections for the retention engine, one per (database, phase).
///
/// Connections are short-lived by design: no pool is shared across patrols
/// or across cycles.
pub trait ConnOpener: Send + Sync {
    /// Open a connection to `database` with the given socket timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Connect`] when the server is unreachable and
    /// [`DbError::InvalidName`] when the name fails validation.
    fn open(
        &self,
        database: &str,
        read_timeout: Duration,
        write_timeout: Duration,
    ) -> Result<Box<dyn SqlConn>, DbError>;
}

/// Production opener: MySQL wire protocol to the Dolt server on loopback.
#[derive(Debug, Clone)]
pub struct DoltOpener {
    host: String,
    port: u16,
}

impl DoltOpener {
    /// Opener for a Dolt server on `127.0.0.1:port`.
    #[must_use]
    pub fn new(port: u16) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port,
        }
    }
}

impl ConnOpener for DoltOpener {
    fn open(
        &self,
        database: &str,
        read_timeout: Duration,
        write_timeout: Duration,
    ) -> Result<Box<dyn SqlConn>, DbError> {
        if !is_valid_db_name(database) {
            return Err(DbError::InvalidName(database.to_string()));
        }
        let opts = OptsBuilder::new()
            .ip_or_hostname(Some(self.host.clone()))
            .tcp_port(self.port)
            .user(Some("root"))
            .db_name(Some(database))
            .prefer_socket(false)
            .tcp_connect_timeout(Some(Duration::from_secs(5)))
            .read_timeout(Some(read_timeout))
            .write_timeout(Some(write_timeout));
        let conn = Conn::new(Opts::from(opts)).map_err(|source| DbError::Connect {
            database: database.to_string(),
            source,
        })?;
        Ok(Box::new(MysqlConn { conn }))
    }
}

/// [`SqlConn`] over a live MySQL-protocol connection.
pub struct MysqlConn {
    conn: Conn,
}

fn to_params(params: &[String]) -> Params {
    Params::Positional(params.iter().map(|p| Value::from(p.as_str())).collect())
}

fn convert_value(value: Value) -> SqlValue {
    match value {
        Value::NULL => SqlValue::Null,
        Value::Int(i) => SqlValue::Int(i),
        Value::UInt(u) => SqlValue::Int(i64::try_from(u).unwrap_or(i64::MAX)),
        Value::Bytes(bytes) => SqlValue::Text(String::from_utf8_lossy(&bytes).into_owned()),
        Value::Float(f) => SqlValue::Text(f.to_string()),
        Value::Double(d) => SqlValue::Text(d.to_string()),
        Value::Date(y, mo, d, h, mi, s, _) => {
            SqlValue::Text(format!("{y:04}-{mo:02}-{d:02} {h:02}:{mi:02}:{s:02}"))
        }
        Value::Time(neg, days, h, m, s, _) => {
            let sign = if neg { "-" } else { "" };
            SqlValue::Text(format!("{sign}{:02}:{m:02}:{s:02}", u32::from(h) + days * 24))
        }
    }
}

impl SqlConn for MysqlConn {
    fn exec(&mut self, sql: &str, params: &[String]) -> Result<u64, DbError> {
        // Parameterless statements (SET, CALL) go over the text protocol;
        // some servers refuse to prepare them.
        let affected = if params.is_empty() {
            self.conn
                .query_iter(sql)
                .map_err(|source| DbError::Query {
                    context: "execute statement",
                    source,
                })?
                .affected_rows()
        } else {
            self.conn
                .exec_iter(sql, to_params(params))
                .map_err(|source| DbError::Query {
                    context: "execute statement",
                    source,
                })?
                .affected_rows()
        };
        Ok(affected)
    }

    fn query_count(&mut self, sql: &str, params: &[String]) -> Result<i64, DbError> {
        let count: Option<i64> = if params.is_empty() {
            self.conn.query_first(sql)
        } else {
            self.conn.exec_first(sql, to_params(params))
        }
        .map_err(|source| DbError::Query {
            context: "count query",
            source,
        })?;
        Ok(count.unwrap_or(0))
    }

    fn query_strings(&mut self, sql: &str, params: &[String]) -> Result<Vec<String>, DbError> {
        if params.is_empty() {
            self.conn.query(sql)
        } else {
            self.conn.exec(sql, to_params(params))
        }
        .map_err(|source| DbError::Query {
            context: "id query",
            source,
        })
    }

    fn query_rows(&mut self, sql: &str, params: &[String]) -> Result<Vec<SqlRow>, DbError> {
        let rows: Vec<mysql::Row> = if params.is_empty() {
            self.conn.query(sql)
        } else {
            self.conn.exec(sql, to_params(params))
        }
        .map_err(|source| DbError::Query {
            context: "row query",
            source,
        })?;
        Ok(rows
            .into_iter()
            .map(|row| row.unwrap().into_iter().map(convert_value).collect())
            .collect())
    }
}

/// Disables autocommit on entry and restores it on every exit path.
///
/// The retention engine collapses many row deletions into one logical
/// revision per (database, phase); autocommit must stay off only for the
/// duration of that phase, including early returns and errors.
pub struct AutocommitGuard<'a> {
    conn: &'a mut dyn SqlConn,
}

impl<'a> AutocommitGuard<'a> {
    /// Disable autocommit on `conn`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] when the SET statement fails; the guard is not
    /// created in that case.
    pub fn disable(conn: &'a mut dyn SqlConn) -> Result<Self, DbError> {
        conn.exec("SET @@autocommit = 0", &[])?;
        Ok(Self { conn })
    }

    /// The guarded connection.
    pub fn conn(&mut self) -> &mut dyn SqlConn {
        self.conn
    }
}

impl Drop for AutocommitGuard<'_> {
    fn drop(&mut self) {
        let _ = self.conn.exec("SET @@autocommit = 1", &[]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_name_validation() {
        assert!(is_valid_db_name("hq"));
        assert!(is_valid_db_name("beads_hop"));
        assert!(is_valid_db_name("Db2024"));
        assert!(!is_valid_db_name(""));
        assert!(!is_valid_db_name("bad-name"));
        assert!(!is_valid_db_name("drop table;--"));
        assert!(!is_valid_db_name("a`b"));
        assert!(!is_valid_db_name("white space"));
    }

    #[test]
    fn sql_value_accessors() {
        assert_eq!(SqlValue::Int(7).as_i64(), Some(7));
        assert_eq!(SqlValue::Text("12".into()).as_i64(), Some(12));
        assert_eq!(SqlValue::Null.as_i64(), None);
        assert!(SqlValue::Int(1).as_bool());
        assert!(!SqlValue::Int(0).as_bool());
        assert!(!SqlValue::Null.as_bool());
        assert_eq!(SqlValue::Text("hi".into()).as_str(), Some("hi"));
    }

    /// Minimal fake: records statements, restores autocommit on drop.
    struct RecordingConn {
        statements: Vec<String>,
    }

    impl SqlConn for RecordingConn {
        fn exec(&mut self, sql: &str, _params: &[String]) -> Result<u64, DbError> {
            self.statements.push(sql.to_string());
            Ok(0)
        }
        fn query_count(&mut self, _sql: &str, _params: &[String]) -> Result<i64, DbError> {
            Ok(0)
        }
        fn query_strings(&mut self, _sql: &str, _params: &[String]) -> Result<Vec<String>, DbError> {
            Ok(Vec::new())
        }
        fn query_rows(&mut self, _sql: &str, _params: &[String]) -> Result<Vec<SqlRow>, DbError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn autocommit_guard_restores_on_drop() {
        let mut conn = RecordingConn {
            statements: Vec::new(),
        };
        {
            let mut guard = AutocommitGuard::disable(&mut conn).unwrap();
            guard.conn().exec("DELETE FROM t", &[]).unwrap();
        }
        assert_eq!(
            conn.statements,
            [
                "SET @@autocommit = 0",
                "DELETE FROM t",
                "SET @@autocommit = 1"
            ]
        );
    }
}
