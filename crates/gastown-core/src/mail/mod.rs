//! Mailbox model for protocol messages.
//!
//! A message is a durable row addressed to a single recipient. The mailbox
//! contract is deliberately small (list and delete) with no ordering
//! guarantee beyond timestamp monotonicity of append. The drainer in
//! [`drain`] is the only bulk consumer.

pub mod drain;

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;

use crate::db::{DbError, SqlConn, SqlValue};

/// One protocol message.
#[derive(Debug, Clone)]
pub struct Message {
    /// Row ID.
    pub id: String,
    /// Opaque subject line; prefixes drive drain classification.
    pub subject: String,
    /// Message body.
    pub body: String,
    /// Sender address.
    pub sender: String,
    /// Recipient address.
    pub recipient: String,
    /// Append timestamp.
    pub timestamp: DateTime<Utc>,
    /// Whether the recipient has read it.
    pub read: bool,
    /// Ephemeral flag: safe to reap once read and aged.
    pub wisp: bool,
}

/// Errors from mailbox operations.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    /// Underlying SQL failure.
    #[error(transparent)]
    Db(#[from] DbError),

    /// Delete targeted a message that no longer exists.
    #[error("message not found: {0}")]
    NotFound(String),
}

/// Messages for a single recipient address.
pub trait Mailbox {
    /// The recipient address this mailbox serves.
    fn address(&self) -> &str;

    /// List all messages, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`MailError`] when the backing store fails.
    fn list(&mut self) -> Result<Vec<Message>, MailError>;

    /// Delete a message by ID.
    ///
    /// # Errors
    ///
    /// Returns [`MailError::NotFound`] when the ID does not exist, and
    /// [`MailError::Db`] on store failures.
    fn delete(&mut self, id: &str) -> Result<(), MailError>;
}

/// Mailbox backed by the `messages` table of the shared database.
pub struct DbMailbox<'a> {
    conn: &'a mut dyn SqlConn,
    address: String,
}

impl<'a> DbMailbox<'a> {
    /// Mailbox for `address` over an open connection.
    pub fn new(conn: &'a mut dyn SqlConn, address: impl Into<String>) -> Self {
        Self {
            conn,
            address: address.into(),
        }
    }
}

impl Mailbox for DbMailbox<'_> {
    fn address(&self) -> &str {
        &self.address
    }

    fn list(&mut self) -> Result<Vec<Message>, MailError> {
        let rows = self.conn.query_rows(
            "SELECT id, subject, body, sender, recipient, created_at, read_flag, wisp \
             FROM messages WHERE recipient = ? ORDER BY created_at",
            std::slice::from_ref(&self.address),
        )?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            match parse_message_row(&row) {
                Some(message) => messages.push(message),
                None => warn!(address = %self.address, "skipping malformed message row"),
            }
        }
        Ok(messages)
    }

    fn delete(&mut self, id: &str) -> Result<(), MailError> {
        let affected = self.conn.exec(
            "DELETE FROM messages WHERE id = ? AND recipient = ?",
            &[id.to_string(), self.address.clone()],
        )?;
        if affected == 0 {
            return Err(MailError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

fn parse_message_row(row: &[SqlValue]) -> Option<Message> {
    let text = |i: usize| row.get(i).and_then(SqlValue::as_str).map(str::to_string);
    let timestamp = row.get(5).and_then(SqlValue::as_str).and_then(|s| {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
            .ok()
            .map(|naive| naive.and_utc())
    })?;

    Some(Message {
        id: text(0)?,
        subject: text(1).unwrap_or_default(),
        body: text(2).unwrap_or_default(),
        sender: text(3).unwrap_or_default(),
        recipient: text(4).unwrap_or_default(),
        timestamp,
        read: row.get(6).is_some_and(SqlValue::as_bool),
        wisp: row.get(7).is_some_and(SqlValue::as_bool),
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use super::{MailError, Mailbox, Message};

    /// In-memory mailbox for drain tests.
    pub struct MemoryMailbox {
        pub address: String,
        pub messages: Vec<Message>,
        /// IDs whose deletion should fail.
        pub refuse: Vec<String>,
    }

    impl MemoryMailbox {
        pub fn new(address: &str, messages: Vec<Message>) -> Self {
            Self {
                address: address.to_string(),
                messages,
                refuse: Vec::new(),
            }
        }
    }

    impl Mailbox for MemoryMailbox {
        fn address(&self) -> &str {
            &self.address
        }

        fn list(&mut self) -> Result<Vec<Message>, MailError> {
            Ok(self.messages.clone())
        }

        fn delete(&mut self, id: &str) -> Result<(), MailError> {
            if self.refuse.iter().any(|r| r == id) {
                return Err(MailError::NotFound(id.to_string()));
            }
            let before = self.messages.len();
            self.messages.retain(|m| m.id != id);
            if self.messages.len() == before {
                return Err(MailError::NotFound(id.to_string()));
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_row() {
        let row = vec![
            SqlValue::Text("m1".into()),
            SqlValue::Text("POLECAT_DONE nux".into()),
            SqlValue::Text("done".into()),
            SqlValue::Text("gastown/polecats/nux".into()),
            SqlValue::Text("gastown/witness".into()),
            SqlValue::Text("2026-08-01 12:00:00".into()),
            SqlValue::Int(1),
            SqlValue::Int(0),
        ];
        let message = parse_message_row(&row).unwrap();
        assert_eq!(message.id, "m1");
        assert!(message.read);
        assert!(!message.wisp);
        assert_eq!(message.timestamp.to_rfc3339(), "2026-08-01T12:00:00+00:00");
    }

    #[test]
    fn rejects_row_without_timestamp() {
        let row = vec![
            SqlValue::Text("m1".into()),
            SqlValue::Text("subject".into()),
            SqlValue::Null,
            SqlValue::Null,
            SqlValue::Null,
            SqlValue::Null,
        ];
        assert!(parse_message_row(&row).is_none());
    }
}
