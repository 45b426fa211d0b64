//! SQLite-backed message log.

use super::{Message, MessageId, MessageIdGen, MessageStore};
use crate::error::{Error, Result};
use crate::identity::{ConversationId, PeerId};
use rusqlite::{params, Connection, OpenFlags};
use std::path::Path;
use std::sync::Mutex;

const CREATE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS messages (
    seq          INTEGER PRIMARY KEY AUTOINCREMENT,
    id           INTEGER NOT NULL UNIQUE,
    conversation TEXT    NOT NULL,
    sender       TEXT    NOT NULL,
    text         TEXT    NOT NULL,
    timestamp    INTEGER NOT NULL,
    is_system    INTEGER NOT NULL DEFAULT 0,
    hidden       INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation, seq);
"#;

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Path to the database file.
    pub path: String,
    /// Whether to use an in-memory database (for testing).
    pub in_memory: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: super::DEFAULT_DB_NAME.to_string(),
            in_memory: false,
        }
    }
}

/// Durable message log handle.
///
/// Append order is the rowid order of the `messages` table, which is the
/// ordering guarantee consumers rely on.
pub struct Database {
    conn: Mutex<Connection>,
    ids: MessageIdGen,
}

impl Database {
    /// Open or create a message log database.
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        let conn = if config.in_memory {
            Connection::open_in_memory()
        } else {
            if let Some(parent) = Path::new(&config.path).parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| Error::Storage(format!("failed to create directory: {}", e)))?;
            }

            Connection::open_with_flags(
                &config.path,
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
        }
        .map_err(|e| Error::Storage(format!("failed to open database: {}", e)))?;

        conn.execute_batch(CREATE_SCHEMA)
            .map_err(|e| Error::Storage(format!("failed to create schema: {}", e)))?;

        let ids = MessageIdGen::new();

        // Keep ids monotone across reopen.
        let max_id: Option<i64> = conn
            .query_row("SELECT MAX(id) FROM messages", [], |row| row.get(0))
            .map_err(|e| Error::Storage(format!("failed to read max id: {}", e)))?;
        if let Some(max) = max_id {
            ids.seed(max);
        }

        Ok(Self {
            conn: Mutex::new(conn),
            ids,
        })
    }

    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Storage("database lock poisoned".to_string()))
    }
}

impl MessageStore for Database {
    fn append_with_flags(
        &self,
        from: &PeerId,
        to: &PeerId,
        text: &str,
        is_system: bool,
        hidden: bool,
    ) -> Result<Message> {
        let conversation = ConversationId::of(from, to);
        let message = Message {
            id: self.ids.next(),
            sender: from.clone(),
            text: text.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            is_system,
            hidden,
        };

        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO messages (id, conversation, sender, text, timestamp, is_system, hidden)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                message.id.0,
                conversation.as_str(),
                message.sender.as_str(),
                message.text,
                message.timestamp,
                message.is_system,
                message.hidden,
            ],
        )
        .map_err(|e| Error::Storage(format!("failed to append message: {}", e)))?;

        Ok(message)
    }

    fn read_conversation(&self, a: &PeerId, b: &PeerId) -> Result<Vec<Message>> {
        let conversation = ConversationId::of(a, b);
        let conn = self.lock_conn()?;

        let mut stmt = conn
            .prepare(
                "SELECT id, sender, text, timestamp, is_system, hidden
                 FROM messages WHERE conversation = ?1 ORDER BY seq ASC",
            )
            .map_err(|e| Error::Storage(format!("failed to prepare read: {}", e)))?;

        let rows = stmt
            .query_map(params![conversation.as_str()], |row| {
                Ok(Message {
                    id: MessageId(row.get(0)?),
                    sender: PeerId::new(row.get::<_, String>(1)?),
                    text: row.get(2)?,
                    timestamp: row.get(3)?,
                    is_system: row.get(4)?,
                    hidden: row.get(5)?,
                })
            })
            .map_err(|e| Error::Storage(format!("failed to read conversation: {}", e)))?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row.map_err(|e| Error::Storage(e.to_string()))?);
        }
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::codec::SignalPayload;

    fn open_test_db() -> Database {
        Database::open(&DatabaseConfig {
            in_memory: true,
            ..Default::default()
        })
        .expect("open in-memory db")
    }

    #[test]
    fn test_append_and_read_in_order() {
        let db = open_test_db();
        let alice = PeerId::new("alice@example.com");
        let bob = PeerId::new("bob@example.com");

        db.append_message(&alice, &bob, "first").expect("append");
        db.append_message(&bob, &alice, "second").expect("append");
        db.append_message(&alice, &bob, "third").expect("append");

        let msgs = db.read_conversation(&alice, &bob).expect("read");
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[0].text, "first");
        assert_eq!(msgs[1].text, "second");
        assert_eq!(msgs[2].text, "third");
        // Reading from the other end yields the same log.
        let same = db.read_conversation(&bob, &alice).expect("read");
        assert_eq!(same.len(), 3);
    }

    #[test]
    fn test_signal_append_is_hidden_system() {
        let db = open_test_db();
        let alice = PeerId::new("alice@example.com");
        let bob = PeerId::new("bob@example.com");

        db.append_signal(&alice, &bob, &SignalPayload::Reject)
            .expect("append signal");

        let msgs = db.read_conversation(&alice, &bob).expect("read");
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].is_system);
        assert!(msgs[0].hidden);
        assert!(!msgs[0].is_visible());
        assert!(matches!(msgs[0].signal(), Some(SignalPayload::Reject)));
    }

    #[test]
    fn test_ids_unique_and_monotone() {
        let db = open_test_db();
        let alice = PeerId::new("alice@example.com");
        let bob = PeerId::new("bob@example.com");

        let mut last = MessageId(0);
        for i in 0..20 {
            let msg = db
                .append_message(&alice, &bob, &format!("m{i}"))
                .expect("append");
            assert!(msg.id > last);
            last = msg.id;
        }
    }

    #[test]
    fn test_reopen_keeps_ids_monotone() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir
            .path()
            .join("aviary.db")
            .to_string_lossy()
            .to_string();
        let config = DatabaseConfig {
            path,
            in_memory: false,
        };
        let alice = PeerId::new("alice@example.com");
        let bob = PeerId::new("bob@example.com");

        let first = {
            let db = Database::open(&config).expect("open");
            db.append_message(&alice, &bob, "before").expect("append")
        };

        let db = Database::open(&config).expect("reopen");
        let second = db.append_message(&alice, &bob, "after").expect("append");
        assert!(second.id > first.id);

        let msgs = db.read_conversation(&alice, &bob).expect("read");
        assert_eq!(msgs.len(), 2);
    }
}
