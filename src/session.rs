//! # Session
//!
//! Conversation history scoped to the indexed document, stored in SQLite via Diesel.
//!
//! There is at most one conversation at a time. Ingesting a document with a new id discards the
//! previous conversation and its messages. Re-ingesting the same id keeps them.
//!
//! A question and its answer are written together in one transaction, so history never holds
//! a question without its answer.

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::{Connection, SqliteConnection};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::models::{Conversation, Message};
use crate::schema::{conversations, messages};
use crate::{RagError, Result};

const SCHEMA_DDL: &str = "
CREATE TABLE IF NOT EXISTS conversations (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    document_id TEXT NOT NULL,
    fingerprint TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    conversation_id INTEGER REFERENCES conversations(id)
);
";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(role: &str) -> Result<Self> {
        match role {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(RagError::Session(format!("unknown message role {other:?}"))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

pub struct Session {
    connection: SqliteConnection,
    conversation: Option<Conversation>,
}

impl Session {
    /// Open (creating if needed) the session database at `db_url` and restore the active
    /// conversation, if any. `":memory:"` gives a throwaway database.
    pub fn open(db_url: &str) -> Result<Self> {
        if db_url != ":memory:" {
            if let Some(parent) = Path::new(db_url).parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
        }

        let mut connection = SqliteConnection::establish(db_url)?;
        connection.batch_execute(SCHEMA_DDL)?;

        let conversation = conversations::table
            .order(conversations::id.desc())
            .select(Conversation::as_select())
            .first(&mut connection)
            .optional()?;

        debug!("Opened session at {}: {:?}", db_url, conversation);
        Ok(Self {
            connection,
            conversation,
        })
    }

    pub fn active_document(&self) -> Option<&Conversation> {
        self.conversation.as_ref()
    }

    /// Make `document_id` the active document.
    ///
    /// Returns `true` when a fresh conversation was started, which discards any history about
    /// a different document. Returns `false` when `document_id` was already active; its
    /// history is kept and only the fingerprint is refreshed.
    pub fn on_new_upload(&mut self, document_id: &str, fingerprint: &str) -> Result<bool> {
        if let Some(current) = &self.conversation {
            if current.document_id == document_id {
                if current.fingerprint != fingerprint {
                    diesel::update(
                        conversations::table.filter(conversations::document_id.eq(document_id)),
                    )
                    .set(conversations::fingerprint.eq(fingerprint))
                    .execute(&mut self.connection)?;
                }
                self.conversation = Some(Conversation {
                    fingerprint: fingerprint.to_string(),
                    ..current.clone()
                });
                return Ok(false);
            }
        }

        let new_conversation = Conversation {
            id: None,
            document_id: document_id.to_string(),
            fingerprint: fingerprint.to_string(),
        };
        let conversation = self
            .connection
            .transaction::<_, diesel::result::Error, _>(|conn| {
                diesel::delete(messages::table).execute(conn)?;
                diesel::delete(conversations::table).execute(conn)?;
                diesel::insert_into(conversations::table)
                    .values(&new_conversation)
                    .returning(Conversation::as_returning())
                    .get_result(conn)
            })?;

        info!("Started a new conversation about {}", document_id);
        self.conversation = Some(conversation);
        Ok(true)
    }

    /// All turns about the active document, oldest first.
    pub fn history(&mut self) -> Result<Vec<ConversationTurn>> {
        let Some(conversation) = &self.conversation else {
            return Ok(Vec::new());
        };

        let rows: Vec<Message> = messages::table
            .filter(messages::conversation_id.eq(conversation.id))
            .order(messages::id.asc())
            .select(Message::as_select())
            .load(&mut self.connection)?;

        rows.into_iter()
            .map(|row| {
                Ok(ConversationTurn {
                    role: Role::parse(&row.role)?,
                    content: row.content,
                })
            })
            .collect()
    }

    /// Append a question and its answer in one transaction.
    pub fn record_turn(&mut self, question: &str, answer: &str) -> Result<()> {
        let conversation_id = match &self.conversation {
            Some(conversation) => conversation.id,
            None => {
                return Err(RagError::Session(
                    "no document has been ingested yet".to_string(),
                ));
            }
        };

        let rows = [(Role::User, question), (Role::Assistant, answer)].map(|(role, content)| {
            Message {
                id: None,
                role: role.as_str().to_string(),
                content: content.to_string(),
                conversation_id,
            }
        });

        self.connection
            .transaction::<_, diesel::result::Error, _>(|conn| {
                for row in &rows {
                    diesel::insert_into(messages::table)
                        .values(row)
                        .execute(conn)?;
                }
                Ok(())
            })?;
        Ok(())
    }
}
