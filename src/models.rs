//! Diesel row types for the session database.
//!
//! See [`crate::schema`] for the table definitions and [`crate::session`] for how rows are
//! read and written.

use diesel::prelude::*;

/// The conversation about the currently indexed document.
#[derive(Queryable, Identifiable, Insertable, Debug, Selectable, Clone, PartialEq)]
#[diesel(table_name = crate::schema::conversations)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Conversation {
    /// Auto-increment primary key (set by the DB on insert).
    #[diesel(deserialize_as = i32)]
    pub id: Option<i32>,
    /// File name of the ingested document.
    pub document_id: String,
    /// blake3 digest of the document text at ingestion time.
    pub fingerprint: String,
}

impl Conversation {
    #[inline]
    pub fn id(&self) -> Option<i32> {
        self.id
    }
}

#[derive(Queryable, Associations, Insertable, Debug, Selectable, Clone, PartialEq)]
#[diesel(belongs_to(Conversation))]
#[diesel(table_name = crate::schema::messages)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Message {
    #[diesel(deserialize_as = i32)]
    pub id: Option<i32>,
    /// `"user"` or `"assistant"`.
    pub role: String,
    pub content: String,
    pub conversation_id: Option<i32>,
}
