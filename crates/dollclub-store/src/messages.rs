use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use dollclub_shared::types::{ConversationId, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Conversation, MessageBody, PrivateMessage};

impl Database {
    /// Create a conversation with `participant` or return the existing one.
    pub fn upsert_conversation(
        &self,
        participant_id: &UserId,
        participant_name: Option<&str>,
    ) -> Result<Conversation> {
        if let Ok(existing) = self.conversation_for_participant(participant_id) {
            return Ok(existing);
        }

        let id = ConversationId::new();
        let now = Utc::now();

        self.conn().execute(
            "INSERT INTO conversations (id, participant_id, participant_name, unread_count, online, created_at)
             VALUES (?1, ?2, ?3, 0, 0, ?4)",
            params![
                id.0.to_string(),
                participant_id.0,
                participant_name,
                now.to_rfc3339(),
            ],
        )?;

        Ok(Conversation {
            id,
            participant_id: participant_id.clone(),
            participant_name: participant_name.map(|s| s.to_string()),
            unread_count: 0,
            online: false,
            created_at: now,
        })
    }

    pub fn conversation_for_participant(&self, participant_id: &UserId) -> Result<Conversation> {
        self.conn()
            .query_row(
                "SELECT id, participant_id, participant_name, unread_count, online, created_at
                 FROM conversations WHERE participant_id = ?1",
                params![participant_id.0],
                row_to_conversation,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    pub fn list_conversations(&self) -> Result<Vec<Conversation>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, participant_id, participant_name, unread_count, online, created_at
             FROM conversations
             ORDER BY created_at DESC",
        )?;

        let rows = stmt.query_map([], row_to_conversation)?;

        let mut conversations = Vec::new();
        for row in rows {
            conversations.push(row?);
        }
        Ok(conversations)
    }

    /// Store a message.  Incoming messages bump the conversation's unread
    /// counter.
    pub fn insert_message(&self, message: &PrivateMessage) -> Result<()> {
        let (kind, content, duration_ms) = match &message.body {
            MessageBody::Text { text } => ("text", text.as_str(), None),
            MessageBody::Sticker { sticker_id } => ("sticker", sticker_id.as_str(), None),
            MessageBody::Voice {
                media_ref,
                duration_ms,
            } => ("voice", media_ref.as_str(), Some(*duration_ms)),
        };

        self.conn().execute(
            "INSERT INTO private_messages (id, conversation_id, outgoing, kind, content, duration_ms, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                message.id.to_string(),
                message.conversation_id.0.to_string(),
                message.outgoing,
                kind,
                content,
                duration_ms,
                message.timestamp.to_rfc3339(),
            ],
        )?;

        if !message.outgoing {
            self.conn().execute(
                "UPDATE conversations SET unread_count = unread_count + 1 WHERE id = ?1",
                params![message.conversation_id.0.to_string()],
            )?;
        }

        Ok(())
    }

    pub fn messages_for_conversation(
        &self,
        conversation_id: ConversationId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<PrivateMessage>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, conversation_id, outgoing, kind, content, duration_ms, timestamp
             FROM private_messages
             WHERE conversation_id = ?1
             ORDER BY timestamp DESC
             LIMIT ?2 OFFSET ?3",
        )?;

        let rows = stmt.query_map(
            params![conversation_id.0.to_string(), limit, offset],
            row_to_message,
        )?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Clear the unread counter of a conversation.
    pub fn mark_read(&self, conversation_id: ConversationId) -> Result<()> {
        self.conn().execute(
            "UPDATE conversations SET unread_count = 0 WHERE id = ?1",
            params![conversation_id.0.to_string()],
        )?;
        Ok(())
    }

    /// Update the presence flag shown next to a conversation.
    pub fn set_online(&self, conversation_id: ConversationId, online: bool) -> Result<()> {
        self.conn().execute(
            "UPDATE conversations SET online = ?1 WHERE id = ?2",
            params![online, conversation_id.0.to_string()],
        )?;
        Ok(())
    }
}

fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    let id_str: String = row.get(0)?;
    let participant_id: String = row.get(1)?;
    let participant_name: Option<String> = row.get(2)?;
    let unread_count: u32 = row.get(3)?;
    let online: bool = row.get(4)?;
    let ts_str: String = row.get(5)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&ts_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Conversation {
        id: ConversationId(id),
        participant_id: UserId(participant_id),
        participant_name,
        unread_count,
        online,
        created_at,
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<PrivateMessage> {
    let id_str: String = row.get(0)?;
    let conv_id_str: String = row.get(1)?;
    let outgoing: bool = row.get(2)?;
    let kind: String = row.get(3)?;
    let content: String = row.get(4)?;
    let duration_ms: Option<u32> = row.get(5)?;
    let ts_str: String = row.get(6)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let conversation_id = Uuid::parse_str(&conv_id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let body = match kind.as_str() {
        "sticker" => MessageBody::Sticker {
            sticker_id: content,
        },
        "voice" => MessageBody::Voice {
            media_ref: content,
            duration_ms: duration_ms.unwrap_or(0),
        },
        _ => MessageBody::Text { text: content },
    };

    let timestamp: DateTime<Utc> = DateTime::parse_from_rfc3339(&ts_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(PrivateMessage {
        id,
        conversation_id: ConversationId(conversation_id),
        outgoing,
        body,
        timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    #[test]
    fn conversation_upsert_is_stable() {
        let (_dir, db) = open_db();
        let other = UserId("other-uid".into());

        let a = db.upsert_conversation(&other, Some("Mei")).unwrap();
        let b = db.upsert_conversation(&other, None).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(db.list_conversations().unwrap().len(), 1);
    }

    #[test]
    fn message_round_trip_per_kind() {
        let (_dir, db) = open_db();
        let conv = db
            .upsert_conversation(&UserId("other".into()), None)
            .unwrap();

        let bodies = vec![
            MessageBody::Text {
                text: "hello".into(),
            },
            MessageBody::Sticker {
                sticker_id: "wave-3".into(),
            },
            MessageBody::Voice {
                media_ref: "blob://v1".into(),
                duration_ms: 2_400,
            },
        ];

        for body in &bodies {
            db.insert_message(&PrivateMessage {
                id: Uuid::new_v4(),
                conversation_id: conv.id,
                outgoing: true,
                body: body.clone(),
                timestamp: Utc::now(),
            })
            .unwrap();
        }

        let loaded = db.messages_for_conversation(conv.id, 10, 0).unwrap();
        assert_eq!(loaded.len(), 3);
        for body in bodies {
            assert!(loaded.iter().any(|m| m.body == body));
        }
    }

    #[test]
    fn incoming_messages_bump_unread_until_marked_read() {
        let (_dir, db) = open_db();
        let other = UserId("other".into());
        let conv = db.upsert_conversation(&other, None).unwrap();

        for _ in 0..3 {
            db.insert_message(&PrivateMessage {
                id: Uuid::new_v4(),
                conversation_id: conv.id,
                outgoing: false,
                body: MessageBody::Text { text: "hi".into() },
                timestamp: Utc::now(),
            })
            .unwrap();
        }

        let loaded = db.conversation_for_participant(&other).unwrap();
        assert_eq!(loaded.unread_count, 3);

        db.mark_read(conv.id).unwrap();
        let loaded = db.conversation_for_participant(&other).unwrap();
        assert_eq!(loaded.unread_count, 0);
    }
}
