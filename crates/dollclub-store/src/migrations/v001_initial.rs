//! v001 -- Initial schema creation.
//!
//! Creates the three core tables: `conversations`, `private_messages`, and
//! `profiles`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Conversations
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS conversations (
    id               TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    participant_id   TEXT NOT NULL,              -- hosted-auth uid of the other side
    participant_name TEXT,
    unread_count     INTEGER NOT NULL DEFAULT 0,
    online           INTEGER NOT NULL DEFAULT 0, -- boolean
    created_at       TEXT NOT NULL               -- ISO-8601 / RFC-3339
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_conversations_participant
    ON conversations(participant_id);

-- ----------------------------------------------------------------
-- Private messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS private_messages (
    id              TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    conversation_id TEXT NOT NULL,               -- FK -> conversations(id)
    outgoing        INTEGER NOT NULL,            -- boolean: sent by this user
    kind            TEXT NOT NULL,               -- text | sticker | voice
    content         TEXT NOT NULL,               -- body / sticker id / media ref
    duration_ms     INTEGER,                     -- voice messages only
    timestamp       TEXT NOT NULL,               -- ISO-8601

    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_private_messages_conv_ts
    ON private_messages(conversation_id, timestamp DESC);

-- ----------------------------------------------------------------
-- Cached profiles
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS profiles (
    user_id      TEXT PRIMARY KEY NOT NULL,      -- hosted-auth uid
    display_name TEXT,
    avatar_url   TEXT,
    diamonds     INTEGER NOT NULL DEFAULT 0,
    role         TEXT NOT NULL DEFAULT 'member',
    banned       INTEGER NOT NULL DEFAULT 0,     -- boolean
    updated_at   TEXT NOT NULL
);
"#;

/// Apply the migration.
pub fn up(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(UP_SQL)
}
