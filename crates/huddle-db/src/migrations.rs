use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE users (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                username        TEXT NOT NULL UNIQUE,
                email           TEXT NOT NULL UNIQUE,
                password_hash   TEXT NOT NULL,
                avatar_url      TEXT,
                created_at      TEXT NOT NULL
            );

            -- direct_key is 'low:high' for 1:1 chats and NULL for groups,
            -- so the unordered pair is unique at the storage layer.
            CREATE TABLE conversations (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                name            TEXT,
                is_group        INTEGER NOT NULL DEFAULT 0,
                created_by_id   INTEGER NOT NULL REFERENCES users(id) ON DELETE RESTRICT,
                direct_key      TEXT UNIQUE,
                created_at      TEXT NOT NULL
            );

            CREATE TABLE conversation_members (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id INTEGER NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                user_id         INTEGER NOT NULL REFERENCES users(id) ON DELETE RESTRICT,
                role            TEXT NOT NULL DEFAULT 'member' CHECK (role IN ('admin', 'member')),
                joined_at       TEXT NOT NULL,
                UNIQUE(conversation_id, user_id)
            );

            CREATE INDEX idx_members_user
                ON conversation_members(user_id);

            CREATE TABLE messages (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id INTEGER NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                sender_id       INTEGER NOT NULL REFERENCES users(id) ON DELETE RESTRICT,
                content         TEXT,
                attachment_url  TEXT,
                sent_at         TEXT NOT NULL,
                edited_at       TEXT,
                is_deleted      INTEGER NOT NULL DEFAULT 0,
                CHECK (content IS NOT NULL OR attachment_url IS NOT NULL)
            );

            CREATE INDEX idx_messages_conversation
                ON messages(conversation_id, sent_at);

            CREATE TABLE message_reactions (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id      INTEGER NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                user_id         INTEGER NOT NULL REFERENCES users(id) ON DELETE RESTRICT,
                emoji           TEXT NOT NULL CHECK (length(emoji) > 0),
                reacted_at      TEXT NOT NULL,
                UNIQUE(message_id, user_id, emoji)
            );

            CREATE INDEX idx_reactions_message
                ON message_reactions(message_id);

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
