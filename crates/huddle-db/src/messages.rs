use std::collections::HashMap;

use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info, warn};

use huddle_types::models::{MessageView, ReactionView};

use crate::conversations::member_role;
use crate::error::{ChatError, Result};
use crate::models::{MessageRow, ReactionRow};
use crate::{Database, is_blank, now};

impl Database {
    /// Persists a message from a current member and returns it with the
    /// sender's display fields.
    pub fn send_message(
        &self,
        conversation_id: i64,
        sender_id: i64,
        content: Option<&str>,
        attachment_url: Option<&str>,
    ) -> Result<MessageView> {
        if is_blank(content) && is_blank(attachment_url) {
            return Err(ChatError::validation(
                "Message must have content or attachment",
            ));
        }
        let content = content.filter(|c| !c.trim().is_empty());
        let attachment_url = attachment_url.filter(|a| !a.trim().is_empty());

        let message = self.with_tx(|conn| {
            if member_role(conn, conversation_id, sender_id)?.is_none() {
                warn!(conversation_id, sender_id, "Send rejected: not a member");
                return Err(ChatError::forbidden(
                    "User is not a member of this conversation",
                ));
            }

            conn.execute(
                "INSERT INTO messages (conversation_id, sender_id, content, attachment_url, sent_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![conversation_id, sender_id, content, attachment_url, now()],
            )?;

            let id = conn.last_insert_rowid();
            query_message(conn, id)?
                .map(|row| row.into_view(Vec::new()))
                .ok_or_else(|| ChatError::Internal("Failed to fetch created message".into()))
        })?;

        info!(message_id = message.id, conversation_id, sender_id, "Message sent");
        Ok(message)
    }

    /// Replaces the content of the requester's own message. `sent_at` is
    /// never touched.
    pub fn edit_message(&self, message_id: i64, requester_id: i64, new_content: &str) -> Result<MessageView> {
        let message = self.with_tx(|conn| {
            let row = require_live_message(conn, message_id)?;
            if row.sender_id != requester_id {
                return Err(ChatError::forbidden("Only the sender may edit a message"));
            }
            if new_content.trim().is_empty() {
                return Err(ChatError::validation("Content cannot be empty"));
            }

            conn.execute(
                "UPDATE messages SET content = ?1, edited_at = ?2 WHERE id = ?3",
                rusqlite::params![new_content, now(), message_id],
            )?;

            let row = require_live_message(conn, message_id)?;
            let reactions = reactions_by_message(conn, &[message_id])?
                .remove(&message_id)
                .unwrap_or_default();
            Ok(row.into_view(reactions))
        })?;

        info!(message_id, "Message edited");
        Ok(message)
    }

    /// Soft delete. The row and its reactions stay, but the message is
    /// hidden from every read path from now on.
    pub fn delete_message(&self, message_id: i64, requester_id: i64) -> Result<()> {
        self.with_tx(|conn| {
            let row = require_live_message(conn, message_id)?;
            if row.sender_id != requester_id {
                return Err(ChatError::forbidden("Only the sender may delete a message"));
            }
            conn.execute("UPDATE messages SET is_deleted = 1 WHERE id = ?1", [message_id])?;
            Ok(())
        })?;

        info!(message_id, "Message deleted");
        Ok(())
    }

    /// A page of live messages in chronological order.
    ///
    /// `offset`/`limit` count back from the most recent message, so offset 0
    /// is always the newest page.
    pub fn list_messages(&self, conversation_id: i64, limit: u32, offset: u32) -> Result<Vec<MessageView>> {
        let messages = self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE m.conversation_id = ?1 AND m.is_deleted = 0
                 ORDER BY m.sent_at DESC, m.id DESC
                 LIMIT ?2 OFFSET ?3",
                MessageRow::SELECT
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt
                .query_map(rusqlite::params![conversation_id, limit, offset], MessageRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.reverse();

            with_reactions(conn, rows)
        })?;

        debug!(conversation_id, count = messages.len(), "Listed messages");
        Ok(messages)
    }

    pub fn get_message(&self, message_id: i64) -> Result<MessageView> {
        self.with_conn(|conn| {
            let row = require_live_message(conn, message_id)?;
            let reactions = reactions_by_message(conn, &[message_id])?
                .remove(&message_id)
                .unwrap_or_default();
            Ok(row.into_view(reactions))
        })
    }
}

pub(crate) fn query_message(conn: &Connection, id: i64) -> Result<Option<MessageRow>> {
    let sql = format!("{} WHERE m.id = ?1", MessageRow::SELECT);
    Ok(conn.query_row(&sql, [id], MessageRow::from_row).optional()?)
}

/// The message, unless it is missing or soft-deleted.
pub(crate) fn require_live_message(conn: &Connection, id: i64) -> Result<MessageRow> {
    query_message(conn, id)?
        .filter(|m| !m.is_deleted)
        .ok_or_else(|| ChatError::NotFound(format!("Message {} not found", id)))
}

/// Upper bound on bound parameters per `IN (...)` list, well under SQLite's
/// variable limit.
const ID_BATCH: usize = 500;

type ReactionsByMessage = HashMap<i64, Vec<ReactionView>>;

/// Batch-fetch reactions for a set of message ids, oldest first per message.
pub(crate) fn reactions_by_message(conn: &Connection, message_ids: &[i64]) -> Result<ReactionsByMessage> {
    let mut map = ReactionsByMessage::new();
    for chunk in message_ids.chunks(ID_BATCH) {
        let placeholders: Vec<String> = (1..=chunk.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "{} WHERE r.message_id IN ({}) ORDER BY r.reacted_at, r.id",
            ReactionRow::SELECT,
            placeholders.join(", ")
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(chunk), ReactionRow::from_row)?;
        for row in rows {
            let row = row?;
            map.entry(row.message_id).or_default().push(row.into_view());
        }
    }
    Ok(map)
}

/// Reactions on every live message of a conversation, oldest first per message.
pub(crate) fn reactions_in_conversation(conn: &Connection, conversation_id: i64) -> Result<ReactionsByMessage> {
    let sql = format!(
        "{} JOIN messages m ON m.id = r.message_id
         WHERE m.conversation_id = ?1 AND m.is_deleted = 0
         ORDER BY r.reacted_at, r.id",
        ReactionRow::SELECT
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut map = ReactionsByMessage::new();
    for row in stmt.query_map([conversation_id], ReactionRow::from_row)? {
        let row = row?;
        map.entry(row.message_id).or_default().push(row.into_view());
    }
    Ok(map)
}

/// Attaches already-fetched reactions to message rows, keeping their order.
pub(crate) fn attach_reactions(rows: Vec<MessageRow>, mut reactions: ReactionsByMessage) -> Vec<MessageView> {
    rows.into_iter()
        .map(|row| {
            let nested = reactions.remove(&row.id).unwrap_or_default();
            row.into_view(nested)
        })
        .collect()
}

/// Attaches nested reactions to message rows, keeping their order.
pub(crate) fn with_reactions(conn: &Connection, rows: Vec<MessageRow>) -> Result<Vec<MessageView>> {
    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    let reactions = reactions_by_message(conn, &ids)?;
    Ok(attach_reactions(rows, reactions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{bulk_messages, db, user};

    fn direct(db: &Database) -> (i64, i64, i64) {
        let a = user(db, "a");
        let b = user(db, "b");
        let conv = db.create_conversation(None, false, a, &[a, b]).unwrap();
        (conv.id, a, b)
    }

    #[test]
    fn send_enriches_with_sender() {
        let db = db();
        let (conv, a, _) = direct(&db);

        let msg = db.send_message(conv, a, Some("hi"), None).unwrap();
        assert_eq!(msg.sender_name, "a");
        assert_eq!(msg.content.as_deref(), Some("hi"));
        assert!(msg.edited_at.is_none());
        assert!(msg.reactions.is_empty());
    }

    #[test]
    fn send_requires_content_or_attachment() {
        let db = db();
        let (conv, a, _) = direct(&db);

        assert!(matches!(
            db.send_message(conv, a, Some("  "), None),
            Err(ChatError::Validation(_))
        ));
        assert!(matches!(
            db.send_message(conv, a, None, Some("")),
            Err(ChatError::Validation(_))
        ));

        let msg = db.send_message(conv, a, Some(" "), Some("https://f/1.png")).unwrap();
        assert!(msg.content.is_none());
        assert_eq!(msg.attachment_url.as_deref(), Some("https://f/1.png"));
    }

    #[test]
    fn non_member_cannot_send() {
        let db = db();
        let (conv, _, _) = direct(&db);
        let outsider = user(&db, "c");

        assert!(matches!(
            db.send_message(conv, outsider, Some("hi"), None),
            Err(ChatError::Forbidden(_))
        ));
    }

    #[test]
    fn removed_member_cannot_send() {
        let db = db();
        let a = user(&db, "a");
        let b = user(&db, "b");
        let c = user(&db, "c");
        let group = db.create_conversation(Some("g"), true, a, &[a, b, c]).unwrap();

        db.send_message(group.id, c, Some("bye"), None).unwrap();
        db.remove_member(group.id, c, None, crate::RemovalPolicy::Open).unwrap();
        assert!(matches!(
            db.send_message(group.id, c, Some("again"), None),
            Err(ChatError::Forbidden(_))
        ));
    }

    #[test]
    fn edit_rules() {
        let db = db();
        let (conv, a, b) = direct(&db);
        let msg = db.send_message(conv, a, Some("hi"), None).unwrap();

        assert!(matches!(db.edit_message(msg.id, b, "hey"), Err(ChatError::Forbidden(_))));
        assert!(matches!(db.edit_message(msg.id, a, " "), Err(ChatError::Validation(_))));
        assert!(matches!(db.edit_message(999, a, "x"), Err(ChatError::NotFound(_))));

        let edited = db.edit_message(msg.id, a, "hello").unwrap();
        assert_eq!(edited.content.as_deref(), Some("hello"));
        assert_eq!(edited.sent_at, msg.sent_at);
        assert!(edited.edited_at.is_some());
    }

    #[test]
    fn soft_delete_hides_message() {
        let db = db();
        let (conv, a, b) = direct(&db);
        let keep = db.send_message(conv, a, Some("keep"), None).unwrap();
        let gone = db.send_message(conv, a, Some("gone"), None).unwrap();

        assert!(matches!(db.delete_message(gone.id, b), Err(ChatError::Forbidden(_))));
        db.delete_message(gone.id, a).unwrap();

        let ids: Vec<i64> = db.list_messages(conv, 50, 0).unwrap().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![keep.id]);
        assert!(matches!(db.get_message(gone.id), Err(ChatError::NotFound(_))));
        assert!(matches!(db.edit_message(gone.id, a, "x"), Err(ChatError::NotFound(_))));
        assert!(matches!(db.delete_message(gone.id, a), Err(ChatError::NotFound(_))));
    }

    #[test]
    fn pagination_counts_back_from_newest() {
        let db = db();
        let (conv, a, _) = direct(&db);
        for i in 0..5 {
            db.send_message(conv, a, Some(&format!("m{}", i)), None).unwrap();
        }

        let contents = |page: Vec<MessageView>| -> Vec<String> {
            page.into_iter().filter_map(|m| m.content).collect()
        };

        assert_eq!(contents(db.list_messages(conv, 2, 0).unwrap()), vec!["m3", "m4"]);
        assert_eq!(contents(db.list_messages(conv, 2, 2).unwrap()), vec!["m1", "m2"]);
        assert_eq!(contents(db.list_messages(conv, 2, 4).unwrap()), vec!["m0"]);
        assert!(db.list_messages(conv, 2, 6).unwrap().is_empty());
    }

    #[test]
    fn listing_nests_reactions() {
        let db = db();
        let (conv, a, b) = direct(&db);
        let msg = db.send_message(conv, a, Some("hi"), None).unwrap();
        db.toggle_reaction(msg.id, b, "👍").unwrap();

        let page = db.list_messages(conv, 50, 0).unwrap();
        assert_eq!(page[0].reactions.len(), 1);
        assert_eq!(page[0].reactions[0].user_name, "b");

        let single = db.get_message(msg.id).unwrap();
        assert_eq!(single.reactions[0].emoji, "👍");
    }

    #[test]
    fn large_page_loads_reactions_in_batches() {
        let db = db();
        let (conv, a, b) = direct(&db);
        let ids = bulk_messages(&db, conv, a, 2 * ID_BATCH + 1);
        let (first, last) = (ids[0], ids[ids.len() - 1]);
        db.toggle_reaction(first, b, "👍").unwrap();
        db.toggle_reaction(last, b, "🎉").unwrap();

        let page = db.list_messages(conv, ids.len() as u32, 0).unwrap();
        assert_eq!(page.len(), ids.len());
        assert_eq!(page[0].id, first);
        assert_eq!(page[0].reactions[0].emoji, "👍");
        assert_eq!(page[page.len() - 1].reactions[0].emoji, "🎉");
        assert_eq!(page.iter().map(|m| m.reactions.len()).sum::<usize>(), 2);
    }
}
