use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use huddle_types::models::{ConversationDetail, ConversationSummary};

use crate::conversations::query_conversation;
use crate::error::{ChatError, Result};
use crate::messages::{attach_reactions, reactions_in_conversation};
use crate::models::{MemberRow, MessageRow};
use crate::Database;

/// Conversation row plus its newest live message.
struct SummaryRow {
    id: i64,
    name: Option<String>,
    is_group: bool,
    created_at: DateTime<Utc>,
    last_message: Option<String>,
    last_message_time: Option<DateTime<Utc>>,
}

impl Database {
    /// Every conversation `user_id` belongs to, most recently active first.
    /// Conversations without live messages come last.
    pub fn list_conversations_for_user(&self, user_id: i64) -> Result<Vec<ConversationSummary>> {
        let (rows, members) = self.with_conn(|conn| {
            // Soft-deleted messages are excluded from the preview, the same
            // as on every other read path.
            let mut stmt = conn.prepare(
                "SELECT c.id, c.name, c.is_group, c.created_at, last.content, last.sent_at
                 FROM conversation_members cm
                 JOIN conversations c ON c.id = cm.conversation_id
                 LEFT JOIN messages last ON last.id = (
                     SELECT m.id FROM messages m
                     WHERE m.conversation_id = c.id AND m.is_deleted = 0
                     ORDER BY m.sent_at DESC, m.id DESC
                     LIMIT 1
                 )
                 WHERE cm.user_id = ?1",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(SummaryRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        is_group: row.get(2)?,
                        created_at: row.get(3)?,
                        last_message: row.get(4)?,
                        last_message_time: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let sql = format!(
                "{} WHERE cm.conversation_id IN (
                     SELECT conversation_id FROM conversation_members WHERE user_id = ?1
                 )
                 ORDER BY cm.joined_at, cm.id",
                MemberRow::SELECT
            );
            let mut stmt = conn.prepare(&sql)?;
            let members = stmt
                .query_map([user_id], MemberRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok((rows, members))
        })?;

        let mut rosters: HashMap<i64, Vec<MemberRow>> = HashMap::new();
        for member in members {
            rosters.entry(member.conversation_id).or_default().push(member);
        }

        let mut summaries: Vec<ConversationSummary> = rows
            .into_iter()
            .map(|row| {
                let roster = rosters.remove(&row.id).unwrap_or_default();
                let name = if row.is_group {
                    row.name.unwrap_or_default()
                } else {
                    direct_display_name(&roster, user_id)
                };
                ConversationSummary {
                    id: row.id,
                    name,
                    is_group: row.is_group,
                    last_message: row.last_message,
                    last_message_time: row.last_message_time,
                    members: roster.iter().map(MemberRow::to_view).collect(),
                    created_at: row.created_at,
                }
            })
            .collect();

        summaries.sort_by(by_recency);

        debug!(user_id, count = summaries.len(), "Listed conversations");
        Ok(summaries)
    }

    /// Full roster plus every live message, oldest first, with reactions.
    pub fn get_conversation_detail(&self, conversation_id: i64) -> Result<ConversationDetail> {
        self.with_conn(|conn| {
            let conversation = query_conversation(conn, conversation_id)?
                .ok_or_else(|| ChatError::NotFound(format!("Conversation {} not found", conversation_id)))?;

            let sql = format!(
                "{} WHERE cm.conversation_id = ?1 ORDER BY cm.joined_at, cm.id",
                MemberRow::SELECT
            );
            let mut stmt = conn.prepare(&sql)?;
            let members = stmt
                .query_map([conversation_id], MemberRow::from_row)?
                .map(|r| r.map(MemberRow::into_detail))
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let sql = format!(
                "{} WHERE m.conversation_id = ?1 AND m.is_deleted = 0 ORDER BY m.sent_at, m.id",
                MessageRow::SELECT
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([conversation_id], MessageRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            let messages = attach_reactions(rows, reactions_in_conversation(conn, conversation_id)?);

            Ok(ConversationDetail {
                id: conversation.id,
                name: conversation.name,
                is_group: conversation.is_group,
                created_at: conversation.created_at,
                members,
                messages,
            })
        })
    }
}

/// The other member's username, or empty when there is none.
fn direct_display_name(roster: &[MemberRow], viewer_id: i64) -> String {
    roster
        .iter()
        .find(|m| m.user_id != viewer_id)
        .map(|m| m.username.clone())
        .unwrap_or_default()
}

/// Newest last message first; no messages sorts last. Ties fall back to the
/// newest conversation.
fn by_recency(a: &ConversationSummary, b: &ConversationSummary) -> Ordering {
    match (a.last_message_time, b.last_message_time) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| b.created_at.cmp(&a.created_at))
    .then_with(|| b.id.cmp(&a.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{bulk_messages, db, user};

    #[test]
    fn direct_chat_is_named_after_the_other_member() {
        let db = db();
        let a = user(&db, "alice");
        let b = user(&db, "bob");
        db.create_conversation(None, false, a, &[a, b]).unwrap();

        assert_eq!(db.list_conversations_for_user(a).unwrap()[0].name, "bob");
        assert_eq!(db.list_conversations_for_user(b).unwrap()[0].name, "alice");
    }

    #[test]
    fn group_uses_stored_name_and_full_roster() {
        let db = db();
        let a = user(&db, "alice");
        let b = user(&db, "bob");
        let c = user(&db, "carol");
        db.create_conversation(Some("team"), true, a, &[a, b, c]).unwrap();

        let list = db.list_conversations_for_user(b).unwrap();
        assert_eq!(list[0].name, "team");
        assert!(list[0].is_group);
        let roster: Vec<(&str, &str)> = list[0]
            .members
            .iter()
            .map(|m| (m.username.as_str(), m.role.as_str()))
            .collect();
        assert_eq!(roster, vec![("alice", "admin"), ("bob", "member"), ("carol", "member")]);
    }

    #[test]
    fn direct_chat_without_other_member_has_empty_name() {
        let db = db();
        let a = user(&db, "alice");
        let b = user(&db, "bob");
        let conv = db.create_conversation(None, false, a, &[a, b]).unwrap();
        db.remove_member(conv.id, b, None, crate::RemovalPolicy::Open).unwrap();

        assert_eq!(db.list_conversations_for_user(a).unwrap()[0].name, "");
    }

    #[test]
    fn ordered_by_last_message_with_empty_conversations_last() {
        let db = db();
        let me = user(&db, "me");
        let x = user(&db, "x");
        let y = user(&db, "y");
        let z = user(&db, "z");
        let w = user(&db, "w");

        let c1 = db.create_conversation(None, false, me, &[me, x]).unwrap().id;
        let c2 = db.create_conversation(None, false, me, &[me, y]).unwrap().id;
        let c3 = db.create_conversation(None, false, me, &[me, z]).unwrap().id;
        let empty = db.create_conversation(None, false, me, &[me, w]).unwrap().id;

        db.send_message(c3, me, Some("oldest"), None).unwrap();
        db.send_message(c2, me, Some("middle"), None).unwrap();
        db.send_message(c1, me, Some("newest"), None).unwrap();

        let ids: Vec<i64> = db
            .list_conversations_for_user(me)
            .unwrap()
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![c1, c2, c3, empty]);
    }

    #[test]
    fn preview_skips_deleted_messages() {
        let db = db();
        let a = user(&db, "a");
        let b = user(&db, "b");
        let conv = db.create_conversation(None, false, a, &[a, b]).unwrap().id;

        let first = db.send_message(conv, a, Some("first"), None).unwrap();
        let second = db.send_message(conv, a, Some("second"), None).unwrap();
        db.delete_message(second.id, a).unwrap();

        let summary = &db.list_conversations_for_user(a).unwrap()[0];
        assert_eq!(summary.last_message.as_deref(), Some("first"));
        assert_eq!(summary.last_message_time, Some(first.sent_at));

        db.delete_message(first.id, a).unwrap();
        let summary = &db.list_conversations_for_user(a).unwrap()[0];
        assert!(summary.last_message.is_none());
        assert!(summary.last_message_time.is_none());
    }

    #[test]
    fn detail_lists_live_messages_chronologically() {
        let db = db();
        let a = user(&db, "a");
        let b = user(&db, "b");
        let conv = db.create_conversation(None, false, a, &[a, b]).unwrap().id;

        let m1 = db.send_message(conv, a, Some("one"), None).unwrap();
        let m2 = db.send_message(conv, b, Some("two"), None).unwrap();
        let m3 = db.send_message(conv, a, Some("three"), None).unwrap();
        db.delete_message(m2.id, b).unwrap();
        db.toggle_reaction(m3.id, b, "❤️").unwrap();

        let detail = db.get_conversation_detail(conv).unwrap();
        assert_eq!(detail.members.len(), 2);
        assert_eq!(detail.members[0].email, "a@example.com");
        let ids: Vec<i64> = detail.messages.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![m1.id, m3.id]);
        assert_eq!(detail.messages[1].reactions[0].user_name, "b");

        assert!(matches!(db.get_conversation_detail(999), Err(ChatError::NotFound(_))));
    }

    #[test]
    fn end_to_end_toggle_leaves_no_reactions() {
        let db = db();
        let a = user(&db, "a");
        let b = user(&db, "b");
        let conv = db.create_conversation(None, false, a, &[a, b]).unwrap().id;
        let msg = db.send_message(conv, a, Some("hi"), None).unwrap();

        assert!(!db.toggle_reaction(msg.id, b, "👍").unwrap().removed);
        assert!(db.toggle_reaction(msg.id, b, "👍").unwrap().removed);

        let detail = db.get_conversation_detail(conv).unwrap();
        assert_eq!(detail.messages.len(), 1);
        assert!(detail.messages[0].reactions.is_empty());
    }

    #[test]
    fn detail_holds_more_messages_than_sqlite_bind_limit() {
        let db = db();
        let a = user(&db, "a");
        let b = user(&db, "b");
        let conv = db.create_conversation(None, false, a, &[a, b]).unwrap().id;

        let ids = bulk_messages(&db, conv, a, 33_000);
        let last = ids[ids.len() - 1];
        db.toggle_reaction(last, b, "👍").unwrap();
        db.delete_message(ids[0], a).unwrap();

        let detail = db.get_conversation_detail(conv).unwrap();
        assert_eq!(detail.messages.len(), 32_999);
        assert_eq!(detail.messages[0].id, ids[1]);
        let newest = &detail.messages[detail.messages.len() - 1];
        assert_eq!(newest.id, last);
        assert_eq!(newest.reactions[0].user_name, "b");
    }
}
