use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use huddle_types::models::{ReactionGroup, ReactionView, ToggleOutcome};

use crate::error::{ChatError, Result};
use crate::messages::require_live_message;
use crate::models::ReactionRow;
use crate::users::require_user;
use crate::{Database, now};

impl Database {
    /// Toggle a reaction: removes it if the exact (message, user, emoji)
    /// triple exists, inserts it otherwise. Applying it twice is a no-op.
    pub fn toggle_reaction(&self, message_id: i64, user_id: i64, emoji: &str) -> Result<ToggleOutcome> {
        if emoji.trim().is_empty() {
            return Err(ChatError::validation("Emoji is required"));
        }

        let outcome = self.with_tx(|conn| {
            require_live_message(conn, message_id)?;
            require_user(conn, user_id)?;

            let existing: Option<i64> = conn
                .query_row(
                    "SELECT id FROM message_reactions WHERE message_id = ?1 AND user_id = ?2 AND emoji = ?3",
                    rusqlite::params![message_id, user_id, emoji],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(existing_id) = existing {
                conn.execute("DELETE FROM message_reactions WHERE id = ?1", [existing_id])?;
                return Ok(ToggleOutcome {
                    removed: true,
                    reaction: None,
                });
            }

            conn.execute(
                "INSERT INTO message_reactions (message_id, user_id, emoji, reacted_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![message_id, user_id, emoji, now()],
            )?;

            let reaction = query_reaction(conn, conn.last_insert_rowid())?
                .map(ReactionRow::into_view)
                .ok_or_else(|| ChatError::Internal("Failed to fetch created reaction".into()))?;
            Ok(ToggleOutcome {
                removed: false,
                reaction: Some(reaction),
            })
        })?;

        info!(message_id, user_id, emoji, removed = outcome.removed, "Reaction toggled");
        Ok(outcome)
    }

    /// Direct deletion by id, restricted to the reaction's owner.
    pub fn remove_reaction(&self, reaction_id: i64, requester_id: i64) -> Result<()> {
        self.with_tx(|conn| {
            let reaction = query_reaction(conn, reaction_id)?
                .ok_or_else(|| ChatError::NotFound(format!("Reaction {} not found", reaction_id)))?;
            if reaction.user_id != requester_id {
                return Err(ChatError::forbidden("Only the owner may remove a reaction"));
            }
            conn.execute("DELETE FROM message_reactions WHERE id = ?1", [reaction_id])?;
            Ok(())
        })?;

        info!(reaction_id, "Reaction removed");
        Ok(())
    }

    /// Flat reaction list for a live message, oldest first. Unknown or
    /// deleted messages have no visible reactions.
    pub fn list_reactions(&self, message_id: i64) -> Result<Vec<ReactionView>> {
        self.with_conn(|conn| {
            Ok(query_live_reactions(conn, message_id)?
                .into_iter()
                .map(ReactionRow::into_view)
                .collect())
        })
    }

    /// Reactions grouped by the exact emoji string. Groups appear in order of
    /// their first reaction; users within a group in reaction order.
    pub fn group_reactions(&self, message_id: i64) -> Result<Vec<ReactionGroup>> {
        let rows = self.with_conn(|conn| query_live_reactions(conn, message_id))?;
        Ok(group_rows(&rows))
    }
}

fn group_rows(rows: &[ReactionRow]) -> Vec<ReactionGroup> {
    let mut groups: Vec<ReactionGroup> = Vec::new();
    for row in rows {
        match groups.iter_mut().find(|g| g.emoji == row.emoji) {
            Some(group) => {
                group.count += 1;
                group.users.push(row.to_user());
            }
            None => groups.push(ReactionGroup {
                emoji: row.emoji.clone(),
                count: 1,
                users: vec![row.to_user()],
            }),
        }
    }
    groups
}

fn query_reaction(conn: &Connection, id: i64) -> Result<Option<ReactionRow>> {
    let sql = format!("{} WHERE r.id = ?1", ReactionRow::SELECT);
    Ok(conn.query_row(&sql, [id], ReactionRow::from_row).optional()?)
}

fn query_live_reactions(conn: &Connection, message_id: i64) -> Result<Vec<ReactionRow>> {
    let sql = format!(
        "{} JOIN messages m ON m.id = r.message_id
         WHERE r.message_id = ?1 AND m.is_deleted = 0
         ORDER BY r.reacted_at, r.id",
        ReactionRow::SELECT
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([message_id], ReactionRow::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{db, user};

    fn message(db: &Database) -> (i64, i64, i64) {
        let a = user(db, "a");
        let b = user(db, "b");
        let conv = db.create_conversation(None, false, a, &[a, b]).unwrap();
        let msg = db.send_message(conv.id, a, Some("hi"), None).unwrap();
        (msg.id, a, b)
    }

    #[test]
    fn toggle_twice_restores_state() {
        let db = db();
        let (msg, _, b) = message(&db);

        let first = db.toggle_reaction(msg, b, "👍").unwrap();
        assert!(!first.removed);
        let reaction = first.reaction.unwrap();
        assert_eq!(reaction.user_name, "b");
        assert_eq!(reaction.emoji, "👍");

        let second = db.toggle_reaction(msg, b, "👍").unwrap();
        assert!(second.removed);
        assert!(second.reaction.is_none());
        assert!(db.list_reactions(msg).unwrap().is_empty());
    }

    #[test]
    fn toggle_validates_input() {
        let db = db();
        let (msg, a, _) = message(&db);

        assert!(matches!(db.toggle_reaction(msg, a, " "), Err(ChatError::Validation(_))));
        assert!(matches!(db.toggle_reaction(999, a, "👍"), Err(ChatError::NotFound(_))));

        db.delete_message(msg, a).unwrap();
        assert!(matches!(db.toggle_reaction(msg, a, "👍"), Err(ChatError::NotFound(_))));
    }

    #[test]
    fn deleted_message_hides_reactions() {
        let db = db();
        let (msg, a, b) = message(&db);
        db.toggle_reaction(msg, b, "🎉").unwrap();
        db.delete_message(msg, a).unwrap();

        assert!(db.list_reactions(msg).unwrap().is_empty());
        assert!(db.group_reactions(msg).unwrap().is_empty());
        // The row itself is retained.
        let stored: i64 = db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM message_reactions", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(stored, 1);
    }

    #[test]
    fn remove_reaction_checks_owner() {
        let db = db();
        let (msg, a, b) = message(&db);
        let id = db.toggle_reaction(msg, b, "👍").unwrap().reaction.unwrap().id;

        assert!(matches!(db.remove_reaction(id, a), Err(ChatError::Forbidden(_))));
        db.remove_reaction(id, b).unwrap();
        assert!(matches!(db.remove_reaction(id, b), Err(ChatError::NotFound(_))));
    }

    #[test]
    fn grouping_is_exact_and_ordered() {
        let db = db();
        let (msg, a, b) = message(&db);
        db.toggle_reaction(msg, b, "👍").unwrap();
        db.toggle_reaction(msg, a, "ok").unwrap();
        db.toggle_reaction(msg, a, "👍").unwrap();
        db.toggle_reaction(msg, b, "OK").unwrap();

        let groups = db.group_reactions(msg).unwrap();
        let summary: Vec<(&str, usize)> = groups.iter().map(|g| (g.emoji.as_str(), g.count)).collect();
        assert_eq!(summary, vec![("👍", 2), ("ok", 1), ("OK", 1)]);

        let thumbs: Vec<&str> = groups[0].users.iter().map(|u| u.user_name.as_str()).collect();
        assert_eq!(thumbs, vec!["b", "a"]);
    }
}
