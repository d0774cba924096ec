use std::str::FromStr;

use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

use huddle_types::models::{CreatedConversation, MemberRole};

use crate::error::{ChatError, Result};
use crate::models::ConversationRow;
use crate::users::require_user;
use crate::{Database, now};

/// Who may remove a member from a conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RemovalPolicy {
    /// Any caller may remove any member.
    #[default]
    Open,
    /// Only an admin of the conversation, or the member themself.
    AdminOrSelf,
}

impl FromStr for RemovalPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "admin-or-self" => Ok(Self::AdminOrSelf),
            other => Err(format!(
                "unknown removal policy '{}' (expected 'open' or 'admin-or-self')",
                other
            )),
        }
    }
}

impl Database {
    /// Creates a conversation with its members in one transaction.
    ///
    /// A non-group request with exactly two members resolves to the existing
    /// direct conversation for that pair when there is one.
    pub fn create_conversation(
        &self,
        name: Option<&str>,
        is_group: bool,
        created_by_id: i64,
        member_ids: &[i64],
    ) -> Result<CreatedConversation> {
        let mut members: Vec<i64> = Vec::with_capacity(member_ids.len());
        for id in member_ids {
            if !members.contains(id) {
                members.push(*id);
            }
        }
        if members.len() < 2 {
            return Err(ChatError::validation(
                "A conversation must have at least 2 members",
            ));
        }
        if !is_group && members.len() != 2 {
            return Err(ChatError::validation(
                "A direct conversation must have exactly 2 members",
            ));
        }

        let name = name.map(str::trim).filter(|n| !n.is_empty());
        let direct_key = (!is_group).then(|| pair_key(members[0], members[1]));

        let created = self.with_tx(|conn| {
            if let Some(key) = direct_key.as_deref() {
                if let Some(existing) = find_direct(conn, members[0], members[1])? {
                    debug!(conversation_id = existing.id, "Direct conversation already exists");
                    return Ok(existing_to_created(existing));
                }

                // The pair may still hold the key on a conversation that lost
                // a member; that row no longer counts as the direct chat.
                release_stale_key(conn, key)?;
            }

            require_user(conn, created_by_id)?;
            for id in &members {
                require_user(conn, *id)?;
            }

            let created_at = now();
            conn.execute(
                "INSERT INTO conversations (name, is_group, created_by_id, direct_key, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![name, is_group, created_by_id, direct_key, created_at],
            )?;

            let conversation_id = conn.last_insert_rowid();
            let mut stmt = conn.prepare(
                "INSERT INTO conversation_members (conversation_id, user_id, role, joined_at)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for id in &members {
                let role = if *id == created_by_id {
                    MemberRole::Admin
                } else {
                    MemberRole::Member
                };
                stmt.execute(rusqlite::params![conversation_id, id, role.as_str(), created_at])?;
            }

            Ok(CreatedConversation {
                id: conversation_id,
                name: name.map(str::to_string),
                is_group,
                created_at,
                existing: false,
            })
        })?;

        if !created.existing {
            info!(
                conversation_id = created.id,
                is_group,
                members = members.len(),
                "Conversation created"
            );
        }
        Ok(created)
    }

    pub fn add_member(&self, conversation_id: i64, user_id: i64) -> Result<()> {
        self.with_tx(|conn| {
            let conversation = require_conversation(conn, conversation_id)?;
            if !conversation.is_group {
                return Err(ChatError::validation(
                    "Cannot add members to direct conversations",
                ));
            }
            require_user(conn, user_id)?;
            if member_role(conn, conversation_id, user_id)?.is_some() {
                return Err(ChatError::conflict(
                    "User is already a member of this conversation",
                ));
            }

            conn.execute(
                "INSERT INTO conversation_members (conversation_id, user_id, role, joined_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![conversation_id, user_id, MemberRole::Member.as_str(), now()],
            )?;
            Ok(())
        })?;

        info!(conversation_id, user_id, "Member added");
        Ok(())
    }

    /// Removes a membership row. `requester_id` is only consulted under
    /// [`RemovalPolicy::AdminOrSelf`].
    pub fn remove_member(
        &self,
        conversation_id: i64,
        user_id: i64,
        requester_id: Option<i64>,
        policy: RemovalPolicy,
    ) -> Result<()> {
        self.with_tx(|conn| {
            if member_role(conn, conversation_id, user_id)?.is_none() {
                return Err(ChatError::not_found("Membership not found"));
            }

            if policy == RemovalPolicy::AdminOrSelf {
                let requester = requester_id
                    .ok_or_else(|| ChatError::forbidden("Requester is required to remove members"))?;
                let allowed = requester == user_id
                    || member_role(conn, conversation_id, requester)? == Some(MemberRole::Admin);
                if !allowed {
                    return Err(ChatError::forbidden(
                        "Only an admin or the member themself may remove a member",
                    ));
                }
            }

            conn.execute(
                "DELETE FROM conversation_members WHERE conversation_id = ?1 AND user_id = ?2",
                [conversation_id, user_id],
            )?;
            // A direct chat missing a member no longer owns its pair.
            conn.execute(
                "UPDATE conversations SET direct_key = NULL WHERE id = ?1 AND is_group = 0",
                [conversation_id],
            )?;
            Ok(())
        })?;

        info!(conversation_id, user_id, "Member removed");
        Ok(())
    }

    /// Blank names leave the stored name untouched.
    pub fn rename_conversation(&self, conversation_id: i64, name: Option<&str>) -> Result<()> {
        let name = name.map(str::trim).filter(|n| !n.is_empty());
        self.with_tx(|conn| {
            require_conversation(conn, conversation_id)?;
            if let Some(name) = name {
                conn.execute(
                    "UPDATE conversations SET name = ?1 WHERE id = ?2",
                    rusqlite::params![name, conversation_id],
                )?;
                info!(conversation_id, name, "Conversation renamed");
            }
            Ok(())
        })
    }
}

fn pair_key(a: i64, b: i64) -> String {
    format!("{}:{}", a.min(b), a.max(b))
}

/// Non-group conversation whose member set is exactly `{a, b}`.
fn find_direct(conn: &Connection, a: i64, b: i64) -> Result<Option<ConversationRow>> {
    let sql = format!(
        "SELECT {} FROM conversations c
         WHERE c.is_group = 0
           AND (SELECT COUNT(*) FROM conversation_members m WHERE m.conversation_id = c.id) = 2
           AND EXISTS (SELECT 1 FROM conversation_members m WHERE m.conversation_id = c.id AND m.user_id = ?1)
           AND EXISTS (SELECT 1 FROM conversation_members m WHERE m.conversation_id = c.id AND m.user_id = ?2)
         ORDER BY c.id
         LIMIT 1",
        ConversationRow::COLUMNS
    );
    Ok(conn.query_row(&sql, [a, b], ConversationRow::from_row).optional()?)
}

fn release_stale_key(conn: &Connection, key: &str) -> Result<()> {
    conn.execute(
        "UPDATE conversations SET direct_key = NULL WHERE direct_key = ?1",
        [key],
    )?;
    Ok(())
}

fn existing_to_created(row: ConversationRow) -> CreatedConversation {
    CreatedConversation {
        id: row.id,
        name: row.name,
        is_group: row.is_group,
        created_at: row.created_at,
        existing: true,
    }
}

pub(crate) fn query_conversation(conn: &Connection, id: i64) -> Result<Option<ConversationRow>> {
    let sql = format!("SELECT {} FROM conversations WHERE id = ?1", ConversationRow::COLUMNS);
    Ok(conn.query_row(&sql, [id], ConversationRow::from_row).optional()?)
}

fn require_conversation(conn: &Connection, id: i64) -> Result<ConversationRow> {
    query_conversation(conn, id)?
        .ok_or_else(|| ChatError::NotFound(format!("Conversation {} not found", id)))
}

pub(crate) fn member_role(
    conn: &Connection,
    conversation_id: i64,
    user_id: i64,
) -> Result<Option<MemberRole>> {
    let role: Option<String> = conn
        .query_row(
            "SELECT role FROM conversation_members WHERE conversation_id = ?1 AND user_id = ?2",
            [conversation_id, user_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(role.as_deref().map(MemberRole::from_column))
}
