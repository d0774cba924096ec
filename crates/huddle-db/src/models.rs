//! Database row types. These map directly to SQLite rows (joined display
//! fields included) and stay distinct from the huddle-types views.

use chrono::{DateTime, Utc};
use rusqlite::Row;

use huddle_types::models::{
    MemberDetail, MemberRole, MemberView, MessageView, ReactionUser, ReactionView, UserProfile,
};

pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UserRow {
    pub const COLUMNS: &'static str = "id, username, email, password_hash, avatar_url, created_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            username: row.get(1)?,
            email: row.get(2)?,
            password_hash: row.get(3)?,
            avatar_url: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    pub fn into_profile(self) -> UserProfile {
        UserProfile {
            id: self.id,
            username: self.username,
            email: self.email,
            avatar_url: self.avatar_url,
            created_at: self.created_at,
        }
    }
}

pub struct ConversationRow {
    pub id: i64,
    pub name: Option<String>,
    pub is_group: bool,
    pub created_by_id: i64,
    pub created_at: DateTime<Utc>,
}

impl ConversationRow {
    pub const COLUMNS: &'static str = "id, name, is_group, created_by_id, created_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            is_group: row.get(2)?,
            created_by_id: row.get(3)?,
            created_at: row.get(4)?,
        })
    }
}

/// Membership joined with the member's user fields.
pub struct MemberRow {
    pub conversation_id: i64,
    pub user_id: i64,
    pub username: String,
    pub email: String,
    pub avatar_url: Option<String>,
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
}

impl MemberRow {
    pub const SELECT: &'static str = "SELECT cm.conversation_id, cm.user_id, u.username, u.email, u.avatar_url, cm.role, cm.joined_at
         FROM conversation_members cm
         JOIN users u ON u.id = cm.user_id";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            conversation_id: row.get(0)?,
            user_id: row.get(1)?,
            username: row.get(2)?,
            email: row.get(3)?,
            avatar_url: row.get(4)?,
            role: MemberRole::from_column(&row.get::<_, String>(5)?),
            joined_at: row.get(6)?,
        })
    }

    pub fn to_view(&self) -> MemberView {
        MemberView {
            user_id: self.user_id,
            username: self.username.clone(),
            avatar_url: self.avatar_url.clone(),
            role: self.role,
        }
    }

    pub fn into_detail(self) -> MemberDetail {
        MemberDetail {
            user_id: self.user_id,
            username: self.username,
            email: self.email,
            avatar_url: self.avatar_url,
            role: self.role,
            joined_at: self.joined_at,
        }
    }
}

/// Message joined with the sender's display fields.
pub struct MessageRow {
    pub id: i64,
    pub conversation_id: i64,
    pub sender_id: i64,
    pub sender_name: String,
    pub sender_avatar: Option<String>,
    pub content: Option<String>,
    pub attachment_url: Option<String>,
    pub sent_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
}

impl MessageRow {
    pub const SELECT: &'static str = "SELECT m.id, m.conversation_id, m.sender_id, u.username, u.avatar_url,
                m.content, m.attachment_url, m.sent_at, m.edited_at, m.is_deleted
         FROM messages m
         JOIN users u ON u.id = m.sender_id";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            conversation_id: row.get(1)?,
            sender_id: row.get(2)?,
            sender_name: row.get(3)?,
            sender_avatar: row.get(4)?,
            content: row.get(5)?,
            attachment_url: row.get(6)?,
            sent_at: row.get(7)?,
            edited_at: row.get(8)?,
            is_deleted: row.get(9)?,
        })
    }

    pub fn into_view(self, reactions: Vec<ReactionView>) -> MessageView {
        MessageView {
            id: self.id,
            conversation_id: self.conversation_id,
            sender_id: self.sender_id,
            sender_name: self.sender_name,
            sender_avatar: self.sender_avatar,
            content: self.content,
            attachment_url: self.attachment_url,
            sent_at: self.sent_at,
            edited_at: self.edited_at,
            reactions,
        }
    }
}

/// Reaction joined with the reacting user's display fields.
pub struct ReactionRow {
    pub id: i64,
    pub message_id: i64,
    pub user_id: i64,
    pub user_name: String,
    pub user_avatar: Option<String>,
    pub emoji: String,
    pub reacted_at: DateTime<Utc>,
}

impl ReactionRow {
    pub const SELECT: &'static str = "SELECT r.id, r.message_id, r.user_id, u.username, u.avatar_url, r.emoji, r.reacted_at
         FROM message_reactions r
         JOIN users u ON u.id = r.user_id";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            message_id: row.get(1)?,
            user_id: row.get(2)?,
            user_name: row.get(3)?,
            user_avatar: row.get(4)?,
            emoji: row.get(5)?,
            reacted_at: row.get(6)?,
        })
    }

    pub fn to_user(&self) -> ReactionUser {
        ReactionUser {
            user_id: self.user_id,
            user_name: self.user_name.clone(),
            user_avatar: self.user_avatar.clone(),
        }
    }

    pub fn into_view(self) -> ReactionView {
        ReactionView {
            id: self.id,
            message_id: self.message_id,
            user_id: self.user_id,
            user_name: self.user_name,
            user_avatar: self.user_avatar,
            emoji: self.emoji,
            reacted_at: self.reacted_at,
        }
    }
}
