use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a user inside one conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Admin,
    Member,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Member => "member",
        }
    }

    /// Parses the stored column value. Anything unrecognised is a plain member.
    pub fn from_column(value: &str) -> Self {
        match value {
            "admin" => Self::Admin,
            _ => Self::Member,
        }
    }
}

impl fmt::Display for MemberRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Public user profile. Never carries the credential hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

// -- Conversations --

/// Roster entry in the conversation list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberView {
    pub user_id: i64,
    pub username: String,
    pub avatar_url: Option<String>,
    pub role: MemberRole,
}

/// Roster entry in the conversation detail view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberDetail {
    pub user_id: i64,
    pub username: String,
    pub email: String,
    pub avatar_url: Option<String>,
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
}

/// One row of a user's conversation list.
///
/// `name` is already resolved: the stored name for groups, the other
/// member's username for direct chats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: i64,
    pub name: String,
    pub is_group: bool,
    pub last_message: Option<String>,
    pub last_message_time: Option<DateTime<Utc>>,
    pub members: Vec<MemberView>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationDetail {
    pub id: i64,
    pub name: Option<String>,
    pub is_group: bool,
    pub created_at: DateTime<Utc>,
    pub members: Vec<MemberDetail>,
    pub messages: Vec<MessageView>,
}

/// Result of `CreateConversation`. `existing` is set when a direct chat for
/// the same pair was found instead of created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedConversation {
    pub id: i64,
    pub name: Option<String>,
    pub is_group: bool,
    pub created_at: DateTime<Utc>,
    pub existing: bool,
}

// -- Messages --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageView {
    pub id: i64,
    pub conversation_id: i64,
    pub sender_id: i64,
    pub sender_name: String,
    pub sender_avatar: Option<String>,
    pub content: Option<String>,
    pub attachment_url: Option<String>,
    pub sent_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub reactions: Vec<ReactionView>,
}

// -- Reactions --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionView {
    pub id: i64,
    pub message_id: i64,
    pub user_id: i64,
    pub user_name: String,
    pub user_avatar: Option<String>,
    pub emoji: String,
    pub reacted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionUser {
    pub user_id: i64,
    pub user_name: String,
    pub user_avatar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionGroup {
    pub emoji: String,
    pub count: usize,
    pub users: Vec<ReactionUser>,
}

/// Outcome of a toggle. `reaction` is present only when one was inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToggleOutcome {
    pub removed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reaction: Option<ReactionView>,
}
