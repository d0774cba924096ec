use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand_core::OsRng;
use rusqlite::{Connection, OptionalExtension};
use tracing::{info, warn};

use huddle_types::models::UserProfile;

use crate::error::{ChatError, Result, is_unique_violation};
use crate::models::UserRow;
use crate::{Database, is_blank, now};

impl Database {
    pub fn register_user(&self, username: &str, email: &str, password: &str) -> Result<UserProfile> {
        let username = username.trim();
        let email = email.trim();
        if username.is_empty() || password.trim().is_empty() {
            return Err(ChatError::validation("Username and password are required"));
        }
        if email.is_empty() {
            return Err(ChatError::validation("Email is required"));
        }

        // Hash before taking the writer lock.
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| ChatError::Internal(format!("Password hashing failed: {}", e)))?
            .to_string();

        let profile = self.with_tx(|conn| {
            if query_user_by_username(conn, username)?.is_some() {
                return Err(ChatError::Conflict(format!(
                    "Username '{}' is already taken",
                    username
                )));
            }
            if query_user_by_email(conn, email)?.is_some() {
                return Err(ChatError::Conflict(format!(
                    "Email '{}' is already registered",
                    email
                )));
            }

            conn.execute(
                "INSERT INTO users (username, email, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![username, email, password_hash, now()],
            )
            .map_err(conflict_on_unique)?;

            let id = conn.last_insert_rowid();
            query_user_by_id(conn, id)?
                .map(UserRow::into_profile)
                .ok_or_else(|| ChatError::Internal("Failed to fetch created user".into()))
        })?;

        info!(user_id = profile.id, username = %profile.username, "User registered");
        Ok(profile)
    }

    /// Checks a username/password pair. Unknown user and wrong password are
    /// reported identically.
    pub fn verify_login(&self, username: &str, password: &str) -> Result<UserProfile> {
        if is_blank(Some(username)) || is_blank(Some(password)) {
            return Err(ChatError::validation("Username and password are required"));
        }

        let invalid = || ChatError::Unauthenticated("Invalid username or password".into());

        let user = self
            .with_conn(|conn| query_user_by_username(conn, username.trim()))?
            .ok_or_else(invalid)?;

        let parsed_hash = PasswordHash::new(&user.password_hash)
            .map_err(|e| ChatError::Internal(format!("Stored hash unreadable: {}", e)))?;

        if Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_err()
        {
            warn!(username = %user.username, "Login rejected");
            return Err(invalid());
        }

        Ok(user.into_profile())
    }

    /// Users ordered by username, optionally filtered by a substring of the
    /// username or email and with one id excluded.
    pub fn list_users(&self, search: Option<&str>, exclude_user_id: Option<i64>) -> Result<Vec<UserProfile>> {
        let pattern = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", escape_like(s)));

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM users
                 WHERE (?1 IS NULL OR username LIKE ?1 ESCAPE '\\' OR email LIKE ?1 ESCAPE '\\')
                   AND (?2 IS NULL OR id != ?2)
                 ORDER BY username",
                UserRow::COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![pattern, exclude_user_id], UserRow::from_row)?
                .map(|r| r.map(UserRow::into_profile))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_user(&self, id: i64) -> Result<UserProfile> {
        self.with_conn(|conn| query_user_by_id(conn, id))?
            .map(UserRow::into_profile)
            .ok_or_else(|| ChatError::NotFound(format!("User {} not found", id)))
    }

    /// Blank username/email keep the stored value; a supplied avatar replaces it.
    pub fn update_user(
        &self,
        id: i64,
        username: Option<&str>,
        email: Option<&str>,
        avatar_url: Option<&str>,
    ) -> Result<UserProfile> {
        let profile = self.with_tx(|conn| {
            let mut user = query_user_by_id(conn, id)?
                .ok_or_else(|| ChatError::NotFound(format!("User {} not found", id)))?;

            if let Some(username) = username.map(str::trim).filter(|s| !s.is_empty()) {
                if query_user_by_username(conn, username)?.is_some_and(|u| u.id != id) {
                    return Err(ChatError::conflict("Username is already taken"));
                }
                user.username = username.to_string();
            }

            if let Some(email) = email.map(str::trim).filter(|s| !s.is_empty()) {
                if query_user_by_email(conn, email)?.is_some_and(|u| u.id != id) {
                    return Err(ChatError::conflict("Email is already registered"));
                }
                user.email = email.to_string();
            }

            if let Some(avatar_url) = avatar_url {
                user.avatar_url = Some(avatar_url.to_string());
            }

            conn.execute(
                "UPDATE users SET username = ?1, email = ?2, avatar_url = ?3 WHERE id = ?4",
                rusqlite::params![user.username, user.email, user.avatar_url, id],
            )
            .map_err(conflict_on_unique)?;

            Ok(user.into_profile())
        })?;

        info!(user_id = id, "User updated");
        Ok(profile)
    }
}

pub(crate) fn query_user_by_id(conn: &Connection, id: i64) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users WHERE id = ?1", UserRow::COLUMNS);
    Ok(conn.query_row(&sql, [id], UserRow::from_row).optional()?)
}

fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users WHERE username = ?1", UserRow::COLUMNS);
    Ok(conn.query_row(&sql, [username], UserRow::from_row).optional()?)
}

fn query_user_by_email(conn: &Connection, email: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users WHERE email = ?1", UserRow::COLUMNS);
    Ok(conn.query_row(&sql, [email], UserRow::from_row).optional()?)
}

/// Fails with `NotFound` unless the user exists.
pub(crate) fn require_user(conn: &Connection, id: i64) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
        [id],
        |r| r.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(ChatError::NotFound(format!("User {} not found", id)))
    }
}

fn conflict_on_unique(err: rusqlite::Error) -> ChatError {
    if is_unique_violation(&err) {
        ChatError::conflict("Username or email is already in use")
    } else {
        err.into()
    }
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}
