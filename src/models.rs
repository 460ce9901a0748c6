//! Persisted entities (§3). Plain row structs mapped with `sqlx::FromRow`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
  pub id: Uuid,
  pub email: String,
  pub email_verified_at: Option<DateTime<Utc>>,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct UserProfile {
  pub id: Uuid,
  pub email: String,
  pub email_verified_at: Option<DateTime<Utc>>,
  pub created_at: DateTime<Utc>,
}

impl From<User> for UserProfile {
  fn from(u: User) -> Self {
    Self {
      id: u.id,
      email: u.email,
      email_verified_at: u.email_verified_at,
      created_at: u.created_at,
    }
  }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LoginChallenge {
  pub id: Uuid,
  pub email: String,
  pub token_hash: String,
  pub expires_at: DateTime<Utc>,
  pub used_at: Option<DateTime<Utc>>,
  pub request_ip: Option<String>,
  pub request_user_agent: Option<String>,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Session {
  pub id: Uuid,
  pub user_id: Uuid,
  pub refresh_token_hash: String,
  pub refresh_expires_at: DateTime<Utc>,
  pub rotated_from_session_id: Option<Uuid>,
  pub revoked_at: Option<DateTime<Utc>>,
  pub created_at: DateTime<Utc>,
  pub last_seen_at: Option<DateTime<Utc>>,
  pub ip: Option<String>,
  pub user_agent: Option<String>,
}

/// Normalize an email address the way the rest of the system expects it
/// stored and looked up: trimmed, lowercased.
pub fn normalize_email(email: &str) -> String {
  email.trim().to_lowercase()
}
