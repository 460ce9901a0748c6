//! Auth state machine (C7): orchestrates the token codec, access-token
//! signer, rate limiter, and the challenge/session/user stores across the
//! five entry points in §4.4. Each entry point owns exactly one database
//! transaction, bounded by `db_statement_timeout_secs`; the core never
//! nests transactions.

use std::future::Future;

use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use thiserror::Error;
use uuid::Uuid;

use crate::{
  access_token, audit,
  config::Config,
  models::{normalize_email, LoginChallenge, Session, User},
  rate_limit::RateLimiter,
  token,
};

#[derive(Debug, Error)]
pub enum AuthError {
  #[error("invalid or expired token")]
  InvalidOrExpiredToken,
  #[error("invalid refresh token")]
  InvalidRefreshToken,
  #[error("refresh token expired")]
  RefreshTokenExpired,
  #[error("refresh token reuse")]
  RefreshTokenReuse,
  #[error("session hijacking")]
  SessionHijacking,
  #[error("internal error")]
  Internal(#[from] anyhow::Error),
}

impl From<sqlx::Error> for AuthError {
  fn from(err: sqlx::Error) -> Self {
    AuthError::Internal(err.into())
  }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
  fn from(err: jsonwebtoken::errors::Error) -> Self {
    AuthError::Internal(err.into())
  }
}

#[derive(Debug, Clone)]
pub struct Tokens {
  pub access_token: String,
  pub refresh_token: String,
}

/// Bounds a transaction body to `cfg.db_statement_timeout_secs`. A stuck
/// `FOR UPDATE` lock surfaces as `AuthError::Internal` (a safely-retryable
/// 5xx) instead of hanging the request forever.
async fn with_statement_timeout<T>(
  cfg: &Config,
  body: impl Future<Output = Result<T, AuthError>>,
) -> Result<T, AuthError> {
  tokio::time::timeout(
    std::time::Duration::from_secs(cfg.db_statement_timeout_secs),
    body,
  )
  .await
  .map_err(|_| AuthError::Internal(anyhow::anyhow!("database statement timed out")))?
}

/// §4.4.1 Request magic link. Always succeeds from the caller's point of
/// view, whether or not the email exists or was rate-limited (enumeration
/// resistance).
pub async fn request_magic_link(
  pool: &PgPool,
  limiter: &RateLimiter,
  cfg: &Config,
  email_raw: &str,
  ip: Option<&str>,
  user_agent: Option<&str>,
) {
  let email = normalize_email(email_raw);

  if !limiter.admit(&email, ip).await {
    tracing::warn!(email, ip, "rate limit hit for magic link request");
    audit::log_event(pool, None, "magic.rate_limited", ip, user_agent).await;
    return;
  }

  let token = token::generate_challenge_token();
  let token_hash = token::digest(&token);
  let expires_at = Utc::now() + Duration::minutes(cfg.magic_link_ttl_minutes);

  let inserted = sqlx::query(
    r#"
    INSERT INTO login_challenges (email, token_hash, expires_at, request_ip, request_user_agent)
    VALUES ($1, $2, $3, $4, $5)
    "#,
  )
  .bind(&email)
  .bind(&token_hash)
  .bind(expires_at)
  .bind(ip)
  .bind(user_agent)
  .execute(pool)
  .await;

  if let Err(err) = inserted {
    tracing::error!(error = %err, email, "failed to persist login challenge");
    return;
  }

  // Stands in for the email transport: the delivery channel is external.
  tracing::info!(email, token, "magic link issued");
  audit::log_event(pool, None, "magic.requested", ip, user_agent).await;
}

/// §4.4.2 Verify magic link: single-use challenge redemption, find-or-create
/// user, bootstrap the root session of a new rotation chain.
pub async fn verify_magic_link(
  pool: &PgPool,
  cfg: &Config,
  token: &str,
  ip: Option<&str>,
  user_agent: Option<&str>,
) -> Result<Tokens, AuthError> {
  let token_hash = token::digest(token);
  let now = Utc::now();

  let (user_id, tokens) = with_statement_timeout(cfg, async {
    let mut tx = pool.begin().await?;

    let challenge = sqlx::query_as::<_, LoginChallenge>(
      r#"
      SELECT id, email, token_hash, expires_at, used_at, request_ip, request_user_agent, created_at
      FROM login_challenges
      WHERE token_hash = $1 AND used_at IS NULL AND expires_at > $2
      FOR UPDATE
      "#,
    )
    .bind(&token_hash)
    .bind(now)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AuthError::InvalidOrExpiredToken)?;

    sqlx::query("UPDATE login_challenges SET used_at = $1 WHERE id = $2")
        .bind(now)
        .bind(challenge.id)
        .execute(&mut *tx)
        .await?;

    let user = find_or_create_user(&mut tx, &challenge.email).await?;

    let refresh_token = token::generate_refresh_token();
    let refresh_token_hash = token::digest(&refresh_token);
    let refresh_expires_at = now + Duration::seconds(cfg.refresh_token_ttl_secs());

    sqlx::query(
      r#"
      INSERT INTO sessions
        (user_id, refresh_token_hash, refresh_expires_at, rotated_from_session_id, ip, user_agent, last_seen_at)
      VALUES ($1, $2, $3, NULL, $4, $5, $6)
      "#,
    )
    .bind(user.id)
    .bind(&refresh_token_hash)
    .bind(refresh_expires_at)
    .bind(ip)
    .bind(user_agent)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    let access_token = access_token::mint(cfg, user.id)?;

    tx.commit().await?;

    Ok((
      user.id,
      Tokens {
        access_token,
        refresh_token,
      },
    ))
  })
  .await?;

  audit::log_event(pool, Some(user_id), "magic.verified", ip, user_agent).await;

  Ok(tokens)
}

async fn find_or_create_user(
  tx: &mut Transaction<'_, Postgres>,
  email: &str,
) -> Result<User, sqlx::Error> {
  if let Some(user) = sqlx::query_as::<_, User>(
    "SELECT id, email, email_verified_at, created_at FROM users WHERE email = $1",
  )
  .bind(email)
  .fetch_optional(&mut **tx)
  .await?
  {
    return Ok(user);
  }

  sqlx::query_as::<_, User>(
    r#"
    INSERT INTO users (email) VALUES ($1)
    RETURNING id, email, email_verified_at, created_at
    "#,
  )
  .bind(email)
  .fetch_one(&mut **tx)
  .await
}

/// §4.4.3 Refresh session: rotate the refresh token, detecting reuse and
/// IP/user-agent hijack attempts. A detected reuse or hijack revokes the
/// entire rotation-chain subtree rooted at the presented session before
/// returning the tagged failure.
pub async fn refresh_session(
  pool: &PgPool,
  cfg: &Config,
  refresh_token: &str,
  ip: Option<&str>,
  user_agent: Option<&str>,
) -> Result<Tokens, AuthError> {
  let token_hash = token::digest(refresh_token);
  let now = Utc::now();

  enum Outcome {
    Rotated(Uuid, Tokens),
    Reuse(Uuid),
    Expired,
    Hijack(Uuid),
  }

  let outcome = with_statement_timeout(cfg, async {
    let mut tx = pool.begin().await?;

    let session = sqlx::query_as::<_, Session>(
      r#"
      SELECT id, user_id, refresh_token_hash, refresh_expires_at, rotated_from_session_id,
             revoked_at, created_at, last_seen_at, ip, user_agent
      FROM sessions
      WHERE refresh_token_hash = $1
      FOR UPDATE
      "#,
    )
    .bind(&token_hash)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AuthError::InvalidRefreshToken)?;

    if session.revoked_at.is_some() {
      revoke_chain(&mut tx, session.id, now).await?;
      tx.commit().await?;
      return Ok(Outcome::Reuse(session.user_id));
    }

    if session.refresh_expires_at <= now {
      revoke_chain(&mut tx, session.id, now).await?;
      tx.commit().await?;
      return Ok(Outcome::Expired);
    }

    let ip_mismatch = matches!((&session.ip, ip), (Some(stored), Some(req)) if stored != req);
    let ua_mismatch =
        matches!((&session.user_agent, user_agent), (Some(stored), Some(req)) if stored != req);

    if ip_mismatch || ua_mismatch {
      revoke_chain(&mut tx, session.id, now).await?;
      tx.commit().await?;
      return Ok(Outcome::Hijack(session.user_id));
    }

    let new_refresh_token = token::generate_refresh_token();
    let new_refresh_token_hash = token::digest(&new_refresh_token);
    let new_refresh_expires_at = now + Duration::seconds(cfg.refresh_token_ttl_secs());

    sqlx::query(
      r#"
      INSERT INTO sessions
        (user_id, refresh_token_hash, refresh_expires_at, rotated_from_session_id, ip, user_agent, last_seen_at)
      VALUES ($1, $2, $3, $4, $5, $6, $7)
      "#,
    )
    .bind(session.user_id)
    .bind(&new_refresh_token_hash)
    .bind(new_refresh_expires_at)
    .bind(session.id)
    .bind(ip)
    .bind(user_agent)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE sessions SET revoked_at = $1 WHERE id = $2")
        .bind(now)
        .bind(session.id)
        .execute(&mut *tx)
        .await?;

    let access_token = access_token::mint(cfg, session.user_id)?;

    tx.commit().await?;

    Ok(Outcome::Rotated(
      session.user_id,
      Tokens {
        access_token,
        refresh_token: new_refresh_token,
      },
    ))
  })
  .await?;

  match outcome {
    Outcome::Reuse(user_id) => {
      audit::log_event(pool, Some(user_id), "refresh.reuse_detected", ip, user_agent).await;
      Err(AuthError::RefreshTokenReuse)
    }
    Outcome::Expired => Err(AuthError::RefreshTokenExpired),
    Outcome::Hijack(user_id) => {
      audit::log_event(pool, Some(user_id), "refresh.hijack_detected", ip, user_agent).await;
      Err(AuthError::SessionHijacking)
    }
    Outcome::Rotated(user_id, tokens) => {
      audit::log_event(pool, Some(user_id), "refresh.rotated", ip, user_agent).await;
      Ok(tokens)
    }
  }
}

/// Transitive closure of `rotated_from_session_id` descendants, breadth-first
/// over a work queue with a visited set (the graph is a forest: a row only
/// ever references an already-existing row, so no cycle is reachable).
/// Rows already revoked keep their original `revoked_at` — revocation is
/// monotonic and never rewrites an existing timestamp.
async fn revoke_chain(
  tx: &mut Transaction<'_, Postgres>,
  root_id: Uuid,
  now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
  let mut ids = vec![root_id];
  let mut idx = 0;
  while idx < ids.len() {
    let current = ids[idx];
    let children: Vec<Uuid> =
        sqlx::query_scalar("SELECT id FROM sessions WHERE rotated_from_session_id = $1")
            .bind(current)
            .fetch_all(&mut **tx)
            .await?;
    for child in children {
      if !ids.contains(&child) {
        ids.push(child);
      }
    }
    idx += 1;
  }

  sqlx::query("UPDATE sessions SET revoked_at = $1 WHERE id = ANY($2) AND revoked_at IS NULL")
      .bind(now)
      .bind(&ids)
      .execute(&mut **tx)
      .await?;

  Ok(())
}

/// §4.4.4 Logout a single session. Idempotent: a second call against an
/// already-revoked but still-present row also returns success.
pub async fn logout(pool: &PgPool, cfg: &Config, refresh_token: &str) -> Result<(), AuthError> {
  let token_hash = token::digest(refresh_token);
  let now = Utc::now();

  let user_id = with_statement_timeout(cfg, async {
    let mut tx = pool.begin().await?;

    let session = sqlx::query_as::<_, Session>(
      r#"
      SELECT id, user_id, refresh_token_hash, refresh_expires_at, rotated_from_session_id,
             revoked_at, created_at, last_seen_at, ip, user_agent
      FROM sessions
      WHERE refresh_token_hash = $1
      FOR UPDATE
      "#,
    )
    .bind(&token_hash)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AuthError::InvalidRefreshToken)?;

    sqlx::query("UPDATE sessions SET revoked_at = $1 WHERE id = $2 AND revoked_at IS NULL")
        .bind(now)
        .bind(session.id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(session.user_id)
  })
  .await?;

  audit::log_event(pool, Some(user_id), "logout", None, None).await;

  Ok(())
}

/// §4.4.5 Logout-all: revoke every still-active session for a user.
pub async fn logout_all(pool: &PgPool, cfg: &Config, user_id: Uuid) -> Result<(), AuthError> {
  let now = Utc::now();

  with_statement_timeout(cfg, async {
    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE sessions SET revoked_at = $1 WHERE user_id = $2 AND revoked_at IS NULL")
        .bind(now)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
  })
  .await?;

  audit::log_event(pool, Some(user_id), "logout_all", None, None).await;

  Ok(())
}

/// §4.4.6 Get-me: public projection of the authenticated user.
pub async fn get_user(pool: &PgPool, user_id: Uuid) -> Result<Option<User>, AuthError> {
  let user = sqlx::query_as::<_, User>(
    "SELECT id, email, email_verified_at, created_at FROM users WHERE id = $1",
  )
  .bind(user_id)
  .fetch_optional(pool)
  .await?;
  Ok(user)
}
