use axum_extra::extract::cookie::SameSite;
use server::{access_token, auth, config::Config, token};
use sqlx::PgPool;

fn test_config() -> Config {
  Config {
    database_url: String::new(),
    db_max_connections: 1,
    db_connect_timeout_secs: 1,
    db_acquire_timeout_secs: 1,
    db_statement_timeout_secs: 2,
    redis_url: String::new(),
    jwt_secret: "integration-test-secret".to_string(),
    access_token_ttl_secs: 900,
    refresh_token_ttl_days: 30,
    magic_link_ttl_minutes: 10,
    rate_limit_window_secs: 600,
    rate_limit_max: 5,
    cookie_secure: true,
    cookie_samesite: SameSite::Lax,
    cookie_domain: None,
    bind_addr: "127.0.0.1:0".parse().unwrap(),
  }
}

async fn issue_challenge(pool: &PgPool, cfg: &Config, email: &str) -> String {
  let raw = token::generate_challenge_token();
  let hash = token::digest(&raw);
  let expires_at = chrono::Utc::now() + chrono::Duration::minutes(cfg.magic_link_ttl_minutes);
  sqlx::query(
    "INSERT INTO login_challenges (email, token_hash, expires_at) VALUES ($1, $2, $3)",
  )
  .bind(email)
  .bind(&hash)
  .bind(expires_at)
  .execute(pool)
  .await
  .unwrap();
  raw
}

#[sqlx::test]
async fn verify_magic_link_creates_user_and_session(pool: PgPool) {
  let cfg = test_config();
  let raw_token = issue_challenge(&pool, &cfg, "student@example.com").await;

  let tokens = auth::verify_magic_link(&pool, &cfg, &raw_token, Some("1.2.3.4"), Some("curl/8.0"))
      .await
      .unwrap();

  assert!(access_token::verify(&cfg, &tokens.access_token).is_some());

  let user: (uuid::Uuid,) = sqlx::query_as("SELECT id FROM users WHERE email = $1")
      .bind("student@example.com")
      .fetch_one(&pool)
      .await
      .unwrap();

  let session_count: (i64,) =
      sqlx::query_as("SELECT count(*) FROM sessions WHERE user_id = $1")
          .bind(user.0)
          .fetch_one(&pool)
          .await
          .unwrap();
  assert_eq!(session_count.0, 1);
}

#[sqlx::test]
async fn verify_magic_link_rejects_reused_challenge(pool: PgPool) {
  let cfg = test_config();
  let raw_token = issue_challenge(&pool, &cfg, "once@example.com").await;

  auth::verify_magic_link(&pool, &cfg, &raw_token, None, None)
      .await
      .unwrap();

  let err = auth::verify_magic_link(&pool, &cfg, &raw_token, None, None)
      .await
      .unwrap_err();
  assert!(matches!(err, auth::AuthError::InvalidOrExpiredToken));
}

#[sqlx::test]
async fn verify_magic_link_rejects_expired_challenge(pool: PgPool) {
  let cfg = test_config();
  let raw = token::generate_challenge_token();
  let hash = token::digest(&raw);
  let expires_at = chrono::Utc::now() - chrono::Duration::minutes(1);
  sqlx::query("INSERT INTO login_challenges (email, token_hash, expires_at) VALUES ($1, $2, $3)")
      .bind("late@example.com")
      .bind(&hash)
      .bind(expires_at)
      .execute(&pool)
      .await
      .unwrap();

  let err = auth::verify_magic_link(&pool, &cfg, &raw, None, None)
      .await
      .unwrap_err();
  assert!(matches!(err, auth::AuthError::InvalidOrExpiredToken));
}

#[sqlx::test]
async fn refresh_rotates_session_and_revokes_predecessor(pool: PgPool) {
  let cfg = test_config();
  let raw_token = issue_challenge(&pool, &cfg, "rotate@example.com").await;
  let first = auth::verify_magic_link(&pool, &cfg, &raw_token, Some("1.1.1.1"), Some("agent-a"))
      .await
      .unwrap();

  let second = auth::refresh_session(&pool, &cfg, &first.refresh_token, Some("1.1.1.1"), Some("agent-a"))
      .await
      .unwrap();

  assert_ne!(first.refresh_token, second.refresh_token);

  let old_hash = token::digest(&first.refresh_token);
  let revoked_at: (Option<chrono::DateTime<chrono::Utc>>,) =
      sqlx::query_as("SELECT revoked_at FROM sessions WHERE refresh_token_hash = $1")
          .bind(&old_hash)
          .fetch_one(&pool)
          .await
          .unwrap();
  assert!(revoked_at.0.is_some());
}

#[sqlx::test]
async fn reuse_of_rotated_refresh_token_revokes_the_whole_chain(pool: PgPool) {
  let cfg = test_config();
  let raw_token = issue_challenge(&pool, &cfg, "reuse@example.com").await;
  let first = auth::verify_magic_link(&pool, &cfg, &raw_token, None, None).await.unwrap();
  let second = auth::refresh_session(&pool, &cfg, &first.refresh_token, None, None).await.unwrap();

  // presenting the already-rotated first token again is reuse
  let err = auth::refresh_session(&pool, &cfg, &first.refresh_token, None, None)
      .await
      .unwrap_err();
  assert!(matches!(err, auth::AuthError::RefreshTokenReuse));

  // the chain descendant (second) must now be revoked too
  let second_hash = token::digest(&second.refresh_token);
  let revoked_at: (Option<chrono::DateTime<chrono::Utc>>,) =
      sqlx::query_as("SELECT revoked_at FROM sessions WHERE refresh_token_hash = $1")
          .bind(&second_hash)
          .fetch_one(&pool)
          .await
          .unwrap();
  assert!(revoked_at.0.is_some());

  let err = auth::refresh_session(&pool, &cfg, &second.refresh_token, None, None)
      .await
      .unwrap_err();
  assert!(matches!(err, auth::AuthError::RefreshTokenReuse));
}

#[sqlx::test]
async fn refresh_with_mismatched_ip_is_treated_as_hijack(pool: PgPool) {
  let cfg = test_config();
  let raw_token = issue_challenge(&pool, &cfg, "hijack@example.com").await;
  let first = auth::verify_magic_link(&pool, &cfg, &raw_token, Some("9.9.9.9"), Some("agent-a"))
      .await
      .unwrap();

  let err = auth::refresh_session(&pool, &cfg, &first.refresh_token, Some("8.8.8.8"), Some("agent-a"))
      .await
      .unwrap_err();
  assert!(matches!(err, auth::AuthError::SessionHijacking));
}

#[sqlx::test]
async fn logout_revokes_session_idempotently(pool: PgPool) {
  let cfg = test_config();
  let raw_token = issue_challenge(&pool, &cfg, "logout@example.com").await;
  let tokens = auth::verify_magic_link(&pool, &cfg, &raw_token, None, None).await.unwrap();

  auth::logout(&pool, &cfg, &tokens.refresh_token).await.unwrap();
  auth::logout(&pool, &cfg, &tokens.refresh_token).await.unwrap();

  let err = auth::refresh_session(&pool, &cfg, &tokens.refresh_token, None, None)
      .await
      .unwrap_err();
  assert!(matches!(err, auth::AuthError::RefreshTokenReuse));
}

#[sqlx::test]
async fn logout_all_revokes_every_session_for_the_user(pool: PgPool) {
  let cfg = test_config();
  let raw_token = issue_challenge(&pool, &cfg, "multi@example.com").await;
  let first = auth::verify_magic_link(&pool, &cfg, &raw_token, None, None).await.unwrap();

  let raw_token2 = issue_challenge(&pool, &cfg, "multi@example.com").await;
  let second = auth::verify_magic_link(&pool, &cfg, &raw_token2, None, None).await.unwrap();

  let user: (uuid::Uuid,) = sqlx::query_as("SELECT id FROM users WHERE email = $1")
      .bind("multi@example.com")
      .fetch_one(&pool)
      .await
      .unwrap();

  auth::logout_all(&pool, &cfg, user.0).await.unwrap();

  for refresh_token in [&first.refresh_token, &second.refresh_token] {
    let err = auth::refresh_session(&pool, &cfg, refresh_token, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, auth::AuthError::RefreshTokenReuse));
  }
}

#[sqlx::test]
async fn get_user_returns_none_for_unknown_id(pool: PgPool) {
  let user = auth::get_user(&pool, uuid::Uuid::new_v4()).await.unwrap();
  assert!(user.is_none());
}
