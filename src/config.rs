use std::{env, net::SocketAddr};

use anyhow::Context;
use axum_extra::extract::cookie::SameSite;

#[derive(Clone)]
pub struct Config {
  pub database_url: String,
  pub db_max_connections: u32,
  pub db_connect_timeout_secs: u64,
  pub db_acquire_timeout_secs: u64,
  pub db_statement_timeout_secs: u64,
  pub redis_url: String,
  pub jwt_secret: String,
  pub access_token_ttl_secs: i64,
  pub refresh_token_ttl_days: i64,
  pub magic_link_ttl_minutes: i64,
  pub rate_limit_window_secs: i64,
  pub rate_limit_max: i64,
  pub cookie_secure: bool,
  pub cookie_samesite: SameSite,
  pub cookie_domain: Option<String>,
  pub bind_addr: SocketAddr,
}

impl Config {
  pub fn from_env() -> anyhow::Result<Self> {
    let database_url =
        env::var("DATABASE_URL").context("missing env DATABASE_URL (see .env.example)")?;

    let db_max_connections = env::var("DB_MAX_CONNECTIONS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(10);
    let db_connect_timeout_secs = env::var("DB_CONNECT_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(5);
    let db_acquire_timeout_secs = env::var("DB_ACQUIRE_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(5);
    let db_statement_timeout_secs = env::var("DB_STATEMENT_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(2);

    let redis_url = env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

    let jwt_secret = env::var("JWT_SECRET").context("missing env JWT_SECRET (see .env.example)")?;
    let access_token_ttl_secs = env::var("ACCESS_TOKEN_TTL_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(900);
    let refresh_token_ttl_days = env::var("REFRESH_TOKEN_TTL_DAYS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(30);
    let magic_link_ttl_minutes = env::var("MAGIC_LINK_TTL_MINUTES")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(10);
    let rate_limit_window_secs = env::var("RATE_LIMIT_WINDOW_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(600);
    let rate_limit_max = env::var("RATE_LIMIT_MAX")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(5);

    let cookie_secure = env::var("COOKIE_SECURE")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(true);
    let cookie_samesite = match env::var("COOKIE_SAMESITE")
        .unwrap_or_else(|_| "lax".to_string())
        .to_lowercase()
        .as_str()
    {
      "strict" => SameSite::Strict,
      "none" => SameSite::None,
      _ => SameSite::Lax,
    };
    let cookie_domain = env::var("COOKIE_DOMAIN").ok();

    let bind_addr: SocketAddr = env::var("BIND_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
        .parse()
        .context("invalid env BIND_ADDR (expected host:port)")?;

    Ok(Self {
      database_url,
      db_max_connections,
      db_connect_timeout_secs,
      db_acquire_timeout_secs,
      db_statement_timeout_secs,
      redis_url,
      jwt_secret,
      access_token_ttl_secs,
      refresh_token_ttl_days,
      magic_link_ttl_minutes,
      rate_limit_window_secs,
      rate_limit_max,
      cookie_secure,
      cookie_samesite,
      cookie_domain,
      bind_addr,
    })
  }

  pub fn refresh_token_ttl_secs(&self) -> i64 {
    self.refresh_token_ttl_days * 24 * 3600
  }
}
