//! Short-lived signed bearer tokens (C2). Stateless: no revocation list, the
//! refresh side is the kill switch.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
  pub sub: String,
  pub iat: usize,
  pub exp: usize,
}

pub fn mint(cfg: &Config, user_id: Uuid) -> Result<String, jsonwebtoken::errors::Error> {
  let now = Utc::now();
  let claims = Claims {
    sub: user_id.to_string(),
    iat: now.timestamp() as usize,
    exp: (now + Duration::seconds(cfg.access_token_ttl_secs)).timestamp() as usize,
  };
  encode(
    &Header::new(Algorithm::HS256),
    &claims,
    &EncodingKey::from_secret(cfg.jwt_secret.as_bytes()),
  )
}

pub fn verify(cfg: &Config, token: &str) -> Option<Uuid> {
  let mut validation = Validation::new(Algorithm::HS256);
  validation.validate_exp = true;
  let data = decode::<Claims>(
    token,
    &DecodingKey::from_secret(cfg.jwt_secret.as_bytes()),
    &validation,
  )
  .ok()?;
  data.claims.sub.parse().ok()
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::net::SocketAddr;

  fn test_config(ttl_secs: i64) -> Config {
    Config {
      database_url: String::new(),
      db_max_connections: 1,
      db_connect_timeout_secs: 1,
      db_acquire_timeout_secs: 1,
      db_statement_timeout_secs: 2,
      redis_url: String::new(),
      jwt_secret: "test-secret".to_string(),
      access_token_ttl_secs: ttl_secs,
      refresh_token_ttl_days: 30,
      magic_link_ttl_minutes: 10,
      rate_limit_window_secs: 600,
      rate_limit_max: 5,
      cookie_secure: true,
      cookie_samesite: axum_extra::extract::cookie::SameSite::Lax,
      cookie_domain: None,
      bind_addr: "127.0.0.1:0".parse::<SocketAddr>().unwrap(),
    }
  }

  #[test]
  fn mint_then_verify_roundtrips_subject() {
    let cfg = test_config(900);
    let user_id = Uuid::new_v4();
    let token = mint(&cfg, user_id).unwrap();
    assert_eq!(verify(&cfg, &token), Some(user_id));
  }

  #[test]
  fn expired_token_does_not_verify() {
    let cfg = test_config(-120);
    let user_id = Uuid::new_v4();
    let token = mint(&cfg, user_id).unwrap();
    assert_eq!(verify(&cfg, &token), None);
  }

  #[test]
  fn garbage_token_does_not_verify() {
    let cfg = test_config(900);
    assert_eq!(verify(&cfg, "not-a-jwt"), None);
  }

  #[test]
  fn wrong_secret_does_not_verify() {
    let cfg = test_config(900);
    let token = mint(&cfg, Uuid::new_v4()).unwrap();
    let mut other = test_config(900);
    other.jwt_secret = "different-secret".to_string();
    assert_eq!(verify(&other, &token), None);
  }
}
