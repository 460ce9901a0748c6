use std::net::SocketAddr;

use axum::{
  extract::{ConnectInfo, FromRef, State},
  http::HeaderMap,
  middleware,
  routing::{get, post},
  Json, Router,
};
use axum_extra::extract::{cookie::Cookie, CookieJar};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::Duration as TimeDuration;

use crate::{
  auth,
  config::Config,
  error::{ApiError, ApiResult},
  middleware::{decode_bearer, CurrentUser},
  models::UserProfile,
  rate_limit::RateLimiter,
};

#[derive(Clone)]
pub struct AppState {
  pub cfg: Config,
  pub pool: PgPool,
  pub limiter: RateLimiter,
}

impl FromRef<AppState> for Config {
  fn from_ref(state: &AppState) -> Self {
    state.cfg.clone()
  }
}

impl FromRef<AppState> for PgPool {
  fn from_ref(state: &AppState) -> Self {
    state.pool.clone()
  }
}

impl FromRef<AppState> for RateLimiter {
  fn from_ref(state: &AppState) -> Self {
    state.limiter.clone()
  }
}

pub fn router(state: AppState) -> Router {
  let auth_routes = Router::new()
      .route("/magic/request", post(magic_request))
      .route("/magic/verify", post(magic_verify))
      .route("/refresh", post(refresh))
      .route("/logout", post(logout))
      .route("/logout-all", post(logout_all))
      .route("/me", get(me))
      .with_state(state.clone())
      .layer(middleware::from_fn_with_state(state.cfg.clone(), decode_bearer));

  Router::new().nest("/api/v1/auth", auth_routes).with_state(state)
}

pub async fn healthz() -> &'static str {
  "ok"
}

fn request_ip(headers: &HeaderMap, connect_info: Option<&SocketAddr>) -> Option<String> {
  headers
      .get("x-forwarded-for")
      .and_then(|v| v.to_str().ok())
      .and_then(|v| v.split(',').next())
      .map(|v| v.trim().to_string())
      .or_else(|| connect_info.map(|addr| addr.ip().to_string()))
}

fn request_user_agent(headers: &HeaderMap) -> Option<String> {
  headers
      .get(axum::http::header::USER_AGENT)
      .and_then(|v| v.to_str().ok())
      .map(str::to_string)
}

fn auth_cookies(cfg: &Config, access_token: &str, refresh_token: &str) -> CookieJar {
  let mut access = Cookie::build(("access_token", access_token.to_string()))
      .path("/")
      .http_only(true)
      .secure(cfg.cookie_secure)
      .same_site(cfg.cookie_samesite)
      .max_age(TimeDuration::seconds(cfg.access_token_ttl_secs))
      .build();
  let mut refresh = Cookie::build(("refresh_token", refresh_token.to_string()))
      .path("/")
      .http_only(true)
      .secure(cfg.cookie_secure)
      .same_site(cfg.cookie_samesite)
      .max_age(TimeDuration::days(cfg.refresh_token_ttl_days))
      .build();
  if let Some(domain) = &cfg.cookie_domain {
    access.set_domain(domain.clone());
    refresh.set_domain(domain.clone());
  }
  CookieJar::new().add(access).add(refresh)
}

fn clear_auth_cookies(cfg: &Config) -> CookieJar {
  let mut access = Cookie::build(("access_token", ""))
      .path("/")
      .max_age(TimeDuration::ZERO)
      .build();
  let mut refresh = Cookie::build(("refresh_token", ""))
      .path("/")
      .max_age(TimeDuration::ZERO)
      .build();
  if let Some(domain) = &cfg.cookie_domain {
    access.set_domain(domain.clone());
    refresh.set_domain(domain.clone());
  }
  CookieJar::new().add(access).add(refresh)
}

#[derive(Debug, Serialize)]
struct StatusResp {
  status: &'static str,
}

impl Default for StatusResp {
  fn default() -> Self {
    Self { status: "ok" }
  }
}

#[derive(Debug, Deserialize)]
struct MagicRequestReq {
  email: String,
}

async fn magic_request(
  State(cfg): State<Config>,
  State(pool): State<PgPool>,
  State(limiter): State<RateLimiter>,
  ConnectInfo(addr): ConnectInfo<SocketAddr>,
  headers: HeaderMap,
  Json(req): Json<MagicRequestReq>,
) -> ApiResult<Json<StatusResp>> {
  let ip = request_ip(&headers, Some(&addr));
  let ua = request_user_agent(&headers);

  auth::request_magic_link(&pool, &limiter, &cfg, &req.email, ip.as_deref(), ua.as_deref()).await;

  Ok(Json(StatusResp::default()))
}

#[derive(Debug, Deserialize)]
struct MagicVerifyReq {
  token: String,
}

async fn magic_verify(
  State(cfg): State<Config>,
  State(pool): State<PgPool>,
  ConnectInfo(addr): ConnectInfo<SocketAddr>,
  headers: HeaderMap,
  Json(req): Json<MagicVerifyReq>,
) -> ApiResult<(CookieJar, Json<StatusResp>)> {
  let ip = request_ip(&headers, Some(&addr));
  let ua = request_user_agent(&headers);

  let tokens = auth::verify_magic_link(&pool, &cfg, &req.token, ip.as_deref(), ua.as_deref())
      .await
      .map_err(ApiError::from)?;

  let jar = auth_cookies(&cfg, &tokens.access_token, &tokens.refresh_token);
  Ok((jar, Json(StatusResp::default())))
}

async fn refresh(
  State(cfg): State<Config>,
  State(pool): State<PgPool>,
  ConnectInfo(addr): ConnectInfo<SocketAddr>,
  headers: HeaderMap,
  jar: CookieJar,
) -> ApiResult<(CookieJar, Json<StatusResp>)> {
  let refresh_token = jar
      .get("refresh_token")
      .map(|c| c.value().to_string())
      .ok_or(ApiError::MissingRefreshToken)?;

  let ip = request_ip(&headers, Some(&addr));
  let ua = request_user_agent(&headers);

  let tokens = auth::refresh_session(&pool, &cfg, &refresh_token, ip.as_deref(), ua.as_deref())
      .await
      .map_err(ApiError::from)?;

  let jar = auth_cookies(&cfg, &tokens.access_token, &tokens.refresh_token);
  Ok((jar, Json(StatusResp::default())))
}

async fn logout(
  State(cfg): State<Config>,
  State(pool): State<PgPool>,
  jar: CookieJar,
) -> ApiResult<(CookieJar, Json<StatusResp>)> {
  let refresh_token = jar
      .get("refresh_token")
      .map(|c| c.value().to_string())
      .ok_or(ApiError::MissingRefreshToken)?;

  auth::logout(&pool, &cfg, &refresh_token).await.map_err(ApiError::from)?;

  Ok((clear_auth_cookies(&cfg), Json(StatusResp::default())))
}

async fn logout_all(
  State(cfg): State<Config>,
  State(pool): State<PgPool>,
  CurrentUser(user_id): CurrentUser,
) -> ApiResult<(CookieJar, Json<StatusResp>)> {
  auth::logout_all(&pool, &cfg, user_id).await.map_err(ApiError::from)?;

  Ok((clear_auth_cookies(&cfg), Json(StatusResp::default())))
}

async fn me(
  State(pool): State<PgPool>,
  CurrentUser(user_id): CurrentUser,
) -> ApiResult<Json<UserProfile>> {
  let user = auth::get_user(&pool, user_id)
      .await
      .map_err(ApiError::from)?
      .ok_or(ApiError::Unauthorized)?;

  Ok(Json(user.into()))
}
