//! Bearer/cookie middleware (C9): a pure decoder. It never fails the
//! request — it attaches `Option<Uuid>` to the request extensions and lets
//! downstream handlers decide whether authentication is required.

use axum::{
  extract::{FromRef, FromRequestParts, Request, State},
  http::request::Parts,
  middleware::Next,
  response::Response,
};
use axum_extra::extract::CookieJar;
use uuid::Uuid;

use crate::{config::Config, error::ApiError};

#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub Uuid);

pub async fn decode_bearer(State(cfg): State<Config>, request: Request, next: Next) -> Response {
  let (mut parts, body) = request.into_parts();

  let token = CookieJar::from_headers(&parts.headers)
      .get("access_token")
      .map(|c| c.value().to_string())
      .or_else(|| {
        parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::to_string)
      });

  if let Some(user_id) = token.and_then(|t| crate::access_token::verify(&cfg, &t)) {
    parts.extensions.insert(CurrentUser(user_id));
  }

  let request = Request::from_parts(parts, body);
  next.run(request).await
}

impl<S> FromRequestParts<S> for CurrentUser
where
  Config: FromRef<S>,
  S: Send + Sync,
{
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
    parts
        .extensions
        .get::<CurrentUser>()
        .copied()
        .ok_or(ApiError::Unauthorized)
  }
}
