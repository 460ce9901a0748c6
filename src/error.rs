use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::auth::AuthError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
  pub ok: bool,
  pub error: ErrorInfo,
}

#[derive(Debug, Serialize)]
pub struct ErrorInfo {
  pub code: &'static str,
  pub message: &'static str,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub details: Option<serde_json::Value>,
}

/// Transport-level error taxonomy. Never invents a security-relevant tag that
/// the auth state machine (`AuthError`) didn't already raise.
#[derive(Debug, Error)]
#[allow(dead_code)]
pub enum ApiError {
  #[error("bad request")]
  BadRequest,
  #[error("unauthorized")]
  Unauthorized,
  #[error("missing refresh token")]
  MissingRefreshToken,
  #[error("invalid refresh token")]
  InvalidRefreshToken,
  #[error("refresh token expired")]
  RefreshTokenExpired,
  #[error("refresh token reuse")]
  RefreshTokenReuse,
  #[error("session hijacking")]
  SessionHijacking,
  #[error("invalid or expired token")]
  InvalidOrExpiredToken,
  #[error("internal error")]
  Internal,
}

impl ApiError {
  pub fn code_message(&self) -> (&'static str, &'static str) {
    match self {
      ApiError::BadRequest => ("bad_request", "the request body is malformed"),
      ApiError::Unauthorized => ("unauthorized", "not logged in or session expired"),
      ApiError::MissingRefreshToken => ("missing_refresh_token", "no refresh token was presented"),
      ApiError::InvalidRefreshToken => ("invalid_refresh_token", "refresh token is invalid"),
      ApiError::RefreshTokenExpired => ("refresh_token_expired", "refresh token has expired"),
      ApiError::RefreshTokenReuse => ("refresh_token_reuse", "refresh token reuse detected"),
      ApiError::SessionHijacking => ("session_hijacking", "session hijacking detected"),
      ApiError::InvalidOrExpiredToken => ("invalid_or_expired_token", "login token is invalid or expired"),
      ApiError::Internal => ("internal_error", "internal server error"),
    }
  }

  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::BadRequest | ApiError::InvalidOrExpiredToken => StatusCode::BAD_REQUEST,
      ApiError::Unauthorized
      | ApiError::MissingRefreshToken
      | ApiError::InvalidRefreshToken
      | ApiError::RefreshTokenExpired
      | ApiError::RefreshTokenReuse
      | ApiError::SessionHijacking => StatusCode::UNAUTHORIZED,
      ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (code, message) = self.code_message();
    let status = self.status();
    let body = ErrorBody {
      ok: false,
      error: ErrorInfo {
        code,
        message,
        details: None,
      },
    };
    (status, Json(body)).into_response()
  }
}

impl From<AuthError> for ApiError {
  fn from(err: AuthError) -> Self {
    match err {
      AuthError::InvalidOrExpiredToken => ApiError::InvalidOrExpiredToken,
      AuthError::InvalidRefreshToken => ApiError::InvalidRefreshToken,
      AuthError::RefreshTokenExpired => ApiError::RefreshTokenExpired,
      AuthError::RefreshTokenReuse => ApiError::RefreshTokenReuse,
      AuthError::SessionHijacking => ApiError::SessionHijacking,
      AuthError::Internal(_) => ApiError::Internal,
    }
  }
}

impl From<sqlx::Error> for ApiError {
  fn from(err: sqlx::Error) -> Self {
    tracing::error!(error = %err, "database error");
    ApiError::Internal
  }
}

pub type ApiResult<T> = Result<T, ApiError>;
