//! Per-email and per-IP sliding-window admission counters (C3), backed by
//! Redis. Fixed-window: the counter for a key expires `window_secs` after its
//! first increment.

use std::time::Duration;

use redis::aio::ConnectionManager;

use crate::config::Config;

const REDIS_CALL_TIMEOUT: Duration = Duration::from_millis(200);

#[derive(Clone)]
pub struct RateLimiter {
  redis: ConnectionManager,
  window_secs: i64,
  max: i64,
}

impl RateLimiter {
  pub fn new(redis: ConnectionManager, cfg: &Config) -> Self {
    Self {
      redis,
      window_secs: cfg.rate_limit_window_secs,
      max: cfg.rate_limit_max,
    }
  }

  /// Returns `true` if the request is admitted, `false` if either the
  /// per-email or per-IP bucket has exceeded `max` within the window.
  ///
  /// Fails open (admits) on Redis errors or on a call that doesn't come back
  /// within 200ms: a brief relaxation of limits beats locking out every
  /// login on an infra outage or a partition that hangs rather than resets.
  pub async fn admit(&self, email: &str, ip: Option<&str>) -> bool {
    let ip = ip.unwrap_or("unknown");
    let key_email = format!("rl:magic:email:{email}");
    let key_ip = format!("rl:magic:ip:{ip}");

    let mut conn = self.redis.clone();
    let mut pipe = redis::pipe();
    pipe.atomic()
        .incr(&key_email, 1)
        .expire(&key_email, self.window_secs)
        .incr(&key_ip, 1)
        .expire(&key_ip, self.window_secs);
    let call = pipe.query_async::<(i64, i64, i64, i64)>(&mut conn);

    match tokio::time::timeout(REDIS_CALL_TIMEOUT, call).await {
      Ok(Ok((email_count, _, ip_count, _))) => email_count <= self.max && ip_count <= self.max,
      Ok(Err(err)) => {
        tracing::warn!(error = %err, "rate limiter redis call failed, failing open");
        true
      }
      Err(_) => {
        tracing::warn!("rate limiter redis call timed out, failing open");
        true
      }
    }
  }
}
