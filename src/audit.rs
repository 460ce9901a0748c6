//! Append-only audit sink (C8). Fire-and-forget: a write failure is logged
//! and never propagated to the success path.

use sqlx::PgPool;
use uuid::Uuid;

pub async fn log_event(
  pool: &PgPool,
  user_id: Option<Uuid>,
  event: &str,
  ip: Option<&str>,
  user_agent: Option<&str>,
) {
  let result = sqlx::query(
    r#"
    INSERT INTO audit_logs (user_id, event, ip, user_agent)
    VALUES ($1, $2, $3, $4)
    "#,
  )
  .bind(user_id)
  .bind(event)
  .bind(ip)
  .bind(user_agent)
  .execute(pool)
  .await;

  if let Err(err) = result {
    tracing::error!(error = %err, event, "failed to write audit log");
  }
}
