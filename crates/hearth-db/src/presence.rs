//! PostgreSQL presence store.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};

use hearth_core::{Error, PresenceRepository, PresenceState, PresenceStatus, Result, UserId};

/// Current online/offline state, one row per user.
#[derive(Clone)]
pub struct PgPresenceRepository {
    pool: Pool<Postgres>,
}

impl PgPresenceRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(r: &sqlx::postgres::PgRow) -> Result<PresenceState> {
        let status: String = r.get("status");
        Ok(PresenceState {
            user_id: r.get("user_id"),
            status: status.parse::<PresenceStatus>().map_err(Error::Internal)?,
            changed_at: r.get("changed_at"),
        })
    }
}

#[async_trait]
impl PresenceRepository for PgPresenceRepository {
    async fn set_status(&self, user_id: UserId, status: PresenceStatus) -> Result<PresenceState> {
        let row = sqlx::query(
            "INSERT INTO user_presence (user_id, status, changed_at)
             VALUES ($1, $2, now())
             ON CONFLICT (user_id) DO UPDATE
                SET status = EXCLUDED.status, changed_at = EXCLUDED.changed_at
             RETURNING user_id, status, changed_at",
        )
        .bind(user_id)
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Self::parse_row(&row)
    }

    async fn get(&self, user_id: UserId) -> Result<Option<PresenceState>> {
        let row = sqlx::query(
            "SELECT user_id, status, changed_at FROM user_presence WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(Self::parse_row).transpose()
    }
}
