//! PostgreSQL notification store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use hearth_core::{
    Error, EventKind, ListNotificationsRequest, NewNotification, Notification,
    NotificationPage, NotificationRepository, Result, UserId,
};

const COLUMNS: &str = "id, kind, title, body, sender_id, sender_display_name, sender_avatar_url,
                       target_id, receiver_id, is_read, created_at";

/// PostgreSQL notification repository.
#[derive(Clone)]
pub struct PgNotificationRepository {
    pool: Pool<Postgres>,
}

impl PgNotificationRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(r: &sqlx::postgres::PgRow) -> Result<Notification> {
        let kind: String = r.get("kind");
        Ok(Notification {
            id: r.get("id"),
            kind: kind.parse::<EventKind>()?,
            title: r.get("title"),
            body: r.get("body"),
            sender_id: r.get("sender_id"),
            sender_display_name: r.get("sender_display_name"),
            sender_avatar_url: r.get("sender_avatar_url"),
            target_id: r.get("target_id"),
            receiver_id: r.get("receiver_id"),
            is_read: r.get("is_read"),
            created_at: r.get("created_at"),
        })
    }
}

#[async_trait]
impl NotificationRepository for PgNotificationRepository {
    async fn create(&self, n: NewNotification) -> Result<Notification> {
        let id = hearth_core::new_v7();
        let row = sqlx::query(&format!(
            "INSERT INTO notification (id, kind, title, body, sender_id, sender_display_name,
                                       sender_avatar_url, target_id, receiver_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {COLUMNS}"
        ))
        .bind(id)
        .bind(n.kind.as_str())
        .bind(&n.title)
        .bind(&n.body)
        .bind(n.sender_id)
        .bind(&n.sender_display_name)
        .bind(&n.sender_avatar_url)
        .bind(n.target_id)
        .bind(n.receiver_id)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Self::parse_row(&row)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Notification>> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM notification WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.as_ref().map(Self::parse_row).transpose()
    }

    async fn list(&self, req: ListNotificationsRequest) -> Result<NotificationPage> {
        let limit = req.effective_limit();
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS}
             FROM notification
             WHERE receiver_id = $1
               AND ($2::uuid IS NULL OR id < $2)
               AND ($3::boolean IS NULL OR is_read = $3)
             ORDER BY id DESC
             LIMIT $4"
        ))
        .bind(req.receiver_id)
        .bind(req.cursor)
        .bind(req.read_filter.map(|f| f.is_read()))
        .bind(limit + 1)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let items = rows
            .iter()
            .map(Self::parse_row)
            .collect::<Result<Vec<_>>>()?;
        Ok(NotificationPage::from_overfetched(items, limit))
    }

    async fn mark_read(&self, id: Uuid, receiver_id: UserId) -> Result<()> {
        let result =
            sqlx::query("UPDATE notification SET is_read = true WHERE id = $1 AND receiver_id = $2")
                .bind(id)
                .bind(receiver_id)
                .execute(&self.pool)
                .await
                .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("notification {id}")));
        }
        Ok(())
    }

    async fn mark_all_read(&self, receiver_id: UserId) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE notification SET is_read = true WHERE receiver_id = $1 AND is_read = false",
        )
        .bind(receiver_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }

    async fn unread_count(&self, receiver_id: UserId) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notification WHERE receiver_id = $1 AND is_read = false",
        )
        .bind(receiver_id)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(count)
    }

    async fn purge_older_than(&self, threshold: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM notification WHERE created_at < $1")
            .bind(threshold)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }
}
