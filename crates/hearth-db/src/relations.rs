//! Lookups against the host application's user and follow tables.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};

use hearth_core::{Error, RelationRepository, Result, UserDirectory, UserId, UserProfile};

/// Follow graph, read from `user_follow`.
#[derive(Clone)]
pub struct PgRelationRepository {
    pool: Pool<Postgres>,
}

impl PgRelationRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RelationRepository for PgRelationRepository {
    async fn followers(&self, user_id: UserId) -> Result<Vec<UserId>> {
        sqlx::query_scalar(
            "SELECT follower_id FROM user_follow WHERE following_id = $1 ORDER BY follower_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)
    }

    async fn followings(&self, user_id: UserId) -> Result<Vec<UserId>> {
        sqlx::query_scalar(
            "SELECT following_id FROM user_follow WHERE follower_id = $1 ORDER BY following_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)
    }
}

/// Sender profiles, read from `app_user`.
#[derive(Clone)]
pub struct PgUserDirectory {
    pool: Pool<Postgres>,
}

impl PgUserDirectory {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn profile(&self, user_id: UserId) -> Result<Option<UserProfile>> {
        let row = sqlx::query("SELECT id, display_name, avatar_url FROM app_user WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.map(|r| UserProfile {
            user_id: r.get("id"),
            display_name: r.get("display_name"),
            avatar_url: r.get("avatar_url"),
        }))
    }
}
