use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::Row;

use crate::db::PostgresStore;

#[derive(Clone, Debug)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_by_id(&self, id: i64) -> Result<Option<User>, anyhow::Error>;
    async fn get_by_username(&self, username: &str) -> Result<Option<User>, anyhow::Error>;
    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<User, anyhow::Error>;
}

#[async_trait]
impl UserStore for PostgresStore {
    async fn get_by_id(&self, id: i64) -> Result<Option<User>, anyhow::Error> {
        let row = self
            .pool
            .get()
            .await?
            .query_opt(
                "SELECT id, username, password_hash, is_admin, created_at FROM users WHERE id = $1",
                &[&id],
            )
            .await?;
        match row {
            Some(row) => {
                let user = row_to_user(&row);
                Ok(Some(user))
            }
            None => Ok(None),
        }
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>, anyhow::Error> {
        let row = self
            .pool
            .get()
            .await?
            .query_opt(
                "SELECT id, username, password_hash, is_admin, created_at FROM users WHERE username = $1",
                &[&username],
            )
            .await?;
        match row {
            Some(row) => {
                let user = row_to_user(&row);
                Ok(Some(user))
            }
            None => Ok(None),
        }
    }

    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<User, anyhow::Error> {
        let row = self
            .pool
            .get()
            .await?
            .query_one(
                r#"INSERT INTO users
                        (username, password_hash)
                    VALUES
                        ($1, $2)
                    RETURNING id, username, password_hash, is_admin, created_at
                "#,
                &[&username, &password_hash],
            )
            .await?;
        Ok(row_to_user(&row))
    }
}

fn row_to_user(row: &Row) -> User {
    User {
        id: row.get(0),
        username: row.get(1),
        password_hash: row.get(2),
        is_admin: row.get(3),
        created_at: row.get(4),
    }
}
