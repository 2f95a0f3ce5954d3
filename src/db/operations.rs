use sqlx::PgPool;
use uuid::Uuid;
use chrono::{DateTime, Utc};
use crate::db::models::{MagicLinkToken, Subscription, User, UserSession};
use crate::error::DatabaseError;
use crate::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Transaction, Postgres};
use std::time::Duration;
use std::sync::Arc;

const USER_COLUMNS: &str =
    "id, email, display_name, password_hash, created_at, updated_at, last_login, is_active";

/// Data access for every table. Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct DbOperations {
    pub(crate) pool: Arc<PgPool>,
}

impl DbOperations {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub async fn new_with_options(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await
            .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;

        Ok(Self { pool: Arc::new(pool) })
    }

    pub fn pool(&self) -> &PgPool {
        self.pool.as_ref()
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(self.pool.as_ref()).await?;
        Ok(())
    }

    pub async fn begin_transaction(&self) -> Result<Transaction<'static, Postgres>> {
        Ok(self.pool.begin().await?)
    }

    // Users

    pub async fn create_user(&self, user: &User) -> Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, email, display_name, password_hash, created_at, updated_at, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.display_name)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .bind(user.updated_at)
        .bind(user.is_active)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(user)
    }

    /// Inserts the user unless the email is taken, then returns the stored row.
    pub async fn find_or_create_user(&self, email: &str) -> Result<User> {
        let user = User::new(email.to_string(), None, None);
        sqlx::query(
            r#"
            INSERT INTO users (id, email, created_at, updated_at, is_active)
            VALUES ($1, $2, $3, $4, TRUE)
            ON CONFLICT (email) DO NOTHING
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(self.pool.as_ref())
        .await?;

        self.get_user_by_email(email)
            .await?
            .ok_or_else(|| DatabaseError::NotFound.into())
    }

    pub async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(user)
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(user)
    }

    pub async fn record_login(&self, user_id: Uuid) -> Result<()> {
        let now = Utc::now();
        sqlx::query("UPDATE users SET last_login = $1, updated_at = $1 WHERE id = $2")
            .bind(now)
            .bind(user_id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    // Sessions

    pub async fn create_session(&self, session: &UserSession) -> Result<UserSession> {
        let session = sqlx::query_as::<_, UserSession>(
            r#"
            INSERT INTO user_sessions (id, user_id, token, expires_at, created_at, last_activity)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(&session.token)
        .bind(session.expires_at)
        .bind(session.created_at)
        .bind(session.last_activity)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(session)
    }

    pub async fn get_session_by_token(&self, token: &str) -> Result<Option<UserSession>> {
        let session = sqlx::query_as::<_, UserSession>(
            "SELECT * FROM user_sessions WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(session)
    }

    pub async fn update_session_activity(&self, token: &str) -> Result<()> {
        sqlx::query("UPDATE user_sessions SET last_activity = $1 WHERE token = $2")
            .bind(Utc::now())
            .bind(token)
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    pub async fn delete_session(&self, token: &str) -> Result<()> {
        sqlx::query("DELETE FROM user_sessions WHERE token = $1")
            .bind(token)
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    // Magic links

    pub async fn create_magic_link(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<MagicLinkToken> {
        let link = sqlx::query_as::<_, MagicLinkToken>(
            r#"
            INSERT INTO magic_link_tokens (id, user_id, token_hash, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .bind(Utc::now())
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(link)
    }

    /// Marks an unexpired, unused link as used and returns it. Only one caller
    /// can consume a given token.
    pub async fn consume_magic_link(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<MagicLinkToken>> {
        let link = sqlx::query_as::<_, MagicLinkToken>(
            r#"
            UPDATE magic_link_tokens
            SET used_at = $2
            WHERE token_hash = $1 AND used_at IS NULL AND expires_at > $2
            RETURNING *
            "#,
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(link)
    }

    // Subscriptions

    pub async fn get_subscription(&self, user_id: Uuid) -> Result<Option<Subscription>> {
        let subscription = sqlx::query_as::<_, Subscription>(
            "SELECT user_id, plan, status, current_period_end FROM subscriptions WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(subscription)
    }

    pub async fn upsert_subscription(&self, subscription: &Subscription) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (user_id, plan, status, current_period_end, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (user_id) DO UPDATE
            SET plan = EXCLUDED.plan,
                status = EXCLUDED.status,
                current_period_end = EXCLUDED.current_period_end,
                updated_at = NOW()
            "#,
        )
        .bind(subscription.user_id)
        .bind(subscription.plan.as_str())
        .bind(&subscription.status)
        .bind(subscription.current_period_end)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    // Housekeeping

    /// Removes expired sessions and magic links. Returns rows deleted.
    pub async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut transaction = self.begin_transaction().await?;

        let sessions = sqlx::query("DELETE FROM user_sessions WHERE expires_at < $1")
            .bind(now)
            .execute(&mut *transaction)
            .await?;

        let links = sqlx::query(
            "DELETE FROM magic_link_tokens WHERE expires_at < $1 OR used_at IS NOT NULL",
        )
        .bind(now)
        .execute(&mut *transaction)
        .await?;

        transaction.commit().await?;
        Ok(sessions.rows_affected() + links.rows_affected())
    }
}
