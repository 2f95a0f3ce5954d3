//! Relationship, membership, invite and streak queries.
//!
//! Mutations that must observe a consistent member count take an open
//! transaction so the caller can lock the relationship row first.

use chrono::{DateTime, Utc};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::db::models::{
    Invite, MemberProfile, Relationship, RelationshipKind, RelationshipMember, Streak,
};
use crate::db::operations::DbOperations;
use crate::Result;

impl DbOperations {
    pub async fn create_relationship_with_transaction(
        &self,
        kind: RelationshipKind,
        owner_id: Uuid,
        transaction: &mut Transaction<'_, Postgres>,
    ) -> Result<Relationship> {
        let relationship = sqlx::query_as::<_, Relationship>(
            r#"
            INSERT INTO relationships (id, kind, created_by, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, kind, created_by, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(kind.as_str())
        .bind(owner_id)
        .bind(Utc::now())
        .fetch_one(&mut **transaction)
        .await?;

        sqlx::query(
            "INSERT INTO streaks (relationship_id, current_streak, longest_streak) VALUES ($1, 0, 0)",
        )
        .bind(relationship.id)
        .execute(&mut **transaction)
        .await?;

        Ok(relationship)
    }

    pub async fn add_member_with_transaction(
        &self,
        relationship_id: Uuid,
        user_id: Uuid,
        role: &str,
        transaction: &mut Transaction<'_, Postgres>,
    ) -> Result<RelationshipMember> {
        let member = sqlx::query_as::<_, RelationshipMember>(
            r#"
            INSERT INTO relationship_members (id, relationship_id, user_id, role, is_active, joined_at)
            VALUES ($1, $2, $3, $4, TRUE, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(relationship_id)
        .bind(user_id)
        .bind(role)
        .bind(Utc::now())
        .fetch_one(&mut **transaction)
        .await?;

        Ok(member)
    }

    /// Takes a row lock on the relationship for the rest of the transaction.
    pub async fn lock_relationship(
        &self,
        relationship_id: Uuid,
        transaction: &mut Transaction<'_, Postgres>,
    ) -> Result<Option<Relationship>> {
        let relationship = sqlx::query_as::<_, Relationship>(
            "SELECT id, kind, created_by, created_at FROM relationships WHERE id = $1 FOR UPDATE",
        )
        .bind(relationship_id)
        .fetch_optional(&mut **transaction)
        .await?;

        Ok(relationship)
    }

    pub async fn count_active_members_with_transaction(
        &self,
        relationship_id: Uuid,
        transaction: &mut Transaction<'_, Postgres>,
    ) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM relationship_members WHERE relationship_id = $1 AND is_active",
        )
        .bind(relationship_id)
        .fetch_one(&mut **transaction)
        .await?;

        Ok(count)
    }

    pub async fn count_active_members(&self, relationship_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM relationship_members WHERE relationship_id = $1 AND is_active",
        )
        .bind(relationship_id)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(count)
    }

    /// The relationship the user is currently an active member of, if any.
    pub async fn active_relationship_for(&self, user_id: Uuid) -> Result<Option<Relationship>> {
        let relationship = sqlx::query_as::<_, Relationship>(
            r#"
            SELECT r.id, r.kind, r.created_by, r.created_at
            FROM relationships r
            JOIN relationship_members m ON m.relationship_id = r.id
            WHERE m.user_id = $1 AND m.is_active
            "#,
        )
        .bind(user_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(relationship)
    }

    pub async fn active_members(&self, relationship_id: Uuid) -> Result<Vec<MemberProfile>> {
        let members = sqlx::query_as::<_, MemberProfile>(
            r#"
            SELECT m.user_id, u.email, u.display_name, m.role, m.joined_at
            FROM relationship_members m
            JOIN users u ON u.id = m.user_id
            WHERE m.relationship_id = $1 AND m.is_active
            ORDER BY m.joined_at
            "#,
        )
        .bind(relationship_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(members)
    }

    /// Deactivates the membership. Returns false when the user had none.
    pub async fn deactivate_membership(&self, user_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE relationship_members SET is_active = FALSE, left_at = $2 WHERE user_id = $1 AND is_active",
        )
        .bind(user_id)
        .bind(Utc::now())
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn create_invite(
        &self,
        relationship_id: Uuid,
        code: &str,
        created_by: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<Invite> {
        let invite = sqlx::query_as::<_, Invite>(
            r#"
            INSERT INTO invites (id, relationship_id, code, created_by, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(relationship_id)
        .bind(code)
        .bind(created_by)
        .bind(expires_at)
        .bind(Utc::now())
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(invite)
    }

    pub async fn get_invite_by_code_with_transaction(
        &self,
        code: &str,
        transaction: &mut Transaction<'_, Postgres>,
    ) -> Result<Option<Invite>> {
        let invite = sqlx::query_as::<_, Invite>("SELECT * FROM invites WHERE code = $1 FOR UPDATE")
            .bind(code)
            .fetch_optional(&mut **transaction)
            .await?;

        Ok(invite)
    }

    /// Claims an unclaimed invite. Returns false if someone else got there first.
    pub async fn mark_invite_claimed_with_transaction(
        &self,
        invite_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
        transaction: &mut Transaction<'_, Postgres>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE invites SET claimed_by = $2, claimed_at = $3 WHERE id = $1 AND claimed_by IS NULL",
        )
        .bind(invite_id)
        .bind(user_id)
        .bind(now)
        .execute(&mut **transaction)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn is_active_member_with_transaction(
        &self,
        user_id: Uuid,
        transaction: &mut Transaction<'_, Postgres>,
    ) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM relationship_members WHERE user_id = $1 AND is_active)",
        )
        .bind(user_id)
        .fetch_one(&mut **transaction)
        .await?;

        Ok(exists)
    }

    pub async fn get_streak(&self, relationship_id: Uuid) -> Result<Option<Streak>> {
        let streak = sqlx::query_as::<_, Streak>("SELECT * FROM streaks WHERE relationship_id = $1")
            .bind(relationship_id)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(streak)
    }

    /// Locks the streak row so concurrent reveals advance it one at a time.
    pub async fn lock_streak(
        &self,
        relationship_id: Uuid,
        transaction: &mut Transaction<'_, Postgres>,
    ) -> Result<Option<Streak>> {
        let streak = sqlx::query_as::<_, Streak>(
            "SELECT * FROM streaks WHERE relationship_id = $1 FOR UPDATE",
        )
        .bind(relationship_id)
        .fetch_optional(&mut **transaction)
        .await?;

        Ok(streak)
    }

    pub async fn save_streak_with_transaction(
        &self,
        streak: &Streak,
        transaction: &mut Transaction<'_, Postgres>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO streaks (relationship_id, current_streak, longest_streak, last_completed_date)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (relationship_id) DO UPDATE
            SET current_streak = EXCLUDED.current_streak,
                longest_streak = EXCLUDED.longest_streak,
                last_completed_date = EXCLUDED.last_completed_date
            "#,
        )
        .bind(streak.relationship_id)
        .bind(streak.current_streak)
        .bind(streak.longest_streak)
        .bind(streak.last_completed_date)
        .execute(&mut **transaction)
        .await?;

        Ok(())
    }
}
