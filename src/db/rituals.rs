use chrono::{NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::db::models::{
    DailySession, GameKind, GameSession, Meeting, MeetingEntry, Participation, Prompt,
    PromptUsage, Reflection, RelationshipKind, Response, ResponseValidation, SessionState,
    SessionWithPrompt,
};
use crate::db::operations::DbOperations;
use crate::Result;

const SESSION_COLUMNS: &str =
    "id, relationship_id, session_date, prompt_id, state, revealed_at, created_at";

impl DbOperations {
    // Prompts

    /// Every prompt available to `kind`, with when this relationship last saw it.
    pub async fn prompt_usage(
        &self,
        relationship_id: Uuid,
        kind: RelationshipKind,
    ) -> Result<Vec<PromptUsage>> {
        let usage = sqlx::query_as::<_, PromptUsage>(
            r#"
            SELECT p.id, p.text, p.category, p.audience, u.last_used
            FROM prompts p
            LEFT JOIN (
                SELECT prompt_id, MAX(session_date) AS last_used
                FROM daily_sessions
                WHERE relationship_id = $1
                GROUP BY prompt_id
            ) u ON u.prompt_id = p.id
            WHERE p.audience IN ($2, 'all')
            ORDER BY p.id
            "#,
        )
        .bind(relationship_id)
        .bind(kind.as_str())
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(usage)
    }

    pub async fn get_prompt(&self, prompt_id: Uuid) -> Result<Option<Prompt>> {
        let prompt = sqlx::query_as::<_, Prompt>(
            "SELECT id, text, category, audience FROM prompts WHERE id = $1",
        )
        .bind(prompt_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(prompt)
    }

    // Daily sessions

    /// Inserts the day's session unless one exists, then returns whichever row won.
    pub async fn get_or_create_daily_session(
        &self,
        relationship_id: Uuid,
        date: NaiveDate,
        prompt_id: Uuid,
    ) -> Result<DailySession> {
        sqlx::query(
            r#"
            INSERT INTO daily_sessions (id, relationship_id, session_date, prompt_id, state, created_at)
            VALUES ($1, $2, $3, $4, 'open', $5)
            ON CONFLICT (relationship_id, session_date) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(relationship_id)
        .bind(date)
        .bind(prompt_id)
        .bind(Utc::now())
        .execute(self.pool.as_ref())
        .await?;

        let session = sqlx::query_as::<_, DailySession>(&format!(
            "SELECT {SESSION_COLUMNS} FROM daily_sessions WHERE relationship_id = $1 AND session_date = $2"
        ))
        .bind(relationship_id)
        .bind(date)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(session)
    }

    pub async fn find_daily_session(
        &self,
        relationship_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<DailySession>> {
        let session = sqlx::query_as::<_, DailySession>(&format!(
            "SELECT {SESSION_COLUMNS} FROM daily_sessions WHERE relationship_id = $1 AND session_date = $2"
        ))
        .bind(relationship_id)
        .bind(date)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(session)
    }

    pub async fn get_daily_session(&self, session_id: Uuid) -> Result<Option<DailySession>> {
        let session = sqlx::query_as::<_, DailySession>(&format!(
            "SELECT {SESSION_COLUMNS} FROM daily_sessions WHERE id = $1"
        ))
        .bind(session_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(session)
    }

    pub async fn lock_daily_session(
        &self,
        session_id: Uuid,
        transaction: &mut Transaction<'_, Postgres>,
    ) -> Result<DailySession> {
        let session = sqlx::query_as::<_, DailySession>(&format!(
            "SELECT {SESSION_COLUMNS} FROM daily_sessions WHERE id = $1 FOR UPDATE"
        ))
        .bind(session_id)
        .fetch_one(&mut **transaction)
        .await?;

        Ok(session)
    }

    pub async fn mark_session_revealed_with_transaction(
        &self,
        session_id: Uuid,
        transaction: &mut Transaction<'_, Postgres>,
    ) -> Result<DailySession> {
        let session = sqlx::query_as::<_, DailySession>(&format!(
            r#"
            UPDATE daily_sessions SET state = $2, revealed_at = $3
            WHERE id = $1
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(session_id)
        .bind(SessionState::Revealed.as_str())
        .bind(Utc::now())
        .fetch_one(&mut **transaction)
        .await?;

        Ok(session)
    }

    /// Revealed sessions, newest first, joined with their prompt.
    pub async fn revealed_sessions(
        &self,
        relationship_id: Uuid,
        limit: i64,
    ) -> Result<Vec<SessionWithPrompt>> {
        let sessions = sqlx::query_as::<_, SessionWithPrompt>(
            r#"
            SELECT s.id, s.relationship_id, s.session_date, s.prompt_id, s.state, s.revealed_at,
                   s.created_at, p.text AS prompt_text, p.category AS prompt_category
            FROM daily_sessions s
            JOIN prompts p ON p.id = s.prompt_id
            WHERE s.relationship_id = $1 AND s.state = 'revealed'
            ORDER BY s.session_date DESC
            LIMIT $2
            "#,
        )
        .bind(relationship_id)
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(sessions)
    }

    // Responses

    pub async fn upsert_response_with_transaction(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        body: &str,
        transaction: &mut Transaction<'_, Postgres>,
    ) -> Result<Response> {
        let now = Utc::now();
        let response = sqlx::query_as::<_, Response>(
            r#"
            INSERT INTO responses (id, session_id, user_id, body, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            ON CONFLICT (session_id, user_id) DO UPDATE
            SET body = EXCLUDED.body, updated_at = EXCLUDED.updated_at
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(session_id)
        .bind(user_id)
        .bind(body)
        .bind(now)
        .fetch_one(&mut **transaction)
        .await?;

        Ok(response)
    }

    /// Number of distinct active members of the relationship that have answered.
    pub async fn count_member_responses_with_transaction(
        &self,
        session_id: Uuid,
        relationship_id: Uuid,
        transaction: &mut Transaction<'_, Postgres>,
    ) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM responses r
            JOIN relationship_members m
              ON m.user_id = r.user_id AND m.relationship_id = $2 AND m.is_active
            WHERE r.session_id = $1
            "#,
        )
        .bind(session_id)
        .bind(relationship_id)
        .fetch_one(&mut **transaction)
        .await?;

        Ok(count)
    }

    pub async fn responses_for_session(&self, session_id: Uuid) -> Result<Vec<Response>> {
        let responses = sqlx::query_as::<_, Response>(
            "SELECT * FROM responses WHERE session_id = $1 ORDER BY created_at",
        )
        .bind(session_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(responses)
    }

    pub async fn responses_for_sessions(&self, session_ids: &[Uuid]) -> Result<Vec<Response>> {
        let responses = sqlx::query_as::<_, Response>(
            "SELECT * FROM responses WHERE session_id = ANY($1) ORDER BY created_at",
        )
        .bind(session_ids)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(responses)
    }

    pub async fn get_response(&self, response_id: Uuid) -> Result<Option<Response>> {
        let response = sqlx::query_as::<_, Response>("SELECT * FROM responses WHERE id = $1")
            .bind(response_id)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(response)
    }

    pub async fn upsert_validation(
        &self,
        response_id: Uuid,
        validator_id: Uuid,
        kind: &str,
    ) -> Result<ResponseValidation> {
        let validation = sqlx::query_as::<_, ResponseValidation>(
            r#"
            INSERT INTO response_validations (id, response_id, validator_id, kind, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (response_id, validator_id) DO UPDATE SET kind = EXCLUDED.kind
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(response_id)
        .bind(validator_id)
        .bind(kind)
        .bind(Utc::now())
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(validation)
    }

    pub async fn validations_for_responses(
        &self,
        response_ids: &[Uuid],
    ) -> Result<Vec<ResponseValidation>> {
        let validations = sqlx::query_as::<_, ResponseValidation>(
            "SELECT * FROM response_validations WHERE response_id = ANY($1)",
        )
        .bind(response_ids)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(validations)
    }

    pub async fn upsert_reflection(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        body: &str,
    ) -> Result<Reflection> {
        let now = Utc::now();
        let reflection = sqlx::query_as::<_, Reflection>(
            r#"
            INSERT INTO reflections (id, session_id, user_id, body, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            ON CONFLICT (session_id, user_id) DO UPDATE
            SET body = EXCLUDED.body, updated_at = EXCLUDED.updated_at
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(session_id)
        .bind(user_id)
        .bind(body)
        .bind(now)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(reflection)
    }

    pub async fn reflections_for_session(&self, session_id: Uuid) -> Result<Vec<Reflection>> {
        let reflections = sqlx::query_as::<_, Reflection>(
            "SELECT * FROM reflections WHERE session_id = $1 ORDER BY created_at",
        )
        .bind(session_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(reflections)
    }

    // Quiz and agreement

    pub async fn get_or_create_game_session(
        &self,
        kind: GameKind,
        relationship_id: Uuid,
        date: NaiveDate,
    ) -> Result<GameSession> {
        let table = kind.session_table();
        sqlx::query(&format!(
            r#"
            INSERT INTO {table} (id, relationship_id, session_date, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (relationship_id, session_date) DO NOTHING
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(relationship_id)
        .bind(date)
        .bind(Utc::now())
        .execute(self.pool.as_ref())
        .await?;

        let session = sqlx::query_as::<_, GameSession>(&format!(
            "SELECT id, relationship_id, session_date, created_at FROM {table} WHERE relationship_id = $1 AND session_date = $2"
        ))
        .bind(relationship_id)
        .bind(date)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(session)
    }

    /// Locks the day's game row; submissions serialise on it.
    pub async fn lock_game_session(
        &self,
        kind: GameKind,
        session_id: Uuid,
        transaction: &mut Transaction<'_, Postgres>,
    ) -> Result<GameSession> {
        let session = sqlx::query_as::<_, GameSession>(&format!(
            "SELECT id, relationship_id, session_date, created_at FROM {} WHERE id = $1 FOR UPDATE",
            kind.session_table()
        ))
        .bind(session_id)
        .fetch_one(&mut **transaction)
        .await?;

        Ok(session)
    }

    pub async fn participations_with_transaction(
        &self,
        kind: GameKind,
        session_id: Uuid,
        transaction: &mut Transaction<'_, Postgres>,
    ) -> Result<Vec<Participation>> {
        let participations = sqlx::query_as::<_, Participation>(&format!(
            "SELECT * FROM {} WHERE session_id = $1",
            kind.participation_table()
        ))
        .bind(session_id)
        .fetch_all(&mut **transaction)
        .await?;

        Ok(participations)
    }

    pub async fn upsert_participation_with_transaction(
        &self,
        kind: GameKind,
        session_id: Uuid,
        user_id: Uuid,
        answers: &[u8],
        guesses: &[u8],
        transaction: &mut Transaction<'_, Postgres>,
    ) -> Result<Participation> {
        let participation = sqlx::query_as::<_, Participation>(&format!(
            r#"
            INSERT INTO {} (id, session_id, user_id, answers, guesses, submitted_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (session_id, user_id) DO UPDATE
            SET answers = EXCLUDED.answers,
                guesses = EXCLUDED.guesses,
                submitted_at = EXCLUDED.submitted_at
            RETURNING *
            "#,
            kind.participation_table()
        ))
        .bind(Uuid::new_v4())
        .bind(session_id)
        .bind(user_id)
        .bind(Json(answers))
        .bind(Json(guesses))
        .bind(Utc::now())
        .fetch_one(&mut **transaction)
        .await?;

        Ok(participation)
    }

    pub async fn participations(
        &self,
        kind: GameKind,
        session_id: Uuid,
    ) -> Result<Vec<Participation>> {
        let participations = sqlx::query_as::<_, Participation>(&format!(
            "SELECT * FROM {} WHERE session_id = $1",
            kind.participation_table()
        ))
        .bind(session_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(participations)
    }

    // Meetings

    pub async fn get_or_create_meeting(
        &self,
        relationship_id: Uuid,
        week_key: &str,
    ) -> Result<Meeting> {
        sqlx::query(
            r#"
            INSERT INTO meetings (id, relationship_id, week_key, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (relationship_id, week_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(relationship_id)
        .bind(week_key)
        .bind(Utc::now())
        .execute(self.pool.as_ref())
        .await?;

        let meeting = sqlx::query_as::<_, Meeting>(
            "SELECT * FROM meetings WHERE relationship_id = $1 AND week_key = $2",
        )
        .bind(relationship_id)
        .bind(week_key)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(meeting)
    }

    pub async fn find_meeting(
        &self,
        relationship_id: Uuid,
        week_key: &str,
    ) -> Result<Option<Meeting>> {
        let meeting = sqlx::query_as::<_, Meeting>(
            "SELECT * FROM meetings WHERE relationship_id = $1 AND week_key = $2",
        )
        .bind(relationship_id)
        .bind(week_key)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(meeting)
    }

    pub async fn upsert_meeting_entry(
        &self,
        meeting_id: Uuid,
        user_id: Uuid,
        wins: &str,
        challenges: &str,
        intentions: &str,
    ) -> Result<MeetingEntry> {
        let entry = sqlx::query_as::<_, MeetingEntry>(
            r#"
            INSERT INTO meeting_entries (id, meeting_id, user_id, wins, challenges, intentions, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (meeting_id, user_id) DO UPDATE
            SET wins = EXCLUDED.wins,
                challenges = EXCLUDED.challenges,
                intentions = EXCLUDED.intentions,
                updated_at = EXCLUDED.updated_at
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(meeting_id)
        .bind(user_id)
        .bind(wins)
        .bind(challenges)
        .bind(intentions)
        .bind(Utc::now())
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(entry)
    }

    pub async fn meeting_entries(&self, meeting_id: Uuid) -> Result<Vec<MeetingEntry>> {
        let entries = sqlx::query_as::<_, MeetingEntry>(
            "SELECT * FROM meeting_entries WHERE meeting_id = $1",
        )
        .bind(meeting_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(entries)
    }
}
