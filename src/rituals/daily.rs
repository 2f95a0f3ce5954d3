use chrono::{DateTime, NaiveDate, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use sqlx::{Postgres, Transaction};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::Settings;
use crate::db::models::{
    DailySession, Prompt, PromptUsage, Reflection, Response, ResponseValidation, SessionState,
    SessionWithPrompt, Streak,
};
use crate::db::operations::DbOperations;
use crate::error::{AppError, DatabaseError, RitualError};
use crate::pairing::Pair;
use crate::rituals::{require_text, streak};
use crate::Result;

pub const MAX_RESPONSE_CHARS: usize = 2000;
pub const MAX_REFLECTION_CHARS: usize = 2000;
pub const VALIDATION_KINDS: &[&str] = &["heard", "appreciate", "curious"];
const MAX_HISTORY: i64 = 60;

/// Picks a prompt the relationship has never seen, at random. Once every
/// prompt has been used, the least recently used one comes back.
pub fn choose_prompt<'a, R: Rng + ?Sized>(usage: &'a [PromptUsage], rng: &mut R) -> Option<&'a Prompt> {
    let unused: Vec<&PromptUsage> = usage.iter().filter(|u| u.last_used.is_none()).collect();
    if let Some(fresh) = unused.choose(rng).copied() {
        return Some(&fresh.prompt);
    }
    usage
        .iter()
        .min_by_key(|u| u.last_used)
        .map(|u| &u.prompt)
}

/// The streak to store after completing `date`, or `None` when it is unchanged.
pub fn completion_update(
    relationship_id: Uuid,
    current: Option<Streak>,
    date: NaiveDate,
) -> Option<Streak> {
    let current = current.unwrap_or(Streak {
        relationship_id,
        current_streak: 0,
        longest_streak: 0,
        last_completed_date: None,
    });
    let next = streak::advance(&current, date);
    (next != current).then_some(next)
}

/// Today's prompt as seen by one partner.
#[derive(Debug, Clone, Serialize)]
pub struct TodayView {
    pub session_id: Uuid,
    pub date: NaiveDate,
    pub state: SessionState,
    pub prompt: Prompt,
    pub my_response: Option<Response>,
    pub partner_answered: bool,
    /// Present only once the session is revealed.
    pub partner_response: Option<Response>,
    pub validations: Vec<ResponseValidation>,
    pub reflections: Vec<Reflection>,
    pub resets_in_seconds: i64,
}

/// Assembles the view, withholding everything of the partner's but the fact
/// they answered until the session is revealed.
pub fn build_today_view(
    session: &DailySession,
    prompt: Prompt,
    responses: Vec<Response>,
    validations: Vec<ResponseValidation>,
    reflections: Vec<Reflection>,
    user_id: Uuid,
    partner_id: Uuid,
    resets_in_seconds: i64,
) -> TodayView {
    let revealed = session.state == SessionState::Revealed;
    let mut my_response = None;
    let mut partner_response = None;
    for response in responses {
        if response.user_id == user_id {
            my_response = Some(response);
        } else if response.user_id == partner_id {
            partner_response = Some(response);
        }
    }
    let partner_answered = partner_response.is_some();

    TodayView {
        session_id: session.id,
        date: session.session_date,
        state: session.state,
        prompt,
        my_response,
        partner_answered,
        partner_response: if revealed { partner_response } else { None },
        validations: if revealed { validations } else { Vec::new() },
        reflections: if revealed { reflections } else { Vec::new() },
        resets_in_seconds,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryItem {
    #[serde(flatten)]
    pub session: SessionWithPrompt,
    pub responses: Vec<Response>,
}

pub struct DailyService {
    db: DbOperations,
    settings: Arc<Settings>,
}

impl DailyService {
    pub fn new(db: DbOperations, settings: Arc<Settings>) -> Self {
        Self { db, settings }
    }

    /// The pair's session for `date`, created with a fresh prompt on first access.
    pub async fn session_for(&self, pair: &Pair, date: NaiveDate) -> Result<DailySession> {
        let relationship = &pair.relationship;
        if let Some(session) = self.db.find_daily_session(relationship.id, date).await? {
            return Ok(session);
        }

        let usage = self.db.prompt_usage(relationship.id, relationship.kind).await?;
        let prompt_id = choose_prompt(&usage, &mut rand::thread_rng())
            .map(|prompt| prompt.id)
            .ok_or_else(|| {
                error!("No prompts available for {} relationships", relationship.kind);
                AppError::InternalError("no prompts configured".into())
            })?;

        let session = self
            .db
            .get_or_create_daily_session(relationship.id, date, prompt_id)
            .await?;
        info!("Daily session {} ready for relationship {}", session.id, relationship.id);
        Ok(session)
    }

    pub async fn today(&self, pair: &Pair, now: DateTime<Utc>) -> Result<TodayView> {
        let today = self.settings.app.local_today(now);
        let session = self.session_for(pair, today).await?;
        self.view(pair, &session, now).await
    }

    async fn view(&self, pair: &Pair, session: &DailySession, now: DateTime<Utc>) -> Result<TodayView> {
        let prompt = self
            .db
            .get_prompt(session.prompt_id)
            .await?
            .ok_or_else(|| AppError::InternalError("session prompt missing".into()))?;
        let responses = self.db.responses_for_session(session.id).await?;

        let (validations, reflections) = if session.state == SessionState::Revealed {
            let ids: Vec<Uuid> = responses.iter().map(|r| r.id).collect();
            (
                self.db.validations_for_responses(&ids).await?,
                self.db.reflections_for_session(session.id).await?,
            )
        } else {
            (Vec::new(), Vec::new())
        };

        Ok(build_today_view(
            session,
            prompt,
            responses,
            validations,
            reflections,
            pair.user_id,
            pair.partner_id,
            self.settings.app.seconds_until_reset(now),
        ))
    }

    /// Saves the caller's answer. The second partner's answer reveals the session.
    pub async fn submit_response(&self, pair: &Pair, body: &str, now: DateTime<Utc>) -> Result<TodayView> {
        let body = require_text(body, MAX_RESPONSE_CHARS, "Answer")?;
        let today = self.settings.app.local_today(now);
        let session = self.session_for(pair, today).await?;

        let mut transaction = self.db.begin_transaction().await?;
        let locked = self.db.lock_daily_session(session.id, &mut transaction).await?;
        if locked.state == SessionState::Revealed {
            return Err(RitualError::AlreadyRevealed.into());
        }

        self.db
            .upsert_response_with_transaction(locked.id, pair.user_id, &body, &mut transaction)
            .await?;
        let answered = self
            .db
            .count_member_responses_with_transaction(locked.id, pair.relationship.id, &mut transaction)
            .await?;

        let session = if answered >= 2 {
            let revealed = self
                .db
                .mark_session_revealed_with_transaction(locked.id, &mut transaction)
                .await?;
            self.record_completion(pair, revealed.session_date, &mut transaction)
                .await?;
            revealed
        } else {
            locked
        };
        transaction.commit().await?;

        info!("User {} answered daily session {}", pair.user_id, session.id);
        if session.state == SessionState::Revealed {
            info!("Daily session {} revealed", session.id);
        }

        self.view(pair, &session, now).await
    }

    /// Advances the streak in the same transaction as the reveal, so a day is
    /// never revealed without being counted.
    async fn record_completion(
        &self,
        pair: &Pair,
        date: NaiveDate,
        transaction: &mut Transaction<'_, Postgres>,
    ) -> Result<()> {
        let current = self.db.lock_streak(pair.relationship.id, transaction).await?;
        if let Some(next) = completion_update(pair.relationship.id, current, date) {
            self.db.save_streak_with_transaction(&next, transaction).await?;
        }
        Ok(())
    }

    /// Partner acknowledgement of a revealed answer.
    pub async fn validate_response(
        &self,
        pair: &Pair,
        response_id: Uuid,
        kind: &str,
    ) -> Result<ResponseValidation> {
        if !VALIDATION_KINDS.contains(&kind) {
            return Err(AppError::ValidationError(format!(
                "Unknown validation \"{kind}\"; expected one of {}",
                VALIDATION_KINDS.join(", ")
            )));
        }

        let response = self
            .db
            .get_response(response_id)
            .await?
            .ok_or(DatabaseError::NotFound)?;
        let session = self.owned_session(pair, response.session_id).await?;
        if session.state != SessionState::Revealed {
            return Err(RitualError::NotRevealed.into());
        }
        if response.user_id != pair.partner_id {
            return Err(AppError::ValidationError(
                "You can only respond to your partner's answer".into(),
            ));
        }

        let validation = self.db.upsert_validation(response.id, pair.user_id, kind).await?;
        info!("User {} validated response {}", pair.user_id, response.id);
        Ok(validation)
    }

    pub async fn reflect(&self, pair: &Pair, session_id: Uuid, body: &str) -> Result<Reflection> {
        let body = require_text(body, MAX_REFLECTION_CHARS, "Reflection")?;
        let session = self.owned_session(pair, session_id).await?;
        if session.state != SessionState::Revealed {
            return Err(RitualError::NotRevealed.into());
        }

        let reflection = self.db.upsert_reflection(session.id, pair.user_id, &body).await?;
        info!("User {} reflected on session {}", pair.user_id, session.id);
        Ok(reflection)
    }

    pub async fn history(&self, pair: &Pair, limit: i64) -> Result<Vec<HistoryItem>> {
        let sessions = self
            .db
            .revealed_sessions(pair.relationship.id, limit.clamp(1, MAX_HISTORY))
            .await?;
        let ids: Vec<Uuid> = sessions.iter().map(|s| s.session.id).collect();

        let mut by_session: HashMap<Uuid, Vec<Response>> = HashMap::new();
        for response in self.db.responses_for_sessions(&ids).await? {
            by_session.entry(response.session_id).or_default().push(response);
        }

        Ok(sessions
            .into_iter()
            .map(|session| {
                let responses = by_session.remove(&session.session.id).unwrap_or_default();
                HistoryItem { session, responses }
            })
            .collect())
    }

    async fn owned_session(&self, pair: &Pair, session_id: Uuid) -> Result<DailySession> {
        let session = self
            .db
            .get_daily_session(session_id)
            .await?
            .ok_or(DatabaseError::NotFound)?;
        if session.relationship_id != pair.relationship.id {
            return Err(RitualError::NotMember.into());
        }
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn prompt(n: u128) -> Prompt {
        Prompt {
            id: Uuid::from_u128(n),
            text: format!("prompt {n}"),
            category: "connection".into(),
            audience: "all".into(),
        }
    }

    fn usage(n: u128, last_used: Option<u32>) -> PromptUsage {
        PromptUsage {
            prompt: prompt(n),
            last_used: last_used.map(|d| NaiveDate::from_ymd_opt(2026, 1, d).unwrap()),
        }
    }

    fn session(state: SessionState) -> DailySession {
        DailySession {
            id: Uuid::new_v4(),
            relationship_id: Uuid::new_v4(),
            session_date: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
            prompt_id: Uuid::from_u128(1),
            state,
            revealed_at: None,
            created_at: Utc::now(),
        }
    }

    fn response(user_id: Uuid, body: &str) -> Response {
        Response {
            id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            user_id,
            body: body.into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn unused_prompts_are_preferred() {
        let pool = vec![usage(1, Some(1)), usage(2, None), usage(3, Some(2)), usage(4, None)];
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let chosen = choose_prompt(&pool, &mut rng).unwrap();
            assert!(chosen.id == Uuid::from_u128(2) || chosen.id == Uuid::from_u128(4));
        }
    }

    #[test]
    fn least_recently_used_when_exhausted() {
        let pool = vec![usage(1, Some(9)), usage(2, Some(3)), usage(3, Some(5))];
        let chosen = choose_prompt(&pool, &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(chosen.id, Uuid::from_u128(2));
    }

    #[test]
    fn no_prompts_no_choice() {
        assert!(choose_prompt(&[], &mut StdRng::seed_from_u64(1)).is_none());
    }

    #[test]
    fn partner_answer_hidden_until_revealed() {
        let me = Uuid::new_v4();
        let partner = Uuid::new_v4();
        let responses = vec![response(me, "mine"), response(partner, "theirs")];

        let view = build_today_view(
            &session(SessionState::Open),
            prompt(1),
            responses.clone(),
            Vec::new(),
            Vec::new(),
            me,
            partner,
            100,
        );
        assert_eq!(view.my_response.as_ref().unwrap().body, "mine");
        assert!(view.partner_answered);
        assert!(view.partner_response.is_none());

        let view = build_today_view(
            &session(SessionState::Revealed),
            prompt(1),
            responses,
            Vec::new(),
            Vec::new(),
            me,
            partner,
            100,
        );
        assert_eq!(view.partner_response.unwrap().body, "theirs");
    }

    #[test]
    fn partner_not_answered_yet() {
        let me = Uuid::new_v4();
        let view = build_today_view(
            &session(SessionState::Open),
            prompt(1),
            vec![response(me, "mine")],
            Vec::new(),
            Vec::new(),
            me,
            Uuid::new_v4(),
            5,
        );
        assert!(!view.partner_answered);
        assert_eq!(view.resets_in_seconds, 5);
    }

    #[test]
    fn first_completion_creates_the_streak() {
        let rel = Uuid::new_v4();
        let day = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        let next = completion_update(rel, None, day).unwrap();
        assert_eq!(next.relationship_id, rel);
        assert_eq!(next.current_streak, 1);
        assert_eq!(next.last_completed_date, Some(day));
    }

    #[test]
    fn repeated_completion_needs_no_write() {
        let rel = Uuid::new_v4();
        let day = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        let done = completion_update(rel, None, day);
        assert!(completion_update(rel, done, day).is_none());
    }

    #[test]
    fn open_session_hides_reflections() {
        let me = Uuid::new_v4();
        let reflection = Reflection {
            id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            user_id: me,
            body: "r".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let view = build_today_view(
            &session(SessionState::Open),
            prompt(1),
            Vec::new(),
            Vec::new(),
            vec![reflection],
            me,
            Uuid::new_v4(),
            0,
        );
        assert!(view.reflections.is_empty());
    }
}
