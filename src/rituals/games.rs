use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::config::Settings;
use crate::db::models::{GameKind, Participation};
use crate::db::operations::DbOperations;
use crate::error::{AppError, RitualError};
use crate::pairing::Pair;
use crate::rituals::{agreement, quiz};
use crate::Result;

pub const ITEMS_PER_DAY: usize = 5;

/// Days since 1970-01-01; negative for earlier dates.
pub fn day_index(date: NaiveDate) -> i64 {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or(NaiveDate::MIN);
    (date - epoch).num_days()
}

/// Positions in a bank of `bank_len` items used on `date`: `ITEMS_PER_DAY`
/// consecutive items starting at `day_index * ITEMS_PER_DAY`, wrapping.
pub fn daily_slice(date: NaiveDate, bank_len: usize) -> Vec<usize> {
    if bank_len == 0 {
        return Vec::new();
    }
    let len = bank_len as i64;
    let start = (day_index(date) * ITEMS_PER_DAY as i64).rem_euclid(len);
    (0..ITEMS_PER_DAY as i64)
        .map(|offset| ((start + offset) % len) as usize)
        .collect()
}

/// One question or statement as shown to the client.
#[derive(Debug, Clone, Serialize)]
pub struct GameItem {
    pub index: usize,
    pub text: &'static str,
    pub options: Vec<&'static str>,
}

pub fn items_for(kind: GameKind, date: NaiveDate) -> Vec<GameItem> {
    match kind {
        GameKind::Quiz => daily_slice(date, quiz::QUESTIONS.len())
            .into_iter()
            .map(|index| GameItem {
                index,
                text: quiz::QUESTIONS[index].text,
                options: quiz::QUESTIONS[index].options.to_vec(),
            })
            .collect(),
        GameKind::Agreement => daily_slice(date, agreement::STATEMENTS.len())
            .into_iter()
            .map(|index| GameItem {
                index,
                text: agreement::STATEMENTS[index],
                options: agreement::SCALE_LABELS.to_vec(),
            })
            .collect(),
    }
}

/// Checks one array of choices against the day's items.
pub fn validate_choices(kind: GameKind, items: &[GameItem], choices: &[u8], field: &str) -> Result<()> {
    if choices.len() != items.len() {
        return Err(AppError::ValidationError(format!(
            "{field} must contain exactly {} choices",
            items.len()
        )));
    }

    for (position, (item, &choice)) in items.iter().zip(choices).enumerate() {
        let valid = match kind {
            GameKind::Quiz => (choice as usize) < item.options.len(),
            GameKind::Agreement => agreement::SCALE.contains(&choice),
        };
        if !valid {
            return Err(AppError::ValidationError(format!(
                "{field}[{position}] is not a valid choice"
            )));
        }
    }
    Ok(())
}

/// Number of positions where `guesses` matches `answers`.
pub fn guess_score(guesses: &[u8], answers: &[u8]) -> usize {
    guesses.iter().zip(answers).filter(|(g, a)| g == a).count()
}

/// Number of items both partners answered identically.
pub fn aligned_count(mine: &[u8], theirs: &[u8]) -> usize {
    guess_score(mine, theirs)
}

/// Whether both members of the pair have a participation; answers lock then.
pub fn both_submitted(participations: &[Participation], pair: &Pair) -> bool {
    [pair.user_id, pair.partner_id]
        .iter()
        .all(|id| participations.iter().any(|p| p.user_id == *id))
}

#[derive(Debug, Clone, Serialize)]
pub struct GameResult {
    pub my_answers: Vec<u8>,
    pub my_guesses: Vec<u8>,
    pub partner_answers: Vec<u8>,
    pub partner_guesses: Vec<u8>,
    /// How many of the partner's answers I guessed.
    pub my_score: usize,
    pub partner_score: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aligned_count: Option<usize>,
}

pub fn score(kind: GameKind, mine: &Participation, theirs: &Participation) -> GameResult {
    GameResult {
        my_answers: mine.answers.0.clone(),
        my_guesses: mine.guesses.0.clone(),
        partner_answers: theirs.answers.0.clone(),
        partner_guesses: theirs.guesses.0.clone(),
        my_score: guess_score(&mine.guesses, &theirs.answers),
        partner_score: guess_score(&theirs.guesses, &mine.answers),
        aligned_count: match kind {
            GameKind::Agreement => Some(aligned_count(&mine.answers, &theirs.answers)),
            GameKind::Quiz => None,
        },
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GameView {
    pub kind: GameKind,
    pub session_id: Uuid,
    pub date: NaiveDate,
    pub items: Vec<GameItem>,
    pub submitted: bool,
    pub partner_submitted: bool,
    pub result: Option<GameResult>,
    pub resets_in_seconds: i64,
}

pub struct GameService {
    db: DbOperations,
    settings: Arc<Settings>,
}

impl GameService {
    pub fn new(db: DbOperations, settings: Arc<Settings>) -> Self {
        Self { db, settings }
    }

    pub async fn today(&self, pair: &Pair, kind: GameKind, now: DateTime<Utc>) -> Result<GameView> {
        let date = self.settings.app.local_today(now);
        let session = self
            .db
            .get_or_create_game_session(kind, pair.relationship.id, date)
            .await?;
        let participations = self.db.participations(kind, session.id).await?;
        Ok(self.view(pair, kind, session.id, date, participations, now))
    }

    /// Records the caller's answers and guesses. Both can be changed until
    /// the partner has also submitted.
    pub async fn submit(
        &self,
        pair: &Pair,
        kind: GameKind,
        answers: &[u8],
        guesses: &[u8],
        now: DateTime<Utc>,
    ) -> Result<GameView> {
        let date = self.settings.app.local_today(now);
        let items = items_for(kind, date);
        validate_choices(kind, &items, answers, "answers")?;
        validate_choices(kind, &items, guesses, "guesses")?;

        let session = self
            .db
            .get_or_create_game_session(kind, pair.relationship.id, date)
            .await?;
        let mut transaction = self.db.begin_transaction().await?;
        self.db
            .lock_game_session(kind, session.id, &mut transaction)
            .await?;
        let existing = self
            .db
            .participations_with_transaction(kind, session.id, &mut transaction)
            .await?;
        if both_submitted(&existing, pair) {
            return Err(RitualError::AlreadyRevealed.into());
        }

        self.db
            .upsert_participation_with_transaction(
                kind,
                session.id,
                pair.user_id,
                answers,
                guesses,
                &mut transaction,
            )
            .await?;
        let participations = self
            .db
            .participations_with_transaction(kind, session.id, &mut transaction)
            .await?;
        transaction.commit().await?;
        info!("User {} submitted {:?} for {}", pair.user_id, kind, date);

        Ok(self.view(pair, kind, session.id, date, participations, now))
    }

    fn view(
        &self,
        pair: &Pair,
        kind: GameKind,
        session_id: Uuid,
        date: NaiveDate,
        participations: Vec<Participation>,
        now: DateTime<Utc>,
    ) -> GameView {
        let mine = participations.iter().find(|p| p.user_id == pair.user_id);
        let theirs = participations.iter().find(|p| p.user_id == pair.partner_id);

        GameView {
            kind,
            session_id,
            date,
            items: items_for(kind, date),
            submitted: mine.is_some(),
            partner_submitted: theirs.is_some(),
            result: match (mine, theirs) {
                (Some(mine), Some(theirs)) => Some(score(kind, mine, theirs)),
                _ => None,
            },
            resets_in_seconds: self.settings.app.seconds_until_reset(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::types::Json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn participation(answers: Vec<u8>, guesses: Vec<u8>) -> Participation {
        Participation {
            id: Uuid::new_v4(),
            session_id: Uuid::nil(),
            user_id: Uuid::new_v4(),
            answers: Json(answers),
            guesses: Json(guesses),
            submitted_at: Utc::now(),
        }
    }

    #[test]
    fn day_index_counts_from_epoch() {
        assert_eq!(day_index(date(1970, 1, 1)), 0);
        assert_eq!(day_index(date(1970, 1, 2)), 1);
        assert_eq!(day_index(date(1969, 12, 31)), -1);
    }

    #[test]
    fn slice_advances_and_wraps() {
        assert_eq!(daily_slice(date(1970, 1, 1), 15), vec![0, 1, 2, 3, 4]);
        assert_eq!(daily_slice(date(1970, 1, 2), 15), vec![5, 6, 7, 8, 9]);
        assert_eq!(daily_slice(date(1970, 1, 4), 15), vec![0, 1, 2, 3, 4]);
        assert_eq!(daily_slice(date(1970, 1, 2), 7), vec![5, 6, 0, 1, 2]);
        assert!(daily_slice(date(2026, 1, 1), 0).is_empty());
    }

    #[test]
    fn slice_before_epoch_stays_in_range() {
        let slice = daily_slice(date(1969, 12, 31), 15);
        assert_eq!(slice, vec![10, 11, 12, 13, 14]);
    }

    #[test]
    fn items_come_from_the_right_bank() {
        let day = date(2026, 3, 14);
        let quiz_items = items_for(GameKind::Quiz, day);
        assert_eq!(quiz_items.len(), ITEMS_PER_DAY);
        assert_eq!(quiz_items[0].text, quiz::QUESTIONS[quiz_items[0].index].text);

        let agreement_items = items_for(GameKind::Agreement, day);
        assert!(agreement_items.iter().all(|i| i.options.len() == 5));
    }

    #[test]
    fn quiz_choices_must_index_options() {
        let items = items_for(GameKind::Quiz, date(2026, 3, 14));
        assert!(validate_choices(GameKind::Quiz, &items, &[0, 0, 0, 0, 0], "answers").is_ok());
        assert!(validate_choices(GameKind::Quiz, &items, &[0, 0, 0, 0], "answers").is_err());
        assert!(validate_choices(GameKind::Quiz, &items, &[0, 0, 0, 0, 40], "answers").is_err());
    }

    #[test]
    fn agreement_choices_use_one_to_five() {
        let items = items_for(GameKind::Agreement, date(2026, 3, 14));
        assert!(validate_choices(GameKind::Agreement, &items, &[1, 2, 3, 4, 5], "answers").is_ok());
        let err = validate_choices(GameKind::Agreement, &items, &[1, 2, 0, 4, 5], "guesses").unwrap_err();
        assert_eq!(err.to_string(), "Validation error: guesses[2] is not a valid choice");
        assert!(validate_choices(GameKind::Agreement, &items, &[1, 2, 3, 4, 6], "answers").is_err());
    }

    #[test]
    fn scores_compare_guesses_with_partner_answers() {
        let me = participation(vec![1, 2, 3, 4, 5], vec![5, 4, 3, 2, 1]);
        let partner = participation(vec![5, 4, 1, 1, 1], vec![1, 2, 3, 4, 4]);

        let result = score(GameKind::Quiz, &me, &partner);
        assert_eq!(result.my_score, 3);
        assert_eq!(result.partner_score, 4);
        assert_eq!(result.aligned_count, None);

        let result = score(GameKind::Agreement, &me, &partner);
        assert_eq!(result.aligned_count, Some(0));
    }

    #[test]
    fn answers_lock_once_both_partners_submitted() {
        use crate::db::models::{Relationship, RelationshipKind};

        let mine = participation(vec![0; 5], vec![0; 5]);
        let theirs = participation(vec![1; 5], vec![1; 5]);
        let pair = Pair {
            relationship: Relationship {
                id: Uuid::new_v4(),
                kind: RelationshipKind::Couple,
                created_by: mine.user_id,
                created_at: Utc::now(),
            },
            user_id: mine.user_id,
            partner_id: theirs.user_id,
        };

        assert!(!both_submitted(&[], &pair));
        assert!(!both_submitted(std::slice::from_ref(&mine), &pair));
        assert!(both_submitted(&[theirs, mine], &pair));
    }

    #[test]
    fn identical_answers_are_aligned() {
        assert_eq!(aligned_count(&[3, 3, 1, 5, 2], &[3, 4, 1, 5, 1]), 3);
        assert_eq!(guess_score(&[], &[1, 2]), 0);
    }
}
