use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl User {
    pub fn new(email: String, display_name: Option<String>, password_hash: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email,
            display_name,
            password_hash,
            created_at: now,
            updated_at: now,
            last_login: None,
            is_active: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl UserSession {
    pub fn new(user_id: Uuid, token: String, expires_in_hours: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            token,
            expires_at: now + chrono::Duration::hours(expires_in_hours),
            created_at: now,
            last_activity: now,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// Single-use sign-in link. Only the SHA-256 of the emailed token is stored.
#[derive(Debug, Clone, FromRow)]
pub struct MagicLinkToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Which branded app a relationship belongs to. Drives the prompt pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    Couple,
    Friends,
    ParentTeen,
}

impl RelationshipKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipKind::Couple => "couple",
            RelationshipKind::Friends => "friends",
            RelationshipKind::ParentTeen => "parent_teen",
        }
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationshipKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "couple" => Ok(RelationshipKind::Couple),
            "friends" => Ok(RelationshipKind::Friends),
            "parent_teen" => Ok(RelationshipKind::ParentTeen),
            other => Err(format!("unknown relationship kind: {other}")),
        }
    }
}

impl TryFrom<String> for RelationshipKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Relationship {
    pub id: Uuid,
    #[sqlx(try_from = "String")]
    pub kind: RelationshipKind,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RelationshipMember {
    pub id: Uuid,
    pub relationship_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub is_active: bool,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
}

/// Member row joined with the user's public profile.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MemberProfile {
    pub user_id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub role: String,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Invite {
    pub id: Uuid,
    pub relationship_id: Uuid,
    pub code: String,
    pub created_by: Uuid,
    pub expires_at: DateTime<Utc>,
    pub claimed_by: Option<Uuid>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Invite {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Prompt {
    pub id: Uuid,
    pub text: String,
    pub category: String,
    pub audience: String,
}

/// A candidate prompt and the last date the relationship saw it.
#[derive(Debug, Clone, FromRow)]
pub struct PromptUsage {
    #[sqlx(flatten)]
    pub prompt: Prompt,
    pub last_used: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Open,
    Revealed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Open => "open",
            SessionState::Revealed => "revealed",
        }
    }
}

impl TryFrom<String> for SessionState {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "open" => Ok(SessionState::Open),
            "revealed" => Ok(SessionState::Revealed),
            other => Err(format!("unknown session state: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DailySession {
    pub id: Uuid,
    pub relationship_id: Uuid,
    pub session_date: NaiveDate,
    pub prompt_id: Uuid,
    #[sqlx(try_from = "String")]
    pub state: SessionState,
    pub revealed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SessionWithPrompt {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub session: DailySession,
    pub prompt_text: String,
    pub prompt_category: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Response {
    pub id: Uuid,
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ResponseValidation {
    pub id: Uuid,
    pub response_id: Uuid,
    pub validator_id: Uuid,
    pub kind: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Reflection {
    pub id: Uuid,
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Meeting {
    pub id: Uuid,
    pub relationship_id: Uuid,
    pub week_key: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MeetingEntry {
    pub id: Uuid,
    pub meeting_id: Uuid,
    pub user_id: Uuid,
    pub wins: String,
    pub challenges: String,
    pub intentions: String,
    pub updated_at: DateTime<Utc>,
}

/// The two daily guessing games. Each has its own session and participation tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameKind {
    Quiz,
    Agreement,
}

impl GameKind {
    pub fn session_table(&self) -> &'static str {
        match self {
            GameKind::Quiz => "quiz_sessions",
            GameKind::Agreement => "agreement_sessions",
        }
    }

    pub fn participation_table(&self) -> &'static str {
        match self {
            GameKind::Quiz => "quiz_participations",
            GameKind::Agreement => "agreement_participations",
        }
    }
}

/// Shared shape of quiz and agreement sessions: one row per relationship per day.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct GameSession {
    pub id: Uuid,
    pub relationship_id: Uuid,
    pub session_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// A member's answers about themselves and guesses about their partner.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Participation {
    pub id: Uuid,
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub answers: Json<Vec<u8>>,
    pub guesses: Json<Vec<u8>>,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    Free,
    Premium,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Premium => "premium",
        }
    }

    pub fn rate_limit_tier(&self) -> &'static str {
        match self {
            Plan::Free => "standard",
            Plan::Premium => "premium",
        }
    }
}

impl TryFrom<String> for Plan {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "free" => Ok(Plan::Free),
            "premium" => Ok(Plan::Premium),
            other => Err(format!("unknown plan: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Subscription {
    pub user_id: Uuid,
    #[sqlx(try_from = "String")]
    pub plan: Plan,
    pub status: String,
    pub current_period_end: Option<DateTime<Utc>>,
}

impl Subscription {
    pub fn free(user_id: Uuid) -> Self {
        Self {
            user_id,
            plan: Plan::Free,
            status: "active".to_string(),
            current_period_end: None,
        }
    }

    /// Plan in force at `now`; lapsed or cancelled premium falls back to free.
    pub fn effective_plan(&self, now: DateTime<Utc>) -> Plan {
        let in_period = self.current_period_end.map_or(true, |end| now < end);
        if self.plan == Plan::Premium && self.status == "active" && in_period {
            Plan::Premium
        } else {
            Plan::Free
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Streak {
    pub relationship_id: Uuid,
    pub current_streak: i32,
    pub longest_streak: i32,
    pub last_completed_date: Option<NaiveDate>,
}
