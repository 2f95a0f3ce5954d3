use crate::auth::password::{hash_password, verify_password, MIN_PASSWORD_LENGTH};
use crate::auth::rate_limit::RateLimiter;
use crate::auth::tokens::{decode_token, generate_token, hash_token, random_token};
use crate::config::Settings;
use crate::db::models::{Subscription, User, UserSession};
use crate::db::operations::DbOperations;
use crate::email::{send_magic_link, Mailer};
use crate::error::{AppError, AuthError, DatabaseError};
use crate::Result;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Trims and lowercases an email and checks it looks deliverable.
pub fn normalize_email(raw: &str) -> Result<String> {
    let email = raw.trim().to_lowercase();
    let invalid = || AppError::ValidationError("Please enter a valid email address".into());

    if email.len() > 254 || email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|label| label.is_empty()) {
        return Err(invalid());
    }

    Ok(email)
}

pub struct AuthService {
    db: DbOperations,
    settings: Arc<Settings>,
    mailer: Arc<dyn Mailer>,
    rate_limiter: Arc<RateLimiter>,
}

impl AuthService {
    pub fn new(
        db: DbOperations,
        settings: Arc<Settings>,
        mailer: Arc<dyn Mailer>,
        rate_limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            db,
            settings,
            mailer,
            rate_limiter,
        }
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<User> {
        let email = normalize_email(email)?;
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AppError::ValidationError(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }

        let display_name = display_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string);

        match self.db.get_user_by_email(&email).await? {
            Some(user) => {
                warn!("Registration attempted for existing user {}", user.id);
                Err(AuthError::EmailTaken.into())
            }
            None => {
                let user = User::new(email, display_name, Some(hash_password(password)?));
                match self.db.create_user(&user).await {
                    Ok(user) => {
                        info!("Registered user {}", user.id);
                        Ok(user)
                    }
                    Err(AppError::DatabaseError(DatabaseError::Duplicate)) => {
                        Err(AuthError::EmailTaken.into())
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    /// Verifies email/password and issues a session token.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<String> {
        let email = normalize_email(email).map_err(|_| AuthError::InvalidCredentials)?;

        let existing = self.db.get_user_by_email(&email).await?;
        let tier = self.rate_limit_tier(existing.as_ref()).await?;
        if !self.rate_limiter.check_rate_limit(&format!("login:{email}"), tier).await {
            warn!("Login rate limit hit");
            return Err(AuthError::RateLimited.into());
        }

        let user = existing.ok_or(AuthError::InvalidCredentials)?;

        let stored = user.password_hash.as_deref().ok_or(AuthError::InvalidCredentials)?;
        if !user.is_active || !verify_password(password, stored) {
            return Err(AuthError::InvalidCredentials.into());
        }

        self.start_session(&user).await
    }

    /// Emails a single-use sign-in link, creating the account on first contact.
    pub async fn request_magic_link(&self, email: &str) -> Result<()> {
        let email = normalize_email(email)?;

        let existing = self.db.get_user_by_email(&email).await?;
        let tier = self.rate_limit_tier(existing.as_ref()).await?;
        if !self.rate_limiter.check_rate_limit(&format!("magic:{email}"), tier).await {
            warn!("Magic link rate limit hit");
            return Err(AuthError::RateLimited.into());
        }

        let user = self.db.find_or_create_user(&email).await?;
        if !user.is_active {
            warn!("Magic link requested for inactive user {}", user.id);
            return Ok(());
        }

        let token = random_token();
        let expires_at = Utc::now() + Duration::minutes(self.settings.auth.magic_link_expiry_minutes);
        self.db.create_magic_link(user.id, &hash_token(&token), expires_at).await?;

        send_magic_link(self.mailer.as_ref(), &self.settings, &email, &token).await?;
        info!("Magic link issued for user {}", user.id);
        Ok(())
    }

    /// Consumes a magic-link token and issues a session token.
    pub async fn verify_magic_link(&self, token: &str) -> Result<String> {
        let link = self
            .db
            .consume_magic_link(&hash_token(token.trim()), Utc::now())
            .await?
            .ok_or(AuthError::InvalidMagicLink)?;

        let user = self
            .db
            .get_user_by_id(link.user_id)
            .await?
            .filter(|user| user.is_active)
            .ok_or(AuthError::InvalidMagicLink)?;

        info!("Magic link verified for user {}", user.id);
        self.start_session(&user).await
    }

    /// Limit tier for sign-in attempts on an address; unknown addresses are standard.
    async fn rate_limit_tier(&self, user: Option<&User>) -> Result<&'static str> {
        Ok(match user {
            Some(user) => self
                .subscription_for(user.id)
                .await?
                .effective_plan(Utc::now())
                .rate_limit_tier(),
            None => "standard",
        })
    }

    /// Issues a session token for an already verified user.
    pub async fn start_session(&self, user: &User) -> Result<String> {
        let expiry_hours = self.settings.auth.token_expiry_hours;
        let token = generate_token(&self.settings.auth.jwt_secret, user.id, expiry_hours)?;

        let session = UserSession::new(user.id, token.clone(), expiry_hours);
        self.db.create_session(&session).await?;
        self.db.record_login(user.id).await?;

        Ok(token)
    }

    pub async fn validate_token(&self, token: &str) -> Result<User> {
        // First check if session exists and is not expired
        let session = self
            .db
            .get_session_by_token(token)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if session.is_expired() {
            return Err(AuthError::TokenExpired.into());
        }

        let claims = decode_token(&self.settings.auth.jwt_secret, token)?;
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;
        if user_id != session.user_id {
            return Err(AuthError::InvalidToken.into());
        }

        let user = self
            .db
            .get_user_by_id(user_id)
            .await?
            .filter(|user| user.is_active)
            .ok_or(AuthError::InvalidToken)?;

        self.db.update_session_activity(token).await?;

        Ok(user)
    }

    pub async fn invalidate_token(&self, token: &str) -> Result<()> {
        self.db.delete_session(token).await
    }

    pub async fn subscription_for(&self, user_id: Uuid) -> Result<Subscription> {
        Ok(self
            .db
            .get_subscription(user_id)
            .await?
            .unwrap_or_else(|| Subscription::free(user_id)))
    }

    pub async fn cleanup_expired(&self) -> Result<u64> {
        self.rate_limiter.cleanup().await;
        self.db.cleanup_expired(Utc::now()).await
    }
}
