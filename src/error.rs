use thiserror::Error;
use actix_web::{ResponseError, HttpResponse, http::StatusCode};
use serde_json::json;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    AuthError(#[from] AuthError),

    #[error("{0}")]
    RitualError(#[from] RitualError),

    #[error("Email error: {0}")]
    EmailError(#[from] EmailError),

    #[error("Database error: {0}")]
    DatabaseError(#[from] DatabaseError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::DatabaseError(DatabaseError::NotFound),
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                AppError::DatabaseError(DatabaseError::Duplicate)
            }
            _ => AppError::DatabaseError(DatabaseError::QueryError(err.to_string())),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::DatabaseError(DatabaseError::MigrationError(err.to_string()))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                AppError::AuthError(AuthError::TokenExpired)
            }
            _ => AppError::AuthError(AuthError::InvalidToken),
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::EmailError(EmailError::RequestFailed(err.to_string()))
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        // Internal details stay in the logs.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "Something went wrong. Please try again.".to_string()
        } else {
            self.to_string()
        };
        let response = json!({
            "error": {
                "status": status.as_u16(),
                "message": message
            }
        });
        HttpResponse::build(status).json(response)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::AuthError(e) => match e {
                AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
                AuthError::TokenExpired => StatusCode::UNAUTHORIZED,
                AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
                AuthError::NotSignedIn => StatusCode::UNAUTHORIZED,
                AuthError::InvalidMagicLink => StatusCode::UNAUTHORIZED,
                AuthError::EmailTaken => StatusCode::CONFLICT,
                AuthError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            },
            AppError::RitualError(e) => match e {
                RitualError::NoRelationship => StatusCode::NOT_FOUND,
                RitualError::NotMember => StatusCode::FORBIDDEN,
                RitualError::InvalidInvite => StatusCode::NOT_FOUND,
                RitualError::InviteExpired => StatusCode::GONE,
                RitualError::InviteClaimed
                | RitualError::OwnInvite
                | RitualError::AlreadyInRelationship
                | RitualError::RelationshipFull
                | RitualError::AlreadyRevealed => StatusCode::CONFLICT,
                RitualError::NotRevealed => StatusCode::FORBIDDEN,
                RitualError::PartnerMissing => StatusCode::CONFLICT,
            },
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::DatabaseError(DatabaseError::NotFound) => StatusCode::NOT_FOUND,
            AppError::DatabaseError(DatabaseError::Duplicate) => StatusCode::CONFLICT,
            AppError::EmailError(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Not signed in")]
    NotSignedIn,

    #[error("Sign-in link is invalid or has expired")]
    InvalidMagicLink,

    #[error("An account with this email already exists")]
    EmailTaken,

    #[error("Rate limited")]
    RateLimited,
}

/// Pairing and ritual failures shown to the user as-is.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RitualError {
    #[error("You are not in a relationship yet")]
    NoRelationship,

    #[error("You are not a member of this relationship")]
    NotMember,

    #[error("Invite code is invalid")]
    InvalidInvite,

    #[error("Invite code has expired")]
    InviteExpired,

    #[error("Invite code has already been used")]
    InviteClaimed,

    #[error("You cannot claim your own invite")]
    OwnInvite,

    #[error("You are already in a relationship")]
    AlreadyInRelationship,

    #[error("This relationship already has two members")]
    RelationshipFull,

    #[error("Your partner has not joined yet")]
    PartnerMissing,

    #[error("Answers are locked once revealed")]
    AlreadyRevealed,

    #[error("Available once you have both answered")]
    NotRevealed,
}

#[derive(Error, Debug)]
pub enum EmailError {
    #[error("Email request failed: {0}")]
    RequestFailed(String),

    #[error("Email provider rejected message: {0}")]
    Rejected(String),

    #[error("Invalid link: {0}")]
    InvalidLink(String),
}

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Migration error: {0}")]
    MigrationError(String),

    #[error("Record not found")]
    NotFound,

    #[error("Duplicate record")]
    Duplicate,
}
