//! Database module for the North Star server
//!
//! Row models and the `DbOperations` data access layer. Queries are split
//! by area: accounts in `operations`, pairing in `relationships`, and the
//! daily/weekly rituals in `rituals`.

pub mod models;
pub mod operations;
mod relationships;
mod rituals;

pub use models::{
    DailySession, GameKind, Invite, Plan, Relationship, RelationshipKind, SessionState,
    Subscription, User, UserSession,
};
pub use operations::DbOperations;
