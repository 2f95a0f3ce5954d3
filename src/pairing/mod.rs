//! Pairing: relationships, invite codes and membership.

mod code;
pub mod handlers;
mod service;

pub use code::{generate_code, normalize_code};
pub use service::{check_claim, Pair, PairingService, RelationshipView};
