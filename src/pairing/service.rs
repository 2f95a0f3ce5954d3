use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Settings;
use crate::db::models::{Invite, MemberProfile, Relationship, RelationshipKind, Streak};
use crate::db::operations::DbOperations;
use crate::error::{AppError, DatabaseError, RitualError};
use crate::pairing::code::{generate_code, normalize_code};
use crate::Result;

const MAX_MEMBERS: i64 = 2;
const CODE_ATTEMPTS: usize = 5;

/// A relationship as seen by one of its members.
#[derive(Debug, Clone, Serialize)]
pub struct RelationshipView {
    pub relationship: Relationship,
    pub members: Vec<MemberProfile>,
    pub partner: Option<MemberProfile>,
    pub streak: Option<Streak>,
}

/// A complete pair: the caller and their partner, both active.
#[derive(Debug, Clone)]
pub struct Pair {
    pub relationship: Relationship,
    pub user_id: Uuid,
    pub partner_id: Uuid,
}

/// Decides whether `claimant` may use `invite`, given the state read under lock.
pub fn check_claim(
    invite: &Invite,
    claimant: Uuid,
    now: DateTime<Utc>,
    claimant_in_relationship: bool,
    active_members: i64,
) -> std::result::Result<(), RitualError> {
    if invite.claimed_by.is_some() {
        return Err(RitualError::InviteClaimed);
    }
    if invite.is_expired_at(now) {
        return Err(RitualError::InviteExpired);
    }
    if invite.created_by == claimant {
        return Err(RitualError::OwnInvite);
    }
    if claimant_in_relationship {
        return Err(RitualError::AlreadyInRelationship);
    }
    if active_members == 0 {
        // Everyone left; the code points at nothing.
        return Err(RitualError::InvalidInvite);
    }
    if active_members >= MAX_MEMBERS {
        return Err(RitualError::RelationshipFull);
    }
    Ok(())
}

fn already_in_relationship_on_duplicate(err: AppError) -> AppError {
    match err {
        AppError::DatabaseError(DatabaseError::Duplicate) => RitualError::AlreadyInRelationship.into(),
        other => other,
    }
}

pub struct PairingService {
    db: DbOperations,
    settings: Arc<Settings>,
}

impl PairingService {
    pub fn new(db: DbOperations, settings: Arc<Settings>) -> Self {
        Self { db, settings }
    }

    pub async fn create_relationship(
        &self,
        user_id: Uuid,
        kind: RelationshipKind,
    ) -> Result<RelationshipView> {
        let mut transaction = self.db.begin_transaction().await?;

        if self.db.is_active_member_with_transaction(user_id, &mut transaction).await? {
            return Err(RitualError::AlreadyInRelationship.into());
        }

        let relationship = self
            .db
            .create_relationship_with_transaction(kind, user_id, &mut transaction)
            .await?;
        self.db
            .add_member_with_transaction(relationship.id, user_id, "owner", &mut transaction)
            .await
            .map_err(already_in_relationship_on_duplicate)?;

        transaction.commit().await?;
        info!("User {} created {} relationship {}", user_id, kind, relationship.id);

        self.view(relationship, user_id).await
    }

    pub async fn create_invite(&self, user_id: Uuid) -> Result<Invite> {
        let relationship = self
            .db
            .active_relationship_for(user_id)
            .await?
            .ok_or(RitualError::NoRelationship)?;

        if self.db.count_active_members(relationship.id).await? >= MAX_MEMBERS {
            return Err(RitualError::RelationshipFull.into());
        }

        let expires_at = Utc::now() + Duration::days(self.settings.invites.expiry_days);
        let mut attempts = 0;
        loop {
            let code = generate_code(self.settings.invites.code_length);
            match self.db.create_invite(relationship.id, &code, user_id, expires_at).await {
                Ok(invite) => {
                    info!("User {} created invite for relationship {}", user_id, relationship.id);
                    return Ok(invite);
                }
                Err(AppError::DatabaseError(DatabaseError::Duplicate)) if attempts + 1 < CODE_ATTEMPTS => {
                    attempts += 1;
                    warn!("Invite code collision, retrying ({}/{})", attempts, CODE_ATTEMPTS);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Joins the relationship behind `code`. Exactly one claimant can win a code.
    pub async fn claim_invite(&self, user_id: Uuid, code: &str) -> Result<RelationshipView> {
        let code = normalize_code(code);
        if code.is_empty() {
            return Err(RitualError::InvalidInvite.into());
        }

        let mut transaction = self.db.begin_transaction().await?;

        let invite = self
            .db
            .get_invite_by_code_with_transaction(&code, &mut transaction)
            .await?
            .ok_or(RitualError::InvalidInvite)?;
        let relationship = self
            .db
            .lock_relationship(invite.relationship_id, &mut transaction)
            .await?
            .ok_or(RitualError::InvalidInvite)?;

        let in_relationship = self
            .db
            .is_active_member_with_transaction(user_id, &mut transaction)
            .await?;
        let active_members = self
            .db
            .count_active_members_with_transaction(relationship.id, &mut transaction)
            .await?;

        if let Err(e) = check_claim(&invite, user_id, Utc::now(), in_relationship, active_members) {
            warn!("User {} could not claim invite {}: {}", user_id, invite.id, e);
            return Err(e.into());
        }

        if !self
            .db
            .mark_invite_claimed_with_transaction(invite.id, user_id, Utc::now(), &mut transaction)
            .await?
        {
            return Err(RitualError::InviteClaimed.into());
        }
        self.db
            .add_member_with_transaction(relationship.id, user_id, "partner", &mut transaction)
            .await
            .map_err(already_in_relationship_on_duplicate)?;

        transaction.commit().await?;
        info!("User {} joined relationship {}", user_id, relationship.id);

        self.view(relationship, user_id).await
    }

    pub async fn leave_relationship(&self, user_id: Uuid) -> Result<()> {
        if !self.db.deactivate_membership(user_id).await? {
            return Err(RitualError::NoRelationship.into());
        }
        info!("User {} left their relationship", user_id);
        Ok(())
    }

    pub async fn current_relationship(&self, user_id: Uuid) -> Result<Option<RelationshipView>> {
        match self.db.active_relationship_for(user_id).await? {
            Some(relationship) => Ok(Some(self.view(relationship, user_id).await?)),
            None => Ok(None),
        }
    }

    /// The caller's relationship, provided their partner has joined.
    pub async fn require_pair(&self, user_id: Uuid) -> Result<Pair> {
        let relationship = self
            .db
            .active_relationship_for(user_id)
            .await?
            .ok_or(RitualError::NoRelationship)?;

        let partner_id = self
            .db
            .active_members(relationship.id)
            .await?
            .into_iter()
            .map(|member| member.user_id)
            .find(|id| *id != user_id)
            .ok_or(RitualError::PartnerMissing)?;

        Ok(Pair {
            relationship,
            user_id,
            partner_id,
        })
    }

    async fn view(&self, relationship: Relationship, user_id: Uuid) -> Result<RelationshipView> {
        let members = self.db.active_members(relationship.id).await?;
        let partner = members.iter().find(|m| m.user_id != user_id).cloned();
        let streak = self.db.get_streak(relationship.id).await?;

        Ok(RelationshipView {
            relationship,
            members,
            partner,
            streak,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invite(created_by: Uuid, expires_in: Duration) -> Invite {
        let now = Utc::now();
        Invite {
            id: Uuid::new_v4(),
            relationship_id: Uuid::new_v4(),
            code: "ABC234".to_string(),
            created_by,
            expires_at: now + expires_in,
            claimed_by: None,
            claimed_at: None,
            created_at: now,
        }
    }

    #[test]
    fn fresh_invite_can_be_claimed() {
        let invite = invite(Uuid::new_v4(), Duration::days(7));
        assert_eq!(check_claim(&invite, Uuid::new_v4(), Utc::now(), false, 1), Ok(()));
    }

    #[test]
    fn expired_invite_fails() {
        let invite = invite(Uuid::new_v4(), Duration::days(7));
        let later = Utc::now() + Duration::days(8);
        assert_eq!(
            check_claim(&invite, Uuid::new_v4(), later, false, 1),
            Err(RitualError::InviteExpired)
        );
    }

    #[test]
    fn claimed_invite_fails_even_if_expired() {
        let mut invite = invite(Uuid::new_v4(), Duration::days(-1));
        invite.claimed_by = Some(Uuid::new_v4());
        assert_eq!(
            check_claim(&invite, Uuid::new_v4(), Utc::now(), false, 1),
            Err(RitualError::InviteClaimed)
        );
    }

    #[test]
    fn creator_cannot_claim_own_invite() {
        let creator = Uuid::new_v4();
        let invite = invite(creator, Duration::days(7));
        assert_eq!(
            check_claim(&invite, creator, Utc::now(), true, 1),
            Err(RitualError::OwnInvite)
        );
    }

    #[test]
    fn member_of_another_relationship_cannot_claim() {
        let invite = invite(Uuid::new_v4(), Duration::days(7));
        assert_eq!(
            check_claim(&invite, Uuid::new_v4(), Utc::now(), true, 1),
            Err(RitualError::AlreadyInRelationship)
        );
    }

    #[test]
    fn full_or_abandoned_relationship_rejects_claims() {
        let invite = invite(Uuid::new_v4(), Duration::days(7));
        assert_eq!(
            check_claim(&invite, Uuid::new_v4(), Utc::now(), false, 2),
            Err(RitualError::RelationshipFull)
        );
        assert_eq!(
            check_claim(&invite, Uuid::new_v4(), Utc::now(), false, 0),
            Err(RitualError::InvalidInvite)
        );
    }
}
