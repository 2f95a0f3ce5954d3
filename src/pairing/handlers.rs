use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::auth::AuthenticatedUser;
use crate::db::models::RelationshipKind;
use crate::{AppState, Result};

#[derive(Debug, Deserialize)]
pub struct CreateRelationshipRequest {
    pub kind: RelationshipKind,
}

pub async fn create_relationship(
    auth: AuthenticatedUser,
    req: web::Json<CreateRelationshipRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let view = state.pairing.create_relationship(auth.user.id, req.kind).await?;
    Ok(HttpResponse::Created().json(view))
}

pub async fn leave_relationship(
    auth: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    state.pairing.leave_relationship(auth.user.id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "You have left the relationship" })))
}

pub async fn create_invite(
    auth: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let invite = state.pairing.create_invite(auth.user.id).await?;
    Ok(HttpResponse::Created().json(serde_json::json!({
        "code": invite.code,
        "expires_at": invite.expires_at,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ClaimInviteRequest {
    pub code: String,
}

pub async fn claim_invite(
    auth: AuthenticatedUser,
    req: web::Json<ClaimInviteRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let view = state.pairing.claim_invite(auth.user.id, &req.code).await?;
    Ok(HttpResponse::Ok().json(view))
}

/// Who is signed in, their relationship (if any) and plan.
pub async fn session_info(
    auth: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let relationship = state.pairing.current_relationship(auth.user.id).await?;
    let subscription = state.auth_service.subscription_for(auth.user.id).await?;
    let plan = subscription.effective_plan(chrono::Utc::now());

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "user": auth.user,
        "relationship": relationship,
        "subscription": subscription,
        "plan": plan,
    })))
}
