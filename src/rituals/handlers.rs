use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::db::models::GameKind;
use crate::rituals::meetings::EntryInput;
use crate::{AppState, Result};

#[derive(Debug, Deserialize)]
pub struct TextRequest {
    pub body: String,
}

pub async fn today(auth: AuthenticatedUser, state: web::Data<AppState>) -> Result<HttpResponse> {
    let pair = state.pairing.require_pair(auth.user.id).await?;
    let view = state.daily.today(&pair, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(view))
}

pub async fn submit_response(
    auth: AuthenticatedUser,
    req: web::Json<TextRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let pair = state.pairing.require_pair(auth.user.id).await?;
    let view = state.daily.submit_response(&pair, &req.body, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(view))
}

#[derive(Debug, Deserialize)]
pub struct ValidationRequest {
    pub kind: String,
}

pub async fn validate_response(
    auth: AuthenticatedUser,
    path: web::Path<Uuid>,
    req: web::Json<ValidationRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let pair = state.pairing.require_pair(auth.user.id).await?;
    let validation = state
        .daily
        .validate_response(&pair, path.into_inner(), &req.kind)
        .await?;
    Ok(HttpResponse::Ok().json(validation))
}

pub async fn reflect(
    auth: AuthenticatedUser,
    path: web::Path<Uuid>,
    req: web::Json<TextRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let pair = state.pairing.require_pair(auth.user.id).await?;
    let reflection = state.daily.reflect(&pair, path.into_inner(), &req.body).await?;
    Ok(HttpResponse::Ok().json(reflection))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

pub async fn history(
    auth: AuthenticatedUser,
    query: web::Query<HistoryQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let pair = state.pairing.require_pair(auth.user.id).await?;
    let items = state.daily.history(&pair, query.limit.unwrap_or(30)).await?;
    Ok(HttpResponse::Ok().json(items))
}

#[derive(Debug, Deserialize)]
pub struct GameSubmission {
    pub answers: Vec<u8>,
    pub guesses: Vec<u8>,
}

async fn game_today(kind: GameKind, auth: AuthenticatedUser, state: web::Data<AppState>) -> Result<HttpResponse> {
    let pair = state.pairing.require_pair(auth.user.id).await?;
    let view = state.games.today(&pair, kind, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(view))
}

async fn game_submit(
    kind: GameKind,
    auth: AuthenticatedUser,
    req: web::Json<GameSubmission>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let pair = state.pairing.require_pair(auth.user.id).await?;
    let view = state
        .games
        .submit(&pair, kind, &req.answers, &req.guesses, Utc::now())
        .await?;
    Ok(HttpResponse::Ok().json(view))
}

pub async fn quiz_today(auth: AuthenticatedUser, state: web::Data<AppState>) -> Result<HttpResponse> {
    game_today(GameKind::Quiz, auth, state).await
}

pub async fn quiz_submit(
    auth: AuthenticatedUser,
    req: web::Json<GameSubmission>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    game_submit(GameKind::Quiz, auth, req, state).await
}

pub async fn agreement_today(auth: AuthenticatedUser, state: web::Data<AppState>) -> Result<HttpResponse> {
    game_today(GameKind::Agreement, auth, state).await
}

pub async fn agreement_submit(
    auth: AuthenticatedUser,
    req: web::Json<GameSubmission>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    game_submit(GameKind::Agreement, auth, req, state).await
}

pub async fn current_meeting(auth: AuthenticatedUser, state: web::Data<AppState>) -> Result<HttpResponse> {
    let pair = state.pairing.require_pair(auth.user.id).await?;
    let week = state.meetings.current_week(Utc::now());
    let view = state.meetings.week_view(&pair, &week).await?;
    Ok(HttpResponse::Ok().json(view))
}

pub async fn meeting_for_week(
    auth: AuthenticatedUser,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let pair = state.pairing.require_pair(auth.user.id).await?;
    let view = state.meetings.week_view(&pair, &path).await?;
    Ok(HttpResponse::Ok().json(view))
}

pub async fn update_meeting(
    auth: AuthenticatedUser,
    req: web::Json<EntryInput>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let pair = state.pairing.require_pair(auth.user.id).await?;
    let view = state.meetings.upsert_entry(&pair, &req, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(view))
}
