use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use crate::auth::extractor::AuthenticatedUser;
use crate::AppState;
use crate::Result;
use tracing::{info, error};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
}

pub async fn login(
    req: web::Json<LoginRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    match state.auth_service.authenticate(&req.email, &req.password).await {
        Ok(token) => {
            info!("Login successful");
            Ok(HttpResponse::Ok().json(AuthResponse { token }))
        }
        Err(e) => {
            error!("Login failed: {}", e);
            Err(e)
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
}

pub async fn register(
    req: web::Json<RegisterRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let user = state
        .auth_service
        .register(&req.email, &req.password, req.display_name.as_deref())
        .await
        .map_err(|e| {
            error!("Registration failed: {}", e);
            e
        })?;

    // Sign the new user straight in; this is not a login attempt
    let token = state.auth_service.start_session(&user).await?;
    info!("Started session for newly registered user {}", user.id);
    Ok(HttpResponse::Created().json(AuthResponse { token }))
}

pub async fn logout(
    auth: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    state.auth_service.invalidate_token(&auth.token).await?;
    info!("User {} logged out", auth.user.id);

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Successfully logged out"
    })))
}

#[derive(Debug, Deserialize)]
pub struct MagicLinkRequest {
    pub email: String,
}

pub async fn request_magic_link(
    req: web::Json<MagicLinkRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    state.auth_service.request_magic_link(&req.email).await?;

    Ok(HttpResponse::Accepted().json(serde_json::json!({
        "message": "If that address can sign in, a link is on its way"
    })))
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub token: String,
}

pub async fn verify_magic_link(
    query: web::Query<VerifyQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let token = state.auth_service.verify_magic_link(&query.token).await?;
    Ok(HttpResponse::Ok().json(AuthResponse { token }))
}
