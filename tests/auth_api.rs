use std::sync::Arc;

use actix_web::{test, web, App};
use chrono::{Duration, Utc};
use northstar_server::db::models::{Plan, Subscription};
use northstar_server::{configure_routes, DbOperations};
use serde_json::json;

mod common;
use common::{live_state, unique_email, CapturingMailer};

#[actix_web::test]
async fn test_protected_routes_reject_anonymous_requests() {
    let state = web::Data::new(common::offline_state());
    let app = test::init_service(App::new().app_data(state).configure(configure_routes)).await;

    for (method, uri) in [
        ("GET", "/api/session"),
        ("GET", "/api/today"),
        ("POST", "/api/invites"),
        ("GET", "/api/quiz"),
        ("GET", "/api/meetings/current"),
        ("POST", "/auth/logout"),
    ] {
        let req = match method {
            "GET" => test::TestRequest::get(),
            _ => test::TestRequest::post(),
        }
        .uri(uri)
        .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 401, "{method} {uri}");

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["status"], 401);
        assert_eq!(body["error"]["message"], "Authentication error: Not signed in");
    }
}

#[actix_web::test]
async fn test_register_and_login() {
    let Some(state) = live_state(Arc::new(CapturingMailer::default())).await else {
        return;
    };
    let app = test::init_service(
        App::new().app_data(web::Data::new(state)).configure(configure_routes),
    )
    .await;
    let email = unique_email("register");

    let register_response = test::TestRequest::post()
        .uri("/auth/register")
        .set_json(json!({
            "email": email,
            "password": "password123",
            "display_name": "Test User"
        }))
        .send_request(&app)
        .await;
    assert_eq!(register_response.status(), 201);
    let register_body: serde_json::Value = test::read_body_json(register_response).await;
    assert!(register_body.get("token").is_some());

    let duplicate = test::TestRequest::post()
        .uri("/auth/register")
        .set_json(json!({ "email": email.to_uppercase(), "password": "password123" }))
        .send_request(&app)
        .await;
    assert_eq!(duplicate.status(), 409);

    let login_response = test::TestRequest::post()
        .uri("/auth/login")
        .set_json(json!({ "email": email, "password": "password123" }))
        .send_request(&app)
        .await;
    assert_eq!(login_response.status(), 200);
    let login_body: serde_json::Value = test::read_body_json(login_response).await;
    let token = login_body["token"].as_str().unwrap().to_string();

    let session = test::TestRequest::get()
        .uri("/api/session")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .send_request(&app)
        .await;
    assert_eq!(session.status(), 200);
    let session_body: serde_json::Value = test::read_body_json(session).await;
    assert_eq!(session_body["user"]["email"], email.as_str());
    assert!(session_body["user"].get("password_hash").is_none());
    assert!(session_body["relationship"].is_null());
    assert_eq!(session_body["plan"], "free");

    let logout = test::TestRequest::post()
        .uri("/auth/logout")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .send_request(&app)
        .await;
    assert_eq!(logout.status(), 200);

    let after_logout = test::TestRequest::get()
        .uri("/api/session")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .send_request(&app)
        .await;
    assert_eq!(after_logout.status(), 401);
}

#[actix_web::test]
async fn test_invalid_login() {
    let Some(state) = live_state(Arc::new(CapturingMailer::default())).await else {
        return;
    };
    let app = test::init_service(
        App::new().app_data(web::Data::new(state)).configure(configure_routes),
    )
    .await;

    let response = test::TestRequest::post()
        .uri("/auth/login")
        .set_json(json!({
            "email": unique_email("nobody"),
            "password": "wrongpassword"
        }))
        .send_request(&app)
        .await;
    assert_eq!(response.status(), 401);
}

#[actix_web::test]
async fn test_invalid_registration() {
    let Some(state) = live_state(Arc::new(CapturingMailer::default())).await else {
        return;
    };
    let app = test::init_service(
        App::new().app_data(web::Data::new(state)).configure(configure_routes),
    )
    .await;

    let bad_email = test::TestRequest::post()
        .uri("/auth/register")
        .set_json(json!({ "email": "not-an-email", "password": "password123" }))
        .send_request(&app)
        .await;
    assert_eq!(bad_email.status(), 400);

    let short_password = test::TestRequest::post()
        .uri("/auth/register")
        .set_json(json!({ "email": unique_email("short"), "password": "short" }))
        .send_request(&app)
        .await;
    assert_eq!(short_password.status(), 400);
}

#[actix_web::test]
async fn test_magic_link_signs_in_once() {
    let mailer = Arc::new(CapturingMailer::default());
    let Some(state) = live_state(mailer.clone()).await else {
        return;
    };
    let app = test::init_service(
        App::new().app_data(web::Data::new(state)).configure(configure_routes),
    )
    .await;
    let email = unique_email("magic");

    let request = test::TestRequest::post()
        .uri("/auth/magic-link")
        .set_json(json!({ "email": email }))
        .send_request(&app)
        .await;
    assert_eq!(request.status(), 202);

    let token = mailer.last_token_for(&email).expect("sign-in email sent");
    let verify_uri = format!("/auth/magic-link/verify?token={token}");

    let verify = test::TestRequest::get().uri(&verify_uri).send_request(&app).await;
    assert_eq!(verify.status(), 200);
    let body: serde_json::Value = test::read_body_json(verify).await;
    assert!(body["token"].as_str().is_some());

    let reused = test::TestRequest::get().uri(&verify_uri).send_request(&app).await;
    assert_eq!(reused.status(), 401);
}

#[actix_web::test]
async fn test_magic_link_requests_are_rate_limited() {
    let Some(state) = live_state(Arc::new(CapturingMailer::default())).await else {
        return;
    };
    let app = test::init_service(
        App::new().app_data(web::Data::new(state)).configure(configure_routes),
    )
    .await;
    let email = unique_email("limited");

    for _ in 0..5 {
        let resp = test::TestRequest::post()
            .uri("/auth/magic-link")
            .set_json(json!({ "email": email }))
            .send_request(&app)
            .await;
        assert_eq!(resp.status(), 202);
    }

    let resp = test::TestRequest::post()
        .uri("/auth/magic-link")
        .set_json(json!({ "email": email }))
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), 429);
}

#[actix_web::test]
async fn test_premium_members_get_the_higher_limit() {
    let Some(state) = live_state(Arc::new(CapturingMailer::default())).await else {
        return;
    };
    let email = unique_email("premium");
    let user = state
        .auth_service
        .register(&email, "password123", None)
        .await
        .expect("register");

    let db = DbOperations::new(state.db_pool.clone());
    db.upsert_subscription(&Subscription {
        user_id: user.id,
        plan: Plan::Premium,
        status: "active".to_string(),
        current_period_end: Some(Utc::now() + Duration::days(30)),
    })
    .await
    .expect("upgrade");

    let subscription = state.auth_service.subscription_for(user.id).await.unwrap();
    assert_eq!(subscription.effective_plan(Utc::now()), Plan::Premium);

    for _ in 0..20 {
        state.auth_service.request_magic_link(&email).await.expect("within premium limit");
    }
    assert!(state.auth_service.request_magic_link(&email).await.is_err());
}

#[actix_web::test]
async fn test_malformed_requests_get_json_errors() {
    let state = web::Data::new(common::offline_state());
    let app = test::init_service(App::new().app_data(state).configure(configure_routes)).await;

    let resp = test::TestRequest::post()
        .uri("/auth/login")
        .insert_header(("Content-Type", "application/json"))
        .set_payload("{bad")
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["status"], 400);
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .starts_with("Validation error"));

    let resp = test::TestRequest::get()
        .uri("/auth/magic-link/verify")
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["status"], 400);
}

#[actix_web::test]
async fn test_registration_leaves_the_login_allowance_intact() {
    let Some(state) = live_state(Arc::new(CapturingMailer::default())).await else {
        return;
    };
    let app = test::init_service(
        App::new().app_data(web::Data::new(state)).configure(configure_routes),
    )
    .await;
    let email = unique_email("allowance");

    let resp = test::TestRequest::post()
        .uri("/auth/register")
        .set_json(json!({ "email": email, "password": "password123" }))
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), 201);

    let login = || {
        test::TestRequest::post()
            .uri("/auth/login")
            .set_json(json!({ "email": email, "password": "password123" }))
    };
    for _ in 0..5 {
        assert_eq!(login().send_request(&app).await.status(), 200);
    }
    assert_eq!(login().send_request(&app).await.status(), 429);
}

#[actix_web::test]
async fn test_premium_members_can_log_in_more_often() {
    let Some(state) = live_state(Arc::new(CapturingMailer::default())).await else {
        return;
    };
    let email = unique_email("premium-login");
    let user = state
        .auth_service
        .register(&email, "password123", None)
        .await
        .expect("register");
    DbOperations::new(state.db_pool.clone())
        .upsert_subscription(&Subscription {
            user_id: user.id,
            plan: Plan::Premium,
            status: "active".to_string(),
            current_period_end: Some(Utc::now() + Duration::days(30)),
        })
        .await
        .expect("upgrade");

    for _ in 0..20 {
        state
            .auth_service
            .authenticate(&email, "password123")
            .await
            .expect("within premium limit");
    }
    assert!(state.auth_service.authenticate(&email, "password123").await.is_err());
}
