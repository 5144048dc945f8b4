//! End-to-end tests for the admin auth core: real router, real handlers,
//! in-memory store wiring.

use anyhow::{Context, Result};
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use chrono::Utc;
use gardisto::api;
use gardisto::api::auth::{
    AuthConfig, AuthState, NoopRateLimiter, RateLimiter, WindowRateLimiter, hash_password,
};
use gardisto::audit::{AuditEvent, AuditRecorder, EXPORT_CSV_HEADER};
use gardisto::store::memory::{MemoryAuditSink, MemoryStore};
use gardisto::store::{AdminIdentity, CredentialStore};
use gardisto::token::SessionTokenSigner;
use gardisto::totp;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tower::ServiceExt;
use uuid::Uuid;

const PASSWORD: &str = "password123";

struct Harness {
    app: Router,
    state: Arc<AuthState>,
    store: Arc<MemoryStore>,
    sink: Arc<MemoryAuditSink>,
    admin_id: Uuid,
    role_id: Uuid,
}

fn harness_with_limiter(rate_limiter: Arc<dyn RateLimiter>) -> Result<Harness> {
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(MemoryAuditSink::new());

    let admin_id = Uuid::new_v4();
    let role_id = Uuid::new_v4();
    store.insert_identity(AdminIdentity {
        id: admin_id,
        email: "admin@test.com".to_string(),
        password_hash: hash_password(PASSWORD)?,
        full_name: "Test Admin".to_string(),
        role_id: Some(role_id),
        is_super_admin: false,
        is_active: true,
        mfa_enabled: false,
        mfa_secret: None,
        mfa_pending_secret: None,
        login_attempts: 0,
        locked_until: None,
        last_login_at: None,
    });

    let credential_store: Arc<dyn CredentialStore> = store.clone();
    let state = Arc::new(AuthState::new(
        AuthConfig::new(),
        credential_store,
        AuditRecorder::new(sink.clone()),
        rate_limiter,
        SessionTokenSigner::ephemeral()?,
    ));

    Ok(Harness {
        app: api::app(Arc::clone(&state)),
        state,
        store,
        sink,
        admin_id,
        role_id,
    })
}

fn harness() -> Result<Harness> {
    harness_with_limiter(Arc::new(NoopRateLimiter))
}

async fn send(app: &Router, request: Request<Body>) -> Result<Response<Body>> {
    app.clone()
        .oneshot(request)
        .await
        .map_err(|err| anyhow::anyhow!("router error: {err}"))
}

fn json_request(uri: &str, body: Value) -> Result<Request<Body>> {
    Ok(Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))?)
}

fn bearer_request(method: &str, uri: &str, token: &str) -> Result<Request<Body>> {
    Ok(Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())?)
}

async fn body_json(response: Response<Body>) -> Result<Value> {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    serde_json::from_slice(&bytes).context("response body is not json")
}

async fn body_text(response: Response<Body>) -> Result<String> {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    Ok(String::from_utf8_lossy(&bytes).to_string())
}

async fn login(app: &Router, email: &str, password: &str) -> Result<Response<Body>> {
    send(
        app,
        json_request("/admin/login", json!({ "email": email, "password": password }))?,
    )
    .await
}

async fn login_token(app: &Router) -> Result<String> {
    let response = login(app, "admin@test.com", PASSWORD).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await?;
    body.get("token")
        .and_then(Value::as_str)
        .map(str::to_string)
        .context("missing token in login response")
}

/// Audit appends run on detached tasks; poll until they land.
async fn wait_for_events(sink: &MemoryAuditSink, at_least: usize) -> Vec<AuditEvent> {
    for _ in 0..100 {
        let events = sink.events();
        if events.len() >= at_least {
            return events;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    sink.events()
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or_default()
}

#[tokio::test]
async fn login_success_returns_token_and_user() -> Result<()> {
    let harness = harness()?;
    let started = Utc::now();

    let response = login(&harness.app, "admin@test.com", PASSWORD).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await?;
    assert!(body.get("token").and_then(Value::as_str).is_some());
    assert_eq!(
        body.pointer("/user/email").and_then(Value::as_str),
        Some("admin@test.com")
    );

    // Exactly one login audit event, stamped no earlier than the request.
    let events = wait_for_events(&harness.sink, 1).await;
    let logins: Vec<_> = events
        .iter()
        .filter(|event| event.action == "login")
        .collect();
    assert_eq!(logins.len(), 1);
    assert_eq!(logins[0].actor_id, Some(harness.admin_id));
    assert!(logins[0].created_at >= started);
    Ok(())
}

#[tokio::test]
async fn five_failures_lock_out_the_correct_password() -> Result<()> {
    let harness = harness()?;

    for _ in 0..5 {
        let response = login(&harness.app, "admin@test.com", "wrongpass").await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_text(response).await?, "Invalid credentials");
    }

    // Sixth call with the *correct* password is still rejected with 423.
    let response = login(&harness.app, "admin@test.com", PASSWORD).await?;
    assert_eq!(response.status(), StatusCode::LOCKED);
    assert!(response.headers().get("retry-after").is_some());

    // Expire the lock manually; the next login succeeds and resets attempts.
    let mut identity = harness.store.identity(harness.admin_id).context("identity")?;
    identity.locked_until = Some(Utc::now() - chrono::Duration::seconds(1));
    harness.store.insert_identity(identity);

    let response = login(&harness.app, "admin@test.com", PASSWORD).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        harness
            .store
            .identity(harness.admin_id)
            .context("identity")?
            .login_attempts,
        0
    );
    Ok(())
}

#[tokio::test]
async fn unknown_email_is_indistinguishable_from_wrong_password() -> Result<()> {
    let harness = harness()?;

    let unknown = login(&harness.app, "ghost@test.com", PASSWORD).await?;
    let wrong = login(&harness.app, "admin@test.com", "wrongpass").await?;

    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_text(unknown).await?, body_text(wrong).await?);
    Ok(())
}

#[tokio::test]
async fn login_rate_limit_returns_429_before_auth() -> Result<()> {
    let limiter = WindowRateLimiter::new().with_login_window(2, Duration::from_secs(60));
    let harness = harness_with_limiter(Arc::new(limiter))?;

    for _ in 0..2 {
        let response = login(&harness.app, "admin@test.com", "wrongpass").await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
    let response = login(&harness.app, "admin@test.com", PASSWORD).await?;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body_text(response).await?, "Rate limited");
    Ok(())
}

#[tokio::test]
async fn mfa_enrollment_and_challenge_flow() -> Result<()> {
    let harness = harness()?;
    let token = login_token(&harness.app).await?;

    // Enroll: setup stages a pending secret and returns scannable material.
    let response = send(
        &harness.app,
        bearer_request("POST", "/admin/mfa/setup", &token)?,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await?;
    let secret = body
        .get("secret")
        .and_then(Value::as_str)
        .context("missing secret")?
        .to_string();
    assert!(
        body.get("qr_code")
            .and_then(Value::as_str)
            .is_some_and(|qr| qr.starts_with("data:image/png;base64,"))
    );

    // Login still works without a code while the secret is only pending.
    assert_eq!(
        login(&harness.app, "admin@test.com", PASSWORD).await?.status(),
        StatusCode::OK
    );

    // Confirm with a code derived from the returned secret.
    let totp = totp::build(&secret, "Gardisto Admin", "admin@test.com")?;
    let mut request = json_request(
        "/admin/mfa/verify",
        json!({ "totp_code": totp.generate(now_unix()) }),
    )?;
    request.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {token}").parse()?,
    );
    let response = send(&harness.app, request).await?;
    assert_eq!(response.status(), StatusCode::OK);

    // Correct password with no code now demands MFA and issues no token.
    let response = login(&harness.app, "admin@test.com", PASSWORD).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let text = body_text(response).await?;
    assert_eq!(text, "MFA required");

    // A code from the adjacent 30s step is accepted.
    let adjacent = totp.generate(now_unix() - 30);
    let response = send(
        &harness.app,
        json_request(
            "/admin/login",
            json!({ "email": "admin@test.com", "password": PASSWORD, "mfa_code": adjacent }),
        )?,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);

    // A code from 3 steps back is rejected (barring a chance collision with
    // a tolerated code).
    let stale = totp.generate(now_unix() - 90);
    let tolerated = [
        totp.generate(now_unix() - 30),
        totp.generate(now_unix()),
        totp.generate(now_unix() + 30),
    ];
    if !tolerated.contains(&stale) {
        let response = send(
            &harness.app,
            json_request(
                "/admin/login",
                json!({ "email": "admin@test.com", "password": PASSWORD, "mfa_code": stale }),
            )?,
        )
        .await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    // One mfa_enabled audit event for the whole flow.
    let events = wait_for_events(&harness.sink, 1).await;
    assert_eq!(
        events
            .iter()
            .filter(|event| event.action == "mfa_enabled")
            .count(),
        1
    );
    Ok(())
}

#[tokio::test]
async fn mfa_disable_requires_authenticated_caller() -> Result<()> {
    let harness = harness()?;
    let token = login_token(&harness.app).await?;

    harness
        .store
        .set_pending_mfa_secret(harness.admin_id, "JBSWY3DPEHPK3PXPJBSWY3DPEHPK3PXP")
        .await?;
    harness.store.confirm_mfa(harness.admin_id).await?;

    let response = send(
        &harness.app,
        Request::builder()
            .method("POST")
            .uri("/admin/mfa/disable")
            .body(Body::empty())?,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_text(response).await?, "No token provided");

    let response = send(
        &harness.app,
        bearer_request("POST", "/admin/mfa/disable", &token)?,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        !harness
            .store
            .identity(harness.admin_id)
            .context("identity")?
            .mfa_enabled
    );
    Ok(())
}

#[tokio::test]
async fn deactivation_rejects_a_still_valid_token() -> Result<()> {
    let harness = harness()?;
    let token = login_token(&harness.app).await?;

    let response = send(&harness.app, bearer_request("GET", "/admin/session", &token)?).await?;
    assert_eq!(response.status(), StatusCode::OK);

    // Deactivation takes effect on the next request even though the token
    // is still cryptographically valid.
    harness.store.set_active(harness.admin_id, false);
    let response = send(&harness.app, bearer_request("GET", "/admin/session", &token)?).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn tampered_token_is_rejected_without_identity_lookup() -> Result<()> {
    let harness = harness()?;

    let response = send(
        &harness.app,
        bearer_request("GET", "/admin/session", "v4.public.forged")?,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn audit_read_permission_gates_the_log_endpoints() -> Result<()> {
    let harness = harness()?;
    let token = login_token(&harness.app).await?;

    // No grants yet: 403 with the canonical message.
    let response = send(&harness.app, bearer_request("GET", "/audit-logs", &token)?).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_text(response).await?, "Insufficient permissions");

    // The grant is visible on the very next request, no re-login needed.
    harness.store.set_grant(harness.role_id, "audit:read", true);
    let response = send(&harness.app, bearer_request("GET", "/audit-logs", &token)?).await?;
    assert_eq!(response.status(), StatusCode::OK);

    // Revocation is equally immediate.
    harness.store.set_grant(harness.role_id, "audit:read", false);
    let response = send(&harness.app, bearer_request("GET", "/audit-logs", &token)?).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn audit_export_emits_csv_header_with_zero_rows() -> Result<()> {
    let harness = harness()?;

    // Issue a token directly so no login audit event exists.
    let issued = harness
        .state
        .token_signer()
        .issue(harness.admin_id, "admin@test.com", false)?;
    harness.store.set_grant(harness.role_id, "audit:read", true);

    let response = send(
        &harness.app,
        bearer_request("GET", "/audit-logs/export", &issued.token)?,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok()),
        Some("text/csv")
    );
    assert_eq!(body_text(response).await?, format!("{EXPORT_CSV_HEADER}\n"));
    Ok(())
}

#[tokio::test]
async fn audit_list_filters_by_action() -> Result<()> {
    let harness = harness()?;
    let token = login_token(&harness.app).await?;
    harness.store.set_grant(harness.role_id, "audit:read", true);

    // login + logout leave two events with distinct actions.
    let response = send(&harness.app, bearer_request("POST", "/admin/logout", &token)?).await?;
    assert_eq!(response.status(), StatusCode::OK);
    wait_for_events(&harness.sink, 2).await;

    let response = send(
        &harness.app,
        bearer_request("GET", "/audit-logs?action=logout", &token)?,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await?;
    let rows = body.as_array().context("expected array")?;
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0].get("action").and_then(Value::as_str),
        Some("logout")
    );
    Ok(())
}

#[tokio::test]
async fn super_admin_bypasses_permission_checks() -> Result<()> {
    let harness = harness()?;

    let super_id = Uuid::new_v4();
    harness.store.insert_identity(AdminIdentity {
        id: super_id,
        email: "root@test.com".to_string(),
        password_hash: hash_password(PASSWORD)?,
        full_name: "Root".to_string(),
        role_id: None,
        is_super_admin: true,
        is_active: true,
        mfa_enabled: false,
        mfa_secret: None,
        mfa_pending_secret: None,
        login_attempts: 0,
        locked_until: None,
        last_login_at: None,
    });

    let response = login(&harness.app, "root@test.com", PASSWORD).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let token = body_json(response)
        .await?
        .get("token")
        .and_then(Value::as_str)
        .context("missing token")?
        .to_string();

    // No audit:read grant anywhere, but the flag bypasses the resolver.
    let response = send(&harness.app, bearer_request("GET", "/audit-logs", &token)?).await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn health_endpoint_reports_store_status() -> Result<()> {
    let harness = harness()?;
    let response = send(
        &harness.app,
        Request::builder().uri("/health").body(Body::empty())?,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("x-app").is_some());
    let body = body_json(response).await?;
    assert_eq!(body.get("store").and_then(Value::as_str), Some("ok"));
    Ok(())
}
