//! Axum-based HTTP gateway for the credential and session endpoints.
//!
//! The route table mirrors the client contract one to one: the credential
//! endpoints (`/signup`, `/login`, `/verify-email`, ...), the session check
//! the SPA runs on every refresh (`/check-auth`), and the redacted account
//! directory (`/userFetcher`). Every response, success or failure, wears the
//! `{success, message, ...}` envelope; sessions travel only in the `token`
//! cookie, never in a body.
//!
//! Middleware set:
//! - request body size limit (64KB)
//! - request timeout (30s)
//! - credentialed CORS restricted to the configured origins

use crate::account::store::{CredentialStore, SqliteCredentialStore};
use crate::account::Account;
use crate::config::Config;
use crate::error::AuthError;
use crate::flow::AuthFlow;
use crate::mailer::{LogMailer, Mailer, SmtpMailer};
use crate::session::{
    clear_session_cookie, session_cookie, session_token_from_cookies, SessionIssuer,
};
use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Maximum request body size (64KB). Auth payloads are tiny; anything bigger
/// is abuse.
pub const MAX_BODY_SIZE: usize = 65_536;
/// Request timeout (30s). Signup hashes a password and waits on SMTP, which
/// is the slowest path through the service.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub flow: Arc<AuthFlow>,
}

/// Run the HTTP gateway: open the store, wire the flow controller, serve
/// until ctrl-c.
pub async fn run_gateway(host: &str, port: u16, config: Config) -> Result<()> {
    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_port = listener.local_addr()?.port();
    let display_addr = format!("{host}:{actual_port}");

    let store: Arc<dyn CredentialStore> =
        Arc::new(SqliteCredentialStore::open(&config.store.db_path)?);
    tracing::info!("credential store ready at {}", config.store.db_path.display());

    let mailer: Arc<dyn Mailer> = if config.mail.enabled {
        Arc::new(SmtpMailer::new(&config.mail)?)
    } else {
        tracing::warn!("mail disabled; verification codes and reset links go to the log only");
        Arc::new(LogMailer)
    };

    let sessions = SessionIssuer::new(&config.session.secret);
    let flow = Arc::new(AuthFlow::new(
        store,
        mailer,
        sessions,
        config.app.client_base_url,
    ));
    let state = AppState { flow };

    // ── CORS: browsers send the session cookie cross-site, so this runs in
    // credentialed mode with an enumerated origin list (wildcards and
    // credentials are mutually exclusive) ──
    let cors = cors_layer(&config.server.allowed_origins)?;

    // Build router with middleware
    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/signup", post(handle_signup))
        .route("/resend-verification", post(handle_resend_verification))
        .route("/verify-email", post(handle_verify_email))
        .route("/login", post(handle_login))
        .route("/logout", post(handle_logout))
        .route("/forgot-password", post(handle_forgot_password))
        .route("/reset-password/{token}", post(handle_reset_password))
        .route("/check-auth", get(handle_check_auth))
        .route("/google-login", post(handle_google_login))
        .route("/userFetcher", get(handle_user_fetcher))
        .with_state(state)
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        ));

    tracing::info!("gateway listening on {display_addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown signal received, draining connections"),
        Err(err) => tracing::error!(error = ?err, "failed to install shutdown handler"),
    }
}

fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    let mut allowed = Vec::with_capacity(origins.len());
    for origin in origins {
        allowed.push(HeaderValue::from_str(origin)?);
    }
    Ok(CorsLayer::new()
        .allow_origin(allowed)
        .allow_credentials(true)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600)))
}

// ══════════════════════════════════════════════════════════════════════════════
// AXUM HANDLERS
// ══════════════════════════════════════════════════════════════════════════════

/// Request body for registration. Fields are optional at parse time so a
/// missing field reaches the validation layer instead of dying as a
/// deserialization error with a different message.
#[derive(Deserialize)]
struct SignupBody {
    email: Option<String>,
    password: Option<String>,
    name: Option<String>,
}

/// Request body for password login.
#[derive(Deserialize)]
struct LoginBody {
    email: Option<String>,
    password: Option<String>,
}

/// Request body for the email-only operations (resend, forgot-password).
#[derive(Deserialize)]
struct EmailBody {
    email: Option<String>,
}

/// Request body for verification-code redemption.
#[derive(Deserialize)]
struct CodeBody {
    code: Option<String>,
}

/// Request body for password reset; the token rides in the path.
#[derive(Deserialize)]
struct ResetBody {
    password: Option<String>,
}

/// Federated profile as relayed by the client after the provider handshake.
#[derive(Deserialize)]
struct GoogleBody {
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

/// 400 for bodies that fail to parse, in the standard error envelope.
fn invalid_body(err: &axum::extract::rejection::JsonRejection) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({
            "success": false,
            "message": format!("Invalid request: {err}"),
        })),
    )
        .into_response()
}

/// Success envelope with no account payload.
fn message_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(serde_json::json!({
            "success": true,
            "message": message,
        })),
    )
        .into_response()
}

/// Success envelope carrying the redacted account plus a fresh session
/// cookie.
fn signed_in_response(
    status: StatusCode,
    message: &str,
    account: &Account,
    session: &str,
) -> Response {
    (
        status,
        [(header::SET_COOKIE, session_cookie(session))],
        Json(serde_json::json!({
            "success": true,
            "message": message,
            "user": account.redacted(),
        })),
    )
        .into_response()
}

/// Pull the session token out of the `Cookie` header, if any.
fn session_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .and_then(session_token_from_cookies)
}

/// GET /health. Liveness only; reveals nothing about accounts.
async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// POST /signup. Creates an unverified account and signs the caller in.
async fn handle_signup(
    State(state): State<AppState>,
    body: Result<Json<SignupBody>, axum::extract::rejection::JsonRejection>,
) -> Response {
    let body = match body {
        Ok(Json(body)) => body,
        Err(err) => return invalid_body(&err),
    };

    match state
        .flow
        .register(
            body.email.as_deref().unwrap_or_default(),
            body.password.as_deref().unwrap_or_default(),
            body.name.as_deref().unwrap_or_default(),
        )
        .await
    {
        Ok(signed) => signed_in_response(
            StatusCode::CREATED,
            "User created successfully",
            &signed.account,
            &signed.session,
        ),
        Err(err) => err.into_response(),
    }
}

/// POST /resend-verification. Reissues the 6-digit code for an unverified
/// account.
async fn handle_resend_verification(
    State(state): State<AppState>,
    body: Result<Json<EmailBody>, axum::extract::rejection::JsonRejection>,
) -> Response {
    let body = match body {
        Ok(Json(body)) => body,
        Err(err) => return invalid_body(&err),
    };

    match state
        .flow
        .resend_verification(body.email.as_deref().unwrap_or_default())
        .await
    {
        Ok(()) => message_response(StatusCode::OK, "Verification email resent successfully"),
        Err(err) => err.into_response(),
    }
}

/// POST /verify-email. Redeems a verification code.
async fn handle_verify_email(
    State(state): State<AppState>,
    body: Result<Json<CodeBody>, axum::extract::rejection::JsonRejection>,
) -> Response {
    let body = match body {
        Ok(Json(body)) => body,
        Err(err) => return invalid_body(&err),
    };

    match state
        .flow
        .verify_email(body.code.as_deref().unwrap_or_default())
        .await
    {
        Ok(account) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "message": "Email verified successfully",
                "user": account.redacted(),
            })),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

/// POST /login. Password login; verified accounts get a session cookie.
async fn handle_login(
    State(state): State<AppState>,
    body: Result<Json<LoginBody>, axum::extract::rejection::JsonRejection>,
) -> Response {
    let body = match body {
        Ok(Json(body)) => body,
        Err(err) => return invalid_body(&err),
    };

    match state
        .flow
        .login(
            body.email.as_deref().unwrap_or_default(),
            body.password.as_deref().unwrap_or_default(),
        )
        .await
    {
        Ok(signed) => signed_in_response(
            StatusCode::OK,
            "Login successful",
            &signed.account,
            &signed.session,
        ),
        Err(err) => err.into_response(),
    }
}

/// POST /logout. Overwrites the session cookie. Sessions are stateless so
/// there is nothing to revoke server-side; calling this without a session is
/// fine.
async fn handle_logout() -> Response {
    (
        StatusCode::OK,
        [(header::SET_COOKIE, clear_session_cookie())],
        Json(serde_json::json!({
            "success": true,
            "message": "Logged out successfully",
        })),
    )
        .into_response()
}

/// POST /forgot-password. Mints a reset token and mails the reset link.
async fn handle_forgot_password(
    State(state): State<AppState>,
    body: Result<Json<EmailBody>, axum::extract::rejection::JsonRejection>,
) -> Response {
    let body = match body {
        Ok(Json(body)) => body,
        Err(err) => return invalid_body(&err),
    };

    match state
        .flow
        .forgot_password(body.email.as_deref().unwrap_or_default())
        .await
    {
        Ok(()) => message_response(StatusCode::OK, "Password reset link sent to your email"),
        Err(err) => err.into_response(),
    }
}

/// POST /reset-password/{token}. Redeems a reset token and installs the new
/// password.
async fn handle_reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    body: Result<Json<ResetBody>, axum::extract::rejection::JsonRejection>,
) -> Response {
    let body = match body {
        Ok(Json(body)) => body,
        Err(err) => return invalid_body(&err),
    };

    match state
        .flow
        .reset_password(&token, body.password.as_deref().unwrap_or_default())
        .await
    {
        Ok(()) => message_response(StatusCode::OK, "Password reset successfully"),
        Err(err) => err.into_response(),
    }
}

/// GET /check-auth. Validates the session cookie and returns its account.
async fn handle_check_auth(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let token = match session_token(&headers) {
        Some(token) => token,
        None => return AuthError::NoSession.into_response(),
    };

    match state.flow.check_session(token).await {
        Ok(account) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "user": account.redacted(),
            })),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

/// POST /google-login. Federated login; 201 on first contact, 200 on a
/// merge onto an existing account.
async fn handle_google_login(
    State(state): State<AppState>,
    body: Result<Json<GoogleBody>, axum::extract::rejection::JsonRejection>,
) -> Response {
    let body = match body {
        Ok(Json(body)) => body,
        Err(err) => return invalid_body(&err),
    };

    match state
        .flow
        .federated_login(
            body.email.as_deref().unwrap_or_default(),
            body.name.as_deref().unwrap_or_default(),
            body.picture,
        )
        .await
    {
        Ok(outcome) => {
            let (status, message) = if outcome.created {
                (StatusCode::CREATED, "New Google user created and logged in")
            } else {
                (StatusCode::OK, "Google login successful")
            };
            signed_in_response(status, message, &outcome.account, &outcome.session)
        }
        Err(err) => err.into_response(),
    }
}

/// GET /userFetcher. The account directory the voting UI reads. Every
/// record passes through redaction. Route name kept for client
/// compatibility.
async fn handle_user_fetcher(State(state): State<AppState>) -> Response {
    match state.flow.list_accounts().await {
        Ok(accounts) => {
            let users: Vec<_> = accounts.iter().map(Account::redacted).collect();
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "success": true,
                    "users": users,
                })),
            )
                .into_response()
        }
        Err(err) => err.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::store::SqliteCredentialStore;
    use crate::mailer::RecordingMailer;
    use crate::session::SESSION_COOKIE;
    use crate::token::epoch_secs;
    use http_body_util::BodyExt;

    struct Harness {
        state: AppState,
        store: Arc<SqliteCredentialStore>,
        mailer: Arc<RecordingMailer>,
    }

    fn harness() -> Harness {
        let store = Arc::new(SqliteCredentialStore::in_memory().unwrap());
        let mailer = Arc::new(RecordingMailer::new());
        let sessions = SessionIssuer::new("gateway-test-secret");
        let flow = Arc::new(AuthFlow::new(
            store.clone(),
            mailer.clone(),
            sessions,
            "http://localhost:5173",
        ));
        Harness {
            state: AppState { flow },
            store,
            mailer,
        }
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn set_cookie_of(response: &Response) -> String {
        response
            .headers()
            .get(header::SET_COOKIE)
            .expect("Set-Cookie header")
            .to_str()
            .unwrap()
            .to_string()
    }

    /// The bare `token=...` pair from a full Set-Cookie string.
    fn cookie_pair(set_cookie: &str) -> &str {
        set_cookie.split(';').next().unwrap()
    }

    fn signup_body(email: &str, password: &str, name: &str) -> SignupBody {
        SignupBody {
            email: Some(email.into()),
            password: Some(password.into()),
            name: Some(name.into()),
        }
    }

    async fn signup(h: &Harness, email: &str, password: &str, name: &str) -> Response {
        handle_signup(
            State(h.state.clone()),
            Ok(Json(signup_body(email, password, name))),
        )
        .await
    }

    async fn login(h: &Harness, email: &str, password: &str) -> Response {
        handle_login(
            State(h.state.clone()),
            Ok(Json(LoginBody {
                email: Some(email.into()),
                password: Some(password.into()),
            })),
        )
        .await
    }

    async fn verification_code_of(h: &Harness, email: &str) -> String {
        h.store
            .find_by_email(email)
            .await
            .unwrap()
            .unwrap()
            .verification_token
            .unwrap()
    }

    #[test]
    fn security_body_limit_is_64kb() {
        assert_eq!(MAX_BODY_SIZE, 65_536);
    }

    #[test]
    fn security_timeout_is_30_seconds() {
        assert_eq!(REQUEST_TIMEOUT_SECS, 30);
    }

    #[test]
    fn app_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }

    #[test]
    fn signup_body_fields_are_optional_at_parse_time() {
        let parsed: SignupBody = serde_json::from_str("{}").unwrap();
        assert!(parsed.email.is_none());
        assert!(parsed.password.is_none());
        assert!(parsed.name.is_none());

        let parsed: SignupBody =
            serde_json::from_str(r#"{"email":"a@b.c","password":"pw","name":"A"}"#).unwrap();
        assert_eq!(parsed.email.as_deref(), Some("a@b.c"));
    }

    #[test]
    fn cors_layer_rejects_a_malformed_origin() {
        assert!(cors_layer(&["http://localhost:5173".into()]).is_ok());
        assert!(cors_layer(&["http://bad\norigin".into()]).is_err());
    }

    #[tokio::test]
    async fn signup_sets_a_cookie_and_redacts_the_account() {
        let h = harness();
        let response = signup(&h, "alice@example.com", "Secret123", "Alice").await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let cookie = set_cookie_of(&response);
        assert!(cookie.starts_with("token="));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=None"));

        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "User created successfully");
        assert_eq!(body["user"]["email"], "alice@example.com");
        assert_eq!(body["user"]["isVerified"], false);
        assert!(body["user"].get("password").is_none());
        assert!(body["user"].get("passwordHash").is_none());
        assert!(body["user"].get("verificationToken").is_none());

        assert_eq!(h.mailer.count(), 1);
    }

    #[tokio::test]
    async fn signup_with_a_missing_field_is_rejected() {
        let h = harness();
        let response = handle_signup(
            State(h.state.clone()),
            Ok(Json(SignupBody {
                email: Some("alice@example.com".into()),
                password: None,
                name: Some("Alice".into()),
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "All fields are required");
    }

    #[tokio::test]
    async fn duplicate_signup_is_rejected() {
        let h = harness();
        signup(&h, "alice@example.com", "Secret123", "Alice").await;
        let response = signup(&h, "ALICE@example.com", "Other456", "Imposter").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["message"], "User already exists");
    }

    #[tokio::test]
    async fn register_verify_login_round_trip() {
        let h = harness();
        let response = signup(&h, "alice@example.com", "Secret123", "Alice").await;
        assert_eq!(response.status(), StatusCode::CREATED);

        // Unverified login is blocked with the redirect signal.
        let response = login(&h, "alice@example.com", "Secret123").await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
        let body = body_json(response).await;
        assert_eq!(body["message"], "Email not verified");
        assert_eq!(body["redirectToVerify"], true);
        assert!(body["userId"].is_string());

        let code = verification_code_of(&h, "alice@example.com").await;
        let response = handle_verify_email(
            State(h.state.clone()),
            Ok(Json(CodeBody { code: Some(code) })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Email verified successfully");
        assert_eq!(body["user"]["isVerified"], true);

        let response = login(&h, "alice@example.com", "Secret123").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(set_cookie_of(&response).starts_with("token="));
        let body = body_json(response).await;
        assert_eq!(body["message"], "Login successful");
    }

    #[tokio::test]
    async fn login_with_unknown_email_is_invalid_credentials() {
        let h = harness();
        let response = login(&h, "nobody@example.com", "whatever").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Invalid credentials");
    }

    #[tokio::test]
    async fn stale_verification_code_is_rejected() {
        let h = harness();
        let response = handle_verify_email(
            State(h.state.clone()),
            Ok(Json(CodeBody {
                code: Some("000000".into()),
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Invalid or expired verification code");
    }

    #[tokio::test]
    async fn logout_clears_the_cookie() {
        let response = handle_logout().await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(set_cookie_of(&response), clear_session_cookie());
        let body = body_json(response).await;
        assert_eq!(body["message"], "Logged out successfully");

        // Idempotent: a second logout without any session answers the same.
        let again = handle_logout().await;
        assert_eq!(again.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn issue_and_clear_cookies_share_their_attributes() {
        let h = harness();
        let response = signup(&h, "alice@example.com", "Secret123", "Alice").await;
        let issued = set_cookie_of(&response);
        let cleared = clear_session_cookie();

        let issued_attrs: Vec<&str> = issued.split("; ").skip(2).collect();
        let cleared_attrs: Vec<&str> = cleared.split("; ").skip(2).collect();
        assert_eq!(issued_attrs, cleared_attrs);
        assert!(issued.contains("Max-Age=604800"));
        assert!(cleared.starts_with(&format!("{SESSION_COOKIE}=; Max-Age=0")));
    }

    #[tokio::test]
    async fn check_auth_requires_a_session_cookie() {
        let h = harness();
        let response = handle_check_auth(State(h.state.clone()), HeaderMap::new()).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Unauthorized - no token provided");

        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("token=garbage"));
        let response = handle_check_auth(State(h.state.clone()), headers).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Unauthorized - invalid token");
    }

    #[tokio::test]
    async fn check_auth_returns_the_cookie_holder() {
        let h = harness();
        let response = signup(&h, "alice@example.com", "Secret123", "Alice").await;
        let pair = cookie_pair(&set_cookie_of(&response)).to_string();

        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(&pair).unwrap());
        let response = handle_check_auth(State(h.state.clone()), headers).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["user"]["email"], "alice@example.com");
        assert!(body["user"].get("passwordHash").is_none());
    }

    #[tokio::test]
    async fn forgot_then_reset_password_round_trip() {
        let h = harness();
        signup(&h, "alice@example.com", "old password", "Alice").await;
        let code = verification_code_of(&h, "alice@example.com").await;
        handle_verify_email(
            State(h.state.clone()),
            Ok(Json(CodeBody { code: Some(code) })),
        )
        .await;

        let response = handle_forgot_password(
            State(h.state.clone()),
            Ok(Json(EmailBody {
                email: Some("alice@example.com".into()),
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Password reset link sent to your email");

        let token = h
            .store
            .find_by_email("alice@example.com")
            .await
            .unwrap()
            .unwrap()
            .reset_token
            .unwrap();
        let response = handle_reset_password(
            State(h.state.clone()),
            Path(token),
            Ok(Json(ResetBody {
                password: Some("new password".into()),
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Password reset successfully");

        assert_eq!(
            login(&h, "alice@example.com", "old password").await.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            login(&h, "alice@example.com", "new password").await.status(),
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn forgot_password_for_unknown_email_is_not_found() {
        let h = harness();
        let response = handle_forgot_password(
            State(h.state.clone()),
            Ok(Json(EmailBody {
                email: Some("ghost@example.com".into()),
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["message"], "User not found");
    }

    #[tokio::test]
    async fn expired_reset_token_is_rejected() {
        let h = harness();
        signup(&h, "alice@example.com", "old password", "Alice").await;

        // Arm a token already at its deadline; the strict bound counts that
        // as expired.
        let mut account = h
            .store
            .find_by_email("alice@example.com")
            .await
            .unwrap()
            .unwrap();
        account.set_reset_token("ab".repeat(20), epoch_secs());
        h.store.save(&account).await.unwrap();

        let response = handle_reset_password(
            State(h.state.clone()),
            Path("ab".repeat(20)),
            Ok(Json(ResetBody {
                password: Some("new password".into()),
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Invalid or expired reset token");
    }

    #[tokio::test]
    async fn google_login_distinguishes_created_from_existing() {
        let h = harness();
        let first = handle_google_login(
            State(h.state.clone()),
            Ok(Json(GoogleBody {
                email: Some("bob@example.com".into()),
                name: Some("Bob".into()),
                picture: Some("https://pics.example/bob.png".into()),
            })),
        )
        .await;
        assert_eq!(first.status(), StatusCode::CREATED);
        assert!(set_cookie_of(&first).starts_with("token="));
        let body = body_json(first).await;
        assert_eq!(body["message"], "New Google user created and logged in");
        assert_eq!(body["user"]["isVerified"], true);
        assert_eq!(body["user"]["provider"], "federated");

        let second = handle_google_login(
            State(h.state.clone()),
            Ok(Json(GoogleBody {
                email: Some("bob@example.com".into()),
                name: Some("Bob".into()),
                picture: None,
            })),
        )
        .await;
        assert_eq!(second.status(), StatusCode::OK);
        assert!(set_cookie_of(&second).starts_with("token="));
        let body = body_json(second).await;
        assert_eq!(body["message"], "Google login successful");
    }

    #[tokio::test]
    async fn google_login_requires_email_and_name() {
        let h = harness();
        let response = handle_google_login(
            State(h.state.clone()),
            Ok(Json(GoogleBody {
                email: Some("bob@example.com".into()),
                name: None,
                picture: None,
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Missing required Google user info");
    }

    #[tokio::test]
    async fn user_fetcher_lists_redacted_accounts() {
        let h = harness();
        signup(&h, "alice@example.com", "Secret123", "Alice").await;
        handle_google_login(
            State(h.state.clone()),
            Ok(Json(GoogleBody {
                email: Some("bob@example.com".into()),
                name: Some("Bob".into()),
                picture: None,
            })),
        )
        .await;

        let response = handle_user_fetcher(State(h.state.clone())).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        let users = body["users"].as_array().unwrap();
        assert_eq!(users.len(), 2);
        for user in users {
            assert!(user.get("passwordHash").is_none());
            assert!(user.get("verificationToken").is_none());
            assert!(user.get("resetToken").is_none());
        }
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let body = handle_health().await;
        assert_eq!(body.0["status"], "ok");
    }
}
