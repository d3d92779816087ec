// Integration tests for the Portico HTTP surface
// Run with: cargo test -p portico-api --test integration_test
// Uses in-memory storage, no database or provider credentials needed

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use base64::{engine::general_purpose, Engine as _};
use http_body_util::BodyExt;
use async_trait::async_trait;
use portico_api::config::{AdminSeedConfig, Environment};
use portico_api::session::SESSION_COOKIE;
use portico_api::strategy::{ProviderIdentity, Strategy, StrategyRegistry};
use portico_api::{build_app, AppConfig, AppState};
use portico_core::{Profile, ProfileEmail, Protocol, Tokens};
use portico_storage::StorageBackend;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use url::Url;

const ADMIN_EMAIL: &str = "admin@portico.test";
const ADMIN_PASSWORD: &str = "admin1234";

async fn test_app() -> Router {
    let config = AppConfig {
        admin: Some(AdminSeedConfig {
            email: ADMIN_EMAIL.to_string(),
            password: ADMIN_PASSWORD.to_string(),
        }),
        ..Default::default()
    };
    let state = AppState::new(config, StorageBackend::in_memory());
    state.seed_admin().await.unwrap();
    build_app(state)
}

fn basic(user: &str, password: &str) -> String {
    format!(
        "Basic {}",
        general_purpose::STANDARD.encode(format!("{}:{}", user, password))
    )
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn with_cookie(mut request: Request<Body>, cookie: &str) -> Request<Body> {
    request
        .headers_mut()
        .insert(header::COOKIE, cookie.parse().unwrap());
    request
}

/// `name=value` of the session cookie set by a response
fn session_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(SESSION_COOKIE))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

fn location(response: &Response) -> Option<&str> {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
}

async fn json_body(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn register(app: &Router, username: &str, email: &str, password: &str) -> Response {
    app.clone()
        .oneshot(post_json(
            "/register",
            json!({ "username": username, "email": email, "password": password }),
        ))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = test_app().await;
    let response = app.oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["storage"], "memory");
}

#[tokio::test]
async fn test_register_employee() {
    let app = test_app().await;

    let response = register(&app, "jane", "jane@example.com", "secret123").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["username"], "jane");
    assert_eq!(body["email"], "jane@example.com");
    assert!(body.get("password").is_none());
}

#[tokio::test]
async fn test_register_duplicate_email_is_rejected() {
    let app = test_app().await;

    let first = register(&app, "jane", "jane@example.com", "secret123").await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = register(&app, "jane2", "jane@example.com", "secret123").await;
    assert_eq!(second.status(), StatusCode::BAD_REQUEST);
    let body = json_body(second).await;
    assert!(body["invalid_attributes"].is_array());
}

#[tokio::test]
async fn test_basic_auth_me() {
    let app = test_app().await;
    register(&app, "jane", "jane@example.com", "secret123").await;

    let mut request = get("/employee/me");
    request.headers_mut().insert(
        header::AUTHORIZATION,
        basic("jane@example.com", "secret123").parse().unwrap(),
    );
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["email"], "jane@example.com");
}

#[tokio::test]
async fn test_basic_auth_bad_password() {
    let app = test_app().await;
    register(&app, "jane", "jane@example.com", "secret123").await;

    let mut request = get("/employee/me");
    request.headers_mut().insert(
        header::AUTHORIZATION,
        basic("jane", "wrong-password").parse().unwrap(),
    );
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json_body(response).await;
    assert_eq!(body["error"], "Could not authenticate jane");
}

#[tokio::test]
async fn test_protected_route_without_session() {
    let app = test_app().await;
    let response = app.oneshot(get("/employee/me")).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json_body(response).await;
    assert_eq!(body["error"], "You are not permitted to perform this action.");
}

#[tokio::test]
async fn test_local_login_session_and_logout() {
    let app = test_app().await;
    let created = json_body(register(&app, "jane", "jane@example.com", "secret123").await).await;
    let id = created["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(post_json(
            "/auth/local",
            json!({ "identifier": "jane", "password": "secret123" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = session_cookie(&response).expect("session cookie");
    let body = json_body(response).await;
    assert_eq!(body["id"], id.as_str());

    let response = app
        .clone()
        .oneshot(with_cookie(get(&format!("/employee/{}", id)), &cookie))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(with_cookie(get("/logout"), &cookie))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), Some("/"));

    let response = app
        .oneshot(with_cookie(get(&format!("/employee/{}", id)), &cookie))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_login_with_next_redirects() {
    let app = test_app().await;
    register(&app, "jane", "jane@example.com", "secret123").await;

    let response = app
        .oneshot(post_json(
            "/auth/local?next=/dashboard",
            json!({ "identifier": "jane@example.com", "password": "secret123" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), Some("/dashboard"));
    assert!(session_cookie(&response).is_some());
}

#[tokio::test]
async fn test_failed_login_action_redirects_to_login() {
    let app = test_app().await;
    register(&app, "jane", "jane@example.com", "secret123").await;

    let response = app
        .oneshot(post_json(
            "/auth/local/login",
            json!({ "identifier": "jane", "password": "wrong-password" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), Some("/login"));
    // The flash lives in a fresh session
    assert!(session_cookie(&response).is_some());
}

#[tokio::test]
async fn test_failed_login_without_action_answers_flash_key() {
    let app = test_app().await;
    register(&app, "jane", "jane@example.com", "secret123").await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/auth/local",
            json!({ "identifier": "jane", "password": "wrong-password" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json_body(response).await;
    assert_eq!(body["error"], "Error.Passport.Password.Wrong");

    let response = app
        .oneshot(post_json(
            "/auth/local",
            json!({ "identifier": "nobody@example.com", "password": "whatever1" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json_body(response).await;
    assert_eq!(body["error"], "Error.Passport.Email.NotFound");
}

#[tokio::test]
async fn test_failed_register_action_redirects_to_register() {
    let app = test_app().await;
    register(&app, "jane", "jane@example.com", "secret123").await;

    let response = app
        .oneshot(post_json(
            "/auth/local/register",
            json!({ "username": "jane", "email": "other@example.com", "password": "secret123" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), Some("/register"));
}

#[tokio::test]
async fn test_form_login() {
    let app = test_app().await;
    register(&app, "jane", "jane@example.com", "secret123").await;

    let request = Request::builder()
        .method("POST")
        .uri("/auth/local")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("identifier=jane&password=secret123"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_employee_session_cannot_use_admin_routes() {
    let app = test_app().await;
    register(&app, "jane", "jane@example.com", "secret123").await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/auth/local",
            json!({ "identifier": "jane", "password": "secret123" }),
        ))
        .await
        .unwrap();
    let cookie = session_cookie(&response).expect("session cookie");

    let response = app
        .oneshot(with_cookie(get("/admin/me"), &cookie))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_login_and_me() {
    let app = test_app().await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/admin/auth/local",
            json!({ "identifier": ADMIN_EMAIL, "password": ADMIN_PASSWORD }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = session_cookie(&response).expect("session cookie");

    let response = app
        .clone()
        .oneshot(with_cookie(get("/admin/me"), &cookie))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["email"], ADMIN_EMAIL);
    assert_eq!(body["kind"], "admin");

    // Admin credentials do not log into the employee namespace
    let response = app
        .oneshot(post_json(
            "/auth/local",
            json!({ "identifier": ADMIN_EMAIL, "password": ADMIN_PASSWORD }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_register_requires_admin() {
    let app = test_app().await;
    let body = json!({ "email": "second@portico.test", "password": "admin5678" });

    let response = app
        .clone()
        .oneshot(post_json("/admin/register", body.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let mut request = post_json("/admin/register", body);
    request.headers_mut().insert(
        header::AUTHORIZATION,
        basic(ADMIN_EMAIL, ADMIN_PASSWORD).parse().unwrap(),
    );
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["username"], "second@portico.test");
}

#[tokio::test]
async fn test_my_passports_lists_local() {
    let app = test_app().await;
    register(&app, "jane", "jane@example.com", "secret123").await;

    let mut request = get("/employee/me/passports");
    request.headers_mut().insert(
        header::AUTHORIZATION,
        basic("jane", "secret123").parse().unwrap(),
    );
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let passports = body["data"].as_array().unwrap();
    assert_eq!(passports.len(), 1);
    assert_eq!(passports[0]["protocol"], "local");
    assert!(passports[0].get("password").is_none());
}

#[tokio::test]
async fn test_unknown_provider_redirects_to_login() {
    let app = test_app().await;
    let response = app.oneshot(get("/auth/nowhere")).await.unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), Some("/login"));
}

#[tokio::test]
async fn test_provider_callback_without_state_is_rejected() {
    let app = test_app().await;
    let response = app
        .oneshot(get("/auth/nowhere/callback?code=abc"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json_body(response).await;
    assert_eq!(body["error"], "Error.Passport.Generic");
}

#[tokio::test]
async fn test_disconnect_local_requires_login() {
    let app = test_app().await;
    let request = Request::builder()
        .method("DELETE")
        .uri("/auth/local")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

fn with_basic(mut request: Request<Body>, user: &str, password: &str) -> Request<Body> {
    request
        .headers_mut()
        .insert(header::AUTHORIZATION, basic(user, password).parse().unwrap());
    request
}

#[tokio::test]
async fn test_repeated_failures_keep_a_single_flash() {
    let app = test_app().await;
    register(&app, "jane", "jane@example.com", "secret123").await;

    let failed_login = |password: &str| {
        post_json(
            "/auth/local",
            json!({ "identifier": "jane", "password": password }),
        )
    };

    let response = app
        .clone()
        .oneshot(failed_login("wrong-0"))
        .await
        .unwrap();
    let cookie = session_cookie(&response).expect("session cookie");

    for attempt in 1..50 {
        let response = app
            .clone()
            .oneshot(with_cookie(failed_login(&format!("wrong-{attempt}")), &cookie))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    let response = app
        .clone()
        .oneshot(with_cookie(get("/flash"), &cookie))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["error"], "Error.Passport.Password.Wrong");
    assert_eq!(body["form"]["identifier"], "jane");
    assert!(body["form"].get("password").is_none());

    // Reading the flash consumes it
    let response = app
        .oneshot(with_cookie(get("/flash"), &cookie))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert!(body["error"].is_null());
    assert!(body["form"].is_null());
}

#[tokio::test]
async fn test_unread_flash_is_gone_after_next_request() {
    let app = test_app().await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/auth/local/login",
            json!({ "identifier": "nobody", "password": "whatever1" }),
        ))
        .await
        .unwrap();
    let cookie = session_cookie(&response).expect("session cookie");

    app.clone()
        .oneshot(with_cookie(get("/health"), &cookie))
        .await
        .unwrap();

    let response = app
        .oneshot(with_cookie(get("/flash"), &cookie))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert!(body["error"].is_null());
}

#[tokio::test]
async fn test_basic_auth_requires_https_in_production() {
    let config = AppConfig {
        environment: Environment::Production,
        ..Default::default()
    };
    let app = build_app(AppState::new(config, StorageBackend::in_memory()));
    register(&app, "jane", "jane@example.com", "secret123").await;

    let response = app
        .clone()
        .oneshot(with_basic(get("/employee/me"), "jane", "secret123"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json_body(response).await;
    assert_eq!(
        body["error"],
        "https required for basic auth. refusing login request"
    );

    let mut request = with_basic(get("/employee/me"), "jane", "secret123");
    request
        .headers_mut()
        .insert("X-Forwarded-Proto", "https".parse().unwrap());
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["username"], "jane");
}

#[tokio::test]
async fn test_employee_session_cannot_read_admin_accounts() {
    let app = test_app().await;
    register(&app, "jane", "jane@example.com", "secret123").await;

    let response = app
        .clone()
        .oneshot(with_basic(get("/admin/me"), ADMIN_EMAIL, ADMIN_PASSWORD))
        .await
        .unwrap();
    let admin = json_body(response).await;
    let admin_id = admin["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(post_json(
            "/auth/local",
            json!({ "identifier": "jane", "password": "secret123" }),
        ))
        .await
        .unwrap();
    let cookie = session_cookie(&response).expect("session cookie");

    let response = app
        .clone()
        .oneshot(with_cookie(get(&format!("/admin/{}", admin_id)), &cookie))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .oneshot(with_basic(
            get(&format!("/admin/{}", admin_id)),
            ADMIN_EMAIL,
            ADMIN_PASSWORD,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

/// Provider that accepts the code `good-code` and always returns the same user
struct FakeProvider;

#[async_trait]
impl Strategy for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    fn protocol(&self) -> Protocol {
        Protocol::OAuth2
    }

    fn authorization_url(&self, state: &str, redirect_uri: &str) -> anyhow::Result<String> {
        let url = Url::parse_with_params(
            "https://fake.test/authorize",
            &[("state", state), ("redirect_uri", redirect_uri)],
        )?;
        Ok(url.into())
    }

    async fn authenticate(&self, code: &str, _redirect_uri: &str) -> anyhow::Result<ProviderIdentity> {
        if code != "good-code" {
            anyhow::bail!("bad code");
        }
        Ok(ProviderIdentity {
            identifier: Some("4242".to_string()),
            profile: Profile {
                provider: Some("fake".to_string()),
                username: Some("faker".to_string()),
                display_name: None,
                emails: vec![ProfileEmail {
                    value: "faker@example.com".to_string(),
                    verified: true,
                }],
            },
            tokens: Tokens {
                access_token: Some("token".to_string()),
                ..Default::default()
            },
        })
    }
}

#[tokio::test]
async fn test_provider_login_round_trip() {
    let strategies = StrategyRegistry::default()
        .with_local(true)
        .with_strategy(Arc::new(FakeProvider));
    let state =
        AppState::with_strategies(AppConfig::default(), StorageBackend::in_memory(), strategies);
    let app = build_app(state);

    let response = app.clone().oneshot(get("/auth/fake")).await.unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    let cookie = session_cookie(&response).expect("session cookie");
    let authorize = Url::parse(location(&response).unwrap()).unwrap();
    assert_eq!(authorize.host_str(), Some("fake.test"));
    let oauth_state = authorize
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .expect("state parameter");

    let callback = format!("/auth/fake/callback?code=good-code&state={}", oauth_state);
    let response = app
        .clone()
        .oneshot(with_cookie(get(&callback), &cookie))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["username"], "faker");
    assert_eq!(body["email"], "faker@example.com");

    let response = app
        .clone()
        .oneshot(with_cookie(get("/employee/me"), &cookie))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["username"], "faker");

    // The state is single use
    let response = app
        .oneshot(with_cookie(get(&callback), &cookie))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json_body(response).await;
    assert_eq!(body["error"], "Error.Passport.Generic");
}
