// Server-side sessions
// Decision: In-memory store keyed by a random id carried in an HTTP-only cookie
// Decision: Handlers mutate a shared handle; the middleware persists it after the response
// Decision: One flash slot per key, kept for exactly one following request
//
// The session is the only state carried between requests: the logged-in
// principal, the `authenticated` flag read by the session policy, the OAuth
// state for the pending authorization, and one-shot flash messages.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use portico_core::{Account, AccountKind, FlashMessage};
use rand::Rng;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::error::ApiError;

pub const SESSION_COOKIE: &str = "portico.sid";

const FLASH_ERROR: &str = "error";
const FLASH_FORM: &str = "form";

/// Account a session is logged in as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub kind: AccountKind,
    pub account_id: Uuid,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionData {
    pub authenticated: bool,
    pub principal: Option<Principal>,
    pub passport_id: Option<Uuid>,
    pub oauth_state: Option<String>,
    flash: HashMap<String, Value>,
}

impl SessionData {
    pub fn is_empty(&self) -> bool {
        *self == SessionData::default()
    }
}

/// Request-scoped handle to the session.
#[derive(Debug, Clone, Default)]
pub struct Session {
    inner: Arc<Mutex<SessionData>>,
    /// Flash keys that arrived with the request and were not set again
    carried: Arc<Mutex<HashSet<String>>>,
}

impl Session {
    pub fn new(data: SessionData) -> Self {
        let carried = data.flash.keys().cloned().collect();
        Self {
            inner: Arc::new(Mutex::new(data)),
            carried: Arc::new(Mutex::new(carried)),
        }
    }

    /// Data to persist after the request: flashes carried in from the
    /// previous request have had their turn and are dropped.
    pub fn finish(&self) -> SessionData {
        let carried = std::mem::take(&mut *self.carried.lock());
        let mut data = self.inner.lock();
        data.flash.retain(|key, _| !carried.contains(key));
        data.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.lock().authenticated
    }

    pub fn set_authenticated(&self, authenticated: bool) {
        self.inner.lock().authenticated = authenticated;
    }

    pub fn principal(&self) -> Option<Principal> {
        self.inner.lock().principal
    }

    pub fn passport_id(&self) -> Option<Uuid> {
        self.inner.lock().passport_id
    }

    pub fn set_passport(&self, passport_id: Option<Uuid>) {
        self.inner.lock().passport_id = passport_id;
    }

    /// Serialize the account into the session and mark it authenticated.
    pub fn login(&self, account: &Account, passport_id: Option<Uuid>) {
        let mut data = self.inner.lock();
        data.principal = Some(Principal {
            kind: account.kind,
            account_id: account.id,
        });
        data.passport_id = passport_id;
        data.authenticated = true;
    }

    pub fn logout(&self) {
        let mut data = self.inner.lock();
        data.principal = None;
        data.passport_id = None;
        data.oauth_state = None;
        data.authenticated = false;
    }

    pub fn set_oauth_state(&self, state: String) {
        self.inner.lock().oauth_state = Some(state);
    }

    /// Consume the pending OAuth state.
    pub fn take_oauth_state(&self) -> Option<String> {
        self.inner.lock().oauth_state.take()
    }

    /// Set the flash under `key`, replacing any previous value.
    pub fn flash(&self, key: &str, value: Value) {
        self.carried.lock().remove(key);
        self.inner.lock().flash.insert(key.to_string(), value);
    }

    /// Read and clear the flash under `key`.
    pub fn take_flash(&self, key: &str) -> Option<Value> {
        self.inner.lock().flash.remove(key)
    }

    pub fn flash_error(&self, message: FlashMessage) {
        self.flash(FLASH_ERROR, Value::String(message.key().to_string()));
    }

    pub fn take_flash_error(&self) -> Option<String> {
        self.take_flash(FLASH_ERROR)
            .and_then(|v| v.as_str().map(str::to_string))
    }

    pub fn flash_form(&self, form: Value) {
        self.flash(FLASH_FORM, form);
    }

    pub fn take_flash_form(&self) -> Option<Value> {
        self.take_flash(FLASH_FORM)
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Session>().cloned().ok_or_else(|| {
            tracing::error!("Session extractor used on a route without the session layer");
            ApiError::internal()
        })
    }
}

struct StoredSession {
    data: SessionData,
    expires_at: DateTime<Utc>,
}

/// In-memory session store
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, StoredSession>>>,
    max_age: Duration,
    cookie_secure: bool,
}

impl SessionStore {
    pub fn new(max_age: Duration, cookie_secure: bool) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            max_age,
            cookie_secure,
        }
    }

    fn expiry(&self) -> DateTime<Utc> {
        let max_age = chrono::Duration::from_std(self.max_age).unwrap_or(chrono::Duration::MAX);
        Utc::now()
            .checked_add_signed(max_age)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Load a live session; expired entries are dropped on access.
    pub fn load(&self, id: &str) -> Option<SessionData> {
        let now = Utc::now();
        {
            let sessions = self.sessions.read();
            match sessions.get(id) {
                Some(stored) if stored.expires_at > now => return Some(stored.data.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        self.sessions.write().remove(id);
        None
    }

    pub fn save(&self, id: &str, data: SessionData) {
        let expires_at = self.expiry();
        self.sessions
            .write()
            .insert(id.to_string(), StoredSession { data, expires_at });
    }

    /// Remove all expired sessions, returning how many were dropped.
    pub fn sweep(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at > now);
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cookie(&self, id: String) -> Cookie<'static> {
        let max_age = time::Duration::try_from(self.max_age).unwrap_or(time::Duration::MAX);
        Cookie::build((SESSION_COOKIE, id))
            .path("/")
            .http_only(true)
            .secure(self.cookie_secure)
            .same_site(SameSite::Lax)
            .max_age(max_age)
            .build()
    }
}

/// Random session id (32 bytes, hex encoded)
pub fn generate_session_id() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}

/// Attach a `Session` to every request and persist it afterwards.
///
/// Sessions are only stored (and the cookie only set) once they carry data,
/// so anonymous requests leave nothing behind.
pub async fn session_layer(
    State(store): State<SessionStore>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let existing_id = jar.get(SESSION_COOKIE).map(|c| c.value().to_string());
    let loaded = existing_id.as_deref().and_then(|id| store.load(id));
    let is_live = loaded.is_some();

    let session = Session::new(loaded.unwrap_or_default());
    request.extensions_mut().insert(session.clone());

    let response = next.run(request).await;
    let data = session.finish();

    match existing_id.filter(|_| is_live) {
        Some(id) => {
            store.save(&id, data);
            response
        }
        None if data.is_empty() => response,
        None => {
            let id = generate_session_id();
            tracing::debug!("Starting new session");
            store.save(&id, data);
            (jar.add(store.cookie(id)), response).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::header, routing::get, Router};
    use axum::http::Request as HttpRequest;
    use tower::ServiceExt;

    fn store() -> SessionStore {
        SessionStore::new(Duration::from_secs(60), false)
    }

    #[test]
    fn test_session_id_format() {
        let id = generate_session_id();
        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, generate_session_id());
    }

    #[test]
    fn test_flash_is_one_shot() {
        let session = Session::default();
        session.flash_error(FlashMessage::PasswordWrong);
        session.flash_error(FlashMessage::Generic);

        assert_eq!(
            session.take_flash_error().as_deref(),
            Some("Error.Passport.Generic")
        );
        assert_eq!(session.take_flash_error(), None);
    }

    #[test]
    fn test_repeated_flashes_keep_one_slot() {
        let mut data = SessionData::default();
        for attempt in 0..50 {
            let session = Session::new(data);
            session.flash_error(FlashMessage::PasswordWrong);
            session.flash_form(serde_json::json!({ "identifier": format!("jane{attempt}") }));
            data = session.finish();
        }

        assert_eq!(data.flash.len(), 2);
        assert_eq!(data.flash[FLASH_FORM]["identifier"], "jane49");
    }

    #[test]
    fn test_unread_flash_expires_after_next_request() {
        let session = Session::default();
        session.flash_error(FlashMessage::PasswordWrong);
        let data = session.finish();
        assert!(!data.is_empty());

        // Next request ignores the flash
        let next = Session::new(data);
        next.set_authenticated(true);
        let data = next.finish();
        assert!(data.flash.is_empty());

        // A request that reads it consumes it
        let session = Session::default();
        session.flash_error(FlashMessage::PasswordWrong);
        let reader = Session::new(session.finish());
        assert_eq!(
            reader.take_flash_error().as_deref(),
            Some("Error.Passport.Password.Wrong")
        );
        assert!(reader.finish().is_empty());
    }

    #[test]
    fn test_login_logout() {
        let session = Session::default();
        let now = Utc::now();
        let account = Account {
            id: Uuid::now_v7(),
            kind: AccountKind::Admin,
            username: "root".to_string(),
            email: None,
            created_at: now,
            updated_at: now,
        };

        session.login(&account, None);
        assert!(session.is_authenticated());
        assert_eq!(
            session.principal(),
            Some(Principal {
                kind: AccountKind::Admin,
                account_id: account.id
            })
        );

        session.logout();
        assert!(!session.is_authenticated());
        assert!(session.principal().is_none());
    }

    #[test]
    fn test_expired_sessions_are_dropped() {
        let store = SessionStore::new(Duration::ZERO, false);
        store.save("abc", SessionData::default());
        assert!(store.load("abc").is_none());
        assert!(store.is_empty());

        store.save("def", SessionData::default());
        assert_eq!(store.sweep(), 1);
    }

    #[tokio::test]
    async fn test_layer_sets_cookie_only_when_session_has_data() {
        let store = store();
        let app = Router::new()
            .route("/anon", get(|| async { "ok" }))
            .route(
                "/touch",
                get(|session: Session| async move {
                    session.set_authenticated(true);
                    "ok"
                }),
            )
            .layer(axum::middleware::from_fn_with_state(
                store.clone(),
                session_layer,
            ));

        let response = app
            .clone()
            .oneshot(HttpRequest::builder().uri("/anon").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.headers().get(header::SET_COOKIE).is_none());
        assert!(store.is_empty());

        let response = app
            .oneshot(HttpRequest::builder().uri("/touch").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(cookie.starts_with("portico.sid="));
        assert!(cookie.contains("HttpOnly"));
        assert_eq!(store.len(), 1);
    }
}
