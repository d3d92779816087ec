// Router assembly
// Decision: Employees own the root namespace, admins live under /admin with the same auth surface
// Decision: Policies attach with route_layer so unmatched paths still 404

use axum::{
    extract::State,
    middleware,
    routing::{get, post},
    Json, Router,
};
use portico_core::{AccountKind, AccountView, PassportView, Protocol};
use serde::Serialize;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::controllers::{accounts, auth, ListResponse};
use crate::passport::CallbackParams;
use crate::policies::{basic_auth, session_auth};
use crate::protocols::RegisterRequest;
use crate::session::session_layer;
use crate::state::{AppState, KindState};

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        auth::logout,
        auth::flash,
        auth::provider,
        auth::callback,
        auth::disconnect,
        accounts::create,
        accounts::me,
        accounts::find_one,
        accounts::passports,
    ),
    components(
        schemas(
            AccountKind, AccountView, PassportView, Protocol,
            RegisterRequest, CallbackParams, auth::FlashResponse,
            ListResponse<PassportView>,
        )
    ),
    tags(
        (name = "auth", description = "Login, logout and provider callbacks"),
        (name = "accounts", description = "Admin and employee accounts (admin routes mirror these under /admin)")
    ),
    info(
        title = "Portico API",
        version = "0.1.0",
        description = "Local and third-party authentication for admin and employee accounts",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    )
)]
pub struct ApiDoc;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    storage: &'static str,
    providers: Vec<String>,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        storage: if state.storage.is_dev_mode() {
            "memory"
        } else {
            "postgres"
        },
        providers: state.passport.strategies().providers(),
    })
}

/// `/auth/...` routes for one account kind
fn auth_routes(state: KindState) -> Router {
    Router::new()
        .route("/auth/local", post(auth::callback).delete(auth::disconnect))
        .route("/auth/local/:action", post(auth::callback))
        .route("/auth/:provider", get(auth::provider).delete(auth::disconnect))
        .route("/auth/:provider/callback", get(auth::callback))
        .route("/auth/:provider/:action", get(auth::callback))
        .with_state(state)
}

/// Registration. Admin registration sits behind the policies so an admin
/// can authenticate by session or Basic credentials.
fn register_routes(state: KindState) -> Router {
    let router = Router::new().route("/register", post(accounts::create));
    let router = match state.kind {
        AccountKind::Employee => router,
        AccountKind::Admin => router
            .route_layer(middleware::from_fn(session_auth))
            .route_layer(middleware::from_fn_with_state(state.clone(), basic_auth)),
    };
    router.with_state(state)
}

/// `/me`, `/me/passports` and `/:id`, behind basic auth then the session policy
fn account_routes(state: KindState) -> Router {
    Router::new()
        .route("/me", get(accounts::me))
        .route("/me/passports", get(accounts::passports))
        .route("/:id", get(accounts::find_one))
        .route_layer(middleware::from_fn(session_auth))
        .route_layer(middleware::from_fn_with_state(state.clone(), basic_auth))
        .with_state(state)
}

/// Build the application router (without transport layers like tracing and CORS)
pub fn build_app(state: AppState) -> Router {
    let employee = KindState::new(state.clone(), AccountKind::Employee);
    let admin = KindState::new(state.clone(), AccountKind::Admin);

    let employee_routes = Router::new()
        .merge(register_routes(employee.clone()))
        .merge(auth_routes(employee.clone()))
        .nest("/employee", account_routes(employee));

    let admin_routes = Router::new()
        .merge(register_routes(admin.clone()))
        .merge(auth_routes(admin.clone()))
        .merge(account_routes(admin));

    Router::new()
        .route("/health", get(health).with_state(state.clone()))
        .route("/logout", get(auth::logout))
        .route("/flash", get(auth::flash))
        .merge(employee_routes)
        .nest("/admin", admin_routes)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn_with_state(
            state.sessions.clone(),
            session_layer,
        ))
}
