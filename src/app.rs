use std::sync::Arc;

use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::{Authorizer, AuthzConfig};
use crate::errors::AppError;
use crate::events::{init_event_bus, start_activity_listener, EventBus};
use crate::jwt::JwtConfig;
use crate::routes::{checks, health, roles, rules};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub authz: Authorizer,
    pub event_bus: EventBus,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig, authz: Authorizer, event_bus: EventBus) -> Self {
        Self {
            pool,
            jwt: Arc::new(jwt),
            authz,
            event_bus,
        }
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    let authz_config = AuthzConfig::from_env()?;
    let authz = Authorizer::for_pool(pool.clone(), authz_config);

    let (event_bus, event_rx) = init_event_bus();
    tokio::spawn(start_activity_listener(event_rx, pool.clone()));

    let state = AppState::new(pool, jwt_config, authz, event_bus);

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let role_routes = Router::new()
        .route("/", get(roles::list_roles).post(roles::create_role))
        .route("/:role_id", get(roles::get_role).delete(roles::delete_role));

    let rule_routes = Router::new()
        .route("/", get(rules::list_rules).post(rules::create_rule))
        .route("/validate", post(rules::validate_rule))
        .route(
            "/:rule_id",
            get(rules::get_rule).put(rules::update_rule).delete(rules::delete_rule),
        );

    let router = Router::new()
        .route("/health", get(health::health))
        .route("/authz/check", post(checks::check))
        .route("/authz/principals/:login", get(checks::principal_summary))
        .nest("/authz/roles", role_routes)
        .nest("/authz/rules", rule_routes)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(router)
}
