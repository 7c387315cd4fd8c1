//! Application router configuration with protected and unprotected route definitions.

use axum::{
    Json, Router,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;

use crate::{
    AppState,
    auth::{auth_guard, get_current_user, post_log_in, register_user},
    endpoints,
    sanitize::sanitize_query,
    settings::{get_settings, patch_settings},
};

/// The name reported by the root and health routes.
pub const SERVICE_NAME: &str = "LifeSync API";

/// Return a router with all the app's routes.
pub fn build_router(state: AppState) -> Router {
    let unprotected_routes = Router::new()
        .route(endpoints::ROOT, get(get_root))
        .route(endpoints::HEALTH, get(get_health))
        .route(endpoints::REGISTER, post(register_user))
        .route(endpoints::LOG_IN, post(post_log_in));

    let protected_routes = Router::new()
        .route(endpoints::ME, get(get_current_user))
        .route(
            endpoints::SETTINGS,
            get(get_settings).patch(patch_settings),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_guard));

    protected_routes
        .merge(unprotected_routes)
        .fallback(get_404_not_found)
        .layer(middleware::from_fn_with_state(
            state.sanitizer.clone(),
            sanitize_query,
        ))
        .with_state(state)
}

/// Greet the client and report the API version.
async fn get_root() -> Response {
    Json(json!({
        "message": format!("Welcome to {SERVICE_NAME}"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
    .into_response()
}

async fn get_health() -> Response {
    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
    }))
    .into_response()
}

async fn get_404_not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "detail": "Not Found" }))).into_response()
}

#[cfg(test)]
mod root_route_tests {
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use serde_json::{Value, json};

    use crate::{endpoints, test_utils::get_test_app_state};

    use super::build_router;

    fn get_test_server() -> TestServer {
        TestServer::new(build_router(get_test_app_state())).expect("Could not create test server.")
    }

    #[tokio::test]
    async fn root_greets_client() {
        let server = get_test_server();

        let response = server.get(endpoints::ROOT).await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["message"], "Welcome to LifeSync API");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn health_check_reports_healthy() {
        let server = get_test_server();

        let response = server.get(endpoints::HEALTH).await;

        response.assert_status_ok();
        response.assert_json(&json!({"status": "healthy", "service": "LifeSync API"}));
    }

    #[tokio::test]
    async fn unknown_route_is_json_404() {
        let server = get_test_server();

        let response = server.get("/no/such/route").await;

        response.assert_status(StatusCode::NOT_FOUND);
        response.assert_json(&json!({"detail": "Not Found"}));
    }
}
