use axum::http::Method;
use axum::routing::{get, MethodRouter};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::binder::AuthDeclaration;
use super::dispatch::{Endpoint, Operation};
use super::handlers::{self, sms};
use crate::AppState;

/// Single-variant POST endpoint.
fn post(operation: Operation) -> MethodRouter<Arc<AppState>> {
    Endpoint::new().on(Method::POST, operation).into_route()
}

pub fn create_router(state: Arc<AppState>) -> Router {
    // Login flows -- no identity required
    let login_routes = Router::new()
        .route(
            "/auth/password",
            post(Operation::with_body(AuthDeclaration::public(), handlers::login_by_password)),
        )
        .route(
            "/auth/oauth/:provider",
            post(Operation::with_body(AuthDeclaration::public(), handlers::login_by_oauth)),
        )
        .route(
            "/auth/token/inspect",
            post(Operation::with_body(AuthDeclaration::public(), handlers::inspect_token)),
        );

    // SMS verification -- codes may be requested before signing in
    let sms_routes = Router::new()
        .route(
            "/auth/sms/code",
            post(Operation::with_body(AuthDeclaration::caller().allow_anonymous(), sms::request_code)),
        )
        .route(
            "/auth/sms/verify",
            post(Operation::with_body(AuthDeclaration::caller().allow_anonymous(), sms::verify_code)),
        )
        .route(
            "/auth/sms/login",
            post(Operation::with_body(AuthDeclaration::public(), sms::login)),
        )
        .route(
            "/auth/sms/register",
            post(Operation::with_body(AuthDeclaration::public(), sms::register)),
        )
        .route(
            "/auth/sms/reset-password",
            post(Operation::with_body(AuthDeclaration::public(), sms::reset_password)),
        )
        .route(
            "/auth/sms/bind",
            post(Operation::with_body(AuthDeclaration::caller(), sms::bind)),
        );

    // Signed-in callers
    let account_routes = Router::new()
        .route(
            "/me",
            Endpoint::new()
                .on(
                    Method::GET,
                    Operation::new(AuthDeclaration::caller(), handlers::me),
                )
                .on_version(
                    Method::GET,
                    2,
                    Operation::new(AuthDeclaration::caller().client_meta(), handlers::me_v2),
                )
                .into_route(),
        )
        .route(
            "/weixin/jssdk",
            Endpoint::new()
                .on(
                    Method::GET,
                    Operation::new(AuthDeclaration::caller().raw_request(), handlers::weixin_jssdk),
                )
                .into_route(),
        );

    // Admin routes -- WebAdmin identity required
    let admin_routes = Router::new()
        .route(
            "/admin/subjects/:id",
            Endpoint::new()
                .on(
                    Method::GET,
                    Operation::new(AuthDeclaration::admin().resource_id(), handlers::get_subject),
                )
                .into_route(),
        )
        .route(
            "/admin/subjects/:id/ban",
            post(Operation::with_body(AuthDeclaration::admin().resource_id(), handlers::ban_subject)),
        );

    let internal_routes = Router::new().route("/_internal/health", get(handlers::health));

    Router::new()
        .merge(login_routes)
        .merge(sms_routes)
        .merge(account_routes)
        .merge(admin_routes)
        .merge(internal_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
