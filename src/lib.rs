pub mod auth;
pub mod authorizer;
pub mod config;
pub mod directory;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod state;
pub mod store;

use axum::{
    http::{header, HeaderName, Method},
    routing::{get, put},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the application router: protected routes behind the
/// authentication/authorization pipeline, the health probe outside it, and
/// the CORS layer outermost so preflights never reach the pipeline.
pub fn app(state: AppState) -> Router {
    let protected = Router::new()
        .route("/users/:user_id", get(handlers::users::get_user))
        .route(
            "/todos",
            get(handlers::todos::list_todos).post(handlers::todos::create_todo),
        )
        .route(
            "/todos/:id",
            put(handlers::todos::update_todo).delete(handlers::todos::delete_todo),
        )
        // layers run outermost-last: authentication wraps authorization
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::authorize,
        ))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::authenticate,
        ));

    Router::new()
        .route("/health", get(handlers::health::health))
        .merge(protected)
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Every response carries `Access-Control-Allow-Origin` echoing the request
/// origin, and preflights advertise the full method/header set the web
/// client uses.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-csrf-token"),
        ])
        .allow_credentials(true)
}
