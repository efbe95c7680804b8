pub mod auth;
pub mod install;
pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod state;

use axum::{
    http::{header, HeaderName, Method},
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

pub use middleware::{handle_panic, require_auth, API_KEY_HEADER};
pub use state::AppState;

/// Builds the API router. The panic handler is the outermost layer so that
/// nothing below it can take the process down.
pub fn router(state: Arc<AppState>) -> Router {
    let public_routes = Router::new().route("/session-id", get(auth::session_id_handler));

    let protected_routes = Router::new()
        .route("/regions", get(rest::regions_handler))
        .route("/credentials", put(rest::save_credentials_handler))
        .route("/cluster", put(rest::save_cluster_handler))
        .route("/cluster/types", get(rest::cluster_types_handler))
        .route("/cluster/domains", get(rest::domains_handler))
        .route("/cluster/check", post(rest::check_cluster_handler))
        .route("/cluster/dns-sync", get(rest::dns_sync_handler))
        .route("/nodes", put(rest::save_nodes_handler))
        .route("/nodes/types", get(rest::node_types_handler))
        .route("/nodes/storage-types", get(rest::storage_types_handler))
        .route("/nodes/zones", get(rest::zones_handler))
        .route("/software", put(rest::save_software_handler))
        .route("/software/products", get(rest::products_handler))
        .route("/software/tags", get(rest::tags_handler))
        .route("/install", post(install::start_install_handler))
        .route("/install/status", get(install::install_status_handler))
        .route("/install/config", get(install::cluster_conf_handler))
        .route("/install/kubeconfig", get(install::kubeconfig_handler))
        .route("/install/vanish", post(install::vanish_handler))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_auth,
        ));

    with_edge_layers(Router::new().merge(public_routes).merge(protected_routes)).with_state(state)
}

/// Wraps `routes` in tracing, CORS and the panic boundary, outermost last.
pub fn with_edge_layers<S>(routes: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(API_KEY_HEADER),
        ]);

    routes
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(CatchPanicLayer::custom(handle_panic))
}
