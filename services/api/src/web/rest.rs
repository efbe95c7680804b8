//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the wizard and reference data endpoints and
//! the master definition for the OpenAPI specification.

use crate::auth::Principal;
use crate::error::{ApiError, ErrorBody};
use crate::web::protocol::*;
use crate::web::state::AppState;
use axum::{extract::State, Extension, Json};
use std::sync::Arc;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::web::auth::session_id_handler,
        regions_handler,
        save_credentials_handler,
        cluster_types_handler,
        domains_handler,
        check_cluster_handler,
        save_cluster_handler,
        dns_sync_handler,
        node_types_handler,
        storage_types_handler,
        zones_handler,
        save_nodes_handler,
        products_handler,
        tags_handler,
        save_software_handler,
        crate::web::install::start_install_handler,
        crate::web::install::install_status_handler,
        crate::web::install::cluster_conf_handler,
        crate::web::install::kubeconfig_handler,
        crate::web::install::vanish_handler,
    ),
    components(
        schemas(ErrorBody, Ack, TokenResponse, InstallStatusResponse, ClusterConfResponse)
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "session", description = "Session tokens."),
        (name = "wizard", description = "Steps of the cluster installation wizard."),
        (name = "catalog", description = "Reference data the wizard offers."),
        (name = "install", description = "Provisioning and teardown of the cluster.")
    )
)]
pub struct ApiDoc;

/// Declares the `X-Api-Key` header scheme the protected paths refer to.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "api_key",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("X-Api-Key"))),
        );
    }
}

//=========================================================================================
// Credentials
//=========================================================================================

/// GET /regions - Regions the cluster can be created in
#[utoipa::path(
    get,
    path = "/regions",
    tag = "catalog",
    security(("api_key" = [])),
    responses(
        (status = 200, description = "Available regions", body = RegionsResponse),
        (status = 401, description = "Invalid or expired token", body = ErrorBody)
    )
)]
pub async fn regions_handler(State(state): State<Arc<AppState>>) -> Json<RegionsResponse> {
    Json(RegionsResponse {
        status: true,
        regions: state.catalog.regions().into_iter().map(Into::into).collect(),
    })
}

/// PUT /credentials - Record the cloud account used for provisioning
#[utoipa::path(
    put,
    path = "/credentials",
    tag = "wizard",
    security(("api_key" = [])),
    request_body = CredentialsRequest,
    responses(
        (status = 200, description = "Credentials recorded", body = Ack),
        (status = 400, description = "Invalid credentials", body = ErrorBody),
        (status = 409, description = "Installation running or installed", body = ErrorBody)
    )
)]
pub async fn save_credentials_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    ApiJson(req): ApiJson<CredentialsRequest>,
) -> Result<Json<Ack>, ApiError> {
    state.wizard.save_credentials(&principal, req.into()).await?;
    Ok(Json(Ack::ok()))
}

//=========================================================================================
// Cluster
//=========================================================================================

/// GET /cluster/types - Cluster topologies on offer
#[utoipa::path(
    get,
    path = "/cluster/types",
    tag = "catalog",
    security(("api_key" = [])),
    responses((status = 200, description = "Cluster types", body = ClusterTypesResponse))
)]
pub async fn cluster_types_handler(
    State(state): State<Arc<AppState>>,
) -> Json<ClusterTypesResponse> {
    Json(ClusterTypesResponse {
        status: true,
        types: state.catalog.cluster_types().into_iter().map(Into::into).collect(),
    })
}

/// GET /cluster/domains - Domains the account can host the cluster under
#[utoipa::path(
    get,
    path = "/cluster/domains",
    tag = "wizard",
    security(("api_key" = [])),
    responses(
        (status = 200, description = "Hosted domains", body = DomainsResponse),
        (status = 412, description = "Credentials not recorded yet", body = ErrorBody)
    )
)]
pub async fn domains_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<DomainsResponse>, ApiError> {
    let domains = state.wizard.domains(&principal).await?;
    Ok(Json(DomainsResponse {
        status: true,
        domains,
    }))
}

/// POST /cluster/check - Validate a cluster name and domain without saving
#[utoipa::path(
    post,
    path = "/cluster/check",
    tag = "wizard",
    security(("api_key" = [])),
    request_body = ClusterCheckRequest,
    responses(
        (status = 200, description = "The pair can be used", body = Ack),
        (status = 400, description = "The pair cannot be used", body = ErrorBody),
        (status = 412, description = "Credentials not recorded yet", body = ErrorBody)
    )
)]
pub async fn check_cluster_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    ApiJson(req): ApiJson<ClusterCheckRequest>,
) -> Result<Json<Ack>, ApiError> {
    state
        .wizard
        .check_cluster(&principal, req.domain.trim(), req.name.trim())
        .await?;
    Ok(Json(Ack::ok()))
}

/// PUT /cluster - Record the cluster identity
#[utoipa::path(
    put,
    path = "/cluster",
    tag = "wizard",
    security(("api_key" = [])),
    request_body = ClusterRequest,
    responses(
        (status = 200, description = "Cluster recorded", body = Ack),
        (status = 400, description = "Invalid cluster", body = ErrorBody),
        (status = 412, description = "Credentials not recorded yet", body = ErrorBody)
    )
)]
pub async fn save_cluster_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    ApiJson(req): ApiJson<ClusterRequest>,
) -> Result<Json<Ack>, ApiError> {
    state
        .wizard
        .save_cluster(&principal, req.domain.trim(), req.name.trim(), req.cluster_type)
        .await?;
    Ok(Json(Ack::ok()))
}

/// GET /cluster/dns-sync - Whether the cluster's DNS records have propagated
#[utoipa::path(
    get,
    path = "/cluster/dns-sync",
    tag = "wizard",
    security(("api_key" = [])),
    responses(
        (status = 200, description = "DNS state", body = DnsSyncResponse),
        (status = 412, description = "Cluster not recorded yet", body = ErrorBody)
    )
)]
pub async fn dns_sync_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<DnsSyncResponse>, ApiError> {
    let in_sync = state.wizard.dns_in_sync(&principal).await?;
    Ok(Json(DnsSyncResponse {
        status: true,
        in_sync,
    }))
}

//=========================================================================================
// Nodes
//=========================================================================================

/// GET /nodes/types - General purpose instance sizes
#[utoipa::path(
    get,
    path = "/nodes/types",
    tag = "catalog",
    security(("api_key" = [])),
    responses((status = 200, description = "Node types", body = NodeTypesResponse))
)]
pub async fn node_types_handler(State(state): State<Arc<AppState>>) -> Json<NodeTypesResponse> {
    Json(NodeTypesResponse {
        status: true,
        types: state.catalog.node_types().into_iter().map(Into::into).collect(),
    })
}

/// GET /nodes/storage-types - Storage optimized instance sizes
#[utoipa::path(
    get,
    path = "/nodes/storage-types",
    tag = "catalog",
    security(("api_key" = [])),
    responses((status = 200, description = "Storage node types", body = NodeTypesResponse))
)]
pub async fn storage_types_handler(
    State(state): State<Arc<AppState>>,
) -> Json<NodeTypesResponse> {
    Json(NodeTypesResponse {
        status: true,
        types: state.catalog.storage_types().into_iter().map(Into::into).collect(),
    })
}

/// GET /nodes/zones - Availability zones of a region
#[utoipa::path(
    get,
    path = "/nodes/zones",
    tag = "catalog",
    security(("api_key" = [])),
    params(ZonesQuery),
    responses(
        (status = 200, description = "Zones of the region", body = ZonesResponse),
        (status = 400, description = "Unknown region", body = ErrorBody)
    )
)]
pub async fn zones_handler(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<ZonesQuery>,
) -> Result<Json<ZonesResponse>, ApiError> {
    let zones = state.catalog.zones(query.region.trim())?;
    Ok(Json(ZonesResponse {
        status: true,
        zones,
    }))
}

/// PUT /nodes - Record master and worker node groups
#[utoipa::path(
    put,
    path = "/nodes",
    tag = "wizard",
    security(("api_key" = [])),
    request_body = NodesRequest,
    responses(
        (status = 200, description = "Node groups recorded", body = Ack),
        (status = 400, description = "Invalid node groups", body = ErrorBody),
        (status = 412, description = "Cluster not recorded yet", body = ErrorBody)
    )
)]
pub async fn save_nodes_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    ApiJson(req): ApiJson<NodesRequest>,
) -> Result<Json<Ack>, ApiError> {
    state.wizard.save_nodes(&principal, req.into()).await?;
    Ok(Json(Ack::ok()))
}

//=========================================================================================
// Software
//=========================================================================================

/// GET /software/products - Search installable products
#[utoipa::path(
    get,
    path = "/software/products",
    tag = "catalog",
    security(("api_key" = [])),
    params(ProductsQuery),
    responses((status = 200, description = "Matching products", body = ProductsResponse))
)]
pub async fn products_handler(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<ProductsQuery>,
) -> Json<ProductsResponse> {
    let products = state
        .catalog
        .products(query.search.as_deref().unwrap_or_default(), &query.tag_list());
    Json(ProductsResponse {
        status: true,
        products: products.into_iter().map(Into::into).collect(),
    })
}

/// GET /software/tags - Every product tag
#[utoipa::path(
    get,
    path = "/software/tags",
    tag = "catalog",
    security(("api_key" = [])),
    responses((status = 200, description = "Product tags", body = TagsResponse))
)]
pub async fn tags_handler(State(state): State<Arc<AppState>>) -> Json<TagsResponse> {
    Json(TagsResponse {
        status: true,
        tags: state.catalog.tags(),
    })
}

/// PUT /software - Record the products to install
#[utoipa::path(
    put,
    path = "/software",
    tag = "wizard",
    security(("api_key" = [])),
    request_body = SoftwareRequest,
    responses(
        (status = 200, description = "Selection recorded", body = Ack),
        (status = 400, description = "Unknown product", body = ErrorBody),
        (status = 412, description = "Nodes not recorded yet", body = ErrorBody)
    )
)]
pub async fn save_software_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    ApiJson(req): ApiJson<SoftwareRequest>,
) -> Result<Json<Ack>, ApiError> {
    state.wizard.save_software(&principal, req.products).await?;
    Ok(Json(Ack::ok()))
}
