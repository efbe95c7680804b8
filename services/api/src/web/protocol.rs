//! services/api/src/web/protocol.rs
//!
//! Request and response bodies of the HTTP API. Every successful body carries
//! `status: true`; failures use `ErrorBody`.

use axum::extract::FromRequest;
use axum::extract::FromRequestParts;
use kuberstack_core::domain::{
    ClusterType, Credentials, InstallStatus, NodeGroup, NodeType, NodesSpec, Product,
    Region,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::error::ApiError;
use crate::wizard::ClusterConf;

//=========================================================================================
// Extractors
//=========================================================================================

/// `axum::Json` whose rejections use the API's error body.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// `axum::extract::Query` whose rejections use the API's error body.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

//=========================================================================================
// Requests
//=========================================================================================

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsRequest {
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub ssh_public_key: String,
}

impl From<CredentialsRequest> for Credentials {
    fn from(req: CredentialsRequest) -> Self {
        Credentials {
            access_key: req.access_key.trim().to_string(),
            secret_key: req.secret_key.trim().to_string(),
            region: req.region.trim().to_string(),
            ssh_public_key: req.ssh_public_key.trim().to_string(),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ClusterCheckRequest {
    pub domain: String,
    pub name: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRequest {
    pub domain: String,
    pub name: String,
    /// Id from `GET /cluster/types`.
    pub cluster_type: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeGroupDto {
    pub instances: u32,
    pub zones: Vec<String>,
    #[serde(default)]
    pub instance_type: Option<String>,
}

impl From<NodeGroupDto> for NodeGroup {
    fn from(dto: NodeGroupDto) -> Self {
        NodeGroup {
            instances: dto.instances,
            zones: dto.zones,
            instance_type: dto.instance_type,
        }
    }
}

impl From<NodeGroup> for NodeGroupDto {
    fn from(group: NodeGroup) -> Self {
        NodeGroupDto {
            instances: group.instances,
            zones: group.zones,
            instance_type: group.instance_type,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct NodesRequest {
    pub master: NodeGroupDto,
    pub workers: NodeGroupDto,
}

impl From<NodesRequest> for NodesSpec {
    fn from(req: NodesRequest) -> Self {
        NodesSpec {
            master: req.master.into(),
            workers: req.workers.into(),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SoftwareRequest {
    /// Product ids from `GET /software/products`.
    pub products: Vec<i64>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ZonesQuery {
    pub region: String,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProductsQuery {
    /// Case-insensitive substring of the name or description.
    #[serde(default)]
    pub search: Option<String>,
    /// Comma separated; every tag must match.
    #[serde(default)]
    pub tags: Option<String>,
}

impl ProductsQuery {
    pub fn tag_list(&self) -> Vec<String> {
        self.tags
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }
}

//=========================================================================================
// Responses
//=========================================================================================

/// Acknowledges a request that returns no data.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Ack {
    pub status: bool,
}

impl Ack {
    pub fn ok() -> Self {
        Self { status: true }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub status: bool,
    /// Send back in the `X-Api-Key` header.
    pub token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RegionDto {
    pub id: String,
    pub name: String,
}

impl From<Region> for RegionDto {
    fn from(region: Region) -> Self {
        RegionDto {
            id: region.id,
            name: region.name,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RegionsResponse {
    pub status: bool,
    pub regions: Vec<RegionDto>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ClusterTypeDto {
    pub id: i64,
    pub name: String,
    pub description: String,
}

impl From<ClusterType> for ClusterTypeDto {
    fn from(t: ClusterType) -> Self {
        ClusterTypeDto {
            id: t.id,
            name: t.name,
            description: t.description,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ClusterTypesResponse {
    pub status: bool,
    pub types: Vec<ClusterTypeDto>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DomainsResponse {
    pub status: bool,
    pub domains: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DnsSyncResponse {
    pub status: bool,
    pub in_sync: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeTypeDto {
    pub id: String,
    pub name: String,
    pub cpus: u32,
    pub memory_gib: u32,
}

impl From<NodeType> for NodeTypeDto {
    fn from(t: NodeType) -> Self {
        NodeTypeDto {
            id: t.id,
            name: t.name,
            cpus: t.cpus,
            memory_gib: t.memory_gib,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NodeTypesResponse {
    pub status: bool,
    pub types: Vec<NodeTypeDto>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ZonesResponse {
    pub status: bool,
    pub zones: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductDto {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
}

impl From<Product> for ProductDto {
    fn from(p: Product) -> Self {
        ProductDto {
            id: p.id,
            name: p.name,
            description: p.description,
            tags: p.tags,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductsResponse {
    pub status: bool,
    pub products: Vec<ProductDto>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TagsResponse {
    pub status: bool,
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct InstallStatusResponse {
    pub status: bool,
    pub total: u32,
    pub completed: u32,
    /// One of `idle`, `running`, `succeeded`, `failed`, `torn_down`.
    pub phase: String,
}

impl From<InstallStatus> for InstallStatusResponse {
    fn from(s: InstallStatus) -> Self {
        InstallStatusResponse {
            status: true,
            total: s.total,
            completed: s.completed,
            phase: s.phase.to_string(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConfProductDto {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfResponse {
    pub status: bool,
    pub domain: String,
    pub name: String,
    pub fqdn: String,
    pub bucket: String,
    pub cluster_type: i64,
    pub region: String,
    pub master: NodeGroupDto,
    pub workers: NodeGroupDto,
    pub products: Vec<ConfProductDto>,
}

impl From<ClusterConf> for ClusterConfResponse {
    fn from(conf: ClusterConf) -> Self {
        ClusterConfResponse {
            status: true,
            domain: conf.domain,
            name: conf.name,
            fqdn: conf.fqdn,
            bucket: conf.bucket,
            cluster_type: conf.cluster_type,
            region: conf.region,
            master: conf.master.into(),
            workers: conf.workers.into(),
            products: conf
                .products
                .into_iter()
                .map(|(id, name)| ConfProductDto { id, name })
                .collect(),
        }
    }
}
