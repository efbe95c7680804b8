//! services/api/src/adapters/catalog.rs
//!
//! Static reference data: regions, cluster types, node sizes and the software
//! products the installer can deploy on a new cluster.

use kuberstack_core::domain::{ClusterType, NodeType, Product, ProductId, Region};
use kuberstack_core::ports::{CatalogService, PortError, PortResult};

const REGIONS: &[(&str, &str, &[&str])] = &[
    ("us-east-1", "US East (N. Virginia)", &["a", "b", "c", "d", "e", "f"]),
    ("us-east-2", "US East (Ohio)", &["a", "b", "c"]),
    ("us-west-1", "US West (N. California)", &["a", "c"]),
    ("us-west-2", "US West (Oregon)", &["a", "b", "c"]),
    ("ca-central-1", "Canada (Central)", &["a", "b"]),
    ("eu-central-1", "EU (Frankfurt)", &["a", "b", "c"]),
    ("eu-west-1", "EU (Ireland)", &["a", "b", "c"]),
    ("eu-west-2", "EU (London)", &["a", "b", "c"]),
    ("ap-northeast-1", "Asia Pacific (Tokyo)", &["a", "c", "d"]),
    ("ap-southeast-1", "Asia Pacific (Singapore)", &["a", "b", "c"]),
    ("ap-southeast-2", "Asia Pacific (Sydney)", &["a", "b", "c"]),
    ("sa-east-1", "South America (Sao Paulo)", &["a", "c"]),
];

const CLUSTER_TYPES: &[(i64, &str, &str)] = &[
    (1, "Single master", "One master node; cheapest, suitable for development."),
    (2, "High availability", "Masters spread across zones; survives a zone outage."),
];

const NODE_TYPES: &[(&str, u32, u32)] = &[
    ("t2.medium", 2, 4),
    ("t2.large", 2, 8),
    ("m4.large", 2, 8),
    ("m4.xlarge", 4, 16),
    ("m4.2xlarge", 8, 32),
    ("c4.large", 2, 4),
    ("c4.xlarge", 4, 8),
    ("r4.large", 2, 16),
];

const STORAGE_TYPES: &[(&str, u32, u32)] = &[
    ("i3.large", 2, 16),
    ("i3.xlarge", 4, 32),
    ("d2.xlarge", 4, 31),
];

const PRODUCTS: &[(ProductId, &str, &str, &[&str])] = &[
    (1, "Prometheus", "Metrics collection and alerting", &["monitoring"]),
    (2, "Grafana", "Dashboards for cluster metrics", &["monitoring", "ui"]),
    (3, "Elasticsearch", "Search and log storage", &["logging", "storage"]),
    (4, "Kibana", "Log exploration UI", &["logging", "ui"]),
    (5, "Jenkins", "Continuous integration server", &["ci"]),
    (6, "Redis", "In-memory key/value store", &["database", "cache"]),
    (7, "PostgreSQL", "Relational database", &["database", "storage"]),
    (8, "NGINX Ingress", "HTTP ingress controller", &["networking"]),
    (9, "Kubernetes Dashboard", "Web UI for the cluster", &["ui"]),
];

/// The catalog shipped with the installer.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog;

impl StaticCatalog {
    pub fn new() -> Self {
        Self
    }
}

fn node_type(&(id, cpus, memory_gib): &(&str, u32, u32)) -> NodeType {
    NodeType {
        id: id.to_string(),
        name: format!("{} ({} vCPU, {} GiB)", id, cpus, memory_gib),
        cpus,
        memory_gib,
    }
}

impl CatalogService for StaticCatalog {
    fn regions(&self) -> Vec<Region> {
        REGIONS
            .iter()
            .map(|(id, name, _)| Region {
                id: id.to_string(),
                name: name.to_string(),
            })
            .collect()
    }

    fn zones(&self, region: &str) -> PortResult<Vec<String>> {
        REGIONS
            .iter()
            .find(|(id, _, _)| *id == region)
            .map(|(id, _, zones)| zones.iter().map(|z| format!("{}{}", id, z)).collect())
            .ok_or_else(|| PortError::Validation(format!("unknown region '{}'", region)))
    }

    fn cluster_types(&self) -> Vec<ClusterType> {
        CLUSTER_TYPES
            .iter()
            .map(|(id, name, description)| ClusterType {
                id: *id,
                name: name.to_string(),
                description: description.to_string(),
            })
            .collect()
    }

    fn node_types(&self) -> Vec<NodeType> {
        NODE_TYPES.iter().map(node_type).collect()
    }

    fn storage_types(&self) -> Vec<NodeType> {
        STORAGE_TYPES.iter().map(node_type).collect()
    }

    fn products(&self, search: &str, tags: &[String]) -> Vec<Product> {
        let search = search.trim().to_lowercase();
        PRODUCTS
            .iter()
            .filter(|(_, name, description, _)| {
                search.is_empty()
                    || name.to_lowercase().contains(&search)
                    || description.to_lowercase().contains(&search)
            })
            .filter(|(_, _, _, product_tags)| {
                tags.iter()
                    .all(|wanted| product_tags.iter().any(|t| t.eq_ignore_ascii_case(wanted)))
            })
            .map(|(id, name, description, product_tags)| Product {
                id: *id,
                name: name.to_string(),
                description: description.to_string(),
                tags: product_tags.iter().map(|t| t.to_string()).collect(),
            })
            .collect()
    }

    fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = PRODUCTS
            .iter()
            .flat_map(|(_, _, _, tags)| tags.iter().map(|t| t.to_string()))
            .collect();
        tags.sort();
        tags.dedup();
        tags
    }

    fn product_name(&self, id: ProductId) -> Option<String> {
        PRODUCTS
            .iter()
            .find(|(product_id, _, _, _)| *product_id == id)
            .map(|(_, name, _, _)| name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zones_are_region_scoped() {
        let catalog = StaticCatalog::new();
        let zones = catalog.zones("us-west-1").unwrap();
        assert_eq!(zones, vec!["us-west-1a".to_string(), "us-west-1c".to_string()]);
        assert!(matches!(
            catalog.zones("mars-north-1"),
            Err(PortError::Validation(_))
        ));
    }

    #[test]
    fn product_search_and_tags() {
        let catalog = StaticCatalog::new();
        let names = |products: Vec<Product>| -> Vec<String> {
            products.into_iter().map(|p| p.name).collect()
        };

        assert_eq!(catalog.products("", &[]).len(), PRODUCTS.len());
        assert_eq!(names(catalog.products("jenk", &[])), vec!["Jenkins"]);
        assert_eq!(
            names(catalog.products("", &["logging".into(), "UI".into()])),
            vec!["Kibana"]
        );
        assert_eq!(
            names(catalog.products("database", &["storage".into()])),
            vec!["PostgreSQL"]
        );
    }

    #[test]
    fn tags_are_unique_and_sorted() {
        let tags = StaticCatalog::new().tags();
        let mut sorted = tags.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(tags, sorted);
        assert!(tags.contains(&"monitoring".to_string()));
    }

    #[test]
    fn product_names_resolve() {
        let catalog = StaticCatalog::new();
        assert_eq!(catalog.product_name(5).as_deref(), Some("Jenkins"));
        assert_eq!(catalog.product_name(999), None);
    }
}
