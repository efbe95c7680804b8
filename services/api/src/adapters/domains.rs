//! services/api/src/adapters/domains.rs
//!
//! Domain checks for the cluster step. Hosted domains come from configuration
//! rather than from the cloud provider; DNS propagation is checked with the
//! system resolver.

use async_trait::async_trait;
use kuberstack_core::domain::{ClusterSpec, Credentials};
use kuberstack_core::ports::{DomainService, PortError, PortResult};
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

fn label_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // RFC 1123 label: letters, digits and inner hyphens, at most 63 chars.
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?$").expect("static regex is valid")
    })
}

/// Whether `name` is usable as a single DNS label.
pub fn is_dns_label(name: &str) -> bool {
    label_pattern().is_match(name)
}

/// Whether `domain` is a syntactically valid multi-label host name.
pub fn is_domain_name(domain: &str) -> bool {
    let domain = domain.trim_end_matches('.');
    domain.len() <= 253
        && domain.contains('.')
        && domain
            .split('.')
            .all(|label| is_dns_label(&label.to_ascii_lowercase()))
}

/// Domain checks backed by a configured list of hosted domains.
#[derive(Debug, Clone, Default)]
pub struct ResolverDomainAdapter {
    known_domains: Vec<String>,
}

impl ResolverDomainAdapter {
    /// An empty `known_domains` accepts any syntactically valid domain.
    pub fn new(known_domains: Vec<String>) -> Self {
        Self { known_domains }
    }
}

#[async_trait]
impl DomainService for ResolverDomainAdapter {
    async fn list_domains(&self, _credentials: &Credentials) -> PortResult<Vec<String>> {
        Ok(self.known_domains.clone())
    }

    async fn check_domain(&self, domain: &str, name: &str) -> PortResult<()> {
        if !is_dns_label(name) {
            return Err(PortError::Validation(format!(
                "cluster name '{}' must be a lowercase DNS label",
                name
            )));
        }
        if !is_domain_name(domain) {
            return Err(PortError::Validation(format!(
                "'{}' is not a valid domain name",
                domain
            )));
        }
        let normalized = domain.trim_end_matches('.').to_ascii_lowercase();
        if !self.known_domains.is_empty() && !self.known_domains.contains(&normalized) {
            return Err(PortError::Validation(format!(
                "domain '{}' is not hosted by this account",
                domain
            )));
        }
        Ok(())
    }

    async fn is_dns_in_sync(&self, cluster: &ClusterSpec) -> PortResult<bool> {
        let host = format!("api.{}:443", cluster.fqdn());
        let resolved = match tokio::net::lookup_host(host.as_str()).await {
            Ok(mut addrs) => addrs.next().is_some(),
            Err(e) => {
                debug!(host = %host, error = %e, "Cluster API name does not resolve yet");
                false
            }
        };
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_and_domains() {
        assert!(is_dns_label("demo"));
        assert!(is_dns_label("demo-1"));
        assert!(!is_dns_label("-demo"));
        assert!(!is_dns_label("Demo"));
        assert!(!is_dns_label(""));
        assert!(!is_dns_label(&"a".repeat(64)));

        assert!(is_domain_name("example.com"));
        assert!(is_domain_name("Example.COM."));
        assert!(!is_domain_name("localhost"));
        assert!(!is_domain_name("exa_mple.com"));
    }

    #[tokio::test]
    async fn check_domain_validates_syntax() {
        let adapter = ResolverDomainAdapter::default();
        assert!(adapter.check_domain("example.com", "demo").await.is_ok());
        assert!(matches!(
            adapter.check_domain("example.com", "Demo_1").await,
            Err(PortError::Validation(_))
        ));
        assert!(matches!(
            adapter.check_domain("not a domain", "demo").await,
            Err(PortError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn check_domain_honours_known_domains() {
        let adapter = ResolverDomainAdapter::new(vec!["example.com".into()]);
        assert!(adapter.check_domain("EXAMPLE.com", "demo").await.is_ok());
        assert!(matches!(
            adapter.check_domain("other.org", "demo").await,
            Err(PortError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn unresolvable_cluster_is_out_of_sync() {
        let adapter = ResolverDomainAdapter::default();
        let cluster = ClusterSpec::new("invalid", "demo", 1);
        assert!(!adapter.is_dns_in_sync(&cluster).await.unwrap());
    }
}
