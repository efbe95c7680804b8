pub mod catalog;
pub mod db;
pub mod domains;
pub mod provisioner;

pub use catalog::StaticCatalog;
pub use db::DbAdapter;
pub use domains::ResolverDomainAdapter;
pub use provisioner::Provisioner;
