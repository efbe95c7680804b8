pub mod domain;
pub mod ports;
pub mod wizard;

pub use domain::{
    short_token, ClusterSpec, ClusterType, Credentials, InstallPhase, InstallProgress, InstallRun,
    InstallStatus, InstallTarget, NodeGroup, NodeType, NodesSpec, Product, ProductId, Region,
    Session, WizardState,
};
pub use ports::{
    CatalogService, DomainService, PortError, PortResult, SessionStore, StateMutator,
};
pub use wizard::WizardStep;
