use msi_types::DomainId;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KernelError {
    #[error("unknown domain '{0}'")]
    UnknownDomain(DomainId),
    #[error("domain '{name}' ({domain}) is sealed")]
    DomainSealed { domain: DomainId, name: String },
}
