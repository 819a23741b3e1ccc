use msi_kernel::KernelError;
use msi_store::StoreError;
use msi_types::DomainId;
use thiserror::Error;

pub type SubstrateResult<T> = Result<T, SubstrateError>;

#[derive(Debug, Error)]
pub enum SubstrateError {
    #[error("kernel error: {0}")]
    Kernel(#[from] KernelError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("domain '{domain}' is not allowed to access {resource}")]
    PermissionDenied { domain: DomainId, resource: String },
    #[error("unknown entrypoint '{0}'; register it before spawning")]
    UnknownEntrypoint(String),
    #[error("lane limit of {max} reached")]
    LaneLimit { max: usize },
    #[error("substrate has been shut down")]
    ShutDown,
    #[error("no tokio runtime is available to run lanes")]
    NoRuntime,
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("substrate requirement violated: {0}")]
    Bootstrap(String),
}
