use thiserror::Error;

#[derive(Debug, Error)]
pub enum VnicError {
    #[error("virtual NICs are not supported on this host")]
    Unsupported,

    #[error("failed to create interface: {0}")]
    Create(String),

    #[error("DHCP lease not obtained: {0}")]
    Lease(String),

    #[error("failed to assign static address: {0}")]
    StaticAssign(String),

    #[error("failed to execute command: {0}")]
    Io(#[from] std::io::Error),
}
