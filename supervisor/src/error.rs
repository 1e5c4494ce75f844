//! The supervisor is the boundary where component failures become
//! user-visible outcomes; every lower-level error maps onto exactly one
//! variant here.

use config_store::StoreError;
use media_server::MediaError;
use onvif_endpoint::EndpointError;
use port_alloc::PortAllocError;
use thiserror::Error;
use vnic::VnicError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Invalid(String),

    #[error("stream path '{0}' is already used by another camera")]
    DuplicatePath(String),

    #[error("ONVIF port {0} is already in use")]
    PortInUse(u16),

    #[error("no free ONVIF port left")]
    PortExhausted,

    #[error("invalid MAC address: {0}")]
    BadMac(String),

    #[error("virtual NIC creation failed: {0}")]
    NicCreate(String),

    #[error("DHCP lease failed: {0}")]
    NicLease(String),

    #[error("static address assignment failed: {0}")]
    NicStatic(String),

    #[error("media server is unrecoverable")]
    MediaDead,

    #[error("ONVIF endpoint bind failed: {0}")]
    Bind(String),

    #[error("camera {0} not found")]
    NotFound(u32),

    #[error("operation cancelled")]
    Cancelled,

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Invalid(msg) => Error::Invalid(msg),
            StoreError::DuplicatePath(path) => Error::DuplicatePath(path),
            StoreError::PortInUse(port) => Error::PortInUse(port),
            StoreError::BadMac(mac) => Error::BadMac(mac),
            StoreError::NotFound(id) => Error::NotFound(id),
            StoreError::Io(e) => Error::Internal(format!("config store IO: {}", e)),
            StoreError::Json(e) => Error::Internal(format!("config store JSON: {}", e)),
        }
    }
}

impl From<VnicError> for Error {
    fn from(e: VnicError) -> Self {
        match e {
            VnicError::Unsupported => {
                Error::Invalid("virtual NICs are not supported on this host".into())
            }
            VnicError::Create(msg) => Error::NicCreate(msg),
            VnicError::Lease(msg) => Error::NicLease(msg),
            VnicError::StaticAssign(msg) => Error::NicStatic(msg),
            VnicError::Io(e) => Error::NicCreate(e.to_string()),
        }
    }
}

impl From<MediaError> for Error {
    fn from(e: MediaError) -> Self {
        match e {
            MediaError::Dead => Error::MediaDead,
            MediaError::Spawn(msg) => Error::Internal(format!("media server spawn: {}", msg)),
            MediaError::Timeout(what) => Error::Timeout(what),
            MediaError::Cancelled => Error::Cancelled,
            MediaError::Io(e) => Error::Internal(format!("media server IO: {}", e)),
        }
    }
}

impl From<PortAllocError> for Error {
    fn from(e: PortAllocError) -> Self {
        match e {
            PortAllocError::Exhausted => Error::PortExhausted,
        }
    }
}

impl From<EndpointError> for Error {
    fn from(e: EndpointError) -> Self {
        match e {
            EndpointError::Bind { addr, source } => {
                Error::Bind(format!("{}: {}", addr, source))
            }
            EndpointError::AlreadyStarted => {
                Error::Internal("endpoint already started".into())
            }
        }
    }
}
