use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid camera: {0}")]
    Invalid(String),

    #[error("Stream path '{0}' is already used by another camera")]
    DuplicatePath(String),

    #[error("ONVIF port {0} is already in use")]
    PortInUse(u16),

    #[error("Invalid MAC address: {0}")]
    BadMac(String),

    #[error("Camera {0} not found")]
    NotFound(u32),
}
