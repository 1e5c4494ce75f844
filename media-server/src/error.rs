use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to spawn media server: {0}")]
    Spawn(String),

    #[error("media server is unrecoverable; call stop() to reset")]
    Dead,

    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("cancelled")]
    Cancelled,
}
