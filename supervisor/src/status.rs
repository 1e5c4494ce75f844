use serde::Serialize;

/// Runtime state of one camera.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraStatus {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

impl CameraStatus {
    /// Whether this camera's recipes belong in the compiled media
    /// configuration.
    pub fn is_active(self) -> bool {
        matches!(self, CameraStatus::Starting | CameraStatus::Running)
    }
}

/// One row of the fleet status snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEntry {
    pub id: u32,
    pub name: String,
    pub status: CameraStatus,
    pub assigned_ip: Option<String>,
    pub last_error: Option<String>,
    /// Sub-stream HLS URL, the UI preview source.
    pub preview_url: String,
}

/// Per-camera runtime fields that never hit the config file.
#[derive(Debug, Clone, Default)]
pub(crate) struct CameraRuntime {
    pub status: CameraStatus,
    pub assigned_ip: Option<String>,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_states() {
        assert!(CameraStatus::Starting.is_active());
        assert!(CameraStatus::Running.is_active());
        assert!(!CameraStatus::Stopped.is_active());
        assert!(!CameraStatus::Stopping.is_active());
        assert!(!CameraStatus::Failed.is_active());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&CameraStatus::Running).unwrap(),
            "\"running\""
        );
    }
}
