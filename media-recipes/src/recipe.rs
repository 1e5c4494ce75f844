use std::collections::BTreeMap;

use serde::Serialize;

use crate::CompileError;

/// One named entry in the media server's `paths` map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathRecipe {
    /// Upstream RTSP URL for relays; `publisher` for recipes fed by an
    /// external encoder.
    pub source: String,
    /// Supervised encoder command line, transcode recipes only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_on_init: Option<String>,
    /// Always false: the restart loop in `runOnInit` is the only
    /// restart authority, otherwise two copies of the encoder pile up.
    pub run_on_init_restart: bool,
    pub rtsp_transport: String,
    /// Always false so streams stay warm for NVRs that connect rarely.
    pub source_on_demand: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_on_demand_start_timeout: Option<String>,
    pub record: bool,
}

/// The generated media-server configuration document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaServerConfig {
    pub rtsp_address: String,
    pub rtsp_transports: Vec<String>,
    pub hls_address: String,
    pub hls_always_remux: bool,
    pub hls_variant: String,
    pub hls_segment_count: u32,
    pub hls_segment_duration: String,
    pub hls_part_duration: String,
    pub hls_allow_origin: String,
    pub api: bool,
    pub api_address: String,
    pub read_timeout: String,
    pub write_timeout: String,
    pub write_queue_size: u32,
    pub log_level: String,
    pub paths: BTreeMap<String, PathRecipe>,
}

impl MediaServerConfig {
    pub fn to_yaml(&self) -> Result<String, CompileError> {
        Ok(serde_yaml::to_string(self)?)
    }
}
