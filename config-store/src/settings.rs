//! Global gateway settings.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Address reported to ONVIF clients. "localhost" means
    /// auto-derive the host address at runtime.
    #[serde(default = "default_server_ip")]
    pub server_ip: String,
    #[serde(default = "default_rtsp_port")]
    pub rtsp_port: u16,
    #[serde(default = "default_hls_port")]
    pub hls_port: u16,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(default = "default_web_port")]
    pub web_port: u16,
    #[serde(default = "default_grid_columns")]
    pub grid_columns: u32,
    #[serde(default = "default_theme")]
    pub theme: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_server_ip() -> String {
    "localhost".to_string()
}

fn default_rtsp_port() -> u16 {
    8554
}

fn default_hls_port() -> u16 {
    8888
}

fn default_api_port() -> u16 {
    9997
}

fn default_web_port() -> u16 {
    5552
}

fn default_grid_columns() -> u32 {
    3
}

fn default_theme() -> String {
    "dracula".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_ip: default_server_ip(),
            rtsp_port: default_rtsp_port(),
            hls_port: default_hls_port(),
            api_port: default_api_port(),
            web_port: default_web_port(),
            grid_columns: default_grid_columns(),
            theme: default_theme(),
            extra: Map::new(),
        }
    }
}

impl Settings {
    /// Ports that may never be handed out as ONVIF ports.
    pub fn reserved_ports(&self) -> BTreeSet<u16> {
        [self.rtsp_port, self.hls_port, self.api_port, self.web_port]
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.rtsp_port, 8554);
        assert_eq!(s.hls_port, 8888);
        assert_eq!(s.api_port, 9997);
        assert_eq!(s.server_ip, "localhost");
    }

    #[test]
    fn test_reserved_ports() {
        let s = Settings::default();
        let reserved = s.reserved_ports();
        assert!(reserved.contains(&8554));
        assert!(reserved.contains(&8888));
        assert!(reserved.contains(&9997));
        assert!(reserved.contains(&5552));
    }
}
