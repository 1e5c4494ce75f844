//! Per-camera ONVIF SOAP endpoint.
//!
//! One of these runs for every running virtual camera, bound to the
//! camera's own address (virtual NIC) or the host address plus the
//! camera's ONVIF port. It answers Device, Media, and Media2 requests
//! from a by-value snapshot of the camera's configuration — it never
//! touches the config store and never carries media.
//!
//! Lifecycle is driven solely by the supervisor:
//! `idle → listening → serving → draining → closed`.

mod auth;
mod soap;
mod templates;

use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub use auth::{authenticate, compute_digest, AuthError, Credentials};
pub use soap::extract_action;

/// Seconds given to in-flight requests when draining.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("endpoint was already started")]
    AlreadyStarted,
}

/// Declared parameters of one advertised stream.
#[derive(Debug, Clone)]
pub struct StreamProfile {
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
    pub bitrate_kbps: u32,
}

/// By-value snapshot of everything the endpoint advertises.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub camera_id: u32,
    pub name: String,
    pub uuid: String,
    /// Address the server binds.
    pub bind_ip: IpAddr,
    pub onvif_port: u16,
    /// Address baked into advertised URLs (virtual NIC address when
    /// present, otherwise the host address).
    pub advertise_ip: String,
    pub rtsp_port: u16,
    pub hls_port: u16,
    pub path_name: String,
    pub credentials: Credentials,
    pub main: StreamProfile,
    pub sub: StreamProfile,
}

impl EndpointConfig {
    fn device_xaddr(&self) -> String {
        format!(
            "http://{}:{}/onvif/device_service",
            self.advertise_ip, self.onvif_port
        )
    }

    fn media_xaddr(&self) -> String {
        format!(
            "http://{}:{}/onvif/media_service",
            self.advertise_ip, self.onvif_port
        )
    }

    fn media2_xaddr(&self) -> String {
        format!(
            "http://{}:{}/onvif/media2_service",
            self.advertise_ip, self.onvif_port
        )
    }

    fn stream_uri(&self, tier: Tier) -> String {
        format!(
            "rtsp://{}:{}/{}_{}",
            self.advertise_ip,
            self.rtsp_port,
            self.path_name,
            tier.suffix()
        )
    }

    fn snapshot_uri(&self) -> String {
        format!(
            "http://{}:{}/{}_sub/index.m3u8",
            self.advertise_ip, self.hls_port, self.path_name
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tier {
    Main,
    Sub,
}

impl Tier {
    fn suffix(self) -> &'static str {
        match self {
            Tier::Main => "main",
            Tier::Sub => "sub",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    Idle,
    Listening,
    Serving,
    Draining,
    Closed,
}

/// Handle to one camera's running SOAP server.
pub struct OnvifEndpoint {
    config: Arc<EndpointConfig>,
    state: Arc<Mutex<EndpointState>>,
    bound: Option<SocketAddr>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl OnvifEndpoint {
    pub fn new(config: EndpointConfig) -> Self {
        Self {
            config: Arc::new(config),
            state: Arc::new(Mutex::new(EndpointState::Idle)),
            bound: None,
            shutdown_tx: None,
            task: None,
        }
    }

    pub fn state(&self) -> EndpointState {
        *self.state.lock().unwrap()
    }

    /// Address actually bound, available once serving.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.bound
    }

    /// Bind and begin serving. Bind failures abort the start and leave
    /// the endpoint idle.
    pub async fn start(&mut self) -> Result<(), EndpointError> {
        if self.state() != EndpointState::Idle {
            return Err(EndpointError::AlreadyStarted);
        }

        let addr = SocketAddr::new(self.config.bind_ip, self.config.onvif_port);
        *self.state.lock().unwrap() = EndpointState::Listening;

        let listener = match tokio::net::TcpListener::bind(addr).await {
            Ok(l) => l,
            Err(source) => {
                *self.state.lock().unwrap() = EndpointState::Idle;
                return Err(EndpointError::Bind { addr, source });
            }
        };
        self.bound = listener.local_addr().ok();

        let app = Router::new()
            .route("/onvif/device_service", post(handle_device_service))
            .route("/onvif/media_service", post(handle_media_service))
            .route("/onvif/media2_service", post(handle_media2_service))
            .with_state(self.config.clone());

        let (tx, rx) = oneshot::channel::<()>();
        let state = self.state.clone();
        let camera_id = self.config.camera_id;
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = rx.await;
            });
            if let Err(e) = serve.await {
                tracing::error!(camera_id, "ONVIF endpoint failed: {}", e);
            }
            *state.lock().unwrap() = EndpointState::Closed;
        });

        tracing::info!(
            camera_id,
            addr = %self.bound.unwrap_or(addr),
            "ONVIF endpoint serving"
        );
        *self.state.lock().unwrap() = EndpointState::Serving;
        self.shutdown_tx = Some(tx);
        self.task = Some(task);
        Ok(())
    }

    /// Drain in-flight requests, then close. Idempotent.
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            *self.state.lock().unwrap() = EndpointState::Draining;
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let abort = task.abort_handle();
            if tokio::time::timeout(DRAIN_TIMEOUT, task).await.is_err() {
                tracing::warn!(
                    camera_id = self.config.camera_id,
                    "ONVIF endpoint did not drain in time; aborting"
                );
                abort.abort();
            }
        }
        *self.state.lock().unwrap() = EndpointState::Closed;
    }
}

impl Drop for OnvifEndpoint {
    fn drop(&mut self) {
        // Dropping the sender triggers graceful shutdown of the serve
        // task; aborting covers endpoints stuck mid-request.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Detect the address the host uses for outbound traffic.
pub fn local_ip() -> Option<String> {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    Some(socket.local_addr().ok()?.ip().to_string())
}

type SoapResponse = (StatusCode, [(&'static str, &'static str); 1], String);

fn soap_ok(body: String) -> SoapResponse {
    (
        StatusCode::OK,
        [("Content-Type", "application/soap+xml")],
        body,
    )
}

/// Run the auth gate for one request. GetSystemDateAndTime stays open:
/// clients must read the device clock before they can build a digest
/// token.
fn check_auth(config: &EndpointConfig, action: &str, body: &str) -> Result<(), SoapResponse> {
    if action == "GetSystemDateAndTime" {
        return Ok(());
    }
    match authenticate(body, &config.credentials) {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::debug!(
                camera_id = config.camera_id,
                action,
                "rejected request: {}",
                e
            );
            Err(soap_ok(templates::not_authorized(&e.to_string())))
        }
    }
}

fn requested_tier(body: &str) -> Tier {
    match soap::element_text(body, "ProfileToken") {
        Some(token) if token.to_lowercase().contains("sub") => Tier::Sub,
        _ => Tier::Main,
    }
}

fn profile_info<'a>(config: &'a EndpointConfig, tier: Tier) -> templates::ProfileInfo<'a> {
    let (token, name, stream) = match tier {
        Tier::Main => ("MainProfile", "mainStream", &config.main),
        Tier::Sub => ("SubProfile", "subStream", &config.sub),
    };
    templates::ProfileInfo {
        token,
        name,
        width: stream.width,
        height: stream.height,
        framerate: stream.framerate,
        bitrate_kbps: stream.bitrate_kbps,
    }
}

async fn handle_device_service(
    State(config): State<Arc<EndpointConfig>>,
    body: String,
) -> impl IntoResponse {
    let action = extract_action(&body).unwrap_or_default();
    if let Err(fault) = check_auth(&config, &action, &body) {
        return fault;
    }

    let response = match action.as_str() {
        "GetDeviceInformation" => templates::device_information(&config.name, &config.uuid),
        "GetCapabilities" => {
            templates::capabilities(&config.device_xaddr(), &config.media_xaddr())
        }
        "GetServices" => templates::services(
            &config.device_xaddr(),
            &config.media_xaddr(),
            &config.media2_xaddr(),
        ),
        "GetSystemDateAndTime" => templates::system_date_and_time(Utc::now()),
        _ => templates::fault(
            "ter:ActionNotSupported",
            &format!("unknown action: {}", action),
        ),
    };
    soap_ok(response)
}

async fn handle_media_service(
    State(config): State<Arc<EndpointConfig>>,
    body: String,
) -> impl IntoResponse {
    let action = extract_action(&body).unwrap_or_default();
    if let Err(fault) = check_auth(&config, &action, &body) {
        return fault;
    }

    let response = match action.as_str() {
        "GetProfiles" => templates::profiles(
            &profile_info(&config, Tier::Main),
            &profile_info(&config, Tier::Sub),
        ),
        "GetStreamUri" => templates::stream_uri(&config.stream_uri(requested_tier(&body))),
        "GetSnapshotUri" => templates::snapshot_uri(&config.snapshot_uri()),
        _ => templates::fault(
            "ter:ActionNotSupported",
            &format!("unknown action: {}", action),
        ),
    };
    soap_ok(response)
}

async fn handle_media2_service(
    State(config): State<Arc<EndpointConfig>>,
    body: String,
) -> impl IntoResponse {
    let action = extract_action(&body).unwrap_or_default();
    if let Err(fault) = check_auth(&config, &action, &body) {
        return fault;
    }

    let response = match action.as_str() {
        "GetProfiles" => templates::profiles2(
            &profile_info(&config, Tier::Main),
            &profile_info(&config, Tier::Sub),
        ),
        "GetStreamUri" => templates::stream_uri2(&config.stream_uri(requested_tier(&body))),
        "GetSnapshotUri" => templates::snapshot_uri2(&config.snapshot_uri()),
        _ => templates::fault(
            "ter:ActionNotSupported",
            &format!("unknown action: {}", action),
        ),
    };
    soap_ok(response)
}
