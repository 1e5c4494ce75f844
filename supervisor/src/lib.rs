//! Camera fleet supervision.
//!
//! The supervisor owns the camera set and is the single entry point for
//! control operations. It composes the config store, port allocator,
//! virtual NIC manager, recipe compiler, media-server controller, and
//! the per-camera ONVIF endpoints, and keeps them in lockstep: a camera
//! either has both its recipes and its endpoint, or neither.
//!
//! Ordering: per-camera operations serialize on a per-id mutex under a
//! shared fleet lock; fleet-wide operations take the fleet lock
//! exclusively, which keeps new per-id acquisitions out while existing
//! ones drain.

mod error;
mod status;

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use config_store::{unique_slug, Camera, ConfigStore, IpMode, Settings};
use media_server::MediaServerController;
use onvif_endpoint::{Credentials, EndpointConfig, OnvifEndpoint, StreamProfile};
use port_alloc::PortAllocator;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use vnic::{IpConfig, VnicManager, VnicSpec};

pub use error::Error;
pub use status::{CameraStatus, StatusEntry};

use status::CameraRuntime;

/// Shared deadline for `stop_all`.
const STOP_ALL_DEADLINE: Duration = Duration::from_secs(15);

/// Stream health watchdog cadence and threshold.
const WATCHDOG_INTERVAL: Duration = Duration::from_secs(15);
const STALE_AFTER: Duration = Duration::from_secs(120);

/// Advertised encoder bitrates, mirrored into ONVIF profiles.
const MAIN_BITRATE_KBPS: u32 = 2500;
const SUB_BITRATE_KBPS: u32 = 800;

/// Request to create a camera. Derived fields (id, uuid, slug, ONVIF
/// port and credentials when omitted) are assigned by the supervisor.
#[derive(Debug, Clone)]
pub struct NewCamera {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub main_path: String,
    pub sub_path: String,
    pub onvif_port: Option<u16>,
    pub onvif_username: Option<String>,
    pub onvif_password: Option<String>,
    pub auto_start: bool,
    pub main_width: u32,
    pub main_height: u32,
    pub main_framerate: u32,
    pub transcode_main: bool,
    pub sub_width: u32,
    pub sub_height: u32,
    pub sub_framerate: u32,
    pub transcode_sub: bool,
    pub use_virtual_nic: bool,
    pub parent_interface: String,
    pub nic_mac: String,
    pub ip_mode: IpMode,
    pub static_ip: String,
    pub prefix_len: u8,
    pub gateway: String,
}

impl Default for NewCamera {
    fn default() -> Self {
        Self {
            name: String::new(),
            host: String::new(),
            port: 554,
            username: String::new(),
            password: String::new(),
            main_path: String::new(),
            sub_path: String::new(),
            onvif_port: None,
            onvif_username: None,
            onvif_password: None,
            auto_start: false,
            main_width: 1920,
            main_height: 1080,
            main_framerate: 30,
            transcode_main: false,
            sub_width: 640,
            sub_height: 480,
            sub_framerate: 15,
            transcode_sub: false,
            use_virtual_nic: false,
            parent_interface: String::new(),
            nic_mac: String::new(),
            ip_mode: IpMode::Dhcp,
            static_ip: String::new(),
            prefix_len: 24,
            gateway: String::new(),
        }
    }
}

/// Result of the virtual-NIC capability probe.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VnicProbe {
    pub supported: bool,
    pub parent_interfaces: Vec<String>,
}

pub struct Supervisor {
    store: Arc<ConfigStore>,
    media: Arc<MediaServerController>,
    vnic: Arc<VnicManager>,

    endpoints: Mutex<HashMap<u32, OnvifEndpoint>>,
    runtime: StdMutex<HashMap<u32, CameraRuntime>>,
    locks: StdMutex<HashMap<u32, Arc<Mutex<()>>>>,
    cancels: StdMutex<HashMap<u32, CancellationToken>>,
    fleet: RwLock<()>,

    /// Watchdog bookkeeping: path name -> (last byte count, unchanged since).
    stale_since: StdMutex<HashMap<String, (u64, Instant)>>,
}

impl Supervisor {
    pub fn new(
        store: Arc<ConfigStore>,
        media: Arc<MediaServerController>,
        vnic: Arc<VnicManager>,
    ) -> Self {
        Self {
            store,
            media,
            vnic,
            endpoints: Mutex::new(HashMap::new()),
            runtime: StdMutex::new(HashMap::new()),
            locks: StdMutex::new(HashMap::new()),
            cancels: StdMutex::new(HashMap::new()),
            fleet: RwLock::new(()),
            stale_since: StdMutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    // ------------------------------------------------------------------
    // CRUD
    // ------------------------------------------------------------------

    /// Create and persist a camera. Does not start it.
    pub async fn create_camera(&self, req: NewCamera) -> Result<Camera, Error> {
        let _fleet = self.fleet.read().await;

        let settings = self.store.settings();
        let allocator = PortAllocator::new(settings.reserved_ports());
        let in_use = self.store.used_onvif_ports();

        let onvif_port = match req.onvif_port {
            Some(port) => {
                if !allocator.is_available(port, &in_use) {
                    return Err(Error::PortInUse(port));
                }
                port
            }
            None => allocator.allocate(&in_use)?,
        };

        let taken = self.store.used_path_names(None);
        let path_name = unique_slug(&req.name, taken.iter().map(|s| s.as_str()));

        let camera = Camera {
            id: self.store.next_id(),
            uuid: uuid::Uuid::new_v4().to_string(),
            name: req.name,
            host: req.host,
            port: req.port,
            username: req.username,
            password: req.password,
            main_path: req.main_path,
            sub_path: req.sub_path,
            path_name,
            onvif_port,
            onvif_username: req.onvif_username.unwrap_or_else(|| "admin".to_string()),
            onvif_password: req
                .onvif_password
                .unwrap_or_else(|| config_store::generate_password(16)),
            auto_start: req.auto_start,
            main_width: req.main_width,
            main_height: req.main_height,
            main_framerate: req.main_framerate,
            transcode_main: req.transcode_main,
            sub_width: req.sub_width,
            sub_height: req.sub_height,
            sub_framerate: req.sub_framerate,
            transcode_sub: req.transcode_sub,
            use_virtual_nic: req.use_virtual_nic,
            parent_interface: req.parent_interface,
            nic_mac: req.nic_mac,
            ip_mode: req.ip_mode,
            static_ip: req.static_ip,
            prefix_len: req.prefix_len,
            gateway: req.gateway,
            extra: serde_json::Map::new(),
        };

        if camera.use_virtual_nic && !VnicManager::supported() {
            return Err(Error::Invalid(
                "virtual NICs are not supported on this host".into(),
            ));
        }

        self.store.put_camera(camera.clone())?;
        tracing::info!(id = camera.id, name = %camera.name, "camera created");
        Ok(camera)
    }

    /// Validate, persist, and hot-apply an edit. A running camera is
    /// stopped, updated, and started again.
    pub async fn update_camera(&self, id: u32, mut updated: Camera) -> Result<Camera, Error> {
        let _fleet = self.fleet.read().await;
        self.cancel_inflight(id);
        let lock = self.id_lock(id);
        let _guard = lock.lock().await;

        let existing = self.store.get_camera(id)?;
        let was_running = self.status_of(id).is_active();
        if was_running {
            if let Err(e) = self.stop_locked(&existing).await {
                tracing::warn!(id, "teardown before update reported: {}", e);
            }
        }

        updated.id = id;
        updated.uuid = existing.uuid.clone();
        if updated.name != existing.name {
            // Renames re-slug; other cameras keep their persisted slugs.
            let taken = self.store.used_path_names(Some(id));
            updated.path_name = unique_slug(&updated.name, taken.iter().map(|s| s.as_str()));
        } else {
            updated.path_name = existing.path_name.clone();
        }
        if updated.onvif_port == 0 {
            updated.onvif_port = existing.onvif_port;
        }
        if updated.onvif_username.is_empty() {
            updated.onvif_username = existing.onvif_username.clone();
        }
        if updated.onvif_password.is_empty() {
            updated.onvif_password = existing.onvif_password.clone();
        }
        if updated.use_virtual_nic && !VnicManager::supported() {
            return Err(Error::Invalid(
                "virtual NICs are not supported on this host".into(),
            ));
        }

        self.store.put_camera(updated.clone())?;
        tracing::info!(id, name = %updated.name, "camera updated");

        if was_running {
            let cancel = self.register_cancel(id);
            let result = self.start_locked(id, &cancel).await;
            self.unregister_cancel(id);
            result?;
        }
        Ok(updated)
    }

    /// Stop, remove from the store, release ports, tear down the NIC.
    /// By the time this returns the camera is gone everywhere.
    pub async fn delete_camera(&self, id: u32) -> Result<(), Error> {
        let _fleet = self.fleet.read().await;
        self.cancel_inflight(id);
        let lock = self.id_lock(id);
        let _guard = lock.lock().await;

        let existing = self.store.get_camera(id)?;
        if let Err(e) = self.stop_locked(&existing).await {
            tracing::warn!(id, "teardown during delete reported: {}", e);
        }

        self.store.delete_camera(id)?;
        self.runtime.lock().unwrap().remove(&id);
        self.cancels.lock().unwrap().remove(&id);
        tracing::info!(id, "camera deleted");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub async fn start_camera(&self, id: u32) -> Result<(), Error> {
        let _fleet = self.fleet.read().await;
        let lock = self.id_lock(id);
        let _guard = lock.lock().await;

        let cancel = self.register_cancel(id);
        let result = self.start_locked(id, &cancel).await;
        self.unregister_cancel(id);
        result
    }

    pub async fn stop_camera(&self, id: u32) -> Result<(), Error> {
        let _fleet = self.fleet.read().await;
        self.cancel_inflight(id);
        let lock = self.id_lock(id);
        let _guard = lock.lock().await;

        let camera = self.store.get_camera(id)?;
        self.stop_locked(&camera).await
    }

    /// Start every camera in id order, sequentially, so the media
    /// server sees one reconfiguration at a time.
    pub async fn start_all(&self) -> Vec<(u32, Error)> {
        let ids: Vec<u32> = self.store.list_cameras().iter().map(|c| c.id).collect();
        self.start_many(&ids).await
    }

    /// Start cameras persisted with the auto-start flag (boot path).
    pub async fn start_auto(&self) -> Vec<(u32, Error)> {
        let ids: Vec<u32> = self
            .store
            .list_cameras()
            .iter()
            .filter(|c| c.auto_start)
            .map(|c| c.id)
            .collect();
        self.start_many(&ids).await
    }

    async fn start_many(&self, ids: &[u32]) -> Vec<(u32, Error)> {
        let _fleet = self.fleet.write().await;
        let mut failures = Vec::new();
        for &id in ids {
            let cancel = self.register_cancel(id);
            let result = self.start_locked(id, &cancel).await;
            self.unregister_cancel(id);
            if let Err(e) = result {
                tracing::error!(id, "start failed: {}", e);
                failures.push((id, e));
            }
        }
        failures
    }

    /// Write the baseline configuration and start the media server
    /// before any camera runs, so republished ports are live at boot.
    pub async fn bootstrap_media(&self) -> Result<(), Error> {
        let _fleet = self.fleet.read().await;
        self.apply_active().await
    }

    /// Stop the whole fleet in parallel under one deadline. In-flight
    /// starts are cancelled first and reverse as if they had failed.
    pub async fn stop_all(&self) {
        for token in self.cancels.lock().unwrap().values() {
            token.cancel();
        }
        let _fleet = self.fleet.write().await;

        let cameras: Vec<Camera> = self
            .store
            .list_cameras()
            .into_iter()
            .filter(|c| self.status_of(c.id) != CameraStatus::Stopped)
            .collect();
        if cameras.is_empty() {
            return;
        }

        let stops = cameras.iter().map(|c| async {
            if let Err(e) = self.stop_locked(c).await {
                tracing::warn!(id = c.id, "stop reported: {}", e);
            }
        });
        if tokio::time::timeout(STOP_ALL_DEADLINE, futures::future::join_all(stops))
            .await
            .is_err()
        {
            tracing::warn!("stop_all exceeded its {:?} deadline", STOP_ALL_DEADLINE);
        }
    }

    async fn start_locked(&self, id: u32, cancel: &CancellationToken) -> Result<(), Error> {
        let camera = self.store.get_camera(id)?;
        if self.status_of(id) == CameraStatus::Running {
            return Ok(());
        }

        tracing::info!(id, name = %camera.name, "starting camera");
        self.set_runtime(id, CameraStatus::Starting, None);

        match self.bring_up(&camera, cancel).await {
            Ok(()) => {
                self.set_status(id, CameraStatus::Running);
                tracing::info!(id, "camera running");
                Ok(())
            }
            Err(e) => {
                tracing::error!(id, "start failed, reversing: {}", e);
                self.set_status(id, CameraStatus::Failed);
                if let Some(te) = self.tear_down(&camera).await {
                    tracing::warn!(id, "reversal reported: {}", te);
                }
                self.set_runtime(id, CameraStatus::Failed, Some(e.to_string()));
                Err(e)
            }
        }
    }

    async fn bring_up(&self, camera: &Camera, cancel: &CancellationToken) -> Result<(), Error> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        if camera.use_virtual_nic {
            if !VnicManager::supported() {
                return Err(Error::Invalid(
                    "virtual NICs are not supported on this host".into(),
                ));
            }
            let spec = VnicSpec {
                name: camera.vnic_name(),
                parent: camera.parent_interface.clone(),
                mac: camera.mac_address(),
                ip: match camera.ip_mode {
                    IpMode::Dhcp => IpConfig::Dhcp,
                    IpMode::Static => IpConfig::Static {
                        address: camera.static_ip.clone(),
                        prefix_len: camera.prefix_len,
                        gateway: camera.gateway.clone(),
                    },
                },
            };
            let assigned = self.vnic.create(&spec).await?;
            self.set_ip(camera.id, Some(assigned));
        }

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        self.apply_active().await?;

        for stream in [camera.main_stream_name(), camera.sub_stream_name()] {
            self.media.wait_ready(&stream, cancel).await?;
        }

        let mut endpoint = OnvifEndpoint::new(self.endpoint_config(camera));
        endpoint.start().await?;
        self.endpoints.lock().await.insert(camera.id, endpoint);
        Ok(())
    }

    async fn stop_locked(&self, camera: &Camera) -> Result<(), Error> {
        tracing::info!(id = camera.id, name = %camera.name, "stopping camera");
        self.set_status(camera.id, CameraStatus::Stopping);
        let first_err = self.tear_down(camera).await;
        self.set_status(camera.id, CameraStatus::Stopped);
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Reverse a camera's side effects: endpoint, recipes, NIC. Caller
    /// has already moved the status out of the active set. Collects the
    /// first error and keeps going.
    async fn tear_down(&self, camera: &Camera) -> Option<Error> {
        let mut first_err = None;

        if let Some(mut endpoint) = self.endpoints.lock().await.remove(&camera.id) {
            endpoint.shutdown().await;
        }

        if let Err(e) = self.apply_active().await {
            first_err.get_or_insert(e);
        }

        if camera.use_virtual_nic && VnicManager::supported() {
            self.vnic.remove(&camera.vnic_name()).await;
        }
        self.set_ip(camera.id, None);

        first_err
    }

    /// Recompile recipes for the active set and hand them to the media
    /// server. The configuration is a pure function of that set.
    async fn apply_active(&self) -> Result<(), Error> {
        let settings = self.store.settings();
        let active: Vec<Camera> = self
            .store
            .list_cameras()
            .into_iter()
            .filter(|c| self.status_of(c.id).is_active())
            .collect();
        let yaml = media_recipes::compile(&active, &settings)
            .to_yaml()
            .map_err(|e| Error::Internal(e.to_string()))?;
        self.media.apply(&yaml).await?;
        Ok(())
    }

    fn endpoint_config(&self, camera: &Camera) -> EndpointConfig {
        let settings = self.store.settings();
        let assigned = self.assigned_ip_of(camera.id);
        let bind_ip: IpAddr = assigned
            .as_deref()
            .and_then(|ip| ip.parse().ok())
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        let advertise_ip = assigned.unwrap_or_else(|| advertise_ip(&settings));

        EndpointConfig {
            camera_id: camera.id,
            name: camera.name.clone(),
            uuid: camera.uuid.clone(),
            bind_ip,
            onvif_port: camera.onvif_port,
            advertise_ip,
            rtsp_port: settings.rtsp_port,
            hls_port: settings.hls_port,
            path_name: camera.path_name.clone(),
            credentials: Credentials {
                username: camera.onvif_username.clone(),
                password: camera.onvif_password.clone(),
            },
            main: StreamProfile {
                width: camera.main_width,
                height: camera.main_height,
                framerate: camera.main_framerate,
                bitrate_kbps: MAIN_BITRATE_KBPS,
            },
            sub: StreamProfile {
                width: camera.sub_width,
                height: camera.sub_height,
                framerate: camera.sub_framerate,
                bitrate_kbps: SUB_BITRATE_KBPS,
            },
        }
    }

    // ------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------

    pub fn status_snapshot(&self) -> Vec<StatusEntry> {
        let settings = self.store.settings();
        let advertise = advertise_ip(&settings);
        let runtime = self.runtime.lock().unwrap();
        self.store
            .list_cameras()
            .iter()
            .map(|c| {
                let rt = runtime.get(&c.id).cloned().unwrap_or_default();
                StatusEntry {
                    id: c.id,
                    name: c.name.clone(),
                    status: rt.status,
                    assigned_ip: rt.assigned_ip,
                    last_error: rt.last_error,
                    preview_url: format!(
                        "http://{}:{}/{}_sub/index.m3u8",
                        advertise, settings.hls_port, c.path_name
                    ),
                }
            })
            .collect()
    }

    pub fn vnic_probe(&self) -> VnicProbe {
        VnicProbe {
            supported: VnicManager::supported(),
            parent_interfaces: VnicManager::parent_candidates(),
        }
    }

    // ------------------------------------------------------------------
    // Background supervision
    // ------------------------------------------------------------------

    /// Stream health watchdog. A publisher path that stays ready with
    /// no traffic for too long means a wedged encoder; kill-and-respawn
    /// recovers it. Also reflects a latched-dead media server into the
    /// camera statuses.
    pub async fn run_watchdog(&self) {
        loop {
            tokio::time::sleep(WATCHDOG_INTERVAL).await;
            self.watchdog_tick().await;
        }
    }

    async fn watchdog_tick(&self) {
        if matches!(
            self.media.status().await,
            media_server::Status::Crashed { .. }
        ) {
            self.mark_active_failed("media server is unrecoverable");
            return;
        }

        let Some(stats) = self.media.api().list_paths().await else {
            return;
        };

        let respawn = {
            let now = Instant::now();
            let mut stale = self.stale_since.lock().unwrap();
            stale.retain(|name, _| stats.iter().any(|s| s.name == *name));

            let mut respawn = false;
            for stat in &stats {
                let is_publisher = stat
                    .source
                    .as_ref()
                    .map(|s| s.kind == "publisher")
                    .unwrap_or(false);
                if !(stat.ready && is_publisher) {
                    stale.remove(&stat.name);
                    continue;
                }
                let entry = stale
                    .entry(stat.name.clone())
                    .or_insert((stat.bytes_received, now));
                if entry.0 != stat.bytes_received {
                    *entry = (stat.bytes_received, now);
                } else if now.duration_since(entry.1) > STALE_AFTER {
                    tracing::warn!(path = %stat.name, "stream wedged; scheduling media server respawn");
                    respawn = true;
                }
            }
            respawn
        };

        if respawn {
            if let Err(e) = self.apply_active().await {
                tracing::error!("watchdog respawn failed: {}", e);
            }
            self.stale_since.lock().unwrap().clear();
        }
    }

    fn mark_active_failed(&self, reason: &str) {
        let mut runtime = self.runtime.lock().unwrap();
        for rt in runtime.values_mut() {
            if matches!(rt.status, CameraStatus::Running | CameraStatus::Starting) {
                rt.status = CameraStatus::Failed;
                rt.last_error = Some(reason.to_string());
            }
        }
    }

    // ------------------------------------------------------------------
    // Bookkeeping
    // ------------------------------------------------------------------

    fn id_lock(&self, id: u32) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .unwrap()
            .entry(id)
            .or_default()
            .clone()
    }

    fn register_cancel(&self, id: u32) -> CancellationToken {
        let token = CancellationToken::new();
        self.cancels.lock().unwrap().insert(id, token.clone());
        token
    }

    fn unregister_cancel(&self, id: u32) {
        self.cancels.lock().unwrap().remove(&id);
    }

    fn cancel_inflight(&self, id: u32) {
        if let Some(token) = self.cancels.lock().unwrap().get(&id) {
            token.cancel();
        }
    }

    fn status_of(&self, id: u32) -> CameraStatus {
        self.runtime
            .lock()
            .unwrap()
            .get(&id)
            .map(|rt| rt.status)
            .unwrap_or_default()
    }

    fn assigned_ip_of(&self, id: u32) -> Option<String> {
        self.runtime
            .lock()
            .unwrap()
            .get(&id)
            .and_then(|rt| rt.assigned_ip.clone())
    }

    fn set_status(&self, id: u32, status: CameraStatus) {
        self.runtime.lock().unwrap().entry(id).or_default().status = status;
    }

    fn set_runtime(&self, id: u32, status: CameraStatus, last_error: Option<String>) {
        let mut runtime = self.runtime.lock().unwrap();
        let rt = runtime.entry(id).or_default();
        rt.status = status;
        rt.last_error = last_error;
    }

    fn set_ip(&self, id: u32, ip: Option<String>) {
        self.runtime.lock().unwrap().entry(id).or_default().assigned_ip = ip;
    }
}

/// The address baked into advertised stream and service URLs.
fn advertise_ip(settings: &Settings) -> String {
    match settings.server_ip.as_str() {
        "" | "localhost" | "auto" => {
            onvif_endpoint::local_ip().unwrap_or_else(|| "127.0.0.1".to_string())
        }
        explicit => explicit.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn harness() -> (TempDir, Arc<Supervisor>) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(ConfigStore::open(dir.path().join("cameras.json")).unwrap());
        // `false` exits immediately; these tests never wait on readiness.
        let media = Arc::new(MediaServerController::new(
            "false",
            dir.path().join("media.yml"),
            1,
        ));
        let supervisor = Arc::new(Supervisor::new(store, media, Arc::new(VnicManager::new())));
        (dir, supervisor)
    }

    fn request(name: &str) -> NewCamera {
        NewCamera {
            name: name.to_string(),
            host: "192.0.2.10".to_string(),
            main_path: "/stream1".to_string(),
            sub_path: "/stream2".to_string(),
            ..NewCamera::default()
        }
    }

    #[tokio::test]
    async fn test_create_assigns_id_slug_port() {
        let (_dir, sup) = harness();
        let a = sup.create_camera(request("Front Door")).await.unwrap();
        let b = sup.create_camera(request("Garage")).await.unwrap();

        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        assert_eq!(a.path_name, "front_door");
        assert_eq!(b.path_name, "garage");
        assert_eq!(a.onvif_port, 8001);
        assert_eq!(b.onvif_port, 8002);
        assert_eq!(a.onvif_username, "admin");
        assert_eq!(a.onvif_password.len(), 16);
    }

    #[tokio::test]
    async fn test_create_resolves_slug_collision() {
        let (_dir, sup) = harness();
        sup.create_camera(request("Front Door")).await.unwrap();
        let b = sup.create_camera(request("Front Door")).await.unwrap();
        assert_eq!(b.path_name, "front_door_2");
    }

    #[tokio::test]
    async fn test_create_rejects_port_in_use() {
        let (_dir, sup) = harness();
        let mut req = request("Front Door");
        req.onvif_port = Some(8001);
        sup.create_camera(req).await.unwrap();

        let mut dup = request("Garage");
        dup.onvif_port = Some(8001);
        assert!(matches!(
            sup.create_camera(dup).await,
            Err(Error::PortInUse(8001))
        ));
    }

    #[tokio::test]
    async fn test_port_pool_exhaustion() {
        let (_dir, sup) = harness();
        for i in 0..100 {
            sup.create_camera(request(&format!("Cam {}", i))).await.unwrap();
        }
        assert!(matches!(
            sup.create_camera(request("One Too Many")).await,
            Err(Error::PortExhausted)
        ));
    }

    #[tokio::test]
    async fn test_snapshot_reports_stopped_cameras() {
        let (_dir, sup) = harness();
        sup.create_camera(request("Front Door")).await.unwrap();
        let snapshot = sup.status_snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].status, CameraStatus::Stopped);
        assert!(snapshot[0].last_error.is_none());
        assert!(snapshot[0].preview_url.contains("/front_door_sub/index.m3u8"));
    }

    #[tokio::test]
    async fn test_update_rename_reslugs() {
        let (_dir, sup) = harness();
        let cam = sup.create_camera(request("Front Door")).await.unwrap();
        let mut edited = cam.clone();
        edited.name = "Main Entrance".to_string();
        let updated = sup.update_camera(cam.id, edited).await.unwrap();
        assert_eq!(updated.path_name, "main_entrance");
        assert_eq!(updated.uuid, cam.uuid);
    }

    #[tokio::test]
    async fn test_update_keeps_slug_when_name_unchanged() {
        let (_dir, sup) = harness();
        let cam = sup.create_camera(request("Front Door")).await.unwrap();
        let mut edited = cam.clone();
        edited.transcode_sub = true;
        let updated = sup.update_camera(cam.id, edited).await.unwrap();
        assert_eq!(updated.path_name, "front_door");
        assert!(updated.transcode_sub);
    }

    #[tokio::test]
    async fn test_delete_frees_port_and_slug() {
        let (_dir, sup) = harness();
        let cam = sup.create_camera(request("Front Door")).await.unwrap();
        assert_eq!(cam.onvif_port, 8001);
        sup.delete_camera(cam.id).await.unwrap();

        assert!(sup.store().list_cameras().is_empty());
        let again = sup.create_camera(request("Front Door")).await.unwrap();
        assert_eq!(again.onvif_port, 8001);
        assert_eq!(again.path_name, "front_door");
        assert!(sup.status_snapshot().iter().all(|e| e.id != cam.id));
    }

    #[tokio::test]
    async fn test_start_missing_camera() {
        let (_dir, sup) = harness();
        assert!(matches!(
            sup.start_camera(99).await,
            Err(Error::NotFound(99))
        ));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_failed_nic_start_reverses_and_records_error() {
        let (_dir, sup) = harness();
        let mut req = request("Yard");
        req.use_virtual_nic = true;
        req.parent_interface = "definitely-not-a-nic0".to_string();
        let cam = sup.create_camera(req).await.unwrap();

        let err = sup.start_camera(cam.id).await.unwrap_err();
        assert!(matches!(err, Error::NicCreate(_)));

        let snapshot = sup.status_snapshot();
        let entry = snapshot.iter().find(|e| e.id == cam.id).unwrap();
        assert_eq!(entry.status, CameraStatus::Failed);
        assert!(entry.last_error.is_some());
        assert!(entry.assigned_ip.is_none());
    }

    #[tokio::test]
    async fn test_stop_idle_camera_is_clean() {
        let (_dir, sup) = harness();
        let cam = sup.create_camera(request("Front Door")).await.unwrap();
        sup.stop_camera(cam.id).await.unwrap();
        assert_eq!(sup.status_snapshot()[0].status, CameraStatus::Stopped);
    }

    #[tokio::test]
    async fn test_stop_all_with_empty_fleet() {
        let (_dir, sup) = harness();
        sup.stop_all().await;
    }

    #[tokio::test]
    async fn test_vnic_probe_shape() {
        let (_dir, sup) = harness();
        let probe = sup.vnic_probe();
        if !probe.supported {
            assert!(probe.parent_interfaces.is_empty());
        }
    }
}
