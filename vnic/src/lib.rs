//! Virtual NIC management.
//!
//! Creates macvlan child interfaces on a parent interface so each
//! virtual camera can present its own MAC (and IP) on the LAN. The
//! kernel networking namespace is a shared resource: all mutating
//! operations are serialized through an internal lock.
//!
//! Interfaces are tagged `vcam<id>` so stale ones from a previous crash
//! can be swept at startup.

mod error;
mod iproute;

use std::path::Path;
use std::time::Duration;

use tokio::sync::Mutex;

pub use error::VnicError;

use iproute::{parse_inet4, run, run_best_effort, run_ok};

/// How a virtual NIC obtains its address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpConfig {
    Dhcp,
    Static {
        address: String,
        prefix_len: u8,
        gateway: String,
    },
}

/// Everything needed to bring up one camera's child interface.
#[derive(Debug, Clone)]
pub struct VnicSpec {
    /// Kernel interface name, `vcam<id>`.
    pub name: String,
    /// Parent (physical) interface.
    pub parent: String,
    /// Locally-administered MAC to assign.
    pub mac: String,
    pub ip: IpConfig,
}

/// Seconds to wait for a DHCP lease before giving up.
const DHCP_LEASE_TIMEOUT_SECS: u64 = 15;

/// Metric for the interface-scoped default route of static vNICs. High
/// enough that the host's primary route always wins.
const STATIC_ROUTE_METRIC: &str = "32000";

pub struct VnicManager {
    netns: Mutex<()>,
}

impl Default for VnicManager {
    fn default() -> Self {
        Self::new()
    }
}

impl VnicManager {
    pub fn new() -> Self {
        Self { netns: Mutex::new(()) }
    }

    /// Capability probe. Hosts without macvlan support must reject
    /// camera records that enable the feature instead of silently
    /// ignoring them.
    pub fn supported() -> bool {
        cfg!(target_os = "linux") && Path::new("/sys/class/net").exists()
    }

    /// Physical interfaces that can parent a macvlan.
    pub fn parent_candidates() -> Vec<String> {
        let Ok(entries) = std::fs::read_dir("/sys/class/net") else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .flatten()
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|name| name != "lo")
            .filter(|name| Path::new("/sys/class/net").join(name).join("device").exists())
            .collect();
        names.sort();
        names
    }

    pub fn interface_exists(name: &str) -> bool {
        Path::new("/sys/class/net").join(name).exists()
    }

    /// Create and configure a child interface, returning the address it
    /// ended up with.
    ///
    /// Idempotent: an interface left over from an earlier start is
    /// deleted and recreated, so a second start of the same camera
    /// succeeds. On any failure the partially created interface is torn
    /// down before the error is returned.
    pub async fn create(&self, spec: &VnicSpec) -> Result<String, VnicError> {
        if !Self::supported() {
            return Err(VnicError::Unsupported);
        }
        let _guard = self.netns.lock().await;

        if !Self::interface_exists(&spec.parent) {
            return Err(VnicError::Create(format!(
                "parent interface '{}' does not exist",
                spec.parent
            )));
        }

        tracing::info!(
            name = %spec.name,
            parent = %spec.parent,
            mac = %spec.mac,
            "creating virtual NIC"
        );

        // macvlan in bridge mode usually needs the parent in promisc.
        run_best_effort("ip", &["link", "set", &spec.parent, "promisc", "on"]).await;

        if Self::interface_exists(&spec.name) {
            run_best_effort("ip", &["link", "delete", &spec.name]).await;
        }

        run_ok(
            "ip",
            &[
                "link", "add", &spec.name, "link", &spec.parent, "type", "macvlan",
                "mode", "bridge",
            ],
        )
        .await
        .map_err(VnicError::Create)?;

        let result = self.configure(spec).await;
        if result.is_err() {
            self.teardown(&spec.name).await;
        }
        result
    }

    async fn configure(&self, spec: &VnicSpec) -> Result<String, VnicError> {
        run_ok("ip", &["link", "set", &spec.name, "address", &spec.mac])
            .await
            .map_err(VnicError::Create)?;
        run_ok("ip", &["link", "set", &spec.name, "up"])
            .await
            .map_err(VnicError::Create)?;

        // ARP isolation keeps the host from answering for the virtual
        // address on the parent interface (ARP flux).
        run_best_effort(
            "sysctl",
            &["-w", &format!("net.ipv4.conf.{}.arp_ignore=1", spec.name)],
        )
        .await;
        run_best_effort(
            "sysctl",
            &["-w", &format!("net.ipv4.conf.{}.arp_announce=2", spec.name)],
        )
        .await;

        match &spec.ip {
            IpConfig::Dhcp => self.acquire_lease(&spec.name).await,
            IpConfig::Static {
                address,
                prefix_len,
                gateway,
            } => {
                run_ok(
                    "ip",
                    &[
                        "addr", "add",
                        &format!("{}/{}", address, prefix_len),
                        "dev", &spec.name,
                    ],
                )
                .await
                .map_err(VnicError::StaticAssign)?;

                if !gateway.is_empty() {
                    run_ok(
                        "ip",
                        &[
                            "route", "add", "default", "via", gateway, "dev", &spec.name,
                            "metric", STATIC_ROUTE_METRIC,
                        ],
                    )
                    .await
                    .map_err(VnicError::StaticAssign)?;
                }

                tracing::info!(name = %spec.name, address = %address, "static address assigned");
                Ok(address.clone())
            }
        }
    }

    /// Spawn a DHCP client on the interface and poll for a lease.
    async fn acquire_lease(&self, name: &str) -> Result<String, VnicError> {
        tracing::info!(name = %name, "requesting DHCP lease ({}s timeout)", DHCP_LEASE_TIMEOUT_SECS);

        // Clear any stale client state, then request in the background.
        run_best_effort("dhclient", &["-r", name]).await;
        run_best_effort("dhclient", &["-1", "-nw", name]).await;

        for _ in 0..DHCP_LEASE_TIMEOUT_SECS {
            let out = run("ip", &["-4", "addr", "show", name]).await?;
            if let Some(addr) = parse_inet4(&String::from_utf8_lossy(&out.stdout)) {
                tracing::info!(name = %name, address = %addr, "DHCP lease obtained");
                return Ok(addr);
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        Err(VnicError::Lease(format!(
            "no address on {} after {}s",
            name, DHCP_LEASE_TIMEOUT_SECS
        )))
    }

    /// Release the lease (if any) and delete the interface. Safe to
    /// call on interfaces that no longer exist.
    pub async fn remove(&self, name: &str) {
        if !Self::supported() {
            return;
        }
        let _guard = self.netns.lock().await;
        self.teardown(name).await;
    }

    async fn teardown(&self, name: &str) {
        tracing::info!(name = %name, "removing virtual NIC");
        run_best_effort("dhclient", &["-r", name]).await;
        run_best_effort("ip", &["link", "delete", name]).await;
    }

    /// Delete stale `vcam*` interfaces left behind by a previous crash.
    /// Returns how many were removed.
    pub async fn sweep(&self) -> usize {
        if !Self::supported() {
            return 0;
        }
        let stale: Vec<String> = match std::fs::read_dir("/sys/class/net") {
            Ok(entries) => entries
                .flatten()
                .filter_map(|e| e.file_name().into_string().ok())
                .filter(|name| name.starts_with("vcam"))
                .collect(),
            Err(_) => return 0,
        };

        let _guard = self.netns.lock().await;
        for name in &stale {
            tracing::warn!(name = %name, "sweeping stale virtual NIC");
            self.teardown(name).await;
        }
        stale.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_hosts_reject_create() {
        if VnicManager::supported() {
            return;
        }
        let mgr = VnicManager::new();
        let spec = VnicSpec {
            name: "vcam1".into(),
            parent: "eth0".into(),
            mac: "02:00:00:00:00:01".into(),
            ip: IpConfig::Dhcp,
        };
        let err = tokio::runtime::Runtime::new()
            .unwrap()
            .block_on(mgr.create(&spec));
        assert!(matches!(err, Err(VnicError::Unsupported)));
    }

    #[tokio::test]
    async fn test_create_fails_for_missing_parent() {
        if !VnicManager::supported() {
            return;
        }
        let mgr = VnicManager::new();
        let spec = VnicSpec {
            name: "vcam909".into(),
            parent: "definitely-not-a-nic0".into(),
            mac: "02:00:00:00:00:01".into(),
            ip: IpConfig::Dhcp,
        };
        match mgr.create(&spec).await {
            Err(VnicError::Create(msg)) => assert!(msg.contains("does not exist")),
            other => panic!("expected Create error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_remove_missing_interface_is_quiet() {
        let mgr = VnicManager::new();
        mgr.remove("vcam424242").await;
    }
}
