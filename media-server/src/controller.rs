//! Lifecycle of the external media-server process.

use std::collections::VecDeque;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::api::ApiClient;
use crate::error::MediaError;

/// Grace period between SIGTERM and SIGKILL on stop.
const STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Crash policy: at most this many restarts per rolling window, then
/// the controller latches dead.
const MAX_RESTARTS: usize = 5;
const RESTART_WINDOW: Duration = Duration::from_secs(60);

/// Readiness polling.
const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);
const READY_TIMEOUT: Duration = Duration::from_secs(20);

/// Reported process state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    NotStarted,
    Running { pid: u32, since_secs: u64 },
    Crashed { exit_code: Option<i32> },
}

enum State {
    NotStarted,
    Running {
        child: Child,
        pid: u32,
        since: Instant,
        restarts: VecDeque<Instant>,
    },
    Crashed {
        exit_code: Option<i32>,
    },
}

/// Owns the media-server child process and its configuration file.
///
/// Nothing else writes the configuration file. All lifecycle operations
/// go through a single lock, so concurrent `apply` calls queue up
/// instead of racing the process handle.
pub struct MediaServerController {
    binary: PathBuf,
    config_path: PathBuf,
    api: ApiClient,
    state: Mutex<State>,
}

impl MediaServerController {
    pub fn new(binary: impl Into<PathBuf>, config_path: impl Into<PathBuf>, api_port: u16) -> Self {
        Self {
            binary: binary.into(),
            config_path: config_path.into(),
            api: ApiClient::new(api_port),
            state: Mutex::new(State::NotStarted),
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Write the configuration atomically, then start the process or
    /// respawn it so the new configuration takes effect.
    pub async fn apply(&self, config_yaml: &str) -> Result<(), MediaError> {
        let mut state = self.state.lock().await;

        if let State::Crashed { .. } = *state {
            return Err(MediaError::Dead);
        }

        self.write_config(config_yaml)?;

        match std::mem::replace(&mut *state, State::NotStarted) {
            State::Running {
                mut child,
                pid,
                restarts,
                ..
            } => {
                tracing::info!(pid, "respawning media server with new configuration");
                terminate(&mut child, STOP_TIMEOUT).await;
                let child = self.spawn()?;
                let pid = child.id().unwrap_or_default();
                *state = State::Running {
                    child,
                    pid,
                    since: Instant::now(),
                    restarts,
                };
            }
            _ => {
                tracing::info!("starting media server");
                let child = self.spawn()?;
                let pid = child.id().unwrap_or_default();
                *state = State::Running {
                    child,
                    pid,
                    since: Instant::now(),
                    restarts: VecDeque::new(),
                };
            }
        }

        Ok(())
    }

    /// Terminate the process and reset the crash latch.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        if let State::Running { mut child, pid, .. } =
            std::mem::replace(&mut *state, State::NotStarted)
        {
            tracing::info!(pid, "stopping media server");
            terminate(&mut child, STOP_TIMEOUT).await;
        }
    }

    pub async fn status(&self) -> Status {
        match &*self.state.lock().await {
            State::NotStarted => Status::NotStarted,
            State::Running { pid, since, .. } => Status::Running {
                pid: *pid,
                since_secs: since.elapsed().as_secs(),
            },
            State::Crashed { exit_code } => Status::Crashed {
                exit_code: *exit_code,
            },
        }
    }

    /// One supervision tick: reap an unexpected exit and restart within
    /// budget, or latch dead once the budget is spent.
    ///
    /// Returns `true` when a restart happened.
    pub async fn check_and_restart(&self) -> Result<bool, MediaError> {
        let mut state = self.state.lock().await;

        let State::Running { child, restarts, .. } = &mut *state else {
            return Ok(false);
        };

        let exit = match child.try_wait()? {
            Some(status) => status,
            None => return Ok(false),
        };

        let now = Instant::now();
        while let Some(front) = restarts.front() {
            if now.duration_since(*front) > RESTART_WINDOW {
                restarts.pop_front();
            } else {
                break;
            }
        }

        if restarts.len() >= MAX_RESTARTS {
            tracing::error!(
                exit = ?exit.code(),
                "media server exceeded {} restarts in {:?}; giving up",
                MAX_RESTARTS,
                RESTART_WINDOW
            );
            *state = State::Crashed {
                exit_code: exit.code(),
            };
            return Ok(false);
        }

        tracing::warn!(
            exit = ?exit.code(),
            attempt = restarts.len() + 1,
            "media server exited unexpectedly; restarting"
        );
        let mut restarts = std::mem::take(restarts);
        restarts.push_back(now);
        let child = self.spawn()?;
        let pid = child.id().unwrap_or_default();
        *state = State::Running {
            child,
            pid,
            since: now,
            restarts,
        };
        Ok(true)
    }

    /// Supervision loop; spawn this once at startup.
    pub async fn run_monitor(&self, interval: Duration) {
        loop {
            tokio::time::sleep(interval).await;
            if let Err(e) = self.check_and_restart().await {
                tracing::error!("media server supervision failed: {}", e);
            }
        }
    }

    /// Poll the control API until the named path reports ready.
    pub async fn wait_ready(
        &self,
        path_name: &str,
        cancel: &CancellationToken,
    ) -> Result<(), MediaError> {
        self.wait_ready_within(path_name, READY_TIMEOUT, cancel).await
    }

    pub async fn wait_ready_within(
        &self,
        path_name: &str,
        budget: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), MediaError> {
        let deadline = Instant::now() + budget;
        loop {
            if self.api.path_ready(path_name).await {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(MediaError::Timeout(format!("stream '{}'", path_name)));
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(MediaError::Cancelled),
                _ = tokio::time::sleep(READY_POLL_INTERVAL) => {}
            }
        }
    }

    fn spawn(&self) -> Result<Child, MediaError> {
        Command::new(&self.binary)
            .arg(&self.config_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MediaError::Spawn(format!("{}: {}", self.binary.display(), e)))
    }

    fn write_config(&self, config_yaml: &str) -> Result<(), MediaError> {
        let dir = self
            .config_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(config_yaml.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.config_path)
            .map_err(|e| MediaError::Io(e.error))?;
        Ok(())
    }
}

/// SIGTERM, wait out the grace period, then SIGKILL and reap.
async fn terminate(child: &mut Child, grace: Duration) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
    }

    if tokio::time::timeout(grace, child.wait()).await.is_err() {
        let _ = child.kill().await;
        let _ = child.wait().await;
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn controller(dir: &TempDir, binary: &str) -> MediaServerController {
        MediaServerController::new(binary, dir.path().join("media.yml"), 1)
    }

    #[tokio::test]
    async fn test_apply_writes_config_and_spawns() {
        let dir = TempDir::new().unwrap();
        let ctl = controller(&dir, "sleep");

        // `sleep` without a numeric argument exits immediately, which is
        // fine: apply only asserts the spawn itself.
        ctl.apply("paths: {}\n").await.unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("media.yml")).unwrap(),
            "paths: {}\n"
        );
        assert!(matches!(ctl.status().await, Status::Running { .. }));
        ctl.stop().await;
        assert_eq!(ctl.status().await, Status::NotStarted);
    }

    #[tokio::test]
    async fn test_spawn_failure_surfaces() {
        let dir = TempDir::new().unwrap();
        let ctl = controller(&dir, "/nonexistent/media-server-binary");
        let err = ctl.apply("paths: {}\n").await.unwrap_err();
        assert!(matches!(err, MediaError::Spawn(_)));
    }

    #[tokio::test]
    async fn test_restart_budget_latches_dead() {
        let dir = TempDir::new().unwrap();
        // `false` exits with code 1 immediately: a crash every tick.
        let ctl = controller(&dir, "false");
        ctl.apply("paths: {}\n").await.unwrap();

        let mut restarts = 0;
        for _ in 0..40 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            match ctl.check_and_restart().await.unwrap() {
                true => restarts += 1,
                false => {
                    if matches!(ctl.status().await, Status::Crashed { .. }) {
                        break;
                    }
                }
            }
        }

        assert_eq!(restarts, MAX_RESTARTS);
        assert!(matches!(
            ctl.status().await,
            Status::Crashed { exit_code: Some(1) }
        ));

        // Applies are refused until stop() resets the latch.
        assert!(matches!(
            ctl.apply("paths: {}\n").await,
            Err(MediaError::Dead)
        ));
        ctl.stop().await;
        ctl.apply("paths: {}\n").await.unwrap();
        ctl.stop().await;
    }

    #[tokio::test]
    async fn test_wait_ready_times_out_without_api() {
        let dir = TempDir::new().unwrap();
        let ctl = controller(&dir, "false");
        let cancel = CancellationToken::new();
        let err = ctl
            .wait_ready_within("front_door_main", Duration::from_millis(400), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_wait_ready_observes_cancellation() {
        let dir = TempDir::new().unwrap();
        let ctl = controller(&dir, "false");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = ctl
            .wait_ready_within("front_door_main", Duration::from_secs(5), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Cancelled));
    }
}
