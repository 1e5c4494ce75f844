//! Virtual camera gateway host process.
//!
//! Wires the config store, media-server controller, virtual NIC
//! manager, and supervisor together; starts auto-start cameras; and
//! shuts the fleet down cleanly on Ctrl-C.
//!
//! Exit codes: 0 clean shutdown, 1 fatal configuration error, 2 ONVIF
//! port bind failure, 3 media server unrecoverable.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use config_store::ConfigStore;
use media_server::MediaServerController;
use supervisor::{Error as SupError, Supervisor};
use vnic::VnicManager;

const EXIT_CONFIG: i32 = 1;
const EXIT_BIND: i32 = 2;
const EXIT_MEDIA: i32 = 3;

/// How often the media-server child is checked for unexpected exits.
const MONITOR_INTERVAL: Duration = Duration::from_secs(2);

struct Options {
    config_path: PathBuf,
    media_binary: PathBuf,
    debug: bool,
}

fn parse_options() -> Options {
    let mut config_path = env::var("VCAM_CONFIG")
        .unwrap_or_else(|_| "camera_config.json".to_string());
    let mut media_binary = env::var("VCAM_MEDIA_SERVER")
        .unwrap_or_else(|_| "mediamtx".to_string());
    let mut debug = false;

    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => {
                config_path = args[i + 1].clone();
                i += 1;
            }
            "--media-server" if i + 1 < args.len() => {
                media_binary = args[i + 1].clone();
                i += 1;
            }
            "--debug" => debug = true,
            other => {
                eprintln!("Unknown argument: {}", other);
                eprintln!("Usage: vcam-gateway [--config FILE] [--media-server BIN] [--debug]");
                std::process::exit(EXIT_CONFIG);
            }
        }
        i += 1;
    }

    Options {
        config_path: PathBuf::from(config_path),
        media_binary: PathBuf::from(media_binary),
        debug,
    }
}

fn main() -> Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> Result<()> {
    let options = parse_options();

    let default_filter = if options.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    println!("~ VIRTUAL CAMERA GATEWAY ~");
    println!();

    let store = match ConfigStore::open(&options.config_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!(
                "Invalid configuration {}: {}",
                options.config_path.display(),
                e
            );
            std::process::exit(EXIT_CONFIG);
        }
    };
    println!("Configuration: {}", options.config_path.display());

    let settings = store.settings();
    let media_config = options
        .config_path
        .with_file_name("mediamtx.yml");
    let media = Arc::new(MediaServerController::new(
        &options.media_binary,
        media_config,
        settings.api_port,
    ));
    let vnic = Arc::new(VnicManager::new());

    let swept = vnic.sweep().await;
    if swept > 0 {
        println!("Cleaned up {} stale virtual interfaces", swept);
    }

    let supervisor = Arc::new(Supervisor::new(store.clone(), media.clone(), vnic));

    if let Err(e) = supervisor.bootstrap_media().await {
        eprintln!("Media server failed to start: {}", e);
        std::process::exit(EXIT_MEDIA);
    }
    println!(
        "Media server running (RTSP :{}, HLS :{}, API :{})",
        settings.rtsp_port, settings.hls_port, settings.api_port
    );

    {
        let media = media.clone();
        tokio::spawn(async move { media.run_monitor(MONITOR_INTERVAL).await });
    }
    {
        let supervisor = supervisor.clone();
        tokio::spawn(async move { supervisor.run_watchdog().await });
    }

    let failures = supervisor.start_auto().await;
    if !failures.is_empty() {
        for (id, e) in &failures {
            eprintln!("Camera {} failed to start: {}", id, e);
        }
        if failures.iter().any(|(_, e)| matches!(e, SupError::MediaDead)) {
            std::process::exit(EXIT_MEDIA);
        }
        if failures.iter().any(|(_, e)| matches!(e, SupError::Bind(_))) {
            std::process::exit(EXIT_BIND);
        }
    }

    let running = supervisor
        .status_snapshot()
        .iter()
        .filter(|e| e.status == supervisor::CameraStatus::Running)
        .count();
    println!("{} camera(s) running. Press Ctrl-C to stop.", running);

    tokio::signal::ctrl_c().await?;
    println!();
    println!("Shutting down...");

    supervisor.stop_all().await;
    media.stop().await;
    println!("Goodbye.");
    Ok(())
}
