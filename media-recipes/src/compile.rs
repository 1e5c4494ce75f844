use std::collections::BTreeMap;

use config_store::{Camera, Settings};

use crate::recipe::{MediaServerConfig, PathRecipe};

/// Timeout applied when pulling upstream sources.
const SOURCE_TIMEOUT: &str = "10s";

/// Seconds an encoder loop sleeps between restarts, bounding the
/// restart rate when an upstream is down.
const ENCODER_RESTART_DELAY_SECS: u32 = 2;

/// Compile the media-server configuration for the given cameras.
///
/// Callers pass the *active* camera set (starting or running); stopped
/// cameras must not appear in the document at all.
pub fn compile(cameras: &[Camera], settings: &Settings) -> MediaServerConfig {
    let mut sorted: Vec<&Camera> = cameras.iter().collect();
    sorted.sort_by_key(|c| c.id);

    let mut paths = BTreeMap::new();
    for camera in sorted {
        paths.insert(
            camera.main_stream_name(),
            stream_recipe(
                camera,
                &camera.main_url(),
                &camera.main_stream_name(),
                camera.transcode_main,
                StreamTier::Main,
                settings.rtsp_port,
            ),
        );
        paths.insert(
            camera.sub_stream_name(),
            stream_recipe(
                camera,
                &camera.sub_url(),
                &camera.sub_stream_name(),
                camera.transcode_sub,
                StreamTier::Sub,
                settings.rtsp_port,
            ),
        );
    }

    MediaServerConfig {
        rtsp_address: format!(":{}", settings.rtsp_port),
        rtsp_transports: vec!["tcp".to_string()],
        hls_address: format!(":{}", settings.hls_port),
        hls_always_remux: true,
        hls_variant: "fmp4".to_string(),
        hls_segment_count: 10,
        hls_segment_duration: "1s".to_string(),
        hls_part_duration: "200ms".to_string(),
        hls_allow_origin: "*".to_string(),
        api: true,
        api_address: format!(":{}", settings.api_port),
        read_timeout: SOURCE_TIMEOUT.to_string(),
        write_timeout: SOURCE_TIMEOUT.to_string(),
        write_queue_size: 2048,
        log_level: "warn".to_string(),
        paths,
    }
}

/// Which of the camera's two streams a recipe serves. Main and sub get
/// different encoder levels and bitrates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamTier {
    Main,
    Sub,
}

fn stream_recipe(
    camera: &Camera,
    upstream: &str,
    stream_name: &str,
    transcode: bool,
    tier: StreamTier,
    rtsp_port: u16,
) -> PathRecipe {
    if !transcode {
        return PathRecipe {
            source: upstream.to_string(),
            run_on_init: None,
            run_on_init_restart: false,
            rtsp_transport: "tcp".to_string(),
            source_on_demand: false,
            source_on_demand_start_timeout: Some(SOURCE_TIMEOUT.to_string()),
            record: false,
        };
    }

    let (width, height, framerate) = match tier {
        StreamTier::Main => (camera.main_width, camera.main_height, camera.main_framerate),
        StreamTier::Sub => (camera.sub_width, camera.sub_height, camera.sub_framerate),
    };
    let dest = format!("rtsp://127.0.0.1:{}/{}", rtsp_port, stream_name);
    let encoder = encoder_command(upstream, &dest, width, height, framerate, tier);

    PathRecipe {
        source: "publisher".to_string(),
        run_on_init: Some(restart_loop(&encoder)),
        run_on_init_restart: false,
        rtsp_transport: "tcp".to_string(),
        source_on_demand: false,
        source_on_demand_start_timeout: None,
        record: false,
    }
}

/// Build the encoder invocation for one stream.
pub fn encoder_command(
    input: &str,
    output: &str,
    width: u32,
    height: u32,
    framerate: u32,
    tier: StreamTier,
) -> String {
    let (level, gop, video_kbps, audio_kbps) = match tier {
        StreamTier::Main => ("4.0", framerate * 4, 2500, 128),
        StreamTier::Sub => ("3.0", framerate, 800, 64),
    };

    format!(
        "ffmpeg -hide_banner -loglevel warning -nostdin \
-rtsp_transport tcp -use_wallclock_as_timestamps 1 \
-i {input} \
-vf \"scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,format=yuv420p\" \
-c:v libx264 -profile:v baseline -level:v {level} -preset ultrafast -tune zerolatency \
-threads 2 -g {gop} -keyint_min {fps} -sc_threshold 0 \
-x264-params force-cfr=1:nal-hrd=vbr:rc-lookahead=0 -bf 0 \
-b:v {vb}k -maxrate {vb}k -bufsize {vb}k \
-r {fps} -c:a aac -ar 44100 -b:a {ab}k -f rtsp {output}",
        input = sh_quote(input),
        output = sh_quote(output),
        w = width,
        h = height,
        level = level,
        gop = gop,
        fps = framerate,
        vb = video_kbps,
        ab = audio_kbps,
    )
}

/// Wrap a command in a shell loop that restarts it forever.
///
/// Two contracts: the encoder is always a child of the shell, so
/// killing the shell reclaims the whole tree; and the loop never
/// restarts faster than once per `ENCODER_RESTART_DELAY_SECS`.
#[cfg(not(windows))]
pub fn restart_loop(command: &str) -> String {
    format!(
        "/bin/sh -c {}",
        sh_quote(&format!(
            "while true; do {}; sleep {}; done",
            command, ENCODER_RESTART_DELAY_SECS
        ))
    )
}

#[cfg(windows)]
pub fn restart_loop(command: &str) -> String {
    // (0,0,1) never advances, so the FOR loop runs forever.
    format!(
        "cmd /c \"for /l %x in (0,0,1) do ({} & timeout /t {} /nobreak >nul)\"",
        command, ENCODER_RESTART_DELAY_SECS
    )
}

/// POSIX single-quote escaping: `'` becomes `'\''`.
fn sh_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
