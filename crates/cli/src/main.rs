use std::path::PathBuf;
use std::process;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;

use video_exporter_core::export::session_state::LifecycleState;
use video_exporter_core::export::video_exporter::VideoExporter;
use video_exporter_core::shared::constants::BYTES_PER_PIXEL;
use video_exporter_core::shared::frame::{FrameBuffer, StreamGeometry};
use video_exporter_core::shared::session_config::SessionConfig;

/// Streams synthetic RGBA frames into the background video exporter.
#[derive(Parser)]
#[command(name = "video-exporter")]
struct Cli {
    /// JSON session config; flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory receiving the AVI files.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Base name of the output files.
    #[arg(long)]
    name: Option<String>,

    /// Encoding frame rate.
    #[arg(long)]
    fps: Option<u32>,

    /// Stall timeout in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u32>,

    /// Write `<name>.avi` instead of `<name>000.avi`, `<name>001.avi`, ...
    #[arg(long)]
    no_counter_suffix: bool,

    /// Source frame width.
    #[arg(long, default_value = "320")]
    width: u32,

    /// Source frame height.
    #[arg(long, default_value = "240")]
    height: u32,

    /// Number of frames to push.
    #[arg(long, default_value = "100")]
    frames: u32,

    /// Switch to WIDTHxHEIGHT after this many frames (e.g. 50:640x480).
    #[arg(long)]
    resize_at: Option<String>,

    /// Stop pushing and let the stall timeout close the file instead of terminating.
    #[arg(long)]
    stall: bool,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = build_config(&cli)?;
    let resize = cli.resize_at.as_deref().map(parse_resize).transpose()?;

    let frame_interval = Duration::from_secs(1) / config.frames_per_second.max(1);
    let timeout = Duration::from_millis(u64::from(config.timeout_ms));
    let exporter = VideoExporter::with_ffmpeg(config);
    exporter.initialize();

    let mut geometry = StreamGeometry::new(cli.width, cli.height);
    exporter.on_connect(geometry.width, geometry.height);
    for index in 0..cli.frames {
        if let Some((at, next)) = resize {
            if index == at {
                geometry = next;
                exporter.on_geometry_changed(geometry.width, geometry.height);
            }
        }
        exporter.push_frames(&[gradient_frame(geometry, index)]);
        thread::sleep(frame_interval);
    }

    if cli.stall {
        wait_for_stall(&exporter, timeout);
    } else {
        exporter.terminate();
    }

    match exporter.last_session_report() {
        Some(report) => log::info!(
            "{}: {} frames written, {} failed, ended by {:?}",
            report.path.display(),
            report.frames_written,
            report.write_errors,
            report.end_reason
        ),
        None => log::warn!("No session was recorded"),
    }
    Ok(())
}

fn build_config(cli: &Cli) -> Result<SessionConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };
    if let Some(dir) = &cli.output_dir {
        config.output_directory = dir.clone();
    }
    if let Some(name) = &cli.name {
        config.set_property("outputFileBaseName", name)?;
    }
    if let Some(fps) = cli.fps {
        config.set_property("framesPerSecond", &fps.to_string())?;
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.timeout_ms = timeout_ms;
    }
    if cli.no_counter_suffix {
        config.use_counter_suffix = false;
    }
    Ok(config)
}

fn parse_resize(value: &str) -> Result<(u32, StreamGeometry), String> {
    let invalid = || format!("invalid --resize-at value: {value} (expected N:WxH)");
    let (at, size) = value.split_once(':').ok_or_else(invalid)?;
    let (width, height) = size.split_once('x').ok_or_else(invalid)?;
    let at = at.parse().map_err(|_| invalid())?;
    let width = width.parse().map_err(|_| invalid())?;
    let height = height.parse().map_err(|_| invalid())?;
    Ok((at, StreamGeometry::new(width, height)))
}

/// Blocks until the worker closes the file on its own, bounded by a grace
/// period past the stall timeout.
fn wait_for_stall(exporter: &VideoExporter, timeout: Duration) {
    let deadline = Instant::now() + timeout + Duration::from_secs(5);
    thread::sleep(timeout);
    while exporter.state() != LifecycleState::Idle && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(20));
    }
    if exporter.state() != LifecycleState::Idle {
        log::warn!("Session still active after stall timeout, terminating");
        exporter.terminate();
    }
}

/// Diagonal RGBA gradient that scrolls with `index`.
fn gradient_frame(geometry: StreamGeometry, index: u32) -> FrameBuffer {
    let mut data = Vec::with_capacity(geometry.frame_len());
    for y in 0..geometry.height {
        for x in 0..geometry.width {
            let v = (x + y + index * 4) % 256;
            data.extend_from_slice(&[v as u8, (255 - v) as u8, (index % 256) as u8, 255]);
        }
    }
    debug_assert_eq!(data.len(), geometry.frame_len());
    debug_assert_eq!(data.len() % BYTES_PER_PIXEL, 0);
    FrameBuffer::new(data)
}
