use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::bundle::Bundle;
use crate::clock::{ManualClock, MonotonicClock};
use crate::config::PlayerConfig;
use crate::controls::ControlSurface;
use crate::events::LifecyclePhase;
use crate::gpu::GpuRenderer;
use crate::player::Player;
use crate::render::HeadlessRenderer;
use crate::script_diagnostics::ScriptDiagnostic;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct ViewArgs {
    /// Output width
    #[arg(long, default_value_t = 800)]
    width: u32,

    /// Output height
    #[arg(long, default_value_t = 800)]
    height: u32,

    /// Device pixel ratio applied to the drawing buffer
    #[arg(long, default_value_t = 1.0)]
    pixel_ratio: f32,

    /// Project object labels onto a second, overlay surface
    #[arg(long)]
    label_overlay: bool,

    /// Disable 4x multisampling on the GPU renderer
    #[arg(long)]
    no_antialias: bool,

    /// Surface that receives orbit-control input
    #[arg(long, value_enum, default_value_t = ControlSurface::Primary)]
    controls_surface: ControlSurface,
}

impl ViewArgs {
    fn config(&self) -> PlayerConfig {
        PlayerConfig {
            width: self.width,
            height: self.height,
            pixel_ratio: self.pixel_ratio,
            antialias: !self.no_antialias,
            label_overlay: self.label_overlay,
            controls_surface: self.controls_surface,
            ..Default::default()
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Render frames to disk
    Render {
        /// Project bundle (scene, camera and scripts) as JSON
        #[arg(long)]
        bundle: PathBuf,

        /// Output directory for frames
        #[arg(long)]
        out: PathBuf,

        /// Frames per second
        #[arg(long, default_value_t = 60.0)]
        fps: f32,

        /// Duration in seconds
        #[arg(long, default_value_t = 2.0)]
        duration: f32,

        #[command(flatten)]
        view: ViewArgs,
    },
    /// Run the bundle in real time without a GPU
    Play {
        #[arg(long)]
        bundle: PathBuf,

        /// Duration in seconds
        #[arg(long, default_value_t = 2.0)]
        duration: f32,

        /// Target frame rate of the loop
        #[arg(long, default_value_t = 60.0)]
        fps: f32,

        #[command(flatten)]
        view: ViewArgs,
    },
    /// Load a bundle and print what got bound
    Inspect {
        #[arg(long)]
        bundle: PathBuf,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Render { bundle, out, fps, duration, view } => {
            pollster::block_on(render_offline(bundle, out, fps, duration, view.config()))?;
        }
        Commands::Play { bundle, duration, fps, view } => {
            play_realtime(bundle, duration, fps, view.config())?;
        }
        Commands::Inspect { bundle } => inspect(bundle)?,
    }
    Ok(())
}

fn report_diagnostics(diagnostics: &[ScriptDiagnostic]) {
    for d in diagnostics {
        log::warn!("[{}] {:?}: {}", d.script, d.kind, d.message);
    }
}

async fn render_offline(bundle_path: PathBuf, out_dir: PathBuf, fps: f32, duration: f32, config: PlayerConfig) -> Result<()> {
    anyhow::ensure!(fps > 0.0, "fps must be positive");
    let bundle = Bundle::from_path(&bundle_path)?;

    let total_frames = (duration * fps).ceil() as usize;
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("creating output directory {}", out_dir.display()))?;

    let renderer = GpuRenderer::new(config.width, config.height, config.sample_count()).await?;
    let clock = ManualClock::new();
    let mut player = Player::new(config, Box::new(renderer), Box::new(clock));
    player.load(&bundle)?;
    report_diagnostics(&player.take_diagnostics());

    log::info!("rendering {total_frames} frames to {}", out_dir.display());
    for frame in 0..total_frames {
        let time = frame as f64 / fps as f64;
        player.render(time)?;

        let Some(capture) = player.capture_frame()? else {
            anyhow::bail!("renderer returned no pixels for frame {frame}");
        };
        let path = out_dir.join(format!("frame_{:05}.png", frame));
        image::save_buffer(
            &path,
            &capture.rgba,
            capture.width,
            capture.height,
            image::ExtendedColorType::Rgba8,
        )
        .with_context(|| format!("writing {}", path.display()))?;

        if frame % 60 == 0 {
            log::info!("rendered frame {frame}/{total_frames}");
        }
    }

    player.dispose();
    log::info!("done");
    Ok(())
}

fn play_realtime(bundle_path: PathBuf, duration: f32, fps: f32, config: PlayerConfig) -> Result<()> {
    anyhow::ensure!(fps > 0.0, "fps must be positive");
    let bundle = Bundle::from_path(&bundle_path)?;

    let renderer = HeadlessRenderer::new(config.width, config.height);
    let mut player = Player::new(config, Box::new(renderer), Box::new(MonotonicClock::new()));
    player.load(&bundle)?;
    player.play()?;

    let frame_time = Duration::from_secs_f32(1.0 / fps);
    let deadline = std::time::Instant::now() + Duration::from_secs_f32(duration.max(0.0));
    while std::time::Instant::now() < deadline {
        if !player.animate() {
            log::info!("playback stopped by script");
            break;
        }
        report_diagnostics(&player.take_diagnostics());
        std::thread::sleep(frame_time);
    }

    if player.is_playing() {
        if let Err(e) = player.stop() {
            log::error!("{e}\n{}", e.trace());
        }
    }
    report_diagnostics(&player.take_diagnostics());

    let info = player.render_info();
    log::info!(
        "{} frames, last frame: {} draw calls, {} culled, {} triangles",
        info.frames,
        info.draw_calls,
        info.culled,
        info.triangles
    );
    player.dispose();
    Ok(())
}

#[derive(Serialize)]
struct InspectReport {
    objects: usize,
    scripts: usize,
    handlers: Vec<(LifecyclePhase, usize)>,
    diagnostics: Vec<ScriptDiagnostic>,
}

fn inspect(bundle_path: PathBuf) -> Result<()> {
    let bundle = Bundle::from_path(&bundle_path)?;
    let mut player = Player::headless(PlayerConfig::default());
    player.load(&bundle)?;

    let report = InspectReport {
        objects: player.scene().map_or(0, |s| s.borrow().len()),
        scripts: bundle.script_count(),
        handlers: LifecyclePhase::ALL
            .iter()
            .map(|&phase| (phase, player.handler_count(phase)))
            .collect(),
        diagnostics: player.take_diagnostics(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
