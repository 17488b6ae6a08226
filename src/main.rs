//! Capture a run of JPEG stills from a simulated ArduCAM OV5642 into a directory.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::info;
use std::path::PathBuf;

use arducam_rs::arducam::profile::CaptureProfile;
use arducam_rs::arducam::Camera;
use arducam_rs::config::{Config, IdentityPolicy};
use arducam_rs::nvm::DirSink;
use arducam_rs::sim::{synthetic_jpeg, SimArduCam};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Profile {
    LowPower,
    NormalPower,
}

impl From<Profile> for CaptureProfile {
    fn from(p: Profile) -> Self {
        match p {
            Profile::LowPower => CaptureProfile::LowPower,
            Profile::NormalPower => CaptureProfile::NormalPower,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Capture JPEG stills from a simulated ArduCAM module")]
struct Args {
    /// Number of pictures to take.
    #[arg(long, default_value_t = 3)]
    captures: u32,

    /// Directory the numbered files are written to.
    #[arg(long, default_value = "sd")]
    out_dir: PathBuf,

    /// Power profile, defaults to the one selected at build time.
    #[arg(long, value_enum)]
    profile: Option<Profile>,

    /// File name prefix.
    #[arg(long, default_value = "jpss")]
    prefix: String,

    /// Fail bring-up if the sensor is not an OV5642.
    #[arg(long)]
    require_identity: bool,

    /// Size of each simulated JPEG frame in bytes.
    #[arg(long, default_value_t = 24 * 1024)]
    frame_len: usize,
}

/// FIFO contents for one capture: line noise before the frame and padding after it.
fn fifo_image(frame_len: usize, seed: u32) -> Vec<u8> {
    let mut fifo = vec![0x00, 0x12, 0x34];
    fifo.extend(synthetic_jpeg(frame_len, seed));
    fifo.resize(fifo.len() + 8, 0x00);
    fifo
}

fn build_config(args: &Args) -> Result<Config> {
    let mut config = match args.profile {
        Some(profile) => Config::with_profile(profile.into()),
        None => Config::default(),
    };
    config.file_prefix.clear();
    config
        .file_prefix
        .push_str(&args.prefix)
        .map_err(|_| anyhow::anyhow!("prefix {:?} is too long", args.prefix))?;
    if args.require_identity {
        config.identity = IdentityPolicy::Require;
    }
    Ok(config)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = build_config(&args)?;

    let mut sim = SimArduCam::new();
    for seed in 0..args.captures {
        sim = sim.with_frame(&fifo_image(args.frame_len, seed));
    }

    let mut sink = DirSink::new(&args.out_dir)
        .with_context(|| format!("failed to create {}", args.out_dir.display()))?;
    let mut camera = Camera::new(sim.bus(), sim.delay(), config);

    let identity = camera.bring_up().context("bring-up failed")?;
    info!("sensor identity: {:?}", identity);
    camera.configure().context("configuration failed")?;

    let summary = camera.run(&mut sink, args.captures).context("capture run failed")?;
    info!(
        "{} of {} pictures saved to {} ({} ms of settle time)",
        summary.saved,
        summary.requested,
        sink.dir().display(),
        sim.delayed_ms()
    );
    Ok(())
}
