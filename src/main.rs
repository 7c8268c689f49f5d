use std::path::PathBuf;

use clap::Parser;

use flowline::{EffectConfig, FileImageSource, RunOptions, SnapshotOptions};

/// Cursor-reactive feedback effect in a window.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON file with effect parameters; missing keys keep their defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Logo image composited into the cascade
    #[arg(long)]
    logo: Option<String>,

    /// Restart the animation after this many seconds (0 disables looping)
    #[arg(long)]
    loop_duration: Option<f32>,

    /// Enable the half-resolution bloom chain
    #[arg(long)]
    bloom: bool,

    /// Window width in logical pixels
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// Window height in logical pixels
    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Open paused; press Space to start
    #[arg(long)]
    paused: bool,

    /// Render offline on the CPU and write the last frame to this PNG instead of opening a window
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Frames to render in snapshot mode
    #[arg(long, default_value_t = 60)]
    frames: u32,
}

impl Cli {
    fn effect_config(&self) -> Result<EffectConfig, flowline::ConfigError> {
        let mut config = match &self.config {
            Some(path) => EffectConfig::from_path(path)?,
            None => EffectConfig::default(),
        };
        if let Some(logo) = &self.logo {
            config.logo.url = Some(logo.clone());
        }
        if let Some(seconds) = self.loop_duration {
            config.loop_duration = seconds;
        }
        if self.bloom {
            config.bloom.enabled = true;
        }
        Ok(config)
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = cli.effect_config()?;
    log::debug!("effect config: {config:?}");

    match &cli.snapshot {
        Some(path) => {
            let options = SnapshotOptions {
                width: cli.width,
                height: cli.height,
                frames: cli.frames,
                ..Default::default()
            };
            let image = flowline::render_snapshot(config, &options, &FileImageSource)?;
            image.save(path)?;
            log::info!("wrote {}", path.display());
        }
        None => {
            let options = RunOptions {
                paused: cli.paused,
                ..RunOptions::new()
                    .title("flowline")
                    .size(cli.width, cli.height)
                    .config(config)
            };
            flowline::run(options)?;
        }
    }
    Ok(())
}

fn main() {
    env_logger::init();
    if let Err(e) = run(Cli::parse()) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
