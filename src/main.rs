use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tempo_sync::engine::output::{cpal_backend::CpalBackend, AudioOutput};
use tempo_sync::{EngineConfig, EngineError, PlaybackEngine};

#[derive(Parser, Debug)]
#[command(name = "tempo-sync")]
#[command(about = "Plays a media file with adjustable tempo and pitch")]
#[command(version)]
struct Args {
    /// Media file to play
    file: PathBuf,

    /// Playback tempo, 0.5 to 1.7
    #[arg(long, default_value_t = 1.0)]
    tempo: f64,

    /// Pitch shift in semitones
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pitch: f64,

    /// Linear output gain
    #[arg(long, default_value_t = 1.0)]
    volume: f32,

    /// Start position in milliseconds
    #[arg(long)]
    seek_ms: Option<f64>,

    /// TOML engine configuration
    #[arg(short, long, env = "TEMPO_SYNC_CONFIG")]
    config: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tempo_sync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run(Args::parse()) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), EngineError> {
    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    let engine = Arc::new(PlaybackEngine::new(config)?);
    let mut output = CpalBackend::new(engine.clone())?;

    if !engine.open_path(&args.file) {
        return Err(EngineError::InvalidState(format!("cannot open {}", args.file.display())));
    }

    engine.set_tempo(args.tempo);
    engine.set_pitch(args.pitch);
    engine.set_volume(args.volume);
    if let Some(ms) = args.seek_ms {
        engine.seek(ms);
    }

    output.start()?;
    engine.play();
    info!("Playing {} ({:.1}s)", args.file.display(), engine.duration_ms() / 1000.0);

    let mut last_position = None;
    loop {
        thread::sleep(Duration::from_secs(1));
        let position = engine.position_frames();
        println!(
            "Playback time: {:.2} / {:.2} seconds",
            engine.position_secs(),
            engine.duration_ms() / 1000.0
        );

        // Stalled with nothing buffered: the stream has ended
        if last_position == Some(position) && engine.buffered_frames() == 0 {
            break;
        }
        last_position = Some(position);
    }

    output.stop()?;
    engine.dispose();
    info!("Playback finished");
    Ok(())
}
