use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use reverie::audio::{AudioBackend, AudioBuffer, OfflineBackend};
use reverie::{GeneratedArtifact, MeditationConfig, PhaseSequencer, SessionEvent};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str =
    "usage: reverie <artifact.json> [config.toml] [--device | --record <out.wav>]";

struct Args {
    artifact: PathBuf,
    config: Option<PathBuf>,
    device: bool,
    record: Option<PathBuf>,
}

fn parse_args() -> Result<Args> {
    let mut positional = Vec::new();
    let mut device = false;
    let mut record = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--device" => device = true,
            "--record" => match args.next() {
                Some(path) => record = Some(PathBuf::from(path)),
                None => bail!(USAGE),
            },
            "-h" | "--help" => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            _ => positional.push(PathBuf::from(arg)),
        }
    }

    let mut positional = positional.into_iter();
    let Some(artifact) = positional.next() else {
        bail!(USAGE);
    };
    if device && record.is_some() {
        bail!("--record only works with the offline backend");
    }
    Ok(Args {
        artifact,
        config: positional.next(),
        device,
        record,
    })
}

type Capture = Arc<Mutex<Vec<f32>>>;

fn select_backend(
    config: &MeditationConfig,
    args: &Args,
) -> Result<(Arc<dyn AudioBackend>, Option<Capture>)> {
    if args.device {
        #[cfg(feature = "audio-io")]
        return Ok((Arc::new(reverie::audio::DeviceBackend::new()), None));
        #[cfg(not(feature = "audio-io"))]
        bail!("--device needs the audio-io feature");
    }

    let backend = OfflineBackend::new(config.offline_sample_rate, config.offline_block());
    if args.record.is_some() {
        let (backend, capture) = backend.with_capture();
        return Ok((Arc::new(backend), Some(capture)));
    }
    Ok((Arc::new(backend), None))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reverie=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = parse_args()?;

    let config = match &args.config {
        Some(path) => MeditationConfig::load(path)?,
        None => MeditationConfig::default(),
    };
    config.validate()?;

    let text = tokio::fs::read_to_string(&args.artifact)
        .await
        .with_context(|| format!("Failed to read {:?}", args.artifact))?;
    let artifact: GeneratedArtifact =
        serde_json::from_str(&text).context("Failed to parse artifact")?;

    let sample_rate = config.offline_sample_rate;
    let (backend, capture) = select_backend(&config, &args)?;
    info!(
        "Playing '{}' on the {} backend",
        artifact.scenario_title,
        backend.name()
    );

    let sequencer = PhaseSequencer::new(config, backend);
    let events = sequencer.events();
    let (done_tx, done_rx) = oneshot::channel();
    sequencer.start(&artifact, move || {
        let _ = done_tx.send(());
    })?;

    // Events arrive on a crossbeam channel; drain them off the runtime
    let logger = tokio::task::spawn_blocking(move || {
        while let Ok(event) = events.recv() {
            match event {
                SessionEvent::PhaseChanged(phase) => info!("Phase: {}", phase.headline()),
                SessionEvent::NarrationStarted => info!("Narration started"),
                SessionEvent::NarrationFinished => info!("Narration finished"),
                SessionEvent::AudioBlocked => warn!("Audio blocked"),
                SessionEvent::Closed => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = done_rx => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("Failed to listen for Ctrl-C: {}", e);
            }
            info!("Interrupted, closing session");
            sequencer.close();
        }
    }

    if let Err(e) = logger.await {
        warn!("Event logger stopped: {}", e);
    }
    let snapshot = sequencer.snapshot();
    info!("Session ended at {:.0}%", snapshot.progress);

    if let (Some(path), Some(capture)) = (&args.record, capture) {
        let samples = std::mem::take(&mut *capture.lock());
        AudioBuffer::new(samples, sample_rate, 1).write_wav(path)?;
    }
    Ok(())
}
