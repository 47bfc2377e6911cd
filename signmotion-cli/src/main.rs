// signmotion Command Line Interface
// Translate text, retarget landmark recordings and play sequences headless

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use parking_lot::Mutex;
use signmotion_core::{
    BoneRotationFrame, LandmarkFrame, MemoryRig, MotionPayload, MotionSequence, RetargetMethod,
    Retargeter, RigBone,
};
use signmotion_engine::{
    AnimationPlayer, EngineConfig, EngineEvent, PlayerEvent, SharedPoseSink, SharedRig,
    TranslationEngine, TranslationStatus,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "signmotion")]
#[command(about = "Motion delivery and playback for text-to-sign avatars", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (JSON or TOML)
    #[arg(long, short, global = true)]
    config: Option<String>,

    /// Log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Request a translation and follow its stream to completion
    Translate {
        /// Text to translate
        text: String,

        /// Continue an existing conversation
        #[arg(long)]
        conversation: Option<String>,

        /// Bearer token for the backend
        #[arg(long)]
        token: Option<String>,

        /// Write the received motion sequence to this file
        #[arg(long, short)]
        output: Option<String>,

        /// Give up after this many seconds
        #[arg(long, default_value = "120")]
        timeout: u64,
    },

    /// Convert a landmark sequence file into bone-rotation frames
    Retarget {
        /// JSON file: frame array, {sequence: [...]} or {motion_sequence: {...}}
        file: String,

        /// Solver (defaults to the configured method)
        #[arg(long, value_enum)]
        method: Option<Method>,

        /// Pretty-print the output
        #[arg(long)]
        pretty: bool,
    },

    /// Play a sequence file against an in-memory rig
    Play {
        /// JSON file with landmark or bone-rotation frames
        file: String,

        /// Progress log interval in milliseconds
        #[arg(long, default_value = "250")]
        progress_ms: u64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Method {
    Ik,
    Direction,
}

impl From<Method> for RetargetMethod {
    fn from(method: Method) -> Self {
        match method {
            Method::Ik => RetargetMethod::Ik,
            Method::Direction => RetargetMethod::Direction,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Translate { text, conversation, token, output, timeout } => {
            translate(config, &text, conversation.as_deref(), token, output.as_deref(), timeout).await?;
        }
        Commands::Retarget { file, method, pretty } => {
            retarget(&config, &file, method, pretty)?;
        }
        Commands::Play { file, progress_ms } => {
            play(&config, &file, progress_ms).await?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&str>) -> anyhow::Result<EngineConfig> {
    let mut config = match path {
        Some(path) => EngineConfig::from_file(path).with_context(|| format!("Failed to load config {}", path))?,
        None => EngineConfig::default(),
    };
    config.apply_env();
    config.validate().map_err(|e| anyhow!("Invalid configuration: {}", e))?;
    Ok(config)
}

fn read_sequence(file: &str) -> anyhow::Result<MotionSequence> {
    let content = std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file))?;
    MotionSequence::from_json(&content).with_context(|| format!("Failed to parse motion sequence in {}", file))
}

fn retargeter(config: &EngineConfig, method: Option<Method>) -> Retargeter {
    let method = method.map(RetargetMethod::from).unwrap_or(config.retarget.method);
    Retargeter::for_method(method, config.retarget.bone_map())
}

fn to_bones(retargeter: &Retargeter, sequence: &MotionSequence) -> Vec<BoneRotationFrame> {
    match sequence {
        MotionSequence::Landmarks(frames) => retargeter.sequence_to_bones(frames),
        MotionSequence::BoneRotations(frames) => frames.clone(),
    }
}

async fn translate(
    mut config: EngineConfig,
    text: &str,
    conversation: Option<&str>,
    token: Option<String>,
    output: Option<&str>,
    timeout: u64,
) -> anyhow::Result<()> {
    if token.is_some() {
        config.api.token = token;
    }
    let engine = TranslationEngine::from_config(config.clone())?;
    let mut events = engine.subscribe();

    let response = engine.translate(text, conversation).await?;
    println!(
        "Conversation: {}  Message: {}",
        response.conversation_id, response.conversation_message_id
    );

    if engine.session_address().is_some() {
        let outcome = tokio::time::timeout(Duration::from_secs(timeout), async {
            loop {
                match events.recv().await {
                    Ok(EngineEvent::Finished { status, .. }) => return Ok(status),
                    Ok(EngineEvent::StatusChanged(status)) => {
                        info!("Status: {}", status);
                        if status == TranslationStatus::Failed && !engine.is_translating() {
                            return Ok(status);
                        }
                    }
                    Ok(EngineEvent::MessageUpdated { status, .. }) => debug!("Message update: {}", status),
                    Ok(EngineEvent::MotionReady { frames, .. }) => info!("Motion ready: {} frames", frames.len()),
                    Ok(EngineEvent::SessionError(error)) => warn!("Stream: {}", error),
                    Err(RecvError::Lagged(skipped)) => warn!("Skipped {} engine events", skipped),
                    Err(RecvError::Closed) => return Err(anyhow!("Engine event channel closed")),
                }
            }
        })
        .await
        .map_err(|_| anyhow!("Timed out after {}s waiting for the translation", timeout))??;

        if outcome == TranslationStatus::Failed {
            let reason = engine
                .session_error()
                .unwrap_or_else(|| "translation failed".to_string());
            bail!("Translation failed: {}", reason);
        }
    } else {
        warn!("Backend returned no stream address, fetching details directly");
    }

    let detail = engine.motion_for(&response.conversation_message_id).await?;
    if let Some(preview) = detail.output_preview.as_deref() {
        println!("Translation: {}", preview);
    }
    if !detail.glosses.is_empty() {
        println!("Glosses: {}", detail.glosses.join(" "));
    }

    let Some(sequence) = detail.motion() else {
        println!("No motion data");
        return Ok(());
    };

    let bones = to_bones(&retargeter(&config, None), sequence);
    print_summary(sequence, &bones);

    if let Some(path) = output {
        let payload = MotionPayload {
            sequence: sequence.clone(),
        };
        std::fs::write(path, serde_json::to_string_pretty(&payload)?)
            .with_context(|| format!("Failed to write {}", path))?;
        println!("Motion sequence written to {}", path);
    }
    Ok(())
}

fn print_summary(sequence: &MotionSequence, bones: &[BoneRotationFrame]) {
    let touched: BTreeSet<&str> = bones
        .iter()
        .flat_map(|frame| frame.bone_rotations.keys().map(String::as_str))
        .collect();
    let total_ms: f64 = bones.iter().map(|frame| frame.duration_ms).sum();

    println!("Source frames: {}", sequence.len());
    println!("Bone frames: {}  Playback: {:.0} ms", bones.len(), total_ms);
    println!("Bones: {}", touched.into_iter().collect::<Vec<_>>().join(", "));
}

fn retarget(config: &EngineConfig, file: &str, method: Option<Method>, pretty: bool) -> anyhow::Result<()> {
    let MotionSequence::Landmarks(frames) = read_sequence(file)? else {
        bail!("{} already contains bone rotations", file);
    };

    let retargeter = retargeter(config, method);
    info!("Retargeting {} frames with the {} solver", frames.len(), retargeter.solver_name());
    let bones = retargeter.sequence_to_bones(&frames);

    let json = if pretty {
        serde_json::to_string_pretty(&bones)?
    } else {
        serde_json::to_string(&bones)?
    };
    println!("{}", json);
    Ok(())
}

async fn play(config: &EngineConfig, file: &str, progress_ms: u64) -> anyhow::Result<()> {
    let sequence = read_sequence(file)?;
    let bone_map = config.retarget.bone_map();

    let rig = Arc::new(Mutex::new(MemoryRig::with_bones(
        RigBone::ALL.iter().filter_map(|bone| bone_map.target(*bone)),
    )));
    let frames: Arc<Mutex<Vec<LandmarkFrame>>> = Arc::new(Mutex::new(Vec::new()));
    let shared_rig: SharedRig = rig.clone();
    let sink: SharedPoseSink = frames.clone();

    let (player, mut events) = AnimationPlayer::new(config.playback.clone());
    let player = player.with_retargeter(retargeter(config, None));
    if !player.play(sequence, shared_rig, Some(sink)) {
        bail!("{} contains no playable frames", file);
    }

    let mut progress = tokio::time::interval(Duration::from_millis(progress_ms.max(1)));
    let started = tokio::time::Instant::now();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(PlayerEvent::Started { run }) => info!("Playback run {} started", run),
                Some(PlayerEvent::Finished { run }) => {
                    info!("Playback run {} finished after {} ms", run, started.elapsed().as_millis());
                    break;
                }
                None => bail!("Player stopped unexpectedly"),
            },
            _ = progress.tick() => {
                info!(
                    "{} ms: {} frames presented",
                    started.elapsed().as_millis(),
                    frames.lock().len()
                );
            }
        }
    }

    let snapshot = rig.lock().snapshot();
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
