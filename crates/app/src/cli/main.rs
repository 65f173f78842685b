//! Parley CLI Application

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use parley_core::domain::audio::{OutputLine, SourceClass, SourceId};
use parley_core::domain::config::{
    ConfigManager, ConfigWatcher, ParleyConfig, ENV_AZURE_KEY, ENV_AZURE_REGION,
};
use parley_core::domain::synthesis::{PlaybackRequest, SpeechSynthesizer};
use parley_core::domain::voice::UnknownGender;
use parley_infra::audio::{list_output_devices, CpalOutputLine, SpeechMixer};
use parley_infra::playback::{
    Dispatch, LogNotifier, NarrationEvent, Narrator, PlaybackContext, PlaybackOrchestrator,
};
use parley_infra::synthesis::AzureSynthesizer;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Longest the CLI waits for queued speech to finish playing
const PLAYBACK_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "Narrates in-game text through a real-time speech mixer", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: <config dir>/parley/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Speak one line and wait for it to finish
    Speak {
        text: String,

        #[arg(long, value_enum, default_value_t = ClassArg::Dialogue)]
        class: ClassArg,

        /// Speaker entity id (omit for none)
        #[arg(long)]
        source: Option<i32>,

        /// Speaker distance in tiles; attenuates floating speech
        #[arg(long)]
        distance: Option<u32>,
    },

    /// Read JSON narration events from stdin, one per line
    Narrate,

    /// List voices offered by the synthesis backend
    Voices,

    /// List audio output devices
    Devices,

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write the factory default configuration
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    Show,
}

#[derive(Clone, Copy, ValueEnum)]
enum ClassArg {
    Dialogue,
    Floating,
    Test,
}

impl From<ClassArg> for SourceClass {
    fn from(class: ClassArg) -> Self {
        match class {
            ClassArg::Dialogue => SourceClass::Dialogue,
            ClassArg::Floating => SourceClass::Floating,
            ClassArg::Test => SourceClass::Test,
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn config_manager(path: Option<PathBuf>) -> anyhow::Result<ConfigManager> {
    match path {
        Some(path) => Ok(ConfigManager::with_path(path)),
        None => Ok(ConfigManager::new(ConfigManager::default_config_dir()?)),
    }
}

fn synthesizer(config: &ParleyConfig) -> anyhow::Result<AzureSynthesizer> {
    let synthesis = config.synthesis.clone().with_env_overrides();
    if !synthesis.has_credentials() {
        warn!(
            "No synthesis credentials configured; set synthesis.api_key/region or {} and {}",
            ENV_AZURE_KEY, ENV_AZURE_REGION
        );
    }
    Ok(AzureSynthesizer::new(&synthesis)?)
}

fn start_pipeline(config: &ParleyConfig) -> anyhow::Result<Arc<PlaybackOrchestrator>> {
    let synthesizer = Arc::new(synthesizer(config)?);

    let device = config.mixer.output_device().map(str::to_string);
    let mixer = SpeechMixer::start(
        move || {
            let line = CpalOutputLine::open(device.as_deref())?;
            Ok(Box::new(line) as Box<dyn OutputLine>)
        },
        config.mixer.max_floating_streams,
    )
    .context("Failed to open the audio output")?;

    Ok(Arc::new(PlaybackOrchestrator::new(PlaybackContext {
        mixer: Arc::new(mixer),
        synthesizer,
        notifier: Arc::new(LogNotifier),
        settings: config.playback_settings(),
        gate_limits: config.app.gate,
        worker_threads: config.app.worker_threads,
        queue_capacity: config.app.queue_capacity,
        runtime: Handle::current(),
    })))
}

/// Let queued jobs finish and the mixer run dry, then stop everything
async fn finish(orchestrator: &PlaybackOrchestrator) {
    orchestrator.quiesce().await;

    let started = Instant::now();
    while !orchestrator.mixer().is_idle() {
        if started.elapsed() >= PLAYBACK_TIMEOUT {
            warn!("Playback still running after {:?}, stopping", PLAYBACK_TIMEOUT);
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    orchestrator.shutdown().await;
}

async fn speak(
    config: &ParleyConfig,
    text: String,
    class: SourceClass,
    source: Option<i32>,
    distance: Option<u32>,
) -> anyhow::Result<()> {
    let orchestrator = start_pipeline(config)?;

    let mut profile = config.voices.player.clone();
    if let (Some(distance), false) = (distance, class.is_dialogue()) {
        let volume = orchestrator.attenuated_volume(&profile.volume, distance);
        debug!(distance, %volume, "Attenuated speaker");
        profile = profile.with_volume(volume);
    }

    let dispatch = orchestrator.play(PlaybackRequest::new(text, profile, class, SourceId::from(source)));
    if dispatch != Dispatch::Queued {
        orchestrator.shutdown().await;
        bail!("Nothing was played ({:?})", dispatch);
    }

    finish(&orchestrator).await;
    Ok(())
}

fn is_config_file(changed: &Path, config_path: &Path) -> bool {
    changed.file_name().is_some() && changed.file_name() == config_path.file_name()
}

async fn reload(manager: &ConfigManager, orchestrator: &PlaybackOrchestrator) {
    match ParleyConfig::load_from_file(manager.config_path()).await {
        Ok(config) => orchestrator.update_settings(config.playback_settings()),
        Err(e) => warn!(error = %e, "Ignoring unreadable config change"),
    }
}

async fn narrate(manager: &ConfigManager, config: &ParleyConfig) -> anyhow::Result<()> {
    let orchestrator = start_pipeline(config)?;
    let mut narrator = Narrator::new(Arc::clone(&orchestrator), Arc::new(UnknownGender));

    let watcher = ConfigWatcher::new(manager.config_dir().to_path_buf()).await?;
    let mut changes = watcher.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    info!("Reading narration events from stdin");
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<NarrationEvent>(&line) {
                    Ok(event) => {
                        let outcome = narrator.handle(event);
                        debug!(?outcome, "Event handled");
                    }
                    Err(e) => warn!(error = %e, "Ignoring malformed event"),
                }
            }
            changed = changes.recv() => match changed {
                Ok(path) if is_config_file(&path, manager.config_path()) => reload(manager, &orchestrator).await,
                Ok(_) => {}
                Err(RecvError::Lagged(_)) => reload(manager, &orchestrator).await,
                Err(RecvError::Closed) => warn!("Config watcher stopped"),
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                orchestrator.shutdown().await;
                return Ok(());
            }
        }
    }

    finish(&orchestrator).await;
    Ok(())
}

async fn voices(config: &ParleyConfig) -> anyhow::Result<()> {
    let voices = synthesizer(config)?.list_voices().await?;
    for voice in voices {
        println!("{}\t{}\t{}", voice.short_name, voice.gender, voice.locale);
    }
    Ok(())
}

fn devices() -> anyhow::Result<()> {
    for device in list_output_devices()? {
        println!(
            "{}{}{}",
            device.name,
            if device.is_default { " (default)" } else { "" },
            if device.supports_speech_rate { "" } else { " [no 16 kHz]" },
        );
    }
    Ok(())
}

async fn config_command(manager: &ConfigManager, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init { force } => {
            if manager.exists() && !force {
                bail!(
                    "{} already exists (use --force to overwrite)",
                    manager.config_path().display()
                );
            }
            manager.save(&ParleyConfig::factory_default()).await?;
            println!("Wrote {}", manager.config_path().display());
        }
        ConfigAction::Show => {
            let mut config = manager.load().await;
            config.synthesis = config.synthesis.with_env_overrides();
            if !config.synthesis.api_key.is_empty() {
                config.synthesis.api_key = "********".to_string();
            }
            println!("# {}", manager.config_path().display());
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    info!(version = env!("CARGO_PKG_VERSION"), "Parley starting");

    let manager = config_manager(cli.config)?;

    match cli.command {
        Command::Speak {
            text,
            class,
            source,
            distance,
        } => {
            let config = manager.load().await;
            speak(&config, text, class.into(), source, distance).await
        }
        Command::Narrate => {
            let config = manager.load().await;
            narrate(&manager, &config).await
        }
        Command::Voices => voices(&manager.load().await).await,
        Command::Devices => devices(),
        Command::Config { action } => config_command(&manager, action).await,
    }
}
