//! Application entry point for holdtalk.
//!
//! # Startup sequence (`holdtalk run`)
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Create the [`tokio`] runtime.
//! 4. Build the STT engine from the `[stt]` section.
//! 5. Start cpal capture and feed it into a [`MicRecorder`].
//! 6. Wire consumers, quarantine and post-processing into the controller.
//! 7. Spawn the hotkey listener thread.
//! 8. Run the controller loop on the main thread until Ctrl-C.
//!
//! The cpal stream is not `Send`, so it is created and kept on the main
//! thread, which then blocks in the controller loop.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use holdtalk::{
    audio::{check_file, AudioCapture, AudioChunk, AudioRecorder, MicRecorder, RecorderError},
    config::{AppConfig, AppPaths},
    hotkey::{parse_key, HotkeyEvent, HotkeyListener},
    output::{
        ClipboardSink, FanOut, HistoryFile, LogErrorPresenter, QuarantineDir, ResultConsumer,
    },
    pipeline::{SessionController, SessionError, StateMachine, WhitespaceTidy},
    stt::{exit_code, SttEngine, SubprocessEngine},
};

/// Memory cap for a single take when no recording limit is configured.
const UNLIMITED_TAKE_SECS: f32 = 3600.0;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Debug, Parser)]
#[command(name = "holdtalk", version, about = "Hold a key, speak, get text")]
struct Cli {
    /// Settings file to use instead of the platform default.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Listen for the push-to-talk key and dictate (default).
    Run,
    /// Transcribe an existing WAV file once and print the result.
    Transcribe {
        wav: PathBuf,
        /// Print the full engine result as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Check whether a WAV file is 16 kHz mono 16-bit PCM.
    Check { wav: PathBuf },
    /// Write a settings file with the default values.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let paths = AppPaths::new();
    let settings_file = cli
        .config
        .clone()
        .unwrap_or_else(|| paths.settings_file.clone());

    match cli.command.unwrap_or(Command::Run) {
        Command::InitConfig { force } => init_config(&settings_file, force),
        Command::Check { wav } => Ok(check(&wav)),
        Command::Transcribe { wav, json } => {
            let config = load_config(&settings_file);
            runtime()?.block_on(transcribe_once(&config, &wav, json))
        }
        Command::Run => {
            let config = load_config(&settings_file);
            run(&config, &paths)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_config(path: &Path) -> AppConfig {
    AppConfig::load_from(path).unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e:#}); using defaults");
        AppConfig::default()
    })
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                log::info!("interrupt received, shutting down");
                token.cancel();
            }
            Err(e) => log::warn!("cannot listen for Ctrl-C: {e}"),
        }
    });
}

// ---------------------------------------------------------------------------
// init-config / check / transcribe
// ---------------------------------------------------------------------------

fn init_config(path: &Path, force: bool) -> Result<ExitCode> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    AppConfig::default().save_to(path)?;
    println!("wrote {}", path.display());
    Ok(ExitCode::SUCCESS)
}

fn check(wav: &Path) -> ExitCode {
    match check_file(wav) {
        Ok(info) => {
            println!(
                "ok: {} Hz, {} ch, {}-bit, {:.2} s",
                info.sample_rate,
                info.channels,
                info.bits_per_sample,
                info.duration_secs()
            );
            ExitCode::SUCCESS
        }
        Err(violation) => {
            eprintln!("rejected: {violation}");
            exit_status(exit_code::INVALID_AUDIO)
        }
    }
}

/// Same gate and adapter as a live session, without capture or hotkey.
/// The process exit status mirrors the engine's exit-code table.
async fn transcribe_once(config: &AppConfig, wav: &Path, json: bool) -> Result<ExitCode> {
    if let Err(violation) = check_file(wav) {
        eprintln!("rejected: {violation}");
        return Ok(exit_status(exit_code::INVALID_AUDIO));
    }

    let invocation = config.stt.invocation().context("invalid [stt] settings")?;
    let engine = SubprocessEngine::new(invocation);
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    match engine.transcribe(wav, &cancel).await {
        Ok(result) if json => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(ExitCode::SUCCESS)
        }
        Ok(result) => {
            println!("{}", result.text.trim());
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            let code = e.contract_code();
            eprintln!("{}", SessionError::from(e.clone()).user_message());
            eprintln!("  {e}");
            if let Some(stderr) = e.stderr().filter(|s| !s.trim().is_empty()) {
                eprintln!("  engine stderr:\n{stderr}");
            }
            Ok(exit_status(code))
        }
    }
}

fn exit_status(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

fn run(config: &AppConfig, paths: &AppPaths) -> Result<()> {
    log::info!("holdtalk starting up");
    let rt = runtime()?;
    let _guard = rt.enter();

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    // STT engine
    let invocation = config.stt.invocation().context("invalid [stt] settings")?;
    log::info!(
        "stt: {} (model {}, language {})",
        invocation.binary().display(),
        invocation.model().display(),
        invocation.language()
    );
    let engine: Arc<dyn SttEngine> = Arc::new(SubprocessEngine::new(invocation));

    // Audio capture; the stream handle must outlive the controller loop.
    let take_cap = config
        .audio
        .max_recording()
        .map_or(UNLIMITED_TAKE_SECS, |d| d.as_secs_f32());
    let (recorder, _stream): (Arc<dyn AudioRecorder>, _) =
        match start_capture(config.audio.input_device.as_deref(), take_cap) {
            Ok((recorder, stream)) => (Arc::new(recorder) as Arc<dyn AudioRecorder>, Some(stream)),
            Err(e) => {
                log::warn!("Audio capture unavailable: {e:#}");
                let fallback = UnavailableRecorder(format!("{e:#}"));
                (Arc::new(fallback) as Arc<dyn AudioRecorder>, None)
            }
        };

    // Consumers
    let mut consumers: Vec<Arc<dyn ResultConsumer>> = Vec::new();
    if config.output.copy_to_clipboard {
        consumers.push(Arc::new(ClipboardSink));
    }
    if config.output.write_history {
        let history = HistoryFile::new(config.history_file(paths));
        log::info!("output: history → {}", history.path().display());
        consumers.push(Arc::new(history));
    }
    let consumer = FanOut::new(consumers);
    if consumer.is_empty() {
        log::warn!("output: no consumer enabled, transcripts are only logged");
    }

    // State transitions are logged from their own task.
    let (machine, mut transitions) = StateMachine::with_events(64);
    tokio::spawn(async move {
        while let Some(ev) = transitions.recv().await {
            log::info!(
                "state: {} → {} at {}",
                ev.previous,
                ev.next,
                ev.timestamp.format("%H:%M:%S%.3f")
            );
        }
    });

    let mut controller = SessionController::new(
        Arc::new(machine),
        recorder,
        engine,
        Arc::new(consumer),
        Arc::new(LogErrorPresenter),
        config.scratch_dir(paths),
    )
    .with_quarantine(Arc::new(QuarantineDir::new(config.quarantine_dir(paths))))
    .with_cancellation(cancel);
    if config.output.tidy_whitespace {
        controller = controller.with_post_processor(Arc::new(WhitespaceTidy));
    }
    if let Some(limit) = config.audio.max_recording() {
        controller = controller.with_max_recording(limit);
    }

    // Hotkey listener thread
    let key = parse_key(&config.hotkey.push_to_talk_key).ok_or_else(|| {
        anyhow!(
            "unknown push-to-talk key {:?} in [hotkey]",
            config.hotkey.push_to_talk_key
        )
    })?;
    let (hotkey_tx, hotkey_rx) = mpsc::channel::<HotkeyEvent>(16);
    let _listener = HotkeyListener::start(key, hotkey_tx).context("spawning hotkey listener")?;

    log::info!(
        "Hold {} to dictate, Ctrl-C to quit",
        config.hotkey.push_to_talk_key
    );
    rt.block_on(Arc::new(controller).run(hotkey_rx));
    log::info!("holdtalk stopped");
    Ok(())
}

/// Open the input device and route its chunks into a fresh [`MicRecorder`].
fn start_capture(
    device: Option<&str>,
    take_cap_secs: f32,
) -> Result<(MicRecorder, holdtalk::audio::StreamHandle)> {
    let capture = AudioCapture::open(device)?;
    let recorder = MicRecorder::new(take_cap_secs);
    let (chunk_tx, chunk_rx) = std::sync::mpsc::channel::<AudioChunk>();
    recorder
        .attach(chunk_rx)
        .context("spawning audio feeder thread")?;
    let stream = capture.start(chunk_tx)?;
    log::info!(
        "Audio capture started ({} Hz, {} ch)",
        capture.sample_rate(),
        capture.channels()
    );
    Ok((recorder, stream))
}

// ---------------------------------------------------------------------------
// UnavailableRecorder: stands in when no input device could be opened
// ---------------------------------------------------------------------------

/// Fails every press with the capture error, so the app still starts and
/// reports the problem on use.
struct UnavailableRecorder(String);

#[async_trait]
impl AudioRecorder for UnavailableRecorder {
    fn start(&self, _scratch_dir: &Path) -> Result<(), RecorderError> {
        Err(RecorderError::Device(self.0.clone()))
    }

    async fn stop(&self) -> Result<PathBuf, RecorderError> {
        Err(RecorderError::NotRecording)
    }
}
