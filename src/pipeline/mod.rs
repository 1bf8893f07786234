//! Dictation session pipeline.
//!
//! Ties a push-to-talk press/release pair to one record → check →
//! transcribe → deliver cycle, with at most one session in flight.
//!
//! # Architecture
//!
//! ```text
//! HotkeyEvent (mpsc)
//!        │
//!        ▼
//! SessionController::run()  ← async tokio task
//!        │
//!        ├─ PushToTalkPressed  → single-flight permit, Idle → Recording
//!        │
//!        └─ PushToTalkReleased → spawned session task
//!              │
//!              ├─ AudioRecorder::stop          → Processing
//!              ├─ audio::check_file            (violation → Quarantine)
//!              ├─ SttEngine::transcribe
//!              ├─ [PostProcessor::process]     → PostProcessing
//!              └─ ResultConsumer::consume      → Idle
//!
//! StateMachine ──TransitionEvent (mpsc)──▶ observers
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//! use holdtalk::audio::MicRecorder;
//! use holdtalk::output::{ClipboardSink, LogErrorPresenter};
//! use holdtalk::pipeline::{SessionController, StateMachine};
//! use holdtalk::stt::SttEngine;
//!
//! # fn make_engine() -> Arc<dyn SttEngine> { unimplemented!() }
//! #[tokio::main]
//! async fn main() {
//!     let (machine, mut transitions) = StateMachine::with_events(32);
//!     tokio::spawn(async move {
//!         while let Some(ev) = transitions.recv().await {
//!             println!("{} → {}", ev.previous, ev.next);
//!         }
//!     });
//!
//!     let controller = Arc::new(SessionController::new(
//!         Arc::new(machine),
//!         Arc::new(MicRecorder::new(120.0)),
//!         make_engine(),
//!         Arc::new(ClipboardSink),
//!         Arc::new(LogErrorPresenter),
//!         std::env::temp_dir(),
//!     ));
//!
//!     let (hotkey_tx, hotkey_rx) = mpsc::channel(16);
//!     // hotkey_tx is passed to HotkeyListener::start(...)
//!     # drop(hotkey_tx);
//!     controller.run(hotkey_rx).await;
//! }
//! ```

pub mod controller;
pub mod error;
pub mod post;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use controller::{PressOutcome, SessionController, SessionOutcome};
pub use error::SessionError;
pub use post::{PostProcessError, PostProcessor, WhitespaceTidy};
pub use state::{InvalidTransition, SessionState, StateMachine, TransitionEvent};
