//! Session controller: drives one dictation session at a time.
//!
//! [`SessionController`] reacts to push-to-talk press / release.  A
//! capacity-1 semaphore is the single-flight guard: a press that cannot take
//! the permit immediately is dropped, never queued.
//!
//! # Session flow
//!
//! ```text
//! press   ─▶ try_acquire permit ──fail──▶ Dropped
//!            Idle → Recording, recorder.start()   (ActiveSession parked)
//!
//! release ─▶ Recording → Processing
//!            recorder.stop() → WAV ─▶ wav::check_file ──violation──▶ quarantine, Rejected
//!            engine.transcribe(WAV)  ──error──▶ present, Failed
//!            empty text ─▶ NoSpeech
//!            [post-processor] Processing → PostProcessing
//!            consumer.consume(result) ─▶ Transcribed
//!
//! ActiveSession::drop ─▶ walk back to Idle, release permit
//! ```
//!
//! The walk back to `Idle` lives in a `Drop` impl, so it also runs when a
//! collaborator panics or the session future is dropped.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::audio::{check_file, AudioRecorder, WavFormatViolation};
use crate::hotkey::HotkeyEvent;
use crate::output::{ErrorPresenter, Quarantine, ResultConsumer};
use crate::stt::{SttEngine, SttResult};

use super::error::SessionError;
use super::post::PostProcessor;
use super::state::{SessionState, StateMachine};

/// How long `run` waits for an in-flight session after shutdown is requested.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// What a hotkey press did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressOutcome {
    /// A new session is recording.
    Started { id: u64 },
    /// Another session holds the guard; the press was ignored.
    Dropped,
    /// The guard was free but the state machine was not `Idle`.
    NotIdle,
    /// The recorder refused to start; the session was unwound.
    CaptureFailed,
}

/// How a session ended.
#[derive(Debug)]
pub enum SessionOutcome {
    /// A non-empty transcript was delivered to the consumer.
    Transcribed(SttResult),
    /// The engine succeeded but heard nothing.
    NoSpeech,
    /// The recording failed the WAV check; the engine was not run.
    Rejected(WavFormatViolation),
    Failed(SessionError),
    /// Release without a matching press.
    NoSession,
}

// ---------------------------------------------------------------------------
// ActiveSession
// ---------------------------------------------------------------------------

/// Owns the permit of an in-flight session.
struct ActiveSession {
    id: u64,
    machine: Arc<StateMachine>,
    _permit: OwnedSemaphorePermit,
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        use SessionState::*;
        let steps: &[SessionState] = match self.machine.current() {
            Idle => &[],
            Recording => &[Processing, Idle],
            Processing | PostProcessing => &[Idle],
        };
        for step in steps {
            if let Err(e) = self.machine.transition_to(*step) {
                log::error!("pipeline: session {} cleanup: {e}", self.id);
            }
        }
        log::debug!("pipeline: session {} closed", self.id);
        // permit is released when the fields drop, after the state is Idle
    }
}

// ---------------------------------------------------------------------------
// SessionController
// ---------------------------------------------------------------------------

/// Drives the record → check → transcribe → deliver cycle.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use holdtalk::audio::MicRecorder;
/// use holdtalk::output::{ClipboardSink, LogErrorPresenter};
/// use holdtalk::pipeline::{SessionController, StateMachine};
/// use holdtalk::stt::{SttInvocationConfig, SubprocessEngine};
///
/// # async fn example(cfg: SttInvocationConfig) {
/// let (hotkey_tx, hotkey_rx) = tokio::sync::mpsc::channel(16);
/// let controller = Arc::new(SessionController::new(
///     Arc::new(StateMachine::new()),
///     Arc::new(MicRecorder::new(120.0)),
///     Arc::new(SubprocessEngine::new(cfg)),
///     Arc::new(ClipboardSink),
///     Arc::new(LogErrorPresenter),
///     std::env::temp_dir(),
/// ));
/// // hotkey_tx is passed to HotkeyListener::start(...)
/// # drop(hotkey_tx);
/// controller.run(hotkey_rx).await;
/// # }
/// ```
pub struct SessionController {
    machine: Arc<StateMachine>,
    slot: Arc<Semaphore>,
    active: Mutex<Option<ActiveSession>>,
    next_id: AtomicU64,
    recorder: Arc<dyn AudioRecorder>,
    engine: Arc<dyn SttEngine>,
    consumer: Arc<dyn ResultConsumer>,
    presenter: Arc<dyn ErrorPresenter>,
    quarantine: Option<Arc<dyn Quarantine>>,
    post: Option<Arc<dyn PostProcessor>>,
    scratch_dir: PathBuf,
    max_recording: Option<Duration>,
    cancel: CancellationToken,
}

impl SessionController {
    pub fn new(
        machine: Arc<StateMachine>,
        recorder: Arc<dyn AudioRecorder>,
        engine: Arc<dyn SttEngine>,
        consumer: Arc<dyn ResultConsumer>,
        presenter: Arc<dyn ErrorPresenter>,
        scratch_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            machine,
            slot: Arc::new(Semaphore::new(1)),
            active: Mutex::new(None),
            next_id: AtomicU64::new(0),
            recorder,
            engine,
            consumer,
            presenter,
            quarantine: None,
            post: None,
            scratch_dir: scratch_dir.into(),
            max_recording: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Move rejected recordings aside instead of leaving them in scratch.
    pub fn with_quarantine(mut self, quarantine: Arc<dyn Quarantine>) -> Self {
        self.quarantine = Some(quarantine);
        self
    }

    /// Run `post` on every non-empty transcript before delivery.
    pub fn with_post_processor(mut self, post: Arc<dyn PostProcessor>) -> Self {
        self.post = Some(post);
        self
    }

    /// Stop a recording automatically once it has run for `limit`.
    pub fn with_max_recording(mut self, limit: Duration) -> Self {
        self.max_recording = Some(limit);
        self
    }

    /// Share a shutdown token.  Cancelling it ends [`run`](Self::run) and
    /// kills any engine process in flight.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> SessionState {
        self.machine.current()
    }

    pub fn state_machine(&self) -> &Arc<StateMachine> {
        &self.machine
    }

    /// `true` while a session holds the guard or the state is not `Idle`.
    pub fn is_busy(&self) -> bool {
        self.slot.available_permits() == 0 || self.machine.current().is_busy()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    // -----------------------------------------------------------------------
    // Event handlers
    // -----------------------------------------------------------------------

    /// Start a session if none is in flight.  Never blocks.
    pub fn on_hotkey_down(&self) -> PressOutcome {
        let permit = match Arc::clone(&self.slot).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                log::info!("pipeline: press ignored, a session is already in flight");
                return PressOutcome::Dropped;
            }
        };

        let current = self.machine.current();
        if current != SessionState::Idle {
            log::warn!("pipeline: press ignored, guard free but state is {current}");
            return PressOutcome::NotIdle;
        }
        if let Err(e) = self.machine.transition_to(SessionState::Recording) {
            log::error!("pipeline: {e}");
            self.presenter.present(&SessionError::Transition(e));
            return PressOutcome::NotIdle;
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let session = ActiveSession {
            id,
            machine: Arc::clone(&self.machine),
            _permit: permit,
        };

        if let Err(e) = self.recorder.start(&self.scratch_dir) {
            log::error!("pipeline: session {id}: cannot start recording: {e}");
            drop(session);
            self.presenter.present(&SessionError::Capture(e));
            return PressOutcome::CaptureFailed;
        }

        log::info!("pipeline: session {id} recording");
        *self.lock_active() = Some(session);
        PressOutcome::Started { id }
    }

    /// Finish the parked session, if any.
    pub async fn on_hotkey_up(&self) -> SessionOutcome {
        match self.take_parked() {
            Some(session) => self.finish(session).await,
            None => SessionOutcome::NoSession,
        }
    }

    fn take_parked(&self) -> Option<ActiveSession> {
        let parked = self.lock_active().take();
        if parked.is_none() {
            log::debug!("pipeline: release without an active session");
        }
        parked
    }

    async fn stop_if_recording(&self, id: u64) -> Option<SessionOutcome> {
        let session = {
            let mut active = self.lock_active();
            if active.as_ref().map(|s| s.id) == Some(id) {
                active.take()
            } else {
                None
            }
        }?;
        log::info!("pipeline: session {id} reached the recording limit, stopping");
        Some(self.finish(session).await)
    }

    async fn finish(&self, session: ActiveSession) -> SessionOutcome {
        let id = session.id;

        if let Err(e) = self.machine.transition_to(SessionState::Processing) {
            return self.fail(id, e.into());
        }

        let wav = match self.recorder.stop().await {
            Ok(path) => path,
            Err(e) => return self.fail(id, e.into()),
        };

        if let Err(violation) = check_file(&wav) {
            log::warn!("pipeline: session {id}: {} rejected: {violation}", wav.display());
            if let Some(q) = &self.quarantine {
                if let Err(e) = q.quarantine(&wav, &violation) {
                    log::warn!("pipeline: session {id}: quarantine failed: {e}");
                }
            }
            self.presenter.present(&SessionError::Format(violation.clone()));
            return SessionOutcome::Rejected(violation);
        }

        let raw = match self.engine.transcribe(&wav, &self.cancel).await {
            Ok(result) => result,
            Err(e) => return self.fail(id, e.into()),
        };
        if raw.is_empty() {
            log::info!("pipeline: session {id}: no speech detected");
            return SessionOutcome::NoSpeech;
        }

        let result = self.post_process(id, raw).await;
        if result.is_empty() {
            log::info!("pipeline: session {id}: nothing left after post-processing");
            return SessionOutcome::NoSpeech;
        }

        if let Err(e) = self.consumer.consume(&result) {
            log::warn!("pipeline: session {id}: delivery failed: {e}");
            self.presenter.present(&SessionError::Consumer(e));
        }
        log::info!(
            "pipeline: session {id} done, {} chars ({})",
            result.text.chars().count(),
            result.language
        );
        SessionOutcome::Transcribed(result)
    }

    async fn post_process(&self, id: u64, raw: SttResult) -> SttResult {
        let Some(post) = &self.post else {
            return raw;
        };
        if let Err(e) = self.machine.transition_to(SessionState::PostProcessing) {
            log::error!("pipeline: session {id}: {e}");
            self.presenter.present(&SessionError::Transition(e));
            return raw;
        }

        match post.process(&raw).await {
            Ok(processed) => processed,
            Err(e) => {
                log::warn!("pipeline: session {id}: post-processing failed ({e}), keeping raw transcript");
                self.presenter.present(&SessionError::PostProcess(e));
                raw
            }
        }
    }

    fn fail(&self, id: u64, error: SessionError) -> SessionOutcome {
        match &error {
            SessionError::Transition(_) => log::error!("pipeline: session {id}: {error}"),
            _ => log::warn!("pipeline: session {id} failed: {error}"),
        }
        self.presenter.present(&error);
        SessionOutcome::Failed(error)
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveSession>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -----------------------------------------------------------------------
    // Main async loop
    // -----------------------------------------------------------------------

    /// Run until `events` is closed or the cancellation token fires.
    ///
    /// Presses are handled inline.  A release detaches the session and
    /// processes it on its own task, so the loop keeps reading events (and
    /// dropping presses) meanwhile.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<HotkeyEvent>) {
        loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            match event {
                HotkeyEvent::PushToTalkPressed => {
                    if let PressOutcome::Started { id } = self.on_hotkey_down() {
                        if let Some(limit) = self.max_recording {
                            let this = Arc::clone(&self);
                            tokio::spawn(async move {
                                tokio::time::sleep(limit).await;
                                this.stop_if_recording(id).await;
                            });
                        }
                    }
                }
                HotkeyEvent::PushToTalkReleased => {
                    // Take the session now so a shutdown right after the
                    // release still finishes it.
                    if let Some(session) = self.take_parked() {
                        let this = Arc::clone(&self);
                        tokio::spawn(async move {
                            this.finish(session).await;
                        });
                    }
                }
            }
        }

        log::info!("pipeline: event loop stopping");
        self.shutdown().await;
    }

    /// Abandon a recording that was never released, then wait for any session
    /// still processing.
    async fn shutdown(&self) {
        let parked = self.lock_active().take();
        if let Some(session) = parked {
            log::info!("pipeline: discarding unfinished session {}", session.id);
            if let Err(e) = self.recorder.stop().await {
                log::debug!("pipeline: stopping recorder on shutdown: {e}");
            }
            drop(session);
        }

        match tokio::time::timeout(SHUTDOWN_GRACE, self.slot.acquire()).await {
            Ok(_) => log::debug!("pipeline: no session in flight"),
            Err(_) => log::warn!("pipeline: session still busy after {SHUTDOWN_GRACE:?}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::{AtomicU32, AtomicUsize};

    use async_trait::async_trait;
    use tempfile::TempDir;

    use crate::audio::RecorderError;
    use crate::output::{OutputError, QuarantineDir};
    use crate::pipeline::post::{PostProcessError, WhitespaceTidy};
    use crate::pipeline::state::TransitionEvent;
    use crate::stt::{mock_result, MockSttEngine, StopReason, SttInvocationError};

    // -----------------------------------------------------------------------
    // Test doubles
    // -----------------------------------------------------------------------

    /// Writes half a second of silence at a configurable sample rate.
    struct FakeRecorder {
        rate: AtomicU32,
        fail_start: bool,
        target: Mutex<Option<PathBuf>>,
        takes: AtomicUsize,
    }

    impl FakeRecorder {
        fn new(rate: u32) -> Self {
            Self {
                rate: AtomicU32::new(rate),
                fail_start: false,
                target: Mutex::new(None),
                takes: AtomicUsize::new(0),
            }
        }

        fn broken() -> Self {
            Self {
                fail_start: true,
                ..Self::new(16_000)
            }
        }

        fn set_rate(&self, rate: u32) {
            self.rate.store(rate, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl AudioRecorder for FakeRecorder {
        fn start(&self, scratch_dir: &Path) -> Result<(), RecorderError> {
            if self.fail_start {
                return Err(RecorderError::Device("no microphone".into()));
            }
            let n = self.takes.fetch_add(1, Ordering::SeqCst);
            *self.target.lock().unwrap() = Some(scratch_dir.join(format!("take-{n}.wav")));
            Ok(())
        }

        async fn stop(&self) -> Result<PathBuf, RecorderError> {
            let path = self
                .target
                .lock()
                .unwrap()
                .take()
                .ok_or(RecorderError::NotRecording)?;
            let rate = self.rate.load(Ordering::SeqCst);
            let spec = hound::WavSpec {
                channels: 1,
                sample_rate: rate,
                bits_per_sample: 16,
                sample_format: hound::SampleFormat::Int,
            };
            let mut w = hound::WavWriter::create(&path, spec).unwrap();
            for _ in 0..rate / 2 {
                w.write_sample(0i16).unwrap();
            }
            w.finalize().unwrap();
            Ok(path)
        }
    }

    #[derive(Default)]
    struct Collect(Mutex<Vec<String>>);

    impl Collect {
        fn texts(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    impl ResultConsumer for Collect {
        fn consume(&self, result: &SttResult) -> Result<(), OutputError> {
            self.0.lock().unwrap().push(result.text.clone());
            Ok(())
        }
    }

    struct Panicking;

    impl ResultConsumer for Panicking {
        fn consume(&self, _: &SttResult) -> Result<(), OutputError> {
            panic!("consumer blew up");
        }
    }

    struct Refusing;

    impl ResultConsumer for Refusing {
        fn consume(&self, _: &SttResult) -> Result<(), OutputError> {
            Err(OutputError::Clipboard("no display".into()))
        }
    }

    #[derive(Default)]
    struct Presented(Mutex<Vec<&'static str>>);

    impl Presented {
        fn messages(&self) -> Vec<&'static str> {
            self.0.lock().unwrap().clone()
        }
    }

    impl ErrorPresenter for Presented {
        fn present(&self, error: &SessionError) {
            self.0.lock().unwrap().push(error.user_message());
        }
    }

    struct FailingPost;

    #[async_trait]
    impl PostProcessor for FailingPost {
        async fn process(&self, _: &SttResult) -> Result<SttResult, PostProcessError> {
            Err(PostProcessError::new("model offline"))
        }
    }

    // -----------------------------------------------------------------------
    // Harness
    // -----------------------------------------------------------------------

    struct Harness {
        _scratch: TempDir,
        scratch: PathBuf,
        recorder: Arc<FakeRecorder>,
        engine: Arc<MockSttEngine>,
        consumer: Arc<Collect>,
        presented: Arc<Presented>,
        events: mpsc::Receiver<TransitionEvent>,
        controller: SessionController,
    }

    impl Harness {
        fn new(engine: MockSttEngine) -> Self {
            Self::with(engine, FakeRecorder::new(16_000))
        }

        fn with(engine: MockSttEngine, recorder: FakeRecorder) -> Self {
            let scratch_dir = tempfile::tempdir().unwrap();
            let scratch = scratch_dir.path().to_path_buf();
            let (machine, events) = StateMachine::with_events(64);
            let recorder = Arc::new(recorder);
            let engine = Arc::new(engine);
            let consumer = Arc::new(Collect::default());
            let presented = Arc::new(Presented::default());

            let controller = SessionController::new(
                Arc::new(machine),
                recorder.clone(),
                engine.clone(),
                consumer.clone(),
                presented.clone(),
                &scratch,
            );

            Self {
                _scratch: scratch_dir,
                scratch,
                recorder,
                engine,
                consumer,
                presented,
                events,
                controller,
            }
        }

        fn transitions(&mut self) -> Vec<(SessionState, SessionState)> {
            std::iter::from_fn(|| self.events.try_recv().ok())
                .map(|e| (e.previous, e.next))
                .collect()
        }

        async fn session(&self) -> SessionOutcome {
            assert!(matches!(
                self.controller.on_hotkey_down(),
                PressOutcome::Started { .. }
            ));
            self.controller.on_hotkey_up().await
        }

        fn assert_idle(&self) {
            assert_eq!(self.controller.state(), SessionState::Idle);
            assert!(!self.controller.is_busy());
        }
    }

    async fn wait_until(what: &str, cond: impl Fn() -> bool) {
        for _ in 0..300 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {what}");
    }

    fn timed_out() -> SttInvocationError {
        SttInvocationError::TimedOut {
            timeout: Duration::from_secs(1),
            reason: StopReason::Deadline,
            exit_code: None,
            stderr: String::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Tests
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn press_and_release_deliver_the_transcript() {
        use SessionState::*;
        let mut h = Harness::new(MockSttEngine::ok("Hallo Welt."));

        match h.session().await {
            SessionOutcome::Transcribed(r) => assert_eq!(r.text, "Hallo Welt."),
            other => panic!("expected Transcribed, got {other:?}"),
        }

        assert_eq!(h.consumer.texts(), ["Hallo Welt."]);
        assert!(h.presented.messages().is_empty());
        assert_eq!(h.engine.calls(), 1);
        assert!(h.engine.seen()[0].starts_with(&h.scratch));
        assert_eq!(
            h.transitions(),
            [(Idle, Recording), (Recording, Processing), (Processing, Idle)]
        );
        h.assert_idle();
    }

    #[tokio::test]
    async fn press_during_recording_is_dropped() {
        let h = Harness::new(MockSttEngine::ok("x"));

        assert_eq!(h.controller.on_hotkey_down(), PressOutcome::Started { id: 1 });
        assert_eq!(h.controller.on_hotkey_down(), PressOutcome::Dropped);
        assert!(h.controller.is_busy());

        assert!(matches!(
            h.controller.on_hotkey_up().await,
            SessionOutcome::Transcribed(_)
        ));
        assert_eq!(h.engine.calls(), 1);
        h.assert_idle();
    }

    #[tokio::test]
    async fn press_while_processing_is_dropped_and_only_one_engine_call_runs() {
        let (engine, gate) = MockSttEngine::ok("one").gated();
        let h = Harness::new(engine);
        let controller = Arc::new(h.controller);
        let engine = h.engine.clone();

        assert!(matches!(
            controller.on_hotkey_down(),
            PressOutcome::Started { .. }
        ));
        let release = tokio::spawn({
            let c = Arc::clone(&controller);
            async move { c.on_hotkey_up().await }
        });
        wait_until("engine call", || engine.calls() == 1).await;
        assert_eq!(controller.state(), SessionState::Processing);

        assert_eq!(controller.on_hotkey_down(), PressOutcome::Dropped);
        assert!(matches!(
            controller.on_hotkey_up().await,
            SessionOutcome::NoSession
        ));

        gate.add_permits(1);
        assert!(matches!(
            release.await.unwrap(),
            SessionOutcome::Transcribed(_)
        ));
        assert_eq!(engine.calls(), 1);
        assert_eq!(h.consumer.texts(), ["one"]);
        assert_eq!(controller.state(), SessionState::Idle);
        assert!(!controller.is_busy());
    }

    #[tokio::test]
    async fn wrong_sample_rate_is_rejected_before_the_engine() {
        let quarantine = tempfile::tempdir().unwrap();
        let mut h = Harness::with(MockSttEngine::ok("x"), FakeRecorder::new(44_100));
        h.controller = h
            .controller
            .with_quarantine(Arc::new(QuarantineDir::new(quarantine.path())));

        match h.session().await {
            SessionOutcome::Rejected(v) => {
                assert_eq!(
                    v,
                    WavFormatViolation::SampleRateMismatch {
                        expected: 16_000,
                        actual: 44_100
                    }
                );
                let msg = v.to_string();
                assert!(msg.contains("16000") && msg.contains("44100"));
            }
            other => panic!("expected Rejected, got {other:?}"),
        }

        assert_eq!(h.engine.calls(), 0);
        assert!(h.consumer.texts().is_empty());
        assert_eq!(h.presented.messages().len(), 1);
        assert!(quarantine.path().join("take-0.wav").exists());
        assert!(!h.scratch.join("take-0.wav").exists());
        h.assert_idle();
    }

    #[tokio::test]
    async fn controller_recovers_after_every_failure_kind() {
        let h = Harness::new(MockSttEngine::scripted(vec![
            Err(timed_out()),
            Err(SttInvocationError::ModelNotFound {
                message: "gone".into(),
                exit_code: 2,
                stderr: String::new(),
            }),
            Err(SttInvocationError::MalformedOutput {
                message: "bad json".into(),
                path: PathBuf::from("out.json"),
            }),
            Ok(mock_result("finally")),
        ]));

        assert!(matches!(
            h.session().await,
            SessionOutcome::Failed(SessionError::Stt(SttInvocationError::TimedOut { .. }))
        ));
        h.assert_idle();

        assert!(matches!(
            h.session().await,
            SessionOutcome::Failed(SessionError::Stt(SttInvocationError::ModelNotFound { .. }))
        ));
        h.assert_idle();

        assert!(matches!(
            h.session().await,
            SessionOutcome::Failed(SessionError::Stt(SttInvocationError::MalformedOutput { .. }))
        ));
        h.assert_idle();

        h.recorder.set_rate(44_100);
        assert!(matches!(h.session().await, SessionOutcome::Rejected(_)));
        h.assert_idle();
        h.recorder.set_rate(16_000);

        assert!(matches!(
            h.session().await,
            SessionOutcome::Transcribed(_)
        ));
        h.assert_idle();

        assert_eq!(h.engine.calls(), 4);
        assert_eq!(h.consumer.texts(), ["finally"]);
        assert_eq!(h.presented.messages().len(), 4);
    }

    #[tokio::test]
    async fn empty_transcript_reaches_no_consumer() {
        let h = Harness::new(MockSttEngine::ok("  \n "));
        assert!(matches!(h.session().await, SessionOutcome::NoSpeech));
        assert!(h.consumer.texts().is_empty());
        assert!(h.presented.messages().is_empty());
        h.assert_idle();
    }

    #[tokio::test]
    async fn recorder_start_failure_unwinds_to_idle() {
        use SessionState::*;
        let mut h = Harness::with(MockSttEngine::ok("x"), FakeRecorder::broken());

        assert_eq!(h.controller.on_hotkey_down(), PressOutcome::CaptureFailed);
        assert_eq!(
            h.transitions(),
            [(Idle, Recording), (Recording, Processing), (Processing, Idle)]
        );
        assert_eq!(h.presented.messages().len(), 1);
        assert!(matches!(
            h.controller.on_hotkey_up().await,
            SessionOutcome::NoSession
        ));
        h.assert_idle();
    }

    #[tokio::test]
    async fn release_without_press_is_a_no_op() {
        let mut h = Harness::new(MockSttEngine::ok("x"));
        assert!(matches!(
            h.controller.on_hotkey_up().await,
            SessionOutcome::NoSession
        ));
        assert!(h.transitions().is_empty());
        assert_eq!(h.engine.calls(), 0);
    }

    #[tokio::test]
    async fn panicking_consumer_still_frees_the_controller() {
        let scratch = tempfile::tempdir().unwrap();
        let controller = Arc::new(SessionController::new(
            Arc::new(StateMachine::new()),
            Arc::new(FakeRecorder::new(16_000)),
            Arc::new(MockSttEngine::ok("boom")),
            Arc::new(Panicking),
            Arc::new(Presented::default()),
            scratch.path(),
        ));

        assert!(matches!(
            controller.on_hotkey_down(),
            PressOutcome::Started { .. }
        ));
        let joined = tokio::spawn({
            let c = Arc::clone(&controller);
            async move { c.on_hotkey_up().await }
        })
        .await;

        assert!(joined.unwrap_err().is_panic());
        assert_eq!(controller.state(), SessionState::Idle);
        assert!(!controller.is_busy());
        assert!(matches!(
            controller.on_hotkey_down(),
            PressOutcome::Started { id: 2 }
        ));
    }

    #[tokio::test]
    async fn consumer_error_is_presented_and_session_completes() {
        let scratch = tempfile::tempdir().unwrap();
        let presented = Arc::new(Presented::default());
        let controller = SessionController::new(
            Arc::new(StateMachine::new()),
            Arc::new(FakeRecorder::new(16_000)),
            Arc::new(MockSttEngine::ok("text")),
            Arc::new(Refusing),
            presented.clone(),
            scratch.path(),
        );

        controller.on_hotkey_down();
        assert!(matches!(
            controller.on_hotkey_up().await,
            SessionOutcome::Transcribed(_)
        ));
        assert_eq!(
            presented.messages(),
            ["The transcript could not be delivered."]
        );
        assert_eq!(controller.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn post_processor_runs_in_its_own_state() {
        use SessionState::*;
        let mut h = Harness::new(MockSttEngine::ok("  Hallo   Welt. "));
        h.controller = h.controller.with_post_processor(Arc::new(WhitespaceTidy));

        assert!(matches!(h.session().await, SessionOutcome::Transcribed(_)));
        assert_eq!(h.consumer.texts(), ["Hallo Welt."]);
        assert_eq!(
            h.transitions(),
            [
                (Idle, Recording),
                (Recording, Processing),
                (Processing, PostProcessing),
                (PostProcessing, Idle)
            ]
        );
        h.assert_idle();
    }

    #[tokio::test]
    async fn failing_post_processor_keeps_the_raw_transcript() {
        let mut h = Harness::new(MockSttEngine::ok("raw text"));
        h.controller = h.controller.with_post_processor(Arc::new(FailingPost));

        assert!(matches!(h.session().await, SessionOutcome::Transcribed(_)));
        assert_eq!(h.consumer.texts(), ["raw text"]);
        assert_eq!(
            h.presented.messages(),
            ["Post-processing failed; the raw transcript was kept."]
        );
        h.assert_idle();
    }

    #[tokio::test]
    async fn run_loop_handles_press_and_release() {
        let h = Harness::new(MockSttEngine::ok("from the loop"));
        let controller = Arc::new(h.controller);
        let (tx, rx) = mpsc::channel(8);

        tx.send(HotkeyEvent::PushToTalkPressed).await.unwrap();
        tx.send(HotkeyEvent::PushToTalkReleased).await.unwrap();
        drop(tx);

        Arc::clone(&controller).run(rx).await;

        assert_eq!(h.consumer.texts(), ["from the loop"]);
        assert_eq!(controller.state(), SessionState::Idle);
        assert!(!controller.is_busy());
    }

    #[tokio::test]
    async fn recording_limit_stops_the_session() {
        let mut h = Harness::new(MockSttEngine::ok("auto"));
        h.controller = h.controller.with_max_recording(Duration::from_millis(50));
        let controller = Arc::new(h.controller);
        let (tx, rx) = mpsc::channel(8);
        let looping = tokio::spawn(Arc::clone(&controller).run(rx));

        tx.send(HotkeyEvent::PushToTalkPressed).await.unwrap();
        let consumer = h.consumer.clone();
        wait_until("auto-stop delivery", || consumer.texts().len() == 1).await;

        // the late release finds nothing to finish
        tx.send(HotkeyEvent::PushToTalkReleased).await.unwrap();
        drop(tx);
        looping.await.unwrap();

        assert_eq!(h.engine.calls(), 1);
        assert_eq!(controller.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn cancellation_ends_the_loop_and_discards_a_recording() {
        let token = CancellationToken::new();
        let mut h = Harness::new(MockSttEngine::ok("never"));
        h.controller = h.controller.with_cancellation(token.clone());
        let controller = Arc::new(h.controller);
        let (tx, rx) = mpsc::channel(8);
        let looping = tokio::spawn(Arc::clone(&controller).run(rx));

        tx.send(HotkeyEvent::PushToTalkPressed).await.unwrap();
        let c = Arc::clone(&controller);
        wait_until("recording", || c.state() == SessionState::Recording).await;

        token.cancel();
        looping.await.unwrap();

        assert_eq!(h.engine.calls(), 0);
        assert_eq!(controller.state(), SessionState::Idle);
        assert!(!controller.is_busy());
        drop(tx);
    }
}
