//! Session state machine.
//!
//! [`SessionState`] is the phase of the single dictation session.
//! [`StateMachine`] owns the current state and only moves it along the fixed
//! transition table; every successful move produces a [`TransitionEvent`].
//!
//! Observers get events two ways: as the return value of
//! [`StateMachine::transition_to`], and through an optional bounded channel
//! created by [`StateMachine::with_events`].  The channel is fed while the
//! state lock is still held, so events arrive in the order the state
//! changed.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Phases of a dictation session.
///
/// ```text
/// Idle ──press──▶ Recording ──release──▶ Processing ──▶ PostProcessing
///  ▲                                        │                 │
///  └────────────────────────────────────────┴─────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// Waiting for the push-to-talk hotkey.
    #[default]
    Idle,
    /// Microphone is capturing into the current take.
    Recording,
    /// The take is being validated and transcribed.
    Processing,
    /// A post-processing hook is running on the transcript.
    PostProcessing,
}

impl SessionState {
    /// Every state, in declaration order.
    pub const ALL: [SessionState; 4] = [
        SessionState::Idle,
        SessionState::Recording,
        SessionState::Processing,
        SessionState::PostProcessing,
    ];

    /// Whether `self → target` is in the transition table.
    ///
    /// ```
    /// use holdtalk::pipeline::SessionState;
    ///
    /// assert!(SessionState::Idle.can_transition_to(SessionState::Recording));
    /// assert!(!SessionState::Idle.can_transition_to(SessionState::Processing));
    /// assert!(SessionState::Processing.can_transition_to(SessionState::Idle));
    /// ```
    pub fn can_transition_to(self, target: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, target),
            (Idle, Recording)
                | (Recording, Processing)
                | (Processing, PostProcessing)
                | (Processing, Idle)
                | (PostProcessing, Idle)
        )
    }

    /// `true` whenever a session is in flight.
    pub fn is_busy(self) -> bool {
        self != SessionState::Idle
    }

    pub fn label(self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Recording => "Recording",
            SessionState::Processing => "Processing",
            SessionState::PostProcessing => "PostProcessing",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// TransitionEvent / InvalidTransition
// ---------------------------------------------------------------------------

/// Record of one successful state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionEvent {
    pub previous: SessionState,
    pub next: SessionState,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid session transition {from} → {to}")]
pub struct InvalidTransition {
    pub from: SessionState,
    pub to: SessionState,
}

// ---------------------------------------------------------------------------
// StateMachine
// ---------------------------------------------------------------------------

pub struct StateMachine {
    state: Mutex<SessionState>,
    events: Option<mpsc::Sender<TransitionEvent>>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    /// A machine in `Idle` without an event channel.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SessionState::Idle),
            events: None,
        }
    }

    /// A machine that also publishes every event into a bounded channel of
    /// `capacity` slots.  When the channel is full or closed the event is
    /// dropped with a warning; a transition never waits on its observer.
    pub fn with_events(capacity: usize) -> (Self, mpsc::Receiver<TransitionEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let machine = Self {
            state: Mutex::new(SessionState::Idle),
            events: Some(tx),
        };
        (machine, rx)
    }

    pub fn current(&self) -> SessionState {
        *self.lock()
    }

    /// Move to `target`.
    ///
    /// Returns `Ok(None)` when already in `target`, `Ok(Some(event))` after a
    /// legal move, and [`InvalidTransition`] (state untouched) otherwise.
    pub fn transition_to(
        &self,
        target: SessionState,
    ) -> Result<Option<TransitionEvent>, InvalidTransition> {
        let mut state = self.lock();
        let previous = *state;

        if previous == target {
            return Ok(None);
        }
        if !previous.can_transition_to(target) {
            return Err(InvalidTransition {
                from: previous,
                to: target,
            });
        }

        *state = target;
        let event = TransitionEvent {
            previous,
            next: target,
            timestamp: Utc::now(),
        };
        log::debug!("pipeline: {previous} → {target}");

        if let Some(tx) = &self.events {
            if let Err(e) = tx.try_send(event) {
                log::warn!("pipeline: transition event {previous} → {target} not delivered: {e}");
            }
        }

        Ok(Some(event))
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
