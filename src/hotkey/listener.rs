//! Dedicated OS-thread hotkey listener using `rdev::listen`.
//!
//! `rdev::listen` is a blocking call that must live on its own OS thread.
//! [`HotkeyListener`] owns that thread and a stop flag; dropping it sets the
//! flag so the callback silently ignores further events.
//!
//! # Shutdown caveat
//!
//! `rdev::listen` has **no graceful shutdown API**.  Setting the stop flag
//! prevents events from being forwarded, but the OS thread itself stays
//! blocked in the rdev event loop until the process exits.

use std::io;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::sync::mpsc;

use super::{HotkeyEvent, KeyGate};

/// Handle to a running hotkey listener thread.  Drop it to stop forwarding
/// events.
pub struct HotkeyListener {
    stop: Arc<AtomicBool>,
    /// Never joined: `rdev::listen` does not return.
    _thread: std::thread::JoinHandle<()>,
}

impl HotkeyListener {
    /// Spawn the listener thread.  One `PushToTalkPressed` is sent when `key`
    /// goes down (auto-repeat is swallowed) and one `PushToTalkReleased` when
    /// it comes up.
    ///
    /// `tx` is fed with `blocking_send`, which is fine from a non-async
    /// thread.  Once the receiver is gone the listener stops forwarding.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be spawned.
    pub fn start(key: rdev::Key, tx: mpsc::Sender<HotkeyEvent>) -> io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_clone = Arc::clone(&stop);

        let thread = std::thread::Builder::new()
            .name("hotkey-listener".into())
            .spawn(move || {
                let mut gate = KeyGate::new(key);
                let result = rdev::listen(move |event| {
                    if stop_clone.load(Ordering::Relaxed) {
                        return;
                    }
                    if let Some(ev) = gate.filter(&event.event_type) {
                        log::trace!("hotkey-listener: {ev:?}");
                        if tx.blocking_send(ev).is_err() {
                            stop_clone.store(true, Ordering::Relaxed);
                        }
                    }
                });

                if let Err(e) = result {
                    log::error!("hotkey-listener: rdev::listen exited with error: {e:?}");
                }
            })?;

        log::info!("hotkey-listener: watching {key:?}");
        Ok(Self {
            stop,
            _thread: thread,
        })
    }
}

impl Drop for HotkeyListener {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}
