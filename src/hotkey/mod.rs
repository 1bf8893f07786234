//! Global push-to-talk hotkey, backed by `rdev`.
//!
//! # Design
//!
//! `rdev::listen()` is a blocking OS-level call that never returns while the
//! process is alive.  It must run on a **dedicated OS thread**; it cannot be
//! used inside a tokio task.
//!
//! [`HotkeyListener::start`] spawns that thread and returns a handle.
//! Dropping the handle sets a stop flag so the callback discards further
//! events.  The thread itself stays blocked in rdev until the process exits.
//!
//! Holding a key makes the OS repeat `KeyPress` events.  [`KeyGate`] turns
//! the raw stream into exactly one press per hold and one release.
//!
//! # Usage
//!
//! ```no_run
//! use tokio::sync::mpsc;
//! use holdtalk::hotkey::{parse_key, HotkeyListener};
//!
//! let (tx, mut rx) = mpsc::channel(16);
//! let key = parse_key("RightAlt").expect("unknown key");
//! let _listener = HotkeyListener::start(key, tx).expect("listener thread");
//!
//! // In your async loop:
//! // while let Some(ev) = rx.recv().await { ... }
//! ```

pub mod listener;

pub use listener::HotkeyListener;

use rdev::{EventType, Key};

// ---------------------------------------------------------------------------
// HotkeyEvent
// ---------------------------------------------------------------------------

/// Events emitted by the hotkey listener thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyEvent {
    /// The push-to-talk key went down.
    PushToTalkPressed,
    /// The push-to-talk key came back up.
    PushToTalkReleased,
}

// ---------------------------------------------------------------------------
// KeyGate
// ---------------------------------------------------------------------------

/// Filters raw key events for one key, suppressing auto-repeat.
#[derive(Debug, Clone, Copy)]
pub struct KeyGate {
    key: Key,
    held: bool,
}

impl KeyGate {
    pub fn new(key: Key) -> Self {
        Self { key, held: false }
    }

    /// Translate one raw event.  Returns `None` for other keys, repeats, and
    /// releases without a press.
    pub fn filter(&mut self, event: &EventType) -> Option<HotkeyEvent> {
        match *event {
            EventType::KeyPress(k) if k == self.key && !self.held => {
                self.held = true;
                Some(HotkeyEvent::PushToTalkPressed)
            }
            EventType::KeyRelease(k) if k == self.key && self.held => {
                self.held = false;
                Some(HotkeyEvent::PushToTalkReleased)
            }
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// parse_key
// ---------------------------------------------------------------------------

const NAMED_KEYS: &[(&str, Key)] = &[
    ("f1", Key::F1),
    ("f2", Key::F2),
    ("f3", Key::F3),
    ("f4", Key::F4),
    ("f5", Key::F5),
    ("f6", Key::F6),
    ("f7", Key::F7),
    ("f8", Key::F8),
    ("f9", Key::F9),
    ("f10", Key::F10),
    ("f11", Key::F11),
    ("f12", Key::F12),
    // modifiers, the usual hold-to-talk choices
    ("alt", Key::Alt),
    ("leftalt", Key::Alt),
    ("rightalt", Key::AltGr),
    ("altgr", Key::AltGr),
    ("control", Key::ControlLeft),
    ("ctrl", Key::ControlLeft),
    ("leftcontrol", Key::ControlLeft),
    ("leftctrl", Key::ControlLeft),
    ("rightcontrol", Key::ControlRight),
    ("rightctrl", Key::ControlRight),
    ("shift", Key::ShiftLeft),
    ("leftshift", Key::ShiftLeft),
    ("rightshift", Key::ShiftRight),
    ("meta", Key::MetaLeft),
    ("super", Key::MetaLeft),
    ("leftmeta", Key::MetaLeft),
    ("rightmeta", Key::MetaRight),
    // navigation / control
    ("escape", Key::Escape),
    ("esc", Key::Escape),
    ("space", Key::Space),
    ("return", Key::Return),
    ("enter", Key::Return),
    ("tab", Key::Tab),
    ("backspace", Key::Backspace),
    ("insert", Key::Insert),
    ("delete", Key::Delete),
    ("del", Key::Delete),
    ("home", Key::Home),
    ("end", Key::End),
    ("pageup", Key::PageUp),
    ("pagedown", Key::PageDown),
    ("uparrow", Key::UpArrow),
    ("up", Key::UpArrow),
    ("downarrow", Key::DownArrow),
    ("down", Key::DownArrow),
    ("leftarrow", Key::LeftArrow),
    ("left", Key::LeftArrow),
    ("rightarrow", Key::RightArrow),
    ("right", Key::RightArrow),
    // lock / special
    ("capslock", Key::CapsLock),
    ("numlock", Key::NumLock),
    ("scrolllock", Key::ScrollLock),
    ("printscreen", Key::PrintScreen),
    ("pause", Key::Pause),
];

const LETTERS: [Key; 26] = [
    Key::KeyA,
    Key::KeyB,
    Key::KeyC,
    Key::KeyD,
    Key::KeyE,
    Key::KeyF,
    Key::KeyG,
    Key::KeyH,
    Key::KeyI,
    Key::KeyJ,
    Key::KeyK,
    Key::KeyL,
    Key::KeyM,
    Key::KeyN,
    Key::KeyO,
    Key::KeyP,
    Key::KeyQ,
    Key::KeyR,
    Key::KeyS,
    Key::KeyT,
    Key::KeyU,
    Key::KeyV,
    Key::KeyW,
    Key::KeyX,
    Key::KeyY,
    Key::KeyZ,
];

/// Parse a hotkey name from the config into an [`rdev::Key`].
///
/// Case-insensitive; `_`, `-` and spaces are ignored, so `"Right Alt"`,
/// `"right_alt"` and `"RightAlt"` are the same key.  Returns `None` for
/// unknown names.
///
/// ```
/// use holdtalk::hotkey::parse_key;
///
/// assert_eq!(parse_key("F9"), Some(rdev::Key::F9));
/// assert_eq!(parse_key("right_alt"), Some(rdev::Key::AltGr));
/// assert_eq!(parse_key("a"), Some(rdev::Key::KeyA));
/// assert_eq!(parse_key("xyz"), None);
/// ```
pub fn parse_key(name: &str) -> Option<Key> {
    let wanted: String = name
        .chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .map(|c| c.to_ascii_lowercase())
        .collect();

    if let [c @ b'a'..=b'z'] = wanted.as_bytes() {
        return Some(LETTERS[usize::from(c - b'a')]);
    }

    NAMED_KEYS
        .iter()
        .find(|(n, _)| *n == wanted)
        .map(|(_, key)| *key)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_function_keys() {
        assert_eq!(parse_key("F9"), Some(Key::F9));
        assert_eq!(parse_key("f1"), Some(Key::F1));
        assert_eq!(parse_key("F12"), Some(Key::F12));
    }

    #[test]
    fn parse_modifiers_in_any_spelling() {
        assert_eq!(parse_key("RightAlt"), Some(Key::AltGr));
        assert_eq!(parse_key("right alt"), Some(Key::AltGr));
        assert_eq!(parse_key("RIGHT_CTRL"), Some(Key::ControlRight));
        assert_eq!(parse_key("right-shift"), Some(Key::ShiftRight));
        assert_eq!(parse_key("Super"), Some(Key::MetaLeft));
    }

    #[test]
    fn parse_named_keys() {
        assert_eq!(parse_key("Escape"), Some(Key::Escape));
        assert_eq!(parse_key("Esc"), Some(Key::Escape));
        assert_eq!(parse_key("Space"), Some(Key::Space));
        assert_eq!(parse_key("Enter"), Some(Key::Return));
        assert_eq!(parse_key("PageDown"), Some(Key::PageDown));
    }

    #[test]
    fn parse_letter_keys_case_insensitive() {
        assert_eq!(parse_key("A"), Some(Key::KeyA));
        assert_eq!(parse_key("a"), Some(Key::KeyA));
        assert_eq!(parse_key("z"), Some(Key::KeyZ));
    }

    #[test]
    fn parse_unknown_key_returns_none() {
        assert_eq!(parse_key("xyz"), None);
        assert_eq!(parse_key(""), None);
        assert_eq!(parse_key("Ctrl+V"), None);
        assert_eq!(parse_key("ä"), None);
    }

    #[test]
    fn gate_suppresses_autorepeat() {
        let mut gate = KeyGate::new(Key::F9);
        let press = EventType::KeyPress(Key::F9);
        let release = EventType::KeyRelease(Key::F9);

        assert_eq!(gate.filter(&press), Some(HotkeyEvent::PushToTalkPressed));
        assert_eq!(gate.filter(&press), None);
        assert_eq!(gate.filter(&press), None);
        assert_eq!(gate.filter(&release), Some(HotkeyEvent::PushToTalkReleased));
        assert_eq!(gate.filter(&press), Some(HotkeyEvent::PushToTalkPressed));
    }

    #[test]
    fn gate_ignores_other_keys_and_orphan_releases() {
        let mut gate = KeyGate::new(Key::F9);
        assert_eq!(gate.filter(&EventType::KeyRelease(Key::F9)), None);
        assert_eq!(gate.filter(&EventType::KeyPress(Key::F8)), None);
        assert_eq!(gate.filter(&EventType::MouseMove { x: 1.0, y: 2.0 }), None);
    }
}
