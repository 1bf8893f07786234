//! holdtalk: hold a key, speak, release, and get the transcript.
//!
//! The crate records one utterance per push-to-talk hold, verifies the WAV
//! is 16 kHz mono 16-bit PCM, hands it to an external speech-to-text
//! executable and delivers the parsed transcript.
//!
//! | module       | role                                                   |
//! |--------------|--------------------------------------------------------|
//! | [`audio`]    | cpal capture, WAV writing, WAV format gatekeeper        |
//! | [`config`]   | `settings.toml` and platform paths                      |
//! | [`hotkey`]   | global push-to-talk key via rdev                        |
//! | [`output`]   | clipboard, history file, quarantine, error reporting    |
//! | [`pipeline`] | session state machine and single-flight controller      |
//! | [`stt`]      | STT subprocess adapter and its result/error contract    |

pub mod audio;
pub mod config;
pub mod hotkey;
pub mod output;
pub mod pipeline;
pub mod stt;
