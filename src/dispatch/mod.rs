//! Dispatch module: runs the key event pipeline
//!
//! Inputs arrive over a channel and are raised onto the bus one at a time.
//! Listeners, in order:
//! - Keymap: position changes to binding callbacks
//! - Sticky modifiers: arms and applies one-shot modifiers
//! - HID report: folds keycodes into the outgoing report

mod dispatcher;

pub use dispatcher::{Dispatcher, InputEvent};
