//! Behaviors module: what a key binding does when its position changes state
//!
//! Provides:
//! - KeyPress: emits the bound keycode while the key is held
//! - StickyModifiers: one-shot modifiers with a double-tap lock
//! - None: transparent, emits nothing

mod key_press;
mod sticky_modifiers;

use serde::{Deserialize, Serialize};

use crate::bus::Outbox;
use crate::keys::Modifier;

pub use key_press::KeyPress;
pub use sticky_modifiers::{StickyModifiers, StickyModifiersListener, StickySnapshot};

/// Which behavior a binding invokes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorKind {
    KeyPress,
    StickyModifier,
    None,
}

/// A behavior bound to a key position together with its parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub behavior: BehaviorKind,
    /// Encoded keycode (or modifier) the behavior acts on
    #[serde(default)]
    pub param1: u32,
    #[serde(default)]
    pub param2: u32,
}

impl Binding {
    /// Sticky binding for a modifier
    pub fn sticky(modifier: Modifier) -> Self {
        Self {
            behavior: BehaviorKind::StickyModifier,
            param1: modifier.encoded(),
            param2: 0,
        }
    }

    /// Plain key press binding for an encoded keycode
    pub fn key_press(encoded: u32) -> Self {
        Self {
            behavior: BehaviorKind::KeyPress,
            param1: encoded,
            param2: 0,
        }
    }

    /// Binding that does nothing
    #[cfg(test)]
    pub fn none() -> Self {
        Self {
            behavior: BehaviorKind::None,
            param1: 0,
            param2: 0,
        }
    }
}

/// Context of a binding invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingEvent {
    /// Key position that triggered the binding
    pub position: u32,
    /// Milliseconds, monotonic
    pub timestamp: i64,
}

/// Outcome of a binding callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BehaviorResult {
    /// The key event was fully consumed
    Opaque,
    /// The behavior did nothing; default handling may continue
    Transparent,
}

/// Binding callbacks invoked by the keymap
pub trait Behavior {
    fn binding_pressed(
        &mut self,
        binding: &Binding,
        event: BindingEvent,
        outbox: &mut Outbox,
    ) -> BehaviorResult;

    fn binding_released(
        &mut self,
        binding: &Binding,
        event: BindingEvent,
        outbox: &mut Outbox,
    ) -> BehaviorResult;
}
