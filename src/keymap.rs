//! Keymap: maps key positions to bindings and invokes their behaviors

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::behaviors::{
    Behavior, BehaviorKind, BehaviorResult, Binding, BindingEvent, KeyPress, StickyModifiers,
};
use crate::bus::{Disposition, Listener, Outbox};
use crate::events::BusEvent;
use crate::keys::{usage, Modifier};

/// Errors loading a keymap
#[derive(Debug, thiserror::Error)]
pub enum KeymapError {
    #[error("failed to read keymap {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse keymap: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("keymap has no bindings")]
    Empty,
}

/// Single-layer keymap indexed by key position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keymap {
    pub bindings: Vec<Binding>,
}

impl Default for Keymap {
    /// Two rows: sticky modifiers on the outer keys, letters in between
    fn default() -> Self {
        let key = |id| Binding::key_press(usage::keyboard(id));
        Self {
            bindings: vec![
                Binding::sticky(Modifier::LeftControl),
                key(0x04), // a
                key(0x05), // b
                key(0x06), // c
                key(0x07), // d
                Binding::sticky(Modifier::RightControl),
                Binding::sticky(Modifier::LeftShift),
                key(0x08), // e
                key(0x09), // f
                Binding::sticky(Modifier::LeftAlt),
                Binding::sticky(Modifier::LeftGui),
                Binding::sticky(Modifier::RightShift),
            ],
        }
    }
}

impl Keymap {
    /// Parse a keymap from JSON text
    pub fn from_json(json: &str) -> Result<Self, KeymapError> {
        let keymap: Keymap = serde_json::from_str(json)?;
        if keymap.bindings.is_empty() {
            return Err(KeymapError::Empty);
        }
        Ok(keymap)
    }

    /// Load a keymap file
    pub fn load(path: &Path) -> Result<Self, KeymapError> {
        let json = std::fs::read_to_string(path).map_err(|source| KeymapError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Load a keymap file, falling back to the built-in layout if it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self, KeymapError> {
        if path.exists() {
            let keymap = Self::load(path)?;
            info!(?path, bindings = keymap.bindings.len(), "keymap loaded");
            Ok(keymap)
        } else {
            info!(?path, "no keymap file, using built-in layout");
            Ok(Self::default())
        }
    }

    /// Binding at a key position
    pub fn binding(&self, position: u32) -> Option<&Binding> {
        self.bindings.get(position as usize)
    }
}

/// Bus listener turning position changes into binding callbacks
pub struct KeymapListener {
    keymap: Keymap,
    key_press: KeyPress,
    sticky: Rc<RefCell<StickyModifiers>>,
}

impl KeymapListener {
    pub fn new(keymap: Keymap, sticky: Rc<RefCell<StickyModifiers>>) -> Self {
        Self {
            keymap,
            key_press: KeyPress,
            sticky,
        }
    }

    fn invoke(
        &mut self,
        binding: Binding,
        pressed: bool,
        event: BindingEvent,
        outbox: &mut Outbox,
    ) -> BehaviorResult {
        match binding.behavior {
            BehaviorKind::KeyPress => {
                dispatch(&mut self.key_press, &binding, pressed, event, outbox)
            }
            BehaviorKind::StickyModifier => {
                let mut sticky = self.sticky.borrow_mut();
                dispatch(&mut *sticky, &binding, pressed, event, outbox)
            }
            BehaviorKind::None => BehaviorResult::Transparent,
        }
    }
}

fn dispatch(
    behavior: &mut dyn Behavior,
    binding: &Binding,
    pressed: bool,
    event: BindingEvent,
    outbox: &mut Outbox,
) -> BehaviorResult {
    if pressed {
        behavior.binding_pressed(binding, event, outbox)
    } else {
        behavior.binding_released(binding, event, outbox)
    }
}

impl Listener for KeymapListener {
    fn name(&self) -> &'static str {
        "keymap"
    }

    fn on_event(&mut self, event: &BusEvent, outbox: &mut Outbox) -> Disposition {
        let Some(ev) = event.as_position_state_changed() else {
            return Disposition::Bubble;
        };

        let Some(binding) = self.keymap.binding(ev.position).copied() else {
            warn!(position = ev.position, "no binding for position");
            return Disposition::Bubble;
        };

        let binding_event = BindingEvent {
            position: ev.position,
            timestamp: ev.timestamp,
        };
        let result = self.invoke(binding, ev.state, binding_event, outbox);
        debug!(
            position = ev.position,
            pressed = ev.state,
            ?binding.behavior,
            ?result,
            "binding invoked"
        );

        match result {
            BehaviorResult::Opaque => Disposition::Handled,
            BehaviorResult::Transparent => Disposition::Bubble,
        }
    }
}
