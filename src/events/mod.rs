//! Events module for the key event bus
//!
//! Provides the event types carried on the bus (position and keycode
//! state changes) and the output events pushed to subscribers.

use serde::{Deserialize, Serialize};

use crate::behaviors::StickySnapshot;
use crate::hid::KeyboardReport;
use crate::keys::{usage, Modifier, ModifierSet};

/// A keycode was pressed or released
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeycodeStateChanged {
    /// HID usage page
    pub usage_page: u16,
    /// HID usage id within the page
    pub keycode: u16,
    /// Modifiers the keycode implies (e.g. shift for a shifted symbol)
    pub implicit_modifiers: ModifierSet,
    /// Set when the keycode is itself a modifier
    pub explicit_modifiers: ModifierSet,
    /// True for press, false for release
    pub state: bool,
    /// Milliseconds, monotonic
    pub timestamp: i64,
}

impl KeycodeStateChanged {
    /// Build an event from an encoded keycode
    pub fn from_encoded(encoded: u32, state: bool, timestamp: i64) -> Self {
        let usage_page = usage::usage_page(encoded);
        let keycode = usage::usage_id(encoded);

        let explicit_modifiers =
            if usage_page == usage::HID_USAGE_KEY && usage::is_modifier_usage(keycode) {
                let index = keycode - usage::HID_USAGE_KEY_KEYBOARD_LEFTCONTROL;
                ModifierSet::from_index(u32::from(index))
            } else {
                ModifierSet::empty()
            };

        Self {
            usage_page,
            keycode,
            implicit_modifiers: usage::implicit_modifiers(encoded),
            explicit_modifiers,
            state,
            timestamp,
        }
    }

    /// The modifier this event names, if it is a modifier keycode
    pub fn modifier(&self) -> Option<Modifier> {
        self.explicit_modifiers.iter_modifiers().next()
    }
}

impl std::fmt::Display for KeycodeStateChanged {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let action = if self.state { "PRESS" } else { "RELEASE" };
        match self.modifier() {
            Some(modifier) => write!(f, "{} {} @{}", action, modifier, self.timestamp),
            None => write!(
                f,
                "{} 0x{:02X}/0x{:02X} @{}",
                action, self.usage_page, self.keycode, self.timestamp
            ),
        }
    }
}

/// A key position in the matrix changed state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionStateChanged {
    /// Key position index in the keymap
    pub position: u32,
    /// True for press, false for release
    pub state: bool,
    /// Milliseconds, monotonic
    pub timestamp: i64,
}

/// Events carried on the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    Position(PositionStateChanged),
    Keycode(KeycodeStateChanged),
}

impl BusEvent {
    /// View this event as a keycode state change
    pub fn as_keycode_state_changed(&self) -> Option<&KeycodeStateChanged> {
        match self {
            BusEvent::Keycode(ev) => Some(ev),
            _ => None,
        }
    }

    /// View this event as a position state change
    pub fn as_position_state_changed(&self) -> Option<&PositionStateChanged> {
        match self {
            BusEvent::Position(ev) => Some(ev),
            _ => None,
        }
    }
}

impl From<KeycodeStateChanged> for BusEvent {
    fn from(ev: KeycodeStateChanged) -> Self {
        BusEvent::Keycode(ev)
    }
}

impl From<PositionStateChanged> for BusEvent {
    fn from(ev: PositionStateChanged) -> Self {
        BusEvent::Position(ev)
    }
}

/// Events pushed out of the dispatcher to subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputEvent {
    /// A keycode event reached the end of the listener chain
    Keycode(KeycodeStateChanged),

    /// The keyboard report changed
    Report(KeyboardReport),

    /// The sticky modifier state changed
    StickyState(StickySnapshot),
}

impl std::fmt::Display for OutputEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputEvent::Keycode(ev) => write!(f, "KEYCODE {}", ev),
            OutputEvent::Report(report) => write!(f, "REPORT {}", report),
            OutputEvent::StickyState(snapshot) => write!(
                f,
                "STICKY pressed={} accumulated={} normal_mode={}",
                snapshot.pressed, snapshot.accumulated, snapshot.normal_mode
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_encoded_modifier() {
        let ev = KeycodeStateChanged::from_encoded(Modifier::LeftShift.encoded(), true, 42);
        assert_eq!(ev.usage_page, usage::HID_USAGE_KEY);
        assert_eq!(ev.keycode, 0xE1);
        assert_eq!(ev.explicit_modifiers, ModifierSet::LEFT_SHIFT);
        assert_eq!(ev.modifier(), Some(Modifier::LeftShift));
        assert!(ev.state);
        assert_eq!(ev.timestamp, 42);
    }

    #[test]
    fn test_from_encoded_plain_key() {
        let ev = KeycodeStateChanged::from_encoded(usage::keyboard(0x04), false, 7);
        assert!(ev.explicit_modifiers.is_empty());
        assert_eq!(ev.modifier(), None);
        assert_eq!(ev.to_string(), "RELEASE 0x07/0x04 @7");
    }

    #[test]
    fn test_consumer_usage_is_not_a_modifier() {
        let encoded = usage::encode(usage::HID_USAGE_CONSUMER, 0xE2);
        let ev = KeycodeStateChanged::from_encoded(encoded, true, 0);
        assert!(ev.explicit_modifiers.is_empty());
    }

    #[test]
    fn test_bus_event_views() {
        let ev: BusEvent = PositionStateChanged { position: 3, state: true, timestamp: 0 }.into();
        assert!(ev.as_keycode_state_changed().is_none());
        assert_eq!(ev.as_position_state_changed().map(|p| p.position), Some(3));
    }

    #[test]
    fn test_output_event_serialization() {
        let key = KeycodeStateChanged::from_encoded(usage::keyboard(0x05), true, 1500);
        let event = OutputEvent::Keycode(key);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"keycode\""));
        assert!(json.contains("1500"));
    }
}
