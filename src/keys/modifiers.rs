//! Modifier key definitions and set tracking
//!
//! Provides the eight standard HID modifiers and a fixed-width set type
//! used to track which of them are held or armed.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use super::usage;

/// One of the eight standard keyboard modifiers, in HID bit order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modifier {
    LeftControl,
    LeftShift,
    LeftAlt,
    LeftGui,
    RightControl,
    RightShift,
    RightAlt,
    RightGui,
}

impl Modifier {
    /// All modifiers in ascending index order
    pub const ALL: [Modifier; 8] = [
        Modifier::LeftControl,
        Modifier::LeftShift,
        Modifier::LeftAlt,
        Modifier::LeftGui,
        Modifier::RightControl,
        Modifier::RightShift,
        Modifier::RightAlt,
        Modifier::RightGui,
    ];

    /// Bit index of this modifier (0..=7)
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Look up a modifier by bit index
    pub fn from_index(index: u32) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    /// Encoded keycode (usage page + usage id) for this modifier
    pub fn encoded(self) -> u32 {
        usage::encode(
            usage::HID_USAGE_KEY,
            usage::HID_USAGE_KEY_KEYBOARD_LEFTCONTROL + u16::from(self.index()),
        )
    }

    /// The single-element set for this modifier
    pub fn as_set(self) -> ModifierSet {
        ModifierSet::from_bits_truncate(1 << self.index())
    }
}

impl std::fmt::Display for Modifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Modifier::LeftControl => "LCTRL",
            Modifier::LeftShift => "LSHIFT",
            Modifier::LeftAlt => "LALT",
            Modifier::LeftGui => "LGUI",
            Modifier::RightControl => "RCTRL",
            Modifier::RightShift => "RSHIFT",
            Modifier::RightAlt => "RALT",
            Modifier::RightGui => "RGUI",
        };
        write!(f, "{}", name)
    }
}

bitflags! {
    /// Set of modifiers, one bit per modifier index
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct ModifierSet: u8 {
        const LEFT_CONTROL = 1 << 0;
        const LEFT_SHIFT = 1 << 1;
        const LEFT_ALT = 1 << 2;
        const LEFT_GUI = 1 << 3;
        const RIGHT_CONTROL = 1 << 4;
        const RIGHT_SHIFT = 1 << 5;
        const RIGHT_ALT = 1 << 6;
        const RIGHT_GUI = 1 << 7;
    }
}

impl ModifierSet {
    /// Set for a raw modifier index.
    ///
    /// Indices 8 and above do not name a modifier and yield the empty set.
    pub fn from_index(index: u32) -> Self {
        Modifier::from_index(index)
            .map(Modifier::as_set)
            .unwrap_or_else(Self::empty)
    }

    /// Iterate over the modifiers in this set, lowest index first
    pub fn iter_modifiers(self) -> impl Iterator<Item = Modifier> {
        Modifier::ALL
            .into_iter()
            .filter(move |m| self.contains(m.as_set()))
    }
}

impl std::fmt::Display for ModifierSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:02X}", self.bits())
    }
}
