//! Encoded keycode helpers
//!
//! A keycode is encoded as `(usage_page << 16) | usage_id`, with implicit
//! modifiers (e.g. the shift in a shifted symbol) carried in bits 24..31.

use super::ModifierSet;

/// Keyboard/keypad usage page
pub const HID_USAGE_KEY: u16 = 0x07;
/// Consumer usage page
#[cfg(test)]
pub const HID_USAGE_CONSUMER: u16 = 0x0C;

/// Usage id of the first modifier (left control); the other seven follow it
pub const HID_USAGE_KEY_KEYBOARD_LEFTCONTROL: u16 = 0xE0;
/// Usage id of the last modifier (right gui)
pub const HID_USAGE_KEY_KEYBOARD_RIGHT_GUI: u16 = 0xE7;

/// Encode a usage page and usage id into a keycode
pub const fn encode(page: u16, id: u16) -> u32 {
    ((page as u32 & 0xFF) << 16) | id as u32
}

/// Usage page of an encoded keycode
pub const fn usage_page(encoded: u32) -> u16 {
    ((encoded >> 16) & 0xFF) as u16
}

/// Usage id of an encoded keycode
pub const fn usage_id(encoded: u32) -> u16 {
    (encoded & 0xFFFF) as u16
}

/// Implicit modifiers carried by an encoded keycode
pub fn implicit_modifiers(encoded: u32) -> ModifierSet {
    ModifierSet::from_bits_truncate((encoded >> 24) as u8)
}

/// Attach implicit modifiers to an encoded keycode
#[cfg(test)]
pub fn with_modifiers(encoded: u32, modifiers: ModifierSet) -> u32 {
    (encoded & 0x00FF_FFFF) | (u32::from(modifiers.bits()) << 24)
}

/// Whether a keyboard-page usage id is one of the eight modifiers
pub const fn is_modifier_usage(id: u16) -> bool {
    id >= HID_USAGE_KEY_KEYBOARD_LEFTCONTROL && id <= HID_USAGE_KEY_KEYBOARD_RIGHT_GUI
}

/// Shorthand for a keyboard-page keycode
pub const fn keyboard(id: u16) -> u32 {
    encode(HID_USAGE_KEY, id)
}
