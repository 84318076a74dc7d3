//! Sticky (one-shot) modifier behavior
//!
//! Releasing a sticky modifier key arms it; the next keycode press picks up
//! every armed modifier, which are pressed around a copy of that key and
//! released right after it.
//!
//! Two paths switch to normal mode, where sticky keys act as plain held
//! modifiers until every one of them is released:
//! - Double tap: pressing a modifier that is still armed
//! - Hold: another key is pressed while a sticky key is physically down

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bus::{Disposition, Listener, Outbox};
use crate::events::{BusEvent, KeycodeStateChanged};
use crate::keys::ModifierSet;

use super::{Behavior, BehaviorResult, Binding, BindingEvent};

/// Serializable view of the sticky modifier state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StickySnapshot {
    pub pressed: ModifierSet,
    pub accumulated: ModifierSet,
    pub normal_mode: bool,
}

/// Sticky modifier state machine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StickyModifiers {
    /// Sticky keys currently held down
    pressed: ModifierSet,
    /// Modifiers armed for the next key press
    accumulated: ModifierSet,
    /// Sticky keys behave as normal modifiers
    normal_mode: bool,
}

impl StickyModifiers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StickySnapshot {
        StickySnapshot {
            pressed: self.pressed,
            accumulated: self.accumulated,
            normal_mode: self.normal_mode,
        }
    }

    /// Handle a keycode state change seen on the bus
    pub fn on_keycode_state_changed(
        &mut self,
        event: &BusEvent,
        outbox: &mut Outbox,
    ) -> Disposition {
        let ev = match event.as_keycode_state_changed() {
            Some(ev) if ev.state => ev,
            _ => return Disposition::Bubble,
        };

        if !self.pressed.is_empty() && !self.normal_mode {
            // A key went down while sticky keys are held: use them as plain modifiers
            debug!(pressed = %self.pressed, "Entering normal mode");
            self.enter_normal_mode();
            raise_modifiers(self.pressed, true, ev.timestamp, outbox);
        } else if !self.accumulated.is_empty() {
            debug!(accumulated = %self.accumulated, trigger = %ev, "Trigger sticky modifiers");

            // Take the armed set before publishing anything
            let accumulated = std::mem::take(&mut self.accumulated);
            raise_modifiers(accumulated, true, ev.timestamp, outbox);
            outbox.release(ev.clone());
            raise_modifiers(accumulated, false, ev.timestamp, outbox);

            return Disposition::Handled;
        }

        Disposition::Bubble
    }

    fn enter_normal_mode(&mut self) {
        self.normal_mode = true;
        self.accumulated = ModifierSet::empty();
    }
}

/// Raise one keycode event per modifier, lowest index first
fn raise_modifiers(modifiers: ModifierSet, pressed: bool, timestamp: i64, outbox: &mut Outbox) {
    for modifier in modifiers.iter_modifiers() {
        debug!(%modifier, pressed, "raising");
        outbox.raise(KeycodeStateChanged::from_encoded(modifier.encoded(), pressed, timestamp));
    }
}

/// Modifier named by a sticky binding; indices past 7 give the empty set
fn binding_modifier(binding: &Binding) -> ModifierSet {
    ModifierSet::from_index(binding.param1 & 0xF)
}

impl Behavior for StickyModifiers {
    fn binding_pressed(
        &mut self,
        binding: &Binding,
        event: BindingEvent,
        outbox: &mut Outbox,
    ) -> BehaviorResult {
        let modifier = binding_modifier(binding);
        self.pressed |= modifier;
        debug!(pressed = %self.pressed, "sticky modifier pressed");

        if self.normal_mode {
            debug!(pressed = %self.pressed, "normal mode modifier pressed");
            outbox.raise(KeycodeStateChanged::from_encoded(binding.param1, true, event.timestamp));
        } else if !modifier.is_empty() && self.accumulated.contains(modifier) {
            // Double tap
            debug!(%modifier, "Entering normal mode");
            self.enter_normal_mode();

            // Tap once, then hold
            raise_modifiers(modifier, true, event.timestamp, outbox);
            raise_modifiers(modifier, false, event.timestamp, outbox);
            raise_modifiers(modifier, true, event.timestamp, outbox);
        }

        BehaviorResult::Opaque
    }

    fn binding_released(
        &mut self,
        binding: &Binding,
        event: BindingEvent,
        outbox: &mut Outbox,
    ) -> BehaviorResult {
        let modifier = binding_modifier(binding);
        self.pressed ^= modifier;

        if self.normal_mode {
            outbox.raise(KeycodeStateChanged::from_encoded(binding.param1, false, event.timestamp));
            debug!(pressed = %self.pressed, "normal mode modifier released");

            if self.pressed.is_empty() {
                debug!("Exiting normal mode");
                self.normal_mode = false;
                self.accumulated = ModifierSet::empty();
            }
        } else {
            self.accumulated |= modifier;
            debug!(accumulated = %self.accumulated, "accumulating");
        }

        BehaviorResult::Opaque
    }
}

/// Bus subscription for a shared [`StickyModifiers`] state
pub struct StickyModifiersListener {
    state: Rc<RefCell<StickyModifiers>>,
}

impl StickyModifiersListener {
    pub fn new(state: Rc<RefCell<StickyModifiers>>) -> Self {
        Self { state }
    }
}

impl Listener for StickyModifiersListener {
    fn name(&self) -> &'static str {
        "sticky_modifiers"
    }

    fn on_event(&mut self, event: &BusEvent, outbox: &mut Outbox) -> Disposition {
        self.state.borrow_mut().on_keycode_state_changed(event, outbox)
    }
}
