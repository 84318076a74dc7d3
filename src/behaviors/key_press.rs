//! Key press behavior

use tracing::debug;

use crate::bus::Outbox;
use crate::events::KeycodeStateChanged;

use super::{Behavior, BehaviorResult, Binding, BindingEvent};

/// Presses the bound keycode while the key is held
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyPress;

impl Behavior for KeyPress {
    fn binding_pressed(
        &mut self,
        binding: &Binding,
        event: BindingEvent,
        outbox: &mut Outbox,
    ) -> BehaviorResult {
        debug!(position = event.position, keycode = binding.param1, "key press");
        outbox.raise(KeycodeStateChanged::from_encoded(binding.param1, true, event.timestamp));
        BehaviorResult::Opaque
    }

    fn binding_released(
        &mut self,
        binding: &Binding,
        event: BindingEvent,
        outbox: &mut Outbox,
    ) -> BehaviorResult {
        debug!(position = event.position, keycode = binding.param1, "key release");
        outbox.raise(KeycodeStateChanged::from_encoded(binding.param1, false, event.timestamp));
        BehaviorResult::Opaque
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Command;
    use crate::events::BusEvent;
    use crate::keys::usage;

    #[test]
    fn test_press_and_release_raise_keycode() {
        let binding = Binding::key_press(usage::keyboard(0x04));
        let event = BindingEvent { position: 2, timestamp: 10 };
        let mut outbox = Outbox::default();

        assert_eq!(KeyPress.binding_pressed(&binding, event, &mut outbox), BehaviorResult::Opaque);
        assert_eq!(KeyPress.binding_released(&binding, event, &mut outbox), BehaviorResult::Opaque);

        let states: Vec<bool> = outbox
            .commands()
            .iter()
            .map(|command| match command {
                Command::Raise(BusEvent::Keycode(ev)) => {
                    assert_eq!(ev.keycode, 0x04);
                    assert_eq!(ev.timestamp, 10);
                    ev.state
                }
                other => panic!("unexpected command {:?}", other),
            })
            .collect();
        assert_eq!(states, vec![true, false]);
    }
}
