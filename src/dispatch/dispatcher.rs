//! Dispatcher: owns the bus and feeds it input events
//!
//! Everything on the bus runs on the task that calls [`Dispatcher::run`];
//! listeners and the sticky modifier state are never touched from elsewhere.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

use crate::behaviors::{StickyModifiers, StickyModifiersListener, StickySnapshot};
use crate::bus::EventBus;
use crate::events::{KeycodeStateChanged, OutputEvent, PositionStateChanged};
use crate::hid::HidReportListener;
use crate::keymap::{Keymap, KeymapListener};

/// Input accepted by the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    /// A key position changed state
    Position {
        position: u32,
        pressed: bool,
        timestamp: Option<i64>,
    },
    /// A keycode changed state outside the keymap
    Keycode {
        encoded: u32,
        pressed: bool,
        timestamp: Option<i64>,
    },
}

/// Drives the event bus from an input channel
pub struct Dispatcher {
    bus: EventBus,
    sticky: Rc<RefCell<StickyModifiers>>,
    output_tx: broadcast::Sender<OutputEvent>,
    started_at: Instant,
    last_snapshot: StickySnapshot,
    inputs_handled: u64,
}

impl Dispatcher {
    /// Create a dispatcher with listeners in order: keymap, sticky modifiers, HID report
    pub fn new(keymap: Keymap, output_tx: broadcast::Sender<OutputEvent>) -> Self {
        let sticky = Rc::new(RefCell::new(StickyModifiers::new()));

        let mut bus = EventBus::new();
        bus.subscribe(Box::new(KeymapListener::new(keymap, Rc::clone(&sticky))));
        bus.subscribe(Box::new(StickyModifiersListener::new(Rc::clone(&sticky))));
        bus.subscribe(Box::new(HidReportListener::new(output_tx.clone())));

        Self {
            bus,
            sticky,
            output_tx,
            started_at: Instant::now(),
            last_snapshot: StickySnapshot::default(),
            inputs_handled: 0,
        }
    }

    /// Current sticky modifier state
    pub fn snapshot(&self) -> StickySnapshot {
        self.sticky.borrow().snapshot()
    }

    /// Number of inputs processed so far
    pub fn inputs_handled(&self) -> u64 {
        self.inputs_handled
    }

    /// Run the dispatcher until the input channel closes
    pub async fn run(&mut self, mut input_rx: mpsc::Receiver<InputEvent>) {
        info!("dispatcher started");

        while let Some(input) = input_rx.recv().await {
            self.handle_input(input);
        }

        info!(inputs = self.inputs_handled(), "dispatcher stopped");
    }

    /// Raise the bus event for one input and deliver it to completion
    pub fn handle_input(&mut self, input: InputEvent) {
        let deliveries = match input {
            InputEvent::Position {
                position,
                pressed,
                timestamp,
            } => {
                let timestamp = self.resolve_timestamp(timestamp);
                self.bus.raise(PositionStateChanged {
                    position,
                    state: pressed,
                    timestamp,
                })
            }
            InputEvent::Keycode {
                encoded,
                pressed,
                timestamp,
            } => {
                let timestamp = self.resolve_timestamp(timestamp);
                self.bus
                    .raise(KeycodeStateChanged::from_encoded(encoded, pressed, timestamp))
            }
        };
        self.inputs_handled += 1;
        debug!(?input, deliveries, "input dispatched");

        let snapshot = self.snapshot();
        if snapshot != self.last_snapshot {
            self.last_snapshot = snapshot;
            let _ = self.output_tx.send(OutputEvent::StickyState(snapshot));
        }
    }

    /// Milliseconds since start when the input carries no timestamp
    fn resolve_timestamp(&self, timestamp: Option<i64>) -> i64 {
        timestamp.unwrap_or_else(|| {
            i64::try_from(self.started_at.elapsed().as_millis()).unwrap_or(i64::MAX)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{usage, Modifier, ModifierSet};

    // Positions in the default keymap
    const LCTRL: u32 = 0;
    const KEY_A: u32 = 1;
    const LSHIFT: u32 = 6;

    fn create_dispatcher() -> (Dispatcher, broadcast::Receiver<OutputEvent>) {
        let (tx, rx) = broadcast::channel(256);
        (Dispatcher::new(Keymap::default(), tx), rx)
    }

    fn position(position: u32, pressed: bool, timestamp: i64) -> InputEvent {
        InputEvent::Position {
            position,
            pressed,
            timestamp: Some(timestamp),
        }
    }

    fn drain(rx: &mut broadcast::Receiver<OutputEvent>) -> Vec<OutputEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn keycodes(events: &[OutputEvent]) -> Vec<(u16, bool)> {
        events
            .iter()
            .filter_map(|event| match event {
                OutputEvent::Keycode(ev) => Some((ev.keycode, ev.state)),
                _ => None,
            })
            .collect()
    }

    fn reports(events: &[OutputEvent]) -> Vec<(u8, u8)> {
        events
            .iter()
            .filter_map(|event| match event {
                OutputEvent::Report(report) => Some((report.modifiers, report.keycodes[0])),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_sticky_tap_then_key() {
        let (mut dispatcher, mut rx) = create_dispatcher();

        dispatcher.handle_input(position(LCTRL, true, 0));
        dispatcher.handle_input(position(LCTRL, false, 10));
        dispatcher.handle_input(position(KEY_A, true, 20));
        dispatcher.handle_input(position(KEY_A, false, 30));

        let events = drain(&mut rx);
        assert_eq!(
            keycodes(&events),
            vec![(0xE0, true), (0x04, true), (0xE0, false), (0x04, false)]
        );
        // Ctrl down, Ctrl+A, A with Ctrl up, all up
        assert_eq!(reports(&events), vec![(0x01, 0x00), (0x01, 0x04), (0x00, 0x04), (0x00, 0x00)]);
        assert_eq!(dispatcher.snapshot(), StickySnapshot::default());
        assert_eq!(dispatcher.inputs_handled(), 4);
    }

    #[test]
    fn test_sticky_state_is_broadcast_on_change() {
        let (mut dispatcher, mut rx) = create_dispatcher();

        dispatcher.handle_input(position(LSHIFT, true, 0));
        dispatcher.handle_input(position(LSHIFT, false, 5));

        let states: Vec<StickySnapshot> = drain(&mut rx)
            .into_iter()
            .filter_map(|event| match event {
                OutputEvent::StickyState(snapshot) => Some(snapshot),
                _ => None,
            })
            .collect();
        assert_eq!(states.len(), 2);
        assert_eq!(states[0].pressed, ModifierSet::LEFT_SHIFT);
        assert_eq!(states[1].accumulated, ModifierSet::LEFT_SHIFT);
    }

    #[test]
    fn test_double_tap_lock_through_keymap() {
        let (mut dispatcher, mut rx) = create_dispatcher();

        dispatcher.handle_input(position(LCTRL, true, 0));
        dispatcher.handle_input(position(LCTRL, false, 10));
        dispatcher.handle_input(position(LCTRL, true, 20));
        dispatcher.handle_input(position(KEY_A, true, 30));
        dispatcher.handle_input(position(KEY_A, false, 40));
        dispatcher.handle_input(position(LCTRL, false, 50));

        let events = drain(&mut rx);
        assert_eq!(
            keycodes(&events),
            vec![
                (0xE0, true),
                (0xE0, false),
                (0xE0, true),
                (0x04, true),
                (0x04, false),
                (0xE0, false),
            ]
        );
        assert_eq!(dispatcher.snapshot(), StickySnapshot::default());
    }

    #[test]
    fn test_external_keycode_triggers_armed_modifier() {
        let (mut dispatcher, mut rx) = create_dispatcher();

        dispatcher.handle_input(position(LSHIFT, true, 0));
        dispatcher.handle_input(position(LSHIFT, false, 1));
        dispatcher.handle_input(InputEvent::Keycode {
            encoded: usage::keyboard(0x2C),
            pressed: true,
            timestamp: None,
        });

        let shift = usage::usage_id(Modifier::LeftShift.encoded());
        assert_eq!(
            keycodes(&drain(&mut rx)),
            vec![(shift, true), (0x2C, true), (shift, false)]
        );
    }

    #[test]
    fn test_run_until_channel_closes() {
        let (mut dispatcher, mut rx) = create_dispatcher();
        let (input_tx, input_rx) = mpsc::channel(8);

        tokio_test::block_on(async {
            tokio_test::assert_ok!(input_tx.send(position(KEY_A, true, 0)).await);
            tokio_test::assert_ok!(input_tx.send(position(KEY_A, false, 1)).await);
        });
        drop(input_tx);

        tokio_test::block_on(dispatcher.run(input_rx));

        assert_eq!(dispatcher.inputs_handled(), 2);
        assert_eq!(keycodes(&drain(&mut rx)), vec![(0x04, true), (0x04, false)]);
    }
}
