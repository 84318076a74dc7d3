//! Keyboard report tracking
//!
//! The last listener on the bus. Folds keycode events into a boot-protocol
//! style keyboard report and forwards both to subscribers.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::bus::{Disposition, Listener, Outbox};
use crate::events::{BusEvent, KeycodeStateChanged, OutputEvent};
use crate::keys::{usage, ModifierSet};

/// Number of non-modifier key slots in a report
pub const REPORT_KEYS: usize = 6;

/// Keyboard input report: modifier byte, reserved byte, six key slots
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyboardReport {
    pub modifiers: u8,
    pub reserved: u8,
    pub keycodes: [u8; REPORT_KEYS],
}

impl std::fmt::Display for KeyboardReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "mods=0x{:02X} keys=[", self.modifiers)?;
        for (i, keycode) in self.keycodes.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{:02X}", keycode)?;
        }
        write!(f, "]")
    }
}

/// Held keys and modifiers making up the current report
#[derive(Debug, Default)]
struct ReportState {
    explicit: ModifierSet,
    /// Implicit modifiers of each occupied key slot
    implicit: [ModifierSet; REPORT_KEYS],
    keycodes: [u8; REPORT_KEYS],
}

impl ReportState {
    fn apply(&mut self, ev: &KeycodeStateChanged) -> bool {
        if ev.usage_page != usage::HID_USAGE_KEY {
            debug!(usage_page = ev.usage_page, "ignoring non-keyboard usage");
            return false;
        }

        if !ev.explicit_modifiers.is_empty() {
            if ev.state {
                self.explicit |= ev.explicit_modifiers;
            } else {
                self.explicit -= ev.explicit_modifiers;
            }
            return true;
        }

        let Ok(keycode) = u8::try_from(ev.keycode) else {
            warn!(keycode = ev.keycode, "keycode does not fit a boot report");
            return false;
        };

        if ev.state {
            if self.keycodes.contains(&keycode) {
                return false;
            }
            match self.keycodes.iter().position(|&k| k == 0) {
                Some(slot) => {
                    self.keycodes[slot] = keycode;
                    self.implicit[slot] = ev.implicit_modifiers;
                    true
                }
                None => {
                    warn!(keycode, "report full, dropping key press");
                    false
                }
            }
        } else {
            match self.keycodes.iter().position(|&k| k == keycode) {
                Some(slot) => {
                    self.keycodes[slot] = 0;
                    self.implicit[slot] = ModifierSet::empty();
                    true
                }
                None => false,
            }
        }
    }

    fn report(&self) -> KeyboardReport {
        let implicit = self
            .implicit
            .iter()
            .fold(ModifierSet::empty(), |acc, &mods| acc | mods);
        KeyboardReport {
            modifiers: (self.explicit | implicit).bits(),
            reserved: 0,
            keycodes: self.keycodes,
        }
    }
}

/// Bus listener maintaining the keyboard report
pub struct HidReportListener {
    state: ReportState,
    last_report: KeyboardReport,
    output_tx: broadcast::Sender<OutputEvent>,
}

impl HidReportListener {
    pub fn new(output_tx: broadcast::Sender<OutputEvent>) -> Self {
        Self {
            state: ReportState::default(),
            last_report: KeyboardReport::default(),
            output_tx,
        }
    }
}

impl Listener for HidReportListener {
    fn name(&self) -> &'static str {
        "hid_report"
    }

    fn on_event(&mut self, event: &BusEvent, _outbox: &mut Outbox) -> Disposition {
        let Some(ev) = event.as_keycode_state_changed() else {
            return Disposition::Bubble;
        };

        // Nobody listening is fine
        let _ = self.output_tx.send(OutputEvent::Keycode(ev.clone()));

        if self.state.apply(ev) {
            let report = self.state.report();
            if report != self.last_report {
                debug!(%report, "report changed");
                self.last_report = report;
                let _ = self.output_tx.send(OutputEvent::Report(report));
            }
        }

        Disposition::Bubble
    }
}
