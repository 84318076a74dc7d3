//! Synchronous event bus with explicit re-delivery
//!
//! Listeners never call back into the bus. Anything they publish goes into
//! an [`Outbox`] and is delivered by the bus once the listener returns,
//! before the current event moves on to the next listener. Delivery order
//! therefore matches nested dispatch, without any recursion.

use std::collections::VecDeque;

use tracing::{debug, trace, warn};

use crate::events::BusEvent;

/// Upper bound on listener invocations for one raised event
pub const MAX_DELIVERIES: usize = 1024;

/// What a listener did with an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Continue on to the next listener
    Bubble,
    /// Stop propagation of this event in its current form
    Handled,
}

/// A bus subscriber
pub trait Listener {
    /// Name used in log output
    fn name(&self) -> &'static str;

    /// Handle an event, publishing follow-up events into `outbox`
    fn on_event(&mut self, event: &BusEvent, outbox: &mut Outbox) -> Disposition;
}

/// Publish request collected from a listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Deliver a new event starting from the first listener
    Raise(BusEvent),
    /// Deliver a copy of an event starting after the publishing listener
    Release(BusEvent),
}

/// Events published by a listener during one invocation
#[derive(Debug, Default)]
pub struct Outbox {
    commands: Vec<Command>,
}

impl Outbox {
    /// Publish a new event
    pub fn raise(&mut self, event: impl Into<BusEvent>) {
        self.commands.push(Command::Raise(event.into()));
    }

    /// Re-release a copy of an event past the current listener
    pub fn release(&mut self, event: impl Into<BusEvent>) {
        self.commands.push(Command::Release(event.into()));
    }

    /// Commands published so far
    #[cfg(test)]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    fn into_commands(self) -> Vec<Command> {
        self.commands
    }
}

/// An event waiting for delivery to `next_listener`
struct Pending {
    event: BusEvent,
    next_listener: usize,
}

/// Ordered list of listeners and the delivery loop
#[derive(Default)]
pub struct EventBus {
    listeners: Vec<Box<dyn Listener>>,
}

impl EventBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener at the end of the chain
    pub fn subscribe(&mut self, listener: Box<dyn Listener>) {
        debug!(listener = listener.name(), index = self.listeners.len(), "listener subscribed");
        self.listeners.push(listener);
    }

    /// Raise an event and deliver it, along with everything it causes to be
    /// published, to completion.
    ///
    /// Returns the number of listener invocations performed.
    pub fn raise(&mut self, event: impl Into<BusEvent>) -> usize {
        let mut queue = VecDeque::new();
        queue.push_back(Pending {
            event: event.into(),
            next_listener: 0,
        });

        let mut deliveries = 0;

        while let Some(Pending { event, next_listener }) = queue.pop_front() {
            let Some(listener) = self.listeners.get_mut(next_listener) else {
                continue;
            };

            if deliveries == MAX_DELIVERIES {
                warn!(
                    deliveries,
                    dropped = queue.len() + 1,
                    "event delivery budget exhausted, dropping pending events"
                );
                break;
            }
            deliveries += 1;

            let mut outbox = Outbox::default();
            let disposition = listener.on_event(&event, &mut outbox);
            trace!(listener = listener.name(), ?disposition, ?event, "event delivered");

            let mut follow_ups: Vec<Pending> = outbox
                .into_commands()
                .into_iter()
                .map(|command| match command {
                    Command::Raise(event) => Pending {
                        event,
                        next_listener: 0,
                    },
                    Command::Release(event) => Pending {
                        event,
                        next_listener: next_listener + 1,
                    },
                })
                .collect();

            if disposition == Disposition::Bubble {
                follow_ups.push(Pending {
                    event,
                    next_listener: next_listener + 1,
                });
            }

            // Published events run ahead of the current event's continuation
            for pending in follow_ups.into_iter().rev() {
                queue.push_front(pending);
            }
        }

        deliveries
    }
}
