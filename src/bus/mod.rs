//! Event bus module
//!
//! Listeners subscribe in order and return a [`Disposition`] per event.
//! Events they publish are queued and re-delivered by the bus.

mod manager;

pub use manager::{Disposition, EventBus, Listener, Outbox};

#[cfg(test)]
pub use manager::Command;
