//! IPC module for feeding key input and observing output

mod protocol;
mod server;

pub use server::Server;
