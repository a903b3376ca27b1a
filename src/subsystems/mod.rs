//! Long-running subsystems of the relay.

pub mod comms;
pub mod runtime;
