//! # Voice Session
//!
//! Everything that lives for exactly one conversation: the uplink and
//! downlink tasks, control event reporting, the session state machine and
//! the coordinator that wires them together.

pub mod coordinator; // Startup, concurrent tasks, teardown
pub mod downlink;    // Agent → speaker, barge-in
pub mod events;      // Control event and order status logging
pub mod status;      // State machine and counters
pub mod uplink;      // Handshake, microphone → agent
