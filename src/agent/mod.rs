//! # Speech Agent Connection
//!
//! The duplex WebSocket to the remote agent and the messages that travel over
//! it.
//!
//! ## Protocol:
//! 1. **Connection**: client connects with `Authorization: Token <key>`
//! 2. **Handshake**: first client message is the JSON `SettingsConfiguration`
//! 3. **Uplink**: every later client message is a binary microphone frame
//! 4. **Downlink**: the agent sends JSON events and binary speech, interleaved

pub mod connection;  // Connect + authenticate
pub mod protocol;    // Inbound frame classification
pub mod settings;    // Handshake payload
