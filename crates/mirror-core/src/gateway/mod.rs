//! Outbound chat-platform port.

pub mod port;

pub use port::GatewayPort;
