// ABOUTME: Wire messages, the binary frame hierarchy, and the Protocol Engine state machine

pub mod client;
pub mod messages;
pub mod transport;

pub use client::{BinaryFrame, Command, EngineEvent, EngineState, ProtocolEngine, VolumeSink};
pub use transport::{Transport, TransportEvent, WsTransport};
