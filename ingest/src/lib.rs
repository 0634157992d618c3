//! `ingest` — Transport bindings for LD2450 frames.
//!
//! - [`network`] — MQTT subscriber, hex payloads, drop-oldest dispatch queue
//! - [`serial`]  — UART reader with stream resynchronization
//! - [`link`]    — [`Transport`] trait, batch sink, counters

pub mod link;
pub mod network;
pub mod serial;

pub use link::{BatchSink, FrameTick, LinkError, LinkSink, LinkStats, Transport};
pub use network::{MqttConfig, MqttLink};
pub use serial::{SerialConfig, SerialLink};
