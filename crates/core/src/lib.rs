//! Shared building blocks for the journey trigger workspace: layered
//! configuration and the journey lifecycle event bus.

pub mod config;
pub mod event_bus;

pub use config::AppConfig;
pub use event_bus::{JourneyEvent, JourneyEventKind, JourneyEventSink};
