pub mod engine;
pub mod envelope;
pub mod oscillator;
pub mod pitch;
pub mod watchdog;

pub use engine::{EngineError, EngineTelemetry, ToneEngine};
