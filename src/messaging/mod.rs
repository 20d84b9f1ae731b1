//! Message types between the UI, the audio callback and the watchdog.

/// Control events sent from the UI to the engine.
///
/// Commands travel over a single channel and are drained by the audio
/// callback immediately before each `produce` call, so the engine only ever
/// has one logical writer and control state is never read torn.
#[derive(Debug, Clone)]
pub enum EngineCommand {
    /// Press a key by note name (`"C"` .. `"B"`, `"C'"`).
    NoteOn(String),
    /// Release the sounding key.
    NoteOff,
    /// Transpose future note-ons by `2^(octave - 3)`.
    SetOctave(i32),
}

/// Fault signals raised toward the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineAlert {
    /// The sink ran dry but the pipeline is alive; recoverable.
    Underrun,
    /// Nothing pulled from the engine for a full watchdog period; monitoring
    /// is suspended until the audio host is restarted.
    Stall,
}
