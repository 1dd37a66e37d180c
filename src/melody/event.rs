//! Timed events produced by the sequencer

use serde::Serialize;

/// A note started by the sequencer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NoteEvent {
    /// Start time in 256ths of a millisecond
    pub time: i64,
    /// MIDI-style note number
    pub pitch: u8,
    pub velocity: u8,
    /// Sounding length in 256ths of a millisecond
    pub duration: i32,
    /// Silence held after the note, in 256ths of a millisecond
    pub rest: i32,
}

impl NoteEvent {
    /// Nominal note length (sounding part plus trailing rest)
    pub fn length(&self) -> i32 {
        self.duration + self.rest
    }
}

/// Result of one sequencer step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Event {
    Note(NoteEvent),
    Rest { time: i64, duration: i32 },
    /// Body exhausted
    Done,
}

impl Event {
    pub fn is_done(&self) -> bool {
        matches!(self, Event::Done)
    }
}

/// Non-audible body directives forwarded to the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "signal", content = "on", rename_all = "lowercase")]
pub enum Signal {
    /// `ledon` / `ledoff`
    Led(bool),
    /// `vibeon` / `vibeoff`
    Vibe(bool),
    /// `backon` / `backoff`
    Backlight(bool),
}
