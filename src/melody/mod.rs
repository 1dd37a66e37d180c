//! iMelody / eMelody interpreter
//!
//! A [`Session`] owns the melody source and all parse state. The lifecycle
//! is open -> [`Session::parse_header`] -> [`Session::next_event`] until
//! [`Event::Done`] -> [`Session::close`]. Inline strings skip the header.

pub mod event;
pub mod header;
pub mod note;
pub mod reader;
pub mod sequencer;
pub mod source;
pub mod token;

pub use event::{Event, NoteEvent, Signal};
pub use header::{Metadata, MetadataKind, MetadataSink};

use crate::error::{Error, Result};
use note::Flavor;
use reader::BodyReader;
use serde::Serialize;
use source::ByteSource;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use token::{match_token, Token};

/// Melody text format, fixed for the lifetime of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    IMelody,
    EMelody,
}

impl Dialect {
    /// Note number for a letter offset under the current octave state
    pub fn pitch(self, octave: i32, octave_shift: u8, offset: i32, modifier: i32) -> u8 {
        let pitch = match self {
            Dialect::IMelody => octave + offset + modifier,
            Dialect::EMelody => {
                note::EMELODY_BASE_PITCH + octave_shift as i32 * 12 + offset + modifier
            }
        };
        pitch.clamp(0, u8::MAX as i32) as u8
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::IMelody => write!(f, "iMelody"),
            Dialect::EMelody => write!(f, "eMelody"),
        }
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "i" | "imelody" | "imy" => Ok(Dialect::IMelody),
            "e" | "emelody" | "emy" => Ok(Dialect::EMelody),
            _ => Err(format!("unknown melody dialect '{}'", s)),
        }
    }
}

/// How `next_event` treats repeat sections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Real playback: `@0` sections loop forever
    Play,
    /// Seeking through the melody
    Locate,
    /// Metadata extraction
    Metadata,
}

impl Mode {
    pub fn loops_forever(self) -> bool {
        self == Mode::Play
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "play" => Ok(Mode::Play),
            "locate" => Ok(Mode::Locate),
            "metadata" => Ok(Mode::Metadata),
            _ => Err(format!("unknown parser mode '{}'", s)),
        }
    }
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// File opened, header not parsed yet
    Open,
    Ready,
    Playing,
    Stopping,
    Stopped,
    Error,
}

/// Iterations left in the open repeat section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatCount {
    /// `@0`
    Infinite,
    Remaining(u32),
}

/// Parse and playback context for one melody
#[derive(Debug)]
pub struct Session {
    reader: BodyReader,
    dialect: Option<Dialect>,
    state: State,
    /// Length of a 32nd note in 256ths of a millisecond
    tick: i32,
    /// iMelody octave prefix (`*n`)
    octave: i32,
    /// eMelody per-note octave boost (`+`), 0..=2
    octave_shift: u8,
    /// eMelody duration class of the current note
    flavor: Flavor,
    style: u8,
    volume: u8,
    /// -1 flat, +1 sharp
    note_modifier: i32,
    repeat_offset: Option<usize>,
    /// `None` when no count is set or the section is finished
    repeat_count: Option<RepeatCount>,
    /// Value of `emitted` when the current repeat pass started
    repeat_mark: u64,
    /// Notes and rests produced so far
    emitted: u64,
    /// Elapsed time in 256ths of a millisecond
    clock: i64,
    /// Silence owed after the last note
    pending_rest: i32,
    signals: Vec<Signal>,
}

impl Session {
    fn new(reader: BodyReader, dialect: Option<Dialect>, state: State) -> Self {
        Self {
            reader,
            dialect,
            state,
            tick: note::DEFAULT_TICK,
            octave: note::DEFAULT_OCTAVE,
            octave_shift: 0,
            flavor: Flavor::Short,
            style: 1,
            volume: note::DEFAULT_VOLUME,
            note_modifier: 0,
            repeat_offset: None,
            repeat_count: None,
            repeat_mark: 0,
            emitted: 0,
            clock: 0,
            pending_rest: 0,
            signals: Vec::new(),
        }
    }

    /// Load a melody file and detect its dialect from the first line
    pub fn open_file(path: &Path) -> Result<Self> {
        let source = ByteSource::from_file(path)?;
        tracing::info!("opened melody file {} ({} bytes)", path.display(), source.len());
        Ok(Self::open_source(source))
    }

    /// Detect the dialect from the first line of `source`.
    ///
    /// Without a BEGIN line the session has no dialect and the header
    /// cannot be parsed; callers check [`Session::dialect`].
    pub fn open_source(source: ByteSource) -> Self {
        let mut reader = BodyReader::new(source);
        let dialect = match reader.load_line() {
            Ok(()) => match match_token(reader.line()) {
                Some((Token::BeginIMelody, _)) => Some(Dialect::IMelody),
                Some((Token::BeginEMelody, _)) => Some(Dialect::EMelody),
                _ => None,
            },
            Err(_) => None,
        };
        match dialect {
            Some(d) => tracing::debug!("detected {} source '{}'", d, reader.source().name()),
            None => tracing::warn!(
                "'{}' does not start with BEGIN:IMELODY or BEGIN:EMELODY",
                reader.source().name()
            ),
        }
        Self::new(reader, dialect, State::Open)
    }

    /// Bare melody body with a caller-supplied dialect, ready to play
    pub fn open_text(text: &str, dialect: Dialect) -> Self {
        tracing::debug!("preparing {} string [{}]", dialect, text);
        let reader = BodyReader::new(ByteSource::from_text(text));
        Self::new(reader, Some(dialect), State::Ready)
    }

    pub fn name(&self) -> &str {
        self.reader.source().name()
    }

    pub fn dialect(&self) -> Option<Dialect> {
        self.dialect
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Current state, settling `Stopping` into `Stopped`
    pub fn poll_state(&mut self) -> State {
        if self.state == State::Stopping {
            self.state = State::Stopped;
            tracing::debug!("state set to stopped");
        }
        self.state
    }

    pub fn tick(&self) -> i32 {
        self.tick
    }

    pub fn style(&self) -> u8 {
        self.style
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn octave(&self) -> i32 {
        self.octave
    }

    /// Elapsed time in 256ths of a millisecond
    pub fn clock(&self) -> i64 {
        self.clock
    }

    /// Drain LED / vibration / backlight directives seen so far
    pub fn take_signals(&mut self) -> Vec<Signal> {
        std::mem::take(&mut self.signals)
    }

    /// Release the source
    pub fn close(self) -> ByteSource {
        tracing::debug!("closing melody '{}'", self.name());
        self.reader.into_source()
    }

    /// Absolute volume from a `V`/`VOLUME:` field; out-of-range values are ignored
    fn set_volume(&mut self, value: u32, in_header: bool) {
        if value > note::MAX_VOLUME as u32 {
            tracing::warn!("ignoring out-of-range volume {}", value);
        } else if in_header && value == 0 {
            tracing::warn!("ignoring V0 encountered in header");
        } else {
            self.volume = value as u8;
        }
    }

    fn nudge_volume(&mut self, up: bool) {
        if up {
            self.volume = (self.volume + 1).min(note::MAX_VOLUME);
        } else {
            self.volume = self.volume.saturating_sub(1);
        }
    }

    fn fail(&mut self, err: Error) -> Error {
        self.state = State::Error;
        err
    }
}
