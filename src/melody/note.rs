//! Tempo, duration and pitch arithmetic
//!
//! All durations are in 256ths of a millisecond ("ticks" are the length of
//! a 32nd note in those units).

/// Length of a 32nd note at the default tempo of 120 BPM
pub const DEFAULT_TICK: i32 = 16000;

/// `tick = TICK_CONVERT / beats_per_minute`
pub const TICK_CONVERT: i32 = 1_920_000;

/// Accepted BEAT: range
pub const MIN_BEAT: u32 = 25;
pub const MAX_BEAT: u32 = 900;

/// Fixed-point approximation of 2/3 for triplets
pub const TRIPLET_MULTIPLIER: i32 = 683;
pub const TRIPLET_SHIFT: u32 = 10;

/// Default iMelody octave prefix (middle C)
pub const DEFAULT_OCTAVE: i32 = 60;

/// Base pitch of eMelody notes before octave shifts
pub const EMELODY_BASE_PITCH: i32 = 48;

pub const DEFAULT_VOLUME: u8 = 7;
pub const MAX_VOLUME: u8 = 15;

/// Velocity per volume step
pub const VELOCITY_MULTIPLIER: u8 = 8;

/// Semitone offsets from C for the letters a..g
pub const NOTE_OFFSETS: [i32; 7] = [9, 11, 0, 2, 4, 5, 7];

/// Tick length for a BEAT: value, `None` if out of range
pub fn tick_for_beat(beats_per_minute: u32) -> Option<i32> {
    (MIN_BEAT..=MAX_BEAT)
        .contains(&beats_per_minute)
        .then(|| TICK_CONVERT / beats_per_minute as i32)
}

/// Semitone offset for a note letter (either case)
pub fn note_offset(letter: u8) -> Option<i32> {
    match letter.to_ascii_lowercase() {
        c @ b'a'..=b'g' => Some(NOTE_OFFSETS[(c - b'a') as usize]),
        _ => None,
    }
}

/// Length of a note of duration class `digit` (0 = whole .. 5 = 32nd)
pub fn base_duration(tick: i32, digit: u8) -> i32 {
    tick * (1 << (5 - digit.min(5) as i32))
}

/// iMelody duration modifier following the duration digit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationModifier {
    /// `.`: x1.5
    Dotted,
    /// `:`: x1.75
    DoubleDotted,
    /// `;`: x2/3
    Triplet,
}

impl DurationModifier {
    pub fn from_byte(c: u8) -> Option<Self> {
        match c {
            b'.' => Some(DurationModifier::Dotted),
            b':' => Some(DurationModifier::DoubleDotted),
            b';' => Some(DurationModifier::Triplet),
            _ => None,
        }
    }

    pub fn apply(self, duration: i32) -> i32 {
        match self {
            DurationModifier::Dotted => duration + (duration >> 1),
            DurationModifier::DoubleDotted => duration + (duration >> 1) + (duration >> 2),
            DurationModifier::Triplet => (duration * TRIPLET_MULTIPLIER) >> TRIPLET_SHIFT,
        }
    }
}

/// eMelody duration flavor, selected by note letter case or `p`/`P`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    /// Uppercase notes and `P`: duration class 1
    Long,
    /// Lowercase notes and `p`: duration class 3
    Short,
}

impl Flavor {
    pub fn digit(self) -> u8 {
        match self {
            Flavor::Long => 1,
            Flavor::Short => 3,
        }
    }

    pub fn duration(self, tick: i32) -> i32 {
        base_duration(tick, self.digit())
    }
}

/// Silent tail appended after a note of `duration` ticks for `style`
pub fn rest_after(duration: i32, style: u8) -> i32 {
    match style {
        0 => duration >> 4,
        1 => 0,
        2 => duration >> 1,
        _ => {
            tracing::warn!("note style out of range: {}", style);
            duration >> 4
        }
    }
}

/// Note-on velocity for a volume level
pub fn velocity(volume: u8) -> u8 {
    volume.min(MAX_VOLUME) * VELOCITY_MULTIPLIER
}

/// Convert ticks (256ths of a millisecond) to microseconds
pub fn ticks_to_micros(ticks: i64) -> u64 {
    (ticks.max(0) as u64 * 1000) / 256
}
