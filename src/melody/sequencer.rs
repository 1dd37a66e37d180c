//! Body interpreter: turns melody glyphs into timed note and rest events

use super::event::{Event, NoteEvent, Signal};
use super::note::{self, DurationModifier, Flavor};
use super::reader::Glyph;
use super::{Dialect, Mode, RepeatCount, Session, State};
use crate::error::{Error, Result};

impl Session {
    /// Advance by exactly one note or rest, or report [`Event::Done`].
    ///
    /// Malformed glyphs are logged and skipped. An invalid iMelody duration
    /// or a source failure moves the session to [`State::Error`].
    pub fn next_event(&mut self, mode: Mode) -> Result<Event> {
        match self.state {
            State::Ready => {
                tracing::debug!("playing {}", self.name());
                self.state = State::Playing;
            }
            State::Playing => {}
            State::Stopping | State::Stopped => {
                self.state = State::Stopped;
                return Ok(Event::Done);
            }
            State::Open => {
                return Err(Error::InvalidState(
                    "header has not been parsed".to_string(),
                ))
            }
            State::Error => {
                return Err(Error::InvalidState(
                    "session stopped after an error".to_string(),
                ))
            }
        }

        let Some(dialect) = self.dialect else {
            let err = Error::InvalidState("melody dialect is unknown".to_string());
            return Err(self.fail(err));
        };

        match self.step(dialect, mode) {
            Ok(Event::Done) => {
                tracing::debug!("end of melody, state set to stopping");
                self.state = State::Stopping;
                Ok(Event::Done)
            }
            Ok(event) => Ok(event),
            Err(err) => Err(self.fail(err)),
        }
    }

    fn step(&mut self, dialect: Dialect, mode: Mode) -> Result<Event> {
        if self.pending_rest != 0 {
            self.clock += self.pending_rest as i64;
            self.pending_rest = 0;
        }

        loop {
            let c = match self.reader.next_glyph()? {
                Glyph::Byte(c) => c,
                Glyph::EndOfBody => return Ok(Event::Done),
            };

            match c {
                b'+' => {
                    if dialect == Dialect::EMelody && self.octave_shift < 2 {
                        self.octave_shift += 1;
                    }
                }
                b'(' => self.open_repeat(dialect)?,
                b')' => self.close_repeat(mode)?,
                b'@' => self.repeat_count_directive()?,
                b'V' => self.volume_directive()?,
                b'&' => self.note_modifier = -1,
                b'#' => self.note_modifier = 1,
                b'*' => self.octave_directive(dialect)?,
                b'l' => self.switch_directive(b"edo", Signal::Led)?,
                b'v' => self.switch_directive(b"ibeo", Signal::Vibe)?,
                b'b' => {
                    if self.reader.next_glyph_if(|c| c == b'a')?.is_some() {
                        self.switch_directive(b"cko", Signal::Backlight)?;
                    } else {
                        return self.note_glyph(dialect, c, note::NOTE_OFFSETS[1]);
                    }
                }
                b'r' | b'R' => return self.play_rest(dialect),
                b'p' => {
                    self.flavor = Flavor::Short;
                    return self.play_rest(dialect);
                }
                b'P' => {
                    self.flavor = Flavor::Long;
                    return self.play_rest(dialect);
                }
                _ => match note::note_offset(c) {
                    Some(offset) => return self.note_glyph(dialect, c, offset),
                    None => tracing::warn!(
                        "ignoring unexpected character '{}' [0x{:02x}]",
                        c as char,
                        c
                    ),
                },
            }
        }
    }

    fn open_repeat(&mut self, dialect: Dialect) -> Result<()> {
        match dialect {
            Dialect::EMelody => {
                // eMelody "(b)" escape marks the next note sharp
                self.reader.next_glyph()?;
                self.reader.next_glyph()?;
                self.note_modifier = 1;
            }
            Dialect::IMelody => {
                if self.repeat_offset.is_none() {
                    let offset = self.reader.position();
                    tracing::debug!("repeat section starts at offset {}", offset);
                    self.repeat_offset = Some(offset);
                    self.repeat_mark = self.emitted;
                } else {
                    tracing::warn!("ignoring nested repeat section");
                }
            }
        }
        Ok(())
    }

    fn close_repeat(&mut self, mode: Mode) -> Result<()> {
        let Some(count) = self.repeat_count else {
            return Ok(());
        };

        if let RepeatCount::Remaining(n) = count {
            self.repeat_count = if n > 1 {
                Some(RepeatCount::Remaining(n - 1))
            } else {
                tracing::debug!("repeat loop complete");
                None
            };
        }

        if mode.loops_forever() || self.repeat_count != Some(RepeatCount::Infinite) {
            let Some(offset) = self.repeat_offset else {
                return Ok(());
            };
            if self.repeat_count == Some(RepeatCount::Infinite)
                && self.emitted == self.repeat_mark
            {
                tracing::warn!("infinite repeat section without notes or rests, not looping");
                self.repeat_count = None;
                self.repeat_offset = None;
                return Ok(());
            }
            tracing::debug!("rewinding to offset {} for repeat", offset);
            self.reader.rewind(offset)?;
            self.repeat_mark = self.emitted;
            if self.repeat_count.is_none() {
                self.repeat_offset = None;
            }
        }
        Ok(())
    }

    fn repeat_count_directive(&mut self) -> Result<()> {
        match self.reader.read_number()? {
            None => tracing::warn!("missing repeat count after '@'"),
            Some(n) => {
                if self.repeat_offset.is_some() && self.repeat_count.is_none() {
                    tracing::debug!("repeat count {}", n);
                    self.repeat_count = Some(match n {
                        0 => RepeatCount::Infinite,
                        n => RepeatCount::Remaining(n),
                    });
                }
            }
        }
        Ok(())
    }

    fn volume_directive(&mut self) -> Result<()> {
        match self.reader.peek_glyph()? {
            Glyph::Byte(b'+') => {
                self.reader.next_glyph()?;
                self.nudge_volume(true);
            }
            Glyph::Byte(b'-') => {
                self.reader.next_glyph()?;
                self.nudge_volume(false);
            }
            Glyph::Byte(c) if c.is_ascii_digit() => {
                self.reader.next_glyph()?;
                let mut value = (c - b'0') as u32;
                if let Some(d) = self.reader.next_glyph_if(|c| c.is_ascii_digit())? {
                    value = value * 10 + (d - b'0') as u32;
                }
                self.set_volume(value, false);
            }
            Glyph::Byte(c) => tracing::warn!("invalid volume directive 'V{}'", c as char),
            Glyph::EndOfBody => {}
        }
        Ok(())
    }

    fn octave_directive(&mut self, dialect: Dialect) -> Result<()> {
        match self.reader.next_glyph_if(|c| c.is_ascii_digit())? {
            Some(d) if dialect == Dialect::IMelody => {
                self.octave = (d - b'0' + 1) as i32 * 12;
            }
            Some(_) => tracing::debug!("ignoring octave prefix in eMelody"),
            None => tracing::warn!("missing octave digit after '*'"),
        }
        Ok(())
    }

    /// `<stem>on` / `<stem>off` directive after its first letter
    fn switch_directive(&mut self, stem: &[u8], signal: fn(bool) -> Signal) -> Result<()> {
        for &expected in stem {
            if self.reader.next_glyph_if(|c| c == expected)?.is_none() {
                tracing::warn!("malformed {:?} directive", signal(true));
                return Ok(());
            }
        }

        let on = if self.reader.next_glyph_if(|c| c == b'n')?.is_some() {
            true
        } else if self.reader.next_glyph_if(|c| c == b'f')?.is_some()
            && self.reader.next_glyph_if(|c| c == b'f')?.is_some()
        {
            false
        } else {
            tracing::warn!("malformed {:?} directive", signal(true));
            return Ok(());
        };

        tracing::debug!("{:?}", signal(on));
        self.signals.push(signal(on));
        Ok(())
    }

    /// Note duration in ticks; `None` if the body ends first
    fn read_duration(&mut self, dialect: Dialect) -> Result<Option<i32>> {
        match dialect {
            Dialect::EMelody => {
                let mut duration = self.flavor.duration(self.tick);
                if self.reader.next_glyph_if(|c| c == b'.')?.is_some() {
                    duration *= 2;
                }
                Ok(Some(duration))
            }
            Dialect::IMelody => {
                let offset = self.reader.position();
                let digit = match self.reader.next_glyph()? {
                    Glyph::EndOfBody => return Ok(None),
                    Glyph::Byte(c @ b'0'..=b'5') => c - b'0',
                    Glyph::Byte(c) => {
                        return Err(Error::InvalidDuration {
                            found: c as char,
                            offset,
                        })
                    }
                };

                let mut duration = note::base_duration(self.tick, digit);
                if let Glyph::Byte(c) = self.reader.peek_glyph()? {
                    if let Some(modifier) = DurationModifier::from_byte(c) {
                        self.reader.next_glyph()?;
                        duration = modifier.apply(duration);
                    }
                }
                Ok(Some(duration))
            }
        }
    }

    fn note_glyph(&mut self, dialect: Dialect, c: u8, offset: i32) -> Result<Event> {
        if dialect == Dialect::EMelody {
            self.flavor = if c.is_ascii_uppercase() {
                Flavor::Long
            } else {
                Flavor::Short
            };
        }
        self.play_note(dialect, offset)
    }

    fn play_note(&mut self, dialect: Dialect, offset: i32) -> Result<Event> {
        let Some(duration) = self.read_duration(dialect)? else {
            return Ok(Event::Done);
        };

        let pitch = dialect.pitch(self.octave, self.octave_shift, offset, self.note_modifier);
        let velocity = note::velocity(self.volume);
        let rest = note::rest_after(duration, self.style);
        let event = NoteEvent {
            time: self.clock,
            pitch,
            velocity,
            duration: duration - rest,
            rest,
        };

        tracing::debug!(
            "note {}, velocity {}, duration {} ticks, rest {}",
            pitch,
            velocity,
            duration,
            rest
        );

        self.clock += (duration - rest) as i64;
        self.pending_rest = rest;
        self.emitted += 1;
        self.note_modifier = 0;
        self.octave_shift = 0;
        Ok(Event::Note(event))
    }

    fn play_rest(&mut self, dialect: Dialect) -> Result<Event> {
        let Some(duration) = self.read_duration(dialect)? else {
            return Ok(Event::Done);
        };
        tracing::debug!("pause for {} ticks", duration);
        let time = self.clock;
        self.clock += duration as i64;
        self.emitted += 1;
        Ok(Event::Rest { time, duration })
    }
}

#[cfg(test)]
mod tests {
    use super::super::source::ByteSource;
    use super::super::Metadata;
    use super::*;

    fn events(session: &mut Session, mode: Mode) -> Vec<Event> {
        let mut out = Vec::new();
        loop {
            let event = session.next_event(mode).unwrap();
            if event.is_done() {
                return out;
            }
            out.push(event);
        }
    }

    fn notes(text: &str, dialect: Dialect) -> Vec<NoteEvent> {
        let mut s = Session::open_text(text, dialect);
        events(&mut s, Mode::Locate)
            .into_iter()
            .filter_map(|e| match e {
                Event::Note(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    fn pitches(text: &str, dialect: Dialect) -> Vec<u8> {
        notes(text, dialect).iter().map(|n| n.pitch).collect()
    }

    #[test]
    fn test_imelody_notes() {
        let n = notes("c4d4e4", Dialect::IMelody);
        assert_eq!(n.len(), 3);
        assert_eq!(n.iter().map(|n| n.pitch).collect::<Vec<_>>(), vec![60, 62, 64]);
        for (i, note) in n.iter().enumerate() {
            assert_eq!(note.duration, 32000);
            assert_eq!(note.rest, 0);
            assert_eq!(note.velocity, 56);
            assert_eq!(note.time, i as i64 * 32000);
        }
    }

    #[test]
    fn test_duration_modifiers() {
        let n = notes("c3.c3:c3;c0c5", Dialect::IMelody);
        let lengths: Vec<i32> = n.iter().map(|n| n.duration).collect();
        let d = 4 * 16000;
        assert_eq!(lengths, vec![d + d / 2, d + d / 2 + d / 4, d * 683 / 1024, 32 * 16000, 16000]);
    }

    #[test]
    fn test_modifiers_and_octave() {
        assert_eq!(pitches("#c4&e4c4", Dialect::IMelody), vec![61, 63, 60]);
        assert_eq!(pitches("*3c4*6a4", Dialect::IMelody), vec![48, 93]);
    }

    #[test]
    fn test_emelody_pitch_and_flavor() {
        let n = notes("c+d++e+++fC.", Dialect::EMelody);
        let pitches: Vec<u8> = n.iter().map(|n| n.pitch).collect();
        assert_eq!(pitches, vec![48, 62, 76, 77, 48]);
        assert_eq!(n[0].duration, 4 * 16000);
        assert_eq!(n[4].duration, 2 * 16 * 16000);
    }

    #[test]
    fn test_emelody_sharp_escape_and_octave_ignored() {
        assert_eq!(pitches("(b)c*3d", Dialect::EMelody), vec![49, 50]);
    }

    #[test]
    fn test_emelody_rests() {
        let mut s = Session::open_text("pP.", Dialect::EMelody);
        assert_eq!(
            s.next_event(Mode::Play).unwrap(),
            Event::Rest {
                time: 0,
                duration: 64000
            }
        );
        assert_eq!(
            s.next_event(Mode::Play).unwrap(),
            Event::Rest {
                time: 64000,
                duration: 512000
            }
        );
        assert!(s.next_event(Mode::Play).unwrap().is_done());
    }

    #[test]
    fn test_style_rest_is_applied_on_next_poll() {
        let mut s = Session::open_source(ByteSource::from_text(
            "BEGIN:IMELODY\nSTYLE:S2\nMELODY:c4r4\nEND:IMELODY\n",
        ));
        s.parse_header(&mut Metadata::default()).unwrap();
        let Event::Note(n) = s.next_event(Mode::Play).unwrap() else {
            panic!("expected a note");
        };
        assert_eq!((n.duration, n.rest), (16000, 16000));
        assert_eq!(s.clock(), 16000);
        assert_eq!(
            s.next_event(Mode::Play).unwrap(),
            Event::Rest {
                time: 32000,
                duration: 32000
            }
        );
        assert!(s.next_event(Mode::Play).unwrap().is_done());
        assert_eq!(s.clock(), 64000);
    }

    #[test]
    fn test_volume_directives() {
        let n = notes("V15c4V+c4V-c4V3c4V20c4Vxc4", Dialect::IMelody);
        let v: Vec<u8> = n.iter().map(|n| n.velocity).collect();
        assert_eq!(v, vec![120, 120, 112, 24, 24, 24]);
        let n = notes("V0c4V-c4", Dialect::IMelody);
        assert_eq!(n.iter().map(|n| n.velocity).collect::<Vec<_>>(), vec![0, 0]);
    }

    #[test]
    fn test_unknown_glyph_is_skipped() {
        let mut s = Session::open_text("%c4", Dialect::IMelody);
        let Event::Note(n) = s.next_event(Mode::Play).unwrap() else {
            panic!("expected a note");
        };
        assert_eq!((n.time, n.pitch), (0, 60));
    }

    #[test]
    fn test_repeat_with_count() {
        // first pass plus three rewinds
        assert_eq!(
            pitches("c4(d4@3)e4", Dialect::IMelody),
            vec![60, 62, 62, 62, 62, 64]
        );
    }

    #[test]
    fn test_repeat_without_count_does_not_loop() {
        assert_eq!(pitches("(c4d4)e4", Dialect::IMelody), vec![60, 62, 64]);
    }

    #[test]
    fn test_infinite_repeat_is_capped_when_scanning() {
        assert_eq!(pitches("(c4@0)d4", Dialect::IMelody), vec![60, 62]);
    }

    #[test]
    fn test_infinite_repeat_loops_in_play_mode() {
        let mut s = Session::open_text("(c4@0)d4", Dialect::IMelody);
        for _ in 0..50 {
            let Event::Note(n) = s.next_event(Mode::Play).unwrap() else {
                panic!("expected a note");
            };
            assert_eq!(n.pitch, 60);
        }
    }

    #[test]
    fn test_empty_infinite_repeat_does_not_hang() {
        let mut s = Session::open_text("(V+@0)c4", Dialect::IMelody);
        let Event::Note(n) = s.next_event(Mode::Play).unwrap() else {
            panic!("expected a note");
        };
        assert_eq!((n.pitch, n.velocity), (60, 64));
        assert!(s.next_event(Mode::Play).unwrap().is_done());

        let mut s = Session::open_text("c4(ledon@0)d4", Dialect::IMelody);
        let p: Vec<u8> = events(&mut s, Mode::Play)
            .into_iter()
            .filter_map(|e| match e {
                Event::Note(n) => Some(n.pitch),
                _ => None,
            })
            .collect();
        assert_eq!(p, vec![60, 62]);
        assert_eq!(s.take_signals(), vec![Signal::Led(true)]);
    }

    #[test]
    fn test_repeat_with_count_in_play_mode() {
        let mut s = Session::open_text("(c4@3)d4", Dialect::IMelody);
        let p: Vec<u8> = events(&mut s, Mode::Play)
            .into_iter()
            .filter_map(|e| match e {
                Event::Note(n) => Some(n.pitch),
                _ => None,
            })
            .collect();
        assert_eq!(p, vec![60, 60, 60, 60, 62]);
    }

    #[test]
    fn test_nested_repeat_is_ignored() {
        assert_eq!(
            pitches("(c4(d4@1)e4)f4", Dialect::IMelody),
            vec![60, 62, 60, 62, 62, 64, 65]
        );
    }

    #[test]
    fn test_sequential_repeats() {
        assert_eq!(
            pitches("(c4@1)(d4@1)", Dialect::IMelody),
            vec![60, 60, 62, 62]
        );
    }

    #[test]
    fn test_repeat_across_lines() {
        let mut s = Session::open_source(ByteSource::from_text(
            "BEGIN:IMELODY\nMELODY:(c4\nd4@2)e4\nEND:IMELODY\n",
        ));
        s.parse_header(&mut Metadata::default()).unwrap();
        let p: Vec<u8> = events(&mut s, Mode::Locate)
            .into_iter()
            .filter_map(|e| match e {
                Event::Note(n) => Some(n.pitch),
                _ => None,
            })
            .collect();
        assert_eq!(p, vec![60, 62, 60, 62, 60, 62, 64]);
    }

    #[test]
    fn test_signals() {
        let mut s = Session::open_text("ledonvibeoffbackonb4ledx", Dialect::IMelody);
        let Event::Note(n) = s.next_event(Mode::Play).unwrap() else {
            panic!("expected a note");
        };
        assert_eq!(n.pitch, 71);
        assert_eq!(
            s.take_signals(),
            vec![Signal::Led(true), Signal::Vibe(false), Signal::Backlight(true)]
        );
        assert!(s.next_event(Mode::Play).unwrap().is_done());
        assert!(s.take_signals().is_empty());
    }

    #[test]
    fn test_invalid_duration_is_an_error() {
        let mut s = Session::open_text("c4d9", Dialect::IMelody);
        assert!(matches!(s.next_event(Mode::Play), Ok(Event::Note(_))));
        assert!(matches!(
            s.next_event(Mode::Play),
            Err(Error::InvalidDuration { found: '9', offset: 3 })
        ));
        assert_eq!(s.state(), State::Error);
        assert!(matches!(
            s.next_event(Mode::Play),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_note_cut_off_by_end_of_body() {
        let mut s = Session::open_text("c4d", Dialect::IMelody);
        assert!(matches!(s.next_event(Mode::Play), Ok(Event::Note(_))));
        assert!(s.next_event(Mode::Play).unwrap().is_done());
        assert_eq!(s.state(), State::Stopping);
        assert_eq!(s.poll_state(), State::Stopped);
        assert!(s.next_event(Mode::Play).unwrap().is_done());
    }

    #[test]
    fn test_polling_before_header_is_rejected() {
        let mut s = Session::open_source(ByteSource::from_text("BEGIN:IMELODY\nMELODY:c4\n"));
        assert!(matches!(
            s.next_event(Mode::Play),
            Err(Error::InvalidState(_))
        ));
    }
}
