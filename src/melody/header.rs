//! Header parsing: everything up to and including `MELODY:`

use super::note;
use super::token::{match_token, Token};
use super::{Session, State};
use crate::error::{Error, Result};
use serde::Serialize;

/// Kind of descriptive header field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MetadataKind {
    Title,
    Author,
}

/// Receiver for NAME: / COMPOSER: fields
pub trait MetadataSink {
    fn record(&mut self, kind: MetadataKind, text: &str);
}

/// Collected melody metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

impl MetadataSink for Metadata {
    fn record(&mut self, kind: MetadataKind, text: &str) {
        let slot = match kind {
            MetadataKind::Title => &mut self.title,
            MetadataKind::Author => &mut self.author,
        };
        *slot = Some(text.to_string());
    }
}

/// Pack a dotted `major.minor` field as `major << 8 | minor`.
///
/// Characters other than digits and dots are skipped.
pub fn parse_version(field: &[u8]) -> u32 {
    let mut version = 0u32;
    let mut part = 0u32;
    for &c in field {
        match c {
            b'.' => {
                version = (version << 8).wrapping_add(part);
                part = 0;
            }
            b'0'..=b'9' => part = part.saturating_mul(10).saturating_add((c - b'0') as u32),
            _ => {}
        }
    }
    (version << 8).wrapping_add(part)
}

impl Session {
    /// Read header fields until `MELODY:`, leaving the cursor at the body.
    ///
    /// On failure the session moves to [`State::Error`] and never plays.
    pub fn parse_header(&mut self, sink: &mut dyn MetadataSink) -> Result<()> {
        if self.state != State::Open {
            return Err(Error::InvalidState(format!(
                "cannot parse header in state {:?}",
                self.state
            )));
        }
        if self.dialect.is_none() {
            let err = Error::FileFormat {
                offset: 0,
                message: "missing BEGIN:IMELODY or BEGIN:EMELODY line".to_string(),
            };
            return Err(self.fail(err));
        }

        match self.read_header(sink) {
            Ok(()) => {
                self.state = State::Ready;
                tracing::info!(
                    "header parsed: tick {}, style {}, volume {}",
                    self.tick,
                    self.style,
                    self.volume
                );
                Ok(())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    fn read_header(&mut self, sink: &mut dyn MetadataSink) -> Result<()> {
        loop {
            match self.reader.load_line() {
                Ok(()) => {}
                Err(Error::EndOfInput) => {
                    return Err(Error::Truncated(
                        "no MELODY: line before end of input".to_string(),
                    ))
                }
                Err(e) => return Err(e),
            }

            let offset = self.reader.position();
            let Some((token, end)) = match_token(self.reader.line()) else {
                tracing::warn!(
                    "ignoring unrecognized header line: {}",
                    String::from_utf8_lossy(self.reader.line())
                );
                continue;
            };
            self.reader.set_cursor(end);
            tracing::debug!("header token {:?}", token);

            match token {
                Token::BeginIMelody | Token::BeginEMelody => {}
                Token::Format => self.check_version("FORMAT", &[0x0100, 0x0200])?,
                Token::Version => self.check_version("VERSION", &[0x0100, 0x0102])?,
                Token::Name => sink.record(MetadataKind::Title, &self.field_text()),
                Token::Composer => sink.record(MetadataKind::Author, &self.field_text()),
                Token::Beat => {
                    let beat = self.header_number();
                    match note::tick_for_beat(beat) {
                        Some(tick) => self.tick = tick,
                        None => tracing::warn!("ignoring out-of-range BEAT {}", beat),
                    }
                }
                Token::Style => self.header_style(),
                Token::Volume => self.header_volume(),
                Token::Melody => return Ok(()),
                Token::EndIMelody | Token::EndEMelody => {
                    return Err(Error::FileFormat {
                        offset,
                        message: format!("unexpected {} before MELODY:", token.keyword()),
                    })
                }
            }
        }
    }

    fn check_version(&self, field: &'static str, supported: &[u32]) -> Result<()> {
        let version = parse_version(self.reader.rest_of_line());
        tracing::debug!("{} 0x{:04x}", field, version);
        if supported.contains(&version) {
            Ok(())
        } else {
            Err(Error::UnrecognizedFormat { field, version })
        }
    }

    fn field_text(&self) -> String {
        String::from_utf8_lossy(self.reader.rest_of_line())
            .trim()
            .to_string()
    }

    /// Decimal number on the current line; 0 when absent
    fn header_number(&mut self) -> u32 {
        let mut value = 0u32;
        while let Some(c) = self.reader.peek_in_line().filter(u8::is_ascii_digit) {
            self.reader.next_in_line();
            value = value.saturating_mul(10).saturating_add((c - b'0') as u32);
        }
        value
    }

    fn header_style(&mut self) {
        let mut c = self.reader.next_in_line();
        if c == Some(b'S') {
            c = self.reader.next_in_line();
        }
        match c {
            Some(d @ b'0'..=b'2') => self.style = d - b'0',
            _ => tracing::warn!(
                "error in style field: {}",
                String::from_utf8_lossy(self.reader.line())
            ),
        }
    }

    fn header_volume(&mut self) {
        match self.reader.peek_in_line() {
            Some(b'V') => {
                self.reader.next_in_line();
            }
            Some(c) if c.is_ascii_digit() => {}
            _ => {
                tracing::warn!(
                    "error in volume field: {}",
                    String::from_utf8_lossy(self.reader.line())
                );
                return;
            }
        }

        match self.reader.next_in_line() {
            Some(b'+') => self.nudge_volume(true),
            Some(b'-') => self.nudge_volume(false),
            Some(c) if c.is_ascii_digit() => {
                let mut value = (c - b'0') as u32;
                if let Some(d) = self.reader.peek_in_line().filter(u8::is_ascii_digit) {
                    self.reader.next_in_line();
                    value = value * 10 + (d - b'0') as u32;
                }
                self.set_volume(value, true);
            }
            _ => tracing::warn!(
                "error in volume field: {}",
                String::from_utf8_lossy(self.reader.line())
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::source::ByteSource;
    use super::super::Dialect;
    use super::*;

    fn open(text: &str) -> Session {
        Session::open_source(ByteSource::from_text(text))
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version(b"1.0"), 0x0100);
        assert_eq!(parse_version(b"1.2"), 0x0102);
        assert_eq!(parse_version(b" 2.0"), 0x0200);
        assert_eq!(parse_version(b"1"), 0x0001);
    }

    #[test]
    fn test_header_fields() {
        let mut s = open(
            "BEGIN:IMELODY\nVERSION:1.2\nFORMAT:CLASS1.0\nNAME: Tune \nCOMPOSER:Someone\n\
             BEAT:120\nSTYLE:S1\nVOLUME:V9\nMELODY:c4\nEND:IMELODY\n",
        );
        let mut meta = Metadata::default();
        s.parse_header(&mut meta).unwrap();
        assert_eq!((s.tick(), s.style(), s.volume()), (16000, 1, 9));
        assert_eq!(s.state(), State::Ready);
        assert_eq!(meta.title.as_deref(), Some("Tune"));
        assert_eq!(meta.author.as_deref(), Some("Someone"));
    }

    #[test]
    fn test_beat_out_of_range_keeps_default() {
        let mut s = open("BEGIN:IMELODY\nBEAT:901\nMELODY:c4\n");
        s.parse_header(&mut Metadata::default()).unwrap();
        assert_eq!(s.tick(), note::DEFAULT_TICK);

        let mut s = open("BEGIN:IMELODY\nBEAT:24\nMELODY:c4\n");
        s.parse_header(&mut Metadata::default()).unwrap();
        assert_eq!(s.tick(), note::DEFAULT_TICK);
    }

    #[test]
    fn test_style_and_volume_variants() {
        let mut s = open("BEGIN:EMELODY\nSTYLE:2\nVOLUME:12\nMELODY:c\n");
        s.parse_header(&mut Metadata::default()).unwrap();
        assert_eq!(s.dialect(), Some(Dialect::EMelody));
        assert_eq!((s.style(), s.volume()), (2, 12));

        let mut s = open("BEGIN:IMELODY\nSTYLE:S7\nVOLUME:V0\nMELODY:c4\n");
        s.parse_header(&mut Metadata::default()).unwrap();
        assert_eq!((s.style(), s.volume()), (1, 7));

        let mut s = open("BEGIN:IMELODY\nVOLUME:loud\nVOLUME:V+\nMELODY:c4\n");
        s.parse_header(&mut Metadata::default()).unwrap();
        assert_eq!(s.volume(), 8);
    }

    #[test]
    fn test_accepted_versions() {
        for header in [
            "BEGIN:IMELODY\nVERSION:1.0\nFORMAT:CLASS2.0\nMELODY:c4\n",
            "BEGIN:IMELODY\nVERSION:1.2\nFORMAT:CLASS1.0\nMELODY:c4\n",
        ] {
            let mut s = open(header);
            s.parse_header(&mut Metadata::default()).unwrap();
            assert_eq!(s.state(), State::Ready);
        }
    }

    #[test]
    fn test_unsupported_version() {
        let mut s = open("BEGIN:IMELODY\nVERSION:2.0\nMELODY:c4\n");
        let err = s.parse_header(&mut Metadata::default()).unwrap_err();
        assert!(matches!(
            err,
            Error::UnrecognizedFormat {
                field: "VERSION",
                version: 0x0200
            }
        ));
        assert_eq!(s.state(), State::Error);

        let mut s = open("BEGIN:IMELODY\nFORMAT:CLASS1.2\nMELODY:c4\n");
        assert!(matches!(
            s.parse_header(&mut Metadata::default()),
            Err(Error::UnrecognizedFormat { field: "FORMAT", .. })
        ));
    }

    #[test]
    fn test_premature_end() {
        let mut s = open("BEGIN:IMELODY\nBEAT:100\nEND:IMELODY\n");
        assert!(matches!(
            s.parse_header(&mut Metadata::default()),
            Err(Error::FileFormat { offset: 23, .. })
        ));
    }

    #[test]
    fn test_missing_melody_line() {
        let mut s = open("BEGIN:IMELODY\nBEAT:100\n");
        assert!(matches!(
            s.parse_header(&mut Metadata::default()),
            Err(Error::Truncated(_))
        ));
    }

    #[test]
    fn test_missing_begin_line() {
        let mut s = open("MELODY:c4\n");
        assert!(matches!(
            s.parse_header(&mut Metadata::default()),
            Err(Error::FileFormat { offset: 0, .. })
        ));
        assert_eq!(s.state(), State::Error);
    }

    #[test]
    fn test_unrecognized_lines_are_skipped() {
        let mut s = open("BEGIN:IMELODY\nX-EXTRA:1\n\nBEAT:200\nMELODY:c4\n");
        s.parse_header(&mut Metadata::default()).unwrap();
        assert_eq!(s.tick(), 9600);
    }

    #[test]
    fn test_header_twice_is_rejected() {
        let mut s = open("BEGIN:IMELODY\nMELODY:c4\n");
        s.parse_header(&mut Metadata::default()).unwrap();
        assert!(matches!(
            s.parse_header(&mut Metadata::default()),
            Err(Error::InvalidState(_))
        ));
    }
}
