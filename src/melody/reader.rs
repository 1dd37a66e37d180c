//! Character-level access to the current melody record

use super::source::{read_line, ByteSource};
use super::token::match_token;
use crate::error::{Error, Result};

/// One logical character of the melody body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Glyph {
    Byte(u8),
    /// End of input or an END:IMELODY / END:EMELODY line
    EndOfBody,
}

/// Line buffer plus cursor over a `ByteSource`.
///
/// Whitespace is never returned. Body reads refill the buffer from the
/// source on exhaustion; in-line reads (used for header fields) stop at the
/// end of the current record.
#[derive(Debug)]
pub struct BodyReader {
    source: ByteSource,
    line: Vec<u8>,
    /// Absolute offset of `line[0]`
    line_start: usize,
    cursor: usize,
    finished: bool,
}

impl BodyReader {
    pub fn new(source: ByteSource) -> Self {
        let line_start = source.position();
        Self {
            source,
            line: Vec::new(),
            line_start,
            cursor: 0,
            finished: false,
        }
    }

    pub fn source(&self) -> &ByteSource {
        &self.source
    }

    pub fn into_source(self) -> ByteSource {
        self.source
    }

    /// Replace the buffer with the next record from the source
    pub fn load_line(&mut self) -> Result<()> {
        let line = read_line(&mut self.source)?;
        self.line = line.bytes;
        self.line_start = line.start;
        self.cursor = 0;
        Ok(())
    }

    pub fn line(&self) -> &[u8] {
        &self.line
    }

    /// Unread remainder of the current record, whitespace included
    pub fn rest_of_line(&self) -> &[u8] {
        &self.line[self.cursor.min(self.line.len())..]
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn set_cursor(&mut self, cursor: usize) {
        self.cursor = cursor.min(self.line.len());
    }

    /// Absolute source offset of the cursor
    pub fn position(&self) -> usize {
        self.line_start + self.cursor
    }

    pub fn peek_in_line(&mut self) -> Option<u8> {
        while self
            .line
            .get(self.cursor)
            .is_some_and(|c| c.is_ascii_whitespace())
        {
            self.cursor += 1;
        }
        self.line.get(self.cursor).copied()
    }

    pub fn next_in_line(&mut self) -> Option<u8> {
        let c = self.peek_in_line()?;
        self.cursor += 1;
        Some(c)
    }

    /// Look at the next body glyph without consuming it
    pub fn peek_glyph(&mut self) -> Result<Glyph> {
        loop {
            if self.finished {
                return Ok(Glyph::EndOfBody);
            }
            if let Some(c) = self.peek_in_line() {
                return Ok(Glyph::Byte(c));
            }

            match read_line(&mut self.source) {
                Ok(line) => {
                    if match_token(&line.bytes).is_some_and(|(token, _)| token.is_end()) {
                        tracing::debug!("end of melody body at offset {}", line.start);
                        self.finish();
                        continue;
                    }
                    self.line = line.bytes;
                    self.line_start = line.start;
                    self.cursor = 0;
                }
                Err(Error::EndOfInput) => self.finish(),
                Err(e) => return Err(e),
            }
        }
    }

    pub fn next_glyph(&mut self) -> Result<Glyph> {
        let glyph = self.peek_glyph()?;
        if let Glyph::Byte(_) = glyph {
            self.cursor += 1;
        }
        Ok(glyph)
    }

    /// Consume the next glyph only if it satisfies `pred`
    pub fn next_glyph_if(&mut self, pred: impl Fn(u8) -> bool) -> Result<Option<u8>> {
        match self.peek_glyph()? {
            Glyph::Byte(c) if pred(c) => {
                self.cursor += 1;
                Ok(Some(c))
            }
            _ => Ok(None),
        }
    }

    /// Consume a run of decimal digits; `None` if there is none
    pub fn read_number(&mut self) -> Result<Option<u32>> {
        let mut value: Option<u32> = None;
        while let Some(c) = self.next_glyph_if(|c| c.is_ascii_digit())? {
            let digit = (c - b'0') as u32;
            value = Some(value.unwrap_or(0).saturating_mul(10).saturating_add(digit));
        }
        Ok(value)
    }

    /// Seek to `offset` and make the record starting there current
    pub fn rewind(&mut self, offset: usize) -> Result<()> {
        self.source.seek(offset)?;
        match read_line(&mut self.source) {
            Ok(line) => {
                self.line = line.bytes;
                self.line_start = line.start;
            }
            Err(Error::EndOfInput) => {
                self.line.clear();
                self.line_start = offset;
            }
            Err(e) => return Err(e),
        }
        self.cursor = 0;
        self.finished = false;
        Ok(())
    }

    fn finish(&mut self) {
        self.finished = true;
        self.line.clear();
        self.cursor = 0;
    }
}
