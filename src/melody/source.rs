//! Byte-addressable melody source and the line reader on top of it

use crate::error::{Error, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Maximum record length of a melody line (iMelody v1.2 limit)
pub const MAX_LINE_SIZE: usize = 75;

/// In-memory melody source with a read position
#[derive(Debug)]
pub struct ByteSource {
    /// Display name (file path or "string")
    name: String,
    data: Vec<u8>,
    pos: usize,
}

impl ByteSource {
    /// Load the whole file into memory
    pub fn from_file(path: &Path) -> Result<Self> {
        let name = path.display().to_string();
        let unavailable = |source| Error::SourceUnavailable {
            name: name.clone(),
            source,
        };

        let mut file = File::open(path).map_err(unavailable)?;
        let len = file.metadata().map_err(unavailable)?.len();
        if len > i32::MAX as u64 {
            return Err(Error::FileTooLarge { name, len });
        }

        let mut data = Vec::new();
        if data.try_reserve_exact(len as usize).is_err() {
            return Err(Error::OutOfMemory { name });
        }
        file.read_to_end(&mut data).map_err(unavailable)?;

        Ok(Self { name, data, pos: 0 })
    }

    /// Wrap an inline melody string
    pub fn from_text(text: &str) -> Self {
        Self {
            name: "string".to_string(),
            data: text.as_bytes().to_vec(),
            pos: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current absolute read offset
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_eof(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Read one byte, `None` at end of data
    pub fn read_byte(&mut self) -> Option<u8> {
        let b = self.data.get(self.pos).copied()?;
        self.pos += 1;
        Some(b)
    }

    /// Reposition to an absolute offset inside the data
    pub fn seek(&mut self, offset: usize) -> Result<()> {
        if offset >= self.data.len() {
            return Err(Error::OutOfRange {
                offset,
                len: self.data.len(),
            });
        }
        self.pos = offset;
        Ok(())
    }
}

/// One record read from a source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Line {
    /// Record payload without CR/LF, at most `MAX_LINE_SIZE` bytes
    pub bytes: Vec<u8>,
    /// Absolute offset of the first byte of the record
    pub start: usize,
}

/// Read the next LF-terminated record.
///
/// CR bytes are dropped. A record stops after `MAX_LINE_SIZE` payload bytes;
/// whatever follows on the same physical line becomes the next record.
pub fn read_line(source: &mut ByteSource) -> Result<Line> {
    let start = source.position();
    let mut bytes = Vec::with_capacity(MAX_LINE_SIZE);

    while bytes.len() < MAX_LINE_SIZE {
        match source.read_byte() {
            None if bytes.is_empty() => return Err(Error::EndOfInput),
            None => break,
            Some(b'\n') => break,
            Some(b'\r') => {}
            Some(b) => bytes.push(b),
        }
    }

    Ok(Line { bytes, start })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_lines_strips_cr() {
        let mut src = ByteSource::from_text("BEGIN:IMELODY\r\nMELODY:c4\r\n");
        let first = read_line(&mut src).unwrap();
        assert_eq!(first.bytes, b"BEGIN:IMELODY");
        assert_eq!(first.start, 0);

        let second = read_line(&mut src).unwrap();
        assert_eq!(second.bytes, b"MELODY:c4");
        assert_eq!(second.start, 15);

        assert!(matches!(read_line(&mut src), Err(Error::EndOfInput)));
    }

    #[test]
    fn test_last_line_without_newline() {
        let mut src = ByteSource::from_text("a\nbc");
        read_line(&mut src).unwrap();
        let line = read_line(&mut src).unwrap();
        assert_eq!(line.bytes, b"bc");
        assert_eq!(line.start, 2);
    }

    #[test]
    fn test_empty_line_is_not_end_of_input() {
        let mut src = ByteSource::from_text("\nx");
        let line = read_line(&mut src).unwrap();
        assert!(line.bytes.is_empty());
        assert_eq!(read_line(&mut src).unwrap().bytes, b"x");
    }

    #[test]
    fn test_long_line_is_split_into_records() {
        let text = "c".repeat(MAX_LINE_SIZE + 5);
        let mut src = ByteSource::from_text(&text);
        let first = read_line(&mut src).unwrap();
        assert_eq!(first.bytes.len(), MAX_LINE_SIZE);
        let rest = read_line(&mut src).unwrap();
        assert_eq!(rest.bytes.len(), 5);
        assert_eq!(rest.start, MAX_LINE_SIZE);
    }

    #[test]
    fn test_seek_bounds() {
        let mut src = ByteSource::from_text("abc");
        assert!(src.seek(2).is_ok());
        assert_eq!(src.read_byte(), Some(b'c'));
        assert!(src.is_eof());
        assert!(matches!(
            src.seek(3),
            Err(Error::OutOfRange { offset: 3, len: 3 })
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = ByteSource::from_file(Path::new("/nonexistent/tune.imy")).unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable { .. }));
    }
}
