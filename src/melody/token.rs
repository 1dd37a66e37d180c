//! Header keyword recognition

/// Header keywords, in matching order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    BeginIMelody,
    BeginEMelody,
    Version,
    Format,
    Name,
    Composer,
    Beat,
    Style,
    Volume,
    Melody,
    EndIMelody,
    EndEMelody,
}

impl Token {
    /// All tokens in declaration order
    pub const ALL: [Token; 12] = [
        Token::BeginIMelody,
        Token::BeginEMelody,
        Token::Version,
        Token::Format,
        Token::Name,
        Token::Composer,
        Token::Beat,
        Token::Style,
        Token::Volume,
        Token::Melody,
        Token::EndIMelody,
        Token::EndEMelody,
    ];

    pub fn keyword(self) -> &'static str {
        match self {
            Token::BeginIMelody => "BEGIN:IMELODY",
            Token::BeginEMelody => "BEGIN:EMELODY",
            Token::Version => "VERSION:",
            Token::Format => "FORMAT:CLASS",
            Token::Name => "NAME:",
            Token::Composer => "COMPOSER:",
            Token::Beat => "BEAT:",
            Token::Style => "STYLE:",
            Token::Volume => "VOLUME:",
            Token::Melody => "MELODY:",
            Token::EndIMelody => "END:IMELODY",
            Token::EndEMelody => "END:EMELODY",
        }
    }

    pub fn is_end(self) -> bool {
        matches!(self, Token::EndIMelody | Token::EndEMelody)
    }
}

/// Match a header keyword at the start of `line`, ignoring case.
///
/// Returns the token and the index just past the keyword.
pub fn match_token(line: &[u8]) -> Option<(Token, usize)> {
    Token::ALL.iter().find_map(|&token| {
        let keyword = token.keyword().as_bytes();
        let head = line.get(..keyword.len())?;
        head.eq_ignore_ascii_case(keyword)
            .then_some((token, keyword.len()))
    })
}
