use super::base_stream::BaseStream;
use super::error::{PDFError, PDFResult};

/// Longest keyword the lexer accepts before giving up on the token.
const MAX_KEYWORD_LEN: usize = 128;

/// A single lexical token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// No more input
    EOF,
    Boolean(bool),
    Null,
    /// Integers and reals alike
    Number(f64),
    /// `(literal)` string, escapes resolved
    String(Vec<u8>),
    /// `<hex>` string, decoded
    HexString(Vec<u8>),
    /// `/Name` with `#xx` escapes resolved
    Name(String),
    /// Any other bare word: `obj`, `R`, `xref`, `trailer`, `stream`, ...
    Command(String),
    ArrayStart,
    ArrayEnd,
    DictStart,
    DictEnd,
}

/// Tokenizer over a [`BaseStream`].
///
/// `current` holds the byte the lexer examines next, already consumed from
/// the stream, or `None` once the window is exhausted.
pub struct Lexer {
    stream: Box<dyn BaseStream>,
    current: Option<u8>,
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

fn is_delimiter(byte: u8) -> bool {
    matches!(
        byte,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

fn is_special(byte: u8) -> bool {
    Lexer::is_whitespace(byte) || is_delimiter(byte)
}

/// Maps the end-of-stream error to `None`.
fn byte_or_end(result: PDFResult<u8>) -> PDFResult<Option<u8>> {
    match result {
        Ok(byte) => Ok(Some(byte)),
        Err(PDFError::UnexpectedEndOfStream) => Ok(None),
        Err(e) => Err(e),
    }
}

impl Lexer {
    pub fn new(mut stream: Box<dyn BaseStream>) -> PDFResult<Self> {
        let current = byte_or_end(stream.get_byte())?;
        Ok(Lexer { stream, current })
    }

    fn advance(&mut self) -> PDFResult<Option<u8>> {
        self.current = byte_or_end(self.stream.get_byte())?;
        Ok(self.current)
    }

    fn peek(&mut self) -> PDFResult<Option<u8>> {
        byte_or_end(self.stream.peek_byte())
    }

    /// Absolute offset of the byte the lexer will examine next.
    pub fn position(&self) -> usize {
        match self.current {
            Some(_) => self.stream.pos() - 1,
            None => self.stream.pos(),
        }
    }

    /// Repositions the lexer at absolute offset `pos`.
    pub fn seek(&mut self, pos: usize) -> PDFResult<()> {
        self.stream.set_pos(pos)?;
        self.advance()?;
        Ok(())
    }

    /// Reads `length` raw bytes at absolute offset `pos` without moving the lexer.
    pub fn read_raw(&mut self, pos: usize, length: usize) -> PDFResult<Vec<u8>> {
        self.stream.get_byte_range(pos, pos.saturating_add(length))
    }

    /// Absolute end of the underlying stream window.
    pub fn end(&self) -> usize {
        self.stream.end()
    }

    /// Steps over the CR, LF or CRLF after a `stream` keyword and returns
    /// the offset of the first data byte.
    pub fn skip_stream_eol(&mut self) -> PDFResult<usize> {
        match self.current {
            Some(b'\r') => {
                if self.advance()? == Some(b'\n') {
                    self.advance()?;
                }
            }
            Some(b'\n') => {
                self.advance()?;
            }
            _ => {}
        }
        Ok(self.position())
    }

    /// NUL, TAB, LF, FF, CR and SPACE.
    pub fn is_whitespace(byte: u8) -> bool {
        matches!(byte, b'\0' | b'\t' | b'\n' | 0x0C | b'\r' | b' ')
    }

    fn skip_blanks(&mut self) -> PDFResult<()> {
        while let Some(byte) = self.current {
            if byte == b'%' {
                // Comments run to the end of the line
                while !matches!(self.advance()?, None | Some(b'\r' | b'\n')) {}
            } else if Self::is_whitespace(byte) {
                self.advance()?;
            } else {
                break;
            }
        }
        Ok(())
    }

    /// Reads the next token.
    pub fn get_object(&mut self) -> PDFResult<Token> {
        self.skip_blanks()?;

        let Some(byte) = self.current else {
            return Ok(Token::EOF);
        };
        match byte {
            b'0'..=b'9' | b'+' | b'-' | b'.' => self.lex_number(),
            b'(' => self.lex_literal_string(),
            b'/' => self.lex_name(),
            b'[' => {
                self.advance()?;
                Ok(Token::ArrayStart)
            }
            b']' => {
                self.advance()?;
                Ok(Token::ArrayEnd)
            }
            b'<' => match self.advance()? {
                Some(b'<') => {
                    self.advance()?;
                    Ok(Token::DictStart)
                }
                _ => self.lex_hex_string(),
            },
            b'>' => match self.advance()? {
                Some(b'>') => {
                    self.advance()?;
                    Ok(Token::DictEnd)
                }
                other => Err(PDFError::parse(format!("Stray '>' before {other:?}"))),
            },
            b')' | b'{' | b'}' => {
                self.advance()?;
                Err(PDFError::parse(format!("Illegal character '{}'", byte as char)))
            }
            _ => self.lex_keyword(),
        }
    }

    /// Numbers are read leniently: a doubled leading minus, line breaks
    /// after the sign and minus signs inside the digits are all tolerated.
    fn lex_number(&mut self) -> PDFResult<Token> {
        let mut negative = false;
        match self.current {
            Some(b'-') => {
                negative = true;
                if self.advance()? == Some(b'-') {
                    self.advance()?;
                }
            }
            Some(b'+') => {
                self.advance()?;
            }
            _ => {}
        }
        while matches!(self.current, Some(b'\r' | b'\n')) {
            self.advance()?;
        }

        let mut fraction_digits: Option<i32> = None;
        if self.current == Some(b'.') {
            fraction_digits = Some(0);
            self.advance()?;
        }

        match self.current {
            Some(byte) if byte.is_ascii_digit() => {}
            // A bare sign or point reads as zero
            None => return Ok(Token::Number(0.0)),
            Some(byte) if Self::is_whitespace(byte) || byte == b'(' || byte == b'<' => {
                return Ok(Token::Number(0.0));
            }
            Some(byte) => {
                return Err(PDFError::parse(format!("Invalid number at byte 0x{byte:02X}")));
            }
        }

        let mut mantissa = 0.0f64;
        // (sign, magnitude)
        let mut exponent: Option<(i32, i32)> = None;
        while let Some(byte) = self.current {
            match byte {
                b'0'..=b'9' => {
                    let digit = byte - b'0';
                    if let Some((_, magnitude)) = exponent.as_mut() {
                        *magnitude = magnitude.saturating_mul(10).saturating_add(digit as i32);
                    } else {
                        mantissa = mantissa * 10.0 + digit as f64;
                        if let Some(count) = fraction_digits.as_mut() {
                            *count += 1;
                        }
                    }
                }
                b'.' if fraction_digits.is_none() && exponent.is_none() => {
                    fraction_digits = Some(0)
                }
                b'-' => {}
                b'e' | b'E' if exponent.is_none() => match self.peek()? {
                    Some(b'-') => {
                        self.advance()?;
                        exponent = Some((-1, 0));
                    }
                    Some(b'+') => {
                        self.advance()?;
                        exponent = Some((1, 0));
                    }
                    Some(next) if next.is_ascii_digit() => exponent = Some((1, 0)),
                    _ => break,
                },
                _ => break,
            }
            self.advance()?;
        }

        let mut value = mantissa;
        if let Some(count) = fraction_digits {
            value /= 10f64.powi(count);
        }
        if let Some((sign, magnitude)) = exponent {
            value *= 10f64.powi(sign * magnitude);
        }
        Ok(Token::Number(if negative { -value } else { value }))
    }

    fn lex_literal_string(&mut self) -> PDFResult<Token> {
        let mut out = Vec::new();
        let mut depth = 1usize;
        self.advance()?;

        // An unterminated string ends with the data
        while let Some(byte) = self.current {
            self.advance()?;
            match byte {
                b'(' => {
                    depth += 1;
                    out.push(byte);
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    out.push(byte);
                }
                b'\\' => self.lex_escape(&mut out)?,
                _ => out.push(byte),
            }
        }
        Ok(Token::String(out))
    }

    /// Resolves the escape whose backslash was just consumed.
    fn lex_escape(&mut self, out: &mut Vec<u8>) -> PDFResult<()> {
        let Some(byte) = self.current else {
            return Ok(());
        };
        self.advance()?;
        match byte {
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0C),
            b'0'..=b'7' => {
                let mut value = u32::from(byte - b'0');
                for _ in 0..2 {
                    match self.current {
                        Some(digit @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(digit - b'0');
                            self.advance()?;
                        }
                        _ => break,
                    }
                }
                out.push(value as u8);
            }
            // Line continuation
            b'\r' => {
                if self.current == Some(b'\n') {
                    self.advance()?;
                }
            }
            b'\n' => {}
            other => out.push(other),
        }
        Ok(())
    }

    /// Called with the opening `<` already consumed. Bytes that are not hex
    /// digits are skipped; an odd final digit is padded with zero.
    fn lex_hex_string(&mut self) -> PDFResult<Token> {
        let mut out = Vec::new();
        let mut high: Option<u8> = None;

        while let Some(byte) = self.current {
            self.advance()?;
            if byte == b'>' {
                break;
            }
            let Some(digit) = hex_value(byte) else {
                continue;
            };
            match high.take() {
                Some(h) => out.push(h << 4 | digit),
                None => high = Some(digit),
            }
        }
        if let Some(h) = high {
            out.push(h << 4);
        }
        Ok(Token::HexString(out))
    }

    fn lex_name(&mut self) -> PDFResult<Token> {
        let mut out = Vec::new();
        self.advance()?;

        while let Some(byte) = self.current.filter(|&b| !is_special(b)) {
            self.advance()?;
            if byte != b'#' {
                out.push(byte);
                continue;
            }
            // Malformed escapes are kept as written
            let Some((first, high)) = self.current.and_then(|b| hex_value(b).map(|h| (b, h))) else {
                out.push(b'#');
                continue;
            };
            self.advance()?;
            match self.current.and_then(hex_value) {
                Some(low) => {
                    out.push(high << 4 | low);
                    self.advance()?;
                }
                None => out.extend_from_slice(&[b'#', first]),
            }
        }
        Ok(Token::Name(String::from_utf8_lossy(&out).into_owned()))
    }

    fn lex_keyword(&mut self) -> PDFResult<Token> {
        let mut word = String::new();
        while let Some(byte) = self.current.filter(|&b| !is_special(b)) {
            if word.len() >= MAX_KEYWORD_LEN {
                return Err(PDFError::parse(format!(
                    "Keyword longer than {MAX_KEYWORD_LEN} bytes"
                )));
            }
            word.push(byte as char);
            self.advance()?;
        }

        Ok(match word.as_str() {
            "true" => Token::Boolean(true),
            "false" => Token::Boolean(false),
            "null" => Token::Null,
            _ => Token::Command(word),
        })
    }
}
