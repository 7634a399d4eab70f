use super::error::{PDFError, PDFResult};
use super::lexer::{Lexer, Token};
use rustc_hash::FxHashMap;

/// Dictionary payload shared by dictionaries and stream objects.
pub type Dict = FxHashMap<String, PDFObject>;

/// A parsed PDF object.
#[derive(Debug, Clone, PartialEq)]
pub enum PDFObject {
    Null,
    Boolean(bool),
    Number(f64),
    /// Literal string like (hello)
    String(Vec<u8>),
    /// Hex string like <48656c6c6f>
    HexString(Vec<u8>),
    Name(String),
    Array(Vec<PDFObject>),
    Dictionary(Dict),
    /// Stream object (dictionary + raw, still encoded, data)
    Stream { dict: Dict, data: Vec<u8> },
    /// Indirect object reference (like "5 0 R")
    Ref { num: u32, generation: u32 },
    /// End of file marker
    EOF,
    /// Bare keyword such as `obj`, `xref` or `trailer`
    Command(String),
}

impl PDFObject {
    pub fn is_command(&self, cmd: &str) -> bool {
        matches!(self, PDFObject::Command(command) if command == cmd)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            PDFObject::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Integer value of a number object, rejecting fractions.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            PDFObject::Number(n) if n.fract() == 0.0 => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            PDFObject::Name(name) => Some(name),
            _ => None,
        }
    }

    /// Bytes of a literal or hex string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            PDFObject::String(s) | PDFObject::HexString(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[PDFObject]> {
        match self {
            PDFObject::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Dictionary of a dictionary or stream object.
    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            PDFObject::Dictionary(dict) | PDFObject::Stream { dict, .. } => Some(dict),
            _ => None,
        }
    }

    /// Looks up `key` if this is a dictionary or stream.
    pub fn get(&self, key: &str) -> Option<&PDFObject> {
        self.as_dict()?.get(key)
    }
}

/// Builds PDF objects from lexer tokens.
///
/// Keeps two tokens of lookahead so that `N G R` references and
/// `<< ... >> stream` objects can be recognised.
pub struct Parser {
    lexer: Lexer,
    buf1: Option<Token>,
    buf2: Option<Token>,
}

impl Parser {
    pub fn new(mut lexer: Lexer) -> PDFResult<Self> {
        let buf1 = Some(lexer.get_object()?);
        let buf2 = Some(lexer.get_object()?);

        Ok(Parser { lexer, buf1, buf2 })
    }

    fn shift(&mut self) -> PDFResult<()> {
        self.buf1 = self.buf2.take();
        self.buf2 = Some(self.lexer.get_object()?);
        Ok(())
    }

    fn refill(&mut self) -> PDFResult<()> {
        self.buf1 = Some(self.lexer.get_object()?);
        self.buf2 = Some(self.lexer.get_object()?);
        Ok(())
    }

    /// Gets the next PDF object.
    pub fn get_object(&mut self) -> PDFResult<PDFObject> {
        let token = self
            .buf1
            .take()
            .ok_or_else(|| PDFError::Generic("Parser buffer is empty".to_string()))?;

        self.shift()?;

        match token {
            Token::ArrayStart => self.parse_array(),
            Token::DictStart => self.parse_dictionary(),
            Token::ArrayEnd => Err(PDFError::parse("Unexpected array end token")),
            Token::DictEnd => Err(PDFError::parse("Unexpected dictionary end token")),
            Token::Number(n) => {
                if let (Some(Token::Number(generation)), Some(Token::Command(cmd))) =
                    (&self.buf1, &self.buf2)
                {
                    if cmd == "R" && n >= 0.0 && *generation >= 0.0 {
                        let (num, generation) = (n as u32, *generation as u32);
                        self.shift()?;
                        self.shift()?;
                        return Ok(PDFObject::Ref { num, generation });
                    }
                }
                Ok(PDFObject::Number(n))
            }
            Token::EOF => Ok(PDFObject::EOF),
            Token::Boolean(b) => Ok(PDFObject::Boolean(b)),
            Token::Null => Ok(PDFObject::Null),
            Token::String(s) => Ok(PDFObject::String(s)),
            Token::HexString(s) => Ok(PDFObject::HexString(s)),
            Token::Name(n) => Ok(PDFObject::Name(n)),
            Token::Command(c) => Ok(PDFObject::Command(c)),
        }
    }

    fn parse_array(&mut self) -> PDFResult<PDFObject> {
        let mut array = Vec::new();

        loop {
            match &self.buf1 {
                Some(Token::ArrayEnd) => {
                    self.shift()?;
                    break;
                }
                Some(Token::EOF) | None => {
                    return Err(PDFError::parse("Unterminated array (missing ']')"));
                }
                _ => {}
            }

            let element = self.get_object().or_else(|e| self.recover(e, "array element"))?;
            array.push(element);
        }

        Ok(PDFObject::Array(array))
    }

    fn parse_dictionary(&mut self) -> PDFResult<PDFObject> {
        let mut dict = Dict::default();

        loop {
            let key = match &self.buf1 {
                Some(Token::DictEnd) => break,
                Some(Token::EOF) | None => {
                    return Err(PDFError::parse("Unterminated dictionary (missing '>>')"));
                }
                Some(Token::Name(name)) => name.clone(),
                Some(other) => {
                    log::warn!("skipping non-name dictionary key {other:?}");
                    self.shift()?;
                    continue;
                }
            };

            self.shift()?;

            match &self.buf1 {
                Some(Token::EOF) => {
                    return Err(PDFError::parse("Unterminated dictionary (EOF after key)"));
                }
                Some(Token::DictEnd) => {
                    dict.insert(key, PDFObject::Null);
                    break;
                }
                _ => {}
            }

            let value = self
                .get_object()
                .or_else(|e| self.recover(e, &format!("value for key '{key}'")))?;
            dict.insert(key, value);
        }

        // buf1 = '>>'. If buf2 is the `stream` keyword the lexer sits right
        // after it, at the start of the end-of-line marker.
        if let Some(Token::Command(cmd)) = &self.buf2 {
            if cmd == "stream" {
                self.buf1 = None;
                self.buf2 = None;
                return self.parse_stream(dict);
            }
        }

        self.shift()?;
        Ok(PDFObject::Dictionary(dict))
    }

    /// Substitutes null for a malformed container element. Block reads and
    /// errors that cost the parser its lookahead are passed through.
    fn recover(&self, error: PDFError, what: &str) -> PDFResult<PDFObject> {
        let lookahead_lost = self.buf1.is_none() || self.buf2.is_none();
        if lookahead_lost || matches!(error, PDFError::BlockRead { .. }) {
            return Err(error);
        }
        log::warn!("error parsing {what}: {error}, using null");
        Ok(PDFObject::Null)
    }

    fn parse_stream(&mut self, dict: Dict) -> PDFResult<PDFObject> {
        let data_start = self.lexer.skip_stream_eol()?;

        let declared = dict
            .get("Length")
            .and_then(PDFObject::as_int)
            .and_then(|n| usize::try_from(n).ok())
            .filter(|len| data_start.saturating_add(*len) <= self.lexer.end());

        if let Some(length) = declared {
            let data = self.lexer.read_raw(data_start, length)?;
            self.lexer.seek(data_start + length)?;
            self.refill()?;
            if matches!(&self.buf1, Some(Token::Command(cmd)) if cmd == "endstream") {
                self.shift()?;
                return Ok(PDFObject::Stream { dict, data });
            }
            log::warn!("stream /Length {length} does not end at 'endstream', scanning instead");
        } else if dict.contains_key("Length") {
            log::warn!("stream /Length is indirect or out of range, scanning for 'endstream'");
        }

        let data = self.scan_stream_data(data_start)?;
        Ok(PDFObject::Stream { dict, data })
    }

    /// Reads stream data up to the next `endstream` keyword.
    fn scan_stream_data(&mut self, data_start: usize) -> PDFResult<Vec<u8>> {
        const MARKER: &[u8] = b"endstream";
        const WINDOW: usize = 4096;

        let end = self.lexer.end();
        let mut data = Vec::new();
        let mut pos = data_start;

        let marker_at = loop {
            if pos >= end {
                return Err(PDFError::parse("EOF while reading stream data"));
            }
            let chunk = self.lexer.read_raw(pos, WINDOW.min(end - pos))?;
            data.extend_from_slice(&chunk);
            pos += chunk.len();
            let search_from = data.len().saturating_sub(chunk.len() + MARKER.len());
            if let Some(found) = data[search_from..]
                .windows(MARKER.len())
                .position(|w| w == MARKER)
            {
                break search_from + found;
            }
        };

        data.truncate(marker_at);
        if data.ends_with(b"\r\n") {
            data.truncate(data.len() - 2);
        } else if data.ends_with(b"\n") || data.ends_with(b"\r") {
            data.truncate(data.len() - 1);
        }

        self.lexer.seek(data_start + marker_at + MARKER.len())?;
        self.refill()?;
        Ok(data)
    }
}
