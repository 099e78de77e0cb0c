//! Tokenizer for assembly source.
//!
//! Rules:
//! - spaces, tabs and `\r` separate tokens; `;` starts a comment
//! - each newline produces an [`TokenKind::Eol`] token
//! - identifiers are `[A-Za-z][A-Za-z0-9_]*` and classify as a register, a
//!   mnemonic, or a label name
//! - integers: decimal (`1_000`), hex (`0xff`), binary (`0b101`), optional
//!   leading `-`; values wrap to 32 bits
//! - `'c'` is an integer holding the character code; `"text"` is a string
//! - `\n \t \r \0 \\ \' \"` escapes are recognised inside quotes

use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::{Opcode, Register};

const COMMENT_CHAR: char = ';';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Eol,
    Register(Register),
    Mnemonic(Opcode),
    /// Label name, either defined (`name:`) or referenced.
    Identifier(String),
    Colon,
    Integer(i32),
    Str(String),
}

impl TokenKind {
    /// Short description used in syntax errors.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Eol => "end of line".to_string(),
            TokenKind::Register(r) => format!("register '{}'", r.name()),
            TokenKind::Mnemonic(op) => format!("instruction '{}'", op.mnemonic()),
            TokenKind::Identifier(name) => format!("identifier '{name}'"),
            TokenKind::Colon => "':'".to_string(),
            TokenKind::Integer(v) => format!("integer {v}"),
            TokenKind::Str(s) => format!("string {s:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// 1-based line.
    pub line: usize,
    /// 1-based column of the first character.
    pub column: usize,
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            line: 1,
            column: 1,
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn error(&self, line: usize, column: usize, message: impl Into<String>) -> VMError {
        VMError::LexError {
            line,
            column,
            message: message.into(),
        }
    }

    fn next_token(&mut self) -> Result<Option<Token>, VMError> {
        loop {
            match self.peek() {
                Some(' ' | '\t' | '\r') => {
                    self.bump();
                }
                Some(COMMENT_CHAR) => {
                    while !matches!(self.peek(), None | Some('\n')) {
                        self.bump();
                    }
                }
                _ => break,
            }
        }

        let (line, column) = (self.line, self.column);
        let Some(c) = self.peek() else {
            return Ok(None);
        };

        let kind = match c {
            '\n' => {
                self.bump();
                TokenKind::Eol
            }
            ':' => {
                self.bump();
                TokenKind::Colon
            }
            '\'' => {
                self.bump();
                let value = self.quoted_char(line, column, '\'')?.ok_or_else(|| {
                    self.error(line, column, "empty character literal")
                })?;
                if self.bump() != Some('\'') {
                    return Err(self.error(line, column, "unterminated character literal"));
                }
                if !value.is_ascii() {
                    return Err(self.error(line, column, "character literal must be a single byte"));
                }
                TokenKind::Integer(value as i32)
            }
            '"' => {
                self.bump();
                let mut text = String::new();
                while let Some(ch) = self.quoted_char(line, column, '"')? {
                    text.push(ch);
                }
                self.bump();
                TokenKind::Str(text)
            }
            c if c.is_ascii_alphabetic() => {
                let mut ident = String::new();
                while let Some(ch) = self.peek().filter(|ch| ch.is_ascii_alphanumeric() || *ch == '_') {
                    ident.push(ch);
                    self.bump();
                }
                if let Some(reg) = Register::from_name(&ident) {
                    TokenKind::Register(reg)
                } else if let Some(op) = Opcode::from_mnemonic(&ident) {
                    TokenKind::Mnemonic(op)
                } else {
                    TokenKind::Identifier(ident)
                }
            }
            c if c.is_ascii_digit() || c == '-' => TokenKind::Integer(self.integer(line, column)?),
            other => {
                return Err(self.error(line, column, format!("unexpected character {other:?}")));
            }
        };

        Ok(Some(Token { kind, line, column }))
    }

    /// Reads one (possibly escaped) character inside quotes.
    ///
    /// Returns `None` when the closing `quote` is next; it is left unread.
    fn quoted_char(&mut self, line: usize, column: usize, quote: char) -> Result<Option<char>, VMError> {
        let unterminated = if quote == '"' {
            "unterminated string literal"
        } else {
            "unterminated character literal"
        };

        match self.peek() {
            None | Some('\n') => Err(self.error(line, column, unterminated)),
            Some(c) if c == quote => Ok(None),
            Some('\\') => {
                self.bump();
                let escaped = match self.bump() {
                    Some('n') => '\n',
                    Some('t') => '\t',
                    Some('r') => '\r',
                    Some('0') => '\0',
                    Some(c @ ('\\' | '\'' | '"')) => c,
                    Some(c) => {
                        return Err(self.error(line, column, format!("unknown escape '\\{c}'")));
                    }
                    None => return Err(self.error(line, column, unterminated)),
                };
                Ok(Some(escaped))
            }
            Some(c) => {
                self.bump();
                Ok(Some(c))
            }
        }
    }

    fn integer(&mut self, line: usize, column: usize) -> Result<i32, VMError> {
        let negative = self.peek() == Some('-');
        if negative {
            self.bump();
        }

        let mut text = String::new();
        while let Some(ch) = self.peek().filter(|ch| ch.is_ascii_alphanumeric() || *ch == '_') {
            text.push(ch);
            self.bump();
        }

        let digits = text.replace('_', "");
        let (radix, body) = if let Some(hex) = digits.strip_prefix("0x") {
            (16, hex)
        } else if let Some(bin) = digits.strip_prefix("0b") {
            (2, bin)
        } else {
            (10, digits.as_str())
        };

        let sign = if negative { "-" } else { "" };
        let magnitude = u64::from_str_radix(body, radix)
            .map_err(|_| self.error(line, column, format!("malformed integer literal '{sign}{text}'")))?;

        let value = if negative {
            if magnitude > 1 << 31 {
                return Err(self.error(line, column, format!("integer literal '-{text}' out of range")));
            }
            (magnitude as i64).wrapping_neg() as i32
        } else {
            if magnitude > u32::MAX as u64 {
                return Err(self.error(line, column, format!("integer literal '{text}' out of range")));
            }
            magnitude as u32 as i32
        };
        Ok(value)
    }
}

/// Splits `source` into tokens.
pub fn tokenize(source: &str) -> Result<Vec<Token>, VMError> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token()? {
        tokens.push(token);
    }
    Ok(tokens)
}
