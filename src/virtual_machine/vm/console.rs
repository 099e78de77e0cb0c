use std::io::{self, BufRead, Stdout, Write};

/// Byte-oriented terminal the VM reads input from and prints to.
pub trait Console {
    /// One line without its terminator; `None` at end of input.
    fn read_line(&mut self) -> io::Result<Option<String>>;
    /// One byte; `None` at end of input.
    fn read_byte(&mut self) -> io::Result<Option<u8>>;
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;

    fn write_str(&mut self, text: &str) -> io::Result<()> {
        self.write_bytes(text.as_bytes())
    }
}

/// [`Console`] over any buffered reader and writer.
pub struct Terminal<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Terminal<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn output(&self) -> &W {
        &self.output
    }
}

impl Terminal<io::StdinLock<'static>, Stdout> {
    /// Process stdin and stdout.
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> Console for Terminal<R, W> {
    fn read_line(&mut self) -> io::Result<Option<String>> {
        self.output.flush()?;
        let mut raw = Vec::new();
        if self.input.read_until(b'\n', &mut raw)? == 0 {
            return Ok(None);
        }
        let line = String::from_utf8_lossy(&raw);
        Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        self.output.flush()?;
        let byte = self.input.fill_buf()?.first().copied();
        if byte.is_some() {
            self.input.consume(1);
        }
        Ok(byte)
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.output.write_all(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.output.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn terminal(input: &str) -> Terminal<Cursor<Vec<u8>>, Vec<u8>> {
        Terminal::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
    }

    #[test]
    fn lines_lose_terminators() {
        let mut term = terminal("one\r\ntwo\nthree");
        assert_eq!(term.read_line().unwrap().as_deref(), Some("one"));
        assert_eq!(term.read_line().unwrap().as_deref(), Some("two"));
        assert_eq!(term.read_line().unwrap().as_deref(), Some("three"));
        assert_eq!(term.read_line().unwrap(), None);
    }

    #[test]
    fn bytes_then_eof() {
        let mut term = terminal("ab");
        assert_eq!(term.read_byte().unwrap(), Some(b'a'));
        assert_eq!(term.read_line().unwrap().as_deref(), Some("b"));
        assert_eq!(term.read_byte().unwrap(), None);
    }

    #[test]
    fn writes_are_collected() {
        let mut term = terminal("");
        term.write_str("hi ").unwrap();
        term.write_bytes(&[0, b'!']).unwrap();
        term.flush().unwrap();
        assert_eq!(term.output(), &b"hi \0!".to_vec());
    }
}
