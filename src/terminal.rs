//! Line-oriented VT-style screen buffer (§4.3).
//!
//! Ported from `examples/original_source/discord-bot/gridbot/tty_model.py`.
//! The write-side decoder mirrors the state-machine shape of the teacher's
//! `wire::decoder::Decoder` (`src/wire/decoder.rs`): a small enum of decode
//! states driven one byte at a time, with invalid input recovering rather
//! than panicking.

const REPLACEMENT_CHAR: char = '\u{fffd}';

/// Decoder state for `TerminalModel::write`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Normal,
    Utf8Three,
    Utf8Two,
    Utf8One,
}

/// A rectangular character plane with a cursor, fed byte-at-a-time.
pub struct TerminalModel {
    columns: usize,
    lines: usize,
    plane: Vec<Vec<char>>,
    cursor_line: usize,
    cursor_column: usize,
    state: DecodeState,
    utf8_buffer: Vec<u8>,
    bell_hook: Box<dyn FnMut() + Send>,
}

impl TerminalModel {
    pub fn new(columns: usize, lines: usize) -> Self {
        TerminalModel {
            columns,
            lines,
            plane: vec![vec![' '; columns]; lines],
            cursor_line: 0,
            cursor_column: 0,
            state: DecodeState::Normal,
            utf8_buffer: Vec::new(),
            bell_hook: Box::new(|| {}),
        }
    }

    /// Installs a hook invoked whenever a `BEL` byte is written. The default
    /// hook is a no-op.
    pub fn set_bell_hook(&mut self, hook: impl FnMut() + Send + 'static) {
        self.bell_hook = Box::new(hook);
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn lines(&self) -> usize {
        self.lines
    }

    pub fn cursor(&self) -> (usize, usize) {
        (self.cursor_line, self.cursor_column)
    }

    /// Renders the plane as `lines` rows of exactly `columns` characters,
    /// joined by `\n`.
    pub fn render(&self) -> String {
        self.plane
            .iter()
            .map(|row| row.iter().collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Writes a byte sequence, decoding C0 controls and UTF-8.
    pub fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.write_one(b);
        }
    }

    fn write_one(&mut self, byte: u8) {
        match self.state {
            DecodeState::Normal => self.write_normal(byte),
            DecodeState::Utf8Three | DecodeState::Utf8Two | DecodeState::Utf8One => {
                self.write_utf8_continuation(byte)
            },
        }
    }

    fn write_normal(&mut self, byte: u8) {
        if byte < 0x20 {
            self.write_c0(byte);
        } else if byte < 0x80 {
            self.put_one_char(byte as char);
        } else {
            self.utf8_buffer.push(byte);
            if byte & 0xf8 == 0xf0 {
                self.state = DecodeState::Utf8Three;
            } else if byte & 0xf0 == 0xe0 {
                self.state = DecodeState::Utf8Two;
            } else if byte & 0xe0 == 0xc0 {
                self.state = DecodeState::Utf8One;
            } else {
                self.utf8_error();
            }
        }
    }

    fn write_c0(&mut self, byte: u8) {
        match byte {
            0x07 => (self.bell_hook)(), // BEL
            0x08 => self.backspace(),   // BS
            0x09 => self.horizontal_tab(), // HT
            0x0a => self.line_feed(),   // LF
            0x0b => self.vertical_tab(), // VT
            0x0c => self.form_feed(),   // FF
            0x0d => self.carriage_return(), // CR
            // NUL, SOH-ACK, SO/SI, DLE-DC4, NAK-SUB, ESC, IS4-IS1: ignored
            _ => {},
        }
    }

    fn write_utf8_continuation(&mut self, byte: u8) {
        self.utf8_buffer.push(byte);
        match self.state {
            DecodeState::Utf8Three => self.state = DecodeState::Utf8Two,
            DecodeState::Utf8Two => self.state = DecodeState::Utf8One,
            DecodeState::Utf8One => {
                match std::str::from_utf8(&self.utf8_buffer) {
                    Ok(s) => {
                        if let Some(ch) = s.chars().next() {
                            self.put_one_char(ch);
                        }
                        self.utf8_buffer.clear();
                    },
                    Err(_) => self.utf8_error(),
                }
                self.state = DecodeState::Normal;
            },
            DecodeState::Normal => unreachable!(),
        }
    }

    fn utf8_error(&mut self) {
        self.utf8_buffer.clear();
        self.state = DecodeState::Normal;
        self.put_one_char(REPLACEMENT_CHAR);
    }

    fn put_one_char(&mut self, c: char) {
        self.plane[self.cursor_line][self.cursor_column] = c;
        self.cursor_column += 1;
        if self.cursor_column >= self.columns {
            self.carriage_return();
            self.line_feed();
        }
    }

    fn carriage_return(&mut self) {
        self.cursor_column = 0;
    }

    fn line_feed(&mut self) {
        self.cursor_line += 1;
        if self.cursor_line >= self.lines {
            self.scroll();
        }
    }

    fn scroll(&mut self) {
        self.plane.remove(0);
        self.plane.push(vec![' '; self.columns]);
        self.cursor_line -= 1;
    }

    fn vertical_tab(&mut self) {
        self.line_feed();
    }

    fn form_feed(&mut self) {
        self.line_feed();
    }

    fn backspace(&mut self) {
        if self.cursor_column > 0 {
            self.cursor_column -= 1;
        } else if self.cursor_line > 0 {
            self.cursor_column = self.columns - 1;
            self.cursor_line -= 1;
        }
    }

    fn horizontal_tab(&mut self) {
        const TAB_WIDTH: usize = 8;
        let next_tab = (self.cursor_column / TAB_WIDTH) + 1;
        self.cursor_column = (next_tab * TAB_WIDTH).min(self.columns - 1);
    }
}
