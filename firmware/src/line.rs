//! Line assembly for the USB text interfaces.

use heapless::Vec;

/// Maximum number of bytes accepted on a single line (excluding terminator).
pub const MAX_LINE_LEN: usize = 160;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LineError {
    /// The line exceeded the buffer; it is discarded up to the next terminator.
    Overflow,
    InvalidUtf8,
}

/// Collects bytes until `\n` or `\r` and yields the completed line.
pub struct LineAssembler<const N: usize = MAX_LINE_LEN> {
    buffer: Vec<u8, N>,
    overflowed: bool,
    complete: bool,
}

impl<const N: usize> LineAssembler<N> {
    pub const fn new() -> Self {
        Self {
            buffer: Vec::new(),
            overflowed: false,
            complete: false,
        }
    }

    /// Feeds one byte. Empty lines are swallowed so `\r\n` yields one line.
    pub fn push(&mut self, byte: u8) -> Option<Result<&str, LineError>> {
        if self.complete {
            self.buffer.clear();
            self.complete = false;
        }

        if byte != b'\n' && byte != b'\r' {
            if !self.overflowed && self.buffer.push(byte).is_err() {
                self.overflowed = true;
            }
            return None;
        }

        if self.overflowed {
            self.overflowed = false;
            self.buffer.clear();
            return Some(Err(LineError::Overflow));
        }
        if self.buffer.is_empty() {
            return None;
        }

        self.complete = true;
        Some(core::str::from_utf8(&self.buffer).map_err(|_| LineError::InvalidUtf8))
    }
}

impl<const N: usize> Default for LineAssembler<N> {
    fn default() -> Self {
        Self::new()
    }
}
