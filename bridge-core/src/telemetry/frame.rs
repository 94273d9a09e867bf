//! Byte-at-a-time reassembly of `[19, n, payload, checksum]` stream frames.

use core::fmt;

use heapless::Vec;

/// First byte of every stream frame.
pub const STREAM_HEADER: u8 = 19;

/// Largest payload the framer buffers. The fixed subscription needs 31 bytes.
pub const MAX_FRAME_PAYLOAD: usize = 96;

/// Reasons a frame is dropped.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FrameError {
    /// The byte sum of the frame was not zero modulo 256.
    Checksum { expected: u8, received: u8 },
    /// The declared length exceeds [`MAX_FRAME_PAYLOAD`].
    Oversize { declared: u8 },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Checksum { expected, received } => {
                write!(f, "checksum mismatch (expected {expected}, got {received})")
            }
            FrameError::Oversize { declared } => {
                write!(f, "declared length {declared} exceeds {MAX_FRAME_PAYLOAD}")
            }
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum State {
    Header,
    Length,
    Payload,
    Checksum,
    Discard { remaining: usize },
}

/// Reassembles stream frames from a serial byte stream.
#[derive(Debug)]
pub struct StreamFramer {
    state: State,
    declared: usize,
    sum: u8,
    payload: Vec<u8, MAX_FRAME_PAYLOAD>,
}

impl StreamFramer {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: State::Header,
            declared: 0,
            sum: 0,
            payload: Vec::new(),
        }
    }

    /// Drops any partially collected frame.
    pub fn reset(&mut self) {
        self.state = State::Header;
        self.declared = 0;
        self.sum = 0;
        self.payload.clear();
    }

    /// Returns `true` when the framer is between frames.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.state == State::Header
    }

    /// Feeds one byte.
    ///
    /// Returns `Some(Ok(payload))` when a frame completes with a valid checksum,
    /// `Some(Err(_))` when a frame is dropped, and `None` otherwise. The payload
    /// slice stays valid until the next call.
    pub fn push(&mut self, byte: u8) -> Option<Result<&[u8], FrameError>> {
        match self.state {
            State::Header => {
                if byte == STREAM_HEADER {
                    self.payload.clear();
                    self.sum = byte;
                    self.state = State::Length;
                }
                None
            }
            State::Length => {
                let declared = usize::from(byte);
                if declared > MAX_FRAME_PAYLOAD {
                    self.state = State::Discard {
                        remaining: declared + 1,
                    };
                    return Some(Err(FrameError::Oversize { declared: byte }));
                }
                self.declared = declared;
                self.sum = self.sum.wrapping_add(byte);
                self.state = if declared == 0 {
                    State::Checksum
                } else {
                    State::Payload
                };
                None
            }
            State::Payload => {
                // Capacity was checked against the declared length.
                let _ = self.payload.push(byte);
                self.sum = self.sum.wrapping_add(byte);
                if self.payload.len() == self.declared {
                    self.state = State::Checksum;
                }
                None
            }
            State::Checksum => {
                self.state = State::Header;
                let expected = 0u8.wrapping_sub(self.sum);
                if self.sum.wrapping_add(byte) == 0 {
                    Some(Ok(self.payload.as_slice()))
                } else {
                    Some(Err(FrameError::Checksum {
                        expected,
                        received: byte,
                    }))
                }
            }
            State::Discard { remaining } => {
                self.state = if remaining <= 1 {
                    State::Header
                } else {
                    State::Discard {
                        remaining: remaining - 1,
                    }
                };
                None
            }
        }
    }
}

impl Default for StreamFramer {
    fn default() -> Self {
        Self::new()
    }
}

/// Wraps a payload into a complete stream frame.
///
/// Returns `None` when the payload is longer than a frame can declare or the
/// frame does not fit in `N` bytes.
#[must_use]
pub fn encode_frame<const N: usize>(payload: &[u8]) -> Option<Vec<u8, N>> {
    let declared = u8::try_from(payload.len()).ok()?;
    let mut frame = Vec::new();
    frame.push(STREAM_HEADER).ok()?;
    frame.push(declared).ok()?;
    frame.extend_from_slice(payload).ok()?;

    let sum = frame.iter().fold(0u8, |acc, byte| acc.wrapping_add(*byte));
    frame.push(0u8.wrapping_sub(sum)).ok()?;
    Some(frame)
}
