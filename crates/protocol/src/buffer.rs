//! Bounded frame buffer for stream transports
//!
//! Bytes read from a socket are appended with [`FrameBuffer::extend`] and
//! complete frames are pulled out with [`FrameBuffer::next_frame`]. Frame
//! bodies are returned without the `\r\n` terminator.

use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;

const CRLF: &[u8] = b"\r\n";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame too large: {size} bytes (max: {max})")]
    TooLarge { size: usize, max: usize },
}

/// Accumulates stream bytes and splits them on the frame terminator
#[derive(Debug)]
pub struct FrameBuffer {
    buf: BytesMut,
    max_frame_size: usize,
    /// Set after an oversized frame until its terminator has been skipped
    discarding: bool,
}

impl FrameBuffer {
    /// Create a buffer rejecting frames longer than `max_frame_size` bytes
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(max_frame_size.min(8192)),
            max_frame_size,
            discarding: false,
        }
    }

    /// Append bytes read from the transport
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes buffered but not yet terminated
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Pull the next complete frame.
    ///
    /// Empty frames (a bare terminator) are skipped. An oversized frame is
    /// reported once; the rest of it is dropped up to its terminator.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>, FrameError> {
        loop {
            match find_terminator(&self.buf) {
                Some(pos) => {
                    let frame = self.buf.split_to(pos).freeze();
                    self.buf.advance(CRLF.len());

                    if self.discarding {
                        self.discarding = false;
                        continue;
                    }
                    if frame.is_empty() {
                        continue;
                    }
                    if frame.len() > self.max_frame_size {
                        return Err(FrameError::TooLarge {
                            size: frame.len(),
                            max: self.max_frame_size,
                        });
                    }
                    return Ok(Some(frame));
                }
                None if self.discarding => {
                    self.drop_unterminated();
                    return Ok(None);
                }
                None => {
                    // A trailing '\r' may be the first half of a terminator
                    let trailing_cr = usize::from(self.buf.last() == Some(&b'\r'));
                    if self.buf.len() > self.max_frame_size + trailing_cr {
                        let size = self.buf.len();
                        self.discarding = true;
                        self.drop_unterminated();
                        return Err(FrameError::TooLarge {
                            size,
                            max: self.max_frame_size,
                        });
                    }
                    return Ok(None);
                }
            }
        }
    }

    /// Drop buffered bytes, keeping a trailing '\r' so a terminator split
    /// across reads is still recognised.
    fn drop_unterminated(&mut self) {
        let keep = usize::from(self.buf.last() == Some(&b'\r'));
        let drop = self.buf.len() - keep;
        self.buf.advance(drop);
    }
}

fn find_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(CRLF.len()).position(|w| w == CRLF)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_frame() {
        let mut buf = FrameBuffer::new(64);
        buf.extend(b"PING\r\n");
        assert_eq!(buf.next_frame().unwrap().as_deref(), Some(&b"PING"[..]));
        assert_eq!(buf.next_frame().unwrap(), None);
        assert_eq!(buf.pending(), 0);
    }

    #[test]
    fn test_frame_split_across_reads() {
        let mut buf = FrameBuffer::new(64);
        buf.extend(b"LOGIN||||al");
        assert_eq!(buf.next_frame().unwrap(), None);
        buf.extend(b"ice&pw\r");
        assert_eq!(buf.next_frame().unwrap(), None);
        buf.extend(b"\n");
        assert_eq!(
            buf.next_frame().unwrap().as_deref(),
            Some(&b"LOGIN||||alice&pw"[..])
        );
    }

    #[test]
    fn test_pipelined_frames_in_order() {
        let mut buf = FrameBuffer::new(64);
        buf.extend(b"A\r\nB\r\nC");
        assert_eq!(buf.next_frame().unwrap().as_deref(), Some(&b"A"[..]));
        assert_eq!(buf.next_frame().unwrap().as_deref(), Some(&b"B"[..]));
        assert_eq!(buf.next_frame().unwrap(), None);
        assert_eq!(buf.pending(), 1);
    }

    #[test]
    fn test_bare_terminator_is_noise() {
        let mut buf = FrameBuffer::new(64);
        buf.extend(b"\r\n\r\nPING\r\n");
        assert_eq!(buf.next_frame().unwrap().as_deref(), Some(&b"PING"[..]));
    }

    #[test]
    fn test_oversized_unterminated_frame_is_rejected_once() {
        let mut buf = FrameBuffer::new(8);
        buf.extend(b"0123456789");
        assert_eq!(
            buf.next_frame(),
            Err(FrameError::TooLarge { size: 10, max: 8 })
        );
        // rest of the oversized frame is skipped silently
        buf.extend(b"abcdef\r\nPING\r\n");
        assert_eq!(buf.next_frame().unwrap().as_deref(), Some(&b"PING"[..]));
    }

    #[test]
    fn test_oversized_terminated_frame() {
        let mut buf = FrameBuffer::new(4);
        buf.extend(b"TOOLONG\r\nOK\r\n");
        assert!(matches!(buf.next_frame(), Err(FrameError::TooLarge { .. })));
        assert_eq!(buf.next_frame().unwrap().as_deref(), Some(&b"OK"[..]));
    }

    #[test]
    fn test_exact_limit_with_pending_cr() {
        let mut buf = FrameBuffer::new(4);
        buf.extend(b"ABCD\r");
        assert_eq!(buf.next_frame().unwrap(), None);
        buf.extend(b"\n");
        assert_eq!(buf.next_frame().unwrap().as_deref(), Some(&b"ABCD"[..]));
    }

    #[test]
    fn test_discard_keeps_split_terminator() {
        let mut buf = FrameBuffer::new(2);
        buf.extend(b"xxxx\r");
        assert!(buf.next_frame().is_err());
        buf.extend(b"\nOK\r\n");
        assert_eq!(buf.next_frame().unwrap().as_deref(), Some(&b"OK"[..]));
    }
}
