use std::io::{self, Read, Write};

use crate::error::ChannelError;

/// Upper bound on a single frame body.
pub const MAX_FRAME_LEN: usize = 1024 * 1024; // 1MB limit

/// Write one length-prefixed frame: a `u32` little-endian body length
/// followed by the body itself.
pub fn write_frame<W: Write>(w: &mut W, payload: &[u8]) -> io::Result<()> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("frame of {} bytes exceeds the limit", payload.len()),
        ));
    }

    let len = (payload.len() as u32).to_le_bytes();
    w.write_all(&len)?;
    w.write_all(payload)?;
    w.flush()
}

/// Read one length-prefixed frame, blocking until it is complete.
///
/// Returns `Ok(None)` when the stream ends cleanly at a frame boundary; EOF
/// inside a frame is an error.
pub fn read_frame<R: Read>(r: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match r.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds the limit"),
        ));
    }

    let mut body = vec![0u8; len];
    r.read_exact(&mut body)?;
    Ok(Some(body))
}

/// Incremental frame reassembly for the data plane.
///
/// A single transport read may carry zero, one, or several logical messages,
/// and a message may arrive fragmented across reads. Bytes are appended as
/// they arrive and complete frames taken off the front.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes received from the transport.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Take the next complete frame, if one has fully arrived.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, ChannelError> {
        if self.buf.len() < 4 {
            return Ok(None);
        }

        let len = u32::from_le_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize;
        if len > MAX_FRAME_LEN {
            return Err(ChannelError::OversizedFrame {
                len,
                max: MAX_FRAME_LEN,
            });
        }
        if self.buf.len() < 4 + len {
            return Ok(None);
        }

        self.buf.drain(..4);
        let body = self.buf.drain(..len).collect();
        Ok(Some(body))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn framed(payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        write_frame(&mut out, payload).unwrap();
        out
    }

    #[test]
    fn roundtrip_single_frame() {
        let bytes = framed(b"hello");
        let mut cursor = Cursor::new(bytes);
        assert_eq!(read_frame(&mut cursor).unwrap(), Some(b"hello".to_vec()));
        assert_eq!(read_frame(&mut cursor).unwrap(), None);
    }

    #[test]
    fn reads_multiple_frames_from_one_stream() {
        let mut bytes = framed(b"one");
        bytes.extend(framed(b"two"));
        bytes.extend(framed(b""));

        let mut cursor = Cursor::new(bytes);
        assert_eq!(read_frame(&mut cursor).unwrap(), Some(b"one".to_vec()));
        assert_eq!(read_frame(&mut cursor).unwrap(), Some(b"two".to_vec()));
        assert_eq!(read_frame(&mut cursor).unwrap(), Some(Vec::new()));
        assert_eq!(read_frame(&mut cursor).unwrap(), None);
    }

    #[test]
    fn eof_inside_a_frame_is_an_error() {
        let mut bytes = framed(b"truncated");
        bytes.truncate(bytes.len() - 3);
        let mut cursor = Cursor::new(bytes);
        assert!(read_frame(&mut cursor).is_err());
    }

    #[test]
    fn rejects_oversized_header() {
        let bytes = ((MAX_FRAME_LEN + 1) as u32).to_le_bytes().to_vec();
        let mut cursor = Cursor::new(bytes);
        assert!(read_frame(&mut cursor).is_err());
    }

    #[test]
    fn buffer_yields_multiple_frames_from_one_read() {
        let mut bytes = framed(b"alpha");
        bytes.extend(framed(b"beta"));

        let mut buffer = FrameBuffer::new();
        buffer.extend(&bytes);
        assert_eq!(buffer.next_frame().unwrap(), Some(b"alpha".to_vec()));
        assert_eq!(buffer.next_frame().unwrap(), Some(b"beta".to_vec()));
        assert_eq!(buffer.next_frame().unwrap(), None);
    }

    #[test]
    fn buffer_reassembles_fragmented_frames() {
        let bytes = framed(b"fragmented payload");

        let mut buffer = FrameBuffer::new();
        for chunk in bytes.chunks(3) {
            assert_eq!(buffer.next_frame().unwrap(), None);
            buffer.extend(chunk);
        }
        assert_eq!(
            buffer.next_frame().unwrap(),
            Some(b"fragmented payload".to_vec())
        );
    }

    #[test]
    fn buffer_rejects_oversized_header() {
        let mut buffer = FrameBuffer::new();
        buffer.extend(&((MAX_FRAME_LEN + 1) as u32).to_le_bytes());
        assert!(buffer.next_frame().is_err());
    }
}
