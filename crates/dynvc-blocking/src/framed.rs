use std::io::{self, Read, Write};

use bytes::{Buf as _, Bytes, BytesMut};
use dynvc::TransportWrite;
use dynvc_core::WriteBuf;

/// Frames are length-prefixed: a 4-byte little-endian payload length
/// followed by the payload. The security transport guarantees whole-record
/// delivery; the prefix keeps those records intact over any byte stream.
const FRAME_PREFIX_SIZE: usize = 4;

/// Largest frame accepted from the peer.
const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

const READ_CHUNK_SIZE: usize = 4096;

/// A transport that moves whole frames.
///
/// `read_frame` blocks for a complete frame and returns `None` on a clean
/// EOF at a frame boundary; `write_frame` blocks until the stream accepts
/// the whole frame.
pub trait FramedTransport {
    fn read_frame(&mut self) -> io::Result<Option<Bytes>>;

    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()>;

    fn close(&mut self) -> io::Result<()>;
}

/// Framed transport over a single duplex stream.
///
/// This is the whole-transport flavor, for callers that drive reads and
/// writes from one place (relays, tests). The dispatch loop instead wants
/// the read half on its own thread while plugin threads share the write
/// half: for that, wrap each half of the stream separately in
/// [`FramedReader`] and [`FramedWriter`].
pub struct Framed<S> {
    stream: S,
    buf: BytesMut,
    out: WriteBuf,
}

impl<S> Framed<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buf: BytesMut::new(),
            out: WriteBuf::new(),
        }
    }

    pub fn into_inner(self) -> (S, BytesMut) {
        (self.stream, self.buf)
    }

    pub fn peek(&self) -> &[u8] {
        &self.buf
    }
}

impl<S> FramedTransport for Framed<S>
where
    S: Read + Write,
{
    fn read_frame(&mut self) -> io::Result<Option<Bytes>> {
        read_frame_from(&mut self.stream, &mut self.buf)
    }

    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        write_frame_to(&mut self.stream, &mut self.out, frame)
    }

    fn close(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

/// Read half of a framed transport over any [`Read`] stream.
pub struct FramedReader<S> {
    stream: S,
    buf: BytesMut,
}

impl<S> FramedReader<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buf: BytesMut::new(),
        }
    }

    pub fn into_inner(self) -> (S, BytesMut) {
        (self.stream, self.buf)
    }

    pub fn peek(&self) -> &[u8] {
        &self.buf
    }
}

impl<S> FramedReader<S>
where
    S: Read,
{
    /// Reads one whole frame, blocking as needed.
    ///
    /// Returns `None` on a clean EOF at a frame boundary; EOF in the middle
    /// of a frame is an error.
    pub fn read_frame(&mut self) -> io::Result<Option<Bytes>> {
        read_frame_from(&mut self.stream, &mut self.buf)
    }
}

/// Write half of a framed transport over any [`Write`] stream.
pub struct FramedWriter<S> {
    stream: S,
    out: WriteBuf,
}

impl<S> FramedWriter<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            out: WriteBuf::new(),
        }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S> FramedWriter<S>
where
    S: Write,
{
    /// Writes one whole frame as a single stream write. Blocks until the
    /// stream accepts all of it.
    pub fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        write_frame_to(&mut self.stream, &mut self.out, frame)
    }
}

impl<S> TransportWrite for FramedWriter<S>
where
    S: Write + Send,
{
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        FramedWriter::write_frame(self, frame)
    }

    fn close(&mut self) {
        if let Err(error) = self.stream.flush() {
            debug!(%error, "Flush on close failed");
        }
    }
}

fn read_frame_from<S: Read>(stream: &mut S, buf: &mut BytesMut) -> io::Result<Option<Bytes>> {
    loop {
        if buf.len() >= FRAME_PREFIX_SIZE {
            let mut prefix = [0u8; FRAME_PREFIX_SIZE];
            prefix.copy_from_slice(&buf[..FRAME_PREFIX_SIZE]);
            let length = u32::from_le_bytes(prefix) as usize;

            if length > MAX_FRAME_SIZE {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "frame too large"));
            }

            if buf.len() >= FRAME_PREFIX_SIZE + length {
                buf.advance(FRAME_PREFIX_SIZE);
                return Ok(Some(buf.split_to(length).freeze()));
            }
        }

        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let n = stream.read(&mut chunk)?;
        buf.extend_from_slice(&chunk[..n]);

        if n == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "EOF inside a frame"));
        }
    }
}

fn write_frame_to<S: Write>(stream: &mut S, out: &mut WriteBuf, frame: &[u8]) -> io::Result<()> {
    let length =
        u32::try_from(frame.len()).map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame too large"))?;

    out.clear();
    out.write_u32(length);
    out.write_slice(frame);

    stream.write_all(out.filled())?;
    stream.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_round_trip() {
        let mut sink = Vec::new();
        {
            let mut writer = FramedWriter::new(&mut sink);
            writer.write_frame(&[1, 2, 3]).unwrap();
            writer.write_frame(&[]).unwrap();
            writer.write_frame(&[9; 300]).unwrap();
        }

        let mut reader = FramedReader::new(sink.as_slice());
        assert_eq!(reader.read_frame().unwrap().as_deref(), Some([1, 2, 3].as_slice()));
        assert_eq!(reader.read_frame().unwrap().as_deref(), Some([].as_slice()));
        assert_eq!(reader.read_frame().unwrap().as_deref(), Some([9; 300].as_slice()));
        assert_eq!(reader.read_frame().unwrap(), None);
    }

    #[test]
    fn eof_inside_a_frame_is_an_error() {
        let bytes = [10u8, 0, 0, 0, 1, 2];
        let mut reader = FramedReader::new(bytes.as_slice());
        assert!(reader.read_frame().is_err());
    }

    fn write_all_frames<T: FramedTransport>(transport: &mut T, frames: &[&[u8]]) {
        for frame in frames {
            transport.write_frame(frame).unwrap();
        }
        transport.close().unwrap();
    }

    #[test]
    fn duplex_framed_round_trips_through_the_trait() {
        let written = {
            let mut framed = Framed::new(io::Cursor::new(Vec::new()));
            write_all_frames(&mut framed, &[&[0xAB; 5], &[0xCD]]);
            framed.into_inner().0.into_inner()
        };

        let mut framed = Framed::new(io::Cursor::new(written));
        assert_eq!(framed.read_frame().unwrap().as_deref(), Some([0xAB; 5].as_slice()));
        assert_eq!(framed.read_frame().unwrap().as_deref(), Some([0xCD].as_slice()));
        assert_eq!(framed.read_frame().unwrap(), None);
    }
}
