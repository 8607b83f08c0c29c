use bytes::{Buf, BytesMut};
use std::io;

const READ_CHUNK: usize = 4096;

/// Outcome of draining a reader into a buffer.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Ingress {
    /// The reader has no more data for now. Carries the number of bytes read.
    Drained(usize),
    /// The peer closed its end of the stream. Carries the number of bytes read before that.
    Closed(usize),
}

/// A growable FIFO byte queue with an upper size limit. Data is appended at the tail and consumed
/// from the head.
pub struct Buffer {
    data: BytesMut,
    limit: usize,
}

impl Buffer {
    #[inline]
    pub fn new(limit: usize) -> Buffer {
        Buffer {
            data: BytesMut::new(),
            limit,
        }
    }

    /// The number of unconsumed bytes in the buffer.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Maximum number of unconsumed bytes the buffer accepts.
    #[inline]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Slice containing the unconsumed data.
    #[inline]
    pub fn read_slice(&self) -> &[u8] {
        &self.data[..]
    }

    /// Marks `count` bytes at the head as consumed.
    #[inline]
    pub fn move_head(&mut self, count: usize) {
        let count = count.min(self.data.len());
        self.data.advance(count);
    }

    /// Removes and returns the first `count` bytes.
    #[inline]
    pub fn split_head(&mut self, count: usize) -> BytesMut {
        let count = count.min(self.data.len());
        self.data.split_to(count)
    }

    #[inline]
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Appends data at the tail.
    #[inline]
    pub fn extend(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Write the contents of the buffer to the supplied writer, advancing the read offset. A
    /// `WouldBlock` error leaves the unwritten remainder in place.
    #[inline]
    pub fn egress<W: io::Write>(&mut self, mut writer: W) -> io::Result<usize> {
        let orig_len = self.len();

        while !self.is_empty() {
            let write_count = writer.write(self.read_slice())?;

            if write_count == 0 {
                return Err(io::ErrorKind::WriteZero.into());
            }

            self.move_head(write_count);
        }

        Ok(orig_len - self.len())
    }

    /// Read in all the data the supplied reader has to offer.
    #[inline]
    pub fn ingress<R: io::Read>(&mut self, mut reader: R) -> io::Result<Ingress> {
        let mut chunk = [0u8; READ_CHUNK];
        let mut total = 0;

        loop {
            if self.len() > self.limit {
                return Err(io::Error::new(io::ErrorKind::Other, "Buffer overrun"));
            }

            match reader.read(&mut chunk) {
                Ok(0) => return Ok(Ingress::Closed(total)),
                Ok(count) => {
                    self.extend(&chunk[..count]);
                    total += count;
                }
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(Ingress::Drained(total)),
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }
}
