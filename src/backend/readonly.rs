//! A read-only backend over any in-memory or streamed `Read + Seek`
//! source.
//!
//! Generic rather than tied to one packaging format: reading a
//! packaged resource or a replayed backup image is better served by
//! wrapping whatever `Read + Seek` the caller already has (a mapped JAR
//! entry, a `Cursor<Vec<u8>>`, a `File`) than by hard-coding one of them.

use super::{Error, RandomAccessBackend};
use std::io::{Read, Seek, SeekFrom};

pub struct ReadOnlyBackend<R> {
    inner: R,
    position: u64,
    length: u64,
}

impl<R: Read + Seek> ReadOnlyBackend<R> {
    pub fn new(mut inner: R) -> Result<Self, Error> {
        let length = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;
        Ok(ReadOnlyBackend {
            inner,
            position: 0,
            length,
        })
    }
}

impl<R: Read + Seek> RandomAccessBackend for ReadOnlyBackend<R> {
    fn len(&mut self) -> Result<u64, Error> {
        Ok(self.length)
    }

    fn seek(&mut self, pos: u64) -> Result<(), Error> {
        self.position = pos;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        if self.position + buf.len() as u64 > self.length {
            return Err(Error::EndOfFile);
        }
        self.inner.seek(SeekFrom::Start(self.position))?;
        self.inner.read_exact(buf)?;
        self.position += buf.len() as u64;
        Ok(())
    }

    fn write_all(&mut self, _buf: &[u8]) -> Result<(), Error> {
        Err(Error::ReadOnly)
    }

    fn ensure_length(&mut self, pos: u64) -> Result<bool, Error> {
        if pos <= self.length {
            Ok(false)
        } else {
            Err(Error::ReadOnly)
        }
    }

    fn set_length(&mut self, _len: u64) -> Result<bool, Error> {
        Err(Error::ReadOnly)
    }

    fn sync(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_from_in_memory_source() {
        let data = b"some backed up bytes".to_vec();
        let mut b = ReadOnlyBackend::new(Cursor::new(data)).unwrap();
        let mut out = [0u8; 4];
        b.read_at(5, &mut out).unwrap();
        assert_eq!(&out, b"back");
    }

    #[test]
    fn writes_rejected() {
        let mut b = ReadOnlyBackend::new(Cursor::new(vec![0u8; 8])).unwrap();
        assert!(matches!(b.write_at(0, b"x"), Err(Error::ReadOnly)));
    }
}
