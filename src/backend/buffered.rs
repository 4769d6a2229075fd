//! Buffered backend: a single aligned window mirroring part of the file,
//! generalizing the teacher's `pager::Pager` (which cached whole pages in
//! a `Vec<Option<Vec<u8>>>` but never wrote). This variant keeps one
//! `BUFFER_LEN`-sized window and patches it on overlapping writes.

use super::{round_up_extension, Error, RandomAccessBackend};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

const BUFFER_LEN: usize = 1 << 13;

pub struct BufferedBackend {
    file: File,
    read_only: bool,
    position: u64,
    length: u64,
    buffer: Vec<u8>,
    buffer_offset: u64,
    buffer_valid_len: usize,
}

impl BufferedBackend {
    pub fn open<P: AsRef<Path>>(path: P, read_only: bool) -> Result<Self, Error> {
        Self::open_with_buffer(path, read_only, BUFFER_LEN)
    }

    /// Like `open`, but with the window sized to `buffer_len` bytes
    /// instead of the built-in default; `Config::page_size` is the
    /// usual source of that size.
    pub fn open_with_buffer<P: AsRef<Path>>(path: P, read_only: bool, buffer_len: usize) -> Result<Self, Error> {
        let file = OpenOptions::new()
            .read(true)
            .write(!read_only)
            .create(!read_only)
            .open(path)?;
        let length = file.metadata()?.len();
        Ok(BufferedBackend {
            file,
            read_only,
            position: 0,
            length,
            buffer: vec![0u8; buffer_len.max(1)],
            buffer_offset: 0,
            buffer_valid_len: 0,
        })
    }

    fn invalidate_buffer(&mut self) {
        self.buffer_valid_len = 0;
    }

    fn refill_buffer(&mut self, at: u64) -> Result<(), Error> {
        self.file.seek(SeekFrom::Start(at)).map_err(|e| {
            self.invalidate_buffer();
            Error::IoFailure(e)
        })?;
        let want = self.buffer.len().min((self.length.saturating_sub(at)) as usize);
        let n = self.file.read(&mut self.buffer[..want]).map_err(|e| {
            self.invalidate_buffer();
            Error::IoFailure(e)
        })?;
        self.buffer_offset = at;
        self.buffer_valid_len = n;
        Ok(())
    }

    fn remeasure_on_error(&mut self) {
        self.invalidate_buffer();
        if let Ok(m) = self.file.metadata() {
            self.length = m.len();
        }
    }
}

impl RandomAccessBackend for BufferedBackend {
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
        self.read_only
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        let start = self.position;
        let end = start + buf.len() as u64;
        if end > self.length {
            return Err(Error::EndOfFile);
        }
        // Serve from the buffer window if fully contained; otherwise
        // refill the window to start at `start` and re-check.
        let in_window = self.buffer_valid_len > 0
            && start >= self.buffer_offset
            && end <= self.buffer_offset + self.buffer_valid_len as u64;
        if !in_window {
            self.refill_buffer(start).map_err(|e| {
                self.remeasure_on_error();
                e
            })?;
        }
        let rel = (start - self.buffer_offset) as usize;
        if rel + buf.len() > self.buffer_valid_len {
            return Err(Error::EndOfFile);
        }
        buf.copy_from_slice(&self.buffer[rel..rel + buf.len()]);
        self.position += buf.len() as u64;
        Ok(())
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<(), Error> {
        if self.read_only {
            return Err(Error::ReadOnly);
        }
        let start = self.position;
        self.file.seek(SeekFrom::Start(start)).map_err(|e| {
            self.remeasure_on_error();
            Error::IoFailure(e)
        })?;
        self.file.write_all(buf).map_err(|e| {
            self.remeasure_on_error();
            Error::IoFailure(e)
        })?;
        let end = start + buf.len() as u64;
        if end > self.length {
            self.length = end;
        }
        // Patch the in-memory window if the write overlaps it, so
        // subsequent reads observe the new bytes without a re-fill.
        if self.buffer_valid_len > 0 {
            let win_start = self.buffer_offset;
            let win_end = self.buffer_offset + self.buffer_valid_len as u64;
            if start < win_end && end > win_start {
                let copy_start = start.max(win_start);
                let copy_end = end.min(win_end);
                let src_off = (copy_start - start) as usize;
                let dst_off = (copy_start - win_start) as usize;
                let n = (copy_end - copy_start) as usize;
                self.buffer[dst_off..dst_off + n]
                    .copy_from_slice(&buf[src_off..src_off + n]);
            }
        }
        self.position += buf.len() as u64;
        Ok(())
    }

    fn ensure_length(&mut self, pos: u64) -> Result<bool, Error> {
        if pos <= self.length {
            return Ok(false);
        }
        if self.read_only {
            return Err(Error::ReadOnly);
        }
        let new_len = round_up_extension(pos);
        self.set_length(new_len)?;
        Ok(true)
    }

    fn set_length(&mut self, len: u64) -> Result<bool, Error> {
        if self.read_only {
            return Err(Error::ReadOnly);
        }
        self.file.set_len(len).map_err(|e| {
            self.remeasure_on_error();
            Error::IoFailure(e)
        })?;
        self.length = len;
        self.invalidate_buffer();
        Ok(true)
    }

    fn sync(&mut self) -> Result<(), Error> {
        self.file.sync_all().map_err(Error::IoFailure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RandomAccessBackend;

    #[test]
    fn write_then_read_back_through_buffer() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut b = BufferedBackend::open(tmp.path(), false).unwrap();
        b.ensure_length(4096).unwrap();
        b.write_at(100, b"hello, world").unwrap();
        let mut out = [0u8; 12];
        b.read_at(100, &mut out).unwrap();
        assert_eq!(&out, b"hello, world");
    }

    #[test]
    fn write_patches_cached_window() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut b = BufferedBackend::open(tmp.path(), false).unwrap();
        b.ensure_length(4096).unwrap();
        b.write_at(0, &[0u8; 4096]).unwrap();
        let mut warm = [0u8; 4];
        b.read_at(0, &mut warm).unwrap(); // warms the window at offset 0
        b.write_at(10, b"AB").unwrap();
        let mut out = [0u8; 2];
        b.read_at(10, &mut out).unwrap();
        assert_eq!(&out, b"AB");
    }

    #[test]
    fn read_past_end_is_error() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut b = BufferedBackend::open(tmp.path(), false).unwrap();
        let mut out = [0u8; 4];
        assert!(matches!(b.read_at(0, &mut out), Err(Error::EndOfFile)));
    }

    #[test]
    fn read_only_backend_rejects_writes() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        {
            let mut b = BufferedBackend::open(tmp.path(), false).unwrap();
            b.ensure_length(16).unwrap();
        }
        let mut ro = BufferedBackend::open(tmp.path(), true).unwrap();
        assert!(matches!(ro.write_at(0, b"x"), Err(Error::ReadOnly)));
    }

    #[test]
    fn custom_buffer_size_still_serves_reads_correctly() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut b = BufferedBackend::open_with_buffer(tmp.path(), false, 64).unwrap();
        b.ensure_length(256).unwrap();
        b.write_at(10, b"small window").unwrap();
        let mut out = [0u8; 12];
        b.read_at(10, &mut out).unwrap();
        assert_eq!(&out, b"small window");
    }

    #[test]
    fn growth_rounds_up_per_heuristic() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut b = BufferedBackend::open(tmp.path(), false).unwrap();
        b.ensure_length(100).unwrap();
        assert_eq!(b.len().unwrap(), crate::backend::round_up_extension(100));
    }
}
