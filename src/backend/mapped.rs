//! Memory-mapped backend: the file is divided into fixed 16 MiB slabs,
//! each mapped independently. Used below `Config::nio_max_size`; above
//! it callers fall back to `BufferedBackend`.
//!
//! Grounded on the memory-mapping crate usage common across the
//! storage-engine corpus (e.g. `memmap2` in `cyberlife-coder-velesdb`'s
//! `storage/mmap.rs` and `omendb-omen`'s `page_manager.rs`); the teacher
//! itself has no mapped variant, only the always-buffered `pager::Pager`.

use super::{Error, RandomAccessBackend};
use memmap2::{MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

const SLAB_LEN: u64 = 16 * 1024 * 1024;

struct Slab {
    map: MmapMut,
}

pub struct MappedBackend {
    file: File,
    read_only: bool,
    position: u64,
    length: u64,
    slabs: Vec<Option<Slab>>,
}

impl MappedBackend {
    pub fn open<P: AsRef<Path>>(path: P, read_only: bool) -> Result<Self, Error> {
        let file = OpenOptions::new()
            .read(true)
            .write(!read_only)
            .create(!read_only)
            .open(path)?;
        let length = file.metadata()?.len();
        let n_slabs = ((length + SLAB_LEN - 1) / SLAB_LEN) as usize;
        let mut slabs = Vec::with_capacity(n_slabs);
        slabs.resize_with(n_slabs, || None);
        Ok(MappedBackend {
            file,
            read_only,
            position: 0,
            length,
            slabs,
        })
    }

    fn slab_index(pos: u64) -> (usize, usize) {
        ((pos / SLAB_LEN) as usize, (pos % SLAB_LEN) as usize)
    }

    fn ensure_mapped(&mut self, idx: usize) -> Result<(), Error> {
        if idx < self.slabs.len() && self.slabs[idx].is_some() {
            return Ok(());
        }
        if idx >= self.slabs.len() {
            self.slabs.resize_with(idx + 1, || None);
        }
        let map = unsafe {
            MmapOptions::new()
                .offset(idx as u64 * SLAB_LEN)
                .len(SLAB_LEN as usize)
                .map_mut(&self.file)
                .map_err(|e| Error::MappingFailed(e.to_string()))?
        };
        self.slabs[idx] = Some(Slab { map });
        Ok(())
    }

    fn span(&mut self, start: u64, len: usize) -> Result<(), Error> {
        let end = start + len as u64;
        if end > self.length {
            return Err(Error::EndOfFile);
        }
        Ok(())
    }
}

impl RandomAccessBackend for MappedBackend {
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
        self.span(self.position, buf.len())?;
        let mut pos = self.position;
        let mut written = 0usize;
        while written < buf.len() {
            let (idx, off) = Self::slab_index(pos);
            self.ensure_mapped(idx)?;
            let slab = self.slabs[idx].as_ref().unwrap();
            let avail = (SLAB_LEN as usize) - off;
            let n = avail.min(buf.len() - written);
            buf[written..written + n].copy_from_slice(&slab.map[off..off + n]);
            written += n;
            pos += n as u64;
        }
        self.position += buf.len() as u64;
        Ok(())
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<(), Error> {
        if self.read_only {
            return Err(Error::ReadOnly);
        }
        self.ensure_length(self.position + buf.len() as u64)?;
        let mut pos = self.position;
        let mut written = 0usize;
        while written < buf.len() {
            let (idx, off) = Self::slab_index(pos);
            self.ensure_mapped(idx)?;
            let slab = self.slabs[idx].as_mut().unwrap();
            let avail = (SLAB_LEN as usize) - off;
            let n = avail.min(buf.len() - written);
            slab.map[off..off + n].copy_from_slice(&buf[written..written + n]);
            written += n;
            pos += n as u64;
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
        let new_len = super::round_up_extension(pos);
        // Drop existing maps before extending: on some OSes a file must
        // not be extended while mapped regions overlapping the old tail
        // are held open for write, and re-mapping after growth is simpler
        // than trying to remap in place.
        self.slabs.clear();
        self.file
            .seek(SeekFrom::Start(new_len - 1))
            .map_err(Error::IoFailure)?;
        // Write a single zero byte at the new end so the file is extended
        // before any slab covering it is mapped.
        self.file.write_all(&[0u8]).map_err(Error::IoFailure)?;
        self.length = new_len;
        let n_slabs = ((new_len + SLAB_LEN - 1) / SLAB_LEN) as usize;
        self.slabs.resize_with(n_slabs, || None);
        Ok(true)
    }

    fn set_length(&mut self, len: u64) -> Result<bool, Error> {
        if self.read_only {
            return Err(Error::ReadOnly);
        }
        self.slabs.clear();
        self.file.set_len(len).map_err(Error::IoFailure)?;
        self.length = len;
        let n_slabs = ((len + SLAB_LEN - 1) / SLAB_LEN) as usize;
        self.slabs.resize_with(n_slabs, || None);
        Ok(true)
    }

    fn sync(&mut self) -> Result<(), Error> {
        for slab in self.slabs.iter().flatten() {
            // Best-effort: a flush failure on one slab should not stop
            // the others from being flushed; a descriptor-level fsync
            // follows regardless.
            let _ = slab.map.flush();
        }
        self.file.sync_all().map_err(Error::IoFailure)
    }
}

impl Drop for MappedBackend {
    fn drop(&mut self) {
        // Best-effort unmap; failures here are swallowed. Callers must
        // not assume the file is immediately re-openable by another
        // process.
        for slab in self.slabs.iter_mut() {
            if let Some(s) = slab.take() {
                let _ = s.map.flush();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RandomAccessBackend;

    #[test]
    fn write_then_read_within_one_slab() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut b = MappedBackend::open(tmp.path(), false).unwrap();
        b.write_at(0, b"slab test data").unwrap();
        let mut out = [0u8; 14];
        b.read_at(0, &mut out).unwrap();
        assert_eq!(&out, b"slab test data");
    }

    #[test]
    fn write_spanning_slab_boundary() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut b = MappedBackend::open(tmp.path(), false).unwrap();
        let boundary = SLAB_LEN - 4;
        let payload = [0xAB_u8; 16];
        b.write_at(boundary, &payload).unwrap();
        let mut out = [0u8; 16];
        b.read_at(boundary, &mut out).unwrap();
        assert_eq!(out, payload);
    }
}
