//! Shadow (incremental backup) log.
//!
//! Before a page in the data file is first overwritten within a backup
//! window, its prior contents are appended here as a `{pageSize,
//! pageOffset, bytes}` record. Replaying every record restores the
//! pages to their pre-window state.

use crate::backend::RandomAccessBackend;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("I/O failure: {0}")]
    IoFailure(#[from] crate::backend::Error),
    #[error("read past end of shadow log")]
    EndOfFile,
}

const RECORD_HEADER_LEN: u64 = 4 + 8; // u32 page_size + u64 original_offset

pub struct ShadowLog {
    dest: Box<dyn RandomAccessBackend>,
    page_size: u32,
    max_size: u64,
    /// One bit per page number touched by the current backup window.
    bitmap: Vec<bool>,
    /// Current end of the destination backend (append position).
    saved_length: u64,
    /// The durable prefix as of the last `synch()`; this is what
    /// `backup_reader` streams out and what `restore_file` should be
    /// pointed at after a crash.
    synch_length: u64,
}

impl ShadowLog {
    pub fn new(dest: Box<dyn RandomAccessBackend>, page_size: u32, max_size: u64) -> Self {
        let n_pages = ((max_size + page_size as u64 - 1) / page_size as u64) as usize;
        ShadowLog {
            dest,
            page_size,
            max_size,
            bitmap: vec![false; n_pages],
            saved_length: 0,
            synch_length: 0,
        }
    }

    fn page_of(&self, offset: u64) -> u64 {
        offset / self.page_size as u64
    }

    /// Ensures every page touched by `[file_offset, file_offset + size)`
    /// has a before-image recorded, reading missing ones from `source`.
    /// Returns the number of pages newly written to the shadow log.
    pub fn copy(
        &mut self,
        source: &mut dyn RandomAccessBackend,
        file_offset: u64,
        size: u64,
    ) -> Result<u32, Error> {
        let end = (file_offset + size).min(self.max_size);
        if end <= file_offset {
            return Ok(0);
        }
        let first_page = self.page_of(file_offset);
        let last_page = self.page_of(end.saturating_sub(1).max(file_offset));
        // Page 0 is always included in the first call of a window.
        let first_page = if self.saved_length == 0 { 0 } else { first_page };

        let mut written = 0u32;
        for pn in first_page..=last_page {
            let idx = pn as usize;
            if idx >= self.bitmap.len() || self.bitmap[idx] {
                continue;
            }
            let page_offset = pn * self.page_size as u64;
            let src_len = source.len()?;
            let avail = src_len.saturating_sub(page_offset).min(self.page_size as u64) as usize;
            let mut page_buf = vec![0u8; self.page_size as usize];
            if avail > 0 {
                match source.read_at(page_offset, &mut page_buf[..avail]) {
                    Ok(()) => {}
                    Err(e) => return Err(self.fail_and_rollback(e.into())),
                }
            }
            let prior_len = self.saved_length;
            if let Err(e) = self.append_record(page_offset, &page_buf) {
                // Roll back: the bit was never set, truncate destination
                // to the length it had before this record.
                let _ = self.dest.set_length(prior_len);
                self.saved_length = prior_len;
                let _ = self.dest.sync();
                return Err(e);
            }
            self.bitmap[idx] = true;
            written += 1;
        }
        Ok(written)
    }

    fn append_record(&mut self, page_offset: u64, page: &[u8]) -> Result<(), Error> {
        self.dest.seek(self.saved_length)?;
        self.dest.write_u32(self.page_size)?;
        self.dest.write_u64(page_offset)?;
        self.dest.write_all(page)?;
        self.saved_length += RECORD_HEADER_LEN + page.len() as u64;
        Ok(())
    }

    fn fail_and_rollback(&mut self, e: Error) -> Error {
        let _ = self.dest.set_length(self.saved_length);
        let _ = self.dest.sync();
        e
    }

    /// Forces the destination to disk and advances the durable prefix.
    /// Once this returns, `[0, synch_length)` is sufficient to restore
    /// from, regardless of any subsequent crash.
    pub fn synch(&mut self) -> Result<(), Error> {
        self.dest.sync()?;
        self.synch_length = self.saved_length;
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), Error> {
        self.dest.sync()?;
        Ok(())
    }

    pub fn synch_length(&self) -> u64 {
        self.synch_length
    }

    /// A streaming view of the durable backup prefix, for online backup.
    pub fn backup_reader(&mut self) -> BackupReader<'_> {
        BackupReader {
            dest: self.dest.as_mut(),
            pos: 0,
            limit: self.synch_length,
        }
    }

    /// Replays shadow-log records from `source` (a shadow log file,
    /// positioned at its start) onto `dest` (the live data file),
    /// restoring pre-window contents. Tolerates a trailing truncated
    /// record (an incomplete backup window) by stopping at the last
    /// complete one.
    pub fn restore_file(
        source: &mut dyn RandomAccessBackend,
        dest: &mut dyn RandomAccessBackend,
    ) -> Result<u32, Error> {
        let mut pos = 0u64;
        let total = source.len()?;
        let mut restored = 0u32;
        loop {
            if pos + RECORD_HEADER_LEN > total {
                break;
            }
            source.seek(pos)?;
            let page_size = match source.read_u32() {
                Ok(v) => v,
                Err(_) => break,
            };
            let original_offset = match source.read_u64() {
                Ok(v) => v,
                Err(_) => break,
            };
            if pos + RECORD_HEADER_LEN + page_size as u64 > total {
                break; // trailing truncated record
            }
            let mut page = vec![0u8; page_size as usize];
            if source.read_exact(&mut page).is_err() {
                break;
            }
            dest.write_at(original_offset, &page)?;
            restored += 1;
            pos += RECORD_HEADER_LEN + page_size as u64;
        }
        dest.sync()?;
        Ok(restored)
    }
}

/// Bounds reads to `[0, limit)` of the wrapped backend, regardless of how
/// much has since been appended past `limit`.
pub struct BackupReader<'a> {
    dest: &'a mut dyn RandomAccessBackend,
    pos: u64,
    limit: u64,
}

impl<'a> std::io::Read for BackupReader<'a> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let remaining = self.limit.saturating_sub(self.pos);
        if remaining == 0 {
            return Ok(0);
        }
        let n = (buf.len() as u64).min(remaining) as usize;
        self.dest
            .read_at(self.pos, &mut buf[..n])
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        self.pos += n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::buffered::BufferedBackend;
    use std::io::Read;

    fn temp_backend() -> BufferedBackend {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        // Leak the path's lifetime by keeping the tempfile alive in the
        // caller; for these tests we only need the backend, so persist.
        let (_file, path) = tmp.keep().unwrap();
        BufferedBackend::open(path, false).unwrap()
    }

    #[test]
    fn backup_then_restore_reverts_overwrite() {
        let mut source = temp_backend();
        source.ensure_length(8192).unwrap();
        let page0 = vec![0xAA; 4096];
        let page1 = vec![0xBB; 4096];
        source.write_at(0, &page0).unwrap();
        source.write_at(4096, &page1).unwrap();

        let dest = temp_backend();
        let mut shadow = ShadowLog::new(Box::new(dest), 4096, 1 << 20);

        // Before overwriting page 1 (bytes [4096,8192)), capture its
        // before-image.
        let written = shadow.copy(&mut source, 4096, 4096).unwrap();
        assert!(written >= 1);
        shadow.synch().unwrap();

        // Simulate the actual overwrite on the source/data file.
        source.write_at(4096, &[0xFFu8; 4096]).unwrap();

        // "Crash" here; replay the shadow log onto a scratch copy and
        // confirm page 1 reverts to 0xBB while page 0 is untouched.
        let mut shadow_file = temp_backend();
        // Re-derive a standalone reader over the shadow log's own bytes
        // by writing them out through the ShadowLog's append path above;
        // instead of re-opening, read back via backup_reader and replay
        // manually.
        let mut buf = Vec::new();
        shadow.backup_reader().read_to_end(&mut buf).unwrap();
        shadow_file.write_at(0, &buf).unwrap();

        ShadowLog::restore_file(&mut shadow_file, &mut source).unwrap();

        let mut check = vec![0u8; 4096];
        source.read_at(4096, &mut check).unwrap();
        assert_eq!(check, page1);
        let mut check0 = vec![0u8; 4096];
        source.read_at(0, &mut check0).unwrap();
        assert_eq!(check0, page0);
    }

    #[test]
    fn page_not_recopied_once_bit_set() {
        let mut source = temp_backend();
        source.ensure_length(4096).unwrap();
        source.write_at(0, &[1u8; 4096]).unwrap();
        let dest = temp_backend();
        let mut shadow = ShadowLog::new(Box::new(dest), 4096, 1 << 20);
        let w1 = shadow.copy(&mut source, 0, 4096).unwrap();
        let w2 = shadow.copy(&mut source, 0, 4096).unwrap();
        assert_eq!(w1, 1);
        assert_eq!(w2, 0);
    }
}
