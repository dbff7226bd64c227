//! Byte-counting stream wrappers.
//!
//! Every byte that moves through a [`MeteredReader`] or [`MeteredWriter`] is
//! counted. The counters are the only record of how much payload has been
//! transferred, which is what the header framing relies on.
//!
//! Fixed-width integers go through `byteorder`'s `ReadBytesExt` /
//! `WriteBytesExt`, which both wrappers get for free by implementing
//! `Read`/`Write`. The caller names the on-disk order (always
//! `LittleEndian` for EFC) and the bytes are swapped on hosts whose native
//! order differs.

use std::io::{self, Read, Seek, SeekFrom, Write};

/// A reader that counts bytes and can enforce a read ceiling.
///
/// Once the ceiling is reached, reads return `Ok(0)` without touching the
/// inner reader, even if it still has data. This lets the header parser and
/// the payload decoder share one stream when a container is followed by
/// unrelated trailing bytes.
#[derive(Debug)]
pub struct MeteredReader<R> {
    inner: R,
    read_count: u64,
    /// 0 means unlimited
    read_limit: u64,
    limit_reached: bool,
    saved_pos: u64,
}

impl<R> MeteredReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            read_count: 0,
            read_limit: 0,
            limit_reached: false,
            saved_pos: 0,
        }
    }

    /// Bytes read since construction or the last reset
    pub fn read_count(&self) -> u64 {
        self.read_count
    }

    /// Clear the counter and remove any ceiling
    pub fn reset_count(&mut self) {
        self.read_count = 0;
        self.read_limit = 0;
        self.limit_reached = false;
    }

    /// Reset the counter and install a ceiling of `limit` bytes (0 = unlimited)
    pub fn set_limit(&mut self, limit: u64) {
        self.reset_count();
        self.read_limit = limit;
    }

    pub fn limit_reached(&self) -> bool {
        self.limit_reached
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Seek> MeteredReader<R> {
    /// Bookmark the current position of the underlying source
    pub fn save_pos(&mut self) -> io::Result<()> {
        self.saved_pos = self.inner.stream_position()?;
        Ok(())
    }

    /// Rewind to the last bookmark. Counters are left untouched.
    pub fn restore_pos(&mut self) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(self.saved_pos))?;
        Ok(())
    }

    /// Bytes between the current position and the end of the source
    pub fn remaining_len(&mut self) -> io::Result<u64> {
        self.save_pos()?;
        let end = self.inner.seek(SeekFrom::End(0))?;
        let remaining = end.saturating_sub(self.saved_pos);
        self.restore_pos()?;
        Ok(remaining)
    }
}

impl<R: Read> Read for MeteredReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut want = buf.len();
        if self.read_limit != 0 {
            if self.limit_reached {
                return Ok(0);
            }
            let remaining = self.read_limit - self.read_count;
            want = want.min(usize::try_from(remaining).unwrap_or(usize::MAX));
        }
        if want == 0 {
            return Ok(0);
        }

        let got = self.inner.read(&mut buf[..want])?;
        self.read_count += got as u64;
        if self.read_limit != 0 && self.read_count >= self.read_limit {
            self.limit_reached = true;
        }
        Ok(got)
    }
}

impl<R: Seek> Seek for MeteredReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

/// A writer that counts every byte accepted by the inner writer.
#[derive(Debug)]
pub struct MeteredWriter<W> {
    inner: W,
    write_count: u64,
    saved_pos: u64,
}

impl<W> MeteredWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            write_count: 0,
            saved_pos: 0,
        }
    }

    /// Bytes written since construction or the last reset
    pub fn write_count(&self) -> u64 {
        self.write_count
    }

    pub fn reset_count(&mut self) {
        self.write_count = 0;
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Seek> MeteredWriter<W> {
    pub fn save_pos(&mut self) -> io::Result<()> {
        self.saved_pos = self.inner.stream_position()?;
        Ok(())
    }

    pub fn restore_pos(&mut self) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(self.saved_pos))?;
        Ok(())
    }
}

impl<W: Write> Write for MeteredWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.write_count += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Seek> Seek for MeteredWriter<W> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}
