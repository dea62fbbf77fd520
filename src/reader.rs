//! Byte sources the demuxer reads from.
//!
//! The demuxer never owns the bytes it parses. Every parse step receives a
//! [`ByteSource`] and addresses it by absolute position, so a source that
//! grows while it is being parsed (a download, a live stream) can be handed
//! in again once more bytes arrived.

use std::io::{Read, Seek, SeekFrom};

use crate::{DemuxError, Result};

/// Total and currently available length of a byte source.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Length {
    /// The total length, `None` while the end of the stream is not known yet.
    pub total: Option<u64>,
    /// How many bytes, counted from position 0, can be read right now.
    pub available: u64,
}

impl Length {
    /// Length of a source that is completely available.
    pub const fn complete(len: u64) -> Self {
        Self {
            total: Some(len),
            available: len,
        }
    }
}

/// Random access to the bytes of a WebM file.
pub trait ByteSource {
    /// Fills `buf` with the bytes starting at `pos`.
    ///
    /// # Errors
    ///
    /// Fails with [`DemuxError::ShortRead`] if the bytes are not available yet
    /// and with [`DemuxError::OutOfRange`] if they lie beyond the end of the source.
    fn read(&mut self, pos: u64, buf: &mut [u8]) -> Result<()>;

    /// Reports the total and the currently available length.
    ///
    /// # Errors
    ///
    /// Fails if the underlying storage can't be queried.
    fn length(&mut self) -> Result<Length>;
}

impl<S: ByteSource + ?Sized> ByteSource for &mut S {
    fn read(&mut self, pos: u64, buf: &mut [u8]) -> Result<()> {
        (**self).read(pos, buf)
    }

    fn length(&mut self) -> Result<Length> {
        (**self).length()
    }
}

impl ByteSource for [u8] {
    fn read(&mut self, pos: u64, buf: &mut [u8]) -> Result<()> {
        let length = Length::complete(as_u64(self.len()));
        check_range(length, pos, as_u64(buf.len()))?;
        let start = as_usize(pos);
        buf.copy_from_slice(&self[start..start + buf.len()]);
        Ok(())
    }

    fn length(&mut self) -> Result<Length> {
        Ok(Length::complete(as_u64(self.len())))
    }
}

impl ByteSource for &[u8] {
    fn read(&mut self, pos: u64, buf: &mut [u8]) -> Result<()> {
        check_range(Length::complete(as_u64(self.len())), pos, as_u64(buf.len()))?;
        let start = as_usize(pos);
        buf.copy_from_slice(&self[start..start + buf.len()]);
        Ok(())
    }

    fn length(&mut self) -> Result<Length> {
        Ok(Length::complete(as_u64(self.len())))
    }
}

impl ByteSource for Vec<u8> {
    fn read(&mut self, pos: u64, buf: &mut [u8]) -> Result<()> {
        self.as_mut_slice().read(pos, buf)
    }

    fn length(&mut self) -> Result<Length> {
        Ok(Length::complete(as_u64(self.len())))
    }
}

/// Checks a read of `len` bytes at `pos` against `length`.
///
/// # Errors
///
/// [`DemuxError::OutOfRange`] when the range passes the total length,
/// [`DemuxError::ShortRead`] when it passes the available length.
pub(crate) fn check_range(length: Length, pos: u64, len: u64) -> Result<()> {
    let end = pos.saturating_add(len);
    if let Some(total) = length.total {
        if end > total {
            return Err(DemuxError::OutOfRange { pos, len, total });
        }
    }
    if end > length.available {
        return Err(DemuxError::ShortRead {
            pos,
            len,
            available: length.available,
        });
    }
    Ok(())
}

/// An in-memory source that is filled while it is parsed.
///
/// Bytes are appended with [`StreamBuffer::push`], and the end of the stream
/// becomes known once [`StreamBuffer::finish`] is called. Until then the total
/// length is reported as unknown.
#[derive(Clone, Debug, Default)]
pub struct StreamBuffer {
    data: Vec<u8>,
    finished: bool,
}

impl StreamBuffer {
    /// Creates an empty, unfinished stream.
    pub const fn new() -> Self {
        Self {
            data: Vec::new(),
            finished: false,
        }
    }

    /// Appends bytes to the end of the stream.
    pub fn push(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Marks the stream as complete. The total length becomes known.
    pub fn finish(&mut self) {
        self.finished = true;
    }

    /// Returns `true` once the stream was marked as complete.
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// The bytes received so far.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    fn current_length(&self) -> Length {
        let available = as_u64(self.data.len());
        Length {
            total: self.finished.then_some(available),
            available,
        }
    }
}

impl ByteSource for StreamBuffer {
    fn read(&mut self, pos: u64, buf: &mut [u8]) -> Result<()> {
        check_range(self.current_length(), pos, as_u64(buf.len()))?;
        let start = as_usize(pos);
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        Ok(())
    }

    fn length(&mut self) -> Result<Length> {
        Ok(self.current_length())
    }
}

/// Adapts any `Read + Seek` implementation, for example a `File`.
///
/// The whole stream counts as available.
#[derive(Debug)]
pub struct IoSource<R> {
    inner: R,
    len: Option<u64>,
}

impl<R: Read + Seek> IoSource<R> {
    /// Wraps a reader.
    pub const fn new(inner: R) -> Self {
        Self { inner, len: None }
    }

    /// Returns the wrapped reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> ByteSource for IoSource<R> {
    fn read(&mut self, pos: u64, buf: &mut [u8]) -> Result<()> {
        let length = self.length()?;
        check_range(length, pos, as_u64(buf.len()))?;
        let _ = self.inner.seek(SeekFrom::Start(pos))?;
        self.inner.read_exact(buf)?;
        Ok(())
    }

    fn length(&mut self) -> Result<Length> {
        let len = match self.len {
            Some(len) => len,
            None => {
                let len = self.inner.seek(SeekFrom::End(0))?;
                self.len = Some(len);
                len
            }
        };
        Ok(Length::complete(len))
    }
}

#[allow(clippy::as_conversions)]
const fn as_u64(len: usize) -> u64 {
    len as u64
}

// Only called after `check_range`, so the position fits into memory.
#[allow(clippy::as_conversions)]
const fn as_usize(pos: u64) -> usize {
    pos as usize
}
