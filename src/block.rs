//! Parses blocks inside a Matroska file.
use crate::cluster::Cluster;
use crate::ebml::{read_binary, read_bytes, read_xiph_size, SourceCursor};
use crate::enums::Lacing;
use crate::reader::ByteSource;
use crate::{DemuxError, Result};

/// A coded frame inside a block, given as a byte range of the source.
///
/// Frames don't hold any payload. Use [`Frame::read`] to copy the bytes out of
/// the source they were parsed from.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Frame {
    /// Absolute position of the first byte of the frame.
    pub pos: u64,
    /// Length of the frame in bytes.
    pub len: u64,
}

impl Frame {
    /// Copies the frame into the beginning of `buffer`.
    ///
    /// # Errors
    ///
    /// [`DemuxError::BufferTooSmall`] if the frame doesn't fit into `buffer`,
    /// otherwise the errors of the byte source.
    pub fn read<R: ByteSource + ?Sized>(&self, src: &mut R, buffer: &mut [u8]) -> Result<()> {
        let got = u64::try_from(buffer.len()).unwrap_or(u64::MAX);
        if got < self.len {
            return Err(DemuxError::BufferTooSmall {
                needed: self.len,
                got,
            });
        }
        // Fits, `len` is at most the buffer length.
        let len = usize::try_from(self.len).unwrap_or(buffer.len());
        read_bytes(src, self.pos, &mut buffer[..len])
    }

    /// Copies the frame into a new vector.
    ///
    /// # Errors
    ///
    /// Fails with the errors of the byte source.
    pub fn to_vec<R: ByteSource + ?Sized>(&self, src: &mut R) -> Result<Vec<u8>> {
        read_binary(src, self.pos, self.len)
    }

    /// Position of the first byte after the frame.
    pub const fn end(&self) -> u64 {
        self.pos + self.len
    }
}

/// A block of a SimpleBlock or BlockGroup, carrying one or more frames of a
/// single track.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    track_number: u64,
    timecode: i16,
    flags: u8,
    is_simple_block: bool,
    is_key: bool,
    discard_padding: i64,
    data_offset: u64,
    size: u64,
    frames: Vec<Frame>,
}

impl Block {
    /// Parses the block header at `data_offset` and the frame layout of the
    /// lacing. The payload must be available.
    pub(crate) fn parse<R: ByteSource + ?Sized>(
        src: &mut R,
        data_offset: u64,
        size: u64,
        is_simple_block: bool,
    ) -> Result<Self> {
        let stop = data_offset + size;
        let mut r = BlockCursor {
            inner: SourceCursor::new(src, data_offset),
            block_start: data_offset,
            stop,
        };

        let track_number = r.read_vint()?;
        if track_number == 0 {
            return Err(invalid(data_offset, "track number is zero"));
        }
        let timecode = r.read_i16()?;
        let flags = r.read_u8()?;
        let lacing: Lacing = ((flags & 0x06) >> 1).into();

        let frames = if lacing == Lacing::None {
            let pos = r.position();
            vec![Frame {
                pos,
                len: non_empty(data_offset, stop - pos)?,
            }]
        } else {
            parse_laced_frames(&mut r, lacing, data_offset)?
        };

        let is_key = is_simple_block && (flags & 0x80) == 0x80;

        Ok(Self {
            track_number,
            timecode,
            flags,
            is_simple_block,
            is_key,
            discard_padding: 0,
            data_offset,
            size,
            frames,
        })
    }

    pub(crate) fn set_key(&mut self, is_key: bool) {
        self.is_key = is_key;
    }

    pub(crate) fn set_discard_padding(&mut self, discard_padding: i64) {
        self.discard_padding = discard_padding;
    }

    /// Number of the track the block belongs to.
    pub const fn track_number(&self) -> u64 {
        self.track_number
    }

    /// Timecode relative to the timecode of the cluster, in raw ticks.
    pub const fn relative_timecode(&self) -> i16 {
        self.timecode
    }

    /// Absolute timecode of the block in raw ticks.
    pub fn timecode(&self, cluster: &Cluster) -> i64 {
        let base = i64::try_from(cluster.timecode().unwrap_or(0)).unwrap_or(i64::MAX);
        base.saturating_add(i64::from(self.timecode))
    }

    /// Absolute time of the block in nanoseconds.
    pub fn time(&self, cluster: &Cluster, timecode_scale: u64) -> i64 {
        let scale = i64::try_from(timecode_scale).unwrap_or(i64::MAX);
        self.timecode(cluster).saturating_mul(scale)
    }

    /// Whether the block can be decoded without other blocks.
    ///
    /// A SimpleBlock carries a key flag; a BlockGroup is a key frame if it
    /// doesn't reference any other block.
    pub const fn is_key(&self) -> bool {
        self.is_key
    }

    /// Whether the frames should be decoded but not displayed.
    pub const fn is_invisible(&self) -> bool {
        (self.flags & 0x08) == 0x08
    }

    /// Whether the frames may be dropped when decoding can't keep up. Only
    /// SimpleBlocks carry this flag.
    pub const fn is_discardable(&self) -> bool {
        self.is_simple_block && (self.flags & 0x01) == 0x01
    }

    /// How the frames are packed into the block.
    pub fn lacing(&self) -> Lacing {
        ((self.flags & 0x06) >> 1).into()
    }

    /// Nanoseconds of audio to discard after decoding. 0 if nothing should be discarded.
    pub const fn discard_padding(&self) -> i64 {
        self.discard_padding
    }

    /// Absolute position of the block payload.
    pub const fn position(&self) -> u64 {
        self.data_offset
    }

    /// Size of the block payload including the block header.
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Number of frames in the block.
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// The frame at `index`.
    pub fn frame(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }

    /// All frames of the block in payload order.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }
}

/// Reads the block header and never passes the end of the block.
struct BlockCursor<'a, R: ?Sized> {
    inner: SourceCursor<'a, R>,
    block_start: u64,
    stop: u64,
}

impl<'a, R: ByteSource + ?Sized> BlockCursor<'a, R> {
    const fn position(&self) -> u64 {
        self.inner.position()
    }

    fn ensure(&self, len: u64) -> Result<()> {
        if self.position() + len > self.stop {
            Err(invalid(self.block_start, "header exceeds block"))
        } else {
            Ok(())
        }
    }

    fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        self.inner.read_u8()
    }

    fn read_i16(&mut self) -> Result<i16> {
        self.ensure(2)?;
        self.inner.read_i16()
    }

    fn read_vint(&mut self) -> Result<u64> {
        self.ensure_vint()?;
        self.inner.read_vint()
    }

    fn read_signed_vint(&mut self) -> Result<i64> {
        self.ensure_vint()?;
        self.inner.read_signed_vint()
    }

    fn read_xiph_size(&mut self) -> Result<u64> {
        read_xiph_size(|| self.read_u8())
    }

    /// Checks that the width announced by the first byte fits into the block.
    fn ensure_vint(&mut self) -> Result<()> {
        self.ensure(1)?;
        let pos = self.position();
        let mut first = [0_u8];
        read_bytes(self.inner.source(), pos, &mut first)?;
        let leading_zeros = first[0].leading_zeros();
        if leading_zeros >= 8 {
            return Err(DemuxError::MalformedEncoding { pos });
        }
        self.ensure(u64::from(leading_zeros) + 1)
    }
}

fn parse_laced_frames<R: ByteSource + ?Sized>(
    r: &mut BlockCursor<'_, R>,
    lacing: Lacing,
    block_start: u64,
) -> Result<Vec<Frame>> {
    let frame_count = u64::from(r.read_u8()?) + 1;
    let mut sizes: Vec<u64> = Vec::new();

    match lacing {
        // Each size but the last is a run of 255 bytes closed by a smaller byte.
        // 765 is coded as 255;255;255;0.
        Lacing::Xiph => {
            for _ in 0..frame_count - 1 {
                sizes.push(r.read_xiph_size()?);
            }
        }
        // The first size is an unsigned vint, the following ones are range
        // shifted signed differences to the size before.
        Lacing::Ebml => {
            if frame_count > 1 {
                let mut size = r.read_vint()?;
                sizes.push(size);

                for _ in 0..frame_count.saturating_sub(2) {
                    let delta = r.read_signed_vint()?;
                    let next = i128::from(size) + i128::from(delta);
                    size = u64::try_from(next)
                        .map_err(|_| invalid(block_start, "negative EBML lace size"))?;
                    sizes.push(size);
                }
            }
        }
        // Only the frame count is stored. All frames share the same size.
        Lacing::FixedSize => {
            let data_size = r.stop - r.position();
            if data_size % frame_count != 0 {
                return Err(invalid(block_start, "fixed lace size doesn't divide the block"));
            }
            let size = data_size / frame_count;
            for _ in 0..frame_count - 1 {
                sizes.push(size);
            }
        }
        Lacing::None => {}
    }

    let header_end = r.position();
    let data_size = r.stop - header_end;
    let encoded_sizes = sizes
        .iter()
        .try_fold(0_u64, |sum, size| sum.checked_add(*size))
        .ok_or_else(|| invalid(block_start, "lace sizes overflow"))?;
    if encoded_sizes >= data_size {
        return Err(invalid(block_start, "lace sizes exceed block"));
    }
    sizes.push(data_size - encoded_sizes);

    let mut pos = header_end;
    let mut frames = Vec::with_capacity(sizes.len());
    for size in sizes {
        let len = non_empty(block_start, size)?;
        frames.push(Frame { pos, len });
        pos += len;
    }

    Ok(frames)
}

fn non_empty(block_start: u64, len: u64) -> Result<u64> {
    if len == 0 {
        Err(invalid(block_start, "empty frame"))
    } else {
        Ok(len)
    }
}

const fn invalid(pos: u64, reason: &'static str) -> DemuxError {
    DemuxError::InvalidBlock { pos, reason }
}
