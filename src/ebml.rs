//! Implement the decoding of EBML coded values.
//!
//! All functions are pure reads of the byte source at an absolute position and
//! can be repeated freely. Variable length integers carry their width in the
//! number of leading zero bits of the first byte:
//!
//! ```text
//! 1xxx xxxx                      1 byte,  7 data bits
//! 01xx xxxx xxxx xxxx            2 bytes, 14 data bits
//! ...
//! 0000 0001 xxxx xxxx (7 more)   8 bytes, 56 data bits
//! ```

use crate::element::next_element;
use crate::element_id::{ElementId, ElementType};
use crate::reader::{check_range, ByteSource};
use crate::{DemuxError, Result};

/// IDs are limited to 4 bytes in Matroska.
const MAX_ID_WIDTH: u8 = 4;

/// Sizes and other variable length integers are limited to 8 bytes.
const MAX_VINT_WIDTH: u8 = 8;

/// The decoded size of an element.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ElementSize {
    /// The size in bytes of the payload.
    Known(u64),
    /// All data bits were set. The element runs until the next element that
    /// is not one of its children, or until the end of its parent.
    Unknown,
}

impl ElementSize {
    /// Returns the size if it is known.
    pub const fn known(self) -> Option<u64> {
        match self {
            ElementSize::Known(size) => Some(size),
            ElementSize::Unknown => None,
        }
    }
}

/// Reads a variable length EBML Element ID at `pos`. Returns the ID (with its
/// marker bits) and its width in bytes.
///
/// # Errors
///
/// [`DemuxError::MalformedEncoding`] if the width is not between 1 and 4 bytes.
/// [`DemuxError::ShortRead`] if the ID is not completely available yet.
pub fn read_id<R: ByteSource + ?Sized>(src: &mut R, pos: u64) -> Result<(u32, u8)> {
    let (bytes, width) = read_vint_bytes(src, pos, MAX_ID_WIDTH)?;
    let id = bytes[..usize::from(width)]
        .iter()
        .fold(0_u32, |id, byte| (id << 8) | u32::from(*byte));
    Ok((id, width))
}

/// Reads a variable length EBML data size at `pos`. Returns the size and its
/// width in bytes.
///
/// # Errors
///
/// [`DemuxError::MalformedEncoding`] if the first byte is zero.
/// [`DemuxError::ShortRead`] if the size is not completely available yet.
pub fn read_size<R: ByteSource + ?Sized>(src: &mut R, pos: u64) -> Result<(ElementSize, u8)> {
    let (value, width) = read_vint(src, pos)?;
    if value == vint_max(width) {
        Ok((ElementSize::Unknown, width))
    } else {
        Ok((ElementSize::Known(value), width))
    }
}

/// Reads an unsigned variable length integer at `pos` with its marker bit
/// removed. Returns the value and its width in bytes.
///
/// # Errors
///
/// [`DemuxError::MalformedEncoding`] if the first byte is zero.
/// [`DemuxError::ShortRead`] if the integer is not completely available yet.
pub fn read_vint<R: ByteSource + ?Sized>(src: &mut R, pos: u64) -> Result<(u64, u8)> {
    let (bytes, width) = read_vint_bytes(src, pos, MAX_VINT_WIDTH)?;
    let marker_mask = 0xFF_u8.checked_shr(u32::from(width)).unwrap_or(0);
    let value = bytes[1..usize::from(width)]
        .iter()
        .fold(u64::from(bytes[0] & marker_mask), |value, byte| {
            (value << 8) | u64::from(*byte)
        });
    Ok((value, width))
}

/// Reads a signed variable length integer at `pos` as used by EBML lacing.
/// The value is range shifted: half of the range lies below zero.
///
/// # Errors
///
/// See [`read_vint`].
pub fn read_signed_vint<R: ByteSource + ?Sized>(src: &mut R, pos: u64) -> Result<(i64, u8)> {
    let (value, width) = read_vint(src, pos)?;
    let bias = (1_i64 << (7 * u32::from(width) - 1)) - 1;
    let value = i64::try_from(value).map_err(|_| DemuxError::MalformedEncoding { pos })?;
    Ok((value - bias, width))
}

/// Reads a big-endian unsigned integer of `size` bytes. A size of 0 is the value 0.
///
/// # Errors
///
/// [`DemuxError::UnsupportedWidth`] if `size` is larger than 8.
pub fn read_uint<R: ByteSource + ?Sized>(src: &mut R, pos: u64, size: u64) -> Result<u64> {
    let bytes = read_int_bytes(src, pos, size)?;
    Ok(bytes.iter().fold(0_u64, |value, byte| (value << 8) | u64::from(*byte)))
}

/// Reads a big-endian two's complement integer of `size` bytes.
///
/// # Errors
///
/// [`DemuxError::UnsupportedWidth`] if `size` is larger than 8.
pub fn read_int<R: ByteSource + ?Sized>(src: &mut R, pos: u64, size: u64) -> Result<i64> {
    let bytes = read_int_bytes(src, pos, size)?;
    if bytes.is_empty() {
        return Ok(0);
    }
    let mut buffer = if bytes[0] & 0x80 == 0x80 {
        [0xFF_u8; 8]
    } else {
        [0_u8; 8]
    };
    buffer[8 - bytes.len()..].copy_from_slice(&bytes);
    Ok(i64::from_be_bytes(buffer))
}

/// Reads a big-endian IEEE 754 float. Only 4 and 8 byte floats exist in EBML.
///
/// # Errors
///
/// [`DemuxError::UnsupportedWidth`] for every other size.
pub fn read_float<R: ByteSource + ?Sized>(src: &mut R, pos: u64, size: u64) -> Result<f64> {
    let value = match size {
        4 => {
            let mut bytes = [0_u8; 4];
            read_bytes(src, pos, &mut bytes)?;
            f64::from(f32::from_be_bytes(bytes))
        }
        8 => {
            let mut bytes = [0_u8; 8];
            read_bytes(src, pos, &mut bytes)?;
            f64::from_be_bytes(bytes)
        }
        _ => return Err(DemuxError::UnsupportedWidth(size)),
    };
    Ok(value)
}

/// Reads an UTF-8 string. Trailing zero bytes are padding and are dropped.
///
/// # Errors
///
/// [`DemuxError::Utf8`] if the string is not valid UTF-8.
pub fn read_string<R: ByteSource + ?Sized>(src: &mut R, pos: u64, size: u64) -> Result<String> {
    let mut bytes = read_binary(src, pos, size)?;
    while bytes.last() == Some(&0) {
        let _ = bytes.pop();
    }
    let value = String::from_utf8(bytes)?;
    Ok(value)
}

/// Copies `size` bytes of binary payload.
///
/// # Errors
///
/// Fails if the bytes can't be read from the source.
pub fn read_binary<R: ByteSource + ?Sized>(src: &mut R, pos: u64, size: u64) -> Result<Vec<u8>> {
    let length = src.length()?;
    check_range(length, pos, size)?;
    let len = usize::try_from(size).map_err(|_| DemuxError::UnsupportedWidth(size))?;
    let mut bytes = vec![0_u8; len];
    src.read(pos, &mut bytes)?;
    Ok(bytes)
}

pub(crate) fn read_bytes<R: ByteSource + ?Sized>(
    src: &mut R,
    pos: u64,
    buf: &mut [u8],
) -> Result<()> {
    let length = src.length()?;
    check_range(length, pos, u64::try_from(buf.len()).unwrap_or(u64::MAX))?;
    src.read(pos, buf)
}

/// Largest value of a variable length integer of the given width. Reserved
/// for the unknown size.
const fn vint_max(width: u8) -> u64 {
    (1_u64 << (7 * width)) - 1
}

fn read_int_bytes<R: ByteSource + ?Sized>(src: &mut R, pos: u64, size: u64) -> Result<Vec<u8>> {
    if size > 8 {
        return Err(DemuxError::UnsupportedWidth(size));
    }
    read_binary(src, pos, size)
}

/// Reads the raw bytes of a variable length integer, including the marker bit.
fn read_vint_bytes<R: ByteSource + ?Sized>(
    src: &mut R,
    pos: u64,
    max_width: u8,
) -> Result<([u8; 8], u8)> {
    let mut bytes = [0_u8; 8];
    read_bytes(src, pos, &mut bytes[..1])?;

    let leading_zeros = bytes[0].leading_zeros();
    if leading_zeros >= u32::from(max_width) {
        return Err(DemuxError::MalformedEncoding { pos });
    }
    // At most 8, checked above.
    let width =
        u8::try_from(leading_zeros + 1).map_err(|_| DemuxError::MalformedEncoding { pos })?;

    if width > 1 {
        let length = src.length()?;
        let end = pos + u64::from(width);
        if length.total.is_some_and(|total| end > total) {
            return Err(DemuxError::MalformedEncoding { pos });
        }
        read_bytes(src, pos + 1, &mut bytes[1..usize::from(width)])?;
    }

    Ok((bytes, width))
}

/// A forward reading cursor over a byte source, used for the small headers
/// inside block payloads.
pub(crate) struct SourceCursor<'a, R: ?Sized> {
    src: &'a mut R,
    pos: u64,
}

impl<'a, R: ByteSource + ?Sized> SourceCursor<'a, R> {
    pub(crate) fn new(src: &'a mut R, pos: u64) -> Self {
        Self { src, pos }
    }

    pub(crate) const fn position(&self) -> u64 {
        self.pos
    }

    pub(crate) fn source(&mut self) -> &mut R {
        self.src
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8> {
        let mut byte = [0_u8];
        read_bytes(self.src, self.pos, &mut byte)?;
        self.pos += 1;
        Ok(byte[0])
    }

    pub(crate) fn read_i16(&mut self) -> Result<i16> {
        let mut bytes = [0_u8; 2];
        read_bytes(self.src, self.pos, &mut bytes)?;
        self.pos += 2;
        Ok(i16::from_be_bytes(bytes))
    }

    pub(crate) fn read_vint(&mut self) -> Result<u64> {
        let (value, width) = read_vint(self.src, self.pos)?;
        self.pos += u64::from(width);
        Ok(value)
    }

    pub(crate) fn read_signed_vint(&mut self) -> Result<i64> {
        let (value, width) = read_signed_vint(self.src, self.pos)?;
        self.pos += u64::from(width);
        Ok(value)
    }

    pub(crate) fn read_xiph_size(&mut self) -> Result<u64> {
        read_xiph_size(|| self.read_u8())
    }
}

/// Reads a Xiph lacing size: a run of 255 bytes ended by a smaller byte.
pub(crate) fn read_xiph_size(mut next_byte: impl FnMut() -> Result<u8>) -> Result<u64> {
    let mut size: u64 = 0;
    loop {
        let val = next_byte()?;
        size += u64::from(val);

        match val {
            255 => continue,
            _ => break,
        }
    }

    Ok(size)
}

/// The data an element can contain.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum ElementData {
    /// Unknown element. Returns the Element ID.
    Unknown(u32),
    /// Returns the offset and size of the data of master and binary elements.
    Location { offset: u64, size: u64 },
    /// Unsigned integer.
    Unsigned(u64),
    /// Signed integer.
    Signed(i64),
    /// Float.
    Float(f64),
    /// Date.
    Date(i64),
    /// String.
    String(String),
}

/// Collects the direct children of the master element whose data lies at
/// `offset..offset + size`. Values are decoded according to their type.
pub(crate) fn collect_children<R: ByteSource + ?Sized>(
    src: &mut R,
    offset: u64,
    size: u64,
) -> Result<Vec<(ElementId, ElementData)>> {
    let end = offset + size;
    let mut children = Vec::new();
    let mut pos = offset;

    while pos < end {
        let header = next_element(src, pos, Some(end))?;
        let Some(size) = header.size.known() else {
            return Err(DemuxError::UnexpectedUnknownSize {
                id: header.id,
                pos,
            });
        };
        let offset = header.data_offset;
        let element_id = header.element_id();

        let data = match element_id.element_type() {
            ElementType::Unknown => ElementData::Unknown(header.id),
            ElementType::Master | ElementType::Binary => ElementData::Location { offset, size },
            ElementType::Unsigned => ElementData::Unsigned(read_uint(src, offset, size)?),
            ElementType::Signed => ElementData::Signed(read_int(src, offset, size)?),
            ElementType::Float => ElementData::Float(read_float(src, offset, size)?),
            ElementType::Date => ElementData::Date(read_int(src, offset, size)?),
            ElementType::String => ElementData::String(read_string(src, offset, size)?),
        };
        children.push((element_id, data));

        pos = offset + size;
    }

    Ok(children)
}

pub(crate) fn try_find_unsigned(fields: &[(ElementId, ElementData)], id: ElementId) -> Option<u64> {
    fields.iter().find_map(|(element_id, data)| match data {
        ElementData::Unsigned(value) if *element_id == id => Some(*value),
        _ => None,
    })
}

pub(crate) fn try_find_float(fields: &[(ElementId, ElementData)], id: ElementId) -> Option<f64> {
    fields.iter().find_map(|(element_id, data)| match data {
        ElementData::Float(value) if *element_id == id => Some(*value),
        _ => None,
    })
}

pub(crate) fn try_find_date(fields: &[(ElementId, ElementData)], id: ElementId) -> Option<i64> {
    fields.iter().find_map(|(element_id, data)| match data {
        ElementData::Date(value) if *element_id == id => Some(*value),
        _ => None,
    })
}

pub(crate) fn try_find_string(
    fields: &[(ElementId, ElementData)],
    id: ElementId,
) -> Option<String> {
    fields.iter().find_map(|(element_id, data)| match data {
        ElementData::String(value) if *element_id == id => Some(value.clone()),
        _ => None,
    })
}

/// Returns the offset and size of the first master or binary child with the given ID.
pub(crate) fn try_find_location(
    fields: &[(ElementId, ElementData)],
    id: ElementId,
) -> Option<(u64, u64)> {
    find_locations(fields, id).next()
}

/// Returns the offset and size of all master or binary children with the given ID.
pub(crate) fn find_locations(
    fields: &[(ElementId, ElementData)],
    id: ElementId,
) -> impl Iterator<Item = (u64, u64)> + '_ {
    fields.iter().filter_map(move |(element_id, data)| match data {
        ElementData::Location { offset, size } if *element_id == id => Some((*offset, *size)),
        _ => None,
    })
}
