//! Frames single EBML elements: ID, size and the byte range of the payload.

use crate::ebml::{read_id, read_size, ElementSize};
use crate::element_id::ElementId;
use crate::reader::ByteSource;
use crate::{DemuxError, Result};

/// The header of an EBML element and where its payload lies.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ElementHeader {
    /// The raw element ID.
    pub id: u32,
    /// The declared payload size.
    pub size: ElementSize,
    /// Position of the first byte of the ID.
    pub position: u64,
    /// Position of the first payload byte.
    pub data_offset: u64,
    /// End of the payload. For elements of unknown size this is the end of
    /// the parent (or of the stream), and `None` if that is not known either.
    pub data_end: Option<u64>,
}

impl ElementHeader {
    /// The known element this header belongs to.
    pub const fn element_id(&self) -> ElementId {
        ElementId::from_id(self.id)
    }

    /// Number of bytes used by the ID and the size.
    pub const fn header_len(&self) -> u64 {
        self.data_offset - self.position
    }

    /// End of the element, only if its size is known.
    pub const fn known_end(&self) -> Option<u64> {
        match self.size {
            ElementSize::Known(size) => Some(self.data_offset + size),
            ElementSize::Unknown => None,
        }
    }
}

/// Reads the header of the element at `pos`. `parent_end` is the end of the
/// enclosing element, `None` if it is unbounded.
///
/// Only the header bytes have to be available. Use this for elements which
/// are parsed incrementally, like Segments and Clusters.
///
/// # Errors
///
/// [`DemuxError::MalformedEncoding`] for invalid ID or size encodings,
/// [`DemuxError::ShortRead`] if the header is not available yet and
/// [`DemuxError::ElementOverrun`] if the element reaches past its parent.
pub fn read_header<R: ByteSource + ?Sized>(
    src: &mut R,
    pos: u64,
    parent_end: Option<u64>,
) -> Result<ElementHeader> {
    let (id, id_width) = read_id(src, pos)?;
    let size_pos = pos + u64::from(id_width);
    let (size, size_width) = read_size(src, size_pos)?;
    let data_offset = size_pos + u64::from(size_width);

    let data_end = match size {
        ElementSize::Known(size) => Some(
            data_offset
                .checked_add(size)
                .ok_or(DemuxError::MalformedEncoding { pos: size_pos })?,
        ),
        ElementSize::Unknown => match parent_end {
            Some(end) => Some(end),
            None => src.length()?.total,
        },
    };

    if let Some(parent_end) = parent_end {
        let overruns = data_offset > parent_end || data_end.is_some_and(|end| end > parent_end);
        if overruns {
            return Err(DemuxError::ElementOverrun {
                id,
                pos,
                parent_end,
            });
        }
    }

    Ok(ElementHeader {
        id,
        size,
        position: pos,
        data_offset,
        data_end,
    })
}

/// Reads the header of the element at `pos` and makes sure its complete
/// payload is available.
///
/// # Errors
///
/// Everything [`read_header`] fails with, [`DemuxError::TruncatedElement`] if
/// the payload did not arrive completely yet and [`DemuxError::OutOfRange`] if
/// the payload reaches past the end of the stream.
pub fn next_element<R: ByteSource + ?Sized>(
    src: &mut R,
    pos: u64,
    parent_end: Option<u64>,
) -> Result<ElementHeader> {
    let header = read_header(src, pos, parent_end)?;
    require_payload(src, &header)?;
    Ok(header)
}

/// Makes sure the payload of an element with a known size is available.
pub(crate) fn require_payload<R: ByteSource + ?Sized>(
    src: &mut R,
    header: &ElementHeader,
) -> Result<()> {
    let (Some(end), Some(size)) = (header.known_end(), header.size.known()) else {
        return Ok(());
    };

    let length = src.length()?;
    if let Some(total) = length.total {
        if end > total {
            return Err(DemuxError::OutOfRange {
                pos: header.data_offset,
                len: size,
                total,
            });
        }
    }
    if end > length.available {
        return Err(DemuxError::TruncatedElement {
            pos: header.position,
            end,
            available: length.available,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::reader::StreamBuffer;

    use super::*;

    #[test]
    fn test_parse_master_element() {
        let mut data: Vec<u8> = vec![0x1A, 0x45, 0xDF, 0xA3, 0xA2];
        let header = read_header(&mut data, 0, None).unwrap();
        assert_eq!(header.element_id(), ElementId::Ebml);
        assert_eq!(header.size, ElementSize::Known(34));
        assert_eq!(header.data_offset, 5);
        assert_eq!(header.data_end, Some(39));
        assert_eq!(header.header_len(), 5);
    }

    #[test]
    fn test_unknown_size_runs_to_parent_end() {
        let mut data: Vec<u8> = vec![0x1F, 0x43, 0xB6, 0x75, 0xFF, 0xE7, 0x81, 0x00];
        let header = read_header(&mut data, 0, Some(8)).unwrap();
        assert_eq!(header.size, ElementSize::Unknown);
        assert_eq!(header.data_end, Some(8));
        assert_eq!(header.known_end(), None);

        // Without a parent the end of the stream bounds the element.
        let header = read_header(&mut data, 0, None).unwrap();
        assert_eq!(header.data_end, Some(8));
    }

    #[test]
    fn test_element_overrun() {
        let mut data: Vec<u8> = vec![0xE7, 0x84, 0x00, 0x00, 0x00, 0x01];
        let err = read_header(&mut data, 0, Some(4)).unwrap_err();
        assert!(matches!(err, DemuxError::ElementOverrun { id: 0xE7, .. }));
    }

    #[test]
    fn test_truncated_element_is_retryable() {
        let mut stream = StreamBuffer::new();
        stream.push(&[0xA3, 0x85, 0x81, 0x00]);

        let header = read_header(&mut stream, 0, None).unwrap();
        assert_eq!(header.data_end, Some(7));

        let err = next_element(&mut stream, 0, None).unwrap_err();
        assert!(matches!(
            err,
            DemuxError::TruncatedElement {
                pos: 0,
                end: 7,
                available: 4
            }
        ));
        assert!(err.is_retryable());

        stream.push(&[0x00, 0x80, 0x01]);
        let header = next_element(&mut stream, 0, None).unwrap();
        assert_eq!(header.element_id(), ElementId::SimpleBlock);
    }

    #[test]
    fn test_truncated_at_end_of_stream_is_fatal() {
        let mut data: Vec<u8> = vec![0xA3, 0x85, 0x81, 0x00];
        let err = next_element(&mut data, 0, None).unwrap_err();
        assert!(matches!(err, DemuxError::OutOfRange { .. }));
        assert!(!err.is_retryable());
    }
}
