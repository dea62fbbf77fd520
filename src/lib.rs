#![warn(missing_docs)]
#![deny(unused_results)]
#![deny(clippy::as_conversions)]
#![deny(clippy::panic)]
#![deny(clippy::unwrap_used)]
//! A demuxer for WebM and Matroska files that parses lazily and can resume
//! on sources that are still growing.
//!
//! The demuxer never owns the bytes. Every operation receives a
//! [`ByteSource`], so a [`StreamBuffer`] can be filled between two calls.
//! Operations that fail with a retryable error (see
//! [`DemuxError::is_retryable`]) leave the parser as it was and can be
//! repeated once more bytes are available.
//!
//! ```no_run
//! use std::fs::File;
//!
//! use webm_demuxer::{EbmlHeader, IoSource, Segment};
//!
//! # fn main() -> Result<(), webm_demuxer::DemuxError> {
//! let mut src = IoSource::new(File::open("video.webm")?);
//! let (_header, segment_pos) = EbmlHeader::parse(&mut src, 0)?;
//! let mut segment = Segment::new(&mut src, segment_pos)?;
//! segment.load(&mut src)?;
//! let scale = segment.timecode_scale();
//!
//! let mut index = 0;
//! while let Some(cluster) = segment.get_cluster(&mut src, index)? {
//!     cluster.parse_to_end(&mut src)?;
//!     for entry in cluster.entries() {
//!         let block = entry.block();
//!         for frame in block.frames() {
//!             let data = frame.to_vec(&mut src)?;
//!             println!(
//!                 "track {} at {} ns: {} bytes",
//!                 block.track_number(),
//!                 block.time(cluster, scale),
//!                 data.len()
//!             );
//!         }
//!     }
//!     index += 1;
//! }
//! # Ok(())
//! # }
//! ```

#[macro_use]
mod error;

mod block;
mod cluster;
pub mod ebml;
pub mod element;
mod element_id;
mod enums;
mod reader;
mod segment;
mod tracks;

pub use block::{Block, Frame};
pub use cluster::{BlockEntry, BlockGroup, Cluster, EntryKind, ParseState, ParseStatus};
pub use ebml::ElementSize;
pub use element::ElementHeader;
pub use element_id::ElementId;
pub use enums::*;
pub use error::DemuxError;
pub use reader::{ByteSource, IoSource, Length, StreamBuffer};
pub use segment::{SeekEntry, Segment, SegmentInfo};
pub use tracks::{AudioTrack, Track, TrackKind, Tracks, VideoTrack};

use crate::ebml::{collect_children, read_bytes, try_find_string, try_find_unsigned};
use crate::element::next_element;

type Result<T> = std::result::Result<T, DemuxError>;

/// The EBML header of the file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EbmlHeader {
    version: u64,
    read_version: u64,
    max_id_length: u64,
    max_size_length: u64,
    doc_type: String,
    doc_type_version: u64,
    doc_type_read_version: u64,
}

impl EbmlHeader {
    /// Parses the EBML header at `pos` and checks that this demuxer can read
    /// the file. Returns the header and the position of the element after it,
    /// usually the Segment.
    ///
    /// # Errors
    ///
    /// [`DemuxError::NotWebm`] if the EBML magic is missing,
    /// [`DemuxError::UnsupportedDocType`] and
    /// [`DemuxError::UnsupportedEbmlVersion`] for files that need a
    /// different reader.
    pub fn parse<R: ByteSource + ?Sized>(src: &mut R, pos: u64) -> Result<(Self, u64)> {
        let mut magic = [0_u8; 4];
        read_bytes(src, pos, &mut magic)?;
        let magic = u32::from_be_bytes(magic);
        if magic != ElementId::Ebml.id() {
            return Err(DemuxError::NotWebm(magic));
        }

        let header = next_element(src, pos, None)?;
        let Some(size) = header.size.known() else {
            return Err(DemuxError::UnexpectedUnknownSize {
                id: header.id,
                pos,
            });
        };
        let fields = collect_children(src, header.data_offset, size)?;

        let ebml_header = Self {
            version: try_find_unsigned(&fields, ElementId::EbmlVersion).unwrap_or(1),
            read_version: try_find_unsigned(&fields, ElementId::EbmlReadVersion).unwrap_or(1),
            max_id_length: try_find_unsigned(&fields, ElementId::EbmlMaxIdLength).unwrap_or(4),
            max_size_length: try_find_unsigned(&fields, ElementId::EbmlMaxSizeLength)
                .unwrap_or(8),
            doc_type: try_find_string(&fields, ElementId::DocType)
                .unwrap_or_else(|| "matroska".to_owned()),
            doc_type_version: try_find_unsigned(&fields, ElementId::DocTypeVersion).unwrap_or(1),
            doc_type_read_version: try_find_unsigned(&fields, ElementId::DocTypeReadVersion)
                .unwrap_or(1),
        };
        ebml_header.validate()?;

        Ok((ebml_header, header.data_offset + size))
    }

    fn validate(&self) -> Result<()> {
        if self.read_version > 1 {
            return Err(DemuxError::UnsupportedEbmlVersion(self.read_version));
        }
        if self.doc_type != "webm" && self.doc_type != "matroska" {
            return Err(DemuxError::UnsupportedDocType(self.doc_type.clone()));
        }
        if self.doc_type_read_version == 0 || self.doc_type_read_version > 4 {
            return Err(DemuxError::UnsupportedEbmlVersion(
                self.doc_type_read_version,
            ));
        }
        if self.max_id_length == 0 || self.max_id_length > 4 {
            return Err(DemuxError::UnsupportedWidth(self.max_id_length));
        }
        if self.max_size_length == 0 || self.max_size_length > 8 {
            return Err(DemuxError::UnsupportedWidth(self.max_size_length));
        }
        Ok(())
    }

    /// The EBML version used to create the file.
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// The minimum EBML version a parser has to support to read this file.
    pub const fn read_version(&self) -> u64 {
        self.read_version
    }

    /// The maximum length of the IDs you'll find in this file (4 or less in Matroska).
    pub const fn max_id_length(&self) -> u64 {
        self.max_id_length
    }

    /// The maximum length of the sizes you'll find in this file (8 or less in Matroska).
    pub const fn max_size_length(&self) -> u64 {
        self.max_size_length
    }

    /// A string that describes the type of document, "webm" or "matroska".
    pub fn doc_type(&self) -> &str {
        &self.doc_type
    }

    /// The version of the doc type writer used to create the file.
    pub const fn doc_type_version(&self) -> u64 {
        self.doc_type_version
    }

    /// The minimum doc type version a parser has to support to read this file.
    pub const fn doc_type_read_version(&self) -> u64 {
        self.doc_type_read_version
    }
}
