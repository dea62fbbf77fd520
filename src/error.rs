//! Demux errors.

use std::string::FromUtf8Error;

/// Either returns the error or logs it, depending on how severe the anomaly is
/// compared to the configured fail level of `$state`.
macro_rules! log_or_err {
    ($state:expr, $level:expr, $err:expr $(,)?) => {{
        let err = $err;
        if $level <= $state.fail_level {
            return Err(err);
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}", err),
                ::log::Level::Warn => ::log::warn!("{}", err),
                ::log::Level::Info => ::log::info!("{}", err),
                ::log::Level::Debug => ::log::debug!("{}", err),
                ::log::Level::Trace => ::log::trace!("{}", err),
            }
        }
    }};
}

/// How strictly anomalies in the file are treated.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Strictness {
    /// Anomalies of this severity or worse are returned as errors.
    pub(crate) fail_level: log::Level,
}

/// Errors that can occur when demuxing WebM and Matroska files.
#[derive(thiserror::Error, Debug)]
pub enum DemuxError {
    /// The framing bits of a variable length integer are invalid.
    #[error("malformed EBML encoding at byte {pos}")]
    MalformedEncoding {
        /// Position of the first byte of the broken encoding.
        pos: u64,
    },

    /// An element declares more payload than is currently available.
    /// Retry once more bytes have arrived.
    #[error("element at byte {pos} ends at {end}, but only {available} bytes are available")]
    TruncatedElement {
        /// Position of the element header.
        pos: u64,
        /// Declared end of the element payload.
        end: u64,
        /// Bytes currently available from the source.
        available: u64,
    },

    /// A read addressed bytes that have not arrived yet. Retry later.
    #[error("read of {len} bytes at {pos} exceeds the {available} available bytes")]
    ShortRead {
        /// Start of the read.
        pos: u64,
        /// Length of the read.
        len: u64,
        /// Bytes currently available from the source.
        available: u64,
    },

    /// A read addressed bytes beyond the logical end of the source.
    #[error("read of {len} bytes at {pos} exceeds the total length {total}")]
    OutOfRange {
        /// Start of the read.
        pos: u64,
        /// Length of the read.
        len: u64,
        /// Total length of the source.
        total: u64,
    },

    /// The input does not start with an EBML header.
    #[error("not a WebM/Matroska file: found ID {0:#X} instead of the EBML magic")]
    NotWebm(u32),

    /// A block references a track number that no track entry declares.
    #[error("block references unknown track number {0}")]
    UnknownTrackReference(u64),

    /// A value has a width the decoder does not support.
    #[error("unsupported value width of {0} bytes")]
    UnsupportedWidth(u64),

    /// A child element reaches past the end of its parent.
    #[error("element {id:#X} at byte {pos} reaches past its parent ending at {parent_end}")]
    ElementOverrun {
        /// ID of the offending element.
        id: u32,
        /// Position of the offending element.
        pos: u64,
        /// End of the parent element.
        parent_end: u64,
    },

    /// A different element was found than the one that was expected.
    #[error("expected element {expected:#X}, found {found:#X}")]
    UnexpectedElement {
        /// The expected element ID.
        expected: u32,
        /// The element ID that was found.
        found: u32,
    },

    /// An element with unknown size was found where only sized elements can be skipped.
    #[error("element {id:#X} at byte {pos} has an unknown size")]
    UnexpectedUnknownSize {
        /// ID of the element.
        id: u32,
        /// Position of the element.
        pos: u64,
    },

    /// A block header or its lacing is structurally invalid.
    #[error("invalid block at byte {pos}: {reason}")]
    InvalidBlock {
        /// Position of the block payload.
        pos: u64,
        /// What is wrong with the block.
        reason: &'static str,
    },

    /// A track entry is missing mandatory fields and was rejected.
    #[error("rejected track entry at byte {pos}: {reason}")]
    InvalidTrackEntry {
        /// Position of the track entry.
        pos: u64,
        /// Why the entry was rejected.
        reason: &'static str,
    },

    /// Two track entries declare the same track number.
    #[error("duplicate track number {0}")]
    DuplicateTrackNumber(u64),

    /// A cluster carries more than one timecode element.
    #[error("cluster at byte {pos} repeats its timecode, {previous} is replaced by {timecode}")]
    RepeatedTimecode {
        /// Position of the cluster.
        pos: u64,
        /// The timecode read before.
        previous: u64,
        /// The timecode that replaces it.
        timecode: u64,
    },

    /// An element that should not be zero is zero.
    #[error("value of element {0:#X} must not be zero")]
    NonZeroValueIsZero(u32),

    /// The doc type is neither "webm" nor "matroska".
    #[error("unsupported doc type: {0}")]
    UnsupportedDocType(String),

    /// The file needs a newer EBML or doc type reader than this one.
    #[error("unsupported read version {0}")]
    UnsupportedEbmlVersion(u64),

    /// The destination buffer can't hold the frame.
    #[error("buffer of {got} bytes is too small for a frame of {needed} bytes")]
    BufferTooSmall {
        /// Length of the frame.
        needed: u64,
        /// Length of the buffer.
        got: u64,
    },

    /// A `std::io::Error`.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A string element is not valid UTF-8.
    #[error(transparent)]
    Utf8(#[from] FromUtf8Error),
}

impl DemuxError {
    /// Returns `true` if the operation can be retried once the byte source
    /// has more data available.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ShortRead { .. } | Self::TruncatedElement { .. })
    }
}
