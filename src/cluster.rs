//! Clusters and their block entries.
//!
//! A cluster is parsed lazily, one child element per [`Cluster::parse`] call.
//! A call that fails with a retryable error leaves the cluster untouched, so
//! the caller can hand in the grown byte source and call again.

use log::{trace, Level};

use crate::block::Block;
use crate::ebml::{read_int, read_uint, ElementSize};
use crate::element::{read_header, require_payload, ElementHeader};
use crate::element_id::ElementId;
use crate::reader::ByteSource;
use crate::{DemuxError, Result};

/// Outcome of a single [`Cluster::parse`] step.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParseStatus {
    /// One child element was consumed.
    Consumed {
        /// Position of the consumed element.
        pos: u64,
        /// Length of the consumed element including its header.
        len: u64,
    },
    /// The cluster has no more children.
    Exhausted,
}

/// How far a cluster has been parsed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParseState {
    /// No child was parsed yet.
    Unparsed,
    /// Some children were parsed, more may follow.
    Partial,
    /// All children were parsed. The end of the cluster is known.
    Exhausted,
}

/// A cluster of blocks inside a segment.
#[derive(Clone, Debug)]
pub struct Cluster {
    index: usize,
    position: u64,
    data_offset: u64,
    size: ElementSize,
    parent_end: Option<u64>,
    timecode: Option<u64>,
    cursor: u64,
    end: Option<u64>,
    state: ParseState,
    entries: Vec<BlockEntry>,
    pub(crate) fail_level: Level,
}

impl Cluster {
    pub(crate) fn new(
        index: usize,
        header: &ElementHeader,
        parent_end: Option<u64>,
        fail_level: Level,
    ) -> Self {
        Self {
            index,
            position: header.position,
            data_offset: header.data_offset,
            size: header.size,
            parent_end,
            timecode: None,
            cursor: header.data_offset,
            end: header.known_end(),
            state: ParseState::Unparsed,
            entries: Vec::new(),
            fail_level,
        }
    }

    /// Parses the next child element of the cluster.
    ///
    /// Timecodes update the cluster, SimpleBlocks and BlockGroups become
    /// block entries, everything else is skipped. A cluster of unknown size
    /// ends at the first element that belongs to the segment level.
    ///
    /// # Errors
    ///
    /// Retryable errors if the next element is not completely available yet,
    /// the cluster is unchanged in that case. Every other error is terminal
    /// and parsing must not be continued.
    pub fn parse<R: ByteSource + ?Sized>(&mut self, src: &mut R) -> Result<ParseStatus> {
        if self.state == ParseState::Exhausted {
            return Ok(ParseStatus::Exhausted);
        }

        let bound = self.bound(src)?;
        if bound.is_some_and(|bound| self.cursor >= bound) {
            self.finish();
            return Ok(ParseStatus::Exhausted);
        }

        let pos = self.cursor;
        let header = read_header(src, pos, bound)?;
        let element_id = header.element_id();
        if self.size == ElementSize::Unknown && element_id.ends_cluster() {
            self.finish();
            return Ok(ParseStatus::Exhausted);
        }

        let (len, entry) = match (element_id, header.size) {
            (ElementId::BlockGroup, ElementSize::Unknown) => {
                let (group, end) = BlockGroup::parse(src, header.data_offset, None, bound)?;
                (end - pos, Some(EntryKind::BlockGroup(group)))
            }
            (_, ElementSize::Unknown) => {
                return Err(DemuxError::UnexpectedUnknownSize {
                    id: header.id,
                    pos,
                })
            }
            (_, ElementSize::Known(size)) => {
                require_payload(src, &header)?;
                let entry = match element_id {
                    ElementId::Timestamp => {
                        let timecode = read_uint(src, header.data_offset, size)?;
                        if let Some(previous) = self.timecode {
                            log_or_err!(
                                self,
                                Level::Info,
                                DemuxError::RepeatedTimecode {
                                    pos: self.position,
                                    previous,
                                    timecode,
                                }
                            );
                        }
                        self.timecode = Some(timecode);
                        None
                    }
                    ElementId::SimpleBlock => Some(EntryKind::SimpleBlock(Block::parse(
                        src,
                        header.data_offset,
                        size,
                        true,
                    )?)),
                    ElementId::BlockGroup => {
                        let end = header.data_offset + size;
                        let (group, _) =
                            BlockGroup::parse(src, header.data_offset, Some(end), bound)?;
                        Some(EntryKind::BlockGroup(group))
                    }
                    _ => {
                        trace!("Skipping element {:#X} at {} in cluster", header.id, pos);
                        None
                    }
                };
                (header.header_len() + size, entry)
            }
        };

        if let Some(kind) = entry {
            self.entries.push(BlockEntry {
                index: self.entries.len(),
                position: pos,
                size: len,
                kind,
            });
        }
        self.cursor = pos + len;
        self.state = ParseState::Partial;

        Ok(ParseStatus::Consumed { pos, len })
    }

    /// Parses the remaining children of the cluster.
    ///
    /// # Errors
    ///
    /// See [`Cluster::parse`]. Entries parsed before a failing step are kept.
    pub fn parse_to_end<R: ByteSource + ?Sized>(&mut self, src: &mut R) -> Result<()> {
        while self.parse(src)? != ParseStatus::Exhausted {}
        Ok(())
    }

    /// The entry at `index`, parsing the cluster as far as needed.
    /// Returns `None` once the cluster is exhausted before `index`.
    ///
    /// # Errors
    ///
    /// See [`Cluster::parse`].
    pub fn get_entry<R: ByteSource + ?Sized>(
        &mut self,
        src: &mut R,
        index: usize,
    ) -> Result<Option<&BlockEntry>> {
        while self.entries.len() <= index {
            if self.parse(src)? == ParseStatus::Exhausted {
                break;
            }
        }
        Ok(self.entries.get(index))
    }

    /// The first entry of the cluster.
    ///
    /// # Errors
    ///
    /// See [`Cluster::parse`].
    pub fn first<R: ByteSource + ?Sized>(&mut self, src: &mut R) -> Result<Option<&BlockEntry>> {
        self.get_entry(src, 0)
    }

    /// The entry following the entry at `index`.
    ///
    /// # Errors
    ///
    /// See [`Cluster::parse`].
    pub fn next<R: ByteSource + ?Sized>(
        &mut self,
        src: &mut R,
        index: usize,
    ) -> Result<Option<&BlockEntry>> {
        self.get_entry(src, index + 1)
    }

    /// Index of the cluster inside its segment.
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Position of the cluster element.
    pub const fn position(&self) -> u64 {
        self.position
    }

    /// Position of the first child element.
    pub const fn data_offset(&self) -> u64 {
        self.data_offset
    }

    /// The declared size of the cluster payload.
    pub const fn size(&self) -> ElementSize {
        self.size
    }

    /// End of the cluster. Known from the start for sized clusters, and
    /// once the cluster is exhausted for clusters of unknown size.
    pub const fn end(&self) -> Option<u64> {
        self.end
    }

    /// The timecode of the cluster in raw ticks, once it was parsed.
    pub const fn timecode(&self) -> Option<u64> {
        self.timecode
    }

    /// The timecode of the cluster in nanoseconds.
    pub fn time(&self, timecode_scale: u64) -> Option<u64> {
        self.timecode
            .map(|timecode| timecode.saturating_mul(timecode_scale))
    }

    /// How far the cluster has been parsed.
    pub const fn state(&self) -> ParseState {
        self.state
    }

    /// Returns `true` once all children were parsed.
    pub fn is_exhausted(&self) -> bool {
        self.state == ParseState::Exhausted
    }

    /// Number of entries parsed so far.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// An already parsed entry.
    pub fn entry(&self, index: usize) -> Option<&BlockEntry> {
        self.entries.get(index)
    }

    /// All entries parsed so far.
    pub fn entries(&self) -> &[BlockEntry] {
        &self.entries
    }

    fn bound<R: ByteSource + ?Sized>(&self, src: &mut R) -> Result<Option<u64>> {
        Ok(match self.size {
            ElementSize::Known(size) => Some(self.data_offset + size),
            ElementSize::Unknown => match self.parent_end {
                Some(end) => Some(end),
                None => src.length()?.total,
            },
        })
    }

    fn finish(&mut self) {
        trace!(
            "Cluster {} exhausted with {} entries",
            self.index,
            self.entries.len()
        );
        self.state = ParseState::Exhausted;
        self.end = Some(self.cursor);
    }
}

/// The kind of a block entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntryKind {
    /// A SimpleBlock.
    SimpleBlock(Block),
    /// A BlockGroup.
    BlockGroup(BlockGroup),
}

/// A SimpleBlock or BlockGroup inside a cluster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockEntry {
    index: usize,
    position: u64,
    size: u64,
    kind: EntryKind,
}

impl BlockEntry {
    /// Index of the entry inside its cluster.
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Position of the entry element.
    pub const fn position(&self) -> u64 {
        self.position
    }

    /// Size of the entry element including its header.
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// The kind of the entry.
    pub const fn kind(&self) -> &EntryKind {
        &self.kind
    }

    /// The block of the entry.
    pub const fn block(&self) -> &Block {
        match &self.kind {
            EntryKind::SimpleBlock(block) => block,
            EntryKind::BlockGroup(group) => &group.block,
        }
    }

    /// The group metadata if the entry is a BlockGroup.
    pub const fn block_group(&self) -> Option<&BlockGroup> {
        match &self.kind {
            EntryKind::SimpleBlock(_) => None,
            EntryKind::BlockGroup(group) => Some(group),
        }
    }

    /// Returns `true` for SimpleBlocks.
    pub const fn is_simple_block(&self) -> bool {
        matches!(self.kind, EntryKind::SimpleBlock(_))
    }
}

/// A block together with the metadata of its BlockGroup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockGroup {
    block: Block,
    duration: Option<u64>,
    reference_priority: u64,
    reference_blocks: Vec<i64>,
}

impl BlockGroup {
    /// Parses the children of a BlockGroup. Without `known_end` the group
    /// ends at the first element that can't be a child, or at `bound`.
    /// Returns the group and its end.
    fn parse<R: ByteSource + ?Sized>(
        src: &mut R,
        data_offset: u64,
        known_end: Option<u64>,
        bound: Option<u64>,
    ) -> Result<(Self, u64)> {
        let limit = known_end.or(bound);
        let mut block = None;
        let mut duration = None;
        let mut reference_priority = 0;
        let mut reference_blocks = Vec::new();
        let mut discard_padding = 0;

        let mut pos = data_offset;
        while limit.map_or(true, |limit| pos < limit) {
            let header = read_header(src, pos, limit)?;
            let element_id = header.element_id();
            if known_end.is_none() && !element_id.is_block_group_child() {
                break;
            }
            let Some(size) = header.size.known() else {
                return Err(DemuxError::UnexpectedUnknownSize { id: header.id, pos });
            };
            require_payload(src, &header)?;

            let offset = header.data_offset;
            match element_id {
                ElementId::Block => block = Some((offset, size)),
                ElementId::BlockDuration => duration = Some(read_uint(src, offset, size)?),
                ElementId::ReferencePriority => reference_priority = read_uint(src, offset, size)?,
                ElementId::ReferenceBlock => reference_blocks.push(read_int(src, offset, size)?),
                ElementId::DiscardPadding => discard_padding = read_int(src, offset, size)?,
                _ => {}
            }
            pos = offset + size;
        }

        let Some((offset, size)) = block else {
            return Err(DemuxError::InvalidBlock {
                pos: data_offset,
                reason: "block group without block",
            });
        };
        let mut block = Block::parse(src, offset, size, false)?;
        block.set_key(reference_blocks.is_empty());
        block.set_discard_padding(discard_padding);

        Ok((
            Self {
                block,
                duration,
                reference_priority,
                reference_blocks,
            },
            pos,
        ))
    }

    /// The block of the group.
    pub const fn block(&self) -> &Block {
        &self.block
    }

    /// Duration of the block in raw ticks, if declared.
    pub const fn duration(&self) -> Option<u64> {
        self.duration
    }

    /// Priority of the block for referencing. 0 means no other block references it.
    pub const fn reference_priority(&self) -> u64 {
        self.reference_priority
    }

    /// Timecodes of the referenced blocks, relative to this block, in raw ticks.
    pub fn reference_blocks(&self) -> &[i64] {
        &self.reference_blocks
    }
}

#[cfg(test)]
mod tests {
    use crate::reader::StreamBuffer;

    use super::*;

    const UNKNOWN_SIZE_CLUSTER: [u8; 27] = [
        0x1F, 0x43, 0xB6, 0x75, 0xFF, // Cluster, unknown size
        0xE7, 0x81, 0x05, // Timestamp 5
        0xA0, 0xFF, // BlockGroup, unknown size
        0xA1, 0x85, 0x81, 0x00, 0x00, 0x00, 0xAA, // Block of track 1
        0x9B, 0x81, 0x03, // BlockDuration 3
        0xA3, 0x85, 0x82, 0x00, 0x01, 0x80, 0xBB, // SimpleBlock of track 2
    ];

    fn cluster_at_start<R: ByteSource + ?Sized>(src: &mut R) -> Cluster {
        let header = read_header(src, 0, None).unwrap();
        Cluster::new(0, &header, None, Level::Error)
    }

    #[test]
    fn test_unknown_size_block_group() {
        let mut data = UNKNOWN_SIZE_CLUSTER.to_vec();
        let mut cluster = cluster_at_start(&mut data);
        assert_eq!(cluster.state(), ParseState::Unparsed);

        assert_eq!(
            cluster.parse(&mut data).unwrap(),
            ParseStatus::Consumed { pos: 5, len: 3 }
        );
        assert_eq!(cluster.timecode(), Some(5));
        assert_eq!(
            cluster.parse(&mut data).unwrap(),
            ParseStatus::Consumed { pos: 8, len: 12 }
        );
        assert_eq!(
            cluster.parse(&mut data).unwrap(),
            ParseStatus::Consumed { pos: 20, len: 7 }
        );
        assert_eq!(cluster.parse(&mut data).unwrap(), ParseStatus::Exhausted);
        assert_eq!(cluster.end(), Some(27));

        let group = cluster.entry(0).unwrap().block_group().unwrap();
        assert_eq!(group.duration(), Some(3));
        assert!(group.block().is_key());
        assert_eq!(group.block().frames()[0].pos, 16);

        let simple = cluster.entry(1).unwrap().block();
        assert_eq!(simple.track_number(), 2);
        assert_eq!(simple.timecode(&cluster), 6);
    }

    #[test]
    fn test_retry_leaves_cluster_untouched() {
        let mut stream = StreamBuffer::new();
        stream.push(&UNKNOWN_SIZE_CLUSTER[..15]);
        let mut cluster = cluster_at_start(&mut stream);

        let _ = cluster.parse(&mut stream).unwrap();
        let err = cluster.parse(&mut stream).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(cluster.entry_count(), 0);
        assert_eq!(cluster.state(), ParseState::Partial);

        stream.push(&UNKNOWN_SIZE_CLUSTER[15..]);
        let err = cluster.parse_to_end(&mut stream).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(cluster.entry_count(), 2);

        stream.finish();
        cluster.parse_to_end(&mut stream).unwrap();
        assert!(cluster.is_exhausted());
        assert_eq!(cluster.entry_count(), 2);
    }

    #[test]
    fn test_unknown_size_child_is_rejected() {
        let mut data: Vec<u8> = vec![0x1F, 0x43, 0xB6, 0x75, 0x84, 0xEC, 0xFF, 0x00, 0x00];
        let mut cluster = cluster_at_start(&mut data);
        let err = cluster.parse(&mut data).unwrap_err();
        assert!(matches!(
            err,
            DemuxError::UnexpectedUnknownSize { id: 0xEC, pos: 5 }
        ));
    }
}
