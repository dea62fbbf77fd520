//! The Segment element: metadata, tracks and the discovery of clusters.

use std::num::NonZeroU64;

use log::{debug, trace, Level};

use crate::cluster::Cluster;
use crate::ebml::{
    collect_children, find_locations, try_find_date, try_find_float, try_find_string,
    try_find_unsigned, ElementData, ElementSize,
};
use crate::element::{read_header, require_payload, ElementHeader};
use crate::element_id::ElementId;
use crate::error::Strictness;
use crate::reader::ByteSource;
use crate::tracks::Tracks;
use crate::{DemuxError, Result};

/// The Info element.
#[derive(Clone, Debug, PartialEq)]
pub struct SegmentInfo {
    timecode_scale: NonZeroU64,
    duration: Option<f64>,
    date_utc: Option<i64>,
    title: Option<String>,
    muxing_app: Option<String>,
    writing_app: Option<String>,
}

impl Default for SegmentInfo {
    fn default() -> Self {
        Self {
            timecode_scale: NonZeroU64::MIN.saturating_add(999_999),
            duration: None,
            date_utc: None,
            title: None,
            muxing_app: None,
            writing_app: None,
        }
    }
}

impl SegmentInfo {
    fn new(fields: &[(ElementId, ElementData)]) -> Result<Self> {
        let timecode_scale =
            try_find_unsigned(fields, ElementId::TimestampScale).unwrap_or(1_000_000);
        let timecode_scale = NonZeroU64::new(timecode_scale)
            .ok_or(DemuxError::NonZeroValueIsZero(ElementId::TimestampScale.id()))?;

        Ok(Self {
            timecode_scale,
            duration: try_find_float(fields, ElementId::Duration),
            date_utc: try_find_date(fields, ElementId::DateUtc),
            title: try_find_string(fields, ElementId::Title),
            muxing_app: try_find_string(fields, ElementId::MuxingApp),
            writing_app: try_find_string(fields, ElementId::WritingApp),
        })
    }

    /// Nanoseconds per timecode tick (1_000_000 means all timecodes in the
    /// segment are expressed in milliseconds).
    pub const fn timecode_scale(&self) -> NonZeroU64 {
        self.timecode_scale
    }

    /// Duration of the segment in timecode ticks.
    pub const fn duration(&self) -> Option<f64> {
        self.duration
    }

    /// Duration of the segment in nanoseconds.
    #[allow(clippy::as_conversions)]
    pub fn duration_ns(&self) -> Option<u64> {
        self.duration
            .map(|duration| (duration * self.timecode_scale.get() as f64) as u64)
    }

    /// Creation date in nanoseconds relative to 2001-01-01T00:00:00 UTC.
    pub const fn date_utc(&self) -> Option<i64> {
        self.date_utc
    }

    /// General name of the segment.
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Muxing application or library.
    pub fn muxing_app(&self) -> Option<&str> {
        self.muxing_app.as_deref()
    }

    /// Writing application.
    pub fn writing_app(&self) -> Option<&str> {
        self.writing_app.as_deref()
    }
}

/// An entry of the SeekHead.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SeekEntry {
    /// The raw ID of the referenced element.
    pub id: u32,
    /// Absolute position of the referenced element.
    pub position: u64,
}

impl SeekEntry {
    /// The known element the entry points to.
    pub const fn element_id(&self) -> ElementId {
        ElementId::from_id(self.id)
    }
}

/// A Segment and everything parsed from it so far.
///
/// [`Segment::load`] reads the metadata and records the clusters reachable
/// without parsing them. [`Segment::first`] and [`Segment::next`] walk the
/// clusters and discover more of them while the byte source grows.
#[derive(Clone, Debug)]
pub struct Segment {
    position: u64,
    data_offset: u64,
    size: ElementSize,
    load_pos: Option<u64>,
    reached_end: bool,
    info: SegmentInfo,
    tracks: Tracks,
    seek_head: Vec<SeekEntry>,
    clusters: Vec<Cluster>,
    fail_level: Level,
}

impl Segment {
    /// Reads the Segment element header at `pos`.
    ///
    /// # Errors
    ///
    /// [`DemuxError::UnexpectedElement`] if there is no Segment at `pos`,
    /// [`DemuxError::OutOfRange`] if its declared size passes the end of the
    /// source, otherwise the errors of [`read_header`].
    pub fn new<R: ByteSource + ?Sized>(src: &mut R, pos: u64) -> Result<Self> {
        let header = read_header(src, pos, None)?;
        if header.element_id() != ElementId::Segment {
            return Err(DemuxError::UnexpectedElement {
                expected: ElementId::Segment.id(),
                found: header.id,
            });
        }

        if let (Some(end), Some(total)) = (header.known_end(), src.length()?.total) {
            if end > total {
                return Err(DemuxError::OutOfRange {
                    pos: header.data_offset,
                    len: end - header.data_offset,
                    total,
                });
            }
        }

        debug!("Segment at {} with size {:?}", header.position, header.size);

        Ok(Self {
            position: header.position,
            data_offset: header.data_offset,
            size: header.size,
            load_pos: Some(header.data_offset),
            reached_end: false,
            info: SegmentInfo::default(),
            tracks: Tracks::default(),
            seek_head: Vec::new(),
            clusters: Vec::new(),
            fail_level: Level::Error,
        })
    }

    /// Parses the top level elements of the segment: Info, Tracks and
    /// SeekHead are decoded, clusters are recorded but not parsed.
    ///
    /// Loading stops at the end of the segment, at a cluster of unknown
    /// size, or at data that is not available yet once a cluster was found.
    /// It can be called again to continue after the source grew.
    ///
    /// # Errors
    ///
    /// Retryable errors if not even the first cluster is available yet.
    /// Malformed metadata is a terminal error.
    pub fn load<R: ByteSource + ?Sized>(&mut self, src: &mut R) -> Result<()> {
        while self.load_pos.is_some() {
            match self.load_next(src) {
                Ok(true) => {}
                Ok(false) => break,
                Err(err) if err.is_retryable() && !self.clusters.is_empty() => break,
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// The first cluster.
    ///
    /// # Errors
    ///
    /// Retryable errors if the first cluster is not available yet.
    pub fn first<R: ByteSource + ?Sized>(&mut self, src: &mut R) -> Result<Option<&mut Cluster>> {
        self.get_cluster(src, 0)
    }

    /// The cluster following the cluster at `index`. Scans forward for a
    /// new cluster if `index` is the last known one. Returns `None` at the
    /// end of the segment.
    ///
    /// # Errors
    ///
    /// Retryable errors if the next cluster is not available yet.
    pub fn next<R: ByteSource + ?Sized>(
        &mut self,
        src: &mut R,
        index: usize,
    ) -> Result<Option<&mut Cluster>> {
        self.get_cluster(src, index + 1)
    }

    /// The cluster at `index`, discovering clusters as needed.
    ///
    /// # Errors
    ///
    /// Retryable errors if the cluster is not available yet.
    pub fn get_cluster<R: ByteSource + ?Sized>(
        &mut self,
        src: &mut R,
        index: usize,
    ) -> Result<Option<&mut Cluster>> {
        while self.clusters.len() <= index {
            if !self.load_next(src)? {
                break;
            }
        }
        Ok(self.clusters.get_mut(index))
    }

    /// Sets the severity at which anomalies in the file become errors.
    /// Less severe anomalies are logged. Defaults to [`Level::Error`].
    pub fn set_fail_level(&mut self, fail_level: Level) {
        self.fail_level = fail_level;
        for cluster in &mut self.clusters {
            cluster.fail_level = fail_level;
        }
    }

    /// The severity at which anomalies become errors.
    pub const fn fail_level(&self) -> Level {
        self.fail_level
    }

    /// Position of the Segment element.
    pub const fn position(&self) -> u64 {
        self.position
    }

    /// Position of the first child element.
    pub const fn data_offset(&self) -> u64 {
        self.data_offset
    }

    /// The declared size of the segment payload.
    pub const fn size(&self) -> ElementSize {
        self.size
    }

    /// The segment info. Defaults apply until the Info element was loaded.
    pub const fn info(&self) -> &SegmentInfo {
        &self.info
    }

    /// Nanoseconds per timecode tick.
    pub const fn timecode_scale(&self) -> u64 {
        self.info.timecode_scale.get()
    }

    /// The tracks of the segment.
    pub const fn tracks(&self) -> &Tracks {
        &self.tracks
    }

    /// The entries of the SeekHead.
    pub fn seek_head(&self) -> &[SeekEntry] {
        &self.seek_head
    }

    /// Number of clusters discovered so far.
    pub fn count(&self) -> usize {
        self.clusters.len()
    }

    /// An already discovered cluster.
    pub fn cluster(&self, index: usize) -> Option<&Cluster> {
        self.clusters.get(index)
    }

    /// An already discovered cluster, for parsing.
    pub fn cluster_mut(&mut self, index: usize) -> Option<&mut Cluster> {
        self.clusters.get_mut(index)
    }

    /// All clusters discovered so far.
    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    /// Returns `true` once the end of the segment was reached and no more
    /// clusters can be discovered.
    pub const fn is_end_reached(&self) -> bool {
        self.reached_end
    }

    fn bound<R: ByteSource + ?Sized>(&self, src: &mut R) -> Result<Option<u64>> {
        Ok(match self.size {
            ElementSize::Known(size) => Some(self.data_offset + size),
            ElementSize::Unknown => src.length()?.total,
        })
    }

    fn known_end(&self) -> Option<u64> {
        self.size.known().map(|size| self.data_offset + size)
    }

    /// Parses the next top level element. Returns `false` at the end of the segment.
    fn load_next<R: ByteSource + ?Sized>(&mut self, src: &mut R) -> Result<bool> {
        if self.reached_end {
            return Ok(false);
        }

        let pos = match self.load_pos {
            Some(pos) => pos,
            None => {
                // A cluster of unknown size only ends where its last child ends.
                let Some(last) = self.clusters.last_mut() else {
                    return Ok(false);
                };
                last.parse_to_end(src)?;
                let Some(end) = last.end() else {
                    return Ok(false);
                };
                self.load_pos = Some(end);
                end
            }
        };

        if self.bound(src)?.is_some_and(|bound| pos >= bound) {
            return Ok(self.end_reached());
        }

        let header = read_header(src, pos, self.known_end())?;
        let element_id = header.element_id();
        trace!("Top level element {:#X} at {}", header.id, pos);

        match element_id {
            ElementId::Cluster => {
                self.push_cluster(&header);
                self.load_pos = header.known_end();
                return Ok(true);
            }
            ElementId::Ebml | ElementId::Segment if self.size == ElementSize::Unknown => {
                return Ok(self.end_reached());
            }
            _ => {}
        }

        let size = match header.size {
            ElementSize::Known(size) => size,
            ElementSize::Unknown => match self.find_unknown_size_end(src, &header) {
                Ok(end) => {
                    debug!(
                        "Element {:#X} at {} of unknown size ends at {}",
                        header.id, pos, end
                    );
                    end - header.data_offset
                }
                Err(err) if err.is_retryable() => return Err(err),
                Err(err) => {
                    log_or_err!(self, Level::Warn, err);
                    return Ok(self.end_reached());
                }
            },
        };

        match element_id {
            ElementId::Info => {
                require_payload(src, &header)?;
                let fields = collect_children(src, header.data_offset, size)?;
                self.info = SegmentInfo::new(&fields)?;
                debug!("Timecode scale {}", self.info.timecode_scale);
            }
            ElementId::Tracks => {
                require_payload(src, &header)?;
                let strictness = Strictness {
                    fail_level: self.fail_level,
                };
                self.tracks = Tracks::parse(src, header.data_offset, size, &strictness)?;
                debug!("Found {} tracks", self.tracks.len());
            }
            ElementId::SeekHead => {
                require_payload(src, &header)?;
                match self.parse_seek_head(src, header.data_offset, size) {
                    Ok(entries) => self.seek_head.extend(entries),
                    Err(err) if err.is_retryable() => return Err(err),
                    Err(err) => log_or_err!(self, Level::Warn, err),
                }
            }
            _ => {}
        }

        self.load_pos = Some(header.data_offset + size);
        Ok(true)
    }

    fn push_cluster(&mut self, header: &ElementHeader) {
        let index = self.clusters.len();
        debug!(
            "Cluster {} at {} with size {:?}",
            index, header.position, header.size
        );
        self.clusters.push(Cluster::new(
            index,
            header,
            self.known_end(),
            self.fail_level,
        ));
    }

    fn end_reached(&mut self) -> bool {
        self.reached_end = true;
        false
    }

    /// Finds the end of a segment child of unknown size: its children are
    /// skipped by their sizes until an element of the segment level follows.
    fn find_unknown_size_end<R: ByteSource + ?Sized>(
        &self,
        src: &mut R,
        header: &ElementHeader,
    ) -> Result<u64> {
        let bound = self.bound(src)?;
        let mut pos = header.data_offset;
        while bound.map_or(true, |bound| pos < bound) {
            let child = read_header(src, pos, bound)?;
            if child.element_id().ends_cluster() {
                break;
            }
            let Some(end) = child.known_end() else {
                return Err(DemuxError::UnexpectedUnknownSize { id: child.id, pos });
            };
            pos = end;
        }
        Ok(pos)
    }

    fn parse_seek_head<R: ByteSource + ?Sized>(
        &self,
        src: &mut R,
        offset: u64,
        size: u64,
    ) -> Result<Vec<SeekEntry>> {
        let children = collect_children(src, offset, size)?;
        let mut entries = Vec::new();
        for (offset, size) in find_locations(&children, ElementId::Seek) {
            let fields = collect_children(src, offset, size)?;
            let id = try_find_unsigned(&fields, ElementId::SeekId)
                .and_then(|id| u32::try_from(id).ok());
            let position = try_find_unsigned(&fields, ElementId::SeekPosition);
            if let (Some(id), Some(position)) = (id, position) {
                entries.push(SeekEntry {
                    id,
                    position: self.data_offset + position,
                });
            }
        }
        Ok(entries)
    }
}
