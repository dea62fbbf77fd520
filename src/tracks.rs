//! The Tracks element and its track entries.

use std::collections::HashMap;

use log::{debug, Level};

use crate::block::Block;
use crate::ebml::{
    collect_children, find_locations, read_binary, try_find_float, try_find_location,
    try_find_string, try_find_unsigned, SourceCursor,
};
use crate::element_id::ElementId;
use crate::enums::{DisplayUnit, FlagInterlaced, StereoMode, TrackType};
use crate::error::Strictness;
use crate::reader::ByteSource;
use crate::{DemuxError, Result};

/// Codec IDs with the FourCC they are known under.
const FOURCC_TABLE: [(&str, [u8; 4]); 6] = [
    ("V_VP8", *b"VP80"),
    ("V_VP9", *b"VP90"),
    ("V_AV1", *b"av01"),
    ("A_VORBIS", *b"vorb"),
    ("A_OPUS", *b"Opus"),
    ("A_FLAC", *b"fLaC"),
];

/// The tracks of a segment.
#[derive(Clone, Debug, Default)]
pub struct Tracks {
    tracks: Vec<Track>,
    by_number: HashMap<u64, usize>,
}

impl Tracks {
    /// Parses the TrackEntry children of the Tracks element. Entries missing
    /// mandatory fields are dropped unless the strictness turns that into an error.
    pub(crate) fn parse<R: ByteSource + ?Sized>(
        src: &mut R,
        offset: u64,
        size: u64,
        strictness: &Strictness,
    ) -> Result<Self> {
        let children = collect_children(src, offset, size)?;
        let mut tracks = Self::default();

        for (entry_offset, entry_size) in find_locations(&children, ElementId::TrackEntry) {
            let track = match Track::parse(src, entry_offset, entry_size) {
                Ok(track) => track,
                Err(err @ DemuxError::InvalidTrackEntry { .. }) => {
                    log_or_err!(strictness, Level::Warn, err);
                    continue;
                }
                Err(err) => return Err(err),
            };

            if tracks.by_number.contains_key(&track.number) {
                log_or_err!(
                    strictness,
                    Level::Warn,
                    DemuxError::DuplicateTrackNumber(track.number)
                );
                continue;
            }

            debug!(
                "Track {} of type {:?} with codec {}",
                track.number, track.track_type, track.codec_id
            );
            let _ = tracks.by_number.insert(track.number, tracks.tracks.len());
            tracks.tracks.push(track);
        }

        Ok(tracks)
    }

    /// Number of tracks.
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Returns `true` if the segment has no usable tracks.
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// The track at `index`, in the order the entries appear in the file.
    pub fn by_index(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    /// The track with the given track number.
    pub fn by_number(&self, number: u64) -> Option<&Track> {
        self.by_number
            .get(&number)
            .and_then(|index| self.tracks.get(*index))
    }

    /// The track a block belongs to.
    ///
    /// # Errors
    ///
    /// [`DemuxError::UnknownTrackReference`] if no track carries the track
    /// number of the block. The block itself stays usable.
    pub fn track_for(&self, block: &Block) -> Result<&Track> {
        self.by_number(block.track_number())
            .ok_or(DemuxError::UnknownTrackReference(block.track_number()))
    }

    /// Iterates the tracks in file order.
    pub fn iter(&self) -> std::slice::Iter<'_, Track> {
        self.tracks.iter()
    }
}

impl<'a> IntoIterator for &'a Tracks {
    type Item = &'a Track;
    type IntoIter = std::slice::Iter<'a, Track>;

    fn into_iter(self) -> Self::IntoIter {
        self.tracks.iter()
    }
}

/// The type specific settings of a track.
#[derive(Clone, Debug, PartialEq)]
pub enum TrackKind {
    /// A video track with its video settings.
    Video(VideoTrack),
    /// An audio track with its audio settings.
    Audio(AudioTrack),
    /// A subtitle track.
    Subtitle,
    /// Any other track type.
    Other,
}

/// Describes a track.
#[derive(Clone, Debug, PartialEq)]
pub struct Track {
    number: u64,
    uid: Option<u64>,
    track_type: TrackType,
    flag_enabled: bool,
    flag_default: bool,
    flag_forced: bool,
    flag_lacing: bool,
    default_duration: Option<u64>,
    name: Option<String>,
    language: String,
    codec_id: String,
    codec_private: Option<Vec<u8>>,
    codec_name: Option<String>,
    codec_delay: u64,
    seek_pre_roll: u64,
    kind: TrackKind,
}

impl Track {
    fn parse<R: ByteSource + ?Sized>(src: &mut R, offset: u64, size: u64) -> Result<Self> {
        let fields = collect_children(src, offset, size)?;
        let reject = |reason| DemuxError::InvalidTrackEntry {
            pos: offset,
            reason,
        };

        let number = try_find_unsigned(&fields, ElementId::TrackNumber)
            .ok_or_else(|| reject("missing number"))?;
        if number == 0 {
            return Err(reject("track number is zero"));
        }
        let track_type: TrackType = try_find_unsigned(&fields, ElementId::TrackType)
            .ok_or_else(|| reject("missing type"))?
            .into();

        let codec_private = match try_find_location(&fields, ElementId::CodecPrivate) {
            Some((offset, size)) if size > 0 => Some(read_binary(src, offset, size)?),
            _ => None,
        };

        let kind = match track_type {
            TrackType::Video => {
                let (offset, size) = try_find_location(&fields, ElementId::Video)
                    .ok_or_else(|| reject("video track without video settings"))?;
                TrackKind::Video(VideoTrack::parse(src, offset, size).map_err(|err| match err {
                    DemuxError::InvalidTrackEntry { reason, .. } => reject(reason),
                    err => err,
                })?)
            }
            TrackType::Audio => {
                let (offset, size) = try_find_location(&fields, ElementId::Audio)
                    .ok_or_else(|| reject("audio track without audio settings"))?;
                TrackKind::Audio(AudioTrack::parse(src, offset, size)?)
            }
            TrackType::Subtitle => TrackKind::Subtitle,
            _ => TrackKind::Other,
        };

        Ok(Self {
            number,
            uid: try_find_unsigned(&fields, ElementId::TrackUid),
            track_type,
            flag_enabled: try_find_unsigned(&fields, ElementId::FlagEnabled).unwrap_or(1) == 1,
            flag_default: try_find_unsigned(&fields, ElementId::FlagDefault).unwrap_or(1) == 1,
            flag_forced: try_find_unsigned(&fields, ElementId::FlagForced).unwrap_or(0) == 1,
            flag_lacing: try_find_unsigned(&fields, ElementId::FlagLacing).unwrap_or(1) == 1,
            default_duration: try_find_unsigned(&fields, ElementId::DefaultDuration),
            name: try_find_string(&fields, ElementId::Name),
            language: try_find_string(&fields, ElementId::Language)
                .unwrap_or_else(|| "eng".to_owned()),
            codec_id: try_find_string(&fields, ElementId::CodecId).unwrap_or_default(),
            codec_private,
            codec_name: try_find_string(&fields, ElementId::CodecName),
            codec_delay: try_find_unsigned(&fields, ElementId::CodecDelay).unwrap_or(0),
            seek_pre_roll: try_find_unsigned(&fields, ElementId::SeekPreRoll).unwrap_or(0),
            kind,
        })
    }

    /// The track number as used in blocks.
    pub const fn number(&self) -> u64 {
        self.number
    }

    /// A unique ID to identify the track.
    pub const fn uid(&self) -> Option<u64> {
        self.uid
    }

    /// The type of the track.
    pub const fn track_type(&self) -> TrackType {
        self.track_type
    }

    /// The type specific settings.
    pub const fn kind(&self) -> &TrackKind {
        &self.kind
    }

    /// The video settings of a video track.
    pub const fn video(&self) -> Option<&VideoTrack> {
        match &self.kind {
            TrackKind::Video(video) => Some(video),
            _ => None,
        }
    }

    /// The audio settings of an audio track.
    pub const fn audio(&self) -> Option<&AudioTrack> {
        match &self.kind {
            TrackKind::Audio(audio) => Some(audio),
            _ => None,
        }
    }

    /// Returns `true` for video tracks.
    pub const fn is_video(&self) -> bool {
        matches!(self.kind, TrackKind::Video(_))
    }

    /// Returns `true` for audio tracks.
    pub const fn is_audio(&self) -> bool {
        matches!(self.kind, TrackKind::Audio(_))
    }

    /// Set if the track is usable.
    pub const fn flag_enabled(&self) -> bool {
        self.flag_enabled
    }

    /// Set if the track should be eligible for automatic selection by the player.
    pub const fn flag_default(&self) -> bool {
        self.flag_default
    }

    /// Set if the track must be played.
    pub const fn flag_forced(&self) -> bool {
        self.flag_forced
    }

    /// Set if the track may contain blocks using lacing.
    pub const fn flag_lacing(&self) -> bool {
        self.flag_lacing
    }

    /// Number of nanoseconds a frame lasts.
    pub const fn default_duration(&self) -> Option<u64> {
        self.default_duration
    }

    /// A human-readable track name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The language of the track in the Matroska languages form.
    pub fn language(&self) -> &str {
        &self.language
    }

    /// An ID corresponding to the codec, for example "V_VP8".
    pub fn codec_id(&self) -> &str {
        &self.codec_id
    }

    /// Private data only known to the codec. Empty if the track has none.
    pub fn codec_private(&self) -> &[u8] {
        self.codec_private.as_deref().unwrap_or_default()
    }

    /// A human-readable string specifying the codec.
    pub fn codec_name(&self) -> Option<&str> {
        self.codec_name.as_deref()
    }

    /// Nanoseconds the codec delays the output.
    pub const fn codec_delay(&self) -> u64 {
        self.codec_delay
    }

    /// Nanoseconds of data to decode before the decoded data is valid after a seek.
    pub const fn seek_pre_roll(&self) -> u64 {
        self.seek_pre_roll
    }

    /// The FourCC of common WebM codecs.
    pub fn codec_fourcc(&self) -> Option<[u8; 4]> {
        FOURCC_TABLE
            .iter()
            .find(|(codec_id, _)| *codec_id == self.codec_id)
            .map(|(_, fourcc)| *fourcc)
    }

    /// Splits Xiph laced codec private data into its packets, as used for the
    /// Vorbis and Theora setup headers.
    ///
    /// # Errors
    ///
    /// [`DemuxError::OutOfRange`] if the lacing announces more data than the
    /// codec private data holds.
    pub fn codec_private_packets(&self) -> Result<Vec<&[u8]>> {
        let private = self.codec_private();
        let mut source = private;
        let mut cursor = SourceCursor::new(&mut source, 0);

        let count = usize::from(cursor.read_u8()?) + 1;
        let mut sizes = Vec::with_capacity(count);
        for _ in 1..count {
            sizes.push(cursor.read_xiph_size()?);
        }

        let total = u64::try_from(private.len()).unwrap_or(u64::MAX);
        let mut pos = cursor.position();
        let mut packets = Vec::with_capacity(count);
        for size in sizes {
            let end = pos + size;
            if end > total {
                return Err(DemuxError::OutOfRange {
                    pos,
                    len: size,
                    total,
                });
            }
            packets.push(&private[to_index(pos)..to_index(end)]);
            pos = end;
        }
        packets.push(&private[to_index(pos)..]);

        Ok(packets)
    }
}

/// Video settings of a track.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoTrack {
    width: u64,
    height: u64,
    display_width: Option<u64>,
    display_height: Option<u64>,
    display_unit: DisplayUnit,
    frame_rate: f64,
    flag_interlaced: FlagInterlaced,
    stereo_mode: StereoMode,
    alpha_mode: bool,
}

impl VideoTrack {
    fn parse<R: ByteSource + ?Sized>(src: &mut R, offset: u64, size: u64) -> Result<Self> {
        let fields = collect_children(src, offset, size)?;
        let (Some(width), Some(height)) = (
            try_find_unsigned(&fields, ElementId::PixelWidth),
            try_find_unsigned(&fields, ElementId::PixelHeight),
        ) else {
            return Err(DemuxError::InvalidTrackEntry {
                pos: offset,
                reason: "missing pixel size",
            });
        };

        Ok(Self {
            width,
            height,
            display_width: try_find_unsigned(&fields, ElementId::DisplayWidth),
            display_height: try_find_unsigned(&fields, ElementId::DisplayHeight),
            display_unit: try_find_unsigned(&fields, ElementId::DisplayUnit)
                .unwrap_or(0)
                .into(),
            frame_rate: try_find_float(&fields, ElementId::FrameRate).unwrap_or(0.0),
            flag_interlaced: try_find_unsigned(&fields, ElementId::FlagInterlaced)
                .unwrap_or(0)
                .into(),
            stereo_mode: try_find_unsigned(&fields, ElementId::StereoMode)
                .unwrap_or(0)
                .into(),
            alpha_mode: try_find_unsigned(&fields, ElementId::AlphaMode).unwrap_or(0) == 1,
        })
    }

    /// Width of the encoded video frames in pixels.
    pub const fn width(&self) -> u64 {
        self.width
    }

    /// Height of the encoded video frames in pixels.
    pub const fn height(&self) -> u64 {
        self.height
    }

    /// Width of the video frames to display. Defaults to the pixel width.
    pub fn display_width(&self) -> u64 {
        self.display_width.unwrap_or(self.width)
    }

    /// Height of the video frames to display. Defaults to the pixel height.
    pub fn display_height(&self) -> u64 {
        self.display_height.unwrap_or(self.height)
    }

    /// How the display size is to be interpreted.
    pub const fn display_unit(&self) -> DisplayUnit {
        self.display_unit
    }

    /// Frames per second, 0 if not declared.
    pub const fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    /// Whether the video is interlaced.
    pub const fn flag_interlaced(&self) -> FlagInterlaced {
        self.flag_interlaced
    }

    /// Stereo-3D video mode.
    pub const fn stereo_mode(&self) -> StereoMode {
        self.stereo_mode
    }

    /// Whether the BlockAdditional elements carry an alpha channel.
    pub const fn alpha_mode(&self) -> bool {
        self.alpha_mode
    }
}

/// Audio settings of a track.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioTrack {
    sampling_rate: f64,
    output_sampling_rate: Option<f64>,
    channels: u64,
    bit_depth: Option<u64>,
}

impl AudioTrack {
    fn parse<R: ByteSource + ?Sized>(src: &mut R, offset: u64, size: u64) -> Result<Self> {
        let fields = collect_children(src, offset, size)?;
        Ok(Self {
            sampling_rate: try_find_float(&fields, ElementId::SamplingFrequency).unwrap_or(8000.0),
            output_sampling_rate: try_find_float(&fields, ElementId::OutputSamplingFrequency),
            channels: try_find_unsigned(&fields, ElementId::Channels).unwrap_or(1),
            bit_depth: try_find_unsigned(&fields, ElementId::BitDepth),
        })
    }

    /// Sampling frequency in Hz.
    pub const fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    /// Real output sampling frequency in Hz. Defaults to the sampling frequency.
    pub fn output_sampling_rate(&self) -> f64 {
        self.output_sampling_rate.unwrap_or(self.sampling_rate)
    }

    /// Number of channels.
    pub const fn channels(&self) -> u64 {
        self.channels
    }

    /// Bits per sample, mostly used for PCM.
    pub const fn bit_depth(&self) -> Option<u64> {
        self.bit_depth
    }
}

#[allow(clippy::as_conversions)]
const fn to_index(pos: u64) -> usize {
    pos as usize
}

