//! Element IDs defined by the EBML and Matroska specifications.

/// The types of elements a EBML file can have.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum ElementType {
    /// Unknown element.
    Unknown,
    /// An element that contains other EBML elements als children.
    Master,
    /// Unsigned integer,
    Unsigned,
    /// Signed integer,
    Signed,
    /// Float,
    Float,
    /// Date,
    Date,
    /// String
    String,
    /// Binary
    Binary,
}

macro_rules! element_ids {
    ($($name:ident = $id:literal => $kind:ident,)*) => {
        /// The element IDs the demuxer knows about.
        #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
        #[allow(missing_docs)]
        pub enum ElementId {
            Unknown,
            $($name,)*
        }

        impl ElementId {
            /// Maps a raw EBML ID to a known element.
            pub const fn from_id(id: u32) -> Self {
                match id {
                    $($id => Self::$name,)*
                    _ => Self::Unknown,
                }
            }

            /// The raw EBML ID of the element, 0 for unknown elements.
            pub const fn id(self) -> u32 {
                match self {
                    Self::Unknown => 0,
                    $(Self::$name => $id,)*
                }
            }

            pub(crate) const fn element_type(self) -> ElementType {
                match self {
                    Self::Unknown => ElementType::Unknown,
                    $(Self::$name => ElementType::$kind,)*
                }
            }
        }
    };
}

element_ids! {
    Ebml = 0x1A45_DFA3 => Master,
    EbmlVersion = 0x4286 => Unsigned,
    EbmlReadVersion = 0x42F7 => Unsigned,
    EbmlMaxIdLength = 0x42F2 => Unsigned,
    EbmlMaxSizeLength = 0x42F3 => Unsigned,
    DocType = 0x4282 => String,
    DocTypeVersion = 0x4287 => Unsigned,
    DocTypeReadVersion = 0x4285 => Unsigned,
    Void = 0xEC => Binary,
    Crc32 = 0xBF => Binary,
    Segment = 0x1853_8067 => Master,
    SeekHead = 0x114D_9B74 => Master,
    Seek = 0x4DBB => Master,
    // Stored as binary in Matroska files, decoded as the raw u32 ID.
    SeekId = 0x53AB => Unsigned,
    SeekPosition = 0x53AC => Unsigned,
    Info = 0x1549_A966 => Master,
    TimestampScale = 0x2A_D7B1 => Unsigned,
    Duration = 0x4489 => Float,
    DateUtc = 0x4461 => Date,
    Title = 0x7BA9 => String,
    MuxingApp = 0x4D80 => String,
    WritingApp = 0x5741 => String,
    Cluster = 0x1F43_B675 => Master,
    Timestamp = 0xE7 => Unsigned,
    SilentTracks = 0x5854 => Master,
    Position = 0xA7 => Unsigned,
    PrevSize = 0xAB => Unsigned,
    SimpleBlock = 0xA3 => Binary,
    BlockGroup = 0xA0 => Master,
    Block = 0xA1 => Binary,
    BlockVirtual = 0xA2 => Binary,
    BlockAdditions = 0x75A1 => Master,
    BlockDuration = 0x9B => Unsigned,
    ReferencePriority = 0xFA => Unsigned,
    ReferenceBlock = 0xFB => Signed,
    ReferenceVirtual = 0xFD => Signed,
    CodecState = 0xA4 => Binary,
    DiscardPadding = 0x75A2 => Signed,
    Slices = 0x8E => Master,
    EncryptedBlock = 0xAF => Binary,
    Tracks = 0x1654_AE6B => Master,
    TrackEntry = 0xAE => Master,
    TrackNumber = 0xD7 => Unsigned,
    TrackUid = 0x73C5 => Unsigned,
    TrackType = 0x83 => Unsigned,
    FlagEnabled = 0xB9 => Unsigned,
    FlagDefault = 0x88 => Unsigned,
    FlagForced = 0x55AA => Unsigned,
    FlagLacing = 0x9C => Unsigned,
    DefaultDuration = 0x23_E383 => Unsigned,
    Name = 0x536E => String,
    Language = 0x22_B59C => String,
    CodecId = 0x86 => String,
    CodecPrivate = 0x63A2 => Binary,
    CodecName = 0x25_8688 => String,
    CodecDelay = 0x56AA => Unsigned,
    SeekPreRoll = 0x56BB => Unsigned,
    Video = 0xE0 => Master,
    FlagInterlaced = 0x9A => Unsigned,
    StereoMode = 0x53B8 => Unsigned,
    AlphaMode = 0x53C0 => Unsigned,
    PixelWidth = 0xB0 => Unsigned,
    PixelHeight = 0xBA => Unsigned,
    DisplayWidth = 0x54B0 => Unsigned,
    DisplayHeight = 0x54BA => Unsigned,
    DisplayUnit = 0x54B2 => Unsigned,
    FrameRate = 0x23_83E3 => Float,
    Audio = 0xE1 => Master,
    SamplingFrequency = 0xB5 => Float,
    OutputSamplingFrequency = 0x78B5 => Float,
    Channels = 0x9F => Unsigned,
    BitDepth = 0x6264 => Unsigned,
    Cues = 0x1C53_BB6B => Master,
    Chapters = 0x1043_A770 => Master,
    Tags = 0x1254_C367 => Master,
    Attachments = 0x1941_A469 => Master,
}

impl ElementId {
    /// Elements that live directly inside a Segment.
    pub(crate) const fn is_segment_child(self) -> bool {
        matches!(
            self,
            Self::SeekHead
                | Self::Info
                | Self::Tracks
                | Self::Cluster
                | Self::Cues
                | Self::Chapters
                | Self::Tags
                | Self::Attachments
        )
    }

    /// Whether the element ends a Cluster of unknown size. Those are the
    /// siblings of the Cluster and the top level elements of a following
    /// Segment.
    pub(crate) const fn ends_cluster(self) -> bool {
        self.is_segment_child() || matches!(self, Self::Ebml | Self::Segment)
    }

    /// Elements that can appear inside a BlockGroup.
    pub(crate) const fn is_block_group_child(self) -> bool {
        matches!(
            self,
            Self::Block
                | Self::BlockVirtual
                | Self::BlockAdditions
                | Self::BlockDuration
                | Self::ReferencePriority
                | Self::ReferenceBlock
                | Self::ReferenceVirtual
                | Self::CodecState
                | Self::DiscardPadding
                | Self::Slices
                | Self::Void
                | Self::Crc32
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_mapping() {
        assert_eq!(ElementId::from_id(0x1F43_B675), ElementId::Cluster);
        assert_eq!(ElementId::Cluster.id(), 0x1F43_B675);
        assert_eq!(ElementId::from_id(0x4242), ElementId::Unknown);
        assert_eq!(ElementId::SimpleBlock.element_type(), ElementType::Binary);
    }

    #[test]
    fn test_nesting_levels() {
        assert!(ElementId::Cues.ends_cluster());
        assert!(ElementId::Segment.ends_cluster());
        assert!(!ElementId::SimpleBlock.ends_cluster());
        assert!(!ElementId::Timestamp.ends_cluster());
        assert!(ElementId::ReferenceBlock.is_block_group_child());
        assert!(!ElementId::SimpleBlock.is_block_group_child());
    }
}
