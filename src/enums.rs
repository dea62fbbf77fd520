//! Enums exposed in the API.

/// Type of the track.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum TrackType {
    /// Video track.
    Video,
    /// Audio track.
    Audio,
    /// A complex track.
    Complex,
    /// A logo.
    Logo,
    /// Subtitles.
    Subtitle,
    /// Buttons.
    Buttons,
    /// Controls.
    Control,
    /// Metadata.
    Metadata,
    /// A track type missing from the registry, with its raw value.
    Unknown(u64),
}

impl From<u64> for TrackType {
    fn from(d: u64) -> Self {
        match d {
            1 => Self::Video,
            2 => Self::Audio,
            3 => Self::Complex,
            16 => Self::Logo,
            17 => Self::Subtitle,
            18 => Self::Buttons,
            32 => Self::Control,
            33 => Self::Metadata,
            _ => Self::Unknown(d),
        }
    }
}

impl TrackType {
    /// The numeric value of the track type in the Matroska registry.
    pub const fn value(self) -> u64 {
        match self {
            Self::Video => 1,
            Self::Audio => 2,
            Self::Complex => 3,
            Self::Logo => 16,
            Self::Subtitle => 17,
            Self::Buttons => 18,
            Self::Control => 32,
            Self::Metadata => 33,
            Self::Unknown(d) => d,
        }
    }
}

/// How the frames of a block are packed into its payload.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Lacing {
    /// A single frame.
    None,
    /// Frame sizes coded as runs of 255.
    Xiph,
    /// Frame sizes coded as EBML integers, differences to the previous size.
    Ebml,
    /// All frames share the same size.
    FixedSize,
}

impl From<u8> for Lacing {
    fn from(d: u8) -> Self {
        match d {
            1 => Self::Xiph,
            2 => Self::FixedSize,
            3 => Self::Ebml,
            _ => Self::None,
        }
    }
}

/// Set if the video is interlaced.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FlagInterlaced {
    /// Unknown.
    Unknown,
    /// Interlaced.
    Interlaced,
    /// Progressive.
    Progressive,
}

impl From<u64> for FlagInterlaced {
    fn from(d: u64) -> Self {
        match d {
            1 => Self::Interlaced,
            2 => Self::Progressive,
            _ => Self::Unknown,
        }
    }
}

/// Stereo-3D video mode.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StereoMode {
    /// Mono.
    Mono,
    /// Side by side (left eye first).
    SideBySideLeftEyeFirst,
    /// Top - bottom (right eye is first).
    TopBottomRightEyeFirst,
    /// Top - bottom (left eye is first).
    TopBottomLeftEyeFirst,
    /// Side by side (right eye first).
    SideBySideRightEyeFirst,
    /// Any of the remaining, rarely used modes, with its raw value.
    Other(u64),
}

impl From<u64> for StereoMode {
    fn from(d: u64) -> Self {
        match d {
            0 => Self::Mono,
            1 => Self::SideBySideLeftEyeFirst,
            2 => Self::TopBottomRightEyeFirst,
            3 => Self::TopBottomLeftEyeFirst,
            11 => Self::SideBySideRightEyeFirst,
            _ => Self::Other(d),
        }
    }
}

/// How `DisplayWidth` & `DisplayHeight` are interpreted.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DisplayUnit {
    /// In pixels.
    Pixels,
    /// In centimeters.
    Centimeters,
    /// In inches.
    Inches,
    /// By using the aspect ratio.
    DisplayAspectRatio,
    /// Unknown.
    Unknown,
}

impl From<u64> for DisplayUnit {
    fn from(d: u64) -> Self {
        match d {
            0 => Self::Pixels,
            1 => Self::Centimeters,
            2 => Self::Inches,
            3 => Self::DisplayAspectRatio,
            _ => Self::Unknown,
        }
    }
}
