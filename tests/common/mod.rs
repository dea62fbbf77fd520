//! Builds WebM files in memory.

#![allow(dead_code)]

pub const EBML: u32 = 0x1A45_DFA3;
pub const SEGMENT: u32 = 0x1853_8067;
pub const INFO: u32 = 0x1549_A966;
pub const TRACKS: u32 = 0x1654_AE6B;
pub const TRACK_ENTRY: u32 = 0xAE;
pub const CLUSTER: u32 = 0x1F43_B675;
pub const TIMESTAMP: u32 = 0xE7;
pub const SIMPLE_BLOCK: u32 = 0xA3;
pub const BLOCK_GROUP: u32 = 0xA0;
pub const BLOCK: u32 = 0xA1;
pub const BLOCK_DURATION: u32 = 0x9B;
pub const REFERENCE_BLOCK: u32 = 0xFB;
pub const REFERENCE_PRIORITY: u32 = 0xFA;
pub const DISCARD_PADDING: u32 = 0x75A2;
pub const SEEK_HEAD: u32 = 0x114D_9B74;
pub const SEEK: u32 = 0x4DBB;
pub const SEEK_ID: u32 = 0x53AB;
pub const SEEK_POSITION: u32 = 0x53AC;
pub const CUES: u32 = 0x1C53_BB6B;
pub const TAGS: u32 = 0x1254_C367;
pub const VOID: u32 = 0xEC;

pub const VIDEO_PAYLOAD_LEN: usize = 500;
pub const AUDIO_PAYLOAD_LEN: usize = 40;

/// Encodes an element ID. IDs keep their marker bits.
pub fn id(id: u32) -> Vec<u8> {
    let bytes = id.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    bytes[skip..].to_vec()
}

/// Encodes a size with the smallest width that can carry it.
pub fn size(size: u64) -> Vec<u8> {
    let width = (1..=8_u32)
        .find(|width| size < (1_u64 << (7 * width)) - 1)
        .expect("size too large");
    sized(size, width)
}

/// Encodes a size with the given width.
pub fn sized(size: u64, width: u32) -> Vec<u8> {
    let marked = size | (1_u64 << (7 * width));
    marked.to_be_bytes()[8 - width as usize..].to_vec()
}

/// The unknown size of the given width.
pub fn unknown_size(width: u32) -> Vec<u8> {
    sized((1_u64 << (7 * width)) - 1, width)
}

pub fn element(element_id: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = id(element_id);
    out.extend(size(payload.len() as u64));
    out.extend_from_slice(payload);
    out
}

pub fn uint(element_id: u32, value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count().min(7);
    element(element_id, &bytes[skip..])
}

pub fn int(element_id: u32, value: i64) -> Vec<u8> {
    element(element_id, &value.to_be_bytes())
}

pub fn float(element_id: u32, value: f64) -> Vec<u8> {
    element(element_id, &value.to_be_bytes())
}

pub fn string(element_id: u32, value: &str) -> Vec<u8> {
    element(element_id, value.as_bytes())
}

pub fn master(element_id: u32, children: &[Vec<u8>]) -> Vec<u8> {
    element(element_id, &children.concat())
}

pub fn unknown_master(element_id: u32, children: &[Vec<u8>]) -> Vec<u8> {
    let mut out = id(element_id);
    out.extend(unknown_size(8));
    out.extend(children.concat());
    out
}

/// The payload of a Block or SimpleBlock without lacing.
pub fn block_payload(track: u64, timecode: i16, flags: u8, frame: &[u8]) -> Vec<u8> {
    let mut out = size(track);
    out.extend(timecode.to_be_bytes());
    out.push(flags);
    out.extend_from_slice(frame);
    out
}

pub fn simple_block(track: u64, timecode: i16, key: bool, frame: &[u8]) -> Vec<u8> {
    let flags = if key { 0x80 } else { 0x00 };
    element(SIMPLE_BLOCK, &block_payload(track, timecode, flags, frame))
}

pub fn block_group(track: u64, timecode: i16, references: &[i64], frame: &[u8]) -> Vec<u8> {
    let mut children = vec![element(BLOCK, &block_payload(track, timecode, 0, frame))];
    children.extend(references.iter().map(|r| int(REFERENCE_BLOCK, *r)));
    master(BLOCK_GROUP, &children)
}

/// A SeekHead with one Seek per `(id, position)`, positions relative to the
/// segment payload. Positions are always written with 8 bytes.
pub fn seek_head(entries: &[(u32, u64)]) -> Vec<u8> {
    let seeks: Vec<Vec<u8>> = entries
        .iter()
        .map(|(target, position)| {
            master(
                SEEK,
                &[
                    element(SEEK_ID, &id(*target)),
                    element(SEEK_POSITION, &position.to_be_bytes()),
                ],
            )
        })
        .collect();
    master(SEEK_HEAD, &seeks)
}

pub fn ebml_header(doc_type: &str) -> Vec<u8> {
    master(
        EBML,
        &[
            uint(0x4286, 1),
            uint(0x42F7, 1),
            uint(0x42F2, 4),
            uint(0x42F3, 8),
            string(0x4282, doc_type),
            uint(0x4287, 4),
            uint(0x4285, 2),
        ],
    )
}

pub fn info() -> Vec<u8> {
    master(
        INFO,
        &[
            uint(0x2A_D7B1, 1_000_000),
            float(0x4489, 3000.0),
            string(0x4D80, "webm-test"),
            string(0x5741, "webm-test"),
        ],
    )
}

pub fn video_entry(number: u64) -> Vec<u8> {
    master(
        TRACK_ENTRY,
        &[
            uint(0xD7, number),
            uint(0x73C5, 0xBEEF),
            uint(0x83, 1),
            string(0x86, "V_VP8"),
            master(0xE0, &[uint(0xB0, 320), uint(0xBA, 240)]),
        ],
    )
}

pub fn audio_entry(number: u64) -> Vec<u8> {
    master(
        TRACK_ENTRY,
        &[
            uint(0xD7, number),
            uint(0x83, 2),
            string(0x86, "A_OPUS"),
            element(0x63A2, b"OpusHead"),
            uint(0x56AA, 6_500_000),
            master(0xE1, &[float(0xB5, 48_000.0), uint(0x9F, 2)]),
        ],
    )
}

pub fn tracks(entries: &[Vec<u8>]) -> Vec<u8> {
    master(TRACKS, entries)
}

pub fn video_frame(cluster: usize) -> Vec<u8> {
    (0..VIDEO_PAYLOAD_LEN).map(|i| (i + cluster) as u8).collect()
}

pub fn audio_frame(cluster: usize) -> Vec<u8> {
    vec![0xA0 + cluster as u8; AUDIO_PAYLOAD_LEN]
}

/// The children of one of the test clusters: a timecode, a video and an
/// audio SimpleBlock. Only the video block of the first cluster is a key frame.
pub fn cluster_children(index: usize) -> Vec<Vec<u8>> {
    vec![
        uint(TIMESTAMP, index as u64 * 1000),
        simple_block(1, 0, index == 0, &video_frame(index)),
        simple_block(2, 10, false, &audio_frame(index)),
    ]
}

/// A file with a VP8 video track (1), an Opus audio track (2) and three
/// clusters with two SimpleBlocks each. With `unknown_sizes` the segment and
/// all clusters are written with unknown sizes, as a live stream would be.
pub fn test_file(unknown_sizes: bool) -> Vec<u8> {
    let mut children = vec![info(), tracks(&[video_entry(1), audio_entry(2)])];
    for index in 0..3 {
        let cluster = if unknown_sizes {
            unknown_master(CLUSTER, &cluster_children(index))
        } else {
            master(CLUSTER, &cluster_children(index))
        };
        children.push(cluster);
    }

    let mut file = ebml_header("webm");
    if unknown_sizes {
        file.extend(unknown_master(SEGMENT, &children));
    } else {
        file.extend(master(SEGMENT, &children));
    }
    file
}

/// A file with the given segment children after the default Info and Tracks.
pub fn file_with_clusters(clusters: &[Vec<u8>]) -> Vec<u8> {
    let mut children = vec![info(), tracks(&[video_entry(1), audio_entry(2)])];
    children.extend_from_slice(clusters);
    file_with_children(&children)
}

/// A file whose sized segment holds exactly `children`.
pub fn file_with_children(children: &[Vec<u8>]) -> Vec<u8> {
    let mut file = ebml_header("webm");
    file.extend(master(SEGMENT, children));
    file
}
