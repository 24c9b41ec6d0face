//! Wire frame header parsing.
//!
//! Every motion frame on the wire starts with a fixed 64-byte packed header
//! followed by `value_count` little-endian IEEE-754 32-bit floats.
//!
//! # Wire Layout
//!
//! The header is packed with no alignment padding:
//!
//! ```text
//! offset  size  field
//!  0      2     start_token        (0xDDFF)
//!  2      4     version            (build, revision, minor, major — one byte each)
//!  6      2     value_count        (number of floats following the header)
//!  8      1     with_displacement  (0 or 1)
//!  9      1     with_reference     (0 or 1)
//! 10      4     actor_index
//! 14     32     actor_name         (NUL-padded)
//! 46      4     frame_index
//! 50     12     reserved           (3 × u32)
//! 62      2     end_token          (0xEEFF)
//! ```
//!
//! Because the header embeds a character array it is parsed field by field
//! from explicit little-endian slices rather than transmuted, keeping the
//! codec free of `unsafe`.
//!
//! # Payload Layout
//!
//! The float array holds `(bone_count + 1) × 6` values at most:
//! an optional 6-value reference block, then per-bone blocks in wire bone
//! order. With displacement enabled every bone carries position + rotation
//! (6 values); without it only the root carries its position and all other
//! bones are rotation-only (3 values).

use serde::{Deserialize, Serialize};

use crate::bones::Bone;
use crate::{MocapError, Result};

/// Package start token.
pub const START_TOKEN: u16 = 0xDDFF;

/// Package end token.
pub const END_TOKEN: u16 = 0xEEFF;

/// Size of the packed wire header in bytes.
pub const HEADER_SIZE: usize = 64;

/// Size of the embedded actor name field in bytes.
pub const ACTOR_NAME_LEN: usize = 32;

/// Upper bound on `value_count` for any flag combination:
/// one optional reference block plus one full block per bone.
pub const MAX_VALUE_COUNT: usize = (Bone::COUNT + 1) * 6;

/// Protocol data-format version, e.g. 1.1.0.0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataVersion {
    pub build: u8,
    pub revision: u8,
    pub minor: u8,
    pub major: u8,
}

impl std::fmt::Display for DataVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}.{}", self.major, self.minor, self.revision, self.build)
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameHeader {
    /// Data-format version advertised by the sender.
    pub version: DataVersion,
    /// Number of floats following the header.
    pub value_count: u16,
    /// Whether per-bone position blocks are present.
    pub with_displacement: bool,
    /// Whether a leading 6-value reference block is present.
    pub with_reference: bool,
    /// Performer index this frame belongs to.
    pub actor_index: u32,
    /// Performer name, NUL-trimmed.
    pub actor_name: String,
    /// Monotonic frame counter from the sender.
    pub frame_index: u32,
}

impl Default for FrameHeader {
    fn default() -> Self {
        Self {
            version: DataVersion { build: 0, revision: 0, minor: 1, major: 1 },
            value_count: 0,
            with_displacement: false,
            with_reference: false,
            actor_index: 0,
            actor_name: String::new(),
            frame_index: 0,
        }
    }
}

impl FrameHeader {
    /// Parse and validate a header from raw bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(MocapError::malformed_header(format!(
                "header needs {HEADER_SIZE} bytes, have {}",
                bytes.len()
            )));
        }

        let start_token = u16::from_le_bytes([bytes[0], bytes[1]]);
        if start_token != START_TOKEN {
            return Err(MocapError::malformed_header(format!(
                "bad start token {start_token:#06x}, expected {START_TOKEN:#06x}"
            )));
        }

        let end_token = u16::from_le_bytes([bytes[62], bytes[63]]);
        if end_token != END_TOKEN {
            return Err(MocapError::malformed_header(format!(
                "bad end token {end_token:#06x}, expected {END_TOKEN:#06x}"
            )));
        }

        let name_bytes = &bytes[14..14 + ACTOR_NAME_LEN];
        let name_end = name_bytes.iter().position(|&b| b == 0).unwrap_or(ACTOR_NAME_LEN);
        let actor_name = String::from_utf8_lossy(&name_bytes[..name_end]).into_owned();

        let header = Self {
            version: DataVersion {
                build: bytes[2],
                revision: bytes[3],
                minor: bytes[4],
                major: bytes[5],
            },
            value_count: u16::from_le_bytes([bytes[6], bytes[7]]),
            with_displacement: bytes[8] != 0,
            with_reference: bytes[9] != 0,
            actor_index: u32::from_le_bytes([bytes[10], bytes[11], bytes[12], bytes[13]]),
            actor_name,
            frame_index: u32::from_le_bytes([bytes[46], bytes[47], bytes[48], bytes[49]]),
        };

        header.validate()?;
        Ok(header)
    }

    /// Validate internal consistency of the header fields.
    ///
    /// The declared value count must not exceed the maximum implied by the
    /// bone count and flag combination; frames claiming more data than the
    /// layout allows are rejected rather than clamped so the previous actor
    /// frame stays intact.
    pub fn validate(&self) -> Result<()> {
        let max = self.max_value_count();
        if self.value_count as usize > max {
            return Err(MocapError::malformed_header(format!(
                "value_count {} exceeds layout maximum {} (displacement={}, reference={})",
                self.value_count, max, self.with_displacement, self.with_reference
            )));
        }
        Ok(())
    }

    /// Maximum value count implied by the bone count and this header's flags.
    pub fn max_value_count(&self) -> usize {
        let reference = if self.with_reference { 6 } else { 0 };
        let bones = if self.with_displacement {
            Bone::COUNT * 6
        } else {
            // Root position + root rotation, remaining bones rotation-only.
            6 + (Bone::COUNT - 1) * 3
        };
        reference + bones
    }

    /// Encode this header into its packed 64-byte wire form.
    ///
    /// Reserved words are written as zero; actor names longer than the wire
    /// field are truncated.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..2].copy_from_slice(&START_TOKEN.to_le_bytes());
        out[2] = self.version.build;
        out[3] = self.version.revision;
        out[4] = self.version.minor;
        out[5] = self.version.major;
        out[6..8].copy_from_slice(&self.value_count.to_le_bytes());
        out[8] = self.with_displacement as u8;
        out[9] = self.with_reference as u8;
        out[10..14].copy_from_slice(&self.actor_index.to_le_bytes());
        let name = self.actor_name.as_bytes();
        let n = name.len().min(ACTOR_NAME_LEN);
        out[14..14 + n].copy_from_slice(&name[..n]);
        out[46..50].copy_from_slice(&self.frame_index.to_le_bytes());
        out[62..64].copy_from_slice(&END_TOKEN.to_le_bytes());
        out
    }
}
