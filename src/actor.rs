//! Per-performer pose buffer.
//!
//! An [`Actor`] holds the most recently received frame for one performer on
//! one source: the validated header, the raw float payload, and a monotonic
//! timestamp of the last delivery. The buffer is fixed-capacity and
//! overwritten in place, so steady-state frame delivery allocates nothing
//! inside the actor.
//!
//! Extraction applies the device's fixed coordinate conventions. The sign
//! flips and the 0.01 linear scale are part of the wire contract: the
//! capture server streams centimetres in a left-handed frame, consumers
//! work in metres in a right-handed frame.

use std::time::Instant;

use nalgebra::Vector3;

use crate::bones::Bone;
use crate::protocol::{FrameHeader, MAX_VALUE_COUNT};

/// Centimetres on the wire, metres out.
const LINEAR_SCALE: f32 = 0.01;

/// Latest decoded frame for one performer.
#[derive(Debug, Clone)]
pub struct Actor {
    index: u32,
    name: String,
    header: FrameHeader,
    values: [f32; MAX_VALUE_COUNT],
    last_update: Option<Instant>,
}

impl Actor {
    /// New actor with no received data yet.
    ///
    /// Until the first frame arrives every bone reads as the zero position
    /// and zero rotation, and [`last_update`](Self::last_update) is `None`.
    pub fn new(index: u32) -> Self {
        Self {
            index,
            name: String::new(),
            header: FrameHeader::default(),
            values: [0.0; MAX_VALUE_COUNT],
            last_update: None,
        }
    }

    /// Performer index (from the frame header).
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Performer name from the most recent frame, empty before the first.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Header of the most recent frame.
    pub fn header(&self) -> &FrameHeader {
        &self.header
    }

    /// Monotonic instant of the most recent frame delivery.
    pub fn last_update(&self) -> Option<Instant> {
        self.last_update
    }

    /// Store a new frame, replacing the previous one.
    ///
    /// Infallible by design: the codec has already validated the header and
    /// payload length, and malformed frames are dropped upstream so the
    /// previous frame stays intact here.
    pub fn receive(&mut self, header: FrameHeader, values: &[f32], now: Instant) {
        let n = values.len().min(MAX_VALUE_COUNT);
        self.values[..n].copy_from_slice(&values[..n]);
        self.values[n..].fill(0.0);
        if !header.actor_name.is_empty() {
            self.name = header.actor_name.clone();
        }
        self.header = header;
        self.last_update = Some(now);
    }

    /// Decoded position of a bone, in metres.
    ///
    /// Without per-bone displacement only the root carries a position; every
    /// other bone reads as the zero vector.
    pub fn position(&self, bone: Bone) -> Vector3<f32> {
        let offset = match self.position_offset(bone) {
            Some(offset) => offset,
            None => return Vector3::zeros(),
        };
        let Some(d) = self.read3(offset) else {
            return Vector3::zeros();
        };
        Vector3::new(-d[0], d[1], d[2]) * LINEAR_SCALE
    }

    /// Decoded rotation of a bone as device-convention Euler degrees.
    ///
    /// Convert with [`crate::math::euler_deg`] when a quaternion is needed;
    /// multi-channel retarget sums happen on these vectors first.
    pub fn rotation(&self, bone: Bone) -> Vector3<f32> {
        let offset = self.rotation_offset(bone);
        let Some(d) = self.read3(offset) else {
            return Vector3::zeros();
        };
        Vector3::new(d[1], -d[0], -d[2])
    }

    /// Start of the optional 6-value reference block, if present.
    fn reference_offset(&self) -> usize {
        if self.header.with_reference { 6 } else { 0 }
    }

    fn position_offset(&self, bone: Bone) -> Option<usize> {
        if self.header.with_displacement {
            Some(self.reference_offset() + bone.index() * 6)
        } else if bone == Bone::Hips {
            Some(self.reference_offset())
        } else {
            None
        }
    }

    fn rotation_offset(&self, bone: Bone) -> usize {
        if self.header.with_displacement {
            self.reference_offset() + bone.index() * 6 + 3
        } else {
            self.reference_offset() + 3 + bone.index() * 3
        }
    }

    /// Three consecutive floats, or `None` when the frame does not reach
    /// that far (short or absent payload).
    fn read3(&self, offset: usize) -> Option<[f32; 3]> {
        if offset + 3 > self.header.value_count as usize {
            return None;
        }
        Some([self.values[offset], self.values[offset + 1], self.values[offset + 2]])
    }
}
