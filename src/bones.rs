//! Bone enumeration for the capture device's skeleton.
//!
//! The wire protocol transmits bone data as a flat float array whose layout
//! is defined by this ordering. The numbering is part of the wire contract
//! and must never change: `Hips` is always index 0 and the per-bone blocks
//! in every frame payload follow this sequence exactly.

use serde::{Deserialize, Serialize};

/// One joint of the capture device's fixed 59-bone skeleton.
///
/// Discriminants are wire indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Bone {
    Hips = 0,
    RightUpLeg = 1,
    RightLeg = 2,
    RightFoot = 3,
    LeftUpLeg = 4,
    LeftLeg = 5,
    LeftFoot = 6,
    Spine = 7,
    Spine1 = 8,
    Spine2 = 9,
    Spine3 = 10,
    Neck = 11,
    Head = 12,
    RightShoulder = 13,
    RightArm = 14,
    RightForeArm = 15,
    RightHand = 16,
    RightHandThumb1 = 17,
    RightHandThumb2 = 18,
    RightHandThumb3 = 19,
    RightInHandIndex = 20,
    RightHandIndex1 = 21,
    RightHandIndex2 = 22,
    RightHandIndex3 = 23,
    RightInHandMiddle = 24,
    RightHandMiddle1 = 25,
    RightHandMiddle2 = 26,
    RightHandMiddle3 = 27,
    RightInHandRing = 28,
    RightHandRing1 = 29,
    RightHandRing2 = 30,
    RightHandRing3 = 31,
    RightInHandPinky = 32,
    RightHandPinky1 = 33,
    RightHandPinky2 = 34,
    RightHandPinky3 = 35,
    LeftShoulder = 36,
    LeftArm = 37,
    LeftForeArm = 38,
    LeftHand = 39,
    LeftHandThumb1 = 40,
    LeftHandThumb2 = 41,
    LeftHandThumb3 = 42,
    LeftInHandIndex = 43,
    LeftHandIndex1 = 44,
    LeftHandIndex2 = 45,
    LeftHandIndex3 = 46,
    LeftInHandMiddle = 47,
    LeftHandMiddle1 = 48,
    LeftHandMiddle2 = 49,
    LeftHandMiddle3 = 50,
    LeftInHandRing = 51,
    LeftHandRing1 = 52,
    LeftHandRing2 = 53,
    LeftHandRing3 = 54,
    LeftInHandPinky = 55,
    LeftHandPinky1 = 56,
    LeftHandPinky2 = 57,
    LeftHandPinky3 = 58,
}

impl Bone {
    /// Number of bones in the device skeleton.
    pub const COUNT: usize = 59;

    /// All bones in wire order.
    pub const ALL: [Bone; Self::COUNT] = [
        Bone::Hips,
        Bone::RightUpLeg,
        Bone::RightLeg,
        Bone::RightFoot,
        Bone::LeftUpLeg,
        Bone::LeftLeg,
        Bone::LeftFoot,
        Bone::Spine,
        Bone::Spine1,
        Bone::Spine2,
        Bone::Spine3,
        Bone::Neck,
        Bone::Head,
        Bone::RightShoulder,
        Bone::RightArm,
        Bone::RightForeArm,
        Bone::RightHand,
        Bone::RightHandThumb1,
        Bone::RightHandThumb2,
        Bone::RightHandThumb3,
        Bone::RightInHandIndex,
        Bone::RightHandIndex1,
        Bone::RightHandIndex2,
        Bone::RightHandIndex3,
        Bone::RightInHandMiddle,
        Bone::RightHandMiddle1,
        Bone::RightHandMiddle2,
        Bone::RightHandMiddle3,
        Bone::RightInHandRing,
        Bone::RightHandRing1,
        Bone::RightHandRing2,
        Bone::RightHandRing3,
        Bone::RightInHandPinky,
        Bone::RightHandPinky1,
        Bone::RightHandPinky2,
        Bone::RightHandPinky3,
        Bone::LeftShoulder,
        Bone::LeftArm,
        Bone::LeftForeArm,
        Bone::LeftHand,
        Bone::LeftHandThumb1,
        Bone::LeftHandThumb2,
        Bone::LeftHandThumb3,
        Bone::LeftInHandIndex,
        Bone::LeftHandIndex1,
        Bone::LeftHandIndex2,
        Bone::LeftHandIndex3,
        Bone::LeftInHandMiddle,
        Bone::LeftHandMiddle1,
        Bone::LeftHandMiddle2,
        Bone::LeftHandMiddle3,
        Bone::LeftInHandRing,
        Bone::LeftHandRing1,
        Bone::LeftHandRing2,
        Bone::LeftHandRing3,
        Bone::LeftInHandPinky,
        Bone::LeftHandPinky1,
        Bone::LeftHandPinky2,
        Bone::LeftHandPinky3,
    ];

    /// Wire index of this bone.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Bone for a wire index, or `None` when out of range.
    pub fn from_index(index: usize) -> Option<Bone> {
        Self::ALL.get(index).copied()
    }

    /// Canonical bone name as used in the device's BVH exports.
    pub const fn name(self) -> &'static str {
        match self {
            Bone::Hips => "Hips",
            Bone::RightUpLeg => "RightUpLeg",
            Bone::RightLeg => "RightLeg",
            Bone::RightFoot => "RightFoot",
            Bone::LeftUpLeg => "LeftUpLeg",
            Bone::LeftLeg => "LeftLeg",
            Bone::LeftFoot => "LeftFoot",
            Bone::Spine => "Spine",
            Bone::Spine1 => "Spine1",
            Bone::Spine2 => "Spine2",
            Bone::Spine3 => "Spine3",
            Bone::Neck => "Neck",
            Bone::Head => "Head",
            Bone::RightShoulder => "RightShoulder",
            Bone::RightArm => "RightArm",
            Bone::RightForeArm => "RightForeArm",
            Bone::RightHand => "RightHand",
            Bone::RightHandThumb1 => "RightHandThumb1",
            Bone::RightHandThumb2 => "RightHandThumb2",
            Bone::RightHandThumb3 => "RightHandThumb3",
            Bone::RightInHandIndex => "RightInHandIndex",
            Bone::RightHandIndex1 => "RightHandIndex1",
            Bone::RightHandIndex2 => "RightHandIndex2",
            Bone::RightHandIndex3 => "RightHandIndex3",
            Bone::RightInHandMiddle => "RightInHandMiddle",
            Bone::RightHandMiddle1 => "RightHandMiddle1",
            Bone::RightHandMiddle2 => "RightHandMiddle2",
            Bone::RightHandMiddle3 => "RightHandMiddle3",
            Bone::RightInHandRing => "RightInHandRing",
            Bone::RightHandRing1 => "RightHandRing1",
            Bone::RightHandRing2 => "RightHandRing2",
            Bone::RightHandRing3 => "RightHandRing3",
            Bone::RightInHandPinky => "RightInHandPinky",
            Bone::RightHandPinky1 => "RightHandPinky1",
            Bone::RightHandPinky2 => "RightHandPinky2",
            Bone::RightHandPinky3 => "RightHandPinky3",
            Bone::LeftShoulder => "LeftShoulder",
            Bone::LeftArm => "LeftArm",
            Bone::LeftForeArm => "LeftForeArm",
            Bone::LeftHand => "LeftHand",
            Bone::LeftHandThumb1 => "LeftHandThumb1",
            Bone::LeftHandThumb2 => "LeftHandThumb2",
            Bone::LeftHandThumb3 => "LeftHandThumb3",
            Bone::LeftInHandIndex => "LeftInHandIndex",
            Bone::LeftHandIndex1 => "LeftHandIndex1",
            Bone::LeftHandIndex2 => "LeftHandIndex2",
            Bone::LeftHandIndex3 => "LeftHandIndex3",
            Bone::LeftInHandMiddle => "LeftInHandMiddle",
            Bone::LeftHandMiddle1 => "LeftHandMiddle1",
            Bone::LeftHandMiddle2 => "LeftHandMiddle2",
            Bone::LeftHandMiddle3 => "LeftHandMiddle3",
            Bone::LeftInHandRing => "LeftInHandRing",
            Bone::LeftHandRing1 => "LeftHandRing1",
            Bone::LeftHandRing2 => "LeftHandRing2",
            Bone::LeftHandRing3 => "LeftHandRing3",
            Bone::LeftInHandPinky => "LeftInHandPinky",
            Bone::LeftHandPinky1 => "LeftHandPinky1",
            Bone::LeftHandPinky2 => "LeftHandPinky2",
            Bone::LeftHandPinky3 => "LeftHandPinky3",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_indices_are_dense_and_stable() {
        assert_eq!(Bone::ALL.len(), Bone::COUNT);
        for (i, bone) in Bone::ALL.iter().enumerate() {
            assert_eq!(bone.index(), i);
            assert_eq!(Bone::from_index(i), Some(*bone));
        }
        assert_eq!(Bone::from_index(Bone::COUNT), None);
    }

    #[test]
    fn anchor_indices_match_wire_contract() {
        // Spot checks against the device protocol documentation.
        assert_eq!(Bone::Hips.index(), 0);
        assert_eq!(Bone::LeftFoot.index(), 6);
        assert_eq!(Bone::Head.index(), 12);
        assert_eq!(Bone::RightHandPinky3.index(), 35);
        assert_eq!(Bone::LeftShoulder.index(), 36);
        assert_eq!(Bone::LeftHandPinky3.index(), 58);
    }

    #[test]
    fn names_are_unique() {
        let mut names: Vec<&str> = Bone::ALL.iter().map(|b| b.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Bone::COUNT);
    }
}
