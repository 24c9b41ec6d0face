//! Retargeting: capture bone rotations onto an arbitrary rig.
//!
//! The pipeline is two-phase. [`Retargeter::bind`] inspects a rig once and
//! captures everything pose application needs: per mapped joint a
//! *reference* rotation (the joint's rest parent frame relative to the
//! rig root) and a *default* rotation (the rest local rotation), plus the
//! hip height scale and foot ground-contact data. [`Binding::apply`] then
//! runs every frame with no allocation and no rig traversal beyond the
//! mapped joints.
//!
//! Per frame, for each mapped joint:
//!
//! ```text
//! local = reference × Euler(Σ channels) × reference⁻¹ × default
//! ```
//!
//! Channel sums are Euler-vector additions in degrees; that is how the
//! capture server splits compound joints (chest, finger metacarpals)
//! across bones, and the terms only recombine correctly before the
//! conversion to a quaternion.

use nalgebra::{UnitQuaternion, Vector3};
use tracing::trace;

use crate::actor::Actor;
use crate::bones::Bone;
use crate::math;
use crate::rig::{Pose, Rig};
use crate::{MocapError, Result};

/// Hip height, in metres, of the skeleton the capture data is authored
/// against. Target rigs are scaled relative to it.
pub const REFERENCE_HIP_HEIGHT: f32 = 1.113886;

/// One retarget target: a rig joint fed by one or more bone channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetargetEntry {
    pub joint: String,
    pub channels: Vec<Bone>,
}

impl RetargetEntry {
    fn single(joint: &str, bone: Bone) -> Self {
        Self { joint: joint.to_string(), channels: vec![bone] }
    }

    fn summed(joint: &str, channels: &[Bone]) -> Self {
        Self { joint: joint.to_string(), channels: channels.to_vec() }
    }
}

/// Ordered mapping from capture bones to rig joints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetargetMap {
    entries: Vec<RetargetEntry>,
}

impl RetargetMap {
    pub fn new(entries: Vec<RetargetEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[RetargetEntry] {
        &self.entries
    }

    /// The standard humanoid mapping.
    ///
    /// Joint names follow the common humanoid convention (`Hips`,
    /// `LeftUpperLeg`, `RightIndexProximal`, …). Compound joints sum
    /// several bone channels: the chest collapses the three upper spine
    /// segments, and each finger proximal adds its in-hand metacarpal.
    pub fn humanoid() -> Self {
        use Bone::*;
        let mut entries = vec![
            RetargetEntry::single("Hips", Hips),
            RetargetEntry::single("RightUpperLeg", RightUpLeg),
            RetargetEntry::single("RightLowerLeg", RightLeg),
            RetargetEntry::single("RightFoot", RightFoot),
            RetargetEntry::single("LeftUpperLeg", LeftUpLeg),
            RetargetEntry::single("LeftLowerLeg", LeftLeg),
            RetargetEntry::single("LeftFoot", LeftFoot),
            RetargetEntry::single("Spine", Spine),
            RetargetEntry::summed("Chest", &[Spine1, Spine2, Spine3]),
            RetargetEntry::single("Neck", Neck),
            RetargetEntry::single("Head", Head),
            RetargetEntry::single("RightShoulder", RightShoulder),
            RetargetEntry::single("RightUpperArm", RightArm),
            RetargetEntry::single("RightLowerArm", RightForeArm),
            RetargetEntry::single("RightHand", RightHand),
            RetargetEntry::single("LeftShoulder", LeftShoulder),
            RetargetEntry::single("LeftUpperArm", LeftArm),
            RetargetEntry::single("LeftLowerArm", LeftForeArm),
            RetargetEntry::single("LeftHand", LeftHand),
        ];
        entries.extend([
            RetargetEntry::single("RightThumbProximal", RightHandThumb1),
            RetargetEntry::single("RightThumbIntermediate", RightHandThumb2),
            RetargetEntry::single("RightThumbDistal", RightHandThumb3),
            RetargetEntry::summed("RightIndexProximal", &[RightInHandIndex, RightHandIndex1]),
            RetargetEntry::single("RightIndexIntermediate", RightHandIndex2),
            RetargetEntry::single("RightIndexDistal", RightHandIndex3),
            RetargetEntry::summed("RightMiddleProximal", &[RightInHandMiddle, RightHandMiddle1]),
            RetargetEntry::single("RightMiddleIntermediate", RightHandMiddle2),
            RetargetEntry::single("RightMiddleDistal", RightHandMiddle3),
            RetargetEntry::summed("RightRingProximal", &[RightInHandRing, RightHandRing1]),
            RetargetEntry::single("RightRingIntermediate", RightHandRing2),
            RetargetEntry::single("RightRingDistal", RightHandRing3),
            RetargetEntry::summed("RightLittleProximal", &[RightInHandPinky, RightHandPinky1]),
            RetargetEntry::single("RightLittleIntermediate", RightHandPinky2),
            RetargetEntry::single("RightLittleDistal", RightHandPinky3),
            RetargetEntry::single("LeftThumbProximal", LeftHandThumb1),
            RetargetEntry::single("LeftThumbIntermediate", LeftHandThumb2),
            RetargetEntry::single("LeftThumbDistal", LeftHandThumb3),
            RetargetEntry::summed("LeftIndexProximal", &[LeftInHandIndex, LeftHandIndex1]),
            RetargetEntry::single("LeftIndexIntermediate", LeftHandIndex2),
            RetargetEntry::single("LeftIndexDistal", LeftHandIndex3),
            RetargetEntry::summed("LeftMiddleProximal", &[LeftInHandMiddle, LeftHandMiddle1]),
            RetargetEntry::single("LeftMiddleIntermediate", LeftHandMiddle2),
            RetargetEntry::single("LeftMiddleDistal", LeftHandMiddle3),
            RetargetEntry::summed("LeftRingProximal", &[LeftInHandRing, LeftHandRing1]),
            RetargetEntry::single("LeftRingIntermediate", LeftHandRing2),
            RetargetEntry::single("LeftRingDistal", LeftHandRing3),
            RetargetEntry::summed("LeftLittleProximal", &[LeftInHandPinky, LeftHandPinky1]),
            RetargetEntry::single("LeftLittleIntermediate", LeftHandPinky2),
            RetargetEntry::single("LeftLittleDistal", LeftHandPinky3),
        ]);
        Self { entries }
    }
}

/// Retargeting configuration: a map plus per-application options.
#[derive(Debug, Clone)]
pub struct Retargeter {
    map: RetargetMap,
    foot_lock: bool,
}

impl Retargeter {
    pub fn new(map: RetargetMap) -> Self {
        Self { map, foot_lock: true }
    }

    /// Enable or disable the vertical foot-contact correction.
    pub fn foot_lock(mut self, enabled: bool) -> Self {
        self.foot_lock = enabled;
        self
    }

    /// Inspect a rig and capture the per-joint reference and default
    /// rotation tables, the hip scale, and foot-contact heights.
    ///
    /// Pure in the rig: binding the same rig twice yields identical
    /// tables. Mapped joints absent from the rig are skipped; a rig
    /// without the hips joint cannot be retargeted onto at all.
    pub fn bind(&self, rig: &Rig) -> Result<Binding> {
        let root_rotation = rig.root_rotation();
        let mut entries = Vec::with_capacity(self.map.entries.len());
        let mut hips = None;

        for entry in &self.map.entries {
            let Some(joint_index) = rig.index_of(&entry.joint) else {
                trace!(joint = %entry.joint, "rig has no such joint, skipping");
                continue;
            };
            let joint = rig.joint(joint_index).expect("index came from the rig");
            let parent_rotation = match joint.parent {
                Some(parent) => rig.rest_world(parent).1,
                None => UnitQuaternion::identity(),
            };
            let reference = parent_rotation.inverse() * root_rotation;
            if entry.joint == "Hips" {
                hips = Some(entries.len());
            }
            entries.push(BoundJoint {
                joint_index,
                channels: entry.channels.clone(),
                reference,
                default: joint.rest_rotation,
            });
        }

        let hips = hips.ok_or_else(|| MocapError::invalid_rig("rig has no Hips joint"))?;
        let hips_height = rig.rest_world(entries[hips].joint_index).0.y;

        let foot = |name: &str| -> Option<FootContact> {
            let joint_index = rig.index_of(name)?;
            Some(FootContact { joint_index, contact_height: rig.rest_world(joint_index).0.y })
        };
        let left_foot = foot("LeftFoot");
        let right_foot = foot("RightFoot");

        // Hip height is measured against the average of the two feet, so an
        // uneven stance in the rest pose biases the scale rather than
        // snapping to the lower foot.
        let feet_height = match (&left_foot, &right_foot) {
            (Some(l), Some(r)) => (l.contact_height + r.contact_height) / 2.0,
            (Some(l), None) => l.contact_height,
            (None, Some(r)) => r.contact_height,
            (None, None) => 0.0,
        };
        let scale = (hips_height - feet_height) / REFERENCE_HIP_HEIGHT;

        Ok(Binding {
            entries,
            hips,
            scale,
            foot_lock: self.foot_lock,
            left_foot,
            right_foot,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
struct BoundJoint {
    joint_index: usize,
    channels: Vec<Bone>,
    reference: UnitQuaternion<f32>,
    default: UnitQuaternion<f32>,
}

#[derive(Debug, Clone, PartialEq)]
struct FootContact {
    joint_index: usize,
    contact_height: f32,
}

/// Frozen per-rig retargeting tables.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    entries: Vec<BoundJoint>,
    hips: usize,
    scale: f32,
    foot_lock: bool,
    left_foot: Option<FootContact>,
    right_foot: Option<FootContact>,
}

impl Binding {
    /// Rig-to-reference hip height ratio.
    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Write an actor's current frame into a pose.
    ///
    /// A non-finite sample affects only its own bone: that joint keeps
    /// whatever the pose already held. With the foot lock enabled the hip
    /// is shifted vertically afterwards so the lower foot sits at its
    /// rest-pose contact height.
    pub fn apply(&self, actor: &Actor, rig: &Rig, pose: &mut Pose) {
        for bound in &self.entries {
            let mut sum = Vector3::zeros();
            for &bone in &bound.channels {
                sum += actor.rotation(bone);
            }
            if !math::is_finite(&sum) {
                trace!(joint = bound.joint_index, "non-finite rotation sample, keeping pose");
                continue;
            }
            let decoded = math::euler_deg(sum);
            let local = bound.reference * decoded * bound.reference.inverse() * bound.default;
            pose.set_local_rotation(bound.joint_index, local);
        }

        let hips = &self.entries[self.hips];
        let position = actor.position(Bone::Hips);
        if math::is_finite(&position) {
            let local = hips.reference * (position * self.scale);
            pose.set_local_position(hips.joint_index, local);
        }

        if self.foot_lock {
            self.level_feet(rig, pose, hips.joint_index);
        }
    }

    /// Shift the hip vertically so the lower foot touches its own contact
    /// height.
    ///
    /// The foot with the lower world height is the supporting one; the
    /// correction uses that foot's offset even when the other foot's gap
    /// is smaller.
    fn level_feet(&self, rig: &Rig, pose: &mut Pose, hips_joint: usize) {
        let world = rig.world_transforms(pose);
        let supporting = [&self.left_foot, &self.right_foot]
            .into_iter()
            .flatten()
            .min_by(|a, b| {
                world[a.joint_index].0.y.total_cmp(&world[b.joint_index].0.y)
            });
        if let Some(foot) = supporting {
            let gap = world[foot.joint_index].0.y - foot.contact_height;
            if gap.abs() > f32::EPSILON {
                let mut hips_position = pose.local_position(hips_joint);
                hips_position.y -= gap;
                pose.set_local_position(hips_joint, hips_position);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::FrameHeader;
    use crate::rig::Joint;
    use std::time::Instant;

    /// Minimal humanoid: hips with two legs and a spine/chest column.
    fn test_rig() -> Rig {
        let hip_height = REFERENCE_HIP_HEIGHT;
        Rig::new(vec![
            Joint::root("Hips", Vector3::new(0.0, hip_height, 0.0)),
            Joint::child("LeftUpperLeg", 0, Vector3::new(0.1, -0.1, 0.0)),
            Joint::child("LeftLowerLeg", 1, Vector3::new(0.0, -0.5, 0.0)),
            Joint::child("LeftFoot", 2, Vector3::new(0.0, -0.5, 0.0)),
            Joint::child("RightUpperLeg", 0, Vector3::new(-0.1, -0.1, 0.0)),
            Joint::child("RightLowerLeg", 4, Vector3::new(0.0, -0.5, 0.0)),
            Joint::child("RightFoot", 5, Vector3::new(0.0, -0.5, 0.0)),
            Joint::child("Spine", 0, Vector3::new(0.0, 0.2, 0.0)),
            Joint::child("Chest", 7, Vector3::new(0.0, 0.2, 0.0)),
        ])
        .unwrap()
    }

    fn actor_with_values(values: &[f32]) -> Actor {
        let mut header = FrameHeader::default();
        header.with_displacement = true;
        header.value_count = values.len() as u16;
        let mut actor = Actor::new(0);
        actor.receive(header, values, Instant::now());
        actor
    }

    fn quat_close(a: UnitQuaternion<f32>, b: UnitQuaternion<f32>) -> bool {
        a.angle_to(&b) < 1e-4
    }

    #[test]
    fn binding_is_deterministic() {
        let rig = test_rig();
        let retargeter = Retargeter::new(RetargetMap::humanoid());
        let a = retargeter.bind(&rig).unwrap();
        let b = retargeter.bind(&rig).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn hip_scale_follows_rig_proportions() {
        let rig = test_rig();
        let binding = Retargeter::new(RetargetMap::humanoid()).bind(&rig).unwrap();
        // Hips sit at the reference height, feet rest at hip − 1.1.
        let feet_height = REFERENCE_HIP_HEIGHT - 1.1;
        let expected = (REFERENCE_HIP_HEIGHT - feet_height) / REFERENCE_HIP_HEIGHT;
        assert!((binding.scale() - expected).abs() < 1e-5);
    }

    #[test]
    fn hip_scale_averages_an_uneven_stance() {
        // Feet resting at different heights: 0.0 and 0.1.
        let rig = Rig::new(vec![
            Joint::root("Hips", Vector3::new(0.0, 1.0, 0.0)),
            Joint::child("LeftUpperLeg", 0, Vector3::new(0.1, -0.1, 0.0)),
            Joint::child("LeftLowerLeg", 1, Vector3::new(0.0, -0.5, 0.0)),
            Joint::child("LeftFoot", 2, Vector3::new(0.0, -0.4, 0.0)),
            Joint::child("RightUpperLeg", 0, Vector3::new(-0.1, -0.1, 0.0)),
            Joint::child("RightLowerLeg", 4, Vector3::new(0.0, -0.5, 0.0)),
            Joint::child("RightFoot", 5, Vector3::new(0.0, -0.3, 0.0)),
        ])
        .unwrap();
        let binding = Retargeter::new(RetargetMap::humanoid()).bind(&rig).unwrap();
        let expected = (1.0 - 0.05) / REFERENCE_HIP_HEIGHT;
        assert!((binding.scale() - expected).abs() < 1e-5);
    }

    #[test]
    fn rig_without_hips_cannot_bind() {
        let rig = Rig::new(vec![Joint::root("Pelvis", Vector3::zeros())]).unwrap();
        let result = Retargeter::new(RetargetMap::humanoid()).bind(&rig);
        assert!(matches!(result, Err(MocapError::InvalidRig { .. })));
    }

    #[test]
    fn zero_frame_leaves_the_rest_pose() {
        let rig = test_rig();
        let binding = Retargeter::new(RetargetMap::humanoid())
            .foot_lock(false)
            .bind(&rig)
            .unwrap();
        let actor = actor_with_values(&[0.0; 354]);
        let mut pose = Pose::rest(&rig);
        binding.apply(&actor, &rig, &mut pose);

        for index in 0..rig.len() {
            assert!(quat_close(
                pose.local_rotation(index),
                rig.joint(index).unwrap().rest_rotation
            ));
        }
        // Streamed hip position is zero, so the hip moves to the origin.
        assert_eq!(pose.local_position(0), Vector3::zeros());
    }

    #[test]
    fn chest_sums_the_three_spine_channels() {
        let rig = test_rig();
        let binding = Retargeter::new(RetargetMap::humanoid())
            .foot_lock(false)
            .bind(&rig)
            .unwrap();

        // 10° about the device X axis on each of Spine1..Spine3; the X
        // angle travels in the second rotation slot on the wire.
        let mut values = vec![0.0f32; 354];
        for bone in [Bone::Spine1, Bone::Spine2, Bone::Spine3] {
            values[bone.index() * 6 + 4] = 10.0;
        }
        let actor = actor_with_values(&values);
        let mut pose = Pose::rest(&rig);
        binding.apply(&actor, &rig, &mut pose);

        let chest = rig.index_of("Chest").unwrap();
        let expected = math::euler_deg(Vector3::new(30.0, 0.0, 0.0));
        assert!(quat_close(pose.local_rotation(chest), expected));
    }

    #[test]
    fn non_finite_sample_skips_only_that_bone() {
        let rig = test_rig();
        let binding = Retargeter::new(RetargetMap::humanoid())
            .foot_lock(false)
            .bind(&rig)
            .unwrap();

        let mut values = vec![0.0f32; 354];
        values[Bone::Spine.index() * 6 + 3] = f32::NAN;
        values[Bone::LeftUpLeg.index() * 6 + 4] = 45.0;
        let actor = actor_with_values(&values);

        let spine = rig.index_of("Spine").unwrap();
        let poisoned = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 1.0);
        let mut pose = Pose::rest(&rig);
        pose.set_local_rotation(spine, poisoned);

        binding.apply(&actor, &rig, &mut pose);

        // The NaN bone kept its previous rotation.
        assert!(quat_close(pose.local_rotation(spine), poisoned));
        // Healthy bones were still retargeted.
        let left_leg = rig.index_of("LeftUpperLeg").unwrap();
        let expected = math::euler_deg(Vector3::new(45.0, 0.0, 0.0));
        assert!(quat_close(pose.local_rotation(left_leg), expected));
    }

    #[test]
    fn hip_position_is_scaled_streamed_translation() {
        let rig = test_rig();
        let binding = Retargeter::new(RetargetMap::humanoid())
            .foot_lock(false)
            .bind(&rig)
            .unwrap();

        let mut values = vec![0.0f32; 354];
        // Wire centimetres: (0, 120, 0) decodes to (0, 1.2, 0) metres.
        values[1] = 120.0;
        let actor = actor_with_values(&values);
        let mut pose = Pose::rest(&rig);
        binding.apply(&actor, &rig, &mut pose);

        let expected = Vector3::new(0.0, 1.2 * binding.scale(), 0.0);
        assert!((pose.local_position(0) - expected).norm() < 1e-5);
    }

    #[test]
    fn foot_lock_pins_the_lower_foot() {
        let rig = test_rig();
        let binding = Retargeter::new(RetargetMap::humanoid()).bind(&rig).unwrap();

        // Stream the hip well above its rest height with legs straight.
        let mut values = vec![0.0f32; 354];
        values[1] = 300.0;
        let actor = actor_with_values(&values);
        let mut pose = Pose::rest(&rig);
        binding.apply(&actor, &rig, &mut pose);

        let world = rig.world_transforms(&pose);
        let left = rig.index_of("LeftFoot").unwrap();
        let right = rig.index_of("RightFoot").unwrap();
        let lower = world[left].0.y.min(world[right].0.y);
        let contact = rig.rest_world(left).0.y.min(rig.rest_world(right).0.y);
        assert!((lower - contact).abs() < 1e-4);
    }

    #[test]
    fn foot_lock_levels_on_the_supporting_foot() {
        // Asymmetric rig: the left foot rests at 0.5, the right at 0.0.
        let rig = Rig::new(vec![
            Joint::root("Hips", Vector3::new(0.0, 1.0, 0.0)),
            Joint::child("LeftUpperLeg", 0, Vector3::new(0.1, -0.2, 0.0)),
            Joint::child("LeftFoot", 1, Vector3::new(0.0, -0.3, 0.0)),
            Joint::child("RightUpperLeg", 0, Vector3::new(-0.1, -0.2, 0.0)),
            Joint::child("RightFoot", 3, Vector3::new(0.0, -0.8, 0.0)),
        ])
        .unwrap();
        let binding = Retargeter::new(RetargetMap::humanoid()).bind(&rig).unwrap();

        // Fold the right leg straight up; the left foot becomes the
        // supporting one and must land at its own rest height.
        let mut values = vec![0.0f32; 354];
        values[Bone::RightUpLeg.index() * 6 + 5] = -180.0;
        let actor = actor_with_values(&values);
        let mut pose = Pose::rest(&rig);
        binding.apply(&actor, &rig, &mut pose);

        let world = rig.world_transforms(&pose);
        let left = rig.index_of("LeftFoot").unwrap();
        let right = rig.index_of("RightFoot").unwrap();
        assert!(world[left].0.y < world[right].0.y);
        assert!((world[left].0.y - rig.rest_world(left).0.y).abs() < 1e-4);
    }

    #[test]
    fn unmapped_joints_are_untouched() {
        let mut joints = test_rig().joints().to_vec();
        joints.push(Joint::child("Ponytail", 8, Vector3::new(0.0, 0.1, -0.1)));
        let rig = Rig::new(joints).unwrap();
        let binding = Retargeter::new(RetargetMap::humanoid())
            .foot_lock(false)
            .bind(&rig)
            .unwrap();

        let mut values = vec![0.0f32; 354];
        values[Bone::Spine.index() * 6 + 3] = 20.0;
        let actor = actor_with_values(&values);
        let mut pose = Pose::rest(&rig);
        binding.apply(&actor, &rig, &mut pose);

        let ponytail = rig.index_of("Ponytail").unwrap();
        assert!(quat_close(
            pose.local_rotation(ponytail),
            rig.joint(ponytail).unwrap().rest_rotation
        ));
    }

    #[test]
    fn humanoid_map_covers_both_hands() {
        let map = RetargetMap::humanoid();
        assert_eq!(map.entries().len(), 49);
        let chest = map.entries().iter().find(|e| e.joint == "Chest").unwrap();
        assert_eq!(chest.channels, vec![Bone::Spine1, Bone::Spine2, Bone::Spine3]);
        let index = map
            .entries()
            .iter()
            .find(|e| e.joint == "LeftIndexProximal")
            .unwrap();
        assert_eq!(index.channels, vec![Bone::LeftInHandIndex, Bone::LeftHandIndex1]);
    }
}
