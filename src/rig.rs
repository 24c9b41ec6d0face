//! Target skeleton model.
//!
//! A [`Rig`] is the host-supplied skeleton that capture data is retargeted
//! onto: an ordered joint table with parent links and a rest pose. Joints
//! are validated parent-before-child at construction, so the table cannot
//! express a cycle and forward kinematics is a single forward pass.
//!
//! A [`Pose`] carries per-joint local transforms; the retargeter overwrites
//! the mapped entries each frame and the host reads world transforms out.

use std::collections::HashMap;

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::{MocapError, Result};

/// One joint of a target skeleton, in its parent's frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Joint {
    pub name: String,
    /// Index of the parent joint; `None` for a root.
    pub parent: Option<usize>,
    pub rest_position: Vector3<f32>,
    pub rest_rotation: UnitQuaternion<f32>,
}

impl Joint {
    /// Root joint with an identity rest rotation.
    pub fn root(name: impl Into<String>, rest_position: Vector3<f32>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            rest_position,
            rest_rotation: UnitQuaternion::identity(),
        }
    }

    /// Child joint with an identity rest rotation.
    pub fn child(name: impl Into<String>, parent: usize, rest_position: Vector3<f32>) -> Self {
        Self {
            name: name.into(),
            parent: Some(parent),
            rest_position,
            rest_rotation: UnitQuaternion::identity(),
        }
    }
}

/// Validated joint table with precomputed rest-pose world transforms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Joint>", into = "Vec<Joint>")]
pub struct Rig {
    joints: Vec<Joint>,
    index_by_name: HashMap<String, usize>,
    rest_world: Vec<(Vector3<f32>, UnitQuaternion<f32>)>,
}

impl TryFrom<Vec<Joint>> for Rig {
    type Error = MocapError;

    fn try_from(joints: Vec<Joint>) -> Result<Self> {
        Rig::new(joints)
    }
}

impl From<Rig> for Vec<Joint> {
    fn from(rig: Rig) -> Self {
        rig.joints
    }
}

impl Rig {
    /// Build a rig from a joint table.
    ///
    /// Every parent must precede its child and names must be unique;
    /// anything else is an [`MocapError::InvalidRig`].
    pub fn new(joints: Vec<Joint>) -> Result<Self> {
        if joints.is_empty() {
            return Err(MocapError::invalid_rig("rig has no joints"));
        }
        let mut index_by_name = HashMap::with_capacity(joints.len());
        for (index, joint) in joints.iter().enumerate() {
            if let Some(parent) = joint.parent {
                if parent >= index {
                    return Err(MocapError::invalid_rig(format!(
                        "joint '{}' at {index} references parent {parent}; parents must precede children",
                        joint.name
                    )));
                }
            }
            if index_by_name.insert(joint.name.clone(), index).is_some() {
                return Err(MocapError::invalid_rig(format!(
                    "duplicate joint name '{}'",
                    joint.name
                )));
            }
        }

        let mut rest_world = Vec::with_capacity(joints.len());
        for joint in &joints {
            let (position, rotation) = match joint.parent {
                None => (joint.rest_position, joint.rest_rotation),
                Some(parent) => {
                    let (parent_pos, parent_rot): (Vector3<f32>, UnitQuaternion<f32>) =
                        rest_world[parent];
                    (
                        parent_pos + parent_rot * joint.rest_position,
                        parent_rot * joint.rest_rotation,
                    )
                }
            };
            rest_world.push((position, rotation));
        }

        Ok(Self { joints, index_by_name, rest_world })
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    pub fn joint(&self, index: usize) -> Option<&Joint> {
        self.joints.get(index)
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    /// Index of a joint by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index_by_name.get(name).copied()
    }

    /// Rest-pose world transform of a joint.
    pub fn rest_world(&self, index: usize) -> (Vector3<f32>, UnitQuaternion<f32>) {
        self.rest_world[index]
    }

    /// World rotation of the first root joint in the rest pose.
    pub fn root_rotation(&self) -> UnitQuaternion<f32> {
        self.joints
            .iter()
            .position(|j| j.parent.is_none())
            .map(|i| self.rest_world[i].1)
            .unwrap_or_else(UnitQuaternion::identity)
    }

    /// Forward kinematics: world transforms for every joint under a pose.
    pub fn world_transforms(&self, pose: &Pose) -> Vec<(Vector3<f32>, UnitQuaternion<f32>)> {
        let mut world = Vec::with_capacity(self.joints.len());
        for (index, joint) in self.joints.iter().enumerate() {
            let local_pos = pose.local_position(index);
            let local_rot = pose.local_rotation(index);
            let transform = match joint.parent {
                None => (local_pos, local_rot),
                Some(parent) => {
                    let (parent_pos, parent_rot): (Vector3<f32>, UnitQuaternion<f32>) =
                        world[parent];
                    (parent_pos + parent_rot * local_pos, parent_rot * local_rot)
                }
            };
            world.push(transform);
        }
        world
    }
}

/// Per-joint local transforms for one rig.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    local_positions: Vec<Vector3<f32>>,
    local_rotations: Vec<UnitQuaternion<f32>>,
}

impl Pose {
    /// Pose initialised to the rig's rest transforms.
    pub fn rest(rig: &Rig) -> Self {
        Self {
            local_positions: rig.joints().iter().map(|j| j.rest_position).collect(),
            local_rotations: rig.joints().iter().map(|j| j.rest_rotation).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.local_rotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.local_rotations.is_empty()
    }

    pub fn local_position(&self, index: usize) -> Vector3<f32> {
        self.local_positions[index]
    }

    pub fn local_rotation(&self, index: usize) -> UnitQuaternion<f32> {
        self.local_rotations[index]
    }

    pub fn set_local_position(&mut self, index: usize, position: Vector3<f32>) {
        self.local_positions[index] = position;
    }

    pub fn set_local_rotation(&mut self, index: usize, rotation: UnitQuaternion<f32>) {
        self.local_rotations[index] = rotation;
    }
}
