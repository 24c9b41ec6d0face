//! Rotation helpers in the capture device's conventions.
//!
//! The device transmits rotations as Euler angles in degrees and composes
//! them in Y·X·Z order (heading, then attitude, then bank), matching the
//! engine it was built against. All quaternion work in this crate goes
//! through [`euler_deg`] so the convention lives in exactly one place.

use nalgebra::{UnitQuaternion, Vector3};

/// Quaternion for a device-convention Euler rotation given in degrees.
///
/// Composition order is `Qy × Qx × Qz`.
pub fn euler_deg(angles: Vector3<f32>) -> UnitQuaternion<f32> {
    let qx = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), angles.x.to_radians());
    let qy = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), angles.y.to_radians());
    let qz = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), angles.z.to_radians());
    qy * qx * qz
}

/// Whether every component of the vector is a finite number.
///
/// Capture hardware occasionally emits NaN or infinity for a glitching
/// sensor; such samples are rejected per bone rather than per frame.
pub fn is_finite(v: &Vector3<f32>) -> bool {
    v.x.is_finite() && v.y.is_finite() && v.z.is_finite()
}
