//! Bone frame math on double-precision `glam` types.
//!
//! Bones follow the usual rigging convention: the local +Y axis runs from
//! head to tail and roll rotates the frame about that axis.

use glam::{DMat3, DMat4, DQuat, DVec3};

/// Tolerance used when deciding whether a rotation block is orthonormal.
pub const ORTHONORMAL_EPSILON: f64 = 1e-9;

/// Bones shorter than this use the identity basis.
const DEGENERATE_LENGTH: f64 = 1e-12;

/// Fixed 90 degree rotation about +X mapping the rig's up axis onto the export convention.
pub fn bind_correction() -> DMat4 {
    DMat4::from_rotation_x(std::f64::consts::FRAC_PI_2)
}

/// Shortest-arc rotation taking +Y onto `direction` (which must be unit length).
fn align_y(direction: DVec3) -> DQuat {
    DQuat::from_rotation_arc(DVec3::Y, direction)
}

/// Builds the rest frame of a bone.
///
/// Returns the bone length and a 4x4 affine matrix whose translation is the
/// head, whose Y column points at the tail, and whose X/Z columns are rotated
/// by `roll` radians about Y.
pub fn bone_matrix(head: DVec3, tail: DVec3, roll: f64) -> (f64, DMat4) {
    let vector = tail - head;
    let length = vector.length();
    let base = if length > DEGENERATE_LENGTH {
        align_y(vector / length)
    } else {
        DQuat::IDENTITY
    };
    let rotation = base * DQuat::from_rotation_y(roll);
    (length, DMat4::from_rotation_translation(rotation, head))
}

/// Roll angle that turns the bone's local X axis onto `normal`.
///
/// The normal is first projected onto the plane orthogonal to the bone
/// axis. Returns 0 for degenerate bones or a normal parallel to the axis.
pub fn compute_roll(head: DVec3, tail: DVec3, normal: DVec3) -> f64 {
    let vector = tail - head;
    let length = vector.length();
    if length <= DEGENERATE_LENGTH {
        return 0.0;
    }
    let axis = vector / length;
    let projected = normal - axis * normal.dot(axis);
    if projected.length_squared() <= DEGENERATE_LENGTH {
        return 0.0;
    }
    let target = projected.normalize();
    let base_x = align_y(axis) * DVec3::X;
    let sin = base_x.cross(target).dot(axis);
    let cos = base_x.dot(target);
    sin.atan2(cos)
}

/// Unit normal of the plane through three points, `None` when they are collinear.
pub fn plane_normal(p0: DVec3, p1: DVec3, p2: DVec3) -> Option<DVec3> {
    let normal = (p1 - p0).cross(p2 - p1);
    if normal.length_squared() <= DEGENERATE_LENGTH {
        None
    } else {
        Some(normal.normalize())
    }
}

/// True when the upper 3x3 block is orthonormal and the bottom row is `(0, 0, 0, 1)`.
pub fn is_orthonormal(mat: &DMat4, eps: f64) -> bool {
    let rot = DMat3::from_mat4(*mat);
    let bottom = mat.row(3);
    (rot.transpose() * rot).abs_diff_eq(DMat3::IDENTITY, eps)
        && bottom.abs_diff_eq(glam::DVec4::W, eps)
}

/// Inverse of a rigid transform: transposed rotation and back-rotated translation.
pub fn rigid_inverse(mat: &DMat4) -> DMat4 {
    let rot = DMat3::from_mat4(*mat).transpose();
    let translation = -(rot * mat.w_axis.truncate());
    DMat4::from_cols(
        rot.x_axis.extend(0.0),
        rot.y_axis.extend(0.0),
        rot.z_axis.extend(0.0),
        translation.extend(1.0),
    )
}

/// Inverts an affine transform, taking the rigid fast path only when it is valid.
pub fn inverse_transform(mat: &DMat4) -> DMat4 {
    if is_orthonormal(mat, ORTHONORMAL_EPSILON) {
        rigid_inverse(mat)
    } else {
        mat.inverse()
    }
}
