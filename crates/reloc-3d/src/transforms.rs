use glam::{DMat3, DMat4, DQuat, DVec3, DVec4};

/// A rigid body transform: a unit quaternion rotation followed by a translation.
///
/// `dst_from_src * p_src = rotation * p_src + translation`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Isometry3 {
    /// Unit quaternion rotation.
    pub rotation: DQuat,
    /// Translation vector.
    pub translation: DVec3,
}

impl Default for Isometry3 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Isometry3 {
    /// The identity transform.
    pub const IDENTITY: Self = Self {
        rotation: DQuat::IDENTITY,
        translation: DVec3::ZERO,
    };

    /// Create a transform from a rotation and a translation.
    ///
    /// The rotation is normalized.
    pub fn new(rotation: DQuat, translation: DVec3) -> Self {
        Self {
            rotation: rotation.normalize(),
            translation,
        }
    }

    /// Create a transform from an axis, an angle in radians and a translation.
    ///
    /// The axis does not need to be normalized. A zero axis yields no rotation.
    pub fn from_axis_angle(axis: DVec3, angle: f64, translation: DVec3) -> Self {
        let rotation = match axis.try_normalize() {
            Some(axis) => DQuat::from_axis_angle(axis, angle),
            None => DQuat::IDENTITY,
        };
        Self {
            rotation,
            translation,
        }
    }

    /// Create a transform from a row-major rotation matrix and a translation.
    pub fn from_rotation_matrix(rotation: &[[f64; 3]; 3], translation: &[f64; 3]) -> Self {
        let rotation = DMat3::from_cols_array_2d(rotation).transpose();
        Self::new(
            DQuat::from_mat3(&rotation),
            DVec3::from_array(*translation),
        )
    }

    /// The rotation as a 3x3 matrix.
    pub fn rotation_matrix(&self) -> DMat3 {
        DMat3::from_quat(self.rotation)
    }

    /// The transform as a homogeneous 4x4 matrix.
    pub fn as_matrix(&self) -> DMat4 {
        let mut matrix = DMat4::from_quat(self.rotation);
        matrix.w_axis = DVec4::new(
            self.translation.x,
            self.translation.y,
            self.translation.z,
            1.0,
        );
        matrix
    }

    /// Apply the transform to a point.
    #[inline]
    pub fn transform_point(&self, point: DVec3) -> DVec3 {
        self.rotation * point + self.translation
    }

    /// The inverse transform.
    pub fn inverse(&self) -> Self {
        let rotation = self.rotation.inverse();
        Self {
            rotation,
            translation: -(rotation * self.translation),
        }
    }

    /// Compose two transforms: `(self * other) * p = self * (other * p)`.
    pub fn compose(&self, other: &Isometry3) -> Self {
        Self {
            rotation: (self.rotation * other.rotation).normalize(),
            translation: self.translation + self.rotation * other.translation,
        }
    }

    /// Exponential map from a twist `[omega, v]` (rotation first) to a transform.
    pub fn exp(twist: &[f64; 6]) -> Self {
        let omega = DVec3::new(twist[0], twist[1], twist[2]);
        let v = DVec3::new(twist[3], twist[4], twist[5]);

        let rotation = so3_exp(omega);
        let theta_sq = omega.length_squared();

        let translation = if theta_sq < 1e-10 {
            rotation * v
        } else {
            let theta = theta_sq.sqrt();
            let skew = skew(omega);
            let jacobian = DMat3::IDENTITY
                + skew * ((1.0 - theta.cos()) / theta_sq)
                + (skew * skew) * ((theta - theta.sin()) / (theta_sq * theta));
            jacobian * v
        };

        Self {
            rotation,
            translation,
        }
    }

    /// Rotation angle of the transform in radians, in `[0, pi]`.
    pub fn angle(&self) -> f64 {
        let q = self.rotation;
        2.0 * DVec3::new(q.x, q.y, q.z).length().atan2(q.w.abs())
    }
}

impl std::ops::Mul for Isometry3 {
    type Output = Isometry3;

    fn mul(self, rhs: Isometry3) -> Isometry3 {
        self.compose(&rhs)
    }
}

/// Exponential map of a rotation vector to a unit quaternion.
pub fn so3_exp(omega: DVec3) -> DQuat {
    let theta_sq = omega.length_squared();

    let (imag_factor, real_factor) = if theta_sq < 1e-10 {
        let theta_quad = theta_sq * theta_sq;
        (
            0.5 - theta_sq / 48.0 + theta_quad / 3840.0,
            1.0 - theta_sq / 8.0 + theta_quad / 384.0,
        )
    } else {
        let theta = theta_sq.sqrt();
        let half_theta = 0.5 * theta;
        (half_theta.sin() / theta, half_theta.cos())
    };

    let imag = omega * imag_factor;
    DQuat::from_xyzw(imag.x, imag.y, imag.z, real_factor).normalize()
}

/// Skew-symmetric matrix such that `skew(a) * b = a x b`.
pub fn skew(v: DVec3) -> DMat3 {
    DMat3::from_cols(
        DVec3::new(0.0, v.z, -v.y),
        DVec3::new(-v.z, 0.0, v.x),
        DVec3::new(v.y, -v.x, 0.0),
    )
}
