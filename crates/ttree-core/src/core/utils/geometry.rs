use nalgebra::{Matrix3, Point3, Quaternion, Rotation3, Unit, UnitQuaternion, Vector3};
use std::ops::Mul;

const DEGENERATE_NORM: f64 = 1e-12;

/// A 3-D affine map `x -> linear * x + translation`.
///
/// Composition follows matrix convention: `(a * b)` applies `b` first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    pub linear: Matrix3<f64>,
    pub translation: Vector3<f64>,
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl AffineTransform {
    pub fn identity() -> Self {
        Self {
            linear: Matrix3::identity(),
            translation: Vector3::zeros(),
        }
    }

    pub fn from_translation(offset: Vector3<f64>) -> Self {
        Self {
            linear: Matrix3::identity(),
            translation: offset,
        }
    }

    pub fn from_linear(linear: Matrix3<f64>) -> Self {
        Self {
            linear,
            translation: Vector3::zeros(),
        }
    }

    /// Right-handed rotation by `angle_degrees` around `axis`.
    ///
    /// Returns `None` for a zero-length axis.
    pub fn rotation(angle_degrees: f64, axis: &Vector3<f64>) -> Option<Self> {
        let axis = Unit::try_new(*axis, DEGENERATE_NORM)?;
        let rot = Rotation3::from_axis_angle(&axis, angle_degrees.to_radians());
        Some(Self::from_linear(*rot.matrix()))
    }

    /// The smallest rotation carrying direction `from` onto direction `to`.
    pub fn rotation_between(from: &Vector3<f64>, to: &Vector3<f64>) -> Option<Self> {
        if from.norm() < DEGENERATE_NORM || to.norm() < DEGENERATE_NORM {
            return None;
        }
        let rot = Rotation3::rotation_between(from, to).or_else(|| {
            // Antiparallel vectors: any axis perpendicular to `from` works.
            let helper = if from.x.abs() < 0.9 {
                Vector3::x()
            } else {
                Vector3::y()
            };
            let axis = Unit::try_new(from.cross(&helper), DEGENERATE_NORM)?;
            Some(Rotation3::from_axis_angle(&axis, std::f64::consts::PI))
        })?;
        Some(Self::from_linear(*rot.matrix()))
    }

    pub fn scaling(factors: &Vector3<f64>) -> Self {
        Self::from_linear(Matrix3::from_diagonal(factors))
    }

    /// Rotation described by the quaternion `w + xi + yj + zk`.
    ///
    /// The quaternion does not need to be normalized. Returns `None` for the zero
    /// quaternion.
    pub fn from_quaternion(w: f64, x: f64, y: f64, z: f64) -> Option<Self> {
        let q = Quaternion::new(w, x, y, z);
        if q.norm() < DEGENERATE_NORM {
            return None;
        }
        let unit = UnitQuaternion::from_quaternion(q);
        Some(Self::from_linear(*unit.to_rotation_matrix().matrix()))
    }

    /// The same map, re-centered so that `pivot` is its fixed point for the linear part.
    pub fn about_pivot(&self, pivot: &Point3<f64>) -> Self {
        Self::from_translation(pivot.coords) * *self * Self::from_translation(-pivot.coords)
    }

    pub fn inverse(&self) -> Option<Self> {
        let inv = self.linear.try_inverse()?;
        Some(Self {
            linear: inv,
            translation: -(inv * self.translation),
        })
    }

    pub fn transform_point(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.linear * p.coords + self.translation)
    }

    /// Applies only the linear part, as appropriate for direction-like quantities.
    pub fn transform_vector(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.linear * v
    }

    /// The rotation closest to the linear part of this map.
    pub fn rotation_part(&self) -> UnitQuaternion<f64> {
        UnitQuaternion::from_matrix(&self.linear)
    }

    pub fn is_identity(&self, tolerance: f64) -> bool {
        self.approx_eq(&Self::identity(), tolerance)
    }

    pub fn approx_eq(&self, other: &Self, tolerance: f64) -> bool {
        (self.linear - other.linear).amax() <= tolerance
            && (self.translation - other.translation).amax() <= tolerance
    }
}

impl Mul for AffineTransform {
    type Output = AffineTransform;

    fn mul(self, rhs: AffineTransform) -> AffineTransform {
        AffineTransform {
            linear: self.linear * rhs.linear,
            translation: self.linear * rhs.translation + self.translation,
        }
    }
}

pub fn centroid(points: &[Point3<f64>], weights: Option<&[f64]>) -> Option<Point3<f64>> {
    if points.is_empty() {
        return None;
    }
    let (sum, total) = match weights {
        Some(w) => points
            .iter()
            .zip(w)
            .fold((Vector3::zeros(), 0.0), |(acc, tot), (p, &m)| {
                (acc + p.coords * m, tot + m)
            }),
        None => (
            points.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords),
            points.len() as f64,
        ),
    };
    if total.abs() < DEGENERATE_NORM {
        return None;
    }
    Some(Point3::from(sum / total))
}
