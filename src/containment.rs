//! Spatial containment tests for closed triangulated surfaces.
//!
//! Point location in nested conductivity domains reduces to asking, for each
//! interface, whether a point lies inside the closed surface it forms. The
//! answer comes from the total solid angle the surface subtends at the point:
//! `4π` inside, `0` outside. Axis-aligned bounding boxes prefilter the
//! quadratic triangle/triangle intersection checks.

use nalgebra::{Point3, Vector3};

use crate::config::DET_EPSILON;
use crate::geom::Triangle;

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn unit_triangle() -> Triangle {
        Triangle::new([
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ])
    }

    #[test]
    fn solid_angle_sign_follows_normal() {
        let triangle = unit_triangle();
        // the normal points to +z, so a point below sees the positive side
        let below = solid_angle(&Point3::new(0.2, 0.2, -1.0), &triangle);
        let above = solid_angle(&Point3::new(0.2, 0.2, 1.0), &triangle);
        assert!(below > 0.0);
        assert!((below + above).abs() < 1e-12);
    }

    #[test]
    fn solid_angle_of_coplanar_point_is_zero() {
        let triangle = unit_triangle();
        assert_eq!(solid_angle(&Point3::new(3.0, 3.0, 0.0), &triangle), 0.0);
    }

    #[test]
    fn solid_angle_close_to_half_sphere_near_centre() {
        let triangle = unit_triangle();
        let omega = solid_angle(&Point3::new(0.25, 0.25, -1e-9), &triangle);
        assert!((omega - 2.0 * PI).abs() < 1e-6, "omega: {}", omega);
    }

    #[test]
    fn solid_angle_does_not_depend_on_units() {
        let triangle = unit_triangle();
        let p = Point3::new(0.3, 0.2, -0.4);
        let scale = 1e-5;
        let small = Triangle::new(triangle.vertices.map(|v| Point3::from(v.coords * scale)));
        let omega = solid_angle(&p, &triangle);
        assert!(omega > 0.0);
        assert!((solid_angle(&Point3::from(p.coords * scale), &small) - omega).abs() < 1e-12);
    }

    #[test]
    fn aabb_overlap() {
        let a = Aabb::from_points(&[Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0)]);
        let b = Aabb::from_points(&[Point3::new(0.5, 0.5, 0.5), Point3::new(2.0, 2.0, 2.0)]);
        let c = Aabb::from_points(&[Point3::new(1.5, 1.5, 1.5), Point3::new(2.0, 2.0, 2.0)]);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert!(a.contains(&Point3::new(0.5, 0.5, 0.5)));
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, PartialEq)]
pub struct Aabb {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl Aabb {
    /// Smallest box containing all `points`. An empty slice gives an inverted box
    /// that intersects nothing.
    pub fn from_points(points: &[Point3<f64>]) -> Self {
        let mut min = Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY);
        let mut max = Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
        for p in points {
            for k in 0..3 {
                min[k] = min[k].min(p[k]);
                max[k] = max[k].max(p[k]);
            }
        }
        Self { min, max }
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        (0..3).all(|k| self.min[k] <= other.max[k] && other.min[k] <= self.max[k])
    }

    pub fn contains(&self, p: &Point3<f64>) -> bool {
        (0..3).all(|k| self.min[k] <= p[k] && p[k] <= self.max[k])
    }
}

/// Signed solid angle subtended by `triangle` at `p`.
///
/// Positive when `p` lies on the side opposite to the triangle normal, so that a
/// closed surface with outward normals gives `+4π` at interior points.
pub fn solid_angle(p: &Point3<f64>, triangle: &Triangle) -> f64 {
    let [a, b, c] = triangle.vertices;
    let y1 = a - p;
    let y2 = b - p;
    let y3 = c - p;
    let det = y1.dot(&y2.cross(&y3));
    let n1 = y1.norm();
    let n2 = y2.norm();
    let n3 = y3.norm();
    if det.abs() <= DET_EPSILON * n1 * n2 * n3 {
        return 0.0;
    }
    let denom = n1 * n2 * n3 + n1 * y2.dot(&y3) + n2 * y3.dot(&y1) + n3 * y1.dot(&y2);
    2.0 * det.atan2(denom)
}

/// Whether the segment `[p, q]` crosses the interior of `triangle`.
///
/// Möller–Trumbore ray test restricted to the segment parameter range.
pub(crate) fn segment_hits_triangle(p: &Point3<f64>, q: &Point3<f64>, triangle: &Triangle) -> bool {
    let [a, b, c] = triangle.vertices;
    let dir: Vector3<f64> = q - p;
    let e1 = b - a;
    let e2 = c - a;
    let h = dir.cross(&e2);
    let det = e1.dot(&h);
    if det.abs() < DET_EPSILON * e1.norm() * e2.norm() * dir.norm() {
        return false; // parallel or coplanar
    }
    let inv = 1.0 / det;
    let s = p - a;
    let u = inv * s.dot(&h);
    if !(0.0..=1.0).contains(&u) {
        return false;
    }
    let qv = s.cross(&e1);
    let v = inv * dir.dot(&qv);
    if v < 0.0 || u + v > 1.0 {
        return false;
    }
    let t = inv * e2.dot(&qv);
    (0.0..=1.0).contains(&t)
}

/// Whether two triangles intersect. Coplanar overlaps are not detected.
pub fn triangles_intersect(t1: &Triangle, t2: &Triangle) -> bool {
    if !t1.aabb().intersects(&t2.aabb()) {
        return false;
    }
    let edges_cross = |from: &Triangle, to: &Triangle| {
        (0..3).any(|i| {
            segment_hits_triangle(&from.vertices[i], &from.vertices[(i + 1) % 3], to)
        })
    };
    edges_cross(t1, t2) || edges_cross(t2, t1)
}
