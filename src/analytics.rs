//! Closed-form integrals of the Laplace kernels over a flat triangle.
//!
//! These handle the inner integral of every boundary operator, so the outer Gauss rule
//! never sees the `1/r` or `1/r³` singularity directly.

use nalgebra::{Point3, Vector3};

use crate::config::DET_EPSILON;
use crate::containment::solid_angle;
use crate::geom::Triangle;


/// `ln((R⁺ + s⁺) / (R⁻ + s⁻))`, the integral of `1/R` along an edge.
///
/// `s` are the signed abscissae of the edge ends along its direction, measured from the
/// foot of the perpendicular from the observation point, and `r0_sq` is the squared
/// distance to the edge line. `R + s` is evaluated as `r0² / (R - s)` when `s < 0`.
fn edge_log(r0_sq: f64, s_minus: f64, s_plus: f64, r_minus: f64, r_plus: f64) -> f64 {
    let end = |s: f64, r: f64| if s >= 0.0 { r + s } else { r0_sq / (r - s) };
    (end(s_plus, r_plus) / end(s_minus, r_minus)).ln()
}

/// `∫_T 1/|p - y| dy`.
pub fn single_layer(p: &Point3<f64>, triangle: &Triangle) -> f64 {
    let n = triangle.normal();
    let h = (p - triangle.vertices[0]).dot(&n);
    let rho = p - n * h;
    let abs_h = h.abs();
    let mut total = 0.0;
    for i in 0..3 {
        let a = triangle.vertices[i];
        let b = triangle.vertices[(i + 1) % 3];
        let l = (b - a).normalize();
        let m = l.cross(&n);
        let t0 = (a - rho).dot(&m);
        let s_minus = (a - rho).dot(&l);
        let s_plus = (b - rho).dot(&l);
        let r_minus = (a - p).norm();
        let r_plus = (b - p).norm();
        let r0_sq = t0 * t0 + h * h;
        if t0.abs() > DET_EPSILON * (b - a).norm() {
            total += t0 * edge_log(r0_sq, s_minus, s_plus, r_minus, r_plus);
        }
        if abs_h > 0.0 {
            total -= abs_h
                * ((t0 * s_plus / (r0_sq + abs_h * r_plus)).atan()
                    - (t0 * s_minus / (r0_sq + abs_h * r_minus)).atan());
        }
    }
    total
}

/// `∫_T φ_i(y) (y - p)·n / |y - p|³ dy` for the three hat functions of `T`.
///
/// The components sum to the solid angle of `T` seen from `p` and vanish when `p` is in
/// the plane of the triangle.
pub fn double_layer(p: &Point3<f64>, triangle: &Triangle) -> Vector3<f64> {
    let scaled = triangle.scaled_normal();
    let two_area = scaled.norm();
    let n = scaled / two_area;
    let y = triangle.vertices.map(|v| v - p);
    let det = y[0].dot(&y[1].cross(&y[2]));
    if det.abs() <= DET_EPSILON * y[0].norm() * y[1].norm() * y[2].norm() {
        return Vector3::zeros();
    }
    let omega = solid_angle(p, triangle);
    let h = y[0].dot(&n);
    let rho = p + n * h;

    // edge j runs from vertex j to vertex j + 1
    let mut edges = [(Vector3::zeros(), 0.0); 3];
    for (j, edge) in edges.iter_mut().enumerate() {
        let a = triangle.vertices[j];
        let b = triangle.vertices[(j + 1) % 3];
        let l = (b - a).normalize();
        let m = l.cross(&n);
        let t0 = (a - rho).dot(&m);
        let gamma = edge_log(
            t0 * t0 + h * h,
            (a - rho).dot(&l),
            (b - rho).dot(&l),
            y[j].norm(),
            y[(j + 1) % 3].norm(),
        );
        *edge = (m, gamma);
    }

    Vector3::from_fn(|i, _| {
        let next = y[(i + 1) % 3];
        let last = y[(i + 2) % 3];
        let c = n.dot(&next.cross(&last)) / two_area;
        let g = n.cross(&(last - next)) / two_area;
        let flux: f64 = edges.iter().map(|(m, gamma)| g.dot(m) * gamma).sum();
        c * omega - h * flux
    })
}

/// Potential of a current dipole in an infinite unit-conductivity medium, without the `1/4π`.
pub fn dipole_potential(x: &Point3<f64>, position: &Point3<f64>, moment: &Vector3<f64>) -> f64 {
    let r = x - position;
    moment.dot(&r) / r.norm().powi(3)
}

/// Gradient of [`dipole_potential`] with respect to `x`.
pub fn dipole_gradient(
    x: &Point3<f64>,
    position: &Point3<f64>,
    moment: &Vector3<f64>,
) -> Vector3<f64> {
    let r = x - position;
    let norm = r.norm();
    let inv3 = 1.0 / norm.powi(3);
    moment * inv3 - r * (3.0 * moment.dot(&r) * inv3 / (norm * norm))
}
