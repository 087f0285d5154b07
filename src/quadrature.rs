//! Symmetric Gauss rules on triangles and adaptive 4-way refinement.
//!
//! Nodes are stored as `[s, t, w]`: the point is `a + s (b - a) + t (c - a)` and the
//! weights of a rule sum to one, so integrals are `area · Σ w f(x)`.

// Allow excessive precision for tabulated rule constants
#![allow(clippy::excessive_precision)]

use std::iter::Sum;
use std::ops::{Mul, Sub};

use nalgebra::{Point3, Vector3};

use crate::config::{ADAPTIVE_FLOOR, ADAPTIVE_MAX_LEVEL, ADAPTIVE_TOLERANCE};
use crate::error::AssemblyError;
use crate::geom::Triangle;

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit() -> Triangle {
        Triangle::new([
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ])
    }

    #[test]
    fn order_zero_is_rejected() {
        assert!(matches!(rule(0), Err(AssemblyError::QuadratureOrder(0))));
    }

    #[test]
    fn weights_sum_to_one() {
        for order in 1..=6 {
            let total: f64 = rule(order).unwrap().iter().map(|n| n[2]).sum();
            assert_relative_eq!(total, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn polynomials_are_integrated_exactly() {
        // ∫ x^a y^b over the unit triangle is a! b! / (a + b + 2)!
        let quadratic = integrate(&unit(), rule(2).unwrap(), |p| p.x * p.x);
        assert_relative_eq!(quadratic, 1.0 / 12.0, epsilon = 1e-14);
        for order in 3..=5 {
            let quartic = integrate(&unit(), rule(order).unwrap(), |p| p.x * p.x * p.y * p.y);
            assert_relative_eq!(quartic, 1.0 / 180.0, epsilon = 1e-14);
        }
    }

    #[test]
    fn adaptive_stops_on_vanishing_integrals() {
        let calls = std::cell::Cell::new(0usize);
        let odd = |p: &Point3<f64>| {
            calls.set(calls.get() + 1);
            p.x - p.y
        };
        let value = integrate_adaptive(&unit(), rule(3).unwrap(), &odd);
        assert!(value.abs() < 1e-15);
        // one coarse pass and one refinement
        assert_eq!(calls.get(), 5 * rule(3).unwrap().len());
    }

    #[test]
    fn adaptive_handles_near_singularity() {
        let triangle = unit();
        let source = Point3::new(0.3, 0.3, 0.01);
        let kernel = |p: &Point3<f64>| 1.0 / (p - source).norm();
        let nodes = rule(3).unwrap();
        let adaptive = integrate_adaptive(&triangle, nodes, &kernel);
        // brute force on a fine regular subdivision
        let mut pieces = vec![triangle];
        for _ in 0..6 {
            pieces = pieces.iter().flat_map(|t| t.subdivide()).collect();
        }
        let reference: f64 = pieces.iter().map(|t| integrate(t, nodes, kernel)).sum();
        assert_relative_eq!(adaptive, reference, max_relative = 1e-3);
    }
}

/// Centroid rule, exact for degree 1.
static RULE_1: [[f64; 3]; 1] = [[1.0 / 3.0, 1.0 / 3.0, 1.0]];

/// Interior three-point rule, exact for degree 2.
static RULE_2: [[f64; 3]; 3] = [
    [1.0 / 6.0, 1.0 / 6.0, 1.0 / 3.0],
    [2.0 / 3.0, 1.0 / 6.0, 1.0 / 3.0],
    [1.0 / 6.0, 2.0 / 3.0, 1.0 / 3.0],
];

/// Six points, exact for degree 4.
static RULE_3: [[f64; 3]; 6] = [
    [0.445948490915965, 0.445948490915965, 0.223381589678011],
    [0.445948490915965, 0.108103018168070, 0.223381589678011],
    [0.108103018168070, 0.445948490915965, 0.223381589678011],
    [0.091576213509771, 0.091576213509771, 0.109951743655322],
    [0.091576213509771, 0.816847572980459, 0.109951743655322],
    [0.816847572980459, 0.091576213509771, 0.109951743655322],
];

/// Seven points, exact for degree 5.
static RULE_4: [[f64; 3]; 7] = [
    [1.0 / 3.0, 1.0 / 3.0, 0.225],
    [0.470142064105115, 0.470142064105115, 0.132394152788506],
    [0.470142064105115, 0.059715871789770, 0.132394152788506],
    [0.059715871789770, 0.470142064105115, 0.132394152788506],
    [0.101286507323456, 0.101286507323456, 0.125939180544827],
    [0.101286507323456, 0.797426985353087, 0.125939180544827],
    [0.797426985353087, 0.101286507323456, 0.125939180544827],
];

/// Twelve points, exact for degree 6.
static RULE_5: [[f64; 3]; 12] = [
    [0.249286745170910, 0.249286745170910, 0.116786275726379],
    [0.249286745170910, 0.501426509658179, 0.116786275726379],
    [0.501426509658179, 0.249286745170910, 0.116786275726379],
    [0.063089014491502, 0.063089014491502, 0.050844906370207],
    [0.063089014491502, 0.873821971016996, 0.050844906370207],
    [0.873821971016996, 0.063089014491502, 0.050844906370207],
    [0.310352451033784, 0.636502499121399, 0.082851075618374],
    [0.636502499121399, 0.310352451033784, 0.082851075618374],
    [0.310352451033784, 0.053145049844817, 0.082851075618374],
    [0.053145049844817, 0.310352451033784, 0.082851075618374],
    [0.636502499121399, 0.053145049844817, 0.082851075618374],
    [0.053145049844817, 0.636502499121399, 0.082851075618374],
];

/// Nodes of the rule selected by `order`. Orders above 5 use the twelve-point rule.
pub fn rule(order: usize) -> Result<&'static [[f64; 3]], AssemblyError> {
    match order {
        0 => Err(AssemblyError::QuadratureOrder(order)),
        1 => Ok(&RULE_1),
        2 => Ok(&RULE_2),
        3 => Ok(&RULE_3),
        4 => Ok(&RULE_4),
        _ => Ok(&RULE_5),
    }
}

/// Values that can be integrated and compared between refinement levels.
pub trait Integrand: Copy + Sum + Sub<Output = Self> + Mul<f64, Output = Self> {
    fn magnitude(&self) -> f64;
}

impl Integrand for f64 {
    fn magnitude(&self) -> f64 {
        self.abs()
    }
}

impl Integrand for Vector3<f64> {
    fn magnitude(&self) -> f64 {
        self.norm()
    }
}

/// `∫_T f` with a fixed rule.
pub fn integrate<T, F>(triangle: &Triangle, nodes: &[[f64; 3]], f: F) -> T
where
    T: Integrand,
    F: Fn(&Point3<f64>) -> T,
{
    let area = triangle.area();
    nodes
        .iter()
        .map(|&[s, t, w]| f(&triangle.point(s, t)) * (w * area))
        .sum()
}

/// `∫_T f`, splitting triangles in four until the estimate stabilises.
pub fn integrate_adaptive<T, F>(triangle: &Triangle, nodes: &[[f64; 3]], f: &F) -> T
where
    T: Integrand,
    F: Fn(&Point3<f64>) -> T,
{
    let coarse = integrate(triangle, nodes, f);
    refine(triangle, nodes, f, coarse, 1)
}

fn refine<T, F>(triangle: &Triangle, nodes: &[[f64; 3]], f: &F, coarse: T, level: usize) -> T
where
    T: Integrand,
    F: Fn(&Point3<f64>) -> T,
{
    let children = triangle.subdivide();
    let parts = children.map(|child| integrate(&child, nodes, f));
    let fine: T = parts.iter().copied().sum();
    if level >= ADAPTIVE_MAX_LEVEL
        || (fine - coarse).magnitude() <= ADAPTIVE_TOLERANCE * fine.magnitude() + ADAPTIVE_FLOOR
    {
        return fine;
    }
    children
        .iter()
        .zip(parts)
        .map(|(child, part)| refine(child, nodes, f, part, level + 1))
        .sum()
}
