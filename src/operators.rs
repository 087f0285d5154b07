//! Boundary-integral operators.
//!
//! **Context**: The symmetric BEM couples vertex potentials (P1 hat functions) and
//! triangle normal currents (P0) on every interface. Each operator below evaluates one
//! kernel between two surfaces, or between a surface and a point source, and **adds**
//! the scaled result into a destination owned by the caller. Drivers zero the destination
//! once and call several operators on it.
//!
//! **How it Works**: The inner integral over the source triangle is done in closed form
//! (see [`crate::analytics`]); the outer integral over the observation triangle uses a
//! Gauss rule. Rows are evaluated in parallel and added in index order afterwards, so the
//! result does not depend on thread scheduling.

use nalgebra::{Point3, Vector3};
use ndarray::{ArrayViewMut1, ArrayViewMut2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::analytics::{dipole_gradient, dipole_potential, double_layer, single_layer};
use crate::geom::{Surface, Triangle};
use crate::quadrature::{integrate, integrate_adaptive, Integrand};
use crate::sensors::Dipole;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::icosphere;
    use crate::geom::SourceMesh;
    use crate::quadrature::rule;
    use approx::assert_relative_eq;
    use ndarray::{Array1, Array2};
    use std::f64::consts::PI;

    fn sphere(radius: f64) -> SourceMesh {
        let (points, triangles) = icosphere(Point3::origin(), radius, 1);
        SourceMesh::from_parts("sphere", &points, &triangles).unwrap()
    }

    #[test]
    fn double_layer_rows_sum_to_solid_angle() {
        let outer = sphere(1.0);
        let inner = sphere(0.5);
        let (o, i) = (outer.as_source(), inner.as_source());
        let mut matrix = Array2::zeros((i.nb_triangles(), o.mesh.nb_vertices()));
        operator_d(&i, &o, 1.0, rule(3).unwrap(), &mut Block::new(matrix.view_mut()));
        // the closed outer sphere subtends 4π at every point of the inner one
        for t in 0..i.nb_triangles() {
            let area = i.triangle(t).area();
            assert_relative_eq!(matrix.row(t).sum(), 4.0 * PI * area, max_relative = 1e-6);
        }
    }

    #[test]
    fn adjoint_is_transposed_placement() {
        let a = sphere(1.0);
        let b = sphere(0.4);
        let (sa, sb) = (a.as_source(), b.as_source());
        let nodes = rule(2).unwrap();
        let mut d = Array2::zeros((sb.nb_triangles(), sa.mesh.nb_vertices()));
        operator_d(&sb, &sa, 2.0, nodes, &mut Block::new(d.view_mut()));
        let mut dt = Array2::zeros((sa.mesh.nb_vertices(), sb.nb_triangles()));
        operator_d_adjoint(&sb, &sa, 2.0, nodes, &mut Block::new(dt.view_mut()));
        assert_eq!(d.t(), dt);
    }

    #[test]
    fn single_layer_on_one_mesh_is_symmetric() {
        let s = sphere(1.0);
        let surface = s.as_source();
        let n = surface.nb_triangles();
        let mut matrix = Array2::zeros((n, n));
        operator_s(&surface, &surface, 1.0, rule(3).unwrap(), &mut Block::new(matrix.view_mut()));
        assert_eq!(matrix, matrix.t());
        assert!(matrix.iter().all(|v| *v > 0.0));
    }

    #[test]
    fn hypersingular_kills_constants() {
        // surface curls of a constant potential vanish
        let s = sphere(1.0);
        let surface = s.as_source();
        let n = surface.mesh.nb_vertices();
        let mut matrix = Array2::zeros((n, n));
        operator_n(&surface, &surface, 1.0, rule(2).unwrap(), &mut Block::new(matrix.view_mut()));
        for row in matrix.rows() {
            assert!(row.sum().abs() < 1e-10 * row.iter().map(|v| v.abs()).sum::<f64>());
        }
    }

    #[test]
    fn mass_rows_sum_to_area() {
        let s = sphere(1.0);
        let surface = s.as_source();
        let mut matrix = Array2::zeros((surface.nb_triangles(), surface.mesh.nb_vertices()));
        operator_p1p0(&surface, 0.5, &mut Block::new(matrix.view_mut()));
        for t in 0..surface.nb_triangles() {
            assert_relative_eq!(matrix.row(t).sum(), 0.5 * surface.triangle(t).area());
        }
    }

    #[test]
    fn mirrored_block_fills_both_halves() {
        let mut matrix = Array2::zeros((4, 4));
        let mut block = Block::new(matrix.view_mut()).mirrored();
        block.add(3, 1, 2.0);
        assert_eq!(matrix[[3, 1]], 2.0);
        assert_eq!(matrix[[1, 3]], 2.0);
    }

    #[test]
    fn offsets_shift_rows() {
        let mut matrix = Array2::zeros((2, 3));
        let mut block = Block::new(matrix.view_mut()).with_offsets(10, 0);
        block.add(11, 2, 1.0);
        assert_eq!(matrix[[1, 2]], 1.0);
    }

    #[test]
    fn dipole_kernels_agree_with_adaptive_integration() {
        let s = sphere(1.0);
        let surface = s.as_source();
        let dipole = Dipole::new(Point3::new(0.0, 0.05, 0.1), Vector3::new(0.0, 0.0, 1.0));
        let n = surface.nb_triangles();
        let mut gauss = Array1::zeros(n);
        let mut adaptive = Array1::zeros(n);
        operator_dipole_pot(&surface, &dipole, 1.0, rule(5).unwrap(), Integration::Gauss, &mut gauss.view_mut());
        operator_dipole_pot(&surface, &dipole, 1.0, rule(5).unwrap(), Integration::Adaptive, &mut adaptive.view_mut());
        for (g, a) in gauss.iter().zip(adaptive.iter()) {
            assert_relative_eq!(g, a, max_relative = 1e-2, epsilon = 1e-4);
        }
    }

    #[test]
    fn potential_derivative_integrates_flux() {
        // the flux of a dipole field through a closed surface around it vanishes
        let s = sphere(1.0);
        let surface = s.as_source();
        let dipole = Dipole::new(Point3::new(0.0, 0.1, 0.0), Vector3::new(1.0, 0.0, 0.0));
        let mut column = Array1::zeros(surface.mesh.nb_vertices());
        operator_dipole_pot_der(&surface, &dipole, 1.0, rule(5).unwrap(), Integration::Adaptive, &mut column.view_mut());
        let scale: f64 = column.iter().map(|v| v.abs()).sum();
        assert!(column.sum().abs() < 1e-3 * scale);
    }
}

/// How dipole kernels integrate over a triangle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Integration {
    /// Fixed Gauss rule.
    #[default]
    Gauss,
    /// Gauss rule with 4-way refinement until the estimate stabilises.
    Adaptive,
}

impl Integration {
    fn integrate<T, F>(self, triangle: &Triangle, nodes: &[[f64; 3]], f: F) -> T
    where
        T: Integrand,
        F: Fn(&Point3<f64>) -> T,
    {
        match self {
            Integration::Gauss => integrate(triangle, nodes, f),
            Integration::Adaptive => integrate_adaptive(triangle, nodes, &f),
        }
    }
}

/// Additive destination for an operator: a matrix view addressed by global DOF indices.
///
/// Entry `(row, col)` lands at `(row - row_offset, col - col_offset)`. A mirrored block
/// also adds every value at the transposed position, for symmetric matrices assembled
/// from one triangle only; it expects equal offsets.
pub struct Block<'a> {
    matrix: ArrayViewMut2<'a, f64>,
    row_offset: usize,
    col_offset: usize,
    mirrored: bool,
}

impl<'a> Block<'a> {
    pub fn new(matrix: ArrayViewMut2<'a, f64>) -> Self {
        Self {
            matrix,
            row_offset: 0,
            col_offset: 0,
            mirrored: false,
        }
    }

    pub fn with_offsets(mut self, row_offset: usize, col_offset: usize) -> Self {
        self.row_offset = row_offset;
        self.col_offset = col_offset;
        self
    }

    pub fn mirrored(mut self) -> Self {
        self.mirrored = true;
        self
    }

    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        self.matrix[[row - self.row_offset, col - self.col_offset]] += value;
        if self.mirrored {
            self.matrix[[col - self.row_offset, row - self.col_offset]] += value;
        }
    }
}

/// `∫_{T1} ∫_{T2} 1/|x - y|` for every triangle pair, computed in parallel per `T1`.
///
/// On a single mesh only `T2 >= T1` is evaluated and the value is used for both orders.
fn single_layer_rows(s1: &Surface, s2: &Surface, nodes: &[[f64; 3]]) -> Vec<Vec<f64>> {
    let same = s1.same_mesh(s2);
    (0..s1.nb_triangles())
        .into_par_iter()
        .map(|i| {
            let t1 = s1.triangle(i);
            let start = if same { i } else { 0 };
            (start..s2.nb_triangles())
                .map(|j| {
                    let t2 = s2.triangle(j);
                    integrate(&t1, nodes, |x| single_layer(x, &t2))
                })
                .collect()
        })
        .collect()
}

/// Single layer: P0 of `s1` against P0 of `s2`.
pub fn operator_s(s1: &Surface, s2: &Surface, coeff: f64, nodes: &[[f64; 3]], block: &mut Block) {
    let same = s1.same_mesh(s2);
    for (i, row) in single_layer_rows(s1, s2, nodes).into_iter().enumerate() {
        let start = if same { i } else { 0 };
        for (k, value) in row.into_iter().enumerate() {
            let j = start + k;
            block.add(s1.triangle_dof(i), s2.triangle_dof(j), coeff * value);
            if same && i != j {
                block.add(s2.triangle_dof(j), s1.triangle_dof(i), coeff * value);
            }
        }
    }
}

/// Double-layer weights of every `T2` seen from every `T1`.
fn double_layer_rows(s1: &Surface, s2: &Surface, nodes: &[[f64; 3]]) -> Vec<Vec<Vector3<f64>>> {
    (0..s1.nb_triangles())
        .into_par_iter()
        .map(|i| {
            let t1 = s1.triangle(i);
            (0..s2.nb_triangles())
                .map(|j| {
                    let t2 = s2.triangle(j);
                    integrate(&t1, nodes, |x| double_layer(x, &t2))
                })
                .collect()
        })
        .collect()
}

/// Double layer: P0 of `s1` (rows) against P1 of `s2` (columns).
pub fn operator_d(s1: &Surface, s2: &Surface, coeff: f64, nodes: &[[f64; 3]], block: &mut Block) {
    for (i, row) in double_layer_rows(s1, s2, nodes).into_iter().enumerate() {
        for (j, weights) in row.into_iter().enumerate() {
            for (dof, w) in s2.vertex_dofs_of(j).into_iter().zip(weights.iter()) {
                block.add(s1.triangle_dof(i), dof, coeff * w);
            }
        }
    }
}

/// Adjoint double layer: the values of [`operator_d`] placed at transposed positions,
/// P1 of `s2` (rows) against P0 of `s1` (columns).
pub fn operator_d_adjoint(s1: &Surface, s2: &Surface, coeff: f64, nodes: &[[f64; 3]], block: &mut Block) {
    for (i, row) in double_layer_rows(s1, s2, nodes).into_iter().enumerate() {
        for (j, weights) in row.into_iter().enumerate() {
            for (dof, w) in s2.vertex_dofs_of(j).into_iter().zip(weights.iter()) {
                block.add(dof, s1.triangle_dof(i), coeff * w);
            }
        }
    }
}

/// Edge opposite each vertex, `c - b` for vertex `a`, scaled by `1 / 2|T|`.
///
/// This is `-n × ∇φ` for the three hat functions of the triangle.
fn surface_curls(triangle: &Triangle) -> [Vector3<f64>; 3] {
    let [a, b, c] = triangle.vertices;
    let two_area = 2.0 * triangle.area();
    [(c - b) / two_area, (a - c) / two_area, (b - a) / two_area]
}

/// Hypersingular operator in Nédélec form: P1 of `s1` against P1 of `s2`.
pub fn operator_n(s1: &Surface, s2: &Surface, coeff: f64, nodes: &[[f64; 3]], block: &mut Block) {
    let same = s1.same_mesh(s2);
    let curls2: Vec<_> = (0..s2.nb_triangles()).map(|j| surface_curls(&s2.triangle(j))).collect();
    for (i, row) in single_layer_rows(s1, s2, nodes).into_iter().enumerate() {
        let curls1 = surface_curls(&s1.triangle(i));
        let dofs1 = s1.vertex_dofs_of(i);
        let start = if same { i } else { 0 };
        for (k, value) in row.into_iter().enumerate() {
            let j = start + k;
            let dofs2 = s2.vertex_dofs_of(j);
            for (a, ca) in dofs1.iter().zip(curls1.iter()) {
                for (b, cb) in dofs2.iter().zip(curls2[j].iter()) {
                    let entry = coeff * ca.dot(cb) * value;
                    block.add(*a, *b, entry);
                    if same && i != j {
                        block.add(*b, *a, entry);
                    }
                }
            }
        }
    }
}

/// Mass matrix `∫_T φ_j = |T|/3`: P0 (rows) against P1 (columns) of one surface.
pub fn operator_p1p0(surface: &Surface, coeff: f64, block: &mut Block) {
    for t in 0..surface.nb_triangles() {
        let value = coeff * surface.triangle(t).area() / 3.0;
        for dof in surface.vertex_dofs_of(t) {
            block.add(surface.triangle_dof(t), dof, value);
        }
    }
}

/// Magnetic field at `point` of the P1 potentials of `surface`, without the conductivity
/// jump. Rows `row..row + 3` hold the field components.
pub fn operator_ferguson(point: &Point3<f64>, surface: &Surface, row: usize, coeff: f64, block: &mut Block) {
    for t in 0..surface.nb_triangles() {
        let triangle = surface.triangle(t);
        let s = single_layer(point, &triangle);
        for (dof, curl) in surface.vertex_dofs_of(t).into_iter().zip(surface_curls(&triangle)) {
            for k in 0..3 {
                block.add(row + k, dof, coeff * curl[k] * s);
            }
        }
    }
}

/// Infinite-medium dipole potential integrated on the P0 basis of `surface`.
pub fn operator_dipole_pot(
    surface: &Surface,
    dipole: &Dipole,
    coeff: f64,
    nodes: &[[f64; 3]],
    integration: Integration,
    column: &mut ArrayViewMut1<f64>,
) {
    for t in 0..surface.nb_triangles() {
        let triangle = surface.triangle(t);
        let value = integration.integrate(&triangle, nodes, |x| {
            dipole_potential(x, &dipole.position, &dipole.moment)
        });
        column[surface.triangle_dof(t)] += coeff * value;
    }
}

/// Normal derivative of the infinite-medium dipole potential on the P1 basis of `surface`.
pub fn operator_dipole_pot_der(
    surface: &Surface,
    dipole: &Dipole,
    coeff: f64,
    nodes: &[[f64; 3]],
    integration: Integration,
    column: &mut ArrayViewMut1<f64>,
) {
    for t in 0..surface.nb_triangles() {
        let triangle = surface.triangle(t);
        let n = triangle.normal();
        let weights = integration.integrate(&triangle, nodes, |x| {
            triangle.barycentric(x) * dipole_gradient(x, &dipole.position, &dipole.moment).dot(&n)
        });
        for (dof, w) in surface.vertex_dofs_of(t).into_iter().zip(weights.iter()) {
            column[dof] += coeff * w;
        }
    }
}
