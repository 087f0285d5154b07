use std::collections::BTreeSet;
use std::f64::consts::PI;

use approx::assert_relative_eq;
use meegbem::analytics::double_layer;
use meegbem::assemble::{dip_source_mat, eit_source_mat, head_mat, Options};
use meegbem::config::K;
use meegbem::containment::solid_angle;
use meegbem::generators::nested_spheres;
use meegbem::geometry::{DofOrdering, Geometry};
use meegbem::operators::{operator_d, Block, Integration};
use meegbem::quadrature::{integrate, rule};
use meegbem::sensors::{Dipole, Electrodes};
use nalgebra::{Point3, Vector3};
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};

/// Brain, skull and scalp with the usual 1 : 1/80 : 1 conductivity ratios.
fn three_spheres(level: usize) -> Geometry {
    nested_spheres(&[(0.87, 1.0), (0.92, 0.0125), (1.0, 1.0)], level)
        .unwrap()
        .finalize(DofOrdering::VerticesFirst)
        .unwrap()
}

fn frobenius(matrix: &Array2<f64>) -> f64 {
    matrix.iter().map(|v| v * v).sum::<f64>().sqrt()
}

#[test]
fn unknowns_are_counted_per_layer() {
    let geometry = three_spheres(1);
    // 42 vertices and 80 triangles per sphere, no triangle unknowns on the scalp
    assert_eq!(geometry.dof_count(), 3 * 42 + 2 * 80);
    assert_eq!(geometry.nb_parameters(), 3 * 42 + 3 * 80);
    assert_eq!(geometry.outermost_domain().unwrap().name(), "Air");
    assert!(geometry.self_check().is_empty());
}

#[test]
fn random_points_land_in_their_layer() {
    let geometry = three_spheres(2);
    let mut rng = rand::rngs::StdRng::seed_from_u64(42);
    for _ in 0..50 {
        let direction = Vector3::new(
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
        )
        .try_normalize(1e-6)
        .unwrap_or_else(Vector3::z);
        let brain = Point3::from(direction * rng.random_range(0.0..0.8));
        assert_eq!(geometry.conducting_domain(&brain).unwrap().name(), "layer_0");
        let air = Point3::from(direction * rng.random_range(1.1..3.0));
        assert!(geometry.conducting_domain(&air).is_err());
    }
}

#[test]
fn closed_surface_subtends_full_solid_angle() {
    let geometry = three_spheres(1);
    let scalp = geometry.surface(geometry.mesh_by_name("sphere_2").unwrap());
    let total = |p: Point3<f64>| -> f64 {
        (0..scalp.nb_triangles())
            .map(|t| solid_angle(&p, &scalp.triangle(t)))
            .sum()
    };
    assert_relative_eq!(total(Point3::new(0.1, -0.2, 0.3)), 4.0 * PI, epsilon = 1e-10);
    assert_relative_eq!(total(Point3::new(0.0, 0.0, 2.0)), 0.0, epsilon = 1e-10);
}

#[test]
fn double_layer_rows_integrate_the_solid_angle() {
    let geometry = three_spheres(1);
    let brain = geometry.surface(geometry.mesh_by_name("sphere_0").unwrap());
    let scalp = geometry.surface(geometry.mesh_by_name("sphere_2").unwrap());
    let total = geometry.nb_parameters();
    let mut matrix = Array2::zeros((total, total));
    let nodes = rule(3).unwrap();

    operator_d(&brain, &scalp, 1.0, nodes, &mut Block::new(matrix.view_mut()));
    for t in 0..brain.nb_triangles() {
        let row_sum = matrix.row(brain.triangle_dof(t)).sum();
        assert_relative_eq!(row_sum, 4.0 * PI * brain.triangle(t).area(), max_relative = 1e-9);
    }

    matrix.fill(0.0);
    operator_d(&scalp, &brain, 1.0, nodes, &mut Block::new(matrix.view_mut()));
    for t in 0..scalp.nb_triangles() {
        let row_sum = matrix.row(scalp.triangle_dof(t)).sum();
        assert!(row_sum.abs() < 1e-9, "triangle {}: {}", t, row_sum);
    }
}

#[test]
fn assembly_is_reproducible() {
    let geometry = three_spheres(1);
    let options = Options::default();
    let dipoles: Vec<Dipole> = (0..8)
        .map(|i| {
            let angle = i as f64 * PI / 4.0;
            Dipole::new(
                Point3::new(0.5 * angle.cos(), 0.5 * angle.sin(), 0.1),
                Vector3::new(0.0, angle.sin(), 1.0),
            )
        })
        .collect();
    let first = dip_source_mat(&geometry, &dipoles, None, &options).unwrap();
    let second = dip_source_mat(&geometry, &dipoles, None, &options).unwrap();
    assert_eq!(first.matrix, second.matrix);
    assert!(first.report.is_clean());

    let head = head_mat(&geometry, &options).unwrap();
    assert_eq!(head.matrix, head_mat(&geometry, &options).unwrap().matrix);
}

#[test]
fn adaptive_dipole_integration_agrees_with_gauss() {
    let geometry = three_spheres(1);
    let dipoles = [Dipole::new(Point3::new(0.1, 0.2, 0.3), Vector3::new(1.0, 0.0, 0.5))];
    let gauss = Options {
        gauss_order: 5,
        ..Default::default()
    };
    let adaptive = Options {
        integration: Integration::Adaptive,
        ..gauss
    };
    let a = dip_source_mat(&geometry, &dipoles, None, &gauss).unwrap().matrix;
    let b = dip_source_mat(&geometry, &dipoles, None, &adaptive).unwrap().matrix;
    assert!(frobenius(&(&a - &b)) < 1e-3 * frobenius(&a));
}

#[test]
fn eit_entries_converge_to_the_brain_double_layer() {
    let geometry = nested_spheres(&[(0.5, 1.0), (1.0, 0.5)], 1)
        .unwrap()
        .finalize(DofOrdering::VerticesFirst)
        .unwrap();
    let (inner, outer) = (
        geometry.mesh_by_name("sphere_0").unwrap(),
        geometry.mesh_by_name("sphere_1").unwrap(),
    );
    let (brain, scalp) = (geometry.surface(inner), geometry.surface(outer));
    let patch = scalp.triangle(0);
    let electrodes =
        Electrodes::on_outermost_interface(&geometry, &[patch.centroid()], None).unwrap();
    assert_eq!(electrodes.iter().next().unwrap().patch, vec![(outer, 0)]);
    let assemble = |order| {
        let options = Options {
            gauss_order: order,
            ..Default::default()
        };
        eit_source_mat(&geometry, &electrodes, &options).unwrap().matrix
    };

    // brain double layer averaged over the patch on a fine subdivision
    let o = geometry.relative_orientation(outer, inner) as f64;
    let mut pieces = vec![patch];
    for _ in 0..4 {
        pieces = pieces.iter().flat_map(|t| t.subdivide()).collect();
    }
    let mut reference = Array1::<f64>::zeros(geometry.dof_count());
    for t in 0..brain.nb_triangles() {
        let triangle = brain.triangle(t);
        let weights: Vector3<f64> = pieces
            .iter()
            .map(|piece| integrate(piece, rule(5).unwrap(), |x| double_layer(x, &triangle)))
            .sum();
        for (dof, w) in brain.vertex_dofs_of(t).into_iter().zip(weights.iter()) {
            reference[dof] -= K * o * w / patch.area();
        }
    }
    let brain_dofs: BTreeSet<usize> = (0..brain.nb_triangles())
        .flat_map(|t| brain.vertex_dofs_of(t))
        .collect();
    let size = brain_dofs.iter().map(|&d| reference[d].abs()).fold(0.0, f64::max);
    assert!(size > 0.0);
    let error = |matrix: &Array2<f64>| {
        brain_dofs
            .iter()
            .map(|&d| (matrix[[d, 0]] - reference[d]).abs())
            .fold(0.0, f64::max)
    };
    let (coarse, fine) = (assemble(1), assemble(5));
    assert!(error(&fine) < error(&coarse));
    assert!(error(&fine) < 1e-2 * size, "error {} for entries of size {}", error(&fine), size);

    // the rest of the scalp subtends a half space at the patch, which cancels the jump term
    let omega: f64 = (1..scalp.nb_triangles())
        .map(|t| solid_angle(&patch.centroid(), &scalp.triangle(t)))
        .sum();
    assert_relative_eq!(omega, 2.0 * PI, epsilon = 1e-9);
    let scalp_dofs: BTreeSet<usize> = (0..scalp.nb_triangles())
        .flat_map(|t| scalp.vertex_dofs_of(t))
        .collect();
    for matrix in [&coarse, &fine] {
        let total: f64 = scalp_dofs.iter().map(|&d| matrix[[d, 0]]).sum();
        assert!(total.abs() < 1e-9, "scalp columns sum to {}", total);
    }
}
