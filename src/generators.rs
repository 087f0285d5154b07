//! Procedural surfaces used by tests and the `mesh-info` sanity checks.

use std::collections::HashMap;

use nalgebra::Point3;

use crate::error::GeometryError;
use crate::geom::TriangleIndices;
use crate::geometry::GeometryBuilder;


/// Triangulated sphere obtained by `level` midpoint subdivisions of an icosahedron.
///
/// Triangles are counter-clockwise seen from outside, so right-hand normals point outward.
/// Level `n` has `10·4ⁿ + 2` vertices and `20·4ⁿ` triangles.
pub fn icosphere(
    centre: Point3<f64>,
    radius: f64,
    level: usize,
) -> (Vec<Point3<f64>>, Vec<TriangleIndices>) {
    let t = (1.0 + 5f64.sqrt()) / 2.0;
    let mut unit: Vec<Point3<f64>> = [
        [-1.0, t, 0.0],
        [1.0, t, 0.0],
        [-1.0, -t, 0.0],
        [1.0, -t, 0.0],
        [0.0, -1.0, t],
        [0.0, 1.0, t],
        [0.0, -1.0, -t],
        [0.0, 1.0, -t],
        [t, 0.0, -1.0],
        [t, 0.0, 1.0],
        [-t, 0.0, -1.0],
        [-t, 0.0, 1.0],
    ]
    .iter()
    .map(|[x, y, z]| Point3::from(nalgebra::Vector3::new(*x, *y, *z).normalize()))
    .collect();

    let mut triangles: Vec<TriangleIndices> = vec![
        [0, 11, 5],
        [0, 5, 1],
        [0, 1, 7],
        [0, 7, 10],
        [0, 10, 11],
        [1, 5, 9],
        [5, 11, 4],
        [11, 10, 2],
        [10, 7, 6],
        [7, 1, 8],
        [3, 9, 4],
        [3, 4, 2],
        [3, 2, 6],
        [3, 6, 8],
        [3, 8, 9],
        [4, 9, 5],
        [2, 4, 11],
        [6, 2, 10],
        [8, 6, 7],
        [9, 8, 1],
    ];

    for _ in 0..level {
        let mut midpoints: HashMap<(usize, usize), usize> = HashMap::new();
        let mut midpoint = |a: usize, b: usize, unit: &mut Vec<Point3<f64>>| {
            let key = (a.min(b), a.max(b));
            *midpoints.entry(key).or_insert_with(|| {
                let m = nalgebra::center(&unit[a], &unit[b]);
                unit.push(Point3::from(m.coords.normalize()));
                unit.len() - 1
            })
        };
        triangles = triangles
            .iter()
            .flat_map(|&[a, b, c]| {
                let ab = midpoint(a, b, &mut unit);
                let bc = midpoint(b, c, &mut unit);
                let ca = midpoint(c, a, &mut unit);
                [[a, ab, ca], [b, bc, ab], [c, ca, bc], [ab, bc, ca]]
            })
            .collect();
    }

    let points = unit
        .into_iter()
        .map(|p| centre + p.coords * radius)
        .collect();
    (points, triangles)
}

/// Concentric icospheres as a ready-to-finalize geometry.
///
/// `layers` lists `(radius, conductivity)` from the innermost sphere outwards. Sphere `i`
/// is mesh `sphere_i` forming interface `interface_i`; domain `layer_i` lies between
/// spheres `i - 1` and `i`. The exterior is the non-conductive domain `Air`.
pub fn nested_spheres(
    layers: &[(f64, f64)],
    level: usize,
) -> Result<GeometryBuilder, GeometryError> {
    let mut builder = GeometryBuilder::default();
    for (i, &(radius, _)) in layers.iter().enumerate() {
        let (points, triangles) = icosphere(Point3::origin(), radius, level);
        let id = builder.add_mesh(&format!("sphere_{}", i));
        let (pool, mesh) = builder.pool_and_mesh_mut(id);
        let indmap = pool.add_vertices(&points);
        for t in triangles {
            mesh.push_triangle(t.map(|v| indmap[v]));
        }
        let name = format!("sphere_{}", i);
        builder.add_interface(&format!("interface_{}", i), &[(name.as_str(), 1)])?;
    }
    for (i, &(_, sigma)) in layers.iter().enumerate() {
        let inner = format!("interface_{}", i);
        let outer = i.checked_sub(1).map(|j| format!("interface_{}", j));
        let mut boundaries = vec![(inner.as_str(), true)];
        if let Some(outer) = outer.as_deref() {
            boundaries.push((outer, false));
        }
        builder.add_domain(&format!("layer_{}", i), Some(sigma), &boundaries);
    }
    if !layers.is_empty() {
        let last = format!("interface_{}", layers.len() - 1);
        builder.add_domain("Air", Some(0.0), &[(last.as_str(), false)]);
    }
    Ok(builder)
}
