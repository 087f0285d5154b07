//! Current dipoles and EIT injection electrodes.

use std::f64::consts::PI;

use nalgebra::{Point3, Vector3};
use ndarray::Array2;

use crate::config::RADIUS_EPSILON;
use crate::error::{AssemblyError, GeometryError};
use crate::geom::Triangle;
use crate::geometry::{Geometry, MeshId};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::nested_spheres;
    use crate::geometry::DofOrdering;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn dipoles_need_six_columns() {
        let ok = array![[0.0, 0.0, 0.1, 1.0, 0.0, 0.0], [0.1, 0.0, 0.0, 0.0, 0.0, 2.0]];
        let dipoles = dipoles_from_matrix(&ok).unwrap();
        assert_eq!(dipoles.len(), 2);
        assert_eq!(dipoles[1].moment, Vector3::new(0.0, 0.0, 2.0));
        let bad = array![[0.0, 0.0, 0.1]];
        assert!(matches!(
            dipoles_from_matrix(&bad),
            Err(AssemblyError::Columns { expected: 6, found: 3, .. })
        ));
        assert_eq!(points_from_matrix(&bad).unwrap()[0], Point3::new(0.0, 0.0, 0.1));
    }

    #[test]
    fn positions_snap_to_the_closest_scalp_triangle() {
        let geometry = nested_spheres(&[(1.0, 1.0), (2.0, 0.5)], 1)
            .unwrap()
            .finalize(DofOrdering::default())
            .unwrap();
        let scalp = geometry.surface(geometry.mesh_by_name("sphere_1").unwrap());
        let centroid = scalp.triangle(7).centroid();
        let outside = centroid + scalp.triangle(7).normal() * 0.5;
        let projections = project_on_outermost_interface(&geometry, &[centroid, outside]).unwrap();
        for projection in &projections {
            assert_eq!(projection.triangle, 7);
            assert_relative_eq!(projection.weights, Vector3::repeat(1.0 / 3.0), epsilon = 1e-12);
        }
    }

    #[test]
    fn electrode_patches_lie_on_the_scalp() {
        let geometry = nested_spheres(&[(1.0, 1.0), (2.0, 0.5)], 2)
            .unwrap()
            .finalize(DofOrdering::default())
            .unwrap();
        let scalp = geometry.mesh_by_name("sphere_1").unwrap();
        let positions = [Point3::new(0.0, 0.0, 2.0), Point3::new(2.0, 0.0, 0.0)];

        let point_like = Electrodes::on_outermost_interface(&geometry, &positions, None).unwrap();
        assert_eq!(point_like.len(), 2);
        for electrode in point_like.iter() {
            assert_eq!(electrode.patch.len(), 1);
            assert_eq!(electrode.patch[0].0, scalp);
        }

        let disks = Electrodes::on_outermost_interface(&geometry, &positions, Some(0.5)).unwrap();
        let electrode = &disks.iter().next().unwrap();
        assert!(electrode.patch.len() > 1);
        let area: f64 = electrode
            .patch
            .iter()
            .map(|&(m, t)| geometry.surface(m).triangle(t).area())
            .sum();
        assert_relative_eq!(electrode.weight * area, PI * 0.25, epsilon = 1e-12);
    }
}

/// A sensor position snapped to the outermost interface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    pub mesh: MeshId,
    pub triangle: usize,
    /// Barycentric weights of the closest point on the triangle.
    pub weights: Vector3<f64>,
}

/// Closest point of the outermost interface to each position.
pub fn project_on_outermost_interface(
    geometry: &Geometry,
    positions: &[Point3<f64>],
) -> Result<Vec<Projection>, AssemblyError> {
    let interface = geometry
        .outermost_interface()
        .ok_or(GeometryError::NoOutermostDomain)?;
    let triangles: Vec<(MeshId, usize, Triangle)> = interface
        .oriented_meshes()
        .iter()
        .flat_map(|&(m, _)| {
            let surface = geometry.surface(m);
            (0..surface.nb_triangles()).map(move |t| (m, t, surface.triangle(t)))
        })
        .collect();

    positions
        .iter()
        .map(|position| {
            let (mesh, triangle, closest, on) = triangles
                .iter()
                .map(|(m, t, tri)| (*m, *t, tri.closest_point(position), tri))
                .min_by(|a, b| {
                    (a.2 - position)
                        .norm_squared()
                        .total_cmp(&(b.2 - position).norm_squared())
                })
                .ok_or(GeometryError::NoOutermostDomain)?;
            Ok(Projection {
                mesh,
                triangle,
                weights: on.barycentric(&closest),
            })
        })
        .collect()
}

/// A current dipole.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dipole {
    pub position: Point3<f64>,
    pub moment: Vector3<f64>,
}

impl Dipole {
    pub fn new(position: Point3<f64>, moment: Vector3<f64>) -> Self {
        Self { position, moment }
    }
}

/// Dipoles from the rows `x y z qx qy qz` of a matrix.
pub fn dipoles_from_matrix(matrix: &Array2<f64>) -> Result<Vec<Dipole>, AssemblyError> {
    if matrix.ncols() != 6 {
        return Err(AssemblyError::Columns {
            what: "dipole matrix",
            expected: 6,
            found: matrix.ncols(),
        });
    }
    Ok(matrix
        .rows()
        .into_iter()
        .map(|r| Dipole::new(Point3::new(r[0], r[1], r[2]), Vector3::new(r[3], r[4], r[5])))
        .collect())
}

/// Points from the rows `x y z` of a matrix.
pub fn points_from_matrix(matrix: &Array2<f64>) -> Result<Vec<Point3<f64>>, AssemblyError> {
    if matrix.ncols() < 3 {
        return Err(AssemblyError::Columns {
            what: "point matrix",
            expected: 3,
            found: matrix.ncols(),
        });
    }
    Ok(matrix
        .rows()
        .into_iter()
        .map(|r| Point3::new(r[0], r[1], r[2]))
        .collect())
}

#[derive(Debug, Clone, PartialEq)]
pub struct Electrode {
    pub position: Point3<f64>,
    pub patch: Vec<(MeshId, usize)>, // injection triangles
    pub weight: f64, // electrode area over patch area
}

/// Injection electrodes placed on the outermost interface.
#[derive(Debug, Clone, PartialEq)]
pub struct Electrodes {
    electrodes: Vec<Electrode>,
    radius: Option<f64>,
}

impl Electrodes {
    /// Attaches each position to the outermost interface.
    ///
    /// With a radius, the patch holds every triangle whose centroid lies within the radius,
    /// falling back to the closest triangle. Without one (or a vanishing one) the patch is
    /// the closest triangle and the injected value is an intensity rather than a density.
    pub fn on_outermost_interface(
        geometry: &Geometry,
        positions: &[Point3<f64>],
        radius: Option<f64>,
    ) -> Result<Self, AssemblyError> {
        let interface = geometry
            .outermost_interface()
            .ok_or(GeometryError::NoOutermostDomain)?;
        let radius = radius.filter(|r| *r >= RADIUS_EPSILON);
        let candidates: Vec<(MeshId, usize, Point3<f64>, f64)> = interface
            .oriented_meshes()
            .iter()
            .flat_map(|&(m, _)| {
                let surface = geometry.surface(m);
                (0..surface.nb_triangles()).map(move |t| {
                    let triangle = surface.triangle(t);
                    (m, t, triangle.centroid(), triangle.area())
                })
            })
            .collect();

        let electrodes = positions
            .iter()
            .map(|position| {
                let distance = |c: &Point3<f64>| (c - position).norm();
                let mut patch: Vec<(MeshId, usize)> = match radius {
                    Some(r) => candidates
                        .iter()
                        .filter(|(_, _, c, _)| distance(c) <= r)
                        .map(|(m, t, _, _)| (*m, *t))
                        .collect(),
                    None => Vec::new(),
                };
                if patch.is_empty() {
                    if let Some((m, t, _, _)) = candidates
                        .iter()
                        .min_by(|a, b| distance(&a.2).total_cmp(&distance(&b.2)))
                    {
                        patch.push((*m, *t));
                    }
                }
                let area: f64 = candidates
                    .iter()
                    .filter(|(m, t, _, _)| patch.contains(&(*m, *t)))
                    .map(|(_, _, _, a)| a)
                    .sum();
                let weight = match radius {
                    Some(r) if area > 0.0 => PI * r * r / area,
                    _ => 1.0,
                };
                Electrode {
                    position: *position,
                    patch,
                    weight,
                }
            })
            .collect();
        Ok(Self { electrodes, radius })
    }

    pub fn len(&self) -> usize {
        self.electrodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.electrodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Electrode> {
        self.electrodes.iter()
    }

    pub fn radius(&self) -> Option<f64> {
        self.radius
    }

    /// Weight applied to a patch triangle of area `area`.
    pub fn injection_weight(&self, electrode: &Electrode, area: f64) -> f64 {
        match self.radius {
            Some(_) => electrode.weight,
            None => 1.0 / area,
        }
    }
}
