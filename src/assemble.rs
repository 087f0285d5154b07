//! Assembly drivers for the named BEM matrices.
//!
//! Each driver walks the domain → interface → oriented mesh structure of a finalized
//! [`Geometry`] and combines the [`operators`](crate::operators) with the coefficient
//! `±K·orientation`, optionally divided by the conductivity of the traversed domain. The
//! sign flips with the side of the half-space being traversed.
//!
//! Drivers return an [`Assembled`] matrix together with an [`AssemblyReport`]: a dipole or
//! point that cannot be located only zeroes its own column or drops its own row.
//!
//! Work is spread over dipoles, points or rows with `rayon`. Every task fills a private
//! column or row that is placed in index order afterwards.

use indicatif::{ProgressBar, ProgressStyle};
use nalgebra::Point3;
use ndarray::{s, Array1, Array2, Axis};
use rayon::prelude::*;

use crate::analytics::{dipole_potential, double_layer, single_layer};
use crate::config::{K, MAG_FACTOR};
use crate::error::{AssemblyError, GeometryError, LocationError};
use crate::geom::SourceMesh;
use crate::geometry::{Domain, Geometry};
use crate::operators::{
    operator_d, operator_dipole_pot, operator_dipole_pot_der, operator_ferguson, operator_n,
    operator_p1p0, operator_s, Block, Integration,
};
use crate::quadrature::rule;
use crate::report::AssemblyReport;
use crate::sensors::{project_on_outermost_interface, Dipole, Electrodes};
use crate::settings::Settings;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::{icosphere, nested_spheres};
    use crate::geometry::DofOrdering;
    use nalgebra::Vector3;

    fn two_spheres() -> Geometry {
        nested_spheres(&[(1.0, 1.0), (2.0, 0.5)], 1)
            .unwrap()
            .finalize(DofOrdering::VerticesFirst)
            .unwrap()
    }

    fn options() -> Options {
        Options {
            gauss_order: 2,
            ..Default::default()
        }
    }

    #[test]
    fn head_matrix_is_symmetric_and_deterministic() {
        let geometry = two_spheres();
        let first = head_mat(&geometry, &options()).unwrap();
        assert_eq!(first.matrix.dim(), (164, 164));
        assert_eq!(first.matrix, first.matrix.t());
        let second = head_mat(&geometry, &options()).unwrap();
        assert_eq!(first.matrix, second.matrix);
    }

    #[test]
    fn zero_quadrature_order_is_rejected() {
        let geometry = two_spheres();
        let options = Options {
            gauss_order: 0,
            ..Default::default()
        };
        assert!(matches!(
            head_mat(&geometry, &options),
            Err(AssemblyError::QuadratureOrder(0))
        ));
    }

    #[test]
    fn unlocated_dipole_zeroes_its_column() {
        let geometry = two_spheres();
        let dipoles = [
            Dipole::new(Point3::new(0.0, 0.0, 0.3), Vector3::new(0.0, 0.0, 1.0)),
            Dipole::new(Point3::new(0.0, 0.0, 5.0), Vector3::new(0.0, 0.0, 1.0)),
        ];
        let result = dip_source_mat(&geometry, &dipoles, None, &options()).unwrap();
        assert_eq!(result.matrix.dim(), (164, 2));
        assert!(result.matrix.column(0).iter().any(|v| *v != 0.0));
        assert!(result.matrix.column(1).iter().all(|v| *v == 0.0));
        assert_eq!(result.report.zeroed_columns.len(), 1);
        assert_eq!(result.report.zeroed_columns[0].index, 1);
    }

    #[test]
    fn unknown_override_domain_is_an_error() {
        let geometry = two_spheres();
        let dipoles = [Dipole::new(Point3::new(0.0, 0.0, 0.3), Vector3::z())];
        assert!(matches!(
            dip_source_mat(&geometry, &dipoles, Some("csf"), &options()),
            Err(AssemblyError::Geometry(GeometryError::UnknownDomain(_)))
        ));
    }

    #[test]
    fn overlapping_source_gives_zero_matrix() {
        let geometry = two_spheres();
        let (points, triangles) = icosphere(Point3::new(0.0, 0.0, 0.8), 0.5, 0);
        let source = SourceMesh::from_parts("source", &points, &triangles).unwrap();
        let result = surf_source_mat(&geometry, &source, &options()).unwrap();
        assert_eq!(result.matrix.dim(), (164, 12));
        assert!(result.matrix.iter().all(|v| *v == 0.0));
        assert!(result.report.rejected_source.is_some());
    }

    #[test]
    fn internal_potential_drops_exterior_points() {
        let geometry = two_spheres();
        let dipoles = [Dipole::new(Point3::new(0.0, 0.0, 0.3), Vector3::z())];
        let points = [
            Point3::new(0.0, 0.5, 0.0),
            Point3::new(0.0, 0.0, 9.0),
            Point3::new(1.5, 0.0, 0.0),
        ];
        let result = dip_source_to_internal_pot_mat(&geometry, &dipoles, &points, None).unwrap();
        assert_eq!(result.matrix.dim(), (2, 1));
        assert_eq!(result.report.dropped_points.len(), 1);
        assert_eq!(result.report.dropped_points[0].index, 1);
        let expected = K * dipole_potential(&points[0], &dipoles[0].position, &dipoles[0].moment);
        assert_eq!(result.matrix[[0, 0]], expected);
        // the shell point is in another domain than the dipole
        assert_eq!(result.matrix[[1, 0]], 0.0);
    }

    #[test]
    fn electrode_rows_interpolate_scalp_vertices() {
        let geometry = two_spheres();
        let scalp = geometry.surface(geometry.mesh_by_name("sphere_1").unwrap());
        let positions = [scalp.triangle(3).centroid(), Point3::new(0.0, 0.0, 5.0)];
        let result = head_to_eeg_mat(&geometry, &positions).unwrap();
        assert_eq!(result.matrix.dim(), (2, geometry.dof_count()));
        for row in result.matrix.rows() {
            approx::assert_relative_eq!(row.sum(), 1.0, epsilon = 1e-12);
        }
        for dof in scalp.vertex_dofs_of(3) {
            approx::assert_relative_eq!(result.matrix[[0, dof]], 1.0 / 3.0, epsilon = 1e-12);
        }
        // only scalp vertices are read
        let inner = geometry.surface(geometry.mesh_by_name("sphere_0").unwrap());
        for t in 0..inner.nb_triangles() {
            for dof in inner.vertex_dofs_of(t) {
                assert_eq!(result.matrix.column(dof).sum(), 0.0);
            }
        }
    }

    #[test]
    fn internal_potential_reproduces_a_linear_field() {
        let geometry = two_spheres();
        let n = geometry.dof_count();
        let inner = geometry.surface(geometry.mesh_by_name("sphere_0").unwrap());
        let points = [
            Point3::new(0.1, 0.2, -0.3),
            Point3::new(-0.4, 0.0, 0.5),
            Point3::new(0.0, 0.0, 7.0),
        ];
        let result = head_to_internal_pot_mat(&geometry, &points, &options()).unwrap();
        assert_eq!(result.matrix.dim(), (2, n));
        assert_eq!(result.report.dropped_points.len(), 1);

        // u = z inside the brain: P1 and P0 traces are exact on flat triangles
        let mut unknowns = Array1::zeros(n);
        for (v, p) in geometry.points().iter().enumerate() {
            unknowns[geometry.vertex_dof(v)] = p.z;
        }
        for t in 0..inner.nb_triangles() {
            unknowns[inner.triangle_dof(t)] = inner.triangle(t).normal().z;
        }
        let potentials = result.matrix.dot(&unknowns);
        approx::assert_relative_eq!(potentials[0], -0.3, epsilon = 1e-9);
        approx::assert_relative_eq!(potentials[1], 0.5, epsilon = 1e-9);
    }

    #[test]
    fn constant_potential_is_seen_everywhere() {
        let geometry = two_spheres();
        let n = geometry.dof_count();
        let points = [Point3::new(0.1, 0.2, -0.3), Point3::new(0.0, 1.5, 0.1)];
        let result = head_to_internal_pot_mat(&geometry, &points, &options()).unwrap();
        let mut unknowns = Array1::zeros(n);
        for v in 0..geometry.points().len() {
            unknowns[geometry.vertex_dof(v)] = 1.0;
        }
        for value in result.matrix.dot(&unknowns).iter() {
            approx::assert_relative_eq!(*value, 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn ferguson_shape() {
        let geometry = two_spheres();
        let points = [Point3::new(0.0, 0.0, 3.0), Point3::new(3.0, 0.0, 0.0)];
        let result = ferguson_mat(&geometry, &points, &options()).unwrap();
        assert_eq!(result.matrix.dim(), (6, geometry.nb_parameters()));
        // triangle columns carry no potential
        assert!(result.matrix.slice(s![.., 164..]).iter().all(|v| *v == 0.0));
    }
}

/// Tuning shared by all drivers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Options {
    pub gauss_order: usize,
    pub integration: Integration,
    pub progress: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            gauss_order: 3,
            integration: Integration::Gauss,
            progress: false,
        }
    }
}

impl From<&Settings> for Options {
    fn from(settings: &Settings) -> Self {
        Self {
            gauss_order: settings.gauss_order,
            integration: if settings.adaptive {
                Integration::Adaptive
            } else {
                Integration::Gauss
            },
            progress: settings.progress,
        }
    }
}

/// A matrix and the diagnostics collected while building it.
#[derive(Debug, Clone, PartialEq)]
pub struct Assembled {
    pub matrix: Array2<f64>,
    pub report: AssemblyReport,
}

fn progress_bar(len: usize, message: &str, enabled: bool) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] {bar:40.green/blue} {pos:>5}/{len:5} {msg} ETA: {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▇▆▅▄▃▂▁"),
    );
    pb.set_message(message.to_string());
    pb
}

/// Diagonal blocks are symmetric on their own, off-diagonal ones are mirrored.
fn pair_block(matrix: &mut Array2<f64>, same: bool) -> Block<'_> {
    let block = Block::new(matrix.view_mut());
    if same {
        block
    } else {
        block.mirrored()
    }
}

fn same_domain(a: &Domain, b: &Domain) -> bool {
    std::ptr::eq(a, b)
}

/// Symmetric system matrix over the unknowns.
///
/// For every pair of meshes sharing a domain, with `o` their relative orientation:
/// N with `o·σ·K`, S with `o·σ⁻¹·K` and D, D* with `o·K` per shared domain. S and the D
/// terms whose triangles carry no unknown are skipped.
///
/// The double layer integrates to `+4π` inside a closed surface, so D enters with the
/// same sign as S.
pub fn head_mat(geometry: &Geometry, options: &Options) -> Result<Assembled, AssemblyError> {
    let nodes = rule(options.gauss_order)?;
    let n = geometry.dof_count();
    let mut matrix = Array2::zeros((n, n));
    let pairs = geometry.mesh_pairs();
    let pb = progress_bar(pairs.len(), "mesh pairs", options.progress);

    for pair in pairs {
        let (m1, m2) = (pair.first, pair.second);
        let (s1, s2) = (geometry.surface(m1), geometry.surface(m2));
        let o = pair.orientation as f64;
        let same = m1 == m2;

        let coeff = o * geometry.sigma(m1, m2) * K;
        operator_n(&s1, &s2, coeff, nodes, &mut pair_block(&mut matrix, same));
        if geometry.carries_current(m1) && geometry.carries_current(m2) {
            let coeff = o * geometry.sigma_inv(m1, m2) * K;
            operator_s(&s1, &s2, coeff, nodes, &mut pair_block(&mut matrix, same));
        }
        let d_coeff = o * geometry.indicator(m1, m2) * K;
        if geometry.carries_current(m1) {
            let mut mirrored = Block::new(matrix.view_mut()).mirrored();
            operator_d(&s1, &s2, d_coeff, nodes, &mut mirrored);
        }
        if !same && geometry.carries_current(m2) {
            let mut mirrored = Block::new(matrix.view_mut()).mirrored();
            operator_d(&s2, &s1, d_coeff, nodes, &mut mirrored);
        }
        pb.inc(1);
    }
    pb.finish_and_clear();
    log::info!("head matrix assembled: {} x {}", n, n);
    Ok(Assembled {
        matrix,
        report: AssemblyReport::default(),
    })
}

/// Source term of a distributed source given by P1 values on `source`.
///
/// The source mesh must not intersect the geometry and must lie in a single conductive
/// domain; otherwise the result is a zero matrix and the report says why.
pub fn surf_source_mat(
    geometry: &Geometry,
    source: &SourceMesh,
    options: &Options,
) -> Result<Assembled, AssemblyError> {
    let nodes = rule(options.gauss_order)?;
    let mut matrix = Array2::zeros((geometry.dof_count(), source.nb_vertices()));
    let mut report = AssemblyReport::default();

    if geometry.check_overlap(source) {
        report.reject_source(format!("source mesh {} overlaps the geometry", source.mesh().name()));
        return Ok(Assembled { matrix, report });
    }
    let domain = match source_domain(geometry, source) {
        Ok(domain) => domain,
        Err(reason) => {
            report.reject_source(reason);
            return Ok(Assembled { matrix, report });
        }
    };
    log::info!(
        "surface source {} with {} vertices located in domain {}",
        source.mesh().name(),
        source.nb_vertices(),
        domain.name()
    );

    let sigma = domain.conductivity();
    let src = source.as_source();
    for hs in domain.boundaries() {
        let side = if hs.inside { 1.0 } else { -1.0 };
        for &(m, o) in geometry.interface_at(hs).oriented_meshes() {
            let surface = geometry.surface(m);
            let o = o as f64;
            operator_n(&surface, &src, side * K * o, nodes, &mut Block::new(matrix.view_mut()));
            if geometry.carries_current(m) {
                let coeff = side * o * K / sigma;
                operator_d(&surface, &src, coeff, nodes, &mut Block::new(matrix.view_mut()));
            }
        }
    }
    Ok(Assembled { matrix, report })
}

/// The single conductive domain holding every vertex of `source`.
fn source_domain<'g>(geometry: &'g Geometry, source: &SourceMesh) -> Result<&'g Domain, String> {
    let mut found: Option<&Domain> = None;
    for p in source.points() {
        let domain = geometry.conducting_domain(p).map_err(|e| e.to_string())?;
        match found {
            Some(d) if !same_domain(d, domain) => {
                return Err(format!(
                    "source mesh spans domains {} and {}",
                    d.name(),
                    domain.name()
                ))
            }
            _ => found = Some(domain),
        }
    }
    found.ok_or_else(|| "source mesh has no vertex".to_string())
}

/// Resolves the domain of a dipole, or the named override.
fn dipole_domain<'g>(
    geometry: &'g Geometry,
    position: &Point3<f64>,
    domain_override: Option<&'g Domain>,
) -> Result<&'g Domain, LocationError> {
    match domain_override {
        Some(domain) if domain.is_conductive() => Ok(domain),
        Some(domain) => Err(LocationError::NonConductive {
            point: *position,
            domain: domain.name().to_string(),
        }),
        None => geometry.conducting_domain(position),
    }
}

/// Source term of current dipoles, one column per dipole.
pub fn dip_source_mat(
    geometry: &Geometry,
    dipoles: &[Dipole],
    domain_override: Option<&str>,
    options: &Options,
) -> Result<Assembled, AssemblyError> {
    let nodes = rule(options.gauss_order)?;
    let domain_override = domain_override
        .map(|name| geometry.domain_by_name(name))
        .transpose()?;
    let n = geometry.dof_count();
    let pb = progress_bar(dipoles.len(), "dipoles", options.progress);

    let columns: Vec<Result<Array1<f64>, LocationError>> = dipoles
        .par_iter()
        .map(|dipole| {
            let domain = dipole_domain(geometry, &dipole.position, domain_override)?;
            let sigma = domain.conductivity();
            let mut column = Array1::zeros(n);
            for hs in domain.boundaries() {
                let side = if hs.inside { 1.0 } else { -1.0 };
                for &(m, o) in geometry.interface_at(hs).oriented_meshes() {
                    let surface = geometry.surface(m);
                    let o = o as f64;
                    let mut view = column.view_mut();
                    operator_dipole_pot_der(&surface, dipole, side * K * o, nodes, options.integration, &mut view);
                    if geometry.carries_current(m) {
                        let coeff = -side * o * K / sigma;
                        operator_dipole_pot(&surface, dipole, coeff, nodes, options.integration, &mut view);
                    }
                }
            }
            pb.inc(1);
            Ok(column)
        })
        .collect();
    pb.finish_and_clear();

    let mut matrix = Array2::zeros((n, dipoles.len()));
    let mut report = AssemblyReport::default();
    for (j, column) in columns.into_iter().enumerate() {
        match column {
            Ok(column) => matrix.column_mut(j).assign(&column),
            Err(e) => report.zero_column(j, e.to_string()),
        }
    }
    Ok(Assembled { matrix, report })
}

/// Source term of currents injected through the electrodes, one column per electrode.
///
/// The rows of the full operator belonging to the outermost-interface triangles are built
/// first, then each electrode patch is projected onto them.
pub fn eit_source_mat(
    geometry: &Geometry,
    electrodes: &Electrodes,
    options: &Options,
) -> Result<Assembled, AssemblyError> {
    let nodes = rule(options.gauss_order)?;
    let outer = geometry
        .outermost_interface()
        .ok_or(GeometryError::NoOutermostDomain)?;
    let (n, total) = (geometry.dof_count(), geometry.nb_parameters());
    let mut transmat = Array2::zeros((total - n, total));

    for &(m1, _) in outer.oriented_meshes() {
        let s1 = geometry.surface(m1);
        for (m2, _) in geometry.meshes() {
            let o = geometry.relative_orientation(m1, m2);
            if o == 0 {
                continue;
            }
            let o = o as f64;
            let s2 = geometry.surface(m2);
            let coeff = -geometry.sigma_inv(m1, m2) * K * o;
            operator_s(&s1, &s2, coeff, nodes, &mut Block::new(transmat.view_mut()).with_offsets(n, 0));
            operator_d(&s1, &s2, -K * o, nodes, &mut Block::new(transmat.view_mut()).with_offsets(n, 0));
            if m1 == m2 {
                operator_p1p0(&s1, 0.5 * o, &mut Block::new(transmat.view_mut()).with_offsets(n, 0));
            }
        }
    }

    let unknowns = transmat.slice(s![.., ..n]);
    let mut matrix = Array2::zeros((n, electrodes.len()));
    for (e, electrode) in electrodes.iter().enumerate() {
        let mut column = matrix.column_mut(e);
        for &(m, t) in &electrode.patch {
            let surface = geometry.surface(m);
            let weight = electrodes.injection_weight(electrode, surface.triangle(t).area());
            let row = unknowns.index_axis(Axis(0), surface.triangle_dof(t) - n);
            column.scaled_add(weight, &row);
        }
    }
    Ok(Assembled {
        matrix,
        report: AssemblyReport::default(),
    })
}

/// Points lying in a conductive domain, with that domain. The others are dropped into
/// `report`.
fn locate_points<'g>(
    geometry: &'g Geometry,
    points: &[Point3<f64>],
    report: &mut AssemblyReport,
) -> Vec<(Point3<f64>, &'g Domain)> {
    let located: Vec<Result<&Domain, LocationError>> =
        points.par_iter().map(|p| geometry.conducting_domain(p)).collect();
    let mut kept = Vec::new();
    for (i, (point, domain)) in points.iter().zip(located).enumerate() {
        match domain {
            Ok(domain) => kept.push((*point, domain)),
            Err(e) => report.drop_point(i, *point, e.to_string()),
        }
    }
    kept
}

/// Electrode potentials from the unknowns, one row per electrode.
///
/// Each electrode reads the P1 potential at its closest point on the outermost interface.
pub fn head_to_eeg_mat(
    geometry: &Geometry,
    positions: &[Point3<f64>],
) -> Result<Assembled, AssemblyError> {
    let projections = project_on_outermost_interface(geometry, positions)?;
    let mut matrix = Array2::zeros((positions.len(), geometry.dof_count()));
    for (i, projection) in projections.iter().enumerate() {
        let surface = geometry.surface(projection.mesh);
        let dofs = surface.vertex_dofs_of(projection.triangle);
        for (dof, w) in dofs.into_iter().zip(projection.weights.iter()) {
            matrix[[i, dof]] += w;
        }
    }
    log::info!("{} electrodes projected on the outermost interface", positions.len());
    Ok(Assembled {
        matrix,
        report: AssemblyReport::default(),
    })
}

/// Potential at internal points from the unknowns, one row per located point.
///
/// A point in domain `Ω` sees every mesh bounding `Ω` through the representation formula
/// `u = K·D[V] + (K/σ)·S[p]`, signed by the orientation of the mesh seen from `Ω`. The
/// triangle unknown `p` is the normal current along the mesh normal. Points outside
/// every conductive domain are dropped from the rows.
pub fn head_to_internal_pot_mat(
    geometry: &Geometry,
    points: &[Point3<f64>],
    options: &Options,
) -> Result<Assembled, AssemblyError> {
    let mut report = AssemblyReport::default();
    let kept = locate_points(geometry, points, &mut report);
    let n = geometry.dof_count();
    let pb = progress_bar(kept.len(), "points", options.progress);

    let rows: Vec<Array1<f64>> = kept
        .par_iter()
        .map(|(point, domain)| {
            let mut row = Array1::zeros(n);
            let sigma = domain.conductivity();
            for hs in domain.boundaries() {
                let side = if hs.inside { 1.0 } else { -1.0 };
                for &(m, o) in geometry.interface_at(hs).oriented_meshes() {
                    let surface = geometry.surface(m);
                    let coeff = side * o as f64 * K;
                    let current = geometry.carries_current(m);
                    for t in 0..surface.nb_triangles() {
                        let triangle = surface.triangle(t);
                        let weights = double_layer(point, &triangle);
                        for (dof, w) in surface.vertex_dofs_of(t).into_iter().zip(weights.iter()) {
                            row[dof] += coeff * w;
                        }
                        if current {
                            row[surface.triangle_dof(t)] += coeff / sigma * single_layer(point, &triangle);
                        }
                    }
                }
            }
            pb.inc(1);
            row
        })
        .collect();
    pb.finish_and_clear();

    let mut matrix = Array2::zeros((rows.len(), n));
    for (i, row) in rows.iter().enumerate() {
        matrix.row_mut(i).assign(row);
    }
    Ok(Assembled { matrix, report })
}

/// Infinite-medium potential of each dipole at the given points, scaled by `K/σ`.
///
/// Points outside every conductive domain are dropped from the rows. A point only sees
/// the dipoles of its own domain.
pub fn dip_source_to_internal_pot_mat(
    geometry: &Geometry,
    dipoles: &[Dipole],
    points: &[Point3<f64>],
    domain_override: Option<&str>,
) -> Result<Assembled, AssemblyError> {
    let domain_override = domain_override
        .map(|name| geometry.domain_by_name(name))
        .transpose()?;
    let mut report = AssemblyReport::default();
    let kept = locate_points(geometry, points, &mut report);

    let mut matrix = Array2::zeros((kept.len(), dipoles.len()));
    for (j, dipole) in dipoles.iter().enumerate() {
        let domain = match dipole_domain(geometry, &dipole.position, domain_override) {
            Ok(domain) => domain,
            Err(e) => {
                report.zero_column(j, e.to_string());
                continue;
            }
        };
        let coeff = K / domain.conductivity();
        for (i, (point, point_domain)) in kept.iter().enumerate() {
            if same_domain(point_domain, domain) {
                matrix[[i, j]] += coeff * dipole_potential(point, &dipole.position, &dipole.moment);
            }
        }
    }
    Ok(Assembled { matrix, report })
}

/// Magnetic field at `points` of the potentials, three rows per point.
pub fn ferguson_mat(
    geometry: &Geometry,
    points: &[Point3<f64>],
    options: &Options,
) -> Result<Assembled, AssemblyError> {
    let total = geometry.nb_parameters();
    let coefficients: Vec<f64> = geometry
        .meshes()
        .map(|(m, _)| MAG_FACTOR * geometry.conductivity_jump(m))
        .collect();
    let pb = progress_bar(points.len(), "points", options.progress);

    let blocks: Vec<Array2<f64>> = points
        .par_iter()
        .map(|point| {
            let mut block = Array2::zeros((3, total));
            for ((m, _), coeff) in geometry.meshes().zip(&coefficients) {
                let surface = geometry.surface(m);
                operator_ferguson(point, &surface, 0, *coeff, &mut Block::new(block.view_mut()));
            }
            pb.inc(1);
            block
        })
        .collect();
    pb.finish_and_clear();

    let mut matrix = Array2::zeros((3 * points.len(), total));
    for (i, block) in blocks.iter().enumerate() {
        matrix.slice_mut(s![3 * i..3 * i + 3, ..]).assign(block);
    }
    Ok(Assembled {
        matrix,
        report: AssemblyReport::default(),
    })
}
