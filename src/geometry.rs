//! Conductivity domains bounded by nested closed surfaces.
//!
//! A [`GeometryBuilder`] collects vertices, meshes, interfaces and domains in any order.
//! [`GeometryBuilder::finalize`] validates the nesting and produces an immutable
//! [`Geometry`], the only type the assembly drivers accept.
//!
//! - An **interface** is a closed surface made of one or more oriented meshes.
//! - A **domain** is a region of constant conductivity given as a list of half-spaces,
//!   each being the inside or the outside of an interface.
//! - The **outermost** domain has no inside half-space. Its interfaces bound the exterior,
//!   so the triangles of their meshes carry no unknown.
//! - A **current barrier** is a mesh touching a non-conductive domain. Its normal current
//!   vanishes and its triangles are indexed after the unknowns.

use std::collections::{HashMap, HashSet};
use std::f64::consts::PI;

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use crate::containment::{solid_angle, triangles_intersect, Aabb};
use crate::error::{GeometryError, LocationError, ParseError};
use crate::geom::{IndexMap, Mesh, SourceMesh, Surface, TriangleIndices, VertexPool};


/// Layout of the global unknown vector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DofOrdering {
    /// All vertex potentials first, then the normal currents of each mesh.
    #[default]
    VerticesFirst,
    /// Per mesh: its not yet numbered vertices, then its triangles.
    Legacy,
}

/// Handle to a mesh of a geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub usize);

/// One side of an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HalfSpace {
    pub interface: usize,
    pub inside: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Interface {
    name: String,
    meshes: Vec<(MeshId, i32)>, // mesh and its orientation in the interface
    outermost: bool,
}

impl Interface {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn oriented_meshes(&self) -> &[(MeshId, i32)] {
        &self.meshes
    }

    pub fn is_outermost(&self) -> bool {
        self.outermost
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Domain {
    name: String,
    conductivity: Option<f64>,
    boundaries: Vec<HalfSpace>,
}

impl Domain {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Conductivity, zero for the non-conductive sentinel.
    pub fn conductivity(&self) -> f64 {
        self.conductivity.unwrap_or(0.0)
    }

    pub fn is_conductive(&self) -> bool {
        self.conductivity() != 0.0
    }

    pub fn boundaries(&self) -> &[HalfSpace] {
        &self.boundaries
    }
}

/// Two meshes bounding a common domain and their relative orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshPair {
    pub first: MeshId,
    pub second: MeshId,
    pub orientation: i32,
}

/// A function evaluated on each domain shared by two meshes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainFn {
    Conductivity,
    /// Inverse conductivity, zero on non-conductive domains.
    InverseConductivity,
    Indicator,
}

impl DomainFn {
    pub fn eval(self, domain: &Domain) -> f64 {
        match self {
            DomainFn::Conductivity => domain.conductivity(),
            DomainFn::InverseConductivity if domain.is_conductive() => 1.0 / domain.conductivity(),
            DomainFn::InverseConductivity => 0.0,
            DomainFn::Indicator => 1.0,
        }
    }
}

#[derive(Debug, Clone)]
struct InterfaceSpec {
    name: String,
    meshes: Vec<(String, i32)>,
}

#[derive(Debug, Clone)]
struct DomainSpec {
    name: String,
    conductivity: Option<f64>,
    boundaries: Vec<(String, bool)>,
}

/// Mutable staging area for a [`Geometry`].
#[derive(Debug, Clone, Default)]
pub struct GeometryBuilder {
    pool: VertexPool,
    meshes: Vec<Mesh>,
    interfaces: Vec<InterfaceSpec>,
    domains: Vec<DomainSpec>,
}

impl GeometryBuilder {
    pub fn add_vertex(&mut self, vertex: Point3<f64>) -> usize {
        self.pool.add_vertex(vertex)
    }

    pub fn add_vertices(&mut self, vertices: &[Point3<f64>]) -> IndexMap {
        self.pool.add_vertices(vertices)
    }

    pub fn add_mesh(&mut self, name: &str) -> MeshId {
        self.meshes.push(Mesh::new(name));
        MeshId(self.meshes.len() - 1)
    }

    /// Borrow a mesh for population. Any later structural change ends the borrow.
    pub fn mesh_mut(&mut self, id: MeshId) -> &mut Mesh {
        &mut self.meshes[id.0]
    }

    /// Vertex pool and mesh borrowed together, as needed by surface loaders.
    pub fn pool_and_mesh_mut(&mut self, id: MeshId) -> (&mut VertexPool, &mut Mesh) {
        (&mut self.pool, &mut self.meshes[id.0])
    }

    /// Adds a mesh from raw coordinates and triangles numbered locally from zero.
    pub fn add_mesh_from_parts(
        &mut self,
        name: &str,
        points: &[Point3<f64>],
        triangles: &[TriangleIndices],
    ) -> Result<MeshId, ParseError> {
        let id = self.add_mesh(name);
        let indmap = self.pool.add_vertices(points);
        let mesh = &mut self.meshes[id.0];
        for t in triangles {
            mesh.add_triangle(*t, &indmap)?;
        }
        Ok(id)
    }

    /// Declares an interface from mesh names and orientations (`+1` or `-1`).
    pub fn add_interface(&mut self, name: &str, meshes: &[(&str, i32)]) -> Result<(), GeometryError> {
        if let Some(&(mesh, value)) = meshes.iter().find(|(_, o)| o.abs() != 1) {
            return Err(GeometryError::BadOrientation {
                interface: name.to_string(),
                mesh: mesh.to_string(),
                value,
            });
        }
        self.interfaces.push(InterfaceSpec {
            name: name.to_string(),
            meshes: meshes.iter().map(|(m, o)| (m.to_string(), *o)).collect(),
        });
        Ok(())
    }

    /// Declares a domain from `(interface, inside)` half-spaces.
    pub fn add_domain(&mut self, name: &str, conductivity: Option<f64>, boundaries: &[(&str, bool)]) {
        self.domains.push(DomainSpec {
            name: name.to_string(),
            conductivity,
            boundaries: boundaries.iter().map(|(i, s)| (i.to_string(), *s)).collect(),
        });
    }

    pub fn set_conductivity(&mut self, domain: &str, sigma: f64) -> Result<(), GeometryError> {
        let spec = self
            .domains
            .iter_mut()
            .find(|d| d.name == domain)
            .ok_or_else(|| GeometryError::UnknownDomain(domain.to_string()))?;
        spec.conductivity = Some(sigma);
        Ok(())
    }

    pub fn points(&self) -> &[Point3<f64>] {
        self.pool.points()
    }

    /// Validates the topology, numbers the unknowns and caches the mesh pairs.
    pub fn finalize(self, ordering: DofOrdering) -> Result<Geometry, GeometryError> {
        let GeometryBuilder {
            pool,
            mut meshes,
            interfaces,
            domains,
        } = self;

        check_unique(meshes.iter().map(Mesh::name))?;
        check_unique(interfaces.iter().map(|i| i.name.as_str()))?;
        check_unique(domains.iter().map(|d| d.name.as_str()))?;

        let mesh_index: HashMap<&str, usize> = meshes
            .iter()
            .enumerate()
            .map(|(i, m)| (m.name(), i))
            .collect();
        let mut interfaces = interfaces
            .iter()
            .map(|spec| {
                let meshes = spec
                    .meshes
                    .iter()
                    .map(|(name, o)| {
                        mesh_index
                            .get(name.as_str())
                            .map(|&i| (MeshId(i), *o))
                            .ok_or_else(|| GeometryError::UnknownMesh(name.clone()))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Interface {
                    name: spec.name.clone(),
                    meshes,
                    outermost: false,
                })
            })
            .collect::<Result<Vec<_>, GeometryError>>()?;

        let interface_index: HashMap<&str, usize> = interfaces
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name(), i))
            .collect();
        let domains = domains
            .iter()
            .map(|spec| {
                let boundaries = spec
                    .boundaries
                    .iter()
                    .map(|(name, inside)| {
                        interface_index
                            .get(name.as_str())
                            .map(|&interface| HalfSpace {
                                interface,
                                inside: *inside,
                            })
                            .ok_or_else(|| GeometryError::UnknownInterface(name.clone()))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Domain {
                    name: spec.name.clone(),
                    conductivity: spec.conductivity,
                    boundaries,
                })
            })
            .collect::<Result<Vec<_>, GeometryError>>()?;

        if !interfaces.is_empty() {
            let used: HashSet<MeshId> = interfaces
                .iter()
                .flat_map(|f| f.meshes.iter().map(|(m, _)| *m))
                .collect();
            if let Some(i) = (0..meshes.len()).find(|i| !used.contains(&MeshId(*i))) {
                return Err(GeometryError::OrphanMesh(meshes[i].name().to_string()));
            }
        }

        let mut barrier = vec![false; meshes.len()];
        let mut outermost = vec![false; meshes.len()];
        let mut outermost_domain = None;
        if !domains.is_empty() {
            check_half_spaces(&interfaces, &domains)?;

            if domains.iter().any(|d| d.conductivity.is_some()) {
                for domain in domains.iter().filter(|d| !d.is_conductive()) {
                    for hs in &domain.boundaries {
                        for (m, _) in &interfaces[hs.interface].meshes {
                            barrier[m.0] = true;
                        }
                    }
                }
            }

            let candidates: Vec<usize> = (0..domains.len())
                .filter(|&d| domains[d].boundaries.iter().all(|h| !h.inside))
                .collect();
            let outer = match candidates.as_slice() {
                [] => return Err(GeometryError::NoOutermostDomain),
                [d] => *d,
                _ => {
                    return Err(GeometryError::MultipleOutermostDomains(
                        candidates.iter().map(|&d| domains[d].name.clone()).collect(),
                    ))
                }
            };
            for hs in &domains[outer].boundaries {
                interfaces[hs.interface].outermost = true;
                for (m, _) in &interfaces[hs.interface].meshes {
                    outermost[m.0] = true;
                }
            }
            for (d, domain) in domains.iter().enumerate().filter(|(d, _)| *d != outer) {
                let count = domain.boundaries.iter().filter(|h| h.inside).count();
                if count != 1 {
                    return Err(GeometryError::NotNested {
                        domain: domains[d].name.clone(),
                        count,
                    });
                }
            }
            outermost_domain = Some(outer);

            if domains.iter().any(|d| d.conductivity.is_some()) {
                check_connected(&meshes, &interfaces, &domains)?;
            }
        }

        for mesh in meshes.iter_mut().filter(|m| !m.has_normals()) {
            mesh.compute_normals(pool.points());
        }

        let tail: Vec<bool> = (0..meshes.len()).map(|m| barrier[m] || outermost[m]).collect();
        let numbering = number_dofs(&pool, &meshes, &tail, ordering);

        let domain_meshes = domains
            .iter()
            .map(|domain| {
                domain
                    .boundaries
                    .iter()
                    .flat_map(|hs| {
                        interfaces[hs.interface]
                            .meshes
                            .iter()
                            .map(move |&(m, o)| (m, if hs.inside { o } else { -o }))
                    })
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();

        let n = meshes.len();
        let mut orientations = vec![0; n * n];
        let mut pairs = Vec::new();
        for i in 0..n {
            for j in i..n {
                let orientation = if i == j {
                    1
                } else {
                    domain_meshes
                        .iter()
                        .find_map(|dm| {
                            let a = dm.iter().find(|(m, _)| m.0 == i)?;
                            let b = dm.iter().find(|(m, _)| m.0 == j)?;
                            Some(a.1 * b.1)
                        })
                        .unwrap_or(0)
                };
                orientations[i * n + j] = orientation;
                orientations[j * n + i] = orientation;
                if orientation != 0 {
                    pairs.push(MeshPair {
                        first: MeshId(i),
                        second: MeshId(j),
                        orientation,
                    });
                }
            }
        }

        let nb_current_barrier_triangles = (0..n)
            .filter(|&m| barrier[m])
            .map(|m| meshes[m].nb_triangles())
            .sum();

        let geometry = Geometry {
            pool,
            meshes,
            barrier,
            outermost,
            interfaces,
            domains,
            domain_meshes,
            outermost_domain,
            vertex_dofs: numbering.vertex_dofs,
            triangle_dofs: numbering.triangle_dofs,
            dof_count: numbering.dof_count,
            nb_parameters: numbering.nb_parameters,
            nb_current_barrier_triangles,
            orientations,
            pairs,
            ordering,
        };
        log::info!(
            "geometry finalized: {} meshes, {} unknowns, {} parameters",
            geometry.meshes.len(),
            geometry.dof_count,
            geometry.nb_parameters
        );
        Ok(geometry)
    }
}

fn check_unique<'a>(names: impl Iterator<Item = &'a str>) -> Result<(), GeometryError> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(GeometryError::DuplicateName(name.to_string()));
        }
    }
    Ok(())
}

fn check_half_spaces(interfaces: &[Interface], domains: &[Domain]) -> Result<(), GeometryError> {
    let mut claims: HashMap<(usize, bool), &str> = HashMap::new();
    for domain in domains {
        for hs in &domain.boundaries {
            if let Some(first) = claims.insert((hs.interface, hs.inside), domain.name()) {
                return Err(GeometryError::InterfaceClaimedTwice {
                    interface: interfaces[hs.interface].name.clone(),
                    first: first.to_string(),
                    second: domain.name.clone(),
                });
            }
        }
    }
    if let Some(i) = (0..interfaces.len())
        .find(|i| !claims.contains_key(&(*i, true)) && !claims.contains_key(&(*i, false)))
    {
        return Err(GeometryError::UnusedInterface(interfaces[i].name.clone()));
    }
    Ok(())
}

struct Numbering {
    vertex_dofs: Vec<usize>,
    triangle_dofs: Vec<Vec<usize>>,
    dof_count: usize,
    nb_parameters: usize,
}

/// Every mesh must bound a conductive domain, and the meshes must form one group when
/// linked through the conductive domains they share. A conductor sealed off by a
/// non-conductive shell gets a potential defined only up to a constant.
fn check_connected(
    meshes: &[Mesh],
    interfaces: &[Interface],
    domains: &[Domain],
) -> Result<(), GeometryError> {
    fn root(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    let mut parent: Vec<usize> = (0..meshes.len()).collect();
    let mut touched = vec![false; meshes.len()];
    for domain in domains.iter().filter(|d| d.is_conductive()) {
        let bounding: Vec<usize> = domain
            .boundaries
            .iter()
            .flat_map(|hs| interfaces[hs.interface].meshes.iter().map(|(m, _)| m.0))
            .collect();
        if let Some((&first, rest)) = bounding.split_first() {
            touched[first] = true;
            for &m in rest {
                touched[m] = true;
                let (a, b) = (root(&mut parent, first), root(&mut parent, m));
                parent[b] = a;
            }
        }
    }
    if let Some(m) = touched.iter().position(|t| !t) {
        return Err(GeometryError::InvalidMesh(meshes[m].name().to_string()));
    }

    let mut parts: Vec<(usize, Vec<String>)> = Vec::new();
    for m in 0..meshes.len() {
        let r = root(&mut parent, m);
        let name = meshes[m].name().to_string();
        match parts.iter_mut().find(|(p, _)| *p == r) {
            Some((_, names)) => names.push(name),
            None => parts.push((r, vec![name])),
        }
    }
    if parts.len() > 1 {
        return Err(GeometryError::IsolatedParts(
            parts.into_iter().map(|(_, names)| names).collect(),
        ));
    }
    Ok(())
}

/// Unknowns first, then the triangles of outermost and barrier meshes.
fn number_dofs(pool: &VertexPool, meshes: &[Mesh], tail: &[bool], ordering: DofOrdering) -> Numbering {
    fn number(slot: &mut usize, next: &mut usize) {
        if *slot == usize::MAX {
            *slot = *next;
            *next += 1;
        }
    }

    let mut vertex_dofs = vec![usize::MAX; pool.len()];
    let mut triangle_dofs: Vec<Vec<usize>> =
        meshes.iter().map(|m| vec![usize::MAX; m.nb_triangles()]).collect();
    let mut next = 0;

    match ordering {
        DofOrdering::VerticesFirst => {
            let used: HashSet<usize> = meshes.iter().flat_map(|m| m.vertices().iter().copied()).collect();
            for v in (0..pool.len()).filter(|v| used.contains(v)) {
                number(&mut vertex_dofs[v], &mut next);
            }
            for m in (0..meshes.len()).filter(|m| !tail[*m]) {
                for slot in triangle_dofs[m].iter_mut() {
                    number(slot, &mut next);
                }
            }
        }
        DofOrdering::Legacy => {
            for (m, mesh) in meshes.iter().enumerate() {
                for &v in mesh.vertices() {
                    number(&mut vertex_dofs[v], &mut next);
                }
                if !tail[m] {
                    for slot in triangle_dofs[m].iter_mut() {
                        number(slot, &mut next);
                    }
                }
            }
        }
    }
    let dof_count = next;
    for m in (0..meshes.len()).filter(|m| tail[*m]) {
        for slot in triangle_dofs[m].iter_mut() {
            number(slot, &mut next);
        }
    }
    Numbering {
        vertex_dofs,
        triangle_dofs,
        dof_count,
        nb_parameters: next,
    }
}

/// A validated, immutable geometry.
#[derive(Debug, Clone)]
pub struct Geometry {
    pool: VertexPool,
    meshes: Vec<Mesh>,
    barrier: Vec<bool>,
    outermost: Vec<bool>,
    interfaces: Vec<Interface>,
    domains: Vec<Domain>,
    domain_meshes: Vec<Vec<(MeshId, i32)>>, // per domain: mesh and its orientation seen from the domain
    outermost_domain: Option<usize>,
    vertex_dofs: Vec<usize>,
    triangle_dofs: Vec<Vec<usize>>,
    dof_count: usize,
    nb_parameters: usize,
    nb_current_barrier_triangles: usize,
    orientations: Vec<i32>, // dense meshes x meshes
    pairs: Vec<MeshPair>,
    ordering: DofOrdering,
}

impl Geometry {
    pub fn points(&self) -> &[Point3<f64>] {
        self.pool.points()
    }

    pub fn meshes(&self) -> impl Iterator<Item = (MeshId, &Mesh)> {
        self.meshes.iter().enumerate().map(|(i, m)| (MeshId(i), m))
    }

    pub fn mesh(&self, id: MeshId) -> &Mesh {
        &self.meshes[id.0]
    }

    pub fn interfaces(&self) -> &[Interface] {
        &self.interfaces
    }

    pub fn interface_at(&self, hs: &HalfSpace) -> &Interface {
        &self.interfaces[hs.interface]
    }

    pub fn domains(&self) -> &[Domain] {
        &self.domains
    }

    pub fn dof_ordering(&self) -> DofOrdering {
        self.ordering
    }

    /// Number of unknowns: vertex potentials plus normal currents.
    pub fn dof_count(&self) -> usize {
        self.dof_count
    }

    /// Unknowns plus the triangles of outermost and barrier meshes.
    pub fn nb_parameters(&self) -> usize {
        self.nb_parameters
    }

    pub fn nb_current_barrier_triangles(&self) -> usize {
        self.nb_current_barrier_triangles
    }

    pub fn vertex_dof(&self, vertex: usize) -> usize {
        self.vertex_dofs[vertex]
    }

    pub fn is_outermost(&self, mesh: MeshId) -> bool {
        self.outermost[mesh.0]
    }

    pub fn is_current_barrier(&self, mesh: MeshId) -> bool {
        self.barrier[mesh.0]
    }

    /// Whether the triangles of `mesh` carry unknown normal currents.
    pub fn carries_current(&self, mesh: MeshId) -> bool {
        !self.barrier[mesh.0] && !self.outermost[mesh.0]
    }

    /// View of a mesh for the assembly kernels.
    pub fn surface(&self, mesh: MeshId) -> Surface<'_> {
        Surface {
            points: self.pool.points(),
            mesh: &self.meshes[mesh.0],
            vertex_dofs: &self.vertex_dofs,
            triangle_dofs: &self.triangle_dofs[mesh.0],
            outermost: self.outermost[mesh.0],
        }
    }

    pub fn mesh_by_name(&self, name: &str) -> Result<MeshId, GeometryError> {
        self.meshes
            .iter()
            .position(|m| m.name() == name)
            .map(MeshId)
            .ok_or_else(|| GeometryError::UnknownMesh(name.to_string()))
    }

    pub fn interface(&self, name: &str) -> Result<&Interface, GeometryError> {
        self.interfaces
            .iter()
            .find(|i| i.name == name)
            .ok_or_else(|| GeometryError::UnknownInterface(name.to_string()))
    }

    pub fn domain_by_name(&self, name: &str) -> Result<&Domain, GeometryError> {
        self.domains
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| GeometryError::UnknownDomain(name.to_string()))
    }

    pub fn outermost_interface(&self) -> Option<&Interface> {
        self.interfaces.iter().find(|i| i.outermost)
    }

    /// Interface of the first domain bounded by a single inside half-space.
    pub fn innermost_interface(&self) -> Option<&Interface> {
        self.domains
            .iter()
            .find(|d| matches!(d.boundaries.as_slice(), [hs] if hs.inside))
            .map(|d| &self.interfaces[d.boundaries[0].interface])
    }

    pub fn outermost_domain(&self) -> Option<&Domain> {
        self.outermost_domain.map(|d| &self.domains[d])
    }

    /// Cached pairs of meshes sharing a domain, each mesh paired with itself included.
    pub fn mesh_pairs(&self) -> &[MeshPair] {
        &self.pairs
    }

    /// `+1` when both meshes are seen with the same orientation from a shared domain,
    /// `-1` when opposite, `0` when they share no domain.
    pub fn relative_orientation(&self, m1: MeshId, m2: MeshId) -> i32 {
        if m1 == m2 {
            return 1;
        }
        self.orientations[m1.0 * self.meshes.len() + m2.0]
    }

    fn mesh_orientation(&self, domain: usize, mesh: MeshId) -> Option<i32> {
        self.domain_meshes[domain]
            .iter()
            .find(|(m, _)| *m == mesh)
            .map(|(_, o)| *o)
    }

    /// Sum of `f` over the domains bounded by both meshes.
    pub fn fold(&self, f: DomainFn, m1: MeshId, m2: MeshId) -> f64 {
        (0..self.domains.len())
            .filter(|&d| {
                self.mesh_orientation(d, m1).is_some() && self.mesh_orientation(d, m2).is_some()
            })
            .map(|d| f.eval(&self.domains[d]))
            .sum()
    }

    pub fn sigma(&self, m1: MeshId, m2: MeshId) -> f64 {
        self.fold(DomainFn::Conductivity, m1, m2)
    }

    pub fn sigma_inv(&self, m1: MeshId, m2: MeshId) -> f64 {
        self.fold(DomainFn::InverseConductivity, m1, m2)
    }

    pub fn indicator(&self, m1: MeshId, m2: MeshId) -> f64 {
        self.fold(DomainFn::Indicator, m1, m2)
    }

    /// Signed sum of the conductivities on both sides of `mesh`.
    pub fn conductivity_jump(&self, mesh: MeshId) -> f64 {
        (0..self.domains.len())
            .filter_map(|d| {
                self.mesh_orientation(d, mesh)
                    .map(|o| self.domains[d].conductivity() * o as f64)
            })
            .sum()
    }

    /// Orientation of `mesh` seen from `domain`, if the domain is bounded by it.
    pub fn domain_orientation(&self, domain: &Domain, mesh: MeshId) -> Option<i32> {
        let d = self.domains.iter().position(|x| std::ptr::eq(x, domain))?;
        self.mesh_orientation(d, mesh)
    }

    /// Whether `point` lies inside the closed surface formed by `interface`.
    pub fn interface_contains(&self, interface: &Interface, point: &Point3<f64>) -> bool {
        let total: f64 = interface
            .meshes
            .iter()
            .map(|&(m, o)| {
                let mesh = &self.meshes[m.0];
                let omega: f64 = (0..mesh.nb_triangles())
                    .map(|t| solid_angle(point, &mesh.triangle(self.pool.points(), t)))
                    .sum();
                o as f64 * omega
            })
            .sum();
        total.abs() > 2.0 * PI
    }

    /// The domain containing `point`, possibly the non-conductive exterior.
    pub fn domain(&self, point: &Point3<f64>) -> Result<&Domain, LocationError> {
        self.domains
            .iter()
            .find(|d| {
                d.boundaries.iter().all(|hs| {
                    self.interface_contains(&self.interfaces[hs.interface], point) == hs.inside
                })
            })
            .ok_or(LocationError::Unlocated(*point))
    }

    /// The domain containing `point`, which must be conductive.
    pub fn conducting_domain(&self, point: &Point3<f64>) -> Result<&Domain, LocationError> {
        let domain = self.domain(point)?;
        if !domain.is_conductive() {
            return Err(LocationError::NonConductive {
                point: *point,
                domain: domain.name.clone(),
            });
        }
        Ok(domain)
    }

    fn mesh_aabb(&self, mesh: &Mesh) -> Aabb {
        let points: Vec<_> = mesh.vertices().iter().map(|&v| self.pool.points()[v]).collect();
        Aabb::from_points(&points)
    }

    /// Whether some triangle of `source` intersects a triangle of the geometry.
    pub fn check_overlap(&self, source: &SourceMesh) -> bool {
        let source_box = Aabb::from_points(source.points());
        let source_triangles: Vec<_> = (0..source.mesh().nb_triangles())
            .map(|t| source.mesh().triangle(source.points(), t))
            .collect();
        self.meshes
            .iter()
            .filter(|m| self.mesh_aabb(m).intersects(&source_box))
            .any(|mesh| {
                (0..mesh.nb_triangles()).any(|t| {
                    let triangle = mesh.triangle(self.pool.points(), t);
                    source_triangles.iter().any(|s| triangles_intersect(&triangle, s))
                })
            })
    }

    /// Topological problems of the meshes, empty when the geometry is sound.
    pub fn self_check(&self) -> Vec<String> {
        let points = self.pool.points();
        let mut problems = Vec::new();
        for mesh in &self.meshes {
            if !mesh.is_closed() {
                problems.push(format!("mesh {} is not closed", mesh.name()));
            }
            if !mesh.has_correct_orientation() {
                problems.push(format!("mesh {} is not consistently oriented", mesh.name()));
            }
            if mesh.has_self_intersection(points) {
                problems.push(format!("mesh {} self-intersects", mesh.name()));
            }
        }
        for (i, j) in (0..self.meshes.len()).flat_map(|i| (i + 1..self.meshes.len()).map(move |j| (i, j))) {
            let (a, b) = (&self.meshes[i], &self.meshes[j]);
            if !self.mesh_aabb(a).intersects(&self.mesh_aabb(b)) {
                continue;
            }
            let crossing = a.triangles().iter().enumerate().any(|(s, ta)| {
                b.triangles().iter().enumerate().any(|(t, tb)| {
                    !ta.iter().any(|v| tb.contains(v))
                        && triangles_intersect(&a.triangle(points, s), &b.triangle(points, t))
                })
            });
            if crossing {
                problems.push(format!("meshes {} and {} intersect", a.name(), b.name()));
            }
        }
        problems
    }

    /// Logs a summary of the geometry.
    pub fn info(&self) {
        log::info!(
            "{} vertices, {} meshes, {} interfaces, {} domains",
            self.pool.len(),
            self.meshes.len(),
            self.interfaces.len(),
            self.domains.len()
        );
        for (id, mesh) in self.meshes() {
            log::info!(
                "mesh {}: {} vertices, {} triangles{}{}",
                mesh.name(),
                mesh.nb_vertices(),
                mesh.nb_triangles(),
                if self.is_outermost(id) { ", outermost" } else { "" },
                if self.is_current_barrier(id) { ", current barrier" } else { "" }
            );
        }
        for domain in &self.domains {
            let sides: Vec<String> = domain
                .boundaries
                .iter()
                .map(|hs| {
                    format!("{}{}", if hs.inside { '-' } else { '+' }, self.interfaces[hs.interface].name)
                })
                .collect();
            log::info!(
                "domain {}: conductivity {}, boundaries [{}]",
                domain.name,
                domain.conductivity(),
                sides.join(" ")
            );
        }
        log::info!(
            "{} unknowns ({:?} ordering), {} parameters, {} barrier triangles",
            self.dof_count,
            self.ordering,
            self.nb_parameters,
            self.nb_current_barrier_triangles
        );
    }
}
