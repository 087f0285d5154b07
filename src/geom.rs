//! Vertex pool, triangle meshes and the per-session surface view handed to the kernels.

use std::collections::{BTreeMap, HashMap};

use itertools::Itertools;
use nalgebra::{Point3, Vector3};

use crate::containment::{triangles_intersect, Aabb};
use crate::error::ParseError;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::icosphere;
    use approx::assert_relative_eq;

    fn tetrahedron() -> (VertexPool, Mesh) {
        let mut pool = VertexPool::default();
        let indmap = pool.add_vertices(&[
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        ]);
        let mut mesh = Mesh::new("tet");
        for t in [[0, 2, 1], [0, 1, 3], [1, 2, 3], [0, 3, 2]] {
            mesh.add_triangle(t, &indmap).unwrap();
        }
        (pool, mesh)
    }

    #[test]
    fn pool_deduplicates_exact_coordinates() {
        let mut pool = VertexPool::default();
        let a = pool.add_vertex(Point3::new(1.0, 2.0, 3.0));
        let b = pool.add_vertex(Point3::new(1.0, 2.0, 3.0 + 1e-12));
        let c = pool.add_vertex(Point3::new(1.0, 2.0, 3.0));
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn triangle_area_and_normal() {
        let t = Triangle::new([
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(0.0, 2.0, 0.0),
        ]);
        assert_relative_eq!(t.area(), 2.0);
        assert_relative_eq!(t.normal(), Vector3::z());
        let area: f64 = t.subdivide().iter().map(Triangle::area).sum();
        assert_relative_eq!(area, 2.0);
        let inner = t.barycentric(&Point3::new(0.5, 0.5, 3.0));
        assert_relative_eq!(inner, Vector3::new(0.5, 0.25, 0.25), epsilon = 1e-14);
    }

    #[test]
    fn closest_point_clamps_to_edges_and_corners() {
        let t = Triangle::new([
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(0.0, 2.0, 0.0),
        ]);
        let above = t.closest_point(&Point3::new(0.5, 0.5, 3.0));
        assert_relative_eq!(above, Point3::new(0.5, 0.5, 0.0), epsilon = 1e-14);
        let beyond_edge = t.closest_point(&Point3::new(1.0, -1.0, 1.0));
        assert_relative_eq!(beyond_edge, Point3::new(1.0, 0.0, 0.0), epsilon = 1e-14);
        let beyond_corner = t.closest_point(&Point3::new(3.0, -1.0, 0.0));
        assert_relative_eq!(beyond_corner, Point3::new(2.0, 0.0, 0.0), epsilon = 1e-14);
    }

    #[test]
    fn tetrahedron_is_closed_and_oriented() {
        let (_, mesh) = tetrahedron();
        assert!(mesh.is_closed());
        assert!(mesh.has_correct_orientation());
        let adjacency = mesh.triangles_of_vertex();
        assert_eq!(adjacency.len(), 4);
        assert!(adjacency.values().all(|t| t.len() == 3));
        assert_eq!(adjacency[&3], vec![1, 2, 3]);
    }

    #[test]
    fn flipped_triangle_breaks_orientation() {
        let (_, mut mesh) = tetrahedron();
        mesh.triangles[0] = [0, 1, 2];
        assert!(!mesh.has_correct_orientation());
    }

    #[test]
    fn sphere_normals_point_outward() {
        let (points, triangles) = icosphere(Point3::origin(), 2.0, 1);
        let mut pool = VertexPool::default();
        let indmap = pool.add_vertices(&points);
        let mut mesh = Mesh::new("sphere");
        for t in triangles {
            mesh.add_triangle(t, &indmap).unwrap();
        }
        mesh.compute_normals(pool.points());
        for &v in mesh.vertices() {
            let n = mesh.normal(v).unwrap();
            assert!(n.dot(&pool.points()[v].coords) > 0.0);
            assert_relative_eq!(n.norm(), 1.0, epsilon = 1e-12);
        }
        assert!(!mesh.has_self_intersection(pool.points()));
    }

    #[test]
    fn crossing_triangles_are_self_intersecting() {
        let mut pool = VertexPool::default();
        let indmap = pool.add_vertices(&[
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(0.0, 2.0, 0.0),
            Point3::new(0.5, 0.5, -1.0),
            Point3::new(0.5, 0.5, 1.0),
            Point3::new(3.0, 3.0, 0.0),
        ]);
        let mut mesh = Mesh::new("crossing");
        mesh.add_triangle([0, 1, 2], &indmap).unwrap();
        mesh.add_triangle([3, 4, 5], &indmap).unwrap();
        assert!(mesh.has_self_intersection(pool.points()));
    }

    #[test]
    fn bad_vertex_index_is_a_parse_error() {
        let mut mesh = Mesh::new("m");
        let indmap = vec![0, 1, 2];
        assert!(matches!(
            mesh.add_triangle([0, 1, 7], &indmap),
            Err(ParseError::VertexIndex { index: 7, .. })
        ));
    }
}

/// Vertex indices of a triangle, in the numbering of the owning pool.
pub type TriangleIndices = [usize; 3];

/// Maps a file-local vertex number to its index in the owning pool.
pub type IndexMap = Vec<usize>;

/// Deduplicated vertex storage. Vertices are referenced everywhere else by index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexPool {
    points: Vec<Point3<f64>>,
}

impl VertexPool {
    /// Adds a vertex unless an exactly equal one is already stored and returns its index.
    pub fn add_vertex(&mut self, vertex: Point3<f64>) -> usize {
        if let Some(i) = self.points.iter().position(|p| *p == vertex) {
            return i;
        }
        self.points.push(vertex);
        self.points.len() - 1
    }

    /// Adds a batch of vertices and returns the local to global index map.
    pub fn add_vertices(&mut self, vertices: &[Point3<f64>]) -> IndexMap {
        vertices.iter().map(|v| self.add_vertex(*v)).collect()
    }

    pub fn points(&self) -> &[Point3<f64>] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// A flat triangle in 3D.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub vertices: [Point3<f64>; 3],
}

impl Triangle {
    pub fn new(vertices: [Point3<f64>; 3]) -> Self {
        Self { vertices }
    }

    /// Twice the area times the unit normal.
    pub fn scaled_normal(&self) -> Vector3<f64> {
        let [a, b, c] = self.vertices;
        (b - a).cross(&(c - a))
    }

    pub fn area(&self) -> f64 {
        0.5 * self.scaled_normal().norm()
    }

    /// Unit normal, following the right-hand rule on the vertex order.
    pub fn normal(&self) -> Vector3<f64> {
        self.scaled_normal().normalize()
    }

    pub fn centroid(&self) -> Point3<f64> {
        let [a, b, c] = self.vertices;
        Point3::from((a.coords + b.coords + c.coords) / 3.0)
    }

    /// Point at barycentric coordinates `(1 - s - t, s, t)`.
    pub fn point(&self, s: f64, t: f64) -> Point3<f64> {
        let [a, b, c] = self.vertices;
        a + (b - a) * s + (c - a) * t
    }

    /// Barycentric coordinates of the projection of `p` on the plane of the triangle.
    pub fn barycentric(&self, p: &Point3<f64>) -> Vector3<f64> {
        let [a, b, c] = self.vertices;
        let n = self.scaled_normal();
        Vector3::new(
            n.dot(&(b - p).cross(&(c - p))),
            n.dot(&(c - p).cross(&(a - p))),
            n.dot(&(a - p).cross(&(b - p))),
        ) / n.norm_squared()
    }

    /// Point of the triangle nearest to `p`.
    pub fn closest_point(&self, p: &Point3<f64>) -> Point3<f64> {
        let weights = self.barycentric(p);
        if weights.iter().all(|w| *w >= 0.0) {
            let [a, b, c] = self.vertices;
            return Point3::from(a.coords * weights[0] + b.coords * weights[1] + c.coords * weights[2]);
        }
        (0..3)
            .map(|i| {
                let a = self.vertices[i];
                let b = self.vertices[(i + 1) % 3];
                let edge = b - a;
                let t = ((p - a).dot(&edge) / edge.norm_squared()).clamp(0.0, 1.0);
                a + edge * t
            })
            .min_by(|x, y| (x - p).norm_squared().total_cmp(&(y - p).norm_squared()))
            .unwrap_or(self.vertices[0])
    }

    /// Split into four congruent triangles through the edge midpoints, keeping the orientation.
    pub fn subdivide(&self) -> [Triangle; 4] {
        let [a, b, c] = self.vertices;
        let ab = nalgebra::center(&a, &b);
        let bc = nalgebra::center(&b, &c);
        let ca = nalgebra::center(&c, &a);
        [
            Triangle::new([a, ab, ca]),
            Triangle::new([ab, b, bc]),
            Triangle::new([ca, bc, c]),
            Triangle::new([ab, bc, ca]),
        ]
    }

    pub fn aabb(&self) -> Aabb {
        Aabb::from_points(&self.vertices)
    }
}

/// A triangulated surface referencing vertices of a [`VertexPool`] by index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    name: String,
    vertices: Vec<usize>, // sorted pool indices used by the triangles
    triangles: Vec<TriangleIndices>, // pool indices
    normals: BTreeMap<usize, Vector3<f64>>, // outward unit normal per pool index
}

impl Mesh {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vertices(&self) -> &[usize] {
        &self.vertices
    }

    pub fn triangles(&self) -> &[TriangleIndices] {
        &self.triangles
    }

    pub fn nb_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn nb_triangles(&self) -> usize {
        self.triangles.len()
    }

    /// Adds a triangle given in file-local numbering, translating it with `indmap`.
    pub fn add_triangle(
        &mut self,
        local: TriangleIndices,
        indmap: &IndexMap,
    ) -> Result<(), ParseError> {
        let mut global = [0; 3];
        for (g, &l) in global.iter_mut().zip(local.iter()) {
            *g = *indmap.get(l).ok_or(ParseError::VertexIndex {
                triangle: self.triangles.len(),
                index: l,
                count: indmap.len(),
            })?;
        }
        self.push_triangle(global);
        Ok(())
    }

    /// Adds a triangle given directly in pool numbering.
    pub fn push_triangle(&mut self, triangle: TriangleIndices) {
        for v in triangle {
            if let Err(pos) = self.vertices.binary_search(&v) {
                self.vertices.insert(pos, v);
            }
        }
        self.triangles.push(triangle);
    }

    pub fn set_normal(&mut self, vertex: usize, normal: Vector3<f64>) {
        self.normals.insert(vertex, normal);
    }

    pub fn normal(&self, vertex: usize) -> Option<&Vector3<f64>> {
        self.normals.get(&vertex)
    }

    pub fn has_normals(&self) -> bool {
        !self.vertices.is_empty() && self.vertices.iter().all(|v| self.normals.contains_key(v))
    }

    pub fn triangle(&self, points: &[Point3<f64>], i: usize) -> Triangle {
        let [a, b, c] = self.triangles[i];
        Triangle::new([points[a], points[b], points[c]])
    }

    /// Replaces the normals with area-weighted averages of the incident triangle normals.
    pub fn compute_normals(&mut self, points: &[Point3<f64>]) {
        let mut sums: BTreeMap<usize, Vector3<f64>> = BTreeMap::new();
        for i in 0..self.triangles.len() {
            let weighted = self.triangle(points, i).scaled_normal();
            for v in self.triangles[i] {
                *sums.entry(v).or_insert_with(Vector3::zeros) += weighted;
            }
        }
        self.normals = sums
            .into_iter()
            .map(|(v, n)| (v, n.try_normalize(0.0).unwrap_or_else(Vector3::zeros)))
            .collect();
    }

    pub fn total_area(&self, points: &[Point3<f64>]) -> f64 {
        (0..self.triangles.len())
            .map(|i| self.triangle(points, i).area())
            .sum()
    }

    /// For each vertex of the mesh, the indices of the triangles that use it.
    pub fn triangles_of_vertex(&self) -> BTreeMap<usize, Vec<usize>> {
        let mut adjacency: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (i, t) in self.triangles.iter().enumerate() {
            for &v in t {
                adjacency.entry(v).or_default().push(i);
            }
        }
        adjacency
    }

    fn directed_edges(&self) -> HashMap<(usize, usize), usize> {
        let mut edges = HashMap::new();
        for t in &self.triangles {
            for k in 0..3 {
                *edges.entry((t[k], t[(k + 1) % 3])).or_insert(0) += 1;
            }
        }
        edges
    }

    /// Every edge is traversed at most once in each direction, i.e. neighbouring
    /// triangles agree on the orientation.
    pub fn has_correct_orientation(&self) -> bool {
        self.directed_edges().values().all(|&count| count == 1)
    }

    /// Every directed edge has its reverse: the surface has no boundary.
    pub fn is_closed(&self) -> bool {
        let edges = self.directed_edges();
        edges.keys().all(|&(a, b)| edges.contains_key(&(b, a)))
    }

    /// Whether two triangles of the mesh that share no vertex intersect.
    pub fn has_self_intersection(&self, points: &[Point3<f64>]) -> bool {
        let triangles: Vec<Triangle> = (0..self.triangles.len())
            .map(|i| self.triangle(points, i))
            .collect();
        (0..self.triangles.len())
            .tuple_combinations()
            .filter(|&(i, j)| {
                !self.triangles[i]
                    .iter()
                    .any(|v| self.triangles[j].contains(v))
            })
            .any(|(i, j)| triangles_intersect(&triangles[i], &triangles[j]))
    }
}

/// A mesh seen by the assembly kernels: coordinates, DOF numbering and the
/// role the mesh plays in the current assembly.
///
/// `outermost` marks a surface whose triangles carry no unknown, either because it
/// bounds the non-conductive exterior or because it is an external source mesh.
#[derive(Debug, Clone, Copy)]
pub struct Surface<'a> {
    pub points: &'a [Point3<f64>],
    pub mesh: &'a Mesh,
    pub vertex_dofs: &'a [usize], // pool index -> dof
    pub triangle_dofs: &'a [usize], // mesh triangle index -> dof
    pub outermost: bool,
}

impl<'a> Surface<'a> {
    pub fn nb_triangles(&self) -> usize {
        self.mesh.nb_triangles()
    }

    pub fn triangle(&self, i: usize) -> Triangle {
        self.mesh.triangle(self.points, i)
    }

    /// DOF indices of the three vertices of triangle `i`.
    pub fn vertex_dofs_of(&self, i: usize) -> [usize; 3] {
        self.mesh.triangles()[i].map(|v| self.vertex_dofs[v])
    }

    pub fn triangle_dof(&self, i: usize) -> usize {
        self.triangle_dofs[i]
    }

    /// Same mesh behind both views.
    pub fn same_mesh(&self, other: &Surface) -> bool {
        std::ptr::eq(self.mesh, other.mesh)
    }
}

/// A mesh that lives outside any geometry, e.g. a distributed source surface.
/// Its vertices and triangles are numbered locally from zero.
#[derive(Debug, Clone, Default)]
pub struct SourceMesh {
    pool: VertexPool,
    mesh: Mesh,
    vertex_dofs: Vec<usize>,
    triangle_dofs: Vec<usize>,
}

impl SourceMesh {
    /// Builds a source mesh from raw coordinates and triangles in local numbering.
    pub fn from_parts(
        name: &str,
        points: &[Point3<f64>],
        triangles: &[TriangleIndices],
    ) -> Result<Self, ParseError> {
        let mut pool = VertexPool::default();
        let indmap = pool.add_vertices(points);
        let mut mesh = Mesh::new(name);
        for t in triangles {
            mesh.add_triangle(*t, &indmap)?;
        }
        Ok(Self::from_mesh(pool, mesh))
    }

    pub fn from_mesh(pool: VertexPool, mut mesh: Mesh) -> Self {
        if !mesh.has_normals() {
            mesh.compute_normals(pool.points());
        }
        let vertex_dofs = (0..pool.len()).collect();
        let triangle_dofs = (0..mesh.nb_triangles()).collect();
        Self {
            pool,
            mesh,
            vertex_dofs,
            triangle_dofs,
        }
    }

    pub fn points(&self) -> &[Point3<f64>] {
        self.pool.points()
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn nb_vertices(&self) -> usize {
        self.pool.len()
    }

    /// View of the mesh for an assembly session in which it acts as an external source.
    pub fn as_source(&self) -> Surface<'_> {
        Surface {
            points: self.pool.points(),
            mesh: &self.mesh,
            vertex_dofs: &self.vertex_dofs,
            triangle_dofs: &self.triangle_dofs,
            outermost: true,
        }
    }
}
