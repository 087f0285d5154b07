//! Surface mesh codecs.
//!
//! A codec decodes a file into a [`RawSurface`] in file-local numbering and encodes one back.
//! Loading into a geometry happens in two steps, as the vertex pool is shared by all meshes:
//! - [`RawSurface::load_points`] adds the coordinates to the pool and returns the
//!   file-local → pool [`IndexMap`].
//! - [`RawSurface::load_triangles`] translates the triangles with that map.
//!
//! The codec is picked from the extension, then from the first bytes of the file.

pub mod binary;
pub mod obj;
pub mod tri;

use std::fs::File;
use std::io::Read;
use std::path::Path;

use nalgebra::{Point3, Vector3};

pub use binary::BinaryMesh;
pub use obj::ObjMesh;
pub use tri::TriMesh;

use crate::error::ParseError;
use crate::geom::{IndexMap, Mesh, SourceMesh, TriangleIndices, VertexPool};
use crate::geometry::{GeometryBuilder, MeshId};


/// Coordinates, optional per-vertex normals and triangles, numbered from zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSurface {
    pub points: Vec<Point3<f64>>,
    pub normals: Vec<Vector3<f64>>, // empty, or one per point
    pub triangles: Vec<TriangleIndices>,
}

impl RawSurface {
    /// Local copy of `mesh`, numbering its vertices in increasing pool order.
    /// Normals are taken from the mesh or recomputed when it has none.
    pub fn from_mesh(points: &[Point3<f64>], mesh: &Mesh) -> Self {
        let computed;
        let with_normals = if mesh.has_normals() {
            mesh
        } else {
            let mut copy = mesh.clone();
            copy.compute_normals(points);
            computed = copy;
            &computed
        };
        let vertices = mesh.vertices();
        let local = |v: usize| vertices.binary_search(&v).unwrap_or_default();
        Self {
            points: vertices.iter().map(|&v| points[v]).collect(),
            normals: vertices
                .iter()
                .map(|&v| with_normals.normal(v).copied().unwrap_or_else(Vector3::zeros))
                .collect(),
            triangles: mesh
                .triangles()
                .iter()
                .map(|t| t.map(local))
                .collect(),
        }
    }

    /// Adds the points to `pool` and returns where each one landed.
    /// File normals are attached to `mesh` when there is one per point.
    pub fn load_points(&self, pool: &mut VertexPool, mesh: &mut Mesh) -> IndexMap {
        let indmap = pool.add_vertices(&self.points);
        if self.normals.len() == self.points.len() {
            for (&v, n) in indmap.iter().zip(&self.normals) {
                if let Some(n) = n.try_normalize(0.0) {
                    mesh.set_normal(v, n);
                }
            }
        }
        indmap
    }

    pub fn load_triangles(&self, mesh: &mut Mesh, indmap: &IndexMap) -> Result<(), ParseError> {
        for t in &self.triangles {
            mesh.add_triangle(*t, indmap)?;
        }
        Ok(())
    }
}

/// A surface mesh file format.
pub trait SurfaceCodec {
    fn name(&self) -> &'static str;

    fn extension(&self) -> &'static str;

    /// Whether the first bytes of a file look like this format.
    fn sniff(&self, header: &[u8]) -> bool;

    fn read(&self, path: &Path) -> Result<RawSurface, ParseError>;

    fn write(&self, path: &Path, surface: &RawSurface) -> Result<(), ParseError>;
}

fn codecs() -> [Box<dyn SurfaceCodec>; 3] {
    [Box::new(BinaryMesh), Box::new(TriMesh), Box::new(ObjMesh)]
}

/// Picks a codec from the extension of `path`, then from its header bytes.
pub fn codec_for(path: &Path) -> Result<Box<dyn SurfaceCodec>, ParseError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    if let Some(extension) = &extension {
        if let Some(codec) = codecs().into_iter().find(|c| c.extension() == extension) {
            return Ok(codec);
        }
    }

    let mut header = Vec::with_capacity(16);
    if let Ok(file) = File::open(path) {
        file.take(16)
            .read_to_end(&mut header)
            .map_err(|e| ParseError::io(path, e))?;
    }
    codecs()
        .into_iter()
        .find(|c| c.sniff(&header))
        .ok_or_else(|| ParseError::UnknownFormat(path.display().to_string()))
}

/// Loads a mesh file into `builder` under `name`.
pub fn load_mesh(
    path: &Path,
    builder: &mut GeometryBuilder,
    name: &str,
) -> Result<MeshId, ParseError> {
    let codec = codec_for(path)?;
    let surface = codec.read(path)?;
    let id = builder.add_mesh(name);
    let (pool, mesh) = builder.pool_and_mesh_mut(id);
    let indmap = surface.load_points(pool, mesh);
    surface.load_triangles(mesh, &indmap)?;
    log::debug!(
        "loaded {} mesh {} from {}: {} points, {} triangles",
        codec.name(),
        name,
        path.display(),
        surface.points.len(),
        surface.triangles.len()
    );
    Ok(id)
}

/// Loads a mesh file as a standalone source surface.
pub fn load_source_mesh(path: &Path, name: &str) -> Result<SourceMesh, ParseError> {
    let surface = codec_for(path)?.read(path)?;
    let mut pool = VertexPool::default();
    let mut mesh = Mesh::new(name);
    let indmap = surface.load_points(&mut pool, &mut mesh);
    surface.load_triangles(&mut mesh, &indmap)?;
    Ok(SourceMesh::from_mesh(pool, mesh))
}

/// Writes the vertices and triangles of `mesh` with the codec chosen by `path`.
pub fn save_mesh(path: &Path, points: &[Point3<f64>], mesh: &Mesh) -> Result<(), ParseError> {
    let codec = codec_for(path)?;
    codec.write(path, &RawSurface::from_mesh(points, mesh))
}
