//! Wavefront `.obj` surfaces, read with `tobj`.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use nalgebra::{Point3, Vector3};

use super::{RawSurface, SurfaceCodec};
use crate::error::ParseError;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quads_are_triangulated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("square.obj");
        std::fs::write(
            &path,
            "# unit square\nv 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n",
        )
        .unwrap();
        let surface = ObjMesh.read(&path).unwrap();
        assert_eq!(surface.points.len(), 4);
        assert_eq!(surface.triangles.len(), 2);
        assert!(surface.normals.is_empty());
    }

    #[test]
    fn header_sniffing() {
        assert!(ObjMesh.sniff(b"# exported\nv 0 0 0"));
        assert!(ObjMesh.sniff(b"v 1.0 2.0 3.0\n"));
        assert!(!ObjMesh.sniff(b"- 12\n0 0 0"));
        assert!(!ObjMesh.sniff(b""));
    }
}

/// The Wavefront `.obj` format. Every object of the file lands in one surface.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjMesh;

impl SurfaceCodec for ObjMesh {
    fn name(&self) -> &'static str {
        "OBJ"
    }

    fn extension(&self) -> &'static str {
        "obj"
    }

    fn sniff(&self, header: &[u8]) -> bool {
        let text = String::from_utf8_lossy(header);
        matches!(
            text.split_whitespace().next(),
            Some("#" | "v" | "vn" | "o" | "g" | "mtllib")
        )
    }

    fn read(&self, path: &Path) -> Result<RawSurface, ParseError> {
        let options = tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        };
        let (models, _) = tobj::load_obj(path, &options)?;

        let mut surface = RawSurface::default();
        let mut with_normals = true;
        for m in models.iter() {
            let mesh = &m.mesh;
            let offset = surface.points.len();
            for vtx in 0..mesh.positions.len() / 3 {
                surface.points.push(Point3::new(
                    mesh.positions[3 * vtx] as f64,
                    mesh.positions[3 * vtx + 1] as f64,
                    mesh.positions[3 * vtx + 2] as f64,
                ));
            }
            if mesh.normals.len() == mesh.positions.len() {
                for vtx in 0..mesh.normals.len() / 3 {
                    surface.normals.push(Vector3::new(
                        mesh.normals[3 * vtx] as f64,
                        mesh.normals[3 * vtx + 1] as f64,
                        mesh.normals[3 * vtx + 2] as f64,
                    ));
                }
            } else {
                with_normals = false;
            }
            for face in mesh.indices.chunks_exact(3) {
                surface.triangles.push([
                    offset + face[0] as usize,
                    offset + face[1] as usize,
                    offset + face[2] as usize,
                ]);
            }
        }
        if !with_normals {
            surface.normals.clear();
        }
        Ok(surface)
    }

    fn write(&self, path: &Path, surface: &RawSurface) -> Result<(), ParseError> {
        let io = |e| ParseError::io(path, e);
        let file = File::create(path).map_err(io)?;
        let mut writer = BufWriter::new(file);
        let with_normals = surface.normals.len() == surface.points.len();

        for p in &surface.points {
            writeln!(writer, "v {} {} {}", p.x, p.y, p.z).map_err(io)?;
        }
        if with_normals {
            for n in &surface.normals {
                writeln!(writer, "vn {} {} {}", n.x, n.y, n.z).map_err(io)?;
            }
        }
        for t in &surface.triangles {
            let [a, b, c] = t.map(|v| v + 1);
            if with_normals {
                writeln!(writer, "f {a}//{a} {b}//{b} {c}//{c}").map_err(io)?;
            } else {
                writeln!(writer, "f {a} {b} {c}").map_err(io)?;
            }
        }
        writer.flush().map_err(io)
    }
}
