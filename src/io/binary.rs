//! Compact binary surface format.
//!
//! Layout, all integers little-endian `u32`:
//! - `binar`, the byte-order tag `DCBA`, then a length-prefixed tag (`4`, `VOID`);
//! - vertices per face (must be 3), time frames (must be 1), time step;
//! - point count and `f32` coordinates;
//! - normal count and `f32` normals, then a zero;
//! - triangle count and the vertex indices.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use nalgebra::{Point3, Vector3};

use super::{RawSurface, SurfaceCodec};
use crate::error::ParseError;


/// The binary `.mesh` format.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryMesh;

const MAGIC: &[u8; 5] = b"binar";
const BYTE_ORDER: &[u8; 4] = b"DCBA";

impl SurfaceCodec for BinaryMesh {
    fn name(&self) -> &'static str {
        "MESH"
    }

    fn extension(&self) -> &'static str {
        "mesh"
    }

    fn sniff(&self, header: &[u8]) -> bool {
        header.starts_with(MAGIC)
    }

    fn read(&self, path: &Path) -> Result<RawSurface, ParseError> {
        let mut bytes = Vec::new();
        File::open(path)
            .and_then(|mut f| f.read_to_end(&mut bytes))
            .map_err(|e| ParseError::io(path, e))?;
        decode(&bytes)
    }

    fn write(&self, path: &Path, surface: &RawSurface) -> Result<(), ParseError> {
        let bytes = encode(surface)?;
        let file = File::create(path).map_err(|e| ParseError::io(path, e))?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(&bytes)
            .and_then(|_| writer.flush())
            .map_err(|e| ParseError::io(path, e))
    }
}

/// Cursor over little-endian data.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8], ParseError> {
        let end = self.pos.checked_add(n).ok_or(ParseError::Truncated(what))?;
        let slice = self.bytes.get(self.pos..end).ok_or(ParseError::Truncated(what))?;
        self.pos = end;
        Ok(slice)
    }

    fn u32(&mut self, what: &'static str) -> Result<u32, ParseError> {
        let b = self.take(4, what)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn f32_triples(&mut self, count: usize, what: &'static str) -> Result<Vec<[f64; 3]>, ParseError> {
        let bytes = self.take(count.saturating_mul(12), what)?;
        Ok(bytes
            .chunks_exact(12)
            .map(|c| {
                let f = |i: usize| f32::from_le_bytes([c[i], c[i + 1], c[i + 2], c[i + 3]]) as f64;
                [f(0), f(4), f(8)]
            })
            .collect())
    }
}

fn decode(bytes: &[u8]) -> Result<RawSurface, ParseError> {
    let mut reader = Reader { bytes, pos: 0 };

    let magic = reader.take(5, "header")?;
    if magic != MAGIC {
        return Err(ParseError::BadMagic {
            expected: String::from_utf8_lossy(MAGIC).into_owned(),
            found: String::from_utf8_lossy(magic).into_owned(),
        });
    }
    let byte_order = reader.take(4, "header")?;
    if byte_order != BYTE_ORDER {
        return Err(ParseError::BadMagic {
            expected: String::from_utf8_lossy(BYTE_ORDER).into_owned(),
            found: String::from_utf8_lossy(byte_order).into_owned(),
        });
    }
    let tag_size = reader.u32("header")? as usize;
    reader.take(tag_size, "header")?;

    let vertex_per_face = reader.u32("header")?;
    if vertex_per_face != 3 {
        return Err(ParseError::VerticesPerFace(vertex_per_face));
    }
    let frames = reader.u32("header")?;
    if frames != 1 {
        return Err(ParseError::TimeFrames(frames));
    }
    reader.u32("header")?; // time step

    let npts = reader.u32("point count")? as usize;
    let points = reader
        .f32_triples(npts, "point coordinates")?
        .into_iter()
        .map(|[x, y, z]| Point3::new(x, y, z))
        .collect();

    let nnormals = reader.u32("normal count")? as usize;
    let normals: Vec<Vector3<f64>> = reader
        .f32_triples(nnormals, "normals")?
        .into_iter()
        .map(|[x, y, z]| Vector3::new(x, y, z))
        .collect();
    if !normals.is_empty() && normals.len() != npts {
        return Err(ParseError::CountMismatch {
            what: "normals",
            expected: npts,
            found: normals.len(),
        });
    }
    reader.u32("header")?;

    let ntrgs = reader.u32("triangle count")? as usize;
    let indices = reader.take(ntrgs.saturating_mul(12), "triangles")?;
    let triangles = indices
        .chunks_exact(12)
        .map(|c| {
            let u = |i: usize| u32::from_le_bytes([c[i], c[i + 1], c[i + 2], c[i + 3]]) as usize;
            [u(0), u(4), u(8)]
        })
        .collect();

    Ok(RawSurface {
        points,
        normals,
        triangles,
    })
}

fn encode(surface: &RawSurface) -> Result<Vec<u8>, ParseError> {
    let count = |what: &'static str, n: usize| {
        u32::try_from(n).map_err(|_| ParseError::CountMismatch {
            what,
            expected: u32::MAX as usize,
            found: n,
        })
    };
    let npts = count("points", surface.points.len())?;
    let normals: Vec<Vector3<f64>> = if surface.normals.len() == surface.points.len() {
        surface.normals.clone()
    } else {
        vec![Vector3::zeros(); surface.points.len()]
    };

    let mut bytes = Vec::with_capacity(
        29 + 24 * surface.points.len() + 12 * surface.triangles.len() + 16,
    );
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(BYTE_ORDER);
    bytes.extend(4u32.to_le_bytes());
    bytes.extend_from_slice(b"VOID");
    bytes.extend(3u32.to_le_bytes());
    bytes.extend(1u32.to_le_bytes());
    bytes.extend(0u32.to_le_bytes());

    bytes.extend(npts.to_le_bytes());
    for p in &surface.points {
        for c in p.coords.iter() {
            bytes.extend((*c as f32).to_le_bytes());
        }
    }
    bytes.extend(npts.to_le_bytes());
    for n in &normals {
        for c in n.iter() {
            bytes.extend((*c as f32).to_le_bytes());
        }
    }
    bytes.extend(0u32.to_le_bytes());

    bytes.extend(count("triangles", surface.triangles.len())?.to_le_bytes());
    for t in &surface.triangles {
        for &v in t {
            bytes.extend(count("vertex index", v)?.to_le_bytes());
        }
    }
    Ok(bytes)
}
