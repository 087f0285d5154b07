//! Text `.tri` format: `- N`, then N lines `x y z nx ny nz`, then `- T T T` and T lines of
//! three vertex indices.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use nalgebra::{Point3, Vector3};

use super::{RawSurface, SurfaceCodec};
use crate::error::ParseError;

#[cfg(test)]
mod tests {
    use super::*;

    const TETRA: &str = "- 4
0 0 0 0 0 -1
1 0 0 1 0 0
0 1 0 0 1 0
0 0 1 0 0 1
- 4 4 4
0 2 1
0 1 3
0 3 2
1 2 3
";

    #[test]
    fn parses_points_normals_and_triangles() {
        let surface = parse(TETRA).unwrap();
        assert_eq!(surface.points.len(), 4);
        assert_eq!(surface.normals[0], Vector3::new(0.0, 0.0, -1.0));
        assert_eq!(surface.triangles[3], [1, 2, 3]);
    }

    #[test]
    fn formatted_text_parses_back() {
        let surface = parse(TETRA).unwrap();
        assert_eq!(parse(&format(&surface)).unwrap(), surface);
    }

    #[test]
    fn missing_triangle_is_truncation() {
        let text = TETRA.trim_end().rsplit_once('\n').unwrap().0;
        assert!(matches!(parse(text), Err(ParseError::Truncated("triangles"))));
    }

    #[test]
    fn bad_number_reports_its_line() {
        let text = TETRA.replace("1 0 0 1 0 0", "1 0 zero 1 0 0");
        assert!(matches!(parse(&text), Err(ParseError::Syntax { line: 3, .. })));
    }
}

/// The `.tri` text format.
#[derive(Debug, Clone, Copy, Default)]
pub struct TriMesh;

impl SurfaceCodec for TriMesh {
    fn name(&self) -> &'static str {
        "TRI"
    }

    fn extension(&self) -> &'static str {
        "tri"
    }

    fn sniff(&self, header: &[u8]) -> bool {
        header.starts_with(b"- ")
    }

    fn read(&self, path: &Path) -> Result<RawSurface, ParseError> {
        let text = std::fs::read_to_string(path).map_err(|e| ParseError::io(path, e))?;
        parse(&text)
    }

    fn write(&self, path: &Path, surface: &RawSurface) -> Result<(), ParseError> {
        let file = File::create(path).map_err(|e| ParseError::io(path, e))?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(format(surface).as_bytes())
            .and_then(|_| writer.flush())
            .map_err(|e| ParseError::io(path, e))
    }
}

/// Whitespace tokens tagged with their 1-based line number.
struct Tokens<'a> {
    tokens: Box<dyn Iterator<Item = (usize, &'a str)> + 'a>,
}

impl<'a> Tokens<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            tokens: Box::new(
                text.lines()
                    .enumerate()
                    .flat_map(|(i, l)| l.split_whitespace().map(move |t| (i + 1, t))),
            ),
        }
    }

    fn next<T: std::str::FromStr>(&mut self, what: &'static str) -> Result<T, ParseError>
    where
        T::Err: std::fmt::Display,
    {
        let (line, token) = self.tokens.next().ok_or(ParseError::Truncated(what))?;
        token
            .parse()
            .map_err(|e| ParseError::syntax(line, format!("{} {:?}: {}", what, token, e)))
    }

    fn dash(&mut self, what: &'static str) -> Result<(), ParseError> {
        let (line, token) = self.tokens.next().ok_or(ParseError::Truncated(what))?;
        if token != "-" {
            return Err(ParseError::syntax(line, format!("expected '-' before {}", what)));
        }
        Ok(())
    }
}

fn parse(text: &str) -> Result<RawSurface, ParseError> {
    let mut tokens = Tokens::new(text);

    tokens.dash("point count")?;
    let npts: usize = tokens.next("point count")?;
    let mut points = Vec::with_capacity(npts);
    let mut normals = Vec::with_capacity(npts);
    for _ in 0..npts {
        let mut v = [0.0; 6];
        for c in v.iter_mut() {
            *c = tokens.next("points")?;
        }
        points.push(Point3::new(v[0], v[1], v[2]));
        normals.push(Vector3::new(v[3], v[4], v[5]));
    }

    tokens.dash("triangle count")?;
    // the count is repeated three times
    let ntrgs: usize = tokens.next("triangle count")?;
    for _ in 0..2 {
        let repeat: usize = tokens.next("triangle count")?;
        if repeat != ntrgs {
            return Err(ParseError::CountMismatch {
                what: "triangle count",
                expected: ntrgs,
                found: repeat,
            });
        }
    }
    let mut triangles = Vec::with_capacity(ntrgs);
    for _ in 0..ntrgs {
        triangles.push([
            tokens.next("triangles")?,
            tokens.next("triangles")?,
            tokens.next("triangles")?,
        ]);
    }

    Ok(RawSurface {
        points,
        normals,
        triangles,
    })
}

fn format(surface: &RawSurface) -> String {
    let mut text = format!("- {}\n", surface.points.len());
    for (i, p) in surface.points.iter().enumerate() {
        let n = surface.normals.get(i).copied().unwrap_or_else(Vector3::zeros);
        text += &format!("{} {} {} {} {} {}\n", p.x, p.y, p.z, n.x, n.y, n.z);
    }
    let ntrgs = surface.triangles.len();
    text += &format!("- {} {} {}\n", ntrgs, ntrgs, ntrgs);
    for [a, b, c] in &surface.triangles {
        text += &format!("{} {} {}\n", a, b, c);
    }
    text
}
