//! Error taxonomy for loading, validating and assembling geometries.
//!
//! Parse and topology errors are fatal for the operation that raised them.
//! Location errors are recoverable: drivers record them in an
//! [`AssemblyReport`](crate::report::AssemblyReport) and carry on.

use std::path::PathBuf;

use nalgebra::Point3;

/// Failure while decoding a surface mesh, a geometry description or a matrix file.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("bad magic header: expected {expected:?}, found {found:?}")]
    BadMagic { expected: String, found: String },

    #[error("only triangulated surfaces are supported, found {0} vertices per face")]
    VerticesPerFace(u32),

    #[error("only single time frame meshes are supported, found {0} frames")]
    TimeFrames(u32),

    #[error("count mismatch in {what}: expected {expected}, found {found}")]
    CountMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("unexpected end of data while reading {0}")]
    Truncated(&'static str),

    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("triangle {triangle} references vertex {index}, but only {count} vertices were read")]
    VertexIndex {
        triangle: usize,
        index: usize,
        count: usize,
    },

    #[error("OBJ error: {0}")]
    Obj(#[from] tobj::LoadError),

    #[error("no mesh codec for {0}")]
    UnknownFormat(String),

    #[error("{0}")]
    Description(String),
}

impl ParseError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ParseError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn syntax(line: usize, message: impl Into<String>) -> Self {
        ParseError::Syntax {
            line,
            message: message.into(),
        }
    }
}

/// Topology and lookup failures detected while finalizing or querying a geometry.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeometryError {
    #[error("no outermost domain: every domain lies inside some interface")]
    NoOutermostDomain,

    #[error("several outermost domains: {0:?}")]
    MultipleOutermostDomains(Vec<String>),

    #[error("geometry is not nested: domain {domain} lies inside {count} interfaces")]
    NotNested { domain: String, count: usize },

    #[error("interface {interface} is claimed on the same side by domains {first} and {second}")]
    InterfaceClaimedTwice {
        interface: String,
        first: String,
        second: String,
    },

    #[error("interface {0} does not separate two domains")]
    UnusedInterface(String),

    #[error("mesh {0} belongs to no interface")]
    OrphanMesh(String),

    #[error("mesh {0} touches no conductive domain, its potentials have no equation")]
    InvalidMesh(String),

    #[error("conductive regions are isolated from each other: {0:?}")]
    IsolatedParts(Vec<Vec<String>>),

    #[error("unknown interface {0}")]
    UnknownInterface(String),

    #[error("unknown mesh {0}")]
    UnknownMesh(String),

    #[error("unknown domain {0}")]
    UnknownDomain(String),

    #[error("duplicate name {0}")]
    DuplicateName(String),

    #[error("orientation of mesh {mesh} in interface {interface} must be +1 or -1, got {value}")]
    BadOrientation {
        interface: String,
        mesh: String,
        value: i32,
    },
}

/// A point that could not be attributed to a conductive domain.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LocationError {
    #[error("point {0} lies in no domain")]
    Unlocated(Point3<f64>),

    #[error("point {point} lies in the non-conductive domain {domain}")]
    NonConductive { point: Point3<f64>, domain: String },
}

/// Invalid arguments handed to an assembly driver.
#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    #[error("quadrature order must be at least 1, got {0}")]
    QuadratureOrder(usize),

    #[error("{what} must have {expected} columns, found {found}")]
    Columns {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// Failure while persisting or reading back a dense matrix.
#[derive(Debug, thiserror::Error)]
pub enum MatrixIoError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: {message}")]
    Format { path: PathBuf, message: String },
}
