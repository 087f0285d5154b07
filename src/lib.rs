pub mod analytics;
pub mod assemble;
pub mod config;
pub mod containment;
pub mod description;
pub mod error;
pub mod generators;
pub mod geom;
pub mod geometry;
pub mod io;
pub mod operators;
pub mod output;
pub mod quadrature;
pub mod report;
pub mod sensors;
pub mod settings;
