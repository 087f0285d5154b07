//! TOML geometry descriptions.
//!
//! ```toml
//! [meshes]
//! cortex = "cortex.tri"
//! scalp = "scalp.mesh"
//!
//! [[interfaces]]
//! name = "Cortex"
//! meshes = ["+cortex"]
//!
//! [[domains]]
//! name = "Brain"
//! conductivity = 0.33
//! boundaries = ["-Cortex"]
//! ```
//!
//! Mesh paths are relative to the description file. In `boundaries`, `-` selects the inside
//! of an interface and `+` its outside. A domain without conductivity is non-conductive.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::ParseError;
use crate::geometry::{DofOrdering, Geometry, GeometryBuilder};
use crate::io::load_mesh;


#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct InterfaceEntry {
    pub name: String,
    pub meshes: Vec<String>, // optionally signed mesh names, `+` by default
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DomainEntry {
    pub name: String,
    pub conductivity: Option<f64>,
    pub boundaries: Vec<String>, // signed interface names
}

/// Parsed geometry description.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GeometryDescription {
    pub meshes: BTreeMap<String, PathBuf>,
    #[serde(default)]
    pub interfaces: Vec<InterfaceEntry>,
    #[serde(default)]
    pub domains: Vec<DomainEntry>,
}

/// Splits a leading `+` or `-`.
fn parse_sign(token: &str) -> Result<(&str, bool), ParseError> {
    if let Some(name) = token.strip_prefix('+') {
        Ok((name, true))
    } else if let Some(name) = token.strip_prefix('-') {
        Ok((name, false))
    } else {
        Err(ParseError::Description(format!(
            "{:?} must start with '+' or '-'",
            token
        )))
    }
}

impl GeometryDescription {
    pub fn from_toml(text: &str) -> Result<Self, ParseError> {
        toml::from_str(text).map_err(|e| ParseError::Description(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, ParseError> {
        let text = std::fs::read_to_string(path).map_err(|e| ParseError::io(path, e))?;
        Self::from_toml(&text)
    }

    /// Mesh names in order of first use by the interfaces, unused ones last.
    pub fn mesh_order(&self) -> Vec<&str> {
        let mut order: Vec<&str> = Vec::new();
        let used = self
            .interfaces
            .iter()
            .flat_map(|i| i.meshes.iter())
            .map(|m| m.trim_start_matches(['+', '-']));
        for name in used.chain(self.meshes.keys().map(String::as_str)) {
            if !order.contains(&name) {
                order.push(name);
            }
        }
        order
    }

    /// Loads the meshes relative to `base_dir` and declares interfaces and domains.
    pub fn to_builder(&self, base_dir: &Path) -> Result<GeometryBuilder, ParseError> {
        let mut builder = GeometryBuilder::default();
        for name in self.mesh_order() {
            let file = self.meshes.get(name).ok_or_else(|| {
                ParseError::Description(format!("mesh {} is used but not declared", name))
            })?;
            load_mesh(&base_dir.join(file), &mut builder, name)?;
        }

        for interface in &self.interfaces {
            let meshes = interface
                .meshes
                .iter()
                .map(|m| {
                    if m.starts_with(['+', '-']) {
                        parse_sign(m).map(|(name, plus)| (name, if plus { 1 } else { -1 }))
                    } else {
                        Ok((m.as_str(), 1))
                    }
                })
                .collect::<Result<Vec<_>, _>>()?;
            builder
                .add_interface(&interface.name, &meshes)
                .map_err(|e| ParseError::Description(e.to_string()))?;
        }

        for domain in &self.domains {
            let boundaries = domain
                .boundaries
                .iter()
                .map(|b| parse_sign(b).map(|(name, outside)| (name, !outside)))
                .collect::<Result<Vec<_>, _>>()?;
            builder.add_domain(&domain.name, domain.conductivity, &boundaries);
        }
        Ok(builder)
    }
}

/// Reads a description file and finalizes the geometry it describes.
pub fn load_geometry(path: &Path, ordering: DofOrdering) -> Result<Geometry> {
    let description = GeometryDescription::load(path)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let builder = description
        .to_builder(base_dir)
        .with_context(|| format!("Failed to load the meshes of {}", path.display()))?;
    let geometry = builder
        .finalize(ordering)
        .with_context(|| format!("Invalid geometry in {}", path.display()))?;
    geometry.info();
    Ok(geometry)
}
